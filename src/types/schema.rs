//! Typed description of the features a trained pipeline expects

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Model input encoding for a categorical value outside the declared categories.
pub const UNKNOWN_CATEGORY_CODE: f32 = -1.0;

/// Data type of a feature column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Numeric,
    Integer,
    Categorical,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Numeric => write!(f, "numeric"),
            FeatureKind::Integer => write!(f, "integer"),
            FeatureKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// Value used to fill missing cells of a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Imputation {
    Number(f64),
    Integer(i64),
    Category(String),
}

impl Imputation {
    fn kind(&self) -> FeatureKind {
        match self {
            Imputation::Number(_) => FeatureKind::Numeric,
            Imputation::Integer(_) => FeatureKind::Integer,
            Imputation::Category(_) => FeatureKind::Categorical,
        }
    }
}

/// One expected feature column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    /// Column name the model was trained with
    pub name: String,
    /// Expected dtype
    pub kind: FeatureKind,
    /// Alternative raw column names accepted for this feature
    pub aliases: Vec<String>,
    /// Fill value for missing cells and absent columns
    pub impute: Option<Imputation>,
    /// Known categories (categorical features only)
    pub categories: Vec<String>,
}

impl FeatureSpec {
    pub fn numeric(name: &str) -> Self {
        Self::with_kind(name, FeatureKind::Numeric)
    }

    pub fn integer(name: &str) -> Self {
        Self::with_kind(name, FeatureKind::Integer)
    }

    pub fn categorical(name: &str, categories: &[&str]) -> Self {
        let mut spec = Self::with_kind(name, FeatureKind::Categorical);
        spec.categories = categories.iter().map(|c| c.to_string()).collect();
        spec
    }

    fn with_kind(name: &str, kind: FeatureKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            aliases: Vec::new(),
            impute: None,
            categories: Vec::new(),
        }
    }

    pub fn with_impute(mut self, impute: Imputation) -> Self {
        self.impute = Some(impute);
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Whether the feature can be filled when its column is absent.
    pub fn has_default(&self) -> bool {
        self.impute.is_some()
    }

    pub fn is_known_category(&self, value: &str) -> bool {
        self.categories.iter().any(|c| c == value)
    }

    /// Model input code of a categorical value.
    pub fn category_code(&self, value: &str) -> f32 {
        self.categories
            .iter()
            .position(|c| c == value)
            .map(|idx| idx as f32)
            .unwrap_or(UNKNOWN_CATEGORY_CODE)
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("feature with empty name".to_string());
        }
        if let Some(impute) = &self.impute {
            let compatible = impute.kind() == self.kind
                // Whole numbers are valid fills for float columns
                || (self.kind == FeatureKind::Numeric && impute.kind() == FeatureKind::Integer);
            if !compatible {
                return Err(format!(
                    "feature '{}' is {} but its imputation value is {}",
                    self.name,
                    self.kind,
                    impute.kind()
                ));
            }
        }
        match self.kind {
            FeatureKind::Categorical => {
                if self.categories.is_empty() {
                    return Err(format!(
                        "categorical feature '{}' declares no categories",
                        self.name
                    ));
                }
                let unique: HashSet<&String> = self.categories.iter().collect();
                if unique.len() != self.categories.len() {
                    return Err(format!(
                        "categorical feature '{}' has duplicate categories",
                        self.name
                    ));
                }
                if let Some(Imputation::Category(fill)) = &self.impute {
                    if !self.is_known_category(fill) {
                        return Err(format!(
                            "imputation value '{}' of feature '{}' is not a declared category",
                            fill, self.name
                        ));
                    }
                }
            }
            _ => {
                if !self.categories.is_empty() {
                    return Err(format!(
                        "{} feature '{}' must not declare categories",
                        self.kind, self.name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Ordered feature schema baked into a trained pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    /// Build a validated schema.
    pub fn new(features: Vec<FeatureSpec>) -> Result<Self, String> {
        if features.is_empty() {
            return Err("schema declares no features".to_string());
        }

        let mut seen = HashSet::new();
        for feature in &features {
            feature.validate()?;
            if !seen.insert(feature.name.as_str()) {
                return Err(format!("duplicate feature '{}'", feature.name));
            }
        }

        Ok(Self { features })
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_codes() {
        let spec = FeatureSpec::categorical("EDUCATION", &["1", "2", "3"]);
        assert_eq!(spec.category_code("1"), 0.0);
        assert_eq!(spec.category_code("3"), 2.0);
        assert_eq!(spec.category_code("__unknown__"), UNKNOWN_CATEGORY_CODE);
    }

    #[test]
    fn test_duplicate_features_rejected() {
        let err = FeatureSchema::new(vec![
            FeatureSpec::numeric("AGE"),
            FeatureSpec::integer("AGE"),
        ])
        .unwrap_err();
        assert!(err.contains("duplicate feature"));
    }

    #[test]
    fn test_impute_kind_must_match() {
        let err = FeatureSchema::new(vec![
            FeatureSpec::integer("AGE").with_impute(Imputation::Category("x".into()))
        ])
        .unwrap_err();
        assert!(err.contains("imputation value"));

        // Integer fill on a float column is accepted
        assert!(FeatureSchema::new(vec![
            FeatureSpec::numeric("LIMIT_BAL").with_impute(Imputation::Integer(50_000))
        ])
        .is_ok());
    }

    #[test]
    fn test_categorical_requires_categories() {
        let err = FeatureSchema::new(vec![FeatureSpec::categorical("SEX", &[])]).unwrap_err();
        assert!(err.contains("declares no categories"));

        let err = FeatureSchema::new(vec![FeatureSpec::categorical("SEX", &["1", "2"])
            .with_impute(Imputation::Category("9".into()))])
        .unwrap_err();
        assert!(err.contains("not a declared category"));
    }

    #[test]
    fn test_lookup() {
        let schema = FeatureSchema::new(vec![
            FeatureSpec::numeric("LIMIT_BAL"),
            FeatureSpec::integer("AGE"),
        ])
        .unwrap();
        assert_eq!(schema.names(), vec!["LIMIT_BAL", "AGE"]);
        assert_eq!(schema.position("AGE"), Some(1));
        assert!(schema.get("SEX").is_none());
    }
}
