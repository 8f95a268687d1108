//! Configuration management for the batch inference run

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings file picked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/inference.toml";

/// Output file used when `--out` is not given.
pub const DEFAULT_OUTPUT_PATH: &str = "resultados_inferencia_limpio.csv";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub cleaning: CleaningConfig,
    pub output: OutputConfig,
    pub models: ModelsConfig,
    pub logging: LoggingConfig,
}

/// Cleaning stage policy
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CleaningConfig {
    /// Cell values treated as missing (compared after trimming)
    pub missing_markers: Vec<String>,
    /// Bucket for categorical values the pipeline was not trained on
    pub unknown_category: String,
    /// Match raw headers to feature names ignoring case and surrounding spaces
    pub case_insensitive_headers: bool,
}

/// Output file layout
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Name of the appended prediction column
    pub prediction_column: String,
    /// Prefix for probability columns
    pub probability_prefix: String,
    /// Column names for binary classifiers (class 0, class 1)
    pub binary_probability_columns: [String; 2],
}

/// Model runtime configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    /// Number of threads for ONNX inference (default: 1)
    pub onnx_threads: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from the default path, falling back to built-in defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        Self::build(path.exists().then_some(path))
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(Some(path.as_ref()))
    }

    fn build(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix("BATCH_INFERENCE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.output.prediction_column.trim().is_empty() {
            anyhow::bail!("output.prediction_column must not be empty");
        }
        if self.cleaning.unknown_category.is_empty() {
            anyhow::bail!("cleaning.unknown_category must not be empty");
        }
        if self.models.onnx_threads == 0 {
            anyhow::bail!("models.onnx_threads must be at least 1");
        }
        Ok(())
    }
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            missing_markers: ["NA", "N/A", "NaN", "nan", "null", "NULL", "None", "?", "-"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            unknown_category: "__unknown__".to_string(),
            case_insensitive_headers: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prediction_column: "Prediccion".to_string(),
            probability_prefix: "Probabilidad".to_string(),
            binary_probability_columns: [
                "Probabilidad_No_Default".to_string(),
                "Probabilidad_Default".to_string(),
            ],
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Parameters of a single run. Everything a run reads or writes comes from here.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Raw input CSV
    pub csv: PathBuf,
    /// Pipeline artifact manifest
    pub artifact: PathBuf,
    /// Output CSV
    pub out: PathBuf,
    /// Identifier column kept at the front of the output, if present
    pub id_column: Option<String>,
    /// Rows shown in the preview log
    pub preview_rows: usize,
}

impl RunConfig {
    pub fn new(csv: impl Into<PathBuf>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            csv: csv.into(),
            artifact: artifact.into(),
            out: PathBuf::from(DEFAULT_OUTPUT_PATH),
            id_column: Some("ID".to_string()),
            preview_rows: 10,
        }
    }

    pub fn with_output(mut self, out: impl Into<PathBuf>) -> Self {
        self.out = out.into();
        self
    }

    pub fn with_id_column(mut self, id_column: Option<String>) -> Self {
        self.id_column = id_column.filter(|c| !c.is_empty());
        self
    }

    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.output.prediction_column, "Prediccion");
        assert_eq!(config.cleaning.unknown_category, "__unknown__");
        assert!(config.cleaning.missing_markers.contains(&"NA".to_string()));
        assert_eq!(config.models.onnx_threads, 1);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[output]\nprediction_column = \"prediction\"\n\n[cleaning]\nunknown_category = \"OTHER\""
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.output.prediction_column, "prediction");
        assert_eq!(config.output.probability_prefix, "Probabilidad");
        assert_eq!(config.cleaning.unknown_category, "OTHER");
        assert!(config.cleaning.case_insensitive_headers);
    }

    #[test]
    fn test_invalid_threads_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[models]\nonnx_threads = 0").unwrap();
        assert!(AppConfig::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_shipped_settings_match_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        assert_eq!(AppConfig::load_from_path(path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_run_config_defaults() {
        let run = RunConfig::new("test_inferencia.csv", "random_forest_pipeline.json");
        assert_eq!(run.out, PathBuf::from(DEFAULT_OUTPUT_PATH));
        assert_eq!(run.id_column.as_deref(), Some("ID"));
        assert_eq!(run.with_id_column(Some(String::new())).id_column, None);
    }
}
