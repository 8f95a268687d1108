//! Native decision-tree ensemble evaluation

use crate::models::aggregator::ProbabilityAggregator;
use crate::models::manifest::{NodeEntry, TreeEntry};

/// Node of a validated tree.
#[derive(Debug, Clone, PartialEq)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        missing_left: bool,
    },
    Leaf {
        distribution: Vec<f64>,
    },
}

/// A single decision tree. Rows go left when `value <= threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Validate a tree from the manifest and normalize its leaves.
    ///
    /// Children must come after their parent, which rules out cycles.
    pub fn from_entry(
        entry: &TreeEntry,
        n_features: usize,
        n_classes: usize,
    ) -> Result<Self, String> {
        if entry.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        let n_nodes = entry.nodes.len();
        let mut nodes = Vec::with_capacity(n_nodes);
        for (idx, node) in entry.nodes.iter().enumerate() {
            let node = match node {
                NodeEntry::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    missing_left,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {idx}: feature index {feature} out of range ({n_features} features)"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx}: threshold is not finite"));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= n_nodes {
                            return Err(format!("node {idx}: invalid child index {child}"));
                        }
                    }
                    TreeNode::Split {
                        feature: *feature,
                        threshold: *threshold,
                        left: *left,
                        right: *right,
                        missing_left: *missing_left,
                    }
                }
                NodeEntry::Leaf { value } => TreeNode::Leaf {
                    distribution: normalize_leaf(value, n_classes)
                        .map_err(|e| format!("node {idx}: {e}"))?,
                },
            };
            nodes.push(node);
        }

        Ok(Self { nodes })
    }

    /// Class distribution of the leaf a row lands in.
    pub fn predict_row(&self, row: &[f32]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { distribution } => return distribution,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    missing_left,
                } => {
                    let value = row[*feature];
                    let go_left = if value.is_nan() {
                        *missing_left
                    } else {
                        f64::from(value) <= *threshold
                    };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn normalize_leaf(value: &[f64], n_classes: usize) -> Result<Vec<f64>, String> {
    if value.len() != n_classes {
        return Err(format!(
            "leaf has {} values for {} classes",
            value.len(),
            n_classes
        ));
    }
    if value.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err("leaf values must be finite and non-negative".to_string());
    }
    let total: f64 = value.iter().sum();
    if total <= 0.0 {
        return Err("leaf values sum to zero".to_string());
    }
    Ok(value.iter().map(|v| v / total).collect())
}

/// Tree ensemble: averages leaf distributions across trees.
#[derive(Debug)]
pub struct ForestModel {
    trees: Vec<DecisionTree>,
    aggregator: ProbabilityAggregator,
    n_features: usize,
    n_classes: usize,
}

impl ForestModel {
    pub fn new(
        trees: &[TreeEntry],
        weights: &[f64],
        n_features: usize,
        n_classes: usize,
    ) -> Result<Self, String> {
        if trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        if n_classes == 0 {
            return Err("forest model requires class labels".to_string());
        }
        if !weights.is_empty() && weights.len() != trees.len() {
            return Err(format!(
                "{} tree weights for {} trees",
                weights.len(),
                trees.len()
            ));
        }

        let trees = trees
            .iter()
            .enumerate()
            .map(|(i, t)| {
                DecisionTree::from_entry(t, n_features, n_classes)
                    .map_err(|e| format!("tree {i}: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let aggregator = if weights.is_empty() {
            ProbabilityAggregator::equal_weights(trees.len())
        } else {
            ProbabilityAggregator::new(weights.to_vec())?
        };

        Ok(Self {
            trees,
            aggregator,
            n_features,
            n_classes,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Class probabilities for a row-major `[rows, n_features]` matrix.
    pub fn predict_proba(&self, matrix: &[f32]) -> Vec<Vec<f64>> {
        matrix
            .chunks(self.n_features)
            .map(|row| {
                let leaves: Vec<&[f64]> = self.trees.iter().map(|t| t.predict_row(row)).collect();
                self.aggregator.aggregate(&leaves, self.n_classes)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(feature: usize, threshold: f64, left: [f64; 2], right: [f64; 2]) -> TreeEntry {
        TreeEntry {
            nodes: vec![
                NodeEntry::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                    missing_left: false,
                },
                NodeEntry::Leaf {
                    value: left.to_vec(),
                },
                NodeEntry::Leaf {
                    value: right.to_vec(),
                },
            ],
        }
    }

    #[test]
    fn test_tree_routing() {
        let tree = DecisionTree::from_entry(&stump(0, 30.0, [8.0, 2.0], [1.0, 3.0]), 1, 2).unwrap();

        assert_eq!(tree.predict_row(&[30.0]), &[0.8, 0.2]);
        assert_eq!(tree.predict_row(&[31.0]), &[0.25, 0.75]);
        // Missing values follow missing_left (false: right)
        assert_eq!(tree.predict_row(&[f32::NAN]), &[0.25, 0.75]);
    }

    #[test]
    fn test_forest_averages_trees() {
        let forest = ForestModel::new(
            &[
                stump(0, 30.0, [1.0, 0.0], [0.0, 1.0]),
                stump(1, 0.5, [1.0, 1.0], [0.0, 1.0]),
            ],
            &[],
            2,
            2,
        )
        .unwrap();

        let probs = forest.predict_proba(&[25.0, 0.0, 40.0, 1.0]);
        assert_eq!(probs.len(), 2);
        assert!((probs[0][0] - 0.75).abs() < 1e-12);
        assert!((probs[1][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_backward_child_rejected() {
        let mut tree = stump(0, 1.0, [1.0, 0.0], [0.0, 1.0]);
        tree.nodes[0] = NodeEntry::Split {
            feature: 0,
            threshold: 1.0,
            left: 0,
            right: 2,
            missing_left: false,
        };
        let err = DecisionTree::from_entry(&tree, 1, 2).unwrap_err();
        assert!(err.contains("invalid child index 0"));
    }

    #[test]
    fn test_feature_out_of_range_rejected() {
        let err = DecisionTree::from_entry(&stump(3, 1.0, [1.0, 0.0], [0.0, 1.0]), 2, 2)
            .unwrap_err();
        assert!(err.contains("feature index 3 out of range"));
    }

    #[test]
    fn test_leaf_width_must_match_classes() {
        let err = ForestModel::new(&[stump(0, 1.0, [1.0, 0.0], [0.0, 1.0])], &[], 1, 3)
            .unwrap_err();
        assert!(err.contains("leaf has 2 values for 3 classes"));
    }

    #[test]
    fn test_weight_count_must_match_trees() {
        let err = ForestModel::new(&[stump(0, 1.0, [1.0, 0.0], [0.0, 1.0])], &[1.0, 2.0], 1, 2)
            .unwrap_err();
        assert!(err.contains("2 tree weights for 1 trees"));
    }
}
