//! Probability aggregation across the trees of an ensemble

/// Combines per-tree class distributions into one distribution per row.
#[derive(Debug, Clone)]
pub struct ProbabilityAggregator {
    /// Per-tree weights for the weighted average
    weights: Vec<f64>,
}

impl ProbabilityAggregator {
    /// Create an aggregator with per-tree weights.
    pub fn new(weights: Vec<f64>) -> Result<Self, String> {
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(format!("invalid tree weight {}", w));
        }
        if !weights.is_empty() && weights.iter().sum::<f64>() <= 0.0 {
            return Err("tree weights sum to zero".to_string());
        }
        Ok(Self { weights })
    }

    /// Create aggregator with equal weights for `n_trees` trees.
    pub fn equal_weights(n_trees: usize) -> Self {
        Self {
            weights: vec![1.0; n_trees],
        }
    }

    pub fn n_trees(&self) -> usize {
        self.weights.len()
    }

    /// Weighted average of class distributions, one per tree.
    ///
    /// Weights are normalized to sum to 1; summation runs in tree order so the
    /// result is reproducible bit for bit.
    pub fn aggregate(&self, distributions: &[&[f64]], n_classes: usize) -> Vec<f64> {
        let mut combined = vec![0.0; n_classes];
        let mut total_weight = 0.0;

        for (dist, &weight) in distributions.iter().zip(&self.weights) {
            for (acc, &p) in combined.iter_mut().zip(dist.iter()) {
                *acc += p * weight;
            }
            total_weight += weight;
        }

        if total_weight > 0.0 {
            for acc in &mut combined {
                *acc /= total_weight;
            }
        }
        combined
    }

    /// Index of the most probable class; ties go to the lowest index.
    pub fn argmax(distribution: &[f64]) -> usize {
        let mut best = 0;
        for (idx, &p) in distribution.iter().enumerate() {
            if p > distribution[best] {
                best = idx;
            }
        }
        best
    }

    /// Get configured weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}
