use crate::domain::feature::Feature;
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Observed numeric samples for one feature, used to scale distances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDistribution {
    feature_name: String,
    samples: Vec<f64>,
}

impl FeatureDistribution {
    pub fn new(feature: &Feature, samples: Vec<f64>) -> Self {
        Self {
            feature_name: feature.name().to_string(),
            samples,
        }
    }

    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .samples
            .iter()
            .map(|s| (s - mean).powi(2))
            .sum::<f64>()
            / self.samples.len() as f64;
        variance.sqrt()
    }

    pub fn sample(&self, rng: &mut dyn RngCore) -> Option<f64> {
        self.samples.choose(rng).copied()
    }
}
