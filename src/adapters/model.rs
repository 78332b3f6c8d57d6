use crate::domain::{Feature, Output, PredictionInput, PredictionOutput, PredictionProvider, Type, Value};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

type BatchFn = dyn Fn(&[PredictionInput]) -> Result<Vec<PredictionOutput>> + Send + Sync;

/// Closure-backed model capability.
pub struct FnModel {
    predict: Box<BatchFn>,
}

impl FnModel {
    /// Wrap a per-input scoring function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&PredictionInput) -> Result<PredictionOutput> + Send + Sync + 'static,
    {
        Self {
            predict: Box::new(move |inputs| inputs.iter().map(&f).collect()),
        }
    }

    /// Wrap a function that scores a whole batch at once.
    pub fn batch<F>(f: F) -> Self
    where
        F: Fn(&[PredictionInput]) -> Result<Vec<PredictionOutput>> + Send + Sync + 'static,
    {
        Self { predict: Box::new(f) }
    }
}

impl fmt::Debug for FnModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModel").finish_non_exhaustive()
    }
}

#[async_trait]
impl PredictionProvider for FnModel {
    async fn predict(&self, inputs: Vec<PredictionInput>) -> Result<Vec<PredictionOutput>> {
        (self.predict)(&inputs)
    }
}

/// Logistic-style linear scorer.
///
/// Numeric features (numbers, booleans, durations in seconds, times in
/// seconds since midnight) contribute `weight * value`. Any other value
/// contributes the one-hot weight registered under `name=value`.
/// Produces two outputs: `score` (the raw sum) and `decision`
/// (`score > threshold`, with a logistic confidence).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub threshold: f64,
}

impl LinearModel {
    pub fn new(bias: f64) -> Self {
        Self {
            bias,
            ..Self::default()
        }
    }

    pub fn with_weight(mut self, key: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(key.into(), weight);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    fn contribution(&self, feature: &Feature) -> f64 {
        match numeric_view(feature.value()) {
            Some(x) => self.weights.get(feature.name()).map_or(0.0, |w| w * x),
            None => {
                let key = format!("{}={}", feature.name(), feature.value());
                self.weights.get(&key).copied().unwrap_or(0.0)
            }
        }
    }

    pub fn score(&self, input: &PredictionInput) -> f64 {
        self.bias + input.features.iter().map(|f| self.contribution(f)).sum::<f64>()
    }

    pub fn evaluate(&self, input: &PredictionInput) -> PredictionOutput {
        let score = self.score(input);
        let margin = (score - self.threshold).abs();
        let confidence = 1.0 / (1.0 + (-margin).exp());
        PredictionOutput::new(vec![
            Output::new("score", Type::Number, score, 1.0),
            Output::new("decision", Type::Boolean, score > self.threshold, confidence),
        ])
    }
}

fn numeric_view(value: &Value) -> Option<f64> {
    match value {
        Value::Duration(d) => Some(d.as_secs_f64()),
        Value::Time(t) => Some(f64::from(t.num_seconds_from_midnight())),
        other => other.as_number(),
    }
}

#[async_trait]
impl PredictionProvider for LinearModel {
    async fn predict(&self, inputs: Vec<PredictionInput>) -> Result<Vec<PredictionOutput>> {
        Ok(inputs.iter().map(|input| self.evaluate(input)).collect())
    }
}
