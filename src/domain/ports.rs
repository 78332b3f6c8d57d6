use crate::domain::model::{PredictionInput, PredictionOutput};
use crate::utils::error::Result;
use async_trait::async_trait;

/// The opaque model under explanation.
///
/// `predict` is a pure batch function: the i-th output belongs to the i-th
/// input. Explainers call it concurrently from independent runs without any
/// serialization, so implementations wrapping a non thread-safe model must
/// pool or lock internally.
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    async fn predict(&self, inputs: Vec<PredictionInput>) -> Result<Vec<PredictionOutput>>;
}
