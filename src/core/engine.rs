use crate::core::explainer::{ExplanationHandle, IntermediateSink, LocalExplainer};
use crate::domain::{Prediction, PredictionProvider};
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Runs one explainer against a shared model capability.
pub struct ExplanationEngine<E: LocalExplainer> {
    explainer: E,
    model: Arc<dyn PredictionProvider>,
    timeout: Option<Duration>,
}

impl<E: LocalExplainer> ExplanationEngine<E> {
    pub fn new(explainer: E, model: Arc<dyn PredictionProvider>) -> Self {
        Self {
            explainer,
            model,
            timeout: None,
        }
    }

    /// Cancel runs that have not finished within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn explainer(&self) -> &E {
        &self.explainer
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn explain(&self, prediction: &Prediction) -> Result<E::Explanation> {
        let handle = self.explainer.explain_async(prediction, Arc::clone(&self.model));
        self.finish(handle, self.deadline()).await
    }

    pub async fn explain_with(
        &self,
        prediction: &Prediction,
        sink: IntermediateSink<E::Explanation>,
    ) -> Result<E::Explanation> {
        let handle = self
            .explainer
            .explain_async_with(prediction, Arc::clone(&self.model), sink);
        self.finish(handle, self.deadline()).await
    }

    /// Explain every prediction concurrently.
    ///
    /// All runs start before any is awaited and share one deadline. Results
    /// come back in input order; a failing run does not affect the others.
    pub async fn explain_all(&self, predictions: &[Prediction]) -> Vec<Result<E::Explanation>> {
        let deadline = self.deadline();
        let handles: Vec<_> = predictions
            .iter()
            .map(|p| self.explainer.explain_async(p, Arc::clone(&self.model)))
            .collect();
        tracing::info!(runs = handles.len(), "explaining predictions");

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(self.finish(handle, deadline).await);
        }
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(failed, total = results.len(), "some explanations did not complete");
        }
        results
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }

    async fn finish(
        &self,
        handle: ExplanationHandle<E::Explanation>,
        deadline: Option<Instant>,
    ) -> Result<E::Explanation> {
        match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                handle.wait_timeout(remaining).await
            }
            None => handle.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FnModel, LinearModel};
    use crate::core::counterfactual::{CounterfactualConfig, CounterfactualExplainer};
    use crate::domain::{Feature, FeatureDomain, PredictionInput, PredictionOutput};
    use crate::utils::error::ExplainError;

    fn prediction(income: f64) -> Prediction {
        let input = PredictionInput::new(vec![
            Feature::number("income", income).with_domain(FeatureDomain::numerical(0.0, 10.0)),
        ]);
        let output = LinearModel::new(-5.0).with_weight("income", 1.0).evaluate(&input);
        Prediction::new(input, output)
    }

    fn explainer() -> CounterfactualExplainer {
        CounterfactualExplainer::new(CounterfactualConfig {
            seed: Some(3),
            max_iterations: 20,
            ..CounterfactualConfig::default()
        })
    }

    #[tokio::test]
    async fn test_explain_all_keeps_input_order() {
        let model = Arc::new(LinearModel::new(-5.0).with_weight("income", 1.0));
        let engine = ExplanationEngine::new(explainer(), model);
        let predictions = vec![prediction(1.0), prediction(2.0), prediction(3.0)];

        let results = engine.explain_all(&predictions).await;
        assert_eq!(results.len(), 3);
        for (prediction, result) in predictions.iter().zip(&results) {
            assert_eq!(result.as_ref().unwrap().execution_id, prediction.execution_id);
        }
    }

    struct SlowModel;

    #[async_trait::async_trait]
    impl PredictionProvider for SlowModel {
        async fn predict(&self, inputs: Vec<PredictionInput>) -> Result<Vec<PredictionOutput>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(inputs.iter().map(|_| PredictionOutput::new(vec![])).collect())
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let model = Arc::new(FnModel::new(|_: &PredictionInput| Ok(PredictionOutput::new(vec![]))));
        let engine = ExplanationEngine::new(explainer(), model);
        let bad = Prediction::new(
            PredictionInput::new(vec![
                Feature::text("t", "x").with_domain(FeatureDomain::categorical(["x", "y"]))
            ]),
            PredictionOutput::new(vec![]),
        );
        let results = engine.explain_all(&[bad, prediction(1.0)]).await;
        assert!(matches!(results[0], Err(ExplainError::UnsupportedFeatureType { .. })));
        assert!(results[1].is_ok());
    }

    #[tokio::test]
    async fn test_timeout_cancels_slow_model() {
        let engine =
            ExplanationEngine::new(explainer(), Arc::new(SlowModel)).with_timeout(Duration::from_millis(30));
        let result = engine.explain(&prediction(1.0)).await;
        assert!(matches!(result, Err(ExplainError::Cancelled)));
    }
}
