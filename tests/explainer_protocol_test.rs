use async_trait::async_trait;
use local_explain::{
    CounterfactualConfig, CounterfactualExplainer, ExplainError, Feature, FeatureDistribution, FeatureDomain,
    FnModel, LimeConfig, LimeExplainer, LinearModel, LocalExplainer, Prediction, PredictionInput,
    PredictionOutput, PredictionProvider,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn loan_model() -> LinearModel {
    LinearModel::new(-5.0).with_weight("income", 1.0).with_weight("age", 0.01)
}

fn loan_input(income: f64) -> PredictionInput {
    PredictionInput::new(vec![
        Feature::number("income", income).with_domain(FeatureDomain::numerical(0.0, 20.0)),
        Feature::number("age", 40).with_domain(FeatureDomain::numerical(18.0, 90.0)),
        Feature::categorical("city", "paris"),
    ])
}

fn loan_prediction(income: f64) -> Prediction {
    let input = loan_input(income);
    let output = loan_model().evaluate(&input);
    Prediction::new(input, output)
}

/// Sleeps before delegating to the linear model and counts batches.
struct SlowModel {
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PredictionProvider for SlowModel {
    async fn predict(&self, inputs: Vec<PredictionInput>) -> local_explain::Result<Vec<PredictionOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(inputs.iter().map(|input| loan_model().evaluate(input)).collect())
    }
}

fn lime_config() -> LimeConfig {
    LimeConfig {
        samples: 200,
        batch_size: 50,
        seed: Some(7),
        ..LimeConfig::default()
    }
}

#[tokio::test]
async fn test_lime_intermediates_are_ordered_and_precede_result() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let explainer = LimeExplainer::new(lime_config());

    let handle = explainer.explain_async_with(
        &loan_prediction(2.0),
        Arc::new(loan_model()),
        Box::new(move |partial| recorder.lock().unwrap().push(partial.samples)),
    );
    let result = handle.await.unwrap();

    // every batch is reported before the handle resolves
    assert_eq!(*seen.lock().unwrap(), vec![50, 100, 150, 200]);
    assert_eq!(result.samples, 200);
}

#[tokio::test]
async fn test_counterfactual_intermediates_improve_monotonically() {
    let ids = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&ids);
    let explainer = CounterfactualExplainer::new(CounterfactualConfig {
        seed: Some(3),
        ..CounterfactualConfig::default()
    });

    let handle = explainer.explain_async_with(
        &loan_prediction(2.0),
        Arc::new(loan_model()),
        Box::new(move |partial| recorder.lock().unwrap().push(partial.solution_id)),
    );
    let result = handle.await.unwrap();

    let ids = ids.lock().unwrap().clone();
    assert!(!ids.is_empty());
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ids.last().copied(), Some(result.solution_id));
    assert!(result.valid);
}

#[tokio::test]
async fn test_cancel_stops_deliveries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let model = Arc::new(SlowModel {
        delay: Duration::from_millis(10),
        calls: Arc::clone(&calls),
    });
    let explainer = LimeExplainer::new(LimeConfig {
        samples: 10_000,
        batch_size: 10,
        ..lime_config()
    });

    let handle = explainer.explain_async_with(
        &loan_prediction(2.0),
        model,
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    tokio::time::sleep(Duration::from_millis(35)).await;
    handle.cancel();
    let at_cancel = delivered.load(Ordering::SeqCst);

    assert!(matches!(handle.await, Err(ExplainError::Cancelled)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), at_cancel);
}

#[tokio::test]
async fn test_cancelled_handle_never_yields_value() {
    let explainer = LimeExplainer::new(lime_config());
    let handle = explainer.explain_async(&loan_prediction(2.0), Arc::new(loan_model()));
    handle.cancel();
    assert!(handle.is_cancelled());
    assert!(matches!(handle.await, Err(ExplainError::Cancelled)));
}

#[tokio::test]
async fn test_dropping_handle_stops_model_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(SlowModel {
        delay: Duration::from_millis(10),
        calls: Arc::clone(&calls),
    });
    let explainer = CounterfactualExplainer::new(CounterfactualConfig {
        max_iterations: 10_000,
        ..CounterfactualConfig::default()
    });

    let handle = explainer.explain_async(&loan_prediction(2.0), model);
    tokio::time::sleep(Duration::from_millis(35)).await;
    drop(handle);
    let at_drop = calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(calls.load(Ordering::SeqCst) <= at_drop + 1);
}

#[tokio::test]
async fn test_model_failure_propagates() {
    let failing = Arc::new(FnModel::new(|_input: &PredictionInput| {
        Err(ExplainError::model("scoring service unavailable"))
    }));

    let lime = LimeExplainer::new(lime_config()).explain_async(&loan_prediction(2.0), failing.clone());
    let counterfactual = CounterfactualExplainer::default().explain_async(&loan_prediction(2.0), failing);

    let (lime, counterfactual) = tokio::join!(lime, counterfactual);
    assert!(matches!(lime, Err(ExplainError::ModelFailure { .. })));
    assert!(matches!(counterfactual, Err(ExplainError::ModelFailure { .. })));
}

#[tokio::test]
async fn test_encoding_failure_resolves_without_running() {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(SlowModel {
        delay: Duration::ZERO,
        calls: Arc::clone(&calls),
    });
    let input = PredictionInput::new(vec![Feature::number("income", local_explain::Value::Null)]);
    let prediction = Prediction::new(input, PredictionOutput::new(Vec::new()));

    let handle = CounterfactualExplainer::default().explain_async(&prediction, model);
    assert!(handle.is_finished());
    assert!(matches!(handle.await, Err(ExplainError::NullNumericFeature { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let explainer = CounterfactualExplainer::new(CounterfactualConfig {
        seed: Some(11),
        ..CounterfactualConfig::default()
    });
    let model: Arc<dyn PredictionProvider> = Arc::new(loan_model());
    let first = loan_prediction(1.0);
    let second = loan_prediction(3.0);

    let seen_first = Arc::new(Mutex::new(Vec::new()));
    let seen_second = Arc::new(Mutex::new(Vec::new()));
    let (a, b) = (Arc::clone(&seen_first), Arc::clone(&seen_second));

    let h1 = explainer.explain_async_with(
        &first,
        Arc::clone(&model),
        Box::new(move |p| a.lock().unwrap().push(p.execution_id)),
    );
    let h2 = explainer.explain_async_with(
        &second,
        Arc::clone(&model),
        Box::new(move |p| b.lock().unwrap().push(p.execution_id)),
    );
    assert_ne!(h1.run_id(), h2.run_id());

    let (r1, r2) = tokio::join!(h1, h2);
    assert_eq!(r1.unwrap().execution_id, first.execution_id);
    assert_eq!(r2.unwrap().execution_id, second.execution_id);
    assert!(seen_first.lock().unwrap().iter().all(|id| *id == first.execution_id));
    assert!(seen_second.lock().unwrap().iter().all(|id| *id == second.execution_id));
}

#[tokio::test]
async fn test_unbounded_numeric_domain_fails_before_running() {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(SlowModel {
        delay: Duration::ZERO,
        calls: Arc::clone(&calls),
    });
    let input = PredictionInput::new(vec![
        Feature::number("income", 2.0).with_domain(FeatureDomain::numerical(-f64::MAX, f64::MAX)),
    ]);
    let prediction = Prediction::new(input.clone(), loan_model().evaluate(&input));

    let counterfactual = CounterfactualExplainer::default().explain_async(&prediction, model.clone());
    assert!(counterfactual.is_finished());
    assert!(matches!(counterfactual.await, Err(ExplainError::InvalidValue { .. })));

    let lime = LimeExplainer::new(lime_config()).explain_async(&prediction, model);
    assert!(lime.is_finished());
    assert!(matches!(lime.await, Err(ExplainError::InvalidValue { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_distributions_shape_counterfactual_distance() {
    let input = PredictionInput::new(vec![
        Feature::number("income", 2.0).with_domain(FeatureDomain::numerical(0.0, 20.0)),
        Feature::number("age", 40),
    ]);
    let prediction = Prediction::new(input.clone(), loan_model().evaluate(&input));
    // 收入的觀測分布很窄 (σ = 0.5)，距離被放大
    let narrow = FeatureDistribution::new(&input.features[0], vec![1.5, 2.5]);
    let explainer = CounterfactualExplainer::new(CounterfactualConfig {
        seed: Some(3),
        ..CounterfactualConfig::default()
    })
    .with_distributions(vec![narrow]);

    let result = explainer.explain_async(&prediction, Arc::new(loan_model())).await.unwrap();
    assert!(result.valid);
    let proposed = result.features[0].value().as_number().unwrap();
    assert!(proposed > 2.0);
    assert!((result.distance - (proposed - 2.0) / 0.5).abs() < 1e-6);
}
