pub mod counterfactual;
pub mod engine;
pub mod entities;
pub mod explainer;
pub mod factory;
pub mod lime;

pub use counterfactual::{CounterfactualConfig, CounterfactualExplainer, CounterfactualGoal, CounterfactualResult};
pub use engine::ExplanationEngine;
pub use entities::{CounterfactualEntity, Entity};
pub use explainer::{ExplanationHandle, IntermediateSink, LocalExplainer, RunContext};
pub use lime::{FeatureImportance, LimeConfig, LimeExplainer, Saliency, SaliencyResults};
pub use crate::utils::error::Result;
