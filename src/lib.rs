pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;
pub use crate::config::TomlConfig;

pub use crate::adapters::{FnModel, LinearModel};
pub use crate::core::{
    factory, CounterfactualConfig, CounterfactualEntity, CounterfactualExplainer, CounterfactualGoal,
    CounterfactualResult, Entity, ExplanationEngine, ExplanationHandle, IntermediateSink, LimeConfig,
    LimeExplainer, LocalExplainer, SaliencyResults,
};
pub use crate::domain::{
    Feature, FeatureDistribution, FeatureDomain, Output, Prediction, PredictionInput, PredictionOutput,
    PredictionProvider, Type, Value,
};
pub use crate::utils::error::{ExplainError, Result};
