use crate::domain::feature::{Feature, Type};
use crate::domain::value::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered model input. Feature positions are significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub features: Vec<Feature>,
}

impl PredictionInput {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name() == name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// One named model output with its confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    #[serde(rename = "type")]
    pub output_type: Type,
    pub value: Value,
    pub score: f64,
}

impl Output {
    pub fn new(name: impl Into<String>, output_type: Type, value: impl Into<Value>, score: f64) -> Self {
        Self {
            name: name.into(),
            output_type,
            value: value.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutput {
    pub outputs: Vec<Output>,
}

impl PredictionOutput {
    pub fn new(outputs: Vec<Output>) -> Self {
        Self { outputs }
    }

    pub fn by_name(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// An input together with the output the model originally produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub execution_id: Uuid,
    pub input: PredictionInput,
    pub output: PredictionOutput,
}

impl Prediction {
    pub fn new(input: PredictionInput, output: PredictionOutput) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            input,
            output,
        }
    }
}
