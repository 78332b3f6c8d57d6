use super::{reject_constrained, reject_type, CounterfactualEntity};
use crate::domain::{Feature, Value};
use crate::utils::error::Result;
use rand::{Rng, RngCore};

#[derive(Debug, Clone)]
pub struct BooleanEntity {
    feature: Feature,
    original: bool,
    proposed: bool,
    constrained: bool,
}

impl BooleanEntity {
    pub fn new(feature: &Feature, constrained: bool) -> Result<Self> {
        let original = feature
            .value()
            .as_bool()
            .ok_or_else(|| reject_type(feature, feature.value()))?;
        Ok(Self {
            feature: feature.clone(),
            original,
            proposed: original,
            constrained,
        })
    }

    pub fn proposed(&self) -> bool {
        self.proposed
    }
}

impl CounterfactualEntity for BooleanEntity {
    fn original_feature(&self) -> &Feature {
        &self.feature
    }

    fn proposed_value(&self) -> Value {
        Value::Bool(self.proposed)
    }

    fn propose(&mut self, value: Value) -> Result<()> {
        let candidate = value.as_bool().ok_or_else(|| reject_type(&self.feature, &value))?;
        if self.constrained && candidate != self.original {
            return Err(reject_constrained(&self.feature, &value));
        }
        self.proposed = candidate;
        Ok(())
    }

    fn reset(&mut self) {
        self.proposed = self.original;
    }

    fn distance(&self) -> f64 {
        if self.proposed == self.original {
            0.0
        } else {
            1.0
        }
    }

    fn is_constrained(&self) -> bool {
        self.constrained
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Value {
        if self.constrained {
            return Value::Bool(self.original);
        }
        Value::Bool(rng.gen_bool(0.5))
    }
}

/// Free text is never searched.
#[derive(Debug, Clone)]
pub struct TextEntity {
    feature: Feature,
}

impl TextEntity {
    pub fn new(feature: &Feature) -> Result<Self> {
        match feature.value() {
            Value::Text(_) => Ok(Self {
                feature: feature.clone(),
            }),
            other => Err(reject_type(feature, other)),
        }
    }
}

impl CounterfactualEntity for TextEntity {
    fn original_feature(&self) -> &Feature {
        &self.feature
    }

    fn proposed_value(&self) -> Value {
        self.feature.value().clone()
    }

    fn propose(&mut self, value: Value) -> Result<()> {
        if &value == self.feature.value() {
            Ok(())
        } else {
            Err(reject_constrained(&self.feature, &value))
        }
    }

    fn reset(&mut self) {}

    fn distance(&self) -> f64 {
        0.0
    }

    fn is_constrained(&self) -> bool {
        true
    }

    fn sample(&self, _rng: &mut dyn RngCore) -> Value {
        self.feature.value().clone()
    }
}
