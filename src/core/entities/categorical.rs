use super::{reject_constrained, reject_outside, reject_type, CounterfactualEntity};
use crate::domain::{CategorySet, Currency, Feature, Uri, Value};
use crate::utils::error::Result;
use rand::seq::SliceRandom;
use rand::RngCore;
use std::fmt;

/// A value type that can be enumerated as a category.
pub trait CategoryValue: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    fn from_value(value: &Value) -> Option<Self>;
    fn into_value(self) -> Value;
}

impl CategoryValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }

    fn into_value(self) -> Value {
        self
    }
}

impl CategoryValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Binary(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Binary(self)
    }
}

impl CategoryValue for Currency {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Currency(c) => Some(c.clone()),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Currency(self)
    }
}

impl CategoryValue for Uri {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uri(u) => Some(u.clone()),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Uri(self)
    }
}

pub type CategoricalEntity = EnumeratedEntity<Value>;
pub type ObjectEntity = EnumeratedEntity<Value>;
pub type BinaryEntity = EnumeratedEntity<Vec<u8>>;
pub type CurrencyEntity = EnumeratedEntity<Currency>;
pub type UriEntity = EnumeratedEntity<Uri>;

/// Feature searched over a finite set of candidate values.
#[derive(Debug, Clone)]
pub struct EnumeratedEntity<T: CategoryValue> {
    feature: Feature,
    original: T,
    proposed: T,
    categories: CategorySet<T>,
    constrained: bool,
}

impl<T: CategoryValue> EnumeratedEntity<T> {
    fn original_of(feature: &Feature) -> Result<T> {
        T::from_value(feature.value()).ok_or_else(|| reject_type(feature, feature.value()))
    }

    /// Pinned to the observed value, which is the only category.
    pub fn fixed(feature: &Feature) -> Result<Self> {
        let original = Self::original_of(feature)?;
        Ok(Self {
            feature: feature.clone(),
            categories: CategorySet::new([original.clone()]),
            proposed: original.clone(),
            original,
            constrained: true,
        })
    }

    /// Free to take any of `categories`. An empty set pins the entity.
    pub fn with_categories(feature: &Feature, categories: CategorySet<T>) -> Result<Self> {
        if categories.is_empty() {
            return Self::fixed(feature);
        }
        let original = Self::original_of(feature)?;
        Ok(Self {
            feature: feature.clone(),
            proposed: original.clone(),
            original,
            categories,
            constrained: false,
        })
    }

    /// The admissible categories.
    pub fn recover_set(&self) -> &CategorySet<T> {
        &self.categories
    }

    pub fn proposed(&self) -> &T {
        &self.proposed
    }
}

impl<T: CategoryValue> CounterfactualEntity for EnumeratedEntity<T> {
    fn original_feature(&self) -> &Feature {
        &self.feature
    }

    fn proposed_value(&self) -> Value {
        self.proposed.clone().into_value()
    }

    fn propose(&mut self, value: Value) -> Result<()> {
        let candidate = T::from_value(&value).ok_or_else(|| reject_type(&self.feature, &value))?;
        if candidate != self.original {
            if self.constrained {
                return Err(reject_constrained(&self.feature, &value));
            }
            if !self.categories.contains(&candidate) {
                return Err(reject_outside(&self.feature, &value));
            }
        }
        self.proposed = candidate;
        Ok(())
    }

    fn reset(&mut self) {
        self.proposed = self.original.clone();
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
            return self.original.clone().into_value();
        }
        self.categories
            .as_slice()
            .choose(rng)
            .unwrap_or(&self.original)
            .clone()
            .into_value()
    }
}

/// Categorical feature whose categories are numbers. Distances compare the
/// numbers, scaled by the spread of the category set.
#[derive(Debug, Clone)]
pub struct CategoricalNumericalEntity {
    feature: Feature,
    original: Value,
    proposed: Value,
    categories: CategorySet<Value>,
    spread: f64,
    constrained: bool,
}

impl CategoricalNumericalEntity {
    pub fn with_categories(feature: &Feature, categories: CategorySet<Value>) -> Result<Self> {
        let original = feature.value().clone();
        if !original.is_numeric() {
            return Err(reject_type(feature, &original));
        }
        if let Some(bad) = categories.iter().find(|c| !c.is_numeric()) {
            return Err(reject_type(feature, bad));
        }

        let numbers: Vec<f64> = categories.iter().filter_map(Value::as_number).collect();
        let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let spread = if numbers.is_empty() { 0.0 } else { max - min };

        Ok(Self {
            feature: feature.clone(),
            proposed: original.clone(),
            original,
            constrained: categories.is_empty(),
            categories,
            spread,
        })
    }

    pub fn recover_set(&self) -> &CategorySet<Value> {
        &self.categories
    }

    pub fn proposed(&self) -> &Value {
        &self.proposed
    }
}

impl CounterfactualEntity for CategoricalNumericalEntity {
    fn original_feature(&self) -> &Feature {
        &self.feature
    }

    fn proposed_value(&self) -> Value {
        self.proposed.clone()
    }

    fn propose(&mut self, value: Value) -> Result<()> {
        if !value.is_numeric() {
            return Err(reject_type(&self.feature, &value));
        }
        if value != self.original {
            if self.constrained {
                return Err(reject_constrained(&self.feature, &value));
            }
            if !self.categories.contains(&value) {
                return Err(reject_outside(&self.feature, &value));
            }
        }
        self.proposed = value;
        Ok(())
    }

    fn reset(&mut self) {
        self.proposed = self.original.clone();
    }

    fn distance(&self) -> f64 {
        let (Some(original), Some(proposed)) = (self.original.as_number(), self.proposed.as_number())
        else {
            return 0.0;
        };
        let delta = (proposed - original).abs();
        if delta == 0.0 {
            0.0
        } else if self.spread > 0.0 {
            delta / self.spread
        } else {
            1.0
        }
    }

    fn is_constrained(&self) -> bool {
        self.constrained
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Value {
        if self.constrained {
            return self.original.clone();
        }
        self.categories
            .as_slice()
            .choose(rng)
            .unwrap_or(&self.original)
            .clone()
    }
}
