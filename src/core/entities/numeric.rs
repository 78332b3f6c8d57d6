use super::{
    reject_constrained, reject_outside, reject_type, scaled_distance, CounterfactualEntity,
    NumericRange,
};
use crate::domain::{Feature, FeatureDistribution, Value};
use crate::utils::error::{ExplainError, Result};
use rand::RngCore;
use std::fmt;

/// Runtime numeric representation backing a numeric entity.
pub trait NumericWidth: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    const INTEGRAL: bool;

    fn from_value(value: &Value) -> Option<Self>;
    fn into_value(self) -> Value;
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl NumericWidth for i32 {
    const INTEGRAL: bool = true;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        value.round() as i32
    }
}

impl NumericWidth for i64 {
    const INTEGRAL: bool = true;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Long(self)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round() as i64
    }
}

impl NumericWidth for f64 {
    const INTEGRAL: bool = false;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Double(self)
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

pub type IntegerEntity = NumericEntity<i32>;
pub type LongEntity = NumericEntity<i64>;
pub type DoubleEntity = NumericEntity<f64>;

/// Numeric feature searched over a closed range.
#[derive(Debug, Clone)]
pub struct NumericEntity<N: NumericWidth> {
    feature: Feature,
    original: N,
    proposed: N,
    range: NumericRange,
    constrained: bool,
    distribution: Option<FeatureDistribution>,
}

impl<N: NumericWidth> NumericEntity<N> {
    fn original_of(feature: &Feature) -> Result<N> {
        if feature.value().is_null() {
            return Err(ExplainError::NullNumericFeature {
                name: feature.name().to_string(),
            });
        }
        N::from_value(feature.value()).ok_or_else(|| reject_type(feature, feature.value()))
    }

    /// Pinned to the observed value; the range is the singleton `[v, v]`.
    pub fn fixed(feature: &Feature) -> Result<Self> {
        let original = Self::original_of(feature)?;
        Ok(Self {
            feature: feature.clone(),
            original,
            proposed: original,
            range: NumericRange::singleton(original.to_f64(), N::INTEGRAL),
            constrained: true,
            distribution: None,
        })
    }

    /// Free to move within `[lower, upper]`.
    pub fn bounded(feature: &Feature, lower: f64, upper: f64) -> Result<Self> {
        let original = Self::original_of(feature)?;
        Ok(Self {
            feature: feature.clone(),
            original,
            proposed: original,
            range: NumericRange::new(feature, lower, upper, N::INTEGRAL)?,
            constrained: false,
            distribution: None,
        })
    }

    pub fn with_distribution(mut self, distribution: FeatureDistribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    pub fn value_range(&self) -> &NumericRange {
        &self.range
    }

    pub fn proposed(&self) -> N {
        self.proposed
    }
}

impl<N: NumericWidth> CounterfactualEntity for NumericEntity<N> {
    fn original_feature(&self) -> &Feature {
        &self.feature
    }

    fn proposed_value(&self) -> Value {
        self.proposed.into_value()
    }

    fn propose(&mut self, value: Value) -> Result<()> {
        let candidate = N::from_value(&value).ok_or_else(|| reject_type(&self.feature, &value))?;
        if candidate != self.original {
            if self.constrained {
                return Err(reject_constrained(&self.feature, &value));
            }
            if !self.range.contains(candidate.to_f64()) {
                return Err(reject_outside(&self.feature, &value));
            }
        }
        self.proposed = candidate;
        Ok(())
    }

    fn reset(&mut self) {
        self.proposed = self.original;
    }

    fn distance(&self) -> f64 {
        scaled_distance(
            self.original.to_f64(),
            self.proposed.to_f64(),
            &self.range,
            self.distribution.as_ref(),
        )
    }

    fn is_constrained(&self) -> bool {
        self.constrained
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Value {
        if self.constrained {
            return self.original.into_value();
        }
        N::from_f64(self.range.sample(rng)).into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::RangeSize;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bounded_integer_starts_at_zero_distance() {
        let feature = Feature::number("age", 5);
        let entity = IntegerEntity::bounded(&feature, 0.0, 10.0).unwrap();
        assert_eq!(entity.distance(), 0.0);
        assert!(!entity.is_constrained());
        assert_eq!(entity.as_feature().value().as_number(), Some(5.0));
        assert_eq!(entity.value_range().size(), RangeSize::Finite(11));
    }

    #[test]
    fn test_propose_scales_by_range_width() {
        let feature = Feature::number("x", 2.0);
        let mut entity = DoubleEntity::bounded(&feature, 0.0, 10.0).unwrap();
        entity.propose(Value::Double(7.0)).unwrap();
        assert_eq!(entity.distance(), 0.5);
        assert!(entity.is_changed());
        assert_eq!(entity.as_feature().value(), &Value::Double(7.0));

        entity.reset();
        assert_eq!(entity.distance(), 0.0);
        assert!(!entity.is_changed());
    }

    #[test]
    fn test_propose_rejects_bad_values() {
        let feature = Feature::number("x", 5_i64);
        let mut entity = LongEntity::bounded(&feature, 0.0, 10.0).unwrap();
        assert!(entity.propose(Value::Long(11)).is_err());
        assert!(entity.propose(Value::Int(3)).is_err());
        assert!(entity.propose(Value::Long(3)).is_ok());

        let mut fixed = LongEntity::fixed(&feature).unwrap();
        assert!(fixed.is_constrained());
        assert!(fixed.propose(Value::Long(6)).is_err());
        assert!(fixed.propose(Value::Long(5)).is_ok());
    }

    #[test]
    fn test_null_value_is_rejected() {
        let feature = Feature::number("x", Value::Null);
        let err = DoubleEntity::fixed(&feature).unwrap_err();
        assert!(matches!(err, ExplainError::NullNumericFeature { .. }));
    }

    #[test]
    fn test_samples_stay_in_range() {
        let feature = Feature::number("x", 5);
        let entity = IntegerEntity::bounded(&feature, 0.0, 10.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            match entity.sample(&mut rng) {
                Value::Int(v) => assert!((0..=10).contains(&v)),
                other => panic!("unexpected sample {:?}", other),
            }
        }
        let fixed = IntegerEntity::fixed(&feature).unwrap();
        assert_eq!(fixed.sample(&mut rng), Value::Int(5));
    }
}
