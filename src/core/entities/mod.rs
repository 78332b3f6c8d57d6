//! Searchable encodings of features.
//!
//! Every feature kind maps to one concrete entity type. An entity keeps the
//! original feature, a mutable proposed value and the admissible domain, and
//! reports a normalized distance between proposal and original:
//!
//! - numeric, duration and time entities scale the absolute change by the
//!   width of their range (`|p - o| / (upper - lower)`), or by the standard
//!   deviation of an attached [`FeatureDistribution`];
//! - categorical numbers scale by the spread of their categories;
//! - every other kind uses a 0/1 mismatch.
//!
//! A freshly built entity always has distance `0.0`.

mod categorical;
mod fixed;
mod numeric;
mod temporal;

pub use categorical::{
    BinaryEntity, CategoricalEntity, CategoricalNumericalEntity, CategoryValue, CurrencyEntity,
    EnumeratedEntity, ObjectEntity, UriEntity,
};
pub use fixed::{BooleanEntity, TextEntity};
pub use numeric::{DoubleEntity, IntegerEntity, LongEntity, NumericEntity, NumericWidth};
pub use temporal::{DurationEntity, TimeEntity};

use crate::domain::{Feature, FeatureDistribution, Value};
use crate::utils::error::{ExplainError, Result};
use rand::{Rng, RngCore};
use std::fmt;

/// Behaviour shared by every searchable feature encoding.
pub trait CounterfactualEntity: fmt::Debug + Send + Sync {
    fn original_feature(&self) -> &Feature;

    fn proposed_value(&self) -> Value;

    /// Replace the proposed value. Fails when the value has the wrong type,
    /// lies outside the domain, or differs from the original on a constrained
    /// entity. Proposing the original value always succeeds.
    fn propose(&mut self, value: Value) -> Result<()>;

    /// Restore the original value.
    fn reset(&mut self);

    fn distance(&self) -> f64;

    fn is_constrained(&self) -> bool;

    /// Draw an admissible value. Constrained entities return their original value.
    fn sample(&self, rng: &mut dyn RngCore) -> Value;

    fn similarity(&self) -> f64 {
        1.0 - self.distance().min(1.0)
    }

    fn is_changed(&self) -> bool {
        &self.proposed_value() != self.original_feature().value()
    }

    fn name(&self) -> &str {
        self.original_feature().name()
    }

    /// The original feature carrying the proposed value.
    fn as_feature(&self) -> Feature {
        self.original_feature().with_value(self.proposed_value())
    }
}

/// Cardinality of an admissible set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSize {
    Finite(usize),
    Continuous,
}

/// Closed numeric interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    lower: f64,
    upper: f64,
    integral: bool,
}

impl NumericRange {
    pub(crate) fn new(feature: &Feature, lower: f64, upper: f64, integral: bool) -> Result<Self> {
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(ExplainError::invalid_value(
                feature.name(),
                format!("invalid range [{}, {}]", lower, upper),
            ));
        }
        // 寬度溢位時無法取樣也無法正規化距離
        if !(upper - lower).is_finite() {
            return Err(ExplainError::invalid_value(
                feature.name(),
                format!("range [{}, {}] is too wide", lower, upper),
            ));
        }
        if integral && lower.ceil() > upper.floor() {
            return Err(ExplainError::invalid_value(
                feature.name(),
                format!("range [{}, {}] contains no integer", lower, upper),
            ));
        }
        Ok(Self {
            lower,
            upper,
            integral,
        })
    }

    pub(crate) fn singleton(value: f64, integral: bool) -> Self {
        Self {
            lower: value,
            upper: value,
            integral,
        }
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        let inside = value >= self.lower && value <= self.upper;
        if self.integral {
            inside && value.fract() == 0.0
        } else {
            inside
        }
    }

    pub fn size(&self) -> RangeSize {
        if self.integral {
            let count = (self.upper.floor() - self.lower.ceil()).max(-1.0) + 1.0;
            RangeSize::Finite(count as usize)
        } else if self.lower == self.upper {
            RangeSize::Finite(1)
        } else {
            RangeSize::Continuous
        }
    }

    pub(crate) fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        if self.integral {
            let low = self.lower.ceil() as i64;
            let high = self.upper.floor() as i64;
            if low >= high {
                return low as f64;
            }
            rng.gen_range(low..=high) as f64
        } else if self.lower == self.upper {
            self.lower
        } else {
            rng.gen_range(self.lower..=self.upper)
        }
    }
}

pub(crate) fn scaled_distance(
    original: f64,
    proposed: f64,
    range: &NumericRange,
    distribution: Option<&FeatureDistribution>,
) -> f64 {
    let delta = (proposed - original).abs();
    if delta == 0.0 {
        return 0.0;
    }
    if let Some(std_dev) = distribution.map(|d| d.std_dev()).filter(|s| *s > 0.0) {
        return delta / std_dev;
    }
    let width = range.width();
    if width > 0.0 {
        delta / width
    } else {
        delta
    }
}

pub(crate) fn reject_constrained(feature: &Feature, value: &Value) -> ExplainError {
    ExplainError::invalid_value(
        feature.name(),
        format!("feature is constrained, cannot propose {}", value),
    )
}

pub(crate) fn reject_type(feature: &Feature, value: &Value) -> ExplainError {
    ExplainError::invalid_value(
        feature.name(),
        format!("{} is not a valid {} value", value, feature.feature_type()),
    )
}

pub(crate) fn reject_outside(feature: &Feature, value: &Value) -> ExplainError {
    ExplainError::invalid_value(feature.name(), format!("{} is outside the feature domain", value))
}

/// Closed set of concrete entities, one variant per feature kind.
#[derive(Debug, Clone)]
pub enum Entity {
    Integer(IntegerEntity),
    Long(LongEntity),
    Double(DoubleEntity),
    Boolean(BooleanEntity),
    Categorical(CategoricalEntity),
    CategoricalNumerical(CategoricalNumericalEntity),
    Binary(BinaryEntity),
    Currency(CurrencyEntity),
    Duration(DurationEntity),
    Time(TimeEntity),
    Uri(UriEntity),
    Text(TextEntity),
    Object(ObjectEntity),
}

macro_rules! dispatch {
    ($entity:expr, $inner:ident => $body:expr) => {
        match $entity {
            Entity::Integer($inner) => $body,
            Entity::Long($inner) => $body,
            Entity::Double($inner) => $body,
            Entity::Boolean($inner) => $body,
            Entity::Categorical($inner) => $body,
            Entity::CategoricalNumerical($inner) => $body,
            Entity::Binary($inner) => $body,
            Entity::Currency($inner) => $body,
            Entity::Duration($inner) => $body,
            Entity::Time($inner) => $body,
            Entity::Uri($inner) => $body,
            Entity::Text($inner) => $body,
            Entity::Object($inner) => $body,
        }
    };
}

impl Entity {
    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Integer(_) => "integer",
            Entity::Long(_) => "long",
            Entity::Double(_) => "double",
            Entity::Boolean(_) => "boolean",
            Entity::Categorical(_) => "categorical",
            Entity::CategoricalNumerical(_) => "categorical-numerical",
            Entity::Binary(_) => "binary",
            Entity::Currency(_) => "currency",
            Entity::Duration(_) => "duration",
            Entity::Time(_) => "time",
            Entity::Uri(_) => "uri",
            Entity::Text(_) => "text",
            Entity::Object(_) => "object",
        }
    }
}

impl CounterfactualEntity for Entity {
    fn original_feature(&self) -> &Feature {
        dispatch!(self, e => e.original_feature())
    }

    fn proposed_value(&self) -> Value {
        dispatch!(self, e => e.proposed_value())
    }

    fn propose(&mut self, value: Value) -> Result<()> {
        dispatch!(self, e => e.propose(value))
    }

    fn reset(&mut self) {
        dispatch!(self, e => e.reset())
    }

    fn distance(&self) -> f64 {
        dispatch!(self, e => e.distance())
    }

    fn is_constrained(&self) -> bool {
        dispatch!(self, e => e.is_constrained())
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Value {
        dispatch!(self, e => e.sample(rng))
    }
}
