use super::{
    reject_constrained, reject_outside, reject_type, scaled_distance, CounterfactualEntity,
    NumericRange,
};
use crate::domain::{Feature, FeatureDistribution, Value};
use crate::utils::error::Result;
use chrono::{NaiveTime, Timelike};
use rand::RngCore;
use std::time::Duration;

const SECONDS_PER_DAY: f64 = 86_400.0;
const LAST_INSTANT_OF_DAY: f64 = SECONDS_PER_DAY - 1e-9;

/// Duration feature searched over a range measured in seconds.
#[derive(Debug, Clone)]
pub struct DurationEntity {
    feature: Feature,
    original: Duration,
    proposed: Duration,
    range: NumericRange,
    constrained: bool,
    distribution: Option<FeatureDistribution>,
}

impl DurationEntity {
    fn original_of(feature: &Feature) -> Result<Duration> {
        match feature.value() {
            Value::Duration(d) => Ok(*d),
            other => Err(reject_type(feature, other)),
        }
    }

    pub fn fixed(feature: &Feature) -> Result<Self> {
        let original = Self::original_of(feature)?;
        Ok(Self {
            feature: feature.clone(),
            original,
            proposed: original,
            range: NumericRange::singleton(original.as_secs_f64(), false),
            constrained: true,
            distribution: None,
        })
    }

    pub fn bounded(feature: &Feature, lower: Duration, upper: Duration) -> Result<Self> {
        let original = Self::original_of(feature)?;
        Ok(Self {
            feature: feature.clone(),
            original,
            proposed: original,
            range: NumericRange::new(feature, lower.as_secs_f64(), upper.as_secs_f64(), false)?,
            constrained: false,
            distribution: None,
        })
    }

    /// Scale distances by the spread of observed durations (in seconds).
    pub fn with_distribution(mut self, distribution: FeatureDistribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    /// Admissible range in seconds.
    pub fn value_range(&self) -> &NumericRange {
        &self.range
    }

    pub fn contains(&self, duration: &Duration) -> bool {
        self.range.contains(duration.as_secs_f64())
    }

    pub fn proposed(&self) -> Duration {
        self.proposed
    }
}

impl CounterfactualEntity for DurationEntity {
    fn original_feature(&self) -> &Feature {
        &self.feature
    }

    fn proposed_value(&self) -> Value {
        Value::Duration(self.proposed)
    }

    fn propose(&mut self, value: Value) -> Result<()> {
        let candidate = match &value {
            Value::Duration(d) => *d,
            other => return Err(reject_type(&self.feature, other)),
        };
        if candidate != self.original {
            if self.constrained {
                return Err(reject_constrained(&self.feature, &value));
            }
            if !self.contains(&candidate) {
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
            self.original.as_secs_f64(),
            self.proposed.as_secs_f64(),
            &self.range,
            self.distribution.as_ref(),
        )
    }

    fn is_constrained(&self) -> bool {
        self.constrained
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Value {
        if self.constrained {
            return Value::Duration(self.original);
        }
        Value::Duration(Duration::from_secs_f64(self.range.sample(rng).max(0.0)))
    }
}

fn seconds_of_day(time: &NaiveTime) -> f64 {
    f64::from(time.num_seconds_from_midnight()) + f64::from(time.nanosecond()) / 1e9
}

fn time_of_day(seconds: f64) -> Option<NaiveTime> {
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0);
    NaiveTime::from_num_seconds_from_midnight_opt(whole as u32, nanos as u32)
}

/// Time-of-day feature searched over a range measured in seconds since midnight.
///
/// A range whose lower bound comes after its upper bound wraps past midnight
/// and is widened to the whole day.
#[derive(Debug, Clone)]
pub struct TimeEntity {
    feature: Feature,
    original: NaiveTime,
    proposed: NaiveTime,
    range: NumericRange,
    constrained: bool,
}

impl TimeEntity {
    fn original_of(feature: &Feature) -> Result<NaiveTime> {
        match feature.value() {
            Value::Time(t) => Ok(*t),
            other => Err(reject_type(feature, other)),
        }
    }

    pub fn fixed(feature: &Feature) -> Result<Self> {
        let original = Self::original_of(feature)?;
        Ok(Self {
            feature: feature.clone(),
            original,
            proposed: original,
            range: NumericRange::singleton(seconds_of_day(&original), false),
            constrained: true,
        })
    }

    pub fn bounded(feature: &Feature, lower: NaiveTime, upper: NaiveTime) -> Result<Self> {
        let original = Self::original_of(feature)?;
        let range = if lower <= upper {
            NumericRange::new(feature, seconds_of_day(&lower), seconds_of_day(&upper), false)?
        } else {
            NumericRange::new(feature, 0.0, LAST_INSTANT_OF_DAY, false)?
        };
        Ok(Self {
            feature: feature.clone(),
            original,
            proposed: original,
            range,
            constrained: false,
        })
    }

    /// Admissible range in seconds since midnight.
    pub fn value_range(&self) -> &NumericRange {
        &self.range
    }

    pub fn contains(&self, time: &NaiveTime) -> bool {
        self.range.contains(seconds_of_day(time))
    }

    pub fn proposed(&self) -> NaiveTime {
        self.proposed
    }
}

impl CounterfactualEntity for TimeEntity {
    fn original_feature(&self) -> &Feature {
        &self.feature
    }

    fn proposed_value(&self) -> Value {
        Value::Time(self.proposed)
    }

    fn propose(&mut self, value: Value) -> Result<()> {
        let candidate = match &value {
            Value::Time(t) => *t,
            other => return Err(reject_type(&self.feature, other)),
        };
        if candidate != self.original {
            if self.constrained {
                return Err(reject_constrained(&self.feature, &value));
            }
            if !self.contains(&candidate) {
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
            seconds_of_day(&self.original),
            seconds_of_day(&self.proposed),
            &self.range,
            None,
        )
    }

    fn is_constrained(&self) -> bool {
        self.constrained
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Value {
        if self.constrained {
            return Value::Time(self.original);
        }
        let drawn = time_of_day(self.range.sample(rng)).unwrap_or(self.original);
        Value::Time(drawn)
    }
}
