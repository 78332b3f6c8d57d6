use crate::domain::feature_domain::FeatureDomain;
use crate::domain::value::{Currency, Uri, Value};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The semantic kind of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    Number,
    Boolean,
    Categorical,
    Currency,
    Duration,
    Text,
    Time,
    Uri,
    Binary,
    Undefined,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Number => "number",
            Type::Boolean => "boolean",
            Type::Categorical => "categorical",
            Type::Currency => "currency",
            Type::Duration => "duration",
            Type::Text => "text",
            Type::Time => "time",
            Type::Uri => "uri",
            Type::Binary => "binary",
            Type::Undefined => "undefined",
        };
        f.write_str(name)
    }
}

/// One named, typed input dimension.
///
/// Features are immutable: proposing a different value yields a new feature
/// through [`Feature::with_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    name: String,
    #[serde(rename = "type")]
    feature_type: Type,
    value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    domain: Option<FeatureDomain>,
}

impl Feature {
    pub fn new(name: impl Into<String>, feature_type: Type, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            feature_type,
            value: value.into(),
            domain: None,
        }
    }

    pub fn number(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Type::Number, value)
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, Type::Boolean, value)
    }

    pub fn categorical(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Type::Categorical, value)
    }

    /// A categorical feature whose categories are numbers.
    pub fn categorical_numerical(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Type::Categorical, value)
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Type::Text, Value::Text(value.into()))
    }

    pub fn currency(name: impl Into<String>, value: Currency) -> Self {
        Self::new(name, Type::Currency, value)
    }

    pub fn binary(name: impl Into<String>, value: Vec<u8>) -> Self {
        Self::new(name, Type::Binary, value)
    }

    pub fn duration(name: impl Into<String>, value: Duration) -> Self {
        Self::new(name, Type::Duration, value)
    }

    pub fn time(name: impl Into<String>, value: NaiveTime) -> Self {
        Self::new(name, Type::Time, value)
    }

    pub fn uri(name: impl Into<String>, value: Uri) -> Self {
        Self::new(name, Type::Uri, value)
    }

    /// An opaque feature; its type is [`Type::Undefined`].
    pub fn object(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Type::Undefined, value)
    }

    pub fn with_domain(mut self, domain: FeatureDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    /// A copy of this feature carrying `value` instead of the current one.
    pub fn with_value(&self, value: Value) -> Feature {
        Feature {
            value,
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn feature_type(&self) -> Type {
        self.feature_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn domain(&self) -> Option<&FeatureDomain> {
        self.domain.as_ref()
    }

    /// Whether the feature is pinned during a search: no domain, or an empty one.
    pub fn is_constrained(&self) -> bool {
        self.domain.as_ref().map_or(true, FeatureDomain::is_empty)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.name, self.value, self.feature_type)
    }
}
