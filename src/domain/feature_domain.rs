use crate::domain::value::{Currency, TimeUnit, Uri, Value};
use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Deduplicated set of admissible values. Equality ignores insertion order.
#[derive(Debug, Clone)]
pub struct CategorySet<T> {
    items: Vec<T>,
}

impl<T: PartialEq> CategorySet<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let mut unique: Vec<T> = Vec::new();
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Self { items: unique }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: PartialEq> PartialEq for CategorySet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size() && self.items.iter().all(|item| other.contains(item))
    }
}

impl<T: PartialEq> FromIterator<T> for CategorySet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<T: Serialize> Serialize for CategorySet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

// 反序列化同樣走 new，重複值會被合併
impl<'de, T: Deserialize<'de> + PartialEq> Deserialize<'de> for CategorySet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<T>::deserialize(deserializer).map(Self::new)
    }
}

/// The admissible values of a feature during a counterfactual search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureDomain {
    /// The feature is fixed and must not be searched.
    Empty,
    Numerical { lower: f64, upper: f64 },
    Categorical(CategorySet<Value>),
    CategoricalNumerical(CategorySet<Value>),
    Binary(CategorySet<Vec<u8>>),
    Currency(CategorySet<Currency>),
    Uri(CategorySet<Uri>),
    Object(CategorySet<Value>),
    Duration { lower: Duration, upper: Duration },
    Time { lower: NaiveTime, upper: NaiveTime },
}

impl FeatureDomain {
    pub fn empty() -> Self {
        FeatureDomain::Empty
    }

    pub fn numerical(lower: f64, upper: f64) -> Self {
        FeatureDomain::Numerical { lower, upper }
    }

    pub fn categorical<V: Into<Value>>(categories: impl IntoIterator<Item = V>) -> Self {
        FeatureDomain::Categorical(categories.into_iter().map(Into::into).collect())
    }

    pub fn categorical_numerical<V: Into<Value>>(categories: impl IntoIterator<Item = V>) -> Self {
        FeatureDomain::CategoricalNumerical(categories.into_iter().map(Into::into).collect())
    }

    pub fn binary(categories: impl IntoIterator<Item = Vec<u8>>) -> Self {
        FeatureDomain::Binary(categories.into_iter().collect())
    }

    pub fn currency(categories: impl IntoIterator<Item = Currency>) -> Self {
        FeatureDomain::Currency(categories.into_iter().collect())
    }

    pub fn uri(categories: impl IntoIterator<Item = Uri>) -> Self {
        FeatureDomain::Uri(categories.into_iter().collect())
    }

    pub fn object<V: Into<Value>>(categories: impl IntoIterator<Item = V>) -> Self {
        FeatureDomain::Object(categories.into_iter().map(Into::into).collect())
    }

    /// Duration range expressed as `lower..=upper` amounts of `unit`.
    pub fn duration(lower: u64, upper: u64, unit: TimeUnit) -> Self {
        FeatureDomain::Duration {
            lower: unit.to_duration(lower),
            upper: unit.to_duration(upper),
        }
    }

    pub fn duration_between(lower: Duration, upper: Duration) -> Self {
        FeatureDomain::Duration { lower, upper }
    }

    pub fn time(lower: NaiveTime, upper: NaiveTime) -> Self {
        FeatureDomain::Time { lower, upper }
    }

    /// True for the explicit empty domain and for category sets without members.
    pub fn is_empty(&self) -> bool {
        match self {
            FeatureDomain::Empty => true,
            FeatureDomain::Categorical(set)
            | FeatureDomain::CategoricalNumerical(set)
            | FeatureDomain::Object(set) => set.is_empty(),
            FeatureDomain::Binary(set) => set.is_empty(),
            FeatureDomain::Currency(set) => set.is_empty(),
            FeatureDomain::Uri(set) => set.is_empty(),
            FeatureDomain::Numerical { .. }
            | FeatureDomain::Duration { .. }
            | FeatureDomain::Time { .. } => false,
        }
    }

    /// The enumerated categories as values, `None` for range domains.
    pub fn categories(&self) -> Option<Vec<Value>> {
        match self {
            FeatureDomain::Empty => Some(Vec::new()),
            FeatureDomain::Categorical(set)
            | FeatureDomain::CategoricalNumerical(set)
            | FeatureDomain::Object(set) => Some(set.iter().cloned().collect()),
            FeatureDomain::Binary(set) => Some(set.iter().cloned().map(Value::Binary).collect()),
            FeatureDomain::Currency(set) => Some(set.iter().cloned().map(Value::Currency).collect()),
            FeatureDomain::Uri(set) => Some(set.iter().cloned().map(Value::Uri).collect()),
            FeatureDomain::Numerical { .. }
            | FeatureDomain::Duration { .. }
            | FeatureDomain::Time { .. } => None,
        }
    }

    /// Number of categories, `None` for continuous ranges.
    pub fn size(&self) -> Option<usize> {
        self.categories().map(|categories| categories.len())
    }
}
