//! Feature to entity dispatch.

use crate::core::entities::{
    BinaryEntity, BooleanEntity, CategoricalEntity, CategoricalNumericalEntity, CurrencyEntity,
    DoubleEntity, DurationEntity, Entity, IntegerEntity, LongEntity, ObjectEntity, TextEntity,
    TimeEntity, UriEntity,
};
use crate::domain::{Feature, FeatureDistribution, FeatureDomain, PredictionInput, Type, Value};
use crate::utils::error::{ExplainError, Result};

fn unsupported(feature: &Feature) -> ExplainError {
    ExplainError::UnsupportedFeatureType {
        feature_type: feature.feature_type(),
    }
}

/// The searchable domain of a feature, `None` when it is pinned.
fn searchable_domain(feature: &Feature) -> Option<&FeatureDomain> {
    feature.domain().filter(|domain| !domain.is_empty())
}

/// Encode one feature as a counterfactual entity.
pub fn from(feature: &Feature) -> Result<Entity> {
    match feature.feature_type() {
        Type::Number => number_entity(feature),
        Type::Boolean => Ok(Entity::Boolean(BooleanEntity::new(
            feature,
            feature.is_constrained(),
        )?)),
        Type::Categorical => categorical_entity(feature),
        Type::Currency => match searchable_domain(feature) {
            None => Ok(Entity::Currency(CurrencyEntity::fixed(feature)?)),
            Some(FeatureDomain::Currency(set)) => Ok(Entity::Currency(
                CurrencyEntity::with_categories(feature, set.clone())?,
            )),
            Some(_) => Err(unsupported(feature)),
        },
        Type::Binary => match searchable_domain(feature) {
            None => Ok(Entity::Binary(BinaryEntity::fixed(feature)?)),
            Some(FeatureDomain::Binary(set)) => Ok(Entity::Binary(BinaryEntity::with_categories(
                feature,
                set.clone(),
            )?)),
            Some(_) => Err(unsupported(feature)),
        },
        Type::Uri => match searchable_domain(feature) {
            None => Ok(Entity::Uri(UriEntity::fixed(feature)?)),
            Some(FeatureDomain::Uri(set)) => {
                Ok(Entity::Uri(UriEntity::with_categories(feature, set.clone())?))
            }
            Some(_) => Err(unsupported(feature)),
        },
        Type::Duration => match searchable_domain(feature) {
            None => Ok(Entity::Duration(DurationEntity::fixed(feature)?)),
            Some(FeatureDomain::Duration { lower, upper }) => Ok(Entity::Duration(
                DurationEntity::bounded(feature, *lower, *upper)?,
            )),
            Some(_) => Err(unsupported(feature)),
        },
        Type::Time => match searchable_domain(feature) {
            None => Ok(Entity::Time(TimeEntity::fixed(feature)?)),
            Some(FeatureDomain::Time { lower, upper }) => {
                Ok(Entity::Time(TimeEntity::bounded(feature, *lower, *upper)?))
            }
            Some(_) => Err(unsupported(feature)),
        },
        Type::Undefined => match searchable_domain(feature) {
            None => Ok(Entity::Object(ObjectEntity::fixed(feature)?)),
            Some(FeatureDomain::Object(set)) => Ok(Entity::Object(ObjectEntity::with_categories(
                feature,
                set.clone(),
            )?)),
            Some(_) => Err(unsupported(feature)),
        },
        Type::Text => match searchable_domain(feature) {
            None => Ok(Entity::Text(TextEntity::new(feature)?)),
            Some(_) => Err(unsupported(feature)),
        },
    }
}

fn number_entity(feature: &Feature) -> Result<Entity> {
    if feature.value().is_null() {
        return Err(ExplainError::NullNumericFeature {
            name: feature.name().to_string(),
        });
    }

    let bounds = match searchable_domain(feature) {
        None => None,
        Some(FeatureDomain::Numerical { lower, upper }) => Some((*lower, *upper)),
        Some(_) => return Err(unsupported(feature)),
    };

    let entity = match (feature.value(), bounds) {
        (Value::Int(_), None) => Entity::Integer(IntegerEntity::fixed(feature)?),
        (Value::Int(_), Some((lower, upper))) => {
            Entity::Integer(IntegerEntity::bounded(feature, lower, upper)?)
        }
        (Value::Long(_), None) => Entity::Long(LongEntity::fixed(feature)?),
        (Value::Long(_), Some((lower, upper))) => {
            Entity::Long(LongEntity::bounded(feature, lower, upper)?)
        }
        (Value::Double(_), None) => Entity::Double(DoubleEntity::fixed(feature)?),
        (Value::Double(_), Some((lower, upper))) => {
            Entity::Double(DoubleEntity::bounded(feature, lower, upper)?)
        }
        _ => return Err(unsupported(feature)),
    };
    Ok(entity)
}

fn categorical_entity(feature: &Feature) -> Result<Entity> {
    let numeric_value = feature.value().is_numeric();
    match searchable_domain(feature) {
        None => Ok(Entity::Categorical(CategoricalEntity::fixed(feature)?)),
        Some(FeatureDomain::CategoricalNumerical(set)) if numeric_value => Ok(
            Entity::CategoricalNumerical(CategoricalNumericalEntity::with_categories(
                feature,
                set.clone(),
            )?),
        ),
        Some(FeatureDomain::Categorical(set))
            if numeric_value && set.iter().all(Value::is_numeric) =>
        {
            Ok(Entity::CategoricalNumerical(
                CategoricalNumericalEntity::with_categories(feature, set.clone())?,
            ))
        }
        Some(FeatureDomain::Categorical(set)) => Ok(Entity::Categorical(
            CategoricalEntity::with_categories(feature, set.clone())?,
        )),
        Some(_) => Err(unsupported(feature)),
    }
}

/// Encode one feature, scaling its distance by an observed distribution.
///
/// Only numeric and duration entities use the distribution (duration samples are seconds).
pub fn from_with_distribution(feature: &Feature, distribution: &FeatureDistribution) -> Result<Entity> {
    if distribution.feature_name() != feature.name() {
        return Err(ExplainError::invalid_value(
            feature.name(),
            format!("distribution belongs to '{}'", distribution.feature_name()),
        ));
    }
    let entity = match from(feature)? {
        Entity::Integer(e) => Entity::Integer(e.with_distribution(distribution.clone())),
        Entity::Long(e) => Entity::Long(e.with_distribution(distribution.clone())),
        Entity::Double(e) => Entity::Double(e.with_distribution(distribution.clone())),
        Entity::Duration(e) => Entity::Duration(e.with_distribution(distribution.clone())),
        other => other,
    };
    Ok(entity)
}

/// Encode every feature of `input`, preserving order.
pub fn create_entities(input: &PredictionInput) -> Result<Vec<Entity>> {
    create_entities_with(input, &[])
}

/// Like [`create_entities`], attaching the distribution named after each feature when present.
pub fn create_entities_with(input: &PredictionInput, distributions: &[FeatureDistribution]) -> Result<Vec<Entity>> {
    input
        .features
        .iter()
        .map(|feature| {
            match distributions.iter().find(|d| d.feature_name() == feature.name()) {
                Some(distribution) => from_with_distribution(feature, distribution),
                None => from(feature),
            }
        })
        .collect()
}
