use chrono::NaiveTime;
use local_explain::core::entities::RangeSize;
use local_explain::domain::{CategorySet, Currency, TimeUnit, Uri};
use local_explain::{factory, CounterfactualEntity, Entity, ExplainError, Feature, FeatureDomain, PredictionInput, Type, Value};
use std::collections::HashSet;
use std::time::Duration;

#[test]
fn test_integer_factory() {
    let feature = Feature::number("int-feature", 5).with_domain(FeatureDomain::numerical(0.0, 10.0));
    let entity = factory::from(&feature).unwrap();

    assert!(matches!(entity, Entity::Integer(_)));
    assert_eq!(entity.as_feature().value().as_number(), Some(5.0));
    assert!(!entity.is_constrained());
    assert_eq!(entity.distance(), 0.0);
}

#[test]
fn test_fixed_numeric_factories() {
    let cases = [
        (Feature::number("int-feature", 5), "integer"),
        (Feature::number("long-feature", 5_i64), "long"),
        (Feature::number("double-feature", 5.5), "double"),
    ];
    for (feature, kind) in cases {
        let entity = factory::from(&feature).unwrap();
        assert_eq!(entity.kind(), kind);
        assert!(entity.is_constrained());
        assert_eq!(entity.as_feature(), feature);
    }
}

#[test]
fn test_bounded_long_and_double() {
    let long = Feature::number("long-feature", 5_i64).with_domain(FeatureDomain::numerical(0.0, 10.0));
    let entity = factory::from(&long).unwrap();
    assert!(matches!(entity, Entity::Long(_)));
    assert_eq!(entity.as_feature().value(), &Value::Long(5));

    let double = Feature::number("double-feature", 5.5).with_domain(FeatureDomain::numerical(0.0, 10.0));
    let entity = factory::from(&double).unwrap();
    assert!(matches!(entity, Entity::Double(_)));
    assert_eq!(entity.as_feature().value(), &Value::Double(5.5));
}

#[test]
fn test_null_numeric_feature_is_rejected() {
    let feature = Feature::number("missing", Value::Null).with_domain(FeatureDomain::numerical(0.0, 1.0));
    let err = factory::from(&feature).unwrap_err();
    assert!(matches!(err, ExplainError::NullNumericFeature { .. }));
    assert!(err.to_string().starts_with("Null numeric features are not supported in counterfactuals"));
}

#[test]
fn test_boolean_factory() {
    let free = Feature::boolean("bool-feature", true).with_domain(FeatureDomain::categorical([true, false]));
    let entity = factory::from(&free).unwrap();
    assert!(matches!(entity, Entity::Boolean(_)));
    assert!(!entity.is_constrained());
    assert_eq!(entity.as_feature().value(), &Value::Bool(true));

    let fixed = factory::from(&Feature::boolean("bool-feature", true)).unwrap();
    assert!(fixed.is_constrained());
    assert_eq!(fixed.as_feature().value(), &Value::Bool(true));

    // 明確的空 domain 等同固定
    let empty = Feature::boolean("bool-feature", true).with_domain(FeatureDomain::empty());
    let entity = factory::from(&empty).unwrap();
    assert!(matches!(entity, Entity::Boolean(_)));
    assert!(entity.is_constrained());
}

#[test]
fn test_categorical_factory_forms_agree() {
    let expected: CategorySet<Value> = CategorySet::new(["foo".into(), "bar".into()]);
    let domains = [
        FeatureDomain::categorical(["foo", "bar"]),
        FeatureDomain::categorical(vec!["bar", "foo"]),
        FeatureDomain::categorical(HashSet::from(["foo", "bar"])),
    ];
    for domain in domains {
        let feature = Feature::categorical("categorical-feature", "foo").with_domain(domain);
        match factory::from(&feature).unwrap() {
            Entity::Categorical(entity) => {
                assert_eq!(entity.recover_set(), &expected);
                assert!(!entity.is_constrained());
                assert_eq!(entity.as_feature().value().to_string(), "foo");
            }
            other => panic!("expected a categorical entity, got {}", other.kind()),
        }
    }
}

#[test]
fn test_fixed_categorical_entity() {
    let feature = Feature::categorical("categorical-feature", "foo");
    match factory::from(&feature).unwrap() {
        Entity::Categorical(entity) => {
            assert!(entity.is_constrained());
            assert_eq!(entity.recover_set().size(), 1);
            assert_eq!(entity.as_feature().value().to_string(), "foo");
        }
        other => panic!("expected a categorical entity, got {}", other.kind()),
    }
}

#[test]
fn test_binary_factory() {
    let value = b"foo".to_vec();
    let fixed = factory::from(&Feature::binary("binary-feature", value.clone())).unwrap();
    assert!(matches!(fixed, Entity::Binary(_)));
    assert!(fixed.is_constrained());
    assert_eq!(fixed.as_feature().feature_type(), Type::Binary);

    let categories = vec![b"bar".to_vec(), b"baz".to_vec(), b"fun".to_vec()];
    let as_list = FeatureDomain::binary(categories.clone());
    let as_set = FeatureDomain::binary(categories.iter().cloned().collect::<HashSet<_>>());
    for domain in [as_list, as_set] {
        let feature = Feature::binary("binary-feature", value.clone()).with_domain(domain);
        match factory::from(&feature).unwrap() {
            Entity::Binary(entity) => {
                assert_eq!(entity.recover_set(), &CategorySet::new(categories.clone()));
                assert_eq!(entity.as_feature().value(), &Value::Binary(value.clone()));
            }
            other => panic!("expected a binary entity, got {}", other.kind()),
        }
    }
}

#[test]
fn test_currency_factory() {
    let eur = Currency::new("EUR").unwrap();
    let fixed = factory::from(&Feature::currency("currency-feature", eur.clone())).unwrap();
    assert!(matches!(fixed, Entity::Currency(_)));
    assert!(fixed.is_constrained());
    assert_eq!(fixed.as_feature().feature_type(), Type::Currency);

    let feature = Feature::currency("currency-feature", eur.clone())
        .with_domain(FeatureDomain::currency(Currency::available()));
    match factory::from(&feature).unwrap() {
        Entity::Currency(entity) => {
            assert_eq!(entity.recover_set().size(), Currency::available().len());
            assert_eq!(entity.as_feature().value(), &Value::Currency(eur.clone()));
        }
        other => panic!("expected a currency entity, got {}", other.kind()),
    }

    let two = [Currency::new("GBP").unwrap(), Currency::new("EUR").unwrap()];
    let feature = Feature::currency("currency-feature", eur).with_domain(FeatureDomain::currency(two.clone()));
    match factory::from(&feature).unwrap() {
        Entity::Currency(entity) => assert_eq!(entity.recover_set().size(), two.len()),
        other => panic!("expected a currency entity, got {}", other.kind()),
    }
}

#[test]
fn test_duration_factory() {
    let fixed = factory::from(&Feature::duration("duration-feature", Duration::from_secs(60))).unwrap();
    assert!(matches!(fixed, Entity::Duration(_)));
    assert!(fixed.is_constrained());

    let feature = Feature::duration("duration-feature", Duration::from_secs(60))
        .with_domain(FeatureDomain::duration(0, 60, TimeUnit::Seconds));
    let entity = factory::from(&feature).unwrap();
    assert_eq!(entity.as_feature().feature_type(), Type::Duration);
    assert!(!entity.is_constrained());

    // 0 .. 2 days, range measured in seconds
    let feature = Feature::duration("duration-feature", Duration::from_secs(86_400))
        .with_domain(FeatureDomain::duration(0, 2, TimeUnit::Days));
    match factory::from(&feature).unwrap() {
        Entity::Duration(entity) => {
            assert_eq!(entity.distance(), 0.0);
            assert!(entity.value_range().contains(1e5));
            assert!(!entity.value_range().contains(2e5));
            assert_eq!(entity.value_range().size(), RangeSize::Continuous);
        }
        other => panic!("expected a duration entity, got {}", other.kind()),
    }
}

#[test]
fn test_text_factory() {
    let entity = factory::from(&Feature::text("text-feature", "foo")).unwrap();
    assert!(matches!(entity, Entity::Text(_)));
    assert!(entity.is_constrained());
    assert_eq!(entity.as_feature().feature_type(), Type::Text);

    let empty = Feature::text("text-feature", "foo").with_domain(FeatureDomain::empty());
    assert!(factory::from(&empty).unwrap().is_constrained());

    let varying = Feature::text("text-feature", "foo").with_domain(FeatureDomain::categorical(["foo", "bar"]));
    let err = factory::from(&varying).unwrap_err();
    assert_eq!(err.to_string(), "Unsupported feature type: text");
}

#[test]
fn test_time_factory() {
    let value = NaiveTime::from_hms_opt(11, 30, 0).unwrap();
    let fixed = factory::from(&Feature::time("time-feature", value)).unwrap();
    assert!(matches!(fixed, Entity::Time(_)));
    assert!(fixed.is_constrained());

    let domain = FeatureDomain::time(
        NaiveTime::from_hms_opt(1, 30, 0).unwrap(),
        NaiveTime::from_hms_opt(21, 30, 0).unwrap(),
    );
    match factory::from(&Feature::time("time-feature", value).with_domain(domain)).unwrap() {
        Entity::Time(entity) => {
            assert_eq!(entity.proposed(), value);
            assert_eq!(entity.as_feature().feature_type(), Type::Time);
            assert!(!entity.is_constrained());
        }
        other => panic!("expected a time entity, got {}", other.kind()),
    }
}

#[test]
fn test_uri_factory() {
    let value = Uri::parse("https://example.com/a").unwrap();
    let fixed = factory::from(&Feature::uri("uri-feature", value.clone())).unwrap();
    assert!(matches!(fixed, Entity::Uri(_)));
    assert!(fixed.is_constrained());
    assert_eq!(fixed.as_feature().feature_type(), Type::Uri);

    let domain = FeatureDomain::uri([
        Uri::parse("https://example.com/a").unwrap(),
        Uri::parse("./relative").unwrap(),
    ]);
    match factory::from(&Feature::uri("uri-feature", value.clone()).with_domain(domain)).unwrap() {
        Entity::Uri(entity) => {
            assert_eq!(entity.recover_set().size(), 2);
            assert_eq!(entity.as_feature().value(), &Value::Uri(value));
        }
        other => panic!("expected a uri entity, got {}", other.kind()),
    }
}

#[test]
fn test_object_factory() {
    let fixed = factory::from(&Feature::object("object-feature", "anything")).unwrap();
    assert!(matches!(fixed, Entity::Object(_)));
    assert!(fixed.is_constrained());

    let feature = Feature::object("object-feature", 1).with_domain(FeatureDomain::object([1, 2, 3]));
    let entity = factory::from(&feature).unwrap();
    assert!(!entity.is_constrained());
    assert_eq!(entity.as_feature().feature_type(), Type::Undefined);
}

#[test]
fn test_categorical_numerical_factory() {
    let feature = Feature::categorical_numerical("n", 2)
        .with_domain(FeatureDomain::categorical_numerical([1, 2, 3]));
    match factory::from(&feature).unwrap() {
        Entity::CategoricalNumerical(entity) => {
            assert_eq!(entity.as_feature().feature_type(), Type::Categorical);
            assert_eq!(entity.recover_set().size(), 3);
            assert_eq!(entity.distance(), 0.0);
        }
        other => panic!("expected a categorical numerical entity, got {}", other.kind()),
    }
}

#[test]
fn test_mismatched_domain_is_unsupported() {
    let feature = Feature::duration("d", Duration::from_secs(1)).with_domain(FeatureDomain::numerical(0.0, 1.0));
    let err = factory::from(&feature).unwrap_err();
    assert_eq!(err.to_string(), "Unsupported feature type: duration");
}

#[test]
fn test_create_entities_preserves_order() {
    let input = PredictionInput::new(vec![
        Feature::number("age", 40).with_domain(FeatureDomain::numerical(18.0, 90.0)),
        Feature::text("comment", "n/a"),
        Feature::categorical("color", "foo").with_domain(FeatureDomain::categorical(["foo", "bar"])),
        Feature::boolean("member", false),
    ]);
    let entities = factory::create_entities(&input).unwrap();

    assert_eq!(entities.len(), input.len());
    for (entity, feature) in entities.iter().zip(&input.features) {
        assert_eq!(entity.as_feature().name(), feature.name());
        assert_eq!(&entity.as_feature(), feature);
    }
}

#[test]
fn test_create_entities_fails_fast() {
    let input = PredictionInput::new(vec![
        Feature::number("ok", 1),
        Feature::number("missing", Value::Null),
    ]);
    assert!(matches!(
        factory::create_entities(&input),
        Err(ExplainError::NullNumericFeature { .. })
    ));
}
