use crate::adapters::LinearModel;
use crate::core::counterfactual::{CounterfactualConfig, CounterfactualGoal};
use crate::core::lime::LimeConfig;
use crate::domain::{
    Currency, Feature, FeatureDistribution, FeatureDomain, Output, PredictionInput, PredictionOutput,
    PredictionProvider, TimeUnit, Type, Uri, Value,
};
use crate::utils::error::{ExplainError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_unique_names, Validate,
};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// 解釋任務設定檔
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub run: RunConfig,
    pub model: ModelSpec,
    pub features: Vec<FeatureSpec>,
    #[serde(default)]
    pub counterfactual: CounterfactualConfig,
    /// Target outputs by name. Without it the counterfactual flips the decision.
    #[serde(default)]
    pub goal: Option<BTreeMap<String, toml::Value>>,
    #[serde(default)]
    pub lime: LimeConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    #[serde(default)]
    pub explainer: ExplainerKind,
    pub timeout_ms: Option<u64>,
    /// Where to write the final explanation. Printed to stdout when absent.
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ExplainerKind {
    #[default]
    Counterfactual,
    Lime,
}

impl fmt::Display for ExplainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplainerKind::Counterfactual => f.write_str("counterfactual"),
            ExplainerKind::Lime => f.write_str("lime"),
        }
    }
}

/// The model under explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelSpec {
    Linear(LinearModel),
}

impl ModelSpec {
    pub fn build(&self) -> Arc<dyn PredictionProvider> {
        match self {
            ModelSpec::Linear(model) => Arc::new(model.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub feature_type: Type,
    /// Omitted for a missing value.
    #[serde(default)]
    pub value: Option<toml::Value>,
    /// Unit of an integer duration value.
    #[serde(default)]
    pub unit: TimeUnit,
    #[serde(default)]
    pub domain: Option<DomainSpec>,
    /// Observed values scaling the search distance; seconds for durations.
    #[serde(default)]
    pub samples: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainSpec {
    Empty,
    Numerical {
        lower: f64,
        upper: f64,
    },
    Categorical {
        categories: Vec<toml::Value>,
    },
    CategoricalNumerical {
        categories: Vec<toml::Value>,
    },
    Binary {
        categories: Vec<toml::Value>,
    },
    Currency {
        categories: Vec<String>,
    },
    Uri {
        categories: Vec<String>,
    },
    Object {
        categories: Vec<toml::Value>,
    },
    Duration {
        lower: u64,
        upper: u64,
        #[serde(default)]
        unit: TimeUnit,
    },
    Time {
        lower: String,
        upper: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// Log every intermediate explanation at info level.
    pub log_intermediates: Option<bool>,
}

fn invalid(field: &str, raw: impl fmt::Display, reason: impl Into<String>) -> ExplainError {
    ExplainError::InvalidConfigValueError {
        field: field.to_string(),
        value: raw.to_string(),
        reason: reason.into(),
    }
}

fn scalar(field: &str, raw: &toml::Value) -> Result<Value> {
    match raw {
        toml::Value::Integer(i) => Ok(i32::try_from(*i).map_or(Value::Long(*i), Value::Int)),
        toml::Value::Float(f) => Ok(Value::Double(*f)),
        toml::Value::Boolean(b) => Ok(Value::Bool(*b)),
        toml::Value::String(s) => Ok(Value::Text(s.clone())),
        other => Err(invalid(field, other, "Expected a number, boolean or string")),
    }
}

fn expect_str<'a>(field: &str, raw: &'a toml::Value) -> Result<&'a str> {
    raw.as_str().ok_or_else(|| invalid(field, raw, "Expected a string"))
}

fn parse_time(field: &str, raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|e| invalid(field, raw, format!("Expected HH:MM[:SS]: {}", e)))
}

fn bytes(field: &str, raw: &toml::Value) -> Result<Vec<u8>> {
    match raw {
        toml::Value::String(s) => Ok(s.as_bytes().to_vec()),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_integer()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| invalid(field, item, "Expected a byte (0-255)"))
            })
            .collect(),
        other => Err(invalid(field, other, "Expected a string or an array of bytes")),
    }
}

impl FeatureSpec {
    pub fn to_feature(&self) -> Result<Feature> {
        let field = format!("features.{}", self.name);
        let value = match &self.value {
            None => Value::Null,
            Some(raw) => self.typed_value(&field, raw)?,
        };
        let feature = Feature::new(self.name.clone(), self.feature_type, value);
        match &self.domain {
            None => Ok(feature),
            Some(domain) => Ok(feature.with_domain(domain.to_domain(&format!("{}.domain", field))?)),
        }
    }

    fn typed_value(&self, field: &str, raw: &toml::Value) -> Result<Value> {
        match self.feature_type {
            Type::Number => match raw {
                toml::Value::Integer(_) | toml::Value::Float(_) => scalar(field, raw),
                other => Err(invalid(field, other, "Expected a number")),
            },
            Type::Boolean => raw
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| invalid(field, raw, "Expected a boolean")),
            Type::Categorical | Type::Undefined => scalar(field, raw),
            Type::Text => expect_str(field, raw).map(|s| Value::Text(s.to_string())),
            Type::Currency => Currency::new(expect_str(field, raw)?).map(Value::Currency),
            Type::Binary => bytes(field, raw).map(Value::Binary),
            Type::Duration => raw
                .as_integer()
                .and_then(|n| u64::try_from(n).ok())
                .map(|n| Value::Duration(self.unit.to_duration(n)))
                .ok_or_else(|| invalid(field, raw, "Expected a non-negative integer")),
            Type::Time => parse_time(field, expect_str(field, raw)?).map(Value::Time),
            Type::Uri => Uri::parse(expect_str(field, raw)?).map(Value::Uri),
        }
    }
}

impl DomainSpec {
    pub fn to_domain(&self, field: &str) -> Result<FeatureDomain> {
        let domain = match self {
            DomainSpec::Empty => FeatureDomain::empty(),
            DomainSpec::Numerical { lower, upper } => FeatureDomain::numerical(*lower, *upper),
            DomainSpec::Categorical { categories } => FeatureDomain::Categorical(
                categories.iter().map(|c| scalar(field, c)).collect::<Result<_>>()?,
            ),
            DomainSpec::CategoricalNumerical { categories } => FeatureDomain::CategoricalNumerical(
                categories.iter().map(|c| scalar(field, c)).collect::<Result<_>>()?,
            ),
            DomainSpec::Binary { categories } => FeatureDomain::Binary(
                categories.iter().map(|c| bytes(field, c)).collect::<Result<_>>()?,
            ),
            DomainSpec::Currency { categories } => FeatureDomain::Currency(
                categories.iter().map(|c| Currency::new(c)).collect::<Result<_>>()?,
            ),
            DomainSpec::Uri { categories } => FeatureDomain::Uri(
                categories.iter().map(|c| Uri::parse(c)).collect::<Result<_>>()?,
            ),
            DomainSpec::Object { categories } => FeatureDomain::Object(
                categories.iter().map(|c| scalar(field, c)).collect::<Result<_>>()?,
            ),
            DomainSpec::Duration { lower, upper, unit } => FeatureDomain::duration(*lower, *upper, *unit),
            DomainSpec::Time { lower, upper } => {
                FeatureDomain::time(parse_time(field, lower)?, parse_time(field, upper)?)
            }
        };
        Ok(domain)
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ExplainError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ExplainError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${MODEL_BIAS})，未設定的變數保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ExplainError::internal(format!("invalid substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("run.name", &self.run.name)?;

        if let Some(path) = &self.run.output_path {
            validate_path("run.output_path", path)?;
        }
        if let Some(timeout) = self.run.timeout_ms {
            validate_positive_number("run.timeout_ms", timeout as usize, 1)?;
        }

        if self.features.is_empty() {
            return Err(ExplainError::MissingConfigError {
                field: "features".to_string(),
            });
        }
        for spec in &self.features {
            validate_non_empty_string("features.name", &spec.name)?;
            if let Some(samples) = &spec.samples {
                let field = format!("features.{}.samples", spec.name);
                if samples.is_empty() {
                    return Err(invalid(&field, "[]", "Samples must not be empty"));
                }
                if let Some(bad) = samples.iter().find(|s| !s.is_finite()) {
                    return Err(invalid(&field, bad, "Samples must be finite"));
                }
            }
        }
        validate_unique_names("features.name", self.features.iter().map(|f| f.name.as_str()))?;

        let ModelSpec::Linear(model) = &self.model;
        if let Some((key, weight)) = model.weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(invalid(&format!("model.weights.{}", key), weight, "Weight must be finite"));
        }

        self.counterfactual.validate()?;
        self.lime.validate()?;
        Ok(())
    }

    /// 將 [[features]] 轉成模型輸入
    pub fn prediction_input(&self) -> Result<PredictionInput> {
        let features = self
            .features
            .iter()
            .map(FeatureSpec::to_feature)
            .collect::<Result<Vec<_>>>()?;
        Ok(PredictionInput::new(features))
    }

    /// Distributions for every feature that lists `samples`.
    pub fn distributions(&self) -> Result<Vec<FeatureDistribution>> {
        self.features
            .iter()
            .filter_map(|spec| spec.samples.as_ref().map(|samples| (spec, samples)))
            .map(|(spec, samples)| Ok(FeatureDistribution::new(&spec.to_feature()?, samples.clone())))
            .collect()
    }

    pub fn counterfactual_goal(&self) -> Result<CounterfactualGoal> {
        let Some(targets) = &self.goal else {
            return Ok(CounterfactualGoal::Flip);
        };
        let outputs = targets
            .iter()
            .map(|(name, raw)| {
                let value = scalar(&format!("goal.{}", name), raw)?;
                let output_type = match value {
                    Value::Bool(_) => Type::Boolean,
                    Value::Text(_) => Type::Categorical,
                    _ => Type::Number,
                };
                Ok(Output::new(name.clone(), output_type, value, 1.0))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CounterfactualGoal::Target(PredictionOutput::new(outputs)))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.run.timeout_ms.map(Duration::from_millis)
    }

    /// 取得監控設定
    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn log_intermediates(&self) -> bool {
        self.monitoring
            .as_ref()
            .map(|m| m.enabled && m.log_intermediates.unwrap_or(true))
            .unwrap_or(false)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
