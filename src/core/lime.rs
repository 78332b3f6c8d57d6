//! LIME saliency.
//!
//! Perturbs the explained input around its original value, scores the
//! perturbations and fits a kernel-weighted ridge regression of each output
//! on the per-feature "left unchanged" indicator. A positive coefficient
//! means keeping the feature at its original value supports the original
//! output.

use crate::core::entities::{CounterfactualEntity, Entity};
use crate::core::explainer::{spawn_run, ExplanationHandle, IntermediateSink, LocalExplainer, RunContext};
use crate::core::factory;
use crate::domain::{Output, Prediction, PredictionInput, PredictionOutput, PredictionProvider, Value};
use crate::utils::error::Result;
use crate::utils::validation::{validate_positive_number, validate_range, Validate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimeConfig {
    pub samples: usize,
    pub batch_size: usize,
    /// Chance that each perturbable feature moves in a sample.
    pub perturbation_probability: f64,
    pub kernel_width: f64,
    pub ridge: f64,
    /// Standard deviation of the noise added to pinned numbers, relative to their magnitude.
    pub noise_scale: f64,
    pub seed: Option<u64>,
}

impl Default for LimeConfig {
    fn default() -> Self {
        Self {
            samples: 300,
            batch_size: 50,
            perturbation_probability: 0.5,
            kernel_width: 0.75,
            ridge: 0.01,
            noise_scale: 0.1,
            seed: None,
        }
    }
}

impl Validate for LimeConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("lime.samples", self.samples, 1)?;
        validate_positive_number("lime.batch_size", self.batch_size, 1)?;
        validate_range("lime.perturbation_probability", self.perturbation_probability, 0.0, 1.0)?;
        validate_range("lime.kernel_width", self.kernel_width, f64::MIN_POSITIVE, f64::MAX)?;
        validate_range("lime.ridge", self.ridge, 0.0, f64::MAX)?;
        validate_range("lime.noise_scale", self.noise_scale, 0.0, f64::MAX)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub score: f64,
}

/// Feature importances for one model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saliency {
    pub output: String,
    pub importances: Vec<FeatureImportance>,
}

impl Saliency {
    /// The `n` most important features by absolute score.
    pub fn top_features(&self, n: usize) -> Vec<&FeatureImportance> {
        let mut ranked: Vec<&FeatureImportance> = self.importances.iter().collect();
        ranked.sort_by(|a, b| b.score.abs().total_cmp(&a.score.abs()));
        ranked.truncate(n);
        ranked
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaliencyResults {
    pub execution_id: Uuid,
    /// Perturbed samples the saliencies were fitted on.
    pub samples: usize,
    pub saliencies: Vec<Saliency>,
}

impl SaliencyResults {
    pub fn for_output(&self, name: &str) -> Option<&Saliency> {
        self.saliencies.iter().find(|s| s.output == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LimeExplainer {
    config: LimeConfig,
}

impl LimeExplainer {
    pub fn new(config: LimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LimeConfig {
        &self.config
    }
}

impl LocalExplainer for LimeExplainer {
    type Explanation = SaliencyResults;

    fn explain_async_with(
        &self,
        prediction: &Prediction,
        model: Arc<dyn PredictionProvider>,
        sink: IntermediateSink<SaliencyResults>,
    ) -> ExplanationHandle<SaliencyResults> {
        let entities = match factory::create_entities(&prediction.input) {
            Ok(entities) => entities,
            Err(err) => {
                tracing::warn!(execution_id = %prediction.execution_id, error = %err, "cannot encode prediction");
                return ExplanationHandle::failed(err);
            }
        };
        let sampler = Sampler {
            config: self.config.clone(),
            execution_id: prediction.execution_id,
            original: prediction.output.clone(),
            entities,
        };
        spawn_run(model, sink, move |ctx| sampler.run(ctx))
    }
}

/// How a feature is perturbed.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Perturbation {
    Sample,
    Noise,
}

/// Weighted design matrix rows accumulated over the run.
#[derive(Debug, Default)]
struct Observations {
    rows: Vec<Vec<f64>>,
    weights: Vec<f64>,
    outputs: Vec<PredictionOutput>,
}

struct Sampler {
    config: LimeConfig,
    execution_id: Uuid,
    original: PredictionOutput,
    entities: Vec<Entity>,
}

impl Sampler {
    async fn run(self, mut ctx: RunContext<SaliencyResults>) -> Result<SaliencyResults> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let columns: Vec<(usize, Perturbation)> = self
            .entities
            .iter()
            .enumerate()
            .filter_map(|(i, e)| perturbation_of(e).map(|p| (i, p)))
            .collect();

        if columns.is_empty() {
            tracing::warn!(run_id = %ctx.run_id(), "no perturbable features, returning zero saliency");
            return Ok(self.zero_saliency());
        }
        tracing::info!(
            run_id = %ctx.run_id(),
            samples = self.config.samples,
            perturbable = columns.len(),
            "LIME sampling started"
        );

        let mut observations = Observations::default();
        observations.rows.push(vec![1.0; columns.len()]);
        observations.weights.push(1.0);
        observations.outputs.push(self.original.clone());

        let mut drawn = 0;
        while drawn < self.config.samples {
            ctx.checkpoint()?;
            let size = self.config.batch_size.min(self.config.samples - drawn);
            let mut inputs = Vec::with_capacity(size);
            let mut rows = Vec::with_capacity(size);
            for _ in 0..size {
                let (input, row) = self.perturb(&columns, &mut rng);
                inputs.push(input);
                rows.push(row);
            }

            let scoring = ctx.score(inputs);
            let outputs = scoring.await?;
            for (row, output) in rows.into_iter().zip(outputs) {
                observations.weights.push(self.kernel(&row));
                observations.rows.push(row);
                observations.outputs.push(output);
            }
            drawn += size;

            let partial = self.fit(&columns, &observations, drawn);
            ctx.report(partial);
            tokio::task::yield_now().await;
        }

        tracing::info!(run_id = %ctx.run_id(), samples = drawn, "LIME sampling finished");
        Ok(self.fit(&columns, &observations, drawn))
    }

    /// Draw one perturbed input and its unchanged-indicator row.
    fn perturb(&self, columns: &[(usize, Perturbation)], rng: &mut StdRng) -> (PredictionInput, Vec<f64>) {
        let mut values: Vec<Value> = self
            .entities
            .iter()
            .map(|e| e.original_feature().value().clone())
            .collect();

        let mut moved: Vec<bool> = columns
            .iter()
            .map(|_| rng.gen_bool(self.config.perturbation_probability))
            .collect();
        if !moved.iter().any(|m| *m) {
            let forced = rng.gen_range(0..moved.len());
            moved[forced] = true;
        }

        for (&(index, kind), _) in columns.iter().zip(&moved).filter(|(_, m)| **m) {
            let entity = &self.entities[index];
            values[index] = match kind {
                Perturbation::Sample => entity.sample(rng),
                Perturbation::Noise => self.noisy(entity.original_feature().value(), rng),
            };
        }

        let row = columns
            .iter()
            .map(|&(index, _)| {
                if &values[index] == self.entities[index].original_feature().value() {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        let features = self
            .entities
            .iter()
            .zip(values)
            .map(|(e, v)| e.original_feature().with_value(v))
            .collect();
        (PredictionInput::new(features), row)
    }

    fn noisy(&self, value: &Value, rng: &mut StdRng) -> Value {
        let scale = self.config.noise_scale;
        match value {
            Value::Int(v) => {
                let sigma = scale * f64::from(*v).abs().max(1.0);
                Value::Int((f64::from(*v) + gaussian(rng) * sigma).round() as i32)
            }
            Value::Long(v) => {
                let sigma = scale * (*v as f64).abs().max(1.0);
                Value::Long((*v as f64 + gaussian(rng) * sigma).round() as i64)
            }
            Value::Double(v) => {
                let sigma = scale * v.abs().max(1.0);
                Value::Double(v + gaussian(rng) * sigma)
            }
            other => other.clone(),
        }
    }

    /// Exponential kernel over the fraction of moved features.
    fn kernel(&self, row: &[f64]) -> f64 {
        let moved = row.iter().filter(|z| **z == 0.0).count() as f64;
        let d2 = moved / row.len() as f64;
        (-d2 / (self.config.kernel_width * self.config.kernel_width)).exp()
    }

    fn fit(&self, columns: &[(usize, Perturbation)], observations: &Observations, samples: usize) -> SaliencyResults {
        let saliencies = self
            .original
            .outputs
            .iter()
            .map(|target| {
                let y: Vec<f64> = observations
                    .outputs
                    .iter()
                    .map(|output| response(output, target))
                    .collect();
                let coefficients =
                    weighted_ridge(&observations.rows, &y, &observations.weights, self.config.ridge);

                let mut importances = self.zero_importances();
                for (column, &(index, _)) in columns.iter().enumerate() {
                    importances[index].score = coefficients[column + 1];
                }
                Saliency {
                    output: target.name.clone(),
                    importances,
                }
            })
            .collect();

        SaliencyResults {
            execution_id: self.execution_id,
            samples,
            saliencies,
        }
    }

    fn zero_importances(&self) -> Vec<FeatureImportance> {
        self.entities
            .iter()
            .map(|e| FeatureImportance {
                feature: e.name().to_string(),
                score: 0.0,
            })
            .collect()
    }

    fn zero_saliency(&self) -> SaliencyResults {
        SaliencyResults {
            execution_id: self.execution_id,
            samples: 0,
            saliencies: self
                .original
                .outputs
                .iter()
                .map(|o| Saliency {
                    output: o.name.clone(),
                    importances: self.zero_importances(),
                })
                .collect(),
        }
    }
}

fn perturbation_of(entity: &Entity) -> Option<Perturbation> {
    if !entity.is_constrained() {
        return Some(Perturbation::Sample);
    }
    match entity {
        Entity::Integer(_) | Entity::Long(_) | Entity::Double(_) => Some(Perturbation::Noise),
        _ => None,
    }
}

/// Regression target for one output: the number itself, or whether a
/// non-numeric output kept its original value.
fn response(output: &PredictionOutput, target: &Output) -> f64 {
    let Some(scored) = output.by_name(&target.name) else {
        return 0.0;
    };
    if target.value.is_numeric() {
        scored.value.as_number().unwrap_or(0.0)
    } else if scored.value == target.value {
        1.0
    } else {
        0.0
    }
}

/// Standard normal draw (Box-Muller).
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Solve `(XᵀWX + λI')β = XᵀWy` with an unpenalized intercept.
///
/// Returns `[intercept, β₁, …, βₙ]`. Singular directions get a zero coefficient.
fn weighted_ridge(rows: &[Vec<f64>], y: &[f64], weights: &[f64], ridge: f64) -> Vec<f64> {
    let n = rows.first().map_or(0, Vec::len) + 1;
    let mut a = vec![vec![0.0; n + 1]; n];

    for ((row, &target), &w) in rows.iter().zip(y).zip(weights) {
        let x: Vec<f64> = std::iter::once(1.0).chain(row.iter().copied()).collect();
        for i in 0..n {
            for j in 0..n {
                a[i][j] += w * x[i] * x[j];
            }
            a[i][n] += w * x[i] * target;
        }
    }
    for (i, equation) in a.iter_mut().enumerate().skip(1) {
        equation[i] += ridge;
    }

    solve(a)
}

/// Gaussian elimination with partial pivoting on an augmented matrix.
fn solve(mut a: Vec<Vec<f64>>) -> Vec<f64> {
    const EPS: f64 = 1e-12;
    let n = a.len();
    let mut pivots = vec![None; n];

    let mut row = 0;
    for col in 0..n {
        let Some(best) = (row..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs())) else {
            break;
        };
        if a[best][col].abs() < EPS {
            continue;
        }
        a.swap(row, best);
        for i in 0..n {
            if i != row {
                let factor = a[i][col] / a[row][col];
                if factor != 0.0 {
                    for k in col..=n {
                        a[i][k] -= factor * a[row][k];
                    }
                }
            }
        }
        pivots[col] = Some(row);
        row += 1;
    }

    pivots
        .iter()
        .enumerate()
        .map(|(col, pivot)| pivot.map_or(0.0, |r| a[r][n] / a[r][col]))
        .collect()
}
