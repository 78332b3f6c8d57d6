//! Counterfactual search.
//!
//! A batched stochastic local search over the free entities of a prediction.
//! Each step mutates the best candidate found so far into `batch_size`
//! neighbours, scores them in one model call and keeps the best one. The
//! ranking prefers candidates meeting the goal, then the smaller goal gap,
//! then the smaller total entity distance.

use crate::core::entities::{CounterfactualEntity, Entity};
use crate::core::explainer::{spawn_run, ExplanationHandle, IntermediateSink, LocalExplainer, RunContext};
use crate::core::factory;
use crate::domain::{
    Feature, FeatureDistribution, Output, Prediction, PredictionInput, PredictionOutput, PredictionProvider, Type,
    Value,
};
use crate::utils::error::Result;
use crate::utils::validation::{validate_positive_number, validate_range, Validate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

/// Probability that a mutation returns an already changed feature to its original value.
const REVERT_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterfactualConfig {
    pub max_iterations: usize,
    pub batch_size: usize,
    /// Upper bound on how many features a counterfactual may change.
    pub max_changed_features: usize,
    /// Steps without improvement after which a valid solution is accepted.
    pub patience: usize,
    /// Absolute tolerance when comparing numeric outputs.
    pub goal_threshold: f64,
    pub seed: Option<u64>,
}

impl Default for CounterfactualConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            batch_size: 32,
            max_changed_features: 3,
            patience: 10,
            goal_threshold: 0.01,
            seed: None,
        }
    }
}

impl Validate for CounterfactualConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("counterfactual.max_iterations", self.max_iterations, 1)?;
        validate_positive_number("counterfactual.batch_size", self.batch_size, 1)?;
        validate_positive_number("counterfactual.max_changed_features", self.max_changed_features, 1)?;
        validate_range("counterfactual.goal_threshold", self.goal_threshold, 0.0, f64::MAX)?;
        Ok(())
    }
}

/// What a counterfactual has to achieve.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterfactualGoal {
    /// Change the original decision. Non-numeric outputs must take a different
    /// value; when every output is numeric, one must move by more than the
    /// goal threshold.
    #[default]
    Flip,
    /// Reach the given outputs, matched by name.
    Target(PredictionOutput),
}

/// How far one scored output is from the goal.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GoalGap {
    met: bool,
    gap: f64,
}

impl CounterfactualGoal {
    fn evaluate(&self, candidate: &PredictionOutput, original: &PredictionOutput, threshold: f64) -> GoalGap {
        match self {
            CounterfactualGoal::Flip => flip_gap(candidate, original, threshold),
            CounterfactualGoal::Target(target) => target_gap(candidate, target, threshold),
        }
    }
}

fn numeric_output(output: &Output) -> Option<f64> {
    if output.output_type == Type::Number {
        output.value.as_number()
    } else {
        None
    }
}

fn flip_gap(candidate: &PredictionOutput, original: &PredictionOutput, threshold: f64) -> GoalGap {
    let decisions: Vec<&Output> = original
        .outputs
        .iter()
        .filter(|o| numeric_output(o).is_none())
        .collect();

    let mut best = GoalGap {
        met: false,
        gap: f64::INFINITY,
    };
    if decisions.is_empty() {
        for o in &original.outputs {
            let (Some(before), Some(after)) = (
                numeric_output(o),
                candidate.by_name(&o.name).and_then(numeric_output),
            ) else {
                continue;
            };
            let moved = (after - before).abs();
            if moved > threshold {
                return GoalGap { met: true, gap: 0.0 };
            }
            best.gap = best.gap.min(threshold - moved);
        }
        return best;
    }

    for o in decisions {
        let Some(c) = candidate.by_name(&o.name) else {
            continue;
        };
        if c.value != o.value {
            return GoalGap { met: true, gap: 0.0 };
        }
        // 信心越低越接近翻轉
        best.gap = best.gap.min(c.score.clamp(0.0, 1.0));
    }
    best
}

fn target_gap(candidate: &PredictionOutput, target: &PredictionOutput, threshold: f64) -> GoalGap {
    let mut met = true;
    let mut gap = 0.0;
    for t in &target.outputs {
        let Some(c) = candidate.by_name(&t.name) else {
            return GoalGap {
                met: false,
                gap: f64::INFINITY,
            };
        };
        match (c.value.as_number(), t.value.as_number()) {
            (Some(actual), Some(wanted)) if t.output_type == Type::Number => {
                let diff = (actual - wanted).abs();
                if diff > threshold {
                    met = false;
                    gap += diff;
                }
            }
            _ => {
                if c.value != t.value {
                    met = false;
                    gap += c.score.clamp(0.0, 1.0);
                }
            }
        }
    }
    GoalGap { met, gap }
}

/// One counterfactual, possibly intermediate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualResult {
    /// Execution id of the explained prediction.
    pub execution_id: Uuid,
    /// Increases with every improvement found during a run; `0` is the original input.
    pub solution_id: u64,
    pub features: Vec<Feature>,
    pub output: PredictionOutput,
    /// Whether `output` meets the goal.
    pub valid: bool,
    pub distance: f64,
    /// Number of features whose value differs from the original.
    pub changed: usize,
}

/// A scored point of the search space.
#[derive(Debug, Clone)]
struct Candidate {
    values: Vec<Value>,
    output: PredictionOutput,
    goal: GoalGap,
    distance: f64,
}

impl Candidate {
    fn rank(&self, other: &Candidate) -> Ordering {
        other
            .goal
            .met
            .cmp(&self.goal.met)
            .then_with(|| self.goal.gap.total_cmp(&other.goal.gap))
            .then_with(|| self.distance.total_cmp(&other.distance))
    }

    fn improves_on(&self, other: &Candidate) -> bool {
        self.rank(other) == Ordering::Less
    }
}

/// Counterfactual explainer over a [`CounterfactualGoal`].
#[derive(Debug, Clone, Default)]
pub struct CounterfactualExplainer {
    config: CounterfactualConfig,
    goal: CounterfactualGoal,
    distributions: Vec<FeatureDistribution>,
}

impl CounterfactualExplainer {
    pub fn new(config: CounterfactualConfig) -> Self {
        Self {
            config,
            goal: CounterfactualGoal::Flip,
            distributions: Vec::new(),
        }
    }

    pub fn with_goal(mut self, goal: CounterfactualGoal) -> Self {
        self.goal = goal;
        self
    }

    /// Scale numeric distances by observed samples, matched by feature name.
    pub fn with_distributions(mut self, distributions: Vec<FeatureDistribution>) -> Self {
        self.distributions = distributions;
        self
    }

    pub fn config(&self) -> &CounterfactualConfig {
        &self.config
    }

    pub fn goal(&self) -> &CounterfactualGoal {
        &self.goal
    }
}

impl LocalExplainer for CounterfactualExplainer {
    type Explanation = CounterfactualResult;

    fn explain_async_with(
        &self,
        prediction: &Prediction,
        model: Arc<dyn PredictionProvider>,
        sink: IntermediateSink<CounterfactualResult>,
    ) -> ExplanationHandle<CounterfactualResult> {
        let entities = match factory::create_entities_with(&prediction.input, &self.distributions) {
            Ok(entities) => entities,
            Err(err) => {
                tracing::warn!(execution_id = %prediction.execution_id, error = %err, "cannot encode prediction");
                return ExplanationHandle::failed(err);
            }
        };
        let search = Search {
            config: self.config.clone(),
            goal: self.goal.clone(),
            execution_id: prediction.execution_id,
            original: prediction.output.clone(),
            entities,
        };
        spawn_run(model, sink, move |ctx| search.run(ctx))
    }
}

struct Search {
    config: CounterfactualConfig,
    goal: CounterfactualGoal,
    execution_id: Uuid,
    original: PredictionOutput,
    entities: Vec<Entity>,
}

impl Search {
    async fn run(mut self, mut ctx: RunContext<CounterfactualResult>) -> Result<CounterfactualResult> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let free: Vec<usize> = (0..self.entities.len())
            .filter(|&i| !self.entities[i].is_constrained())
            .collect();
        let originals: Vec<Value> = self
            .entities
            .iter()
            .map(|e| e.original_feature().value().clone())
            .collect();

        let mut best = Candidate {
            values: originals.clone(),
            goal: self.goal.evaluate(&self.original, &self.original, self.config.goal_threshold),
            output: self.original.clone(),
            distance: 0.0,
        };
        let mut solution_id = 0_u64;

        tracing::info!(
            run_id = %ctx.run_id(),
            features = self.entities.len(),
            free = free.len(),
            "counterfactual search started"
        );
        if free.is_empty() {
            tracing::warn!(run_id = %ctx.run_id(), "no free features, returning the original input");
            return self.result(&best, solution_id);
        }

        let mut stale = 0_usize;
        for iteration in 0..self.config.max_iterations {
            ctx.checkpoint()?;

            let mut proposals = Vec::with_capacity(self.config.batch_size);
            let mut inputs = Vec::with_capacity(self.config.batch_size);
            for _ in 0..self.config.batch_size {
                let values = self.neighbour(&best.values, &originals, &free, &mut rng);
                match self.apply(&values) {
                    Ok(distance) => {
                        inputs.push(self.current_input());
                        proposals.push((values, distance));
                    }
                    Err(err) => tracing::debug!(error = %err, "discarding inadmissible neighbour"),
                }
            }
            if inputs.is_empty() {
                continue;
            }

            let scoring = ctx.score(inputs);
            let outputs = scoring.await?;
            let step_best = proposals
                .into_iter()
                .zip(outputs)
                .map(|((values, distance), output)| Candidate {
                    goal: self.goal.evaluate(&output, &self.original, self.config.goal_threshold),
                    values,
                    output,
                    distance,
                })
                .min_by(|a, b| a.rank(b));

            match step_best {
                Some(candidate) if candidate.improves_on(&best) => {
                    best = candidate;
                    solution_id += 1;
                    stale = 0;
                    tracing::debug!(
                        iteration,
                        solution_id,
                        valid = best.goal.met,
                        distance = best.distance,
                        "improved counterfactual"
                    );
                    let partial = self.result(&best, solution_id)?;
                    ctx.report(partial);
                }
                _ => stale += 1,
            }

            if best.goal.met && stale >= self.config.patience {
                tracing::debug!(iteration, "search converged");
                break;
            }
            tokio::task::yield_now().await;
        }

        tracing::info!(
            run_id = %ctx.run_id(),
            valid = best.goal.met,
            distance = best.distance,
            intermediates = ctx.delivered(),
            "counterfactual search finished"
        );
        self.result(&best, solution_id)
    }

    /// Mutate between one and `max_changed_features` free features of `from`.
    fn neighbour(&self, from: &[Value], originals: &[Value], free: &[usize], rng: &mut StdRng) -> Vec<Value> {
        let mut values = from.to_vec();
        let limit = self.config.max_changed_features.min(free.len()).max(1);
        let moves = rng.gen_range(1..=limit);
        let mutated: Vec<usize> = free.choose_multiple(rng, moves).copied().collect();

        for &i in &mutated {
            if values[i] != originals[i] && rng.gen_bool(REVERT_PROBABILITY) {
                values[i] = originals[i].clone();
            } else {
                values[i] = self.entities[i].sample(rng);
            }
        }

        // 超過可變更特徵上限時，還原較早的變更
        let mut older: Vec<usize> = free
            .iter()
            .copied()
            .filter(|i| values[*i] != originals[*i] && !mutated.contains(i))
            .collect();
        older.shuffle(rng);
        let mut changed = free.iter().filter(|&&i| values[i] != originals[i]).count();
        for i in older {
            if changed <= self.config.max_changed_features {
                break;
            }
            values[i] = originals[i].clone();
            changed -= 1;
        }
        values
    }

    /// Propose `values` on every entity and return the summed distance.
    fn apply(&mut self, values: &[Value]) -> Result<f64> {
        for (entity, value) in self.entities.iter_mut().zip(values) {
            if let Err(err) = entity.propose(value.clone()) {
                self.entities.iter_mut().for_each(CounterfactualEntity::reset);
                return Err(err);
            }
        }
        Ok(self.entities.iter().map(CounterfactualEntity::distance).sum())
    }

    fn current_input(&self) -> PredictionInput {
        PredictionInput::new(self.entities.iter().map(CounterfactualEntity::as_feature).collect())
    }

    fn result(&mut self, candidate: &Candidate, solution_id: u64) -> Result<CounterfactualResult> {
        let distance = self.apply(&candidate.values)?;
        let changed = self.entities.iter().filter(|e| e.is_changed()).count();
        Ok(CounterfactualResult {
            execution_id: self.execution_id,
            solution_id,
            features: self.current_input().features,
            output: candidate.output.clone(),
            valid: candidate.goal.met,
            distance,
            changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LinearModel;
    use crate::domain::FeatureDomain;

    fn decision(value: bool, score: f64) -> PredictionOutput {
        PredictionOutput::new(vec![Output::new("decision", Type::Boolean, value, score)])
    }

    #[test]
    fn test_flip_gap_uses_confidence() {
        let original = decision(true, 0.9);
        let same = flip_gap(&decision(true, 0.6), &original, 0.0);
        assert!(!same.met);
        assert_eq!(same.gap, 0.6);
        assert!(flip_gap(&decision(false, 0.7), &original, 0.0).met);
    }

    #[test]
    fn test_flip_on_numeric_outputs_uses_threshold() {
        let out = |v: f64| PredictionOutput::new(vec![Output::new("y", Type::Number, v, 1.0)]);
        assert!(!flip_gap(&out(1.005), &out(1.0), 0.01).met);
        assert!(flip_gap(&out(1.5), &out(1.0), 0.01).met);
    }

    #[test]
    fn test_target_gap_sums_numeric_distance() {
        let target = PredictionOutput::new(vec![Output::new("y", Type::Number, 10.0, 1.0)]);
        let candidate = PredictionOutput::new(vec![Output::new("y", Type::Number, 7.0, 1.0)]);
        let gap = target_gap(&candidate, &target, 0.5);
        assert!(!gap.met);
        assert_eq!(gap.gap, 3.0);
    }

    #[test]
    fn test_ranking_prefers_valid_then_closer() {
        let c = |met: bool, gap: f64, distance: f64| Candidate {
            values: vec![],
            output: decision(true, 1.0),
            goal: GoalGap { met, gap },
            distance,
        };
        assert!(c(true, 0.0, 5.0).improves_on(&c(false, 0.1, 0.0)));
        assert!(c(true, 0.0, 1.0).improves_on(&c(true, 0.0, 2.0)));
        assert!(!c(false, 0.5, 0.0).improves_on(&c(false, 0.4, 3.0)));
    }

    #[test]
    fn test_config_validation() {
        assert!(CounterfactualConfig::default().validate().is_ok());
        let config = CounterfactualConfig {
            batch_size: 0,
            ..CounterfactualConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_search_flips_linear_decision() {
        let model = LinearModel::new(-5.0).with_weight("income", 1.0);
        let input = PredictionInput::new(vec![
            Feature::number("income", 2.0).with_domain(FeatureDomain::numerical(0.0, 10.0)),
            Feature::text("note", "unchanged"),
        ]);
        let prediction = Prediction::new(input.clone(), model.evaluate(&input));
        let explainer = CounterfactualExplainer::new(CounterfactualConfig {
            seed: Some(7),
            ..CounterfactualConfig::default()
        });

        let result = explainer.explain_async(&prediction, Arc::new(model)).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.execution_id, prediction.execution_id);
        assert_eq!(result.features[1], input.features[1]);
        assert_eq!(result.output.by_name("decision").unwrap().value, Value::Bool(true));
        assert!(result.features[0].value().as_number().unwrap() > 5.0);
        assert_eq!(result.changed, 1);
    }

    #[tokio::test]
    async fn test_all_constrained_returns_original() {
        let model = LinearModel::new(1.0);
        let input = PredictionInput::new(vec![Feature::number("a", 1)]);
        let prediction = Prediction::new(input.clone(), model.evaluate(&input));
        let result = CounterfactualExplainer::default()
            .explain_async(&prediction, Arc::new(model))
            .await
            .unwrap();
        assert_eq!(result.solution_id, 0);
        assert!(!result.valid);
        assert_eq!(result.distance, 0.0);
        assert_eq!(result.features, input.features);
    }
}
