//! Candidate generation models.
//!
//! A [`GenerationStep`](crate::GenerationStep) only carries a [`ModelKind`]
//! token. The strategy turns that token into a live [`GenerationModel`]
//! through a [`ModelFactory`] the first time the step generates.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use sw_types::{
    Experiment, ParameterDef, ParameterKind, ParameterValue, Parameterization, SearchSpace,
    StrategyError, SwResult,
};

fn default_exploration_weight() -> f64 {
    0.3
}

/// Which model a step generates with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    /// Independent uniform sampling of the search space.
    Random,
    /// Perturbation around the best observed trial, with random exploration.
    Bayesian {
        #[serde(default = "default_exploration_weight")]
        exploration_weight: f64,
    },
    /// A model only a caller-supplied factory knows how to build.
    Custom { name: String },
}

impl ModelKind {
    pub fn name(&self) -> &str {
        match self {
            Self::Random => "random",
            Self::Bayesian { .. } => "bayesian",
            Self::Custom { name } => name,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Produces candidate parameterizations for an experiment.
pub trait GenerationModel: Send + fmt::Debug {
    /// Propose `count` new candidates.
    fn suggest(&mut self, count: usize, experiment: &Experiment) -> SwResult<Vec<Parameterization>>;

    /// Human-readable model name.
    fn name(&self) -> &str;
}

/// Builds model instances from their tokens.
pub trait ModelFactory: Send + Sync + fmt::Debug {
    fn build(&self, kind: &ModelKind, seed: Option<u64>) -> SwResult<Box<dyn GenerationModel>>;
}

/// Factory for the built-in models. Rejects [`ModelKind::Custom`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultModelFactory;

impl ModelFactory for DefaultModelFactory {
    fn build(&self, kind: &ModelKind, seed: Option<u64>) -> SwResult<Box<dyn GenerationModel>> {
        match kind {
            ModelKind::Random => Ok(Box::new(RandomModel::new(seed))),
            ModelKind::Bayesian { exploration_weight } => {
                Ok(Box::new(BayesianModel::new(*exploration_weight, seed)))
            }
            ModelKind::Custom { name } => Err(StrategyError::UnknownModel {
                model: name.clone(),
            }
            .into()),
        }
    }
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn sample_value(rng: &mut ChaCha8Rng, param: &ParameterDef) -> ParameterValue {
    match &param.kind {
        ParameterKind::FloatRange { low, high } => {
            ParameterValue::Float(rng.gen_range(*low..=*high))
        }
        ParameterKind::IntRange { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
        ParameterKind::LogUniform { low, high } => {
            let log_val: f64 = rng.gen_range(low.ln()..=high.ln());
            ParameterValue::Float(log_val.exp())
        }
        ParameterKind::Choice { values } => {
            ParameterValue::Json(values[rng.gen_range(0..values.len())].clone())
        }
    }
}

fn sample_point(rng: &mut ChaCha8Rng, space: &SearchSpace) -> Parameterization {
    space
        .parameters
        .iter()
        .map(|param| (param.name.clone(), sample_value(rng, param)))
        .collect()
}

// ---- Random ----

/// Uniform random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomModel {
    rng: ChaCha8Rng,
}

impl RandomModel {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seeded_rng(seed),
        }
    }
}

impl GenerationModel for RandomModel {
    fn suggest(
        &mut self,
        count: usize,
        experiment: &Experiment,
    ) -> SwResult<Vec<Parameterization>> {
        let space = experiment.search_space();
        space.validate()?;
        Ok((0..count).map(|_| sample_point(&mut self.rng, space)).collect())
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bayesian (surrogate-free heuristic) ----

/// Exploit-or-explore model driven by the experiment's objective data.
///
/// With probability `exploration_weight` (or whenever nothing has been
/// observed) it samples uniformly; otherwise it perturbs the parameters of
/// the best observed trial. A real surrogate can be plugged in through a
/// custom [`ModelFactory`].
#[derive(Debug, Clone)]
pub struct BayesianModel {
    exploration_weight: f64,
    rng: ChaCha8Rng,
}

impl BayesianModel {
    pub fn new(exploration_weight: f64, seed: Option<u64>) -> Self {
        Self {
            exploration_weight: exploration_weight.clamp(0.0, 1.0),
            rng: seeded_rng(seed),
        }
    }

    /// Parameters of the trial with the best objective mean so far.
    fn best_observed(experiment: &Experiment) -> Option<&Parameterization> {
        let objective = experiment.objective()?;
        let data = experiment.fetch_metric_data(&objective.metric_name);

        let mut best: Option<(f64, &Parameterization)> = None;
        for row in data.rows().iter().filter(|row| row.mean.is_finite()) {
            let Some(trial) = experiment.trial(row.trial_index) else {
                continue;
            };
            let improves = best.map_or(true, |(incumbent, _)| {
                objective.direction.improves(row.mean, incumbent)
            });
            if improves {
                best = Some((row.mean, &trial.parameters));
            }
        }
        best.map(|(_, params)| params)
    }

    fn perturb(
        rng: &mut ChaCha8Rng,
        space: &SearchSpace,
        base: &Parameterization,
    ) -> Parameterization {
        let mut perturbed = Parameterization::new();
        for param in &space.parameters {
            let value = match (&param.kind, base.get(&param.name)) {
                (ParameterKind::FloatRange { low, high }, Some(ParameterValue::Float(v))) => {
                    let noise = rng.gen_range(-0.1..0.1) * (high - low);
                    ParameterValue::Float((v + noise).clamp(*low, *high))
                }
                (ParameterKind::IntRange { low, high }, Some(ParameterValue::Int(v))) => {
                    let delta: i64 = rng.gen_range(-2..=2);
                    ParameterValue::Int(v.saturating_add(delta).clamp(*low, *high))
                }
                (ParameterKind::LogUniform { low, high }, Some(ParameterValue::Float(v))) => {
                    let noise = rng.gen_range(-0.1..0.1) * (high.ln() - low.ln());
                    ParameterValue::Float((v.ln() + noise).exp().clamp(*low, *high))
                }
                // Categorical or missing base value: resample.
                _ => sample_value(rng, param),
            };
            perturbed.insert(param.name.clone(), value);
        }
        perturbed
    }
}

impl GenerationModel for BayesianModel {
    fn suggest(
        &mut self,
        count: usize,
        experiment: &Experiment,
    ) -> SwResult<Vec<Parameterization>> {
        let space = experiment.search_space();
        space.validate()?;
        let best = Self::best_observed(experiment);

        let mut candidates = Vec::with_capacity(count);
        for _ in 0..count {
            let explore = self.rng.gen::<f64>() < self.exploration_weight;
            let candidate = match best {
                Some(base) if !explore => Self::perturb(&mut self.rng, space, base),
                _ => sample_point(&mut self.rng, space),
            };
            candidates.push(candidate);
        }
        Ok(candidates)
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}
