//! Generate → evaluate → advance loop against a synthetic objective.
//!
//! Trials generated in one round are reported as running and complete at the
//! start of the next round, so `max_parallelism` and the completion-based
//! transition criteria both come into play.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use sw_strategy::GenerationStrategy;
use sw_types::{
    Experiment, MetricRow, ObjectiveDirection, ParameterKind, Parameterization, SearchSpace,
    StrategyError, SwError, SwResult, TrialIndex, TrialStatus,
};

use crate::config::{RunnerConfig, SimulationConfig};

/// Optimum of the synthetic objective, as a fraction of each parameter's range.
const OPTIMUM: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The strategy ran past its last step.
    StrategyCompleted,
    MaxRounds,
    /// The strategy needs data the simulation cannot produce.
    Stalled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestTrial {
    pub index: TrialIndex,
    pub mean: f64,
    pub parameters: Parameterization,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub strategy: String,
    pub rounds: usize,
    pub trials_generated: usize,
    pub trials_completed: usize,
    /// Trials attributed to each step index.
    pub trials_per_step: BTreeMap<usize, usize>,
    pub final_step: Option<usize>,
    pub stop_reason: StopReason,
    pub best: Option<BestTrial>,
}

pub struct Simulation {
    strategy: GenerationStrategy,
    config: SimulationConfig,
    rng: ChaCha8Rng,
}

impl Simulation {
    pub fn new(
        mut strategy: GenerationStrategy,
        experiment: Experiment,
        config: SimulationConfig,
    ) -> SwResult<Self> {
        if config.batch_size == 0 {
            return Err(sw_types::config_error!("simulation batch_size must be positive"));
        }
        strategy.set_experiment(experiment)?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self {
            strategy,
            config,
            rng,
        })
    }

    pub fn from_config(config: &RunnerConfig) -> SwResult<Self> {
        let strategy = config.strategy.build()?;
        let experiment = config.experiment.build()?;
        Self::new(strategy, experiment, config.simulation.clone())
    }

    pub fn strategy(&self) -> &GenerationStrategy {
        &self.strategy
    }

    pub fn run(&mut self) -> SwResult<RunSummary> {
        info!(
            strategy = self.strategy.name(),
            batch_size = self.config.batch_size,
            max_rounds = self.config.max_rounds,
            "starting simulation"
        );

        let mut rounds = 0;
        let mut stop_reason = StopReason::MaxRounds;
        while rounds < self.config.max_rounds {
            rounds += 1;
            let completed = self.complete_running()?;

            match self.strategy.gen_trials(self.config.batch_size) {
                Ok(indices) => {
                    debug!(round = rounds, generated = indices.len(), "generated trials");
                    let experiment = self.experiment_mut()?;
                    for index in indices {
                        experiment.trial_mut(index)?.mark_running();
                    }
                }
                Err(SwError::Strategy(StrategyError::Completed { .. })) => {
                    stop_reason = StopReason::StrategyCompleted;
                    break;
                }
                Err(SwError::Strategy(StrategyError::MaxParallelismReached { .. })) => {
                    debug!(round = rounds, "waiting for running trials");
                }
                Err(err) if err.is_data_required() => {
                    if completed == 0 && self.running().is_empty() {
                        warn!(
                            round = rounds,
                            error = %err,
                            "no pending trials can satisfy the current step"
                        );
                        stop_reason = StopReason::Stalled;
                        break;
                    }
                    debug!(round = rounds, "waiting for data");
                }
                Err(err) => return Err(err),
            }
        }

        let summary = self.summary(rounds, stop_reason);
        info!(
            rounds = summary.rounds,
            trials = summary.trials_generated,
            stop_reason = ?summary.stop_reason,
            "simulation finished"
        );
        Ok(summary)
    }

    fn experiment_mut(&mut self) -> SwResult<&mut Experiment> {
        let name = self.strategy.name().to_string();
        self.strategy
            .experiment_mut()
            .ok_or_else(|| StrategyError::ExperimentNotSet { name }.into())
    }

    fn running(&self) -> Vec<TrialIndex> {
        self.strategy
            .experiment()
            .map(|experiment| {
                experiment
                    .trial_indices_by_status(TrialStatus::Running)
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Evaluate every running trial and attach its observations.
    ///
    /// The preference signal is 1.0 for trials that beat the mean of their
    /// batch and 0.0 otherwise.
    fn complete_running(&mut self) -> SwResult<usize> {
        let running = self.running();
        if running.is_empty() {
            return Ok(0);
        }
        let noise = self.config.noise.abs();

        let (metric, direction, space) = {
            let experiment = self.experiment_mut()?;
            let (metric, direction) = experiment
                .objective()
                .map(|o| (o.metric_name.clone(), o.direction))
                .unwrap_or_else(|| ("objective".to_string(), ObjectiveDirection::Maximize));
            (metric, direction, experiment.search_space().clone())
        };

        let mut observed = Vec::with_capacity(running.len());
        for index in &running {
            let score = match self.strategy.experiment().and_then(|e| e.trial(*index)) {
                Some(trial) => synthetic_score(&space, &trial.parameters),
                None => continue,
            };
            observed.push((*index, score + self.sample_noise(noise)));
        }
        let batch_mean =
            observed.iter().map(|(_, o)| o).sum::<f64>() / observed.len().max(1) as f64;

        let preference_metric = self.config.preference_metric.clone();
        let experiment = self.experiment_mut()?;
        for (index, value) in &observed {
            experiment.trial_mut(*index)?.mark_completed();
            let mean = match direction {
                ObjectiveDirection::Maximize => *value,
                ObjectiveDirection::Minimize => -*value,
            };
            experiment.attach_row(MetricRow::new(*index, metric.clone(), mean, noise));
            if let Some(preference) = &preference_metric {
                let signal = if *value > batch_mean { 1.0 } else { 0.0 };
                experiment.attach_row(MetricRow::new(*index, preference.clone(), signal, 0.0));
            }
        }

        debug!(completed = observed.len(), batch_mean, "completed running trials");
        Ok(observed.len())
    }

    fn sample_noise(&mut self, amplitude: f64) -> f64 {
        if amplitude > 0.0 {
            self.rng.gen_range(-amplitude..amplitude)
        } else {
            0.0
        }
    }

    fn summary(&self, rounds: usize, stop_reason: StopReason) -> RunSummary {
        let mut summary = RunSummary {
            strategy: self.strategy.name().to_string(),
            rounds,
            trials_generated: 0,
            trials_completed: 0,
            trials_per_step: BTreeMap::new(),
            final_step: self.strategy.current_step_index(),
            stop_reason,
            best: None,
        };
        let Some(experiment) = self.strategy.experiment() else {
            return summary;
        };

        summary.trials_generated = experiment.num_trials();
        summary.trials_completed = experiment.trial_indices_by_status(TrialStatus::Completed).len();
        for trial in experiment.trials().values() {
            if let Some(step) = trial.generation_step {
                *summary.trials_per_step.entry(step).or_default() += 1;
            }
        }

        if let Some(objective) = experiment.objective() {
            for row in experiment.fetch_metric_data(&objective.metric_name).rows() {
                let better = summary
                    .best
                    .as_ref()
                    .map_or(true, |best| objective.direction.improves(row.mean, best.mean));
                if better {
                    if let Some(trial) = experiment.trial(row.trial_index) {
                        summary.best = Some(BestTrial {
                            index: row.trial_index,
                            mean: row.mean,
                            parameters: trial.parameters.clone(),
                        });
                    }
                }
            }
        }
        summary
    }
}

/// Negative squared distance to [`OPTIMUM`] in normalized parameter space.
fn synthetic_score(space: &SearchSpace, parameters: &Parameterization) -> f64 {
    space
        .parameters
        .iter()
        .filter_map(|param| {
            let value = parameters.get(&param.name)?.as_f64()?;
            let position = match &param.kind {
                ParameterKind::FloatRange { low, high } => (value - low) / (high - low),
                ParameterKind::IntRange { low, high } => {
                    (value - *low as f64) / ((high - low).max(1) as f64)
                }
                ParameterKind::LogUniform { low, high } => {
                    (value.ln() - low.ln()) / (high.ln() - low.ln())
                }
                ParameterKind::Choice { .. } => return None,
            };
            Some(-(position - OPTIMUM).powi(2))
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExperimentConfig, RunnerConfig};
    use std::io::Write;
    use sw_strategy::{GenerationStep, ModelKind, StrategyConfig};
    use sw_types::{Objective, ParameterValue};

    fn experiment_config() -> ExperimentConfig {
        ExperimentConfig {
            name: "quadratic".into(),
            search_space: SearchSpace::new().add_float("x", 0.0, 1.0).add_int("n", 0, 10),
            objective: Objective::new("objective", ObjectiveDirection::Maximize),
        }
    }

    fn simulation(max_rounds: usize) -> SimulationConfig {
        SimulationConfig {
            batch_size: 2,
            max_rounds,
            seed: Some(5),
            noise: 0.0,
            preference_metric: None,
        }
    }

    #[test]
    fn score_peaks_at_the_optimum() {
        let space = SearchSpace::new().add_float("x", 0.0, 1.0);
        let at = |x: f64| {
            let params: Parameterization = [("x".to_string(), ParameterValue::Float(x))].into();
            synthetic_score(&space, &params)
        };
        assert_eq!(at(OPTIMUM), 0.0);
        assert!(at(0.9) < at(0.5));
    }

    #[test]
    fn runs_a_two_step_strategy() {
        let strategy = GenerationStrategy::new(
            "Random+Bayesian",
            vec![
                GenerationStep::new(ModelKind::Random, 4).with_min_trials_observed(2),
                GenerationStep::new(ModelKind::Bayesian { exploration_weight: 0.3 }, -1)
                    .with_max_parallelism(2),
            ],
        )
        .unwrap()
        .with_seed(1);
        let experiment = experiment_config().build().unwrap();

        let mut sim = Simulation::new(strategy, experiment, simulation(8)).unwrap();
        let summary = sim.run().unwrap();

        assert_eq!(summary.stop_reason, StopReason::MaxRounds);
        assert_eq!(summary.rounds, 8);
        assert_eq!(summary.trials_per_step.get(&0), Some(&4));
        assert!(summary.trials_per_step.get(&1).copied().unwrap_or(0) > 0);
        assert_eq!(summary.final_step, Some(1));
        assert!(summary.best.is_some());
    }

    #[test]
    fn bounded_strategy_completes() {
        let strategy = GenerationStrategy::new(
            "Random",
            vec![GenerationStep::new(ModelKind::Random, 3)],
        )
        .unwrap();
        let experiment = experiment_config().build().unwrap();

        let summary = Simulation::new(strategy, experiment, simulation(10))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::StrategyCompleted);
        assert_eq!(summary.trials_generated, 3);
        assert_eq!(summary.final_step, None);
    }

    #[test]
    fn missing_preference_data_stalls() {
        let json = r#"{
            "name": "preference",
            "steps": [
                {"model": {"kind": "random"}, "num_trials": 2, "transition_criteria": [
                    {"type": "minimum_preference_occurances", "metric_name": "pref", "threshold": 1}
                ]},
                {"model": {"kind": "random"}}
            ]
        }"#;
        let strategy = StrategyConfig::from_json_str(json).unwrap().build().unwrap();
        let experiment = experiment_config().build().unwrap();

        let summary = Simulation::new(strategy, experiment, simulation(10))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::Stalled);
        assert_eq!(summary.final_step, Some(0));
    }

    #[test]
    fn preference_signal_unlocks_the_next_step() {
        let json = r#"{
            "experiment": {
                "name": "quadratic",
                "search_space": {"parameters": [
                    {"name": "x", "type": "float_range", "low": 0.0, "high": 1.0}
                ]},
                "objective": {"metric_name": "loss", "direction": "minimize"}
            },
            "strategy": {
                "name": "preference",
                "seed": 3,
                "steps": [
                    {"model": {"kind": "random"}, "transition_criteria": [
                        {"type": "minimum_preference_occurances",
                         "metric_name": "pref", "threshold": 1}
                    ]},
                    {"model": {"kind": "bayesian"}}
                ]
            },
            "simulation": {
                "batch_size": 3, "max_rounds": 12, "seed": 9, "preference_metric": "pref"
            }
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = RunnerConfig::from_path(file.path()).unwrap();
        let mut sim = Simulation::from_config(&config).unwrap();
        let summary = sim.run().unwrap();

        assert_eq!(summary.final_step, Some(1));
        assert!(summary.trials_per_step.contains_key(&1));
        let experiment = sim.strategy().experiment().unwrap();
        assert!(!experiment.fetch_metric_data("pref").is_empty());
        // Losses are distances to the optimum, up to the noise amplitude.
        assert!(experiment.fetch_metric_data("loss").means().all(|m| m > -0.011));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let strategy =
            GenerationStrategy::new("Random", vec![GenerationStep::new(ModelKind::Random, -1)])
                .unwrap();
        let config = SimulationConfig {
            batch_size: 0,
            ..SimulationConfig::default()
        };
        assert!(Simulation::new(strategy, experiment_config().build().unwrap(), config).is_err());
    }
}
