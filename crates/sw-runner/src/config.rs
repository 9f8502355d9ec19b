//! Run configuration: the experiment, the strategy and the simulation knobs.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use sw_strategy::StrategyConfig;
use sw_types::{Experiment, Objective, ObjectiveDirection, SearchSpace, SwResult};

fn default_objective() -> Objective {
    Objective::new("objective", ObjectiveDirection::Maximize)
}

fn default_batch_size() -> usize {
    2
}

fn default_max_rounds() -> usize {
    20
}

fn default_noise() -> f64 {
    0.01
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub search_space: SearchSpace,
    #[serde(default = "default_objective")]
    pub objective: Objective,
}

impl ExperimentConfig {
    pub fn build(&self) -> SwResult<Experiment> {
        self.search_space.validate()?;
        Ok(Experiment::new(self.name.clone(), self.search_space.clone())
            .with_objective(self.objective.clone()))
    }
}

/// How the synthetic evaluation loop behaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Candidates requested per round.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Seeds the synthetic objective noise.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Amplitude of the uniform noise added to each observation.
    #[serde(default = "default_noise")]
    pub noise: f64,
    /// Also report a pairwise preference signal under this metric name.
    #[serde(default)]
    pub preference_metric: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_rounds: default_max_rounds(),
            seed: None,
            noise: default_noise(),
            preference_metric: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub experiment: ExperimentConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl RunnerConfig {
    pub fn from_json_str(json: &str) -> SwResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> SwResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading run configuration");
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
