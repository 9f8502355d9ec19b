//! Serde-backed strategy configuration.
//!
//! A [`StrategyConfig`] is plain data. [`StrategyConfig::build`] goes through
//! the same constructors as hand-written code, so a configuration file is
//! validated exactly like a strategy assembled in Rust.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use sw_types::{SwResult, TrialStatus};

use crate::criterion::{
    MaxTrials, MinimumPreferenceOccurances, MinimumTrialsInStatus, TransitionCriterion,
};
use crate::model::ModelKind;
use crate::step::GenerationStep;
use crate::strategy::GenerationStrategy;

fn unbounded() -> i64 {
    -1
}

fn enabled() -> bool {
    true
}

/// Configuration of a whole generation strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub seed: Option<u64>,
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub model: ModelKind,
    #[serde(default = "unbounded")]
    pub num_trials: i64,
    #[serde(default)]
    pub max_parallelism: Option<usize>,
    #[serde(default)]
    pub min_trials_observed: usize,
    #[serde(default = "enabled")]
    pub enforce_num_trials: bool,
    #[serde(default)]
    pub transition_criteria: Vec<CriterionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CriterionConfig {
    MaxTrials {
        threshold: i64,
        #[serde(default = "enabled")]
        enforce: bool,
        #[serde(default)]
        only_in_status: Option<TrialStatus>,
        #[serde(default)]
        transition_to: Option<String>,
    },
    MinimumTrialsInStatus {
        status: TrialStatus,
        threshold: usize,
        #[serde(default)]
        transition_to: Option<String>,
    },
    MinimumPreferenceOccurances {
        metric_name: String,
        threshold: usize,
        #[serde(default)]
        transition_to: Option<String>,
    },
}

impl CriterionConfig {
    pub fn build(&self) -> SwResult<TransitionCriterion> {
        let criterion = match self {
            Self::MaxTrials {
                threshold,
                enforce,
                only_in_status,
                transition_to,
            } => {
                let mut c = MaxTrials::new(*threshold)?.with_enforce(*enforce);
                if let Some(status) = only_in_status {
                    c = c.with_only_in_status(*status);
                }
                if let Some(target) = transition_to {
                    c = c.with_transition_to(target.clone());
                }
                c.into()
            }
            Self::MinimumTrialsInStatus {
                status,
                threshold,
                transition_to,
            } => {
                let mut c = MinimumTrialsInStatus::new(*status, *threshold);
                if let Some(target) = transition_to {
                    c = c.with_transition_to(target.clone());
                }
                c.into()
            }
            Self::MinimumPreferenceOccurances {
                metric_name,
                threshold,
                transition_to,
            } => {
                let mut c = MinimumPreferenceOccurances::new(metric_name.clone(), *threshold);
                if let Some(target) = transition_to {
                    c = c.with_transition_to(target.clone());
                }
                c.into()
            }
        };
        Ok(criterion)
    }
}

impl StepConfig {
    pub fn build(&self) -> SwResult<GenerationStep> {
        let mut step = GenerationStep::new(self.model.clone(), self.num_trials)
            .with_min_trials_observed(self.min_trials_observed)
            .with_enforce_num_trials(self.enforce_num_trials);
        if let Some(max_parallelism) = self.max_parallelism {
            step = step.with_max_parallelism(max_parallelism);
        }
        if !self.transition_criteria.is_empty() {
            let criteria = self
                .transition_criteria
                .iter()
                .map(CriterionConfig::build)
                .collect::<SwResult<Vec<_>>>()?;
            step = step.with_transition_criteria(criteria);
        }
        Ok(step)
    }
}

impl StrategyConfig {
    pub fn from_json_str(json: &str) -> SwResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> SwResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading strategy configuration");
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn build(&self) -> SwResult<GenerationStrategy> {
        let steps = self
            .steps
            .iter()
            .map(StepConfig::build)
            .collect::<SwResult<Vec<_>>>()?;
        let strategy = GenerationStrategy::new(self.name.clone(), steps)?;
        Ok(match self.seed {
            Some(seed) => strategy.with_seed(seed),
            None => strategy,
        })
    }
}
