//! In-memory experiment: the owner of trials and their metric data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::data::{Data, MetricRow};
use crate::errors::{ExperimentError, SwResult};
use crate::search::SearchSpace;
use crate::trial::{GeneratorRun, Trial, TrialIndex, TrialStatus};

/// Unique experiment identifier.
pub type ExperimentId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    /// True when `candidate` is strictly better than `incumbent`.
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }
}

/// The metric a run is optimizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub metric_name: String,
    #[serde(default)]
    pub direction: ObjectiveDirection,
}

impl Objective {
    pub fn new(metric_name: impl Into<String>, direction: ObjectiveDirection) -> Self {
        Self {
            metric_name: metric_name.into(),
            direction,
        }
    }
}

/// Owns the trials of one optimization run and the metric data observed for them.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    id: ExperimentId,
    name: String,
    search_space: SearchSpace,
    objective: Option<Objective>,
    trials: BTreeMap<TrialIndex, Trial>,
    data: Data,
    created_at: DateTime<Utc>,
}

impl Experiment {
    pub fn new(name: impl Into<String>, search_space: SearchSpace) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            search_space,
            objective: None,
            trials: BTreeMap::new(),
            data: Data::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = Some(objective);
        self
    }

    pub fn id(&self) -> ExperimentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn search_space(&self) -> &SearchSpace {
        &self.search_space
    }

    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn trials(&self) -> &BTreeMap<TrialIndex, Trial> {
        &self.trials
    }

    pub fn num_trials(&self) -> usize {
        self.trials.len()
    }

    pub fn trial(&self, index: TrialIndex) -> Option<&Trial> {
        self.trials.get(&index)
    }

    pub fn trial_mut(&mut self, index: TrialIndex) -> SwResult<&mut Trial> {
        self.trials
            .get_mut(&index)
            .ok_or_else(|| ExperimentError::TrialNotFound { index }.into())
    }

    pub fn trial_indices_by_status(&self, status: TrialStatus) -> BTreeSet<TrialIndex> {
        self.trials
            .values()
            .filter(|trial| trial.status == status)
            .map(|trial| trial.index)
            .collect()
    }

    /// Create one trial per candidate in `run`, tagged with the run's step.
    pub fn new_trials(&mut self, run: &GeneratorRun) -> Vec<TrialIndex> {
        let mut created = Vec::with_capacity(run.len());
        for candidate in &run.candidates {
            let index = self.next_trial_index();
            self.trials.insert(
                index,
                Trial::new(index, candidate.clone(), Some(run.generation_step)),
            );
            created.push(index);
        }
        created
    }

    /// Add a trial created outside any generation step.
    pub fn add_trial(&mut self, mut trial: Trial) -> TrialIndex {
        let index = self.next_trial_index();
        trial.index = index;
        trial.arm_name = format!("{index}_0");
        self.trials.insert(index, trial);
        index
    }

    fn next_trial_index(&self) -> TrialIndex {
        self.trials.keys().next_back().map_or(0, |last| last + 1)
    }

    pub fn attach_data(&mut self, data: Data) {
        self.data.extend(data);
    }

    pub fn attach_row(&mut self, row: MetricRow) {
        self.data.push(row);
    }

    /// Snapshot of all metric data observed so far.
    pub fn fetch_data(&self) -> Data {
        self.data.clone()
    }

    pub fn fetch_metric_data(&self, metric_name: &str) -> Data {
        self.data.filter_by_metric(metric_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{ParameterValue, Parameterization};

    fn run(step: usize, n: usize) -> GeneratorRun {
        let candidates = (0..n)
            .map(|i| {
                let mut p = Parameterization::new();
                p.insert("x".into(), ParameterValue::Int(i as i64));
                p
            })
            .collect();
        GeneratorRun::new(step, "random", candidates)
    }

    #[test]
    fn new_trials_assigns_sequential_indices_and_step() {
        let mut experiment = Experiment::new("exp", SearchSpace::new().add_int("x", 0, 9));
        let first = experiment.new_trials(&run(0, 2));
        let second = experiment.new_trials(&run(1, 1));

        assert_eq!(first, vec![0, 1]);
        assert_eq!(second, vec![2]);
        assert_eq!(experiment.trial(2).unwrap().generation_step, Some(1));
        assert_eq!(experiment.trial(1).unwrap().arm_name, "1_0");
    }

    #[test]
    fn trial_status_queries() {
        let mut experiment = Experiment::new("exp", SearchSpace::new().add_int("x", 0, 9));
        experiment.new_trials(&run(0, 3));
        experiment.trial_mut(1).unwrap().mark_running().mark_completed();

        let completed = experiment.trial_indices_by_status(TrialStatus::Completed);
        assert_eq!(completed.into_iter().collect::<Vec<_>>(), vec![1]);
        assert!(experiment.trial_mut(7).is_err());
    }

    #[test]
    fn fetch_data_is_a_snapshot() {
        let mut experiment = Experiment::new("exp", SearchSpace::new().add_int("x", 0, 9));
        experiment.attach_row(MetricRow::new(0, "m1", 1.0, 0.0));
        let before = experiment.fetch_data();

        experiment.attach_row(MetricRow::new(1, "m1", 0.0, 0.0));
        assert_eq!(before.len(), 1);
        assert_eq!(experiment.fetch_data().len(), 2);
        assert_eq!(experiment.fetch_metric_data("m2").len(), 0);
    }

    #[test]
    fn objective_direction_comparison() {
        assert!(ObjectiveDirection::Maximize.improves(2.0, 1.0));
        assert!(ObjectiveDirection::Minimize.improves(1.0, 2.0));
        assert!(!ObjectiveDirection::Minimize.improves(2.0, 2.0));
    }
}
