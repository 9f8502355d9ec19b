//! Transition criteria: rules deciding when a generation step has gathered
//! enough evidence to hand over to its successor.
//!
//! The set of criteria is closed. Each kind is a plain value type and
//! [`TransitionCriterion`] dispatches over them with an exhaustive `match`.
//! Trial-based criteria accept an optional trial scope; without one they fall
//! back to every trial of the experiment and log
//! [`TRIALS_FROM_NODE_FALLBACK_WARNING`].

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

use sw_types::{invalid_strategy, Experiment, SwResult, Trial, TrialIndex, TrialStatus};

/// Logged whenever a criterion is evaluated without a trial scope. External
/// tooling matches on this text.
pub const TRIALS_FROM_NODE_FALLBACK_WARNING: &str =
    "trials_from_node is None, will check threshold on experiment level";

/// Why a criterion is not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmetReason {
    /// Too few trials have been generated (or reached the counted status).
    InsufficientTrials { counted: usize, required: usize },
    /// Too few observed outcomes or metric values.
    InsufficientData { observed: usize, required: usize },
}

/// Result of evaluating one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionOutcome {
    Met,
    Unmet(UnmetReason),
}

impl CriterionOutcome {
    pub fn is_met(&self) -> bool {
        matches!(self, Self::Met)
    }

    pub fn unmet_reason(&self) -> Option<UnmetReason> {
        match self {
            Self::Met => None,
            Self::Unmet(reason) => Some(*reason),
        }
    }

    /// Unmet purely because of missing data rather than missing trials.
    pub fn is_data_bound(&self) -> bool {
        matches!(self, Self::Unmet(UnmetReason::InsufficientData { .. }))
    }

    fn trials(counted: usize, required: usize) -> Self {
        if counted >= required {
            Self::Met
        } else {
            Self::Unmet(UnmetReason::InsufficientTrials { counted, required })
        }
    }

    fn data(observed: usize, required: usize) -> Self {
        if observed >= required {
            Self::Met
        } else {
            Self::Unmet(UnmetReason::InsufficientData { observed, required })
        }
    }
}

fn scoped_trials<'a>(
    experiment: &'a Experiment,
    trials_from_node: Option<&BTreeSet<TrialIndex>>,
) -> Vec<&'a Trial> {
    match trials_from_node {
        Some(indices) => indices
            .iter()
            .filter_map(|index| experiment.trial(*index))
            .collect(),
        None => {
            warn!("{TRIALS_FROM_NODE_FALLBACK_WARNING}");
            experiment.trials().values().collect()
        }
    }
}

fn fmt_target(target: &Option<String>) -> String {
    match target {
        Some(target) => format!("{target:?}"),
        None => "None".to_string(),
    }
}

// ---------------------------------------------------------------------------
// MaxTrials
// ---------------------------------------------------------------------------

/// Met once the step has produced `threshold` trials.
///
/// A threshold of `-1` means "uncapped" and is always met, as is any
/// criterion with `enforce == false`. With `only_in_status` set, only trials
/// in that status are counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MaxTrials {
    threshold: i64,
    enforce: bool,
    only_in_status: Option<TrialStatus>,
    transition_to: Option<String>,
}

impl MaxTrials {
    pub fn new(threshold: i64) -> SwResult<Self> {
        if threshold < -1 {
            return Err(invalid_strategy!(
                "MaxTrials threshold must be -1 (uncapped) or non-negative, got {threshold}"
            ));
        }
        Ok(Self {
            threshold,
            enforce: true,
            only_in_status: None,
            transition_to: None,
        })
    }

    pub fn with_enforce(mut self, enforce: bool) -> Self {
        self.enforce = enforce;
        self
    }

    pub fn with_only_in_status(mut self, status: TrialStatus) -> Self {
        self.only_in_status = Some(status);
        self
    }

    pub fn with_transition_to(mut self, target: impl Into<String>) -> Self {
        self.transition_to = Some(target.into());
        self
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn enforce(&self) -> bool {
        self.enforce
    }

    pub fn only_in_status(&self) -> Option<TrialStatus> {
        self.only_in_status
    }

    pub fn transition_to(&self) -> Option<&str> {
        self.transition_to.as_deref()
    }

    pub fn evaluate(
        &self,
        experiment: &Experiment,
        trials_from_node: Option<&BTreeSet<TrialIndex>>,
    ) -> CriterionOutcome {
        let trials = scoped_trials(experiment, trials_from_node);
        if self.threshold == -1 || !self.enforce {
            return CriterionOutcome::Met;
        }

        let counted = match self.only_in_status {
            Some(status) => trials.iter().filter(|t| t.status == status).count(),
            None => trials.len(),
        };
        CriterionOutcome::trials(counted, self.threshold as usize)
    }
}

impl fmt::Display for MaxTrials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self
            .only_in_status
            .map_or_else(|| "None".to_string(), |s| s.to_string());
        write!(
            f,
            "MaxTrials(threshold={}, enforce={}, only_in_status={}, transition_to={})",
            self.threshold,
            self.enforce,
            status,
            fmt_target(&self.transition_to)
        )
    }
}

// ---------------------------------------------------------------------------
// MinimumTrialsInStatus
// ---------------------------------------------------------------------------

/// Met once at least `threshold` scoped trials are in `status`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MinimumTrialsInStatus {
    status: TrialStatus,
    threshold: usize,
    transition_to: Option<String>,
}

impl MinimumTrialsInStatus {
    pub fn new(status: TrialStatus, threshold: usize) -> Self {
        Self {
            status,
            threshold,
            transition_to: None,
        }
    }

    pub fn with_transition_to(mut self, target: impl Into<String>) -> Self {
        self.transition_to = Some(target.into());
        self
    }

    pub fn status(&self) -> TrialStatus {
        self.status
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn transition_to(&self) -> Option<&str> {
        self.transition_to.as_deref()
    }

    pub fn evaluate(
        &self,
        experiment: &Experiment,
        trials_from_node: Option<&BTreeSet<TrialIndex>>,
    ) -> CriterionOutcome {
        let trials = scoped_trials(experiment, trials_from_node);
        let counted = trials.iter().filter(|t| t.status == self.status).count();

        // Waiting on completions is a data shortfall only once enough trials
        // exist to satisfy the threshold.
        if self.status == TrialStatus::Completed && trials.len() >= self.threshold {
            CriterionOutcome::data(counted, self.threshold)
        } else {
            CriterionOutcome::trials(counted, self.threshold)
        }
    }
}

impl fmt::Display for MinimumTrialsInStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MinimumTrialsInStatus(status={}, threshold={}, transition_to={})",
            self.status,
            self.threshold,
            fmt_target(&self.transition_to)
        )
    }
}

// ---------------------------------------------------------------------------
// MinimumPreferenceOccurances
// ---------------------------------------------------------------------------

/// Met once a binary preference metric has been observed at least
/// `threshold` times on each side.
///
/// Means above zero count as one class ("yes") and means at or below zero as
/// the other ("no"). Non-finite means belong to neither class. Data is fetched
/// fresh on every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MinimumPreferenceOccurances {
    metric_name: String,
    threshold: usize,
    transition_to: Option<String>,
}

impl MinimumPreferenceOccurances {
    pub fn new(metric_name: impl Into<String>, threshold: usize) -> Self {
        Self {
            metric_name: metric_name.into(),
            threshold,
            transition_to: None,
        }
    }

    pub fn with_transition_to(mut self, target: impl Into<String>) -> Self {
        self.transition_to = Some(target.into());
        self
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn transition_to(&self) -> Option<&str> {
        self.transition_to.as_deref()
    }

    pub fn evaluate(&self, experiment: &Experiment) -> CriterionOutcome {
        let data = experiment.fetch_metric_data(&self.metric_name);
        let (yes, no) = data
            .means()
            .filter(|mean| mean.is_finite())
            .fold((0usize, 0usize), |(yes, no), mean| {
                if mean > 0.0 {
                    (yes + 1, no)
                } else {
                    (yes, no + 1)
                }
            });

        debug!(
            metric = %self.metric_name,
            yes,
            no,
            threshold = self.threshold,
            "counted preference occurrences"
        );
        CriterionOutcome::data(yes.min(no), self.threshold)
    }
}

impl fmt::Display for MinimumPreferenceOccurances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MinimumPreferenceOccurances(metric_name={:?}, threshold={}, transition_to={})",
            self.metric_name,
            self.threshold,
            fmt_target(&self.transition_to)
        )
    }
}

// ---------------------------------------------------------------------------
// Common contract
// ---------------------------------------------------------------------------

/// Any of the supported transition criteria.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionCriterion {
    MaxTrials(MaxTrials),
    MinimumTrialsInStatus(MinimumTrialsInStatus),
    MinimumPreferenceOccurances(MinimumPreferenceOccurances),
}

impl TransitionCriterion {
    /// Whether the criterion holds for the given trial scope. `None` widens
    /// the scope to the whole experiment and logs a warning.
    pub fn is_met(
        &self,
        experiment: &Experiment,
        trials_from_node: Option<&BTreeSet<TrialIndex>>,
    ) -> bool {
        self.evaluate(experiment, trials_from_node).is_met()
    }

    pub fn evaluate(
        &self,
        experiment: &Experiment,
        trials_from_node: Option<&BTreeSet<TrialIndex>>,
    ) -> CriterionOutcome {
        let outcome = match self {
            Self::MaxTrials(c) => c.evaluate(experiment, trials_from_node),
            Self::MinimumTrialsInStatus(c) => c.evaluate(experiment, trials_from_node),
            Self::MinimumPreferenceOccurances(c) => c.evaluate(experiment),
        };
        debug!(criterion = %self, ?outcome, "evaluated transition criterion");
        outcome
    }

    /// Identifier of the step this criterion hands over to, if named.
    pub fn transition_to(&self) -> Option<&str> {
        match self {
            Self::MaxTrials(c) => c.transition_to(),
            Self::MinimumTrialsInStatus(c) => c.transition_to(),
            Self::MinimumPreferenceOccurances(c) => c.transition_to(),
        }
    }
}

impl From<MaxTrials> for TransitionCriterion {
    fn from(criterion: MaxTrials) -> Self {
        Self::MaxTrials(criterion)
    }
}

impl From<MinimumTrialsInStatus> for TransitionCriterion {
    fn from(criterion: MinimumTrialsInStatus) -> Self {
        Self::MinimumTrialsInStatus(criterion)
    }
}

impl From<MinimumPreferenceOccurances> for TransitionCriterion {
    fn from(criterion: MinimumPreferenceOccurances) -> Self {
        Self::MinimumPreferenceOccurances(criterion)
    }
}

impl fmt::Display for TransitionCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxTrials(c) => fmt::Display::fmt(c, f),
            Self::MinimumTrialsInStatus(c) => fmt::Display::fmt(c, f),
            Self::MinimumPreferenceOccurances(c) => fmt::Display::fmt(c, f),
        }
    }
}
