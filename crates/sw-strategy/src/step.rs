//! Generation steps: one phase of a strategy, its model and its exit rules.

use serde::Serialize;
use std::collections::BTreeSet;

use sw_types::{invalid_strategy, Experiment, SwResult, TrialIndex, TrialStatus};

use crate::criterion::{MaxTrials, MinimumTrialsInStatus, TransitionCriterion};
use crate::model::ModelKind;

/// Canonical identifier of the step at `index` (`"GenerationStep_{index}"`).
pub fn step_id(index: usize) -> String {
    format!("GenerationStep_{index}")
}

/// One phase of a generation strategy.
///
/// Criteria are either supplied explicitly or, when none are given,
/// synthesized from `num_trials`, `enforce_num_trials` and
/// `min_trials_observed` once the step is placed into a strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationStep {
    model: ModelKind,
    /// Trials this step should produce; `-1` for no limit.
    num_trials: i64,
    max_parallelism: Option<usize>,
    /// Only used to synthesize the default criteria.
    min_trials_observed: usize,
    enforce_num_trials: bool,
    transition_criteria: Vec<TransitionCriterion>,
    criteria_synthesized: bool,
    index: Option<usize>,
}

impl GenerationStep {
    pub fn new(model: ModelKind, num_trials: i64) -> Self {
        Self {
            model,
            num_trials,
            max_parallelism: None,
            min_trials_observed: 0,
            enforce_num_trials: true,
            transition_criteria: Vec::new(),
            criteria_synthesized: false,
            index: None,
        }
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = Some(max_parallelism);
        self
    }

    pub fn with_min_trials_observed(mut self, min_trials_observed: usize) -> Self {
        self.min_trials_observed = min_trials_observed;
        self
    }

    pub fn with_enforce_num_trials(mut self, enforce: bool) -> Self {
        self.enforce_num_trials = enforce;
        self
    }

    pub fn with_transition_criteria<I, C>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<TransitionCriterion>,
    {
        self.transition_criteria = criteria.into_iter().map(Into::into).collect();
        self.criteria_synthesized = false;
        self
    }

    pub fn model(&self) -> &ModelKind {
        &self.model
    }

    pub fn num_trials(&self) -> i64 {
        self.num_trials
    }

    pub fn is_unbounded(&self) -> bool {
        self.num_trials == -1
    }

    pub fn max_parallelism(&self) -> Option<usize> {
        self.max_parallelism
    }

    pub fn min_trials_observed(&self) -> usize {
        self.min_trials_observed
    }

    pub fn enforce_num_trials(&self) -> bool {
        self.enforce_num_trials
    }

    pub fn transition_criteria(&self) -> &[TransitionCriterion] {
        &self.transition_criteria
    }

    pub fn has_explicit_criteria(&self) -> bool {
        !self.criteria_synthesized && !self.transition_criteria.is_empty()
    }

    /// Position in the owning strategy, once bound.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn id(&self) -> Option<String> {
        self.index.map(step_id)
    }

    /// Place the step at `index`; `next` is the following step's id, `None`
    /// for the last step.
    pub(crate) fn bind(&mut self, index: usize, next: Option<String>) -> SwResult<()> {
        if self.num_trials < -1 {
            return Err(invalid_strategy!(
                "step {index}: num_trials must be -1 (unbounded) or non-negative, got {}",
                self.num_trials
            ));
        }
        if self.max_parallelism == Some(0) {
            return Err(invalid_strategy!("step {index}: max_parallelism must be positive"));
        }

        self.index = Some(index);
        if self.transition_criteria.is_empty() || self.criteria_synthesized {
            self.synthesize_default_criteria(next)?;
        }
        self.transition_target()?;
        Ok(())
    }

    fn synthesize_default_criteria(&mut self, next: Option<String>) -> SwResult<()> {
        let mut max_trials =
            MaxTrials::new(self.num_trials)?.with_enforce(self.enforce_num_trials);
        let mut min_completed =
            MinimumTrialsInStatus::new(TrialStatus::Completed, self.min_trials_observed);
        if let Some(next) = next {
            max_trials = max_trials.with_transition_to(next.clone());
            min_completed = min_completed.with_transition_to(next);
        }

        self.transition_criteria = vec![max_trials.into(), min_completed.into()];
        self.criteria_synthesized = true;
        Ok(())
    }

    /// The target named by this step's criteria. All criteria that name a
    /// target must name the same one.
    pub fn transition_target(&self) -> SwResult<Option<&str>> {
        let mut agreed: Option<&str> = None;
        for criterion in &self.transition_criteria {
            match (agreed, criterion.transition_to()) {
                (Some(current), Some(named)) if current != named => {
                    return Err(invalid_strategy!(
                        "criteria of step {} disagree on transition target: \
                         {current:?} vs {named:?}",
                        self.index.map_or_else(|| "<unbound>".to_string(), step_id)
                    ));
                }
                (None, Some(named)) => agreed = Some(named),
                _ => {}
            }
        }
        Ok(agreed)
    }

    /// Indices of the experiment's trials generated by this step.
    pub fn trials_from_node(&self, experiment: &Experiment) -> BTreeSet<TrialIndex> {
        let Some(index) = self.index else {
            return BTreeSet::new();
        };
        experiment
            .trials()
            .values()
            .filter(|trial| trial.generation_step == Some(index))
            .map(|trial| trial.index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::MinimumPreferenceOccurances;
    use crate::test_support::search_space;
    use sw_types::{GeneratorRun, Parameterization};

    #[test]
    fn default_criteria_are_synthesized_in_fixed_order() {
        let mut step = GenerationStep::new(ModelKind::Random, 3);
        step.bind(0, Some(step_id(1))).unwrap();

        let expected: Vec<TransitionCriterion> = vec![
            MaxTrials::new(3)
                .unwrap()
                .with_enforce(true)
                .with_transition_to("GenerationStep_1")
                .into(),
            MinimumTrialsInStatus::new(TrialStatus::Completed, 0)
                .with_transition_to("GenerationStep_1")
                .into(),
        ];
        assert_eq!(step.transition_criteria(), expected.as_slice());
        assert!(!step.has_explicit_criteria());
        assert_eq!(step.transition_target().unwrap(), Some("GenerationStep_1"));
    }

    #[test]
    fn terminal_step_synthesizes_without_target() {
        let mut step = GenerationStep::new(ModelKind::Random, 4)
            .with_min_trials_observed(2)
            .with_enforce_num_trials(false);
        step.bind(2, None).unwrap();

        let expected: Vec<TransitionCriterion> = vec![
            MaxTrials::new(4).unwrap().with_enforce(false).into(),
            MinimumTrialsInStatus::new(TrialStatus::Completed, 2).into(),
        ];
        assert_eq!(step.transition_criteria(), expected.as_slice());
        assert_eq!(step.transition_target().unwrap(), None);
        assert_eq!(step.id().as_deref(), Some("GenerationStep_2"));
    }

    #[test]
    fn explicit_criteria_are_kept() {
        let mut step = GenerationStep::new(ModelKind::Random, -1)
            .with_transition_criteria([MinimumPreferenceOccurances::new("m1", 3)]);
        step.bind(0, Some(step_id(1))).unwrap();

        assert!(step.has_explicit_criteria());
        assert_eq!(step.transition_criteria().len(), 1);
        assert_eq!(step.transition_target().unwrap(), None);
    }

    #[test]
    fn disagreeing_targets_are_rejected() {
        let mut step = GenerationStep::new(ModelKind::Random, 5).with_transition_criteria(vec![
            TransitionCriterion::from(
                MaxTrials::new(5).unwrap().with_transition_to("GenerationStep_1"),
            ),
            TransitionCriterion::from(
                MinimumTrialsInStatus::new(TrialStatus::Completed, 1)
                    .with_transition_to("GenerationStep_2"),
            ),
        ]);
        let err = step.bind(0, Some(step_id(1))).unwrap_err();
        assert!(err.is_invalid_config());
        assert!(err.to_string().contains("GenerationStep_0"));
    }

    #[test]
    fn partially_named_targets_agree() {
        let mut step = GenerationStep::new(ModelKind::Random, 5).with_transition_criteria(vec![
            TransitionCriterion::from(MaxTrials::new(5).unwrap()),
            TransitionCriterion::from(
                MinimumTrialsInStatus::new(TrialStatus::Completed, 1)
                    .with_transition_to("GenerationStep_2"),
            ),
        ]);
        step.bind(0, Some(step_id(1))).unwrap();
        assert_eq!(step.transition_target().unwrap(), Some("GenerationStep_2"));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut negative = GenerationStep::new(ModelKind::Random, -2);
        assert!(negative.bind(0, None).unwrap_err().is_invalid_config());

        let mut no_parallelism = GenerationStep::new(ModelKind::Random, 2).with_max_parallelism(0);
        assert!(no_parallelism.bind(0, None).unwrap_err().is_invalid_config());
    }

    #[test]
    fn trials_from_node_only_lists_own_trials() {
        let mut experiment = Experiment::new("exp", search_space());
        experiment.new_trials(&GeneratorRun::new(0, "random", vec![Parameterization::new(); 2]));
        experiment.new_trials(&GeneratorRun::new(1, "random", vec![Parameterization::new(); 3]));

        let mut first = GenerationStep::new(ModelKind::Random, 2);
        let unbound = first.clone();
        first.bind(0, Some(step_id(1))).unwrap();
        let mut second = GenerationStep::new(ModelKind::Random, -1);
        second.bind(1, None).unwrap();

        assert_eq!(first.trials_from_node(&experiment).into_iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(second.trials_from_node(&experiment).len(), 3);
        assert!(unbound.trials_from_node(&experiment).is_empty());
    }
}
