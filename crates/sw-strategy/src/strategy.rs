//! The generation strategy: an ordered arena of steps and a cursor that only
//! moves when the current step's transition criteria are all met.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use sw_types::{
    internal_error, invalid_strategy, validation_error, Experiment, GeneratorRun, StrategyError,
    SwResult, TrialIndex, TrialStatus,
};

use crate::criterion::{CriterionOutcome, UnmetReason};
use crate::model::{DefaultModelFactory, GenerationModel, ModelFactory};
use crate::step::{step_id, GenerationStep};

/// Where a step hands over once its criteria are met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transition {
    Step(usize),
    /// Past the last step: the strategy is completed.
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Active(usize),
    Completed,
}

/// Drives an experiment through an ordered sequence of generation steps.
///
/// Transition targets are resolved to step indices once, at construction.
/// The strategy owns its experiment and provides no internal locking: wrap
/// it in a mutex to share it between threads.
#[derive(Debug)]
pub struct GenerationStrategy {
    name: String,
    steps: Vec<GenerationStep>,
    transitions: Vec<Transition>,
    cursor: Cursor,
    experiment: Option<Experiment>,
    models: Vec<Option<Box<dyn GenerationModel>>>,
    model_factory: Box<dyn ModelFactory>,
    seed: Option<u64>,
}

impl GenerationStrategy {
    pub fn new(name: impl Into<String>, steps: Vec<GenerationStep>) -> SwResult<Self> {
        let name = name.into();
        if steps.is_empty() {
            return Err(invalid_strategy!("generation strategy {name} has no steps"));
        }

        let mut steps = steps;
        let last = steps.len() - 1;
        for (index, step) in steps.iter_mut().enumerate() {
            let next = (index < last).then(|| step_id(index + 1));
            step.bind(index, next)?;

            if index < last && step.is_unbounded() && !step.has_explicit_criteria() {
                return Err(invalid_strategy!(
                    "only the last step may set num_trials = -1 without explicit transition \
                     criteria, but step {index} of {name} does"
                ));
            }
        }

        let transitions = steps
            .iter()
            .enumerate()
            .map(|(index, step)| resolve_transition(index, step, steps.len()))
            .collect::<SwResult<Vec<_>>>()?;

        info!(strategy = %name, steps = steps.len(), "created generation strategy");
        let models = steps.iter().map(|_| None).collect();
        Ok(Self {
            name,
            steps,
            transitions,
            cursor: Cursor::Active(0),
            experiment: None,
            models,
            model_factory: Box::new(DefaultModelFactory),
            seed: None,
        })
    }

    /// Seed the models; step `i` uses `seed + i`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_model_factory(mut self, factory: impl ModelFactory + 'static) -> Self {
        self.model_factory = Box::new(factory);
        self.models.iter_mut().for_each(|model| *model = None);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[GenerationStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&GenerationStep> {
        self.steps.get(index)
    }

    pub fn transition_of(&self, index: usize) -> Option<Transition> {
        self.transitions.get(index).copied()
    }

    pub fn current_step_index(&self) -> Option<usize> {
        match self.cursor {
            Cursor::Active(index) => Some(index),
            Cursor::Completed => None,
        }
    }

    pub fn current_step(&self) -> Option<&GenerationStep> {
        self.current_step_index().map(|index| &self.steps[index])
    }

    pub fn is_completed(&self) -> bool {
        self.cursor == Cursor::Completed
    }

    pub fn experiment(&self) -> Option<&Experiment> {
        self.experiment.as_ref()
    }

    pub fn experiment_mut(&mut self) -> Option<&mut Experiment> {
        self.experiment.as_mut()
    }

    /// Bind the experiment. Once the bound experiment has trials it cannot be
    /// replaced; mutate it through [`Self::experiment_mut`] instead.
    pub fn set_experiment(&mut self, experiment: Experiment) -> SwResult<()> {
        if let Some(current) = &self.experiment {
            if current.num_trials() > 0 {
                return Err(StrategyError::ExperimentAlreadySet {
                    name: self.name.clone(),
                    experiment: current.name().to_string(),
                }
                .into());
            }
        }
        self.experiment = Some(experiment);
        Ok(())
    }

    pub fn trials_from_current_step(&self) -> SwResult<BTreeSet<TrialIndex>> {
        let experiment = self.experiment.as_ref().ok_or_else(|| self.not_set())?;
        Ok(self
            .current_step()
            .map(|step| step.trials_from_node(experiment))
            .unwrap_or_default())
    }

    fn not_set(&self) -> StrategyError {
        StrategyError::ExperimentNotSet {
            name: self.name.clone(),
        }
    }

    /// Move to the next step if every criterion of the current step is met.
    ///
    /// Returns `Ok(false)` while the step should keep going. With
    /// `raise_data_required_error`, a step held back only by missing data
    /// yields [`StrategyError::DataRequired`] instead.
    pub fn maybe_advance(&mut self, raise_data_required_error: bool) -> SwResult<bool> {
        let index = match self.cursor {
            Cursor::Active(index) => index,
            Cursor::Completed => return Ok(false),
        };
        let experiment = self
            .experiment
            .as_ref()
            .ok_or_else(|| StrategyError::ExperimentNotSet {
                name: self.name.clone(),
            })?;
        let step = &self.steps[index];

        // An uncapped final step keeps generating indefinitely.
        if step.is_unbounded() && !step.has_explicit_criteria() {
            debug!(step = index, "unbounded final step does not transition");
            return Ok(false);
        }

        let trials = step.trials_from_node(experiment);
        let outcomes: Vec<CriterionOutcome> = step
            .transition_criteria()
            .iter()
            .map(|criterion| criterion.evaluate(experiment, Some(&trials)))
            .collect();

        if outcomes.iter().all(CriterionOutcome::is_met) {
            let transition = self.transitions[index];
            self.cursor = match transition {
                Transition::Step(next) => Cursor::Active(next),
                Transition::Terminal => Cursor::Completed,
            };
            info!(
                strategy = %self.name,
                from = index,
                to = ?transition,
                trials = trials.len(),
                "transition criteria met, moving to next step"
            );
            return Ok(true);
        }

        let unmet: Vec<UnmetReason> = outcomes
            .iter()
            .filter_map(CriterionOutcome::unmet_reason)
            .collect();
        debug!(step = index, ?unmet, "transition criteria not met");

        let data_bound = unmet
            .iter()
            .all(|reason| matches!(reason, UnmetReason::InsufficientData { .. }));
        if raise_data_required_error && data_bound {
            return Err(StrategyError::DataRequired {
                message: format!(
                    "{} cannot complete until more data is observed: {unmet:?}",
                    step_id(index)
                ),
            }
            .into());
        }
        Ok(false)
    }

    /// Ask the current step's model for up to `n` candidates.
    pub fn gen(&mut self, n: usize) -> SwResult<GeneratorRun> {
        if n == 0 {
            return Err(validation_error!("number of candidates to generate must be positive"));
        }
        if self.experiment.is_none() {
            return Err(self.not_set().into());
        }

        // A step held back only by data can keep generating within its budget.
        self.maybe_advance(false)?;
        let index = match self.cursor {
            Cursor::Active(index) => index,
            Cursor::Completed => {
                return Err(StrategyError::Completed {
                    name: self.name.clone(),
                }
                .into())
            }
        };

        let experiment = self
            .experiment
            .as_ref()
            .ok_or_else(|| StrategyError::ExperimentNotSet {
                name: self.name.clone(),
            })?;
        let step = &self.steps[index];
        let from_step = step.trials_from_node(experiment);

        if let Some(max_parallelism) = step.max_parallelism() {
            let num_running = from_step
                .iter()
                .filter_map(|i| experiment.trial(*i))
                .filter(|trial| trial.status == TrialStatus::Running)
                .count();
            if num_running >= max_parallelism {
                return Err(StrategyError::MaxParallelismReached {
                    step: index,
                    num_running,
                    max_parallelism,
                }
                .into());
            }
        }

        let count = if step.enforce_num_trials() && !step.is_unbounded() {
            let remaining = (step.num_trials() as usize).saturating_sub(from_step.len());
            if remaining == 0 {
                return Err(StrategyError::DataRequired {
                    message: format!(
                        "all trials for {} have been generated, but its transition criteria \
                         are not met yet",
                        step_id(index)
                    ),
                }
                .into());
            }
            if n > remaining {
                debug!(
                    step = index,
                    requested = n,
                    remaining,
                    "clipping generation to step budget"
                );
            }
            n.min(remaining)
        } else {
            n
        };

        if self.models[index].is_none() {
            let seed = self.seed.map(|seed| seed.wrapping_add(index as u64));
            self.models[index] = Some(self.model_factory.build(step.model(), seed)?);
        }
        let Some(model) = self.models[index].as_mut() else {
            return Err(internal_error!("model for step {index} was not built"));
        };

        let candidates = model.suggest(count, experiment)?;
        debug!(
            step = index,
            model = model.name(),
            generated = candidates.len(),
            "generated candidates"
        );
        Ok(GeneratorRun::new(index, model.name(), candidates))
    }

    /// Generate up to `n` candidates and attach them to the experiment as trials.
    pub fn gen_trials(&mut self, n: usize) -> SwResult<Vec<TrialIndex>> {
        let run = self.gen(n)?;
        let experiment = self.experiment.as_mut().ok_or_else(|| StrategyError::ExperimentNotSet {
            name: self.name.clone(),
        })?;
        Ok(experiment.new_trials(&run))
    }
}

fn resolve_transition(
    index: usize,
    step: &GenerationStep,
    num_steps: usize,
) -> SwResult<Transition> {
    let Some(target) = step.transition_target()? else {
        return Ok(if index + 1 < num_steps {
            Transition::Step(index + 1)
        } else {
            Transition::Terminal
        });
    };

    let resolved = (0..num_steps)
        .find(|candidate| step_id(*candidate) == target)
        .ok_or_else(|| {
            invalid_strategy!(
                "{} names unknown transition target {target:?}",
                step_id(index)
            )
        })?;
    if resolved <= index {
        warn!(step = index, to = target, "transition target does not follow its source step");
    }
    Ok(Transition::Step(resolved))
}
