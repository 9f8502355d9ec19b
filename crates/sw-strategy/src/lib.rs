//! # sw-strategy
//!
//! Multi-step generation strategies for Stepwise.
//!
//! A [`GenerationStrategy`] walks an experiment through an ordered sequence of
//! [`GenerationStep`]s. Each step generates candidates with its own model and
//! hands over to its successor once all of its [`TransitionCriterion`]s are
//! met. Steps built without explicit criteria get `[MaxTrials,
//! MinimumTrialsInStatus]` synthesized from their parameters.

mod config;
mod criterion;
mod model;
mod step;
mod strategy;

#[cfg(test)]
mod test_support;

pub use config::{CriterionConfig, StepConfig, StrategyConfig};
pub use criterion::{
    CriterionOutcome, MaxTrials, MinimumPreferenceOccurances, MinimumTrialsInStatus,
    TransitionCriterion, UnmetReason, TRIALS_FROM_NODE_FALLBACK_WARNING,
};
pub use model::{
    BayesianModel, DefaultModelFactory, GenerationModel, ModelFactory, ModelKind, RandomModel,
};
pub use step::{step_id, GenerationStep};
pub use strategy::{GenerationStrategy, Transition};
