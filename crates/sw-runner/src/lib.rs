//! # sw-runner
//!
//! Drives a Stepwise generation strategy against a synthetic objective.
//!
//! A [`RunnerConfig`] names the experiment, the strategy and the simulation
//! knobs; [`Simulation::run`] repeats generate → evaluate → advance and returns
//! a [`RunSummary`].

mod config;
mod simulation;

pub use config::{ExperimentConfig, RunnerConfig, SimulationConfig};
pub use simulation::{BestTrial, RunSummary, Simulation, StopReason};
