//! Shared fixtures for the unit tests of this crate.

use std::io;
use std::sync::{Arc, Mutex};

use sw_types::{
    Data, Experiment, MetricRow, Objective, ObjectiveDirection, Parameterization, SearchSpace,
    Trial, TrialStatus,
};

pub(crate) fn search_space() -> SearchSpace {
    SearchSpace::new()
        .add_float("x", 0.0, 1.0)
        .add_int("n", 1, 8)
}

/// An experiment whose i-th trial has the i-th status, all attributed to step 0.
pub(crate) fn experiment_with_statuses(statuses: &[TrialStatus]) -> Experiment {
    let mut experiment = Experiment::new("test_experiment", search_space())
        .with_objective(Objective::new("objective", ObjectiveDirection::Maximize));
    for status in statuses {
        let mut trial = Trial::new(0, Parameterization::new(), Some(0));
        trial.status = *status;
        experiment.add_trial(trial);
    }
    experiment
}

/// One row per mean for `metric`, attributed to trials 0, 1, 2, ...
pub(crate) fn preference_data(metric: &str, means: &[f64]) -> Data {
    Data::new(
        means
            .iter()
            .enumerate()
            .map(|(i, mean)| MetricRow::new(i, metric, *mean, 0.0))
            .collect(),
    )
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return what it logged at WARN and above.
pub(crate) fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (result, logs)
}
