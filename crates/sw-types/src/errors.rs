use thiserror::Error;

/// Main error type for the Stepwise system
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Experiment error: {0}")]
    Experiment(#[from] ExperimentError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl SwError {
    /// True for the recoverable "fetch more data and retry" condition.
    pub fn is_data_required(&self) -> bool {
        matches!(self, SwError::Strategy(StrategyError::DataRequired { .. }))
    }

    /// True for structurally invalid strategy parameters.
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, SwError::Strategy(StrategyError::InvalidConfig { .. }))
    }
}

impl From<arrow::error::ArrowError> for SwError {
    fn from(err: arrow::error::ArrowError) -> Self {
        SwError::Arrow(err.to_string())
    }
}

/// Generation strategy errors
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Invalid strategy configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Data required: {message}")]
    DataRequired { message: String },

    #[error("Generation strategy {name} is completed: the last step's transition criteria are met")]
    Completed { name: String },

    #[error(
        "Max parallelism reached for step {step}: {num_running} running, limit {max_parallelism}"
    )]
    MaxParallelismReached {
        step: usize,
        num_running: usize,
        max_parallelism: usize,
    },

    #[error("No experiment is set on generation strategy {name}")]
    ExperimentNotSet { name: String },

    #[error("Generation strategy {name} is bound to experiment {experiment}, which has trials")]
    ExperimentAlreadySet { name: String, experiment: String },

    #[error("No model available for {model}")]
    UnknownModel { model: String },
}

/// Experiment-related errors
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Trial not found: {index}")]
    TrialNotFound { index: usize },

    #[error("Search space has no parameters")]
    EmptySearchSpace,

    #[error("Invalid search space parameter {parameter}: {message}")]
    InvalidSearchSpace { parameter: String, message: String },
}

/// Metric data errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Missing column: {name}")]
    MissingColumn { name: String },

    #[error("Invalid column {name}: {message}")]
    InvalidColumn { name: String, message: String },
}

/// Result type alias for Stepwise operations
pub type SwResult<T> = Result<T, SwError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::SwError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::SwError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::SwError::Config(format!($($arg)*))
    };
}

/// Macro for creating invalid strategy configuration errors
#[macro_export]
macro_rules! invalid_strategy {
    ($($arg:tt)*) => {
        $crate::SwError::Strategy($crate::StrategyError::InvalidConfig {
            message: format!($($arg)*),
        })
    };
}
