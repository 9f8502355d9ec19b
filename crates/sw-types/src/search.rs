//! Search space definitions and parameter values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{ExperimentError, SwResult};

/// One candidate point: parameter name to concrete value.
pub type Parameterization = BTreeMap<String, ParameterValue>;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Human-readable parameter name (e.g. "learning_rate").
    pub name: String,
    /// The kind of search range.
    #[serde(flatten)]
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

/// A concrete parameter value produced by a generation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    /// Check that every dimension can actually be sampled.
    pub fn validate(&self) -> SwResult<()> {
        if self.parameters.is_empty() {
            return Err(ExperimentError::EmptySearchSpace.into());
        }

        for param in &self.parameters {
            let problem = match &param.kind {
                ParameterKind::FloatRange { low, high }
                    if !(low.is_finite() && high.is_finite()) =>
                {
                    Some("bounds must be finite".to_string())
                }
                ParameterKind::FloatRange { low, high } if low > high => {
                    Some(format!("low {low} exceeds high {high}"))
                }
                ParameterKind::FloatRange { low, high } if !(high - low).is_finite() => {
                    Some(format!("width of [{low}, {high}] overflows"))
                }
                ParameterKind::IntRange { low, high } if low > high => {
                    Some(format!("low {low} exceeds high {high}"))
                }
                ParameterKind::LogUniform { low, high }
                    if !(low.is_finite() && high.is_finite()) =>
                {
                    Some("bounds must be finite".to_string())
                }
                ParameterKind::LogUniform { low, high } if *low <= 0.0 || *high <= 0.0 => {
                    Some("log-uniform bounds must be positive".to_string())
                }
                ParameterKind::LogUniform { low, high } if low > high => {
                    Some(format!("low {low} exceeds high {high}"))
                }
                ParameterKind::Choice { values } if values.is_empty() => {
                    Some("choice has no values".to_string())
                }
                _ => None,
            };

            if let Some(message) = problem {
                return Err(ExperimentError::InvalidSearchSpace {
                    parameter: param.name.clone(),
                    message,
                }
                .into());
            }
        }

        Ok(())
    }
}
