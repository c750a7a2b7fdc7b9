//! Error types for the advisor

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Coarse classification of every error the crate can return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller supplied malformed or inconsistent data
    InvalidInput,

    /// Configuration is missing, malformed, or does not cover the request
    Configuration,

    /// The numeric solver did not produce a usable solution
    OptimizationFailure,

    /// The upstream data collaborator could not deliver returns
    DataUnavailable,
}

/// Why a minimization stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    /// Stationarity and feasibility tolerances were met
    Converged,

    /// The iteration budget ran out before the tolerances were met
    IterationLimit { iterations: usize },

    /// The constraint set is empty or the solver could not reach it
    Infeasible { reason: String },

    /// The caller abandoned the computation
    TimedOut { millis: u64 },
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged => write!(f, "converged"),
            Termination::IterationLimit { iterations } => {
                write!(f, "iteration limit reached after {} iterations", iterations)
            }
            Termination::Infeasible { reason } => write!(f, "infeasible constraints: {}", reason),
            Termination::TimedOut { millis } => write!(f, "timed out after {} ms", millis),
        }
    }
}

/// Details of a failed optimization
///
/// The best iterate is kept for diagnostics only. It must never be shown
/// as a portfolio recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationFailure {
    /// Problem that was attempted (e.g. "mean_variance", "frontier_point")
    pub problem: String,

    /// Scalar parameters of the attempted problem
    pub parameters: BTreeMap<String, f64>,

    /// Solver termination reason
    pub termination: Termination,

    /// Best iterate found before termination
    pub best_iterate: Vec<f64>,

    /// Objective value at the best iterate
    pub objective_value: f64,
}

impl fmt::Display for OptimizationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.problem, self.termination)?;
        if !self.parameters.is_empty() {
            let params: Vec<String> = self
                .parameters
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, " [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

/// Errors that can occur while assessing risk or building portfolios
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Optimization failed: {0}")]
    OptimizationFailure(Box<OptimizationFailure>),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdvisorError {
    /// Classify this error into one of the four caller-facing kinds
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdvisorError::InvalidInput(_) => ErrorKind::InvalidInput,
            AdvisorError::OptimizationFailure(_) => ErrorKind::OptimizationFailure,
            AdvisorError::DataUnavailable(_) => ErrorKind::DataUnavailable,
            AdvisorError::Configuration(_)
            | AdvisorError::Yaml(_)
            | AdvisorError::Json(_)
            | AdvisorError::Io(_) => ErrorKind::Configuration,
        }
    }

    /// Failure details when this is an optimization failure
    pub fn optimization_failure(&self) -> Option<&OptimizationFailure> {
        match self {
            AdvisorError::OptimizationFailure(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<OptimizationFailure> for AdvisorError {
    fn from(failure: OptimizationFailure) -> Self {
        AdvisorError::OptimizationFailure(Box::new(failure))
    }
}

pub type Result<T> = std::result::Result<T, AdvisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            AdvisorError::InvalidInput("x".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            AdvisorError::DataUnavailable("x".into()).kind(),
            ErrorKind::DataUnavailable
        );

        let yaml_err = serde_yaml::from_str::<Vec<f64>>("{not: [a list").unwrap_err();
        assert_eq!(AdvisorError::from(yaml_err).kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_optimization_failure_display() {
        let mut parameters = BTreeMap::new();
        parameters.insert("risk_aversion".to_string(), 3.5);

        let err = AdvisorError::from(OptimizationFailure {
            problem: "mean_variance".to_string(),
            parameters,
            termination: Termination::IterationLimit { iterations: 10 },
            best_iterate: vec![0.5, 0.5],
            objective_value: -0.1,
        });

        assert_eq!(err.kind(), ErrorKind::OptimizationFailure);
        let message = err.to_string();
        assert!(message.contains("mean_variance"));
        assert!(message.contains("iteration limit"));
        assert!(message.contains("risk_aversion=3.5"));
        assert_eq!(err.optimization_failure().unwrap().best_iterate, vec![0.5, 0.5]);
    }
}
