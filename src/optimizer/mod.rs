//! Constrained minimization primitive
//!
//! The portfolio engines and the frontier solver describe *what* to minimize
//! through a [`Problem`]; a [`Minimizer`] decides *how*. Every minimizer
//! reports a [`Termination`], and callers turn anything other than
//! convergence into an optimization failure with
//! [`Solution::require_converged`].
//!
//! ## Modules
//!
//! - `projected`: spectral projected gradient with an augmented-Lagrangian
//!   outer loop (the default minimizer)

mod projected;

pub use projected::ProjectedGradient;

use crate::error::{OptimizationFailure, Result, Termination};
use nalgebra::DVector;
use std::collections::BTreeMap;

/// Step used by the central-difference gradient
const FD_STEP: f64 = 1e-7;

/// A scalar function of the weight vector
pub trait Objective {
    /// Objective value at `x`
    fn value(&self, x: &DVector<f64>) -> f64;

    /// Gradient at `x`
    ///
    /// Defaults to central differences; implementors with a closed form
    /// should override it.
    fn gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut grad = DVector::zeros(x.len());
        let mut probe = x.clone();
        for i in 0..x.len() {
            let original = probe[i];
            probe[i] = original + FD_STEP;
            let forward = self.value(&probe);
            probe[i] = original - FD_STEP;
            let backward = self.value(&probe);
            probe[i] = original;
            grad[i] = (forward - backward) / (2.0 * FD_STEP);
        }
        grad
    }
}

/// Per-coordinate box bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Bounds {
    /// Same bounds on every coordinate
    pub fn uniform(n: usize, lower: f64, upper: f64) -> Self {
        Self {
            lower: DVector::from_element(n, lower),
            upper: DVector::from_element(n, upper),
        }
    }

    /// `[0, 1]` on every coordinate
    pub fn long_only(n: usize) -> Self {
        Self::uniform(n, 0.0, 1.0)
    }

    /// `[-1, 1]` on every coordinate
    pub fn with_short(n: usize) -> Self {
        Self::uniform(n, -1.0, 1.0)
    }

    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Check whether `x` lies inside the box, up to `tolerance`
    pub fn contains(&self, x: &DVector<f64>, tolerance: f64) -> bool {
        x.len() == self.len()
            && x.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(xi, (lo, hi))| *xi >= lo - tolerance && *xi <= hi + tolerance)
    }
}

/// Linear equality `coefficients · x = target`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearEquality {
    pub coefficients: DVector<f64>,
    pub target: f64,
}

impl LinearEquality {
    /// Signed residual at `x`
    pub fn residual(&self, x: &DVector<f64>) -> f64 {
        self.coefficients.dot(x) - self.target
    }
}

/// A bound- and equality-constrained minimization problem
pub struct Problem<'a> {
    /// Function to minimize
    pub objective: &'a dyn Objective,

    /// Starting point (projected onto the feasible box before use)
    pub initial: DVector<f64>,

    /// Box bounds on every coordinate
    pub bounds: Bounds,

    /// Optional budget constraint `sum(x) = budget`
    pub budget: Option<f64>,

    /// Additional linear equalities
    pub equalities: Vec<LinearEquality>,
}

impl<'a> Problem<'a> {
    pub fn new(objective: &'a dyn Objective, initial: DVector<f64>, bounds: Bounds) -> Self {
        Self {
            objective,
            initial,
            bounds,
            budget: None,
            equalities: Vec::new(),
        }
    }

    /// Require the coordinates to sum to `budget`
    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Require `coefficients · x = target`
    pub fn with_equality(mut self, coefficients: DVector<f64>, target: f64) -> Self {
        self.equalities.push(LinearEquality {
            coefficients,
            target,
        });
        self
    }

    pub fn dimension(&self) -> usize {
        self.initial.len()
    }
}

/// Outcome of a minimization
#[derive(Debug, Clone)]
pub struct Solution {
    /// Best iterate
    pub x: DVector<f64>,

    /// Objective value at `x`
    pub value: f64,

    /// Total inner iterations performed
    pub iterations: usize,

    /// Why the minimizer stopped
    pub termination: Termination,
}

impl Solution {
    pub fn is_converged(&self) -> bool {
        self.termination == Termination::Converged
    }

    /// Pass converged solutions through, turn everything else into a failure
    pub fn require_converged(
        self,
        problem: &str,
        parameters: BTreeMap<String, f64>,
    ) -> Result<Solution> {
        if self.is_converged() {
            return Ok(self);
        }

        tracing::debug!(
            problem = %problem,
            termination = %self.termination,
            iterations = self.iterations,
            "Minimizer did not converge"
        );

        Err(OptimizationFailure {
            problem: problem.to_string(),
            parameters,
            termination: self.termination,
            best_iterate: self.x.iter().copied().collect(),
            objective_value: self.value,
        }
        .into())
    }
}

/// A constrained minimization algorithm
///
/// Implementations must never report `Converged` for an iterate that
/// violates the bounds, the budget, or an equality beyond their tolerances.
pub trait Minimizer: Send + Sync {
    fn minimize(&self, problem: &Problem<'_>) -> Solution;
}
