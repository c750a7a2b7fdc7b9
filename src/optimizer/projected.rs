//! Spectral projected gradient with augmented-Lagrangian equalities
//!
//! Bounds and the budget constraint are enforced exactly by Euclidean
//! projection onto `{lo <= x <= hi, sum(x) = budget}`; the projection shift
//! is found by bisection. Extra linear equalities are handled by an
//! augmented-Lagrangian outer loop. Inner iterations use Barzilai-Borwein
//! trial steps with Armijo backtracking along the projected direction.

use super::{Bounds, LinearEquality, Minimizer, Objective, Problem, Solution};
use crate::config::SolverConfig;
use crate::error::Termination;
use nalgebra::DVector;

const ARMIJO: f64 = 1e-4;
const MIN_LINE_STEP: f64 = 1e-14;
const MIN_SPECTRAL_STEP: f64 = 1e-10;
const MAX_SPECTRAL_STEP: f64 = 1e10;
const BISECTION_ROUNDS: usize = 200;
const INITIAL_PENALTY: f64 = 10.0;
const MAX_PENALTY: f64 = 1e12;
const PENALTY_GROWTH: f64 = 10.0;
/// Required residual reduction per outer iteration before the penalty grows
const RESIDUAL_REDUCTION: f64 = 0.25;

/// Default constrained minimizer
#[derive(Debug, Clone, Default)]
pub struct ProjectedGradient {
    config: SolverConfig,
}

/// Objective plus augmented-Lagrangian terms for the extra equalities
struct Augmented<'a> {
    objective: &'a dyn Objective,
    equalities: &'a [LinearEquality],
    multipliers: &'a [f64],
    penalty: f64,
}

impl Augmented<'_> {
    fn value(&self, x: &DVector<f64>) -> f64 {
        let mut value = self.objective.value(x);
        for (eq, lambda) in self.equalities.iter().zip(self.multipliers) {
            let h = eq.residual(x);
            value += lambda * h + 0.5 * self.penalty * h * h;
        }
        value
    }

    fn gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut grad = self.objective.gradient(x);
        for (eq, lambda) in self.equalities.iter().zip(self.multipliers) {
            let h = eq.residual(x);
            grad.axpy(lambda + self.penalty * h, &eq.coefficients, 1.0);
        }
        grad
    }
}

struct InnerOutcome {
    x: DVector<f64>,
    iterations: usize,
    stationary: bool,
}

impl ProjectedGradient {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn solve_inner(
        &self,
        augmented: &Augmented<'_>,
        start: DVector<f64>,
        bounds: &Bounds,
        budget: Option<f64>,
    ) -> InnerOutcome {
        let mut x = start;
        let mut value = augmented.value(&x);
        let mut grad = augmented.gradient(&x);
        let mut spectral_step = 1.0;

        for iteration in 0..self.config.max_iterations {
            let unit_step = project(&(&x - &grad), bounds, budget);
            let residual = (&unit_step - &x).amax();
            if residual <= self.config.tolerance * grad.amax().max(1.0) {
                return InnerOutcome {
                    x,
                    iterations: iteration,
                    stationary: true,
                };
            }

            let trial = project(&(&x - &grad * spectral_step), bounds, budget);
            let direction = &trial - &x;
            let slope = grad.dot(&direction);

            let mut t = 1.0;
            let mut accepted = None;
            while t >= MIN_LINE_STEP {
                let candidate = &x + &direction * t;
                let candidate_value = augmented.value(&candidate);
                if candidate_value <= value + ARMIJO * t * slope {
                    accepted = Some((candidate, candidate_value));
                    break;
                }
                t *= 0.5;
            }

            let Some((next, next_value)) = accepted else {
                // No descent is representable at this precision
                return InnerOutcome {
                    x,
                    iterations: iteration,
                    stationary: residual <= self.config.tolerance.sqrt(),
                };
            };

            let next_grad = augmented.gradient(&next);
            let s = &next - &x;
            let y = &next_grad - &grad;
            let sy = s.dot(&y);
            spectral_step = if sy > 0.0 {
                (s.dot(&s) / sy).clamp(MIN_SPECTRAL_STEP, MAX_SPECTRAL_STEP)
            } else {
                MAX_SPECTRAL_STEP
            };

            x = next;
            value = next_value;
            grad = next_grad;
        }

        let unit_step = project(&(&x - &grad), bounds, budget);
        let stationary =
            (&unit_step - &x).amax() <= self.config.tolerance * grad.amax().max(1.0);

        InnerOutcome {
            x,
            iterations: self.config.max_iterations,
            stationary,
        }
    }
}

impl Minimizer for ProjectedGradient {
    fn minimize(&self, problem: &Problem<'_>) -> Solution {
        let n = problem.dimension();
        let bounds = &problem.bounds;
        let infeasible = |reason: String| Solution {
            x: problem.initial.clone(),
            value: f64::NAN,
            iterations: 0,
            termination: Termination::Infeasible { reason },
        };

        if bounds.len() != n || problem.equalities.iter().any(|eq| eq.coefficients.len() != n) {
            return infeasible(format!("constraint dimensions do not match {} variables", n));
        }
        if bounds
            .lower()
            .iter()
            .zip(bounds.upper().iter())
            .any(|(lo, hi)| lo > hi)
        {
            return infeasible("lower bound exceeds upper bound".to_string());
        }

        let tolerance = self.config.feasibility_tolerance;
        if let Some(budget) = problem.budget {
            let (min_sum, max_sum) = (bounds.lower().sum(), bounds.upper().sum());
            if budget < min_sum - tolerance || budget > max_sum + tolerance {
                return infeasible(format!(
                    "budget {} outside attainable range [{}, {}]",
                    budget, min_sum, max_sum
                ));
            }
        }
        for eq in &problem.equalities {
            let (low, high) = linear_range(&eq.coefficients, bounds, problem.budget);
            if eq.target < low - tolerance || eq.target > high + tolerance {
                return infeasible(format!(
                    "equality target {} outside attainable range [{}, {}]",
                    eq.target, low, high
                ));
            }
        }

        let mut x = project(&problem.initial, bounds, problem.budget);
        let mut multipliers = vec![0.0; problem.equalities.len()];
        let mut penalty = INITIAL_PENALTY;
        let mut iterations = 0;
        let mut previous_residual = f64::INFINITY;
        let mut stationary = false;
        let mut max_residual = 0.0;

        let outer_rounds = if problem.equalities.is_empty() {
            1
        } else {
            self.config.max_outer_iterations
        };

        for _ in 0..outer_rounds {
            let augmented = Augmented {
                objective: problem.objective,
                equalities: &problem.equalities,
                multipliers: &multipliers,
                penalty,
            };
            let outcome = self.solve_inner(&augmented, x, bounds, problem.budget);
            x = outcome.x;
            iterations += outcome.iterations;
            stationary = outcome.stationary;

            let residuals: Vec<f64> = problem.equalities.iter().map(|eq| eq.residual(&x)).collect();
            max_residual = residuals.iter().fold(0.0_f64, |acc, h| acc.max(h.abs()));

            if stationary && max_residual <= tolerance {
                break;
            }

            for (lambda, h) in multipliers.iter_mut().zip(&residuals) {
                *lambda += penalty * h;
            }
            if max_residual > RESIDUAL_REDUCTION * previous_residual {
                penalty = (penalty * PENALTY_GROWTH).min(MAX_PENALTY);
            }
            previous_residual = max_residual;
        }

        let termination = if max_residual > tolerance {
            Termination::Infeasible {
                reason: format!("equality residual {:.3e} above tolerance", max_residual),
            }
        } else if stationary {
            Termination::Converged
        } else {
            Termination::IterationLimit { iterations }
        };

        Solution {
            value: problem.objective.value(&x),
            x,
            iterations,
            termination,
        }
    }
}

/// Euclidean projection onto the box, intersected with the budget hyperplane
///
/// With a budget, finds the shift `tau` such that
/// `sum(clamp(v - tau, lo, hi)) = budget` by bisection.
pub(crate) fn project(v: &DVector<f64>, bounds: &Bounds, budget: Option<f64>) -> DVector<f64> {
    let lower = bounds.lower();
    let upper = bounds.upper();
    let clamp = |tau: f64| {
        DVector::from_iterator(
            v.len(),
            v.iter()
                .zip(lower.iter().zip(upper.iter()))
                .map(|(vi, (lo, hi))| (vi - tau).clamp(*lo, *hi)),
        )
    };

    let Some(budget) = budget else {
        return clamp(0.0);
    };

    // sum(clamp(v - tau)) is non-increasing in tau
    let mut tau_low = v
        .iter()
        .zip(upper.iter())
        .map(|(vi, hi)| vi - hi)
        .fold(f64::INFINITY, f64::min);
    let mut tau_high = v
        .iter()
        .zip(lower.iter())
        .map(|(vi, lo)| vi - lo)
        .fold(f64::NEG_INFINITY, f64::max);

    for _ in 0..BISECTION_ROUNDS {
        let mid = 0.5 * (tau_low + tau_high);
        if mid <= tau_low || mid >= tau_high {
            break;
        }
        if clamp(mid).sum() > budget {
            tau_low = mid;
        } else {
            tau_high = mid;
        }
    }

    let x_low = clamp(tau_low);
    let x_high = clamp(tau_high);
    let (s_low, s_high) = (x_low.sum(), x_high.sum());
    if (s_low - s_high).abs() <= f64::EPSILON {
        return x_high;
    }

    // Interpolate between the bracketing points; the map is linear there
    let theta = ((s_low - budget) / (s_low - s_high)).clamp(0.0, 1.0);
    &x_low * (1.0 - theta) + &x_high * theta
}

/// Attainable range of `a · x` over the box (and budget, when present)
pub(crate) fn linear_range(a: &DVector<f64>, bounds: &Bounds, budget: Option<f64>) -> (f64, f64) {
    let high = max_linear(a, bounds, budget);
    let low = -max_linear(&(-a), bounds, budget);
    (low, high)
}

fn max_linear(a: &DVector<f64>, bounds: &Bounds, budget: Option<f64>) -> f64 {
    let lower = bounds.lower();
    let upper = bounds.upper();

    let Some(budget) = budget else {
        return a
            .iter()
            .zip(lower.iter().zip(upper.iter()))
            .map(|(ai, (lo, hi))| (ai * lo).max(ai * hi))
            .sum();
    };

    // Start every coordinate at its lower bound, then spend the remaining
    // budget on the largest coefficients first
    let mut order: Vec<usize> = (0..a.len()).collect();
    order.sort_by(|&i, &j| a[j].total_cmp(&a[i]));

    let mut remaining = budget - lower.sum();
    let mut value = a.dot(lower);
    for i in order {
        if remaining <= 0.0 {
            break;
        }
        let room = (upper[i] - lower[i]).min(remaining);
        value += a[i] * room;
        remaining -= room;
    }
    value
}
