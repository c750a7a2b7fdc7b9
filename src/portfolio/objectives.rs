//! Objectives minimized by the portfolio engines and the frontier solver

use super::analytics::volatility;
use crate::optimizer::Objective;
use nalgebra::{DMatrix, DVector};

/// Negated mean-variance utility `-(r·w) + (A/2) wᵀΣw`
pub(crate) struct NegativeUtility<'a> {
    pub mean_returns: &'a DVector<f64>,
    pub covariance: &'a DMatrix<f64>,
    pub risk_aversion: f64,
}

impl Objective for NegativeUtility<'_> {
    fn value(&self, x: &DVector<f64>) -> f64 {
        -self.mean_returns.dot(x) + 0.5 * self.risk_aversion * x.dot(&(self.covariance * x))
    }

    fn gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        (self.covariance * x) * self.risk_aversion - self.mean_returns
    }
}

/// Portfolio volatility `√(wᵀΣw)`
pub(crate) struct Volatility<'a> {
    pub covariance: &'a DMatrix<f64>,
}

impl Objective for Volatility<'_> {
    fn value(&self, x: &DVector<f64>) -> f64 {
        volatility(self.covariance, x)
    }

    fn gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let sigma = volatility(self.covariance, x);
        if sigma == 0.0 {
            return DVector::zeros(x.len());
        }
        (self.covariance * x) / sigma
    }
}

/// Negated Sharpe ratio `-(r·w - rf) / σ`
pub(crate) struct NegativeSharpe<'a> {
    pub mean_returns: &'a DVector<f64>,
    pub covariance: &'a DMatrix<f64>,
    pub risk_free_rate: f64,
}

impl Objective for NegativeSharpe<'_> {
    fn value(&self, x: &DVector<f64>) -> f64 {
        let sigma = volatility(self.covariance, x);
        if sigma == 0.0 {
            return f64::INFINITY;
        }
        -(self.mean_returns.dot(x) - self.risk_free_rate) / sigma
    }

    fn gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let sigma = volatility(self.covariance, x);
        if sigma == 0.0 {
            return DVector::zeros(x.len());
        }
        let excess = self.mean_returns.dot(x) - self.risk_free_rate;
        let marginal = self.covariance * x;
        marginal * (excess / sigma.powi(3)) - self.mean_returns / sigma
    }
}

/// Squared deviation of risk contributions from equal shares, measured
/// relative to portfolio volatility: `Σᵢ (wᵢ(Σw)ᵢ/σ² - 1/n)²`
///
/// Zero exactly where `Σᵢ (RCᵢ - σ/n)²` is zero.
pub(crate) struct RiskParityDeviation<'a> {
    pub covariance: &'a DMatrix<f64>,
}

impl RiskParityDeviation<'_> {
    /// Relative contribution gaps `wᵢ(Σw)ᵢ/σ² - 1/n`, with `Σw` and `σ²`
    fn gaps(&self, x: &DVector<f64>) -> Option<(DVector<f64>, DVector<f64>, f64)> {
        let marginal = self.covariance * x;
        let variance = x.dot(&marginal);
        if variance <= 0.0 {
            return None;
        }
        let share = 1.0 / x.len() as f64;
        let gaps = x.component_mul(&marginal).map(|rc| rc / variance - share);
        Some((gaps, marginal, variance))
    }
}

impl Objective for RiskParityDeviation<'_> {
    fn value(&self, x: &DVector<f64>) -> f64 {
        match self.gaps(x) {
            Some((gaps, _, _)) => gaps.norm_squared(),
            None => 0.0,
        }
    }

    fn gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let Some((gaps, marginal, variance)) = self.gaps(x) else {
            return DVector::zeros(x.len());
        };

        let weighted = gaps.component_mul(x);
        let coupling = 2.0 * weighted.dot(&marginal) / variance;

        (gaps.component_mul(&marginal) + self.covariance * &weighted - &marginal * coupling)
            * (2.0 / variance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FD_STEP: f64 = 1e-6;

    fn covariance() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            3,
            3,
            &[0.04, 0.006, 0.002, 0.006, 0.09, 0.01, 0.002, 0.01, 0.0225],
        )
    }

    fn numeric_gradient(objective: &dyn Objective, x: &DVector<f64>) -> DVector<f64> {
        let mut grad = DVector::zeros(x.len());
        for i in 0..x.len() {
            let mut forward = x.clone();
            let mut backward = x.clone();
            forward[i] += FD_STEP;
            backward[i] -= FD_STEP;
            grad[i] = (objective.value(&forward) - objective.value(&backward)) / (2.0 * FD_STEP);
        }
        grad
    }

    fn assert_gradient_matches(objective: &dyn Objective) {
        let x = DVector::from_vec(vec![0.2, 0.5, 0.3]);
        let analytic = objective.gradient(&x);
        let numeric = numeric_gradient(objective, &x);
        for i in 0..x.len() {
            assert_relative_eq!(analytic[i], numeric[i], epsilon = 1e-7, max_relative = 1e-5);
        }
    }

    #[test]
    fn test_utility_gradient() {
        let cov = covariance();
        let mu = DVector::from_vec(vec![0.05, 0.10, 0.07]);
        assert_gradient_matches(&NegativeUtility {
            mean_returns: &mu,
            covariance: &cov,
            risk_aversion: 3.5,
        });
    }

    #[test]
    fn test_volatility_gradient() {
        let cov = covariance();
        assert_gradient_matches(&Volatility { covariance: &cov });
    }

    #[test]
    fn test_sharpe_gradient() {
        let cov = covariance();
        let mu = DVector::from_vec(vec![0.05, 0.10, 0.07]);
        assert_gradient_matches(&NegativeSharpe {
            mean_returns: &mu,
            covariance: &cov,
            risk_free_rate: 0.03,
        });
    }

    #[test]
    fn test_risk_parity_gradient() {
        let cov = covariance();
        assert_gradient_matches(&RiskParityDeviation { covariance: &cov });
    }

    #[test]
    fn test_risk_parity_zero_at_equal_contributions() {
        let cov = DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.04]));
        let x = DVector::from_vec(vec![0.5, 0.5]);
        assert_relative_eq!(RiskParityDeviation { covariance: &cov }.value(&x), 0.0, epsilon = 1e-15);
    }
}
