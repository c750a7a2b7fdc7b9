//! Portfolio analytics
//!
//! Closed-form statistics of a weight vector against an asset universe:
//! - Expected return `r · w`
//! - Volatility `σ_p = √(wᵀ Σ w)`
//! - Risk contributions `wᵢ (Σ w)ᵢ / σ_p`

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Risk contribution of a single holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContribution {
    /// Asset identifier
    pub asset: String,

    /// Contribution to total portfolio volatility
    pub volatility_contribution: f64,

    /// Percentage of total portfolio risk
    pub risk_pct: f64,
}

/// Expected portfolio return `r · w`
pub fn expected_return(mean_returns: &DVector<f64>, weights: &DVector<f64>) -> f64 {
    mean_returns.dot(weights)
}

/// Portfolio volatility `√(wᵀ Σ w)`
///
/// Round-off can leave a tiny negative variance for singular matrices; it is
/// treated as zero.
pub fn volatility(covariance: &DMatrix<f64>, weights: &DVector<f64>) -> f64 {
    weights.dot(&(covariance * weights)).max(0.0).sqrt()
}

/// Return over volatility, zero for a riskless portfolio
pub fn return_to_risk(expected_return: f64, volatility: f64) -> f64 {
    if volatility > 0.0 {
        expected_return / volatility
    } else {
        0.0
    }
}

/// Volatility contribution of each holding, `wᵢ (Σ w)ᵢ / σ_p`
///
/// Contributions sum to `σ_p`. All zero when `σ_p` is zero.
pub fn risk_contributions(covariance: &DMatrix<f64>, weights: &DVector<f64>) -> DVector<f64> {
    let sigma = volatility(covariance, weights);
    if sigma == 0.0 {
        return DVector::zeros(weights.len());
    }

    let marginal_risk = covariance * weights;
    weights.component_mul(&marginal_risk) / sigma
}

/// Per-asset risk contributions with their share of the total
pub fn contribution_breakdown(
    assets: &[String],
    covariance: &DMatrix<f64>,
    weights: &DVector<f64>,
) -> Vec<RiskContribution> {
    let contributions = risk_contributions(covariance, weights);
    let total = contributions.sum();

    assets
        .iter()
        .zip(contributions.iter())
        .map(|(asset, contribution)| RiskContribution {
            asset: asset.clone(),
            volatility_contribution: *contribution,
            risk_pct: if total != 0.0 {
                contribution / total * 100.0
            } else {
                0.0
            },
        })
        .collect()
}
