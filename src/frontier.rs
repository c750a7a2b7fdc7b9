//! Efficient frontier
//!
//! For each short-sale regime this computes the global minimum-variance
//! portfolio (GMVP), the tangency portfolio that maximizes the Sharpe ratio
//! against a risk-free rate, and a curve of minimum-volatility portfolios
//! for target returns spaced evenly above the GMVP return.
//!
//! Curve targets the minimizer cannot meet are dropped and counted. A failed
//! GMVP or tangency solve fails the whole computation.

use crate::config::FrontierConfig;
use crate::error::{AdvisorError, Result};
use crate::optimizer::{Bounds, Minimizer, Problem};
use crate::portfolio::analytics::{expected_return, volatility};
use crate::portfolio::objectives::{NegativeSharpe, Volatility};
use crate::portfolio::Allocation;
use crate::statistics::AssetUniverse;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Short-sale regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// Weights in `[-1, 1]`
    WithShort,

    /// Weights in `[0, 1]`
    LongOnly,
}

impl Regime {
    fn bounds(&self, n: usize) -> Bounds {
        match self {
            Regime::WithShort => Bounds::with_short(n),
            Regime::LongOnly => Bounds::long_only(n),
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::WithShort => f.write_str("with_short"),
            Regime::LongOnly => f.write_str("long_only"),
        }
    }
}

/// GMVP or tangency portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremalPortfolio {
    pub allocation: Allocation,
    pub expected_return: f64,
    pub volatility: f64,

    /// `(r - rf) / σ`
    pub sharpe_ratio: f64,
}

/// Minimum-volatility portfolio for one target return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub target_return: f64,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub allocation: Allocation,
}

/// Frontier of one regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeFrontier {
    pub regime: Regime,
    pub gmvp: ExtremalPortfolio,
    pub tangency: ExtremalPortfolio,

    /// Points in increasing target order
    pub curve: Vec<FrontierPoint>,

    /// Targets the minimizer could not meet
    pub dropped: usize,
}

/// Both regimes side by side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierBundle {
    pub risk_free_rate: f64,
    pub with_short: RegimeFrontier,
    pub long_only: RegimeFrontier,
}

/// Efficient frontier solver
#[derive(Clone)]
pub struct EfficientFrontierSolver {
    config: FrontierConfig,
    minimizer: Arc<dyn Minimizer>,
}

impl EfficientFrontierSolver {
    pub fn new(config: FrontierConfig, minimizer: Arc<dyn Minimizer>) -> Self {
        Self { config, minimizer }
    }

    /// Compute both regimes with `points` curve targets each
    pub fn solve(
        &self,
        universe: &AssetUniverse,
        risk_free_rate: f64,
        points: usize,
    ) -> Result<FrontierBundle> {
        if points == 0 {
            return Err(AdvisorError::InvalidInput(
                "Frontier needs at least one point".to_string(),
            ));
        }
        if !risk_free_rate.is_finite() {
            return Err(AdvisorError::InvalidInput(format!(
                "Risk-free rate must be finite, got {}",
                risk_free_rate
            )));
        }

        Ok(FrontierBundle {
            risk_free_rate,
            with_short: self.solve_regime(universe, Regime::WithShort, risk_free_rate, points)?,
            long_only: self.solve_regime(universe, Regime::LongOnly, risk_free_rate, points)?,
        })
    }

    fn solve_regime(
        &self,
        universe: &AssetUniverse,
        regime: Regime,
        risk_free_rate: f64,
        points: usize,
    ) -> Result<RegimeFrontier> {
        let n = universe.len();
        let initial = DVector::from_element(n, 1.0 / n as f64);
        let mut parameters = BTreeMap::new();
        parameters.insert("risk_free_rate".to_string(), risk_free_rate);
        parameters.insert("assets".to_string(), n as f64);

        let min_vol = Volatility {
            covariance: universe.covariance(),
        };
        let gmvp = self
            .minimizer
            .minimize(&Problem::new(&min_vol, initial.clone(), regime.bounds(n)).with_budget(1.0))
            .require_converged(&format!("gmvp_{}", regime), parameters.clone())?;

        let max_sharpe = NegativeSharpe {
            mean_returns: universe.mean_returns(),
            covariance: universe.covariance(),
            risk_free_rate,
        };
        let tangency = self
            .minimizer
            .minimize(&Problem::new(&max_sharpe, initial.clone(), regime.bounds(n)).with_budget(1.0))
            .require_converged(&format!("tangency_{}", regime), parameters.clone())?;

        let gmvp = extremal(universe, &gmvp.x, risk_free_rate);
        let tangency = extremal(universe, &tangency.x, risk_free_rate);

        let top = match regime {
            Regime::WithShort => universe.max_mean_return() * self.config.short_extension,
            Regime::LongOnly => universe.max_mean_return(),
        };

        let mut curve = Vec::with_capacity(points);
        let mut dropped = 0;
        for target in linspace(gmvp.expected_return, top, points) {
            let problem = Problem::new(&min_vol, initial.clone(), regime.bounds(n))
                .with_budget(1.0)
                .with_equality(universe.mean_returns().clone(), target);

            let mut point_parameters = parameters.clone();
            point_parameters.insert("target_return".to_string(), target);

            match self
                .minimizer
                .minimize(&problem)
                .require_converged(&format!("frontier_{}", regime), point_parameters)
            {
                Ok(solution) => {
                    let portfolio_return = expected_return(universe.mean_returns(), &solution.x);
                    let portfolio_volatility = volatility(universe.covariance(), &solution.x);
                    curve.push(FrontierPoint {
                        target_return: target,
                        expected_return: portfolio_return,
                        volatility: portfolio_volatility,
                        sharpe_ratio: excess_ratio(portfolio_return, portfolio_volatility, risk_free_rate),
                        allocation: Allocation::from_weights(universe.assets(), &solution.x),
                    });
                }
                Err(err) => {
                    warn!(regime = %regime, target, error = %err, "Dropping frontier point");
                    dropped += 1;
                }
            }
        }

        debug!(
            regime = %regime,
            points = curve.len(),
            dropped,
            gmvp_volatility = gmvp.volatility,
            tangency_sharpe = tangency.sharpe_ratio,
            "Frontier computed"
        );

        Ok(RegimeFrontier {
            regime,
            gmvp,
            tangency,
            curve,
            dropped,
        })
    }
}

fn extremal(universe: &AssetUniverse, weights: &DVector<f64>, risk_free_rate: f64) -> ExtremalPortfolio {
    let portfolio_return = expected_return(universe.mean_returns(), weights);
    let portfolio_volatility = volatility(universe.covariance(), weights);
    ExtremalPortfolio {
        allocation: Allocation::from_weights(universe.assets(), weights),
        expected_return: portfolio_return,
        volatility: portfolio_volatility,
        sharpe_ratio: excess_ratio(portfolio_return, portfolio_volatility, risk_free_rate),
    }
}

fn excess_ratio(portfolio_return: f64, portfolio_volatility: f64, risk_free_rate: f64) -> f64 {
    if portfolio_volatility > 0.0 {
        (portfolio_return - risk_free_rate) / portfolio_volatility
    } else {
        0.0
    }
}

/// `count` evenly spaced values from `start` to `end` inclusive
fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::optimizer::ProjectedGradient;
    use crate::portfolio::test_support::StalledMinimizer;
    use approx::assert_relative_eq;

    fn solver() -> EfficientFrontierSolver {
        EfficientFrontierSolver::new(FrontierConfig::default(), Arc::new(ProjectedGradient::default()))
    }

    fn two_assets() -> AssetUniverse {
        AssetUniverse::from_slices(
            &["BND", "SPY"],
            &[0.08, 0.12],
            &[&[0.04, 0.01], &[0.01, 0.09]],
        )
        .unwrap()
    }

    fn three_assets() -> AssetUniverse {
        AssetUniverse::from_slices(
            &["BND", "SPY", "GLD"],
            &[0.05, 0.11, 0.07],
            &[&[0.01, 0.002, 0.001], &[0.002, 0.04, 0.004], &[0.001, 0.004, 0.0225]],
        )
        .unwrap()
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
        assert_eq!(linspace(0.2, 0.9, 1), vec![0.2]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_two_asset_gmvp() {
        let bundle = solver().solve(&two_assets(), 0.03, 10).unwrap();

        for frontier in [&bundle.with_short, &bundle.long_only] {
            let gmvp = &frontier.gmvp.allocation;
            assert_relative_eq!(gmvp.get("BND").unwrap(), 0.7273, epsilon = 1e-3);
            assert_relative_eq!(gmvp.get("SPY").unwrap(), 0.2727, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_gmvp_is_minimum_volatility() {
        let bundle = solver().solve(&three_assets(), 0.03, 15).unwrap();

        for frontier in [&bundle.with_short, &bundle.long_only] {
            assert!(!frontier.curve.is_empty());
            for point in &frontier.curve {
                assert!(frontier.gmvp.volatility <= point.volatility + 1e-6);
            }
        }
    }

    #[test]
    fn test_tangency_has_highest_sharpe() {
        let bundle = solver().solve(&three_assets(), 0.03, 15).unwrap();

        for frontier in [&bundle.with_short, &bundle.long_only] {
            for point in &frontier.curve {
                assert!(frontier.tangency.sharpe_ratio >= point.sharpe_ratio - 1e-4);
            }
        }
    }

    #[test]
    fn test_curve_meets_targets() {
        let bundle = solver().solve(&three_assets(), 0.03, 10).unwrap();

        for frontier in [&bundle.with_short, &bundle.long_only] {
            assert_eq!(frontier.curve.len() + frontier.dropped, 10);
            for point in &frontier.curve {
                assert!((point.expected_return - point.target_return).abs() < 1e-6);
                assert_relative_eq!(point.allocation.total(), 1.0, epsilon = 1e-6);
            }
        }

        for point in &bundle.long_only.curve {
            assert!(point.allocation.iter().all(|h| h.weight >= -1e-9));
        }
    }

    #[test]
    fn test_zero_points_rejected() {
        let err = solver().solve(&two_assets(), 0.03, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_gmvp_failure_aborts() {
        let solver = EfficientFrontierSolver::new(FrontierConfig::default(), Arc::new(StalledMinimizer));
        let err = solver.solve(&two_assets(), 0.03, 5).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::OptimizationFailure);
        assert_eq!(err.optimization_failure().unwrap().problem, "gmvp_with_short");
    }
}
