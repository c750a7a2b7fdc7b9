//! Portfolio optimization engines
//!
//! Turns an asset universe and a risk-aversion coefficient into an
//! allocation. Three engines are available:
//!
//! - **MeanVariance**: maximizes `r·w − (A/2)·wᵀΣw` under a full-investment
//!   constraint, then filters negligible weights
//! - **RiskParity**: equalizes risk contributions, then scales exposure to a
//!   volatility target derived from the risk aversion, holding the remainder
//!   in cash
//! - **Preset**: picks the configured model portfolio closest in risk aversion

pub mod analytics;
mod mean_variance;
pub(crate) mod objectives;
mod preset;
mod risk_parity;

pub use analytics::RiskContribution;
pub use mean_variance::MeanVarianceEngine;
pub use preset::PresetEngine;
pub use risk_parity::RiskParityEngine;

use crate::config::PortfolioConfig;
use crate::error::{AdvisorError, Result};
use crate::optimizer::Minimizer;
use crate::statistics::AssetUniverse;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Portfolio engine family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioEngineType {
    MeanVariance,
    RiskParity,
    Preset,
}

impl PortfolioEngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortfolioEngineType::MeanVariance => "mean_variance",
            PortfolioEngineType::RiskParity => "risk_parity",
            PortfolioEngineType::Preset => "preset",
        }
    }
}

impl fmt::Display for PortfolioEngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortfolioEngineType {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean_variance" => Ok(PortfolioEngineType::MeanVariance),
            "risk_parity" => Ok(PortfolioEngineType::RiskParity),
            "preset" => Ok(PortfolioEngineType::Preset),
            other => Err(AdvisorError::Configuration(format!(
                "Unknown portfolio engine type: {}. Available types: mean_variance, risk_parity, preset",
                other
            ))),
        }
    }
}

/// Per-request optimization options
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OptimizeOptions {
    /// Allow weights in `[-1, 1]` instead of `[0, 1]` (mean-variance only)
    #[serde(default)]
    pub allow_short: bool,

    /// Overrides the configured minimum allocation threshold
    #[serde(default)]
    pub min_allocation_threshold: Option<f64>,
}

impl OptimizeOptions {
    pub fn with_short(allow_short: bool) -> Self {
        Self {
            allow_short,
            ..Default::default()
        }
    }
}

/// One holding of an allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub asset: String,
    pub weight: f64,
}

/// Ordered list of holdings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Allocation(Vec<AssetWeight>);

impl Allocation {
    /// Pair asset identifiers with the entries of a weight vector
    pub fn from_weights(assets: &[String], weights: &DVector<f64>) -> Self {
        Self(
            assets
                .iter()
                .zip(weights.iter())
                .map(|(asset, weight)| AssetWeight {
                    asset: asset.clone(),
                    weight: *weight,
                })
                .collect(),
        )
    }

    pub fn get(&self, asset: &str) -> Option<f64> {
        self.0.iter().find(|h| h.asset == asset).map(|h| h.weight)
    }

    pub fn assets(&self) -> Vec<&str> {
        self.0.iter().map(|h| h.asset.as_str()).collect()
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|h| h.weight).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetWeight> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<AssetWeight>> for Allocation {
    fn from(holdings: Vec<AssetWeight>) -> Self {
        Self(holdings)
    }
}

/// Recommended portfolio with its statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioResult {
    /// Holdings, in universe order
    pub allocation: Allocation,

    /// Annualized expected return
    pub expected_return: f64,

    /// Annualized volatility
    pub volatility: f64,

    /// Return over volatility (no risk-free rate), zero when riskless
    pub sharpe_ratio: f64,

    /// Engine that produced the recommendation
    pub engine: PortfolioEngineType,

    /// Mean-variance utility of the unfiltered solution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utility: Option<f64>,

    /// Uninvested share after risk-parity scaling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_weight: Option<f64>,

    /// Risk contributions of the unscaled risk-parity solution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_contributions: Option<Vec<RiskContribution>>,

    /// Name of the selected preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_name: Option<String>,

    /// Mean-variance weights before threshold filtering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unfiltered_allocation: Option<Allocation>,
}

impl PortfolioResult {
    pub(crate) fn new(
        engine: PortfolioEngineType,
        allocation: Allocation,
        expected_return: f64,
        volatility: f64,
    ) -> Self {
        Self {
            allocation,
            expected_return,
            volatility,
            sharpe_ratio: analytics::return_to_risk(expected_return, volatility),
            engine,
            utility: None,
            cash_weight: None,
            risk_contributions: None,
            preset_name: None,
            unfiltered_allocation: None,
        }
    }
}

/// Configured portfolio engine
#[derive(Clone)]
pub enum PortfolioEngine {
    MeanVariance(MeanVarianceEngine),
    RiskParity(RiskParityEngine),
    Preset(PresetEngine),
}

impl PortfolioEngine {
    /// Build the engine registered for `engine_type`
    pub fn from_config(
        config: &PortfolioConfig,
        engine_type: PortfolioEngineType,
        minimizer: Arc<dyn Minimizer>,
    ) -> Result<Self> {
        match engine_type {
            PortfolioEngineType::MeanVariance => Ok(PortfolioEngine::MeanVariance(
                MeanVarianceEngine::new(config.mean_variance.clone(), minimizer),
            )),
            PortfolioEngineType::RiskParity => Ok(PortfolioEngine::RiskParity(
                RiskParityEngine::new(config.risk_parity.clone(), minimizer),
            )),
            PortfolioEngineType::Preset => {
                if config.presets.is_empty() {
                    return Err(AdvisorError::Configuration(
                        "No preset portfolios configured".to_string(),
                    ));
                }
                Ok(PortfolioEngine::Preset(PresetEngine::new(config.presets.clone())))
            }
        }
    }

    pub fn engine_type(&self) -> PortfolioEngineType {
        match self {
            PortfolioEngine::MeanVariance(_) => PortfolioEngineType::MeanVariance,
            PortfolioEngine::RiskParity(_) => PortfolioEngineType::RiskParity,
            PortfolioEngine::Preset(_) => PortfolioEngineType::Preset,
        }
    }

    /// Optimize a portfolio for the given risk aversion
    pub fn optimize(
        &self,
        universe: &AssetUniverse,
        risk_aversion: f64,
        options: &OptimizeOptions,
    ) -> Result<PortfolioResult> {
        validate_risk_aversion(risk_aversion)?;

        match self {
            PortfolioEngine::MeanVariance(engine) => engine.optimize(universe, risk_aversion, options),
            PortfolioEngine::RiskParity(engine) => engine.optimize(universe, risk_aversion),
            PortfolioEngine::Preset(engine) => engine.optimize(universe, risk_aversion),
        }
    }
}

fn validate_risk_aversion(risk_aversion: f64) -> Result<()> {
    if !risk_aversion.is_finite() || risk_aversion <= 0.0 {
        return Err(AdvisorError::InvalidInput(format!(
            "Risk aversion must be positive and finite, got {}",
            risk_aversion
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::error::Termination;
    use crate::optimizer::{Minimizer, Problem, Solution};
    use crate::statistics::AssetUniverse;

    /// Minimizer that always gives up at its starting point
    pub struct StalledMinimizer;

    impl Minimizer for StalledMinimizer {
        fn minimize(&self, problem: &Problem<'_>) -> Solution {
            Solution {
                x: problem.initial.clone(),
                value: problem.objective.value(&problem.initial),
                iterations: 3,
                termination: Termination::IterationLimit { iterations: 3 },
            }
        }
    }

    /// Bonds, equities, gold and cash-like short duration
    pub fn universe() -> AssetUniverse {
        AssetUniverse::from_slices(
            &["BND", "SPY", "GLD", "SHV"],
            &[0.04, 0.10, 0.06, 0.02],
            &[
                &[0.0025, 0.0005, 0.0004, 0.0001],
                &[0.0005, 0.0400, 0.0020, 0.0000],
                &[0.0004, 0.0020, 0.0225, 0.0000],
                &[0.0001, 0.0000, 0.0000, 0.0004],
            ],
        )
        .unwrap()
    }
}
