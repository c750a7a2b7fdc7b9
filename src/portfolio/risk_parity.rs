use super::analytics::{contribution_breakdown, expected_return, return_to_risk, volatility};
use super::objectives::RiskParityDeviation;
use super::{Allocation, PortfolioEngineType, PortfolioResult};
use crate::config::RiskParityConfig;
use crate::error::Result;
use crate::optimizer::{Bounds, Minimizer, Problem};
use crate::statistics::AssetUniverse;
use nalgebra::DVector;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Equal risk contribution engine with volatility targeting
///
/// The unscaled parity portfolio is levered down (or up) to
/// `base_volatility / risk_aversion`; any unallocated share is cash.
#[derive(Clone)]
pub struct RiskParityEngine {
    config: RiskParityConfig,
    minimizer: Arc<dyn Minimizer>,
}

impl RiskParityEngine {
    pub fn new(config: RiskParityConfig, minimizer: Arc<dyn Minimizer>) -> Self {
        Self { config, minimizer }
    }

    pub fn optimize(&self, universe: &AssetUniverse, risk_aversion: f64) -> Result<PortfolioResult> {
        let n = universe.len();
        let objective = RiskParityDeviation {
            covariance: universe.covariance(),
        };
        let problem = Problem::new(
            &objective,
            DVector::from_element(n, 1.0 / n as f64),
            Bounds::long_only(n),
        )
        .with_budget(1.0);

        let mut parameters = BTreeMap::new();
        parameters.insert("risk_aversion".to_string(), risk_aversion);
        parameters.insert("base_volatility".to_string(), self.config.base_volatility);
        parameters.insert("assets".to_string(), n as f64);

        let solution = self
            .minimizer
            .minimize(&problem)
            .require_converged("risk_parity", parameters)?;

        let weights = solution.x;
        let portfolio_return = expected_return(universe.mean_returns(), &weights);
        let portfolio_volatility = volatility(universe.covariance(), &weights);

        let target_volatility = self.config.base_volatility / risk_aversion;
        let scaling = if portfolio_volatility > 0.0 {
            target_volatility / portfolio_volatility
        } else {
            1.0
        };

        let scaled = &weights * scaling;
        let cash_weight = (1.0 - scaled.sum()).max(0.0);

        debug!(
            target_volatility,
            scaling,
            cash_weight,
            "Scaled risk parity portfolio"
        );

        let mut result = PortfolioResult::new(
            PortfolioEngineType::RiskParity,
            Allocation::from_weights(universe.assets(), &scaled),
            portfolio_return * scaling,
            portfolio_volatility * scaling,
        );
        result.sharpe_ratio = return_to_risk(portfolio_return, portfolio_volatility);
        result.cash_weight = Some(cash_weight);
        result.risk_contributions = Some(contribution_breakdown(
            universe.assets(),
            universe.covariance(),
            &weights,
        ));

        Ok(result)
    }
}
