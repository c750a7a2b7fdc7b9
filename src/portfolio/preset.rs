use super::analytics::{expected_return, volatility};
use super::{Allocation, PortfolioEngineType, PortfolioResult};
use crate::config::PresetPortfolio;
use crate::error::{AdvisorError, Result};
use crate::statistics::AssetUniverse;
use nalgebra::DVector;
use tracing::debug;

/// Model-portfolio lookup by risk aversion
#[derive(Debug, Clone)]
pub struct PresetEngine {
    presets: Vec<PresetPortfolio>,
}

impl PresetEngine {
    pub fn new(presets: Vec<PresetPortfolio>) -> Self {
        Self { presets }
    }

    /// Preset closest in risk aversion; the first one wins ties
    pub fn nearest(&self, risk_aversion: f64) -> Result<&PresetPortfolio> {
        let mut best: Option<(&PresetPortfolio, f64)> = None;
        for preset in &self.presets {
            let distance = (preset.risk_aversion - risk_aversion).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((preset, distance));
            }
        }

        best.map(|(preset, _)| preset).ok_or_else(|| {
            AdvisorError::Configuration(format!(
                "No preset portfolio found for risk aversion {}",
                risk_aversion
            ))
        })
    }

    /// Statistics of the nearest preset restricted to the universe
    ///
    /// Preset assets missing from the universe are dropped and the remaining
    /// weights are used as configured.
    pub fn optimize(&self, universe: &AssetUniverse, risk_aversion: f64) -> Result<PortfolioResult> {
        let preset = self.nearest(risk_aversion)?;

        let (indices, weights): (Vec<usize>, Vec<f64>) = preset
            .allocations
            .iter()
            .filter_map(|allocation| {
                universe
                    .index_of(&allocation.asset)
                    .map(|index| (index, allocation.weight))
            })
            .unzip();

        if indices.is_empty() {
            return Err(AdvisorError::InvalidInput(format!(
                "Preset {} holds none of the requested assets",
                preset.name
            )));
        }

        debug!(
            preset = %preset.name,
            held = indices.len(),
            configured = preset.allocations.len(),
            "Selected preset portfolio"
        );

        let subset = universe.subset(&indices)?;
        let weights = DVector::from_vec(weights);

        let mut result = PortfolioResult::new(
            PortfolioEngineType::Preset,
            Allocation::from_weights(subset.assets(), &weights),
            expected_return(subset.mean_returns(), &weights),
            volatility(subset.covariance(), &weights),
        );
        result.preset_name = Some(preset.name.clone());
        Ok(result)
    }
}
