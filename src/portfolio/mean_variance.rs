use super::analytics::{expected_return, volatility};
use super::objectives::NegativeUtility;
use super::{Allocation, OptimizeOptions, PortfolioEngineType, PortfolioResult};
use crate::config::MeanVarianceConfig;
use crate::error::Result;
use crate::optimizer::{Bounds, Minimizer, Problem};
use crate::statistics::AssetUniverse;
use nalgebra::DVector;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Mean-variance utility maximizer
#[derive(Clone)]
pub struct MeanVarianceEngine {
    config: MeanVarianceConfig,
    minimizer: Arc<dyn Minimizer>,
}

impl MeanVarianceEngine {
    pub fn new(config: MeanVarianceConfig, minimizer: Arc<dyn Minimizer>) -> Self {
        Self { config, minimizer }
    }

    pub fn optimize(
        &self,
        universe: &AssetUniverse,
        risk_aversion: f64,
        options: &OptimizeOptions,
    ) -> Result<PortfolioResult> {
        let n = universe.len();
        let objective = NegativeUtility {
            mean_returns: universe.mean_returns(),
            covariance: universe.covariance(),
            risk_aversion,
        };
        let bounds = if options.allow_short {
            Bounds::with_short(n)
        } else {
            Bounds::long_only(n)
        };
        let problem = Problem::new(&objective, DVector::from_element(n, 1.0 / n as f64), bounds)
            .with_budget(1.0);

        let mut parameters = BTreeMap::new();
        parameters.insert("risk_aversion".to_string(), risk_aversion);
        parameters.insert("allow_short".to_string(), f64::from(u8::from(options.allow_short)));
        parameters.insert("assets".to_string(), n as f64);

        let solution = self
            .minimizer
            .minimize(&problem)
            .require_converged("mean_variance", parameters)?;

        let weights = solution.x;
        let utility = -solution.value;
        let unfiltered = Allocation::from_weights(universe.assets(), &weights);

        let threshold = options
            .min_allocation_threshold
            .unwrap_or(self.config.min_allocation_threshold);

        let kept: Vec<usize> = if threshold > 0.0 {
            (0..n).filter(|&i| weights[i] >= threshold).collect()
        } else {
            Vec::new()
        };

        let mut result = if kept.is_empty() {
            PortfolioResult::new(
                PortfolioEngineType::MeanVariance,
                unfiltered.clone(),
                expected_return(universe.mean_returns(), &weights),
                volatility(universe.covariance(), &weights),
            )
        } else {
            let reduced = universe.subset(&kept)?;
            let kept_weights = DVector::from_iterator(kept.len(), kept.iter().map(|&i| weights[i]));
            let filtered = &kept_weights / kept_weights.sum();

            debug!(
                kept = kept.len(),
                dropped = n - kept.len(),
                threshold,
                "Filtered negligible allocations"
            );

            PortfolioResult::new(
                PortfolioEngineType::MeanVariance,
                Allocation::from_weights(reduced.assets(), &filtered),
                expected_return(reduced.mean_returns(), &filtered),
                volatility(reduced.covariance(), &filtered),
            )
        };

        result.utility = Some(utility);
        result.unfiltered_allocation = Some(unfiltered);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::universe;
    use super::*;
    use crate::optimizer::ProjectedGradient;
    use approx::assert_relative_eq;

    fn engine(threshold: f64) -> MeanVarianceEngine {
        MeanVarianceEngine::new(
            MeanVarianceConfig {
                min_allocation_threshold: threshold,
            },
            Arc::new(ProjectedGradient::default()),
        )
    }

    #[test]
    fn test_weights_sum_to_one() {
        let result = engine(0.01)
            .optimize(&universe(), 3.5, &OptimizeOptions::default())
            .unwrap();

        assert_relative_eq!(result.allocation.total(), 1.0, epsilon = 1e-6);
        for holding in result.allocation.iter() {
            assert!(holding.weight >= 0.01 && holding.weight <= 1.0 + 1e-9);
        }
        assert!(result.utility.is_some());
        assert_eq!(result.engine, PortfolioEngineType::MeanVariance);
    }

    #[test]
    fn test_low_risk_aversion_favours_equities() {
        let aggressive = engine(0.0)
            .optimize(&universe(), 1.0, &OptimizeOptions::default())
            .unwrap();
        let conservative = engine(0.0)
            .optimize(&universe(), 12.0, &OptimizeOptions::default())
            .unwrap();

        let spy = |r: &PortfolioResult| r.allocation.get("SPY").unwrap_or(0.0);
        assert!(spy(&aggressive) > spy(&conservative));
        assert!(aggressive.volatility > conservative.volatility);
    }

    #[test]
    fn test_threshold_filtering() {
        // At A = 12 the short-duration sleeve sits near 7%, below a 10% cut
        let universe = universe();
        let threshold = 0.10;
        let result = engine(0.01)
            .optimize(
                &universe,
                12.0,
                &OptimizeOptions {
                    allow_short: false,
                    min_allocation_threshold: Some(threshold),
                },
            )
            .unwrap();
        let unfiltered = result.unfiltered_allocation.as_ref().unwrap();
        assert_eq!(unfiltered.len(), 4);

        let kept: Vec<usize> = unfiltered
            .iter()
            .enumerate()
            .filter(|(_, h)| h.weight >= threshold)
            .map(|(i, _)| i)
            .collect();
        let dropped: Vec<&str> = unfiltered
            .iter()
            .filter(|h| h.weight < threshold)
            .map(|h| h.asset.as_str())
            .collect();
        assert!(dropped.contains(&"SHV"));
        for asset in &dropped {
            assert!(result.allocation.get(asset).is_none());
        }
        assert_eq!(result.allocation.len(), kept.len());

        let kept_sum: f64 = unfiltered
            .iter()
            .filter(|h| h.weight >= threshold)
            .map(|h| h.weight)
            .sum();
        assert!(kept_sum < 1.0 - 1e-3);
        for holding in result.allocation.iter() {
            let raw = unfiltered.get(&holding.asset).unwrap();
            assert_relative_eq!(holding.weight, raw / kept_sum, epsilon = 1e-12);
        }
        assert_relative_eq!(result.allocation.total(), 1.0, epsilon = 1e-9);

        let reduced = universe.subset(&kept).unwrap();
        let weights = DVector::from_iterator(
            reduced.len(),
            reduced
                .assets()
                .iter()
                .map(|asset| result.allocation.get(asset).unwrap()),
        );
        assert_relative_eq!(
            result.expected_return,
            expected_return(reduced.mean_returns(), &weights),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            result.volatility,
            volatility(reduced.covariance(), &weights),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_filter_everything_keeps_unfiltered() {
        let result = engine(0.01)
            .optimize(
                &universe(),
                3.5,
                &OptimizeOptions {
                    allow_short: false,
                    min_allocation_threshold: Some(1.5),
                },
            )
            .unwrap();

        assert_eq!(Some(&result.allocation), result.unfiltered_allocation.as_ref());
    }

    #[test]
    fn test_short_weights_in_bounds() {
        let result = engine(0.0)
            .optimize(&universe(), 1.0, &OptimizeOptions::with_short(true))
            .unwrap();

        assert_relative_eq!(result.allocation.total(), 1.0, epsilon = 1e-6);
        for holding in result.allocation.iter() {
            assert!(holding.weight >= -1.0 - 1e-9 && holding.weight <= 1.0 + 1e-9);
        }
    }
}
