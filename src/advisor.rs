//! Advisor facade
//!
//! The [`Advisor`] owns the loaded configuration and the minimizer shared by
//! every engine. It is the single entry point used by outer layers (HTTP
//! handlers, CLIs, notebooks): each call builds the engine it needs from the
//! configuration, runs it, and returns a serializable result.

use crate::config::{AdvisorConfig, RiskProfile};
use crate::error::{AdvisorError, Result};
use crate::frontier::{EfficientFrontierSolver, FrontierBundle};
use crate::optimizer::{Minimizer, ProjectedGradient};
use crate::portfolio::{OptimizeOptions, PortfolioEngine, PortfolioEngineType, PortfolioResult};
use crate::questionnaire::{Questionnaire, Responses};
use crate::risk::{RiskAssessment, RiskEngineType, RiskScorer};
use crate::statistics::{MetricsReport, PriceHistory, ReturnMatrix};
use crate::AssetUniverse;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Source of fund return history
///
/// Implemented by whatever fetches and caches market data. The advisor only
/// needs the daily return matrix of the fund list.
pub trait ReturnsProvider {
    fn fund_returns(&self) -> Result<ReturnMatrix>;
}

impl ReturnsProvider for ReturnMatrix {
    fn fund_returns(&self) -> Result<ReturnMatrix> {
        Ok(self.clone())
    }
}

impl ReturnsProvider for PriceHistory {
    fn fund_returns(&self) -> Result<ReturnMatrix> {
        self.to_returns()
    }
}

/// Risk profile, recommendation and fund metrics in one response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAssessment {
    pub risk: RiskAssessment,
    pub portfolio: PortfolioResult,

    /// Metrics of the funds held by the recommendation
    pub fund_metrics: MetricsReport,
}

/// Risk assessment and portfolio recommendation service
#[derive(Clone)]
pub struct Advisor {
    config: AdvisorConfig,
    minimizer: Arc<dyn Minimizer>,
}

impl Advisor {
    /// Create an advisor using the default projected-gradient minimizer
    ///
    /// The configuration is validated first, so tables built in code are
    /// held to the same rules as loaded ones.
    pub fn new(config: AdvisorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_validated(config))
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(Self::with_validated(AdvisorConfig::from_yaml(yaml)?))
    }

    /// Load configuration from a YAML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_validated(AdvisorConfig::from_file(path)?))
    }

    fn with_validated(config: AdvisorConfig) -> Self {
        let minimizer = Arc::new(ProjectedGradient::new(config.solver.clone()));
        Self { config, minimizer }
    }

    /// Replace the minimizer used by every engine
    pub fn with_minimizer(mut self, minimizer: Arc<dyn Minimizer>) -> Self {
        self.minimizer = minimizer;
        self
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Map responses to a risk profile
    pub fn assess_risk(
        &self,
        responses: &Responses,
        engine_type: RiskEngineType,
    ) -> Result<RiskAssessment> {
        RiskScorer::from_config(&self.config.risk, engine_type)?.assess(responses)
    }

    /// Map responses to a risk profile, ordering them by the questionnaire
    ///
    /// Keyed responses must name known questions and every question must be
    /// answered with one of its options.
    pub fn assess_questionnaire(
        &self,
        questionnaire: &Questionnaire,
        responses: &Responses,
        engine_type: RiskEngineType,
    ) -> Result<RiskAssessment> {
        let scorer = RiskScorer::from_config(&self.config.risk, engine_type)?;
        let scores = questionnaire.ordered_scores(responses)?;
        scorer.assess_scores(&scores)
    }

    /// Recommend a portfolio for the given risk aversion
    pub fn recommend_portfolio(
        &self,
        universe: &AssetUniverse,
        risk_aversion: f64,
        engine_type: PortfolioEngineType,
        allow_short: bool,
    ) -> Result<PortfolioResult> {
        let engine = PortfolioEngine::from_config(
            &self.config.portfolio,
            engine_type,
            self.minimizer.clone(),
        )?;
        let result = engine.optimize(universe, risk_aversion, &OptimizeOptions::with_short(allow_short))?;

        info!(
            engine = %engine_type,
            risk_aversion,
            holdings = result.allocation.len(),
            expected_return = result.expected_return,
            volatility = result.volatility,
            "Portfolio recommended"
        );

        Ok(result)
    }

    /// Efficient frontier of both short-sale regimes
    ///
    /// `risk_free_rate` and `points` default to the configured values.
    pub fn efficient_frontier(
        &self,
        universe: &AssetUniverse,
        risk_free_rate: Option<f64>,
        points: Option<usize>,
    ) -> Result<FrontierBundle> {
        let solver = EfficientFrontierSolver::new(self.config.frontier.clone(), self.minimizer.clone());
        solver.solve(
            universe,
            risk_free_rate.unwrap_or(self.config.frontier.risk_free_rate),
            points.unwrap_or(self.config.frontier.points),
        )
    }

    /// Per-fund performance metrics
    pub fn fund_metrics(
        &self,
        returns: &ReturnMatrix,
        risk_free_rate: Option<f64>,
    ) -> Result<MetricsReport> {
        returns.metrics(risk_free_rate.unwrap_or(self.config.frontier.risk_free_rate))
    }

    /// Assess risk, fetch fund history, recommend, and report metrics of
    /// the funds held
    pub fn complete_assessment(
        &self,
        responses: &Responses,
        risk_engine: RiskEngineType,
        portfolio_engine: PortfolioEngineType,
        allow_short: bool,
        provider: &dyn ReturnsProvider,
    ) -> Result<CompleteAssessment> {
        let risk = self.assess_risk(responses, risk_engine)?;

        let returns = provider.fund_returns().map_err(|err| match err {
            AdvisorError::DataUnavailable(_) => err,
            other => AdvisorError::DataUnavailable(other.to_string()),
        })?;
        debug!(
            funds = returns.assets().len(),
            observations = returns.num_observations(),
            "Fund returns loaded"
        );

        let universe = returns.to_universe()?;
        let portfolio = self.recommend_portfolio(&universe, risk.risk_aversion, portfolio_engine, allow_short)?;
        let fund_metrics = self
            .fund_metrics(&returns, None)?
            .restricted_to(&portfolio.allocation.assets());

        Ok(CompleteAssessment {
            risk,
            portfolio,
            fund_metrics,
        })
    }

    /// Configured interval table of a risk engine
    pub fn profiles(&self, engine_type: RiskEngineType) -> Result<Vec<RiskProfile>> {
        Ok(RiskScorer::from_config(&self.config.risk, engine_type)?.profiles())
    }
}

#[cfg(feature = "async")]
mod timeouts {
    use super::*;
    use crate::error::{OptimizationFailure, Termination};
    use std::collections::BTreeMap;
    use std::time::Duration;

    impl Advisor {
        /// [`Advisor::recommend_portfolio`] on the blocking pool, bounded by
        /// `timeout`
        pub async fn recommend_portfolio_with_timeout(
            &self,
            universe: AssetUniverse,
            risk_aversion: f64,
            engine_type: PortfolioEngineType,
            allow_short: bool,
            timeout: Duration,
        ) -> Result<PortfolioResult> {
            let advisor = self.clone();
            let task = tokio::task::spawn_blocking(move || {
                advisor.recommend_portfolio(&universe, risk_aversion, engine_type, allow_short)
            });

            let mut parameters = BTreeMap::new();
            parameters.insert("risk_aversion".to_string(), risk_aversion);
            run_bounded(task, timeout, engine_type.as_str(), parameters).await
        }

        /// [`Advisor::efficient_frontier`] on the blocking pool, bounded by
        /// `timeout`
        pub async fn efficient_frontier_with_timeout(
            &self,
            universe: AssetUniverse,
            risk_free_rate: Option<f64>,
            points: Option<usize>,
            timeout: Duration,
        ) -> Result<FrontierBundle> {
            let advisor = self.clone();
            let task = tokio::task::spawn_blocking(move || {
                advisor.efficient_frontier(&universe, risk_free_rate, points)
            });

            let mut parameters = BTreeMap::new();
            if let Some(rate) = risk_free_rate {
                parameters.insert("risk_free_rate".to_string(), rate);
            }
            run_bounded(task, timeout, "efficient_frontier", parameters).await
        }
    }

    async fn run_bounded<T>(
        task: tokio::task::JoinHandle<Result<T>>,
        timeout: Duration,
        problem: &str,
        parameters: BTreeMap<String, f64>,
    ) -> Result<T> {
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Ok(Err(_)) | Err(_) => {
                let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(problem = %problem, millis, "Computation timed out");
                Err(OptimizationFailure {
                    problem: problem.to_string(),
                    parameters,
                    termination: Termination::TimedOut { millis },
                    best_iterate: Vec::new(),
                    objective_value: f64::NAN,
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IntervalTable, PresetAllocation, PresetPortfolio};
    use crate::error::ErrorKind;
    use crate::portfolio::test_support::{universe, StalledMinimizer};
    use std::collections::BTreeMap;

    fn config() -> AdvisorConfig {
        let mut config = AdvisorConfig::default();
        config.risk.simple = Some(IntervalTable {
            profiles: vec![
                RiskProfile {
                    name: "Conservative".to_string(),
                    min_score: 0.0,
                    max_score: 15.0,
                    risk_aversion: 6.0,
                },
                RiskProfile {
                    name: "Aggressive".to_string(),
                    min_score: 16.0,
                    max_score: 30.0,
                    risk_aversion: 1.5,
                },
            ],
        });
        config.portfolio.presets = vec![PresetPortfolio {
            name: "Income".to_string(),
            risk_aversion: 6.0,
            allocations: vec![
                PresetAllocation {
                    asset: "BND".to_string(),
                    weight: 0.7,
                },
                PresetAllocation {
                    asset: "SHV".to_string(),
                    weight: 0.3,
                },
            ],
        }];
        config
    }

    struct Offline;

    impl ReturnsProvider for Offline {
        fn fund_returns(&self) -> Result<ReturnMatrix> {
            Err(AdvisorError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "price cache missing",
            )))
        }
    }

    fn returns() -> ReturnMatrix {
        let bnd = vec![0.001, -0.002, 0.0015, 0.0005, -0.001, 0.002, 0.0, 0.001];
        let spy = vec![0.01, -0.015, 0.012, 0.004, -0.02, 0.018, 0.003, -0.004];
        ReturnMatrix::from_columns(vec![("BND".to_string(), bnd), ("SPY".to_string(), spy)]).unwrap()
    }

    #[test]
    fn test_assess_risk() {
        let advisor = Advisor::new(config()).unwrap();
        let assessment = advisor
            .assess_risk(&vec![5, 5, 5, 5].into(), RiskEngineType::Simple)
            .unwrap();
        assert_eq!(assessment.profile, "Aggressive");

        let err = advisor
            .assess_risk(&vec![5].into(), RiskEngineType::Section)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_recommend_preset() {
        let advisor = Advisor::new(config()).unwrap();
        let result = advisor
            .recommend_portfolio(&universe(), 6.0, PortfolioEngineType::Preset, false)
            .unwrap();
        assert_eq!(result.preset_name.as_deref(), Some("Income"));
    }

    #[test]
    fn test_plugged_minimizer_is_used() {
        let advisor = Advisor::new(config()).unwrap().with_minimizer(Arc::new(StalledMinimizer));
        let err = advisor
            .recommend_portfolio(&universe(), 3.0, PortfolioEngineType::MeanVariance, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OptimizationFailure);
    }

    #[test]
    fn test_complete_assessment() {
        let advisor = Advisor::new(config()).unwrap();
        let complete = advisor
            .complete_assessment(
                &vec![2, 2, 2].into(),
                RiskEngineType::Simple,
                PortfolioEngineType::MeanVariance,
                false,
                &returns(),
            )
            .unwrap();

        assert_eq!(complete.risk.profile, "Conservative");
        for entry in &complete.fund_metrics.assets {
            assert!(complete.portfolio.allocation.get(&entry.asset).is_some());
        }
    }

    #[test]
    fn test_provider_failure_is_data_unavailable() {
        let advisor = Advisor::new(config()).unwrap();
        let err = advisor
            .complete_assessment(
                &vec![2, 2, 2].into(),
                RiskEngineType::Simple,
                PortfolioEngineType::MeanVariance,
                false,
                &Offline,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataUnavailable);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut overlapping = config();
        if let Some(table) = overlapping.risk.simple.as_mut() {
            table.profiles[1].min_score = 10.0;
        }
        let err = Advisor::new(overlapping).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let mut no_points = config();
        no_points.frontier.points = 0;
        assert_eq!(Advisor::new(no_points).err().unwrap().kind(), ErrorKind::Configuration);

        let mut flat = config();
        flat.portfolio.risk_parity.base_volatility = 0.0;
        assert_eq!(Advisor::new(flat).err().unwrap().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_profiles() {
        let advisor = Advisor::new(config()).unwrap();
        let profiles = advisor.profiles(RiskEngineType::Simple).unwrap();
        assert_eq!(profiles.len(), 2);
        assert!(advisor.profiles(RiskEngineType::Weighted).is_err());
    }

    #[test]
    fn test_questionnaire_rejects_unknown_ids() {
        let questionnaire: Questionnaire = serde_json::from_value(serde_json::json!({
            "id": "mini",
            "title": "Mini",
            "sections": [],
            "questions": [
                {"id": "q1", "text": "Horizon?", "options": [
                    {"text": "Short", "score": 1}, {"text": "Long", "score": 5}
                ]}
            ]
        }))
        .unwrap();
        let advisor = Advisor::new(config()).unwrap();

        let mut keyed = BTreeMap::new();
        keyed.insert("q9".to_string(), 5);
        let err = advisor
            .assess_questionnaire(&questionnaire, &keyed.into(), RiskEngineType::Simple)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
