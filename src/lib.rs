//! # ag-advisor: Risk Profiling and Portfolio Recommendation
//!
//! This library turns investor questionnaire responses into a risk profile
//! and a risk-aversion coefficient, and turns asset statistics into
//! portfolio recommendations and efficient frontiers.
//!
//! ## Core Components
//!
//! - **Advisor**: Facade holding the configuration and the shared minimizer
//! - **RiskScorer**: Simple, weighted and section-based risk scoring
//! - **PortfolioEngine**: Mean-variance, risk-parity and preset portfolios
//! - **EfficientFrontierSolver**: GMVP, tangency portfolio and frontier curve
//! - **Statistics**: Annualized moments and per-fund performance metrics
//! - **Minimizer**: Pluggable bound- and equality-constrained minimization
//!
//! ## Example Usage
//!
//! ```rust
//! use ag_advisor::{Advisor, AssetUniverse, PortfolioEngineType, RiskEngineType};
//!
//! // Load risk tables from YAML
//! let yaml = r#"
//! risk:
//!   simple:
//!     profiles:
//!       - name: Conservative
//!         min_score: 0
//!         max_score: 15
//!         risk_aversion: 6.0
//!       - name: Aggressive
//!         min_score: 16
//!         max_score: 30
//!         risk_aversion: 1.5
//! "#;
//!
//! let advisor = Advisor::from_yaml(yaml).unwrap();
//!
//! // Score the questionnaire
//! let assessment = advisor
//!     .assess_risk(&vec![4, 5, 4, 5].into(), RiskEngineType::Simple)
//!     .unwrap();
//! assert_eq!(assessment.profile, "Aggressive");
//!
//! // Recommend a portfolio for the assessed risk aversion
//! let universe = AssetUniverse::from_slices(
//!     &["BND", "SPY"],
//!     &[0.04, 0.10],
//!     &[&[0.0025, 0.0005], &[0.0005, 0.04]],
//! )
//! .unwrap();
//!
//! let portfolio = advisor
//!     .recommend_portfolio(&universe, assessment.risk_aversion, PortfolioEngineType::MeanVariance, false)
//!     .unwrap();
//! assert!((portfolio.allocation.total() - 1.0).abs() < 1e-6);
//! ```

pub mod advisor;
pub mod config;
pub mod error;
pub mod frontier;
pub mod optimizer;
pub mod portfolio;
pub mod questionnaire;
pub mod risk;
pub mod statistics;

pub use advisor::{Advisor, CompleteAssessment, ReturnsProvider};
pub use config::{
    AdvisorConfig, FrontierConfig, IntervalTable, PortfolioConfig, PresetPortfolio, RiskConfig,
    RiskProfile, SectionTable, SolverConfig, WeightedPolicy,
};
pub use error::{AdvisorError, ErrorKind, OptimizationFailure, Result, Termination};
pub use frontier::{EfficientFrontierSolver, FrontierBundle, FrontierPoint, Regime, RegimeFrontier};
pub use optimizer::{Minimizer, Objective, Problem, ProjectedGradient, Solution};
pub use portfolio::{
    Allocation, AssetWeight, OptimizeOptions, PortfolioEngine, PortfolioEngineType,
    PortfolioResult, RiskContribution,
};
pub use questionnaire::{Questionnaire, Responses};
pub use risk::{RiskAssessment, RiskEngineType, RiskScorer};
pub use statistics::{
    AssetUniverse, MetricsReport, PerformanceMetrics, PriceHistory, ReturnMatrix,
    DEFAULT_RISK_FREE_RATE, TRADING_DAYS,
};
