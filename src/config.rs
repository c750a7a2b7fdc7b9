//! Advisor configuration
//!
//! This module defines the configuration document consumed by the advisor:
//! risk-profile interval tables, section weights, preset portfolios and the
//! numeric settings of the portfolio engines and the solver. Documents are
//! loaded once from YAML or JSON and validated before use.

use crate::error::{AdvisorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest distance between consecutive integer score bands that is not a gap
const ADJACENT_SCORE_STEP: f64 = 1.0;

/// Complete advisor configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdvisorConfig {
    /// Risk scoring tables, one per engine type
    #[serde(default)]
    pub risk: RiskConfig,

    /// Portfolio engine settings and preset portfolios
    #[serde(default)]
    pub portfolio: PortfolioConfig,

    /// Efficient frontier defaults
    #[serde(default)]
    pub frontier: FrontierConfig,

    /// Constrained minimizer settings
    #[serde(default)]
    pub solver: SolverConfig,
}

/// Risk scoring tables
///
/// An engine type is registered only when its table is present.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RiskConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple: Option<IntervalTable>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted: Option<WeightedPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionTable>,
}

/// A named risk profile covering an inclusive score interval
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskProfile {
    /// Profile name (e.g. "Moderate")
    pub name: String,

    /// Lowest score mapped to this profile (inclusive)
    pub min_score: f64,

    /// Highest score mapped to this profile (inclusive)
    pub max_score: f64,

    /// Risk-aversion coefficient handed to the portfolio engines
    pub risk_aversion: f64,
}

impl RiskProfile {
    /// Check whether a score falls inside this profile's interval
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min_score && score <= self.max_score
    }
}

/// Ordered list of risk profiles scanned first-match
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IntervalTable {
    pub profiles: Vec<RiskProfile>,
}

/// Weighted scoring policy
///
/// Two policies are found in practice: a per-question weight vector banded
/// through an interval table, and a fixed inverted scale for the 16-question
/// survey whose bands are hard constants.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum WeightedPolicy {
    /// Dot product of per-question weights with the responses
    Weights {
        weights: Vec<f64>,
        profiles: Vec<RiskProfile>,
    },

    /// `96 - sum(responses)` banded into five fixed profiles
    InvertedBands,
}

/// Section-based scoring table
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SectionTable {
    pub sections: Vec<SectionWeight>,
    pub profiles: Vec<RiskProfile>,
}

/// One questionnaire section used by section-based scoring
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SectionWeight {
    /// Section name
    pub name: String,

    /// Zero-based indices into the ordered response vector
    pub question_indices: Vec<usize>,

    /// Multiplier applied to the section sum
    pub weight: f64,
}

/// Portfolio engine settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PortfolioConfig {
    #[serde(default)]
    pub mean_variance: MeanVarianceConfig,

    #[serde(default)]
    pub risk_parity: RiskParityConfig,

    /// Preset portfolios, in selection tie-break order
    #[serde(default)]
    pub presets: Vec<PresetPortfolio>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MeanVarianceConfig {
    /// Weights below this value are dropped after solving (<= 0 disables)
    #[serde(default = "default_min_allocation_threshold")]
    pub min_allocation_threshold: f64,
}

impl Default for MeanVarianceConfig {
    fn default() -> Self {
        Self {
            min_allocation_threshold: default_min_allocation_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskParityConfig {
    /// Volatility targeted at risk aversion 1.0
    #[serde(default = "default_base_volatility")]
    pub base_volatility: f64,
}

impl Default for RiskParityConfig {
    fn default() -> Self {
        Self {
            base_volatility: default_base_volatility(),
        }
    }
}

/// A preset portfolio selected by risk aversion
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PresetPortfolio {
    pub name: String,
    pub risk_aversion: f64,
    pub allocations: Vec<PresetAllocation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PresetAllocation {
    pub asset: String,
    pub weight: f64,
}

/// Efficient frontier defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FrontierConfig {
    /// Annualized risk-free rate used for the tangency portfolio
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,

    /// Number of target returns sampled per regime
    #[serde(default = "default_frontier_points")]
    pub points: usize,

    /// Upper target as a multiple of the best mean return when shorting
    #[serde(default = "default_short_extension")]
    pub short_extension: f64,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            points: default_frontier_points(),
            short_extension: default_short_extension(),
        }
    }
}

/// Constrained minimizer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolverConfig {
    /// Projected-gradient iterations per subproblem
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Augmented-Lagrangian outer iterations
    #[serde(default = "default_max_outer_iterations")]
    pub max_outer_iterations: usize,

    /// Stationarity tolerance on the projected step
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Largest accepted equality-constraint residual
    #[serde(default = "default_feasibility_tolerance")]
    pub feasibility_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_outer_iterations: default_max_outer_iterations(),
            tolerance: default_tolerance(),
            feasibility_tolerance: default_feasibility_tolerance(),
        }
    }
}

fn default_min_allocation_threshold() -> f64 {
    0.01
}

fn default_base_volatility() -> f64 {
    0.12
}

fn default_risk_free_rate() -> f64 {
    0.03
}

fn default_frontier_points() -> usize {
    50
}

fn default_short_extension() -> f64 {
    1.2
}

fn default_max_iterations() -> usize {
    5_000
}

fn default_max_outer_iterations() -> usize {
    40
}

fn default_tolerance() -> f64 {
    1e-10
}

fn default_feasibility_tolerance() -> f64 {
    1e-7
}

impl AdvisorConfig {
    /// Load and validate configuration from a YAML string
    ///
    /// # Example
    ///
    /// ```
    /// use ag_advisor::AdvisorConfig;
    ///
    /// let yaml = r#"
    /// risk:
    ///   simple:
    ///     profiles:
    ///       - name: Conservative
    ///         min_score: 0
    ///         max_score: 15
    ///         risk_aversion: 6.0
    ///       - name: Aggressive
    ///         min_score: 16
    ///         max_score: 30
    ///         risk_aversion: 1.5
    /// "#;
    ///
    /// let config = AdvisorConfig::from_yaml(yaml).unwrap();
    /// assert!(config.risk.simple.is_some());
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AdvisorConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AdvisorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, choosing the format by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            Some("json") => Self::from_json(&contents),
            _ => Err(AdvisorError::Configuration(format!(
                "Unsupported configuration format: {}",
                path.display()
            ))),
        }
    }

    /// Check every table and setting, failing on the first problem
    pub fn validate(&self) -> Result<()> {
        if let Some(table) = &self.risk.simple {
            validate_profiles("risk.simple", &table.profiles)?;
        }

        if let Some(WeightedPolicy::Weights { weights, profiles }) = &self.risk.weighted {
            if weights.is_empty() {
                return Err(AdvisorError::Configuration(
                    "risk.weighted: weight vector is empty".to_string(),
                ));
            }
            if weights.iter().any(|w| !w.is_finite()) {
                return Err(AdvisorError::Configuration(
                    "risk.weighted: weights must be finite".to_string(),
                ));
            }
            validate_profiles("risk.weighted", profiles)?;
        }

        if let Some(table) = &self.risk.section {
            if table.sections.is_empty() {
                return Err(AdvisorError::Configuration(
                    "risk.section: no sections configured".to_string(),
                ));
            }
            for section in &table.sections {
                if section.name.is_empty() {
                    return Err(AdvisorError::Configuration(
                        "risk.section: section name is empty".to_string(),
                    ));
                }
                if section.question_indices.is_empty() {
                    return Err(AdvisorError::Configuration(format!(
                        "risk.section: section '{}' has no question indices",
                        section.name
                    )));
                }
                if !section.weight.is_finite() {
                    return Err(AdvisorError::Configuration(format!(
                        "risk.section: section '{}' has a non-finite weight",
                        section.name
                    )));
                }
            }
            validate_profiles("risk.section", &table.profiles)?;
        }

        let threshold = self.portfolio.mean_variance.min_allocation_threshold;
        if !threshold.is_finite() || threshold >= 1.0 {
            return Err(AdvisorError::Configuration(format!(
                "portfolio.mean_variance: min_allocation_threshold {} must be below 1",
                threshold
            )));
        }

        let base_vol = self.portfolio.risk_parity.base_volatility;
        if !(base_vol.is_finite() && base_vol > 0.0) {
            return Err(AdvisorError::Configuration(format!(
                "portfolio.risk_parity: base_volatility {} must be positive",
                base_vol
            )));
        }

        for preset in &self.portfolio.presets {
            if !(preset.risk_aversion.is_finite() && preset.risk_aversion > 0.0) {
                return Err(AdvisorError::Configuration(format!(
                    "portfolio.presets: '{}' has invalid risk_aversion {}",
                    preset.name, preset.risk_aversion
                )));
            }
            if preset.allocations.is_empty() {
                return Err(AdvisorError::Configuration(format!(
                    "portfolio.presets: '{}' has no allocations",
                    preset.name
                )));
            }
            if preset.allocations.iter().any(|a| !a.weight.is_finite()) {
                return Err(AdvisorError::Configuration(format!(
                    "portfolio.presets: '{}' has a non-finite weight",
                    preset.name
                )));
            }
        }

        if self.frontier.points == 0 {
            return Err(AdvisorError::Configuration(
                "frontier: points must be positive".to_string(),
            ));
        }
        if !self.frontier.risk_free_rate.is_finite() {
            return Err(AdvisorError::Configuration(
                "frontier: risk_free_rate must be finite".to_string(),
            ));
        }
        if !(self.frontier.short_extension.is_finite() && self.frontier.short_extension > 0.0) {
            return Err(AdvisorError::Configuration(
                "frontier: short_extension must be positive".to_string(),
            ));
        }

        if self.solver.max_iterations == 0 || self.solver.max_outer_iterations == 0 {
            return Err(AdvisorError::Configuration(
                "solver: iteration limits must be positive".to_string(),
            ));
        }
        if !(self.solver.tolerance > 0.0 && self.solver.feasibility_tolerance > 0.0) {
            return Err(AdvisorError::Configuration(
                "solver: tolerances must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validate one interval table
///
/// Overlapping intervals are rejected. Gaps wider than one score point are
/// only logged, since scoring falls back to the first profile there.
fn validate_profiles(table: &str, profiles: &[RiskProfile]) -> Result<()> {
    if profiles.is_empty() {
        return Err(AdvisorError::Configuration(format!(
            "{}: no risk profiles configured",
            table
        )));
    }

    for profile in profiles {
        if profile.name.is_empty() {
            return Err(AdvisorError::Configuration(format!(
                "{}: profile name is empty",
                table
            )));
        }
        if !(profile.min_score.is_finite() && profile.max_score.is_finite())
            || profile.min_score > profile.max_score
        {
            return Err(AdvisorError::Configuration(format!(
                "{}: profile '{}' has invalid bounds [{}, {}]",
                table, profile.name, profile.min_score, profile.max_score
            )));
        }
        if !(profile.risk_aversion.is_finite() && profile.risk_aversion > 0.0) {
            return Err(AdvisorError::Configuration(format!(
                "{}: profile '{}' has invalid risk_aversion {}",
                table, profile.name, profile.risk_aversion
            )));
        }
    }

    let mut sorted: Vec<&RiskProfile> = profiles.iter().collect();
    sorted.sort_by(|a, b| a.min_score.total_cmp(&b.min_score));

    for pair in sorted.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        if upper.min_score <= lower.max_score {
            return Err(AdvisorError::Configuration(format!(
                "{}: profiles '{}' [{}, {}] and '{}' [{}, {}] overlap",
                table,
                lower.name,
                lower.min_score,
                lower.max_score,
                upper.name,
                upper.min_score,
                upper.max_score
            )));
        }
        if upper.min_score - lower.max_score > ADJACENT_SCORE_STEP {
            tracing::warn!(
                table = %table,
                lower = %lower.name,
                upper = %upper.name,
                gap_start = lower.max_score,
                gap_end = upper.min_score,
                "Risk profile table has a gap; scores inside it fall back to the first profile"
            );
        }
    }

    Ok(())
}
