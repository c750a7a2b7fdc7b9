//! Return statistics
//!
//! Derives the inputs of the portfolio engines from daily data:
//! - Daily returns from a price history (percentage change)
//! - Annualized mean return vector and covariance matrix
//! - Per-asset performance metrics (Sharpe, Sortino, maximum drawdown)
//!
//! All annualization uses the fixed 252 trading-day convention.

use crate::error::{AdvisorError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashSet;

/// Trading days per year
pub const TRADING_DAYS: f64 = 252.0;

/// Default annualized risk-free rate
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.03;

/// Relative tolerance used for the covariance symmetry check
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Daily closing prices for a set of assets
///
/// Rows are dates, columns are assets. Missing prices are NaN.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    pub assets: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub prices: DMatrix<f64>,
}

impl PriceHistory {
    pub fn new(assets: Vec<String>, dates: Vec<NaiveDate>, prices: DMatrix<f64>) -> Result<Self> {
        if prices.ncols() != assets.len() {
            return Err(AdvisorError::InvalidInput(format!(
                "Price matrix has {} columns for {} assets",
                prices.ncols(),
                assets.len()
            )));
        }
        if !dates.is_empty() && dates.len() != prices.nrows() {
            return Err(AdvisorError::InvalidInput(format!(
                "Price matrix has {} rows for {} dates",
                prices.nrows(),
                dates.len()
            )));
        }
        Ok(Self {
            assets,
            dates,
            prices,
        })
    }

    /// Daily returns by percentage change, first row dropped
    ///
    /// Missing prices are forward-filled before differencing.
    pub fn to_returns(&self) -> Result<ReturnMatrix> {
        let (rows, cols) = self.prices.shape();
        if rows < 2 {
            return Err(AdvisorError::InvalidInput(
                "Need at least 2 prices to compute returns".to_string(),
            ));
        }

        let mut filled = self.prices.clone();
        for j in 0..cols {
            if !filled[(0, j)].is_finite() {
                return Err(AdvisorError::InvalidInput(format!(
                    "First price of asset {} is missing",
                    self.assets[j]
                )));
            }
            for i in 1..rows {
                if !filled[(i, j)].is_finite() {
                    filled[(i, j)] = filled[(i - 1, j)];
                }
            }
        }

        let mut returns = DMatrix::zeros(rows - 1, cols);
        for j in 0..cols {
            for i in 1..rows {
                let previous = filled[(i - 1, j)];
                if previous == 0.0 {
                    return Err(AdvisorError::InvalidInput(format!(
                        "Zero price for asset {} breaks percentage change",
                        self.assets[j]
                    )));
                }
                returns[(i - 1, j)] = filled[(i, j)] / previous - 1.0;
            }
        }

        let dates = if self.dates.is_empty() {
            Vec::new()
        } else {
            self.dates[1..].to_vec()
        };

        ReturnMatrix::new(self.assets.clone(), dates, returns)
    }
}

/// Daily returns, one column per asset
#[derive(Debug, Clone)]
pub struct ReturnMatrix {
    assets: Vec<String>,
    dates: Vec<NaiveDate>,
    returns: DMatrix<f64>,
}

impl ReturnMatrix {
    /// Build a validated return matrix
    ///
    /// `dates` may be empty when the rows are undated.
    pub fn new(assets: Vec<String>, dates: Vec<NaiveDate>, returns: DMatrix<f64>) -> Result<Self> {
        if assets.is_empty() {
            return Err(AdvisorError::InvalidInput("No assets provided".to_string()));
        }
        if returns.ncols() != assets.len() {
            return Err(AdvisorError::InvalidInput(format!(
                "Return matrix has {} columns for {} assets",
                returns.ncols(),
                assets.len()
            )));
        }
        if returns.nrows() < 2 {
            return Err(AdvisorError::InvalidInput(format!(
                "Need at least 2 return observations, got {}",
                returns.nrows()
            )));
        }
        if !dates.is_empty() && dates.len() != returns.nrows() {
            return Err(AdvisorError::InvalidInput(format!(
                "Return matrix has {} rows for {} dates",
                returns.nrows(),
                dates.len()
            )));
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(AdvisorError::InvalidInput(
                "Return matrix contains non-finite values".to_string(),
            ));
        }
        ensure_unique(&assets)?;

        Ok(Self {
            assets,
            dates,
            returns,
        })
    }

    /// Build from per-asset return columns of equal length
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let num_obs = columns.first().map(|(_, data)| data.len()).unwrap_or(0);
        for (asset, data) in &columns {
            if data.len() != num_obs {
                return Err(AdvisorError::InvalidInput(format!(
                    "Asset {} has {} observations, expected {}",
                    asset,
                    data.len(),
                    num_obs
                )));
            }
        }

        let returns = DMatrix::from_fn(num_obs, columns.len(), |i, j| columns[j].1[i]);
        let assets = columns.into_iter().map(|(asset, _)| asset).collect();
        Self::new(assets, Vec::new(), returns)
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn returns(&self) -> &DMatrix<f64> {
        &self.returns
    }

    pub fn num_observations(&self) -> usize {
        self.returns.nrows()
    }

    /// Return series of one asset
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.returns.column(index).iter().copied().collect()
    }

    /// Daily sample covariance (divisor T-1)
    pub fn daily_covariance(&self) -> DMatrix<f64> {
        let n_obs = self.returns.nrows();
        let means = self.returns.row_mean();
        let mut centered = self.returns.clone();
        for mut row in centered.row_iter_mut() {
            row -= &means;
        }
        (centered.transpose() * centered) / (n_obs - 1) as f64
    }

    /// Annualized statistics for the portfolio engines
    pub fn to_universe(&self) -> Result<AssetUniverse> {
        let mean_returns = self.returns.row_mean().transpose() * TRADING_DAYS;
        let covariance = self.daily_covariance() * TRADING_DAYS;
        AssetUniverse::new(self.assets.clone(), mean_returns, covariance)
    }

    /// Per-asset performance metrics
    pub fn metrics(&self, risk_free_rate: f64) -> Result<MetricsReport> {
        if !risk_free_rate.is_finite() {
            return Err(AdvisorError::InvalidInput(
                "Risk-free rate must be finite".to_string(),
            ));
        }

        let assets = self
            .assets
            .iter()
            .enumerate()
            .map(|(j, asset)| {
                PerformanceMetrics::from_returns(&self.column(j), risk_free_rate)
                    .map(|metrics| AssetMetrics {
                        asset: asset.clone(),
                        metrics,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MetricsReport {
            risk_free_rate,
            start_date: self.dates.first().copied(),
            end_date: self.dates.last().copied(),
            computed_at: Utc::now(),
            assets,
        })
    }
}

/// Annualized mean returns and covariance of an ordered asset set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetUniverse {
    assets: Vec<String>,
    mean_returns: DVector<f64>,
    covariance: DMatrix<f64>,
}

impl AssetUniverse {
    /// Build a validated universe
    ///
    /// Rejects empty or duplicate asset lists, mismatched dimensions,
    /// non-finite entries and asymmetric covariance matrices.
    pub fn new(
        assets: Vec<String>,
        mean_returns: DVector<f64>,
        covariance: DMatrix<f64>,
    ) -> Result<Self> {
        let n = assets.len();
        if n == 0 {
            return Err(AdvisorError::InvalidInput("No assets provided".to_string()));
        }
        if mean_returns.len() != n {
            return Err(AdvisorError::InvalidInput(format!(
                "Mean return vector has length {}, expected {}",
                mean_returns.len(),
                n
            )));
        }
        if !covariance.is_square() {
            return Err(AdvisorError::InvalidInput(format!(
                "Covariance matrix is {}x{}, expected square",
                covariance.nrows(),
                covariance.ncols()
            )));
        }
        if covariance.nrows() != n {
            return Err(AdvisorError::InvalidInput(format!(
                "Covariance matrix is {}x{}, expected {}x{}",
                covariance.nrows(),
                covariance.ncols(),
                n,
                n
            )));
        }
        if mean_returns.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            return Err(AdvisorError::InvalidInput(
                "Mean returns and covariance must be finite".to_string(),
            ));
        }

        let scale = covariance.amax().max(1.0);
        for i in 0..n {
            for j in (i + 1)..n {
                if (covariance[(i, j)] - covariance[(j, i)]).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(AdvisorError::InvalidInput(format!(
                        "Covariance matrix is not symmetric at ({}, {})",
                        i, j
                    )));
                }
            }
        }
        ensure_unique(&assets)?;

        Ok(Self {
            assets,
            mean_returns,
            covariance,
        })
    }

    /// Convenience constructor from row-major slices
    pub fn from_slices(assets: &[&str], mean_returns: &[f64], covariance: &[&[f64]]) -> Result<Self> {
        let n = covariance.len();
        let cols = covariance.first().map(|row| row.len()).unwrap_or(0);
        if covariance.iter().any(|row| row.len() != cols) {
            return Err(AdvisorError::InvalidInput(
                "Covariance rows have different lengths".to_string(),
            ));
        }

        Self::new(
            assets.iter().map(|a| a.to_string()).collect(),
            DVector::from_column_slice(mean_returns),
            DMatrix::from_fn(n, cols, |i, j| covariance[i][j]),
        )
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn mean_returns(&self) -> &DVector<f64> {
        &self.mean_returns
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn index_of(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Largest mean return in the universe
    pub fn max_mean_return(&self) -> f64 {
        self.mean_returns.max()
    }

    /// Restrict the universe to the given asset indices, in that order
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(AdvisorError::InvalidInput(format!(
                "Asset index {} out of range for {} assets",
                bad,
                self.len()
            )));
        }

        let assets = indices.iter().map(|&i| self.assets[i].clone()).collect();
        let mean_returns = DVector::from_iterator(
            indices.len(),
            indices.iter().map(|&i| self.mean_returns[i]),
        );
        let covariance = DMatrix::from_fn(indices.len(), indices.len(), |r, c| {
            self.covariance[(indices[r], indices[c])]
        });

        Self::new(assets, mean_returns, covariance)
    }
}

fn ensure_unique(assets: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for asset in assets {
        if !seen.insert(asset.as_str()) {
            return Err(AdvisorError::InvalidInput(format!(
                "Duplicate asset identifier: {}",
                asset
            )));
        }
    }
    Ok(())
}

/// Risk-adjusted performance of a single return series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Compounded annual return: (1 + mean daily)^252 - 1
    pub annualized_return: f64,

    /// Daily sample standard deviation scaled by √252
    pub annualized_volatility: f64,

    /// (Annualized return - rf) / annualized volatility
    pub sharpe_ratio: f64,

    /// (Annualized return - rf) / annualized downside deviation
    pub sortino_ratio: f64,

    /// Largest peak-to-trough decline of cumulative return (<= 0)
    pub max_drawdown: f64,
}

impl PerformanceMetrics {
    /// Calculate all metrics for a daily return series
    pub fn from_returns(returns: &[f64], risk_free_rate: f64) -> Result<Self> {
        if returns.len() < 2 {
            return Err(AdvisorError::InvalidInput(format!(
                "Need at least 2 returns, got {}",
                returns.len()
            )));
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(AdvisorError::InvalidInput(
                "Return series contains non-finite values".to_string(),
            ));
        }

        let mean_daily = returns.iter().mean();
        let annualized_return = (1.0 + mean_daily).powf(TRADING_DAYS) - 1.0;
        let annualized_volatility = returns.iter().std_dev() * TRADING_DAYS.sqrt();
        let excess = annualized_return - risk_free_rate;

        let sharpe_ratio = if annualized_volatility != 0.0 {
            excess / annualized_volatility
        } else {
            0.0
        };

        let downside_deviation = downside_deviation(returns);
        let sortino_ratio = if downside_deviation != 0.0 {
            excess / downside_deviation
        } else {
            0.0
        };

        Ok(Self {
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown: max_drawdown(returns),
        })
    }
}

/// Sample deviation of the negative returns, annualized
///
/// Zero when fewer than two periods are negative.
fn downside_deviation(returns: &[f64]) -> f64 {
    let negatives: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();
    if negatives.len() < 2 {
        return 0.0;
    }
    negatives.iter().std_dev() * TRADING_DAYS.sqrt()
}

/// Minimum of cumulative / running maximum - 1
fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;

    for r in returns {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        max_dd = max_dd.min(cumulative / peak - 1.0);
    }

    max_dd
}

/// Metrics of one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetrics {
    pub asset: String,
    pub metrics: PerformanceMetrics,
}

/// Per-asset metrics snapshot over a date range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub risk_free_rate: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub computed_at: DateTime<Utc>,
    pub assets: Vec<AssetMetrics>,
}

impl MetricsReport {
    pub fn get(&self, asset: &str) -> Option<&PerformanceMetrics> {
        self.assets
            .iter()
            .find(|entry| entry.asset == asset)
            .map(|entry| &entry.metrics)
    }

    /// Keep only the listed assets, preserving report order
    pub fn restricted_to(&self, assets: &[&str]) -> Self {
        Self {
            assets: self
                .assets
                .iter()
                .filter(|entry| assets.contains(&entry.asset.as_str()))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}
