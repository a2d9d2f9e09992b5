use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::errors::{HedgeError, HedgeResult};
use crate::models::calibration::{quotes_from_chain, MarketQuote};
use crate::state::{HistoricalObservation, MarketConditions, OptionContract, OptionType};

/// Market snapshot provider. Implementations do their own I/O, retries and
/// caching; the core only sees the returned values.
pub trait MarketDataSource {
    fn spot(&self, symbol: &str) -> HedgeResult<f64>;

    fn volatility_index(&self, symbol: &str) -> HedgeResult<f64>;

    /// Annualized rate for a tenor in years.
    fn risk_free_rate(&self, tenor_years: f64) -> HedgeResult<f64>;

    /// Observations with `from <= date <= to`, oldest first.
    fn history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> HedgeResult<Vec<HistoricalObservation>>;
}

pub trait OptionChainSource {
    fn chain(&self, symbol: &str) -> HedgeResult<Vec<OptionContract>>;
}

/// Fallbacks substituted when a source cannot answer.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarketDefaults {
    pub underlying_symbol: String,
    pub volatility_symbol: String,
    pub spot: f64,
    pub vix: f64,
    pub risk_free_rate: f64,
    /// Tenor used for the rate lookup.
    pub rate_tenor_years: f64,
}

impl Default for MarketDefaults {
    fn default() -> Self {
        Self {
            underlying_symbol: "SPY".to_string(),
            volatility_symbol: "^VIX".to_string(),
            spot: 420.0,
            vix: 22.5,
            risk_free_rate: 0.045,
            rate_tenor_years: 0.25,
        }
    }
}

/// Caller-pinned values. Each one skips the source lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConditionOverrides {
    pub vix: Option<f64>,
    pub spot: Option<f64>,
    pub risk_free_rate: Option<f64>,
}

fn value_or_default(what: &str, fetched: HedgeResult<f64>, default: f64, valid: impl Fn(f64) -> bool) -> f64 {
    match fetched {
        Ok(v) if valid(v) => v,
        Ok(v) => {
            warn!(what, value = v, default, "implausible market data, using default");
            default
        }
        Err(e) => {
            warn!(what, error = %e, default, "market data unavailable, using default");
            default
        }
    }
}

/// Builds a `MarketConditions` snapshot: overrides first, then the source,
/// then `defaults`. Never fails; every substitution is logged.
pub fn resolve_conditions(
    source: &impl MarketDataSource,
    defaults: &MarketDefaults,
    overrides: &ConditionOverrides,
) -> MarketConditions {
    let positive = |v: f64| v.is_finite() && v > 0.0;

    let spot = overrides.spot.unwrap_or_else(|| {
        value_or_default("spot", source.spot(&defaults.underlying_symbol), defaults.spot, positive)
    });
    let vix = overrides.vix.unwrap_or_else(|| {
        value_or_default("vix", source.volatility_index(&defaults.volatility_symbol), defaults.vix, positive)
    });
    let rate = overrides.risk_free_rate.unwrap_or_else(|| {
        value_or_default(
            "risk_free_rate",
            source.risk_free_rate(defaults.rate_tenor_years),
            defaults.risk_free_rate,
            f64::is_finite,
        )
    });

    debug!(spot, vix, rate, "market conditions resolved");
    MarketConditions::new(vix, spot, rate)
}

/// Chain mid quotes for calibration, skipping unquoted or expired contracts.
pub fn calibration_quotes(
    source: &impl OptionChainSource,
    symbol: &str,
    as_of: NaiveDate,
    option_type: OptionType,
) -> HedgeResult<Vec<MarketQuote>> {
    let chain = source.chain(symbol)?;
    let quotes = quotes_from_chain(&chain, as_of, option_type);
    debug!(symbol, contracts = chain.len(), quotes = quotes.len(), "calibration quotes extracted");
    Ok(quotes)
}

// ── In-memory source ──

/// Fixed data held in memory. Used by the binary and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    spots: HashMap<String, f64>,
    volatility_indices: HashMap<String, f64>,
    risk_free_rate: Option<f64>,
    history: HashMap<String, Vec<HistoricalObservation>>,
    chains: HashMap<String, Vec<OptionContract>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spot(mut self, symbol: impl Into<String>, price: f64) -> Self {
        self.spots.insert(symbol.into(), price);
        self
    }

    pub fn with_volatility_index(mut self, symbol: impl Into<String>, level: f64) -> Self {
        self.volatility_indices.insert(symbol.into(), level);
        self
    }

    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = Some(rate);
        self
    }

    pub fn with_history(mut self, symbol: impl Into<String>, mut observations: Vec<HistoricalObservation>) -> Self {
        observations.sort_by_key(|o| o.date);
        self.history.insert(symbol.into(), observations);
        self
    }

    pub fn with_chain(mut self, symbol: impl Into<String>, chain: Vec<OptionContract>) -> Self {
        self.chains.insert(symbol.into(), chain);
        self
    }
}

fn missing(what: &str, symbol: &str) -> HedgeError {
    HedgeError::MarketData(format!("no {what} for {symbol}"))
}

impl MarketDataSource for StaticMarketData {
    fn spot(&self, symbol: &str) -> HedgeResult<f64> {
        self.spots.get(symbol).copied().ok_or_else(|| missing("spot price", symbol))
    }

    fn volatility_index(&self, symbol: &str) -> HedgeResult<f64> {
        self.volatility_indices.get(symbol).copied().ok_or_else(|| missing("volatility index", symbol))
    }

    fn risk_free_rate(&self, _tenor_years: f64) -> HedgeResult<f64> {
        self.risk_free_rate.ok_or_else(|| HedgeError::MarketData("no risk-free rate".into()))
    }

    fn history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> HedgeResult<Vec<HistoricalObservation>> {
        let all = self.history.get(symbol).ok_or_else(|| missing("history", symbol))?;
        Ok(all.iter().filter(|o| o.date >= from && o.date <= to).copied().collect())
    }
}

impl OptionChainSource for StaticMarketData {
    fn chain(&self, symbol: &str) -> HedgeResult<Vec<OptionContract>> {
        self.chains.get(symbol).cloned().ok_or_else(|| missing("option chain", symbol))
    }
}
