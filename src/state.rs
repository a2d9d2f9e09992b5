use crate::errors::{HedgeError, HedgeResult};
use chrono::NaiveDate;
use std::str::FromStr;

// ── Market snapshot ──

/// Immutable snapshot of the market passed into every calculation.
/// The core never mutates it and never fills gaps in it; callers substitute
/// defaults before constructing one (see `feeds::market_data`).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarketConditions {
    /// Volatility index level (VIX points).
    pub vix: f64,
    /// Underlying index price.
    pub underlying_price: f64,
    pub risk_free_rate: f64,
    /// Average pairwise asset correlation, 0..1.
    pub average_correlation: f64,
    /// Current volume / average volume.
    pub volume_ratio: f64,
    /// Current bid-ask spread / average spread.
    pub bid_ask_spread_ratio: f64,
    /// Recent portfolio return (negative = drawdown).
    pub portfolio_return: f64,
    /// One-day change in the volatility index, used as a momentum signal.
    pub vix_daily_change: f64,
}

impl MarketConditions {
    /// Snapshot with neutral correlation, liquidity and drawdown readings.
    pub fn new(vix: f64, underlying_price: f64, risk_free_rate: f64) -> Self {
        Self {
            vix,
            underlying_price,
            risk_free_rate,
            average_correlation: 0.5,
            volume_ratio: 1.0,
            bid_ask_spread_ratio: 1.0,
            portfolio_return: 0.0,
            vix_daily_change: 0.0,
        }
    }

    pub fn with_correlation(mut self, correlation: f64) -> Self {
        self.average_correlation = correlation;
        self
    }

    pub fn with_liquidity(mut self, volume_ratio: f64, bid_ask_spread_ratio: f64) -> Self {
        self.volume_ratio = volume_ratio;
        self.bid_ask_spread_ratio = bid_ask_spread_ratio;
        self
    }

    pub fn with_portfolio_return(mut self, portfolio_return: f64) -> Self {
        self.portfolio_return = portfolio_return;
        self
    }

    pub fn with_vix_change(mut self, vix_daily_change: f64) -> Self {
        self.vix_daily_change = vix_daily_change;
        self
    }
}

// ── Option contracts ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Put,
    Call,
}

impl OptionType {
    /// Payoff at expiry.
    #[inline]
    pub fn intrinsic(self, spot: f64, strike: f64) -> f64 {
        match self {
            Self::Put => (strike - spot).max(0.0),
            Self::Call => (spot - strike).max(0.0),
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Put => write!(f, "put"),
            Self::Call => write!(f, "call"),
        }
    }
}

impl FromStr for OptionType {
    type Err = HedgeError;

    fn from_str(s: &str) -> HedgeResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "put" | "p" => Ok(Self::Put),
            "call" | "c" => Ok(Self::Call),
            other => Err(HedgeError::unknown("option type", other)),
        }
    }
}

/// Listed contract as supplied by the options chain source. Read-only input.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub underlying: String,
    pub strike: f64,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub volume: u64,
    pub open_interest: u64,
}

impl OptionContract {
    /// Mid quote, if both sides are present.
    pub fn mid(&self) -> Option<f64> {
        if self.bid > 0.0 && self.ask >= self.bid {
            Some(0.5 * (self.bid + self.ask))
        } else {
            None
        }
    }

    /// Time to expiry in years (ACT/365) as of `as_of`. Zero once expired.
    pub fn time_to_expiry(&self, as_of: NaiveDate) -> f64 {
        let days = (self.expiry - as_of).num_days();
        (days.max(0) as f64) / 365.0
    }
}

// ── Volatility regimes ──

/// Discrete market stress level, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityRegime {
    Low,
    Medium,
    High,
    Extreme,
}

impl VolatilityRegime {
    pub const ALL: [VolatilityRegime; 4] = [Self::Low, Self::Medium, Self::High, Self::Extreme];

    /// 0 = low .. 3 = extreme.
    #[inline]
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Extreme => 3,
        }
    }

    /// High or extreme.
    #[inline]
    pub fn is_stressed(self) -> bool {
        matches!(self, Self::High | Self::Extreme)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Extreme => "extreme",
        }
    }
}

impl std::fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolatilityRegime {
    type Err = HedgeError;

    fn from_str(s: &str) -> HedgeResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "extreme" => Ok(Self::Extreme),
            other => Err(HedgeError::unknown("volatility regime", other)),
        }
    }
}

/// One value per regime. Lookups are exhaustive, so a missing regime is a
/// compile error rather than a silent default.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegimeTable<T> {
    pub low: T,
    pub medium: T,
    pub high: T,
    pub extreme: T,
}

impl<T> RegimeTable<T> {
    pub const fn new(low: T, medium: T, high: T, extreme: T) -> Self {
        Self { low, medium, high, extreme }
    }

    #[inline]
    pub fn get(&self, regime: VolatilityRegime) -> &T {
        match regime {
            VolatilityRegime::Low => &self.low,
            VolatilityRegime::Medium => &self.medium,
            VolatilityRegime::High => &self.high,
            VolatilityRegime::Extreme => &self.extreme,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> RegimeTable<U> {
        RegimeTable {
            low: f(&self.low),
            medium: f(&self.medium),
            high: f(&self.high),
            extreme: f(&self.extreme),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (VolatilityRegime, &T)> {
        VolatilityRegime::ALL.into_iter().map(move |r| (r, self.get(r)))
    }
}

// ── Historical data ──

/// One trading day of history: volatility index close and index return.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HistoricalObservation {
    pub date: NaiveDate,
    pub vix: f64,
    pub index_return: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regime_order() {
        assert!(VolatilityRegime::Low < VolatilityRegime::Medium);
        assert!(VolatilityRegime::High < VolatilityRegime::Extreme);
        assert_eq!(VolatilityRegime::Extreme.rank(), 3);
    }

    #[test]
    fn test_regime_parse_rejects_unknown() {
        assert_eq!("HIGH".parse::<VolatilityRegime>().ok(), Some(VolatilityRegime::High));
        assert!(matches!(
            "panic".parse::<VolatilityRegime>(),
            Err(HedgeError::UnknownVariant { kind: "volatility regime", .. })
        ));
    }

    #[test]
    fn test_regime_table_lookup() {
        let t = RegimeTable::new(1.0, 1.2, 1.5, 2.0);
        assert_eq!(*t.get(VolatilityRegime::High), 1.5);
        let doubled = t.map(|v| v * 2.0);
        assert_eq!(*doubled.get(VolatilityRegime::Extreme), 4.0);
        assert_eq!(t.iter().count(), 4);
    }

    #[test]
    fn test_contract_mid_and_expiry() {
        let c = OptionContract {
            symbol: "SPY250620P00360000".into(),
            underlying: "SPY".into(),
            strike: 360.0,
            expiry: NaiveDate::from_ymd_opt(2025, 6, 20).unwrap(),
            option_type: OptionType::Put,
            bid: 1.10,
            ask: 1.30,
            last: 1.2,
            volume: 120,
            open_interest: 4000,
        };
        assert!((c.mid().unwrap() - 1.2).abs() < 1e-12);
        let as_of = NaiveDate::from_ymd_opt(2025, 3, 22).unwrap();
        assert!((c.time_to_expiry(as_of) - 90.0 / 365.0).abs() < 1e-12);
        let after = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(c.time_to_expiry(after), 0.0);
    }

    #[test]
    fn test_intrinsic() {
        assert_eq!(OptionType::Put.intrinsic(90.0, 100.0), 10.0);
        assert_eq!(OptionType::Call.intrinsic(90.0, 100.0), 0.0);
    }
}
