use crate::errors::{HedgeError, HedgeResult};
use crate::state::{RegimeTable, VolatilityRegime};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};

/// Reference expiries (days) the term-structure tables are defined on.
pub const REFERENCE_EXPIRIES: [u32; 4] = [30, 60, 90, 180];

/// Expiry the inversion cost impact is measured against.
const INVERSION_BASE_EXPIRY: u32 = 90;

/// Horizon (days) at which the transition matrix applies unblended.
const TRANSITION_HORIZON_DAYS: f64 = 30.0;

/// Default comparison for pricing efficiency and allocation: 2M vs 6M.
const SHORT_REFERENCE_DAYS: u32 = 60;
const LONG_REFERENCE_DAYS: u32 = 180;

// ── Configuration ──

/// VIX breakpoints between low/medium, medium/high and high/extreme.
/// Strictly increasing; enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RegimeThresholds {
    low: f64,
    medium: f64,
    high: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self { low: 15.0, medium: 25.0, high: 40.0 }
    }
}

impl RegimeThresholds {
    pub fn new(low: f64, medium: f64, high: f64) -> HedgeResult<Self> {
        let finite = low.is_finite() && medium.is_finite() && high.is_finite();
        if !finite || !(low < medium && medium < high) {
            return Err(HedgeError::Config(format!(
                "regime thresholds must be finite and strictly increasing, got {low}/{medium}/{high}"
            )));
        }
        Ok(Self { low, medium, high })
    }

    /// Threshold ladder. Each breakpoint belongs to the regime above it,
    /// so VIX 25 is high under the defaults. NaN falls through to extreme.
    #[inline]
    pub fn classify(&self, vix: f64) -> VolatilityRegime {
        if vix < self.low {
            VolatilityRegime::Low
        } else if vix < self.medium {
            VolatilityRegime::Medium
        } else if vix < self.high {
            VolatilityRegime::High
        } else {
            VolatilityRegime::Extreme
        }
    }

    pub fn breakpoints(&self) -> [f64; 3] {
        [self.low, self.medium, self.high]
    }
}

impl FromStr for RegimeThresholds {
    type Err = HedgeError;

    /// "15,25,40"
    fn from_str(s: &str) -> HedgeResult<Self> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HedgeError::Config(format!("REGIME_THRESHOLDS: {e}")))?;
        match values.as_slice() {
            &[low, medium, high] => Self::new(low, medium, high),
            _ => Err(HedgeError::Config(format!(
                "REGIME_THRESHOLDS: expected 3 values, got {}",
                values.len()
            ))),
        }
    }
}

/// Hand-tuned empirical constants of the regime model.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RegimeConfig {
    pub thresholds: RegimeThresholds,
    /// Normal-market slope, indexed like REFERENCE_EXPIRIES.
    pub base_adjustments: [f64; 4],
    /// Additional vol per regime, steepest at the short end.
    pub regime_adjustments: RegimeTable<[f64; 4]>,
    pub allocation_multipliers: RegimeTable<f64>,
    /// Rows: current regime. Columns: next regime.
    pub transition_matrix: RegimeTable<RegimeTable<f64>>,
    /// Vol level the term-structure adjustments are added to.
    pub base_volatility: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            thresholds: RegimeThresholds::default(),
            base_adjustments: [0.02, 0.0, -0.01, -0.02],
            regime_adjustments: RegimeTable::new(
                [0.0, 0.0, 0.0, 0.0],
                [0.03, 0.01, 0.0, -0.01],
                [0.10, 0.05, 0.02, 0.0],
                [0.20, 0.12, 0.06, 0.02],
            ),
            allocation_multipliers: RegimeTable::new(1.0, 1.3, 1.8, 2.5),
            transition_matrix: RegimeTable::new(
                RegimeTable::new(0.85, 0.12, 0.03, 0.00),
                RegimeTable::new(0.20, 0.60, 0.18, 0.02),
                RegimeTable::new(0.05, 0.25, 0.60, 0.10),
                RegimeTable::new(0.01, 0.09, 0.50, 0.40),
            ),
            base_volatility: 0.20,
        }
    }
}

impl RegimeConfig {
    pub fn with_thresholds(mut self, thresholds: RegimeThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Every transition row must be a probability distribution.
    pub fn validate(&self) -> HedgeResult<()> {
        for (from, row) in self.transition_matrix.iter() {
            let sum: f64 = row.iter().map(|(_, p)| *p).sum();
            if row.iter().any(|(_, p)| !(*p >= 0.0)) || (sum - 1.0).abs() > 1e-9 {
                return Err(HedgeError::Config(format!(
                    "transition row for {from} must be non-negative and sum to 1, sums to {sum}"
                )));
            }
        }
        Ok(())
    }
}

// ── Results ──

/// Vol adjustment per expiry (days). Serializes as a plain map.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct TermStructure(BTreeMap<u32, f64>);

impl TermStructure {
    pub fn get(&self, days: u32) -> Option<f64> {
        self.0.get(&days).copied()
    }

    /// Linear interpolation between the two nearest points, flat beyond
    /// the ends.
    pub fn adjustment_at(&self, days: u32) -> f64 {
        if let Some(v) = self.get(days) {
            return v;
        }
        let below = self.0.range(..days).next_back();
        let above = self.0.range(days..).next();
        match (below, above) {
            (Some((&d0, &v0)), Some((&d1, &v1))) => {
                let w = (days - d0) as f64 / (d1 - d0) as f64;
                v0 + w * (v1 - v0)
            }
            (Some((_, &v)), None) | (None, Some((_, &v))) => v,
            (None, None) => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.0.iter().map(|(d, v)| (*d, *v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RegimeObservation {
    pub timestamp: DateTime<Utc>,
    pub vix: f64,
    pub regime: VolatilityRegime,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct AllocationRecommendation {
    pub regime: VolatilityRegime,
    pub base_allocation: f64,
    pub regime_multiplier: f64,
    pub relative_efficiency: f64,
    pub efficiency_adjustment: f64,
    pub final_multiplier: f64,
    pub recommended_allocation: f64,
    pub shift_to_longer_term: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RegimeReport {
    pub timestamp: DateTime<Utc>,
    pub current_vix: f64,
    pub current_regime: VolatilityRegime,
    pub transition_probabilities: RegimeTable<f64>,
    pub persistence_probability: f64,
    pub term_structure: TermStructure,
    /// 30d adjustment above 180d.
    pub inversion_detected: bool,
    /// 60d minus 180d adjustment.
    pub short_term_premium: f64,
    pub relative_efficiency_2m_vs_6m: f64,
    pub short_term_expensive: bool,
    pub allocation: AllocationRecommendation,
}

// ── Analyzer ──

/// Classifies market stress and models how relative option cost across
/// expiries shifts with it.
///
/// Everything is a pure function of config and arguments except the
/// classification history, which is append-only and read only for
/// diagnostics.
#[derive(Debug, Clone, Default)]
pub struct VolatilityRegimeAnalyzer {
    config: RegimeConfig,
    history: Vec<RegimeObservation>,
}

impl VolatilityRegimeAnalyzer {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config, history: Vec::new() }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Classify and record. Use `config().thresholds.classify` for a
    /// side-effect-free lookup.
    pub fn classify(&mut self, vix: f64) -> VolatilityRegime {
        let regime = self.config.thresholds.classify(vix);
        self.history.push(RegimeObservation { timestamp: Utc::now(), vix, regime });
        info!(regime = %regime, vix, "volatility regime classified");
        regime
    }

    pub fn history(&self) -> &[RegimeObservation] {
        &self.history
    }

    /// Classifies `vix`, then returns the term structure for that regime.
    pub fn term_structure(&mut self, vix: f64) -> TermStructure {
        let regime = self.classify(vix);
        self.term_structure_for(regime)
    }

    /// Base slope plus the regime's adjustment at each reference expiry.
    pub fn term_structure_for(&self, regime: VolatilityRegime) -> TermStructure {
        let regime_adj = self.config.regime_adjustments.get(regime);
        let points: BTreeMap<u32, f64> = REFERENCE_EXPIRIES
            .iter()
            .enumerate()
            .map(|(i, &days)| (days, self.config.base_adjustments[i] + regime_adj[i]))
            .collect();
        debug!(regime = %regime, adjustments = ?points, "term structure adjustments");
        TermStructure(points)
    }

    /// Next-regime distribution. Horizons past half a month blend toward
    /// medium; the result is always renormalized.
    pub fn transition_probabilities(&self, current: VolatilityRegime, horizon_days: u32) -> RegimeTable<f64> {
        let mut row = *self.config.transition_matrix.get(current);

        let horizon = (horizon_days as f64 / TRANSITION_HORIZON_DAYS).min(1.0);
        if horizon > 0.5 {
            let mean_reversion = (horizon - 0.5) * 0.3;
            row.medium += mean_reversion * 0.2;
        }

        let total: f64 = row.iter().map(|(_, p)| p.max(0.0)).sum();
        if !(total > 0.0) {
            let mut stay = RegimeTable::new(0.0, 0.0, 0.0, 0.0);
            match current {
                VolatilityRegime::Low => stay.low = 1.0,
                VolatilityRegime::Medium => stay.medium = 1.0,
                VolatilityRegime::High => stay.high = 1.0,
                VolatilityRegime::Extreme => stay.extreme = 1.0,
            }
            return stay;
        }
        row.map(|p| p.max(0.0) / total)
    }

    /// Short/long cost-per-day ratio, where cost per day is
    /// vol * sqrt(days) / days on term-structure adjusted vols.
    /// Above 1 means the short expiry is relatively expensive.
    pub fn relative_pricing_efficiency(&self, short_days: u32, long_days: u32, regime: VolatilityRegime) -> f64 {
        if short_days == 0 || long_days == 0 {
            return 1.0;
        }
        let ts = self.term_structure_for(regime);
        let short_vol = self.config.base_volatility + ts.adjustment_at(short_days);
        let long_vol = self.config.base_volatility + ts.adjustment_at(long_days);

        let per_day = |vol: f64, days: u32| vol * (days as f64).sqrt() / days as f64;
        let long_cost = per_day(long_vol, long_days);
        if !(long_cost > 0.0) {
            return 1.0;
        }
        let efficiency = per_day(short_vol, short_days) / long_cost;
        debug!(short_days, long_days, efficiency, "relative pricing efficiency");
        efficiency
    }

    pub fn allocation_recommendation(&self, regime: VolatilityRegime, base_allocation: f64) -> AllocationRecommendation {
        let regime_multiplier = *self.config.allocation_multipliers.get(regime);
        let relative_efficiency =
            self.relative_pricing_efficiency(SHORT_REFERENCE_DAYS, LONG_REFERENCE_DAYS, regime);

        let efficiency_adjustment = if relative_efficiency > 2.0 {
            0.6
        } else if relative_efficiency > 1.5 {
            0.8
        } else {
            1.0
        };
        let final_multiplier = regime_multiplier * efficiency_adjustment;

        AllocationRecommendation {
            regime,
            base_allocation,
            regime_multiplier,
            relative_efficiency,
            efficiency_adjustment,
            final_multiplier,
            recommended_allocation: base_allocation * final_multiplier,
            shift_to_longer_term: relative_efficiency > 1.8,
        }
    }

    /// Cost multiplier per expiry relative to the 90-day point, after
    /// classifying `vix`.
    pub fn term_structure_inversion_impact(&mut self, expiries: &[u32], vix: f64) -> BTreeMap<u32, f64> {
        let regime = self.classify(vix);
        self.inversion_impact_for(regime, expiries)
    }

    pub fn inversion_impact_for(&self, regime: VolatilityRegime, expiries: &[u32]) -> BTreeMap<u32, f64> {
        let ts = self.term_structure_for(regime);
        let base = ts.adjustment_at(INVERSION_BASE_EXPIRY);
        expiries
            .iter()
            .map(|&days| (days, 1.0 + (ts.adjustment_at(days) - base)))
            .collect()
    }

    pub fn regime_report(&mut self, vix: f64) -> RegimeReport {
        let current_regime = self.classify(vix);
        let transition_probabilities = self.transition_probabilities(current_regime, 30);
        let term_structure = self.term_structure_for(current_regime);
        let allocation = self.allocation_recommendation(current_regime, 0.05);

        let short = term_structure.adjustment_at(30);
        let long = term_structure.adjustment_at(LONG_REFERENCE_DAYS);
        let short_term_premium = term_structure.adjustment_at(SHORT_REFERENCE_DAYS) - long;

        RegimeReport {
            timestamp: Utc::now(),
            current_vix: vix,
            current_regime,
            persistence_probability: *transition_probabilities.get(current_regime),
            transition_probabilities,
            inversion_detected: short > long,
            short_term_premium,
            relative_efficiency_2m_vs_6m: allocation.relative_efficiency,
            short_term_expensive: allocation.relative_efficiency > 1.5,
            term_structure,
            allocation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classify_ladder() {
        let mut a = VolatilityRegimeAnalyzer::default();
        assert_eq!(a.classify(12.0), VolatilityRegime::Low);
        assert_eq!(a.classify(22.0), VolatilityRegime::Medium);
        assert_eq!(a.classify(35.0), VolatilityRegime::High);
        assert_eq!(a.classify(55.0), VolatilityRegime::Extreme);
        // Breakpoints belong to the regime above
        assert_eq!(a.classify(25.0), VolatilityRegime::High);
        assert_eq!(a.classify(15.0), VolatilityRegime::Medium);
        assert_eq!(a.history().len(), 6);
        assert_eq!(a.history()[0].regime, VolatilityRegime::Low);
    }

    #[test]
    fn test_thresholds_must_increase() {
        assert!(RegimeThresholds::new(15.0, 25.0, 40.0).is_ok());
        assert!(matches!(RegimeThresholds::new(25.0, 15.0, 40.0), Err(HedgeError::Config(_))));
        assert!(RegimeThresholds::new(15.0, 15.0, 40.0).is_err());
        assert!(RegimeThresholds::new(15.0, f64::NAN, 40.0).is_err());
        assert_eq!("10, 20, 30".parse::<RegimeThresholds>().unwrap().breakpoints(), [10.0, 20.0, 30.0]);
        assert!("10,20".parse::<RegimeThresholds>().is_err());
        assert!("10,x,30".parse::<RegimeThresholds>().is_err());
    }

    #[test]
    fn test_term_structure_inverts_under_stress() {
        let a = VolatilityRegimeAnalyzer::default();
        for regime in [VolatilityRegime::High, VolatilityRegime::Extreme] {
            let ts = a.term_structure_for(regime);
            assert!(ts.adjustment_at(30) > ts.adjustment_at(180), "{regime}");
        }
        let extreme = a.term_structure_for(VolatilityRegime::Extreme);
        assert!((extreme.adjustment_at(30) - 0.22).abs() < 1e-12);
        assert!((extreme.adjustment_at(180) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_term_structure_records_classification() {
        let mut a = VolatilityRegimeAnalyzer::default();
        let ts = a.term_structure(32.0);
        assert!((ts.get(60).unwrap() - 0.05).abs() < 1e-12);
        assert_eq!(a.history().len(), 1);
    }

    #[test]
    fn test_interpolation_and_clamping() {
        let ts = VolatilityRegimeAnalyzer::default().term_structure_for(VolatilityRegime::High);
        // 120d sits a third of the way from 90d (0.01) to 180d (-0.02)
        assert!((ts.adjustment_at(120) - 0.0).abs() < 1e-12);
        assert_eq!(ts.adjustment_at(7), ts.adjustment_at(30));
        assert_eq!(ts.adjustment_at(365), ts.adjustment_at(180));
    }

    #[test]
    fn test_transition_rows_normalized() {
        let config = RegimeConfig::default();
        assert!(config.validate().is_ok());
        let a = VolatilityRegimeAnalyzer::new(config);
        let p = a.transition_probabilities(VolatilityRegime::Low, 10);
        assert!((p.low - 0.85).abs() < 1e-12);
        let blended = a.transition_probabilities(VolatilityRegime::Low, 30);
        assert!(blended.medium > 0.12 && blended.low < 0.85);
    }

    #[test]
    fn test_bad_transition_row_rejected() {
        let mut config = RegimeConfig::default();
        config.transition_matrix.high.low = 0.5;
        assert!(matches!(config.validate(), Err(HedgeError::Config(_))));
    }

    #[test]
    fn test_efficiency_and_allocation() {
        let a = VolatilityRegimeAnalyzer::default();
        let low = a.relative_pricing_efficiency(60, 180, VolatilityRegime::Low);
        let extreme = a.relative_pricing_efficiency(60, 180, VolatilityRegime::Extreme);
        assert!(low > 1.0 && extreme > low, "low={low} extreme={extreme}");

        let rec = a.allocation_recommendation(VolatilityRegime::Extreme, 0.05);
        assert_eq!(rec.regime_multiplier, 2.5);
        assert_eq!(rec.efficiency_adjustment, 0.6);
        assert!(rec.shift_to_longer_term);
        assert!((rec.recommended_allocation - 0.05 * 2.5 * 0.6).abs() < 1e-12);

        let rec = a.allocation_recommendation(VolatilityRegime::Low, 0.05);
        assert_eq!(rec.efficiency_adjustment, 0.8);
    }

    #[test]
    fn test_inversion_impact_relative_to_90d() {
        let mut a = VolatilityRegimeAnalyzer::default();
        let impact = a.term_structure_inversion_impact(&[30, 90, 180], 50.0);
        assert!((impact[&90] - 1.0).abs() < 1e-12);
        assert!(impact[&30] > 1.0 && impact[&180] < 1.0);
    }

    #[test]
    fn test_regime_report() {
        let mut a = VolatilityRegimeAnalyzer::default();
        let r = a.regime_report(45.0);
        assert_eq!(r.current_regime, VolatilityRegime::Extreme);
        assert!(r.inversion_detected);
        assert!(r.short_term_expensive);
        assert!((r.persistence_probability - r.transition_probabilities.extreme).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_classify_monotonic(a in 0.0f64..150.0, b in 0.0f64..150.0) {
            let t = RegimeThresholds::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(t.classify(lo).rank() <= t.classify(hi).rank());
            prop_assert_eq!(t.classify(lo), t.classify(lo));
        }

        #[test]
        fn prop_transitions_sum_to_one(idx in 0usize..4, horizon in 0u32..400) {
            let a = VolatilityRegimeAnalyzer::default();
            let p = a.transition_probabilities(VolatilityRegime::ALL[idx], horizon);
            let sum: f64 = p.iter().map(|(_, v)| *v).sum();
            prop_assert!((sum - 1.0).abs() < 1e-12, "sum={}", sum);
            prop_assert!(p.iter().all(|(_, v)| *v >= 0.0));
        }
    }
}
