use crate::risk::unit_interval;
use crate::state::MarketConditions;

/// Weights of the overall stress score. Sum to 1 by default.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StressWeights {
    pub vix: f64,
    pub correlation: f64,
    pub liquidity: f64,
    pub drawdown: f64,
}

impl Default for StressWeights {
    fn default() -> Self {
        Self { vix: 0.4, correlation: 0.2, liquidity: 0.2, drawdown: 0.2 }
    }
}

/// Market stress sub-scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct StressIndicators {
    pub vix_stress: f64,
    pub correlation_stress: f64,
    pub liquidity_stress: f64,
    pub drawdown_stress: f64,
    pub overall_stress: f64,
}

/// Four-segment ramp: flat below 15, 0..1 over 15-25, 0.5..1 over 25-40,
/// then 0.8 + (vix - 40)/40 capped at 1.
///
/// Not continuous: stress approaches 1 just below VIX 25 and restarts at 0.5
/// at 25. The 25-40 band is scored on its own scale, so callers must not
/// assume stress is monotone in VIX.
#[inline]
pub fn vix_stress(vix: f64) -> f64 {
    let s = if vix < 15.0 {
        0.0
    } else if vix < 25.0 {
        (vix - 15.0) / 10.0
    } else if vix < 40.0 {
        0.5 + (vix - 25.0) / 30.0
    } else {
        0.8 + (vix - 40.0) / 40.0
    };
    unit_interval(s)
}

/// Ramps from 0 at correlation 0.5 to 1 at 0.9.
#[inline]
pub fn correlation_stress(correlation: f64) -> f64 {
    unit_interval((correlation - 0.5) / 0.4)
}

/// Mean of spread widening (1x..3x) and volume drop (100%..50% of normal).
#[inline]
pub fn liquidity_stress(volume_ratio: f64, bid_ask_spread_ratio: f64) -> f64 {
    let spread = unit_interval((bid_ask_spread_ratio - 1.0) / 2.0);
    let volume = unit_interval((1.0 - volume_ratio) / 0.5);
    0.5 * (spread + volume)
}

/// |return| against a 20% cap.
#[inline]
pub fn drawdown_stress(portfolio_return: f64) -> f64 {
    unit_interval(portfolio_return.abs() / 0.20)
}

/// Pure function of the snapshot.
pub fn monitor_stress(conditions: &MarketConditions, weights: &StressWeights) -> StressIndicators {
    let vix_stress = vix_stress(conditions.vix);
    let correlation_stress = correlation_stress(conditions.average_correlation);
    let liquidity_stress = liquidity_stress(conditions.volume_ratio, conditions.bid_ask_spread_ratio);
    let drawdown_stress = drawdown_stress(conditions.portfolio_return);

    let overall_stress = unit_interval(
        weights.vix * vix_stress
            + weights.correlation * correlation_stress
            + weights.liquidity * liquidity_stress
            + weights.drawdown * drawdown_stress,
    );

    StressIndicators { vix_stress, correlation_stress, liquidity_stress, drawdown_stress, overall_stress }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_vix_ramp_breakpoints() {
        assert_eq!(vix_stress(10.0), 0.0);
        assert!((vix_stress(20.0) - 0.5).abs() < 1e-12);
        assert!((vix_stress(25.0) - 0.5).abs() < 1e-12);
        assert!((vix_stress(40.0) - 0.8).abs() < 1e-12);
        assert_eq!(vix_stress(90.0), 1.0);
    }

    #[test]
    fn test_vix_ramp_drops_at_25() {
        assert!(vix_stress(24.99) > 0.99, "stress={}", vix_stress(24.99));
        assert!((vix_stress(25.0) - 0.5).abs() < 1e-12);
        assert!(vix_stress(25.0) < vix_stress(24.99));
    }

    #[test]
    fn test_calm_market_has_no_stress() {
        let s = monitor_stress(&MarketConditions::new(12.0, 420.0, 0.045), &StressWeights::default());
        assert_eq!(s.overall_stress, 0.0);
    }

    #[test]
    fn test_crisis_snapshot() {
        let c = MarketConditions::new(45.0, 420.0, 0.045)
            .with_correlation(0.85)
            .with_portfolio_return(-0.08)
            .with_liquidity(0.3, 2.5);
        let s = monitor_stress(&c, &StressWeights::default());
        assert!((s.vix_stress - 0.925).abs() < 1e-12);
        assert!((s.correlation_stress - 0.875).abs() < 1e-12);
        assert!((s.liquidity_stress - 0.875).abs() < 1e-12);
        assert!((s.drawdown_stress - 0.4).abs() < 1e-12);
        assert!((s.overall_stress - 0.8).abs() < 1e-12, "overall={}", s.overall_stress);
    }

    #[test]
    fn test_nan_reading_does_not_propagate() {
        let c = MarketConditions::new(f64::NAN, 420.0, 0.045).with_correlation(f64::NAN);
        let s = monitor_stress(&c, &StressWeights::default());
        assert!(s.overall_stress.is_finite());
    }

    proptest! {
        #[test]
        fn prop_scores_in_unit_interval(
            vix in -10.0f64..200.0,
            corr in -1.0f64..1.5,
            vol in -1.0f64..5.0,
            spread in -1.0f64..10.0,
            ret in -1.0f64..1.0,
        ) {
            let c = MarketConditions::new(vix, 420.0, 0.045)
                .with_correlation(corr)
                .with_liquidity(vol, spread)
                .with_portfolio_return(ret);
            let s = monitor_stress(&c, &StressWeights::default());
            for v in [s.vix_stress, s.correlation_stress, s.liquidity_stress, s.drawdown_stress, s.overall_stress] {
                prop_assert!((0.0..=1.0).contains(&v), "score {} out of range", v);
            }
        }
    }
}
