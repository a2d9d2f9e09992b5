use crate::errors::{HedgeError, HedgeResult};
use crate::risk::stress::StressIndicators;
use crate::state::MarketConditions;
use std::str::FromStr;

/// What a trigger watches. One variant per rule; `ExitTrigger::fires` is the
/// single dispatch point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTriggerKind {
    /// VIX at or above threshold (VIX points).
    VixSpike,
    /// |portfolio return| at or above threshold (fraction).
    PortfolioProtection,
    /// Position P&L multiple at or above threshold.
    ProfitTarget,
    /// Days to expiry at or below threshold.
    TimeDecay,
    /// Average correlation at or above threshold.
    CorrelationBreakdown,
    /// Liquidity stress score at or above threshold (0..1).
    LiquidityStress,
}

impl ExitTriggerKind {
    pub const ALL: [ExitTriggerKind; 6] = [
        Self::VixSpike,
        Self::PortfolioProtection,
        Self::ProfitTarget,
        Self::TimeDecay,
        Self::CorrelationBreakdown,
        Self::LiquidityStress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VixSpike => "vix_spike",
            Self::PortfolioProtection => "portfolio_protection",
            Self::ProfitTarget => "profit_target",
            Self::TimeDecay => "time_decay",
            Self::CorrelationBreakdown => "correlation_breakdown",
            Self::LiquidityStress => "liquidity_stress",
        }
    }
}

impl std::fmt::Display for ExitTriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitTriggerKind {
    type Err = HedgeError;

    fn from_str(s: &str) -> HedgeResult<Self> {
        let key = s.trim().to_ascii_lowercase();
        match key.as_str() {
            "portfolio_drawdown" | "drawdown" => Ok(Self::PortfolioProtection),
            _ => Self::ALL
                .into_iter()
                .find(|k| k.as_str() == key)
                .ok_or_else(|| HedgeError::unknown("exit trigger", key)),
        }
    }
}

/// Parses a comma-separated trigger list ("vix_spike,profit_target").
/// Unknown names are an error, not skipped.
pub fn parse_trigger_kinds(list: &str) -> HedgeResult<Vec<ExitTriggerKind>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Everything a trigger can look at for one decision.
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    pub conditions: &'a MarketConditions,
    pub stress: &'a StressIndicators,
    pub pnl_multiple: f64,
    pub days_to_expiry: Option<u32>,
}

/// One exit rule. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExitTrigger {
    kind: ExitTriggerKind,
    threshold: f64,
    /// Share of the position to sell when this rule is the primary trigger.
    exit_fraction: f64,
    /// Higher wins when several rules fire.
    priority: u8,
    enabled: bool,
}

impl ExitTrigger {
    pub fn new(kind: ExitTriggerKind, threshold: f64, exit_fraction: f64, priority: u8) -> HedgeResult<Self> {
        if !threshold.is_finite() {
            return Err(HedgeError::InvalidInput(format!("{kind} threshold must be finite")));
        }
        if !(0.0..=1.0).contains(&exit_fraction) {
            return Err(HedgeError::InvalidInput(format!(
                "{kind} exit fraction must be within [0, 1], got {exit_fraction}"
            )));
        }
        Ok(Self::preset(kind, threshold, exit_fraction, priority))
    }

    const fn preset(kind: ExitTriggerKind, threshold: f64, exit_fraction: f64, priority: u8) -> Self {
        Self { kind, threshold, exit_fraction, priority, enabled: true }
    }

    /// Same rule, switched off.
    pub fn disabled(self) -> Self {
        Self { enabled: false, ..self }
    }

    #[inline]
    pub fn kind(&self) -> ExitTriggerKind {
        self.kind
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[inline]
    pub fn exit_fraction(&self) -> f64 {
        self.exit_fraction
    }

    #[inline]
    pub fn priority(&self) -> u8 {
        self.priority
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabled rules never fire.
    pub fn fires(&self, ctx: &TriggerContext<'_>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.kind {
            ExitTriggerKind::VixSpike => ctx.conditions.vix >= self.threshold,
            ExitTriggerKind::PortfolioProtection => ctx.conditions.portfolio_return.abs() >= self.threshold,
            ExitTriggerKind::ProfitTarget => ctx.pnl_multiple >= self.threshold,
            ExitTriggerKind::TimeDecay => ctx
                .days_to_expiry
                .is_some_and(|dte| f64::from(dte) <= self.threshold),
            ExitTriggerKind::CorrelationBreakdown => ctx.conditions.average_correlation >= self.threshold,
            ExitTriggerKind::LiquidityStress => ctx.stress.liquidity_stress >= self.threshold,
        }
    }
}

// ── Preset ladders ──

/// Exit manager defaults: three VIX rungs, four profit rungs, three
/// drawdown rungs.
pub fn default_ladder() -> Vec<ExitTrigger> {
    use ExitTriggerKind::*;
    vec![
        ExitTrigger::preset(VixSpike, 30.0, 0.25, 2),
        ExitTrigger::preset(VixSpike, 45.0, 0.50, 3),
        ExitTrigger::preset(VixSpike, 60.0, 0.75, 4),
        ExitTrigger::preset(ProfitTarget, 2.0, 0.25, 1),
        ExitTrigger::preset(ProfitTarget, 5.0, 0.40, 2),
        ExitTrigger::preset(ProfitTarget, 10.0, 0.60, 3),
        ExitTrigger::preset(ProfitTarget, 20.0, 0.80, 4),
        ExitTrigger::preset(PortfolioProtection, 0.05, 0.30, 2),
        ExitTrigger::preset(PortfolioProtection, 0.10, 0.60, 3),
        ExitTrigger::preset(PortfolioProtection, 0.15, 0.90, 4),
    ]
}

/// Rungs attached to a strategy when `kind` is selected for it.
pub fn strategy_ladder(kind: ExitTriggerKind) -> Vec<ExitTrigger> {
    use ExitTriggerKind::*;
    match kind {
        VixSpike => vec![
            ExitTrigger::preset(VixSpike, 30.0, 0.25, 2),
            ExitTrigger::preset(VixSpike, 45.0, 0.50, 3),
            ExitTrigger::preset(VixSpike, 60.0, 0.75, 4),
        ],
        ProfitTarget => vec![
            ExitTrigger::preset(ProfitTarget, 2.0, 0.25, 1),
            ExitTrigger::preset(ProfitTarget, 5.0, 0.50, 2),
            ExitTrigger::preset(ProfitTarget, 10.0, 0.75, 3),
        ],
        PortfolioProtection => vec![
            ExitTrigger::preset(PortfolioProtection, 0.05, 0.30, 2),
            ExitTrigger::preset(PortfolioProtection, 0.10, 0.60, 3),
        ],
        CorrelationBreakdown => vec![ExitTrigger::preset(CorrelationBreakdown, 0.8, 0.50, 3)],
        LiquidityStress => vec![ExitTrigger::preset(LiquidityStress, 0.6, 0.40, 2)],
        TimeDecay => vec![ExitTrigger::preset(TimeDecay, 21.0, 0.50, 1)],
    }
}

/// Concatenated ladders for every selected kind.
pub fn strategy_triggers(kinds: &[ExitTriggerKind]) -> Vec<ExitTrigger> {
    kinds.iter().flat_map(|&k| strategy_ladder(k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::stress::{monitor_stress, StressWeights};

    fn fires(trigger: &ExitTrigger, conditions: &MarketConditions, pnl: f64, dte: Option<u32>) -> bool {
        let stress = monitor_stress(conditions, &StressWeights::default());
        trigger.fires(&TriggerContext { conditions, stress: &stress, pnl_multiple: pnl, days_to_expiry: dte })
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!("VIX_SPIKE".parse::<ExitTriggerKind>().unwrap(), ExitTriggerKind::VixSpike);
        assert_eq!("drawdown".parse::<ExitTriggerKind>().unwrap(), ExitTriggerKind::PortfolioProtection);
        let kinds = parse_trigger_kinds("vix_spike, profit_target,,portfolio_protection").unwrap();
        assert_eq!(kinds.len(), 3);
        assert!(matches!(
            parse_trigger_kinds("vix_spike,moon_phase"),
            Err(HedgeError::UnknownVariant { kind: "exit trigger", .. })
        ));
    }

    #[test]
    fn test_trigger_validation() {
        assert!(ExitTrigger::new(ExitTriggerKind::VixSpike, 30.0, 0.25, 2).is_ok());
        assert!(ExitTrigger::new(ExitTriggerKind::VixSpike, 30.0, 1.5, 2).is_err());
        assert!(ExitTrigger::new(ExitTriggerKind::VixSpike, f64::NAN, 0.5, 2).is_err());
    }

    #[test]
    fn test_threshold_semantics() {
        let calm = MarketConditions::new(20.0, 420.0, 0.045);
        let stressed = MarketConditions::new(45.0, 420.0, 0.045)
            .with_correlation(0.85)
            .with_portfolio_return(-0.08)
            .with_liquidity(0.3, 2.5);

        let vix = ExitTrigger::new(ExitTriggerKind::VixSpike, 45.0, 0.5, 3).unwrap();
        assert!(fires(&vix, &stressed, 1.0, None));
        assert!(!fires(&vix, &calm, 1.0, None));

        let dd = ExitTrigger::new(ExitTriggerKind::PortfolioProtection, 0.05, 0.3, 2).unwrap();
        assert!(fires(&dd, &stressed, 1.0, None));

        let corr = ExitTrigger::new(ExitTriggerKind::CorrelationBreakdown, 0.8, 0.5, 3).unwrap();
        assert!(fires(&corr, &stressed, 1.0, None));
        assert!(!fires(&corr, &calm, 1.0, None));

        let liq = ExitTrigger::new(ExitTriggerKind::LiquidityStress, 0.6, 0.4, 2).unwrap();
        assert!(fires(&liq, &stressed, 1.0, None));
        assert!(!fires(&liq, &calm, 1.0, None));

        let profit = ExitTrigger::new(ExitTriggerKind::ProfitTarget, 5.0, 0.5, 2).unwrap();
        assert!(fires(&profit, &calm, 5.0, None));
        assert!(!fires(&profit, &calm, 4.99, None));
    }

    #[test]
    fn test_time_decay_needs_expiry() {
        let calm = MarketConditions::new(20.0, 420.0, 0.045);
        let t = ExitTrigger::new(ExitTriggerKind::TimeDecay, 21.0, 0.5, 1).unwrap();
        assert!(fires(&t, &calm, 1.0, Some(14)));
        assert!(!fires(&t, &calm, 1.0, Some(60)));
        assert!(!fires(&t, &calm, 1.0, None));
    }

    #[test]
    fn test_disabled_never_fires() {
        let crash = MarketConditions::new(80.0, 300.0, 0.01);
        let t = ExitTrigger::new(ExitTriggerKind::VixSpike, 30.0, 0.25, 2).unwrap().disabled();
        assert!(!fires(&t, &crash, 10.0, None));
    }

    #[test]
    fn test_ladders() {
        assert_eq!(default_ladder().len(), 10);
        let t = strategy_triggers(&[ExitTriggerKind::VixSpike, ExitTriggerKind::ProfitTarget]);
        assert_eq!(t.len(), 6);
        assert!(t.iter().all(|x| x.is_enabled() && x.exit_fraction() <= 1.0));
    }
}
