use crate::errors::{HedgeError, HedgeResult};
use crate::models::jump_diffusion::JumpDiffusionPricer;
use crate::models::volatility::TermStructure;
use crate::models::{Greeks, OptionInputs, PricingModel};
use crate::risk::triggers::ExitTrigger;
use crate::risk::RiskLevel;
use crate::state::{RegimeTable, VolatilityRegime};

/// Calendar days per expiry month used for term-structure lookups.
const DAYS_PER_MONTH: u32 = 30;

/// Greeks/cost multipliers per regime for a freshly configured strategy.
pub const DEFAULT_REGIME_MULTIPLIERS: RegimeTable<f64> = RegimeTable::new(1.0, 1.2, 1.5, 2.0);

/// A rolling OTM put programme. Read-only to the analysis; results live in
/// `StrategyAnalysis`, keyed by `id()`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HedgingStrategy {
    strategy_id: String,
    name: String,
    expiration_months: u32,
    /// Strike distance below spot, e.g. 0.15 for 15% OTM.
    otm_percentage: f64,
    /// Roll this many days before expiry.
    rolling_threshold_days: u32,
    regime_multipliers: RegimeTable<f64>,
    exit_triggers: Vec<ExitTrigger>,
}

impl HedgingStrategy {
    pub fn new(expiration_months: u32, otm_percentage: f64, rolling_threshold_days: u32) -> HedgeResult<Self> {
        if expiration_months == 0 {
            return Err(HedgeError::InvalidInput("expiration must be at least one month".into()));
        }
        if !(0.0..1.0).contains(&otm_percentage) {
            return Err(HedgeError::InvalidInput(format!(
                "OTM percentage must be within [0, 1), got {otm_percentage}"
            )));
        }
        let otm_pct = otm_percentage * 100.0;
        Ok(Self {
            strategy_id: format!("{expiration_months}M_{otm_pct:.0}%_OTM"),
            name: format!("{expiration_months}-Month {otm_pct:.0}% OTM Puts"),
            expiration_months,
            otm_percentage,
            rolling_threshold_days,
            regime_multipliers: DEFAULT_REGIME_MULTIPLIERS,
            exit_triggers: Vec::new(),
        })
    }

    pub fn with_regime_multipliers(mut self, multipliers: RegimeTable<f64>) -> Self {
        self.regime_multipliers = multipliers;
        self
    }

    pub fn with_exit_triggers(mut self, triggers: Vec<ExitTrigger>) -> Self {
        self.exit_triggers = triggers;
        self
    }

    /// Stable comparison key, e.g. "2M_15%_OTM".
    #[inline]
    pub fn id(&self) -> &str {
        &self.strategy_id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn expiration_months(&self) -> u32 {
        self.expiration_months
    }

    #[inline]
    pub fn otm_percentage(&self) -> f64 {
        self.otm_percentage
    }

    #[inline]
    pub fn rolling_threshold_days(&self) -> u32 {
        self.rolling_threshold_days
    }

    pub fn exit_triggers(&self) -> &[ExitTrigger] {
        &self.exit_triggers
    }

    #[inline]
    pub fn expiry_days(&self) -> u32 {
        self.expiration_months * DAYS_PER_MONTH
    }

    #[inline]
    pub fn ttl_years(&self) -> f64 {
        f64::from(self.expiration_months) / 12.0
    }

    #[inline]
    pub fn rolls_per_year(&self) -> f64 {
        12.0 / f64::from(self.expiration_months)
    }

    #[inline]
    pub fn strike(&self, spot: f64) -> f64 {
        spot * (1.0 - self.otm_percentage)
    }

    /// Three months or less.
    #[inline]
    pub fn is_short_term(&self) -> bool {
        self.expiration_months <= 3
    }

    /// Six months or more.
    #[inline]
    pub fn is_long_term(&self) -> bool {
        self.expiration_months >= 6
    }

    #[inline]
    pub fn regime_multiplier(&self, regime: VolatilityRegime) -> f64 {
        *self.regime_multipliers.get(regime)
    }

    /// Put contract this strategy buys at `spot`.
    pub fn put_inputs(&self, spot: f64, rate: f64) -> OptionInputs {
        OptionInputs::put(spot, self.strike(spot), self.ttl_years(), rate)
    }

    /// Jump-diffusion premium per unit of underlying.
    pub fn premium(&self, spot: f64, rate: f64, pricer: &JumpDiffusionPricer) -> f64 {
        pricer.price(&self.put_inputs(spot, rate))
    }

    /// Pricer Greeks with the exposure Greeks scaled by this strategy's
    /// multiplier for `regime`.
    pub fn regime_adjusted_greeks(
        &self,
        spot: f64,
        rate: f64,
        regime: VolatilityRegime,
        pricer: &JumpDiffusionPricer,
    ) -> Greeks {
        pricer.greeks(&self.put_inputs(spot, rate)).scaled(self.regime_multiplier(regime))
    }

    /// Cost impact of the term structure at this strategy's expiry,
    /// interpolated between reference expiries.
    pub fn term_structure_impact(&self, term_structure: &TermStructure) -> RegimeImpact {
        let volatility_adjustment = term_structure.adjustment_at(self.expiry_days());
        let cost_impact_multiplier = 1.0 + volatility_adjustment;
        RegimeImpact {
            volatility_adjustment,
            cost_impact_multiplier,
            relative_efficiency: if cost_impact_multiplier > 0.0 { 1.0 / cost_impact_multiplier } else { 0.0 },
            term_structure_penalty: volatility_adjustment.max(0.0),
        }
    }

    pub fn risk_assessment(&self, regime: VolatilityRegime) -> StrategyRiskAssessment {
        let time_decay_risk = if self.is_short_term() {
            RiskNote {
                level: RiskLevel::High,
                description: "Short expiration increases time decay sensitivity",
                mitigation: "Consider more frequent profit-taking",
            }
        } else {
            RiskNote {
                level: RiskLevel::Medium,
                description: "Longer expiration provides time decay buffer",
                mitigation: "Standard monitoring sufficient",
            }
        };

        let volatility_risk = match (regime.is_stressed(), self.is_short_term()) {
            (true, true) => RiskNote {
                level: RiskLevel::High,
                description: "Short-term options expensive in high volatility regime",
                mitigation: "Consider extending expiration or reducing allocation",
            },
            (true, false) => RiskNote {
                level: RiskLevel::Medium,
                description: "Longer-term options less affected by regime",
                mitigation: "Monitor for regime transitions",
            },
            (false, _) => RiskNote {
                level: RiskLevel::Low,
                description: "Favorable volatility regime for option purchases",
                mitigation: "Consider increasing allocation in low volatility periods",
            },
        };

        StrategyRiskAssessment { time_decay_risk, volatility_risk }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RegimeImpact {
    pub volatility_adjustment: f64,
    pub cost_impact_multiplier: f64,
    pub relative_efficiency: f64,
    pub term_structure_penalty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RiskNote {
    pub level: RiskLevel,
    pub description: &'static str,
    pub mitigation: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct StrategyRiskAssessment {
    pub time_decay_risk: RiskNote,
    pub volatility_risk: RiskNote,
}
