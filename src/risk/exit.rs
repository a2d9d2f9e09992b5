use crate::risk::stress::{monitor_stress, StressIndicators, StressWeights};
use crate::risk::triggers::{default_ladder, ExitTrigger, ExitTriggerKind, TriggerContext};
use crate::risk::unit_interval;
use crate::state::MarketConditions;
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use tracing::{debug, info};

/// Days to expiry assumed by the hold model when a position does not say.
const DEFAULT_DAYS_TO_EXPIRY: u32 = 45;

/// Hold-to-expiry outcome multiples: further stress, mean reversion, flat.
const FURTHER_STRESS_PNL: f64 = 3.0;
const MEAN_REVERSION_PNL: f64 = 0.5;
const UNCHANGED_PNL: f64 = 1.0;

/// Exit manager tuning.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExitConfig {
    /// Largest share of a position sold in one decision.
    pub max_single_exit: f64,
    /// Share of the position that must survive any single exit.
    pub min_position_remaining: f64,
    /// Base fraction boost when more than one rule fires.
    pub multi_trigger_boost: f64,
    /// fraction *= 1 + urgency_scale * urgency
    pub urgency_scale: f64,
    pub transaction_cost_bps: f64,
    pub stress_weights: StressWeights,
    /// Tradeoff recommends exiting above this urgency.
    pub exit_urgency_threshold: f64,
    /// Report flags immediate action above this urgency.
    pub immediate_action_urgency: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            max_single_exit: 0.75,
            min_position_remaining: 0.20,
            multi_trigger_boost: 1.2,
            urgency_scale: 0.5,
            transaction_cost_bps: 5.0,
            stress_weights: StressWeights::default(),
            exit_urgency_threshold: 0.6,
            immediate_action_urgency: 0.7,
        }
    }
}

impl ExitConfig {
    /// Upper bound on any recommended exit fraction.
    #[inline]
    pub fn exit_cap(&self) -> f64 {
        unit_interval(self.max_single_exit.min(1.0 - self.min_position_remaining))
    }
}

/// A held hedge position as seen by the exit manager.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PositionState {
    pub id: String,
    /// Current market value.
    pub value: f64,
    /// Current value / cost.
    pub pnl_multiple: f64,
    pub days_to_expiry: Option<u32>,
}

impl PositionState {
    pub fn new(id: impl Into<String>, value: f64, pnl_multiple: f64, days_to_expiry: Option<u32>) -> Self {
        Self { id: id.into(), value, pnl_multiple, days_to_expiry }
    }
}

/// One exit decision. `trigger` is None when nothing fired, in which case
/// fraction and urgency are both zero.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExitOpportunity {
    pub timestamp: DateTime<Utc>,
    pub trigger: Option<ExitTriggerKind>,
    pub triggers_fired: usize,
    pub market_conditions: MarketConditions,
    pub stress: StressIndicators,
    pub position_pnl_multiple: f64,
    /// Fraction of the position to sell, 0..=exit_cap.
    pub recommended_exit_percentage: f64,
    /// 0..1
    pub urgency_score: f64,
    pub rationale: String,
}

impl ExitOpportunity {
    #[inline]
    pub fn should_exit(&self) -> bool {
        self.recommended_exit_percentage > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ExitScenario {
    pub recommended_exit_percentage: f64,
    /// (pnl - 1) * fraction, in units of position cost.
    pub immediate_realized_pnl: f64,
    pub transaction_cost: f64,
    pub urgency_score: f64,
    pub trigger: Option<ExitTriggerKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct HoldScenario {
    pub days_remaining: u32,
    pub prob_further_stress: f64,
    pub prob_mean_reversion: f64,
    pub prob_unchanged: f64,
    pub further_stress_pnl: f64,
    pub mean_reversion_pnl: f64,
    pub unchanged_pnl: f64,
    pub time_decay_risk: f64,
    pub expected_hold_pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Exit,
    Hold,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TradeRecommendation {
    pub action: TradeAction,
    pub confidence: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TradeoffAnalysis {
    pub position: PositionState,
    pub exit_scenario: ExitScenario,
    pub hold_scenario: HoldScenario,
    pub recommendation: TradeRecommendation,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PositionReport {
    pub position_id: String,
    pub current_value: f64,
    pub pnl_multiple: f64,
    pub days_to_expiry: Option<u32>,
    pub exit_opportunity: ExitOpportunity,
    pub tradeoff: TradeoffAnalysis,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OverallRecommendations {
    pub immediate_action_required: bool,
    pub positions_with_exit_signals: usize,
    pub aggregate_stress_score: f64,
    pub recommended_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PortfolioRiskAssessment {
    pub total_position_value: f64,
    pub total_unrealized_pnl: f64,
    /// 0..1
    pub portfolio_risk_score: f64,
    pub key_risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExitReport {
    pub timestamp: DateTime<Utc>,
    pub market_conditions: MarketConditions,
    pub position_analysis: Vec<PositionReport>,
    pub overall_recommendations: OverallRecommendations,
    pub risk_assessment: PortfolioRiskAssessment,
}

/// Decides whether and how much of a hedge to liquidate.
///
/// Per decision:
///   1. Score market stress
///   2. Evaluate every enabled trigger
///   3. Nothing fired -> hold (fraction 0, urgency 0)
///   4. Primary = highest-priority firing trigger
///   5. urgency = mean(overall stress, min(1, pnl/10), priority/5, momentum)
///   6. fraction = base * boost(if >1 fired) * (1 + 0.5 urgency), capped
///
/// Stateless between decisions apart from its configuration.
#[derive(Debug, Clone)]
pub struct ExitStrategyManager {
    config: ExitConfig,
    /// Sorted by descending priority.
    triggers: Vec<ExitTrigger>,
}

impl Default for ExitStrategyManager {
    fn default() -> Self {
        Self::new(ExitConfig::default())
    }
}

impl ExitStrategyManager {
    pub fn new(config: ExitConfig) -> Self {
        Self::with_triggers(config, default_ladder())
    }

    pub fn with_triggers(config: ExitConfig, triggers: Vec<ExitTrigger>) -> Self {
        let mut manager = Self { config, triggers: Vec::new() };
        manager.set_triggers(triggers);
        manager
    }

    /// Replace the active rule set.
    pub fn set_triggers(&mut self, mut triggers: Vec<ExitTrigger>) {
        // Stable: equal priorities keep their configured order
        triggers.sort_by(|a, b| b.priority().cmp(&a.priority()));
        info!(count = triggers.len(), "exit triggers configured");
        self.triggers = triggers;
    }

    pub fn triggers(&self) -> &[ExitTrigger] {
        &self.triggers
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    #[inline]
    pub fn monitor_stress(&self, conditions: &MarketConditions) -> StressIndicators {
        monitor_stress(conditions, &self.config.stress_weights)
    }

    /// Exit decision for one position at one point in time.
    pub fn evaluate(
        &self,
        conditions: &MarketConditions,
        pnl_multiple: f64,
        days_to_expiry: Option<u32>,
    ) -> ExitOpportunity {
        let stress = self.monitor_stress(conditions);
        let ctx = TriggerContext { conditions, stress: &stress, pnl_multiple, days_to_expiry };

        let fired: SmallVec<[&ExitTrigger; 8]> = self.triggers.iter().filter(|t| t.fires(&ctx)).collect();

        // Triggers are priority-sorted, so the first one fired is primary
        let Some(&primary) = fired.first() else {
            debug!(vix = conditions.vix, pnl_multiple, "no exit trigger fired");
            return ExitOpportunity {
                timestamp: Utc::now(),
                trigger: None,
                triggers_fired: 0,
                market_conditions: *conditions,
                stress,
                position_pnl_multiple: pnl_multiple,
                recommended_exit_percentage: 0.0,
                urgency_score: 0.0,
                rationale: "No exit triggers activated".to_string(),
            };
        };

        let profit = if pnl_multiple.is_finite() { unit_interval(pnl_multiple / 10.0) } else { 0.0 };
        let priority = unit_interval(f64::from(primary.priority()) / 5.0);
        let momentum = unit_interval(conditions.vix_daily_change / 20.0);
        let urgency = unit_interval((stress.overall_stress + profit + priority + momentum) / 4.0);

        let mut fraction = primary.exit_fraction();
        if fired.len() > 1 {
            fraction *= self.config.multi_trigger_boost;
        }
        fraction *= 1.0 + urgency * self.config.urgency_scale;
        let fraction = unit_interval(fraction).min(self.config.exit_cap());

        let mut rationale = format!("{} triggered", primary.kind());
        if fired.len() > 1 {
            rationale.push_str(&format!(", + {} other triggers", fired.len() - 1));
        }
        rationale.push_str(&format!(", Urgency: {urgency:.2}"));

        debug!(
            trigger = %primary.kind(),
            fired = fired.len(),
            urgency,
            fraction,
            "exit trigger fired"
        );

        ExitOpportunity {
            timestamp: Utc::now(),
            trigger: Some(primary.kind()),
            triggers_fired: fired.len(),
            market_conditions: *conditions,
            stress,
            position_pnl_multiple: pnl_multiple,
            recommended_exit_percentage: fraction,
            urgency_score: urgency,
            rationale,
        }
    }

    /// Exit now versus hold to expiry.
    pub fn tradeoff(&self, conditions: &MarketConditions, position: &PositionState) -> TradeoffAnalysis {
        let opportunity = self.evaluate(conditions, position.pnl_multiple, position.days_to_expiry);
        let fraction = opportunity.recommended_exit_percentage;

        let exit_scenario = ExitScenario {
            recommended_exit_percentage: fraction,
            immediate_realized_pnl: (position.pnl_multiple - 1.0) * fraction,
            transaction_cost: position.value * self.config.transaction_cost_bps / 10_000.0 * fraction,
            urgency_score: opportunity.urgency_score,
            trigger: opportunity.trigger,
        };

        let action = if opportunity.urgency_score > self.config.exit_urgency_threshold {
            TradeAction::Exit
        } else {
            TradeAction::Hold
        };

        TradeoffAnalysis {
            position: position.clone(),
            exit_scenario,
            hold_scenario: hold_scenario(conditions.vix, position.days_to_expiry.unwrap_or(DEFAULT_DAYS_TO_EXPIRY)),
            recommendation: TradeRecommendation {
                action,
                confidence: opportunity.urgency_score,
                rationale: opportunity.rationale,
            },
        }
    }

    /// Per-position decisions rolled up into portfolio recommendations.
    pub fn report(&self, positions: &[PositionState], conditions: &MarketConditions) -> ExitReport {
        let stress = self.monitor_stress(conditions);

        let mut total_position_value = 0.0;
        let mut total_unrealized_pnl = 0.0;
        let mut signal_urgencies: Vec<f64> = Vec::new();
        let mut position_analysis = Vec::with_capacity(positions.len());

        for position in positions {
            total_position_value += position.value;
            total_unrealized_pnl += position.value * (position.pnl_multiple - 1.0);

            let exit_opportunity = self.evaluate(conditions, position.pnl_multiple, position.days_to_expiry);
            if exit_opportunity.should_exit() {
                signal_urgencies.push(exit_opportunity.urgency_score);
            }

            position_analysis.push(PositionReport {
                position_id: position.id.clone(),
                current_value: position.value,
                pnl_multiple: position.pnl_multiple,
                days_to_expiry: position.days_to_expiry,
                tradeoff: self.tradeoff(conditions, position),
                exit_opportunity,
            });
        }

        let immediate = self.config.immediate_action_urgency;
        let high = signal_urgencies.iter().filter(|&&u| u > immediate).count();
        let medium = signal_urgencies.iter().filter(|&&u| (0.4..=immediate).contains(&u)).count();

        let mut recommended_actions = Vec::new();
        if high > 0 {
            recommended_actions.push(format!("IMMEDIATE: Execute {high} high-urgency exits"));
        }
        if medium > 0 {
            recommended_actions.push(format!("Within 4 hours: Consider {medium} medium-urgency exits"));
        }
        if stress.overall_stress > 0.6 {
            recommended_actions.push("Monitor market conditions closely - elevated stress detected".to_string());
        }
        if stress.vix_stress > 0.8 {
            recommended_actions.push("Consider scaling up exit percentages due to extreme VIX levels".to_string());
        }

        let report = ExitReport {
            timestamp: Utc::now(),
            market_conditions: *conditions,
            overall_recommendations: OverallRecommendations {
                immediate_action_required: high > 0,
                positions_with_exit_signals: signal_urgencies.len(),
                aggregate_stress_score: stress.overall_stress,
                recommended_actions,
            },
            risk_assessment: PortfolioRiskAssessment {
                total_position_value,
                total_unrealized_pnl,
                portfolio_risk_score: portfolio_risk_score(positions, conditions),
                key_risks: key_risks(positions, conditions),
            },
            position_analysis,
        };

        info!(
            positions = positions.len(),
            exit_signals = report.overall_recommendations.positions_with_exit_signals,
            stress = stress.overall_stress,
            "exit strategy report generated"
        );
        report
    }
}

/// Three-branch hold model. Probabilities depend on time left and whether
/// VIX is above 30.
pub fn hold_scenario(vix: f64, days_to_expiry: u32) -> HoldScenario {
    let elevated = vix > 30.0;
    let (prob_further_stress, prob_mean_reversion): (f64, f64) = match (days_to_expiry > 30, elevated) {
        (true, true) => (0.3, 0.6),
        (true, false) => (0.1, 0.3),
        (false, true) => (0.2, 0.8),
        (false, false) => (0.05, 0.2),
    };
    let prob_unchanged = (1.0 - prob_further_stress - prob_mean_reversion).max(0.0);

    HoldScenario {
        days_remaining: days_to_expiry,
        prob_further_stress,
        prob_mean_reversion,
        prob_unchanged,
        further_stress_pnl: FURTHER_STRESS_PNL,
        mean_reversion_pnl: MEAN_REVERSION_PNL,
        unchanged_pnl: UNCHANGED_PNL,
        time_decay_risk: (f64::from(days_to_expiry) / 60.0).min(0.5),
        expected_hold_pnl: prob_further_stress * FURTHER_STRESS_PNL
            + prob_mean_reversion * MEAN_REVERSION_PNL
            + prob_unchanged * UNCHANGED_PNL,
    }
}

/// Averages over the book, or neutral defaults for an empty one.
fn book_averages(positions: &[PositionState]) -> (f64, f64) {
    if positions.is_empty() {
        return (1.0, f64::from(DEFAULT_DAYS_TO_EXPIRY));
    }
    let n = positions.len() as f64;
    let avg_pnl = positions.iter().map(|p| p.pnl_multiple).sum::<f64>() / n;
    let avg_dte = positions
        .iter()
        .map(|p| f64::from(p.days_to_expiry.unwrap_or(DEFAULT_DAYS_TO_EXPIRY)))
        .sum::<f64>()
        / n;
    (avg_pnl, avg_dte)
}

/// Mean of profit give-back risk, time-decay risk and volatility level.
fn portfolio_risk_score(positions: &[PositionState], conditions: &MarketConditions) -> f64 {
    let (avg_pnl, avg_dte) = book_averages(positions);
    let pnl_risk = ((avg_pnl - 1.0) / 10.0).min(1.0);
    let time_risk = (1.0 - avg_dte / 60.0).max(0.0);
    let vol_risk = (conditions.vix / 50.0).min(1.0);
    unit_interval((pnl_risk + time_risk + vol_risk) / 3.0)
}

fn key_risks(positions: &[PositionState], conditions: &MarketConditions) -> Vec<String> {
    let (avg_pnl, _) = book_averages(positions);
    let min_dte = positions
        .iter()
        .map(|p| p.days_to_expiry.unwrap_or(DEFAULT_DAYS_TO_EXPIRY))
        .min()
        .unwrap_or(DEFAULT_DAYS_TO_EXPIRY);

    let mut risks = Vec::new();
    if avg_pnl > 5.0 {
        risks.push("Profit-taking risk: Large unrealized gains vulnerable to reversal".to_string());
    }
    if min_dte < 21 {
        risks.push("Time decay risk: Positions approaching expiration".to_string());
    }
    if conditions.vix > 40.0 {
        risks.push("Volatility mean reversion risk: Extreme VIX levels may normalize".to_string());
    }
    if conditions.average_correlation > 0.8 {
        risks.push("Correlation risk: High correlations may indicate systemic stress".to_string());
    }
    risks
}
