use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::analysis::ranking::{rank_strategies, RelativeComparisons};
use crate::analysis::recommend::{recommend, Recommendations, RegimeOutlook};
use crate::analysis::strategy::{HedgingStrategy, RegimeImpact, StrategyRiskAssessment};
use crate::errors::{HedgeError, HedgeResult};
use crate::models::jump_diffusion::JumpDiffusionPricer;
use crate::models::volatility::{TermStructure, VolatilityRegimeAnalyzer};
use crate::models::{Greeks, PricingModel};
use crate::risk::exit::{ExitConfig, ExitOpportunity, ExitStrategyManager};
use crate::risk::triggers::ExitTrigger;
use crate::state::{HistoricalObservation, MarketConditions, VolatilityRegime};

/// Market decline used to value a put programme when no history is given.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProtectionScenario {
    pub name: String,
    /// Fractional index decline, e.g. 0.34 for -34%.
    pub market_decline: f64,
}

impl ProtectionScenario {
    pub fn new(name: impl Into<String>, market_decline: f64) -> Self {
        Self { name: name.into(), market_decline }
    }
}

fn default_protection_scenarios() -> Vec<ProtectionScenario> {
    vec![
        ProtectionScenario::new("Black Monday 1987", 0.226),
        ProtectionScenario::new("Dot-com Crash", 0.49),
        ProtectionScenario::new("2008 Financial Crisis", 0.57),
        ProtectionScenario::new("COVID-19 Crash", 0.34),
        ProtectionScenario::new("Flash Crash", 0.09),
        ProtectionScenario::new("Market Correction", 0.10),
        ProtectionScenario::new("Severe Correction", 0.20),
    ]
}

/// Engine-level knobs. Defaults reproduce a full-notional hedge.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ComparisonConfig {
    /// Fraction of portfolio notional covered by puts.
    pub hedge_ratio: f64,
    /// Units of underlying per contract.
    pub contract_multiplier: f64,
    /// Share of annual cost assumed recovered by early exits when no
    /// history is supplied.
    pub estimated_exit_offset: f64,
    pub protection_scenarios: Vec<ProtectionScenario>,
    /// A history day is a protection event when VIX is above this...
    pub protection_event_vix: f64,
    /// ...and the index return is below this.
    pub protection_event_return: f64,
    pub stress_multiplier_cap: f64,
    /// Correlation assumed on protection-event days.
    pub event_correlation: f64,
    pub trading_days_per_year: f64,
    /// Allocation the regime advice scales from.
    pub base_allocation: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            hedge_ratio: 1.0,
            contract_multiplier: 100.0,
            estimated_exit_offset: 0.2,
            protection_scenarios: default_protection_scenarios(),
            protection_event_vix: 30.0,
            protection_event_return: -0.05,
            stress_multiplier_cap: 20.0,
            event_correlation: 0.8,
            trading_days_per_year: 252.0,
            base_allocation: 0.05,
        }
    }
}

// ── Per-strategy results ──

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PricingAnalysis {
    pub strike: f64,
    pub jump_diffusion_price: f64,
    pub black_scholes_price: f64,
    /// (JD - BS) / BS, zero when the baseline is worthless.
    pub jump_risk_premium: f64,
    pub contracts_needed: f64,
    pub cost_per_roll: f64,
    pub annual_cost: f64,
    /// Annual cost as a fraction of portfolio value.
    pub cost_as_percentage: f64,
    /// Annual cost times the term-structure cost impact.
    pub regime_adjusted_annual_cost: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExitStrategyAnalysis {
    /// Decision for a freshly opened position.
    pub current_exit_recommendation: ExitOpportunity,
    pub configured_triggers: Vec<ExitTrigger>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceBasis {
    /// Replayed over caller-supplied history.
    Historical,
    /// Stress-scenario payoffs against premium.
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PerformanceMetrics {
    pub basis: PerformanceBasis,
    pub annual_cost: f64,
    /// Protection value per unit of annual cost.
    pub protection_ratio: f64,
    /// Annual cost net of early-exit recoveries.
    pub net_annual_cost: f64,
    pub protection_events: Option<usize>,
    pub realized_profit: Option<f64>,
}

/// Everything the engine computes for one strategy.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StrategyAnalysis {
    pub strategy_details: HedgingStrategy,
    pub pricing_analysis: PricingAnalysis,
    pub greeks_analysis: Greeks,
    pub regime_impact_analysis: RegimeImpact,
    pub exit_strategy_analysis: ExitStrategyAnalysis,
    pub performance_metrics: PerformanceMetrics,
    pub risk_assessment: StrategyRiskAssessment,
}

impl StrategyAnalysis {
    #[inline]
    pub fn id(&self) -> &str {
        self.strategy_details.id()
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.strategy_details.name()
    }

    #[inline]
    pub fn cost_as_percentage(&self) -> f64 {
        self.pricing_analysis.cost_as_percentage
    }

    #[inline]
    pub fn protection_ratio(&self) -> f64 {
        self.performance_metrics.protection_ratio
    }

    #[inline]
    pub fn volatility_adjustment(&self) -> f64 {
        self.regime_impact_analysis.volatility_adjustment
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ComparisonResult {
    pub analysis_timestamp: DateTime<Utc>,
    pub portfolio_value: f64,
    pub current_market_conditions: MarketConditions,
    pub current_volatility_regime: VolatilityRegime,
    pub term_structure: TermStructure,
    pub strategy_analysis: BTreeMap<String, StrategyAnalysis>,
    pub relative_comparisons: RelativeComparisons,
    pub recommendations: Recommendations,
}

// ── Engine ──

/// Prices, ranks and recommends tail-hedging strategies.
///
/// Owns its collaborators; the only mutable state is the regime
/// analyzer's classification history.
#[derive(Debug, Clone, Default)]
pub struct HedgeComparisonEngine {
    config: ComparisonConfig,
    pricer: JumpDiffusionPricer,
    analyzer: VolatilityRegimeAnalyzer,
    exit_manager: ExitStrategyManager,
}

impl HedgeComparisonEngine {
    pub fn new(
        config: ComparisonConfig,
        pricer: JumpDiffusionPricer,
        analyzer: VolatilityRegimeAnalyzer,
        exit_config: ExitConfig,
    ) -> Self {
        Self { config, pricer, analyzer, exit_manager: ExitStrategyManager::new(exit_config) }
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    pub fn pricer(&self) -> &JumpDiffusionPricer {
        &self.pricer
    }

    pub fn analyzer(&self) -> &VolatilityRegimeAnalyzer {
        &self.analyzer
    }

    pub fn exit_manager(&self) -> &ExitStrategyManager {
        &self.exit_manager
    }

    /// Full comparison of `strategies` for a portfolio of `portfolio_value`.
    ///
    /// The regime is classified once. Fewer than two strategies yields an
    /// `Insufficient` comparison rather than an error; errors are reserved
    /// for unusable inputs (non-positive portfolio or spot, duplicate ids).
    pub fn compare_strategies(
        &mut self,
        strategies: &[HedgingStrategy],
        portfolio_value: f64,
        conditions: &MarketConditions,
        history: Option<&[HistoricalObservation]>,
    ) -> HedgeResult<ComparisonResult> {
        if !(portfolio_value > 0.0) || !portfolio_value.is_finite() {
            return Err(HedgeError::InvalidInput(format!("portfolio value must be positive, got {portfolio_value}")));
        }
        if !(conditions.underlying_price > 0.0) || !conditions.underlying_price.is_finite() {
            return Err(HedgeError::InvalidInput(format!(
                "underlying price must be positive, got {}",
                conditions.underlying_price
            )));
        }
        let mut seen = HashSet::with_capacity(strategies.len());
        for s in strategies {
            if !seen.insert(s.id()) {
                return Err(HedgeError::InvalidInput(format!("duplicate strategy {}", s.id())));
            }
        }

        let regime = self.analyzer.classify(conditions.vix);
        let term_structure = self.analyzer.term_structure_for(regime);
        info!(
            strategies = strategies.len(),
            portfolio_value,
            vix = conditions.vix,
            regime = %regime,
            "comparing hedging strategies"
        );

        let analyses: Vec<StrategyAnalysis> = strategies
            .iter()
            .map(|s| self.analyze_strategy(s, portfolio_value, conditions, regime, &term_structure, history))
            .collect();

        let relative_comparisons = rank_strategies(&analyses);
        let outlook = RegimeOutlook {
            transition_probabilities: self.analyzer.transition_probabilities(regime, 30),
            allocation: self.analyzer.allocation_recommendation(regime, self.config.base_allocation),
        };
        let recommendations = recommend(&analyses, regime, conditions, outlook);

        Ok(ComparisonResult {
            analysis_timestamp: Utc::now(),
            portfolio_value,
            current_market_conditions: *conditions,
            current_volatility_regime: regime,
            term_structure,
            strategy_analysis: analyses.into_iter().map(|a| (a.id().to_string(), a)).collect(),
            relative_comparisons,
            recommendations,
        })
    }

    /// Analysis of a single strategy under an already classified regime.
    pub fn analyze_strategy(
        &self,
        strategy: &HedgingStrategy,
        portfolio_value: f64,
        conditions: &MarketConditions,
        regime: VolatilityRegime,
        term_structure: &TermStructure,
        history: Option<&[HistoricalObservation]>,
    ) -> StrategyAnalysis {
        let spot = conditions.underlying_price;
        let rate = conditions.risk_free_rate;
        let inputs = strategy.put_inputs(spot, rate);

        let jump_diffusion_price = self.pricer.price(&inputs);
        let black_scholes_price = self.pricer.black_scholes_price(&inputs);
        let jump_risk_premium = if black_scholes_price > 0.0 {
            (jump_diffusion_price - black_scholes_price) / black_scholes_price
        } else {
            0.0
        };

        let contracts_needed =
            portfolio_value * self.config.hedge_ratio / (spot * self.config.contract_multiplier);
        let cost_per_roll = jump_diffusion_price * self.config.contract_multiplier * contracts_needed;
        let annual_cost = cost_per_roll * strategy.rolls_per_year();

        let regime_impact_analysis = strategy.term_structure_impact(term_structure);

        let pricing_analysis = PricingAnalysis {
            strike: inputs.strike,
            jump_diffusion_price,
            black_scholes_price,
            jump_risk_premium,
            contracts_needed,
            cost_per_roll,
            annual_cost,
            cost_as_percentage: annual_cost / portfolio_value,
            regime_adjusted_annual_cost: annual_cost * regime_impact_analysis.cost_impact_multiplier,
        };

        let greeks_analysis = strategy.regime_adjusted_greeks(spot, rate, regime, &self.pricer);

        let exit_manager = self.exit_manager_for(strategy);
        let current_exit_recommendation = exit_manager.evaluate(conditions, 1.0, Some(strategy.expiry_days()));

        let performance_metrics = match history {
            Some(h) if !h.is_empty() => self.historical_performance(&exit_manager, annual_cost, h),
            Some(_) => {
                warn!(strategy = strategy.id(), "empty history supplied, using estimated performance");
                self.estimated_performance(spot, &pricing_analysis)
            }
            None => self.estimated_performance(spot, &pricing_analysis),
        };

        debug!(
            strategy = strategy.id(),
            jd_price = jump_diffusion_price,
            bs_price = black_scholes_price,
            annual_cost,
            protection_ratio = performance_metrics.protection_ratio,
            "strategy analyzed"
        );

        StrategyAnalysis {
            strategy_details: strategy.clone(),
            pricing_analysis,
            greeks_analysis,
            regime_impact_analysis,
            exit_strategy_analysis: ExitStrategyAnalysis {
                current_exit_recommendation,
                configured_triggers: exit_manager.triggers().to_vec(),
            },
            performance_metrics,
            risk_assessment: strategy.risk_assessment(regime),
        }
    }

    /// The strategy's own ladder when it has one, otherwise the defaults.
    fn exit_manager_for(&self, strategy: &HedgingStrategy) -> ExitStrategyManager {
        if strategy.exit_triggers().is_empty() {
            self.exit_manager.clone()
        } else {
            ExitStrategyManager::with_triggers(*self.exit_manager.config(), strategy.exit_triggers().to_vec())
        }
    }

    /// Mean stress-scenario put payoff over annual premium. Early exits are
    /// assumed to recover `estimated_exit_offset` of the cost.
    fn estimated_performance(&self, spot: f64, pricing: &PricingAnalysis) -> PerformanceMetrics {
        let scenarios = &self.config.protection_scenarios;
        let notional_units = pricing.contracts_needed * self.config.contract_multiplier;

        let mean_payoff = if scenarios.is_empty() {
            0.0
        } else {
            scenarios
                .iter()
                .map(|s| (pricing.strike - spot * (1.0 - s.market_decline)).max(0.0) * notional_units)
                .sum::<f64>()
                / scenarios.len() as f64
        };
        let protection_ratio = if pricing.annual_cost > 0.0 { mean_payoff / pricing.annual_cost } else { 0.0 };

        PerformanceMetrics {
            basis: PerformanceBasis::Estimated,
            annual_cost: pricing.annual_cost,
            protection_ratio,
            net_annual_cost: pricing.annual_cost * (1.0 - self.config.estimated_exit_offset),
            protection_events: None,
            realized_profit: None,
        }
    }

    /// Replays `history`: each stressed sell-off day pays a multiple of the
    /// annual premium, of which the exit manager decides how much to take.
    fn historical_performance(
        &self,
        exit_manager: &ExitStrategyManager,
        annual_cost: f64,
        history: &[HistoricalObservation],
    ) -> PerformanceMetrics {
        let mut events = 0usize;
        let mut realized = 0.0;

        for obs in history {
            if !(obs.vix > self.config.protection_event_vix && obs.index_return < self.config.protection_event_return) {
                continue;
            }
            events += 1;
            let multiplier = (obs.vix / 5.0).min(self.config.stress_multiplier_cap);
            let conditions = MarketConditions::new(obs.vix, 0.0, 0.0)
                .with_portfolio_return(obs.index_return)
                .with_correlation(self.config.event_correlation);
            let decision = exit_manager.evaluate(&conditions, multiplier, None);
            realized += annual_cost * multiplier * decision.recommended_exit_percentage;
        }

        let protection_ratio = if annual_cost > 0.0 { realized / annual_cost } else { 0.0 };
        let annualized_recovery = realized / history.len() as f64 * self.config.trading_days_per_year;
        debug!(events, realized, "historical protection replay");

        PerformanceMetrics {
            basis: PerformanceBasis::Historical,
            annual_cost,
            protection_ratio,
            net_annual_cost: annual_cost - annualized_recovery,
            protection_events: Some(events),
            realized_profit: Some(realized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn grid() -> Vec<HedgingStrategy> {
        vec![HedgingStrategy::new(2, 0.15, 14).unwrap(), HedgingStrategy::new(6, 0.15, 30).unwrap()]
    }

    #[test]
    fn test_two_strategy_comparison() {
        let mut engine = HedgeComparisonEngine::default();
        let conditions = MarketConditions::new(25.0, 420.0, 0.045);
        let result = engine.compare_strategies(&grid(), 100_000.0, &conditions, None).unwrap();

        assert_eq!(result.strategy_analysis.len(), 2);
        assert!(result.strategy_analysis.contains_key("2M_15%_OTM"));
        assert!(result.strategy_analysis.contains_key("6M_15%_OTM"));

        let rankings = result.relative_comparisons.rankings().expect("two strategies are comparable");
        assert_eq!(rankings.cost_efficiency_ranking.len(), 2);
        assert_eq!(rankings.pairwise_comparisons.len(), 1);

        let primary = result.recommendations.primary_recommendation.as_ref().expect("primary recommendation");
        assert!(primary.confidence_score > 0.0);
        assert_eq!(engine.analyzer().history().len(), 1);
    }

    #[test]
    fn test_pricing_analysis_consistency() {
        let mut engine = HedgeComparisonEngine::default();
        let conditions = MarketConditions::new(25.0, 420.0, 0.045);
        let result = engine.compare_strategies(&grid(), 100_000.0, &conditions, None).unwrap();
        let a = &result.strategy_analysis["2M_15%_OTM"];
        let p = &a.pricing_analysis;

        assert!((p.strike - 357.0).abs() < 1e-9);
        assert!(p.jump_diffusion_price > 0.0);
        assert!(p.jump_diffusion_price >= p.black_scholes_price, "negative jumps add put value");
        assert!((p.annual_cost - p.cost_per_roll * 6.0).abs() < 1e-9);
        assert!((p.cost_as_percentage - p.annual_cost / 100_000.0).abs() < 1e-12);
        assert!(
            (p.regime_adjusted_annual_cost - p.annual_cost * a.regime_impact_analysis.cost_impact_multiplier).abs()
                < 1e-9
        );
        assert_eq!(a.performance_metrics.basis, PerformanceBasis::Estimated);
        assert!(a.performance_metrics.protection_ratio > 0.0);
        assert!((a.performance_metrics.net_annual_cost - 0.8 * p.annual_cost).abs() < 1e-9);
    }

    #[test]
    fn test_high_vol_regime_penalizes_short_dated() {
        let mut engine = HedgeComparisonEngine::default();
        let strategies = vec![
            HedgingStrategy::new(1, 0.15, 7).unwrap(),
            HedgingStrategy::new(2, 0.15, 14).unwrap(),
            HedgingStrategy::new(6, 0.15, 30).unwrap(),
        ];
        let conditions = MarketConditions::new(32.0, 420.0, 0.045);
        let result = engine.compare_strategies(&strategies, 100_000.0, &conditions, None).unwrap();

        assert_eq!(result.current_volatility_regime, VolatilityRegime::High);
        for a in result.strategy_analysis.values().filter(|a| a.strategy_details.expiration_months() <= 2) {
            assert!(a.volatility_adjustment() > 0.0, "{} adj={}", a.id(), a.volatility_adjustment());
        }
        let warnings = &result.recommendations.risk_warnings;
        assert!(!warnings.is_empty());
        assert!(warnings.iter().any(|w| w.contains("2-Month 15% OTM Puts")));
    }

    #[test]
    fn test_single_strategy_is_insufficient() {
        let mut engine = HedgeComparisonEngine::default();
        let conditions = MarketConditions::new(20.0, 420.0, 0.045);
        let result = engine
            .compare_strategies(&grid()[..1], 100_000.0, &conditions, None)
            .unwrap();
        assert!(matches!(result.relative_comparisons, RelativeComparisons::Insufficient { .. }));
        assert_eq!(result.strategy_analysis.len(), 1);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut engine = HedgeComparisonEngine::default();
        let conditions = MarketConditions::new(20.0, 420.0, 0.045);
        assert!(engine.compare_strategies(&grid(), 0.0, &conditions, None).is_err());
        assert!(engine
            .compare_strategies(&grid(), 100_000.0, &MarketConditions::new(20.0, 0.0, 0.045), None)
            .is_err());
        let dup = vec![HedgingStrategy::new(2, 0.15, 14).unwrap(), HedgingStrategy::new(2, 0.15, 21).unwrap()];
        assert!(matches!(
            engine.compare_strategies(&dup, 100_000.0, &conditions, None),
            Err(HedgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_historical_performance_counts_events() {
        let day = |d: u32, vix: f64, ret: f64| HistoricalObservation {
            date: NaiveDate::from_ymd_opt(2020, 3, d).unwrap(),
            vix,
            index_return: ret,
        };
        let history = vec![
            day(2, 20.0, 0.01),
            day(9, 54.0, -0.076),
            day(12, 75.0, -0.095),
            day(16, 82.0, -0.12),
            day(17, 75.0, 0.06),
        ];
        let mut engine = HedgeComparisonEngine::default();
        let conditions = MarketConditions::new(25.0, 420.0, 0.045);
        let result = engine.compare_strategies(&grid(), 100_000.0, &conditions, Some(&history)).unwrap();
        let perf = &result.strategy_analysis["6M_15%_OTM"].performance_metrics;

        assert_eq!(perf.basis, PerformanceBasis::Historical);
        assert_eq!(perf.protection_events, Some(3));
        assert!(perf.realized_profit.unwrap_or(0.0) > 0.0);
        assert!(perf.protection_ratio > 0.0);
        assert!(perf.net_annual_cost < perf.annual_cost);
    }

    #[test]
    fn test_fresh_position_exit_recommendation() {
        let mut engine = HedgeComparisonEngine::default();
        let calm = MarketConditions::new(14.0, 420.0, 0.045);
        let result = engine.compare_strategies(&grid(), 100_000.0, &calm, None).unwrap();
        for a in result.strategy_analysis.values() {
            let exit = &a.exit_strategy_analysis.current_exit_recommendation;
            assert!(!exit.should_exit(), "{} should hold in a calm market", a.id());
            assert_eq!(exit.position_pnl_multiple, 1.0);
        }
    }
}
