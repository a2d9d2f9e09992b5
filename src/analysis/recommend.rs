use std::cmp::Ordering;

use tracing::debug;

use crate::analysis::comparison::StrategyAnalysis;
use crate::models::volatility::AllocationRecommendation;
use crate::state::{MarketConditions, RegimeTable, VolatilityRegime};

/// Floor for cost % in the composite score so a free strategy stays finite.
const MIN_COST_FRACTION: f64 = 1e-6;
const HIGH_COST_FRACTION: f64 = 0.05;
const INVERSION_VIX: f64 = 40.0;
const THIN_VOLUME_RATIO: f64 = 0.5;
const IMMEDIATE_EXIT_URGENCY: f64 = 0.7;
const MONITORING_URGENCY: f64 = 0.5;
const TOP_REGIME_FITS: usize = 3;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PrimaryRecommendation {
    pub recommended_strategy: String,
    pub strategy_id: String,
    pub composite_score: f64,
    /// min(1, score / 3). Saturates at 1 for any strategy costing under
    /// about 10% of the portfolio, so it does not separate realistic hedges.
    pub confidence_score: f64,
    pub key_advantages: Vec<String>,
    pub implementation_notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RegimeCharacteristics {
    pub description: &'static str,
    pub typical_duration: &'static str,
    pub key_risks: &'static str,
    pub opportunities: &'static str,
}

impl RegimeCharacteristics {
    pub fn of(regime: VolatilityRegime) -> Self {
        match regime {
            VolatilityRegime::Low => Self {
                description: "Low volatility environment - good time to establish hedges",
                typical_duration: "6-18 months",
                key_risks: "Complacency, under-hedging",
                opportunities: "Cost-effective hedge establishment",
            },
            VolatilityRegime::Medium => Self {
                description: "Transitional volatility - monitor for regime changes",
                typical_duration: "3-6 months",
                key_risks: "Regime uncertainty, timing risk",
                opportunities: "Balanced cost-protection tradeoff",
            },
            VolatilityRegime::High => Self {
                description: "Elevated volatility - existing hedges likely profitable",
                typical_duration: "1-3 months",
                key_risks: "Term structure inversion, expensive rolling",
                opportunities: "Profit-taking on existing positions",
            },
            VolatilityRegime::Extreme => Self {
                description: "Crisis-level volatility - focus on profit realization",
                typical_duration: "Days to weeks",
                key_risks: "Liquidity, extreme premium costs",
                opportunities: "Maximum hedge effectiveness period",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RegimeFit {
    pub strategy: String,
    /// 1 / (1 + |vol adjustment|)
    pub suitability_score: f64,
    pub volatility_impact: f64,
}

/// Forward-looking regime inputs computed by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RegimeOutlook {
    /// 30-day horizon.
    pub transition_probabilities: RegimeTable<f64>,
    pub allocation: AllocationRecommendation,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RegimeAdvice {
    pub current_regime: VolatilityRegime,
    pub regime_characteristics: RegimeCharacteristics,
    pub optimal_strategies_for_regime: Vec<RegimeFit>,
    pub regime_transition_guidance: RegimeOutlook,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HybridAllocation {
    pub short_term_strategy: String,
    pub short_term_weight: f64,
    pub long_term_strategy: String,
    pub long_term_weight: f64,
    pub blended_annual_cost: f64,
    pub blended_protection_ratio: f64,
    pub rationale: &'static str,
    pub implementation: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HybridSuggestion {
    Allocation(HybridAllocation),
    /// Candidates lack a short (<=3M) or a long (>=6M) expiry.
    MissingHorizon { recommendation: &'static str },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Recommendations {
    /// None when there are no candidates.
    pub primary_recommendation: Option<PrimaryRecommendation>,
    pub regime_specific_advice: RegimeAdvice,
    pub hybrid_strategy_suggestion: HybridSuggestion,
    pub risk_warnings: Vec<String>,
    pub action_items: Vec<String>,
}

/// Assembles every recommendation section from per-strategy analyses in
/// input order.
pub fn recommend(
    analyses: &[StrategyAnalysis],
    regime: VolatilityRegime,
    conditions: &MarketConditions,
    outlook: RegimeOutlook,
) -> Recommendations {
    let primary_recommendation = primary_recommendation(analyses, regime);
    if let Some(p) = &primary_recommendation {
        debug!(strategy = %p.strategy_id, score = p.composite_score, "primary recommendation");
    }

    Recommendations {
        primary_recommendation,
        regime_specific_advice: regime_advice(analyses, regime, outlook),
        hybrid_strategy_suggestion: hybrid_suggestion(analyses, regime),
        risk_warnings: risk_warnings(analyses, regime, conditions),
        action_items: action_items(analyses, regime),
    }
}

/// 0.3 / cost% + 0.5 * protection + 0.2 / (1 + |vol adj|)
///
/// Cost enters as a fraction of the portfolio (0.02, not 2), so the cost
/// term alone is 15 for a 2% hedge and dominates the other two terms.
pub fn composite_score(analysis: &StrategyAnalysis) -> f64 {
    let cost_score = 1.0 / analysis.cost_as_percentage().max(MIN_COST_FRACTION);
    let protection_score = analysis.protection_ratio();
    let regime_score = 1.0 / (1.0 + analysis.volatility_adjustment().abs());
    let score = 0.3 * cost_score + 0.5 * protection_score + 0.2 * regime_score;
    if score.is_finite() { score } else { 0.0 }
}

/// Highest composite score; the first candidate wins ties.
pub fn primary_recommendation(analyses: &[StrategyAnalysis], regime: VolatilityRegime) -> Option<PrimaryRecommendation> {
    let (best, score) = analyses
        .iter()
        .map(|a| (a, composite_score(a)))
        .fold(None, |best: Option<(&StrategyAnalysis, f64)>, (a, s)| match best {
            Some((_, bs)) if bs >= s => best,
            _ => Some((a, s)),
        })?;

    Some(PrimaryRecommendation {
        recommended_strategy: best.name().to_string(),
        strategy_id: best.id().to_string(),
        composite_score: score,
        confidence_score: (score / 3.0).min(1.0),
        key_advantages: key_advantages(best),
        implementation_notes: implementation_notes(best, regime),
    })
}

fn key_advantages(a: &StrategyAnalysis) -> Vec<String> {
    let mut out = Vec::new();
    if a.cost_as_percentage() < 0.03 {
        out.push("Low cost as percentage of portfolio".to_string());
    }
    if a.protection_ratio() > 3.0 {
        out.push("High protection ratio".to_string());
    }
    if a.volatility_adjustment().abs() < 0.02 {
        out.push("Stable across volatility regimes".to_string());
    }
    if a.pricing_analysis.jump_risk_premium > 0.1 {
        out.push("Significant jump risk premium captured".to_string());
    }
    if a.strategy_details.expiration_months() >= 6 {
        out.push("Lower time decay and rolling costs".to_string());
    }
    out
}

fn implementation_notes(a: &StrategyAnalysis, regime: VolatilityRegime) -> Vec<String> {
    let mut out = Vec::new();
    let s = &a.strategy_details;

    if regime.is_stressed() {
        if s.is_short_term() {
            out.push("Consider delaying implementation until volatility normalizes".to_string());
        } else {
            out.push("Good timing - longer expiration avoids term structure penalty".to_string());
        }
    }
    if a.exit_strategy_analysis.current_exit_recommendation.urgency_score > MONITORING_URGENCY {
        out.push("Set up active monitoring for exit opportunities".to_string());
    }
    if a.pricing_analysis.jump_risk_premium > 0.15 {
        out.push("Jump risk significant - consider starting with smaller allocation".to_string());
    }
    out.push(format!("Target allocation: {:.1}% of portfolio", a.cost_as_percentage() * 100.0));
    out.push(format!("Roll positions {} days before expiration", s.rolling_threshold_days()));
    out
}

pub fn regime_advice(analyses: &[StrategyAnalysis], regime: VolatilityRegime, outlook: RegimeOutlook) -> RegimeAdvice {
    let mut fits: Vec<RegimeFit> = analyses
        .iter()
        .map(|a| {
            let impact = a.volatility_adjustment().abs();
            RegimeFit { strategy: a.name().to_string(), suitability_score: 1.0 / (1.0 + impact), volatility_impact: impact }
        })
        .collect();
    fits.sort_by(|a, b| b.suitability_score.partial_cmp(&a.suitability_score).unwrap_or(Ordering::Equal));
    fits.truncate(TOP_REGIME_FITS);

    RegimeAdvice {
        current_regime: regime,
        regime_characteristics: RegimeCharacteristics::of(regime),
        optimal_strategies_for_regime: fits,
        regime_transition_guidance: outlook,
    }
}

fn cheapest<'a>(it: impl Iterator<Item = &'a StrategyAnalysis>) -> Option<&'a StrategyAnalysis> {
    it.min_by(|a, b| a.cost_as_percentage().partial_cmp(&b.cost_as_percentage()).unwrap_or(Ordering::Equal))
}

/// Blend of the cheapest short (<=3M) and long (>=6M) strategy, weighted by
/// regime.
pub fn hybrid_suggestion(analyses: &[StrategyAnalysis], regime: VolatilityRegime) -> HybridSuggestion {
    let short = cheapest(analyses.iter().filter(|a| a.strategy_details.is_short_term()));
    let long = cheapest(analyses.iter().filter(|a| a.strategy_details.is_long_term()));
    let (Some(short), Some(long)) = (short, long) else {
        return HybridSuggestion::MissingHorizon {
            recommendation: "Consider adding both short-term and long-term strategies for diversification",
        };
    };

    let (short_w, long_w, rationale) = match regime {
        VolatilityRegime::Low => (0.3, 0.7, "Favor long-term in low volatility to minimize cost"),
        VolatilityRegime::Medium => (0.5, 0.5, "Balanced allocation for transitional regime"),
        VolatilityRegime::High | VolatilityRegime::Extreme => {
            (0.7, 0.3, "Favor short-term for responsiveness to regime changes")
        }
    };

    HybridSuggestion::Allocation(HybridAllocation {
        short_term_strategy: short.name().to_string(),
        short_term_weight: short_w,
        long_term_strategy: long.name().to_string(),
        long_term_weight: long_w,
        blended_annual_cost: short_w * short.pricing_analysis.annual_cost + long_w * long.pricing_analysis.annual_cost,
        blended_protection_ratio: short_w * short.protection_ratio() + long_w * long.protection_ratio(),
        rationale,
        implementation: format!(
            "Allocate {:.0}% to {} and {:.0}% to {}",
            short_w * 100.0,
            short.name(),
            long_w * 100.0,
            long.name()
        ),
    })
}

pub fn risk_warnings(
    analyses: &[StrategyAnalysis],
    regime: VolatilityRegime,
    conditions: &MarketConditions,
) -> Vec<String> {
    let mut out = Vec::new();

    if !analyses.is_empty() {
        let avg_cost = analyses.iter().map(|a| a.cost_as_percentage()).sum::<f64>() / analyses.len() as f64;
        if avg_cost > HIGH_COST_FRACTION {
            out.push(
                "WARNING: High hedging costs detected - consider reducing allocation or extending expiration"
                    .to_string(),
            );
        }
    }
    if regime == VolatilityRegime::Extreme {
        out.push("WARNING: Extreme volatility regime - new hedge purchases may be very expensive".to_string());
    }
    if conditions.vix > INVERSION_VIX {
        out.push(
            "WARNING: Potential volatility term structure inversion - short-term options may be severely overpriced"
                .to_string(),
        );
    }
    if conditions.volume_ratio < THIN_VOLUME_RATIO {
        out.push("WARNING: Reduced market liquidity detected - expect wider bid-ask spreads".to_string());
    }
    if regime.is_stressed() {
        for a in analyses.iter().filter(|a| a.strategy_details.expiration_months() <= 2) {
            out.push(format!("WARNING: {} may be severely overpriced in current regime", a.name()));
        }
    }
    out
}

pub fn action_items(analyses: &[StrategyAnalysis], regime: VolatilityRegime) -> Vec<String> {
    let mut out = Vec::new();

    for a in analyses {
        let exit = &a.exit_strategy_analysis.current_exit_recommendation;
        if exit.urgency_score > IMMEDIATE_EXIT_URGENCY {
            out.push(format!(
                "IMMEDIATE: Consider exiting {:.0}% of {} positions",
                exit.recommended_exit_percentage * 100.0,
                a.name()
            ));
        }
    }

    match regime {
        VolatilityRegime::Low => out.push("Consider increasing hedge allocation while costs are low".to_string()),
        VolatilityRegime::Extreme => {
            out.push("Focus on profit-taking rather than new hedge establishment".to_string())
        }
        VolatilityRegime::Medium | VolatilityRegime::High => {}
    }

    out.extend(
        [
            "Review and update exit triggers based on current market conditions",
            "Set up monitoring alerts for volatility regime transitions",
            "Validate option liquidity before executing large positions",
            "Consider implementing positions gradually to minimize market impact",
        ]
        .map(String::from),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ranking::tests::analysis;
    use crate::models::volatility::VolatilityRegimeAnalyzer;

    fn outlook(regime: VolatilityRegime) -> RegimeOutlook {
        let analyzer = VolatilityRegimeAnalyzer::default();
        RegimeOutlook {
            transition_probabilities: analyzer.transition_probabilities(regime, 30),
            allocation: analyzer.allocation_recommendation(regime, 0.05),
        }
    }

    #[test]
    fn test_composite_score() {
        let a = analysis(6, 2_000.0, 4.0, 0.0);
        // 0.3 / 0.02 + 0.5 * 4 + 0.2 * 1
        assert!((composite_score(&a) - 17.2).abs() < 1e-9);
        let free = analysis(6, 0.0, 4.0, 0.0);
        assert!(composite_score(&free).is_finite());
    }

    #[test]
    fn test_confidence_saturates_for_realistic_costs() {
        let realistic = primary_recommendation(&[analysis(6, 2_000.0, 0.0, 0.0)], VolatilityRegime::Medium).unwrap();
        assert_eq!(realistic.confidence_score, 1.0);

        // 0.3 / 0.5 + 0 + 0.2 = 0.8
        let expensive = primary_recommendation(&[analysis(6, 50_000.0, 0.0, 0.0)], VolatilityRegime::Medium).unwrap();
        assert!((expensive.composite_score - 0.8).abs() < 1e-9, "score={}", expensive.composite_score);
        assert!((expensive.confidence_score - 0.8 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_primary_picks_highest_score() {
        let set = [analysis(2, 4_000.0, 2.0, 0.05), analysis(6, 2_000.0, 4.0, 0.0)];
        let p = primary_recommendation(&set, VolatilityRegime::Medium).unwrap();
        assert_eq!(p.strategy_id, "6M_15%_OTM");
        assert_eq!(p.confidence_score, 1.0);
        assert!(p.key_advantages.iter().any(|s| s == "Lower time decay and rolling costs"));
        assert!(p.implementation_notes.iter().any(|s| s == "Target allocation: 2.0% of portfolio"));
        assert!(p.implementation_notes.iter().any(|s| s == "Roll positions 14 days before expiration"));
        assert!(primary_recommendation(&[], VolatilityRegime::Medium).is_none());
    }

    #[test]
    fn test_stressed_regime_timing_notes() {
        let short = [analysis(2, 2_000.0, 4.0, 0.05)];
        let p = primary_recommendation(&short, VolatilityRegime::High).unwrap();
        assert_eq!(p.implementation_notes[0], "Consider delaying implementation until volatility normalizes");
        let long = [analysis(6, 2_000.0, 4.0, 0.0)];
        let p = primary_recommendation(&long, VolatilityRegime::Extreme).unwrap();
        assert_eq!(p.implementation_notes[0], "Good timing - longer expiration avoids term structure penalty");
    }

    #[test]
    fn test_hybrid_weights_follow_regime() {
        let set = [
            analysis(2, 3_000.0, 5.0, 0.03),
            analysis(3, 2_500.0, 4.0, 0.01),
            analysis(6, 2_000.0, 3.0, 0.0),
        ];
        let HybridSuggestion::Allocation(h) = hybrid_suggestion(&set, VolatilityRegime::High) else {
            panic!("expected an allocation");
        };
        assert_eq!(h.short_term_strategy, "3-Month 15% OTM Puts");
        assert_eq!(h.long_term_strategy, "6-Month 15% OTM Puts");
        assert_eq!((h.short_term_weight, h.long_term_weight), (0.7, 0.3));
        assert!((h.blended_annual_cost - (0.7 * 2_500.0 + 0.3 * 2_000.0)).abs() < 1e-9);
        assert_eq!(h.implementation, "Allocate 70% to 3-Month 15% OTM Puts and 30% to 6-Month 15% OTM Puts");

        let HybridSuggestion::Allocation(h) = hybrid_suggestion(&set, VolatilityRegime::Low) else {
            panic!("expected an allocation");
        };
        assert_eq!(h.long_term_weight, 0.7);

        let short_only = [analysis(2, 3_000.0, 5.0, 0.03), analysis(3, 2_500.0, 4.0, 0.01)];
        assert!(matches!(hybrid_suggestion(&short_only, VolatilityRegime::Low), HybridSuggestion::MissingHorizon { .. }));
    }

    #[test]
    fn test_risk_warnings() {
        let set = [analysis(2, 6_000.0, 2.0, 0.05), analysis(6, 5_000.0, 3.0, 0.0)];
        let calm = MarketConditions::new(18.0, 420.0, 0.045);
        let w = risk_warnings(&set, VolatilityRegime::Medium, &calm);
        assert_eq!(w.len(), 1, "{w:?}");
        assert!(w[0].starts_with("WARNING: High hedging costs"));

        let crisis = MarketConditions::new(55.0, 420.0, 0.045).with_liquidity(0.3, 2.0);
        let w = risk_warnings(&set, VolatilityRegime::Extreme, &crisis);
        assert!(w.iter().any(|s| s.contains("Extreme volatility regime")));
        assert!(w.iter().any(|s| s.contains("term structure inversion")));
        assert!(w.iter().any(|s| s.contains("Reduced market liquidity")));
        assert!(w.iter().any(|s| s == "WARNING: 2-Month 15% OTM Puts may be severely overpriced in current regime"));
        assert!(!w.iter().any(|s| s.contains("6-Month")));
    }

    #[test]
    fn test_action_items() {
        let set = [analysis(6, 2_000.0, 3.0, 0.0)];
        let low = action_items(&set, VolatilityRegime::Low);
        assert_eq!(low[0], "Consider increasing hedge allocation while costs are low");
        assert_eq!(low.len(), 5);
        let medium = action_items(&set, VolatilityRegime::Medium);
        assert_eq!(medium.len(), 4);
    }

    #[test]
    fn test_regime_advice_top_three() {
        let set = [
            analysis(1, 3_000.0, 5.0, 0.08),
            analysis(2, 3_000.0, 5.0, 0.05),
            analysis(6, 2_000.0, 3.0, 0.0),
            analysis(12, 2_000.0, 3.0, -0.01),
        ];
        let advice = regime_advice(&set, VolatilityRegime::High, outlook(VolatilityRegime::High));
        let names: Vec<_> = advice.optimal_strategies_for_regime.iter().map(|f| f.strategy.as_str()).collect();
        assert_eq!(names, ["6-Month 15% OTM Puts", "12-Month 15% OTM Puts", "2-Month 15% OTM Puts"]);
        assert_eq!(advice.regime_characteristics.typical_duration, "1-3 months");
        let total: f64 = advice.regime_transition_guidance.transition_probabilities.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
