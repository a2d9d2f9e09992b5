use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::analysis::comparison::StrategyAnalysis;

/// Points for each pairwise criterion. Protection weighs most.
const COST_POINTS: u32 = 2;
const PROTECTION_POINTS: u32 = 3;
const ADAPTABILITY_POINTS: u32 = 1;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CostRank {
    pub rank: usize,
    pub strategy_id: String,
    pub strategy_name: String,
    pub annual_cost: f64,
    pub cost_as_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProtectionRank {
    pub rank: usize,
    pub strategy_id: String,
    pub strategy_name: String,
    pub protection_ratio: f64,
    pub jump_risk_premium: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AdaptabilityRank {
    pub rank: usize,
    pub strategy_id: String,
    pub strategy_name: String,
    pub volatility_adjustment: f64,
    pub cost_impact_multiplier: f64,
}

/// Head-to-head verdict. Serializes as the winning name or the tie text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(into = "String")]
pub enum PairwiseOutcome {
    Winner(String),
    Tie,
}

impl From<PairwiseOutcome> for String {
    fn from(outcome: PairwiseOutcome) -> Self {
        match outcome {
            PairwiseOutcome::Winner(name) => name,
            PairwiseOutcome::Tie => "Tie - context-dependent choice".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PairwiseComparison {
    pub strategy1: String,
    pub strategy2: String,
    /// Annual cost of 1 minus 2.
    pub cost_difference: f64,
    /// Relative to strategy 2's cost; zero when that cost is zero.
    pub cost_difference_percentage: f64,
    pub protection_difference: f64,
    /// None when costs are equal.
    pub cost_efficiency_winner: Option<String>,
    /// None when protection ratios are equal.
    pub protection_winner: Option<String>,
    pub strategy1_score: u32,
    pub strategy2_score: u32,
    pub overall_recommendation: PairwiseOutcome,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Rankings {
    pub cost_efficiency_ranking: Vec<CostRank>,
    pub protection_effectiveness_ranking: Vec<ProtectionRank>,
    pub regime_adaptability_ranking: Vec<AdaptabilityRank>,
    /// Keyed "{id1}_vs_{id2}" in input order.
    pub pairwise_comparisons: BTreeMap<String, PairwiseComparison>,
}

/// Comparison outcome. Fewer than two candidates is a value, not an error.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelativeComparisons {
    Ranked(Rankings),
    Insufficient { reason: String },
}

impl RelativeComparisons {
    pub fn rankings(&self) -> Option<&Rankings> {
        match self {
            Self::Ranked(r) => Some(r),
            Self::Insufficient { .. } => None,
        }
    }
}

/// NaN sorts last in both directions.
fn ascending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

fn sorted_by<F>(analyses: &[StrategyAnalysis], key: F) -> Vec<&StrategyAnalysis>
where
    F: Fn(&StrategyAnalysis, &StrategyAnalysis) -> Ordering,
{
    let mut v: Vec<&StrategyAnalysis> = analyses.iter().collect();
    // Stable: ties keep input order
    v.sort_by(|a, b| key(a, b));
    v
}

/// Ranks strategies three ways and scores every pair.
///
/// Ranking keys: cost % ascending, protection ratio descending and
/// |volatility adjustment| ascending.
pub fn rank_strategies(analyses: &[StrategyAnalysis]) -> RelativeComparisons {
    if analyses.len() < 2 {
        return RelativeComparisons::Insufficient {
            reason: format!("Need at least 2 strategies for comparison, got {}", analyses.len()),
        };
    }

    let cost_efficiency_ranking = sorted_by(analyses, |a, b| ascending(a.cost_as_percentage(), b.cost_as_percentage()))
        .into_iter()
        .enumerate()
        .map(|(i, a)| CostRank {
            rank: i + 1,
            strategy_id: a.id().to_string(),
            strategy_name: a.name().to_string(),
            annual_cost: a.pricing_analysis.annual_cost,
            cost_as_percentage: a.cost_as_percentage(),
        })
        .collect();

    let protection_effectiveness_ranking =
        sorted_by(analyses, |a, b| ascending(-a.protection_ratio(), -b.protection_ratio()))
            .into_iter()
            .enumerate()
            .map(|(i, a)| ProtectionRank {
                rank: i + 1,
                strategy_id: a.id().to_string(),
                strategy_name: a.name().to_string(),
                protection_ratio: a.protection_ratio(),
                jump_risk_premium: a.pricing_analysis.jump_risk_premium,
            })
            .collect();

    let regime_adaptability_ranking =
        sorted_by(analyses, |a, b| ascending(a.volatility_adjustment().abs(), b.volatility_adjustment().abs()))
            .into_iter()
            .enumerate()
            .map(|(i, a)| AdaptabilityRank {
                rank: i + 1,
                strategy_id: a.id().to_string(),
                strategy_name: a.name().to_string(),
                volatility_adjustment: a.volatility_adjustment(),
                cost_impact_multiplier: a.regime_impact_analysis.cost_impact_multiplier,
            })
            .collect();

    let mut pairwise_comparisons = BTreeMap::new();
    for (i, first) in analyses.iter().enumerate() {
        for second in &analyses[i + 1..] {
            pairwise_comparisons.insert(format!("{}_vs_{}", first.id(), second.id()), compare_pair(first, second));
        }
    }

    RelativeComparisons::Ranked(Rankings {
        cost_efficiency_ranking,
        protection_effectiveness_ranking,
        regime_adaptability_ranking,
        pairwise_comparisons,
    })
}

/// Strict comparison: equal values award no points to either side.
fn winner_of(first: &StrategyAnalysis, second: &StrategyAnalysis, ord: Ordering) -> Option<String> {
    match ord {
        Ordering::Less => Some(first.name().to_string()),
        Ordering::Greater => Some(second.name().to_string()),
        Ordering::Equal => None,
    }
}

/// Scores a pair: +2 lower cost, +3 higher protection, +1 lower |vol adj|.
pub fn compare_pair(first: &StrategyAnalysis, second: &StrategyAnalysis) -> PairwiseComparison {
    let cost1 = first.pricing_analysis.annual_cost;
    let cost2 = second.pricing_analysis.annual_cost;

    let cost_ord = cost1.partial_cmp(&cost2).unwrap_or(Ordering::Equal);
    // Reversed: higher protection wins
    let protection_ord = second
        .protection_ratio()
        .partial_cmp(&first.protection_ratio())
        .unwrap_or(Ordering::Equal);
    let adapt_ord = first
        .volatility_adjustment()
        .abs()
        .partial_cmp(&second.volatility_adjustment().abs())
        .unwrap_or(Ordering::Equal);

    let mut score1 = 0;
    let mut score2 = 0;
    for (ord, points) in [(cost_ord, COST_POINTS), (protection_ord, PROTECTION_POINTS), (adapt_ord, ADAPTABILITY_POINTS)] {
        match ord {
            Ordering::Less => score1 += points,
            Ordering::Greater => score2 += points,
            Ordering::Equal => {}
        }
    }

    let overall_recommendation = match score1.cmp(&score2) {
        Ordering::Greater => PairwiseOutcome::Winner(first.name().to_string()),
        Ordering::Less => PairwiseOutcome::Winner(second.name().to_string()),
        Ordering::Equal => PairwiseOutcome::Tie,
    };

    PairwiseComparison {
        strategy1: first.name().to_string(),
        strategy2: second.name().to_string(),
        cost_difference: cost1 - cost2,
        cost_difference_percentage: if cost2 != 0.0 { (cost1 - cost2) / cost2 * 100.0 } else { 0.0 },
        protection_difference: first.protection_ratio() - second.protection_ratio(),
        cost_efficiency_winner: winner_of(first, second, cost_ord),
        protection_winner: winner_of(first, second, protection_ord),
        strategy1_score: score1,
        strategy2_score: score2,
        overall_recommendation,
    }
}
