//! Illustrative replay of historical stress windows through the exit rules.
//!
//! P&L is approximated from VIX level and index drawdown with simple linear
//! rules rather than option repricing. Good enough to compare how often and
//! how profitably partial exits would have fired; not a pricing tool.

use crate::risk::exit::ExitStrategyManager;
use crate::risk::triggers::ExitTriggerKind;
use crate::risk::RiskLevel;
use crate::state::{HistoricalObservation, MarketConditions};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Best exit multiple below which a scenario counts as unprofitable.
const MEANINGFUL_EXIT_MULTIPLE: f64 = 1.5;
/// Share of the position assumed sold at the best exit.
const REALIZED_SHARE: f64 = 0.5;
/// Curve multiple that marks a good exit window.
const GOOD_EXIT_MULTIPLE: f64 = 5.0;

// ── Stress windows ──

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct StressWindow {
    pub name: &'static str,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StressWindow {
    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

const STRESS_WINDOWS: [(&str, (i32, u32, u32), (i32, u32, u32)); 4] = [
    ("COVID-19 Crash", (2020, 2, 20), (2020, 3, 23)),
    ("August 2015 Flash", (2015, 8, 20), (2015, 8, 25)),
    ("February 2018 VIX Spike", (2018, 2, 5), (2018, 2, 9)),
    ("October 2018 Selloff", (2018, 10, 1), (2018, 10, 30)),
];

/// The fixed library of historical stress windows replayed by
/// `simulate_early_exits`.
pub fn historical_stress_windows() -> Vec<StressWindow> {
    STRESS_WINDOWS
        .iter()
        .filter_map(|&(name, (sy, sm, sd), (ey, em, ed))| {
            Some(StressWindow {
                name,
                start: NaiveDate::from_ymd_opt(sy, sm, sd)?,
                end: NaiveDate::from_ymd_opt(ey, em, ed)?,
            })
        })
        .collect()
}

// ── Early exit simulation ──

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SimulatedExit {
    pub date: NaiveDate,
    pub pnl_multiple: f64,
    pub exit_percentage: f64,
    pub trigger: ExitTriggerKind,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EventSimulation {
    pub event_name: String,
    pub peak_pnl_multiple: f64,
    pub total_exit_opportunities: usize,
    /// 1.0 when no exit fired.
    pub best_exit_pnl: f64,
    pub exit_timeline: Vec<SimulatedExit>,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ProfitRealization {
    pub base_annual_cost: f64,
    pub average_annual_profit_realization: f64,
    pub annual_cost_reduction: f64,
    pub net_annual_cost: f64,
    pub cost_reduction_percentage: f64,
    pub break_even_probability: f64,
    pub profitable_scenario_count: usize,
    pub total_scenarios_analyzed: usize,
}

impl ExitStrategyManager {
    /// Replays every stress window that `history` covers. Windows without
    /// data are skipped with a warning.
    pub fn simulate_early_exits(&self, history: &[HistoricalObservation]) -> Vec<EventSimulation> {
        self.simulate_windows(&historical_stress_windows(), history)
    }

    pub fn simulate_windows(&self, windows: &[StressWindow], history: &[HistoricalObservation]) -> Vec<EventSimulation> {
        windows
            .iter()
            .filter_map(|window| {
                let days: Vec<&HistoricalObservation> =
                    history.iter().filter(|o| window.contains(o.date)).collect();
                if days.is_empty() {
                    warn!(event = window.name, "no history for stress window, skipping");
                    return None;
                }
                Some(self.simulate_event(window.name, &days))
            })
            .collect()
    }

    fn simulate_event(&self, name: &str, days: &[&HistoricalObservation]) -> EventSimulation {
        let max_vix = days.iter().map(|o| o.vix).fold(f64::NEG_INFINITY, f64::max);
        let max_drawdown = days.iter().map(|o| o.index_return).fold(f64::INFINITY, f64::min).abs();

        // Rough appreciation from the VIX spike and the index drawdown
        let peak_pnl_multiple = (1.0 + (max_vix - 15.0) / 10.0) * (1.0 + max_drawdown * 20.0);

        let exit_timeline: Vec<SimulatedExit> = days
            .iter()
            .filter_map(|o| {
                let conditions = MarketConditions::new(o.vix, 0.0, 0.0)
                    .with_portfolio_return(o.index_return)
                    .with_correlation(0.7 + (o.vix - 20.0) * 0.01);
                let pnl_multiple = peak_pnl_multiple.min(1.0 + (o.vix - 15.0) / 5.0);

                let opportunity = self.evaluate(&conditions, pnl_multiple, None);
                let trigger = opportunity.trigger?;
                opportunity.should_exit().then_some(SimulatedExit {
                    date: o.date,
                    pnl_multiple,
                    exit_percentage: opportunity.recommended_exit_percentage,
                    trigger,
                })
            })
            .collect();

        let best_exit_pnl = exit_timeline
            .iter()
            .map(|e| e.pnl_multiple)
            .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))))
            .unwrap_or(1.0);

        debug!(event = name, peak = peak_pnl_multiple, exits = exit_timeline.len(), "stress window replayed");

        EventSimulation {
            event_name: name.to_string(),
            peak_pnl_multiple,
            total_exit_opportunities: exit_timeline.len(),
            best_exit_pnl,
            exit_timeline,
        }
    }
}

/// How much realized crisis profit would have offset `base_annual_cost`.
/// Scenarios whose best exit beats 1.5x realize half of the gain.
pub fn profit_realization_impact(scenarios: &[EventSimulation], base_annual_cost: f64) -> ProfitRealization {
    if scenarios.is_empty() {
        return ProfitRealization {
            base_annual_cost,
            average_annual_profit_realization: 0.0,
            annual_cost_reduction: 0.0,
            net_annual_cost: base_annual_cost,
            cost_reduction_percentage: 0.0,
            break_even_probability: 0.0,
            profitable_scenario_count: 0,
            total_scenarios_analyzed: 0,
        };
    }

    let (realized, profitable) = scenarios
        .iter()
        .filter(|s| s.best_exit_pnl > MEANINGFUL_EXIT_MULTIPLE)
        .fold((0.0, 0usize), |(sum, n), s| (sum + (s.best_exit_pnl - 1.0) * REALIZED_SHARE, n + 1));

    let n = scenarios.len() as f64;
    let average = realized / n;
    let reduction = average * base_annual_cost;

    ProfitRealization {
        base_annual_cost,
        average_annual_profit_realization: average,
        annual_cost_reduction: reduction,
        net_annual_cost: base_annual_cost - reduction,
        cost_reduction_percentage: if base_annual_cost > 0.0 { reduction / base_annual_cost * 100.0 } else { 0.0 },
        break_even_probability: profitable as f64 / n,
        profitable_scenario_count: profitable,
        total_scenarios_analyzed: scenarios.len(),
    }
}

// ── Black swan appreciation patterns ──

/// Typical put appreciation through one crisis, as (day, multiple) points.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AppreciationPattern {
    pub name: String,
    pub duration_days: u32,
    pub max_market_decline: f64,
    pub vix_peak: f64,
    pub curve: Vec<(u32, f64)>,
}

pub fn default_black_swan_events() -> Vec<AppreciationPattern> {
    vec![
        AppreciationPattern {
            name: "COVID-19 Crash".into(),
            duration_days: 23,
            max_market_decline: -0.34,
            vix_peak: 82.0,
            curve: vec![(1, 2.0), (5, 8.0), (10, 15.0), (15, 12.0), (23, 8.0)],
        },
        AppreciationPattern {
            name: "2008 Financial Crisis".into(),
            duration_days: 180,
            max_market_decline: -0.57,
            vix_peak: 80.0,
            curve: vec![(1, 1.5), (30, 3.0), (60, 8.0), (120, 12.0), (180, 5.0)],
        },
    ]
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PatternAnalysis {
    pub name: String,
    pub peak_appreciation: f64,
    pub peak_day: u32,
    pub appreciation_curve: Vec<(u32, f64)>,
    pub good_exit_opportunities: Vec<(u32, f64)>,
    pub recommended_strategy: &'static str,
    pub volatility_mean_reversion_risk: RiskLevel,
    pub liquidity_risk: RiskLevel,
    pub timing_sensitivity: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BlackSwanAnalysis {
    pub patterns: Vec<PatternAnalysis>,
    pub median_peak_appreciation: f64,
    pub typical_peak_timing: &'static str,
    pub key_profit_taking_levels: [f64; 3],
    pub recommended_exit_strategy: &'static str,
}

/// Peak, exit windows (>= 5x) and risk grades per crisis curve.
pub fn black_swan_patterns(events: &[AppreciationPattern]) -> BlackSwanAnalysis {
    let patterns: Vec<PatternAnalysis> = events
        .iter()
        .map(|event| {
            let (peak_day, peak_appreciation) = event
                .curve
                .iter()
                .copied()
                .fold((0, 0.0), |best, point| if point.1 > best.1 { point } else { best });

            PatternAnalysis {
                name: event.name.clone(),
                peak_appreciation,
                peak_day,
                appreciation_curve: event.curve.clone(),
                good_exit_opportunities: event
                    .curve
                    .iter()
                    .copied()
                    .filter(|&(_, m)| m >= GOOD_EXIT_MULTIPLE)
                    .collect(),
                recommended_strategy: "Partial exits at 5x, 10x, and 15x levels",
                volatility_mean_reversion_risk: if event.duration_days < 30 { RiskLevel::High } else { RiskLevel::Medium },
                liquidity_risk: if peak_appreciation > 10.0 { RiskLevel::High } else { RiskLevel::Medium },
                timing_sensitivity: if peak_appreciation > 15.0 { RiskLevel::High } else { RiskLevel::Medium },
            }
        })
        .collect();

    let mut peaks: Vec<f64> = patterns.iter().map(|p| p.peak_appreciation).collect();
    peaks.sort_by(f64::total_cmp);
    let median_peak_appreciation = match peaks.len() {
        0 => 0.0,
        n if n % 2 == 1 => peaks[n / 2],
        n => 0.5 * (peaks[n / 2 - 1] + peaks[n / 2]),
    };

    BlackSwanAnalysis {
        patterns,
        median_peak_appreciation,
        typical_peak_timing: "Days 5-15 for short-term events, Days 60-120 for extended events",
        key_profit_taking_levels: [5.0, 10.0, 15.0],
        recommended_exit_strategy: "Staged exits: 25% at 5x, 35% at 10x, 40% at 15x",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32, vix: f64, index_return: f64) -> HistoricalObservation {
        HistoricalObservation { date: NaiveDate::from_ymd_opt(y, m, d).unwrap(), vix, index_return }
    }

    fn covid_history() -> Vec<HistoricalObservation> {
        vec![
            day(2020, 2, 19, 14.4, 0.005),
            day(2020, 2, 24, 25.0, -0.034),
            day(2020, 2, 27, 39.2, -0.044),
            day(2020, 3, 9, 54.5, -0.076),
            day(2020, 3, 16, 82.7, -0.12),
            day(2020, 3, 23, 61.6, -0.029),
        ]
    }

    #[test]
    fn test_windows_library() {
        let w = historical_stress_windows();
        assert_eq!(w.len(), 4);
        assert!(w[0].contains(NaiveDate::from_ymd_opt(2020, 3, 16).unwrap()));
        assert!(!w[0].contains(NaiveDate::from_ymd_opt(2020, 2, 19).unwrap()));
    }

    #[test]
    fn test_covid_replay() {
        let m = ExitStrategyManager::default();
        let sims = m.simulate_early_exits(&covid_history());
        // Only the COVID window has data
        assert_eq!(sims.len(), 1);
        let covid = &sims[0];
        assert_eq!(covid.event_name, "COVID-19 Crash");
        // (1 + 67.7/10) * (1 + 0.12 * 20)
        assert!((covid.peak_pnl_multiple - 7.77 * 3.4).abs() < 1e-9);
        assert!(covid.total_exit_opportunities >= 3);
        assert!(covid.best_exit_pnl > 1.5);
        assert!(covid.exit_timeline.iter().all(|e| e.exit_percentage > 0.0));
    }

    #[test]
    fn test_no_history_no_scenarios() {
        let sims = ExitStrategyManager::default().simulate_early_exits(&[]);
        assert!(sims.is_empty());
        let impact = profit_realization_impact(&sims, 5_000.0);
        assert_eq!(impact.net_annual_cost, 5_000.0);
        assert_eq!(impact.break_even_probability, 0.0);
    }

    #[test]
    fn test_profit_realization() {
        let sim = |best: f64| EventSimulation {
            event_name: "x".into(),
            peak_pnl_multiple: best,
            total_exit_opportunities: 1,
            best_exit_pnl: best,
            exit_timeline: Vec::new(),
        };
        let impact = profit_realization_impact(&[sim(5.0), sim(1.2)], 1_000.0);
        // (5 - 1) * 0.5 / 2 scenarios
        assert!((impact.average_annual_profit_realization - 1.0).abs() < 1e-12);
        assert!((impact.annual_cost_reduction - 1_000.0).abs() < 1e-9);
        assert_eq!(impact.profitable_scenario_count, 1);
        assert!((impact.break_even_probability - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_black_swan_patterns() {
        let a = black_swan_patterns(&default_black_swan_events());
        assert_eq!(a.patterns.len(), 2);
        let covid = &a.patterns[0];
        assert_eq!((covid.peak_day, covid.peak_appreciation), (10, 15.0));
        assert_eq!(covid.good_exit_opportunities.len(), 4);
        assert_eq!(covid.volatility_mean_reversion_risk, RiskLevel::High);
        assert_eq!(covid.timing_sensitivity, RiskLevel::Medium);
        assert!((a.median_peak_appreciation - 13.5).abs() < 1e-12);
    }
}
