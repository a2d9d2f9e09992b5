use crate::errors::{HedgeError, HedgeResult};
use crate::models::{black_scholes, Greeks, OptionInputs, PricingModel};
use crate::state::OptionType;

/// Merton jump-diffusion European option pricing.
///
/// P = sum_{n=0}^{N} [e^{-lambda T} (lambda T)^n / n!] * BS(S, K, T, r_n, sigma_n)
///
/// where k        = e^{mu_j + delta^2/2} - 1   (expected relative jump size)
///       r_n      = r - lambda k + n ln(1 + k) / T
///       sigma_n^2 = sigma^2 + n delta^2 / T
///
/// Terms are weighted by the plain jump count distribution, Poisson(lambda T),
/// while each term discounts at its own r_n. Call and put prices therefore
/// do not satisfy put-call parity once lambda > 0. Series is truncated at the
/// first term past the Poisson mode whose weight drops below POISSON_CUTOFF,
/// or at MAX_TERMS.
const MAX_TERMS: usize = 50;
const POISSON_CUTOFF: f64 = 1e-10;

/// Finite-difference bump sizes.
const SPOT_BUMP: f64 = 0.001; // relative
const TIME_BUMP: f64 = 1.0 / 365.0;
const RATE_BUMP: f64 = 0.0001;
const VOL_BUMP: f64 = 0.001;
const INTENSITY_BUMP: f64 = 0.001;
const JUMP_VOL_BUMP: f64 = 0.001;

/// Jump volatility used when isolating the jump-size contribution.
const SMALL_JUMP_VOL: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JumpDiffusionParams {
    /// Expected jumps per year (lambda >= 0)
    pub jump_intensity: f64,
    /// Mean log jump size (negative = crash-biased)
    pub jump_mean: f64,
    /// Std dev of log jump size (delta > 0)
    pub jump_vol: f64,
    /// Continuous diffusion volatility (sigma > 0)
    pub diffusion_vol: f64,
}

impl Default for JumpDiffusionParams {
    /// Roughly one -5% jump per decade on top of 18% diffusion vol.
    fn default() -> Self {
        Self {
            jump_intensity: 0.1,
            jump_mean: -0.05,
            jump_vol: 0.15,
            diffusion_vol: 0.18,
        }
    }
}

impl JumpDiffusionParams {
    pub const fn new(jump_intensity: f64, jump_mean: f64, jump_vol: f64, diffusion_vol: f64) -> Self {
        Self { jump_intensity, jump_mean, jump_vol, diffusion_vol }
    }

    /// k = E[J - 1], the expected relative jump size.
    #[inline]
    pub fn expected_jump(&self) -> f64 {
        (self.jump_mean + 0.5 * self.jump_vol * self.jump_vol).exp() - 1.0
    }

    pub fn with_intensity(self, jump_intensity: f64) -> Self {
        Self { jump_intensity, ..self }
    }

    pub fn with_jump_mean(self, jump_mean: f64) -> Self {
        Self { jump_mean, ..self }
    }

    pub fn with_jump_vol(self, jump_vol: f64) -> Self {
        Self { jump_vol, ..self }
    }

    pub fn with_diffusion_vol(self, diffusion_vol: f64) -> Self {
        Self { diffusion_vol, ..self }
    }
}

/// Merton price for explicit parameters. Pure function.
pub fn price(inputs: &OptionInputs, params: &JumpDiffusionParams) -> f64 {
    let sigma = params.diffusion_vol;
    if inputs.is_degenerate() || !(sigma > 0.0) || !sigma.is_finite() {
        return inputs.intrinsic();
    }

    let lambda = if params.jump_intensity.is_finite() { params.jump_intensity.max(0.0) } else { 0.0 };
    let delta_sq = if params.jump_vol.is_finite() { params.jump_vol * params.jump_vol } else { 0.0 };

    // If jump intensity is negligible, this is plain Black-Scholes
    if lambda < 1e-12 {
        return black_scholes::price(inputs, sigma);
    }

    let t = inputs.ttl_years;
    let k = params.expected_jump();
    let log_one_plus_k = (1.0 + k).ln();
    let lambda_t = lambda * t;
    let base_rate = inputs.rate - lambda * k;
    let sigma_sq = sigma * sigma;

    let mut total = 0.0;
    let mut weight = (-lambda_t).exp(); // n = 0

    for n in 0..=MAX_TERMS {
        if n > 0 {
            weight *= lambda_t / n as f64;
        }
        if (n as f64) > lambda_t && weight < POISSON_CUTOFF {
            break;
        }

        let nf = n as f64;
        let rate_n = base_rate + nf * log_one_plus_k / t;
        let sigma_n = (sigma_sq + nf * delta_sq / t).sqrt();
        let term_inputs = OptionInputs { rate: rate_n, ..*inputs };

        total += weight * black_scholes::price(&term_inputs, sigma_n);
    }

    if total.is_finite() { total.max(0.0) } else { inputs.intrinsic() }
}

/// Jump premium over the continuous-diffusion baseline, decomposed.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RiskPremium {
    pub jd_price: f64,
    pub bs_price: f64,
    pub absolute_premium: f64,
    /// (jd - bs) / bs, zero when bs is zero
    pub relative_premium: f64,
    /// jd price minus the price with no jumps
    pub frequency_contribution: f64,
    /// jd price minus the price with zero-mean, small jumps
    pub size_contribution: f64,
}

/// One named preset in the stress library.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressScenario {
    pub name: &'static str,
    pub params: JumpDiffusionParams,
}

/// Fixed scenario library, calm to crisis.
pub const STRESS_SCENARIOS: [StressScenario; 4] = [
    StressScenario { name: "Normal Market", params: JumpDiffusionParams::new(0.05, -0.02, 0.10, 0.18) },
    StressScenario { name: "Moderate Stress", params: JumpDiffusionParams::new(0.15, -0.05, 0.15, 0.22) },
    StressScenario { name: "High Stress", params: JumpDiffusionParams::new(0.25, -0.08, 0.20, 0.30) },
    StressScenario { name: "Crisis Mode", params: JumpDiffusionParams::new(0.50, -0.12, 0.30, 0.45) },
];

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub parameters: JumpDiffusionParams,
    pub jump_diffusion_put: f64,
    pub jump_diffusion_call: f64,
    pub black_scholes_put: f64,
    pub black_scholes_call: f64,
    pub put_premium: f64,
    pub call_premium: f64,
    pub put_greeks: Greeks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum JumpRiskSignificance {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ReportCell {
    /// e.g. "90d"
    pub expiry_key: String,
    /// e.g. "-10.0%_OTM"
    pub strike_key: String,
    pub strike: f64,
    pub ttl_years: f64,
    pub jump_diffusion_price: f64,
    pub black_scholes_price: f64,
    pub price_ratio: f64,
    pub greeks: Greeks,
    pub risk_premium: RiskPremium,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ReportSummary {
    pub average_risk_premium: f64,
    pub jump_risk_significance: JumpRiskSignificance,
    pub model_recommendation: &'static str,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct JumpDiffusionReport {
    pub model_parameters: JumpDiffusionParams,
    pub put_analysis: Vec<ReportCell>,
    pub scenario_analysis: Vec<ScenarioResult>,
    pub summary: ReportSummary,
}

/// Merton pricer bound to one parameter set. Recalibration produces a new
/// parameter set rather than mutating this one.
#[derive(Debug, Clone, Default)]
pub struct JumpDiffusionPricer {
    params: JumpDiffusionParams,
}

impl JumpDiffusionPricer {
    pub fn new(params: JumpDiffusionParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &JumpDiffusionParams {
        &self.params
    }

    /// Continuous-diffusion baseline at this pricer's diffusion vol.
    #[inline]
    pub fn black_scholes_price(&self, inputs: &OptionInputs) -> f64 {
        black_scholes::price(inputs, self.params.diffusion_vol)
    }

    /// Finite-difference Greeks of the Merton price.
    pub fn greeks(&self, inputs: &OptionInputs) -> Greeks {
        greeks(inputs, &self.params)
    }

    pub fn risk_premium(&self, inputs: &OptionInputs) -> RiskPremium {
        let p = &self.params;
        let jd_price = price(inputs, p);
        let bs_price = self.black_scholes_price(inputs);
        let absolute_premium = jd_price - bs_price;
        let relative_premium = if bs_price > 0.0 { absolute_premium / bs_price } else { 0.0 };

        let no_jumps = price(inputs, &p.with_intensity(0.0));
        let small_jumps = price(inputs, &p.with_jump_mean(0.0).with_jump_vol(SMALL_JUMP_VOL));

        RiskPremium {
            jd_price,
            bs_price,
            absolute_premium,
            relative_premium,
            frequency_contribution: jd_price - no_jumps,
            size_contribution: jd_price - small_jumps,
        }
    }

    /// Prices the contract under every preset of the stress library.
    pub fn scenarios(&self, spot: f64, strike: f64, ttl_years: f64, rate: f64) -> Vec<ScenarioResult> {
        self.scenarios_with(&STRESS_SCENARIOS, spot, strike, ttl_years, rate)
    }

    pub fn scenarios_with(
        &self,
        library: &[StressScenario],
        spot: f64,
        strike: f64,
        ttl_years: f64,
        rate: f64,
    ) -> Vec<ScenarioResult> {
        let put = OptionInputs::put(spot, strike, ttl_years, rate);
        let call = OptionInputs { option_type: OptionType::Call, ..put };

        library
            .iter()
            .map(|scenario| {
                let p = &scenario.params;
                let jd_put = price(&put, p);
                let jd_call = price(&call, p);
                let bs_put = black_scholes::price(&put, p.diffusion_vol);
                let bs_call = black_scholes::price(&call, p.diffusion_vol);

                ScenarioResult {
                    name: scenario.name.to_string(),
                    parameters: *p,
                    jump_diffusion_put: jd_put,
                    jump_diffusion_call: jd_call,
                    black_scholes_put: bs_put,
                    black_scholes_call: bs_call,
                    put_premium: if bs_put > 0.0 { (jd_put - bs_put) / bs_put } else { 0.0 },
                    call_premium: if bs_call > 0.0 { (jd_call - bs_call) / bs_call } else { 0.0 },
                    put_greeks: greeks(&put, p),
                }
            })
            .collect()
    }

    /// Put analysis over a strike x expiry grid plus the stress library at
    /// the first strike and expiry.
    pub fn report(
        &self,
        spot: f64,
        strikes: &[f64],
        expiries_years: &[f64],
        rate: f64,
    ) -> HedgeResult<JumpDiffusionReport> {
        let (Some(&first_strike), Some(&first_expiry)) = (strikes.first(), expiries_years.first()) else {
            return Err(HedgeError::InvalidInput(
                "jump-diffusion report needs at least one strike and one expiry".into(),
            ));
        };

        let mut cells = Vec::with_capacity(strikes.len() * expiries_years.len());
        for &t in expiries_years {
            for &k in strikes {
                let inputs = OptionInputs::put(spot, k, t, rate);
                let risk_premium = self.risk_premium(&inputs);
                let otm = (k - spot) / spot;
                cells.push(ReportCell {
                    expiry_key: format!("{}d", (t * 365.0).round() as i64),
                    strike_key: format!("{:.1}%_OTM", otm * 100.0),
                    strike: k,
                    ttl_years: t,
                    jump_diffusion_price: risk_premium.jd_price,
                    black_scholes_price: risk_premium.bs_price,
                    price_ratio: if risk_premium.bs_price > 0.0 {
                        risk_premium.jd_price / risk_premium.bs_price
                    } else {
                        0.0
                    },
                    greeks: self.greeks(&inputs),
                    risk_premium,
                });
            }
        }

        let average_risk_premium =
            cells.iter().map(|c| c.risk_premium.relative_premium).sum::<f64>() / cells.len() as f64;

        let jump_risk_significance = if average_risk_premium > 0.2 {
            JumpRiskSignificance::High
        } else if average_risk_premium > 0.1 {
            JumpRiskSignificance::Medium
        } else {
            JumpRiskSignificance::Low
        };

        Ok(JumpDiffusionReport {
            model_parameters: self.params,
            put_analysis: cells,
            scenario_analysis: self.scenarios(spot, first_strike, first_expiry, rate),
            summary: ReportSummary {
                average_risk_premium,
                jump_risk_significance,
                model_recommendation: model_recommendation(average_risk_premium),
            },
        })
    }
}

impl PricingModel for JumpDiffusionPricer {
    #[inline]
    fn name(&self) -> &'static str {
        "Jump-Diffusion"
    }

    #[inline]
    fn price(&self, inputs: &OptionInputs) -> f64 {
        price(inputs, &self.params)
    }
}

/// Finite-difference Greeks for explicit parameters.
///
/// Central differences in spot, forward differences elsewhere. Theta is the
/// value change from one day passing, annualized: (P(T - dt) - P(T)) / dt.
/// A decaying long option has negative theta, the opposite sign of a
/// "decay per year" figure.
pub fn greeks(inputs: &OptionInputs, params: &JumpDiffusionParams) -> Greeks {
    if inputs.is_degenerate() || !(params.diffusion_vol > 0.0) {
        return black_scholes::greeks(inputs, 0.0);
    }

    let base = price(inputs, params);

    let ds = inputs.spot * SPOT_BUMP;
    let up = price(&OptionInputs { spot: inputs.spot + ds, ..*inputs }, params);
    let down = price(&OptionInputs { spot: inputs.spot - ds, ..*inputs }, params);
    let delta = (up - down) / (2.0 * ds);
    // Mixture of convex payoffs: anything below zero is rounding noise
    let gamma = ((up - 2.0 * base + down) / (ds * ds)).max(0.0);

    let dt = TIME_BUMP.min(inputs.ttl_years);
    let theta = if dt > 0.0 {
        let decayed = price(&OptionInputs { ttl_years: inputs.ttl_years - dt, ..*inputs }, params);
        (decayed - base) / dt
    } else {
        0.0
    };

    let rate_up = price(&OptionInputs { rate: inputs.rate + RATE_BUMP, ..*inputs }, params);
    let rho = (rate_up - base) / RATE_BUMP;

    let vol_up = price(inputs, &params.with_diffusion_vol(params.diffusion_vol + VOL_BUMP));
    let vega = ((vol_up - base) / VOL_BUMP).max(0.0);

    let intensity_up = price(inputs, &params.with_intensity(params.jump_intensity + INTENSITY_BUMP));
    let jump_delta = (intensity_up - base) / INTENSITY_BUMP;

    let jump_vol_up = price(inputs, &params.with_jump_vol(params.jump_vol + JUMP_VOL_BUMP));
    let jump_gamma = (jump_vol_up - base) / JUMP_VOL_BUMP;

    Greeks { delta, gamma, theta, vega, rho, jump_delta, jump_gamma }
}

fn model_recommendation(avg_risk_premium: f64) -> &'static str {
    if avg_risk_premium > 0.3 {
        "Jump risk is significant. Use jump-diffusion pricing for all tail hedging analysis."
    } else if avg_risk_premium > 0.15 {
        "Moderate jump risk detected. Jump-diffusion pricing recommended for OTM options."
    } else if avg_risk_premium > 0.05 {
        "Low jump risk. Black-Scholes adequate for most cases; use jump-diffusion for stress testing."
    } else {
        "Minimal jump risk detected. Standard Black-Scholes pricing should be sufficient."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tail_put() -> OptionInputs {
        OptionInputs::put(400.0, 360.0, 0.25, 0.05)
    }

    #[test]
    fn test_no_jumps_matches_bs() {
        let params = JumpDiffusionParams::default().with_intensity(0.0);
        let inputs = tail_put();
        let jd = price(&inputs, &params);
        let bs = black_scholes::price(&inputs, params.diffusion_vol);
        assert!((jd - bs).abs() < 1e-12, "JD with no jumps ({jd}) should match BS ({bs})");
    }

    #[test]
    fn test_tail_put_prices_above_bs() {
        let pricer = JumpDiffusionPricer::default();
        let inputs = tail_put();
        let jd = pricer.price(&inputs);
        let bs = pricer.black_scholes_price(&inputs);
        assert!(bs > 0.0, "bs={bs}");
        assert!(jd >= bs, "jd={jd} should be >= bs={bs}");
    }

    #[test]
    fn test_tail_put_greek_signs() {
        let g = JumpDiffusionPricer::default().greeks(&tail_put());
        assert!(g.delta < 0.0, "delta={}", g.delta);
        assert!(g.gamma > 0.0, "gamma={}", g.gamma);
        assert!(g.vega > 0.0, "vega={}", g.vega);
        assert!(g.theta < 0.0, "theta={}", g.theta);
        assert!(g.jump_delta > 0.0, "more crashes should raise put value: {}", g.jump_delta);
    }

    /// Explicit Poisson(lambda T) mixture, summed far past any cutoff.
    fn reference_sum(inputs: &OptionInputs, params: &JumpDiffusionParams) -> f64 {
        let t = inputs.ttl_years;
        let lambda_t = params.jump_intensity * t;
        let k = params.expected_jump();
        let mut total = 0.0;
        let mut log_factorial = 0.0;
        for n in 0..80 {
            if n > 0 {
                log_factorial += (n as f64).ln();
            }
            let nf = n as f64;
            let weight = (-lambda_t + nf * lambda_t.ln() - log_factorial).exp();
            let rate_n = inputs.rate - params.jump_intensity * k + nf * (1.0 + k).ln() / t;
            let sigma_n = (params.diffusion_vol.powi(2) + nf * params.jump_vol.powi(2) / t).sqrt();
            total += weight * black_scholes::price(&OptionInputs { rate: rate_n, ..*inputs }, sigma_n);
        }
        total
    }

    #[test]
    fn test_price_matches_poisson_mixture() {
        let inputs = OptionInputs::put(420.0, 357.0, 0.25, 0.045);
        for (params, expected) in [
            (JumpDiffusionParams::default(), 0.550167),
            (JumpDiffusionParams::new(1.0, -0.3, 0.15, 0.18), 13.415223),
        ] {
            let jd = price(&inputs, &params);
            let reference = reference_sum(&inputs, &params);
            assert!((jd - reference).abs() < 1e-7 * (1.0 + reference), "jd={jd} reference={reference}");
            assert!((jd - expected).abs() < 1e-4 * expected, "jd={jd} expected~{expected}");
        }
    }

    #[test]
    fn test_put_call_parity_does_not_hold_with_jumps() {
        let params = JumpDiffusionParams::new(1.0, -0.3, 0.15, 0.18);
        let (spot, strike, t, r) = (420.0, 357.0, 0.25, 0.045);
        let call = price(&OptionInputs::new(spot, strike, t, r, OptionType::Call), &params);
        let put = price(&OptionInputs::put(spot, strike, t, r), &params);
        let residual = call - put - (spot - strike * (-r * t).exp());
        assert!(residual.abs() > 1e-4, "parity residual={residual}");

        // Without jumps the pricer is Black-Scholes and parity is restored
        let no_jumps = params.with_intensity(0.0);
        let call = price(&OptionInputs::new(spot, strike, t, r, OptionType::Call), &no_jumps);
        let put = price(&OptionInputs::put(spot, strike, t, r), &no_jumps);
        assert!((call - put - (spot - strike * (-r * t).exp())).abs() < 1e-9);
    }

    #[test]
    fn test_theta_is_one_day_change_annualized() {
        let params = JumpDiffusionParams::default();
        let inputs = tail_put();
        let g = greeks(&inputs, &params);
        let dt = 1.0 / 365.0;
        let decayed = price(&OptionInputs { ttl_years: inputs.ttl_years - dt, ..inputs }, &params);
        let expected = (decayed - price(&inputs, &params)) / dt;
        assert!(g.theta < 0.0, "theta={}", g.theta);
        assert!((g.theta - expected).abs() < 1e-9 * (1.0 + expected.abs()), "theta={} expected={expected}", g.theta);
    }

    #[test]
    fn test_expired_is_intrinsic() {
        let params = JumpDiffusionParams::default();
        assert_eq!(price(&OptionInputs::put(300.0, 360.0, 0.0, 0.05), &params), 60.0);
        assert_eq!(price(&OptionInputs::put(400.0, 360.0, -0.1, 0.05), &params), 0.0);
    }

    #[test]
    fn test_bad_vol_is_intrinsic() {
        let inputs = OptionInputs::put(300.0, 360.0, 0.5, 0.05);
        assert_eq!(price(&inputs, &JumpDiffusionParams::default().with_diffusion_vol(0.0)), 60.0);
        assert_eq!(price(&inputs, &JumpDiffusionParams::default().with_diffusion_vol(-0.2)), 60.0);
        let g = greeks(&inputs, &JumpDiffusionParams::default().with_diffusion_vol(0.0));
        assert!(g.delta.is_finite() && g.gamma == 0.0);
    }

    #[test]
    fn test_risk_premium_decomposition() {
        let pricer = JumpDiffusionPricer::default();
        let rp = pricer.risk_premium(&tail_put());
        assert!(rp.relative_premium >= 0.0, "premium={}", rp.relative_premium);
        assert!((rp.absolute_premium - (rp.jd_price - rp.bs_price)).abs() < 1e-12);
        assert!(rp.frequency_contribution > 0.0);
    }

    #[test]
    fn test_scenarios_escalate() {
        let results = JumpDiffusionPricer::default().scenarios(420.0, 357.0, 2.0 / 12.0, 0.045);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].name, "Normal Market");
        assert_eq!(results[3].name, "Crisis Mode");
        assert!(results[3].jump_diffusion_put > results[0].jump_diffusion_put);
        assert!(results.iter().all(|r| r.put_premium >= -1e-9));
    }

    #[test]
    fn test_report_grid_and_summary() {
        let report = JumpDiffusionPricer::default()
            .report(400.0, &[360.0, 340.0], &[0.25, 0.5], 0.05)
            .unwrap();
        assert_eq!(report.put_analysis.len(), 4);
        assert_eq!(report.put_analysis[0].expiry_key, "91d");
        assert_eq!(report.put_analysis[0].strike_key, "-10.0%_OTM");
        assert_eq!(report.scenario_analysis.len(), 4);
        assert!(report.summary.average_risk_premium >= 0.0);
    }

    #[test]
    fn test_report_requires_grid() {
        let r = JumpDiffusionPricer::default().report(400.0, &[], &[0.25], 0.05);
        assert!(matches!(r, Err(HedgeError::InvalidInput(_))));
    }

    proptest! {
        #[test]
        fn prop_crash_biased_put_at_least_bs(
            spot in 50.0f64..1000.0,
            moneyness in 0.5f64..1.2,
            t in 0.02f64..2.0,
            r in 0.0f64..0.1,
            lambda in 0.01f64..1.0,
            mu in -0.5f64..-0.001,
            jump_vol in 0.01f64..0.6,
            sigma in 0.05f64..0.8,
        ) {
            let params = JumpDiffusionParams::new(lambda, mu, jump_vol, sigma);
            let inputs = OptionInputs::put(spot, spot * moneyness, t, r);
            let jd = price(&inputs, &params);
            let bs = black_scholes::price(&inputs, sigma);
            prop_assert!(jd.is_finite() && jd >= 0.0);
            prop_assert!(jd >= bs - 1e-9 * (1.0 + bs), "jd={} bs={}", jd, bs);
        }
    }
}
