use crate::models::{Greeks, OptionInputs, PricingModel};
use crate::state::OptionType;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Black-Scholes European option pricing.
///
/// put  = K e^{-rT} Phi(-d2) - S Phi(-d1)
/// call = S Phi(d1) - K e^{-rT} Phi(d2)
///
/// where d1 = (ln(S/K) + (r + sigma^2/2) T) / (sigma sqrt(T)), d2 = d1 - sigma sqrt(T).
///
/// Continuous-diffusion baseline the jump-diffusion premium is measured against.
pub struct BlackScholes {
    /// Annualized diffusion volatility
    pub sigma: f64,
}

impl BlackScholes {
    pub fn new(sigma: f64) -> Self {
        Self { sigma }
    }
}

impl PricingModel for BlackScholes {
    #[inline]
    fn name(&self) -> &'static str {
        "Black-Scholes"
    }

    #[inline]
    fn price(&self, inputs: &OptionInputs) -> f64 {
        price(inputs, self.sigma)
    }
}

#[inline]
fn standard_normal() -> Normal {
    Normal::standard()
}

#[inline]
fn d1_d2(inputs: &OptionInputs, sigma: f64) -> (f64, f64) {
    let sigma_sqrt_t = sigma * inputs.ttl_years.sqrt();
    let d1 = ((inputs.spot / inputs.strike).ln()
        + (inputs.rate + 0.5 * sigma * sigma) * inputs.ttl_years)
        / sigma_sqrt_t;
    (d1, d1 - sigma_sqrt_t)
}

/// Closed-form price. Zero/negative/non-finite volatility or time collapses
/// to intrinsic value. Never negative.
pub fn price(inputs: &OptionInputs, sigma: f64) -> f64 {
    if inputs.is_degenerate() || !(sigma > 0.0) || !sigma.is_finite() {
        return inputs.intrinsic();
    }

    let normal = standard_normal();
    let (d1, d2) = d1_d2(inputs, sigma);
    let discount = (-inputs.rate * inputs.ttl_years).exp();

    let p = match inputs.option_type {
        OptionType::Put => inputs.strike * discount * normal.cdf(-d2) - inputs.spot * normal.cdf(-d1),
        OptionType::Call => inputs.spot * normal.cdf(d1) - inputs.strike * discount * normal.cdf(d2),
    };

    if p.is_finite() { p.max(0.0) } else { inputs.intrinsic() }
}

/// Closed-form Greeks. Theta is per year, vega per unit of volatility,
/// rho per unit of rate. Degenerate inputs return all-zero Greeks except
/// an intrinsic delta.
pub fn greeks(inputs: &OptionInputs, sigma: f64) -> Greeks {
    if inputs.is_degenerate() || !(sigma > 0.0) || !sigma.is_finite() {
        let itm = inputs.intrinsic() > 0.0;
        let delta = match (inputs.option_type, itm) {
            (OptionType::Put, true) => -1.0,
            (OptionType::Call, true) => 1.0,
            _ => 0.0,
        };
        return Greeks { delta, ..Greeks::default() };
    }

    let normal = standard_normal();
    let (d1, d2) = d1_d2(inputs, sigma);
    let sqrt_t = inputs.ttl_years.sqrt();
    let discount = (-inputs.rate * inputs.ttl_years).exp();
    let pdf_d1 = normal.pdf(d1);

    let gamma = pdf_d1 / (inputs.spot * sigma * sqrt_t);
    let vega = inputs.spot * pdf_d1 * sqrt_t;
    let decay = -inputs.spot * pdf_d1 * sigma / (2.0 * sqrt_t);

    let (delta, theta, rho) = match inputs.option_type {
        OptionType::Put => (
            normal.cdf(d1) - 1.0,
            decay + inputs.rate * inputs.strike * discount * normal.cdf(-d2),
            -inputs.strike * inputs.ttl_years * discount * normal.cdf(-d2),
        ),
        OptionType::Call => (
            normal.cdf(d1),
            decay - inputs.rate * inputs.strike * discount * normal.cdf(d2),
            inputs.strike * inputs.ttl_years * discount * normal.cdf(d2),
        ),
    };

    Greeks { delta, gamma, theta, vega, rho, jump_delta: 0.0, jump_gamma: 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_value() {
        // S=100, K=100, T=1, r=5%, sigma=20%: call ~10.4506, put ~5.5735
        let call = price(&OptionInputs::new(100.0, 100.0, 1.0, 0.05, OptionType::Call), 0.2);
        let put = price(&OptionInputs::put(100.0, 100.0, 1.0, 0.05), 0.2);
        assert!((call - 10.4506).abs() < 1e-3, "call={call}");
        assert!((put - 5.5735).abs() < 1e-3, "put={put}");
    }

    #[test]
    fn test_put_call_parity() {
        let inputs = OptionInputs::put(420.0, 357.0, 0.25, 0.045);
        let put = price(&inputs, 0.22);
        let call = price(&OptionInputs { option_type: OptionType::Call, ..inputs }, 0.22);
        let parity = call - put - (420.0 - 357.0 * (-0.045_f64 * 0.25).exp());
        assert!(parity.abs() < 1e-8, "parity residual={parity}");
    }

    #[test]
    fn test_zero_vol_is_intrinsic() {
        let inputs = OptionInputs::put(90.0, 100.0, 0.5, 0.05);
        assert_eq!(price(&inputs, 0.0), 10.0);
        assert_eq!(price(&inputs, -0.3), 10.0);
    }

    #[test]
    fn test_put_greek_signs() {
        let g = greeks(&OptionInputs::put(400.0, 360.0, 0.25, 0.05), 0.18);
        assert!(g.delta < 0.0 && g.delta > -1.0, "delta={}", g.delta);
        assert!(g.gamma > 0.0);
        assert!(g.vega > 0.0);
        assert!(g.rho < 0.0);
    }

    #[test]
    fn test_model_trait() {
        let model = BlackScholes::new(0.2);
        assert_eq!(model.name(), "Black-Scholes");
        assert!(model.price(&OptionInputs::put(100.0, 95.0, 0.5, 0.03)) > 0.0);
    }
}
