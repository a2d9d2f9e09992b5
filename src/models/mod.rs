pub mod black_scholes;
pub mod calibration;
pub mod jump_diffusion;
pub mod volatility;

use crate::state::OptionType;

/// All option pricing models implement this trait.
/// price() must be a pure function: deterministic output from inputs only.
/// Send + Sync so a pricer can be shared across threads without locking.
pub trait PricingModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Present value of one option on one unit of the underlying.
    /// Never negative, never NaN. Degenerate inputs collapse to intrinsic value.
    fn price(&self, inputs: &OptionInputs) -> f64;
}

/// Contract-level inputs shared by every model. Stack-allocated, Copy.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct OptionInputs {
    pub spot: f64,
    pub strike: f64,
    /// Time to expiry in years.
    pub ttl_years: f64,
    pub rate: f64,
    pub option_type: OptionType,
}

impl OptionInputs {
    #[inline]
    pub fn new(spot: f64, strike: f64, ttl_years: f64, rate: f64, option_type: OptionType) -> Self {
        Self { spot, strike, ttl_years, rate, option_type }
    }

    #[inline]
    pub fn put(spot: f64, strike: f64, ttl_years: f64, rate: f64) -> Self {
        Self::new(spot, strike, ttl_years, rate, OptionType::Put)
    }

    #[inline]
    pub fn intrinsic(&self) -> f64 {
        self.option_type.intrinsic(self.spot, self.strike)
    }

    /// True when the inputs cannot be priced with a diffusion and the price
    /// must collapse to intrinsic value.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        !(self.ttl_years > 0.0)
            || !(self.spot > 0.0)
            || !(self.strike > 0.0)
            || !self.spot.is_finite()
            || !self.strike.is_finite()
            || !self.ttl_years.is_finite()
            || !self.rate.is_finite()
    }
}

/// Sensitivities of an option price. The jump fields are zero for models
/// without a jump component.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    /// Value change per year of calendar time passing (negative for long
    /// options that decay).
    pub theta: f64,
    /// Per unit of diffusion volatility.
    pub vega: f64,
    /// Per unit of rate.
    pub rho: f64,
    /// Sensitivity to jump intensity.
    pub jump_delta: f64,
    /// Sensitivity to jump-size volatility.
    pub jump_gamma: f64,
}

impl Greeks {
    /// Scales the exposure Greeks by a regime multiplier. Rho and the jump
    /// sensitivities are left untouched.
    pub fn scaled(&self, multiplier: f64) -> Self {
        Self {
            delta: self.delta * multiplier,
            gamma: self.gamma * multiplier,
            theta: self.theta * multiplier,
            vega: self.vega * multiplier,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_inputs() {
        assert!(OptionInputs::put(100.0, 90.0, 0.0, 0.05).is_degenerate());
        assert!(OptionInputs::put(100.0, 90.0, -1.0, 0.05).is_degenerate());
        assert!(OptionInputs::put(f64::NAN, 90.0, 0.5, 0.05).is_degenerate());
        assert!(!OptionInputs::put(100.0, 90.0, 0.5, 0.05).is_degenerate());
    }

    #[test]
    fn test_scaled_greeks_keep_rho() {
        let g = Greeks { delta: -0.1, gamma: 0.01, theta: -2.0, vega: 10.0, rho: -5.0, jump_delta: 3.0, jump_gamma: 1.0 };
        let s = g.scaled(1.5);
        assert!((s.delta + 0.15).abs() < 1e-12);
        assert_eq!(s.rho, -5.0);
        assert_eq!(s.jump_delta, 3.0);
    }
}
