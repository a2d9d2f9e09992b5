//! Jump-diffusion calibration against observed option prices.
//!
//! Minimizes mean-squared pricing error over (lambda, mu_j, delta, sigma)
//! with a bounded Nelder-Mead simplex. Every trial point is clamped into the
//! parameter box, so the objective is never evaluated outside it.
//!
//! Runs a bounded number of iterations and always terminates with usable
//! parameters: on empty input, non-finite market data, or non-convergence
//! the prior is returned unchanged.

use crate::models::jump_diffusion::{self, JumpDiffusionParams, JumpDiffusionPricer};
use crate::models::OptionInputs;
use crate::state::{OptionContract, OptionType};
use chrono::NaiveDate;
use tracing::{debug, warn};

const DIM: usize = 4;
const MAX_ITERATIONS: usize = 2_000;
const F_TOLERANCE: f64 = 1e-10;
const X_TOLERANCE: f64 = 1e-6;

// Standard simplex coefficients
const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Initial simplex edge as a fraction of each parameter's box width.
const INITIAL_STEP: f64 = 0.05;

type Point = [f64; DIM];

/// One observed option price at (strike, expiry).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarketQuote {
    pub strike: f64,
    pub ttl_years: f64,
    pub price: f64,
}

impl MarketQuote {
    #[inline]
    fn is_usable(&self) -> bool {
        self.strike > 0.0
            && self.ttl_years > 0.0
            && self.price >= 0.0
            && self.strike.is_finite()
            && self.ttl_years.is_finite()
            && self.price.is_finite()
    }
}

/// Box constraints, ordered (intensity, jump mean, jump vol, diffusion vol).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationBounds {
    pub lower: [f64; DIM],
    pub upper: [f64; DIM],
}

impl Default for CalibrationBounds {
    fn default() -> Self {
        Self {
            lower: [0.001, -0.5, 0.01, 0.05],
            upper: [1.0, 0.2, 1.0, 1.0],
        }
    }
}

impl CalibrationBounds {
    #[inline]
    fn clamp(&self, x: Point) -> Point {
        let mut out = x;
        for i in 0..DIM {
            out[i] = x[i].clamp(self.lower[i], self.upper[i]);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CalibrationOutcome {
    pub params: JumpDiffusionParams,
    pub converged: bool,
    pub iterations: usize,
    /// Mean-squared pricing error at `params`.
    pub objective: f64,
    /// Mean-squared pricing error at the prior.
    pub prior_objective: f64,
}

#[inline]
fn to_point(p: &JumpDiffusionParams) -> Point {
    [p.jump_intensity, p.jump_mean, p.jump_vol, p.diffusion_vol]
}

#[inline]
fn from_point(x: &Point) -> JumpDiffusionParams {
    JumpDiffusionParams::new(x[0], x[1], x[2], x[3])
}

/// Mean-squared pricing error. Non-finite values map to +inf so the
/// simplex moves away from them.
fn mean_squared_error(
    params: &JumpDiffusionParams,
    quotes: &[MarketQuote],
    spot: f64,
    rate: f64,
    option_type: OptionType,
) -> f64 {
    let sum: f64 = quotes
        .iter()
        .map(|q| {
            let model = jump_diffusion::price(
                &OptionInputs::new(spot, q.strike, q.ttl_years, rate, option_type),
                params,
            );
            let err = model - q.price;
            err * err
        })
        .sum();
    let mse = sum / quotes.len() as f64;
    if mse.is_finite() { mse } else { f64::INFINITY }
}

/// Fits jump-diffusion parameters to `quotes`, starting from `prior`.
pub fn calibrate(
    prior: &JumpDiffusionParams,
    quotes: &[MarketQuote],
    spot: f64,
    rate: f64,
    option_type: OptionType,
    bounds: &CalibrationBounds,
) -> CalibrationOutcome {
    let usable: Vec<MarketQuote> = quotes.iter().copied().filter(MarketQuote::is_usable).collect();

    let fallback = |objective: f64, iterations: usize| CalibrationOutcome {
        params: *prior,
        converged: false,
        iterations,
        objective,
        prior_objective: objective,
    };

    if usable.is_empty() || !(spot > 0.0) || !spot.is_finite() || !rate.is_finite() {
        warn!(
            quotes = quotes.len(),
            usable = usable.len(),
            "calibration skipped: no usable market prices, keeping prior"
        );
        return fallback(f64::NAN, 0);
    }

    let objective = |x: &Point| mean_squared_error(&from_point(x), &usable, spot, rate, option_type);
    let prior_objective = objective(&to_point(prior));

    let result = nelder_mead(&objective, bounds.clamp(to_point(prior)), bounds);

    if !result.converged || !(result.value <= prior_objective) {
        warn!(
            iterations = result.iterations,
            objective = result.value,
            prior_objective,
            "calibration did not converge, keeping prior"
        );
        return fallback(prior_objective, result.iterations);
    }

    let params = from_point(&result.best);
    debug!(
        iterations = result.iterations,
        mse = result.value,
        lambda = params.jump_intensity,
        mu_j = params.jump_mean,
        delta = params.jump_vol,
        sigma = params.diffusion_vol,
        "jump-diffusion calibrated"
    );

    CalibrationOutcome {
        params,
        converged: true,
        iterations: result.iterations,
        objective: result.value,
        prior_objective,
    }
}

impl JumpDiffusionPricer {
    /// New pricer fitted to market prices. Keeps this pricer's parameters
    /// when the fit fails.
    pub fn calibrate(
        &self,
        quotes: &[MarketQuote],
        spot: f64,
        rate: f64,
        option_type: OptionType,
    ) -> JumpDiffusionPricer {
        let outcome = calibrate(self.params(), quotes, spot, rate, option_type, &CalibrationBounds::default());
        JumpDiffusionPricer::new(outcome.params)
    }
}

/// Mid-price quotes from a listed chain, filtered to one option type.
/// Contracts without a two-sided market or already expired are skipped.
pub fn quotes_from_chain(chain: &[OptionContract], as_of: NaiveDate, option_type: OptionType) -> Vec<MarketQuote> {
    chain
        .iter()
        .filter(|c| c.option_type == option_type)
        .filter_map(|c| {
            let price = c.mid()?;
            let ttl_years = c.time_to_expiry(as_of);
            (ttl_years > 0.0).then_some(MarketQuote { strike: c.strike, ttl_years, price })
        })
        .collect()
}

// ── Simplex search ──

struct SimplexResult {
    best: Point,
    value: f64,
    iterations: usize,
    converged: bool,
}

fn nelder_mead(f: &impl Fn(&Point) -> f64, start: Point, bounds: &CalibrationBounds) -> SimplexResult {
    let eval = |x: &Point| {
        let v = f(x);
        if v.is_nan() { f64::INFINITY } else { v }
    };

    let mut simplex: Vec<(Point, f64)> = Vec::with_capacity(DIM + 1);
    simplex.push((start, eval(&start)));
    for i in 0..DIM {
        let step = INITIAL_STEP * (bounds.upper[i] - bounds.lower[i]);
        let mut x = start;
        x[i] = if start[i] + step <= bounds.upper[i] { start[i] + step } else { start[i] - step };
        let x = bounds.clamp(x);
        simplex.push((x, eval(&x)));
    }

    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let (best_x, best_f) = simplex[0];
        let worst_f = simplex[DIM].1;
        let diameter = simplex[1..]
            .iter()
            .flat_map(|(x, _)| x.iter().zip(best_x.iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);

        if (worst_f - best_f).abs() <= F_TOLERANCE * (1.0 + best_f.abs()) && diameter <= X_TOLERANCE {
            return SimplexResult { best: best_x, value: best_f, iterations, converged: true };
        }
        iterations += 1;

        let mut centroid = [0.0; DIM];
        for (x, _) in &simplex[..DIM] {
            for i in 0..DIM {
                centroid[i] += x[i] / DIM as f64;
            }
        }

        let (worst_x, _) = simplex[DIM];
        let toward = |from: &Point, to: &Point, coeff: f64| -> Point {
            let mut out = [0.0; DIM];
            for i in 0..DIM {
                out[i] = from[i] + coeff * (to[i] - from[i]);
            }
            bounds.clamp(out)
        };

        let reflected = toward(&centroid, &worst_x, -REFLECT);
        let reflected_f = eval(&reflected);

        if reflected_f < best_f {
            let expanded = toward(&centroid, &reflected, EXPAND);
            let expanded_f = eval(&expanded);
            simplex[DIM] = if expanded_f < reflected_f { (expanded, expanded_f) } else { (reflected, reflected_f) };
            continue;
        }

        if reflected_f < simplex[DIM - 1].1 {
            simplex[DIM] = (reflected, reflected_f);
            continue;
        }

        let (contracted, contracted_f, accept) = if reflected_f < worst_f {
            let c = toward(&centroid, &reflected, CONTRACT);
            let cf = eval(&c);
            (c, cf, cf <= reflected_f)
        } else {
            let c = toward(&centroid, &worst_x, CONTRACT);
            let cf = eval(&c);
            (c, cf, cf < worst_f)
        };

        if accept {
            simplex[DIM] = (contracted, contracted_f);
            continue;
        }

        // Shrink toward the best vertex
        for vertex in simplex.iter_mut().skip(1) {
            let x = toward(&best_x, &vertex.0, SHRINK);
            *vertex = (x, eval(&x));
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    SimplexResult { best: simplex[0].0, value: simplex[0].1, iterations, converged: false }
}
