use tailguard::errors::{HedgeError, HedgeResult};
use tailguard::feeds::ConditionOverrides;
use tailguard::models::jump_diffusion::JumpDiffusionParams;
use tailguard::models::volatility::RegimeThresholds;
use tailguard::risk::triggers::{parse_trigger_kinds, ExitTriggerKind};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub portfolio_value: f64,
    /// Expiries in months, ascending.
    pub timeframes: Vec<u32>,
    /// OTM depths as fractions, ascending.
    pub otm_percentages: Vec<f64>,
    pub exit_triggers: Vec<ExitTriggerKind>,
    pub rolling_threshold_days: u32,
    pub overrides: ConditionOverrides,
    pub regime_thresholds: RegimeThresholds,
    pub max_single_exit: f64,
    pub min_position_remaining: f64,
    pub jump_params: JumpDiffusionParams,
}

impl AppConfig {
    pub fn from_env() -> HedgeResult<Self> {
        dotenvy::dotenv().ok();

        let portfolio_value = parse_f64("PORTFOLIO_VALUE", &env_var_or("PORTFOLIO_VALUE", "100000"))?;
        if !(portfolio_value > 0.0) {
            return Err(HedgeError::Config(format!("PORTFOLIO_VALUE: must be positive, got {portfolio_value}")));
        }

        let timeframes = parse_timeframes(&env_var_or("TIMEFRAMES", "2M,3M,6M"))?;
        let otm_percentages = parse_otm_percentages(&env_var_or("OTM_PERCENTAGES", "0.15,0.25,0.30,0.35"))?;
        let exit_triggers =
            parse_trigger_kinds(&env_var_or("EXIT_TRIGGERS", "vix_spike,portfolio_protection,profit_target"))?;

        let rolling_threshold_days = env_var_or("ROLLING_THRESHOLD_DAYS", "21")
            .parse::<u32>()
            .map_err(|e| HedgeError::Config(format!("ROLLING_THRESHOLD_DAYS: {e}")))?;

        let overrides = ConditionOverrides {
            vix: optional_f64("VIX_OVERRIDE")?,
            spot: optional_f64("SPY_OVERRIDE")?,
            risk_free_rate: optional_f64("RISK_FREE_RATE_OVERRIDE")?,
        };

        let regime_thresholds = env_var_or("REGIME_THRESHOLDS", "15,25,40").parse::<RegimeThresholds>()?;

        let max_single_exit = parse_f64("MAX_SINGLE_EXIT", &env_var_or("MAX_SINGLE_EXIT", "0.75"))?;
        let min_position_remaining = parse_f64("MIN_POSITION_REMAINING", &env_var_or("MIN_POSITION_REMAINING", "0.20"))?;
        for (key, v) in [("MAX_SINGLE_EXIT", max_single_exit), ("MIN_POSITION_REMAINING", min_position_remaining)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(HedgeError::Config(format!("{key}: must be within [0, 1], got {v}")));
            }
        }

        let defaults = JumpDiffusionParams::default();
        let jump_params = JumpDiffusionParams::new(
            parse_f64("JUMP_INTENSITY", &env_var_or("JUMP_INTENSITY", &defaults.jump_intensity.to_string()))?,
            parse_f64("JUMP_MEAN", &env_var_or("JUMP_MEAN", &defaults.jump_mean.to_string()))?,
            parse_f64("JUMP_VOL", &env_var_or("JUMP_VOL", &defaults.jump_vol.to_string()))?,
            parse_f64("DIFFUSION_VOL", &env_var_or("DIFFUSION_VOL", &defaults.diffusion_vol.to_string()))?,
        );

        Ok(Self {
            portfolio_value,
            timeframes,
            otm_percentages,
            exit_triggers,
            rolling_threshold_days,
            overrides,
            regime_thresholds,
            max_single_exit,
            min_position_remaining,
            jump_params,
        })
    }
}

/// "2M,3M,6M" or "2,3,6" -> months, sorted and deduplicated.
pub fn parse_timeframes(list: &str) -> HedgeResult<Vec<u32>> {
    let mut months = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|tf| {
            let upper = tf.to_ascii_uppercase();
            let digits = upper.strip_suffix('M').unwrap_or(&upper);
            match digits.parse::<u32>() {
                Ok(m) if m > 0 => Ok(m),
                Ok(_) => Err(HedgeError::Config(format!("TIMEFRAMES: invalid timeframe {tf:?}"))),
                Err(e) => Err(HedgeError::Config(format!("TIMEFRAMES: invalid timeframe {tf:?}: {e}"))),
            }
        })
        .collect::<HedgeResult<Vec<u32>>>()?;
    months.sort_unstable();
    months.dedup();
    if months.is_empty() {
        return Err(HedgeError::Config("TIMEFRAMES: empty".into()));
    }
    Ok(months)
}

/// "0.15,25%" -> [0.15, 0.25], sorted.
pub fn parse_otm_percentages(list: &str) -> HedgeResult<Vec<f64>> {
    let mut pcts = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|otm| {
            let value = match otm.strip_suffix('%') {
                Some(p) => p.trim().parse::<f64>().map(|v| v / 100.0),
                None => otm.parse::<f64>(),
            };
            value.map_err(|e| HedgeError::Config(format!("OTM_PERCENTAGES: invalid percentage {otm:?}: {e}")))
        })
        .collect::<HedgeResult<Vec<f64>>>()?;
    pcts.sort_by(f64::total_cmp);
    if pcts.is_empty() {
        return Err(HedgeError::Config("OTM_PERCENTAGES: empty".into()));
    }
    Ok(pcts)
}

fn parse_f64(key: &str, raw: &str) -> HedgeResult<f64> {
    raw.trim().parse::<f64>().map_err(|e| HedgeError::Config(format!("{key}: {e}")))
}

fn optional_f64(key: &str) -> HedgeResult<Option<f64>> {
    std::env::var(key).ok().map(|raw| parse_f64(key, &raw)).transpose()
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
