mod config;

use tailguard::analysis::{ComparisonConfig, HedgeComparisonEngine, HedgingStrategy};
use tailguard::errors::HedgeResult;
use tailguard::feeds::{resolve_conditions, MarketDefaults, StaticMarketData};
use tailguard::models::jump_diffusion::JumpDiffusionPricer;
use tailguard::models::volatility::{RegimeConfig, VolatilityRegimeAnalyzer};
use tailguard::risk::exit::ExitConfig;
use tailguard::risk::triggers::strategy_triggers;

fn main() {
    // Structured logging to stderr; stdout carries the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("tailguard starting");

    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&cfg) {
        tracing::error!("comparison failed: {e}");
        std::process::exit(1);
    }
}

fn run(cfg: &config::AppConfig) -> HedgeResult<()> {
    let triggers = strategy_triggers(&cfg.exit_triggers);
    let strategies = cfg
        .timeframes
        .iter()
        .flat_map(|&months| cfg.otm_percentages.iter().map(move |&otm| (months, otm)))
        .map(|(months, otm)| {
            HedgingStrategy::new(months, otm, cfg.rolling_threshold_days)
                .map(|s| s.with_exit_triggers(triggers.clone()))
        })
        .collect::<HedgeResult<Vec<_>>>()?;

    tracing::info!(
        strategies = strategies.len(),
        portfolio_value = cfg.portfolio_value,
        "strategy grid built"
    );

    // No live feed is wired in; pinned overrides or documented defaults apply
    let source = StaticMarketData::new();
    let conditions = resolve_conditions(&source, &MarketDefaults::default(), &cfg.overrides);

    let exit_config = ExitConfig {
        max_single_exit: cfg.max_single_exit,
        min_position_remaining: cfg.min_position_remaining,
        ..ExitConfig::default()
    };
    let mut engine = HedgeComparisonEngine::new(
        ComparisonConfig::default(),
        JumpDiffusionPricer::new(cfg.jump_params),
        VolatilityRegimeAnalyzer::new(RegimeConfig::default().with_thresholds(cfg.regime_thresholds)),
        exit_config,
    );

    let result = engine.compare_strategies(&strategies, cfg.portfolio_value, &conditions, None)?;

    if let Some(primary) = &result.recommendations.primary_recommendation {
        tracing::info!(
            strategy = %primary.strategy_id,
            confidence = primary.confidence_score,
            regime = %result.current_volatility_regime,
            "primary recommendation"
        );
    }
    for warning in &result.recommendations.risk_warnings {
        tracing::warn!("{warning}");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
