use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use broker_trait::BrokerClient;
use offline_broker::OfflineBroker;
use tokio::signal::unix::SignalKind;

use trading_agent::config::EngineConfig;
use trading_agent::runner::{self, TradingEngine};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SMC_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".to_string());

    let config = match EngineConfig::load(&PathBuf::from(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_path, error = %e, "fatal configuration error");
            std::process::exit(2);
        }
    };
    tracing::info!(path = %config_path, "configuration loaded and validated");
    tracing::info!(
        symbols = %config.trading.symbols,
        timeframes = %config.trading.timeframes,
        risk_per_trade = config.trading.risk_per_trade,
        profile = ?config.execution.risk_profile,
        "engine parameters"
    );

    // The in-tree adapter is the offline collaborator; real terminals plug
    // in behind the same BrokerClient surface.
    if config.broker.login_id().ok().flatten().is_some() {
        tracing::warn!("broker credentials configured but only the offline adapter is linked");
    }
    let broker: Arc<dyn BrokerClient> = Arc::new(OfflineBroker::new());
    tracing::info!(broker = broker.broker_name(), "broker adapter ready");

    let mode = std::env::var("SMC_MODE").unwrap_or_else(|_| "live".to_string());
    let outcome = match mode.as_str() {
        "backtest" => runner::run_backtest(&config, broker).await,
        _ => run_live(config, broker).await,
    };

    match outcome {
        Ok(()) => {
            tracing::info!("normal shutdown");
        }
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            std::process::exit(1);
        }
    }
}

async fn run_live(config: EngineConfig, broker: Arc<dyn BrokerClient>) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));

    // SIGINT / SIGTERM set the flag; the loop observes it at the next
    // sleep-chunk boundary.
    {
        let shutdown = shutdown.clone();
        let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received SIGINT");
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM");
                }
            }
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    let mut engine = TradingEngine::new(config, broker, shutdown)?;
    engine.run().await?;

    let stats = engine.session_stats();
    tracing::info!(
        cycles = stats.cycles_run,
        signals = stats.signals_generated,
        executed = stats.signals_executed,
        rejections_quality = stats.rejections_quality,
        rejections_risk = stats.rejections_risk,
        rejections_broker = stats.rejections_broker,
        errors = stats.errors,
        "session summary"
    );
    Ok(())
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
