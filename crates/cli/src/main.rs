use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use optionbot_broker::PaperBroker;
use optionbot_core::config_loader::ConfigLoader;
use optionbot_core::events::PriceTick;
use optionbot_engine::{EngineActor, EngineHandle, EngineMode, EngineState};
use optionbot_market::{ReplaySource, WsMarketData};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "optionbot")]
#[command(about = "Automated options trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a live trading session against a websocket tick feed
    Live {
        /// Config file path
        #[arg(short, long, default_value = "config/Optionbot.toml")]
        config: String,
        /// Websocket tick feed URL
        #[arg(long, env = "OPTIONBOT_WS_URL")]
        ws_url: String,
        /// Option contract expiry (defaults to the monthly expiry)
        #[arg(long)]
        expiry: Option<NaiveDate>,
    },
    /// Replay recorded ticks through the engine (market must be closed)
    Replay {
        /// Config file path
        #[arg(short, long, default_value = "config/Optionbot.toml")]
        config: String,
        /// JSON file with recorded ticks
        #[arg(short, long)]
        data: String,
        /// Replay speed multiplier (0 = as fast as possible)
        #[arg(long, default_value_t = 0.0)]
        speed: f64,
        /// Option contract expiry (defaults to the monthly expiry)
        #[arg(long)]
        expiry: Option<NaiveDate>,
    },
    /// Load the configuration and print the merged result
    Validate {
        /// Config file path
        #[arg(short, long, default_value = "config/Optionbot.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Live {
            config,
            ws_url,
            expiry,
        } => run_live(&config, &ws_url, expiry).await?,
        Commands::Replay {
            config,
            data,
            speed,
            expiry,
        } => run_replay(&config, &data, speed, expiry).await?,
        Commands::Validate { config } => run_validate(&config)?,
    }

    Ok(())
}

async fn run_live(config_path: &str, ws_url: &str, expiry: Option<NaiveDate>) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    info!(config_id = %config.config_id, ws_url, "starting live session");

    let market_data = Arc::new(WsMarketData::new(ws_url));
    let broker = Arc::new(PaperBroker::new());
    let (actor, handle) = EngineActor::new(Some(config), market_data, broker);
    let actor_task = tokio::spawn(actor.run());

    handle.start(EngineMode::Live, expiry).await?;

    let mut status_interval = tokio::time::interval(Duration::from_secs(30));
    status_interval.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            _ = status_interval.tick() => {
                log_status(&handle);
            }
        }
    }

    if let Err(error) = handle.stop().await {
        warn!(%error, "stop failed");
    }
    handle.shutdown().await?;
    actor_task.await.context("engine actor panicked")?;
    log_status(&handle);
    Ok(())
}

async fn run_replay(
    config_path: &str,
    data_path: &str,
    speed: f64,
    expiry: Option<NaiveDate>,
) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let raw = std::fs::read_to_string(data_path)
        .with_context(|| format!("reading tick data from {data_path}"))?;
    let ticks: Vec<PriceTick> =
        serde_json::from_str(&raw).with_context(|| format!("parsing tick data in {data_path}"))?;
    if ticks.is_empty() {
        bail!("no ticks in {data_path}");
    }
    info!(
        config_id = %config.config_id,
        ticks = ticks.len(),
        speed,
        "starting replay"
    );

    let market_data = Arc::new(ReplaySource::new(ticks, speed));
    let broker = Arc::new(PaperBroker::new());
    let (actor, handle) = EngineActor::new(Some(config), market_data, broker);
    let actor_task = tokio::spawn(actor.run());

    handle.start(EngineMode::Historical, expiry).await?;

    // The engine stops itself once the replay source runs dry.
    loop {
        let status = handle.status().await?;
        if status.state == EngineState::Stopped {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    handle.shutdown().await?;
    actor_task.await.context("engine actor panicked")?;

    let status = handle.last_status();
    println!(
        "replay finished: {} trades, realized P&L {}",
        status.performance.trades, status.performance.realized_pnl
    );
    for alert in &status.alerts {
        println!("[{:?}] {} {}", alert.kind, alert.at.format("%H:%M:%S"), alert.message);
    }
    Ok(())
}

fn run_validate(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn log_status(handle: &EngineHandle) {
    let status = handle.last_status();
    info!(
        state = ?status.state,
        phase = ?status.market_phase,
        major = ?status.trend_major.direction,
        minor = ?status.trend_minor.direction,
        open_positions = status.open_positions.len(),
        trades = status.performance.trades,
        realized_pnl = %status.performance.realized_pnl,
        "engine status"
    );
}
