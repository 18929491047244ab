//! Maker agent entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sportex_maker::api::{create_router, AppState};
use sportex_maker::config::Config;
use sportex_maker::market::{ExchangeClient, ReferenceData};
use sportex_maker::metrics;
use sportex_maker::utils::shutdown_signal;
use sportex_maker::MakerAgent;

/// Maker agent for two-way sports betting markets.
#[derive(Parser, Debug)]
#[command(name = "sportex-maker")]
#[command(about = "Automated maker agent for a P2P sports betting exchange")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port for the operator API.
    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the maker agent (default).
    Run {
        /// HTTP server port for the operator API.
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Walk the reference data: sports, leagues, fixtures, markets.
    Markets {
        /// Sport id to drill into; lists sports when omitted.
        #[arg(long)]
        sport: Option<String>,
        /// League id to drill into.
        #[arg(long)]
        league: Option<String>,
        /// Fixture id to drill into.
        #[arg(long)]
        fixture: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("sportex_maker=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Initialize metrics
    metrics::init_metrics();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::Markets { sport, league, fixture }) => {
            cmd_markets(sport, league, fixture).await
        }
        Some(Command::Run { port }) => cmd_run(port).await,
        None => cmd_run(args.port).await,
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("SPORTEX MAKER - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  API URL: {}", config.exchange_api_url);
    println!("  WS URL: {}", config.exchange_ws_url);
    println!("  Maker Address: {}", config.maker_address);
    println!("  Odds Unit: {}", config.odds_unit);
    println!("  Ladder Step: {}", config.ladder_step);
    println!("  Stake Unit: {}", config.stake_unit);
    println!("  Complete Fraction: {}", config.complete_fraction);
    println!("  Min Order Update Interval: {}ms", config.min_order_update_interval_ms);
    println!("  Poll Interval: {}s", config.poll_interval_secs);
    println!("  Max Retries: {}", config.max_retries);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Walk the reference data tree.
async fn cmd_markets(
    sport: Option<String>,
    league: Option<String>,
    fixture: Option<String>,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let refdata = ReferenceData::new(ExchangeClient::new(&config));

    let records = if let Some(fixture_id) = fixture {
        println!("Markets for fixture {}:", fixture_id);
        refdata.list_markets(&fixture_id).await?
    } else if let Some(league_id) = league {
        println!("Fixtures for league {}:", league_id);
        refdata.list_fixtures(&league_id).await?
    } else if let Some(sport_id) = sport {
        println!("Leagues for sport {}:", sport_id);
        refdata.list_leagues(&sport_id).await?
    } else {
        println!("Sports:");
        refdata.list_sports().await?
    };

    for record in records {
        println!("  {}  {}", record.id, record.label);
    }

    Ok(())
}

/// Run the maker agent with the HTTP operator API.
async fn cmd_run(port: u16) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!("Configuration loaded successfully");
    info!("Venue: {}", config.exchange_api_url);
    info!("Maker: {}", config.maker_address);

    // Build the agent and its collaborators
    let agent = MakerAgent::new(&config)?;
    let refdata = Arc::new(ReferenceData::new(ExchangeClient::new(&config)));

    let app_state = AppState::new(agent.clone(), Some(refdata));
    app_state.set_ready(true);

    // Start the operator API
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Operator API listening on {}", addr);

    let router = create_router(app_state);

    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    info!("========================================");
    info!("SPORTEX MAKER STARTED");
    info!("========================================");

    // Positions arrive through the operator API; nothing to do here but
    // wait for shutdown and unwind cleanly.
    shutdown_signal().await;

    info!("Shutting down...");
    agent.shutdown().await;

    let _ = server.await;

    info!("========================================");
    info!("SHUTDOWN COMPLETE");
    info!("========================================");

    Ok(())
}
