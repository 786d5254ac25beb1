//! Prediction-market signal engine entry point.

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use strum::IntoEnumIterator;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use prediction_signals::api::{create_router, AppState};
use prediction_signals::config::Config;
use prediction_signals::delivery::{LogSink, SinkRegistry};
use prediction_signals::detector::SignalKind;
use prediction_signals::engine;
use prediction_signals::market::{
    KalshiSource, ListingScan, ListingSource, OpinionSource, PolymarketSource, Venue,
};
use prediction_signals::metrics;
use prediction_signals::utils::{format_ms, shutdown_signal, short_id};

/// Real-time signal detection for Polymarket, Kalshi and Opinion.
#[derive(Parser, Debug)]
#[command(name = "prediction-signals")]
#[command(about = "Real-time signal detection engine for prediction-market venues")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine (default).
    Run {
        /// HTTP server port for health/metrics, overriding PORT.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Run one listing scan of a venue (diagnostic).
    Listings {
        /// Venue to scan.
        #[arg(long)]
        venue: Venue,

        /// Rows printed.
        #[arg(long, default_value = "10")]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("prediction_signals=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(args.json.then(|| fmt::layer().json()))
        .with((!args.json).then(fmt::layer))
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Listings { venue, top }) => cmd_listings(venue, top).await,
        Some(Command::Run { port }) => cmd_run(port).await,
        None => cmd_run(None).await,
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }
    Ok(config)
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("PREDICTION SIGNALS - CONFIGURATION CHECK");
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

    let venues = config.enabled_venues()?;
    let disabled = config.disabled_detectors()?;
    let active: Vec<&str> = SignalKind::iter()
        .filter(|kind| !disabled.contains(kind))
        .map(|kind| kind.as_str())
        .collect();

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!(
        "  Venues: {}",
        venues.iter().map(Venue::as_str).collect::<Vec<_>>().join(", ")
    );
    println!("  Detectors: {}", active.join(", "));
    if !disabled.is_empty() {
        println!("  Disabled: {}", config.disabled_detectors);
    }
    println!("  Max Subscriptions: {} per venue", config.max_subscriptions);
    println!("  Listing Refresh: {}s", config.listing_refresh_secs);
    println!("  Cooldown: {}s", config.signal_cooldown_secs);
    println!("  Max Signals/Hour: {} per detector", config.max_signals_per_hour);
    println!("  Arb Min Profit: {}", config.arb_min_profit);
    println!(
        "  Price Cache: {} entries, stale after {}ms",
        config.price_cache_capacity, config.max_price_age_ms
    );
    println!("  HTTP Port: {}", config.port);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run one listing scan and print a summary.
async fn cmd_listings(venue: Venue, top: usize) -> anyhow::Result<()> {
    let config = load_config()?;
    let scan_config = config.scan_config();

    info!(venue = %venue, "Scanning listings...");
    let scan = match venue {
        Venue::Polymarket => PolymarketSource::new(scan_config)?.fetch_listings().await,
        Venue::Kalshi => KalshiSource::new(scan_config)?.fetch_listings().await,
        Venue::Opinion => OpinionSource::new(scan_config)?.fetch_listings().await,
    };
    print_scan(&scan, top);
    Ok(())
}

fn print_scan(scan: &ListingScan, top: usize) {
    println!("======================================================================");
    println!("{} LISTINGS", scan.venue.as_str().to_uppercase());
    println!("======================================================================");
    println!("  Listings: {}", scan.listings.len());
    println!("  Pages: {}", scan.pages);
    println!("  Complete: {}", scan.complete);
    if let Some(error) = &scan.error {
        println!("  Stopped: {}", error);
    }
    println!("----------------------------------------------------------------------");

    let mut rows: Vec<_> = scan.listings.iter().filter(|l| !l.closed).collect();
    rows.sort_by(|a, b| b.volume_24h.cmp(&a.volume_24h));
    for listing in rows.into_iter().take(top) {
        let title = listing
            .meta
            .title
            .as_deref()
            .or(listing.meta.slug.as_deref())
            .unwrap_or("-");
        let ends = listing.end_time_ms.map(format_ms).unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<24} vol ${:>12} ends {}  {}",
            short_id(&listing.market_id),
            listing.volume_24h.round_dp(0),
            ends,
            title
        );
    }
    println!("======================================================================");
}

/// Run the engine and the HTTP server until shutdown.
async fn cmd_run(port_override: Option<u16>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = load_config()?;
    let port = port_override.unwrap_or(config.port);

    // Initialize metrics
    let prometheus = metrics::install_prometheus().context("installing Prometheus recorder")?;
    metrics::init_metrics();

    let app_state = AppState::new(Some(prometheus));

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let router = create_router(app_state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .await
    });

    let mut sinks = SinkRegistry::new();
    sinks.register(Box::new(LogSink));

    let result = engine::run(config, app_state, sinks, shutdown_signal()).await;

    let _ = stop_tx.send(true);
    match server.await {
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    result.context("engine stopped with an error")
}
