//! Wires connections, background scans and the dispatch loop together.
//!
//! Every producer is a task in one [`JoinSet`] that watches the same
//! shutdown flag. The dispatch loop is the only place that mutates the
//! [`Engine`].

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{Engine, EngineInput};
use crate::api::AppState;
use crate::config::Config;
use crate::connection::{spawn_connection, ConnectionHandle};
use crate::delivery::SinkRegistry;
use crate::detector::SignalKind;
use crate::error::Result;
use crate::market::{
    KalshiSource, ListingScan, ListingSource, OpinionSource, PolymarketSource, RankedTrader, Venue,
};
use crate::utils::now_ms;

const INPUT_CAPACITY: usize = 4096;
const PUBLISH_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The running engine: producers plus the dispatch loop.
pub struct Runtime {
    config: Config,
    state: AppState,
    sinks: SinkRegistry,
}

impl Runtime {
    /// Create a runtime. `state` receives published snapshots; `sinks`
    /// receive every emitted signal.
    pub fn new(config: Config, state: AppState, sinks: SinkRegistry) -> Self {
        Self {
            config,
            state,
            sinks,
        }
    }

    /// Run until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Runtime {
            config,
            state,
            sinks,
        } = self;

        let venues = config.enabled_venues()?;
        let disabled = config.disabled_detectors()?;
        let mut engine = Engine::from_config(&config)?;
        let history_size = config.alert_history_size;

        let (input_tx, mut input_rx) = mpsc::channel(INPUT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        let mut handles: HashMap<Venue, ConnectionHandle> = HashMap::new();

        for &venue in &venues {
            let (handle, task) =
                spawn_connection(config.connection_config(venue), input_tx.clone(), shutdown_rx.clone());
            tasks.spawn(task.run());
            handles.insert(venue, handle);
        }

        let scans = ScanSchedule {
            listings: Duration::from_secs(config.listing_refresh_secs),
            closing_window: (!disabled.contains(&SignalKind::ClosingSoon))
                .then(|| Duration::from_secs(config.closing_soon_scan_interval_secs)),
        };
        let scan_config = config.scan_config();
        for &venue in &venues {
            match venue {
                Venue::Polymarket => {
                    let source = Arc::new(PolymarketSource::new(scan_config.clone())?);
                    spawn_listing_scans(&mut tasks, &source, &scans, &input_tx, &shutdown_rx);
                    if !disabled.contains(&SignalKind::SmartMoney) {
                        let tracker = SmartMoneyTracker {
                            source: Arc::clone(&source),
                            addresses: config.smart_money_addresses(),
                            top_n: config.smart_money_track_top_n,
                            every: Duration::from_secs(config.smart_money_scan_interval_secs),
                        };
                        tasks.spawn(tracker.run(input_tx.clone(), shutdown_rx.clone()));
                    }
                }
                Venue::Kalshi => {
                    let source = Arc::new(KalshiSource::new(scan_config.clone())?);
                    spawn_listing_scans(&mut tasks, &source, &scans, &input_tx, &shutdown_rx);
                }
                Venue::Opinion => {
                    let source = Arc::new(OpinionSource::new(scan_config.clone())?);
                    spawn_listing_scans(&mut tasks, &source, &scans, &input_tx, &shutdown_rx);
                }
            }
        }

        tasks.spawn(sweep_loop(
            Duration::from_secs(config.sweep_interval_secs),
            input_tx.clone(),
            shutdown_rx.clone(),
        ));
        drop(input_tx);

        info!(
            venues = ?venues,
            detectors = ?engine.detector_kinds(),
            tasks = tasks.len(),
            sinks = sinks.len(),
            "Engine running"
        );

        let mut publish = interval(PUBLISH_INTERVAL);
        publish.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                input = input_rx.recv() => {
                    let Some(input) = input else {
                        warn!("Every producer stopped");
                        break;
                    };
                    if let EngineInput::Connection { venue, state: connection } = &input {
                        state.set_connection(*venue, *connection);
                    }

                    let dispatch = engine.handle(input, now_ms());
                    let mut emitted = BTreeSet::new();
                    for signal in &dispatch.signals {
                        sinks.deliver_all(signal);
                        emitted.insert(signal.kind);
                    }
                    for kind in emitted {
                        state.publish_alerts(kind, engine.alert_history(kind, history_size));
                    }

                    if let Some((venue, ids)) = dispatch.desired {
                        if let Some(handle) = handles.get(&venue) {
                            if !handle.set_desired(ids).await {
                                warn!(venue = %venue, "Connection task stopped, subscriptions not forwarded");
                            }
                        }
                    }
                }
                _ = publish.tick() => {
                    state.publish(&engine, now_ms()).await;
                }
            }
        }

        let _ = shutdown_tx.send(true);
        drop(input_rx);
        let drained = timeout(SHUTDOWN_GRACE, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(error = %e, "Task panicked");
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "Tasks did not stop in time, aborting");
            tasks.abort_all();
        }
        info!("Engine stopped");
        Ok(())
    }
}

/// Run the engine until `shutdown` resolves.
pub async fn run<F>(config: Config, state: AppState, sinks: SinkRegistry, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    Runtime::new(config, state, sinks).run(shutdown).await
}

struct ScanSchedule {
    listings: Duration,
    closing_window: Option<Duration>,
}

fn spawn_listing_scans<S>(
    tasks: &mut JoinSet<()>,
    source: &Arc<S>,
    schedule: &ScanSchedule,
    input: &mpsc::Sender<EngineInput>,
    shutdown: &watch::Receiver<bool>,
) where
    S: ListingSource + 'static,
{
    tasks.spawn(scan_loop(
        Arc::clone(source),
        schedule.listings,
        "listings",
        EngineInput::Listings,
        input.clone(),
        shutdown.clone(),
    ));
    if let Some(every) = schedule.closing_window {
        tasks.spawn(scan_loop(
            Arc::clone(source),
            every,
            "closing_window",
            EngineInput::ClosingWindow,
            input.clone(),
            shutdown.clone(),
        ));
    }
}

/// Fetch listings on a fixed interval, starting immediately. A scan in
/// flight is abandoned on shutdown.
async fn scan_loop<S>(
    source: Arc<S>,
    every: Duration,
    label: &'static str,
    wrap: fn(ListingScan) -> EngineInput,
    input: mpsc::Sender<EngineInput>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: ListingSource + 'static,
{
    let venue = source.venue();
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {}
        }

        let scan = tokio::select! {
            _ = shutdown.changed() => return,
            scan = source.fetch_listings() => scan,
        };
        if let Some(error) = &scan.error {
            warn!(venue = %venue, scan = label, listings = scan.listings.len(), error = %error, "Scan incomplete");
        } else {
            debug!(venue = %venue, scan = label, listings = scan.listings.len(), pages = scan.pages, "Scan finished");
        }

        if input.send(wrap(scan)).await.is_err() {
            return;
        }
    }
}

/// Leaderboard (or fixed address list) plus per-address position scans.
struct SmartMoneyTracker {
    source: Arc<PolymarketSource>,
    addresses: Vec<String>,
    top_n: usize,
    every: Duration,
}

impl SmartMoneyTracker {
    async fn traders(&self) -> Option<Vec<RankedTrader>> {
        if !self.addresses.is_empty() {
            return Some(fixed_traders(&self.addresses));
        }
        self.source.leaderboard(self.top_n).await.ok()
    }

    async fn run(self, input: mpsc::Sender<EngineInput>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {}
            }

            let traders = tokio::select! {
                _ = shutdown.changed() => return,
                traders = self.traders() => traders,
            };
            let Some(traders) = traders else {
                continue;
            };
            if input.send(EngineInput::Leaderboard(traders.clone())).await.is_err() {
                return;
            }

            for trader in &traders {
                let snapshot = tokio::select! {
                    _ = shutdown.changed() => return,
                    snapshot = self.source.positions(trader, now_ms()) => snapshot,
                };
                // Failed fetches send nothing, so no position reads as closed.
                let Ok(snapshot) = snapshot else {
                    continue;
                };
                if input.send(EngineInput::Positions(snapshot)).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn fixed_traders(addresses: &[String]) -> Vec<RankedTrader> {
    addresses
        .iter()
        .enumerate()
        .map(|(i, address)| RankedTrader {
            address: address.clone(),
            rank: i as u32 + 1,
            name: None,
            pnl: Decimal::ZERO,
        })
        .collect()
}

async fn sweep_loop(every: Duration, input: mpsc::Sender<EngineInput>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately; nothing to sweep yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                if input.send(EngineInput::Sweep).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketListing, MockListingSource};
    use pretty_assertions::assert_eq;

    #[test]
    fn fixed_addresses_rank_in_order() {
        let traders = fixed_traders(&["0xa".to_string(), "0xb".to_string()]);
        assert_eq!(traders[0].rank, 1);
        assert_eq!(traders[1].address, "0xb");
        assert_eq!(traders[1].rank, 2);
    }

    #[tokio::test]
    async fn scan_loop_sends_each_scan_until_shutdown() {
        let source = Arc::new(MockListingSource::new(Venue::Kalshi));
        source.push_listings(vec![MarketListing::new(Venue::Kalshi, "KXA")]);
        let (tx, mut rx) = mpsc::channel(8);
        let (stop, shutdown) = watch::channel(false);

        let task = tokio::spawn(scan_loop(
            Arc::clone(&source),
            Duration::from_millis(10),
            "listings",
            EngineInput::Listings,
            tx,
            shutdown,
        ));

        match rx.recv().await {
            Some(EngineInput::Listings(scan)) => {
                assert_eq!(scan.venue, Venue::Kalshi);
                assert_eq!(scan.listings.len(), 1);
            }
            other => panic!("expected listings, got {other:?}"),
        }

        stop.send(true).unwrap();
        task.await.unwrap();
        assert!(source.fetches() >= 1);
    }

    #[tokio::test]
    async fn closing_window_scans_are_tagged() {
        let source = Arc::new(MockListingSource::new(Venue::Opinion));
        let (tx, mut rx) = mpsc::channel(8);
        let (stop, shutdown) = watch::channel(false);

        let task = tokio::spawn(scan_loop(
            source,
            Duration::from_millis(10),
            "closing_window",
            EngineInput::ClosingWindow,
            tx,
            shutdown,
        ));
        assert!(matches!(rx.recv().await, Some(EngineInput::ClosingWindow(_))));
        stop.send(true).unwrap();
        task.await.unwrap();
    }
}
