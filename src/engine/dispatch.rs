//! The dispatch path: one input at a time, applied to the store and then to
//! every detector.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, trace};

use super::EngineInput;
use crate::config::Config;
use crate::connection::ConnectionState;
use crate::detector::{DetectorPipeline, DetectorSettings, DetectorStats, ScanInput, Signal, SignalKind};
use crate::error::ConfigError;
use crate::governor::{GovernorConfig, GovernorSnapshot, RateGovernor};
use crate::market::{ListingScan, Venue};
use crate::metrics;
use crate::normalizer::NormalizedEvent;
use crate::store::{MarketStateStore, StoreConfig};

/// What one input produced.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Signals that passed the governor.
    pub signals: Vec<Signal>,
    /// A venue's new desired subscription set, when it changed.
    pub desired: Option<(Venue, Vec<String>)>,
}

/// Read-only engine summary for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Last reported state per venue.
    pub connections: BTreeMap<Venue, ConnectionState>,
    /// Desired subscription count per venue.
    pub desired_subscriptions: BTreeMap<Venue, usize>,
    /// Cached token prices.
    pub cache_entries: usize,
    /// Registered listings.
    pub listings: usize,
    /// Capacity evictions since startup.
    pub evictions: u64,
    /// Rate Governor state.
    pub governor: GovernorSnapshot,
    /// Inputs handled since startup.
    pub inputs: u64,
}

/// Market State Store plus Detector Pipeline, driven by [`EngineInput`]s.
pub struct Engine {
    store: MarketStateStore,
    pipeline: DetectorPipeline,
    connections: HashMap<Venue, ConnectionState>,
    desired: HashMap<Venue, Vec<String>>,
    max_subscriptions: usize,
    inputs: u64,
}

impl Engine {
    /// Create an engine from its parts.
    pub fn new(
        store: StoreConfig,
        governor: GovernorConfig,
        settings: &DetectorSettings,
        max_subscriptions: usize,
    ) -> Self {
        let pipeline =
            DetectorPipeline::new(settings.build(), RateGovernor::new(governor), settings.history_size);
        info!(detectors = ?pipeline.kinds(), "Detector pipeline ready");
        Self {
            store: MarketStateStore::new(store),
            pipeline,
            connections: HashMap::new(),
            desired: HashMap::new(),
            max_subscriptions,
            inputs: 0,
        }
    }

    /// Create an engine from validated configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.store_config(),
            config.governor_config(),
            &config.detector_settings()?,
            config.max_subscriptions,
        ))
    }

    /// Apply one input.
    pub fn handle(&mut self, input: EngineInput, now_ms: i64) -> Dispatch {
        self.inputs += 1;
        trace!(input = input.label(), "Dispatching");

        match input {
            EngineInput::Events(events) => {
                let mut signals = Vec::new();
                for event in &events {
                    let _timer = metrics::timer_dispatch();
                    self.store.apply_event(event);
                    signals.extend(self.pipeline.process_event(event, &self.store, now_ms));
                }
                Dispatch {
                    signals,
                    desired: None,
                }
            }
            EngineInput::Connection { venue, state } => {
                self.connections.insert(venue, state);
                Dispatch::default()
            }
            EngineInput::Listings(scan) => self.on_listings(scan, now_ms),
            EngineInput::ClosingWindow(scan) => self.scan(ScanInput::ClosingWindow(&scan), now_ms),
            EngineInput::Leaderboard(traders) => self.scan(ScanInput::Leaderboard(&traders), now_ms),
            EngineInput::Positions(snapshot) => self.scan(ScanInput::Positions(&snapshot), now_ms),
            EngineInput::Sweep => {
                self.sweep(now_ms);
                Dispatch::default()
            }
        }
    }

    fn scan(&mut self, input: ScanInput<'_>, now_ms: i64) -> Dispatch {
        Dispatch {
            signals: self.pipeline.process_scan(input, &self.store, now_ms),
            desired: None,
        }
    }

    fn on_listings(&mut self, scan: ListingScan, now_ms: i64) -> Dispatch {
        let venue = scan.venue;
        for listing in &scan.listings {
            self.store
                .apply_event(&NormalizedEvent::from_listing(listing.clone(), now_ms));
        }
        let signals = self
            .pipeline
            .process_scan(ScanInput::Listings(&scan), &self.store, now_ms);

        if scan.listings.is_empty() && !scan.complete {
            debug!(venue = %venue, error = ?scan.error, "Empty partial scan, keeping subscriptions");
            return Dispatch {
                signals,
                desired: None,
            };
        }

        let mut next = select_subscriptions(&scan, self.max_subscriptions);
        if !scan.complete {
            // A partial scan only adds; ids it did not reach stay subscribed.
            let mut seen: HashSet<String> = next.iter().cloned().collect();
            if let Some(previous) = self.desired.get(&venue) {
                for id in previous {
                    if next.len() >= self.max_subscriptions {
                        break;
                    }
                    if seen.insert(id.clone()) {
                        next.push(id.clone());
                    }
                }
            }
        }

        let changed = self.desired.get(&venue) != Some(&next);
        metrics::set_desired_subscriptions(venue, next.len());
        if !changed {
            return Dispatch {
                signals,
                desired: None,
            };
        }
        info!(
            venue = %venue,
            desired = next.len(),
            listings = scan.listings.len(),
            complete = scan.complete,
            "Desired subscriptions updated"
        );
        self.desired.insert(venue, next.clone());
        Dispatch {
            signals,
            desired: Some((venue, next)),
        }
    }

    /// Age out store and governor state.
    pub fn sweep(&mut self, now_ms: i64) {
        let stats = self.store.sweep(now_ms);
        let cooldowns = self.pipeline.sweep(now_ms);
        let removed = stats.prices + stats.books + stats.markets + stats.listings + cooldowns;
        metrics::add_sweep_removed(removed);
        metrics::set_cache_entries(self.store.len());
        debug!(
            prices = stats.prices,
            books = stats.books,
            markets = stats.markets,
            listings = stats.listings,
            cooldowns,
            "Sweep finished"
        );
    }

    /// The Market State Store.
    pub fn store(&self) -> &MarketStateStore {
        &self.store
    }

    /// Stats per detector.
    pub fn stats(&self) -> HashMap<SignalKind, DetectorStats> {
        self.pipeline.stats()
    }

    /// Recent signals of one detector, newest first.
    pub fn alert_history(&self, kind: SignalKind, limit: usize) -> Vec<Signal> {
        self.pipeline.alert_history(kind, limit)
    }

    /// Kinds of the active detectors.
    pub fn detector_kinds(&self) -> Vec<SignalKind> {
        self.pipeline.kinds()
    }

    /// Current desired subscription set of a venue.
    pub fn desired(&self, venue: Venue) -> &[String] {
        self.desired.get(&venue).map(Vec::as_slice).unwrap_or_default()
    }

    /// Summary snapshot.
    pub fn status(&self, now_ms: i64) -> EngineStatus {
        EngineStatus {
            connections: self.connections.iter().map(|(v, s)| (*v, *s)).collect(),
            desired_subscriptions: self.desired.iter().map(|(v, ids)| (*v, ids.len())).collect(),
            cache_entries: self.store.len(),
            listings: self.store.listing_count(),
            evictions: self.store.evictions(),
            governor: self.pipeline.governor_snapshot(now_ms),
            inputs: self.inputs,
        }
    }
}

/// Ids to subscribe for a listing scan: open listings by 24h volume
/// (descending, market id breaks ties), flattened, capped at `max`.
pub fn select_subscriptions(scan: &ListingScan, max: usize) -> Vec<String> {
    let mut open: Vec<_> = scan.listings.iter().filter(|l| !l.closed).collect();
    open.sort_by(|a, b| {
        b.volume_24h
            .cmp(&a.volume_24h)
            .then_with(|| a.market_id.cmp(&b.market_id))
    });

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for listing in open {
        for id in listing.subscription_ids() {
            if ids.len() >= max {
                return ids;
            }
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    ids
}
