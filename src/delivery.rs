//! Hand-off of emitted signals to downstream consumers.
//!
//! Formatting and the notification transport live outside this crate. The
//! engine pushes each signal into every registered [`SignalSink`]; a
//! notification layer asks a [`PreferenceStore`] which subscribers want it.

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::detector::{Signal, SignalKind};

/// Receives emitted signals. Must not block the dispatch loop.
pub trait SignalSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Take one signal.
    fn deliver(&self, signal: &Signal);
}

/// Broadcasts signals to every registered sink.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<Box<dyn SignalSink>>,
}

impl SinkRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink.
    pub fn register(&mut self, sink: Box<dyn SignalSink>) {
        debug!(sink = sink.name(), "Signal sink registered");
        self.sinks.push(sink);
    }

    /// Deliver one signal to every sink.
    pub fn deliver_all(&self, signal: &Signal) {
        for sink in &self.sinks {
            sink.deliver(signal);
        }
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink is registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// Writes each signal to the log.
pub struct LogSink;

impl SignalSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&self, signal: &Signal) {
        info!(
            id = signal.id,
            kind = %signal.kind,
            venue = %signal.venue,
            market = %signal.market_id,
            strength = %signal.strength,
            magnitude = %signal.magnitude(),
            key = %signal.correlation_id,
            "{}",
            signal.label()
        );
    }
}

/// Forwards signals into a bounded channel. A full or closed channel drops
/// the signal with a warning.
pub struct ChannelSink {
    tx: mpsc::Sender<Signal>,
}

impl ChannelSink {
    /// Create a sink and its receiving end.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Signal>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

impl SignalSink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn deliver(&self, signal: &Signal) {
        if let Err(e) = self.tx.try_send(signal.clone()) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            warn!(id = signal.id, kind = %signal.kind, reason, "Signal channel rejected signal");
        }
    }
}

/// Per-subscriber notification preferences.
pub trait PreferenceStore: Send + Sync {
    /// Every known subscriber.
    fn subscribers(&self) -> Vec<String>;

    /// Whether `user` receives signals of `kind` at all.
    fn is_notification_enabled(&self, user: &str, kind: SignalKind) -> bool;

    /// Minimum magnitude `user` wants for `kind`, if any.
    fn get_threshold(&self, user: &str, kind: SignalKind) -> Option<Decimal>;

    /// Whether `signal` clears `level` for `kind`. No level always passes.
    fn check_signal_threshold(&self, signal: &Signal, kind: SignalKind, level: Option<Decimal>) -> bool {
        signal.kind == kind && level.map_or(true, |level| signal.magnitude() >= level)
    }

    /// Subscribers that should be notified of `signal`.
    fn recipients(&self, signal: &Signal) -> Vec<String> {
        self.subscribers()
            .into_iter()
            .filter(|user| self.is_notification_enabled(user, signal.kind))
            .filter(|user| {
                let level = self.get_threshold(user, signal.kind);
                self.check_signal_threshold(signal, signal.kind, level)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct Preference {
    enabled: bool,
    threshold: Option<Decimal>,
}

/// In-memory preferences. Kinds a user never configured are disabled.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    users: DashMap<String, DashMap<SignalKind, Preference>>,
}

impl MemoryPreferences {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable `kind` for `user`.
    pub fn set_enabled(&self, user: &str, kind: SignalKind, enabled: bool) {
        self.users
            .entry(user.to_string())
            .or_default()
            .entry(kind)
            .or_default()
            .enabled = enabled;
    }

    /// Set the magnitude floor of `kind` for `user`.
    pub fn set_threshold(&self, user: &str, kind: SignalKind, threshold: Option<Decimal>) {
        self.users
            .entry(user.to_string())
            .or_default()
            .entry(kind)
            .or_default()
            .threshold = threshold;
    }
}

impl PreferenceStore for MemoryPreferences {
    fn subscribers(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    fn is_notification_enabled(&self, user: &str, kind: SignalKind) -> bool {
        self.users
            .get(user)
            .and_then(|prefs| prefs.get(&kind).map(|p| p.enabled))
            .unwrap_or(false)
    }

    fn get_threshold(&self, user: &str, kind: SignalKind) -> Option<Decimal> {
        self.users
            .get(user)
            .and_then(|prefs| prefs.get(&kind).and_then(|p| p.threshold))
    }
}
