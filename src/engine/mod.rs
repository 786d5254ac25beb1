//! The single dispatch path and the tasks that feed it.
//!
//! Connection tasks and background scans never touch shared state. They
//! send [`EngineInput`] values over one channel; the dispatch loop applies
//! them to the Market State Store and the Detector Pipeline one at a time.

pub mod dispatch;
pub mod runtime;

use crate::connection::ConnectionState;
use crate::market::{ListingScan, PositionSnapshot, RankedTrader, Venue};
use crate::normalizer::NormalizedEvent;

pub use dispatch::{select_subscriptions, Dispatch, Engine, EngineStatus};
pub use runtime::{run, Runtime};

/// Everything the dispatch loop consumes.
#[derive(Debug, Clone)]
pub enum EngineInput {
    /// Events normalized from one wire frame.
    Events(Vec<NormalizedEvent>),
    /// A connection changed state.
    Connection {
        /// Venue of the connection.
        venue: Venue,
        /// New state.
        state: ConnectionState,
    },
    /// Periodic listing refresh of one venue.
    Listings(ListingScan),
    /// Listing scan for closing-soon ranking.
    ClosingWindow(ListingScan),
    /// Tracked trader set.
    Leaderboard(Vec<RankedTrader>),
    /// Positions of one tracked trader.
    Positions(PositionSnapshot),
    /// Periodic store and governor sweep.
    Sweep,
}

impl EngineInput {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            EngineInput::Events(_) => "events",
            EngineInput::Connection { .. } => "connection",
            EngineInput::Listings(_) => "listings",
            EngineInput::ClosingWindow(_) => "closing_window",
            EngineInput::Leaderboard(_) => "leaderboard",
            EngineInput::Positions(_) => "positions",
            EngineInput::Sweep => "sweep",
        }
    }
}
