//! Desired-subscription bookkeeping.
//!
//! The desired set is replaced wholesale from each listing refresh. Changes
//! are coalesced until the set has been quiet for the debounce period, then
//! diffed against what was sent on the current connection and split into
//! fixed-size chunks. Nothing is acknowledged: after a reconnect the whole
//! desired set is sent again.

use std::collections::BTreeSet;

use tracing::debug;

use super::SubscriptionPolicy;
use crate::market::Venue;

/// Subscribe and unsubscribe chunks ready to be framed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionBatch {
    /// Ids to add, chunked.
    pub subscribe: Vec<Vec<String>>,
    /// Ids to drop, chunked.
    pub unsubscribe: Vec<Vec<String>>,
}

impl SubscriptionBatch {
    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

/// Tracks desired versus sent subscriptions for one connection.
#[derive(Debug)]
pub struct SubscriptionPlanner {
    venue: Venue,
    policy: SubscriptionPolicy,
    desired: BTreeSet<String>,
    sent: BTreeSet<String>,
    last_change_ms: Option<i64>,
}

impl SubscriptionPlanner {
    /// Create an empty planner.
    pub fn new(venue: Venue, policy: SubscriptionPolicy) -> Self {
        Self {
            venue,
            policy,
            desired: BTreeSet::new(),
            sent: BTreeSet::new(),
            last_change_ms: None,
        }
    }

    /// Number of desired ids.
    pub fn desired_len(&self) -> usize {
        self.desired.len()
    }

    /// Replace the desired set. Restarts the debounce window when it changed.
    pub fn set_desired(&mut self, ids: impl IntoIterator<Item = String>, now_ms: i64) {
        let next: BTreeSet<String> = ids.into_iter().collect();
        if next != self.desired {
            self.desired = next;
            self.last_change_ms = Some(now_ms);
        }
    }

    /// Unix milliseconds at which pending changes become due.
    pub fn due_at(&self) -> Option<i64> {
        self.last_change_ms
            .map(|changed| changed + self.policy.debounce_ms as i64)
    }

    /// Diff pending changes once the debounce window has passed.
    ///
    /// While the socket is closed the pending change is dropped: the next
    /// connect resends the whole desired set anyway.
    pub fn flush(&mut self, now_ms: i64, open: bool) -> Option<SubscriptionBatch> {
        let due = self.due_at()?;
        if now_ms < due {
            return None;
        }
        self.last_change_ms = None;
        if !open {
            debug!(venue = %self.venue, desired = self.desired.len(), "Socket closed, subscription change dropped");
            return None;
        }

        let added: Vec<String> = self.desired.difference(&self.sent).cloned().collect();
        let removed: Vec<String> = self.sent.difference(&self.desired).cloned().collect();
        self.sent = self.desired.clone();

        let batch = SubscriptionBatch {
            subscribe: self.chunk(added),
            unsubscribe: self.chunk(removed),
        };
        (!batch.is_empty()).then_some(batch)
    }

    /// The whole desired set, chunked, for a fresh connection.
    pub fn resubscribe_all(&mut self) -> Vec<Vec<String>> {
        self.sent = self.desired.clone();
        self.last_change_ms = None;
        self.chunk(self.desired.iter().cloned().collect())
    }

    /// Forget what was sent on the previous connection.
    pub fn on_disconnect(&mut self) {
        self.sent.clear();
    }

    fn chunk(&self, ids: Vec<String>) -> Vec<Vec<String>> {
        ids.chunks(self.policy.chunk_size.max(1))
            .map(<[String]>::to_vec)
            .collect()
    }
}
