//! Scripted listing source for tests.
//!
//! Scans are handed out in the order they were queued; once the queue is
//! empty every fetch returns the last scan again.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::client::ListingSource;
use super::types::{ListingScan, MarketListing, Venue};

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<ListingScan>,
    last: Option<ListingScan>,
    fetches: usize,
}

/// Listing source that replays queued scans.
#[derive(Debug, Clone)]
pub struct MockListingSource {
    venue: Venue,
    script: Arc<Mutex<Script>>,
}

impl MockListingSource {
    /// Create an empty source for `venue`.
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    /// Queue a complete scan of `listings`.
    pub fn push_listings(&self, listings: Vec<MarketListing>) {
        self.push_scan(ListingScan::complete(self.venue, listings));
    }

    /// Queue an arbitrary scan.
    pub fn push_scan(&self, scan: ListingScan) {
        self.lock().queued.push_back(scan);
    }

    /// Number of fetches served.
    pub fn fetches(&self) -> usize {
        self.lock().fetches
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ListingSource for MockListingSource {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn fetch_listings(&self) -> ListingScan {
        let mut script = self.lock();
        script.fetches += 1;
        match script.queued.pop_front() {
            Some(scan) => {
                script.last = Some(scan.clone());
                scan
            }
            None => script
                .last
                .clone()
                .unwrap_or_else(|| ListingScan::empty(self.venue)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_queue_then_repeats_last() {
        let source = MockListingSource::new(Venue::Opinion);
        source.push_listings(vec![MarketListing::new(Venue::Opinion, "1")]);
        source.push_listings(vec![
            MarketListing::new(Venue::Opinion, "1"),
            MarketListing::new(Venue::Opinion, "2"),
        ]);

        assert_eq!(source.fetch_listings().await.listings.len(), 1);
        assert_eq!(source.fetch_listings().await.listings.len(), 2);
        assert_eq!(source.fetch_listings().await.listings.len(), 2);
        assert_eq!(source.fetches(), 3);
    }

    #[test]
    fn empty_source_returns_incomplete_scan() {
        let scan = tokio_test::block_on(MockListingSource::new(Venue::Kalshi).fetch_listings());
        assert!(!scan.complete);
        assert!(scan.listings.is_empty());
    }
}
