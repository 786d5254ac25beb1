//! Market State Store: latest price, order book and listing per token/market.
//!
//! The store is owned by the dispatch path and mutated only there, so it
//! needs no locking. Capacity is bounded by insertion-order eviction and a
//! periodic sweep removes entries older than the configured age, purging
//! index and listing records left orphaned.

pub mod cache;
pub mod index;

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, trace};

use crate::market::{MarketListing, MarketMeta, Outcome, Venue};
use crate::metrics;
use crate::normalizer::{EventPayload, NormalizedEvent, PriceSource};
use crate::orderbook::{OrderBookSnapshot, Side};

pub use cache::InsertionOrderCache;
pub use index::{Assignment, MarketTokenIndex, MarketTokens};

/// Levels summed when deriving depth from a book.
pub const DEPTH_LEVELS: usize = 3;

/// Store parameters.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum cached tokens.
    pub capacity: usize,
    /// A price older than this is stale.
    pub max_price_age_ms: i64,
    /// Entries older than this are swept.
    pub sweep_max_age_ms: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: 50_000,
            max_price_age_ms: 60_000,
            sweep_max_age_ms: 600_000,
        }
    }
}

/// Latest known price of one token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceCacheEntry {
    /// Venue the price came from.
    pub venue: Venue,
    /// Latest price.
    pub price: Decimal,
    /// Market the token belongs to.
    pub market_id: String,
    /// Outcome leg, when resolved.
    pub outcome: Outcome,
    /// Unix milliseconds of the update that set the price.
    pub timestamp_ms: i64,
    /// USD depth near the best price, carried over when an update has none.
    pub depth_usd: Option<Decimal>,
    /// Field the price was extracted from.
    pub source: PriceSource,
    /// Descriptive metadata.
    pub meta: MarketMeta,
}

impl PriceCacheEntry {
    /// Milliseconds since the entry was written.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp_ms
    }

    /// Whether the entry is too old to trust.
    pub fn is_stale(&self, now_ms: i64, max_age_ms: i64) -> bool {
        self.age_ms(now_ms) > max_age_ms
    }
}

/// Input to [`MarketStateStore::update_price`].
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    /// Venue.
    pub venue: Venue,
    /// Token id the price belongs to.
    pub token_id: String,
    /// Market id.
    pub market_id: String,
    /// Outcome stated by the wire message.
    pub outcome: Outcome,
    /// New price.
    pub price: Decimal,
    /// Extraction source.
    pub source: PriceSource,
    /// Fresh depth, if the update carries any.
    pub depth_usd: Option<Decimal>,
    /// Unix milliseconds.
    pub timestamp_ms: i64,
    /// Metadata from the wire message.
    pub meta: MarketMeta,
}

/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Price entries removed by age.
    pub prices: usize,
    /// Books removed.
    pub books: usize,
    /// Index entries purged because both slots were empty.
    pub markets: usize,
    /// Listing records expired.
    pub listings: usize,
}

#[derive(Debug, Clone)]
struct ListingRecord {
    listing: MarketListing,
    seen_ms: i64,
}

/// Latest-price and order-book cache keyed by token and market.
#[derive(Debug)]
pub struct MarketStateStore {
    config: StoreConfig,
    prices: InsertionOrderCache<String, PriceCacheEntry>,
    books: HashMap<String, OrderBookSnapshot>,
    index: MarketTokenIndex,
    listings: HashMap<String, ListingRecord>,
    evictions: u64,
}

impl MarketStateStore {
    /// Create an empty store.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            prices: InsertionOrderCache::new(config.capacity),
            config,
            books: HashMap::new(),
            index: MarketTokenIndex::default(),
            listings: HashMap::new(),
            evictions: 0,
        }
    }

    /// Store parameters.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Apply one normalized event. Returns whether a cached price changed.
    pub fn apply_event(&mut self, event: &NormalizedEvent) -> bool {
        match &event.payload {
            EventPayload::MarketMeta(listing) => {
                self.register_listing(listing, event.timestamp_ms);
                false
            }
            EventPayload::Book(book) => {
                let Some(token_id) = event.token_id.as_deref() else {
                    return false;
                };
                self.update_book(event, token_id, book.clone())
            }
            EventPayload::Price { price, source } => {
                let Some(token_id) = event.token_id.as_deref() else {
                    return false;
                };
                self.update_price(PriceUpdate {
                    venue: event.venue,
                    token_id: token_id.to_string(),
                    market_id: event.market_id.clone(),
                    outcome: event.outcome,
                    price: *price,
                    source: *source,
                    depth_usd: None,
                    timestamp_ms: event.timestamp_ms,
                    meta: event.meta.clone(),
                })
            }
            EventPayload::Trade { price, .. } => {
                let Some(token_id) = event.token_id.as_deref() else {
                    return false;
                };
                self.update_price(PriceUpdate {
                    venue: event.venue,
                    token_id: token_id.to_string(),
                    market_id: event.market_id.clone(),
                    outcome: event.outcome,
                    price: *price,
                    source: PriceSource::LastTrade,
                    depth_usd: None,
                    timestamp_ms: event.timestamp_ms,
                    meta: event.meta.clone(),
                })
            }
        }
    }

    /// Write a token's latest price.
    ///
    /// A lower-ranked source does not replace a higher-ranked price that is
    /// still fresh, and an update older than the cached one is ignored. When
    /// the update has no depth, the previously known depth is kept.
    pub fn update_price(&mut self, update: PriceUpdate) -> bool {
        let outcome = self.resolve_outcome(&update.market_id, &update.token_id, update.outcome);
        let mut meta = update.meta;
        if let Some(record) = self.listings.get(&update.market_id) {
            meta.merge_missing(&record.listing.meta);
        }

        let previous = self.prices.get(update.token_id.as_str());
        if let Some(prev) = previous {
            if update.timestamp_ms < prev.timestamp_ms {
                trace!(token = %update.token_id, "Ignoring out-of-order price");
                return false;
            }
            let prev_fresh = !prev.is_stale(update.timestamp_ms, self.config.max_price_age_ms);
            if update.source < prev.source && prev_fresh {
                trace!(
                    token = %update.token_id,
                    source = %update.source,
                    cached = %prev.source,
                    "Keeping higher-ranked price"
                );
                return false;
            }
        }

        let depth_usd = update
            .depth_usd
            .or_else(|| previous.and_then(|prev| prev.depth_usd));
        if let Some(prev) = previous {
            meta.merge_missing(&prev.meta);
        }

        let entry = PriceCacheEntry {
            venue: update.venue,
            price: update.price,
            market_id: update.market_id,
            outcome,
            timestamp_ms: update.timestamp_ms,
            depth_usd,
            source: update.source,
            meta,
        };

        let evicted = self.prices.insert(update.token_id, entry);
        if !evicted.is_empty() {
            self.evictions += evicted.len() as u64;
            metrics::add_cache_evictions(evicted.len());
            for (token_id, entry) in evicted {
                debug!(token = %token_id, market = %entry.market_id, "Evicted price entry");
                self.forget_token(&token_id, &entry.market_id);
            }
        }
        true
    }

    /// Replace a token's book and derive its price and depth from it.
    ///
    /// Price is the best ask, or the best bid when the book has no asks.
    /// Depth is the USD notional of the top levels on that same side.
    pub fn update_book(
        &mut self,
        event: &NormalizedEvent,
        token_id: &str,
        book: OrderBookSnapshot,
    ) -> bool {
        let derived = match (book.best_ask(), book.best_bid()) {
            (Some(ask), _) => Some((ask, PriceSource::BestAsk, Side::Ask)),
            (None, Some(bid)) => Some((bid, PriceSource::BestBid, Side::Bid)),
            (None, None) => None,
        };
        let depth = derived.map(|(_, _, side)| book.depth_usd(side, DEPTH_LEVELS));

        if !self.prices.contains_key(token_id) && derived.is_none() {
            return false;
        }
        self.books.insert(token_id.to_string(), book);

        let Some((price, source, _)) = derived else {
            return false;
        };
        let changed = self.update_price(PriceUpdate {
            venue: event.venue,
            token_id: token_id.to_string(),
            market_id: event.market_id.clone(),
            outcome: event.outcome,
            price,
            source,
            depth_usd: depth,
            timestamp_ms: event.timestamp_ms,
            meta: event.meta.clone(),
        });
        if !self.prices.contains_key(token_id) {
            self.books.remove(token_id);
        }
        changed
    }

    /// Register a listing row: metadata plus its outcome tokens.
    pub fn register_listing(&mut self, listing: &MarketListing, now_ms: i64) {
        for outcome in [Outcome::Yes, Outcome::No] {
            if let Some(token_id) = listing.token_id(outcome) {
                if self.index.assign(&listing.market_id, token_id, outcome) == Assignment::Filled {
                    if let Some(entry) = self.prices.get_mut(token_id) {
                        if entry.outcome == Outcome::Unknown {
                            entry.outcome = outcome;
                        }
                    }
                }
            }
        }
        self.listings.insert(
            listing.market_id.clone(),
            ListingRecord {
                listing: listing.clone(),
                seen_ms: now_ms,
            },
        );
    }

    /// Latest cached price, regardless of age.
    pub fn get_price(&self, token_id: &str) -> Option<&PriceCacheEntry> {
        self.prices.get(token_id)
    }

    /// Latest cached price if it is not stale at `now_ms`.
    pub fn get_fresh_price(&self, token_id: &str, now_ms: i64) -> Option<&PriceCacheEntry> {
        self.get_price(token_id)
            .filter(|entry| !entry.is_stale(now_ms, self.config.max_price_age_ms))
    }

    /// YES/NO tokens known for a market.
    pub fn find_market_tokens(&self, market_id: &str) -> Option<&MarketTokens> {
        self.index.find(market_id)
    }

    /// Market and outcome a token is indexed under.
    pub fn token_outcome(&self, token_id: &str) -> Option<(&str, Outcome)> {
        self.index.lookup(token_id)
    }

    /// Latest book of a token.
    pub fn get_book(&self, token_id: &str) -> Option<&OrderBookSnapshot> {
        self.books.get(token_id)
    }

    /// Registered listing of a market.
    pub fn market(&self, market_id: &str) -> Option<&MarketListing> {
        self.listings.get(market_id).map(|record| &record.listing)
    }

    /// Best known metadata for a market.
    pub fn market_meta(&self, market_id: &str) -> MarketMeta {
        self.market(market_id)
            .map(|listing| listing.meta.clone())
            .unwrap_or_default()
    }

    /// Number of cached prices.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no prices are cached.
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Number of registered listings.
    pub fn listing_count(&self) -> usize {
        self.listings.len()
    }

    /// Entries evicted by capacity since startup.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Remove entries older than the sweep age and purge orphans.
    pub fn sweep(&mut self, now_ms: i64) -> SweepStats {
        let max_age = self.config.sweep_max_age_ms;
        let mut stats = SweepStats::default();

        let removed = self
            .prices
            .remove_where(|_, entry| now_ms - entry.timestamp_ms > max_age);
        stats.prices = removed.len();
        for (token_id, entry) in &removed {
            if self.books.remove(token_id).is_some() {
                stats.books += 1;
            }
            self.forget_token(token_id, &entry.market_id);
        }

        let expired: Vec<String> = self
            .listings
            .iter()
            .filter(|(_, record)| now_ms - record.seen_ms > max_age)
            .map(|(id, _)| id.clone())
            .collect();
        for market_id in expired {
            let has_prices = self.index.find(&market_id).is_some_and(|tokens| {
                [&tokens.yes, &tokens.no]
                    .into_iter()
                    .flatten()
                    .any(|t| self.prices.contains_key(t))
            });
            if !has_prices {
                self.listings.remove(&market_id);
                self.index.remove_market(&market_id);
                stats.listings += 1;
            }
        }

        stats.markets = self.index.purge_empty().len();

        metrics::add_sweep_removed(stats.prices);
        metrics::set_cache_entries(self.prices.len());
        if stats != SweepStats::default() {
            debug!(
                prices = stats.prices,
                books = stats.books,
                markets = stats.markets,
                listings = stats.listings,
                "Swept market state"
            );
        }
        stats
    }

    /// Outcome from the index (first-wins), else from the wire message.
    fn resolve_outcome(&mut self, market_id: &str, token_id: &str, stated: Outcome) -> Outcome {
        if let Some((_, outcome)) = self.index.lookup(token_id) {
            return outcome;
        }
        if stated != Outcome::Unknown {
            self.index.assign(market_id, token_id, stated);
            if let Some((_, outcome)) = self.index.lookup(token_id) {
                return outcome;
            }
        }
        Outcome::Unknown
    }

    /// Drop a token's book and free its index slot unless a listing still
    /// vouches for the market.
    fn forget_token(&mut self, token_id: &str, market_id: &str) {
        self.books.remove(token_id);
        if !self.listings.contains_key(market_id) {
            self.index.release(token_id);
        }
    }
}
