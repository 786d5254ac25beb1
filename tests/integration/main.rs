//! End-to-end tests for the dispatch path.
//!
//! Each test feeds venue wire frames through the normalizer and into the
//! engine, the same way the runtime does, and checks the emitted signals.
//! No network access is needed.

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use prediction_signals::detector::{DetectorSettings, Signal, SignalDetails, SignalKind};
use prediction_signals::engine::{Engine, EngineInput};
use prediction_signals::governor::GovernorConfig;
use prediction_signals::market::{ListingScan, MarketListing, Venue};
use prediction_signals::normalizer::VenueNormalizer;
use prediction_signals::store::StoreConfig;

const T: i64 = 1_700_000_000_000;

fn engine() -> Engine {
    engine_with(GovernorConfig::default())
}

fn engine_with(governor: GovernorConfig) -> Engine {
    Engine::new(
        StoreConfig::default(),
        governor,
        &DetectorSettings::default(),
        100,
    )
}

fn listing(market_id: &str, volume: Decimal) -> MarketListing {
    MarketListing {
        yes_token_id: Some(format!("{market_id}-yes")),
        no_token_id: Some(format!("{market_id}-no")),
        volume_24h: volume,
        ..MarketListing::new(Venue::Polymarket, market_id)
    }
}

fn scan(listings: Vec<MarketListing>) -> ListingScan {
    ListingScan {
        venue: Venue::Polymarket,
        listings,
        pages: 1,
        complete: true,
        truncated: false,
        error: None,
    }
}

fn levels(levels: &[(&str, &str)]) -> Value {
    levels
        .iter()
        .map(|(price, size)| json!({"price": price, "size": size}))
        .collect()
}

fn book_frame(market: &str, token: &str, bids: &[(&str, &str)], asks: &[(&str, &str)], ts: i64) -> String {
    json!({
        "event_type": "book",
        "asset_id": token,
        "market": market,
        "bids": levels(bids),
        "asks": levels(asks),
        "timestamp": ts.to_string(),
    })
    .to_string()
}

fn trade_frame(market: &str, token: &str, price: &str, size: &str, ts: i64) -> String {
    json!({
        "event_type": "last_trade_price",
        "asset_id": token,
        "market": market,
        "price": price,
        "size": size,
        "side": "BUY",
        "timestamp": ts.to_string(),
    })
    .to_string()
}

/// Normalize one Polymarket frame and run it through the engine.
fn feed(engine: &mut Engine, frame: &str, now_ms: i64) -> Vec<Signal> {
    let events = VenueNormalizer::for_venue(Venue::Polymarket).normalize_frame(frame, now_ms);
    assert!(!events.is_empty(), "frame produced no events: {frame}");
    engine.handle(EngineInput::Events(events), now_ms).signals
}

fn of_kind(signals: &[Signal], kind: SignalKind) -> Vec<&Signal> {
    signals.iter().filter(|s| s.kind == kind).collect()
}

/// YES at 0.40 with $200 of depth, NO at 0.55 with $330.
fn seed_arbitrage(engine: &mut Engine) -> Vec<Signal> {
    engine.handle(EngineInput::Listings(scan(vec![listing("M", dec!(5000))])), T - 10_000);

    let mut signals = feed(engine, &book_frame("M", "M-yes", &[], &[("0.40", "500")], T - 5_000), T);
    signals.extend(feed(engine, &book_frame("M", "M-no", &[], &[("0.55", "600")], T - 3_000), T));
    signals
}

#[test]
fn arbitrage_fires_on_cheap_legs() {
    let mut engine = engine();
    let signals = seed_arbitrage(&mut engine);

    let arbs = of_kind(&signals, SignalKind::Arbitrage);
    assert_eq!(arbs.len(), 1);
    let signal = arbs[0];
    assert_eq!(signal.market_id, "M");
    assert_eq!(signal.correlation_id, "arbitrage:polymarket:M");

    let SignalDetails::Arbitrage {
        yes_price,
        no_price,
        yes_depth,
        no_depth,
        quote,
        ..
    } = &signal.details
    else {
        panic!("expected arbitrage details, got {:?}", signal.details);
    };
    assert_eq!(*yes_price, dec!(0.40));
    assert_eq!(*no_price, dec!(0.55));
    assert_eq!(*yes_depth, dec!(200));
    assert_eq!(*no_depth, dec!(330));
    assert_eq!(quote.net_profit, dec!(0.0367));
    assert_eq!(quote.net_profit_percent.round_dp(2), dec!(3.86));
}

#[test]
fn arbitrage_cooldown_suppresses_repeat() {
    let mut engine = engine();
    assert_eq!(of_kind(&seed_arbitrage(&mut engine), SignalKind::Arbitrage).len(), 1);

    let again = feed(
        &mut engine,
        &book_frame("M", "M-no", &[], &[("0.54", "700")], T - 1_000),
        T + 1_000,
    );
    assert!(of_kind(&again, SignalKind::Arbitrage).is_empty());
    assert_eq!(engine.stats()[&SignalKind::Arbitrage].suppressed_cooldown, 1);
    assert_eq!(engine.stats()[&SignalKind::Arbitrage].emitted, 1);
}

#[test]
fn stale_leg_blocks_arbitrage() {
    let mut engine = engine();
    engine.handle(EngineInput::Listings(scan(vec![listing("M", dec!(5000))])), T - 120_000);

    let now = T;
    let mut signals = feed(
        &mut engine,
        &book_frame("M", "M-yes", &[], &[("0.40", "500")], now - 61_000),
        now,
    );
    signals.extend(feed(
        &mut engine,
        &book_frame("M", "M-no", &[], &[("0.55", "600")], now - 1_000),
        now,
    ));
    assert!(of_kind(&signals, SignalKind::Arbitrage).is_empty());
}

#[test]
fn trade_keeps_depth_from_earlier_book() {
    let mut engine = engine();
    feed(&mut engine, &book_frame("M", "tok", &[], &[("0.50", "1000")], T), T);
    assert_eq!(engine.store().get_price("tok").and_then(|e| e.depth_usd), Some(dec!(500)));

    let later = T + 61_000;
    feed(&mut engine, &trade_frame("M", "tok", "0.52", "10", later), later);

    let entry = engine.store().get_price("tok").expect("cached");
    assert_eq!(entry.price, dec!(0.52));
    assert_eq!(entry.timestamp_ms, later);
    assert_eq!(entry.depth_usd, Some(dec!(500)));
}

#[test]
fn hourly_quota_caps_large_trades() {
    let mut engine = engine_with(GovernorConfig {
        max_signals_per_hour: 3,
        ..GovernorConfig::default()
    });

    let mut emitted = 0;
    for i in 0..4 {
        let market = format!("M{i}");
        let token = format!("T{i}");
        let now = T + i * 1_000;
        let signals = feed(&mut engine, &trade_frame(&market, &token, "0.50", "30000", now), now);
        emitted += of_kind(&signals, SignalKind::LargeTrade).len();
    }

    assert_eq!(emitted, 3);
    let stats = engine.stats();
    assert_eq!(stats[&SignalKind::LargeTrade].emitted, 3);
    assert_eq!(stats[&SignalKind::LargeTrade].suppressed_quota, 1);
}

#[test]
fn new_market_needs_a_baseline_scan() {
    let mut engine = engine();

    let first = engine.handle(
        EngineInput::Listings(scan(vec![listing("A", dec!(10)), listing("B", dec!(20))])),
        T,
    );
    assert!(of_kind(&first.signals, SignalKind::NewMarket).is_empty());

    let second = engine.handle(
        EngineInput::Listings(scan(vec![
            listing("A", dec!(10)),
            listing("B", dec!(20)),
            listing("C", dec!(30)),
        ])),
        T + 60_000,
    );
    let new = of_kind(&second.signals, SignalKind::NewMarket);
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].market_id, "C");

    // Subscriptions follow volume.
    assert_eq!(
        engine.desired(Venue::Polymarket).first().map(String::as_str),
        Some("C-yes")
    );
}

#[test]
fn heavy_bids_fire_imbalance() {
    let bids = [("0.50", "4000"), ("0.49", "4000"), ("0.40", "2600")];

    let thin_asks = [("0.52", "250"), ("0.53", "250"), ("0.55", "250"), ("0.60", "10000")];
    let mut pressured = engine();
    let signals = feed(&mut pressured, &book_frame("M", "tok", &bids, &thin_asks, T), T);
    let fired = of_kind(&signals, SignalKind::Imbalance);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].token_id.as_deref(), Some("tok"));

    // Same pressure against a book that absorbs it without moving.
    let mut calm = engine();
    let deep_asks = [("0.500", "266"), ("0.501", "266"), ("0.502", "266"), ("0.503", "100000")];
    let signals = feed(&mut calm, &book_frame("M", "tok", &bids, &deep_asks, T), T);
    assert!(of_kind(&signals, SignalKind::Imbalance).is_empty());
}
