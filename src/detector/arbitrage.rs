//! Cross-outcome arbitrage on cached YES/NO prices.
//!
//! At resolution exactly one leg pays $1.00. If both legs can be bought for
//! less than $1.00 after fees and slippage, the difference is locked in:
//!
//! ```text
//! YES price:   $0.40
//! NO price:    $0.55
//! ─────────────────────
//! Sum:         $0.95
//! Gross:       $0.05
//! Fees:        0.95 * 0.002 * 2 = $0.0038
//! Slippage:    0.95 * 0.005 * 2 = $0.0095
//! Net:         $0.0367 (3.86% of cost)
//! ```

use rust_decimal::Decimal;
use tracing::trace;

use super::signal::{ArbitrageQuote, SignalDetails, SignalKind, Strength};
use super::{Detection, DetectionContext, Detector};
use crate::normalizer::{EventKind, NormalizedEvent};
use crate::store::PriceCacheEntry;

/// Arbitrage thresholds.
#[derive(Debug, Clone)]
pub struct ArbitrageConfig {
    /// Minimum net profit per $1 payout.
    pub min_profit: Decimal,
    /// Taker fee rate per leg.
    pub fee_rate: Decimal,
    /// Expected slippage per leg.
    pub slippage: Decimal,
    /// Minimum USD depth on each leg.
    pub min_depth: Decimal,
    /// Maximum age of either leg.
    pub max_price_age_ms: i64,
    /// Maximum timestamp difference between the legs.
    pub max_time_skew_ms: i64,
    /// Minimum time between signals for one market.
    pub cooldown_ms: i64,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            min_profit: Decimal::new(3, 3),
            fee_rate: Decimal::new(2, 3),
            slippage: Decimal::new(5, 3),
            min_depth: Decimal::new(100, 0),
            max_price_age_ms: 60_000,
            max_time_skew_ms: 30_000,
            cooldown_ms: 300_000,
        }
    }
}

/// Profit of buying both legs at `yes` and `no`.
///
/// `net = 1 - sum - sum*fee*2 - sum*slippage*2`.
pub fn compute_quote(yes: Decimal, no: Decimal, fee_rate: Decimal, slippage: Decimal) -> ArbitrageQuote {
    let sum = yes + no;
    let gross_profit = Decimal::ONE - sum;
    let total_fee = sum * fee_rate * Decimal::TWO;
    let total_slippage = sum * slippage * Decimal::TWO;
    let net_profit = gross_profit - total_fee - total_slippage;
    let net_profit_percent = if sum.is_zero() {
        Decimal::ZERO
    } else {
        net_profit / sum * Decimal::ONE_HUNDRED
    };

    ArbitrageQuote {
        sum,
        gross_profit,
        total_fee,
        total_slippage,
        net_profit,
        net_profit_percent,
    }
}

/// Leg freshness and synchronization gate shared with implied arbitrage.
pub(crate) fn legs_usable(
    yes_ts: i64,
    no_ts: i64,
    now_ms: i64,
    max_age_ms: i64,
    max_skew_ms: i64,
) -> bool {
    now_ms - yes_ts <= max_age_ms
        && now_ms - no_ts <= max_age_ms
        && (yes_ts - no_ts).abs() <= max_skew_ms
}

/// Detects YES + NO priced below $1 after costs.
#[derive(Debug)]
pub struct ArbitrageDetector {
    config: ArbitrageConfig,
}

impl ArbitrageDetector {
    /// Create a detector.
    pub fn new(config: ArbitrageConfig) -> Self {
        Self { config }
    }

    fn leg_depth(entry: &PriceCacheEntry) -> Decimal {
        entry.depth_usd.unwrap_or(Decimal::ZERO)
    }
}

impl Detector for ArbitrageDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::Arbitrage
    }

    fn cooldown_ms(&self) -> i64 {
        self.config.cooldown_ms
    }

    fn process(&mut self, event: &NormalizedEvent, ctx: &DetectionContext<'_>) -> Option<Detection> {
        if event.kind() == EventKind::MarketMeta {
            return None;
        }
        let (yes_token, no_token) = ctx.store.find_market_tokens(&event.market_id)?.pair()?;
        let yes = ctx.store.get_price(yes_token)?;
        let no = ctx.store.get_price(no_token)?;

        // (a) completeness, staleness and leg synchronization.
        if !legs_usable(
            yes.timestamp_ms,
            no.timestamp_ms,
            ctx.now_ms,
            self.config.max_price_age_ms,
            self.config.max_time_skew_ms,
        ) {
            trace!(market = %event.market_id, "Arbitrage legs stale or desynchronized");
            return None;
        }
        let (yes_depth, no_depth) = (Self::leg_depth(yes), Self::leg_depth(no));
        if yes_depth < self.config.min_depth || no_depth < self.config.min_depth {
            return None;
        }

        // (b) threshold.
        let quote = compute_quote(yes.price, no.price, self.config.fee_rate, self.config.slippage);
        if quote.net_profit < self.config.min_profit {
            return None;
        }

        let mut meta = event.meta.clone();
        meta.merge_missing(&yes.meta);
        Some(Detection {
            key: event.market_id.clone(),
            venue: event.venue,
            market_id: event.market_id.clone(),
            token_id: None,
            meta,
            strength: Strength::from_ratio(quote.net_profit, self.config.min_profit),
            details: SignalDetails::Arbitrage {
                yes_token_id: yes_token.to_string(),
                no_token_id: no_token.to_string(),
                yes_price: yes.price,
                no_price: no.price,
                yes_depth,
                no_depth,
                quote,
            },
        })
    }
}
