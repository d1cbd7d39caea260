// ===============================
// src/book.rs (per-symbol book reconstruction)
// ===============================
//
// Each symbol keeps two PriceLevelBooks. A price level remembers the sequence
// of its last accepted write; a later write is applied only if its sequence is
// strictly greater, so out-of-order delivery converges to the same book.
//
// Size-0 writes are kept as tombstones (sequence advanced, size 0) and filtered
// on every read. Dropping the key instead would let an older non-zero update
// for the same price resurrect the level.
//
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::{now_ns, BookView, OrderBook, Tier};
use crate::error::{GatewayError, Result};
use crate::metrics::{BOOK_MESSAGES, BOOK_STALE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookAction { Snapshot, Delta }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide { Bid, Ask }

/// `sequence` overrides the message sequence when the venue sends per-level offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelUpdate { pub price: Decimal, pub size: Decimal, pub sequence: Option<u64> }

impl LevelUpdate {
    pub fn new(price: Decimal, size: Decimal) -> Self { Self { price, size, sequence: None } }
}

/// Normalized market-data message for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct BookUpdate {
    pub symbol: String,
    pub action: BookAction,
    pub sequence: u64,
    pub bids: Vec<LevelUpdate>,
    pub asks: Vec<LevelUpdate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevel { pub price: Decimal, pub sequence: u64, pub size: Decimal }

impl PriceLevel {
    fn is_live(&self) -> bool { self.size > Decimal::ZERO }
}

/// One side of one symbol's book, keyed by price.
#[derive(Debug, Default, Clone)]
pub struct PriceLevelBook {
    levels: BTreeMap<Decimal, PriceLevel>,
}

impl PriceLevelBook {
    pub fn new() -> Self { Self::default() }

    pub fn clear(&mut self) { self.levels.clear(); }

    pub fn get(&self, price: Decimal) -> Option<&PriceLevel> { self.levels.get(&price) }

    /// Snapshot insert: empty levels are not stored.
    pub fn seed(&mut self, price: Decimal, size: Decimal, sequence: u64) {
        if size > Decimal::ZERO {
            self.levels.insert(price, PriceLevel { price, sequence, size });
        }
    }

    /// Delta write. Returns false when the write is stale (sequence not newer).
    pub fn apply(&mut self, price: Decimal, size: Decimal, sequence: u64) -> bool {
        match self.levels.get_mut(&price) {
            None => {
                self.levels.insert(price, PriceLevel { price, sequence, size });
                true
            }
            Some(level) if sequence > level.sequence => {
                level.sequence = sequence;
                level.size = size;
                true
            }
            Some(_) => false,
        }
    }

    /// Live levels in ascending price order.
    pub fn live(&self) -> impl DoubleEndedIterator<Item = &PriceLevel> {
        self.levels.values().filter(|l| l.is_live())
    }

    pub fn max_price(&self) -> Option<Decimal> { self.live().next_back().map(|l| l.price) }

    pub fn min_price(&self) -> Option<Decimal> { self.live().next().map(|l| l.price) }

    pub fn live_len(&self) -> usize { self.live().count() }
}

/// Book reconstruction for a single symbol.
#[derive(Debug)]
pub struct BookReconciler {
    symbol: String,
    depth: usize,
    bids: PriceLevelBook,
    asks: PriceLevelBook,
    ts_ns: i128,
    snapshot_applied: bool,
}

impl BookReconciler {
    pub fn new(symbol: impl Into<String>, depth: usize) -> Self {
        Self {
            symbol: symbol.into(),
            depth,
            bids: PriceLevelBook::new(),
            asks: PriceLevelBook::new(),
            ts_ns: 0,
            snapshot_applied: false,
        }
    }

    pub fn symbol(&self) -> &str { &self.symbol }

    pub fn ready(&self) -> bool { self.snapshot_applied }

    pub fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.ts_ns = 0;
        self.snapshot_applied = false;
    }

    pub fn side(&self, side: BookSide) -> &PriceLevelBook {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    pub fn handle(&mut self, update: &BookUpdate) -> Result<()> {
        if update.symbol != self.symbol {
            return Err(GatewayError::Malformed(format!(
                "book update for {} routed to {}",
                update.symbol, self.symbol
            )));
        }

        match update.action {
            BookAction::Snapshot => {
                self.bids.clear();
                self.asks.clear();
                for l in &update.bids {
                    self.bids.seed(l.price, l.size, l.sequence.unwrap_or(update.sequence));
                }
                for l in &update.asks {
                    self.asks.seed(l.price, l.size, l.sequence.unwrap_or(update.sequence));
                }
                self.snapshot_applied = true;
            }
            BookAction::Delta => {
                if !self.snapshot_applied {
                    debug!(symbol = %self.symbol, seq = update.sequence, "delta before snapshot, dropped");
                    return Ok(());
                }
                let sym = self.symbol.as_str();
                for (side, book, levels) in [
                    ("bid", &mut self.bids, &update.bids),
                    ("ask", &mut self.asks, &update.asks),
                ] {
                    for l in levels {
                        let seq = l.sequence.unwrap_or(update.sequence);
                        if !book.apply(l.price, l.size, seq) {
                            let existing = book.get(l.price).map(|p| p.sequence).unwrap_or_default();
                            debug!(symbol = %sym, side, price = %l.price, size = %l.size,
                                   existing_seq = existing, update_seq = seq, "skipping stale price update");
                            BOOK_STALE.with_label_values(&[sym]).inc();
                        }
                    }
                }
            }
        }

        self.ts_ns = now_ns();
        BOOK_MESSAGES.with_label_values(&[self.symbol.as_str()]).inc();
        Ok(())
    }

    pub fn best_bid(&self) -> Option<Decimal> { self.bids.max_price() }

    pub fn best_ask(&self) -> Option<Decimal> { self.asks.min_price() }

    pub fn sorted_bids(&self) -> Vec<Decimal> { self.bids.live().rev().map(|l| l.price).collect() }

    pub fn sorted_asks(&self) -> Vec<Decimal> { self.asks.live().map(|l| l.price).collect() }

    pub fn get_orderbook(&self) -> BookView {
        if !self.snapshot_applied {
            return BookView::NotReady;
        }
        let tier = |l: &PriceLevel| Tier { price: l.price, size: l.size, sequence: l.sequence };
        BookView::Ready(OrderBook {
            ts_ns: self.ts_ns,
            bids: self.bids.live().rev().take(self.depth).map(tier).collect(),
            asks: self.asks.live().take(self.depth).map(tier).collect(),
        })
    }
}
