// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }
impl Side { pub fn sign(&self) -> i64 { match self { Side::Buy => 1, Side::Sell => -1 } } }

/// One price level of a depth-limited view. `sequence` is the venue offset
/// (or receipt sequence) of the last accepted write at this price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier { pub price: Decimal, pub size: Decimal, pub sequence: u64 }

/// Immutable depth view: bids descending, asks ascending, both truncated to depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook { pub ts_ns: i128, pub bids: Vec<Tier>, pub asks: Vec<Tier> }

impl OrderBook {
    pub fn best_bid(&self) -> Option<&Tier> { self.bids.first() }
    pub fn best_ask(&self) -> Option<&Tier> { self.asks.first() }
}

/// Result of a depth read: a book exists only once a snapshot has been applied.
#[derive(Debug, Clone, PartialEq)]
pub enum BookView {
    NotReady,
    Ready(OrderBook),
}

impl BookView {
    pub fn is_ready(&self) -> bool { matches!(self, BookView::Ready(_)) }
    pub fn book(&self) -> Option<&OrderBook> {
        match self {
            BookView::Ready(b) => Some(b),
            BookView::NotReady => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType { Market, Limit, Ioc }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderSingle {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub order_type: OrderType,
    pub post_only: bool,
}

impl NewOrderSingle {
    pub fn limit(symbol: &str, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self { symbol: symbol.to_string(), side, quantity, price: Some(price), order_type: OrderType::Limit, post_only: false }
    }
    pub fn market(symbol: &str, side: Side, quantity: Decimal) -> Self {
        Self { symbol: symbol.to_string(), side, quantity, price: None, order_type: OrderType::Market, post_only: false }
    }
}

/// Open order as held by the account cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub order_id: String,
    pub side: Side,
    pub price: Option<Decimal>,
    pub leaves_qty: Decimal,
    pub created_at: Option<DateTime<Utc>>,
    pub order_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus { Open, Matched, Canceled, Modified }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub symbol: String,
    pub order_id: String,
    pub client_id: Option<String>,
    pub status: OrderStatus,
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentDetails { pub symbol: String, pub tick_size: Decimal, pub quantity_size: Decimal }

// Recorder payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event { Depth { symbol: String, book: OrderBook }, Exec(OrderEvent), Note(String) }

pub fn now_ns() -> i128 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128
}
