// ===============================
// src/venue/mod.rs
// ===============================
//
// Venue boundary. The supervisor only ever talks to `dyn VenueAdapter`; each
// venue turns its own frames into `VenueMessage`s and owns its REST calls and
// request signing.
//
pub mod dydx;
pub mod ftx;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;

use crate::account::{AccountSnapshot, FillUpdate, OrderUpdate};
use crate::book::BookUpdate;
use crate::domain::{InstrumentDetails, NewOrderSingle};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel { Depth, Orders, Fills, Account }

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Depth => "depth",
            Channel::Orders => "orders",
            Channel::Fills => "fills",
            Channel::Account => "account",
        }
    }
}

/// One outbound subscribe request.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription { pub channel: Channel, pub symbol: Option<String>, pub payload: String }

/// Normalized inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueMessage {
    Connected,
    Subscribed { channel: Channel },
    Book(BookUpdate),
    Orders(Vec<OrderUpdate>),
    Fill(FillUpdate),
    Positions(Vec<(String, Decimal)>),
    /// Text the venue expects back on the socket (e.g. `pong`).
    Reply(String),
    Pong,
    Error { message: String },
    Ignored,
}

/// What `place_order` needs besides the order itself.
#[derive(Debug, Clone)]
pub struct OrderContext {
    pub client_id: String,
    pub instrument: InstrumentDetails,
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderAck {
    Accepted,
    Rejected(String),
}

#[async_trait]
pub trait VenueAdapter: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn ws_url(&self) -> &str;

    fn has_credentials(&self) -> bool;

    /// Client-initiated keepalive frame, if the venue needs one.
    fn ping_message(&self) -> Option<String>;

    /// Login frame sent right after connect.
    fn auth_message(&self) -> Result<Option<String>>;

    /// Market-data subscriptions for every symbol, plus private channels when keyed.
    fn subscribe_messages(&self, symbols: &[String]) -> Result<Vec<Subscription>>;

    /// One text frame in, zero or more normalized messages out. Unknown but
    /// well-formed frames become `Ignored`; an error means the frame is garbage.
    fn parse_message(&self, text: &str) -> Result<Vec<VenueMessage>>;

    async fn fetch_instruments(&self) -> Result<Vec<InstrumentDetails>>;

    async fn fetch_account_snapshot(&self) -> Result<AccountSnapshot>;

    async fn submit_order(&self, nos: &NewOrderSingle, ctx: &OrderContext) -> Result<OrderAck>;
}

pub fn hmac_sha256(secret: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub fn timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn parse_time(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}
