// ===============================
// src/venue/ftx.rs
// ===============================
//
// FTX-style venue:
// - ws        : `orderbook` per market, `orders` + `fills` when keyed, client ping every interval
// - REST      : /markets, /orders, /positions, /wallet/balances, POST /orders
// - signing   : HMAC-SHA256 hex over `{ts}{METHOD}{path}{body}` (headers FTX-KEY / FTX-SIGN / FTX-TS)
//
// Book frames carry no per-level offsets. Frames arrive in order on one TCP
// stream, so a receipt counter is a valid sequence for the reconciler.
//
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Number, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use url::Url;

use super::{
    hmac_sha256, parse_time, timestamp_ms, Channel, OrderAck, OrderContext, Subscription,
    VenueAdapter, VenueMessage,
};
use crate::account::{AccountSnapshot, FillUpdate, OrderUpdate};
use crate::book::{BookAction, BookUpdate, LevelUpdate};
use crate::domain::{InstrumentDetails, NewOrderSingle, Order, OrderType, Side};
use crate::error::{GatewayError, Result};
use crate::math::{decimal_from_value, round_to_increment};

pub const URL_WS: &str = "wss://ftx.com/ws/";
pub const URL_REST: &str = "https://ftx.com/api";

#[derive(Debug, Clone)]
pub struct FtxCredentials { pub api_key: String, pub api_secret: String }

pub struct FtxAdapter {
    ws_url: String,
    rest_url: String,
    creds: Option<FtxCredentials>,
    http: reqwest::Client,
    recv_seq: AtomicU64,
}

impl FtxAdapter {
    pub fn new(creds: Option<FtxCredentials>) -> Self {
        Self {
            ws_url: URL_WS.to_string(),
            rest_url: URL_REST.to_string(),
            creds,
            http: reqwest::Client::new(),
            recv_seq: AtomicU64::new(0),
        }
    }

    pub fn with_urls(mut self, ws_url: Option<String>, rest_url: Option<String>) -> Self {
        if let Some(u) = ws_url { self.ws_url = u; }
        if let Some(u) = rest_url { self.rest_url = u.trim_end_matches('/').to_string(); }
        self
    }

    fn creds(&self) -> Result<&FtxCredentials> {
        self.creds.as_ref().ok_or(GatewayError::MissingCredentials)
    }

    async fn private_request(&self, method: reqwest::Method, endpoint: &str, body: Option<&Value>) -> Result<Value> {
        let creds = self.creds()?;
        let url = Url::parse(&format!("{}{}", self.rest_url, endpoint))
            .map_err(|e| GatewayError::Config(format!("bad rest url: {e}")))?;
        let mut path = url.path().to_string();
        if let Some(q) = url.query() {
            path.push('?');
            path.push_str(q);
        }
        let body_str = match body {
            Some(b) => serde_json::to_string(b)?,
            None => String::new(),
        };
        let ts = timestamp_ms();
        let payload = format!("{ts}{}{path}{body_str}", method.as_str());
        let sign = hex::encode(hmac_sha256(creds.api_secret.as_bytes(), payload.as_bytes()));

        let mut req = self
            .http
            .request(method, url)
            .header("FTX-KEY", &creds.api_key)
            .header("FTX-SIGN", sign)
            .header("FTX-TS", ts.to_string());
        if body.is_some() {
            req = req.header("Content-Type", "application/json").body(body_str);
        }
        let v = req.send().await?.json::<Value>().await?;
        Ok(v)
    }

    async fn private_get(&self, endpoint: &str) -> Result<Value> {
        info!(endpoint, "REST - private request");
        let v = self.private_request(reqwest::Method::GET, endpoint, None).await?;
        debug!(endpoint, response = %v, "REST - response");
        Ok(v)
    }
}

#[async_trait]
impl VenueAdapter for FtxAdapter {
    fn name(&self) -> &str { "ftx" }

    fn ws_url(&self) -> &str { &self.ws_url }

    fn has_credentials(&self) -> bool { self.creds.is_some() }

    fn ping_message(&self) -> Option<String> { Some(r#"{"op":"ping"}"#.to_string()) }

    fn auth_message(&self) -> Result<Option<String>> {
        let Some(creds) = &self.creds else { return Ok(None) };
        let ts = timestamp_ms();
        let sign = hex::encode(hmac_sha256(
            creds.api_secret.as_bytes(),
            format!("{ts}websocket_login").as_bytes(),
        ));
        let msg = json!({"op": "login", "args": {"key": creds.api_key, "sign": sign, "time": ts}});
        Ok(Some(msg.to_string()))
    }

    fn subscribe_messages(&self, symbols: &[String]) -> Result<Vec<Subscription>> {
        let mut out: Vec<Subscription> = symbols
            .iter()
            .map(|s| Subscription {
                channel: Channel::Depth,
                symbol: Some(s.clone()),
                payload: json!({"op": "subscribe", "channel": "orderbook", "market": s}).to_string(),
            })
            .collect();
        if self.has_credentials() {
            for (channel, name) in [(Channel::Orders, "orders"), (Channel::Fills, "fills")] {
                out.push(Subscription {
                    channel,
                    symbol: None,
                    payload: json!({"op": "subscribe", "channel": name}).to_string(),
                });
            }
        }
        Ok(out)
    }

    fn parse_message(&self, text: &str) -> Result<Vec<VenueMessage>> {
        parse_ws(text, || self.recv_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn fetch_instruments(&self) -> Result<Vec<InstrumentDetails>> {
        info!("REST - Requesting static data");
        let url = format!("{}/markets", self.rest_url);
        let v = self.http.get(url).send().await?.json::<Value>().await?;
        parse_markets(&v)
    }

    async fn fetch_account_snapshot(&self) -> Result<AccountSnapshot> {
        let positions = self.private_get("/positions").await?;
        let balances = self.private_get("/wallet/balances").await?;
        let orders = self.private_get("/orders").await?;

        let mut snapshot = AccountSnapshot {
            orders: parse_rest_orders(&orders)?,
            positions: parse_positions(&positions)?,
            account_id: None,
        };
        snapshot.positions.extend(parse_balances(&balances)?);
        Ok(snapshot)
    }

    async fn submit_order(&self, nos: &NewOrderSingle, ctx: &OrderContext) -> Result<OrderAck> {
        let body = place_order_request(nos, &ctx.instrument, &ctx.client_id)?;
        info!(request = %body, "sending order");
        let rsp = self.private_request(reqwest::Method::POST, "/orders", Some(&body)).await?;
        info!(response = %rsp, "order response");
        if success(&rsp) {
            Ok(OrderAck::Accepted)
        } else {
            let reason = rsp.get("error").and_then(Value::as_str).unwrap_or("rejected");
            Ok(OrderAck::Rejected(reason.to_string()))
        }
    }
}

// ---- payload parsing ----

fn field<'a>(v: &'a Value, key: &str) -> Result<&'a Value> {
    v.get(key)
        .filter(|x| !x.is_null())
        .ok_or_else(|| GatewayError::Malformed(format!("missing `{key}`")))
}

fn str_field<'a>(v: &'a Value, key: &str) -> Result<&'a str> {
    field(v, key)?
        .as_str()
        .ok_or_else(|| GatewayError::Malformed(format!("`{key}` is not a string")))
}

fn dec_field(v: &Value, key: &str) -> Result<Decimal> {
    decimal_from_value(field(v, key)?)
        .ok_or_else(|| GatewayError::Malformed(format!("`{key}` is not a number")))
}

fn id_field(v: &Value, key: &str) -> Result<String> {
    match field(v, key)? {
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

fn success(v: &Value) -> bool {
    match v.get("success") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn side_of(s: &str) -> Side {
    if s.eq_ignore_ascii_case("sell") { Side::Sell } else { Side::Buy }
}

fn results(v: &Value) -> Result<&[Value]> {
    if !success(v) {
        let err = v.get("error").and_then(Value::as_str).unwrap_or("request failed");
        return Err(GatewayError::Venue(err.to_string()));
    }
    Ok(v.get("result").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]))
}

pub(crate) fn parse_ws(text: &str, mut next_seq: impl FnMut() -> u64) -> Result<Vec<VenueMessage>> {
    let data: Value = serde_json::from_str(text)?;
    let kind = data.get("type").and_then(Value::as_str).unwrap_or_default();
    let channel = data.get("channel").and_then(Value::as_str).unwrap_or_default();

    let msg = match (kind, channel) {
        ("subscribed", "orderbook") => VenueMessage::Subscribed { channel: Channel::Depth },
        ("subscribed", "orders") => VenueMessage::Subscribed { channel: Channel::Orders },
        ("subscribed", "fills") => VenueMessage::Subscribed { channel: Channel::Fills },
        ("pong", _) => VenueMessage::Pong,
        ("error", _) => VenueMessage::Error {
            message: data.get("msg").and_then(Value::as_str).unwrap_or(text).to_string(),
        },
        ("partial" | "update", "orderbook") => VenueMessage::Book(parse_book(&data, next_seq())?),
        ("update", "orders") => VenueMessage::Orders(vec![parse_order_update(field(&data, "data")?)?]),
        ("update", "fills") => VenueMessage::Fill(parse_fill(field(&data, "data")?)?),
        _ => VenueMessage::Ignored,
    };
    Ok(vec![msg])
}

fn parse_levels(v: Option<&Value>) -> Result<Vec<LevelUpdate>> {
    let Some(rows) = v.and_then(Value::as_array) else { return Ok(Vec::new()) };
    rows.iter()
        .map(|row| {
            let pair = row.as_array().filter(|p| p.len() >= 2);
            let parsed = pair.and_then(|p| Some(LevelUpdate::new(decimal_from_value(&p[0])?, decimal_from_value(&p[1])?)));
            parsed.ok_or_else(|| GatewayError::Malformed(format!("bad book level {row}")))
        })
        .collect()
}

fn parse_book(data: &Value, sequence: u64) -> Result<BookUpdate> {
    let symbol = str_field(data, "market")?.to_string();
    let body = field(data, "data")?;
    let action = match body.get("action").and_then(Value::as_str).unwrap_or_default() {
        "partial" => BookAction::Snapshot,
        _ => BookAction::Delta,
    };
    Ok(BookUpdate {
        symbol,
        action,
        sequence,
        bids: parse_levels(body.get("bids"))?,
        asks: parse_levels(body.get("asks"))?,
    })
}

fn parse_order(data: &Value) -> Result<Order> {
    let leaves_qty = match data.get("remainingSize").and_then(decimal_from_value) {
        Some(q) => q,
        None => dec_field(data, "size")?,
    };
    Ok(Order {
        symbol: str_field(data, "market")?.to_string(),
        order_id: id_field(data, "id")?,
        side: side_of(str_field(data, "side")?),
        price: data.get("price").and_then(decimal_from_value),
        leaves_qty,
        created_at: parse_time(data.get("createdAt").and_then(Value::as_str)),
        order_type: str_field(data, "type")?.to_ascii_uppercase(),
    })
}

fn parse_order_update(data: &Value) -> Result<OrderUpdate> {
    Ok(OrderUpdate {
        order: parse_order(data)?,
        client_id: data.get("clientId").and_then(Value::as_str).map(str::to_string),
        status: str_field(data, "status")?.to_string(),
        filled_qty: data.get("filledSize").and_then(decimal_from_value).unwrap_or_default(),
        cancel_reason: None,
    })
}

fn parse_fill(data: &Value) -> Result<FillUpdate> {
    Ok(FillUpdate {
        symbol: str_field(data, "market")?.to_string(),
        side: side_of(str_field(data, "side")?),
        size: dec_field(data, "size")?,
    })
}

pub(crate) fn parse_markets(v: &Value) -> Result<Vec<InstrumentDetails>> {
    results(v)?
        .iter()
        .map(|m| {
            Ok(InstrumentDetails {
                symbol: str_field(m, "name")?.to_string(),
                tick_size: dec_field(m, "priceIncrement")?,
                quantity_size: dec_field(m, "sizeIncrement")?,
            })
        })
        .collect()
}

pub(crate) fn parse_rest_orders(v: &Value) -> Result<Vec<Order>> {
    results(v)?.iter().map(parse_order).collect()
}

pub(crate) fn parse_positions(v: &Value) -> Result<Vec<(String, Decimal)>> {
    results(v)?
        .iter()
        .map(|p| Ok((str_field(p, "future")?.to_string(), dec_field(p, "netSize")?)))
        .collect()
}

pub(crate) fn parse_balances(v: &Value) -> Result<Vec<(String, Decimal)>> {
    results(v)?
        .iter()
        .map(|b| Ok((str_field(b, "coin")?.to_string(), dec_field(b, "total")?)))
        .collect()
}

fn num(field: &str, d: Decimal) -> Result<Value> {
    d.to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| GatewayError::Config(format!("order {field} {d} is not a finite number")))
}

pub(crate) fn place_order_request(nos: &NewOrderSingle, instrument: &InstrumentDetails, client_id: &str) -> Result<Value> {
    let limit_price = || -> Result<Value> {
        let px = nos
            .price
            .ok_or_else(|| GatewayError::UnsupportedOrderType(format!("{:?} order without price", nos.order_type)))?;
        num("price", round_to_increment(px, instrument.tick_size)?)
    };
    let (order_type, price, ioc) = match nos.order_type {
        OrderType::Market => ("market", Value::Null, false),
        OrderType::Limit => ("limit", limit_price()?, false),
        OrderType::Ioc => ("limit", limit_price()?, true),
    };
    Ok(json!({
        "market": nos.symbol,
        "side": match nos.side { Side::Buy => "buy", Side::Sell => "sell" },
        "price": price,
        "type": order_type,
        "size": num("size", round_to_increment(nos.quantity, instrument.quantity_size)?)?,
        "ioc": ioc,
        "postOnly": nos.post_only,
        "clientId": client_id,
    }))
}
