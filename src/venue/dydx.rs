// ===============================
// src/venue/dydx.rs
// ===============================
//
// dYdX v3-style venue:
// - ws        : `v3_orderbook` per market (with offsets), `v3_accounts` when keyed
// - keepalive : server sends a raw `ping` text frame, we answer `pong`
// - REST      : /v3/markets public; /v3/accounts, /v3/orders, /v3/positions private
// - signing   : base64url(HMAC-SHA256(base64url_decode(secret), iso + METHOD + path + body))
//
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::info;

use super::{
    hmac_sha256, parse_time, Channel, OrderAck, OrderContext, Subscription, VenueAdapter,
    VenueMessage,
};
use crate::account::{AccountSnapshot, OrderUpdate};
use crate::book::{BookAction, BookUpdate, LevelUpdate};
use crate::domain::{InstrumentDetails, NewOrderSingle, Order, Side};
use crate::error::{GatewayError, Result};
use crate::math::{decimal_from_value, parse_decimal};

pub const URL_WS: &str = "wss://api.dydx.exchange/v3/ws";
pub const URL_REST: &str = "https://api.dydx.exchange";

#[derive(Debug, Clone)]
pub struct DydxCredentials { pub api_key: String, pub api_secret: String, pub passphrase: String }

pub struct DydxAdapter {
    ws_url: String,
    rest_url: String,
    creds: Option<DydxCredentials>,
    http: reqwest::Client,
}

fn iso_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

impl DydxCredentials {
    pub fn sign(&self, path: &str, method: &str, iso: &str, body: &str) -> Result<String> {
        let secret = URL_SAFE
            .decode(self.api_secret.as_bytes())
            .map_err(|e| GatewayError::Config(format!("api secret is not base64url: {e}")))?;
        let payload = format!("{iso}{method}{path}{body}");
        Ok(URL_SAFE.encode(hmac_sha256(&secret, payload.as_bytes())))
    }
}

impl DydxAdapter {
    pub fn new(creds: Option<DydxCredentials>) -> Self {
        Self {
            ws_url: URL_WS.to_string(),
            rest_url: URL_REST.to_string(),
            creds,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_urls(mut self, ws_url: Option<String>, rest_url: Option<String>) -> Self {
        if let Some(u) = ws_url { self.ws_url = u; }
        if let Some(u) = rest_url { self.rest_url = u.trim_end_matches('/').to_string(); }
        self
    }

    async fn private_get(&self, path: &str) -> Result<Value> {
        let creds = self.creds.as_ref().ok_or(GatewayError::MissingCredentials)?;
        let iso = iso_now();
        let signature = creds.sign(path, "GET", &iso, "")?;
        info!(path, "REST - private request");
        let rsp = self
            .http
            .get(format!("{}{}", self.rest_url, path))
            .header("DYDX-SIGNATURE", signature)
            .header("DYDX-API-KEY", &creds.api_key)
            .header("DYDX-TIMESTAMP", iso)
            .header("DYDX-PASSPHRASE", &creds.passphrase)
            .send()
            .await?;
        let status = rsp.status();
        let v = rsp.json::<Value>().await?;
        if !status.is_success() {
            return Err(GatewayError::Venue(format!("{path}: {status} {v}")));
        }
        Ok(v)
    }
}

#[async_trait]
impl VenueAdapter for DydxAdapter {
    fn name(&self) -> &str { "dydx" }

    fn ws_url(&self) -> &str { &self.ws_url }

    fn has_credentials(&self) -> bool { self.creds.is_some() }

    fn ping_message(&self) -> Option<String> { None }

    fn auth_message(&self) -> Result<Option<String>> { Ok(None) }

    fn subscribe_messages(&self, symbols: &[String]) -> Result<Vec<Subscription>> {
        let mut out = Vec::with_capacity(symbols.len() + 1);
        if let Some(creds) = &self.creds {
            let iso = iso_now();
            let signature = creds.sign("/ws/accounts", "GET", &iso, "")?;
            out.push(Subscription {
                channel: Channel::Account,
                symbol: None,
                payload: json!({
                    "type": "subscribe",
                    "channel": "v3_accounts",
                    "accountNumber": "0",
                    "apiKey": creds.api_key,
                    "passphrase": creds.passphrase,
                    "timestamp": iso,
                    "signature": signature,
                })
                .to_string(),
            });
        }
        for s in symbols {
            out.push(Subscription {
                channel: Channel::Depth,
                symbol: Some(s.clone()),
                payload: json!({"type": "subscribe", "channel": "v3_orderbook", "id": s, "includeOffsets": true})
                    .to_string(),
            });
        }
        Ok(out)
    }

    fn parse_message(&self, text: &str) -> Result<Vec<VenueMessage>> {
        parse_ws(text)
    }

    async fn fetch_instruments(&self) -> Result<Vec<InstrumentDetails>> {
        info!("REST - Requesting static data");
        let v = self
            .http
            .get(format!("{}/v3/markets", self.rest_url))
            .send()
            .await?
            .json::<Value>()
            .await?;
        parse_markets(&v)
    }

    async fn fetch_account_snapshot(&self) -> Result<AccountSnapshot> {
        let accounts = self.private_get("/v3/accounts").await?;
        let orders = self.private_get("/v3/orders").await?;
        let positions = self.private_get("/v3/positions?status=OPEN").await?;
        Ok(AccountSnapshot {
            orders: parse_rest_orders(&orders)?,
            positions: parse_positions(field(&positions, "positions")?)?,
            account_id: parse_position_id(&accounts),
        })
    }

    async fn submit_order(&self, _nos: &NewOrderSingle, _ctx: &OrderContext) -> Result<OrderAck> {
        Err(GatewayError::Unsupported("dydx orders require a STARK key signature".into()))
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

fn offset_of(v: &Value) -> Result<u64> {
    let raw = field(v, "offset")?;
    let parsed = match raw {
        Value::String(s) => s.parse::<u64>().ok(),
        other => other.as_u64(),
    };
    parsed.ok_or_else(|| GatewayError::Malformed(format!("bad offset {raw}")))
}

fn array<'a>(v: &'a Value, key: &str) -> &'a [Value] {
    v.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

pub(crate) fn parse_ws(text: &str) -> Result<Vec<VenueMessage>> {
    if text == "ping" {
        return Ok(vec![VenueMessage::Reply("pong".into())]);
    }
    let data: Value = serde_json::from_str(text)?;
    let kind = str_field(&data, "type")?;

    match kind {
        "connected" => return Ok(vec![VenueMessage::Connected]),
        "error" => {
            let message = data.get("message").and_then(Value::as_str).unwrap_or(text);
            return Ok(vec![VenueMessage::Error { message: message.to_string() }]);
        }
        "pong" => return Ok(vec![VenueMessage::Pong]),
        _ => {}
    }

    match data.get("channel").and_then(Value::as_str).unwrap_or_default() {
        "v3_orderbook" => Ok(vec![VenueMessage::Book(parse_book(&data, kind)?)]),
        "v3_accounts" => parse_account(&data, kind),
        _ => Ok(vec![VenueMessage::Ignored]),
    }
}

fn parse_book(data: &Value, kind: &str) -> Result<BookUpdate> {
    let symbol = str_field(data, "id")?.to_string();
    let contents = field(data, "contents")?;

    if kind == "subscribed" {
        // {"price":"48690","size":"0.1","offset":"1408370234"}
        let levels = |key: &str| -> Result<Vec<LevelUpdate>> {
            array(contents, key)
                .iter()
                .map(|l| {
                    Ok(LevelUpdate {
                        price: dec_field(l, "price")?,
                        size: dec_field(l, "size")?,
                        sequence: Some(offset_of(l)?),
                    })
                })
                .collect()
        };
        return Ok(BookUpdate {
            symbol,
            action: BookAction::Snapshot,
            sequence: 0,
            bids: levels("bids")?,
            asks: levels("asks")?,
        });
    }

    // {"offset":"1408380048","bids":[],"asks":[["48644","0.2056"]]}
    let levels = |key: &str| -> Result<Vec<LevelUpdate>> {
        array(contents, key)
            .iter()
            .map(|row| {
                let pair = row.as_array().filter(|p| p.len() >= 2);
                pair.and_then(|p| Some(LevelUpdate::new(decimal_from_value(&p[0])?, decimal_from_value(&p[1])?)))
                    .ok_or_else(|| GatewayError::Malformed(format!("bad book level {row}")))
            })
            .collect()
    };
    Ok(BookUpdate {
        symbol,
        action: BookAction::Delta,
        sequence: offset_of(contents)?,
        bids: levels("bids")?,
        asks: levels("asks")?,
    })
}

fn parse_account(data: &Value, kind: &str) -> Result<Vec<VenueMessage>> {
    let contents = field(data, "contents")?;
    let mut out = Vec::new();
    if kind == "subscribed" {
        out.push(VenueMessage::Subscribed { channel: Channel::Account });
    }

    let orders = array(contents, "orders");
    if !orders.is_empty() {
        out.push(VenueMessage::Orders(orders.iter().map(parse_order_update).collect::<Result<_>>()?));
    }

    let mut positions = parse_pushed_positions(contents.get("positions").unwrap_or(&Value::Null))?;
    if let Some(open) = contents.pointer("/account/openPositions").and_then(Value::as_object) {
        for p in open.values() {
            positions.push((str_field(p, "market")?.to_string(), dec_field(p, "size")?));
        }
    }
    if !positions.is_empty() {
        out.push(VenueMessage::Positions(positions));
    }

    if out.is_empty() {
        out.push(VenueMessage::Ignored);
    }
    Ok(out)
}

fn parse_order(data: &Value) -> Result<Order> {
    let side = if str_field(data, "side")?.eq_ignore_ascii_case("sell") { Side::Sell } else { Side::Buy };
    Ok(Order {
        symbol: str_field(data, "market")?.to_string(),
        order_id: str_field(data, "id")?.to_string(),
        side,
        price: data.get("price").and_then(Value::as_str).and_then(parse_decimal),
        leaves_qty: dec_field(data, "remainingSize")?,
        created_at: parse_time(data.get("createdAt").and_then(Value::as_str)),
        order_type: str_field(data, "type")?.to_ascii_uppercase(),
    })
}

fn parse_order_update(data: &Value) -> Result<OrderUpdate> {
    let order = parse_order(data)?;
    let size = data.get("size").and_then(decimal_from_value).unwrap_or(order.leaves_qty);
    Ok(OrderUpdate {
        filled_qty: size - order.leaves_qty,
        client_id: data.get("clientId").and_then(Value::as_str).map(str::to_string),
        status: str_field(data, "status")?.to_string(),
        cancel_reason: data.get("cancelReason").and_then(Value::as_str).map(str::to_string),
        order,
    })
}

fn is_open(p: &Value) -> bool {
    p.get("status").and_then(Value::as_str).map_or(true, |s| s == "OPEN")
}

/// REST snapshot: only OPEN positions are held.
fn parse_positions(v: &Value) -> Result<Vec<(String, Decimal)>> {
    let Some(rows) = v.as_array() else { return Ok(Vec::new()) };
    rows.iter()
        .filter(|p| is_open(p))
        .map(|p| Ok((str_field(p, "market")?.to_string(), dec_field(p, "size")?)))
        .collect()
}

/// Stream push: every row is absolute, a position that is no longer OPEN is flat.
fn parse_pushed_positions(v: &Value) -> Result<Vec<(String, Decimal)>> {
    let Some(rows) = v.as_array() else { return Ok(Vec::new()) };
    rows.iter()
        .map(|p| {
            let size = if is_open(p) { dec_field(p, "size")? } else { Decimal::ZERO };
            Ok((str_field(p, "market")?.to_string(), size))
        })
        .collect()
}

pub(crate) fn parse_rest_orders(v: &Value) -> Result<Vec<Order>> {
    array(v, "orders")
        .iter()
        .filter(|o| o.get("status").and_then(Value::as_str) == Some("OPEN"))
        .map(parse_order)
        .collect()
}

pub(crate) fn parse_markets(v: &Value) -> Result<Vec<InstrumentDetails>> {
    let markets = field(v, "markets")?
        .as_object()
        .ok_or_else(|| GatewayError::Malformed("`markets` is not an object".into()))?;
    markets
        .iter()
        .map(|(symbol, m)| {
            Ok(InstrumentDetails {
                symbol: symbol.clone(),
                tick_size: dec_field(m, "tickSize")?,
                quantity_size: dec_field(m, "stepSize")?,
            })
        })
        .collect()
}

fn parse_position_id(v: &Value) -> Option<String> {
    let account = v.get("account").or_else(|| v.get("accounts").and_then(|a| a.get(0)))?;
    match account.get("positionId")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountStateCache;
    use crate::book::BookReconciler;
    use crate::domain::OrderStatus;
    use rust_decimal_macros::dec;

    const SNAPSHOT: &str = r#"{"type":"subscribed","connection_id":"a6d6a7b6","message_id":1,"channel":"v3_orderbook","id":"BTC-USD","contents":{"asks":[{"size":"0.5","price":"48646","offset":"1408370000"},{"size":"1.2","price":"48650","offset":"1408370100"}],"bids":[{"size":"0.3","price":"48640","offset":"1408370050"},{"size":"0","price":"48600","offset":"1408369000"}]}}"#;

    #[test]
    fn ping_is_answered_with_pong() {
        assert_eq!(parse_ws("ping").unwrap(), vec![VenueMessage::Reply("pong".into())]);
    }

    #[test]
    fn control_frames() {
        assert_eq!(
            parse_ws(r#"{"type":"connected","connection_id":"7d3a","message_id":0}"#).unwrap(),
            vec![VenueMessage::Connected]
        );
        assert_eq!(
            parse_ws(r#"{"type":"error","message":"Invalid message: could not parse","connection_id":"decf6ea9","message_id":416}"#).unwrap(),
            vec![VenueMessage::Error { message: "Invalid message: could not parse".into() }]
        );
        assert!(parse_ws("{not json").is_err());
    }

    #[test]
    fn snapshot_carries_per_level_offsets() {
        let VenueMessage::Book(book) = parse_ws(SNAPSHOT).unwrap().remove(0) else { panic!("expected book") };
        assert_eq!(book.action, BookAction::Snapshot);
        assert_eq!(book.symbol, "BTC-USD");
        assert_eq!(book.asks[0].sequence, Some(1408370000));
        assert_eq!(book.bids[1].size, dec!(0));
    }

    #[test]
    fn updates_reconcile_by_offset() {
        let mut rec = BookReconciler::new("BTC-USD", 5);
        let VenueMessage::Book(snap) = parse_ws(SNAPSHOT).unwrap().remove(0) else { panic!() };
        rec.handle(&snap).unwrap();
        assert_eq!(rec.best_bid(), Some(dec!(48640)));
        assert_eq!(rec.sorted_bids(), vec![dec!(48640)]);

        let newer = r#"{"type":"channel_data","id":"BTC-USD","connection_id":"a6d6a7b6","channel":"v3_orderbook","message_id":2,"contents":{"offset":"1408380048","bids":[],"asks":[["48646","0"],["48645","11.7164"]]}}"#;
        let VenueMessage::Book(upd) = parse_ws(newer).unwrap().remove(0) else { panic!() };
        assert_eq!(upd.sequence, 1408380048);
        rec.handle(&upd).unwrap();
        assert_eq!(rec.best_ask(), Some(dec!(48645)));

        // arrives late, older than the stored offset at 48650
        let older = r#"{"type":"channel_data","id":"BTC-USD","channel":"v3_orderbook","contents":{"offset":"1408370099","bids":[],"asks":[["48650","0"]]}}"#;
        let VenueMessage::Book(upd) = parse_ws(older).unwrap().remove(0) else { panic!() };
        rec.handle(&upd).unwrap();
        assert_eq!(rec.sorted_asks(), vec![dec!(48645), dec!(48650)]);
    }

    #[test]
    fn account_subscribed_flips_streams_and_carries_orders() {
        let text = r#"{"type":"subscribed","channel":"v3_accounts","connection_id":"x","id":"d82d13a7","contents":{"orders":[{"id":"296b2791d908f6867ce6555630d33656a284d48192dbb20fdab57db92aed9f8","clientId":"4785304725173323","accountId":"d82d13a7-473d-59c7-bcfc-031ed100d62b","market":"BTC-USD","side":"BUY","price":"30000","triggerPrice":null,"trailingPercent":null,"size":"0.001","remainingSize":"0.001","type":"LIMIT","createdAt":"2021-09-18T14:06:25.111Z","unfillableAt":null,"expiresAt":"2021-10-16T14:06:21.498Z","status":"OPEN","timeInForce":"GTT","postOnly":false,"cancelReason":null}],"account":{"positionId":"62392","openPositions":{"BTC-USD":{"market":"BTC-USD","status":"OPEN","side":"LONG","size":"0.001"}}}}}"#;
        let msgs = parse_ws(text).unwrap();
        assert_eq!(msgs[0], VenueMessage::Subscribed { channel: Channel::Account });
        let VenueMessage::Orders(updates) = &msgs[1] else { panic!("expected orders") };
        assert_eq!(updates[0].client_id.as_deref(), Some("4785304725173323"));
        assert_eq!(updates[0].filled_qty, dec!(0));
        assert_eq!(msgs[2], VenueMessage::Positions(vec![("BTC-USD".into(), dec!(0.001))]));
    }

    #[test]
    fn canceled_order_carries_reason() {
        let text = r#"{"type":"channel_data","channel":"v3_accounts","contents":{"orders":[{"id":"296b2791d908f6867ce6555630d33656a284d48192dbb20fdab57db92aed9f8","clientId":"4785304725173323","market":"BTC-USD","accountId":"d82d13a7-473d-59c7-bcfc-031ed100d62b","side":"BUY","size":"0.001","remainingSize":"0.001","limitFee":"0.001","price":"30000","triggerPrice":null,"trailingPercent":null,"type":"LIMIT","status":"CANCELED","timeInForce":"GTT","postOnly":false,"cancelReason":"USER_CANCELED","expiresAt":"2021-10-16T14:06:21.498Z","unfillableAt":null,"updatedAt":"2021-09-18T14:06:25.111Z","createdAt":"2021-09-18T14:06:25.111Z"}]}}"#;
        let VenueMessage::Orders(updates) = parse_ws(text).unwrap().remove(0) else { panic!("expected orders") };
        let mut cache = AccountStateCache::new();
        let ev = cache.apply_order_event(&updates[0]).unwrap();
        assert_eq!(ev.status, OrderStatus::Canceled);
        assert_eq!(ev.cancel_reason.as_deref(), Some("USER_CANCELED"));
    }

    #[test]
    fn position_push_is_absolute() {
        let text = r#"{"type":"channel_data","channel":"v3_accounts","contents":{"positions":[{"market":"BTC-USD","status":"OPEN","side":"SHORT","size":"-0.002","maxSize":"0.002","entryPrice":"48538.000000"}]}}"#;
        let VenueMessage::Positions(pos) = parse_ws(text).unwrap().remove(0) else { panic!("expected positions") };
        let mut cache = AccountStateCache::new();
        cache.apply_position("BTC-USD", dec!(0.001));
        for (sym, size) in &pos {
            cache.apply_position(sym, *size);
        }
        assert_eq!(cache.delta("BTC-USD"), Some(dec!(-0.002)));
    }

    #[test]
    fn closed_position_push_flattens_delta() {
        let mut cache = AccountStateCache::new();
        let pushes = [
            r#"{"type":"channel_data","channel":"v3_accounts","contents":{"positions":[{"market":"BTC-USD","status":"OPEN","side":"LONG","size":"0.001"}]}}"#,
            r#"{"type":"channel_data","channel":"v3_accounts","contents":{"positions":[{"market":"BTC-USD","status":"CLOSED","side":"LONG","size":"0","closedAt":"2021-09-18T16:00:00.000Z"}]}}"#,
        ];
        let mut seen = Vec::new();
        for text in pushes {
            let VenueMessage::Positions(pos) = parse_ws(text).unwrap().remove(0) else { panic!("expected positions") };
            for (sym, size) in &pos {
                cache.apply_position(sym, *size);
            }
            seen.push(cache.delta("BTC-USD"));
        }
        assert_eq!(seen, vec![Some(dec!(0.001)), Some(dec!(0))]);

        let stale_size = r#"{"type":"channel_data","channel":"v3_accounts","contents":{"positions":[{"market":"BTC-USD","status":"LIQUIDATED","size":"0.001"}]}}"#;
        let VenueMessage::Positions(pos) = parse_ws(stale_size).unwrap().remove(0) else { panic!("expected positions") };
        assert_eq!(pos, vec![("BTC-USD".to_string(), Decimal::ZERO)]);
    }

    #[test]
    fn rest_payloads() {
        let markets: Value = serde_json::from_str(r#"{"markets":{"BTC-USD":{"market":"BTC-USD","status":"ONLINE","tickSize":"1","stepSize":"0.0001"},"ETH-USD":{"market":"ETH-USD","tickSize":"0.1","stepSize":"0.001"}}}"#).unwrap();
        let mut got = parse_markets(&markets).unwrap();
        got.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assert_eq!(got[0].tick_size, dec!(1));
        assert_eq!(got[1].quantity_size, dec!(0.001));

        let positions: Value = serde_json::from_str(r#"{"positions": [{"market": "BTC-USD", "status": "OPEN", "side": "LONG", "size": "0.001", "maxSize": "0.001", "entryPrice": "48538.000000", "exitPrice": "0.000000", "unrealizedPnl": "0.003730", "realizedPnl": "0.000000", "createdAt": "2021-09-18T15:37:50.407Z", "closedAt": null, "sumOpen": "0.001", "sumClose": "0", "netFunding": "0"}]}"#).unwrap();
        assert_eq!(parse_positions(&positions["positions"]).unwrap(), vec![("BTC-USD".to_string(), dec!(0.001))]);

        let orders: Value = serde_json::from_str(r#"{"orders": [{"id": "296b", "clientId": "4785304725173323", "market": "BTC-USD", "side": "BUY", "price": "30000", "size": "0.001", "remainingSize": "0.001", "type": "LIMIT", "createdAt": "2021-09-18T14:06:25.111Z", "status": "OPEN"}, {"id": "77aa", "market": "BTC-USD", "side": "SELL", "price": "60000", "size": "0.001", "remainingSize": "0.001", "type": "LIMIT", "status": "PENDING"}]}"#).unwrap();
        let got = parse_rest_orders(&orders).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].price, Some(dec!(30000)));

        let accounts: Value = serde_json::from_str(r#"{"accounts":[{"positionId":"62392","id":"d82d13a7"}]}"#).unwrap();
        assert_eq!(parse_position_id(&accounts).as_deref(), Some("62392"));
    }

    #[test]
    fn account_subscription_is_signed() {
        let creds = DydxCredentials {
            api_key: "key".into(),
            api_secret: URL_SAFE.encode(b"super-secret"),
            passphrase: "pass".into(),
        };
        let adapter = DydxAdapter::new(Some(creds));
        let subs = adapter.subscribe_messages(&["BTC-USD".into()]).unwrap();
        assert_eq!(subs[0].channel, Channel::Account);
        assert_eq!(subs[1].channel, Channel::Depth);
        let req: Value = serde_json::from_str(&subs[0].payload).unwrap();
        assert_eq!(req["channel"], json!("v3_accounts"));
        assert_eq!(req["accountNumber"], json!("0"));
        let sig = URL_SAFE.decode(req["signature"].as_str().unwrap()).unwrap();
        assert_eq!(sig.len(), 32);

        let bad = DydxCredentials { api_key: "k".into(), api_secret: "%%%".into(), passphrase: "p".into() };
        assert!(matches!(bad.sign("/ws/accounts", "GET", "t", ""), Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn order_placement_is_unsupported() {
        let adapter = DydxAdapter::new(None);
        let nos = NewOrderSingle::limit("BTC-USD", Side::Buy, dec!(0.001), dec!(30000));
        let ctx = OrderContext {
            client_id: "dydx-1".into(),
            instrument: InstrumentDetails { symbol: "BTC-USD".into(), tick_size: dec!(1), quantity_size: dec!(0.001) },
            account_id: None,
        };
        assert!(matches!(adapter.submit_order(&nos, &ctx).await, Err(GatewayError::Unsupported(_))));
    }
}
