// ===============================
// src/account.rs (open orders & positions cache)
// ===============================
//
// Holds the whole account, not only orders placed by this process: the
// open-order view and net positions must match the venue even when another
// client trades on the same account.
//
use ahash::AHashMap as HashMap;
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::{Order, OrderEvent, OrderStatus, Side};
use crate::metrics::ORDER_EVENTS;

/// Order push as parsed by a venue adapter. `status` keeps the venue's own word.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub order: Order,
    pub client_id: Option<String>,
    pub status: String,
    pub filled_qty: Decimal,
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillUpdate { pub symbol: String, pub side: Side, pub size: Decimal }

/// REST state loaded once per (re)connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountSnapshot {
    pub orders: Vec<Order>,
    pub positions: Vec<(String, Decimal)>,
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition { Open, Matched, Canceled, NoOp }

fn classify(status: &str, filled_qty: Decimal) -> Option<Transition> {
    match status.to_ascii_lowercase().as_str() {
        "open" | "new" => Some(Transition::Open),
        "filled" => Some(Transition::Matched),
        "closed" if filled_qty > Decimal::ZERO => Some(Transition::Matched),
        "closed" | "canceled" | "cancelled" => Some(Transition::Canceled),
        "pending" | "untriggered" => Some(Transition::NoOp),
        _ => None,
    }
}

/// Spot balances are denominated in the base asset: `BTC/USD` is kept under `BTC`.
pub fn position_key(symbol: &str) -> &str {
    match symbol.split_once('/') {
        Some((base, _)) => base,
        None => symbol,
    }
}

#[derive(Debug, Default)]
pub struct AccountStateCache {
    orders: HashMap<String, HashMap<String, Order>>,
    positions: HashMap<String, Decimal>,
    account_id: Option<String>,
}

impl AccountStateCache {
    pub fn new() -> Self { Self::default() }

    pub fn clear(&mut self) {
        self.orders.clear();
        self.positions.clear();
        self.account_id = None;
    }

    pub fn apply_snapshot(&mut self, snapshot: AccountSnapshot) {
        self.clear();
        for order in snapshot.orders {
            self.insert_order(order);
        }
        for (symbol, size) in snapshot.positions {
            self.positions.insert(symbol, size);
        }
        self.account_id = snapshot.account_id;
    }

    fn insert_order(&mut self, order: Order) {
        self.orders
            .entry(order.symbol.clone())
            .or_default()
            .insert(order.order_id.clone(), order);
    }

    fn remove_order(&mut self, symbol: &str, order_id: &str) {
        if let Some(by_id) = self.orders.get_mut(symbol) {
            by_id.remove(order_id);
            if by_id.is_empty() {
                self.orders.remove(symbol);
            }
        }
    }

    /// Applies one order push and returns the normalized event, if the status
    /// is a transition the strategy cares about.
    pub fn apply_order_event(&mut self, update: &OrderUpdate) -> Option<OrderEvent> {
        let symbol = update.order.symbol.clone();
        let order_id = update.order.order_id.clone();

        let (status, cancel_reason) = match classify(&update.status, update.filled_qty) {
            Some(Transition::Open) => {
                self.insert_order(update.order.clone());
                (OrderStatus::Open, None)
            }
            Some(Transition::Matched) => {
                self.remove_order(&symbol, &order_id);
                (OrderStatus::Matched, None)
            }
            Some(Transition::Canceled) => {
                self.remove_order(&symbol, &order_id);
                (OrderStatus::Canceled, update.cancel_reason.clone())
            }
            Some(Transition::NoOp) => return None,
            None => {
                debug!(status = %update.status, %symbol, %order_id, "unhandled order status");
                return None;
            }
        };

        ORDER_EVENTS.with_label_values(&[status_label(status)]).inc();
        Some(OrderEvent { symbol, order_id, client_id: update.client_id.clone(), status, cancel_reason })
    }

    /// `position += side * size`
    pub fn apply_fill(&mut self, fill: &FillUpdate) {
        let signed = Decimal::from(fill.side.sign()) * fill.size;
        *self
            .positions
            .entry(position_key(&fill.symbol).to_string())
            .or_insert(Decimal::ZERO) += signed;
    }

    /// Venue-authoritative absolute size for one symbol.
    pub fn apply_position(&mut self, symbol: &str, size: Decimal) {
        self.positions.insert(position_key(symbol).to_string(), size);
    }

    pub fn orders(&self, symbol: &str) -> Vec<Order> {
        let mut out: Vec<Order> = self
            .orders
            .get(symbol)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.order_id.cmp(&b.order_id)));
        out
    }

    pub fn open_order_count(&self) -> usize {
        self.orders.values().map(|m| m.len()).sum()
    }

    pub fn delta(&self, symbol: &str) -> Option<Decimal> {
        self.positions.get(position_key(symbol)).copied()
    }

    pub fn account_id(&self) -> Option<&str> { self.account_id.as_deref() }
}

pub fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Open => "open",
        OrderStatus::Matched => "matched",
        OrderStatus::Canceled => "canceled",
        OrderStatus::Modified => "modified",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(symbol: &str, id: &str) -> Order {
        Order {
            symbol: symbol.into(),
            order_id: id.into(),
            side: Side::Buy,
            price: Some(dec!(30000)),
            leaves_qty: dec!(0.0001),
            created_at: None,
            order_type: "LIMIT".into(),
        }
    }

    fn update(id: &str, status: &str, filled: Decimal) -> OrderUpdate {
        OrderUpdate {
            order: order("BTC-PERP", id),
            client_id: Some("ftx-20210909-abcdef01-1".into()),
            status: status.into(),
            filled_qty: filled,
            cancel_reason: None,
        }
    }

    #[test]
    fn new_order_is_cached_and_emits_open() {
        let mut cache = AccountStateCache::new();
        let ev = cache.apply_order_event(&update("1", "new", dec!(0))).unwrap();
        assert_eq!(ev.status, OrderStatus::Open);
        assert_eq!(ev.client_id.as_deref(), Some("ftx-20210909-abcdef01-1"));
        assert_eq!(cache.orders("BTC-PERP").len(), 1);
    }

    #[test]
    fn closed_with_fill_is_matched() {
        let mut cache = AccountStateCache::new();
        cache.apply_order_event(&update("77929828233", "new", dec!(0)));
        let ev = cache.apply_order_event(&update("77929828233", "closed", dec!(0.0001))).unwrap();
        assert_eq!(ev.status, OrderStatus::Matched);
        assert!(cache.orders("BTC-PERP").is_empty());
        assert_eq!(cache.open_order_count(), 0);
    }

    #[test]
    fn closed_without_fill_is_canceled_even_when_unknown() {
        let mut cache = AccountStateCache::new();
        let ev = cache.apply_order_event(&update("77932638250", "closed", dec!(0))).unwrap();
        assert_eq!(ev.status, OrderStatus::Canceled);
        assert!(cache.orders("BTC-PERP").is_empty());
    }

    #[test]
    fn canceled_carries_reason() {
        let mut cache = AccountStateCache::new();
        cache.apply_order_event(&update("a", "OPEN", dec!(0)));
        let mut u = update("a", "CANCELED", dec!(0));
        u.cancel_reason = Some("USER_CANCELED".into());
        let ev = cache.apply_order_event(&u).unwrap();
        assert_eq!(ev.status, OrderStatus::Canceled);
        assert_eq!(ev.cancel_reason.as_deref(), Some("USER_CANCELED"));
        assert!(cache.orders("BTC-PERP").is_empty());
    }

    #[test]
    fn filled_removes_and_pending_is_ignored() {
        let mut cache = AccountStateCache::new();
        cache.apply_order_event(&update("a", "OPEN", dec!(0)));
        assert!(cache.apply_order_event(&update("a", "PENDING", dec!(0))).is_none());
        assert!(cache.apply_order_event(&update("a", "UNTRIGGERED", dec!(0))).is_none());
        assert_eq!(cache.orders("BTC-PERP").len(), 1);
        let ev = cache.apply_order_event(&update("a", "FILLED", dec!(0.0001))).unwrap();
        assert_eq!(ev.status, OrderStatus::Matched);
        assert!(cache.orders("BTC-PERP").is_empty());
    }

    #[test]
    fn fills_accumulate_exactly() {
        let mut cache = AccountStateCache::new();
        let sell = FillUpdate { symbol: "BTC-PERP".into(), side: Side::Sell, size: dec!(0.0001) };
        cache.apply_fill(&sell);
        assert_eq!(cache.delta("BTC-PERP"), Some(dec!(-0.0001)));
        cache.apply_fill(&sell);
        cache.apply_fill(&sell);
        assert_eq!(cache.delta("BTC-PERP"), Some(dec!(-0.0003)));
    }

    #[test]
    fn spot_fills_are_keyed_by_base_asset() {
        let mut cache = AccountStateCache::new();
        cache.apply_fill(&FillUpdate { symbol: "BTC/USD".into(), side: Side::Buy, size: dec!(0.0004) });
        assert_eq!(cache.delta("BTC"), Some(dec!(0.0004)));
        assert_eq!(cache.delta("BTC/USD"), Some(dec!(0.0004)));
        assert_eq!(cache.delta("ETH/USD"), None);
    }

    #[test]
    fn snapshot_replaces_everything() {
        let mut cache = AccountStateCache::new();
        cache.apply_order_event(&update("stale", "new", dec!(0)));
        cache.apply_position("ETH-PERP", dec!(3));
        cache.apply_snapshot(AccountSnapshot {
            orders: vec![order("BTC-PERP", "x"), order("ETH-PERP", "y")],
            positions: vec![("BTC-PERP".into(), dec!(0.0001))],
            account_id: Some("12345".into()),
        });
        let ids: Vec<String> = cache.orders("BTC-PERP").into_iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec!["x".to_string()]);
        assert_eq!(cache.delta("ETH-PERP"), None);
        assert_eq!(cache.delta("BTC-PERP"), Some(dec!(0.0001)));
        assert_eq!(cache.account_id(), Some("12345"));
    }

    #[test]
    fn absolute_position_push_overwrites() {
        let mut cache = AccountStateCache::new();
        cache.apply_position("BTC-USD", dec!(0.001));
        cache.apply_position("BTC-USD", dec!(-0.002));
        assert_eq!(cache.delta("BTC-USD"), Some(dec!(-0.002)));
    }
}
