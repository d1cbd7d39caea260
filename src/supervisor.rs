// ===============================
// src/supervisor.rs
// ===============================
//
// Gateway handle + connection supervisor.
//
// One background task per gateway owns the websocket session:
//   Disconnected -> Connecting -> Authenticating -> Subscribing -> SnapshotLoading -> StreamsReady
// and falls back to Disconnected on timeout, close, transport error, malformed
// frame or an explicit reconnect(). Every (re)connection starts from a clean
// slate: readiness flags, books and the account cache are all reset.
//
// Books and the account cache are only written by that task. Callers read them
// through the `Gateway` accessors, which take short parking_lot locks.
//
use ahash::AHashMap as HashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::{interval, sleep, timeout, MissedTickBehavior},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::account::AccountStateCache;
use crate::book::{BookAction, BookReconciler, BookSide, BookUpdate};
use crate::domain::{BookView, InstrumentDetails, NewOrderSingle, Order, OrderBook, OrderEvent};
use crate::error::{GatewayError, Result};
use crate::identifier::ClientOrderIdAllocator;
use crate::metrics::{DEPTH_CB_INTERVAL, GATEWAY_READY, ORDERS_PLACED, WS_CONNECTED, WS_RECONNECTS};
use crate::readiness::{Flag, ReadinessState, ReadinessTracker};
use crate::venue::{Channel, OrderAck, OrderContext, VenueAdapter, VenueMessage};

const OUTBOUND_QUEUE: usize = 256;

/// Library-level settings for one gateway.
#[derive(Clone, Debug)]
pub struct GatewaySettings {
    /// Client order id prefix seed.
    pub name: String,
    pub symbols: Vec<String>,
    pub depth: usize,
    pub recv_timeout: Duration,
    pub ping_interval: Duration,
}

impl GatewaySettings {
    /// Accepts a single symbol or any collection of them.
    pub fn new<I, S>(name: &str, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            symbols: symbols.into_iter().map(Into::into).collect(),
            depth: 5,
            recv_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribing,
    SnapshotLoading,
    StreamsReady,
    Stopped,
}

pub type DepthCallback = Arc<dyn Fn(&str, &OrderBook) + Send + Sync>;
pub type ExecutionCallback = Arc<dyn Fn(&OrderEvent) + Send + Sync>;

/// Exponential backoff without jitter: 0.5s * 2^attempt, capped at 32s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.min(6);
    Duration::from_millis(500u64.saturating_mul(1u64 << shift))
}

struct Shared {
    venue: String,
    books: RwLock<HashMap<String, BookReconciler>>,
    account: RwLock<AccountStateCache>,
    instruments: RwLock<HashMap<String, InstrumentDetails>>,
    readiness: Mutex<ReadinessTracker>,
    state: Mutex<ConnectionState>,
    depth_cb: RwLock<Option<DepthCallback>>,
    exec_cb: RwLock<Option<ExecutionCallback>>,
    reconnect: AtomicBool,
    stopped: AtomicBool,
    wake: Notify,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state == ConnectionState::Stopped || *state == next {
            return;
        }
        info!(venue = %self.venue, from = ?*state, to = ?next, "connection state");
        *state = next;
    }

    fn set_flag(&self, flag: Flag, value: bool) {
        let (flipped, ready) = {
            let mut r = self.readiness.lock();
            let flipped = r.set(flag, value);
            (flipped, r.ready())
        };
        if flag == Flag::WsConnected {
            WS_CONNECTED.with_label_values(&[self.venue.as_str()]).set(value as i64);
        }
        if flipped {
            GATEWAY_READY.with_label_values(&[self.venue.as_str()]).set(ready as i64);
            if ready {
                self.set_state(ConnectionState::StreamsReady);
            }
        }
    }

    fn flag_is_set(&self, pick: impl Fn(&ReadinessState) -> bool) -> bool {
        pick(&self.readiness.lock().state())
    }

    /// Clean slate for a new session.
    fn reset(&self) {
        let was_ready = {
            let mut r = self.readiness.lock();
            let was = r.ready();
            r.reset();
            was
        };
        if was_ready {
            info!(venue = %self.venue, "readiness reset");
        }
        WS_CONNECTED.with_label_values(&[self.venue.as_str()]).set(0);
        GATEWAY_READY.with_label_values(&[self.venue.as_str()]).set(0);
        for rec in self.books.write().values_mut() {
            rec.reset();
        }
        self.account.write().clear();
    }
}

/// Handle to one venue connection. All methods take `&self`; wrap in `Arc` to share.
pub struct Gateway {
    adapter: Arc<dyn VenueAdapter>,
    settings: GatewaySettings,
    ids: Arc<ClientOrderIdAllocator>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    pub fn new(adapter: Arc<dyn VenueAdapter>, mut settings: GatewaySettings) -> Result<Self> {
        let mut symbols: Vec<String> = Vec::with_capacity(settings.symbols.len());
        for s in settings.symbols.iter().map(|s| s.trim()) {
            if s.is_empty() {
                return Err(GatewayError::Config("blank symbol in symbol set".into()));
            }
            if !symbols.iter().any(|x| x == s) {
                symbols.push(s.to_string());
            }
        }
        if symbols.is_empty() {
            return Err(GatewayError::Config("symbol set is empty".into()));
        }
        if settings.depth == 0 {
            return Err(GatewayError::Config("depth must be at least 1".into()));
        }
        if settings.recv_timeout.is_zero() {
            return Err(GatewayError::Config("receive timeout must be positive".into()));
        }
        if settings.ping_interval.is_zero() {
            return Err(GatewayError::Config("ping interval must be positive".into()));
        }
        Url::parse(adapter.ws_url())
            .map_err(|e| GatewayError::Config(format!("bad ws url {}: {e}", adapter.ws_url())))?;
        settings.symbols = symbols;

        let books = settings
            .symbols
            .iter()
            .map(|s| (s.clone(), BookReconciler::new(s.clone(), settings.depth)))
            .collect();

        let shared = Arc::new(Shared {
            venue: adapter.name().to_string(),
            books: RwLock::new(books),
            account: RwLock::new(AccountStateCache::new()),
            instruments: RwLock::new(HashMap::new()),
            readiness: Mutex::new(ReadinessTracker::new()),
            state: Mutex::new(ConnectionState::Disconnected),
            depth_cb: RwLock::new(None),
            exec_cb: RwLock::new(None),
            reconnect: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            wake: Notify::new(),
        });

        Ok(Self {
            ids: Arc::new(ClientOrderIdAllocator::new(&settings.name)),
            adapter,
            settings,
            shared,
            task: Mutex::new(None),
        })
    }

    pub fn venue(&self) -> &str { &self.shared.venue }

    pub fn symbols(&self) -> &[String] { &self.settings.symbols }

    pub fn client_id_prefix(&self) -> &str { self.ids.prefix() }

    pub fn register_depth_callback<F>(&self, f: F)
    where
        F: Fn(&str, &OrderBook) + Send + Sync + 'static,
    {
        *self.shared.depth_cb.write() = Some(Arc::new(f));
    }

    pub fn register_execution_callback<F>(&self, f: F)
    where
        F: Fn(&OrderEvent) + Send + Sync + 'static,
    {
        *self.shared.exec_cb.write() = Some(Arc::new(f));
    }

    /// Loads instrument metadata and starts the connection task. Must be
    /// called from within a Tokio runtime. A second call is a no-op.
    pub async fn connect(&self) -> Result<()> {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(GatewayError::Config("gateway was stopped".into()));
        }
        if self.task.lock().is_some() {
            return Ok(());
        }
        load_instruments(&*self.adapter, &self.shared).await;

        let supervisor = Supervisor {
            adapter: self.adapter.clone(),
            settings: self.settings.clone(),
            ids: self.ids.clone(),
            shared: self.shared.clone(),
            last_depth_cb: None,
        };
        let mut task = self.task.lock();
        if task.is_none() {
            *task = Some(tokio::spawn(supervisor.run()));
        }
        Ok(())
    }

    /// Cooperative: the receive loop tears the session down before its next message.
    pub fn reconnect(&self) {
        info!(venue = %self.shared.venue, "reconnect requested");
        self.shared.reconnect.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// Halts the connection task for good.
    pub fn stop(&self) {
        info!(venue = %self.shared.venue, "stopping");
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.set_flag(Flag::WsConnected, false);
        *self.shared.state.lock() = ConnectionState::Stopped;
        self.shared.wake.notify_one();
    }

    pub fn not_ready(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst) || self.shared.readiness.lock().not_ready()
    }

    pub fn readiness(&self) -> ReadinessState { self.shared.readiness.lock().state() }

    pub fn state(&self) -> ConnectionState { *self.shared.state.lock() }

    pub fn set_circuit_break(&self, on: bool) {
        warn!(venue = %self.shared.venue, on, "circuit breaker");
        self.shared.set_flag(Flag::CircuitBroken, on);
    }

    pub fn set_heartbeat_lost(&self, lost: bool) {
        self.shared.set_flag(Flag::HeartbeatLost, lost);
    }

    pub fn get_ticker(&self, symbol: &str) -> BookView {
        self.shared
            .books
            .read()
            .get(symbol)
            .map(BookReconciler::get_orderbook)
            .unwrap_or(BookView::NotReady)
    }

    pub fn best_bid(&self, symbol: &str) -> Option<Decimal> {
        self.shared.books.read().get(symbol).and_then(BookReconciler::best_bid)
    }

    pub fn best_ask(&self, symbol: &str) -> Option<Decimal> {
        self.shared.books.read().get(symbol).and_then(BookReconciler::best_ask)
    }

    /// Open orders for `symbol` across the whole account.
    pub fn get_orders(&self, symbol: &str) -> Vec<Order> { self.shared.account.read().orders(symbol) }

    pub fn get_delta(&self, symbol: &str) -> Option<Decimal> { self.shared.account.read().delta(symbol) }

    pub fn get_tick_size(&self, symbol: &str) -> Option<Decimal> {
        self.shared.instruments.read().get(symbol).map(|i| i.tick_size)
    }

    pub fn get_quantity_size(&self, symbol: &str) -> Option<Decimal> {
        self.shared.instruments.read().get(symbol).map(|i| i.quantity_size)
    }

    /// Sends one order. `Ok(Some(client_id))` once the venue accepted the
    /// request, `Ok(None)` on an immediate reject or a failed request, `Err`
    /// for anything the caller got wrong.
    pub async fn place_order(&self, nos: &NewOrderSingle) -> Result<Option<String>> {
        if !self.adapter.has_credentials() {
            return Err(GatewayError::MissingCredentials);
        }
        let instrument = self
            .shared
            .instruments
            .read()
            .get(&nos.symbol)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownInstrument(nos.symbol.clone()))?;

        let client_id = self.ids.next();
        let ctx = OrderContext {
            client_id: client_id.clone(),
            instrument,
            account_id: self.shared.account.read().account_id().map(str::to_string),
        };
        let venue = self.shared.venue.as_str();

        match self.adapter.submit_order(nos, &ctx).await {
            Ok(OrderAck::Accepted) => {
                info!(%venue, symbol = %nos.symbol, %client_id, "order accepted");
                ORDERS_PLACED.with_label_values(&[venue, "accepted"]).inc();
                Ok(Some(client_id))
            }
            Ok(OrderAck::Rejected(reason)) => {
                warn!(%venue, symbol = %nos.symbol, %client_id, %reason, "order rejected");
                ORDERS_PLACED.with_label_values(&[venue, "rejected"]).inc();
                Ok(None)
            }
            Err(
                e @ (GatewayError::Http(_)
                | GatewayError::Transport(_)
                | GatewayError::Json(_)
                | GatewayError::Malformed(_)
                | GatewayError::Venue(_)),
            ) => {
                error!(%venue, symbol = %nos.symbol, %client_id, %e, "order request failed");
                ORDERS_PLACED.with_label_values(&[venue, "error"]).inc();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

async fn load_instruments(adapter: &dyn VenueAdapter, shared: &Shared) {
    match adapter.fetch_instruments().await {
        Ok(list) => {
            let mut instruments = shared.instruments.write();
            for i in list {
                instruments.insert(i.symbol.clone(), i);
            }
            info!(venue = %shared.venue, count = instruments.len(), "instrument details loaded");
        }
        Err(e) => warn!(venue = %shared.venue, %e, "instrument details unavailable"),
    }
}

enum SessionEnd {
    Stopped,
    /// Explicit reconnect(); retry immediately.
    Requested,
    /// The session died after connecting.
    Lost { reached_ready: bool, reason: String },
    /// Could not establish the session at all.
    Failed(GatewayError),
}

struct Supervisor {
    adapter: Arc<dyn VenueAdapter>,
    settings: GatewaySettings,
    ids: Arc<ClientOrderIdAllocator>,
    shared: Arc<Shared>,
    last_depth_cb: Option<Instant>,
}

impl Supervisor {
    fn stopped(&self) -> bool { self.shared.stopped.load(Ordering::SeqCst) }

    async fn run(mut self) {
        let venue = self.shared.venue.clone();
        let mut attempt: u32 = 0;
        let mut first = true;

        while !self.stopped() {
            if !first {
                WS_RECONNECTS.with_label_values(&[venue.as_str()]).inc();
            }
            first = false;

            let end = self.session().await;
            self.shared.set_flag(Flag::WsConnected, false);
            self.shared.set_state(ConnectionState::Disconnected);

            let wait = match end {
                SessionEnd::Stopped => break,
                SessionEnd::Requested => {
                    attempt = 0;
                    continue;
                }
                SessionEnd::Lost { reached_ready: true, reason } => {
                    warn!(%venue, %reason, "connection lost, reconnecting");
                    attempt = 0;
                    continue;
                }
                SessionEnd::Lost { reached_ready: false, reason } => {
                    warn!(%venue, %reason, "connection lost before streams were ready");
                    backoff_delay(attempt)
                }
                SessionEnd::Failed(e) => {
                    error!(%venue, %e, attempt, "connection attempt failed");
                    backoff_delay(attempt)
                }
            };

            // Exponential backoff + jitter
            attempt = attempt.saturating_add(1);
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=250));
            tokio::select! {
                _ = sleep(wait + jitter) => {}
                _ = self.shared.wake.notified() => {}
            }
        }
        *self.shared.state.lock() = ConnectionState::Stopped;
        info!(%venue, "connection task stopped");
    }

    async fn session(&mut self) -> SessionEnd {
        let shared = self.shared.clone();
        let venue = shared.venue.clone();
        shared.reconnect.store(false, Ordering::SeqCst);

        // ---- Connecting ----
        shared.set_state(ConnectionState::Connecting);
        shared.reset();
        let url = self.adapter.ws_url().to_string();
        info!(%venue, %url, "connecting");
        let ws = match timeout(self.settings.recv_timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws, _))) => ws,
            Ok(Err(e)) => return SessionEnd::Failed(e.into()),
            Err(_) => return SessionEnd::Failed(GatewayError::Venue(format!("connect to {url} timed out"))),
        };
        shared.set_flag(Flag::WsConnected, true);
        let (mut sink, mut stream) = ws.split();

        // Single writer for the socket; everything outbound goes through `out_tx`.
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
        let mut writer: JoinHandle<()> = tokio::spawn(async move {
            while let Some(m) = out_rx.recv().await {
                if let Err(e) = sink.send(m).await {
                    debug!(%e, "ws writer stopped");
                    break;
                }
            }
            let _ = sink.close().await;
        });
        let keepalive = self.spawn_keepalive(out_tx.clone());

        let end = self.drive(&out_tx, &mut stream).await;

        if let Some(k) = keepalive {
            k.abort();
        }
        if matches!(end, SessionEnd::Stopped) {
            let _ = out_tx.try_send(Message::Close(None));
        }
        drop(out_tx);
        if timeout(Duration::from_secs(1), &mut writer).await.is_err() {
            writer.abort();
        }
        end
    }

    fn spawn_keepalive(&self, out_tx: mpsc::Sender<Message>) -> Option<JoinHandle<()>> {
        let ping = self.adapter.ping_message()?;
        let every = self.settings.ping_interval;
        let shared = self.shared.clone();
        Some(tokio::spawn(async move {
            let mut tick = interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await;
            loop {
                tick.tick().await;
                debug!(venue = %shared.venue, "ping");
                if out_tx.try_send(Message::Text(ping.clone())).is_err() {
                    warn!(venue = %shared.venue, "ping could not be queued, heartbeat lost");
                    shared.set_flag(Flag::HeartbeatLost, true);
                    shared.reconnect.store(true, Ordering::SeqCst);
                    shared.wake.notify_one();
                    break;
                }
            }
        }))
    }

    async fn send(&self, out_tx: &mpsc::Sender<Message>, text: String) -> Result<()> {
        debug!(venue = %self.shared.venue, request = %text, "ws send");
        out_tx
            .send(Message::Text(text))
            .await
            .map_err(|_| GatewayError::Venue("ws writer closed".into()))
    }

    async fn drive<S>(&mut self, out_tx: &mpsc::Sender<Message>, stream: &mut S) -> SessionEnd
    where
        S: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        let shared = self.shared.clone();
        let venue = shared.venue.clone();

        // ---- Authenticating ----
        match self.adapter.auth_message() {
            Ok(Some(login)) => {
                shared.set_state(ConnectionState::Authenticating);
                info!(%venue, "WS - authenticating");
                if let Err(e) = self.send(out_tx, login).await {
                    return SessionEnd::Failed(e);
                }
            }
            Ok(None) => {}
            Err(e) => return SessionEnd::Failed(e),
        }

        // ---- Subscribing ----
        shared.set_state(ConnectionState::Subscribing);
        let subs = match self.adapter.subscribe_messages(&self.settings.symbols) {
            Ok(s) => s,
            Err(e) => return SessionEnd::Failed(e),
        };
        for sub in subs {
            info!(%venue, channel = sub.channel.as_str(), symbol = ?sub.symbol, "WS - subscribing");
            if let Err(e) = self.send(out_tx, sub.payload).await {
                return SessionEnd::Failed(e);
            }
        }
        if !self.adapter.has_credentials() {
            info!(%venue, "WS - no credentials, private streams skipped");
            shared.set_flag(Flag::AccountStream, true);
            shared.set_flag(Flag::PositionStream, true);
        }

        // ---- SnapshotLoading ----
        shared.set_state(ConnectionState::SnapshotLoading);
        if shared.instruments.read().is_empty() {
            load_instruments(&*self.adapter, &shared).await;
        }
        if self.adapter.has_credentials() {
            match self.adapter.fetch_account_snapshot().await {
                Ok(snapshot) => {
                    let mut account = shared.account.write();
                    account.apply_snapshot(snapshot);
                    info!(%venue, open_orders = account.open_order_count(), "REST - account snapshot loaded");
                }
                Err(e) => return SessionEnd::Failed(e),
            }
        }
        shared.set_flag(Flag::SnapshotLoaded, true);

        // ---- receive loop ----
        loop {
            if self.stopped() {
                return SessionEnd::Stopped;
            }
            if shared.reconnect.swap(false, Ordering::SeqCst) {
                info!(%venue, "received reconnect signal");
                return SessionEnd::Requested;
            }
            let reached_ready = shared.flag_is_set(ReadinessState::streams_ready);

            let frame = tokio::select! {
                f = timeout(self.settings.recv_timeout, stream.next()) => f,
                _ = shared.wake.notified() => continue,
            };
            let msg = match frame {
                Err(_) => {
                    let reason = format!("no message within {:?}", self.settings.recv_timeout);
                    return SessionEnd::Lost { reached_ready, reason };
                }
                Ok(None) => return SessionEnd::Lost { reached_ready, reason: "stream ended".into() },
                Ok(Some(Err(e))) => return SessionEnd::Lost { reached_ready, reason: e.to_string() },
                Ok(Some(Ok(m))) => m,
            };

            let text = match msg {
                Message::Text(t) => t,
                Message::Close(frame) => {
                    return SessionEnd::Lost { reached_ready, reason: format!("closed by venue: {frame:?}") };
                }
                _ => continue,
            };

            match self.adapter.parse_message(&text) {
                Ok(msgs) => {
                    for m in msgs {
                        self.dispatch(m, out_tx);
                    }
                }
                Err(e) => {
                    error!(%venue, %e, last = %text, "malformed frame, resetting ws");
                    return SessionEnd::Lost { reached_ready, reason: e.to_string() };
                }
            }
        }
    }

    fn dispatch(&mut self, msg: VenueMessage, out_tx: &mpsc::Sender<Message>) {
        let shared = self.shared.clone();
        match msg {
            VenueMessage::Connected => info!(venue = %shared.venue, "WS - connected"),
            VenueMessage::Subscribed { channel } => {
                info!(venue = %shared.venue, channel = channel.as_str(), "WS - subscribed");
                match channel {
                    Channel::Depth => {}
                    Channel::Orders => shared.set_flag(Flag::AccountStream, true),
                    Channel::Fills => shared.set_flag(Flag::PositionStream, true),
                    Channel::Account => {
                        shared.set_flag(Flag::AccountStream, true);
                        shared.set_flag(Flag::PositionStream, true);
                    }
                }
            }
            VenueMessage::Book(update) => self.on_book(update),
            VenueMessage::Orders(updates) => {
                for u in &updates {
                    let event = shared.account.write().apply_order_event(u);
                    let Some(event) = event else { continue };
                    let own = event.client_id.as_deref().is_some_and(|id| self.ids.matches(id));
                    if !own {
                        debug!(order_id = %event.order_id, "execution not originated from this connection");
                        continue;
                    }
                    let cb = shared.exec_cb.read().clone();
                    if let Some(cb) = cb {
                        cb(&event);
                    }
                }
            }
            VenueMessage::Fill(fill) => shared.account.write().apply_fill(&fill),
            VenueMessage::Positions(positions) => {
                let mut account = shared.account.write();
                for (symbol, size) in &positions {
                    account.apply_position(symbol, *size);
                }
            }
            VenueMessage::Reply(text) => {
                debug!(venue = %shared.venue, reply = %text, "ws reply");
                if out_tx.try_send(Message::Text(text)).is_err() {
                    warn!(venue = %shared.venue, "reply could not be queued");
                }
            }
            VenueMessage::Pong => debug!(venue = %shared.venue, "pong"),
            VenueMessage::Error { message } => error!(venue = %shared.venue, %message, "venue error"),
            VenueMessage::Ignored => {}
        }
    }

    fn on_book(&mut self, update: BookUpdate) {
        let shared = self.shared.clone();
        let (view, all_ready) = {
            let mut books = shared.books.write();
            let Some(rec) = books.get_mut(&update.symbol) else {
                warn!(symbol = %update.symbol, "book update for unsubscribed symbol");
                return;
            };
            if let Err(e) = rec.handle(&update) {
                warn!(%e, "book update rejected");
                return;
            }
            if update.action == BookAction::Snapshot {
                debug!(symbol = %update.symbol,
                       bids = rec.side(BookSide::Bid).live_len(),
                       asks = rec.side(BookSide::Ask).live_len(), "depth snapshot");
            }
            let view = rec.get_orderbook();
            (view, books.values().all(BookReconciler::ready))
        };

        if update.action == BookAction::Snapshot && !shared.flag_is_set(|s| s.depth_stream_ready) {
            if all_ready {
                info!(venue = %shared.venue, "WS - depth stream ready");
                shared.set_flag(Flag::DepthStream, true);
            } else {
                info!(venue = %shared.venue, "WS - depth stream not ready yet");
            }
        }

        let BookView::Ready(book) = view else { return };
        let cb = shared.depth_cb.read().clone();
        if let Some(cb) = cb {
            let now = Instant::now();
            if let Some(prev) = self.last_depth_cb.replace(now) {
                DEPTH_CB_INTERVAL.observe(now.duration_since(prev).as_secs_f64() * 1000.0);
            }
            cb(&update.symbol, &book);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountSnapshot;
    use crate::domain::{OrderType, Side};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct Offline {
        keyed: bool,
        ack: fn() -> Result<OrderAck>,
        ping: bool,
    }

    #[async_trait]
    impl VenueAdapter for Offline {
        fn name(&self) -> &str { "offline" }
        fn ws_url(&self) -> &str { "ws://127.0.0.1:1" }
        fn has_credentials(&self) -> bool { self.keyed }
        fn ping_message(&self) -> Option<String> { self.ping.then(|| "ping".to_string()) }
        fn auth_message(&self) -> Result<Option<String>> { Ok(None) }
        fn subscribe_messages(&self, _symbols: &[String]) -> Result<Vec<crate::venue::Subscription>> { Ok(vec![]) }
        fn parse_message(&self, _text: &str) -> Result<Vec<VenueMessage>> { Ok(vec![]) }
        async fn fetch_instruments(&self) -> Result<Vec<InstrumentDetails>> {
            Ok(vec![InstrumentDetails { symbol: "BTC-PERP".into(), tick_size: dec!(1), quantity_size: dec!(0.0001) }])
        }
        async fn fetch_account_snapshot(&self) -> Result<AccountSnapshot> { Ok(AccountSnapshot::default()) }
        async fn submit_order(&self, _nos: &NewOrderSingle, _ctx: &OrderContext) -> Result<OrderAck> { (self.ack)() }
    }

    fn gateway(keyed: bool, ack: fn() -> Result<OrderAck>) -> Gateway {
        Gateway::new(Arc::new(Offline { keyed, ack, ping: false }), GatewaySettings::new("test", ["BTC-PERP"])).unwrap()
    }

    #[test]
    fn settings_are_validated() {
        let adapter: Arc<dyn VenueAdapter> = Arc::new(Offline { keyed: false, ack: || Ok(OrderAck::Accepted), ping: false });
        let empty: [&str; 0] = [];
        assert!(matches!(
            Gateway::new(adapter.clone(), GatewaySettings::new("t", empty)),
            Err(GatewayError::Config(_))
        ));
        let mut zero_depth = GatewaySettings::new("t", ["BTC-PERP"]);
        zero_depth.depth = 0;
        assert!(matches!(Gateway::new(adapter.clone(), zero_depth), Err(GatewayError::Config(_))));
        let mut zero_ping = GatewaySettings::new("t", ["BTC-PERP"]);
        zero_ping.ping_interval = Duration::ZERO;
        assert!(matches!(Gateway::new(adapter.clone(), zero_ping), Err(GatewayError::Config(_))));

        let gw = Gateway::new(adapter, GatewaySettings::new("t", vec!["BTC-PERP", "ETH-PERP", "BTC-PERP"])).unwrap();
        assert_eq!(gw.symbols(), &["BTC-PERP".to_string(), "ETH-PERP".to_string()]);
    }

    fn pinging_supervisor(every: Duration) -> (Gateway, Supervisor) {
        let adapter: Arc<dyn VenueAdapter> =
            Arc::new(Offline { keyed: false, ack: || Ok(OrderAck::Accepted), ping: true });
        let mut settings = GatewaySettings::new("test", ["BTC-PERP"]);
        settings.ping_interval = every;
        let gw = Gateway::new(adapter.clone(), settings.clone()).unwrap();
        let sup = Supervisor { adapter, settings, ids: gw.ids.clone(), shared: gw.shared.clone(), last_depth_cb: None };
        (gw, sup)
    }

    #[tokio::test]
    async fn keepalive_pings_on_interval() {
        let (gw, sup) = pinging_supervisor(Duration::from_millis(20));
        let (tx, mut rx) = mpsc::channel(8);
        let keepalive = sup.spawn_keepalive(tx).unwrap();
        for _ in 0..2 {
            let frame = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
            assert_eq!(frame, Message::Text("ping".into()));
        }
        keepalive.abort();
        assert!(!gw.readiness().heartbeat_lost);
    }

    #[tokio::test]
    async fn ping_that_cannot_be_queued_marks_heartbeat_lost() {
        let (gw, sup) = pinging_supervisor(Duration::from_millis(20));
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(Message::Text("backlog".into())).unwrap();
        let keepalive = sup.spawn_keepalive(tx).unwrap();
        timeout(Duration::from_secs(2), keepalive).await.unwrap().unwrap();
        assert!(gw.readiness().heartbeat_lost);
        assert!(gw.shared.reconnect.load(Ordering::SeqCst));
        assert!(gw.not_ready());
    }

    #[test]
    fn fresh_gateway_is_not_ready() {
        let gw = gateway(false, || Ok(OrderAck::Accepted));
        assert!(gw.not_ready());
        assert_eq!(gw.state(), ConnectionState::Disconnected);
        assert_eq!(gw.get_ticker("BTC-PERP"), BookView::NotReady);
        assert_eq!(gw.get_ticker("DOGE-PERP"), BookView::NotReady);
        assert!(gw.get_orders("BTC-PERP").is_empty());
        assert_eq!(gw.get_delta("BTC-PERP"), None);
        assert_eq!(gw.get_tick_size("BTC-PERP"), None);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(6), Duration::from_secs(32));
        assert_eq!(backoff_delay(60), Duration::from_secs(32));
    }

    #[test]
    fn stop_is_permanent() {
        let gw = gateway(false, || Ok(OrderAck::Accepted));
        gw.stop();
        assert!(gw.not_ready());
        assert_eq!(gw.state(), ConnectionState::Stopped);
        gw.reconnect();
        assert_eq!(gw.state(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn connect_after_stop_is_refused() {
        let gw = gateway(false, || Ok(OrderAck::Accepted));
        gw.stop();
        assert!(matches!(gw.connect().await, Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn place_order_outcomes() {
        let nos = NewOrderSingle::limit("BTC-PERP", Side::Buy, dec!(0.001), dec!(30000));

        let public = gateway(false, || Ok(OrderAck::Accepted));
        assert!(matches!(public.place_order(&nos).await, Err(GatewayError::MissingCredentials)));

        let gw = gateway(true, || Ok(OrderAck::Accepted));
        assert!(matches!(gw.place_order(&nos).await, Err(GatewayError::UnknownInstrument(_))));
        load_instruments(&*gw.adapter, &gw.shared).await;
        assert_eq!(gw.get_tick_size("BTC-PERP"), Some(dec!(1)));
        let id = gw.place_order(&nos).await.unwrap().unwrap();
        assert!(id.starts_with(gw.client_id_prefix()));

        let rejected = gateway(true, || Ok(OrderAck::Rejected("Not enough balances".into())));
        load_instruments(&*rejected.adapter, &rejected.shared).await;
        assert_eq!(rejected.place_order(&nos).await.unwrap(), None);

        let broken = gateway(true, || Err(GatewayError::Venue("502".into())));
        load_instruments(&*broken.adapter, &broken.shared).await;
        assert_eq!(broken.place_order(&nos).await.unwrap(), None);

        let unsupported = gateway(true, || Err(GatewayError::UnsupportedOrderType("Market".into())));
        load_instruments(&*unsupported.adapter, &unsupported.shared).await;
        let mut market = nos.clone();
        market.order_type = OrderType::Market;
        assert!(matches!(unsupported.place_order(&market).await, Err(GatewayError::UnsupportedOrderType(_))));
    }

    #[test]
    fn circuit_breaker_forces_not_ready() {
        let gw = gateway(false, || Ok(OrderAck::Accepted));
        for f in [Flag::WsConnected, Flag::SnapshotLoaded, Flag::DepthStream, Flag::AccountStream, Flag::PositionStream] {
            gw.shared.set_flag(f, true);
        }
        assert!(!gw.not_ready());
        assert_eq!(gw.state(), ConnectionState::StreamsReady);
        gw.set_circuit_break(true);
        assert!(gw.not_ready());
        gw.set_circuit_break(false);
        gw.set_heartbeat_lost(true);
        assert!(gw.not_ready());
        assert!(gw.readiness().heartbeat_lost);
    }
}
