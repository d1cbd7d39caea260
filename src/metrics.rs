// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Market data --------
pub static BOOK_MESSAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("book_messages_total", "book snapshots/deltas applied per symbol"),
        &["symbol"],
    )
    .unwrap()
});

pub static BOOK_STALE: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "book_stale_updates_total",
            "price level writes skipped because their sequence was not newer",
        ),
        &["symbol"],
    )
    .unwrap()
});

// Spacing between consecutive depth callbacks (milliseconds)
pub static DEPTH_CB_INTERVAL: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("depth_callback_interval_ms", "Time between depth callbacks (ms)")
            .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]),
    )
    .unwrap()
});

// -------- Account / orders --------
pub static ORDER_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("order_events_total", "normalized order events (label: status)"),
        &["status"],
    )
    .unwrap()
});

pub static ORDERS_PLACED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("orders_placed_total", "order submissions (labels: venue, result)"),
        &["venue", "result"],
    )
    .unwrap()
});

// -------- Connection health --------
pub static WS_CONNECTED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("ws_connected", "1 if the venue websocket is connected, 0 otherwise"),
        &["venue"],
    )
    .unwrap()
});

pub static WS_RECONNECTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ws_reconnects_total", "Number of websocket (re)connection attempts after the first"),
        &["venue"],
    )
    .unwrap()
});

pub static GATEWAY_READY: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("gateway_ready", "1 if every readiness flag allows trading"),
        &["venue"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(BOOK_MESSAGES.clone())),
        REGISTRY.register(Box::new(BOOK_STALE.clone())),
        REGISTRY.register(Box::new(DEPTH_CB_INTERVAL.clone())),
        REGISTRY.register(Box::new(ORDER_EVENTS.clone())),
        REGISTRY.register(Box::new(ORDERS_PLACED.clone())),
        REGISTRY.register(Box::new(WS_CONNECTED.clone())),
        REGISTRY.register(Box::new(WS_RECONNECTS.clone())),
        REGISTRY.register(Box::new(GATEWAY_READY.clone())),
    ] {
        // already registered on a second init(), harmless
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), no header parsing
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Metrics server in a dedicated OS thread (keeps the Tokio runtime clean)
pub fn serve_metrics(port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)?;
    info!("metrics listening on http://{addr}/ (and /metrics)");

    thread::spawn(move || {
        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(%e, "metrics accept error"),
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_series_are_encoded() {
        init();
        BOOK_MESSAGES.with_label_values(&["TEST-PERP"]).inc();
        GATEWAY_READY.with_label_values(&["test"]).set(1);
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("book_messages_total{symbol=\"TEST-PERP\"}"));
        assert!(text.contains("gateway_ready{venue=\"test\"} 1"));
    }
}
