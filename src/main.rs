// ===============================
// src/main.rs
// ===============================
/*
 # readiness & connection health
curl -s localhost:9898/metrics | egrep '^(gateway_ready|ws_connected|ws_reconnects_total)'

# book activity per symbol
curl -s localhost:9898/metrics | grep '^book_messages_total'
curl -s localhost:9898/metrics | grep '^book_stale_updates_total'

*/
/*
=============================================================================
Project : venue_gateway - async crypto venue gateway in Rust
Module  : main.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Connects to one venue (FTX-style or dYdX-style), reconstructs
          per-symbol order books from snapshots + deltas, mirrors the
          account's open orders and positions, gates trading on stream
          readiness, exposes Prometheus metrics, and records JSONL events.

=============================================================================
*/
use clap::Parser;
use std::sync::Arc;
use tokio::{select, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use venue_gateway::config::{self, parse_symbols, VenueMode};
use venue_gateway::domain::Event;
use venue_gateway::{metrics, recorder, Gateway, GatewayError};

/// Command-line overrides; everything else comes from `.env` / the environment.
#[derive(Parser, Debug)]
#[command(name = "venue_gateway", version, about = "Venue gateway runner")]
struct Cli {
    /// ftx | dydx
    #[arg(long)]
    venue: Option<String>,
    /// Comma separated, e.g. BTC-PERP,ETH-PERP
    #[arg(long)]
    symbols: Option<String>,
    /// Levels per side in published books
    #[arg(long)]
    depth: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config, CLI wins ----
    let cli = Cli::parse();
    let mut cfg = config::load()?;
    if let Some(v) = cli.venue.as_deref() {
        cfg.venue = VenueMode::parse(v).ok_or_else(|| GatewayError::Config(format!("unknown venue `{v}`")))?;
        if std::env::var("GATEWAY_NAME").is_err() {
            cfg.gateway_name = cfg.venue.as_str().to_string();
        }
    }
    if let Some(s) = cli.symbols.as_deref() {
        cfg.symbols = parse_symbols(s);
    }
    if let Some(d) = cli.depth {
        cfg.depth = d;
    }

    // ---- Metrics ----
    metrics::init();
    if let Err(e) = metrics::serve_metrics(cfg.metrics_port) {
        warn!(%e, port = cfg.metrics_port, "metrics server not started");
    }

    info!(
        venue = cfg.venue.as_str(),
        symbols = ?cfg.symbols,
        depth = cfg.depth,
        keyed = cfg.api_key.is_some(),
        record_file = ?cfg.record_file,
        "startup config"
    );

    // ---- Recorder (optional) ----
    let rec = cfg.record_file.clone().map(recorder::spawn);
    if let Some(r) = &rec {
        r.record(Event::Note(format!("start venue={} symbols={:?}", cfg.venue.as_str(), cfg.symbols)));
    }

    // ---- Gateway ----
    let gateway = Arc::new(Gateway::new(cfg.adapter()?, cfg.settings())?);

    let rec_depth = rec.clone();
    gateway.register_depth_callback(move |symbol, book| {
        tracing::debug!(
            %symbol,
            bid = ?book.best_bid().map(|t| t.price),
            ask = ?book.best_ask().map(|t| t.price),
            "depth"
        );
        if let Some(r) = &rec_depth {
            r.record(Event::Depth { symbol: symbol.to_string(), book: book.clone() });
        }
    });

    let rec_exec = rec.clone();
    gateway.register_execution_callback(move |ev| {
        info!(symbol = %ev.symbol, order_id = %ev.order_id, client_id = ?ev.client_id,
              status = ?ev.status, reason = ?ev.cancel_reason, "execution");
        if let Some(r) = &rec_exec {
            r.record(Event::Exec(ev.clone()));
        }
    });

    gateway.connect().await?;

    // ---- Heartbeat ----
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        select! {
            _ = ticker.tick() => {
                for sym in gateway.symbols() {
                    info!(
                        symbol = %sym,
                        ready = !gateway.not_ready(),
                        state = ?gateway.state(),
                        bid = ?gateway.best_bid(sym),
                        ask = ?gateway.best_ask(sym),
                        delta = ?gateway.get_delta(sym),
                        open_orders = gateway.get_orders(sym).len(),
                        "heartbeat"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received");
                gateway.stop();
                break;
            }
        }
    }
    Ok(())
}
