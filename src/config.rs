// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : venue_gateway - async crypto venue gateway in Rust
Module  : config.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Connects to one venue (FTX-style or dYdX-style), reconstructs
          per-symbol order books from snapshots + deltas, mirrors the
          account's open orders and positions, gates trading on stream
          readiness, exposes Prometheus metrics, and records JSONL events.

=============================================================================
*/
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::supervisor::GatewaySettings;
use crate::venue::dydx::{DydxAdapter, DydxCredentials};
use crate::venue::ftx::{FtxAdapter, FtxCredentials};
use crate::venue::VenueAdapter;

/// Which venue adapter to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VenueMode {
    Ftx,
    Dydx,
}

impl VenueMode {
    pub fn parse(s: &str) -> Option<VenueMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ftx" => Some(VenueMode::Ftx),
            "dydx" => Some(VenueMode::Dydx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VenueMode::Ftx => "ftx",
            VenueMode::Dydx => "dydx",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub venue: VenueMode,
    pub symbols: Vec<String>,
    pub depth: usize,
    pub gateway_name: String,

    // endpoints (None = venue default)
    pub ws_url: Option<String>,
    pub rest_url: Option<String>,

    // credentials; absent = public-only mode
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_passphrase: Option<String>,

    pub recv_timeout: Duration,
    pub ping_interval: Duration,

    // files/metrics
    pub metrics_port: u16,
    pub record_file: Option<String>,
}

/// SYMBOLS=BTC-PERP,eth-perp -> ["BTC-PERP", "ETH-PERP"]
pub fn parse_symbols(s: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for sym in s.split(',').map(str::trim).filter(|x| !x.is_empty()) {
        let sym = sym.to_ascii_uppercase();
        if !out.contains(&sym) {
            out.push(sym);
        }
    }
    out
}

impl Config {
    /// Builds the config from any key lookup; `load()` uses the process env.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let venue = match non_empty("VENUE") {
            Some(v) => VenueMode::parse(&v)
                .ok_or_else(|| GatewayError::Config(format!("unknown VENUE `{v}` (ftx|dydx)")))?,
            None => VenueMode::Ftx,
        };

        let symbols = non_empty("SYMBOLS").map(|s| parse_symbols(&s)).unwrap_or_default();

        let num = |k: &str, default: u64| -> Result<u64> {
            match non_empty(k) {
                Some(v) => v.parse().map_err(|_| GatewayError::Config(format!("{k} must be an integer, got `{v}`"))),
                None => Ok(default),
            }
        };

        let metrics_port = u16::try_from(num("METRICS_PORT", 9898)?)
            .map_err(|_| GatewayError::Config("METRICS_PORT out of range".into()))?;

        Ok(Config {
            venue,
            symbols,
            depth: num("DEPTH", 5)? as usize,
            gateway_name: non_empty("GATEWAY_NAME").unwrap_or_else(|| venue.as_str().to_string()),
            ws_url: non_empty("WS_URL"),
            rest_url: non_empty("REST_URL"),
            api_key: non_empty("API_KEY"),
            api_secret: non_empty("API_SECRET"),
            api_passphrase: non_empty("API_PASSPHRASE"),
            recv_timeout: Duration::from_secs(num("RECV_TIMEOUT_SECS", 10)?),
            ping_interval: Duration::from_secs(num("PING_INTERVAL_SECS", 15)?),
            metrics_port,
            record_file: non_empty("RECORD_FILE"),
        })
    }

    pub fn settings(&self) -> GatewaySettings {
        GatewaySettings {
            name: self.gateway_name.clone(),
            symbols: self.symbols.clone(),
            depth: self.depth,
            recv_timeout: self.recv_timeout,
            ping_interval: self.ping_interval,
        }
    }

    /// Venue adapter for the configured mode. Partial credentials are rejected
    /// rather than silently falling back to public-only.
    pub fn adapter(&self) -> Result<Arc<dyn VenueAdapter>> {
        let key = self.api_key.clone();
        let secret = self.api_secret.clone();
        match self.venue {
            VenueMode::Ftx => {
                let creds = match (key, secret) {
                    (Some(api_key), Some(api_secret)) => Some(FtxCredentials { api_key, api_secret }),
                    (None, None) => None,
                    _ => return Err(GatewayError::Config("ftx needs both API_KEY and API_SECRET".into())),
                };
                Ok(Arc::new(FtxAdapter::new(creds).with_urls(self.ws_url.clone(), self.rest_url.clone())))
            }
            VenueMode::Dydx => {
                let creds = match (key, secret, self.api_passphrase.clone()) {
                    (Some(api_key), Some(api_secret), Some(passphrase)) => {
                        Some(DydxCredentials { api_key, api_secret, passphrase })
                    }
                    (None, None, None) => None,
                    _ => {
                        return Err(GatewayError::Config(
                            "dydx needs API_KEY, API_SECRET and API_PASSPHRASE".into(),
                        ))
                    }
                };
                Ok(Arc::new(DydxAdapter::new(creds).with_urls(self.ws_url.clone(), self.rest_url.clone())))
            }
        }
    }
}

pub fn load() -> Result<Config> {
    // .env first so RECORD_FILE, SYMBOLS, ... are visible
    let _ = dotenv();
    Config::from_lookup(|k| env::var(k).ok())
}
