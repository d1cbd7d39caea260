// ===============================
// src/lib.rs
// ===============================
//
// Venue gateway: order book reconstruction, account mirroring and a readiness
// gate over one persistent venue websocket.
//
pub mod account;
pub mod book;
pub mod config;
pub mod domain;
pub mod error;
pub mod identifier;
pub mod math;
pub mod metrics;
pub mod readiness;
pub mod recorder;
pub mod supervisor;
pub mod venue;

pub use error::{GatewayError, Result};
pub use supervisor::{ConnectionState, Gateway, GatewaySettings};
