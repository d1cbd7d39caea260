// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("config error: {0}")]
    Config(String),
    #[error("unsupported order type: {0}")]
    UnsupportedOrderType(String),
    #[error("no instrument details for {0}")]
    UnknownInstrument(String),
    #[error("operation requires api credentials")]
    MissingCredentials,
    #[error("not supported by venue: {0}")]
    Unsupported(String),
    #[error("websocket: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("decimal: {0}")]
    Decimal(#[from] rust_decimal::Error),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("venue error: {0}")]
    Venue(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
