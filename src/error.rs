//! Error types for balancelive
//!
//! None of these reach a view: the synchronizer logs them and degrades to
//! "no visible change". They exist so each layer can report what went wrong.

use thiserror::Error;

/// Failures talking to the document-fetch API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the push channel transport.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("frame schema: {0}")]
    Schema(String),
}

/// Reasons an inbound push frame is dropped.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame has no document id")]
    MissingId,
    #[error("frame does not match the update shape")]
    Shape,
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}
