use thiserror::Error;

use crate::signer::CipherSuite;

/// Errors produced by the bunker protocol layer.
#[derive(Debug, Error)]
pub enum BunkerError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("{0} is not supported by this signer")]
    UnsupportedSuite(CipherSuite),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type BunkerResult<T> = Result<T, BunkerError>;
