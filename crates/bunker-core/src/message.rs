//! Request and response bodies carried inside envelopes.
//!
//! Wire format (JSON):
//! - request: `{"id": "...", "method": "...", "params": ["...", ...]}`
//! - response: `{"id": "...", "result": "...", "error": "..."}` (`error` omitted on success)

use crate::error::BunkerResult;
use crate::signer::CipherSuite;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inbound remote procedure call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    /// Correlation token echoed in the response.
    pub id: String,
    pub method: String,
    pub params: Vec<String>,
}

impl Request {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Parse with the strict schema: unknown or missing fields are rejected.
    pub fn from_json(plaintext: &str) -> BunkerResult<Self> {
        Ok(serde_json::from_str(plaintext)?)
    }

    pub fn to_json(&self) -> BunkerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn method(&self) -> Method {
        Method::parse(&self.method)
    }

    /// Positional parameter, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// The outcome of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Response {
    /// Correlation token copied from the request.
    pub id: String,
    /// Success value; empty when `error` is set.
    #[serde(default)]
    pub result: String,
    /// Failure message. Presence means the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: result.into(),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: String::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn from_json(plaintext: &str) -> BunkerResult<Self> {
        Ok(serde_json::from_str(plaintext)?)
    }

    pub fn to_json(&self) -> BunkerResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Method names understood by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Connect,
    SignEvent,
    Ping,
    GetRelays,
    GetPublicKey,
    Encrypt(CipherSuite),
    Decrypt(CipherSuite),
    /// Anything else, kept verbatim for the error message.
    Unknown(String),
}

impl Method {
    pub fn parse(name: &str) -> Self {
        match name {
            "connect" => Self::Connect,
            "sign_event" => Self::SignEvent,
            "ping" => Self::Ping,
            "get_relays" => Self::GetRelays,
            "get_public_key" => Self::GetPublicKey,
            "nip04_encrypt" => Self::Encrypt(CipherSuite::Nip04),
            "nip04_decrypt" => Self::Decrypt(CipherSuite::Nip04),
            "nip44_encrypt" => Self::Encrypt(CipherSuite::Nip44),
            "nip44_decrypt" => Self::Decrypt(CipherSuite::Nip44),
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Connect => "connect",
            Self::SignEvent => "sign_event",
            Self::Ping => "ping",
            Self::GetRelays => "get_relays",
            Self::GetPublicKey => "get_public_key",
            Self::Encrypt(CipherSuite::Nip04) => "nip04_encrypt",
            Self::Decrypt(CipherSuite::Nip04) => "nip04_decrypt",
            Self::Encrypt(CipherSuite::Nip44) => "nip44_encrypt",
            Self::Decrypt(CipherSuite::Nip44) => "nip44_decrypt",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
