//! The signing capability the responder fronts.
//!
//! Implementations hold the actual key. The responder never sees key
//! material; it only asks for signatures and symmetric encrypt/decrypt.

use crate::error::BunkerResult;
use crate::event::{Envelope, EventTemplate};
use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two symmetric algorithm suites a signer may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherSuite {
    /// AES-256-CBC over the raw ECDH x coordinate (`<b64>?iv=<b64>`).
    Nip04,
    /// Versioned ChaCha20 + HMAC-SHA256 with padding.
    Nip44,
}

impl CipherSuite {
    /// Guess the suite a ciphertext was produced with.
    pub fn detect(ciphertext: &str) -> Self {
        if ciphertext.contains("?iv=") {
            Self::Nip04
        } else {
            Self::Nip44
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nip04 => f.write_str("nip04"),
            Self::Nip44 => f.write_str("nip44"),
        }
    }
}

impl std::str::FromStr for CipherSuite {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "nip04" => Ok(Self::Nip04),
            "nip44" => Ok(Self::Nip44),
            other => Err(format!("unknown cipher suite: {other}")),
        }
    }
}

/// A signing capability.
///
/// Failures are reported as errors; the responder does not catch them.
#[allow(async_fn_in_trait)]
pub trait Signer {
    /// The local identity.
    async fn public_key(&self) -> BunkerResult<Identity>;

    /// Sign a template, returning the finished event.
    async fn sign_event(&self, template: EventTemplate) -> BunkerResult<Envelope>;

    /// Encrypt `plaintext` for `peer`.
    async fn encrypt(&self, suite: CipherSuite, peer: &Identity, plaintext: &str)
        -> BunkerResult<String>;

    /// Decrypt `ciphertext` received from `peer`.
    async fn decrypt(&self, suite: CipherSuite, peer: &Identity, ciphertext: &str)
        -> BunkerResult<String>;

    /// Whether `suite` can be used at all.
    fn supports(&self, suite: CipherSuite) -> bool {
        let _ = suite;
        true
    }

    /// Preferred relays. Signers without a relay list return an empty one.
    async fn relays(&self) -> BunkerResult<Vec<String>> {
        Ok(Vec::new())
    }
}
