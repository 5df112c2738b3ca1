//! Envelope codec: encrypted envelopes in, requests out; responses in,
//! signed envelopes out.
//!
//! Decoding never fails loudly. A bad ciphertext or a body that does not
//! match the strict request schema comes back as a [`DecodeFailure`] the
//! session loop logs and skips.

use crate::error::BunkerResult;
use crate::event::{Envelope, EventTemplate};
use crate::identity::Identity;
use crate::message::{Request, Response};
use crate::signer::{CipherSuite, Signer};
use thiserror::Error;

/// Why an inbound envelope could not be turned into a request.
#[derive(Debug, Error)]
#[error("cannot decode {suite} envelope: {reason}")]
pub struct DecodeFailure {
    pub suite: CipherSuite,
    pub reason: String,
    /// Decrypted body, when decryption itself succeeded.
    pub plaintext: Option<String>,
}

/// Converts between envelopes and request/response bodies.
///
/// Inbound suites are detected from the ciphertext. Responses mirror the
/// suite of the request they answer unless a suite is forced.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec {
    forced: Option<CipherSuite>,
}

impl EnvelopeCodec {
    pub fn new(forced: Option<CipherSuite>) -> Self {
        Self { forced }
    }

    /// Suite every response is encrypted with, if one is forced.
    pub fn forced_suite(&self) -> Option<CipherSuite> {
        self.forced
    }

    /// Suite for a response to a request that arrived in `inbound`.
    pub fn reply_suite(&self, inbound: CipherSuite) -> CipherSuite {
        self.forced.unwrap_or(inbound)
    }

    /// Decrypt an inbound envelope (keyed to its sender) and parse the request.
    pub async fn decode<S: Signer>(
        &self,
        signer: &S,
        envelope: &Envelope,
    ) -> Result<Request, DecodeFailure> {
        let suite = CipherSuite::detect(&envelope.content);
        if !signer.supports(suite) {
            return Err(DecodeFailure {
                suite,
                reason: "suite not supported by signer".into(),
                plaintext: None,
            });
        }

        let plaintext = signer
            .decrypt(suite, &envelope.pubkey, &envelope.content)
            .await
            .map_err(|e| DecodeFailure {
                suite,
                reason: e.to_string(),
                plaintext: None,
            })?;

        Request::from_json(&plaintext).map_err(|e| DecodeFailure {
            suite,
            reason: e.to_string(),
            plaintext: Some(plaintext),
        })
    }

    /// Encrypt a response for `recipient` and wrap it in a fresh signed envelope.
    ///
    /// `inbound` is the suite the request arrived in.
    pub async fn encode<S: Signer>(
        &self,
        signer: &S,
        recipient: &Identity,
        inbound: CipherSuite,
        response: &Response,
    ) -> BunkerResult<Envelope> {
        let plaintext = response.to_json()?;
        let suite = self.reply_suite(inbound);
        let content = signer.encrypt(suite, recipient, &plaintext).await?;
        signer
            .sign_event(EventTemplate::nostr_connect(recipient, content))
            .await
    }
}
