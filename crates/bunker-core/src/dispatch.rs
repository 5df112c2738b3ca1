//! Request dispatch.
//!
//! `connect` is the only method served to strangers. Everything else needs
//! the caller to be the authorized identity, and each privileged method maps
//! to exactly one call on the signer.
//!
//! Malformed params from the authorized caller come back as an error
//! response. Signer failures are returned as `Err`, never folded into a
//! response.

use crate::auth::AuthorizationState;
use crate::error::{BunkerError, BunkerResult};
use crate::event::EventTemplate;
use crate::identity::Identity;
use crate::message::{Method, Request, Response};
use crate::signer::{CipherSuite, Signer};
use tracing::debug;

/// Error message for privileged calls from anyone but the authorized caller.
pub const UNAUTHORIZED: &str = "Unauthorized";

/// Routes one request on behalf of `caller`.
pub struct Dispatcher<'a, S> {
    signer: &'a S,
    auth: &'a mut AuthorizationState,
}

impl<'a, S: Signer> Dispatcher<'a, S> {
    pub fn new(signer: &'a S, auth: &'a mut AuthorizationState) -> Self {
        Self { signer, auth }
    }

    /// Handle a request. `Ok(None)` means nothing must be sent back.
    pub async fn handle(
        &mut self,
        caller: &Identity,
        request: Request,
    ) -> BunkerResult<Option<Response>> {
        let method = request.method();
        debug!(caller = %caller.short(), id = %request.id, method = %method, "dispatching");

        let result = match method {
            Method::Connect => {
                let target = request.param(0).unwrap_or_default();
                let secret = request.param(1).unwrap_or_default();
                if self.auth.try_connect(caller, target, secret) {
                    return Ok(Some(Response::ok(request.id, "ack")));
                }
                return Ok(None);
            }
            _ if !self.auth.is_authorized(caller) => {
                return Ok(Some(Response::error(request.id, UNAUTHORIZED)));
            }
            Method::Unknown(name) => {
                return Ok(Some(Response::error(
                    request.id,
                    format!("Unrecognized method: {name}"),
                )));
            }
            Method::SignEvent => self.sign_event(&request).await,
            Method::Ping => Ok("pong".to_string()),
            Method::GetRelays => self.relays().await,
            Method::GetPublicKey => Ok(self.auth.local_identity().to_string()),
            Method::Encrypt(suite) => self.encrypt(suite, &request).await,
            Method::Decrypt(suite) => self.decrypt(suite, &request).await,
        };

        match result {
            Ok(result) => Ok(Some(Response::ok(request.id, result))),
            Err(BunkerError::InvalidRequest(reason)) => {
                debug!(caller = %caller.short(), id = %request.id, reason = %reason, "invalid request");
                Ok(Some(Response::error(request.id, reason)))
            }
            Err(e) => Err(e),
        }
    }

    async fn relays(&self) -> BunkerResult<String> {
        Ok(serde_json::to_string(&self.signer.relays().await?)?)
    }

    async fn encrypt(&self, suite: CipherSuite, request: &Request) -> BunkerResult<String> {
        let (peer, plaintext) = peer_and_payload(request)?;
        self.ensure_supported(suite)?;
        self.signer.encrypt(suite, &peer, plaintext).await
    }

    async fn decrypt(&self, suite: CipherSuite, request: &Request) -> BunkerResult<String> {
        let (peer, ciphertext) = peer_and_payload(request)?;
        self.ensure_supported(suite)?;
        self.signer.decrypt(suite, &peer, ciphertext).await
    }

    async fn sign_event(&self, request: &Request) -> BunkerResult<String> {
        let raw = request
            .param(0)
            .ok_or_else(|| BunkerError::InvalidRequest("sign_event needs an event".into()))?;
        let template: EventTemplate = serde_json::from_str(raw)
            .map_err(|e| BunkerError::InvalidRequest(format!("bad event template: {e}")))?;
        let signed = self.signer.sign_event(template).await?;
        Ok(serde_json::to_string(&signed)?)
    }

    fn ensure_supported(&self, suite: CipherSuite) -> BunkerResult<()> {
        if self.signer.supports(suite) {
            Ok(())
        } else {
            Err(BunkerError::UnsupportedSuite(suite))
        }
    }
}

fn peer_and_payload(request: &Request) -> BunkerResult<(Identity, &str)> {
    match (request.param(0), request.param(1)) {
        (Some(peer), Some(payload)) => Ok((Identity::from(peer), payload)),
        _ => Err(BunkerError::InvalidRequest(format!(
            "{} needs [peer, payload]",
            request.method
        ))),
    }
}
