//! The session loop.
//!
//! One task, one envelope at a time: decode, dispatch, encode, publish, and
//! only then look at the next envelope. Closing is cooperative; it is
//! noticed between envelopes, never in the middle of one.

use crate::auth::{AuthorizationState, ConnectPolicy, SecretProvider};
use crate::codec::EnvelopeCodec;
use crate::dispatch::Dispatcher;
use crate::error::BunkerResult;
use crate::event::{Envelope, Filter};
use crate::identity::Identity;
use crate::signer::{CipherSuite, Signer};
use crate::transport::RelayTransport;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Construction parameters for a [`Responder`].
pub struct ResponderOptions {
    /// Shared connect secret, read at every connect.
    pub secret: Arc<dyn SecretProvider>,
    /// Identity authorized by an earlier session, if resuming.
    pub authorized: Option<Identity>,
    pub policy: ConnectPolicy,
    /// Suite forced on every response. `None` answers in the request's suite.
    pub suite: Option<CipherSuite>,
}

impl ResponderOptions {
    pub fn new(secret: impl SecretProvider + 'static) -> Self {
        Self {
            secret: Arc::new(secret),
            authorized: None,
            policy: ConnectPolicy::default(),
            suite: None,
        }
    }

    pub fn with_authorized(mut self, identity: Option<Identity>) -> Self {
        self.authorized = identity;
        self
    }

    pub fn with_policy(mut self, policy: ConnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_suite(mut self, suite: CipherSuite) -> Self {
        self.suite = Some(suite);
        self
    }
}

/// Cancels a running [`Responder`] from elsewhere.
#[derive(Debug, Clone)]
pub struct CloseHandle(CancellationToken);

impl CloseHandle {
    pub fn close(&self) {
        self.0.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Serves remote-signer requests for one signer over one transport.
pub struct Responder<S, T> {
    signer: S,
    transport: T,
    codec: EnvelopeCodec,
    secret: Arc<dyn SecretProvider>,
    policy: ConnectPolicy,
    authorized: Arc<watch::Sender<Option<Identity>>>,
    cancel: CancellationToken,
}

impl<S: Signer, T: RelayTransport> Responder<S, T> {
    pub fn new(signer: S, transport: T, options: ResponderOptions) -> Self {
        let (tx, _rx) = watch::channel(options.authorized);
        Self {
            signer,
            transport,
            codec: EnvelopeCodec::new(options.suite),
            secret: options.secret,
            policy: options.policy,
            authorized: Arc::new(tx),
            cancel: CancellationToken::new(),
        }
    }

    /// Handle for closing the loop from another task.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle(self.cancel.clone())
    }

    /// Stop the loop once the current envelope (if any) is finished.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Watch the authorization slot; updated on every accepted connect.
    pub fn authorizations(&self) -> watch::Receiver<Option<Identity>> {
        self.authorized.subscribe()
    }

    /// Currently authorized identity.
    pub fn authorized(&self) -> Option<Identity> {
        self.authorized.borrow().clone()
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Serve until closed or until the subscription ends.
    ///
    /// Signer and transport failures while handling an envelope end the
    /// loop with that error.
    pub async fn run(&mut self) -> BunkerResult<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let local = self.signer.public_key().await?;
        let mut auth = AuthorizationState::attach(
            local.clone(),
            self.secret.clone(),
            self.policy,
            self.authorized.clone(),
        );

        let mut subscription = self.transport.subscribe(Filter::addressed_to(&local)).await?;
        info!(
            identity = %local,
            subscription = %subscription.id,
            forced_suite = ?self.codec.forced_suite(),
            "responder listening"
        );

        let outcome = loop {
            let envelope = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("responder closed");
                    break Ok(());
                }
                next = subscription.envelopes.next() => match next {
                    Some(envelope) => envelope,
                    None => {
                        info!("subscription ended");
                        break Ok(());
                    }
                },
            };

            if let Err(e) = self.process(&mut auth, envelope).await {
                break Err(e);
            }
        };

        if let Err(e) = self.transport.unsubscribe(&subscription.id).await {
            debug!(error = %e, "unsubscribe failed");
        }
        outcome
    }

    /// One full iteration: decode, dispatch, encode, publish.
    async fn process(&self, auth: &mut AuthorizationState, envelope: Envelope) -> BunkerResult<()> {
        let caller = envelope.pubkey.clone();

        let request = match self.codec.decode(&self.signer, &envelope).await {
            Ok(request) => request,
            Err(failure) => {
                warn!(
                    event = %envelope.id,
                    sender = %caller.short(),
                    plaintext = failure.plaintext.as_deref().unwrap_or("<undecryptable>"),
                    "dropping envelope: {failure}"
                );
                return Ok(());
            }
        };

        let request_id = request.id.clone();
        let Some(response) = Dispatcher::new(&self.signer, auth).handle(&caller, request).await?
        else {
            return Ok(());
        };

        let inbound = CipherSuite::detect(&envelope.content);
        let reply = self
            .codec
            .encode(&self.signer, &caller, inbound, &response)
            .await?;
        self.transport.publish(&reply).await?;
        debug!(
            id = %request_id,
            caller = %caller.short(),
            error = response.error.as_deref().unwrap_or(""),
            "response published"
        );
        Ok(())
    }
}
