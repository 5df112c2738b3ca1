//! Authorization state: who may invoke privileged methods.
//!
//! At most one remote identity is authorized at a time. It gets there by a
//! `connect` naming the local identity and presenting the shared secret.
//! The slot is a single-value watch channel so the host can observe
//! authorizations (e.g. to persist them) without callbacks.

use crate::identity::Identity;
use ring::constant_time::verify_slices_are_equal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Source of the shared connect secret.
///
/// Queried on every connect attempt and never cached, so the secret can
/// rotate underneath a running session. `None` rejects every connect, and
/// so does an empty secret.
pub trait SecretProvider: Send + Sync {
    fn secret(&self) -> Option<String>;
}

impl SecretProvider for String {
    fn secret(&self) -> Option<String> {
        Some(self.clone()).filter(|s| !s.is_empty())
    }
}

impl<F> SecretProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn secret(&self) -> Option<String> {
        self()
    }
}

/// What a successful connect from a second caller does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectPolicy {
    /// The newest successful connect wins.
    #[default]
    Rebind,
    /// Once bound, only the bound caller may connect again.
    Exclusive,
}

/// The single authorization slot.
pub struct AuthorizationState {
    local: Identity,
    secret: Arc<dyn SecretProvider>,
    policy: ConnectPolicy,
    authorized: Arc<watch::Sender<Option<Identity>>>,
}

impl AuthorizationState {
    /// A fresh, unauthorized state.
    pub fn new(local: Identity, secret: impl SecretProvider + 'static) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self::attach(local, Arc::new(secret), ConnectPolicy::default(), Arc::new(tx))
    }

    /// Build around an existing slot (owned by the responder across runs).
    pub(crate) fn attach(
        local: Identity,
        secret: Arc<dyn SecretProvider>,
        policy: ConnectPolicy,
        authorized: Arc<watch::Sender<Option<Identity>>>,
    ) -> Self {
        Self {
            local,
            secret,
            policy,
            authorized,
        }
    }

    pub fn with_policy(mut self, policy: ConnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resume a binding from an earlier session.
    pub fn with_authorized(self, identity: Option<Identity>) -> Self {
        self.authorized.send_replace(identity);
        self
    }

    pub fn local_identity(&self) -> &Identity {
        &self.local
    }

    pub fn policy(&self) -> ConnectPolicy {
        self.policy
    }

    /// Currently authorized identity, if any.
    pub fn authorized(&self) -> Option<Identity> {
        self.authorized.borrow().clone()
    }

    /// Observe the slot. Changes once per accepted connect.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.authorized.subscribe()
    }

    /// Validate a connect handshake and bind `caller` on success.
    ///
    /// Rejections leave the slot untouched.
    pub fn try_connect(&mut self, caller: &Identity, remote_target: &str, secret: &str) -> bool {
        if remote_target != self.local.as_str() {
            debug!(caller = %caller.short(), "connect rejected: wrong target");
            return false;
        }

        let Some(expected) = self.secret.secret().filter(|s| !s.is_empty()) else {
            debug!(caller = %caller.short(), "connect rejected: no secret configured");
            return false;
        };
        if verify_slices_are_equal(expected.as_bytes(), secret.as_bytes()).is_err() {
            debug!(caller = %caller.short(), "connect rejected: wrong secret");
            return false;
        }

        if self.policy == ConnectPolicy::Exclusive {
            if let Some(current) = self.authorized() {
                if current != *caller {
                    debug!(
                        caller = %caller.short(),
                        bound = %current.short(),
                        "connect rejected: already bound"
                    );
                    return false;
                }
            }
        }

        if let Some(previous) = self.authorized.send_replace(Some(caller.clone())) {
            if previous != *caller {
                info!(caller = %caller, previous = %previous, "authorization rebound");
                return true;
            }
        }
        info!(caller = %caller, "caller authorized");
        true
    }

    /// Whether `caller` is the authorized identity.
    pub fn is_authorized(&self, caller: &Identity) -> bool {
        self.authorized.borrow().as_ref() == Some(caller)
    }
}

impl std::fmt::Debug for AuthorizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationState")
            .field("local", &self.local)
            .field("policy", &self.policy)
            .field("authorized", &self.authorized())
            .finish_non_exhaustive()
    }
}
