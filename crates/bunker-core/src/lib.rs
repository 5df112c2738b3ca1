//! bunker-core: the remote-signer responder.
//!
//! Lets a locally held signing key serve a single remote client over a
//! public relay transport. The client proves knowledge of a shared secret
//! with a `connect` call, after which it may invoke privileged methods
//! (sign, encrypt, decrypt, introspect).
//!
//! The signing capability and the relay transport are collaborators behind
//! the [`Signer`] and [`RelayTransport`] traits; see `bunker-signer` and
//! `bunker-relay` for concrete implementations.

pub mod auth;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod identity;
pub mod message;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod session;
pub mod signer;
pub mod transport;

// Re-export commonly used items at crate root.
pub use auth::{AuthorizationState, ConnectPolicy, SecretProvider};
pub use codec::{DecodeFailure, EnvelopeCodec};
pub use error::{BunkerError, BunkerResult};
pub use event::{Envelope, EventTemplate, Filter, KIND_NOSTR_CONNECT};
pub use identity::Identity;
pub use message::{Method, Request, Response};
pub use session::{CloseHandle, Responder, ResponderOptions};
pub use signer::{CipherSuite, Signer};
pub use transport::{RelayTransport, Subscription};
