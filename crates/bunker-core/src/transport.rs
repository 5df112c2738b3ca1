//! Abstract publish/subscribe relay transport.
//!
//! The transport delivers envelopes matching a filter and accepts envelopes
//! for publication. It is responsible for signature checks on inbound
//! envelopes; the responder trusts what it is handed.

use crate::error::BunkerResult;
use crate::event::{Envelope, Filter};
use futures_util::stream::BoxStream;

/// A live subscription: an id for cancelling plus the envelope stream.
pub struct Subscription {
    pub id: String,
    pub envelopes: BoxStream<'static, Envelope>,
}

impl Subscription {
    pub fn new(id: impl Into<String>, envelopes: BoxStream<'static, Envelope>) -> Self {
        Self {
            id: id.into(),
            envelopes,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// A relay transport the responder can run over.
#[allow(async_fn_in_trait)]
pub trait RelayTransport {
    /// Open a subscription for envelopes matching `filter`.
    async fn subscribe(&self, filter: Filter) -> BunkerResult<Subscription>;

    /// Publish an envelope. Resolves once the transport has accepted it.
    async fn publish(&self, envelope: &Envelope) -> BunkerResult<()>;

    /// Cancel a subscription opened by `subscribe`.
    async fn unsubscribe(&self, subscription_id: &str) -> BunkerResult<()>;
}
