//! A set of relay connections presented as one [`RelayTransport`].
//!
//! Subscriptions and publishes fan out to every relay. Inbound events are
//! merged in arrival order, checked against the filter, signature-verified
//! and de-duplicated before the responder sees them.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use bunker_core::{BunkerError, BunkerResult, Envelope, Filter, RelayTransport, Subscription};
use bunker_signer::verify_event;

use crate::connection::{Inbound, RelayConnection};
use crate::wire::{ClientMessage, RelayMessage};

/// Inbound queue depth shared by all connections.
const INBOUND_CAPACITY: usize = 256;

/// How many recent event ids are remembered for de-duplication.
pub const SEEN_WINDOW: usize = 1024;

/// Bounded memory of recently delivered event ids.
#[derive(Debug)]
pub struct SeenEvents {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record `id`. Returns false if it was already seen.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }
}

pub struct RelayPool {
    connections: Vec<RelayConnection>,
    inbound: Mutex<Option<mpsc::Receiver<Inbound>>>,
}

impl RelayPool {
    /// Connect to every URL. Unreachable relays are skipped; at least one
    /// must connect.
    pub async fn connect(urls: &[String]) -> BunkerResult<Self> {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let mut connections = Vec::new();
        for url in urls {
            match RelayConnection::connect(url, tx.clone()).await {
                Ok(connection) => connections.push(connection),
                Err(e) => warn!(relay = %url, error = %e, "skipping relay"),
            }
        }
        if connections.is_empty() {
            return Err(BunkerError::Transport("no relay could be reached".into()));
        }
        info!(connected = connections.len(), configured = urls.len(), "relay pool ready");

        Ok(Self {
            connections,
            inbound: Mutex::new(Some(rx)),
        })
    }

    /// URLs of the relays that accepted a connection.
    pub fn urls(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.url().to_string()).collect()
    }

    pub fn connected_count(&self) -> usize {
        self.connections.iter().filter(|c| c.is_connected()).count()
    }

    pub async fn close(&self) {
        for connection in &self.connections {
            connection.close().await;
        }
    }

    /// Send to every relay; succeeds if at least one relay took it.
    async fn broadcast(&self, message: &ClientMessage) -> BunkerResult<()> {
        let mut last_error = None;
        let mut delivered = 0;
        for connection in &self.connections {
            match connection.send(message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(relay = %connection.url(), error = %e, "send failed");
                    last_error = Some(e);
                }
            }
        }
        match (delivered, last_error) {
            (0, Some(e)) => Err(e),
            (0, None) => Err(BunkerError::Transport("relay pool is empty".into())),
            _ => Ok(()),
        }
    }
}

/// Per-subscription delivery state.
struct Delivery {
    rx: mpsc::Receiver<Inbound>,
    subscription_id: String,
    filter: Filter,
    seen: SeenEvents,
}

impl Delivery {
    /// Decide what, if anything, an inbound message yields.
    fn accept(&mut self, inbound: Inbound) -> Option<Envelope> {
        let relay = inbound.relay;
        match inbound.message {
            RelayMessage::Event {
                subscription_id,
                event,
            } if subscription_id == self.subscription_id => {
                if !self.filter.matches(&event) {
                    trace!(relay = %relay, event = %event.id, "event outside filter");
                    return None;
                }
                if !event.pubkey.is_hex_key() {
                    warn!(relay = %relay, event = %event.id, "dropping event with malformed pubkey");
                    return None;
                }
                if let Err(e) = verify_event(&event) {
                    warn!(relay = %relay, error = %e, "dropping unverifiable event");
                    return None;
                }
                if !self.seen.insert(&event.id) {
                    trace!(relay = %relay, event = %event.id, "duplicate event");
                    return None;
                }
                Some(*event)
            }
            RelayMessage::Event { .. } => None,
            RelayMessage::Ok {
                event_id,
                accepted: false,
                message,
            } => {
                warn!(relay = %relay, event = %event_id, reason = %message, "relay rejected event");
                None
            }
            RelayMessage::Ok { event_id, .. } => {
                debug!(relay = %relay, event = %event_id, "relay accepted event");
                None
            }
            RelayMessage::Eose(_) => {
                debug!(relay = %relay, "end of stored events");
                None
            }
            RelayMessage::Notice(notice) => {
                warn!(relay = %relay, notice = %notice, "relay notice");
                None
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                if subscription_id == self.subscription_id {
                    warn!(relay = %relay, reason = %message, "relay closed subscription");
                }
                None
            }
            RelayMessage::Auth(_) => {
                debug!(relay = %relay, "relay asked for authentication; ignoring");
                None
            }
        }
    }
}

impl RelayTransport for RelayPool {
    async fn subscribe(&self, filter: Filter) -> BunkerResult<Subscription> {
        let rx = self
            .inbound
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .ok_or_else(|| BunkerError::Transport("relay pool already has a subscription".into()))?;

        let subscription_id = hex::encode(rand::random::<[u8; 8]>());
        self.broadcast(&ClientMessage::Req {
            subscription_id: subscription_id.clone(),
            filters: vec![filter.clone()],
        })
        .await?;
        debug!(subscription = %subscription_id, "subscription opened");

        let delivery = Delivery {
            rx,
            subscription_id: subscription_id.clone(),
            filter,
            seen: SeenEvents::new(SEEN_WINDOW),
        };
        let envelopes = futures_util::stream::unfold(delivery, |mut delivery| async move {
            loop {
                let inbound = delivery.rx.recv().await?;
                if let Some(envelope) = delivery.accept(inbound) {
                    return Some((envelope, delivery));
                }
            }
        })
        .boxed();

        Ok(Subscription::new(subscription_id, envelopes))
    }

    async fn publish(&self, envelope: &Envelope) -> BunkerResult<()> {
        self.broadcast(&ClientMessage::Event(envelope.clone())).await?;
        trace!(event = %envelope.id, "event published");
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> BunkerResult<()> {
        self.broadcast(&ClientMessage::Close(subscription_id.to_string()))
            .await
    }
}
