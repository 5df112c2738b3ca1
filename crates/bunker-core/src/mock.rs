//! In-memory signer and relay for tests.
//!
//! `MockSigner` uses transparent, reversible "encryption" bound to the pair
//! of identities involved, so a ciphertext only decrypts when keyed to the
//! right peer. `MockRelay` feeds envelopes through a channel and records
//! everything published.
//!
//! Only built for this crate's tests and with the `test-util` feature.

use crate::error::{BunkerError, BunkerResult};
use crate::event::{Envelope, EventTemplate, Filter};
use crate::identity::Identity;
use crate::signer::{CipherSuite, Signer};
use crate::transport::{RelayTransport, Subscription};
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Shared, ordered log of calls made against the mocks.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(journal: &Option<Journal>, entry: &str) {
    if let Some(journal) = journal {
        if let Ok(mut entries) = journal.lock() {
            entries.push(entry.to_string());
        }
    }
}

/// A signer with fake but pair-bound crypto.
#[derive(Debug, Clone)]
pub struct MockSigner {
    identity: Identity,
    relays: Vec<String>,
    suites: Vec<CipherSuite>,
    sign_delay: Option<Duration>,
    fail_signing: bool,
    journal: Option<Journal>,
}

impl MockSigner {
    pub fn new(identity: impl Into<Identity>) -> Self {
        Self {
            identity: identity.into(),
            relays: Vec::new(),
            suites: vec![CipherSuite::Nip04, CipherSuite::Nip44],
            sign_delay: None,
            fail_signing: false,
            journal: None,
        }
    }

    pub fn with_relays(mut self, relays: Vec<String>) -> Self {
        self.relays = relays;
        self
    }

    pub fn with_suites(mut self, suites: Vec<CipherSuite>) -> Self {
        self.suites = suites;
        self
    }

    /// Delay every signature, to make ordering observable.
    pub fn with_sign_delay(mut self, delay: Duration) -> Self {
        self.sign_delay = Some(delay);
        self
    }

    /// Make every signature fail.
    pub fn failing(mut self) -> Self {
        self.fail_signing = true;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Order-independent tag for the (self, peer) pair, like an ECDH secret.
    fn pair(&self, peer: &Identity) -> String {
        let (a, b) = if self.identity <= *peer {
            (&self.identity, peer)
        } else {
            (peer, &self.identity)
        };
        format!("{a}+{b}")
    }

    /// Client-side helper: seal `plaintext` into an envelope for `recipient`.
    pub async fn seal(
        &self,
        suite: CipherSuite,
        recipient: &Identity,
        plaintext: &str,
    ) -> BunkerResult<Envelope> {
        let content = self.encrypt(suite, recipient, plaintext).await?;
        self.sign_event(EventTemplate::nostr_connect(recipient, content)).await
    }

    /// Client-side helper: open an envelope sent by `envelope.pubkey`.
    pub async fn open(&self, envelope: &Envelope) -> BunkerResult<String> {
        let suite = CipherSuite::detect(&envelope.content);
        self.decrypt(suite, &envelope.pubkey, &envelope.content).await
    }
}

impl Signer for MockSigner {
    async fn public_key(&self) -> BunkerResult<Identity> {
        Ok(self.identity.clone())
    }

    async fn sign_event(&self, template: EventTemplate) -> BunkerResult<Envelope> {
        record(&self.journal, "sign_event:start");
        if let Some(delay) = self.sign_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_signing {
            return Err(BunkerError::Signer("mock signer refuses to sign".into()));
        }
        let id = template.id_for(&self.identity);
        record(&self.journal, "sign_event:end");
        Ok(Envelope {
            sig: format!("mocksig:{id}"),
            id,
            pubkey: self.identity.clone(),
            created_at: template.created_at,
            kind: template.kind,
            tags: template.tags,
            content: template.content,
        })
    }

    async fn encrypt(
        &self,
        suite: CipherSuite,
        peer: &Identity,
        plaintext: &str,
    ) -> BunkerResult<String> {
        if !self.supports(suite) {
            return Err(BunkerError::UnsupportedSuite(suite));
        }
        record(&self.journal, "encrypt");
        let body = hex::encode(plaintext.as_bytes());
        Ok(match suite {
            CipherSuite::Nip04 => format!("{body}?iv={}", self.pair(peer)),
            CipherSuite::Nip44 => format!("mock44:{}:{body}", self.pair(peer)),
        })
    }

    async fn decrypt(
        &self,
        suite: CipherSuite,
        peer: &Identity,
        ciphertext: &str,
    ) -> BunkerResult<String> {
        if !self.supports(suite) {
            return Err(BunkerError::UnsupportedSuite(suite));
        }
        record(&self.journal, "decrypt");
        let (pair, body) = match suite {
            CipherSuite::Nip04 => ciphertext
                .split_once("?iv=")
                .map(|(body, pair)| (pair, body)),
            CipherSuite::Nip44 => ciphertext
                .strip_prefix("mock44:")
                .and_then(|rest| rest.rsplit_once(':')),
        }
        .ok_or_else(|| BunkerError::Signer(format!("malformed {suite} payload")))?;

        if pair != self.pair(peer) {
            return Err(BunkerError::Signer("ciphertext not keyed to this peer".into()));
        }
        let bytes = hex::decode(body).map_err(|e| BunkerError::Signer(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| BunkerError::Signer(e.to_string()))
    }

    fn supports(&self, suite: CipherSuite) -> bool {
        self.suites.contains(&suite)
    }

    async fn relays(&self) -> BunkerResult<Vec<String>> {
        Ok(self.relays.clone())
    }
}

struct MockRelayInner {
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    published: Mutex<Vec<Envelope>>,
    filters: Mutex<Vec<Filter>>,
    unsubscribed: Mutex<Vec<String>>,
    notify: Notify,
    journal: Option<Journal>,
}

/// A relay living entirely in memory.
#[derive(Clone)]
pub struct MockRelay {
    inner: Arc<MockRelayInner>,
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRelay {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self::build(Some(journal))
    }

    fn build(journal: Option<Journal>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockRelayInner {
                inbound_tx: Mutex::new(Some(tx)),
                inbound_rx: Mutex::new(Some(rx)),
                published: Mutex::new(Vec::new()),
                filters: Mutex::new(Vec::new()),
                unsubscribed: Mutex::new(Vec::new()),
                notify: Notify::new(),
                journal,
            }),
        }
    }

    /// Queue an envelope for delivery to the subscriber.
    pub fn deliver(&self, envelope: Envelope) {
        if let Ok(guard) = self.inner.inbound_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(envelope);
            }
        }
    }

    /// End the subscription stream once queued envelopes are drained.
    pub fn finish(&self) {
        if let Ok(mut guard) = self.inner.inbound_tx.lock() {
            guard.take();
        }
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<Envelope> {
        self.inner
            .published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Filters the responder subscribed with.
    pub fn filters(&self) -> Vec<Filter> {
        self.inner
            .filters
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// Subscription ids that were cancelled.
    pub fn unsubscribed(&self) -> Vec<String> {
        self.inner
            .unsubscribed
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    /// Wait until at least `count` envelopes have been published.
    pub async fn wait_for_published(&self, count: usize) {
        loop {
            let notified = self.inner.notify.notified();
            if self.published().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl RelayTransport for MockRelay {
    async fn subscribe(&self, filter: Filter) -> BunkerResult<Subscription> {
        let rx = self
            .inner
            .inbound_rx
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .ok_or_else(|| BunkerError::Transport("mock relay already subscribed".into()))?;

        if let Ok(mut filters) = self.inner.filters.lock() {
            filters.push(filter.clone());
        }

        // Mock envelopes are built at arbitrary times; only kind and recipient count.
        let filter = Filter {
            since: None,
            ..filter
        };
        let envelopes = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|envelope| (envelope, rx))
        })
        .filter(move |envelope| std::future::ready(filter.matches(envelope)))
        .boxed();

        Ok(Subscription::new("mock-sub", envelopes))
    }

    async fn publish(&self, envelope: &Envelope) -> BunkerResult<()> {
        record(&self.inner.journal, "publish");
        if let Ok(mut published) = self.inner.published.lock() {
            published.push(envelope.clone());
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> BunkerResult<()> {
        if let Ok(mut unsubscribed) = self.inner.unsubscribed.lock() {
            unsubscribed.push(subscription_id.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_crypto_is_pair_bound() {
        let alice = MockSigner::new("alice");
        let bob = MockSigner::new("bob");
        let carol = MockSigner::new("carol");

        for suite in [CipherSuite::Nip04, CipherSuite::Nip44] {
            let ct = alice.encrypt(suite, bob.identity(), "hi").await.unwrap();
            assert_eq!(CipherSuite::detect(&ct), suite);
            assert_eq!(bob.decrypt(suite, alice.identity(), &ct).await.unwrap(), "hi");
            assert!(carol.decrypt(suite, alice.identity(), &ct).await.is_err());
        }
    }

    #[tokio::test]
    async fn unsupported_suite_is_an_error() {
        let signer = MockSigner::new("a").with_suites(vec![CipherSuite::Nip04]);
        let err = signer
            .encrypt(CipherSuite::Nip44, &Identity::from("b"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, BunkerError::UnsupportedSuite(CipherSuite::Nip44)));
    }

    #[tokio::test]
    async fn relay_filters_by_recipient() {
        let relay = MockRelay::new();
        let client = MockSigner::new("R");
        relay.deliver(client.seal(CipherSuite::Nip44, &"Z".into(), "a").await.unwrap());
        relay.deliver(client.seal(CipherSuite::Nip44, &"L".into(), "b").await.unwrap());
        relay.finish();

        let mut sub = relay
            .subscribe(Filter::addressed_to(&Identity::from("L")))
            .await
            .unwrap();
        let only = sub.envelopes.next().await.unwrap();
        assert_eq!(only.recipient(), Some(Identity::from("L")));
        assert!(sub.envelopes.next().await.is_none());
        assert!(relay.subscribe(Filter::addressed_to(&"L".into())).await.is_err());
    }
}
