//! Transport envelopes: signed, timestamped, addressed relay events.
//!
//! Envelopes use the NIP-01 event layout. The id is the SHA-256 of the
//! canonical serialization `[0, pubkey, created_at, kind, tags, content]`.

use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Event kind carrying remote-signer requests and responses.
pub const KIND_NOSTR_CONNECT: u16 = 24133;

/// A signed event as delivered by (or handed to) the relay transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Lower-case hex SHA-256 of the canonical serialization.
    pub id: String,
    /// Sender identity.
    pub pubkey: Identity,
    /// Unix timestamp in seconds.
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    /// Encrypted Request or Response.
    pub content: String,
    /// Hex Schnorr signature over `id`.
    pub sig: String,
}

impl Envelope {
    /// The first `p` tag value: who the envelope is addressed to.
    pub fn recipient(&self) -> Option<Identity> {
        self.tags
            .iter()
            .find(|tag| tag.len() >= 2 && tag[0] == "p")
            .map(|tag| Identity::from(tag[1].as_str()))
    }

    /// Recompute the id from the signed fields.
    pub fn compute_id(&self) -> String {
        compute_event_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }

    /// Whether `id` matches the signed fields.
    pub fn has_valid_id(&self) -> bool {
        self.id == self.compute_id()
    }

    /// Split back into the template the signer was given.
    pub fn template(&self) -> EventTemplate {
        EventTemplate {
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }
}

/// An unsigned event: everything the signer needs except its own key.
///
/// Extra fields (such as a `pubkey` a client pre-filled) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    #[serde(default = "unix_now")]
    pub created_at: u64,
    pub kind: u16,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
}

impl EventTemplate {
    /// A remote-signer envelope template addressed to `recipient`.
    pub fn nostr_connect(recipient: &Identity, content: String) -> Self {
        Self {
            created_at: unix_now(),
            kind: KIND_NOSTR_CONNECT,
            tags: vec![vec!["p".to_string(), recipient.to_string()]],
            content,
        }
    }

    /// The id this template gets once signed by `pubkey`.
    pub fn id_for(&self, pubkey: &Identity) -> String {
        compute_event_id(pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }
}

/// Compute the NIP-01 event id.
pub fn compute_event_id(
    pubkey: &Identity,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> String {
    let canonical = serde_json::json!([0, pubkey.as_str(), created_at, kind, tags, content]);
    hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
}

/// Subscription filter sent to relays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub kinds: Vec<u16>,
    #[serde(rename = "#p")]
    pub p_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub since: Option<u64>,
}

impl Filter {
    /// Remote-signer envelopes addressed to `identity`, from now on.
    pub fn addressed_to(identity: &Identity) -> Self {
        Self {
            kinds: vec![KIND_NOSTR_CONNECT],
            p_tags: vec![identity.to_string()],
            since: Some(unix_now()),
        }
    }

    /// Whether an envelope would be delivered under this filter.
    pub fn matches(&self, envelope: &Envelope) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&envelope.kind) {
            return false;
        }
        if let Some(since) = self.since {
            if envelope.created_at < since {
                return false;
            }
        }
        self.p_tags.is_empty()
            || envelope
                .recipient()
                .is_some_and(|r| self.p_tags.iter().any(|p| p == r.as_str()))
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
