//! A [`Signer`] backed by an in-memory secp256k1 key.

use crate::keys::Keys;
use crate::{nip04, nip44};
use bunker_core::{BunkerResult, CipherSuite, Envelope, EventTemplate, Identity, Signer};
use tracing::trace;

/// Signs and encrypts with a key held in process memory.
#[derive(Debug)]
pub struct LocalSigner {
    keys: Keys,
    relays: Vec<String>,
}

impl LocalSigner {
    pub fn new(keys: Keys) -> Self {
        Self {
            keys,
            relays: Vec::new(),
        }
    }

    /// Relays reported to an authorized client by `get_relays`.
    pub fn with_relays(mut self, relays: Vec<String>) -> Self {
        self.relays = relays;
        self
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }
}

impl Signer for LocalSigner {
    async fn public_key(&self) -> BunkerResult<Identity> {
        Ok(self.keys.identity())
    }

    async fn sign_event(&self, template: EventTemplate) -> BunkerResult<Envelope> {
        let signed = self.keys.sign(template)?;
        trace!(id = %signed.id, kind = signed.kind, "event signed");
        Ok(signed)
    }

    async fn encrypt(
        &self,
        suite: CipherSuite,
        peer: &Identity,
        plaintext: &str,
    ) -> BunkerResult<String> {
        let shared = self.keys.shared_x(peer)?;
        match suite {
            CipherSuite::Nip04 => nip04::encrypt(&shared, plaintext),
            CipherSuite::Nip44 => nip44::encrypt(&nip44::conversation_key(&shared), plaintext),
        }
    }

    async fn decrypt(
        &self,
        suite: CipherSuite,
        peer: &Identity,
        ciphertext: &str,
    ) -> BunkerResult<String> {
        let shared = self.keys.shared_x(peer)?;
        match suite {
            CipherSuite::Nip04 => nip04::decrypt(&shared, ciphertext),
            CipherSuite::Nip44 => nip44::decrypt(&nip44::conversation_key(&shared), ciphertext),
        }
    }

    async fn relays(&self) -> BunkerResult<Vec<String>> {
        Ok(self.relays.clone())
    }
}
