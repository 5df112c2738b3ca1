//! secp256k1 keys: BIP-340 event signatures and ECDH.
//!
//! Identities are x-only public keys in lower-case hex, as relays expect
//! them in `pubkey` and `p` tags.

use bunker_core::{BunkerError, BunkerResult, Envelope, EventTemplate, Identity};
use secp256k1::{ecdh, schnorr, All, Keypair, Message, Parity, Secp256k1, SecretKey, XOnlyPublicKey};
use std::str::FromStr;
use zeroize::Zeroizing;

/// A secp256k1 keypair.
pub struct Keys {
    secp: Secp256k1<All>,
    keypair: Keypair,
    public: XOnlyPublicKey,
}

impl Keys {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut rand::thread_rng());
        Self::from_keypair(secp, keypair)
    }

    /// Build from raw 32-byte secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> BunkerResult<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| BunkerError::Signer(format!("invalid secret key: {e}")))?;
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &secret);
        Ok(Self::from_keypair(secp, keypair))
    }

    /// Build from a 64-character hex secret key.
    pub fn from_hex(hex_secret: &str) -> BunkerResult<Self> {
        let bytes = Zeroizing::new(
            hex::decode(hex_secret.trim())
                .map_err(|e| BunkerError::Signer(format!("secret key is not hex: {e}")))?,
        );
        Self::from_secret_bytes(&bytes)
    }

    fn from_keypair(secp: Secp256k1<All>, keypair: Keypair) -> Self {
        let (public, _parity) = keypair.x_only_public_key();
        Self {
            secp,
            keypair,
            public,
        }
    }

    /// The x-only public key as an identity.
    pub fn identity(&self) -> Identity {
        Identity::new(hex::encode(self.public.serialize()))
    }

    /// Hex-encoded secret key. Callers must not log it.
    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.keypair.secret_bytes()))
    }

    /// Sign a template as this key.
    pub fn sign(&self, template: EventTemplate) -> BunkerResult<Envelope> {
        let pubkey = self.identity();
        let id = template.id_for(&pubkey);
        let digest = id_digest(&id)?;
        let sig = self
            .secp
            .sign_schnorr(&Message::from_digest(digest), &self.keypair);

        Ok(Envelope {
            id,
            pubkey,
            created_at: template.created_at,
            kind: template.kind,
            tags: template.tags,
            content: template.content,
            sig: sig.to_string(),
        })
    }

    /// X coordinate of the ECDH point shared with `peer`.
    pub fn shared_x(&self, peer: &Identity) -> BunkerResult<Zeroizing<[u8; 32]>> {
        let peer = parse_identity(peer)?.public_key(Parity::Even);
        let secret = SecretKey::from_keypair(&self.keypair);
        let point = Zeroizing::new(ecdh::shared_secret_point(&peer, &secret));
        let mut x = Zeroizing::new([0u8; 32]);
        x.copy_from_slice(&point[..32]);
        Ok(x)
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("public", &self.identity())
            .finish_non_exhaustive()
    }
}

/// Parse a hex x-only public key.
pub fn parse_identity(identity: &Identity) -> BunkerResult<XOnlyPublicKey> {
    XOnlyPublicKey::from_str(identity.as_str())
        .map_err(|e| BunkerError::Signer(format!("invalid public key {}: {e}", identity.short())))
}

fn id_digest(id: &str) -> BunkerResult<[u8; 32]> {
    let mut digest = [0u8; 32];
    hex::decode_to_slice(id, &mut digest)
        .map_err(|e| BunkerError::Signer(format!("malformed event id: {e}")))?;
    Ok(digest)
}

/// Check an event's id and Schnorr signature.
pub fn verify_event(envelope: &Envelope) -> BunkerResult<()> {
    if !envelope.has_valid_id() {
        return Err(BunkerError::Signer(format!("event {} has a wrong id", envelope.id)));
    }
    let public = parse_identity(&envelope.pubkey)?;
    let sig = schnorr::Signature::from_str(&envelope.sig)
        .map_err(|e| BunkerError::Signer(format!("malformed signature: {e}")))?;
    let digest = id_digest(&envelope.id)?;

    Secp256k1::verification_only()
        .verify_schnorr(&sig, &Message::from_digest(digest), &public)
        .map_err(|e| BunkerError::Signer(format!("bad signature on {}: {e}", envelope.id)))
}
