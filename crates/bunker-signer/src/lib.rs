//! bunker-signer: a local secp256k1 signing capability.
//!
//! Provides [`LocalSigner`], which implements [`bunker_core::Signer`] with
//! BIP-340 Schnorr event signatures and both symmetric suites (the legacy
//! AES-CBC one and the versioned ChaCha20/HMAC one), plus the key file
//! helpers used by the `bunker` binary.

pub mod keys;
pub mod keystore;
pub mod nip04;
pub mod nip44;
pub mod signer;

pub use keys::{verify_event, Keys};
pub use signer::LocalSigner;
