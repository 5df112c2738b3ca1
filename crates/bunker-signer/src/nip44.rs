//! Versioned suite (version 2): ChaCha20 with HMAC-SHA256 and length
//! padding, keyed by an HKDF conversation key.
//!
//! Payload: `base64(0x02 || nonce[32] || ciphertext || mac[32])`, where the
//! mac covers `nonce || ciphertext`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bunker_core::{BunkerError, BunkerResult};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

const VERSION: u8 = 2;
const SALT: &[u8] = b"nip44-v2";
const MIN_PLAINTEXT: usize = 1;
const MAX_PLAINTEXT: usize = 65535;
/// Shortest valid decoded payload: version, nonce, 34 padded bytes, mac.
const MIN_PAYLOAD: usize = 99;
const MAX_PAYLOAD: usize = 65603;

type HmacSha256 = Hmac<Sha256>;

/// Long-lived key for a pair of identities.
pub fn conversation_key(shared_x: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(SALT), shared_x);
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&prk);
    key
}

struct MessageKeys {
    chacha_key: [u8; 32],
    chacha_nonce: [u8; 12],
    hmac_key: [u8; 32],
}

impl Drop for MessageKeys {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.chacha_key.zeroize();
        self.chacha_nonce.zeroize();
        self.hmac_key.zeroize();
    }
}

fn message_keys(conversation_key: &[u8; 32], nonce: &[u8; 32]) -> BunkerResult<MessageKeys> {
    let hk = Hkdf::<Sha256>::from_prk(conversation_key)
        .map_err(|e| BunkerError::Signer(format!("nip44 conversation key: {e}")))?;
    let mut okm = Zeroizing::new([0u8; 76]);
    hk.expand(nonce, &mut okm[..])
        .map_err(|e| BunkerError::Signer(format!("nip44 key expansion: {e}")))?;

    let mut keys = MessageKeys {
        chacha_key: [0; 32],
        chacha_nonce: [0; 12],
        hmac_key: [0; 32],
    };
    keys.chacha_key.copy_from_slice(&okm[0..32]);
    keys.chacha_nonce.copy_from_slice(&okm[32..44]);
    keys.hmac_key.copy_from_slice(&okm[44..76]);
    Ok(keys)
}

/// Padded size for a plaintext of `len` bytes (excluding the length prefix).
pub fn calc_padded_len(len: usize) -> usize {
    if len <= 32 {
        return 32;
    }
    let next_power = 1usize << (usize::BITS - (len - 1).leading_zeros());
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((len - 1) / chunk + 1)
}

fn pad(plaintext: &[u8]) -> BunkerResult<Vec<u8>> {
    let len = plaintext.len();
    if !(MIN_PLAINTEXT..=MAX_PLAINTEXT).contains(&len) {
        return Err(BunkerError::Signer(format!(
            "nip44 plaintext must be {MIN_PLAINTEXT}..={MAX_PLAINTEXT} bytes, got {len}"
        )));
    }
    let mut padded = Vec::with_capacity(2 + calc_padded_len(len));
    padded.extend_from_slice(&(len as u16).to_be_bytes());
    padded.extend_from_slice(plaintext);
    padded.resize(2 + calc_padded_len(len), 0);
    Ok(padded)
}

fn unpad(padded: &[u8]) -> BunkerResult<Vec<u8>> {
    let invalid = || BunkerError::Signer("nip44 invalid padding".into());
    let prefix: [u8; 2] = padded.get(..2).and_then(|p| p.try_into().ok()).ok_or_else(invalid)?;
    let len = u16::from_be_bytes(prefix) as usize;
    if len < MIN_PLAINTEXT || padded.len() != 2 + calc_padded_len(len) {
        return Err(invalid());
    }
    Ok(padded[2..2 + len].to_vec())
}

fn mac(hmac_key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> BunkerResult<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(hmac_key)
        .map_err(|e| BunkerError::Signer(format!("nip44 mac key: {e}")))?;
    mac.update(nonce);
    mac.update(ciphertext);
    Ok(mac)
}

/// Encrypt with a fresh random nonce.
pub fn encrypt(conversation_key: &[u8; 32], plaintext: &str) -> BunkerResult<String> {
    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    encrypt_with_nonce(conversation_key, plaintext, &nonce)
}

pub fn encrypt_with_nonce(
    conversation_key: &[u8; 32],
    plaintext: &str,
    nonce: &[u8; 32],
) -> BunkerResult<String> {
    let keys = message_keys(conversation_key, nonce)?;
    let mut buffer = pad(plaintext.as_bytes())?;

    ChaCha20::new_from_slices(&keys.chacha_key, &keys.chacha_nonce)
        .map_err(|e| BunkerError::Signer(format!("nip44 cipher setup: {e}")))?
        .apply_keystream(&mut buffer);
    let tag = mac(&keys.hmac_key, nonce, &buffer)?.finalize().into_bytes();

    let mut payload = Vec::with_capacity(1 + 32 + buffer.len() + 32);
    payload.push(VERSION);
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(&buffer);
    payload.extend_from_slice(&tag);
    Ok(STANDARD.encode(payload))
}

pub fn decrypt(conversation_key: &[u8; 32], payload: &str) -> BunkerResult<String> {
    if payload.starts_with('#') {
        return Err(BunkerError::Signer("nip44 unknown encryption version".into()));
    }
    let raw = STANDARD
        .decode(payload)
        .map_err(|e| BunkerError::Signer(format!("nip44 payload: {e}")))?;
    if !(MIN_PAYLOAD..=MAX_PAYLOAD).contains(&raw.len()) {
        return Err(BunkerError::Signer(format!(
            "nip44 payload has invalid length {}",
            raw.len()
        )));
    }
    if raw[0] != VERSION {
        return Err(BunkerError::Signer(format!("nip44 unknown version {}", raw[0])));
    }

    let mut nonce = [0u8; 32];
    nonce.copy_from_slice(&raw[1..33]);
    let (ciphertext, tag) = raw[33..].split_at(raw.len() - 33 - 32);

    let keys = message_keys(conversation_key, &nonce)?;
    mac(&keys.hmac_key, &nonce, ciphertext)?
        .verify_slice(tag)
        .map_err(|_| BunkerError::Signer("nip44 invalid mac".into()))?;

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    ChaCha20::new_from_slices(&keys.chacha_key, &keys.chacha_nonce)
        .map_err(|e| BunkerError::Signer(format!("nip44 cipher setup: {e}")))?
        .apply_keystream(&mut buffer);

    let plaintext = unpad(&buffer)?;
    String::from_utf8(plaintext).map_err(|e| BunkerError::Signer(format!("nip44 plaintext: {e}")))
}
