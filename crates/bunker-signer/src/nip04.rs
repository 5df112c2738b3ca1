//! Legacy suite: AES-256-CBC keyed by the raw ECDH x coordinate.
//!
//! Payload format: `base64(ciphertext) + "?iv=" + base64(iv)`.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bunker_core::{BunkerError, BunkerResult};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

const IV_SEPARATOR: &str = "?iv=";

pub fn encrypt(shared_x: &[u8; 32], plaintext: &str) -> BunkerResult<String> {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    encrypt_with_iv(shared_x, plaintext, &iv)
}

fn encrypt_with_iv(shared_x: &[u8; 32], plaintext: &str, iv: &[u8; 16]) -> BunkerResult<String> {
    let ciphertext = Encryptor::new_from_slices(shared_x, iv)
        .map_err(|e| BunkerError::Signer(format!("nip04 key setup: {e}")))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(format!(
        "{}{IV_SEPARATOR}{}",
        STANDARD.encode(ciphertext),
        STANDARD.encode(iv)
    ))
}

pub fn decrypt(shared_x: &[u8; 32], payload: &str) -> BunkerResult<String> {
    let (body, iv) = payload
        .split_once(IV_SEPARATOR)
        .ok_or_else(|| BunkerError::Signer("nip04 payload has no iv".into()))?;
    let ciphertext = STANDARD
        .decode(body)
        .map_err(|e| BunkerError::Signer(format!("nip04 ciphertext: {e}")))?;
    let iv = STANDARD
        .decode(iv)
        .map_err(|e| BunkerError::Signer(format!("nip04 iv: {e}")))?;

    let plaintext = Decryptor::new_from_slices(shared_x, &iv)
        .map_err(|e| BunkerError::Signer(format!("nip04 key setup: {e}")))?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| BunkerError::Signer("nip04 padding check failed".into()))?;
    String::from_utf8(plaintext).map_err(|e| BunkerError::Signer(format!("nip04 plaintext: {e}")))
}
