//! `nonce ‖ encrypted(payload)` wire framing.
//!
//! The original uses libsodium's `crypto_secretbox` (XSalsa20-Poly1305,
//! 24-byte nonce). That primitive is outside this corpus' Rust
//! dependency surface; `chacha20poly1305` (RFC 8439 AEAD, 12-byte
//! nonce) is the grounded substitute — same security properties, a
//! narrower nonce. See DESIGN.md for the Open Question resolution.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use wforce_domain::Error;

pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .expect("encryption with a fixed-size key never fails");
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    out
}

pub fn decrypt(key: &[u8; KEY_LEN], framed: &[u8]) -> Result<Vec<u8>, Error> {
    if framed.len() < NONCE_LEN {
        return Err(Error::Decrypt);
    }
    let (nonce_bytes, ciphertext) = framed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher.decrypt(nonce, ciphertext).map_err(|_| Error::Decrypt)
}

pub fn parse_key_b64(s: &str) -> Option<[u8; KEY_LEN]> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD.decode(s).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [7u8; KEY_LEN];
        let plaintext = b"hello sibling";
        let framed = encrypt(&key, plaintext);
        let decrypted = decrypt(&key, &framed).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_key_fails() {
        let framed = encrypt(&[1u8; KEY_LEN], b"data");
        assert!(decrypt(&[2u8; KEY_LEN], &framed).is_err());
    }
}
