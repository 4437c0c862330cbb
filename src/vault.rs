//! Key-at-rest protection and node identity.
//!
//! The node's private key is stored as a single line of base-58 text
//! enciphered with AES-256-GCM-SIV under a password-derived key. The
//! blob layout is:
//!
//! ```text
//! base58( salt (16 bytes) ‖ nonce (12 bytes) ‖ ciphertext + tag )
//! ```
//!
//! Salt and nonce are drawn fresh for every encryption, so the same
//! password and plaintext never produce the same blob twice. A wrong
//! password fails AEAD authentication rather than yielding garbage
//! plaintext.

use crate::error::{Error, Result};
use aes_gcm_siv::aead::{Aead, KeyInit};
use aes_gcm_siv::{Aes256GcmSiv, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Salt size prepended to the blob (16 bytes).
pub const SALT_SIZE: usize = 16;

/// Nonce size for AES-256-GCM-SIV (12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Key size for AES-256 and for generated node keys (32 bytes).
pub const KEY_SIZE: usize = 32;

/// HKDF info string for domain separation.
const KEY_CONTEXT: &[u8] = b"granary-node-key-at-rest-v1";

fn derive_cipher_key(password: &str, salt: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), password.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    hkdf.expand(KEY_CONTEXT, &mut key)
        .map_err(|e| Error::Crypto(format!("key derivation failed: {e}")))?;
    Ok(key)
}

fn cipher_for(password: &str, salt: &[u8]) -> Result<Aes256GcmSiv> {
    let key = derive_cipher_key(password, salt)?;
    Aes256GcmSiv::new_from_slice(&key)
        .map_err(|e| Error::Crypto(format!("failed to create cipher: {e}")))
}

/// Encrypt `plaintext` under `password` into a single-line base-58 blob.
///
/// # Errors
///
/// Returns an error if key derivation or encryption fails.
pub fn encrypt_key(password: &str, plaintext: &[u8]) -> Result<String> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let cipher = cipher_for(password, &salt)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| Error::Crypto(format!("encryption failed: {e}")))?;

    let mut blob = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);

    Ok(bs58::encode(blob).into_string())
}

/// Decrypt a blob produced by [`encrypt_key`].
///
/// # Errors
///
/// Returns an error if the blob is not valid base-58, is truncated, or
/// fails authentication (wrong password or corrupted data). Callers
/// should surface the last case as an incorrect-password outcome.
pub fn decrypt_key(password: &str, encoded: &str) -> Result<Vec<u8>> {
    let blob = bs58::decode(encoded.trim())
        .into_vec()
        .map_err(|e| Error::Crypto(format!("invalid key encoding: {e}")))?;

    if blob.len() < SALT_SIZE + NONCE_SIZE {
        return Err(Error::Crypto("key blob too short".into()));
    }

    let (salt, rest) = blob.split_at(SALT_SIZE);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

    let cipher = cipher_for(password, salt)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Crypto("incorrect password or corrupt key blob".into()))
}

/// Generate a fresh private key. Done once at setup time.
#[must_use]
pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Derive the stable node identifier from private key material.
///
/// The identifier is the first 20 bytes of SHA-256 over the key, hex
/// encoded (40 characters). It keys the bandwidth cache and appears in
/// contact descriptors and seed URIs.
#[must_use]
pub fn node_id(key: &[u8]) -> String {
    let digest = Sha256::digest(key);
    hex::encode(&digest[..20])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    /// Test 1: encrypt-then-decrypt round-trip.
    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = generate_key();
        let blob = encrypt_key("correct horse battery staple", &key).unwrap();

        let recovered = decrypt_key("correct horse battery staple", &blob).unwrap();
        assert_eq!(recovered, key);
    }

    /// Test 2: wrong password fails, never returns wrong plaintext.
    #[test]
    fn test_wrong_password_fails() {
        let blob = encrypt_key("right", b"secret key material").unwrap();

        let result = decrypt_key("wrong", &blob);
        assert!(matches!(result, Err(Error::Crypto(_))));
    }

    /// Test 3: same password and plaintext yield distinct blobs.
    #[test]
    fn test_blobs_are_not_deterministic() {
        let a = encrypt_key("password", b"key").unwrap();
        let b = encrypt_key("password", b"key").unwrap();
        assert_ne!(a, b);

        assert_eq!(decrypt_key("password", &a).unwrap(), b"key");
        assert_eq!(decrypt_key("password", &b).unwrap(), b"key");
    }

    /// Test 4: corrupting the blob fails authentication.
    #[test]
    fn test_corrupt_blob_fails() {
        let blob = encrypt_key("password", b"key").unwrap();
        let mut chars: Vec<char> = blob.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '2' { '3' } else { '2' };
        let corrupt: String = chars.into_iter().collect();

        assert!(decrypt_key("password", &corrupt).is_err());
    }

    /// Test 5: non-base-58 input is rejected before decryption.
    #[test]
    fn test_invalid_encoding_rejected() {
        let result = decrypt_key("password", "not base58 0OIl");
        assert!(matches!(result, Err(Error::Crypto(_))));
    }

    /// Test 6: truncated blob is rejected.
    #[test]
    fn test_truncated_blob_rejected() {
        let short = bs58::encode([0u8; SALT_SIZE + NONCE_SIZE - 1]).into_string();
        let result = decrypt_key("password", &short);
        assert!(result.unwrap_err().to_string().contains("too short"));
    }

    /// Test 7: the blob is a single line of text.
    #[test]
    fn test_blob_is_single_line() {
        let blob = encrypt_key("password", &generate_key()).unwrap();
        assert!(!blob.contains('\n'));
        assert!(blob.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    /// Test 8: surrounding whitespace from the key file is tolerated.
    #[test]
    fn test_decrypt_trims_whitespace() {
        let blob = encrypt_key("password", b"key").unwrap();
        let padded = format!("{blob}\n");
        assert_eq!(decrypt_key("password", &padded).unwrap(), b"key");
    }

    /// Test 9: empty plaintext round-trips.
    #[test]
    fn test_empty_plaintext() {
        let blob = encrypt_key("password", b"").unwrap();
        assert_eq!(decrypt_key("password", &blob).unwrap(), Vec::<u8>::new());
    }

    /// Test 10: node id is 40 hex characters and deterministic.
    #[test]
    fn test_node_id_shape() {
        let key = [7u8; KEY_SIZE];
        let id = node_id(&key);

        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, node_id(&key));
        assert_ne!(id, node_id(&[8u8; KEY_SIZE]));
    }

    /// Test 11: generated keys are distinct.
    #[test]
    fn test_generate_key_distinct() {
        assert_ne!(generate_key(), generate_key());
    }
}
