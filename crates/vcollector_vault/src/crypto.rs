use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::VaultError;

/// Floor on KDF iterations required by the spec (§4.4: "≥ 100,000
/// iterations and SHA-256"); the default used by `Vault::initialize` sits
/// well above it, matching the strongest of the two iteration counts the
/// original implementation used for its two PBKDF2 call sites.
pub const MIN_KDF_ITERATIONS: u32 = 100_000;
pub const DEFAULT_KDF_ITERATIONS: u32 = 210_000;
pub const SALT_LEN: usize = 16;

/// An AEAD-encrypted field: a random per-encryption nonce plus ciphertext
/// (authentication tag included, per the `aes-gcm` crate's convention).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Derive a 256-bit encryption key from a master password using
/// PBKDF2-HMAC-SHA256.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Encrypt plaintext with AES-256-GCM using a unique random nonce.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<EncryptedBlob, VaultError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::Crypto(format!("cipher init failed: {e}")))?;

    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Crypto(format!("encryption failed: {e}")))?;

    Ok(EncryptedBlob {
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    })
}

/// Decrypt an AES-256-GCM encrypted blob.
pub fn decrypt(key: &[u8; 32], blob: &EncryptedBlob) -> Result<Vec<u8>, VaultError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::Crypto(format!("cipher init failed: {e}")))?;
    let nonce = Nonce::from_slice(&blob.nonce);

    cipher
        .decrypt(nonce, blob.ciphertext.as_ref())
        .map_err(|_| VaultError::Corrupt)
}

/// Holds the derived key for the duration of an unlocked session; zeroized
/// on drop so `Lock()` (or the struct simply going out of scope) leaves no
/// key material resident (§3 Lifecycles: "the derived key is held only
/// while unlocked").
pub struct DerivedKey {
    key: [u8; 32],
}

impl DerivedKey {
    pub fn new(key: [u8; 32]) -> Self {
        DerivedKey { key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob, VaultError> {
        encrypt(&self.key, plaintext)
    }

    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Vec<u8>, VaultError> {
        decrypt(&self.key, blob)
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Fixed plaintext used to build the envelope's verification tag: unlocking
/// re-derives the key and attempts to decrypt this blob; success without
/// ever touching the real secret fields is what lets `Unlock` reject a
/// wrong password cleanly (§4.4, P3).
const VERIFICATION_PLAINTEXT: &[u8] = b"vcollector-vault-verification-v1";

pub fn create_verification(key: &[u8; 32]) -> Result<EncryptedBlob, VaultError> {
    encrypt(key, VERIFICATION_PLAINTEXT)
}

pub fn verify_password(key: &[u8; 32], blob: &EncryptedBlob) -> bool {
    matches!(decrypt(key, blob), Ok(plaintext) if plaintext == VERIFICATION_PLAINTEXT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [42u8; 32];
        let blob = encrypt(&key, b"hello, world!").unwrap();
        assert_eq!(decrypt(&key, &blob).unwrap(), b"hello, world!");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let blob = encrypt(&[1u8; 32], b"secret").unwrap();
        assert!(decrypt(&[2u8; 32], &blob).is_err());
    }

    #[test]
    fn nonces_are_unique_per_call() {
        let key = [42u8; 32];
        let b1 = encrypt(&key, b"data").unwrap();
        let b2 = encrypt(&key, b"data").unwrap();
        assert_ne!(b1.nonce, b2.nonce);
    }

    #[test]
    fn derive_key_is_deterministic_for_same_inputs() {
        let salt = [0u8; SALT_LEN];
        assert_eq!(
            derive_key("hunter2", &salt, 1000),
            derive_key("hunter2", &salt, 1000)
        );
    }

    #[test]
    fn different_passwords_derive_different_keys() {
        let salt = [0u8; SALT_LEN];
        assert_ne!(
            derive_key("password1", &salt, 1000),
            derive_key("password2", &salt, 1000)
        );
    }

    #[test]
    fn verification_roundtrip() {
        let key = derive_key("correct horse", &[7u8; SALT_LEN], 1000);
        let blob = create_verification(&key).unwrap();
        assert!(verify_password(&key, &blob));
    }

    #[test]
    fn verification_rejects_wrong_password() {
        let key = derive_key("correct horse", &[7u8; SALT_LEN], 1000);
        let wrong = derive_key("battery staple", &[7u8; SALT_LEN], 1000);
        let blob = create_verification(&key).unwrap();
        assert!(!verify_password(&wrong, &blob));
    }
}
