use crate::crypto::EncryptedBlob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Salt, iteration count and verification tag stored alongside the
/// ciphertext set (§3 Vault Envelope, §6 Vault file format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultEnvelope {
    pub salt: Vec<u8>,
    pub iterations: u32,
    pub verification: EncryptedBlob,
}

/// One stored credential set. Secret fields are ciphertext-or-absent;
/// plaintext never reaches disk (I1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    pub name: String,
    pub username: String,
    pub password: Option<EncryptedBlob>,
    pub private_key: Option<EncryptedBlob>,
    pub key_passphrase: Option<EncryptedBlob>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The on-disk vault: an envelope plus a table of records keyed by unique
/// name (§6 Vault file format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultFile {
    pub envelope: VaultEnvelope,
    pub records: HashMap<String, VaultRecord>,
}

impl VaultFile {
    pub fn new(envelope: VaultEnvelope) -> Self {
        VaultFile {
            envelope,
            records: HashMap::new(),
        }
    }
}
