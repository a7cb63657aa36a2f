use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a named credential set, as carried on a `Device` or a
/// `JobDefinition` (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CredentialRef {
    pub name: String,
}

impl CredentialRef {
    pub fn new(name: impl Into<String>) -> Self {
        CredentialRef { name: name.into() }
    }
}

/// A decrypted credential set, resident only in process memory after a
/// successful `Vault::get` (§4.4). Exactly one `Credential` in a vault may
/// have `is_default == true` (I2).
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub key_passphrase: Option<String>,
    pub is_default: bool,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "******"))
            .field("private_key", &self.private_key.as_ref().map(|_| "******"))
            .field(
                "key_passphrase",
                &self.key_passphrase.as_ref().map(|_| "******"),
            )
            .field("is_default", &self.is_default)
            .finish()
    }
}

/// Presence-only summary of a stored credential, returned by `Vault::list`
/// (§4.4: "List never returns plaintext secrets, only presence flags").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub name: String,
    pub username: String,
    pub has_password: bool,
    pub has_private_key: bool,
    pub is_default: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let cred = Credential {
            name: "lab".into(),
            username: "admin".into(),
            password: Some("hunter2".into()),
            private_key: None,
            key_passphrase: None,
            is_default: true,
        };
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("******"));
    }
}
