use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::envelope::VaultFile;
use crate::VaultError;

pub fn default_vault_dir() -> PathBuf {
    dirs_home().join(".vcollector")
}

pub fn default_vault_path() -> PathBuf {
    default_vault_dir().join("vault.json")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn ensure_vault_dir(path: &Path) -> Result<(), VaultError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn vault_exists(path: &Path) -> bool {
    path.exists()
}

/// Load and parse the vault file, holding a shared lock for the duration of
/// the read (matching the single-writer/multi-reader discipline the file
/// format implies).
pub fn load_vault(path: &Path) -> Result<VaultFile, VaultError> {
    let file = File::open(path)?;
    let mut lock = fd_lock::RwLock::new(file);
    let mut guard = lock.read().map_err(|_| VaultError::Corrupt)?;
    let mut contents = String::new();
    guard.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(|_| VaultError::Corrupt)
}

/// Write the vault atomically: serialize to a sibling temp file, `fsync`,
/// then rename over the real path, so a crash mid-write never leaves a
/// half-written vault on disk.
pub fn save_vault(path: &Path, vault: &VaultFile) -> Result<(), VaultError> {
    ensure_vault_dir(path)?;
    let serialized = serde_json::to_vec_pretty(vault)?;

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut lock = fd_lock::RwLock::new(&mut tmp);
        let mut guard = lock.write().map_err(|_| VaultError::Corrupt)?;
        guard.write_all(&serialized)?;
        guard.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use crate::envelope::VaultEnvelope;
    use tempfile::tempdir;

    fn sample_vault() -> VaultFile {
        let salt = crypto::generate_salt();
        let key = crypto::derive_key("hunter2", &salt, 1000);
        VaultFile::new(VaultEnvelope {
            salt: salt.to_vec(),
            iterations: 1000,
            verification: crypto::create_verification(&key).unwrap(),
        })
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.json");
        let vault = sample_vault();
        save_vault(&path, &vault).unwrap();
        assert!(vault_exists(&path));
        let loaded = load_vault(&path).unwrap();
        assert_eq!(loaded.envelope.iterations, 1000);
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("vault.json");
        save_vault(&path, &sample_vault()).unwrap();
        assert!(path.exists());
    }
}
