//! KeyStore port: durable, atomic-per-key storage for CA material.
//!
//! The platform shell decides where bytes actually live (system keychain,
//! encrypted file, test memory). The core only needs get/put/delete keyed by
//! a fixed label, durable across restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors surfaced by a keystore backend.
#[derive(Error, Debug)]
pub enum KeyStoreError {
    /// The backing store cannot be reached (locked keychain, missing dir).
    #[error("keystore unavailable: {0}")]
    Unavailable(String),

    /// Read or write failed.
    #[error("keystore I/O failed for {label:?}: {reason}")]
    Io {
        /// Label involved in the failed operation.
        label: String,
        /// Backend-specific failure description.
        reason: String,
    },
}

/// Durable label→bytes storage, atomic per key.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetch the bytes stored under `label`, if any.
    async fn get(&self, label: &str) -> Result<Option<Vec<u8>>, KeyStoreError>;

    /// Store `bytes` under `label`, replacing any previous value atomically.
    async fn put(&self, label: &str, bytes: &[u8]) -> Result<(), KeyStoreError>;

    /// Remove the value under `label`. Removing a missing key is not an error.
    async fn delete(&self, label: &str) -> Result<(), KeyStoreError>;
}

/// In-memory keystore for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, label: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        Ok(self.entries.lock().await.get(label).cloned())
    }

    async fn put(&self, label: &str, bytes: &[u8]) -> Result<(), KeyStoreError> {
        self.entries
            .lock()
            .await
            .insert(label.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, label: &str) -> Result<(), KeyStoreError> {
        self.entries.lock().await.remove(label);
        Ok(())
    }
}

/// File-backed keystore: one file per label under a directory, written via
/// temp-file-then-rename so each key is replaced atomically.
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Open (creating if needed) a keystore rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| KeyStoreError::Unavailable(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path_for(&self, label: &str) -> PathBuf {
        // Labels are fixed identifiers chosen by the core, not user input,
        // but keep them filesystem-safe anyway.
        let safe: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(safe)
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn get(&self, label: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        match tokio::fs::read(self.path_for(label)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeyStoreError::Io {
                label: label.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn put(&self, label: &str, bytes: &[u8]) -> Result<(), KeyStoreError> {
        let target = self.path_for(label);
        // Append rather than replace the extension: labels like `a.key` and
        // `a.cert` must not share a temp file.
        let mut tmp = target.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let io_err = |e: std::io::Error| KeyStoreError::Io {
            label: label.to_string(),
            reason: e.to_string(),
        };
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &target).await.map_err(io_err)?;
        Ok(())
    }

    async fn delete(&self, label: &str) -> Result<(), KeyStoreError> {
        match tokio::fs::remove_file(self.path_for(label)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeyStoreError::Io {
                label: label.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_keystore_round_trip() {
        let store = MemoryKeyStore::new();
        assert!(store.get("root").await.unwrap().is_none());

        store.put("root", b"material").await.unwrap();
        assert_eq!(store.get("root").await.unwrap().unwrap(), b"material");

        store.delete("root").await.unwrap();
        assert!(store.get("root").await.unwrap().is_none());
        // Deleting again is fine.
        store.delete("root").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_keystore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).await.unwrap();

        store.put("sg.root.key", b"pkcs8-bytes").await.unwrap();
        store.put("sg.root.key", b"pkcs8-bytes-2").await.unwrap();
        assert_eq!(
            store.get("sg.root.key").await.unwrap().unwrap(),
            b"pkcs8-bytes-2"
        );

        store.delete("sg.root.key").await.unwrap();
        assert!(store.get("sg.root.key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_keystore_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileKeyStore::open(dir.path()).await.unwrap();
            store.put("sg.root.cert", b"der").await.unwrap();
        }
        let store = FileKeyStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get("sg.root.cert").await.unwrap().unwrap(), b"der");
    }
}
