// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Encrypted at-rest storage for OAuth credentials.
//!
//! Tokens are sealed with ChaCha20-Poly1305 under a per-installation key
//! kept in a mode-0600 file next to the token blob. The contract is
//! confidential at-rest storage plus delete-on-signout; the backing
//! mechanism is swappable through the [`TokenStore`] trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// OAuth credentials. Owned exclusively by the auth service.
///
/// `refresh_token`, once set, is retained across access-token rotations:
/// refresh responses usually omit it and the previous one stays valid until
/// explicitly revoked or cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute wall-clock expiry of the access token.
    pub expires_at: DateTime<Utc>,
}

/// Persistence boundary for credentials.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credentials>>;
    async fn save(&self, credentials: &Credentials) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// File-backed store: base64(nonce ‖ ciphertext ‖ tag) of the serialized
/// credentials, sealed under a locally generated key.
pub struct FileTokenStore {
    key: LessSafeKey,
    token_path: PathBuf,
    rng: SystemRandom,
}

impl FileTokenStore {
    const KEY_FILE: &'static str = "store.key";
    const TOKEN_FILE: &'static str = "tokens.enc";

    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| AppError::Store(format!("create {}: {}", data_dir.display(), e)))?;

        let rng = SystemRandom::new();
        let key_bytes = Self::load_or_create_key(&data_dir.join(Self::KEY_FILE), &rng)?;
        let unbound = UnboundKey::new(&CHACHA20_POLY1305, &key_bytes)
            .map_err(|_| AppError::Store("invalid store key".to_string()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            token_path: data_dir.join(Self::TOKEN_FILE),
            rng,
        })
    }

    fn load_or_create_key(path: &Path, rng: &SystemRandom) -> Result<[u8; 32]> {
        let mut key = [0u8; 32];
        match std::fs::read(path) {
            Ok(raw) if raw.len() == 32 => {
                key.copy_from_slice(&raw);
                Ok(key)
            }
            Ok(_) => Err(AppError::Store(format!(
                "corrupt key file {}",
                path.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                rng.fill(&mut key)
                    .map_err(|_| AppError::Store("key generation failed".to_string()))?;
                std::fs::write(path, key)
                    .map_err(|e| AppError::Store(format!("write key: {}", e)))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o600);
                    std::fs::set_permissions(path, perms)
                        .map_err(|e| AppError::Store(format!("chmod key: {}", e)))?;
                }
                Ok(key)
            }
            Err(e) => Err(AppError::Store(format!("read key: {}", e))),
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::Store("nonce generation failed".to_string()))?;

        let nonce = Nonce::assume_unique_for_key(nonce_bytes);
        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| AppError::Store("seal failed".to_string()))?;

        let mut blob = nonce_bytes.to_vec();
        blob.extend_from_slice(&in_out);
        Ok(BASE64.encode(blob))
    }

    fn open(&self, encoded: &str) -> Result<Vec<u8>> {
        let blob = BASE64
            .decode(encoded.trim())
            .map_err(|_| AppError::Store("corrupt token blob".to_string()))?;
        if blob.len() < NONCE_LEN {
            return Err(AppError::Store("corrupt token blob".to_string()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| AppError::Store("corrupt token blob".to_string()))?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| AppError::Store("token decryption failed".to_string()))?;
        Ok(plaintext.to_vec())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        let encoded = match std::fs::read_to_string(&self.token_path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Store(format!("read tokens: {}", e))),
        };

        // A blob we can no longer decrypt is treated as absent rather than
        // fatal; the user signs in again.
        match self
            .open(&encoded)
            .and_then(|plain| {
                serde_json::from_slice(&plain)
                    .map_err(|_| AppError::Store("corrupt token blob".to_string()))
            }) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable token blob");
                Ok(None)
            }
        }
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        let plain = serde_json::to_vec(credentials)
            .map_err(|e| AppError::Store(format!("serialize tokens: {}", e)))?;
        let sealed = self.seal(&plain)?;
        std::fs::write(&self.token_path, sealed)
            .map_err(|e| AppError::Store(format!("write tokens: {}", e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.token_path, perms)
                .map_err(|e| AppError::Store(format!("chmod tokens: {}", e)))?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.token_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Store(format!("delete tokens: {}", e))),
        }
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: std::sync::Mutex<Option<Credentials>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: std::sync::Mutex::new(Some(credentials)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.inner.lock().unwrap().clone())
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.inner.lock().unwrap() = Some(credentials.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.inner.lock().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credentials {
        Credentials {
            access_token: "ya29.sample".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn file_store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path()).unwrap();

        assert!(store.load().await.unwrap().is_none());

        store.save(&sample()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "ya29.sample");
        assert_eq!(loaded.refresh_token.as_deref(), Some("1//refresh"));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // Clearing twice is fine.
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn file_store_tolerates_corrupt_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("tokens.enc"), "not-a-real-blob").unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_ciphertext_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path()).unwrap();
        store.save(&sample()).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("tokens.enc")).unwrap();
        assert!(!raw.contains("ya29.sample"));
        assert!(!raw.contains("refresh"));
    }
}
