use chrono::{DateTime, Utc};
use rand::distributions::{DistString, Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const KEY_LENGTH: usize = 43;
const VISIBLE_PREFIX: usize = 8;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("failed to access key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode key file: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Metadata stored alongside each key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyDetails {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Key listing entry with the key itself masked
#[derive(Debug, Clone, Serialize)]
pub struct MaskedKey {
    pub masked_key: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// URL-safe alphabet, same as base64url without padding
struct UrlSafe;

impl DistString for UrlSafe {
    fn append_string<R: rand::Rng + ?Sized>(&self, rng: &mut R, string: &mut String, len: usize) {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
        let index = Uniform::from(0..ALPHABET.len());
        string.extend((0..len).map(|_| ALPHABET[index.sample(rng)] as char));
    }
}

/// Generate a new random API key
pub fn generate_api_key() -> String {
    UrlSafe.sample_string(&mut rand::thread_rng(), KEY_LENGTH)
}

/// Show only the first few characters of a key
pub fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(VISIBLE_PREFIX).collect();
    let hidden = key.chars().count().saturating_sub(VISIBLE_PREFIX);
    format!("{}{}", visible, "*".repeat(hidden))
}

/// API keys persisted as a JSON object in a single file
#[derive(Debug)]
pub struct ApiKeyStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl ApiKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files read as an empty key set
    fn load(&self) -> BTreeMap<String, KeyDetails> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring unreadable key file {}: {}", self.path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("Failed to read key file {}: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    fn save(&self, keys: &BTreeMap<String, KeyDetails>) -> Result<(), KeyStoreError> {
        let contents = serde_json::to_string_pretty(keys)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| KeyStoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        fs::write(&self.path, contents).map_err(|source| KeyStoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Create and persist a new key, returning it in full
    pub async fn create(&self, name: &str, description: &str) -> Result<String, KeyStoreError> {
        let _guard = self.lock.lock().await;
        let mut keys = self.load();
        let key = generate_api_key();
        keys.insert(
            key.clone(),
            KeyDetails {
                name: name.to_string(),
                description: description.to_string(),
                created_at: Utc::now(),
            },
        );
        self.save(&keys)?;
        debug!("Created API key '{}'", name);
        Ok(key)
    }

    pub async fn validate(&self, key: &str) -> bool {
        let _guard = self.lock.lock().await;
        self.load().contains_key(key)
    }

    pub async fn details(&self, key: &str) -> Option<KeyDetails> {
        let _guard = self.lock.lock().await;
        self.load().remove(key)
    }

    /// Returns false if the key did not exist
    pub async fn delete(&self, key: &str) -> Result<bool, KeyStoreError> {
        let _guard = self.lock.lock().await;
        let mut keys = self.load();
        if keys.remove(key).is_none() {
            return Ok(false);
        }
        self.save(&keys)?;
        Ok(true)
    }

    pub async fn list(&self) -> Vec<MaskedKey> {
        let _guard = self.lock.lock().await;
        self.load()
            .into_iter()
            .map(|(key, details)| MaskedKey {
                masked_key: mask_key(&key),
                name: details.name,
                description: details.description,
                created_at: details.created_at,
            })
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        let _guard = self.lock.lock().await;
        self.load().is_empty()
    }
}
