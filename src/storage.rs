//! Cache-aside persistent logo store
//!
//! Each logo persists as two files under the configured root: the raw
//! bytes as `<key>.png` and a JSON sidecar with source and timing
//! metadata, so a later process can reconstruct the full fetch result
//! without re-contacting any provider. The store is opportunistic:
//! every failure is logged and swallowed, correctness never depends on
//! it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::errors::AppResult;
use crate::models::{FetchResult, SourceKind};

/// Sidecar metadata persisted next to the image bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredLogoMetadata {
    key: String,
    source: SourceKind,
    content_type: Option<String>,
    fetched_at: DateTime<Utc>,
}

pub struct LogoStorage {
    root: PathBuf,
}

impl LogoStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist a successful fetch result.
    ///
    /// Callers run this fire-and-forget; the error is only returned so
    /// the spawning task can log it.
    pub async fn persist(&self, result: &FetchResult) -> AppResult<()> {
        let Some(buffer) = &result.buffer else {
            return Ok(());
        };

        fs::create_dir_all(&self.root).await?;

        let stem = sanitize_key(&result.key);
        fs::write(self.image_path(&stem), buffer).await?;

        let metadata = StoredLogoMetadata {
            key: result.key.clone(),
            source: result.source,
            content_type: result.content_type.clone(),
            fetched_at: result.fetched_at,
        };
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(self.metadata_path(&stem), json).await?;

        debug!(
            "Persisted logo for '{}' ({} bytes from {})",
            result.key,
            buffer.len(),
            result.source
        );
        Ok(())
    }

    /// Load a previously persisted result, or `None` if the key is
    /// absent or either file is unreadable.
    pub async fn load(&self, key: &str) -> Option<FetchResult> {
        let stem = sanitize_key(key);

        let bytes = match fs::read(self.image_path(&stem)).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read persisted logo for '{}': {}", key, e);
                return None;
            }
        };

        let metadata = match fs::read(self.metadata_path(&stem)).await {
            Ok(raw) => match serde_json::from_slice::<StoredLogoMetadata>(&raw) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Corrupt logo metadata for '{}': {}", key, e);
                    return None;
                }
            },
            Err(_) => return None,
        };

        let mut result = FetchResult::success(
            key,
            metadata.source,
            bytes::Bytes::from(bytes),
            metadata.content_type,
        );
        result.fetched_at = metadata.fetched_at;
        Some(result)
    }

    /// Remove a persisted entry. Missing files are not an error.
    pub async fn remove(&self, key: &str) -> AppResult<()> {
        let stem = sanitize_key(key);
        for path in [self.image_path(&stem), self.metadata_path(&stem)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn image_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{stem}.png"))
    }

    fn metadata_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{stem}.json"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Map a cache key to a safe file stem
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
