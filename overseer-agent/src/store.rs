//! Durable subscriber set
//!
//! The set lives in a single JSON file. Writes go to a temporary file next to
//! it and are renamed into place, so readers never see a partial document.
//! Concurrent writers are last-writer-wins; merging re-reads the file first so
//! ids added by another invocation in the meantime survive.

use crate::error::{OverseerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Chat identifier assigned by the messaging platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type SubscriberSet = BTreeSet<ChatId>;

/// On-disk document
#[derive(Debug, Serialize, Deserialize)]
struct SubscriberFile {
    chat_ids: SubscriberSet,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubscriberStore {
    path: PathBuf,
}

impl SubscriberStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted set, creating an empty store on first use.
    pub async fn load(&self) -> Result<SubscriberSet> {
        match self.read().await? {
            Some(ids) => {
                debug!("Loaded {} subscriber(s) from {}", ids.len(), self.path.display());
                Ok(ids)
            }
            None => {
                let ids = SubscriberSet::new();
                self.write(&ids).await?;
                info!("Created subscriber store at {}", self.path.display());
                Ok(ids)
            }
        }
    }

    /// Union of what is on disk, `known` and `new_ids`, written back before returning.
    pub async fn merge_and_persist(
        &self,
        known: &SubscriberSet,
        new_ids: &SubscriberSet,
    ) -> Result<SubscriberSet> {
        let mut merged = self.read().await?.unwrap_or_default();
        merged.extend(known.iter().copied());
        merged.extend(new_ids.iter().copied());

        self.write(&merged).await?;
        debug!("Persisted {} subscriber(s)", merged.len());
        Ok(merged)
    }

    async fn read(&self) -> Result<Option<SubscriberSet>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OverseerError::persistence(&self.path, e)),
        };

        let file: SubscriberFile = serde_json::from_slice(&content)
            .map_err(|e| OverseerError::persistence(&self.path, format!("corrupt store: {}", e)))?;
        Ok(Some(file.chat_ids))
    }

    async fn write(&self, ids: &SubscriberSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OverseerError::persistence(parent, e))?;
        }

        let document = SubscriberFile {
            chat_ids: ids.clone(),
            updated_at: Utc::now(),
        };
        let content = serde_json::to_vec_pretty(&document)
            .map_err(|e| OverseerError::persistence(&self.path, e))?;

        let tmp_path = self.tmp_path();
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| OverseerError::persistence(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| OverseerError::persistence(&self.path, e))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}
