//! Durable per-entity progress.
//!
//! The whole [`MigrationState`] lives in one pretty-printed JSON file so an
//! operator can read or hand-edit it. It is replaced atomically after every
//! committed page.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::atomic::write_atomically;
use super::errors::ImportError;
use super::url_mapping::UrlMappingRow;
use crate::models::EntityType;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("cannot write checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A category whose parent was not imported yet when it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingParent {
    pub category_id: i32,
    pub source_id: i64,
    pub parent_source_id: i64,
}

/// Progress of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub completed: bool,
    /// Records imported across all runs.
    pub count: u64,
    /// Last page whose records were all processed; 0 before the first.
    pub last_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
    /// Media source ids whose files are already stored.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub downloaded_ids: BTreeSet<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_parents: Vec<PendingParent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CheckpointRecord {
    /// Page to fetch next.
    pub fn next_page(&self) -> u32 {
        self.last_page + 1
    }
}

/// Everything the migration persists between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MigrationState {
    pub entities: BTreeMap<EntityType, CheckpointRecord>,
    /// Append-only log of every error across runs.
    pub errors: Vec<ImportError>,
    /// Mapping rows produced but not yet written to the manifest.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_mappings: Vec<UrlMappingRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MigrationState {
    pub fn record(&self, entity: EntityType) -> CheckpointRecord {
        self.entities.get(&entity).cloned().unwrap_or_default()
    }

    pub fn record_mut(&mut self, entity: EntityType) -> &mut CheckpointRecord {
        self.entities.entry(entity).or_default()
    }

    pub fn is_completed(&self, entity: EntityType) -> bool {
        self.entities.get(&entity).is_some_and(|r| r.completed)
    }

    /// Whether every entity type has finished.
    pub fn is_done(&self) -> bool {
        EntityType::ALL.iter().all(|e| self.is_completed(*e))
    }

    /// Forget progress for one entity type.
    pub fn reset(&mut self, entity: EntityType) {
        self.entities.remove(&entity);
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }
}

/// Loads and saves [`MigrationState`] at a fixed path.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved state. A missing or unreadable file yields a fresh state.
    pub async fn load(&self) -> MigrationState {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No checkpoint at {}, starting fresh", self.path.display());
                return MigrationState::default();
            }
            Err(e) => {
                warn!(
                    "Cannot read checkpoint {}: {}; starting fresh",
                    self.path.display(),
                    e
                );
                return MigrationState::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Checkpoint {} is corrupt ({}); starting fresh",
                    self.path.display(),
                    e
                );
                MigrationState::default()
            }
        }
    }

    /// Persist `state`, replacing the previous file atomically.
    pub async fn save(&self, state: &MigrationState) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(state)?;
        write_atomically(&self.path, &json)
            .await
            .map_err(|source| CheckpointError::Io {
                path: self.path.clone(),
                source,
            })?;
        debug!("Saved checkpoint to {}", self.path.display());
        Ok(())
    }
}
