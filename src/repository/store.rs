//! Narrow interface the migration uses to talk to the destination store.

use std::fmt::Display;

use async_trait::async_trait;

use crate::models::{EntityType, Link, Record};

/// Errors from the destination store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No connection could be obtained. Nothing can make progress.
    #[error("destination store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),
}

impl StoreError {
    pub fn unavailable(e: impl Display) -> Self {
        Self::Unavailable(e.to_string())
    }

    /// Whether the error stops the whole run rather than a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Outcome of an insert-or-skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created(i32),
    /// A record with the same natural key was already present; it was left untouched.
    Existing(i32),
}

impl Upserted {
    pub fn id(&self) -> i32 {
        match self {
            Self::Created(id) | Self::Existing(id) => *id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Destination store operations needed by the importers.
///
/// Implementations never overwrite existing rows: `upsert` is insert-or-skip
/// keyed by [`Record::natural_key`].
#[async_trait]
pub trait DestinationStore: Send + Sync {
    async fn find_by_natural_key(
        &self,
        entity: EntityType,
        key: &str,
    ) -> Result<Option<i32>, StoreError>;

    async fn find_by_source_id(
        &self,
        entity: EntityType,
        source_id: i64,
    ) -> Result<Option<i32>, StoreError>;

    async fn upsert(&self, record: &Record) -> Result<Upserted, StoreError>;

    /// Make `source_id` resolve to the existing row `id` in later
    /// `find_by_source_id` calls. Returns whether a new alias was stored.
    async fn record_alias(
        &self,
        entity: EntityType,
        source_id: i64,
        id: i32,
    ) -> Result<bool, StoreError>;

    /// Bulk insert-or-skip of join rows. Returns the number of new rows.
    async fn create_many(&self, links: &[Link]) -> Result<usize, StoreError>;

    /// Set a category's parent if it has none yet. Returns whether it changed.
    async fn link_category_parent(&self, category_id: i32, parent_id: i32)
        -> Result<bool, StoreError>;

    async fn count(&self, entity: EntityType) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
