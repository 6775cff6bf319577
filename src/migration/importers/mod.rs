//! Per-entity importers.
//!
//! Each importer turns one raw source record into a destination record,
//! resolves references against rows already in the destination, and
//! performs an insert-or-skip. Problems with a single record come back as
//! [`RecordError`] and never stop the page.

mod authors;
mod media;
mod pages;
mod posts;
mod terms;
mod users;

pub use authors::{default_author, AuthorResolver, DEFAULT_AUTHOR_EMAIL};
pub use media::{relative_upload_path, MediaImporter};
pub use pages::PageImporter;
pub use posts::PostImporter;
pub use terms::TermImporter;
pub use users::{placeholder_email, unusable_password, UserImporter};

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::checkpoint::CheckpointRecord;
use super::url_mapping::UrlMappingRow;
use crate::models::EntityType;
use crate::repository::StoreError;

/// Where imported content lives on the new site.
#[derive(Debug, Clone)]
pub struct SiteLayout {
    /// Origin of the new site, e.g. `https://new.example`. May be empty for
    /// site-relative URLs.
    pub site_url: String,
    pub post_path_prefix: String,
    pub page_path_prefix: String,
    /// Directory media files are written under.
    pub uploads_dir: PathBuf,
    /// Public URL prefix for `uploads_dir`.
    pub uploads_url: String,
}

impl SiteLayout {
    pub fn post_url(&self, slug: &str) -> String {
        join_url(&self.site_url, &self.post_path_prefix, slug)
    }

    pub fn page_url(&self, slug: &str) -> String {
        join_url(&self.site_url, &self.page_path_prefix, slug)
    }

    pub fn upload_url(&self, relative: &str) -> String {
        format!("{}/{}", self.uploads_url.trim_end_matches('/'), relative)
    }
}

fn join_url(origin: &str, prefix: &str, slug: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let origin = origin.trim_end_matches('/');
    if prefix.is_empty() {
        format!("{origin}/{slug}")
    } else {
        format!("{origin}/{prefix}/{slug}")
    }
}

/// Read-only view of the page being imported.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub page: u32,
    /// Media source ids already stored in earlier pages or runs.
    pub downloaded: &'a BTreeSet<i64>,
}

/// Result of importing one record.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported {
        source_id: i64,
        id: i32,
        mapping: Option<UrlMappingRow>,
        /// Non-fatal problems, e.g. dropped references.
        notes: Vec<String>,
    },
    /// The record was already present; nothing was written.
    Skipped {
        source_id: i64,
        reason: String,
        /// Mapping for content imported by an earlier run, re-emitted so an
        /// interrupted run still produces it.
        mapping: Option<UrlMappingRow>,
    },
}

impl ImportOutcome {
    pub fn source_id(&self) -> i64 {
        match self {
            Self::Imported { source_id, .. } | Self::Skipped { source_id, .. } => *source_id,
        }
    }

    pub fn is_imported(&self) -> bool {
        matches!(self, Self::Imported { .. })
    }
}

/// Why a single record could not be imported.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Missing or malformed data. Retrying cannot help.
    #[error("{0}")]
    Invalid(String),

    /// A failure another attempt may get past, e.g. a dropped download.
    #[error("{0}")]
    Transient(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RecordError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_fatal())
    }
}

/// A problem found outside a single record, e.g. at the end of a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub source_id: Option<i64>,
    pub message: String,
}

/// Imports records of one entity type.
#[async_trait]
pub trait EntityImporter: Send + Sync {
    fn entity(&self) -> EntityType;

    async fn import_record(
        &self,
        raw: &Value,
        ctx: &PageContext<'_>,
    ) -> Result<ImportOutcome, RecordError>;

    /// Runs once every record of a page has finished, before the page is
    /// committed.
    async fn after_page(&self, _cursor: &mut CheckpointRecord) -> Result<Vec<Issue>, StoreError> {
        Ok(Vec::new())
    }

    /// Runs once after the last page, before the entity is marked complete.
    async fn finish(&self, _cursor: &mut CheckpointRecord) -> Result<Vec<Issue>, StoreError> {
        Ok(Vec::new())
    }
}

/// Decode a raw record into its typed form.
pub(crate) fn decode<T: DeserializeOwned>(raw: &Value) -> Result<T, RecordError> {
    T::deserialize(raw).map_err(|e| RecordError::Invalid(format!("malformed record: {e}")))
}

/// Source id of a raw record, when it has one.
pub fn raw_source_id(raw: &Value) -> Option<i64> {
    raw.get("id").and_then(Value::as_i64)
}

/// Trimmed slug, or an error when it is missing or blank.
pub(crate) fn required_slug(slug: Option<&str>) -> Result<String, RecordError> {
    match slug.map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(RecordError::Invalid("missing slug".to_string())),
    }
}
