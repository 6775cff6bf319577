//! Old URL to new URL rows for redirect generation.
//!
//! Rows are kept in memory in import order and written as CSV with the header
//! `type,old_url,new_url,source_id,slug,status`. Flushing merges with the
//! manifest already on disk so staged runs build one manifest.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::atomic::write_atomically;
use crate::models::PublishStatus;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot write manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode manifest: {0}")]
    Csv(#[from] csv::Error),
}

/// Kind of content a mapping row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappedType {
    Post,
    Page,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMappingRow {
    #[serde(rename = "type")]
    pub kind: MappedType,
    pub old_url: String,
    pub new_url: String,
    pub source_id: i64,
    pub slug: String,
    pub status: PublishStatus,
}

impl UrlMappingRow {
    pub fn key(&self) -> (MappedType, i64) {
        (self.kind, self.source_id)
    }
}

/// In-memory mapping rows for the current run.
#[derive(Debug)]
pub struct UrlMappingLog {
    path: PathBuf,
    rows: Vec<UrlMappingRow>,
    seen: HashSet<(MappedType, i64)>,
}

impl UrlMappingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a row. A row for a (type, source id) already in the log is ignored.
    pub fn append(&mut self, row: UrlMappingRow) -> bool {
        if !self.seen.insert(row.key()) {
            return false;
        }
        self.rows.push(row);
        true
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = UrlMappingRow>) {
        for row in rows {
            self.append(row);
        }
    }

    pub fn rows(&self) -> &[UrlMappingRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the manifest: rows already on disk first, then this run's new rows.
    pub async fn flush(&self) -> Result<PathBuf, ManifestError> {
        let mut merged = read_manifest(&self.path).await;
        let mut keys: HashSet<_> = merged.iter().map(UrlMappingRow::key).collect();
        let before = merged.len();
        for row in &self.rows {
            if keys.insert(row.key()) {
                merged.push(row.clone());
            }
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        if merged.is_empty() {
            writer.write_record(["type", "old_url", "new_url", "source_id", "slug", "status"])?;
        }
        for row in &merged {
            writer.serialize(row)?;
        }
        let bytes = writer.into_inner().map_err(|e| ManifestError::Io {
            path: self.path.clone(),
            source: std::io::Error::new(e.error().kind(), e.error().to_string()),
        })?;

        write_atomically(&self.path, &bytes)
            .await
            .map_err(|source| ManifestError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            "Wrote {} mapping rows ({} new) to {}",
            merged.len(),
            merged.len() - before,
            self.path.display()
        );
        Ok(self.path.clone())
    }
}

/// Read an existing manifest. Unreadable rows are skipped with a warning.
pub async fn read_manifest(path: &Path) -> Vec<UrlMappingRow> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Cannot read manifest {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    reader
        .deserialize::<UrlMappingRow>()
        .filter_map(|row| match row {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("Skipping bad manifest row in {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: MappedType, source_id: i64, slug: &str) -> UrlMappingRow {
        UrlMappingRow {
            kind,
            old_url: format!("https://old.example/?p={source_id}"),
            new_url: format!("https://new.example/blog/{slug}"),
            source_id,
            slug: slug.to_string(),
            status: PublishStatus::Published,
        }
    }

    #[tokio::test]
    async fn test_flush_writes_header_and_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = UrlMappingLog::new(dir.path().join("url-mapping.csv"));
        log.append(row(MappedType::Post, 2, "second"));
        log.append(row(MappedType::Post, 1, "first"));
        log.append(row(MappedType::Page, 1, "about"));

        let path = log.flush().await.unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "type,old_url,new_url,source_id,slug,status");
        assert_eq!(
            lines[1],
            "post,https://old.example/?p=2,https://new.example/blog/second,2,second,PUBLISHED"
        );
        assert!(lines[3].starts_with("page,"));
        assert_eq!(lines.len(), 4);
    }

    #[tokio::test]
    async fn test_append_ignores_duplicate_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = UrlMappingLog::new(dir.path().join("m.csv"));
        assert!(log.append(row(MappedType::Post, 1, "a")));
        assert!(!log.append(row(MappedType::Post, 1, "a")));
        assert!(log.append(row(MappedType::Page, 1, "a")));
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_merges_with_existing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");

        let mut first = UrlMappingLog::new(&path);
        first.append(row(MappedType::Post, 1, "one"));
        first.append(row(MappedType::Post, 2, "two"));
        first.flush().await.unwrap();

        let mut second = UrlMappingLog::new(&path);
        second.append(row(MappedType::Post, 2, "two"));
        second.append(row(MappedType::Post, 3, "three"));
        second.flush().await.unwrap();

        let rows = read_manifest(&path).await;
        let ids: Vec<i64> = rows.iter().map(|r| r.source_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_flush_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = UrlMappingLog::new(dir.path().join("m.csv"));
        let path = log.flush().await.unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap().trim_end(),
            "type,old_url,new_url,source_id,slug,status"
        );
    }
}
