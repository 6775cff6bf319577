//! Media importer.
//!
//! The file is downloaded first; the destination row is only written once
//! the file is in place, so a failed download leaves no record behind.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{decode, EntityImporter, ImportOutcome, PageContext, RecordError, SiteLayout};
use crate::migration::download::{AssetFetcher, DownloadError};
use crate::models::{EntityType, MediaAsset, Record, SourceMedia};
use crate::repository::{DestinationStore, Upserted};
use crate::utils::{decode_entities, format_size, is_image, resolve_mime_type};

pub struct MediaImporter {
    store: Arc<dyn DestinationStore>,
    fetcher: Arc<dyn AssetFetcher>,
    layout: SiteLayout,
}

impl MediaImporter {
    pub fn new(
        store: Arc<dyn DestinationStore>,
        fetcher: Arc<dyn AssetFetcher>,
        layout: SiteLayout,
    ) -> Self {
        Self {
            store,
            fetcher,
            layout,
        }
    }

    fn skipped(source_id: i64) -> ImportOutcome {
        ImportOutcome::Skipped {
            source_id,
            reason: "already downloaded".to_string(),
            mapping: None,
        }
    }
}

/// Path of an asset below the uploads directory.
///
/// Keeps the `yyyy/mm` layout after `/uploads/` in the source URL when
/// present, otherwise files the asset by upload date. The file name is
/// prefixed with the source id, so assets sharing a name never land on the
/// same file.
pub fn relative_upload_path(
    source_id: i64,
    source_url: &str,
    uploaded_at: Option<DateTime<Utc>>,
) -> Result<String, RecordError> {
    let url = Url::parse(source_url)
        .map_err(|e| RecordError::Invalid(format!("invalid source_url {source_url}: {e}")))?;
    let path = url.path();

    let mut segments: Vec<String> = match path.rfind("/uploads/") {
        Some(idx) => path[idx + "/uploads/".len()..]
            .split('/')
            .filter(|s| !s.is_empty())
            .map(sanitize_segment)
            .collect(),
        None => Vec::new(),
    };
    if let Some(name) = segments.pop() {
        segments.push(format!("{source_id}-{name}"));
        return Ok(segments.join("/"));
    }

    let filename = path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .map(sanitize_segment)
        .ok_or_else(|| RecordError::Invalid(format!("no filename in {source_url}")))?;
    let dated = uploaded_at.unwrap_or_else(Utc::now);
    Ok(format!(
        "{:04}/{:02}/{}-{}",
        dated.year(),
        dated.month(),
        source_id,
        filename
    ))
}

/// Percent-decode one path segment and make it safe as a file name.
fn sanitize_segment(segment: &str) -> String {
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let sanitized: String = decoded
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim().trim_matches('_');
    match trimmed {
        "" | "." | ".." => "file".to_string(),
        t => t.chars().take(150).collect(),
    }
}

fn download_error(e: DownloadError) -> RecordError {
    if e.is_retryable() {
        RecordError::Transient(e.to_string())
    } else {
        RecordError::Invalid(e.to_string())
    }
}

#[async_trait]
impl EntityImporter for MediaImporter {
    fn entity(&self) -> EntityType {
        EntityType::Media
    }

    async fn import_record(
        &self,
        raw: &Value,
        ctx: &PageContext<'_>,
    ) -> Result<ImportOutcome, RecordError> {
        let media: SourceMedia = decode(raw)?;
        if ctx.downloaded.contains(&media.id) {
            return Ok(Self::skipped(media.id));
        }
        if self
            .store
            .find_by_source_id(EntityType::Media, media.id)
            .await?
            .is_some()
        {
            return Ok(Self::skipped(media.id));
        }

        let source_url = media
            .source_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RecordError::Invalid("missing source_url".to_string()))?;

        let relative = relative_upload_path(media.id, source_url, media.uploaded_at())?;
        let dest = self.layout.uploads_dir.join(&relative);
        let downloaded = self
            .fetcher
            .download(source_url, &dest)
            .await
            .map_err(download_error)?;
        debug!(
            "Downloaded media {} to {} ({})",
            media.id,
            dest.display(),
            format_size(downloaded.bytes)
        );

        let stored_name = Path::new(&relative)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative.clone());
        let filename = stored_name
            .strip_prefix(&format!("{}-", media.id))
            .map(str::to_string)
            .unwrap_or(stored_name);
        let details = media.media_details.clone().unwrap_or_default();
        let declared = media.mime_type.as_deref().or(downloaded.content_type.as_deref());
        let mime_type = resolve_mime_type(declared, &filename);
        // Dimensions only describe images.
        let image = is_image(&mime_type);

        let asset = MediaAsset {
            source_id: media.id,
            mime_type,
            filename,
            source_url: source_url.to_string(),
            local_url: self.layout.upload_url(&relative),
            local_path: dest.to_string_lossy().into_owned(),
            width: details.width.filter(|_| image).and_then(|w| i32::try_from(w).ok()),
            height: details.height.filter(|_| image).and_then(|h| i32::try_from(h).ok()),
            file_size: i64::try_from(downloaded.bytes).unwrap_or(i64::MAX),
            alt_text: media
                .alt_text
                .as_deref()
                .map(decode_entities)
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            content_hash: Some(downloaded.content_hash),
        };

        match self.store.upsert(&Record::Media(asset)).await? {
            Upserted::Created(id) => Ok(ImportOutcome::Imported {
                source_id: media.id,
                id,
                mapping: None,
                notes: Vec::new(),
            }),
            Upserted::Existing(_) => Ok(Self::skipped(media.id)),
        }
    }
}
