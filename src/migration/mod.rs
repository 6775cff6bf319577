//! The resumable migration pipeline.
//!
//! - `orchestrator`: phase sequencing, page commits, run summary
//! - `importers`: per-entity transformation and reference resolution
//! - `checkpoint`: durable per-entity progress
//! - `download`: atomic streaming asset downloads
//! - `url_mapping`: old to new URL manifest
//! - `errors`: per-record error collection

mod atomic;
pub mod checkpoint;
pub mod download;
pub mod errors;
pub mod importers;
pub mod orchestrator;
pub mod summary;
pub mod url_mapping;

pub use checkpoint::{
    CheckpointError, CheckpointRecord, CheckpointStore, MigrationState, PendingParent,
};
pub use download::{AssetFetcher, DownloadError, DownloadedAsset, HttpAssetDownloader};
pub use errors::{ErrorAccumulator, ImportError};
pub use importers::{EntityImporter, ImportOutcome, PageContext, RecordError, SiteLayout};
pub use orchestrator::{Migration, MigrationError, MigrationFailure, MigrationOptions};
pub use summary::{EntityTally, MigrationPhase, RunSummary};
pub use url_mapping::{read_manifest, ManifestError, MappedType, UrlMappingLog, UrlMappingRow};
