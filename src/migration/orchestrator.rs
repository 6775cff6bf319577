//! Migration orchestrator.
//!
//! Walks the entity types in dependency order. Each phase fetches pages,
//! imports every record on the page, then commits the page by saving the
//! checkpoint. A phase is marked complete once the last page is committed.
//! Per-record and per-page failures are recorded and the run carries on;
//! only an unreachable store or an unwritable checkpoint or manifest aborts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::checkpoint::{CheckpointError, CheckpointRecord, CheckpointStore, MigrationState};
use super::download::AssetFetcher;
use super::errors::ErrorAccumulator;
use super::importers::{
    raw_source_id, AuthorResolver, EntityImporter, ImportOutcome, Issue, MediaImporter,
    PageContext, PageImporter, PostImporter, RecordError, SiteLayout, TermImporter, UserImporter,
};
use super::summary::{MigrationPhase, RunSummary};
use super::url_mapping::{ManifestError, UrlMappingLog};
use crate::models::EntityType;
use crate::repository::{DestinationStore, StoreError};
use crate::source_api::{ContentSource, MAX_PER_PAGE};

/// Errors that stop the whole run.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// An aborted run, with what it managed before stopping.
#[derive(Debug, thiserror::Error)]
#[error("migration aborted: {error}")]
pub struct MigrationFailure {
    #[source]
    pub error: MigrationError,
    pub summary: Box<RunSummary>,
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub per_page: u32,
    /// Stop after importing this many posts in this run.
    pub max_posts: Option<u64>,
    /// Records of one page imported concurrently.
    pub workers: usize,
    /// Extra attempts for a record that failed transiently.
    pub record_retries: u32,
    pub retry_delay: Duration,
    /// Restrict the run to these entity types; empty means all.
    pub only: Vec<EntityType>,
    pub error_display_limit: usize,
    pub show_progress: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            per_page: MAX_PER_PAGE,
            max_posts: None,
            workers: 1,
            record_retries: 1,
            retry_delay: Duration::from_millis(500),
            only: Vec::new(),
            error_display_limit: 50,
            show_progress: false,
        }
    }
}

impl MigrationOptions {
    pub fn includes(&self, entity: EntityType) -> bool {
        self.only.is_empty() || self.only.contains(&entity)
    }
}

/// Mutable state of one run.
struct RunState {
    state: MigrationState,
    log: UrlMappingLog,
    errors: ErrorAccumulator,
    summary: RunSummary,
    posts_budget: Option<u64>,
}

impl RunState {
    fn record_issue(&mut self, entity: EntityType, issue: Issue) {
        self.errors.record(entity, issue.source_id, issue.message);
        self.summary.tally_mut(entity).errors += 1;
    }
}

pub struct Migration {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn DestinationStore>,
    fetcher: Arc<dyn AssetFetcher>,
    checkpoints: CheckpointStore,
    manifest_path: PathBuf,
    layout: SiteLayout,
    options: MigrationOptions,
}

impl Migration {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<dyn DestinationStore>,
        fetcher: Arc<dyn AssetFetcher>,
        checkpoints: CheckpointStore,
        manifest_path: impl Into<PathBuf>,
        layout: SiteLayout,
    ) -> Self {
        Self {
            source,
            store,
            fetcher,
            checkpoints,
            manifest_path: manifest_path.into(),
            layout,
            options: MigrationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Run every unfinished phase.
    pub async fn run(&self) -> Result<RunSummary, MigrationFailure> {
        let started = Instant::now();
        let state = self.checkpoints.load().await;
        let mut log = UrlMappingLog::new(&self.manifest_path);
        log.extend(state.pending_mappings.iter().cloned());

        let mut run = RunState {
            state,
            log,
            errors: ErrorAccumulator::new(),
            summary: RunSummary::new(),
            posts_budget: self.options.max_posts,
        };

        match self.drive(&mut run).await {
            Ok(()) => {
                run.summary.phase = MigrationPhase::Done;
                Ok(self.finish_summary(run, started))
            }
            Err(error) => {
                error!("Migration aborted: {}", error);
                run.summary.phase = MigrationPhase::Failed;
                self.salvage(&mut run).await;
                Err(MigrationFailure {
                    error,
                    summary: Box::new(self.finish_summary(run, started)),
                })
            }
        }
    }

    async fn drive(&self, run: &mut RunState) -> Result<(), MigrationError> {
        self.store.ping().await?;
        run.state.started_at.get_or_insert_with(Utc::now);

        let authors = Arc::new(AuthorResolver::new(self.store.clone()));
        for entity in EntityType::ALL {
            if !self.options.includes(entity) {
                continue;
            }
            if run.state.is_completed(entity) {
                debug!("{} already migrated, skipping", entity);
                continue;
            }

            let waiting: Vec<&str> = entity
                .prerequisites()
                .iter()
                .filter(|p| !run.state.is_completed(**p))
                .map(|p| p.as_str())
                .collect();
            if !waiting.is_empty() {
                warn!(
                    "Importing {} before {} finished; unresolved references will be dropped",
                    entity,
                    waiting.join(", ")
                );
            }

            run.summary.phase = MigrationPhase::Running(entity);
            let importer = self.importer_for(entity, &authors);
            self.run_phase(importer.as_ref(), run).await?;
        }

        let path = run.log.flush().await?;
        info!("Wrote URL mapping manifest {}", path.display());
        run.summary.manifest = Some(path);
        run.summary.mappings_written = run.log.len();
        run.log = UrlMappingLog::new(&self.manifest_path);
        self.persist(run).await?;
        Ok(())
    }

    fn importer_for(
        &self,
        entity: EntityType,
        authors: &Arc<AuthorResolver>,
    ) -> Box<dyn EntityImporter> {
        let store = self.store.clone();
        match entity {
            EntityType::Users => Box::new(UserImporter::new(store)),
            EntityType::Categories => Box::new(TermImporter::categories(store)),
            EntityType::Tags => Box::new(TermImporter::tags(store)),
            EntityType::Media => Box::new(MediaImporter::new(
                store,
                self.fetcher.clone(),
                self.layout.clone(),
            )),
            EntityType::Posts => Box::new(PostImporter::new(
                store,
                authors.clone(),
                self.layout.clone(),
            )),
            EntityType::Pages => Box::new(PageImporter::new(
                store,
                authors.clone(),
                self.layout.clone(),
            )),
        }
    }

    async fn run_phase(
        &self,
        importer: &dyn EntityImporter,
        run: &mut RunState,
    ) -> Result<(), MigrationError> {
        let entity = importer.entity();
        let per_page = self.options.per_page.clamp(1, MAX_PER_PAGE);
        let mut cursor = run.state.record(entity);
        info!("Importing {} from page {}", entity, cursor.next_page());

        let progress = self.progress_bar(entity, cursor.total_items.unwrap_or(0));

        loop {
            if entity == EntityType::Posts && run.posts_budget == Some(0) {
                info!("Post limit reached; posts left for the next run");
                break;
            }

            let page = cursor.next_page();
            let fetched = match self.source.fetch_page(entity, page, per_page).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    error!(entity = %entity, page, "Page fetch failed: {}", e);
                    run.record_issue(
                        entity,
                        Issue {
                            source_id: None,
                            message: format!("page {page}: {e}"),
                        },
                    );
                    self.persist(run).await?;
                    break;
                }
            };

            cursor.total_pages = Some(fetched.total_pages);
            cursor.total_items = Some(fetched.total_items);
            progress.set_length(fetched.total_items);
            progress.set_position(
                (u64::from(page - 1) * u64::from(per_page)).min(fetched.total_items),
            );

            let processed = self
                .import_page(importer, &fetched.records, page, &mut cursor, run, &progress)
                .await?;
            let full = processed == fetched.records.len();

            for issue in importer.after_page(&mut cursor).await? {
                run.record_issue(entity, issue);
            }
            if full {
                cursor.last_page = page;
                run.summary.tally_mut(entity).pages += 1;
            }
            cursor.updated_at = Some(Utc::now());
            run.state.entities.insert(entity, cursor.clone());
            self.persist(run).await?;
            debug!(
                "Committed {} page {}/{} ({} records)",
                entity, page, fetched.total_pages, processed
            );

            if !full {
                info!("Post limit reached inside page {}; it resumes next run", page);
                break;
            }

            if page >= fetched.total_pages {
                for issue in importer.finish(&mut cursor).await? {
                    run.record_issue(entity, issue);
                }
                cursor.completed = true;
                cursor.updated_at = Some(Utc::now());
                run.state.entities.insert(entity, cursor);
                self.persist(run).await?;
                info!("Finished {}", entity);
                break;
            }
        }

        progress.finish_and_clear();
        Ok(())
    }

    /// Import the records of one page. Returns how many were processed,
    /// which is short of the page only when the post limit ran out.
    async fn import_page(
        &self,
        importer: &dyn EntityImporter,
        records: &[Value],
        page: u32,
        cursor: &mut CheckpointRecord,
        run: &mut RunState,
        progress: &ProgressBar,
    ) -> Result<usize, MigrationError> {
        let entity = importer.entity();
        let workers = self.options.workers.max(1);
        let mut offset = 0;

        while offset < records.len() {
            let take = match (entity, run.posts_budget) {
                (EntityType::Posts, Some(0)) => break,
                (EntityType::Posts, Some(left)) => {
                    workers.min(usize::try_from(left).unwrap_or(usize::MAX))
                }
                _ => records.len() - offset,
            };
            let chunk = &records[offset..(offset + take).min(records.len())];

            let results: Vec<_> = {
                let ctx = PageContext {
                    page,
                    downloaded: &cursor.downloaded_ids,
                };
                stream::iter(chunk)
                    .map(|raw| self.import_with_retry(importer, raw, &ctx))
                    .buffered(workers)
                    .collect()
                    .await
            };
            offset += chunk.len();

            for (source_id, result) in results {
                Self::apply(entity, source_id, result, cursor, run)?;
                progress.inc(1);
            }
        }

        Ok(offset)
    }

    async fn import_with_retry(
        &self,
        importer: &dyn EntityImporter,
        raw: &Value,
        ctx: &PageContext<'_>,
    ) -> (Option<i64>, Result<ImportOutcome, RecordError>) {
        let source_id = raw_source_id(raw);
        let mut attempt = 0;
        loop {
            match importer.import_record(raw, ctx).await {
                Err(e) if e.is_transient() && attempt < self.options.record_retries => {
                    attempt += 1;
                    debug!(
                        entity = %importer.entity(),
                        ?source_id,
                        "Retrying ({}/{}): {}",
                        attempt,
                        self.options.record_retries,
                        e
                    );
                    tokio::time::sleep(self.options.retry_delay).await;
                }
                result => return (source_id, result),
            }
        }
    }

    fn apply(
        entity: EntityType,
        source_id: Option<i64>,
        result: Result<ImportOutcome, RecordError>,
        cursor: &mut CheckpointRecord,
        run: &mut RunState,
    ) -> Result<(), MigrationError> {
        match result {
            Ok(ImportOutcome::Imported {
                source_id,
                mapping,
                notes,
                ..
            }) => {
                cursor.count += 1;
                if entity == EntityType::Media {
                    cursor.downloaded_ids.insert(source_id);
                }
                if entity == EntityType::Posts {
                    if let Some(left) = run.posts_budget.as_mut() {
                        *left = left.saturating_sub(1);
                    }
                }
                if let Some(mapping) = mapping {
                    run.log.append(mapping);
                }
                let tally = run.summary.tally_mut(entity);
                tally.imported += 1;
                tally.warnings += notes.len() as u64;
                for note in notes {
                    run.errors.record(entity, Some(source_id), note);
                }
            }
            Ok(ImportOutcome::Skipped {
                source_id,
                reason,
                mapping,
            }) => {
                debug!(entity = %entity, source_id, "Skipped: {}", reason);
                if entity == EntityType::Media {
                    cursor.downloaded_ids.insert(source_id);
                }
                if let Some(mapping) = mapping {
                    run.log.append(mapping);
                }
                run.summary.tally_mut(entity).skipped += 1;
            }
            Err(RecordError::Store(e)) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                run.errors.record(entity, source_id, e.to_string());
                run.summary.tally_mut(entity).errors += 1;
            }
        }
        Ok(())
    }

    /// Save the checkpoint with this run's new errors and unflushed mappings.
    async fn persist(&self, run: &mut RunState) -> Result<(), CheckpointError> {
        run.state.pending_mappings = run.log.rows().to_vec();
        run.state.errors.extend(run.errors.take_unpersisted());
        run.state.updated_at = Some(Utc::now());
        self.checkpoints.save(&run.state).await
    }

    /// Keep what an aborted run achieved.
    async fn salvage(&self, run: &mut RunState) {
        match run.log.flush().await {
            Ok(path) => {
                run.summary.manifest = Some(path);
                run.summary.mappings_written = run.log.len();
                run.log = UrlMappingLog::new(&self.manifest_path);
            }
            Err(e) => warn!("Cannot write URL mapping manifest: {}", e),
        }
        if let Err(e) = self.persist(run).await {
            warn!("Cannot save checkpoint: {}", e);
        }
    }

    fn finish_summary(&self, mut run: RunState, started: Instant) -> RunSummary {
        for entity in EntityType::ALL {
            let completed = run.state.is_completed(entity);
            run.summary.tally_mut(entity).completed = completed;
        }
        run.summary.total_errors = run.errors.len();
        run.summary.errors = run
            .errors
            .capped(self.options.error_display_limit)
            .to_vec();
        run.summary.set_elapsed(started.elapsed());
        run.summary
    }

    fn progress_bar(&self, entity: EntityType, total: u64) -> ProgressBar {
        if !self.options.show_progress || !console::Term::stderr().is_term() {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix:>10} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_prefix(entity.label());
        pb
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::migration::download::{DownloadError, DownloadedAsset};
    use crate::migration::importers::test_support;
    use crate::source_api::{FetchError, FetchedPage};

    /// Serves canned pages; missing pages answer HTTP 500.
    #[derive(Default)]
    struct CannedSource {
        pages: HashMap<(EntityType, u32), Vec<Value>>,
        totals: HashMap<EntityType, u32>,
    }

    impl CannedSource {
        fn with(mut self, entity: EntityType, pages: Vec<Vec<Value>>) -> Self {
            self.totals.insert(entity, pages.len() as u32);
            for (idx, records) in pages.into_iter().enumerate() {
                self.pages.insert((entity, idx as u32 + 1), records);
            }
            self
        }
    }

    #[async_trait]
    impl ContentSource for CannedSource {
        async fn fetch_page(
            &self,
            collection: EntityType,
            page: u32,
            _per_page: u32,
        ) -> Result<FetchedPage, FetchError> {
            let Some(total_pages) = self.totals.get(&collection).copied() else {
                return Ok(FetchedPage {
                    records: Vec::new(),
                    total_pages: 0,
                    total_items: 0,
                });
            };
            match self.pages.get(&(collection, page)) {
                Some(records) => Ok(FetchedPage {
                    records: records.clone(),
                    total_pages,
                    total_items: 0,
                }),
                None => Err(FetchError::Status {
                    status: 500,
                    url: format!("https://old.example/{collection}?page={page}"),
                }),
            }
        }
    }

    struct NoAssets;

    #[async_trait]
    impl AssetFetcher for NoAssets {
        async fn download(&self, url: &str, _dest: &Path) -> Result<DownloadedAsset, DownloadError> {
            Err(DownloadError::Status {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    fn post(id: i64) -> Value {
        json!({"id": id, "slug": format!("post-{id}"), "status": "publish"})
    }

    #[tokio::test]
    async fn test_empty_source_completes_every_phase() {
        let (store, dir) = test_support::store().await;
        let migration = Migration::new(
            Arc::new(CannedSource::default()),
            store,
            Arc::new(NoAssets),
            CheckpointStore::new(dir.path().join("state.json")),
            dir.path().join("map.csv"),
            test_support::layout(&dir),
        );

        let summary = migration.run().await.unwrap();
        assert_eq!(summary.phase, MigrationPhase::Done);
        assert!(summary.is_complete());
        assert!(dir.path().join("map.csv").exists());
    }

    #[tokio::test]
    async fn test_max_posts_stops_inside_page() {
        let (store, dir) = test_support::store().await;
        let source = CannedSource::default()
            .with(EntityType::Posts, vec![vec![post(1), post(2), post(3)]]);
        let checkpoints = CheckpointStore::new(dir.path().join("state.json"));
        let options = MigrationOptions {
            max_posts: Some(2),
            ..Default::default()
        };
        let migration = Migration::new(
            Arc::new(source),
            store.clone(),
            Arc::new(NoAssets),
            checkpoints.clone(),
            dir.path().join("map.csv"),
            test_support::layout(&dir),
        )
        .with_options(options);

        let summary = migration.run().await.unwrap();
        assert_eq!(summary.tally(EntityType::Posts).imported, 2);
        let state = checkpoints.load().await;
        assert_eq!(state.record(EntityType::Posts).last_page, 0);
        assert!(!state.is_completed(EntityType::Posts));

        let summary = migration.run().await.unwrap();
        assert_eq!(summary.tally(EntityType::Posts).imported, 1);
        assert_eq!(summary.tally(EntityType::Posts).skipped, 2);
        assert!(checkpoints.load().await.is_completed(EntityType::Posts));
        assert_eq!(store.count(EntityType::Posts).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_phase_incomplete_and_continues() {
        let (store, dir) = test_support::store().await;
        // Tags claim two pages but only page 1 exists.
        let mut source = CannedSource::default().with(
            EntityType::Tags,
            vec![vec![json!({"id": 1, "slug": "rust", "name": "Rust"})]],
        );
        source.totals.insert(EntityType::Tags, 2);
        let source = source.with(EntityType::Pages, vec![vec![json!({"id": 9, "slug": "about"})]]);
        let checkpoints = CheckpointStore::new(dir.path().join("state.json"));

        let migration = Migration::new(
            Arc::new(source),
            store.clone(),
            Arc::new(NoAssets),
            checkpoints.clone(),
            dir.path().join("map.csv"),
            test_support::layout(&dir),
        );
        let summary = migration.run().await.unwrap();

        assert!(!summary.tally(EntityType::Tags).completed);
        assert_eq!(summary.tally(EntityType::Tags).errors, 1);
        assert!(summary.tally(EntityType::Pages).completed);

        let state = checkpoints.load().await;
        assert_eq!(state.record(EntityType::Tags).last_page, 1);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].source_id, None);
    }

    #[tokio::test]
    async fn test_unwritable_checkpoint_fails_run() {
        let (store, dir) = test_support::store().await;
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let migration = Migration::new(
            Arc::new(CannedSource::default().with(EntityType::Posts, vec![vec![post(1)]])),
            store,
            Arc::new(NoAssets),
            CheckpointStore::new(blocker.join("state.json")),
            dir.path().join("map.csv"),
            test_support::layout(&dir),
        );

        let failure = migration.run().await.unwrap_err();
        assert!(matches!(failure.error, MigrationError::Checkpoint(_)));
        assert_eq!(failure.summary.phase, MigrationPhase::Failed);
    }
}
