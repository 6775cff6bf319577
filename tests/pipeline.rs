//! End-to-end pipeline tests.
//!
//! Each test drives the orchestrator against an in-memory content source,
//! a fake asset fetcher and a temporary SQLite destination.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use contentmigrate::migration::download::write_stream;
use contentmigrate::migration::importers::DEFAULT_AUTHOR_EMAIL;
use contentmigrate::migration::{
    read_manifest, AssetFetcher, CheckpointStore, DownloadError, DownloadedAsset, MappedType,
    Migration, MigrationOptions, MigrationPhase, RunSummary, SiteLayout,
};
use contentmigrate::models::{EntityType, PublishStatus};
use contentmigrate::repository::{DbContext, DestinationStore, DieselStore};
use contentmigrate::source_api::{ContentSource, FetchError, FetchedPage};

/// Content source serving fixed pages per collection.
#[derive(Default)]
struct MemorySource {
    pages: HashMap<EntityType, Vec<Vec<Value>>>,
    /// Pages that fail once with HTTP 503 before serving normally.
    flaky: Mutex<HashSet<(EntityType, u32)>>,
    fetched: Mutex<Vec<(EntityType, u32)>>,
}

impl MemorySource {
    fn with(mut self, entity: EntityType, pages: Vec<Vec<Value>>) -> Self {
        self.pages.insert(entity, pages);
        self
    }

    fn failing_once(self, entity: EntityType, page: u32) -> Self {
        self.flaky.lock().unwrap().insert((entity, page));
        self
    }

    fn fetched(&self, entity: EntityType) -> Vec<u32> {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == entity)
            .map(|(_, p)| *p)
            .collect()
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn fetch_page(
        &self,
        collection: EntityType,
        page: u32,
        _per_page: u32,
    ) -> Result<FetchedPage, FetchError> {
        self.fetched.lock().unwrap().push((collection, page));
        if self.flaky.lock().unwrap().remove(&(collection, page)) {
            return Err(FetchError::Status {
                status: 503,
                url: format!("https://old.example/{collection}?page={page}"),
            });
        }

        let pages = self.pages.get(&collection).cloned().unwrap_or_default();
        let total_items = pages.iter().map(Vec::len).sum::<usize>() as u64;
        let records = pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_default();
        Ok(FetchedPage {
            records,
            total_pages: pages.len() as u32,
            total_items,
        })
    }
}

/// Serves known URLs; anything else is a 404.
#[derive(Default)]
struct FakeAssets {
    bodies: HashMap<String, Vec<u8>>,
}

impl FakeAssets {
    fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }
}

#[async_trait]
impl AssetFetcher for FakeAssets {
    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadedAsset, DownloadError> {
        let Some(body) = self.bodies.get(url) else {
            return Err(DownloadError::Status {
                status: 404,
                url: url.to_string(),
            });
        };
        let chunks = futures::stream::iter(vec![Ok::<_, DownloadError>(body.clone())]);
        let (bytes, content_hash) = write_stream(dest, chunks).await?;
        Ok(DownloadedAsset {
            bytes,
            content_hash,
            content_type: Some("image/jpeg".to_string()),
        })
    }
}

struct Harness {
    dir: TempDir,
    store: Arc<DieselStore>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("dest.db"));
        ctx.init_schema().await.unwrap();
        Self {
            store: Arc::new(ctx.store()),
            dir,
        }
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.dir.path().join("migration-state.json")
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.path().join("url-mapping.csv")
    }

    fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.checkpoint_path())
    }

    fn layout(&self) -> SiteLayout {
        SiteLayout {
            site_url: "https://new.example".to_string(),
            post_path_prefix: "/blog".to_string(),
            page_path_prefix: String::new(),
            uploads_dir: self.dir.path().join("uploads"),
            uploads_url: "/uploads".to_string(),
        }
    }

    fn migration(
        &self,
        source: Arc<MemorySource>,
        assets: FakeAssets,
        options: MigrationOptions,
    ) -> Migration {
        Migration::new(
            source,
            self.store.clone(),
            Arc::new(assets),
            self.checkpoints(),
            self.manifest_path(),
            self.layout(),
        )
        .with_options(options)
    }

    async fn run(&self, source: Arc<MemorySource>) -> RunSummary {
        self.migration(source, FakeAssets::default(), MigrationOptions::default())
            .run()
            .await
            .unwrap()
    }
}

fn post(id: i64, slug: &str) -> Value {
    json!({
        "id": id,
        "slug": slug,
        "status": "publish",
        "title": {"rendered": format!("Post {id}")},
        "content": {"rendered": "<p>Some words about things.</p>"},
        "link": format!("https://old.example/{slug}/")
    })
}

/// Three pages of two posts; page 2 item 1 has an empty slug.
fn three_page_source() -> MemorySource {
    MemorySource::default().with(
        EntityType::Posts,
        vec![
            vec![post(1, "one"), post(2, "two")],
            vec![post(3, ""), post(4, "four")],
            vec![post(5, "five"), post(6, "six")],
        ],
    )
}

#[tokio::test]
async fn test_bad_record_is_isolated_and_run_completes() {
    let h = Harness::new().await;
    let summary = h.run(Arc::new(three_page_source())).await;

    let posts = summary.tally(EntityType::Posts);
    assert_eq!(posts.imported, 5);
    assert_eq!(posts.errors, 1);
    assert!(posts.completed);
    assert_eq!(summary.phase, MigrationPhase::Done);

    let errors: Vec<_> = summary
        .errors
        .iter()
        .filter(|e| e.entity == EntityType::Posts)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].source_id, Some(3));

    let state = h.checkpoints().load().await;
    let record = state.record(EntityType::Posts);
    assert_eq!(record.last_page, 3);
    assert!(record.completed);
    assert_eq!(record.count, 5);
    assert!(state.pending_mappings.is_empty());

    let rows = read_manifest(&h.manifest_path()).await;
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.kind == MappedType::Post));
    assert_eq!(rows[0].old_url, "https://old.example/one/");
    assert_eq!(rows[0].new_url, "https://new.example/blog/one");
    assert_eq!(rows[0].status, PublishStatus::Published);

    let manifest = std::fs::read_to_string(h.manifest_path()).unwrap();
    assert!(manifest.starts_with("type,old_url,new_url,source_id,slug,status"));
}

#[tokio::test]
async fn test_duplicate_category_slug_is_skipped() {
    let h = Harness::new().await;
    let source = MemorySource::default().with(
        EntityType::Categories,
        vec![
            vec![json!({"id": 10, "name": "Leadership", "slug": "leadership"})],
            vec![json!({"id": 11, "name": "Leadership", "slug": "leadership"})],
        ],
    );

    let summary = h.run(Arc::new(source)).await;

    let categories = summary.tally(EntityType::Categories);
    assert_eq!(categories.imported, 1);
    assert_eq!(categories.skipped, 1);
    assert_eq!(categories.errors, 0);
    assert_eq!(h.store.count(EntityType::Categories).await.unwrap(), 1);
}

#[tokio::test]
async fn test_post_links_to_category_and_author_kept_for_duplicates() {
    let h = Harness::new().await;
    let source = MemorySource::default()
        .with(
            EntityType::Users,
            vec![vec![
                json!({"id": 1, "name": "Ada", "slug": "ada", "email": "ada@example.com"}),
                json!({"id": 2, "name": "Ada L.", "slug": "ada-l", "email": "ADA@example.com"}),
            ]],
        )
        .with(
            EntityType::Categories,
            vec![
                vec![json!({"id": 1, "name": "Leadership", "slug": "leadership"})],
                vec![json!({"id": 8, "name": "Leadership", "slug": "leadership"})],
            ],
        )
        .with(
            EntityType::Posts,
            vec![vec![json!({
                "id": 50,
                "slug": "hello",
                "status": "publish",
                "author": 2,
                "categories": [8]
            })]],
        );

    let summary = h.run(Arc::new(source)).await;

    assert!(summary.is_complete());
    assert_eq!(summary.tally(EntityType::Users).skipped, 1);
    assert_eq!(summary.tally(EntityType::Categories).skipped, 1);
    assert_eq!(summary.tally(EntityType::Posts).imported, 1);
    assert_eq!(summary.tally(EntityType::Posts).warnings, 0);

    let kept = h.store.category_by_slug("leadership").await.unwrap().unwrap();
    let ada = h.store.user_by_email("ada@example.com").await.unwrap().unwrap();
    let post = h.store.post_by_slug("hello").await.unwrap().unwrap();
    assert_eq!(h.store.post_category_ids(post.id).await.unwrap(), vec![kept.id]);
    assert_eq!(post.author_id, ada.id);
}

#[tokio::test]
async fn test_rerun_from_scratch_is_idempotent() {
    let h = Harness::new().await;
    let source = Arc::new(three_page_source());
    h.run(source.clone()).await;
    let before = h.store.counts().await.unwrap();

    std::fs::remove_file(h.checkpoint_path()).unwrap();
    let summary = h.run(source).await;

    assert_eq!(summary.imported(), 0);
    assert_eq!(summary.tally(EntityType::Posts).skipped, 5);
    assert_eq!(h.store.counts().await.unwrap(), before);
    assert_eq!(read_manifest(&h.manifest_path()).await.len(), 5);
}

#[tokio::test]
async fn test_resume_after_page_failure() {
    let h = Harness::new().await;
    let source = Arc::new(three_page_source().failing_once(EntityType::Posts, 2));

    let first = h.run(source.clone()).await;
    assert_eq!(first.phase, MigrationPhase::Done);
    assert!(!first.tally(EntityType::Posts).completed);
    assert_eq!(first.tally(EntityType::Posts).imported, 2);
    assert_eq!(h.checkpoints().load().await.record(EntityType::Posts).last_page, 1);
    // Later phases still ran.
    assert!(first.tally(EntityType::Pages).completed);

    let second = h.run(source.clone()).await;
    assert!(second.is_complete());
    assert_eq!(second.tally(EntityType::Posts).imported, 3);
    assert_eq!(source.fetched(EntityType::Posts), vec![1, 2, 2, 3]);
    assert_eq!(h.store.count(EntityType::Posts).await.unwrap(), 5);

    // The failed fetch stays in the persistent error log.
    let state = h.checkpoints().load().await;
    assert!(state
        .errors
        .iter()
        .any(|e| e.entity == EntityType::Posts && e.message.starts_with("page 2:")));
}

#[tokio::test]
async fn test_relationships_reference_existing_rows() {
    let h = Harness::new().await;
    let photo = "https://old.example/wp-content/uploads/2023/07/beach.jpg";
    let source = MemorySource::default()
        .with(
            EntityType::Users,
            vec![vec![json!({"id": 1, "name": "Ada", "slug": "ada", "email": "Ada@Example.com"})]],
        )
        .with(
            EntityType::Categories,
            vec![vec![
                json!({"id": 21, "name": "Child", "slug": "child", "parent": 20}),
                json!({"id": 20, "name": "Parent", "slug": "parent"}),
            ]],
        )
        .with(
            EntityType::Tags,
            vec![vec![json!({"id": 30, "name": "Rust", "slug": "rust"})]],
        )
        .with(
            EntityType::Media,
            vec![vec![json!({"id": 40, "source_url": photo, "mime_type": "image/jpeg"})]],
        )
        .with(
            EntityType::Posts,
            vec![vec![json!({
                "id": 50,
                "slug": "hello",
                "status": "publish",
                "author": 1,
                "featured_media": 40,
                "categories": [20, 21, 999],
                "tags": [30, 31]
            })]],
        );
    let assets = FakeAssets::default().with(photo, b"jpeg bytes");

    let summary = h
        .migration(Arc::new(source), assets, MigrationOptions::default())
        .run()
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.tally(EntityType::Posts).imported, 1);
    assert_eq!(summary.tally(EntityType::Posts).warnings, 2);
    assert_eq!(h.store.dangling_reference_count().await.unwrap(), 0);

    let post = h.store.post_by_slug("hello").await.unwrap().unwrap();
    let ada = h.store.user_by_email("ada@example.com").await.unwrap().unwrap();
    assert_eq!(post.author_id, ada.id);
    assert!(post.featured_image_id.is_some());
    assert_eq!(h.store.post_category_ids(post.id).await.unwrap().len(), 2);
    assert_eq!(h.store.post_tag_ids(post.id).await.unwrap().len(), 1);

    let parent = h.store.category_by_slug("parent").await.unwrap().unwrap();
    let child = h.store.category_by_slug("child").await.unwrap().unwrap();
    assert_eq!(child.parent_id, Some(parent.id));

    let stored = h.dir.path().join("uploads/2023/07/40-beach.jpg");
    assert_eq!(std::fs::read(stored).unwrap(), b"jpeg bytes");
}

#[tokio::test]
async fn test_failed_download_leaves_post_without_featured_image() {
    let h = Harness::new().await;
    let source = MemorySource::default()
        .with(
            EntityType::Media,
            vec![vec![json!({
                "id": 40,
                "source_url": "https://old.example/wp-content/uploads/2023/07/missing.jpg"
            })]],
        )
        .with(
            EntityType::Posts,
            vec![vec![json!({"id": 50, "slug": "hello", "featured_media": 40})]],
        );

    let summary = h.run(Arc::new(source)).await;

    assert_eq!(summary.tally(EntityType::Media).errors, 1);
    assert_eq!(summary.tally(EntityType::Posts).imported, 1);
    let post = h.store.post_by_slug("hello").await.unwrap().unwrap();
    assert!(post.featured_image_id.is_none());
    assert_eq!(h.store.count(EntityType::Media).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_author_falls_back_to_default() {
    let h = Harness::new().await;
    let source = MemorySource::default().with(
        EntityType::Posts,
        vec![vec![json!({"id": 50, "slug": "hello", "author": 77})]],
    );

    let summary = h.run(Arc::new(source)).await;

    assert_eq!(summary.tally(EntityType::Posts).imported, 1);
    assert_eq!(summary.tally(EntityType::Posts).warnings, 1);
    let fallback = h
        .store
        .user_by_email(DEFAULT_AUTHOR_EMAIL)
        .await
        .unwrap()
        .unwrap();
    let post = h.store.post_by_slug("hello").await.unwrap().unwrap();
    assert_eq!(post.author_id, fallback.id);
    assert_eq!(fallback.must_reset_password, 1);
}

#[tokio::test]
async fn test_post_limit_spans_runs() {
    let h = Harness::new().await;
    let source = Arc::new(MemorySource::default().with(
        EntityType::Posts,
        vec![
            vec![post(1, "one"), post(2, "two")],
            vec![post(3, "three"), post(4, "four")],
            vec![post(5, "five"), post(6, "six")],
        ],
    ));
    let limited = MigrationOptions {
        max_posts: Some(3),
        ..Default::default()
    };

    let first = h
        .migration(source.clone(), FakeAssets::default(), limited)
        .run()
        .await
        .unwrap();
    assert_eq!(first.tally(EntityType::Posts).imported, 3);
    assert!(!first.tally(EntityType::Posts).completed);
    assert_eq!(h.checkpoints().load().await.record(EntityType::Posts).last_page, 1);
    assert_eq!(read_manifest(&h.manifest_path()).await.len(), 3);

    let second = h.run(source).await;
    assert_eq!(second.tally(EntityType::Posts).imported, 3);
    assert_eq!(second.tally(EntityType::Posts).skipped, 1);
    assert!(second.is_complete());
    assert_eq!(h.store.count(EntityType::Posts).await.unwrap(), 6);
    assert_eq!(read_manifest(&h.manifest_path()).await.len(), 6);
}

#[tokio::test]
async fn test_concurrent_workers_match_sequential_result() {
    let h = Harness::new().await;
    let options = MigrationOptions {
        workers: 4,
        ..Default::default()
    };

    let summary = h
        .migration(Arc::new(three_page_source()), FakeAssets::default(), options)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.tally(EntityType::Posts).imported, 5);
    let slugs: Vec<String> = read_manifest(&h.manifest_path())
        .await
        .into_iter()
        .map(|r| r.slug)
        .collect();
    assert_eq!(slugs, ["one", "two", "four", "five", "six"]);
}
