//! Page importer. Pages carry an author but no taxonomy or featured image.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::authors::AuthorResolver;
use super::{
    decode, required_slug, EntityImporter, ImportOutcome, PageContext, RecordError, SiteLayout,
};
use crate::migration::url_mapping::{MappedType, UrlMappingRow};
use crate::models::{EntityType, Page, PublishStatus, Record, SourcePage};
use crate::repository::{DestinationStore, Upserted};
use crate::utils::strip_tags;

pub struct PageImporter {
    store: Arc<dyn DestinationStore>,
    authors: Arc<AuthorResolver>,
    layout: SiteLayout,
}

impl PageImporter {
    pub fn new(
        store: Arc<dyn DestinationStore>,
        authors: Arc<AuthorResolver>,
        layout: SiteLayout,
    ) -> Self {
        Self {
            store,
            authors,
            layout,
        }
    }

    fn mapping(&self, page: &SourcePage, slug: &str, status: PublishStatus) -> UrlMappingRow {
        UrlMappingRow {
            kind: MappedType::Page,
            old_url: page
                .link
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("/?page_id={}", page.id)),
            new_url: self.layout.page_url(slug),
            source_id: page.id,
            slug: slug.to_string(),
            status,
        }
    }
}

#[async_trait]
impl EntityImporter for PageImporter {
    fn entity(&self) -> EntityType {
        EntityType::Pages
    }

    async fn import_record(
        &self,
        raw: &Value,
        _ctx: &PageContext<'_>,
    ) -> Result<ImportOutcome, RecordError> {
        let source: SourcePage = decode(raw)?;
        let slug = required_slug(source.slug.as_deref())?;
        let status = PublishStatus::from_source(source.status.as_deref());

        if self
            .store
            .find_by_source_id(EntityType::Pages, source.id)
            .await?
            .is_some()
        {
            return Ok(ImportOutcome::Skipped {
                source_id: source.id,
                reason: "already imported".to_string(),
                mapping: Some(self.mapping(&source, &slug, status)),
            });
        }

        let (author_id, author_note) = self.authors.resolve(source.author_id()).await?;
        let content = source
            .content
            .as_ref()
            .map(|c| c.rendered.clone())
            .unwrap_or_default();

        let page = Page {
            source_id: source.id,
            title: source
                .title
                .as_ref()
                .map(|t| strip_tags(&t.rendered))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| slug.clone()),
            slug: slug.clone(),
            content,
            status,
            published_at: source.published_at(),
            modified_at: source.modified_at(),
            author_id,
            source_url: source.link.clone(),
        };

        match self.store.upsert(&Record::Page(page)).await? {
            Upserted::Created(id) => Ok(ImportOutcome::Imported {
                source_id: source.id,
                id,
                mapping: Some(self.mapping(&source, &slug, status)),
                notes: author_note.into_iter().collect(),
            }),
            Upserted::Existing(_) => Ok(ImportOutcome::Skipped {
                source_id: source.id,
                reason: format!("slug '{slug}' already used by another page"),
                mapping: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tempfile::TempDir;

    use super::super::test_support;
    use crate::repository::DieselStore;
    use super::*;
    use serde_json::json;

    async fn setup() -> (Arc<DieselStore>, PageImporter, TempDir) {
        let (store, dir) = test_support::store().await;
        let authors = Arc::new(AuthorResolver::new(store.clone()));
        let importer = PageImporter::new(store.clone(), authors, test_support::layout(&dir));
        (store, importer, dir)
    }

    async fn import(importer: &PageImporter, raw: Value) -> Result<ImportOutcome, RecordError> {
        let none = BTreeSet::new();
        let ctx = PageContext {
            page: 1,
            downloaded: &none,
        };
        importer.import_record(&raw, &ctx).await
    }

    fn page(id: i64, slug: &str) -> Value {
        json!({
            "id": id,
            "slug": slug,
            "status": "publish",
            "title": {"rendered": "Page"},
            "content": {"rendered": "<p>Body</p>"}
        })
    }

    #[tokio::test]
    async fn test_page_import_and_mapping() {
        let (store, importer, _dir) = setup().await;

        let raw = json!({
            "id": 40,
            "slug": "about",
            "status": "draft",
            "title": {"rendered": "About"},
            "content": {"rendered": "<p>Us</p>"},
            "author": 3
        });
        let ImportOutcome::Imported { mapping, notes, .. } =
            import(&importer, raw.clone()).await.unwrap()
        else {
            panic!("expected import");
        };

        let mapping = mapping.unwrap();
        assert_eq!(mapping.kind, MappedType::Page);
        assert_eq!(mapping.old_url, "/?page_id=40");
        assert_eq!(mapping.new_url, "https://new.example/about");
        assert_eq!(mapping.status, PublishStatus::Draft);
        // author 3 was never imported
        assert_eq!(notes.len(), 1);

        let again = import(&importer, raw).await.unwrap();
        assert!(!again.is_imported());
        assert_eq!(store.count(EntityType::Pages).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_slug_is_invalid() {
        let (store, importer, _dir) = setup().await;
        let err = import(&importer, page(41, "  ")).await.unwrap_err();
        assert!(matches!(err, RecordError::Invalid(_)));
        assert_eq!(store.count(EntityType::Pages).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_slug_taken_by_other_page_is_skipped() {
        let (store, importer, _dir) = setup().await;
        assert!(import(&importer, page(42, "contact")).await.unwrap().is_imported());

        let second = import(&importer, page(43, "contact")).await.unwrap();
        let ImportOutcome::Skipped {
            source_id,
            reason,
            mapping,
        } = second
        else {
            panic!("expected skip");
        };
        assert_eq!(source_id, 43);
        assert!(reason.contains("already used by another page"));
        assert!(mapping.is_none());
        assert_eq!(store.count(EntityType::Pages).await.unwrap(), 1);
        assert!(store
            .find_by_source_id(EntityType::Pages, 43)
            .await
            .unwrap()
            .is_none());
    }
}
