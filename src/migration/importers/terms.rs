//! Category and tag importer.
//!
//! Categories may name a parent that appears later in the listing. Parent
//! links are queued while the page is imported and resolved once the page
//! is done; links still unresolved are carried in the checkpoint cursor and
//! retried until the phase finishes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    decode, required_slug, EntityImporter, ImportOutcome, Issue, PageContext, RecordError,
};
use crate::migration::checkpoint::{CheckpointRecord, PendingParent};
use crate::models::{Category, EntityType, Record, SourceTerm, Tag};
use crate::repository::{DestinationStore, StoreError, Upserted};
use crate::utils::decode_entities;

pub struct TermImporter {
    store: Arc<dyn DestinationStore>,
    entity: EntityType,
    queued: Mutex<Vec<PendingParent>>,
}

impl TermImporter {
    pub fn categories(store: Arc<dyn DestinationStore>) -> Self {
        Self::new(store, EntityType::Categories)
    }

    pub fn tags(store: Arc<dyn DestinationStore>) -> Self {
        Self::new(store, EntityType::Tags)
    }

    fn new(store: Arc<dyn DestinationStore>, entity: EntityType) -> Self {
        Self {
            store,
            entity,
            queued: Mutex::new(Vec::new()),
        }
    }

    fn to_record(&self, term: &SourceTerm, slug: String) -> Record {
        let name = term
            .name
            .as_deref()
            .map(decode_entities)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| slug.clone());

        match self.entity {
            EntityType::Categories => Record::Category(Category {
                source_id: term.id,
                name,
                slug,
                description: term
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
            }),
            _ => Record::Tag(Tag {
                source_id: term.id,
                name,
                slug,
            }),
        }
    }

    async fn queue_parent(&self, term: &SourceTerm, category_id: i32) {
        if self.entity != EntityType::Categories {
            return;
        }
        if let Some(parent) = term.parent.filter(|p| *p > 0 && *p != term.id) {
            self.queued.lock().await.push(PendingParent {
                category_id,
                source_id: term.id,
                parent_source_id: parent,
            });
        }
    }

    /// Link every pending parent that now exists. Returns the ones that don't.
    async fn resolve_pending(
        &self,
        pending: Vec<PendingParent>,
    ) -> Result<Vec<PendingParent>, StoreError> {
        let mut unresolved = Vec::new();
        for link in pending {
            match self
                .store
                .find_by_source_id(EntityType::Categories, link.parent_source_id)
                .await?
            {
                Some(parent_id) => {
                    if self
                        .store
                        .link_category_parent(link.category_id, parent_id)
                        .await?
                    {
                        debug!(
                            "Linked category {} to parent {}",
                            link.source_id, link.parent_source_id
                        );
                    }
                }
                None => unresolved.push(link),
            }
        }
        Ok(unresolved)
    }
}

#[async_trait]
impl EntityImporter for TermImporter {
    fn entity(&self) -> EntityType {
        self.entity
    }

    async fn import_record(
        &self,
        raw: &Value,
        _ctx: &PageContext<'_>,
    ) -> Result<ImportOutcome, RecordError> {
        let term: SourceTerm = decode(raw)?;
        let slug = required_slug(term.slug.as_deref())?;

        if let Some(id) = self.store.find_by_source_id(self.entity, term.id).await? {
            // Parent links may have been lost if a run stopped before its
            // page was committed; linking is a no-op once set.
            self.queue_parent(&term, id).await;
            return Ok(ImportOutcome::Skipped {
                source_id: term.id,
                reason: "already imported".to_string(),
                mapping: None,
            });
        }

        match self.store.upsert(&self.to_record(&term, slug.clone())).await? {
            Upserted::Created(id) => {
                self.queue_parent(&term, id).await;
                Ok(ImportOutcome::Imported {
                    source_id: term.id,
                    id,
                    mapping: None,
                    notes: Vec::new(),
                })
            }
            Upserted::Existing(id) => {
                // Posts referencing this source id resolve to the kept row.
                self.store.record_alias(self.entity, term.id, id).await?;
                Ok(ImportOutcome::Skipped {
                    source_id: term.id,
                    reason: format!("slug '{slug}' already imported"),
                    mapping: None,
                })
            }
        }
    }

    async fn after_page(&self, cursor: &mut CheckpointRecord) -> Result<Vec<Issue>, StoreError> {
        let queued = std::mem::take(&mut *self.queued.lock().await);
        let mut pending = std::mem::take(&mut cursor.pending_parents);
        for link in queued {
            if !pending.iter().any(|p| p.category_id == link.category_id) {
                pending.push(link);
            }
        }
        cursor.pending_parents = self.resolve_pending(pending).await?;
        Ok(Vec::new())
    }

    async fn finish(&self, cursor: &mut CheckpointRecord) -> Result<Vec<Issue>, StoreError> {
        let pending = std::mem::take(&mut cursor.pending_parents);
        let unresolved = self.resolve_pending(pending).await?;
        Ok(unresolved
            .into_iter()
            .map(|link| Issue {
                source_id: Some(link.source_id),
                message: format!(
                    "parent category {} was never imported",
                    link.parent_source_id
                ),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::super::test_support;
    use super::*;
    use serde_json::json;

    async fn import(importer: &TermImporter, raw: Value) -> Result<ImportOutcome, RecordError> {
        let none = BTreeSet::new();
        let ctx = PageContext {
            page: 1,
            downloaded: &none,
        };
        importer.import_record(&raw, &ctx).await
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_skipped() {
        let (store, _dir) = test_support::store().await;
        let importer = TermImporter::categories(store.clone());

        let first = import(&importer, json!({"id": 1, "name": "Leadership", "slug": "leadership"}))
            .await
            .unwrap();
        assert!(first.is_imported());

        let dup = import(&importer, json!({"id": 8, "name": "Leadership", "slug": "leadership"}))
            .await
            .unwrap();
        assert!(matches!(dup, ImportOutcome::Skipped { source_id: 8, .. }));
        assert_eq!(store.count(EntityType::Categories).await.unwrap(), 1);

        // The duplicate's source id now resolves to the kept row.
        let kept = store.category_by_slug("leadership").await.unwrap().unwrap();
        assert_eq!(
            store
                .find_by_source_id(EntityType::Categories, 8)
                .await
                .unwrap(),
            Some(kept.id)
        );
    }

    #[tokio::test]
    async fn test_empty_slug_is_invalid() {
        let (store, _dir) = test_support::store().await;
        let importer = TermImporter::tags(store);
        let err = import(&importer, json!({"id": 2, "name": "x", "slug": ""}))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_forward_parent_reference_within_page() {
        let (store, _dir) = test_support::store().await;
        let importer = TermImporter::categories(store.clone());

        import(&importer, json!({"id": 2, "name": "Child", "slug": "child", "parent": 1}))
            .await
            .unwrap();
        import(&importer, json!({"id": 1, "name": "Parent", "slug": "parent"}))
            .await
            .unwrap();

        let mut cursor = CheckpointRecord::default();
        importer.after_page(&mut cursor).await.unwrap();
        assert!(cursor.pending_parents.is_empty());

        let child = store.category_by_slug("child").await.unwrap().unwrap();
        let parent = store.category_by_slug("parent").await.unwrap().unwrap();
        assert_eq!(child.parent_id, Some(parent.id));
    }

    #[tokio::test]
    async fn test_parent_on_later_page_is_carried_in_cursor() {
        let (store, _dir) = test_support::store().await;
        let importer = TermImporter::categories(store.clone());
        let mut cursor = CheckpointRecord::default();

        import(&importer, json!({"id": 5, "name": "Child", "slug": "child", "parent": 9}))
            .await
            .unwrap();
        importer.after_page(&mut cursor).await.unwrap();
        assert_eq!(cursor.pending_parents.len(), 1);
        assert_eq!(cursor.pending_parents[0].parent_source_id, 9);

        import(&importer, json!({"id": 9, "name": "Parent", "slug": "parent"}))
            .await
            .unwrap();
        importer.after_page(&mut cursor).await.unwrap();
        assert!(cursor.pending_parents.is_empty());
        assert!(importer.finish(&mut cursor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_parent_reported_at_finish() {
        let (store, _dir) = test_support::store().await;
        let importer = TermImporter::categories(store.clone());
        let mut cursor = CheckpointRecord::default();

        import(&importer, json!({"id": 5, "name": "Orphan", "slug": "orphan", "parent": 77}))
            .await
            .unwrap();
        importer.after_page(&mut cursor).await.unwrap();

        let issues = importer.finish(&mut cursor).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].source_id, Some(5));
        assert!(issues[0].message.contains("77"));
        assert!(cursor.pending_parents.is_empty());

        let orphan = store.category_by_slug("orphan").await.unwrap().unwrap();
        assert_eq!(orphan.parent_id, None);
    }

    #[tokio::test]
    async fn test_tags_ignore_parent() {
        let (store, _dir) = test_support::store().await;
        let importer = TermImporter::tags(store.clone());
        import(&importer, json!({"id": 3, "name": "Rust &amp; Go", "slug": "rust-go", "parent": 1}))
            .await
            .unwrap();

        let mut cursor = CheckpointRecord::default();
        importer.after_page(&mut cursor).await.unwrap();
        assert!(cursor.pending_parents.is_empty());
        assert_eq!(store.count(EntityType::Tags).await.unwrap(), 1);
    }
}
