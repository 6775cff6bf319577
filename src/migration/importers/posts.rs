//! Post importer.
//!
//! A post is written only after its author is resolved. Category and tag
//! references that do not resolve are dropped and noted; the post itself
//! still imports. Join rows are written after the post exists.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::authors::AuthorResolver;
use super::{
    decode, required_slug, EntityImporter, ImportOutcome, PageContext, RecordError, SiteLayout,
};
use crate::migration::url_mapping::{MappedType, UrlMappingRow};
use crate::models::{EntityType, Link, Post, PublishStatus, Record, SourcePost};
use crate::repository::{DestinationStore, StoreError, Upserted};
use crate::utils::{excerpt, read_time_minutes, strip_tags, EXCERPT_CHARS};

pub struct PostImporter {
    store: Arc<dyn DestinationStore>,
    authors: Arc<AuthorResolver>,
    layout: SiteLayout,
}

impl PostImporter {
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

    fn mapping(&self, post: &SourcePost, slug: &str, status: PublishStatus) -> UrlMappingRow {
        let old_url = post
            .link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("/?p={}", post.id));
        UrlMappingRow {
            kind: MappedType::Post,
            old_url,
            new_url: self.layout.post_url(slug),
            source_id: post.id,
            slug: slug.to_string(),
            status,
        }
    }

    /// Resolve source term ids to destination ids, dropping unknown ones.
    async fn resolve_terms(
        &self,
        entity: EntityType,
        source_ids: &[i64],
        notes: &mut Vec<String>,
    ) -> Result<Vec<i32>, StoreError> {
        let mut seen = BTreeSet::new();
        let mut resolved = Vec::new();
        for &source_id in source_ids {
            if source_id <= 0 || !seen.insert(source_id) {
                continue;
            }
            match self.store.find_by_source_id(entity, source_id).await? {
                Some(id) => resolved.push(id),
                None => notes.push(format!(
                    "dropped unresolved {} reference {}",
                    term_label(entity),
                    source_id
                )),
            }
        }
        Ok(resolved)
    }

    async fn link_terms(
        &self,
        post_id: i32,
        source: &SourcePost,
        notes: &mut Vec<String>,
    ) -> Result<(), StoreError> {
        let categories = self
            .resolve_terms(EntityType::Categories, &source.categories, notes)
            .await?;
        let tags = self
            .resolve_terms(EntityType::Tags, &source.tags, notes)
            .await?;

        let links: Vec<Link> = categories
            .into_iter()
            .map(|category_id| Link::PostCategory {
                post_id,
                category_id,
            })
            .chain(tags.into_iter().map(|tag_id| Link::PostTag { post_id, tag_id }))
            .collect();
        self.store.create_many(&links).await?;
        Ok(())
    }
}

fn term_label(entity: EntityType) -> &'static str {
    match entity {
        EntityType::Categories => "category",
        EntityType::Tags => "tag",
        other => other.as_str(),
    }
}

#[async_trait]
impl EntityImporter for PostImporter {
    fn entity(&self) -> EntityType {
        EntityType::Posts
    }

    async fn import_record(
        &self,
        raw: &Value,
        _ctx: &PageContext<'_>,
    ) -> Result<ImportOutcome, RecordError> {
        let source: SourcePost = decode(raw)?;
        let slug = required_slug(source.slug.as_deref())?;
        let status = PublishStatus::from_source(source.status.as_deref());

        if let Some(id) = self
            .store
            .find_by_source_id(EntityType::Posts, source.id)
            .await?
        {
            // Join rows are insert-or-skip, so a run that stopped between
            // the post and its links completes them here.
            self.link_terms(id, &source, &mut Vec::new()).await?;
            return Ok(ImportOutcome::Skipped {
                source_id: source.id,
                reason: "already imported".to_string(),
                mapping: Some(self.mapping(&source, &slug, status)),
            });
        }

        let mut notes = Vec::new();
        let (author_id, author_note) = self.authors.resolve(source.author_id()).await?;
        notes.extend(author_note);

        let featured_image_id = match source.featured_media_id() {
            Some(media_id) => {
                let found = self
                    .store
                    .find_by_source_id(EntityType::Media, media_id)
                    .await?;
                if found.is_none() {
                    notes.push(format!("featured media {media_id} not imported"));
                }
                found
            }
            None => None,
        };

        let content = source
            .content
            .as_ref()
            .map(|c| c.rendered.clone())
            .unwrap_or_default();
        let title = source
            .title
            .as_ref()
            .map(|t| strip_tags(&t.rendered))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| slug.clone());
        let summary = source
            .excerpt
            .as_ref()
            .and_then(|e| excerpt(&e.rendered, usize::MAX))
            .or_else(|| excerpt(&content, EXCERPT_CHARS));

        let post = Post {
            source_id: source.id,
            title,
            slug: slug.clone(),
            read_time_minutes: read_time_minutes(&content),
            content,
            excerpt: summary,
            status,
            published_at: source.published_at(),
            modified_at: source.modified_at(),
            author_id,
            featured_image_id,
            source_url: source.link.clone(),
        };

        match self.store.upsert(&Record::Post(post)).await? {
            Upserted::Created(id) => {
                self.link_terms(id, &source, &mut notes).await?;
                Ok(ImportOutcome::Imported {
                    source_id: source.id,
                    id,
                    mapping: Some(self.mapping(&source, &slug, status)),
                    notes,
                })
            }
            Upserted::Existing(_) => Ok(ImportOutcome::Skipped {
                source_id: source.id,
                reason: format!("slug '{slug}' already used by another post"),
                mapping: None,
            }),
        }
    }
}
