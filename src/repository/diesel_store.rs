//! Diesel implementation of the destination store.
//!
//! Inserts are insert-or-skip: SQLite uses `INSERT OR IGNORE`, PostgreSQL
//! `ON CONFLICT DO NOTHING`. The row id is then read back by natural key, so
//! the same call works whether or not the row already existed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::diesel_models::{
    CategoryRecord, NewCategory, NewMediaAsset, NewPage, NewPost, NewPostCategory, NewPostTag,
    NewSourceAlias, NewTag, NewUser, PostRecord, UserRecord,
};
use super::pool::DbPool;
use super::store::{DestinationStore, StoreError, Upserted};
use crate::models::{EntityType, Link, Record};
use crate::schema::{
    categories, media_assets, pages, post_categories, post_tags, posts, source_aliases, tags,
    users,
};
use crate::{with_conn, with_conn_split};

#[derive(diesel::QueryableByName)]
struct CountRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
}

/// Destination store backed by Diesel.
#[derive(Clone)]
pub struct DieselStore {
    pool: DbPool,
}

impl DieselStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_ignoring_conflicts(&self, record: &Record) -> Result<usize, StoreError> {
        let now = Utc::now().to_rfc3339();
        with_conn_split!(self.pool,
            sqlite: conn => {
                let rows = match record {
                    Record::User(u) => {
                        diesel::insert_or_ignore_into(users::table)
                            .values(NewUser::from_model(u, &now))
                            .execute(&mut conn)
                            .await?
                    }
                    Record::Category(c) => {
                        diesel::insert_or_ignore_into(categories::table)
                            .values(NewCategory::from_model(c, &now))
                            .execute(&mut conn)
                            .await?
                    }
                    Record::Tag(t) => {
                        diesel::insert_or_ignore_into(tags::table)
                            .values(NewTag::from_model(t, &now))
                            .execute(&mut conn)
                            .await?
                    }
                    Record::Media(m) => {
                        diesel::insert_or_ignore_into(media_assets::table)
                            .values(NewMediaAsset::from_model(m, &now))
                            .execute(&mut conn)
                            .await?
                    }
                    Record::Post(p) => {
                        diesel::insert_or_ignore_into(posts::table)
                            .values(NewPost::from_model(p, &now))
                            .execute(&mut conn)
                            .await?
                    }
                    Record::Page(p) => {
                        diesel::insert_or_ignore_into(pages::table)
                            .values(NewPage::from_model(p, &now))
                            .execute(&mut conn)
                            .await?
                    }
                };
                Ok(rows)
            },
            postgres: conn => {
                let rows = match record {
                    Record::User(u) => {
                        diesel::insert_into(users::table)
                            .values(NewUser::from_model(u, &now))
                            .on_conflict_do_nothing()
                            .execute(&mut conn)
                            .await?
                    }
                    Record::Category(c) => {
                        diesel::insert_into(categories::table)
                            .values(NewCategory::from_model(c, &now))
                            .on_conflict_do_nothing()
                            .execute(&mut conn)
                            .await?
                    }
                    Record::Tag(t) => {
                        diesel::insert_into(tags::table)
                            .values(NewTag::from_model(t, &now))
                            .on_conflict_do_nothing()
                            .execute(&mut conn)
                            .await?
                    }
                    Record::Media(m) => {
                        diesel::insert_into(media_assets::table)
                            .values(NewMediaAsset::from_model(m, &now))
                            .on_conflict_do_nothing()
                            .execute(&mut conn)
                            .await?
                    }
                    Record::Post(p) => {
                        diesel::insert_into(posts::table)
                            .values(NewPost::from_model(p, &now))
                            .on_conflict_do_nothing()
                            .execute(&mut conn)
                            .await?
                    }
                    Record::Page(p) => {
                        diesel::insert_into(pages::table)
                            .values(NewPage::from_model(p, &now))
                            .on_conflict_do_nothing()
                            .execute(&mut conn)
                            .await?
                    }
                };
                Ok(rows)
            }
        )
    }

    /// Get a post by slug.
    pub async fn post_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, StoreError> {
        with_conn!(self.pool, conn => {
            Ok(posts::table
                .filter(posts::slug.eq(slug))
                .select(PostRecord::as_select())
                .first(&mut conn)
                .await
                .optional()?)
        })
    }

    /// Get a category by slug.
    pub async fn category_by_slug(&self, slug: &str) -> Result<Option<CategoryRecord>, StoreError> {
        with_conn!(self.pool, conn => {
            Ok(categories::table
                .filter(categories::slug.eq(slug))
                .select(CategoryRecord::as_select())
                .first(&mut conn)
                .await
                .optional()?)
        })
    }

    /// Get a user by email.
    pub async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        with_conn!(self.pool, conn => {
            Ok(users::table
                .filter(users::email.eq(email))
                .select(UserRecord::as_select())
                .first(&mut conn)
                .await
                .optional()?)
        })
    }

    /// Category ids linked to a post.
    pub async fn post_category_ids(&self, post_id: i32) -> Result<Vec<i32>, StoreError> {
        with_conn!(self.pool, conn => {
            Ok(post_categories::table
                .filter(post_categories::post_id.eq(post_id))
                .select(post_categories::category_id)
                .order(post_categories::category_id.asc())
                .load::<i32>(&mut conn)
                .await?)
        })
    }

    /// Tag ids linked to a post.
    pub async fn post_tag_ids(&self, post_id: i32) -> Result<Vec<i32>, StoreError> {
        with_conn!(self.pool, conn => {
            Ok(post_tags::table
                .filter(post_tags::post_id.eq(post_id))
                .select(post_tags::tag_id)
                .order(post_tags::tag_id.asc())
                .load::<i32>(&mut conn)
                .await?)
        })
    }

    /// Count references from posts that point at missing rows.
    pub async fn dangling_reference_count(&self) -> Result<u64, StoreError> {
        const QUERY: &str = r#"SELECT
            (SELECT COUNT(*) FROM post_categories pc
                LEFT JOIN categories c ON c.id = pc.category_id WHERE c.id IS NULL)
          + (SELECT COUNT(*) FROM post_tags pt
                LEFT JOIN tags t ON t.id = pt.tag_id WHERE t.id IS NULL)
          + (SELECT COUNT(*) FROM posts p
                LEFT JOIN media_assets m ON m.id = p.featured_image_id
                WHERE p.featured_image_id IS NOT NULL AND m.id IS NULL)
          + (SELECT COUNT(*) FROM posts p
                LEFT JOIN users u ON u.id = p.author_id WHERE u.id IS NULL)
            AS count"#;

        with_conn!(self.pool, conn => {
            let rows: Vec<CountRow> = diesel::sql_query(QUERY).load(&mut conn).await?;
            Ok(rows.into_iter().next().map(|r| r.count.max(0) as u64).unwrap_or(0))
        })
    }

    /// Row counts for every entity type, in import order.
    pub async fn counts(&self) -> Result<BTreeMap<EntityType, u64>, StoreError> {
        let mut counts = BTreeMap::new();
        for entity in EntityType::ALL {
            counts.insert(entity, self.count(entity).await?);
        }
        Ok(counts)
    }
}

#[async_trait]
impl DestinationStore for DieselStore {
    async fn find_by_natural_key(
        &self,
        entity: EntityType,
        key: &str,
    ) -> Result<Option<i32>, StoreError> {
        with_conn!(self.pool, conn => {
            let id = match entity {
                EntityType::Users => users::table
                    .filter(users::email.eq(key))
                    .select(users::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
                EntityType::Categories => categories::table
                    .filter(categories::slug.eq(key))
                    .select(categories::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
                EntityType::Tags => tags::table
                    .filter(tags::slug.eq(key))
                    .select(tags::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
                EntityType::Media => match key.parse::<i64>() {
                    Ok(source_id) => media_assets::table
                        .filter(media_assets::source_id.eq(source_id))
                        .select(media_assets::id)
                        .first::<i32>(&mut conn)
                        .await
                        .optional()?,
                    Err(_) => None,
                },
                EntityType::Posts => posts::table
                    .filter(posts::slug.eq(key))
                    .select(posts::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
                EntityType::Pages => pages::table
                    .filter(pages::slug.eq(key))
                    .select(pages::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
            };
            Ok(id)
        })
    }

    async fn find_by_source_id(
        &self,
        entity: EntityType,
        source_id: i64,
    ) -> Result<Option<i32>, StoreError> {
        with_conn!(self.pool, conn => {
            let id = match entity {
                EntityType::Users => users::table
                    .filter(users::source_id.eq(source_id))
                    .select(users::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
                EntityType::Categories => categories::table
                    .filter(categories::source_id.eq(source_id))
                    .select(categories::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
                EntityType::Tags => tags::table
                    .filter(tags::source_id.eq(source_id))
                    .select(tags::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
                EntityType::Media => media_assets::table
                    .filter(media_assets::source_id.eq(source_id))
                    .select(media_assets::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
                EntityType::Posts => posts::table
                    .filter(posts::source_id.eq(source_id))
                    .select(posts::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
                EntityType::Pages => pages::table
                    .filter(pages::source_id.eq(source_id))
                    .select(pages::id)
                    .first::<i32>(&mut conn)
                    .await
                    .optional()?,
            };
            if id.is_some() {
                return Ok(id);
            }
            Ok(source_aliases::table
                .filter(source_aliases::entity.eq(entity.as_str()))
                .filter(source_aliases::source_id.eq(source_id))
                .select(source_aliases::target_id)
                .first::<i32>(&mut conn)
                .await
                .optional()?)
        })
    }

    async fn upsert(&self, record: &Record) -> Result<Upserted, StoreError> {
        let entity = record.entity();
        let key = record.natural_key();

        if let Some(id) = self.find_by_natural_key(entity, &key).await? {
            return Ok(Upserted::Existing(id));
        }

        let inserted = self.insert_ignoring_conflicts(record).await?;

        // A conflict on a different unique column (source id) leaves the
        // natural key unmatched, so fall back to the source id.
        let mut id = self.find_by_natural_key(entity, &key).await?;
        if id.is_none() {
            if let Some(source_id) = record.source_id() {
                id = self.find_by_source_id(entity, source_id).await?;
            }
        }

        match id {
            Some(id) if inserted > 0 => Ok(Upserted::Created(id)),
            Some(id) => Ok(Upserted::Existing(id)),
            None => Err(StoreError::Query(diesel::result::Error::NotFound)),
        }
    }

    async fn record_alias(
        &self,
        entity: EntityType,
        source_id: i64,
        id: i32,
    ) -> Result<bool, StoreError> {
        let alias = NewSourceAlias {
            entity: entity.as_str(),
            source_id,
            target_id: id,
        };
        with_conn_split!(self.pool,
            sqlite: conn => {
                let rows = diesel::insert_or_ignore_into(source_aliases::table)
                    .values(alias)
                    .execute(&mut conn)
                    .await?;
                Ok(rows > 0)
            },
            postgres: conn => {
                let rows = diesel::insert_into(source_aliases::table)
                    .values(alias)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)
                    .await?;
                Ok(rows > 0)
            }
        )
    }

    async fn create_many(&self, links: &[Link]) -> Result<usize, StoreError> {
        let mut category_links = Vec::new();
        let mut tag_links = Vec::new();
        for link in links {
            match *link {
                Link::PostCategory {
                    post_id,
                    category_id,
                } => category_links.push(NewPostCategory {
                    post_id,
                    category_id,
                }),
                Link::PostTag { post_id, tag_id } => tag_links.push(NewPostTag { post_id, tag_id }),
            }
        }
        if category_links.is_empty() && tag_links.is_empty() {
            return Ok(0);
        }

        with_conn_split!(self.pool,
            sqlite: conn => {
                let mut rows = 0;
                for link in &category_links {
                    rows += diesel::insert_or_ignore_into(post_categories::table)
                        .values(link)
                        .execute(&mut conn)
                        .await?;
                }
                for link in &tag_links {
                    rows += diesel::insert_or_ignore_into(post_tags::table)
                        .values(link)
                        .execute(&mut conn)
                        .await?;
                }
                Ok(rows)
            },
            postgres: conn => {
                let mut rows = 0;
                if !category_links.is_empty() {
                    rows += diesel::insert_into(post_categories::table)
                        .values(&category_links)
                        .on_conflict_do_nothing()
                        .execute(&mut conn)
                        .await?;
                }
                if !tag_links.is_empty() {
                    rows += diesel::insert_into(post_tags::table)
                        .values(&tag_links)
                        .on_conflict_do_nothing()
                        .execute(&mut conn)
                        .await?;
                }
                Ok(rows)
            }
        )
    }

    async fn link_category_parent(
        &self,
        category_id: i32,
        parent_id: i32,
    ) -> Result<bool, StoreError> {
        if category_id == parent_id {
            return Ok(false);
        }
        with_conn!(self.pool, conn => {
            let rows = diesel::update(
                categories::table
                    .filter(categories::id.eq(category_id))
                    .filter(categories::parent_id.is_null()),
            )
            .set(categories::parent_id.eq(Some(parent_id)))
            .execute(&mut conn)
            .await?;
            Ok(rows > 0)
        })
    }

    async fn count(&self, entity: EntityType) -> Result<u64, StoreError> {
        with_conn!(self.pool, conn => {
            let n: i64 = match entity {
                EntityType::Users => users::table.count().get_result(&mut conn).await?,
                EntityType::Categories => categories::table.count().get_result(&mut conn).await?,
                EntityType::Tags => tags::table.count().get_result(&mut conn).await?,
                EntityType::Media => media_assets::table.count().get_result(&mut conn).await?,
                EntityType::Posts => posts::table.count().get_result(&mut conn).await?,
                EntityType::Pages => pages::table.count().get_result(&mut conn).await?,
            };
            Ok(n.max(0) as u64)
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        with_conn!(self.pool, conn => {
            diesel::sql_query("SELECT 1")
                .execute(&mut conn)
                .await
                .map_err(StoreError::unavailable)?;
            Ok(())
        })
    }
}
