//! Diesel ORM models for the destination tables.
//!
//! Timestamps are stored as RFC 3339 text and booleans as integers so the
//! same rows work on SQLite and PostgreSQL.

use diesel::prelude::*;

use crate::models;
use crate::schema;

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::users)]
pub struct NewUser<'a> {
    pub source_id: Option<i64>,
    pub email: &'a str,
    pub name: &'a str,
    pub slug: &'a str,
    pub bio: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub registered_at: Option<String>,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub must_reset_password: i32,
    pub created_at: &'a str,
}

impl<'a> NewUser<'a> {
    pub fn from_model(user: &'a models::User, created_at: &'a str) -> Self {
        Self {
            source_id: user.source_id,
            email: &user.email,
            name: &user.name,
            slug: &user.slug,
            bio: user.bio.as_deref(),
            avatar_url: user.avatar_url.as_deref(),
            registered_at: user.registered_at.map(|dt| dt.to_rfc3339()),
            password_hash: &user.password_hash,
            role: &user.role,
            must_reset_password: user.must_reset_password as i32,
            created_at,
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::categories)]
pub struct NewCategory<'a> {
    pub source_id: i64,
    pub name: &'a str,
    pub slug: &'a str,
    pub description: Option<&'a str>,
    pub parent_id: Option<i32>,
    pub created_at: &'a str,
}

impl<'a> NewCategory<'a> {
    pub fn from_model(category: &'a models::Category, created_at: &'a str) -> Self {
        Self {
            source_id: category.source_id,
            name: &category.name,
            slug: &category.slug,
            description: category.description.as_deref(),
            parent_id: None,
            created_at,
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::tags)]
pub struct NewTag<'a> {
    pub source_id: i64,
    pub name: &'a str,
    pub slug: &'a str,
    pub created_at: &'a str,
}

impl<'a> NewTag<'a> {
    pub fn from_model(tag: &'a models::Tag, created_at: &'a str) -> Self {
        Self {
            source_id: tag.source_id,
            name: &tag.name,
            slug: &tag.slug,
            created_at,
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::media_assets)]
pub struct NewMediaAsset<'a> {
    pub source_id: i64,
    pub filename: &'a str,
    pub source_url: &'a str,
    pub local_url: &'a str,
    pub local_path: &'a str,
    pub mime_type: &'a str,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub file_size: i64,
    pub alt_text: Option<&'a str>,
    pub content_hash: Option<&'a str>,
    pub created_at: &'a str,
}

impl<'a> NewMediaAsset<'a> {
    pub fn from_model(media: &'a models::MediaAsset, created_at: &'a str) -> Self {
        Self {
            source_id: media.source_id,
            filename: &media.filename,
            source_url: &media.source_url,
            local_url: &media.local_url,
            local_path: &media.local_path,
            mime_type: &media.mime_type,
            width: media.width,
            height: media.height,
            file_size: media.file_size,
            alt_text: media.alt_text.as_deref(),
            content_hash: media.content_hash.as_deref(),
            created_at,
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::posts)]
pub struct NewPost<'a> {
    pub source_id: i64,
    pub title: &'a str,
    pub slug: &'a str,
    pub content: &'a str,
    pub excerpt: Option<&'a str>,
    pub status: &'a str,
    pub published_at: Option<String>,
    pub modified_at: Option<String>,
    pub author_id: i32,
    pub featured_image_id: Option<i32>,
    pub read_time_minutes: i32,
    pub source_url: Option<&'a str>,
    pub created_at: &'a str,
}

impl<'a> NewPost<'a> {
    pub fn from_model(post: &'a models::Post, created_at: &'a str) -> Self {
        Self {
            source_id: post.source_id,
            title: &post.title,
            slug: &post.slug,
            content: &post.content,
            excerpt: post.excerpt.as_deref(),
            status: post.status.as_str(),
            published_at: post.published_at.map(|dt| dt.to_rfc3339()),
            modified_at: post.modified_at.map(|dt| dt.to_rfc3339()),
            author_id: post.author_id,
            featured_image_id: post.featured_image_id,
            read_time_minutes: post.read_time_minutes,
            source_url: post.source_url.as_deref(),
            created_at,
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::pages)]
pub struct NewPage<'a> {
    pub source_id: i64,
    pub title: &'a str,
    pub slug: &'a str,
    pub content: &'a str,
    pub status: &'a str,
    pub published_at: Option<String>,
    pub modified_at: Option<String>,
    pub author_id: i32,
    pub source_url: Option<&'a str>,
    pub created_at: &'a str,
}

impl<'a> NewPage<'a> {
    pub fn from_model(page: &'a models::Page, created_at: &'a str) -> Self {
        Self {
            source_id: page.source_id,
            title: &page.title,
            slug: &page.slug,
            content: &page.content,
            status: page.status.as_str(),
            published_at: page.published_at.map(|dt| dt.to_rfc3339()),
            modified_at: page.modified_at.map(|dt| dt.to_rfc3339()),
            author_id: page.author_id,
            source_url: page.source_url.as_deref(),
            created_at,
        }
    }
}

#[derive(Insertable, Debug, Clone, Copy)]
#[diesel(table_name = schema::post_categories)]
pub struct NewPostCategory {
    pub post_id: i32,
    pub category_id: i32,
}

#[derive(Insertable, Debug, Clone, Copy)]
#[diesel(table_name = schema::post_tags)]
pub struct NewPostTag {
    pub post_id: i32,
    pub tag_id: i32,
}

#[derive(Insertable, Debug, Clone, Copy)]
#[diesel(table_name = schema::source_aliases)]
pub struct NewSourceAlias<'a> {
    pub entity: &'a str,
    pub source_id: i64,
    pub target_id: i32,
}

/// Post row as read back from the store.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::posts)]
pub struct PostRecord {
    pub id: i32,
    pub source_id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub status: String,
    pub published_at: Option<String>,
    pub modified_at: Option<String>,
    pub author_id: i32,
    pub featured_image_id: Option<i32>,
    pub read_time_minutes: i32,
    pub source_url: Option<String>,
    pub created_at: String,
}

/// Category row as read back from the store.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::categories)]
pub struct CategoryRecord {
    pub id: i32,
    pub source_id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
    pub created_at: String,
}

/// User row as read back from the store.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::users)]
pub struct UserRecord {
    pub id: i32,
    pub source_id: Option<i64>,
    pub email: String,
    pub name: String,
    pub slug: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub registered_at: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub must_reset_password: i32,
    pub created_at: String,
}
