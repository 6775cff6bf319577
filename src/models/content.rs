//! Destination records produced by the importers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityType;

/// Publication state in the destination store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishStatus {
    Published,
    Draft,
}

impl PublishStatus {
    /// Map a source status; only `publish` is live, everything else is a draft.
    pub fn from_source(status: Option<&str>) -> Self {
        match status.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "publish" || s == "published" => Self::Published,
            _ => Self::Draft,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "PUBLISHED",
            Self::Draft => "DRAFT",
        }
    }
}

/// Role given to every imported account. Accounts in this role cannot log in
/// until their credentials are reset.
pub const IMPORTED_ROLE: &str = "IMPORTED";

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// None for the synthesized default author.
    pub source_id: Option<i64>,
    pub email: String,
    pub name: String,
    pub slug: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub registered_at: Option<DateTime<Utc>>,
    pub password_hash: String,
    pub role: String,
    pub must_reset_password: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub source_id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub source_id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub source_id: i64,
    pub filename: String,
    pub source_url: String,
    pub local_url: String,
    pub local_path: String,
    pub mime_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub file_size: i64,
    pub alt_text: Option<String>,
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub source_id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub status: PublishStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub author_id: i32,
    pub featured_image_id: Option<i32>,
    pub read_time_minutes: i32,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub source_id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub status: PublishStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub author_id: i32,
    pub source_url: Option<String>,
}

/// A record handed to the destination store for insert-or-skip.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(User),
    Category(Category),
    Tag(Tag),
    Media(MediaAsset),
    Post(Post),
    Page(Page),
}

impl Record {
    pub fn entity(&self) -> EntityType {
        match self {
            Self::User(_) => EntityType::Users,
            Self::Category(_) => EntityType::Categories,
            Self::Tag(_) => EntityType::Tags,
            Self::Media(_) => EntityType::Media,
            Self::Post(_) => EntityType::Posts,
            Self::Page(_) => EntityType::Pages,
        }
    }

    /// Stable key used to detect an earlier import of the same record.
    pub fn natural_key(&self) -> String {
        match self {
            Self::User(u) => u.email.clone(),
            Self::Category(c) => c.slug.clone(),
            Self::Tag(t) => t.slug.clone(),
            Self::Media(m) => m.source_id.to_string(),
            Self::Post(p) => p.slug.clone(),
            Self::Page(p) => p.slug.clone(),
        }
    }

    pub fn source_id(&self) -> Option<i64> {
        match self {
            Self::User(u) => u.source_id,
            Self::Category(c) => Some(c.source_id),
            Self::Tag(t) => Some(t.source_id),
            Self::Media(m) => Some(m.source_id),
            Self::Post(p) => Some(p.source_id),
            Self::Page(p) => Some(p.source_id),
        }
    }
}

/// Join rows written in bulk after a post is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    PostCategory { post_id: i32, category_id: i32 },
    PostTag { post_id: i32, tag_id: i32 },
}
