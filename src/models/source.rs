//! Records as returned by the source content API.
//!
//! Every attribute the source may omit is optional. Validation happens in
//! the importers, not here, so a sparse record still deserializes and can be
//! reported against its source id.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// A `{ "rendered": "..." }` wrapper used for titles, content and excerpts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rendered {
    #[serde(default)]
    pub rendered: String,
}

/// Reference to an embedded object; only the id is needed for resolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddedRef {
    #[serde(default)]
    pub id: Option<i64>,
}

/// The `_embedded` block present when the collection is fetched with `_embed`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Embedded {
    #[serde(default)]
    pub author: Vec<EmbeddedRef>,
    #[serde(default, rename = "wp:featuredmedia")]
    pub featured_media: Vec<EmbeddedRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceUser {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar_urls: BTreeMap<String, String>,
    #[serde(default)]
    pub registered_date: Option<String>,
}

impl SourceUser {
    /// Largest avatar the source offers (keys are pixel sizes).
    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_urls
            .iter()
            .max_by_key(|(size, _)| size.parse::<u32>().unwrap_or(0))
            .map(|(_, url)| url.as_str())
    }
}

/// Category or tag.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceTerm {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Parent category id; 0 or absent means top level. Tags have none.
    #[serde(default)]
    pub parent: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaDetails {
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub filesize: Option<i64>,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceMedia {
    pub id: i64,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<Rendered>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub media_details: Option<MediaDetails>,
    #[serde(default)]
    pub date_gmt: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl SourceMedia {
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        parse_source_datetime(self.date_gmt.as_deref().or(self.date.as_deref()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcePost {
    pub id: i64,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<Rendered>,
    #[serde(default)]
    pub content: Option<Rendered>,
    #[serde(default)]
    pub excerpt: Option<Rendered>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub date_gmt: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub modified_gmt: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub author: Option<i64>,
    #[serde(default)]
    pub featured_media: Option<i64>,
    #[serde(default)]
    pub categories: Vec<i64>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, rename = "_embedded")]
    pub embedded: Option<Embedded>,
}

impl SourcePost {
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_source_datetime(self.date_gmt.as_deref().or(self.date.as_deref()))
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        parse_source_datetime(self.modified_gmt.as_deref().or(self.modified.as_deref()))
    }

    /// Author id, preferring the plain field over the embedded payload.
    pub fn author_id(&self) -> Option<i64> {
        self.author.filter(|id| *id > 0).or_else(|| {
            self.embedded
                .as_ref()
                .and_then(|e| e.author.first())
                .and_then(|a| a.id)
                .filter(|id| *id > 0)
        })
    }

    /// Featured media id; 0 means none.
    pub fn featured_media_id(&self) -> Option<i64> {
        self.featured_media.filter(|id| *id > 0).or_else(|| {
            self.embedded
                .as_ref()
                .and_then(|e| e.featured_media.first())
                .and_then(|m| m.id)
                .filter(|id| *id > 0)
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcePage {
    pub id: i64,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<Rendered>,
    #[serde(default)]
    pub content: Option<Rendered>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub date_gmt: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub modified_gmt: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub author: Option<i64>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, rename = "_embedded")]
    pub embedded: Option<Embedded>,
}

impl SourcePage {
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_source_datetime(self.date_gmt.as_deref().or(self.date.as_deref()))
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        parse_source_datetime(self.modified_gmt.as_deref().or(self.modified.as_deref()))
    }

    pub fn author_id(&self) -> Option<i64> {
        self.author.filter(|id| *id > 0).or_else(|| {
            self.embedded
                .as_ref()
                .and_then(|e| e.author.first())
                .and_then(|a| a.id)
                .filter(|id| *id > 0)
        })
    }
}

/// Parse a source timestamp.
///
/// Accepts RFC 3339 and the zone-less `YYYY-MM-DDTHH:MM:SS` form the API uses
/// for `*_gmt` fields, which is taken as UTC.
pub fn parse_source_datetime(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_with_embedded_refs() {
        let post: SourcePost = serde_json::from_value(json!({
            "id": 17,
            "slug": "hello-world",
            "title": {"rendered": "Hello"},
            "status": "publish",
            "date_gmt": "2021-03-04T05:06:07",
            "author": 0,
            "featured_media": 0,
            "categories": [3, 4],
            "_embedded": {
                "author": [{"id": 9, "name": "Ann"}],
                "wp:featuredmedia": [{"id": 55}]
            }
        }))
        .unwrap();

        assert_eq!(post.author_id(), Some(9));
        assert_eq!(post.featured_media_id(), Some(55));
        assert_eq!(post.categories, vec![3, 4]);
        assert!(post.tags.is_empty());
        assert_eq!(
            post.published_at().unwrap().to_rfc3339(),
            "2021-03-04T05:06:07+00:00"
        );
    }

    #[test]
    fn test_sparse_records_deserialize() {
        let page: SourcePage = serde_json::from_value(json!({"id": 2})).unwrap();
        assert!(page.slug.is_none());
        assert!(page.author_id().is_none());

        let term: SourceTerm = serde_json::from_value(json!({"id": 5, "name": "News"})).unwrap();
        assert_eq!(term.parent, None);
    }

    #[test]
    fn test_avatar_prefers_largest() {
        let user: SourceUser = serde_json::from_value(json!({
            "id": 1,
            "avatar_urls": {"24": "small", "96": "large", "48": "medium"}
        }))
        .unwrap();
        assert_eq!(user.avatar_url(), Some("large"));
    }

    #[test]
    fn test_parse_source_datetime_forms() {
        assert!(parse_source_datetime(Some("2020-01-01T00:00:00Z")).is_some());
        assert!(parse_source_datetime(Some("2020-01-01 10:11:12")).is_some());
        assert!(parse_source_datetime(Some("")).is_none());
        assert!(parse_source_datetime(Some("yesterday")).is_none());
        assert!(parse_source_datetime(None).is_none());
    }
}
