//! Entity types migrated by the pipeline and their dependency order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the six kinds of content pulled from the source API.
///
/// The declaration order is the dependency order: posts need users,
/// categories, tags and media committed before they can resolve references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Users,
    Categories,
    Tags,
    Media,
    Posts,
    Pages,
}

impl EntityType {
    /// All entity types in import order.
    pub const ALL: [EntityType; 6] = [
        Self::Users,
        Self::Categories,
        Self::Tags,
        Self::Media,
        Self::Posts,
        Self::Pages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Categories => "categories",
            Self::Tags => "tags",
            Self::Media => "media",
            Self::Posts => "posts",
            Self::Pages => "pages",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "users" | "user" => Some(Self::Users),
            "categories" | "category" => Some(Self::Categories),
            "tags" | "tag" => Some(Self::Tags),
            "media" => Some(Self::Media),
            "posts" | "post" => Some(Self::Posts),
            "pages" | "page" => Some(Self::Pages),
            _ => None,
        }
    }

    /// Collection path segment on the source API.
    pub fn collection(&self) -> &'static str {
        self.as_str()
    }

    /// Human-readable label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Users => "Users",
            Self::Categories => "Categories",
            Self::Tags => "Tags",
            Self::Media => "Media",
            Self::Posts => "Posts",
            Self::Pages => "Pages",
        }
    }

    /// Entity types that must be committed before this one starts.
    pub fn prerequisites(&self) -> &'static [EntityType] {
        match self {
            Self::Users => &[],
            Self::Categories => &[Self::Users],
            Self::Tags => &[Self::Users, Self::Categories],
            Self::Media => &[Self::Users, Self::Categories, Self::Tags],
            Self::Posts => &[Self::Users, Self::Categories, Self::Tags, Self::Media],
            Self::Pages => &[
                Self::Users,
                Self::Categories,
                Self::Tags,
                Self::Media,
                Self::Posts,
            ],
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_dependency_ordered() {
        for (idx, entity) in EntityType::ALL.iter().enumerate() {
            for prereq in entity.prerequisites() {
                let prereq_idx = EntityType::ALL.iter().position(|e| e == prereq).unwrap();
                assert!(prereq_idx < idx, "{} must come before {}", prereq, entity);
            }
        }
    }

    #[test]
    fn test_from_str_accepts_singular() {
        assert_eq!(EntityType::from_str("post"), Some(EntityType::Posts));
        assert_eq!(EntityType::from_str(" Categories "), Some(EntityType::Categories));
        assert_eq!(EntityType::from_str("comments"), None);
    }

    #[test]
    fn test_serializes_as_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(EntityType::Media, 3);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"media":3}"#);
    }
}
