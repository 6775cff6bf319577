//! User importer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{decode, EntityImporter, ImportOutcome, PageContext, RecordError};
use crate::models::{parse_source_datetime, EntityType, Record, SourceUser, User, IMPORTED_ROLE};
use crate::repository::{DestinationStore, Upserted};
use crate::utils::decode_entities;

/// Stable address for a user the source exposes without an email.
pub fn placeholder_email(source_id: i64) -> String {
    format!("user-{source_id}@imported.local")
}

/// Password field value that no password can ever match.
pub fn unusable_password() -> String {
    format!("!imported:{}", uuid::Uuid::new_v4())
}

pub struct UserImporter {
    store: Arc<dyn DestinationStore>,
}

impl UserImporter {
    pub fn new(store: Arc<dyn DestinationStore>) -> Self {
        Self { store }
    }

    fn to_user(source: &SourceUser) -> User {
        let email = source
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| placeholder_email(source.id));

        let slug = source
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("user-{}", source.id));

        let name = source
            .name
            .as_deref()
            .map(decode_entities)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| slug.clone());

        User {
            source_id: Some(source.id),
            email,
            name,
            slug,
            bio: source
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            avatar_url: source.avatar_url().map(str::to_string),
            registered_at: parse_source_datetime(source.registered_date.as_deref()),
            password_hash: unusable_password(),
            role: IMPORTED_ROLE.to_string(),
            must_reset_password: true,
        }
    }
}

#[async_trait]
impl EntityImporter for UserImporter {
    fn entity(&self) -> EntityType {
        EntityType::Users
    }

    async fn import_record(
        &self,
        raw: &Value,
        _ctx: &PageContext<'_>,
    ) -> Result<ImportOutcome, RecordError> {
        let source: SourceUser = decode(raw)?;

        if self
            .store
            .find_by_source_id(EntityType::Users, source.id)
            .await?
            .is_some()
        {
            return Ok(ImportOutcome::Skipped {
                source_id: source.id,
                reason: "already imported".to_string(),
                mapping: None,
            });
        }

        let user = Self::to_user(&source);
        match self.store.upsert(&Record::User(user)).await? {
            Upserted::Created(id) => Ok(ImportOutcome::Imported {
                source_id: source.id,
                id,
                mapping: None,
                notes: Vec::new(),
            }),
            Upserted::Existing(id) => {
                self.store
                    .record_alias(EntityType::Users, source.id, id)
                    .await?;
                Ok(ImportOutcome::Skipped {
                    source_id: source.id,
                    reason: "email already in use".to_string(),
                    mapping: None,
                })
            }
        }
    }
}
