//! Author resolution for posts and pages.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use super::users::unusable_password;
use crate::models::{EntityType, Record, User, IMPORTED_ROLE};
use crate::repository::{DestinationStore, StoreError};

pub const DEFAULT_AUTHOR_EMAIL: &str = "imported-author@imported.local";

/// The placeholder account credited with content whose author is unknown.
pub fn default_author() -> User {
    User {
        source_id: None,
        email: DEFAULT_AUTHOR_EMAIL.to_string(),
        name: "Imported Author".to_string(),
        slug: "imported-author".to_string(),
        bio: None,
        avatar_url: None,
        registered_at: None,
        password_hash: unusable_password(),
        role: IMPORTED_ROLE.to_string(),
        must_reset_password: true,
    }
}

/// Maps source author ids to destination user ids.
///
/// Content whose author is absent or was never imported is credited to the
/// default author, which is created on first use.
pub struct AuthorResolver {
    store: Arc<dyn DestinationStore>,
    default_id: OnceCell<i32>,
}

impl AuthorResolver {
    pub fn new(store: Arc<dyn DestinationStore>) -> Self {
        Self {
            store,
            default_id: OnceCell::new(),
        }
    }

    /// Resolve an author. The note is set when a named author was not found.
    pub async fn resolve(
        &self,
        source_author: Option<i64>,
    ) -> Result<(i32, Option<String>), StoreError> {
        let Some(author) = source_author else {
            debug!("No author on record, using default author");
            return Ok((self.default_author_id().await?, None));
        };

        match self
            .store
            .find_by_source_id(EntityType::Users, author)
            .await?
        {
            Some(id) => Ok((id, None)),
            None => Ok((
                self.default_author_id().await?,
                Some(format!("author {author} not imported, using default author")),
            )),
        }
    }

    pub async fn default_author_id(&self) -> Result<i32, StoreError> {
        self.default_id
            .get_or_try_init(|| async {
                let upserted = self.store.upsert(&Record::User(default_author())).await?;
                if upserted.was_created() {
                    debug!("Created default author (id {})", upserted.id());
                }
                Ok::<_, StoreError>(upserted.id())
            })
            .await
            .copied()
    }
}
