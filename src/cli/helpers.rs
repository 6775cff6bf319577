//! Shared helper functions for CLI commands.

use std::sync::Arc;

use crate::config::Settings;
use crate::models::EntityType;
use crate::repository::{DbContext, DieselStore};
use crate::source_api::HttpClient;

/// Parse an entity type argument (`posts`, `post`, `Categories`, ...).
pub fn parse_entity(s: &str) -> Result<EntityType, String> {
    EntityType::from_str(s).ok_or_else(|| {
        let names: Vec<&str> = EntityType::ALL.iter().map(|e| e.as_str()).collect();
        format!("unknown entity type '{}' (expected one of: {})", s, names.join(", "))
    })
}

/// Open the destination store, creating its schema if needed.
pub async fn open_store(settings: &Settings) -> anyhow::Result<(DbContext, Arc<DieselStore>)> {
    let ctx = settings.create_db_context()?;
    ctx.init_schema().await?;
    let store = Arc::new(ctx.store());
    Ok((ctx, store))
}

/// Open the destination store only if it already exists.
///
/// A SQLite file that was never created stays absent.
pub async fn open_existing_store(settings: &Settings) -> anyhow::Result<Option<Arc<DieselStore>>> {
    if settings.database_url.is_none() && !settings.database_path().exists() {
        return Ok(None);
    }
    let (_, store) = open_store(settings).await?;
    Ok(Some(store))
}

/// HTTP client with the given spacing between requests.
pub fn http_client(settings: &Settings, delay: std::time::Duration) -> HttpClient {
    HttpClient::with_user_agent(settings.timeout(), delay, settings.user_agent.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity() {
        assert_eq!(parse_entity("Posts"), Ok(EntityType::Posts));
        assert_eq!(parse_entity("category"), Ok(EntityType::Categories));
        let err = parse_entity("comments").unwrap_err();
        assert!(err.contains("users, categories, tags, media, posts, pages"));
    }
}
