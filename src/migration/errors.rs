//! Per-record error collection.
//!
//! Nothing here aborts a run: failures are recorded with their entity type
//! and source id and surfaced in the summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::EntityType;

/// A record- or page-level failure that did not stop the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportError {
    pub entity: EntityType,
    /// None when the failure is not tied to one record (e.g. a page fetch).
    pub source_id: Option<i64>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ImportError {
    pub fn new(entity: EntityType, source_id: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            entity,
            source_id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only list of errors for the current run.
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    entries: Vec<ImportError>,
    persisted: usize,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error and log it.
    pub fn record(
        &mut self,
        entity: EntityType,
        source_id: Option<i64>,
        message: impl Into<String>,
    ) -> &ImportError {
        let error = ImportError::new(entity, source_id, message);
        match error.source_id {
            Some(id) => warn!(entity = %entity, source_id = id, "{}", error.message),
            None => warn!(entity = %entity, "{}", error.message),
        }
        self.entries.push(error);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[ImportError] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_for(&self, entity: EntityType) -> usize {
        self.entries.iter().filter(|e| e.entity == entity).count()
    }

    /// The oldest `limit` errors.
    pub fn capped(&self, limit: usize) -> &[ImportError] {
        &self.entries[..self.entries.len().min(limit)]
    }

    /// Errors recorded since the last call, for appending to the checkpoint.
    pub fn take_unpersisted(&mut self) -> Vec<ImportError> {
        let fresh = self.entries[self.persisted..].to_vec();
        self.persisted = self.entries.len();
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let mut errors = ErrorAccumulator::new();
        errors.record(EntityType::Posts, Some(3), "missing slug");
        errors.record(EntityType::Posts, None, "page 2: HTTP 500");
        errors.record(EntityType::Media, Some(9), "HTTP 404");

        assert_eq!(errors.len(), 3);
        assert_eq!(errors.count_for(EntityType::Posts), 2);
        assert_eq!(errors.count_for(EntityType::Users), 0);
        assert_eq!(errors.entries()[0].source_id, Some(3));
    }

    #[test]
    fn test_capped_keeps_oldest() {
        let mut errors = ErrorAccumulator::new();
        for id in 0..10 {
            errors.record(EntityType::Tags, Some(id), "bad");
        }
        let capped = errors.capped(4);
        assert_eq!(capped.len(), 4);
        assert_eq!(capped[3].source_id, Some(3));
        assert_eq!(errors.capped(50).len(), 10);
    }

    #[test]
    fn test_take_unpersisted() {
        let mut errors = ErrorAccumulator::new();
        errors.record(EntityType::Users, Some(1), "a");
        assert_eq!(errors.take_unpersisted().len(), 1);
        assert!(errors.take_unpersisted().is_empty());
        errors.record(EntityType::Users, Some(2), "b");
        let fresh = errors.take_unpersisted();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].source_id, Some(2));
    }

    #[test]
    fn test_serialized_field_names() {
        let error = ImportError::new(EntityType::Posts, Some(12), "missing slug");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["entity"], "posts");
        assert_eq!(json["sourceId"], 12);
    }
}
