//! Reset command.
//!
//! Only checkpoint progress is forgotten. Destination rows stay, so a later
//! run skips records that were already imported.

use console::style;

use crate::config::Settings;
use crate::migration::{CheckpointStore, MigrationState};
use crate::models::EntityType;

/// Reset progress for the given entity types, everything, or the error log.
pub async fn cmd_reset(
    settings: &Settings,
    entities: &[EntityType],
    all: bool,
    errors: bool,
) -> anyhow::Result<()> {
    if entities.is_empty() && !all && !errors {
        anyhow::bail!("Nothing to reset; name entity types, or pass --all or --errors");
    }

    let checkpoints = CheckpointStore::new(&settings.checkpoint_file);
    let mut state = checkpoints.load().await;
    apply_reset(&mut state, entities, all, errors);
    checkpoints.save(&state).await?;

    if all {
        println!("{} Reset all migration progress", style("✓").green());
    } else {
        for entity in entities {
            println!("{} Reset {}", style("✓").green(), entity.label());
        }
        if errors {
            println!("{} Cleared error log", style("✓").green());
        }
    }

    Ok(())
}

fn apply_reset(state: &mut MigrationState, entities: &[EntityType], all: bool, errors: bool) {
    if all {
        *state = MigrationState::default();
        return;
    }
    for entity in entities {
        state.reset(*entity);
    }
    if errors {
        state.clear_errors();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::ImportError;

    fn state() -> MigrationState {
        let mut state = MigrationState::default();
        for entity in EntityType::ALL {
            let record = state.record_mut(entity);
            record.completed = true;
            record.last_page = 2;
        }
        state
            .errors
            .push(ImportError::new(EntityType::Posts, Some(7), "missing slug"));
        state
    }

    #[test]
    fn test_reset_selected_entities_keeps_errors() {
        let mut state = state();
        apply_reset(&mut state, &[EntityType::Posts], false, false);

        assert!(!state.is_completed(EntityType::Posts));
        assert_eq!(state.record(EntityType::Posts).last_page, 0);
        assert!(state.is_completed(EntityType::Users));
        assert_eq!(state.errors.len(), 1);
    }

    #[test]
    fn test_reset_errors_only() {
        let mut state = state();
        apply_reset(&mut state, &[], false, true);
        assert!(state.errors.is_empty());
        assert!(state.is_done());
    }

    #[test]
    fn test_reset_all() {
        let mut state = state();
        apply_reset(&mut state, &[], true, false);
        assert_eq!(state, MigrationState::default());
    }
}
