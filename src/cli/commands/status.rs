//! Status command: checkpoint progress and destination counts.

use std::collections::BTreeMap;

use console::style;
use serde::Serialize;

use crate::config::Settings;
use crate::migration::{CheckpointStore, MigrationState};
use crate::models::EntityType;

use super::super::helpers::open_existing_store;

#[derive(Serialize)]
struct StatusReport<'a> {
    checkpoint: &'a MigrationState,
    destination: Option<BTreeMap<EntityType, u64>>,
    errors: usize,
    done: bool,
}

/// Show per-entity progress.
pub async fn cmd_status(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let state = CheckpointStore::new(&settings.checkpoint_file).load().await;
    let destination = match open_existing_store(settings).await? {
        Some(store) => Some(store.counts().await?),
        None => None,
    };

    if json {
        let report = StatusReport {
            checkpoint: &state,
            destination,
            errors: state.errors.len(),
            done: state.is_done(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", style("Migration Status").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Checkpoint:", settings.checkpoint_file.display());
    if let Some(started) = state.started_at {
        println!("{:<20} {}", "Started:", started.format("%Y-%m-%d %H:%M"));
    }
    if let Some(updated) = state.updated_at {
        println!("{:<20} {}", "Last Update:", updated.format("%Y-%m-%d %H:%M"));
    }
    println!();

    for entity in EntityType::ALL {
        let record = state.record(entity);
        let status = if record.completed {
            style("Complete").green().to_string()
        } else if record.last_page > 0 {
            style("In Progress").yellow().to_string()
        } else {
            style("Not Started").dim().to_string()
        };
        let pages = match record.total_pages {
            Some(total) => format!("{}/{}", record.last_page, total),
            None => record.last_page.to_string(),
        };
        let rows = destination
            .as_ref()
            .and_then(|counts| counts.get(&entity))
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<12} {:<12} pages {:<8} imported {:<8} rows {}",
            entity.label(),
            status,
            pages,
            record.count,
            rows
        );
    }

    println!();
    if !state.pending_mappings.is_empty() {
        println!(
            "{:<20} {}",
            "Unflushed URLs:",
            state.pending_mappings.len()
        );
    }
    if state.errors.is_empty() {
        println!("{} No errors recorded", style("✓").green());
    } else {
        println!(
            "{} {} error(s) recorded; see {}",
            style("!").yellow(),
            state.errors.len(),
            settings.checkpoint_file.display()
        );
    }
    if state.is_done() {
        println!("{} Migration complete", style("✓").green());
    }

    Ok(())
}
