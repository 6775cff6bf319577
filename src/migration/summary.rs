//! End-of-run summary.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use console::style;
use serde::Serialize;

use super::errors::ImportError;
use crate::models::EntityType;
use crate::utils::format_duration;

/// Where the orchestrator is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "entity")]
pub enum MigrationPhase {
    NotStarted,
    Running(EntityType),
    Done,
    Failed,
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not started"),
            Self::Running(entity) => write!(f, "{}", entity),
            Self::Done => f.write_str("done"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Counters for one entity type in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityTally {
    pub imported: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Dropped references and similar non-fatal problems.
    pub warnings: u64,
    pub pages: u32,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub phase: MigrationPhase,
    pub entities: BTreeMap<EntityType, EntityTally>,
    /// Errors from this run, oldest first, capped for display.
    pub errors: Vec<ImportError>,
    pub total_errors: usize,
    pub manifest: Option<PathBuf>,
    pub mappings_written: usize,
    pub elapsed_secs: f64,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            phase: MigrationPhase::NotStarted,
            entities: BTreeMap::new(),
            errors: Vec::new(),
            total_errors: 0,
            manifest: None,
            mappings_written: 0,
            elapsed_secs: 0.0,
        }
    }

    pub fn tally(&self, entity: EntityType) -> EntityTally {
        self.entities.get(&entity).cloned().unwrap_or_default()
    }

    pub fn tally_mut(&mut self, entity: EntityType) -> &mut EntityTally {
        self.entities.entry(entity).or_default()
    }

    pub fn imported(&self) -> u64 {
        self.entities.values().map(|t| t.imported).sum()
    }

    /// Whether every entity type has been migrated.
    pub fn is_complete(&self) -> bool {
        EntityType::ALL
            .iter()
            .all(|e| self.entities.get(e).is_some_and(|t| t.completed))
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
    }

    /// Print the summary for an operator.
    pub fn print(&self) {
        println!();
        println!("{}", style("Migration Summary").bold());
        println!("{}", "-".repeat(64));
        println!(
            "{:<12} {:>9} {:>9} {:>8} {:>9} {:>6}  {}",
            "Entity", "Imported", "Skipped", "Errors", "Warnings", "Pages", "Status"
        );

        for entity in EntityType::ALL {
            let Some(tally) = self.entities.get(&entity) else {
                continue;
            };
            let status = if tally.completed {
                style("complete").green().to_string()
            } else {
                style("incomplete").yellow().to_string()
            };
            println!(
                "{:<12} {:>9} {:>9} {:>8} {:>9} {:>6}  {}",
                entity.label(),
                tally.imported,
                tally.skipped,
                tally.errors,
                tally.warnings,
                tally.pages,
                status
            );
        }
        println!("{}", "-".repeat(64));

        if let Some(manifest) = &self.manifest {
            println!(
                "{} URL mapping: {} ({} rows from this run)",
                style("→").cyan(),
                manifest.display(),
                self.mappings_written
            );
        }
        println!(
            "{:<20} {}",
            "Elapsed:",
            format_duration(Duration::from_secs_f64(self.elapsed_secs))
        );

        if !self.errors.is_empty() {
            println!();
            println!(
                "{} {} problem(s) recorded",
                style("!").yellow(),
                self.total_errors
            );
            for error in &self.errors {
                let id = error
                    .source_id
                    .map(|id| format!("#{id}"))
                    .unwrap_or_else(|| "-".to_string());
                println!("  {} {:<10} {:<8} {}", style("✗").red(), error.entity, id, error.message);
            }
            if self.total_errors > self.errors.len() {
                println!(
                    "  ... and {} more (see the checkpoint file)",
                    self.total_errors - self.errors.len()
                );
            }
        }

        match self.phase {
            MigrationPhase::Failed => {
                println!("{} Migration aborted", style("✗").red());
            }
            _ if self.is_complete() => {
                println!("{} Migration complete", style("✓").green());
            }
            _ => {
                println!(
                    "{} Migration incomplete; run again to resume",
                    style("!").yellow()
                );
            }
        }
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
