//! Initialize command.

use console::style;

use crate::config::{Config, Settings};
use crate::repository::util::redact_url_password;

use super::super::helpers::open_store;

/// Initialize the data directory and destination schema.
pub async fn cmd_init(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    open_store(settings).await?;

    println!(
        "{} Initialized contentmigrate in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!(
        "{:<20} {}",
        "Database:",
        redact_url_password(&settings.database_url())
    );
    println!("{:<20} {}", "Uploads:", settings.uploads_dir.display());
    println!("{:<20} {}", "Checkpoint:", settings.checkpoint_file.display());
    println!("{:<20} {}", "URL mapping:", settings.manifest_file.display());
    if let Some(ref path) = config.source_path {
        println!("{:<20} {}", "Config:", path.display());
    }

    if settings.source_url.is_none() {
        println!(
            "{} No source API configured",
            style("!").yellow()
        );
        println!("  Set source_url in contentmigrate.toml or CONTENT_SOURCE_URL to get started");
    }
    if settings.site_url.is_empty() {
        println!(
            "{} No site_url configured; mapped URLs will be site-relative",
            style("!").yellow()
        );
    }

    Ok(())
}
