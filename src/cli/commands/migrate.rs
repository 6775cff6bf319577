//! Migrate command: run or resume the pipeline.

use std::sync::Arc;

use console::style;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::migration::{CheckpointStore, HttpAssetDownloader, Migration};
use crate::models::EntityType;
use crate::source_api::{RateLimiter, RestContentSource};

use super::super::helpers::{http_client, open_store};

/// Run every unfinished phase and print the summary.
pub async fn cmd_migrate(
    settings: &Settings,
    max_posts: Option<u64>,
    workers: Option<usize>,
    only: Vec<EntityType>,
    json: bool,
) -> anyhow::Result<()> {
    let Some(ref source_url) = settings.source_url else {
        anyhow::bail!("No source API configured; set source_url or CONTENT_SOURCE_URL");
    };
    if settings.site_url.is_empty() {
        warn!("site_url is not set; mapped URLs will be site-relative");
    }

    settings.ensure_directories()?;
    let (_ctx, store) = open_store(settings).await?;

    let api_client = http_client(settings, settings.request_delay());
    let asset_client = http_client(settings, settings.asset_delay());
    let limiters = [
        ("api", api_client.rate_limiter().clone()),
        ("assets", asset_client.rate_limiter().clone()),
    ];
    let source = RestContentSource::new(api_client, source_url)?
        .with_max_retries(settings.max_retries)
        .with_embed(settings.embed);
    let downloader = HttpAssetDownloader::new(asset_client);

    let mut options = settings.migration_options();
    options.max_posts = max_posts;
    if let Some(workers) = workers {
        options.workers = workers.max(1);
    }
    options.only = only;
    options.show_progress = !json;

    if !json {
        println!(
            "{} Migrating from {}",
            style("→").cyan(),
            source_url
        );
    }
    info!(
        "Starting migration: per_page={}, workers={}, max_posts={:?}",
        options.per_page, options.workers, options.max_posts
    );

    let migration = Migration::new(
        Arc::new(source),
        store,
        Arc::new(downloader),
        CheckpointStore::new(&settings.checkpoint_file),
        &settings.manifest_file,
        settings.site_layout(),
    )
    .with_options(options);

    let result = migration.run().await;
    for (label, limiter) in &limiters {
        log_rate_limits(label, limiter).await;
    }

    match result {
        Ok(summary) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                summary.print();
            }
            Ok(())
        }
        Err(failure) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&failure.summary)?);
            } else {
                failure.summary.print();
            }
            Err(failure.error.into())
        }
    }
}

/// Log per-host request totals; hosts that throttled us are warnings.
async fn log_rate_limits(label: &str, limiter: &RateLimiter) {
    for (domain, stats) in limiter.get_stats().await {
        if stats.rate_limit_hits > 0 {
            warn!(
                "{} host {} rate limited {} time(s) over {} requests (delay now {:?})",
                label, domain, stats.rate_limit_hits, stats.total_requests, stats.current_delay
            );
        } else {
            debug!(
                "{} host {}: {} requests, delay {:?}",
                label, domain, stats.total_requests, stats.current_delay
            );
        }
    }
}
