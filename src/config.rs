//! Configuration management for contentmigrate using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::migration::{MigrationOptions, SiteLayout};
use crate::repository::util::is_postgres_url;
use crate::repository::{DbContext, DbError};
use crate::source_api::MAX_PER_PAGE;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "contentmigrate.db";

/// Default checkpoint filename, relative to the data directory.
pub const DEFAULT_CHECKPOINT_FILE: &str = "migration-state.json";

/// Default URL mapping manifest filename, relative to the data directory.
pub const DEFAULT_MANIFEST_FILE: &str = "url-mapping.csv";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// Root of the source content API, e.g. `https://old.example/wp-json/wp/v2`.
    pub source_url: Option<String>,
    /// Origin of the new site used in mapped URLs.
    pub site_url: String,
    pub post_path_prefix: String,
    pub page_path_prefix: String,
    /// Where downloaded media is stored.
    pub uploads_dir: PathBuf,
    /// Public URL prefix of `uploads_dir`.
    pub uploads_url: String,
    /// Records per page requested from the source.
    pub per_page: u32,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay between page requests in milliseconds.
    pub request_delay_ms: u64,
    /// Delay between asset downloads in milliseconds.
    pub asset_delay_ms: u64,
    /// Retries for a failed page fetch.
    pub max_retries: u32,
    /// Retries for a failed asset download.
    pub download_retries: u32,
    /// Records of one page imported concurrently.
    pub workers: usize,
    /// Errors listed in the run summary.
    pub error_display_limit: usize,
    pub checkpoint_file: PathBuf,
    pub manifest_file: PathBuf,
    /// User agent for HTTP requests; None uses the built-in one.
    pub user_agent: Option<String>,
    /// Ask the source to embed authors and featured media.
    pub embed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("contentmigrate");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            uploads_dir: data_dir.join("uploads"),
            checkpoint_file: data_dir.join(DEFAULT_CHECKPOINT_FILE),
            manifest_file: data_dir.join(DEFAULT_MANIFEST_FILE),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            source_url: None,
            site_url: String::new(),
            post_path_prefix: "/blog".to_string(),
            page_path_prefix: String::new(),
            uploads_url: "/uploads".to_string(),
            per_page: MAX_PER_PAGE,
            request_timeout: 30,
            request_delay_ms: 500,
            asset_delay_ms: 500,
            max_retries: 3,
            download_retries: 1,
            workers: 1,
            error_display_limit: 50,
            user_agent: None,
            embed: true,
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        match self.database_url {
            Some(ref url) => url.clone(),
            None => format!("sqlite:{}", self.database_path().display()),
        }
    }

    /// Check if using PostgreSQL (vs SQLite).
    pub fn is_postgres(&self) -> bool {
        self.database_url
            .as_ref()
            .is_some_and(|url| is_postgres_url(url))
    }

    /// Get the full path to the database (for SQLite file-based databases).
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data and uploads directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.uploads_dir)?;
        for file in [&self.checkpoint_file, &self.manifest_file] {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Create the database context for the destination store.
    pub fn create_db_context(&self) -> Result<DbContext, DbError> {
        match self.database_url {
            Some(ref url) => DbContext::from_url(url),
            None => {
                DbContext::ensure_parent_dir(&self.database_path())?;
                Ok(DbContext::new(&self.database_path()))
            }
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn asset_delay(&self) -> Duration {
        Duration::from_millis(self.asset_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Where imported content lives on the new site.
    pub fn site_layout(&self) -> SiteLayout {
        SiteLayout {
            site_url: self.site_url.clone(),
            post_path_prefix: self.post_path_prefix.clone(),
            page_path_prefix: self.page_path_prefix.clone(),
            uploads_dir: self.uploads_dir.clone(),
            uploads_url: self.uploads_url.clone(),
        }
    }

    /// Orchestrator options derived from these settings.
    pub fn migration_options(&self) -> MigrationOptions {
        MigrationOptions {
            per_page: self.per_page,
            workers: self.workers.max(1),
            record_retries: self.download_retries,
            retry_delay: self.asset_delay(),
            error_display_limit: self.error_display_limit,
            ..Default::default()
        }
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// `DATABASE_URL`, `CONTENT_SOURCE_URL` and `SITE_URL` take precedence
    /// over the config file.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("DATABASE_URL") {
            tracing::debug!("Using DATABASE_URL from environment");
            self.database_url = Some(url);
        }
        if let Some(url) = var("CONTENT_SOURCE_URL") {
            tracing::debug!("Using CONTENT_SOURCE_URL from environment: {}", url);
            self.source_url = Some(url);
        }
        if let Some(url) = var("SITE_URL") {
            tracing::debug!("Using SITE_URL from environment: {}", url);
            self.site_url = url;
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_path_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_path_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploads_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploads_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Delay between requests in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_display_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_file: Option<String>,
    /// User agent string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<bool>,
    /// Path the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    pub async fn load() -> Self {
        match prefer::load("contentmigrate").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (typically config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            let data_dir = self.resolve_path(data_dir, base_dir);
            *settings = Settings {
                database_url: settings.database_url.take(),
                ..Settings::with_data_dir(data_dir)
            };
        }
        // Data-relative files resolve against the data directory.
        let data_dir = settings.data_dir.clone();

        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref url) = self.source_url {
            settings.source_url = Some(url.clone());
        }
        if let Some(ref url) = self.site_url {
            settings.site_url = url.clone();
        }
        if let Some(ref prefix) = self.post_path_prefix {
            settings.post_path_prefix = prefix.clone();
        }
        if let Some(ref prefix) = self.page_path_prefix {
            settings.page_path_prefix = prefix.clone();
        }
        if let Some(ref dir) = self.uploads_dir {
            settings.uploads_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref url) = self.uploads_url {
            settings.uploads_url = url.clone();
        }
        if let Some(per_page) = self.per_page {
            settings.per_page = per_page.clamp(1, MAX_PER_PAGE);
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(delay) = self.asset_delay_ms {
            settings.asset_delay_ms = delay;
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(retries) = self.download_retries {
            settings.download_retries = retries;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers.max(1);
        }
        if let Some(limit) = self.error_display_limit {
            settings.error_display_limit = limit;
        }
        if let Some(ref file) = self.checkpoint_file {
            settings.checkpoint_file = self.resolve_path(file, &data_dir);
        }
        if let Some(ref file) = self.manifest_file {
            settings.manifest_file = self.resolve_path(file, &data_dir);
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(embed) = self.embed {
            settings.embed = embed;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory override (--target flag).
    pub data_dir: Option<PathBuf>,
}

/// Look for a config file inside the data directory.
fn find_config_in_data_dir(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["toml", "yaml", "yml", "json"];
    let basenames = ["contentmigrate", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

/// Load config from the appropriate source based on options.
async fn load_file_config(options: &LoadOptions, data_dir: Option<&Path>) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return Config::load_from_path(config_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                Config::default()
            });
    }

    // Priority 2: Config inside the data dir
    if let Some(config_path) = data_dir.and_then(find_config_in_data_dir) {
        tracing::debug!("Found config in data dir: {}", config_path.display());
        return Config::load_from_path(&config_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                Config::default()
            });
    }

    // Priority 3: Auto-discover via prefer
    Config::load().await
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let data_dir_override = options.data_dir.as_deref().map(absolute);
    let config = load_file_config(&options, data_dir_override.as_deref()).await;

    let mut settings = Settings::default();

    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };

    // --target decides the data directory before file settings refine it.
    if let Some(ref data_dir) = data_dir_override {
        settings = Settings::with_data_dir(data_dir.clone());
    }
    let mut file_config = config.clone();
    if data_dir_override.is_some() {
        file_config.data_dir = None;
    }
    file_config.apply_to_settings(&mut settings, &base_dir);

    settings.apply_env_overrides(|name| std::env::var(name).ok());

    (settings, config)
}
