//! Application configuration for SiteCrawl.
//!
//! User config lives at `~/.sitecrawl/sitecrawl.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteCrawlError};
use crate::types::CrawlOpts;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitecrawl.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitecrawl";

// ---------------------------------------------------------------------------
// Config structs (matching sitecrawl.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global crawl defaults applied to new sites.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Bloom filter sizing for new sites.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// HTTP client settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Stale-claim recovery policy.
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database file path. A leading `~/` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Milliseconds to wait between two crawled resources.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Maximum link expansion depth, negative for unlimited.
    #[serde(default = "default_unlimited")]
    pub max_depth: i64,

    /// Maximum number of crawled resources, negative for unlimited.
    #[serde(default = "default_unlimited")]
    pub max_resources: i64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            delay_ms: default_delay_ms(),
            max_depth: default_unlimited(),
            max_resources: default_unlimited(),
        }
    }
}

fn default_db_path() -> String {
    "~/.sitecrawl/sitecrawl.db".into()
}
fn default_delay_ms() -> u64 {
    100
}
fn default_unlimited() -> i64 {
    -1
}

/// `[dedup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Expected number of distinct URLs per site.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Target false positive probability.
    #[serde(default = "default_probability")]
    pub probability: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            probability: default_probability(),
        }
    }
}

fn default_max_entries() -> u64 {
    5000
}
fn default_probability() -> f64 {
    0.01
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("SiteCrawl/", env!("CARGO_PKG_VERSION")).into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[recovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Claims older than this many seconds are released when a crawl starts.
    #[serde(default)]
    pub stale_claim_secs: u64,

    /// How many consecutive claim failures the controller tolerates.
    #[serde(default = "default_claim_retries")]
    pub claim_retries: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_claim_secs: 0,
            claim_retries: default_claim_retries(),
        }
    }
}

fn default_claim_retries() -> u32 {
    3
}

impl From<&AppConfig> for CrawlOpts {
    fn from(config: &AppConfig) -> Self {
        Self {
            delay_ms: config.defaults.delay_ms,
            max_depth: config.defaults.max_depth,
            max_resources: config.defaults.max_resources,
        }
    }
}

impl AppConfig {
    /// Resolve the configured database path, expanding a leading `~/`.
    pub fn db_path(&self) -> Result<PathBuf> {
        expand_home(&self.defaults.db_path)
    }
}

fn expand_home(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| SiteCrawlError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitecrawl/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteCrawlError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitecrawl/sitecrawl.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteCrawlError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SiteCrawlError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteCrawlError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteCrawlError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteCrawlError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
