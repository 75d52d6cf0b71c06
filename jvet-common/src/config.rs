//! Configuration loading and config file resolution
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`JVET_CONFIG`)
//! 3. User config file (`~/.config/jvet/config.toml`)
//! 4. Built-in defaults (fallback)
//!
//! Every section is optional; a missing file or section yields the defaults
//! below.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "JVET_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dispatcher settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-backend settings keyed by backend name
    #[serde(default)]
    pub backends: BTreeMap<String, BackendSettings>,

    /// Local venue lists, one backend per entry
    #[serde(default)]
    pub lists: Vec<ListSource>,

    /// OpenAlex heuristic backend
    #[serde(default)]
    pub openalex: OpenAlexConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Timeout applied to backends without their own `timeout_secs`
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lifetime of a cached backend outcome
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Settings for one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Disabled backends are never queried
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Vote weight applied during aggregation
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Per-backend timeout; falls back to `dispatch.default_timeout_secs`
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: default_weight(),
            timeout_secs: None,
        }
    }
}

/// What membership in a local list means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// Known predatory venues
    Predatory,
    /// Curated legitimate venues (whitelists, indexes)
    Legitimate,
    /// Quality/risk annotations (e.g. retraction history)
    Quality,
}

/// A local venue list file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSource {
    /// Backend name the list is registered under
    pub name: String,
    pub kind: ListKind,
    /// TOML or JSON file; relative paths resolve against the config file
    pub path: PathBuf,
}

/// OpenAlex backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAlexConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_openalex_url")]
    pub base_url: String,

    /// Contact address for the OpenAlex polite pool
    #[serde(default)]
    pub mailto: Option<String>,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for OpenAlexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_openalex_url(),
            mailto: None,
            requests_per_second: default_requests_per_second(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

fn default_openalex_url() -> String {
    "https://api.openalex.org".to_string()
}

fn default_requests_per_second() -> u32 {
    10
}

impl TomlConfig {
    /// Settings for `name`, or defaults if the backend has no section
    pub fn backend_settings(&self, name: &str) -> BackendSettings {
        self.backends.get(name).cloned().unwrap_or_default()
    }

    /// Effective timeout for `name`
    pub fn backend_timeout(&self, name: &str) -> Duration {
        self.backends
            .get(name)
            .and_then(|s| s.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.dispatch.default_timeout())
    }

    /// Reject values the dispatcher cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.default_timeout_secs == 0 {
            return Err(Error::Config(
                "dispatch.default_timeout_secs must be greater than zero".to_string(),
            ));
        }

        for (name, settings) in &self.backends {
            if !settings.weight.is_finite() || settings.weight < 0.0 {
                return Err(Error::Config(format!(
                    "backends.{}.weight must be a non-negative number (got {})",
                    name, settings.weight
                )));
            }
            if settings.timeout_secs == Some(0) {
                return Err(Error::Config(format!(
                    "backends.{}.timeout_secs must be greater than zero",
                    name
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for list in &self.lists {
            if list.name.trim().is_empty() {
                return Err(Error::Config("list name must not be empty".to_string()));
            }
            if !seen.insert(list.name.as_str()) {
                return Err(Error::Config(format!("duplicate list name: {}", list.name)));
            }
        }

        if self.openalex.requests_per_second == 0 {
            return Err(Error::Config(
                "openalex.requests_per_second must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Resolve which config file to load, if any
///
/// Priority: CLI argument → environment variable → user config file.
/// Returns `None` when no file applies (built-in defaults are used).
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config file (only if present)
    dirs::config_dir()
        .map(|d| d.join("jvet").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load and validate a TOML config file
///
/// Relative list paths are rewritten against the config file's directory.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;

    let mut config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    if let Some(base) = path.parent() {
        for list in &mut config.lists {
            if list.path.is_relative() {
                list.path = base.join(&list.path);
            }
        }
    }

    config.validate()?;
    debug!(
        path = %path.display(),
        backends = config.backends.len(),
        lists = config.lists.len(),
        "Config loaded"
    );
    Ok(config)
}

/// Resolve and load configuration, falling back to defaults
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)
        }
        None => {
            info!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}
