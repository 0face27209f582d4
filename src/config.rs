//! Site configuration module.
//!
//! Handles loading, validating, and layering `site.toml`. Stock defaults are
//! overridden by the file in the site root, which is in turn overridden by
//! command-line flags and their environment variables.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! absolute_url = "http://localhost:5002"
//! title_suffix = ""
//! env = "development"       # or "production"
//!
//! [build]
//! target_dir = "public"
//! temp_dir = ".inkpress"
//! concurrency = 8           # omit for auto = CPU cores
//! freshness = "hash"        # or "mtime"
//!
//! [tags]
//! top_n = 10                # tags shown prominently on the home page
//! top_m = 2                 # runners-up shown after them
//!
//! [serve]
//! port = 5002
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::freshness::FreshnessMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "site.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Deployment environment. Development enables live reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteEnv {
    #[default]
    Development,
    Production,
}

impl SiteEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl std::str::FromStr for SiteEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!(
                "unknown environment `{other}` (expected development or production)"
            )),
        }
    }
}

/// Site configuration loaded from `site.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute URL the site is hosted at, exposed to templates.
    pub absolute_url: String,
    /// Appended to every page title.
    pub title_suffix: String,
    pub env: SiteEnv,
    pub build: BuildConfig,
    pub tags: TagsConfig,
    pub serve: ServeConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            absolute_url: "http://localhost:5002".to_string(),
            title_suffix: String::new(),
            env: SiteEnv::default(),
            build: BuildConfig::default(),
            tags: TagsConfig::default(),
            serve: ServeConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.absolute_url.starts_with("http://") || self.absolute_url.starts_with("https://"))
        {
            return Err(ConfigError::Validation(format!(
                "absolute_url must start with http:// or https:// (got `{}`)",
                self.absolute_url
            )));
        }
        if self.build.target_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "build.target_dir must not be empty".into(),
            ));
        }
        if self.build.temp_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "build.temp_dir must not be empty".into(),
            ));
        }
        if self.build.target_dir == self.build.temp_dir {
            return Err(ConfigError::Validation(
                "build.target_dir and build.temp_dir must differ".into(),
            ));
        }
        if self.build.concurrency == Some(0) {
            return Err(ConfigError::Validation(
                "build.concurrency must be at least 1".into(),
            ));
        }
        if self.serve.port == 0 {
            return Err(ConfigError::Validation("serve.port must be non-zero".into()));
        }
        Ok(())
    }

    /// Output directory, resolved against the site root when relative.
    pub fn target_path(&self, root: &Path) -> PathBuf {
        root.join(&self.build.target_dir)
    }

    /// Scratch directory for intermediate artifacts.
    pub fn temp_path(&self, root: &Path) -> PathBuf {
        root.join(&self.build.temp_dir)
    }

    /// Template-visible absolute URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.absolute_url.trim_end_matches('/')
    }
}

/// Build output and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub target_dir: String,
    /// Intermediate files such as the staged search index.
    pub temp_dir: String,
    /// Number of build workers. When absent, defaults to the number of CPU
    /// cores.
    pub concurrency: Option<usize>,
    /// How changed sources are detected between runs of the build loop.
    pub freshness: FreshnessMode,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            target_dir: "public".to_string(),
            temp_dir: ".inkpress".to_string(),
            concurrency: None,
            freshness: FreshnessMode::default(),
        }
    }
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `n`; rendering is mostly IO-bound so more workers
///   than cores is allowed
pub fn effective_threads(config: &BuildConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.concurrency.unwrap_or(cores).max(1)
}

/// Tag ranking on the home page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagsConfig {
    pub top_n: usize,
    pub top_m: usize,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self { top_n: 10, top_m: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self { port: 5002 }
    }
}

/// Values supplied on the command line or through the environment. Each
/// `Some` wins over whatever `site.toml` says.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub absolute_url: Option<String>,
    pub env: Option<SiteEnv>,
    pub target_dir: Option<String>,
    pub concurrency: Option<usize>,
    pub port: Option<u16>,
}

impl ConfigOverrides {
    /// The overrides as a sparse TOML table shaped like `site.toml`.
    pub fn to_toml(&self) -> toml::Value {
        let mut root = toml::Table::new();
        let mut build = toml::Table::new();
        let mut serve = toml::Table::new();

        if let Some(url) = &self.absolute_url {
            root.insert("absolute_url".into(), url.clone().into());
        }
        if let Some(env) = self.env {
            root.insert("env".into(), env.as_str().into());
        }
        if let Some(dir) = &self.target_dir {
            build.insert("target_dir".into(), dir.clone().into());
        }
        if let Some(n) = self.concurrency {
            build.insert("concurrency".into(), (n as i64).into());
        }
        if let Some(port) = self.port {
            serve.insert("port".into(), i64::from(port).into());
        }

        if !build.is_empty() {
            root.insert("build".into(), toml::Value::Table(build));
        }
        if !serve.is_empty() {
            root.insert("serve".into(), toml::Value::Table(serve));
        }
        toml::Value::Table(root)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged on top of.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default())
        .unwrap_or_else(|_| toml::Value::Table(toml::Table::new()))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `site.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Stack the layers in order, then deserialize and validate.
pub fn resolve_config(layers: Vec<toml::Value>) -> Result<SiteConfig, ConfigError> {
    let merged = layers
        .into_iter()
        .fold(stock_defaults_value(), merge_toml);
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config for the site rooted at `root`: stock defaults, then
/// `site.toml`, then `overrides`.
pub fn load_config(root: &Path, overrides: &ConfigOverrides) -> Result<SiteConfig, ConfigError> {
    let mut layers = Vec::new();
    if let Some(file) = load_raw_config(root)? {
        layers.push(file);
    }
    layers.push(overrides.to_toml());
    resolve_config(layers)
}

/// Returns a fully-commented stock `site.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Inkpress Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Command-line flags (and their environment variables) override this file:
#   --absolute-url / ABSOLUTE_URL
#   --env          / SITE_ENV
#   --target-dir   / TARGET_DIR
#   --concurrency  / CONCURRENCY
#   --port         / PORT
#
# Unknown keys will cause an error.

# Absolute URL the site is hosted at. Exposed to templates as `absolute_url`.
absolute_url = "http://localhost:5002"

# Appended to every page title. Exposed to templates as `title_suffix`.
title_suffix = ""

# "development" injects a live reload script while looping.
# "production" renders exactly what gets deployed.
env = "development"

# ---------------------------------------------------------------------------
# Build
# ---------------------------------------------------------------------------
[build]
# Where the rendered site is written, relative to the site root.
target_dir = "public"

# Scratch space for intermediate files such as the staged search index.
temp_dir = ".inkpress"

# Number of parallel build workers. Omit for auto (= number of CPU cores).
# concurrency = 8

# How the build loop decides a source changed between runs:
# "hash" compares content hashes, "mtime" compares modification time and size.
freshness = "hash"

# ---------------------------------------------------------------------------
# Tag ranking on the home page
# ---------------------------------------------------------------------------
[tags]
# Most used tags, shown prominently.
top_n = 10

# The next most used tags, shown after them.
top_m = 2

# ---------------------------------------------------------------------------
# Development server (`loop` command)
# ---------------------------------------------------------------------------
[serve]
port = 5002
"##
}
