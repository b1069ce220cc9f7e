//! Site configuration module.
//!
//! Handles loading, validating, and merging `postfmt.toml`. Stock defaults are
//! overridden by the user's file at the site root:
//!
//! ```text
//! site/
//! ├── postfmt.toml             # Site config (optional)
//! ├── _blog/                   # Text collection
//! │   └── 2021-05-01-hello.md
//! └── _artwork/                # Picture collection
//!     └── 2023-01-09-ink.md
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! assets_root = "/assets/img/posts"  # Site-relative prefix for post images
//! text_collection = "blog"           # Collection holding plain posts ("" = none)
//!
//! [[collections]]
//! id = "blog"
//! label = "Blog"
//!
//! [[collections]]
//! id = "artwork"
//! label = "Artwork"
//!
//! [tags]
//! priority = []             # Tag order; unlisted tags sort first
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Tables merge key by key; arrays replace. Listing `[[collections]]` in the
//! user file replaces the stock collections entirely.
//!
//! Unknown keys are rejected to catch typos early.

use crate::collection::{CollectionRegistry, DIRECTORY_MARKER};
use crate::post::TagPriority;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Name of the config file at the site root.
pub const CONFIG_FILENAME: &str = "postfmt.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `postfmt.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Site-relative prefix under which each collection keeps its images.
    pub assets_root: String,
    /// Id of the collection holding plain text posts. Empty when every
    /// collection holds pictures.
    pub text_collection: String,
    /// The closed set of collections, in display order.
    pub collections: Vec<CollectionConfig>,
    /// Tag ordering applied on every load and save.
    pub tags: TagsConfig,
    /// Parallel processing settings for batch commands.
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            assets_root: "/assets/img/posts".to_string(),
            text_collection: "blog".to_string(),
            collections: vec![
                CollectionConfig::new("blog", "Blog"),
                CollectionConfig::new("artwork", "Artwork"),
            ],
            tags: TagsConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assets_root.trim().is_empty() {
            return Err(ConfigError::Validation(
                "assets_root must not be empty".into(),
            ));
        }
        if self.collections.is_empty() {
            return Err(ConfigError::Validation(
                "at least one collection is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for c in &self.collections {
            if c.id.is_empty() {
                return Err(ConfigError::Validation(
                    "collection ids must not be empty".into(),
                ));
            }
            if c.id.contains('/') || c.id.starts_with(DIRECTORY_MARKER) {
                return Err(ConfigError::Validation(format!(
                    "collection id '{}' must not contain '/' or start with '{}'",
                    c.id, DIRECTORY_MARKER
                )));
            }
            if !seen.insert(c.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate collection id '{}'",
                    c.id
                )));
            }
        }
        if !self.text_collection.is_empty() && !seen.contains(self.text_collection.as_str()) {
            return Err(ConfigError::Validation(format!(
                "text_collection '{}' is not a configured collection",
                self.text_collection
            )));
        }
        Ok(())
    }

    /// Build the collection registry this config describes.
    pub fn registry(&self) -> CollectionRegistry {
        let text = Some(self.text_collection.as_str()).filter(|t| !t.is_empty());
        CollectionRegistry::new(
            self.collections
                .iter()
                .map(|c| (c.id.as_str(), c.display_label())),
            &self.assets_root,
            text,
        )
    }

    pub fn tag_priority(&self) -> TagPriority {
        TagPriority::new(self.tags.priority.iter().cloned())
    }
}

/// One `[[collections]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    /// Stable id; posts live under `_<id>/`.
    pub id: String,
    /// Display name. Falls back to the id when empty.
    #[serde(default)]
    pub label: String,
}

impl CollectionConfig {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// Tag ordering settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagsConfig {
    /// Tags in display order. Tags not listed sort ahead of all listed tags.
    pub priority: Vec<String>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of files upgraded in parallel.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`, at least one
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Stock settings as a TOML table, the layer `postfmt.toml` is laid over.
pub fn stock_defaults_table() -> toml::Table {
    toml::Table::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Lay the site file's `site` table over `defaults`.
///
/// Nested tables such as `[tags]` combine key by key. Any other value the
/// site sets wins outright, so `[[collections]]` replaces the stock list
/// rather than extending it.
pub fn overlay_table(defaults: &mut toml::Table, site: toml::Table) {
    for (key, value) in site {
        match value {
            toml::Value::Table(inner) => match defaults.get_mut(&key) {
                Some(toml::Value::Table(existing)) => overlay_table(existing, inner),
                _ => {
                    defaults.insert(key, toml::Value::Table(inner));
                }
            },
            value => {
                defaults.insert(key, value);
            }
        }
    }
}

/// Parse `<root>/postfmt.toml`, or `None` when the site has no config file.
pub fn read_site_file(root: &Path) -> Result<Option<toml::Table>, ConfigError> {
    match fs::read_to_string(root.join(CONFIG_FILENAME)) {
        Ok(text) => Ok(Some(toml::from_str(&text)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Effective settings for the site at `root`.
///
/// Stock defaults first, the site file over them, then unknown keys and
/// inconsistent collections are rejected.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let mut settings = stock_defaults_table();
    if let Some(site) = read_site_file(root)? {
        overlay_table(&mut settings, site);
    }
    let config: SiteConfig = toml::Value::Table(settings).try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `postfmt.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# postfmt configuration
# =====================
# All settings are optional. Values shown below are the defaults.
# Place this file at the site root, next to the _<collection> directories.
# Unknown keys will cause an error.

# Site-relative prefix for post images. Each collection keeps originals in
# <assets_root>/<id>/ and thumbnails in <assets_root>/<id>/thumbs/.
assets_root = "/assets/img/posts"

# Collection holding plain text posts (no pictures).
# Set to "" if every collection is a picture collection.
text_collection = "blog"

# ---------------------------------------------------------------------------
# Collections
# ---------------------------------------------------------------------------
# The closed set of collections. Posts of collection <id> live in _<id>/.
# Listing collections here replaces this default list entirely.
[[collections]]
id = "blog"
label = "Blog"

[[collections]]
id = "artwork"
label = "Artwork"

# ---------------------------------------------------------------------------
# Tags
# ---------------------------------------------------------------------------
[tags]
# Tag display order. Tags not listed here sort before all listed tags,
# in the order they were written.
priority = []

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of files upgraded in parallel.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
