//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. User config: `~/.config/anchored-templates/config.toml` (XDG) or platform config dir
//! 2. Project config: `.anchored-templates.toml`
//! 3. Environment variables: `ANCHORED_TEMPLATES_*`, `__` separating nested keys
//!
//! Every key has a default, so an empty configuration is valid.
//!
//! ```toml
//! [replication]
//! max_depth = 32
//! page_size = 200
//!
//! [visibility]
//! supported_zones = ["quarantine", "data-lake"]
//! ```

use std::ops::Deref;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::models::{SOURCED_FROM, SPECIFICATION_PROPERTY_ASSIGNMENT};

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub visibility: VisibilityConfig,
}

/// Limits and filters applied while walking a template graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Deepest chain of nested copies a single run may create.
    pub max_depth: usize,
    /// Relationships requested per page when listing a template's attachments.
    pub page_size: usize,
    /// Relationship types that record replication metadata rather than structure.
    /// They are never followed or copied.
    pub excluded_relationship_types: Vec<String>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            page_size: 100,
            excluded_relationship_types: vec![
                SOURCED_FROM.to_string(),
                SPECIFICATION_PROPERTY_ASSIGNMENT.to_string(),
            ],
        }
    }
}

impl ReplicationConfig {
    /// Whether relationships of this type are skipped during a deep copy.
    pub fn is_excluded(&self, relationship_type: &str) -> bool {
        self.excluded_relationship_types
            .iter()
            .any(|t| t == relationship_type)
    }
}

/// Zone-based visibility applied to templates and returned elements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    /// Zones this deployment serves. Empty means every zone is visible.
    pub supported_zones: Vec<String>,
}

impl Config {
    /// Load config with layered resolution (user → project → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::base()
            .merge(Toml::file(Self::user_config_path()))
            .merge(Toml::file(".anchored-templates.toml"))
            .merge(Env::prefixed("ANCHORED_TEMPLATES_").split("__"))
            .extract()
            .map_err(ConfigError::from)
    }

    /// Load config from an explicit file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::base()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ANCHORED_TEMPLATES_").split("__"))
            .extract()
            .map_err(ConfigError::from)
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    /// User config path: ~/.config/anchored-templates/config.toml (XDG) or platform config dir.
    fn user_config_path() -> std::path::PathBuf {
        // Prefer XDG config location (~/.config) on all platforms
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home
                .join(".config")
                .join("anchored-templates")
                .join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        dirs::config_dir()
            .map(|p| p.join("anchored-templates").join("config.toml"))
            .unwrap_or_default()
    }
}
