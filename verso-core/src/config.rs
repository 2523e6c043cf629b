//! Configuration types for the Verso engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::versioning::Author;

/// Main configuration for a Verso repository
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VersoConfig {
    /// Repository identity and policy
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Diff rendering configuration
    #[serde(default)]
    pub diff: DiffConfig,

    /// Event dispatch configuration
    #[serde(default)]
    pub events: EventConfig,

    /// Persistence configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Repository identity and policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Human-readable repository name
    pub name: String,

    /// Name of the branch created at construction
    #[serde(default = "default_branch_name")]
    pub default_branch: String,

    /// Author recorded on commits the engine makes itself
    #[serde(default = "default_system_author")]
    pub system_author: Author,

    /// Reject merges whose target branch is protected
    #[serde(default)]
    pub enforce_protection: bool,
}

fn default_branch_name() -> String {
    "main".to_string()
}

fn default_system_author() -> Author {
    Author::new("system", "System", "system@verso.local")
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: "repository".to_string(),
            default_branch: default_branch_name(),
            system_author: default_system_author(),
            enforce_protection: false,
        }
    }
}

/// Diff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Unchanged lines kept around each hunk
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
}

fn default_context_lines() -> usize {
    3
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
        }
    }
}

/// Event dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Capacity of channel subscriptions
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_channel_buffer() -> usize {
    64
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_buffer: default_channel_buffer(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage mode
    #[serde(default)]
    pub mode: StorageMode,

    /// State file used by the file mode
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".verso/state.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::Memory,
            path: default_state_path(),
        }
    }
}

/// Storage backend mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Keep state in process memory only
    #[default]
    Memory,

    /// Persist state as a JSON document
    File,
}

/// Builder for VersoConfig
pub struct ConfigBuilder {
    config: VersoConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: VersoConfig::default(),
        }
    }

    /// Set the repository name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.repository.name = name.into();
        self
    }

    /// Set the default branch name
    pub fn default_branch(mut self, branch: impl Into<String>) -> Self {
        self.config.repository.default_branch = branch.into();
        self
    }

    /// Set the author used for engine-made commits
    pub fn system_author(mut self, author: Author) -> Self {
        self.config.repository.system_author = author;
        self
    }

    /// Reject merges into protected branches
    pub fn enforce_protection(mut self, enforce: bool) -> Self {
        self.config.repository.enforce_protection = enforce;
        self
    }

    /// Set the number of diff context lines
    pub fn context_lines(mut self, lines: usize) -> Self {
        self.config.diff.context_lines = lines;
        self
    }

    /// Set storage configuration
    pub fn storage(mut self, config: StorageConfig) -> Self {
        self.config.storage = config;
        self
    }

    /// Build the configuration
    pub fn build(self) -> VersoConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VersoConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (verso.toml, then the path in VERSO_CONFIG_PATH)
    /// 3. Environment variable overrides (`VERSO_DIFF__CONTEXT_LINES=5`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is invalid.
    pub fn load() -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(VersoConfig::default()))
            .merge(Toml::file("verso.toml"));

        if let Ok(path) = std::env::var("VERSO_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let figment = figment.merge(Env::prefixed("VERSO_").ignore(&["CONFIG_PATH"]).split("__"));

        let config: VersoConfig = figment.extract().map_err(|e| {
            crate::error::VersoError::Configuration(format!("Failed to load configuration: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: VersoConfig = Figment::from(Serialized::defaults(VersoConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                crate::error::VersoError::Configuration(format!(
                    "Failed to load configuration file: {}",
                    e
                ))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.repository.default_branch.trim().is_empty() {
            return Err(crate::error::VersoError::Configuration(
                "default_branch cannot be empty".to_string(),
            ));
        }
        if self.events.channel_buffer == 0 {
            return Err(crate::error::VersoError::Configuration(
                "events.channel_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
