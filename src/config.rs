use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "tfexpand.toml";
pub const DEFAULT_ENV_PREFIX: &str = "TF_VAR_";

/// What to do when two declarations share an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum RedeclarationPolicy {
    /// The later declaration replaces the earlier one.
    #[default]
    LastWins,
    /// Redeclaring an address is a configuration error.
    Error,
}

impl fmt::Display for RedeclarationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedeclarationPolicy::LastWins => f.write_str("last_wins"),
            RedeclarationPolicy::Error => f.write_str("error"),
        }
    }
}

/// Global settings for tfexpand
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Default input file or directory if not specified in targets
    pub input: Option<String>,
    /// Default variable files
    #[serde(default)]
    pub var_files: Vec<String>,
    /// Environment variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub redeclaration: RedeclarationPolicy,
    /// Prefix for variable values taken from the environment (`TF_VAR_` when unset)
    #[serde(default)]
    pub env_prefix: Option<String>,
    /// Program and arguments used to decrypt `file:` secrets, e.g. `["sops", "-d"]`.
    /// Ciphertext is piped to stdin; plaintext is read from stdout.
    #[serde(default)]
    pub decrypt_command: Vec<String>,
}

impl Settings {
    pub fn env_prefix(&self) -> &str {
        self.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX)
    }
}

/// Configuration for a single target output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Name of the target (for identification)
    pub name: String,

    /// Backend to use for this target
    pub backend: String,

    /// Input file or directory for this target
    pub input: Option<String>,

    /// Output file path (if not specified, prints to stdout)
    pub output: Option<String>,

    /// Resource types to include (if empty, includes all)
    #[serde(default)]
    pub include: Vec<String>,

    /// Resource types to exclude
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Variables for this target
    #[serde(default)]
    pub vars: HashMap<String, toml::Value>,

    /// Variable files for this target
    #[serde(default)]
    pub var_files: Vec<String>,
}

impl TargetConfig {
    /// Whether instances of `resource_type` belong in this target's output.
    pub fn includes(&self, resource_type: &str) -> bool {
        type_selected(&self.include, &self.exclude, resource_type)
    }
}

/// An empty include list selects every type; exclude always wins.
pub fn type_selected(include: &[String], exclude: &[String], resource_type: &str) -> bool {
    let included = include.is_empty() || include.iter().any(|t| t == resource_type);
    included && !exclude.iter().any(|t| t == resource_type)
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub settings: Settings,
    /// List of targets to generate
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Config {
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// Load configuration from tfexpand.toml in the current directory
pub fn load_config() -> Result<Option<Config>> {
    load_config_from_path(Path::new(DEFAULT_CONFIG_FILE))
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(config))
}
