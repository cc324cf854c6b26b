use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Token;
use crate::flake::pruning::{
    StabilityThresholds, DEFAULT_LOWER_FLAKE_THRESHOLD, DEFAULT_MINIMUM_ITERATIONS,
    DEFAULT_UPPER_FLAKE_THRESHOLD,
};
use crate::heuristic::scorer::{ScorerConfig, DEFAULT_NO_BLAME_ACCOUNT};
use crate::providers::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECONDS};

const CONFIG_FILE_NAMES: [&str; 4] = ["findit.toml", "findit.json", "findit.yaml", "findit.yml"];

/// Configuration file structure for findit.
///
/// Configuration files are loaded from an explicit path, the current
/// directory or the platform config directory (`<config dir>/findit/`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Suspect scoring settings
    #[serde(default)]
    pub heuristic: HeuristicConfig,

    /// Flakiness thresholds and bisection limits
    #[serde(default)]
    pub flake: FlakeConfig,

    /// Source repository access
    #[serde(default)]
    pub gitiles: GitilesConfig,

    /// Build-info service access
    #[serde(default)]
    pub build_info: BuildInfoConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HeuristicConfig {
    /// Checkout root stripped from paths found in logs
    #[serde(default = "default_root_prefix")]
    pub root_prefix: String,

    /// Authors never blamed for a failure
    #[serde(default = "default_no_blame_accounts")]
    pub no_blame_accounts: Vec<String>,

    /// Fall back to ninja dependency edges for compile failures
    #[serde(default)]
    pub use_ninja_output: bool,

    /// Repository name recorded on suspects
    #[serde(default = "default_repo_name")]
    pub repo_name: String,

    /// Primary repository whose change logs are pulled
    #[serde(default = "default_repo_url")]
    pub repo_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlakeConfig {
    #[serde(default = "default_lower_flake_threshold")]
    pub lower_flake_threshold: f64,

    #[serde(default = "default_upper_flake_threshold")]
    pub upper_flake_threshold: f64,

    /// Stable points measured with fewer iterations are pruned
    #[serde(default = "default_minimum_iterations")]
    pub minimum_iterations: u32,

    /// Upper limit on build lookups per bisection
    #[serde(default)]
    pub max_probes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitilesConfig {
    /// OAuth token sent as a bearer token
    pub token: Option<String>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildInfoConfig {
    /// Base URL of the build-info service
    pub base_url: Option<String>,

    pub token: Option<String>,

    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default)]
    pub retry_delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            root_prefix: default_root_prefix(),
            no_blame_accounts: default_no_blame_accounts(),
            use_ninja_output: false,
            repo_name: default_repo_name(),
            repo_url: default_repo_url(),
        }
    }
}

impl Default for FlakeConfig {
    fn default() -> Self {
        Self {
            lower_flake_threshold: default_lower_flake_threshold(),
            upper_flake_threshold: default_upper_flake_threshold(),
            minimum_iterations: default_minimum_iterations(),
            max_probes: None,
        }
    }
}

impl Default for GitilesConfig {
    fn default() -> Self {
        Self {
            token: None,
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
        }
    }
}

fn default_root_prefix() -> String {
    "src/".to_string()
}

fn default_no_blame_accounts() -> Vec<String> {
    vec![DEFAULT_NO_BLAME_ACCOUNT.to_string()]
}

fn default_repo_name() -> String {
    "chromium".to_string()
}

fn default_repo_url() -> String {
    "https://chromium.googlesource.com/chromium/src.git".to_string()
}

fn default_lower_flake_threshold() -> f64 {
    DEFAULT_LOWER_FLAKE_THRESHOLD
}

fn default_upper_flake_threshold() -> f64 {
    DEFAULT_UPPER_FLAKE_THRESHOLD
}

fn default_minimum_iterations() -> u32 {
    DEFAULT_MINIMUM_ITERATIONS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_seconds() -> u64 {
    DEFAULT_RETRY_DELAY_SECONDS
}

impl HeuristicConfig {
    pub fn scorer_config(&self) -> ScorerConfig {
        ScorerConfig {
            no_blame_accounts: self.no_blame_accounts.iter().cloned().collect::<HashSet<_>>(),
            repo_name: self.repo_name.clone(),
        }
    }
}

impl FlakeConfig {
    pub fn thresholds(&self) -> StabilityThresholds {
        StabilityThresholds {
            lower: self.lower_flake_threshold,
            upper: self.upper_flake_threshold,
        }
    }
}

impl GitilesConfig {
    pub fn token(&self) -> Option<Token> {
        self.token.clone().map(Token::from)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_seconds),
        }
    }
}

impl BuildInfoConfig {
    pub fn token(&self) -> Option<Token> {
        self.token.clone().map(Token::from)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: Duration::from_secs(
                self.retry_delay_seconds
                    .unwrap_or(DEFAULT_RETRY_DELAY_SECONDS),
            ),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./findit.{toml,json,yaml,yml}
    /// 3. <config dir>/findit/findit.{toml,json,yaml,yml}
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let mut search_dirs = vec![PathBuf::from(".")];
        if let Some(config_dir) = dirs::config_dir() {
            search_dirs.push(config_dir.join("findit"));
        }

        Self::load_from_dirs(&search_dirs)
    }

    fn load_from_dirs(search_dirs: &[PathBuf]) -> Result<Self> {
        for dir in search_dirs {
            for candidate in CONFIG_FILE_NAMES {
                let path = dir.join(candidate);
                if path.exists() {
                    log::debug!("Loading configuration from {}", path.display());
                    return Self::load_from_path(&path);
                }
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}
