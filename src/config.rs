use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fetch::{Credential, Endpoints};
use crate::view::DEFAULT_PAGE_SIZE;

pub const CONFIG_FILE: &str = ".repo-dashboard.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .repo-dashboard.toml.
/// Every field is optional; the tool runs with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub view: ViewConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// Account listed through the public REST API when there is no token
    pub username: Option<String>,
    pub graphql_url: String,
    pub rest_url: String,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            username: None,
            graphql_url: "https://api.github.com/graphql".to_string(),
            rest_url: "https://api.github.com".to_string(),
            user_agent: "repo-dashboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted layers
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".repo-dashboard"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub page_size: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from .repo-dashboard.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var. Blank values count as unset.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }

    /// Pick how to reach the account: an explicit username wins, then a
    /// token, then the configured username.
    pub fn credential(&self, username_override: Option<&str>) -> Option<Credential> {
        if let Some(user) = username_override.filter(|u| !u.is_empty()) {
            return Some(Credential::Username(user.to_string()));
        }
        if let Some(token) = self.github_token() {
            return Some(Credential::Token(token));
        }
        self.github
            .username
            .clone()
            .filter(|u| !u.is_empty())
            .map(Credential::Username)
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            graphql_url: self.github.graphql_url.clone(),
            rest_url: self.github.rest_url.clone(),
        }
    }
}
