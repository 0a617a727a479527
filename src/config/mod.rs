use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Value shipped in sample configs; treated the same as an unset webhook.
pub const WEBHOOK_PLACEHOLDER: &str = "YOUR_DISCORD_WEBHOOK_URL_HERE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub checker: CheckerConfig,
    /// Apps to watch, checked in this order every cycle.
    #[serde(default = "default_apps")]
    pub apps: Vec<TrackedApp>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// An app whose store version is monitored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TrackedApp {
    /// Store-assigned application id.
    pub id: String,
    /// Label used in logs before the store name is known.
    #[serde(default = "default_display_name", alias = "name")]
    pub display_name: String,
}

impl TrackedApp {
    pub fn new(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

/// How app metadata is requested from the store graph.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Public GraphQL `node` query; needs no token.
    #[default]
    Graphql,
    /// REST graph API (`/{app_id}?fields=...`); needs an access token.
    GraphApi,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaConfig {
    #[serde(default)]
    pub transport: Transport,
    /// GraphQL endpoint
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    /// REST graph API base URL
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    /// Access token for the REST transport - loaded from env META_ACCESS_TOKEN
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Webhook URL - loaded from env DISCORD_WEBHOOK_URL
    #[serde(default)]
    pub webhook_url: String,
    /// Overrides the webhook's display name.
    #[serde(default)]
    pub username: Option<String>,
    /// Overrides the webhook's avatar.
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckerConfig {
    /// JSON file holding the last-seen version per app.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Sleep between cycles in continuous mode.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Pause between consecutive app requests within a cycle.
    #[serde(default = "default_request_delay")]
    pub request_delay_secs: u64,
    /// Pause after a failed cycle before trying again.
    #[serde(default = "default_retry_cooldown")]
    pub retry_cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_graphql_url() -> String {
    "https://graph.oculus.com/graphql".to_string()
}
fn default_graph_url() -> String {
    "https://graph.oculus.com".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_state_file() -> PathBuf {
    PathBuf::from("versions.json")
}
fn default_check_interval() -> u64 {
    3600
}
fn default_request_delay() -> u64 {
    1
}
fn default_retry_cooldown() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_display_name() -> String {
    "Unknown".to_string()
}
fn default_apps() -> Vec<TrackedApp> {
    vec![
        TrackedApp::new("8485526434899813", "ug"),
        TrackedApp::new("4979055762136823", "gtag"),
        TrackedApp::new("7190422614401072", "Animal Company"),
    ]
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            graphql_url: default_graphql_url(),
            graph_url: default_graph_url(),
            access_token: String::new(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            username: None,
            avatar_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            check_interval_secs: default_check_interval(),
            request_delay_secs: default_request_delay(),
            retry_cooldown_secs: default_retry_cooldown(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl DiscordConfig {
    /// The webhook to post to, or None when unset or still the placeholder.
    pub fn webhook(&self) -> Option<&str> {
        let url = self.webhook_url.trim();
        if url.is_empty() || url == WEBHOOK_PLACEHOLDER {
            None
        } else {
            Some(url)
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse and validate TOML without touching the environment.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a default config with env-only secrets (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config {
            meta: MetaConfig {
                graphql_url: std::env::var("META_GRAPHQL_URL")
                    .unwrap_or_else(|_| default_graphql_url()),
                graph_url: std::env::var("META_GRAPH_URL").unwrap_or_else(|_| default_graph_url()),
                ..MetaConfig::default()
            },
            discord: DiscordConfig::default(),
            checker: CheckerConfig::default(),
            apps: default_apps(),
            logging: LoggingConfig::default(),
        };
        config.apply_env();
        config
    }

    // Secrets never need to live in the config file.
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("META_ACCESS_TOKEN") {
            self.meta.access_token = token;
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            self.discord.webhook_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checker.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "checker.check_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.apps.is_empty() {
            return Err(ConfigError::Invalid("no apps configured".to_string()));
        }
        let mut seen = HashSet::new();
        for app in &self.apps {
            if app.id.trim().is_empty() {
                return Err(ConfigError::Invalid("app id must not be empty".to_string()));
            }
            if !seen.insert(app.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate app id {}", app.id)));
            }
        }
        Ok(())
    }
}
