// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates the platform credential, brain command, and session timings
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use switchboard_core::SessionConfig;

use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Session name; used to name log files
    #[serde(default = "default_name")]
    pub name: String,
    /// Write every accepted inbound message to a transcript file
    #[serde(default)]
    pub log_text: bool,
    /// User (display name or id) who receives error reports by direct message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub brain: BrainConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    #[default]
    Console,
    Slack,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub kind: PlatformKind,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot OAuth token (xoxb-...) for Web API calls
    pub bot_token: String,
    /// App-level token (xapp-...) for Socket Mode connections
    pub app_token: String,
}

// Custom Debug impl to redact sensitive fields
impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("app_token", &redact(&self.app_token))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "[REDACTED]"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrainKind {
    #[default]
    Echo,
    Exec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    #[serde(default)]
    pub kind: BrainKind,
    /// Command word the echo brain answers to
    #[serde(default = "default_echo_prefix")]
    pub prefix: String,
    /// Channel the echo brain greets on connect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce_channel: Option<String>,
    /// Program for the exec brain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// How long the exec brain may take to answer one request
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            kind: BrainKind::default(),
            prefix: default_echo_prefix(),
            announce_channel: None,
            command: None,
            args: Vec::new(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address for the Prometheus scrape endpoint, e.g. "127.0.0.1:9090"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<String>,
}

fn default_name() -> String {
    "switchboard".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    10
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_echo_prefix() -> String {
    "echo".to_string()
}

fn default_response_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_text: false,
            maintainer: None,
            session: SessionSettings::default(),
            platform: PlatformConfig::default(),
            slack: None,
            brain: BrainConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with environment variable overrides.
    ///
    /// Path precedence: `path` argument, then `SWITCHBOARD_CONFIG_PATH`, then
    /// the per-user default (`~/.config/switchboard/config.toml` on Linux).
    /// A missing default file means built-in defaults; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("SWITCHBOARD_CONFIG_PATH").ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Self::from_toml_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            }
            None => match paths::config_file().filter(|p| p.exists()) {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    Self::from_toml_str(&content)
                        .with_context(|| format!("Failed to parse {}", path.display()))?
                }
                None => Config::default(),
            },
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str::<Config>(content).context("Invalid configuration")
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SWITCHBOARD_NAME") {
            self.name = val;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_LOG_TEXT") {
            self.log_text = parse_bool(&val).with_context(|| {
                format!("SWITCHBOARD_LOG_TEXT must be true or false, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_MAINTAINER") {
            self.maintainer = Some(val).filter(|v| !v.trim().is_empty());
        }
        if let Ok(val) = std::env::var("SLACK_BOT_TOKEN") {
            self.slack_mut().bot_token = val;
        }
        if let Ok(val) = std::env::var("SLACK_APP_TOKEN") {
            self.slack_mut().app_token = val;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_BRAIN_COMMAND") {
            self.brain.command = Some(val);
        }
        Ok(())
    }

    fn slack_mut(&mut self) -> &mut SlackConfig {
        self.slack.get_or_insert_with(|| SlackConfig {
            bot_token: String::new(),
            app_token: String::new(),
        })
    }

    /// Check required fields for the selected platform and brain
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("name must not be empty");
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "name may only contain letters, digits, '-' and '_' (it names log files), got: {}",
                self.name
            );
        }

        if self.session.reconnect_delay_secs == 0 {
            anyhow::bail!("session.reconnect_delay_secs must be greater than zero");
        }
        if self.session.tick_interval_ms == 0 {
            anyhow::bail!("session.tick_interval_ms must be greater than zero");
        }
        if self.session.flush_interval_ms == 0 {
            anyhow::bail!("session.flush_interval_ms must be greater than zero");
        }

        if self.platform.kind == PlatformKind::Slack {
            let slack = self.slack.as_ref().context(
                "platform.kind = \"slack\" requires a [slack] section (or SLACK_BOT_TOKEN/SLACK_APP_TOKEN)",
            )?;
            if slack.bot_token.trim().is_empty() {
                anyhow::bail!(
                    "slack.bot_token is required (set in config.toml or SLACK_BOT_TOKEN env var)"
                );
            }
            if slack.app_token.trim().is_empty() {
                anyhow::bail!(
                    "slack.app_token is required (set in config.toml or SLACK_APP_TOKEN env var)"
                );
            }
        }

        if self.brain.kind == BrainKind::Exec
            && self
                .brain
                .command
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
        {
            anyhow::bail!(
                "brain.command is required for the exec brain (set in config.toml or SWITCHBOARD_BRAIN_COMMAND env var)"
            );
        }
        if self.brain.kind == BrainKind::Exec && self.brain.response_timeout_ms == 0 {
            anyhow::bail!("brain.response_timeout_ms must be greater than zero");
        }

        if let Some(addr) = &self.metrics.listen_addr {
            addr.parse::<std::net::SocketAddr>()
                .with_context(|| format!("metrics.listen_addr is not a socket address: {}", addr))?;
        }

        Ok(())
    }

    /// Session manager settings derived from this config
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            name: self.name.clone(),
            reconnect_delay: Duration::from_secs(self.session.reconnect_delay_secs),
            tick_interval: Duration::from_millis(self.session.tick_interval_ms),
            flush_interval: Duration::from_millis(self.session.flush_interval_ms),
            maintainer: self.maintainer.clone(),
        }
    }
}

fn parse_bool(val: &str) -> Result<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a boolean: {}", other),
    }
}
