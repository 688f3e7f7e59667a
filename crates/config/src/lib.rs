//! Configuration loading, validation, and management for Switchboard.
//!
//! Loads configuration from `~/.switchboard/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use switchboard_core::agent::{AgentSkill, agent_id_from_name};

/// Persona prepended to every chat run unless overridden.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are JARVIS, a highly advanced AI assistant designed to help users with \
a wide range of tasks. Your primary goal is to assist users in achieving their objectives efficiently \
and effectively. You are capable of understanding natural language, processing complex queries, and \
providing accurate and helpful responses.

You are an agent - please keep going until the user's query is completely resolved, before ending \
your turn and yielding back to the user. Only terminate your turn when you are sure that the problem \
is solved.

Use markdown formatting to enhance your responses, including code blocks for programming-related queries.
";

/// The root configuration structure.
///
/// Maps directly to `~/.switchboard/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible completion endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used for chat runs
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Temperature for every completion call
    #[serde(default)]
    pub default_temperature: f32,

    /// System prompt prepended to chat runs
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Timeout for a single completion request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Turn loop limits
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Out-of-process tool providers
    #[serde(default)]
    pub capability_servers: Vec<CapabilityServerConfig>,

    /// Agents registered at startup
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_request_timeout() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("orchestration", &self.orchestration)
            .field("gateway", &self.gateway)
            .field("capability_servers", &self.capability_servers)
            .field("agents", &self.agents)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Completion calls per run before the loop gives up
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Maximum nesting of agent-to-agent delegation
    #[serde(default = "default_max_agent_depth")]
    pub max_agent_depth: u32,
}

fn default_max_rounds() -> u32 {
    25
}
fn default_max_agent_depth() -> u32 {
    4
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_agent_depth: default_max_agent_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// How long a started run may wait for its stream to be requested
    #[serde(default = "default_run_ttl")]
    pub run_ttl_secs: u64,

    /// How often expired runs are reaped
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,

    /// Capability servers whose tools are offered to chat runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chat_capability_servers: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}
fn default_run_ttl() -> u64 {
    300
}
fn default_reap_interval() -> u64 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: default_allowed_origins(),
            run_ttl_secs: default_run_ttl(),
            reap_interval_secs: default_reap_interval(),
            chat_capability_servers: Vec::new(),
        }
    }
}

/// How a capability provider is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Spawn a subprocess and speak line-delimited JSON-RPC over stdio
    #[default]
    Pipe,
    /// POST JSON-RPC requests to an HTTP endpoint
    Network,
}

/// One `[[capability_servers]]` entry.
#[derive(Clone, Serialize, Deserialize)]
pub struct CapabilityServerConfig {
    pub name: String,

    #[serde(default)]
    pub transport: TransportKind,

    /// Executable (pipe)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra environment for the subprocess (pipe)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Endpoint (network)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Extra request headers (network)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Per-operation timeout
    #[serde(default = "default_capability_timeout")]
    pub timeout_secs: u64,
}

fn default_capability_timeout() -> u64 {
    60
}

impl std::fmt::Debug for CapabilityServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // env values and headers usually carry tokens
        f.debug_struct("CapabilityServerConfig")
            .field("name", &self.name)
            .field("transport", &self.transport)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// One `[[agents]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Defaults to `name` lower-cased with spaces replaced by `-`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_agent_version")]
    pub version: String,

    pub instructions: String,

    /// Falls back to the top-level `default_model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Name of a `[[capability_servers]]` entry providing this agent's tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_server: Option<String>,

    /// Restrict the server's tools to these names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<HashSet<String>>,

    #[serde(default = "default_modes")]
    pub input_modes: Vec<String>,

    #[serde(default = "default_modes")]
    pub output_modes: Vec<String>,

    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

fn default_agent_version() -> String {
    "1.0.0".into()
}
fn default_modes() -> Vec<String> {
    vec!["text".into()]
}

impl AgentConfig {
    /// The id this agent registers under.
    pub fn agent_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| agent_id_from_name(&self.name))
    }
}

impl AppConfig {
    /// Load configuration from the default location with env var overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let config = Self::load_from(&config_path)?;
        Ok(config.with_env_overrides())
    }

    /// Apply `SWITCHBOARD_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var("SWITCHBOARD_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("SWITCHBOARD_API_URL") {
            self.api_url = url;
        }

        if let Ok(model) = std::env::var("SWITCHBOARD_MODEL") {
            self.default_model = model;
        }

        self
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchboard")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.orchestration.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration.max_rounds must be at least 1".into(),
            ));
        }

        let mut server_names = HashSet::new();
        for server in &self.capability_servers {
            if !server_names.insert(server.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate capability server '{}'",
                    server.name
                )));
            }
            match server.transport {
                TransportKind::Pipe if server.command.is_none() => {
                    return Err(ConfigError::ValidationError(format!(
                        "capability server '{}' uses the pipe transport but has no command",
                        server.name
                    )));
                }
                TransportKind::Network if server.url.is_none() => {
                    return Err(ConfigError::ValidationError(format!(
                        "capability server '{}' uses the network transport but has no url",
                        server.name
                    )));
                }
                _ => {}
            }
        }

        for agent in &self.agents {
            if let Some(server) = &agent.capability_server
                && !server_names.contains(server.as_str())
            {
                return Err(ConfigError::ValidationError(format!(
                    "agent '{}' references unknown capability server '{}'",
                    agent.name, server
                )));
            }
        }

        if let Some(server) = self
            .gateway
            .chat_capability_servers
            .iter()
            .find(|name| !server_names.contains(name.as_str()))
        {
            return Err(ConfigError::ValidationError(format!(
                "gateway.chat_capability_servers references unknown capability server '{server}'"
            )));
        }

        Ok(())
    }

    /// Look up a capability server by name.
    pub fn capability_server(&self, name: &str) -> Option<&CapabilityServerConfig> {
        self.capability_servers.iter().find(|s| s.name == name)
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: 0.0,
            system_prompt: default_system_prompt(),
            request_timeout_secs: default_request_timeout(),
            orchestration: OrchestrationConfig::default(),
            gateway: GatewayConfig::default(),
            capability_servers: vec![],
            agents: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
