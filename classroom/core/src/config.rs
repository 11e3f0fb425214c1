//! Session Configuration
//!
//! Runtime settings for a [`SessionClient`](crate::SessionClient) plus
//! loading from a TOML file at `~/.config/virtual-classroom/client.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [endpoint]
//! scheme = "ws"
//! host = "localhost"
//! port = 8000
//! room_id = "room_001"
//! auth_token = "dev-unity-token"
//!
//! [reconnect]
//! enabled = true
//! delay_ms = 3000
//! max_attempts = 10
//! policy = "exponential"
//! max_delay_ms = 30000
//! jitter = true
//!
//! [session]
//! connect_timeout_ms = 5000
//! client_source = "unity"
//! teacher_id = "unity_teacher"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{EndpointConfig, Scheme};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Delay schedule between reconnect attempts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Always wait `reconnect_delay`
    #[default]
    Fixed,
    /// Double the delay per attempt, capped at `max_delay`
    Exponential {
        /// Upper bound for a single wait
        max_delay: Duration,
        /// Pick uniformly from the upper half of the computed delay
        jitter: bool,
    },
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based)
    #[must_use]
    pub fn delay(&self, base: Duration, attempt: u32) -> Duration {
        match *self {
            Self::Fixed => base,
            Self::Exponential { max_delay, jitter } => {
                let shift = attempt.saturating_sub(1).min(16);
                let delay = base.saturating_mul(1 << shift).min(max_delay);
                if jitter && !delay.is_zero() {
                    let upper = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    Duration::from_millis(rand::thread_rng().gen_range(upper / 2..=upper))
                } else {
                    delay
                }
            }
        }
    }
}

/// Settings for one session client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Backend endpoint
    pub endpoint: EndpointConfig,
    /// Reconnect after an abnormal close or failed connect
    pub auto_reconnect: bool,
    /// Base wait before each reconnect attempt
    pub reconnect_delay: Duration,
    /// Attempts before giving up (0 = unlimited)
    pub max_reconnect_attempts: u32,
    /// Wait after each reconnect attempt before re-checking state
    pub connect_grace: Duration,
    /// Bound on a single transport open
    pub connect_timeout: Duration,
    /// Delay schedule
    pub reconnect_policy: ReconnectPolicy,
    /// Capacity of the outbound frame queue
    pub outbound_capacity: usize,
    /// `source` tag on teacher input frames
    pub client_source: String,
    /// `teacher_id` on teacher input frames
    pub teacher_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(3),
            max_reconnect_attempts: 10,
            connect_grace: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            reconnect_policy: ReconnectPolicy::Fixed,
            outbound_capacity: 100,
            client_source: "unity".to_string(),
            teacher_id: "unity_teacher".to_string(),
        }
    }
}

impl SessionConfig {
    /// Default settings for `endpoint`
    #[must_use]
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }

    /// Defaults with environment overrides applied
    ///
    /// Environment variables:
    /// - `CLASSROOM_HOST`, `CLASSROOM_PORT`, `CLASSROOM_ROOM`, `CLASSROOM_TOKEN`
    /// - `CLASSROOM_SCHEME`: "ws" or "wss"
    /// - `CLASSROOM_AUTO_RECONNECT`: "0" or "false" to disable
    /// - `CLASSROOM_RECONNECT_DELAY_MS`: Base reconnect delay in ms
    /// - `CLASSROOM_MAX_RECONNECT_ATTEMPTS`: 0 for unlimited
    /// - `CLASSROOM_CONNECT_TIMEOUT_MS`: Transport open timeout in ms
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value or the
    /// result fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        ConfigOverrides::from_env()?.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a usable connection
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.host.trim().is_empty() {
            return Err(ConfigError::ValidationError("host is empty".into()));
        }
        if self.endpoint.port == 0 {
            return Err(ConfigError::ValidationError("port must be non-zero".into()));
        }
        if self.endpoint.room_id.trim().is_empty() {
            return Err(ConfigError::ValidationError("room id is empty".into()));
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "outbound capacity must be non-zero".into(),
            ));
        }
        if let ReconnectPolicy::Exponential { max_delay, .. } = self.reconnect_policy {
            if max_delay < self.reconnect_delay {
                return Err(ConfigError::ValidationError(format!(
                    "max reconnect delay {max_delay:?} is below base delay {:?}",
                    self.reconnect_delay
                )));
            }
        }
        self.endpoint
            .url()
            .map_err(|e| ConfigError::ValidationError(format!("endpoint: {e}")))?;
        Ok(())
    }
}

// =============================================================================
// Overrides (environment / CLI)
// =============================================================================

/// Optional values layered on top of a [`SessionConfig`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Backend host
    pub host: Option<String>,
    /// Backend port
    pub port: Option<u16>,
    /// Room identifier
    pub room_id: Option<String>,
    /// Auth token
    pub auth_token: Option<String>,
    /// URL scheme
    pub scheme: Option<Scheme>,
    /// Auto-reconnect switch
    pub auto_reconnect: Option<bool>,
    /// Base reconnect delay in milliseconds
    pub reconnect_delay_ms: Option<u64>,
    /// Maximum reconnect attempts
    pub max_reconnect_attempts: Option<u32>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Read `CLASSROOM_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns an error naming the variable if a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary key lookup
    ///
    /// # Errors
    ///
    /// Returns an error naming the key if a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            key: &str,
            value: Option<String>,
        ) -> Result<Option<T>, ConfigError> {
            value
                .map(|v| {
                    v.trim().parse::<T>().map_err(|_| {
                        ConfigError::ValidationError(format!("{key}: cannot parse {v:?}"))
                    })
                })
                .transpose()
        }

        let scheme = lookup("CLASSROOM_SCHEME")
            .map(|v| {
                Scheme::parse(&v).ok_or_else(|| {
                    ConfigError::ValidationError(format!("CLASSROOM_SCHEME: unknown scheme {v:?}"))
                })
            })
            .transpose()?;

        let auto_reconnect = lookup("CLASSROOM_AUTO_RECONNECT")
            .map(|v| v != "0" && v.to_lowercase() != "false");

        Ok(Self {
            host: lookup("CLASSROOM_HOST"),
            port: parsed("CLASSROOM_PORT", lookup("CLASSROOM_PORT"))?,
            room_id: lookup("CLASSROOM_ROOM"),
            auth_token: lookup("CLASSROOM_TOKEN"),
            scheme,
            auto_reconnect,
            reconnect_delay_ms: parsed(
                "CLASSROOM_RECONNECT_DELAY_MS",
                lookup("CLASSROOM_RECONNECT_DELAY_MS"),
            )?,
            max_reconnect_attempts: parsed(
                "CLASSROOM_MAX_RECONNECT_ATTEMPTS",
                lookup("CLASSROOM_MAX_RECONNECT_ATTEMPTS"),
            )?,
            connect_timeout_ms: parsed(
                "CLASSROOM_CONNECT_TIMEOUT_MS",
                lookup("CLASSROOM_CONNECT_TIMEOUT_MS"),
            )?,
        })
    }

    /// Whether no value is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write every set value into `config`; returns true if anything changed
    pub fn apply(&self, config: &mut SessionConfig) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(host) = &self.host {
            config.endpoint.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.endpoint.port = port;
        }
        if let Some(room) = &self.room_id {
            config.endpoint.room_id.clone_from(room);
        }
        if let Some(token) = &self.auth_token {
            config.endpoint.auth_token.clone_from(token);
        }
        if let Some(scheme) = self.scheme {
            config.endpoint.scheme = scheme;
        }
        if let Some(enabled) = self.auto_reconnect {
            config.auto_reconnect = enabled;
        }
        if let Some(ms) = self.reconnect_delay_ms {
            config.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(max) = self.max_reconnect_attempts {
            config.max_reconnect_attempts = max;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        true
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[endpoint]` table
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointToml {
    /// `ws` or `wss`
    pub scheme: Option<Scheme>,
    /// Backend host
    pub host: Option<String>,
    /// Backend port
    pub port: Option<u16>,
    /// Path prefix
    pub path: Option<String>,
    /// Room identifier
    pub room_id: Option<String>,
    /// Auth token
    pub auth_token: Option<String>,
}

/// Delay schedule name in the `[reconnect]` table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyToml {
    /// [`ReconnectPolicy::Fixed`]
    Fixed,
    /// [`ReconnectPolicy::Exponential`]
    Exponential,
}

/// `[reconnect]` table
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectToml {
    /// Auto-reconnect switch
    pub enabled: Option<bool>,
    /// Base delay in milliseconds
    pub delay_ms: Option<u64>,
    /// Maximum attempts (0 = unlimited)
    pub max_attempts: Option<u32>,
    /// Grace wait after each attempt in milliseconds
    pub grace_ms: Option<u64>,
    /// Delay schedule
    pub policy: Option<PolicyToml>,
    /// Upper bound for exponential delays in milliseconds
    pub max_delay_ms: Option<u64>,
    /// Randomize exponential delays
    pub jitter: Option<bool>,
}

/// `[session]` table
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Transport open timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Outbound queue capacity
    pub outbound_capacity: Option<usize>,
    /// `source` tag on teacher input frames
    pub client_source: Option<String>,
    /// `teacher_id` on teacher input frames
    pub teacher_id: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Endpoint section
    pub endpoint: EndpointToml,
    /// Reconnect section
    pub reconnect: ReconnectToml,
    /// Session section
    pub session: SessionToml,
}

/// Configuration resolved from all sources
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    /// Resolved settings
    pub session: SessionConfig,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Highest-priority source that contributed
    pub source: ConfigSource,
}

impl LoadedConfig {
    /// Apply CLI overrides on top of the loaded values
    ///
    /// # Errors
    ///
    /// Returns an error if the result fails validation.
    pub fn with_cli(mut self, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        if overrides.apply(&mut self.session) {
            self.source = ConfigSource::Cli;
        }
        self.session.validate()?;
        Ok(self)
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/virtual-classroom/client.toml` or the platform
/// equivalent.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("virtual-classroom").join("client.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, an
/// environment variable is malformed, or the result fails validation.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<LoadedConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// an environment variable is malformed, or the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<LoadedConfig, ConfigError> {
    let mut loaded = load_file(path)?;
    if ConfigOverrides::from_env()?.apply(&mut loaded.session) {
        loaded.source = ConfigSource::Env;
    }
    loaded.session.validate()?;
    Ok(loaded)
}

/// Defaults plus the file at `path`, without environment overrides
fn load_file(path: Option<PathBuf>) -> Result<LoadedConfig, ConfigError> {
    let mut loaded = LoadedConfig {
        session: SessionConfig::default(),
        config_file_path: None,
        source: ConfigSource::Default,
    };

    let Some(config_path) = path else {
        return Ok(loaded);
    };

    if !config_path.exists() {
        tracing::debug!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return Ok(loaded);
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let toml_config: ClientToml = toml::from_str(&content)?;
    apply_toml_config(&mut loaded.session, &toml_config);

    tracing::info!(path = %config_path.display(), "Loaded configuration from file");
    loaded.config_file_path = Some(config_path);
    loaded.source = ConfigSource::File;
    Ok(loaded)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut SessionConfig, toml: &ClientToml) {
    let endpoint = &toml.endpoint;
    if let Some(scheme) = endpoint.scheme {
        config.endpoint.scheme = scheme;
    }
    if let Some(host) = &endpoint.host {
        config.endpoint.host.clone_from(host);
    }
    if let Some(port) = endpoint.port {
        config.endpoint.port = port;
    }
    if let Some(path) = &endpoint.path {
        config.endpoint.path.clone_from(path);
    }
    if let Some(room) = &endpoint.room_id {
        config.endpoint.room_id.clone_from(room);
    }
    if let Some(token) = &endpoint.auth_token {
        config.endpoint.auth_token.clone_from(token);
    }

    let reconnect = &toml.reconnect;
    if let Some(enabled) = reconnect.enabled {
        config.auto_reconnect = enabled;
    }
    if let Some(ms) = reconnect.delay_ms {
        config.reconnect_delay = Duration::from_millis(ms);
    }
    if let Some(max) = reconnect.max_attempts {
        config.max_reconnect_attempts = max;
    }
    if let Some(ms) = reconnect.grace_ms {
        config.connect_grace = Duration::from_millis(ms);
    }
    match reconnect.policy {
        Some(PolicyToml::Fixed) => config.reconnect_policy = ReconnectPolicy::Fixed,
        Some(PolicyToml::Exponential) => {
            let max_delay = reconnect
                .max_delay_ms
                .map_or(Duration::from_secs(30), Duration::from_millis);
            config.reconnect_policy = ReconnectPolicy::Exponential {
                max_delay,
                jitter: reconnect.jitter.unwrap_or(true),
            };
        }
        None => {}
    }

    let session = &toml.session;
    if let Some(ms) = session.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(capacity) = session.outbound_capacity {
        config.outbound_capacity = capacity;
    }
    if let Some(source) = &session.client_source {
        config.client_source.clone_from(source);
    }
    if let Some(teacher) = &session.teacher_id {
        config.teacher_id.clone_from(teacher);
    }
}
