use crate::error::{PolyglotError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub payloads: PayloadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Max time to receive a complete request.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Max time to transmit a complete response.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    /// Max time a keep-alive connection may sit between requests.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadConfig {
    #[serde(default = "default_payload_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// The five per-connection bounds enforced by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_connections: usize,
    pub max_request_body_bytes: usize,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// Default value functions
fn default_host() -> String {
    std::env::var("POLYGLOT_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}
fn default_port() -> u16 {
    env_parse("POLYGLOT_PORT").unwrap_or(3000)
}
fn default_read_timeout() -> u64 {
    env_parse("POLYGLOT_READ_TIMEOUT_SECS").unwrap_or(5)
}
fn default_write_timeout() -> u64 {
    env_parse("POLYGLOT_WRITE_TIMEOUT_SECS").unwrap_or(10)
}
fn default_idle_timeout() -> u64 {
    env_parse("POLYGLOT_IDLE_TIMEOUT_SECS").unwrap_or(30)
}
fn default_max_connections() -> usize {
    env_parse("POLYGLOT_MAX_CONNECTIONS").unwrap_or(10_000)
}
fn default_max_request_body_bytes() -> usize {
    env_parse("POLYGLOT_MAX_REQUEST_BODY_BYTES").unwrap_or(1024 * 1024)
}
fn default_shutdown_timeout_secs() -> u64 {
    env_parse("POLYGLOT_SHUTDOWN_TIMEOUT_SECS").unwrap_or(30)
}
fn default_payload_dir() -> PathBuf {
    std::env::var("POLYGLOT_PAYLOAD_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("payloads"))
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    std::env::var("POLYGLOT_LOG_FORMAT").unwrap_or_else(|_| "json".to_string())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_connections: default_max_connections(),
            max_request_body_bytes: default_max_request_body_bytes(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            dir: default_payload_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ServerConfig {
    pub fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_connections: self.max_connections,
            max_request_body_bytes: self.max_request_body_bytes,
        }
    }
}

impl Config {
    /// Load config from a TOML file, falling back to defaults.
    /// Env vars are applied last, so env var > TOML file > defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|e| {
                    PolyglotError::Config(format!("failed to read config file {p}: {e}"))
                })?;
                toml::from_str(&content)
                    .map_err(|e| PolyglotError::Config(format!("failed to parse config: {e}")))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Every bound must be a real bound; zero would either disable a
    /// protection or refuse all traffic.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        for (name, value) in [
            ("read_timeout_secs", s.read_timeout_secs),
            ("write_timeout_secs", s.write_timeout_secs),
            ("idle_timeout_secs", s.idle_timeout_secs),
        ] {
            if value == 0 {
                return Err(PolyglotError::Config(format!("server.{name} must be > 0")));
            }
        }
        if s.max_connections == 0 {
            return Err(PolyglotError::Config(
                "server.max_connections must be > 0".into(),
            ));
        }
        if s.max_request_body_bytes == 0 {
            return Err(PolyglotError::Config(
                "server.max_request_body_bytes must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        // Server
        if let Ok(v) = std::env::var("POLYGLOT_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_parse("POLYGLOT_PORT") {
            self.server.port = v;
        }
        if let Some(v) = env_parse("POLYGLOT_READ_TIMEOUT_SECS") {
            self.server.read_timeout_secs = v;
        }
        if let Some(v) = env_parse("POLYGLOT_WRITE_TIMEOUT_SECS") {
            self.server.write_timeout_secs = v;
        }
        if let Some(v) = env_parse("POLYGLOT_IDLE_TIMEOUT_SECS") {
            self.server.idle_timeout_secs = v;
        }
        if let Some(v) = env_parse("POLYGLOT_MAX_CONNECTIONS") {
            self.server.max_connections = v;
        }
        if let Some(v) = env_parse("POLYGLOT_MAX_REQUEST_BODY_BYTES") {
            self.server.max_request_body_bytes = v;
        }
        if let Some(v) = env_parse("POLYGLOT_SHUTDOWN_TIMEOUT_SECS") {
            self.server.shutdown_timeout_secs = v;
        }

        // Payloads
        if let Ok(v) = std::env::var("POLYGLOT_PAYLOAD_DIR") {
            self.payloads.dir = PathBuf::from(v);
        }

        // Logging
        if let Ok(v) = std::env::var("POLYGLOT_LOG_FORMAT") {
            self.logging.format = v;
        }
    }
}
