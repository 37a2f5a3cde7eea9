// Copyright 2025 Reflow Contributors (https://github.com/reflow-dev/reflow)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use reflow_storage::ChunkLogConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reflow Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:48600")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all, use specific origins in production)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Chunk log retention window in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Maximum sessions retained in the chunk log
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,

    /// Upper bound on a single chunk log read during resume, in
    /// milliseconds; a read that takes longer degrades to "no session"
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Enable authentication (default: false for development)
    #[serde(default)]
    pub enabled: bool,

    /// JWT secret for token validation
    pub jwt_secret: Option<String>,

    /// Static API keys (format: "key:tenant_id")
    #[serde(default)]
    pub api_keys: Vec<String>,
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:48600".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_max_sessions() -> u64 {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    2000
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            cors_origins: vec![],
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl(),
            max_sessions: default_max_sessions(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl RetentionConfig {
    pub fn chunk_log_config(&self) -> ChunkLogConfig {
        ChunkLogConfig {
            max_sessions: self.max_sessions,
            ttl_secs: self.session_ttl_secs,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - REFLOW_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:48600)
    /// - REFLOW_ENABLE_CORS: Enable CORS (default: true)
    /// - REFLOW_SESSION_TTL_SECS: Chunk log retention window
    /// - REFLOW_MAX_SESSIONS: Chunk log capacity
    /// - REFLOW_AUTH_ENABLED: Enable authentication (default: false)
    /// - REFLOW_JWT_SECRET: JWT secret for token validation
    /// - REFLOW_API_KEYS: Comma-separated API keys (format: key:tenant_id)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("REFLOW_HTTP_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(cors) = std::env::var("REFLOW_ENABLE_CORS") {
            config.server.enable_cors = cors.parse().unwrap_or(true);
        }

        if let Ok(ttl) = std::env::var("REFLOW_SESSION_TTL_SECS") {
            if let Ok(val) = ttl.parse() {
                config.retention.session_ttl_secs = val;
            }
        }

        if let Ok(max) = std::env::var("REFLOW_MAX_SESSIONS") {
            if let Ok(val) = max.parse() {
                config.retention.max_sessions = val;
            }
        }

        if let Ok(enabled) = std::env::var("REFLOW_AUTH_ENABLED") {
            config.auth.enabled = enabled.parse().unwrap_or(false);
        }

        if let Ok(secret) = std::env::var("REFLOW_JWT_SECRET") {
            config.auth.jwt_secret = Some(secret);
        }

        if let Ok(keys) = std::env::var("REFLOW_API_KEYS") {
            config.auth.api_keys = keys.split(',').map(String::from).collect();
        }

        config
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        config = Self::merge_with_env(config);

        Ok(config)
    }

    /// Merge config with environment variables (env takes priority)
    fn merge_with_env(mut config: Self) -> Self {
        let env_config = Self::from_env();

        if std::env::var("REFLOW_HTTP_ADDR").is_ok() {
            config.server.listen_addr = env_config.server.listen_addr;
        }
        if std::env::var("REFLOW_ENABLE_CORS").is_ok() {
            config.server.enable_cors = env_config.server.enable_cors;
        }
        if std::env::var("REFLOW_SESSION_TTL_SECS").is_ok() {
            config.retention.session_ttl_secs = env_config.retention.session_ttl_secs;
        }
        if std::env::var("REFLOW_MAX_SESSIONS").is_ok() {
            config.retention.max_sessions = env_config.retention.max_sessions;
        }
        if std::env::var("REFLOW_AUTH_ENABLED").is_ok() {
            config.auth.enabled = env_config.auth.enabled;
        }
        if std::env::var("REFLOW_JWT_SECRET").is_ok() {
            config.auth.jwt_secret = env_config.auth.jwt_secret;
        }
        if std::env::var("REFLOW_API_KEYS").is_ok() {
            config.auth.api_keys = env_config.auth.api_keys;
        }

        config
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.auth.enabled && self.auth.jwt_secret.is_none() && self.auth.api_keys.is_empty() {
            anyhow::bail!("Authentication enabled but no JWT secret or API keys configured");
        }

        if self.retention.session_ttl_secs == 0 {
            anyhow::bail!("session_ttl_secs must be greater than 0");
        }

        Ok(())
    }
}
