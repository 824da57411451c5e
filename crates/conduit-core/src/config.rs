use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_MCP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 5;

/// Top-level config, loaded from an optional TOML file plus the `APP_*` /
/// `REDIS_*` / `KAFKA_*` / `MCP_*` / `CORS_*` environment variables named
/// in the external-interfaces table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConductorConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    pub password: Option<String>,
    #[serde(default)]
    pub db: u8,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
        }
    }
}

impl RedisConfig {
    /// Build a `redis://` connection URL from the discrete fields.
    pub fn url(&self) -> String {
        match &self.password {
            Some(pw) => format!("redis://:{}@{}:{}/{}", pw, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    #[serde(default = "default_kafka_bootstrap")]
    pub bootstrap_servers: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Comma-separated in env (`KAFKA_TOPICS`); split at load time.
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_kafka_bootstrap(),
            consumer_group: default_consumer_group(),
            topics: default_topics(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_mcp_url")]
    pub server_url: String,
    #[serde(default = "default_mcp_timeout")]
    pub server_timeout: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            server_url: default_mcp_url(),
            server_timeout: default_mcp_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    /// Comma-separated in env (`CORS_ORIGINS`); empty means "no CORS layer".
    #[serde(default)]
    pub origins: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}
fn default_redis_port() -> u16 {
    6379
}
fn default_kafka_bootstrap() -> String {
    "127.0.0.1:9092".to_string()
}
fn default_consumer_group() -> String {
    "conduit-gateway".to_string()
}
fn default_topics() -> Vec<String> {
    vec!["project-updates".to_string(), "conversation-events".to_string()]
}
fn default_mcp_url() -> String {
    "http://127.0.0.1:9000".to_string()
}
fn default_mcp_timeout() -> u64 {
    DEFAULT_MCP_TIMEOUT_SECS
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            redis: RedisConfig::default(),
            kafka: KafkaConfig::default(),
            mcp: McpConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl ConductorConfig {
    /// Load config from an optional TOML file, overridden by the flat
    /// environment variables named in the external-interfaces table
    /// (`APP_PORT`, `REDIS_HOST`, `KAFKA_TOPICS`, ...). Boots fine with no
    /// file present — every field has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(
            ConductorConfig::default(),
        ));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        let mut config: ConductorConfig = figment
            .merge(Env::raw().only(&["APP_PORT"]).map(|_| "app.port".into()))
            .merge(Env::raw().only(&["LOG_LEVEL"]).map(|_| "app.log_level".into()))
            .merge(Env::raw().only(&["LOG_FORMAT"]).map(|_| "app.log_format".into()))
            .merge(Env::raw().only(&["REDIS_HOST"]).map(|_| "redis.host".into()))
            .merge(Env::raw().only(&["REDIS_PORT"]).map(|_| "redis.port".into()))
            .merge(Env::raw().only(&["REDIS_PASSWORD"]).map(|_| "redis.password".into()))
            .merge(Env::raw().only(&["REDIS_DB"]).map(|_| "redis.db".into()))
            .merge(Env::raw().only(&["KAFKA_BOOTSTRAP_SERVERS"]).map(|_| "kafka.bootstrap_servers".into()))
            .merge(Env::raw().only(&["KAFKA_CONSUMER_GROUP"]).map(|_| "kafka.consumer_group".into()))
            .merge(Env::raw().only(&["MCP_SERVER_URL"]).map(|_| "mcp.server_url".into()))
            .merge(Env::raw().only(&["MCP_SERVER_TIMEOUT"]).map(|_| "mcp.server_timeout".into()))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        if let Ok(raw) = std::env::var("KAFKA_TOPICS") {
            config.kafka.topics = raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(raw) = std::env::var("CORS_ORIGINS") {
            config.cors.origins = raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_boot_with_no_file() {
        let config = ConductorConfig::default();
        assert_eq!(config.app.port, DEFAULT_PORT);
        assert_eq!(config.kafka.topics.len(), 2);
        assert_eq!(config.mcp.server_timeout, DEFAULT_MCP_TIMEOUT_SECS);
    }

    #[test]
    fn redis_url_without_password() {
        let config = RedisConfig::default();
        assert_eq!(config.url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn redis_url_with_password() {
        let config = RedisConfig {
            password: Some("secret".to_string()),
            ..RedisConfig::default()
        };
        assert_eq!(config.url(), "redis://:secret@127.0.0.1:6379/0");
    }
}
