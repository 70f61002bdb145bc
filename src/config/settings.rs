//! Application settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Redis configuration
    pub redis: RedisSettings,

    /// Which stores back users and token records
    pub storage: StorageSettings,

    /// Snowflake ID allocator settings
    pub snowflake: SnowflakeSettings,

    /// Access token settings
    pub tokens: TokenSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// WebSocket gateway configuration
    pub websocket: WebSocketSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL, required by the postgres backends
    pub url: Option<String>,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL, required by the redis token store
    pub url: Option<String>,
}

/// User store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Token record store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreBackend {
    Postgres,
    Redis,
}

/// Storage selection.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Backend for users; `memory` also keeps token records in memory
    pub backend: StorageBackend,

    /// Backend for token records when `backend` is `postgres`
    pub token_store: TokenStoreBackend,
}

/// Snowflake ID allocator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Worker ID (0-31)
    pub worker_id: u8,

    /// Datacenter ID (0-31)
    pub datacenter_id: u8,

    /// Custom epoch timestamp in milliseconds
    pub epoch: u64,
}

/// Access token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSettings {
    /// Token epoch in Unix seconds; token offsets count from here
    pub epoch_offset: i64,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

/// WebSocket gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Heartbeat interval announced in HELLO, in milliseconds (default: 30000)
    pub heartbeat_interval_ms: u64,

    /// Maximum message size in bytes (default: 64KB)
    pub max_message_size: usize,

    /// Maximum frame size in bytes (default: 16KB)
    pub max_frame_size: usize,

    /// How long shutdown waits for sockets to flush their close frames
    pub shutdown_timeout_ms: u64,
}

impl WebSocketSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed, or
    /// if a selected backend has no connection URL.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("storage.backend", "postgres")?
            .set_default("storage.token_store", "postgres")?
            .set_default("snowflake.worker_id", 0)?
            .set_default("snowflake.datacenter_id", 0)?
            .set_default("snowflake.epoch", 1_546_300_800_000_u64)?
            .set_default("tokens.epoch_offset", 1_546_300_800_i64)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            .set_default("websocket.heartbeat_interval_ms", 30000_i64)?
            .set_default("websocket.max_message_size", 65536_i64)? // 64KB
            .set_default("websocket.max_frame_size", 16384_i64)? // 16KB
            .set_default("websocket.shutdown_timeout_ms", 5000_i64)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__SERVER__PORT=8080 -> server.port = 8080
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option(
                "snowflake.worker_id",
                std::env::var("SNOWFLAKE_WORKER_ID").ok(),
            )?
            .set_override_option(
                "snowflake.datacenter_id",
                std::env::var("SNOWFLAKE_DATACENTER_ID").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| settings.validate().map(|_| settings))
    }

    /// Check that every selected backend can be reached and the
    /// heartbeat interval is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.websocket.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Message(
                "websocket.heartbeat_interval_ms must be greater than zero".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Memory {
            return Ok(());
        }
        if self.database.url.is_none() {
            return Err(ConfigError::Message(
                "database.url (DATABASE_URL) is required by the postgres storage backend".into(),
            ));
        }
        if self.storage.token_store == TokenStoreBackend::Redis && self.redis.url.is_none() {
            return Err(ConfigError::Message(
                "redis.url (REDIS_URL) is required by the redis token store".into(),
            ));
        }
        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// In-memory settings for tests and local runs.
    pub fn in_memory() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".into(),
                port: 0,
            },
            database: DatabaseSettings {
                url: None,
                max_connections: 10,
                min_connections: 2,
                acquire_timeout: 30,
            },
            redis: RedisSettings { url: None },
            storage: StorageSettings {
                backend: StorageBackend::Memory,
                token_store: TokenStoreBackend::Postgres,
            },
            snowflake: SnowflakeSettings {
                worker_id: 0,
                datacenter_id: 0,
                epoch: crate::shared::snowflake::DEFAULT_EPOCH,
            },
            tokens: TokenSettings {
                epoch_offset: crate::application::services::DEFAULT_TOKEN_EPOCH,
            },
            cors: CorsSettings {
                allowed_origins: vec!["http://localhost:3000".into()],
            },
            websocket: WebSocketSettings {
                heartbeat_interval_ms: 30_000,
                max_message_size: 65_536,
                max_frame_size: 16_384,
                shutdown_timeout_ms: 5_000,
            },
            environment: "test".into(),
        }
    }
}
