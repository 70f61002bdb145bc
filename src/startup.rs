//! Application Startup
//!
//! Application building and server initialization.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::application::services::TokenService;
use crate::config::{Settings, StorageBackend, TokenStoreBackend};
use crate::domain::{TokenStore, UserStore};
use crate::infrastructure::repositories::{
    InMemoryTokenStore, InMemoryUserStore, PgTokenStore, PgUserStore, RedisTokenStore,
};
use crate::infrastructure::{cache, database};
use crate::presentation::http::{create_router, handlers::health};
use crate::presentation::websocket::{CloseCode, EventBus, Gateway};
use crate::shared::snowflake::{IdAllocator, SnowflakeError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ids: Arc<Mutex<IdAllocator>>,
    pub tokens: Arc<TokenService>,
    pub gateway: Arc<Gateway>,
    /// Present when a postgres backend is configured
    pub db: Option<PgPool>,
    /// Present when the redis token store is configured
    pub redis: Option<ConnectionManager>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire services over the given stores. Fails on invalid allocator ids.
    pub fn with_stores(
        settings: Settings,
        users: Arc<dyn UserStore>,
        records: Arc<dyn TokenStore>,
    ) -> Result<Self, SnowflakeError> {
        let ids = Arc::new(Mutex::new(IdAllocator::new(
            settings.snowflake.worker_id,
            settings.snowflake.datacenter_id,
            settings.snowflake.epoch,
        )?));

        let tokens = Arc::new(TokenService::new(
            users.clone(),
            records,
            settings.tokens.epoch_offset,
        ));

        let bus = Arc::new(EventBus::new(users, settings.websocket.shutdown_timeout()));
        let gateway = Arc::new(Gateway::new(
            bus,
            tokens.clone(),
            ids.clone(),
            settings.websocket.heartbeat_interval(),
        ));

        Ok(Self {
            ids,
            tokens,
            gateway,
            db: None,
            redis: None,
            settings: Arc::new(settings),
        })
    }

    /// Connect the configured stores and wire services over them.
    pub async fn connect(settings: Settings) -> Result<Self> {
        if settings.storage.backend == StorageBackend::Memory {
            tracing::warn!("Using in-memory stores; users and tokens are not persisted");
            return Ok(Self::with_stores(
                settings,
                Arc::new(InMemoryUserStore::new()),
                Arc::new(InMemoryTokenStore::new()),
            )?);
        }

        // Create database pool
        let db_url = settings
            .database
            .url
            .as_deref()
            .context("database.url is not configured")?;
        let db = database::create_pool(db_url, &settings.database).await?;
        tracing::info!("Database connection pool created");

        let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(db.clone()));

        let redis = match settings.storage.token_store {
            TokenStoreBackend::Postgres => None,
            TokenStoreBackend::Redis => {
                // Create Redis client
                let redis_url = settings
                    .redis
                    .url
                    .as_deref()
                    .context("redis.url is not configured")?;
                let redis = cache::create_redis_client(redis_url).await?;
                Some(redis)
            }
        };

        let records: Arc<dyn TokenStore> = match &redis {
            Some(conn) => Arc::new(RedisTokenStore::new(conn.clone())),
            None => Arc::new(PgTokenStore::new(db.clone())),
        };

        let mut state = Self::with_stores(settings, users, records)?;
        state.db = Some(db);
        state.redis = redis;
        Ok(state)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.gateway.bus()
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let state = AppState::connect(settings).await?;
        Self::with_state(state).await
    }

    /// Build the application over an already wired state
    pub async fn with_state(state: AppState) -> Result<Self> {
        health::init_server_start();

        let router = create_router(state.clone());

        // Bind to address
        let addr = state.settings.server_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router,
            state,
        })
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until Ctrl-C or SIGTERM
    pub async fn run_until_stopped(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the server until `signal` resolves, then close every gateway
    /// socket and wait for their close frames to flush
    pub async fn run_until(self, signal: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let bus = self.state.bus().clone();

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                signal.await;
                tracing::info!("Shutdown requested, closing gateway");
                bus.close(CloseCode::Normal).await;
            })
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
