//! Common Test Utilities
//!
//! Shared helpers and fixtures. Every test runs against in-memory stores.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use chat_gateway::config::Settings;
use chat_gateway::infrastructure::repositories::{InMemoryTokenStore, InMemoryUserStore};
use chat_gateway::presentation::http::create_router;
use chat_gateway::startup::{AppState, Application};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Secret of every fixture user
pub const TEST_SECRET: &[u8] = b"integration secret";

/// Application id tokens are issued to
pub const TEST_APP_ID: i64 = 1001;

/// Test application over in-memory stores
pub struct TestApp {
    pub state: AppState,
    pub users: Arc<InMemoryUserStore>,
    pub records: Arc<InMemoryTokenStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(Settings::in_memory())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let users = Arc::new(InMemoryUserStore::new());
        let records = Arc::new(InMemoryTokenStore::new());
        let state = AppState::with_stores(settings, users.clone(), records.clone())
            .expect("valid allocator ids");

        Self {
            state,
            users,
            records,
        }
    }

    /// Register a user with the fixture secret
    pub fn add_user(&self, user_id: i64, channel_ids: Vec<i64>) {
        self.users.insert_user(user_id, TEST_SECRET, channel_ids);
    }

    /// Issue and persist a token for a registered user
    pub async fn issue_token(&self, user_id: i64, scope: &[&str]) -> String {
        let scope: BTreeSet<String> = scope.iter().map(|s| s.to_string()).collect();
        self.state
            .tokens
            .issue(user_id, TEST_SECRET, TEST_APP_ID, scope, true)
            .await
            .expect("token issued")
            .to_string()
    }

    /// HTTP test server over the full router
    pub fn server(&self) -> TestServer {
        TestServer::new(create_router(self.state.clone())).expect("test server")
    }

    /// Serve on an ephemeral port until the returned handle is stopped
    pub async fn spawn(&self) -> RunningApp {
        let app = Application::with_state(self.state.clone())
            .await
            .expect("application bound");
        let addr = app.local_addr().expect("bound address");

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            app.run_until(async move {
                let _ = stopped.await;
            })
            .await
            .expect("server ran");
        });

        RunningApp {
            addr,
            stop: Some(stop),
            task,
        }
    }

    /// Wait until `user_id` has an identified connection
    pub async fn wait_online(&self, user_id: i64) {
        let bus = self.state.bus().clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            while !bus.is_user_online(user_id) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("user came online");
    }
}

/// A server running in the background
pub struct RunningApp {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RunningApp {
    pub fn gateway_url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// Trigger graceful shutdown and wait for the server to stop
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), &mut self.task)
            .await
            .expect("server stopped in time")
            .expect("server task");
    }
}
