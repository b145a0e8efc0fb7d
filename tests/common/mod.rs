//! Shared utilities for integration testing.
//!
//! Spins up a real [`ApiServer`] on an ephemeral port, backed by the
//! in-memory stores so tests run without Postgres. The returned handle
//! exposes the stores for direct seeding.

use std::sync::Arc;

use chrono::Utc;
use tokio::net::TcpListener;

use marquee::config::AppConfig;
use marquee::data::{Stores, Token, TokenScope, User};
use marquee::http::ApiServer;
use marquee::lifecycle::Shutdown;
use marquee::mail::LogMailer;

pub struct TestApp {
    pub base_url: String,
    pub stores: Stores,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Start a server with the default test configuration (rate limiter off so
/// unrelated tests never trip it).
pub async fn spawn_app() -> TestApp {
    let mut config = test_config();
    config.limiter.enabled = false;
    spawn_app_with(config).await
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.server.env = "test".to_string();
    config.observability.metrics_enabled = false;
    config
}

pub async fn spawn_app_with(config: AppConfig) -> TestApp {
    let stores = Stores::in_memory();
    let mailer = Arc::new(LogMailer);
    let server = ApiServer::new(config, stores.clone(), mailer);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{addr}"),
        stores,
        client: reqwest::Client::new(),
        shutdown,
    }
}

/// Insert a user directly into the stores and hand back an authentication
/// token plaintext for it.
pub async fn seed_user(
    app: &TestApp,
    email: &str,
    password: &str,
    activated: bool,
    permissions: &[&str],
) -> (User, String) {
    let mut user = User {
        id: 0,
        created_at: Utc::now(),
        name: "Test User".to_string(),
        email: email.to_string(),
        password_hash: marquee::data::users::hash_password(password).unwrap(),
        activated,
        version: 0,
    };
    app.stores.users.insert(&mut user).await.unwrap();

    if !permissions.is_empty() {
        app.stores
            .permissions
            .add_for_user(user.id, permissions)
            .await
            .unwrap();
    }

    let token = Token::generate(user.id, chrono::Duration::hours(1), TokenScope::Authentication);
    app.stores.tokens.insert(&token).await.unwrap();

    (user, token.plaintext)
}
