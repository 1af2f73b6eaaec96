//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use service_bootstrap::lifecycle::{Application, RunningService};
use service_bootstrap::{ConfigLoader, Settings};
use tokio::net::TcpListener;

/// Accepts and immediately drops connections, standing in for a database.
pub async fn start_fake_storage() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });

    addr
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Minimal valid environment pointing storage at `storage`.
pub fn vars(storage: SocketAddr) -> Vec<(String, String)> {
    vec![
        ("SECRET_KEY".into(), "integration-secret".into()),
        ("DATABASE_URL".into(), format!("postgres://app:pw@{storage}/app")),
        ("REDIS_URL".into(), "redis://127.0.0.1:6379/0".into()),
        ("ALLOWED_HOSTS".into(), "localhost,127.0.0.1,https://app.example.org".into()),
        ("PROJECT_NAME".into(), "bootstrap-it".into()),
    ]
}

pub fn settings(vars: Vec<(String, String)>) -> Arc<Settings> {
    ConfigLoader::from_vars(vars).load().unwrap()
}

/// Build and start a service on an ephemeral port.
pub async fn start_service(settings: Arc<Settings>, api: Router) -> RunningService {
    Application::builder(settings)
        .api(api)
        .build()
        .unwrap()
        .start_on("127.0.0.1:0")
        .await
        .unwrap()
}

/// Value of one exposition line, if present.
#[allow(dead_code)]
pub fn sample(exposition: &str, series: &str) -> Option<f64> {
    exposition
        .lines()
        .find_map(|line| line.strip_prefix(series))
        .and_then(|rest| rest.trim().parse().ok())
}
