//! Startup orchestration.
//!
//! # Responsibilities
//! - Assemble resources, metrics, pipeline and HTTP server from settings
//! - Start resources, then bind the listener, then accept traffic
//! - Drain in-flight requests and release resources on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and rolls back what started
//! - Resources initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, Settings};
use crate::http::HttpServer;
use crate::lifecycle::manager::{LifecycleError, LifecycleHandle, LifecycleManager, Resource};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::{
    EventSink, MetricsExporter, ObservabilityError, PrometheusMetrics, TracingEventSink,
};
use crate::pipeline::Observers;
use crate::storage::{StorageError, StoragePool};

/// Anything that keeps the service from starting or stopping cleanly.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Observability(#[from] ObservabilityError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server task failed: {0}")]
    Task(String),
}

/// Collects the pieces of an [`Application`].
pub struct ApplicationBuilder {
    settings: Arc<Settings>,
    api: Router,
    events: Arc<dyn EventSink>,
    resources: Vec<Arc<dyn Resource>>,
    metrics_listener: bool,
}

impl ApplicationBuilder {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            api: Router::new(),
            events: Arc::new(TracingEventSink),
            resources: Vec::new(),
            metrics_listener: false,
        }
    }

    /// Business router, mounted under the API prefix.
    pub fn api(mut self, router: Router) -> Self {
        self.api = router;
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Extra resource started after storage.
    pub fn resource(mut self, resource: Arc<dyn Resource>) -> Self {
        self.resources.push(resource);
        self
    }

    /// Also serve `/metrics` on `METRICS_PORT` when it differs from `PORT`.
    pub fn metrics_listener(mut self, enabled: bool) -> Self {
        self.metrics_listener = enabled;
        self
    }

    pub fn build(self) -> Result<Application, StartupError> {
        let settings = self.settings;
        let metrics = Arc::new(PrometheusMetrics::new()?);
        let storage = Arc::new(StoragePool::from_settings(&settings)?);

        let mut lifecycle = LifecycleManager::new();
        lifecycle.register(storage.clone());
        for resource in self.resources {
            lifecycle.register(resource);
        }
        if self.metrics_listener && settings.enable_metrics && settings.metrics_port != settings.port
        {
            lifecycle.register(Arc::new(MetricsExporter::new(
                settings.metrics_address(),
                metrics.clone(),
            )));
        }

        let observers = Observers {
            events: self.events,
            metrics: metrics.clone(),
        };
        let server = HttpServer::new(
            settings.clone(),
            self.api,
            observers,
            metrics.clone(),
            lifecycle.handle(),
        );

        Ok(Application {
            settings,
            lifecycle: Arc::new(lifecycle),
            server,
            storage,
            metrics,
        })
    }
}

/// A fully assembled service that has not started yet.
pub struct Application {
    settings: Arc<Settings>,
    lifecycle: Arc<LifecycleManager>,
    server: HttpServer,
    storage: Arc<StoragePool>,
    metrics: Arc<PrometheusMetrics>,
}

impl Application {
    pub fn builder(settings: Arc<Settings>) -> ApplicationBuilder {
        ApplicationBuilder::new(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn lifecycle(&self) -> LifecycleHandle {
        self.lifecycle.handle()
    }

    pub fn storage(&self) -> Arc<StoragePool> {
        self.storage.clone()
    }

    pub fn metrics(&self) -> Arc<PrometheusMetrics> {
        self.metrics.clone()
    }

    pub fn resource_names(&self) -> Vec<&'static str> {
        self.lifecycle.resource_names()
    }

    /// Router for in-process use; the lifecycle is not driven.
    pub fn router(&self) -> Router {
        self.server.router()
    }

    /// Start on the configured `HOST:PORT`.
    pub async fn start(self) -> Result<RunningService, StartupError> {
        let address = self.settings.bind_address();
        self.start_on(&address).await
    }

    /// Start resources, bind `address`, and begin serving.
    pub async fn start_on(self, address: &str) -> Result<RunningService, StartupError> {
        self.lifecycle.start().await?;

        let listener = match TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(source) => {
                self.lifecycle.abort().await;
                return Err(LifecycleError::Bind {
                    address: address.to_string(),
                    source,
                }
                .into());
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.lifecycle.abort().await;
                return Err(StartupError::Serve(e));
            }
        };

        self.lifecycle.mark_running()?;
        tracing::info!(
            address = %local_addr,
            service = %self.settings.project_name,
            environment = %self.settings.environment,
            "Listening for connections"
        );

        let shutdown = Shutdown::new();
        let router = self.server.router();
        let lifecycle = self.lifecycle.clone();
        let signal = shutdown.clone();
        let join = tokio::spawn(async move {
            let draining = lifecycle.clone();
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    signal.triggered().await;
                    if let Err(e) = draining.begin_shutdown() {
                        tracing::warn!(error = %e, "Unexpected state at shutdown");
                    }
                    tracing::info!("Draining in-flight requests");
                })
                .await;

            lifecycle.shutdown().await?;
            tracing::info!("Shutdown complete");
            served.map_err(StartupError::Serve)
        });

        Ok(RunningService {
            local_addr,
            lifecycle: self.lifecycle.handle(),
            shutdown,
            join,
        })
    }
}

/// A service accepting traffic.
pub struct RunningService {
    local_addr: SocketAddr,
    lifecycle: LifecycleHandle,
    shutdown: Shutdown,
    join: JoinHandle<Result<(), StartupError>>,
}

impl RunningService {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn lifecycle(&self) -> LifecycleHandle {
        self.lifecycle.clone()
    }

    /// Handle that stops the service when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Stop accepting, drain, release resources.
    pub async fn stop(self) -> Result<(), StartupError> {
        self.shutdown.trigger();
        self.join
            .await
            .map_err(|e| StartupError::Task(e.to_string()))?
    }

    /// Serve until `signal` resolves or the server exits on its own.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => self.stop().await,
            joined = &mut self.join => joined.map_err(|e| StartupError::Task(e.to_string()))?,
        }
    }
}
