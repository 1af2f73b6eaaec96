//! Storage connection pool.
//!
//! # Responsibilities
//! - Derive pool capacity and target address from configuration
//! - Verify the storage backend is reachable during startup
//! - Hand out connection slots up to the configured capacity
//!
//! # Design Decisions
//! - Reachability is a TCP connect with a deadline; the wire protocol is
//!   left to the driver that uses the slots
//! - `sqlite` URLs point at a local file and need no network check
//! - A closed pool refuses new slots immediately instead of waiting

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::Settings;
use crate::lifecycle::{LifecycleError, Resource};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage url: {0}")]
    InvalidUrl(String),

    #[error("storage pool is not open")]
    Closed,
}

/// Where the pool connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    Network { host: String, port: u16 },
    Local { path: String },
}

impl StorageTarget {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let url = url::Url::parse(raw).map_err(|e| StorageError::InvalidUrl(e.to_string()))?;
        // `postgresql+asyncpg` style schemes name the driver after the `+`.
        let scheme = url.scheme().split('+').next().unwrap_or_default();

        if scheme == "sqlite" {
            return Ok(StorageTarget::Local {
                path: url.path().to_string(),
            });
        }

        let host = url
            .host_str()
            .ok_or_else(|| StorageError::InvalidUrl(format!("{scheme} url has no host")))?
            .to_string();
        let port = url
            .port()
            .or_else(|| default_port(scheme))
            .ok_or_else(|| StorageError::InvalidUrl(format!("no default port for '{scheme}'")))?;

        Ok(StorageTarget::Network { host, port })
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "postgres" | "postgresql" => Some(5432),
        "mysql" | "mariadb" => Some(3306),
        "redis" | "rediss" => Some(6379),
        _ => None,
    }
}

/// Startup resource backing the database connection pool.
#[derive(Debug)]
pub struct StoragePool {
    target: StorageTarget,
    capacity: usize,
    slots: Arc<Semaphore>,
    open: AtomicBool,
    connect_timeout: Duration,
}

impl StoragePool {
    pub fn new(target: StorageTarget, capacity: usize) -> Self {
        Self {
            target,
            capacity,
            slots: Arc::new(Semaphore::new(0)),
            open: AtomicBool::new(false),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Pool for `DATABASE_URL` sized `DATABASE_POOL_SIZE + DATABASE_MAX_OVERFLOW`.
    pub fn from_settings(settings: &Settings) -> Result<Self, StorageError> {
        let target = StorageTarget::parse(&settings.database_url)?;
        let capacity = (settings.database_pool_size as usize)
            .saturating_add(settings.database_max_overflow as usize)
            .min(Semaphore::MAX_PERMITS);
        Ok(Self::new(target, capacity))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn target(&self) -> &StorageTarget {
        &self.target
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        if self.is_open() {
            self.slots.available_permits()
        } else {
            0
        }
    }

    /// Take one connection slot, waiting while the pool is exhausted.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, StorageError> {
        if !self.is_open() {
            return Err(StorageError::Closed);
        }
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StorageError::Closed)
    }

    async fn check_reachable(&self) -> Result<(), LifecycleError> {
        let StorageTarget::Network { host, port } = &self.target else {
            return Ok(());
        };

        let connect = TcpStream::connect((host.as_str(), *port));
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(LifecycleError::Resource {
                resource: self.name(),
                message: format!("{host}:{port} unreachable: {e}"),
            }),
            Err(_) => Err(LifecycleError::Resource {
                resource: self.name(),
                message: format!(
                    "{host}:{port} did not accept a connection within {:?}",
                    self.connect_timeout
                ),
            }),
        }
    }
}

impl Resource for StoragePool {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn start(&self) -> BoxFuture<'_, Result<(), LifecycleError>> {
        async move {
            self.check_reachable().await?;
            self.slots.add_permits(self.capacity);
            self.open.store(true, Ordering::SeqCst);
            tracing::info!(target_addr = ?self.target, capacity = self.capacity, "Storage pool open");
            Ok(())
        }
        .boxed()
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), LifecycleError>> {
        async move {
            self.open.store(false, Ordering::SeqCst);
            self.slots.close();
            tracing::info!("Storage pool closed");
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_default_ports() {
        assert_eq!(
            StorageTarget::parse("postgresql+asyncpg://u:p@db.internal/app").unwrap(),
            StorageTarget::Network {
                host: "db.internal".to_string(),
                port: 5432
            }
        );
        assert_eq!(
            StorageTarget::parse("mysql://db:3307/app").unwrap(),
            StorageTarget::Network {
                host: "db".to_string(),
                port: 3307
            }
        );
        assert!(matches!(
            StorageTarget::parse("sqlite:///tmp/app.db").unwrap(),
            StorageTarget::Local { .. }
        ));
        assert!(StorageTarget::parse("ftp://files/app").is_err());
    }

    #[test]
    fn test_capacity_from_settings() {
        let settings = crate::test_support::settings();
        let pool = StoragePool::from_settings(&settings).unwrap();
        assert_eq!(
            pool.capacity(),
            (settings.database_pool_size + settings.database_max_overflow) as usize
        );
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_capacity_does_not_overflow() {
        let mut vars = crate::test_support::vars();
        vars.push(("DATABASE_POOL_SIZE", "4294967295"));
        vars.push(("DATABASE_MAX_OVERFLOW", "10"));
        let settings = crate::config::ConfigLoader::from_vars(vars).load().unwrap();

        let pool = StoragePool::from_settings(&settings).unwrap();
        assert_eq!(
            pool.capacity(),
            (u32::MAX as usize + 10).min(Semaphore::MAX_PERMITS)
        );
    }

    #[tokio::test]
    async fn test_start_acquire_stop() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let pool = StoragePool::new(
            StorageTarget::Network {
                host: "127.0.0.1".to_string(),
                port,
            },
            2,
        );

        assert!(matches!(pool.acquire().await, Err(StorageError::Closed)));
        pool.start().await.unwrap();
        assert_eq!(pool.available(), 2);

        let slot = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 1);
        drop(slot);

        pool.stop().await.unwrap();
        assert!(matches!(pool.acquire().await, Err(StorageError::Closed)));
    }

    #[tokio::test]
    async fn test_unreachable_target_fails_start() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let pool = StoragePool::new(
            StorageTarget::Network {
                host: "127.0.0.1".to_string(),
                port,
            },
            1,
        )
        .with_connect_timeout(Duration::from_millis(500));

        let err = pool.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Resource { resource: "storage", .. }));
        assert!(!pool.is_open());
    }
}
