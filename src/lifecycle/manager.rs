//! Resource startup/shutdown sequencing.
//!
//! # Responsibilities
//! - Drive the lifecycle state machine
//! - Start resources in registration order before traffic is accepted
//! - Stop started resources in reverse order
//! - Publish the current state to observers
//!
//! # Design Decisions
//! - Any startup failure is fatal; partial startup is rolled back
//! - Shutdown failures are logged and never block the exit path
//! - State is published through a `watch` channel so readers never lock

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::watch;

use crate::lifecycle::state::LifecycleState;

/// Failure while moving through the lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("resource '{resource}' failed: {message}")]
    Resource {
        resource: &'static str,
        message: String,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
}

/// Something that must be running before the service accepts traffic.
pub trait Resource: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn start(&self) -> BoxFuture<'_, Result<(), LifecycleError>>;

    fn stop(&self) -> BoxFuture<'_, Result<(), LifecycleError>>;
}

/// Read-only view of the lifecycle state.
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    rx: watch::Receiver<LifecycleState>,
}

impl LifecycleHandle {
    pub fn current(&self) -> LifecycleState {
        *self.rx.borrow()
    }

    /// Wait until the state reaches `target` or any later state.
    pub async fn wait_for(&self, target: LifecycleState) -> LifecycleState {
        let mut rx = self.rx.clone();
        let reached = rx
            .wait_for(|state| *state >= target)
            .await
            .map(|state| *state)
            .ok();
        reached.unwrap_or_else(|| *rx.borrow())
    }
}

/// Owns the registered resources and the state machine.
pub struct LifecycleManager {
    state: watch::Sender<LifecycleState>,
    resources: Vec<Arc<dyn Resource>>,
    started: AtomicUsize,
}

impl LifecycleManager {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        Self {
            state,
            resources: Vec::new(),
            started: AtomicUsize::new(0),
        }
    }

    /// Resources start in the order they are registered.
    pub fn register(&mut self, resource: Arc<dyn Resource>) {
        self.resources.push(resource);
    }

    pub fn resource_names(&self) -> Vec<&'static str> {
        self.resources.iter().map(|r| r.name()).collect()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn handle(&self) -> LifecycleHandle {
        LifecycleHandle {
            rx: self.state.subscribe(),
        }
    }

    fn transition(&self, to: LifecycleState) -> Result<(), LifecycleError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|current| {
            if current.can_transition_to(to) {
                tracing::info!(from = %current, to = %to, "Lifecycle transition");
                *current = to;
                true
            } else {
                outcome = Err(LifecycleError::InvalidTransition { from: *current, to });
                false
            }
        });
        outcome
    }

    /// `Created → Starting`, then start every resource.
    ///
    /// On failure the resources already started are stopped and the state
    /// ends in `Stopped`.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.transition(LifecycleState::Starting)?;

        for resource in &self.resources {
            tracing::info!(resource = resource.name(), "Starting resource");
            if let Err(e) = resource.start().await {
                tracing::error!(resource = resource.name(), error = %e, "Resource failed to start");
                self.abort().await;
                return Err(e);
            }
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        Ok(())
    }

    /// `Starting → Running`. Call once the listener is bound.
    pub fn mark_running(&self) -> Result<(), LifecycleError> {
        self.transition(LifecycleState::Running)
    }

    /// Roll back a startup that cannot complete.
    pub async fn abort(&self) {
        if let Err(e) = self.transition(LifecycleState::Stopping) {
            tracing::warn!(error = %e, "Abort outside of startup");
            return;
        }
        self.stop_started().await;
        let _ = self.transition(LifecycleState::Stopped);
    }

    /// `Running → Stopping`. Idempotent once stopping has begun.
    pub fn begin_shutdown(&self) -> Result<(), LifecycleError> {
        match self.state() {
            LifecycleState::Stopping | LifecycleState::Stopped => Ok(()),
            _ => self.transition(LifecycleState::Stopping),
        }
    }

    /// Stop resources in reverse order, then `Stopping → Stopped`.
    pub async fn shutdown(&self) -> Result<(), LifecycleError> {
        self.begin_shutdown()?;
        if self.state() == LifecycleState::Stopped {
            return Ok(());
        }
        self.stop_started().await;
        self.transition(LifecycleState::Stopped)
    }

    async fn stop_started(&self) {
        let started = self.started.swap(0, Ordering::SeqCst);
        for resource in self.resources[..started].iter().rev() {
            match resource.stop().await {
                Ok(()) => tracing::info!(resource = resource.name(), "Resource stopped"),
                Err(e) => {
                    tracing::warn!(resource = resource.name(), error = %e, "Resource failed to stop")
                }
            }
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::Mutex;

    struct Probe {
        name: &'static str,
        fail_start: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Resource for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn start(&self) -> BoxFuture<'_, Result<(), LifecycleError>> {
            async move {
                self.log.lock().unwrap().push(format!("start:{}", self.name));
                if self.fail_start {
                    return Err(LifecycleError::Resource {
                        resource: self.name,
                        message: "unreachable".to_string(),
                    });
                }
                Ok(())
            }
            .boxed()
        }

        fn stop(&self) -> BoxFuture<'_, Result<(), LifecycleError>> {
            async move {
                self.log.lock().unwrap().push(format!("stop:{}", self.name));
                Err(LifecycleError::Resource {
                    resource: self.name,
                    message: "already closed".to_string(),
                })
            }
            .boxed()
        }
    }

    fn manager(plan: &[(&'static str, bool)], log: &Arc<Mutex<Vec<String>>>) -> LifecycleManager {
        let mut manager = LifecycleManager::new();
        for &(name, fail_start) in plan {
            manager.register(Arc::new(Probe {
                name,
                fail_start,
                log: log.clone(),
            }));
        }
        manager
    }

    #[tokio::test]
    async fn test_full_lifecycle_orders_resources() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(&[("db", false), ("cache", false)], &log);
        let handle = manager.handle();

        manager.start().await.unwrap();
        assert_eq!(handle.current(), LifecycleState::Starting);
        manager.mark_running().unwrap();
        assert_eq!(handle.current(), LifecycleState::Running);

        // Stop failures are logged, not returned.
        manager.shutdown().await.unwrap();
        assert_eq!(handle.current(), LifecycleState::Stopped);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:db", "start:cache", "stop:cache", "stop:db"]
        );
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back_and_never_runs() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = manager(&[("db", false), ("cache", true), ("queue", false)], &log);

        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Resource { resource: "cache", .. }));
        assert_eq!(manager.state(), LifecycleState::Stopped);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:db", "start:cache", "stop:db"]
        );
        assert!(manager.mark_running().is_err());
    }

    #[tokio::test]
    async fn test_transitions_cannot_be_skipped() {
        let manager = LifecycleManager::new();
        let err = manager.mark_running().unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: LifecycleState::Created,
                to: LifecycleState::Running
            }
        ));
    }

    #[tokio::test]
    async fn test_wait_for_sees_later_states() {
        let manager = Arc::new(LifecycleManager::new());
        let handle = manager.handle();

        let waiter = tokio::spawn(async move { handle.wait_for(LifecycleState::Running).await });
        manager.start().await.unwrap();
        manager.mark_running().unwrap();

        assert_eq!(waiter.await.unwrap(), LifecycleState::Running);
    }
}
