//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Settings → Build pipeline → Start resources (manager.rs)
//!     → Bind listener → Running
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stopping → Stop accepting → Drain requests
//!     → Stop resources (reverse order) → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: resources first, then listeners
//! - Ordered shutdown: stop accept, drain, release
//! - No state is skipped, including on a failed startup

pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use manager::{LifecycleError, LifecycleHandle, LifecycleManager, Resource};
pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{Application, ApplicationBuilder, RunningService, StartupError};
pub use state::LifecycleState;
