//! Service bootstrap binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     .env + environment ──▶ ConfigLoader ──▶ Settings
//!                                               │
//!                   ┌───────────────────────────┼──────────────────────┐
//!                   ▼                           ▼                      ▼
//!            LifecycleManager            Pipeline::compose        logging::init
//!         (storage, exporter)     origin → host → guard →
//!                   │               logger → metrics → router
//!                   ▼                           │
//!            bind listener ──▶ Running ◀────────┘
//!                   │
//!        SIGINT/SIGTERM ──▶ Stopping ──▶ drain ──▶ stop resources ──▶ Stopped
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use service_bootstrap::config::ConfigLoader;
use service_bootstrap::lifecycle::{shutdown_signal, Application};
use service_bootstrap::observability::logging;

#[derive(Parser)]
#[command(name = "service-bootstrap")]
#[command(about = "Configured HTTP service with a fixed request pipeline", long_about = None)]
struct Cli {
    /// Env file read before the process environment (missing file is ignored)
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Validate configuration, print a redacted summary and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match ConfigLoader::from_env_with_dotenv(&cli.env_file).and_then(|l| l.load()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init_fallback();
            tracing::error!(error = %e, "Invalid configuration, refusing to start");
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        match serde_json::to_string_pretty(settings.as_ref()) {
            Ok(summary) => {
                println!("{summary}");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                eprintln!("failed to render settings: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    logging::init(&settings);
    tracing::info!(
        service = %settings.project_name,
        version = %settings.version,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let app = match Application::builder(Arc::clone(&settings))
        .metrics_listener(true)
        .build()
    {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Failed to assemble service");
            return ExitCode::FAILURE;
        }
    };

    let running = match app.start().await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    match running.run_until(shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Service stopped with an error");
            ExitCode::FAILURE
        }
    }
}
