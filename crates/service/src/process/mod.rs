pub mod utils;

use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use common::sync::{reconcile, run_worker};

use crate::{Config, ConfigError, FileService, ServiceState, StateSetupError};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle for gracefully shutting down the service.
pub struct ShutdownHandle {
    graceful_waiter: tokio::task::JoinHandle<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
    shutdown_tx: watch::Sender<()>,
    state: ServiceState,
}

impl ShutdownHandle {
    /// Block until the service shuts down (via signal or explicit shutdown),
    /// then persist every tenant one last time.
    pub async fn wait(self) {
        shutdown_and_join(self.graceful_waiter, self.handles).await;
        flush_all(&self.state).await;
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Initialize logging and the panic handler.
/// Returns guards that must be kept alive for the duration of the program.
pub fn init_logging(
    config: &Config,
) -> Result<Vec<tracing_appender::non_blocking::WorkerGuard>, ConfigError> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let level = config.log_level()?;
    let mut guards = Vec::new();

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    if let Some(log_dir) = &config.log_dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, "fileengine.log");
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stdout_layer).init();
    }

    utils::register_panic_logger();
    utils::report_startup(config);

    Ok(guards)
}

/// Wait for shutdown and join all handles with timeout.
async fn shutdown_and_join(
    graceful_waiter: tokio::task::JoinHandle<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
) {
    let _ = graceful_waiter.await;

    if timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(handles))
        .await
        .is_err()
    {
        tracing::error!(
            "Failed to shut down within {} seconds",
            FINAL_SHUTDOWN_TIMEOUT.as_secs()
        );
        std::process::exit(4);
    }
}

/// Persist every tenant the engine knows about
async fn flush_all(state: &ServiceState) {
    for tenant in state.engine().tenants() {
        match reconcile(state.engine(), state.store(), &tenant).await {
            Ok(report) => tracing::info!(
                "final sync of tenant {}: {} nodes, {} blobs written",
                tenant,
                report.nodes,
                report.blobs_written
            ),
            Err(e) => tracing::error!("final sync of tenant {} failed: {}", tenant, e),
        }
    }
}

/// Create state and spawn the sync worker, returning the request surface.
///
/// The returned `ShutdownHandle` must be kept alive; dropping it does not stop the service.
pub async fn start_service(
    config: &Config,
) -> Result<(FileService, ShutdownHandle), StateSetupError> {
    let (graceful_waiter, shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker();
    let (state, jobs) = ServiceState::from_config(config).await?;

    let mut handles = Vec::new();

    let engine = state.engine().clone();
    let store = state.store().clone();
    let sync_rx = shutdown_rx.clone();
    let sync_handle = tokio::spawn(async move {
        run_worker(engine, store, jobs, sync_rx).await;
    });
    handles.push(sync_handle);

    tracing::info!("Running: engine with {} configured tenant(s)", config.tenants.len());

    let handle = ShutdownHandle {
        graceful_waiter,
        handles,
        shutdown_tx,
        state: state.clone(),
    };

    let service = FileService::with_upload_timeout(state, config.upload_timeout());
    Ok((service, handle))
}

/// Runs the service until a shutdown signal is received.
pub async fn spawn_service(config: &Config) {
    let _guards = match init_logging(config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("error initializing logging: {}", e);
            std::process::exit(2);
        }
    };
    let (_, handle) = match start_service(config).await {
        Ok(started) => started,
        Err(e) => {
            tracing::error!("error creating server state: {}", e);
            std::process::exit(3);
        }
    };
    handle.wait().await;
}
