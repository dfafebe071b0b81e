use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use repo_events::config::ServiceConfig;
use repo_events::dispatcher::{DispatcherConfig, JournalController, RepoEventDispatcher};
use repo_events::orchestrator::{Orchestrator, OrchestratorConfig};
use repo_events::server::{AppState, build_router};
use repo_events::store::fsync::ensure_dir;
use repo_events::store::{JournalStore, Store};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repo_events=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Service failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    ensure_dir(&config.state_dir)
        .with_context(|| format!("creating state dir {}", config.state_dir.display()))?;

    let store: Arc<dyn Store> = Arc::new(
        JournalStore::open(config.state_dir.join("store.log"))
            .await
            .context("opening store journal")?,
    );
    let controller = Arc::new(
        JournalController::open(config.state_dir.join("controller.log"))
            .context("opening controller journal")?,
    );

    let shutdown = CancellationToken::new();
    let orchestrator = Arc::new(Orchestrator::new_with_shutdown(
        OrchestratorConfig::new(&config.state_dir, config.activity_timeout)
            .with_dedupe_window(config.dedupe_window),
        store.clone(),
        shutdown.child_token(),
    ));
    let dispatcher = Arc::new(RepoEventDispatcher::open_with_shutdown(
        DispatcherConfig::new(&config.state_dir, config.activity_timeout)
            .with_dedupe_window(config.dedupe_window),
        store.clone(),
        controller,
        shutdown.child_token(),
    )
    .context("opening repository event journal")?);

    let resumed = dispatcher.resume_pending().await;
    if resumed > 0 {
        info!(resumed, "Resumed pending repository events");
    }

    let app = build_router(AppState::new(
        config.webhook_secret.clone(),
        store,
        orchestrator.clone(),
        dispatcher.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!("listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    orchestrator.shutdown_all().await;
    dispatcher.shutdown_all().await;
    info!("Shut down cleanly");
    Ok(())
}
