// model-lifecycle-rs/src/main.rs
// Model lifecycle service: runs the background monitor until Ctrl-C.

use anyhow::Context;

use model_lifecycle::logging::{init_logging, LoggingConfig};
use model_lifecycle::{LifecycleConfig, LifecycleOrchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_path = config_rs::load_dotenv();
    init_logging(&LoggingConfig::from_env()).context("failed to initialize logging")?;
    if let Some(path) = dotenv_path {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    let config = LifecycleConfig::from_env();
    tracing::info!(
        model_types = ?config.model_types,
        backend_url = %config.backend_url,
        artifact_root = %config.artifact_root.display(),
        feedback_path = %config.feedback_path.display(),
        "starting model lifecycle service"
    );

    let orchestrator = LifecycleOrchestrator::from_config(config)
        .await
        .context("failed to build orchestrator")?;

    let schedules = orchestrator
        .install_default_schedules()
        .await
        .context("failed to install default schedules")?;
    if !schedules.is_empty() {
        tracing::info!(count = schedules.len(), "default schedules installed");
    }

    orchestrator.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    orchestrator.stop().await;
    Ok(())
}
