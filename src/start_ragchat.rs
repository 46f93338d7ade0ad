//! Startup helpers for the ragchat server.

use std::process::ExitCode;

use anyhow::Context;

use crate::memory::core::config::ChatConfig;
use crate::server::{self, AppState};

/// Run the server until Ctrl+C (used by the `ragchat-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting ragchat v{}", env!("CARGO_PKG_VERSION"));

    match serve() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn serve() -> anyhow::Result<()> {
    let config = ChatConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        ollama = %config.llm.base_url,
        model = %config.llm.model,
        db = %config.storage.sqlite_path.display(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new().context("failed to create runtime")?;
    rt.block_on(async move {
        let port = config.server.port;
        let state = AppState::new(config)
            .await
            .context("failed to create state")?;
        let listener = server::bind(port)
            .await
            .with_context(|| format!("failed to bind port {port}"))?;
        server::serve(listener, state, shutdown_signal())
            .await
            .context("server failed")
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
