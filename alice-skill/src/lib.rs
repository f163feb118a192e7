//! Alice Skill - voice assistant webhook that defers slow answers.
//!
//! The platform gives a skill a few seconds to respond, but language-model
//! answers routinely take longer. Each turn starts the backend query in the
//! background and waits a short bound; answers that miss it are parked on
//! the session and delivered when the user speaks again.
//!
//! ## Architecture
//!
//! ```text
//! Platform → POST / → TurnOrchestrator → SessionStore
//!                           ↓                  ↑
//!                     spawn Oracle.query ── PendingReply
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod message;
pub mod oracle;
pub mod orchestrator;
pub mod pending;
pub mod routes;
pub mod session;

// Re-export commonly used types
pub use message::{AliceRequest, AliceResponse};
pub use oracle::{OpenAiOracle, Oracle, OracleError, OracleResult, Reply};
pub use orchestrator::{normalize_utterance, TurnOrchestrator, TurnReply};
pub use pending::{PendingReply, ReplySender};
pub use routes::{build_router, SkillState};
pub use session::{InFlight, Session, SessionStore, StoreError};

use alice_common::config::Config;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;

/// Build the application router and its session store from configuration.
pub fn build_app(
    config: &Config,
    oracle: Arc<dyn Oracle>,
) -> anyhow::Result<(axum::Router, Arc<SessionStore>)> {
    let store = Arc::new(
        SessionStore::new(&config.sessions).context("Failed to initialise session store")?,
    );
    let orchestrator = Arc::new(TurnOrchestrator::new(store.clone(), oracle, config));
    let router = build_router(
        SkillState::new(orchestrator),
        config.dialog.platform_deadline(),
    );
    Ok((router, store))
}

/// Start the skill HTTP server and run until SIGINT/SIGTERM.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .listen_address()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_address()))?;

    let oracle = OpenAiOracle::new(&config.oracle).context("Failed to create oracle client")?;
    tracing::info!(
        oracle = oracle.name(),
        model = %config.oracle.model,
        endpoint = %config.oracle.endpoint,
        "Oracle configured"
    );

    let (router, store) = build_app(config, Arc::new(oracle))?;
    store.start_sweeper();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Starting Alice skill on {}", addr);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    let result = tokio::select! {
        served = &mut server => served_result(served),
        signal = shutdown_signal() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "Failed to listen for shutdown signals");
            }
            let _ = stop_tx.send(());
            let grace = std::time::Duration::from_secs(config.network.shutdown_grace_secs);
            match tokio::time::timeout(grace, &mut server).await {
                Ok(served) => served_result(served),
                Err(_) => {
                    tracing::warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out");
                    server.abort();
                    Ok(())
                }
            }
        }
    };

    store.shutdown();
    tracing::info!("Alice skill stopped");
    result
}

fn served_result(
    served: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    served
        .context("Server task failed")
        .and_then(|result| result.context("Server error"))
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
    }
    Ok(())
}
