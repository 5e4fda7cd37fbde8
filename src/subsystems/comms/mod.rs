//! Comms subsystem — the axum HTTP channel in front of the consolidation engine.
//!
//! ## URL layout
//!
//! ```text
//! POST /identify   — consolidate an email / phone number
//! GET  /health     — liveness
//! ```
//!
//! The engine is synchronous and may block on the database lock, so every
//! identify call runs on tokio's blocking pool.

mod api;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::subsystems::identity::ConsolidationEngine;
use crate::subsystems::store::ContactStore;

// ── Shared request state ──────────────────────────────────────────────────────

/// Router state injected into every handler via [`axum::extract::State`].
pub(crate) struct ApiState<S> {
    pub engine: Arc<ConsolidationEngine<S>>,
}

// Manual impl: `S` itself need not be `Clone`.
impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn build_router<S>(engine: Arc<ConsolidationEngine<S>>) -> Router
where
    S: ContactStore + 'static,
{
    Router::new()
        .route("/identify", post(api::identify::<S>))
        .route("/health",   get(api::health))
        .with_state(ApiState { engine })
}

// ── Server loop ───────────────────────────────────────────────────────────────

/// Bind `bind_addr` and serve until `shutdown` is cancelled.
pub async fn serve<S>(
    bind_addr: &str,
    engine: Arc<ConsolidationEngine<S>>,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    S: ContactStore + 'static,
{
    let backend = engine.store().backend();
    let router = build_router(engine);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind_addr}: {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| AppError::Server(format!("local address unavailable: {e}")))?;

    info!(%local_addr, backend, "identity service listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(format!("axum server error: {e}")))?;

    info!("identity service shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::subsystems::store::MemoryStore;

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let engine = Arc::new(ConsolidationEngine::new(MemoryStore::new()));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve("127.0.0.1:0", engine, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked");
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn serve_reports_bad_bind_address() {
        let engine = Arc::new(ConsolidationEngine::new(MemoryStore::new()));
        let err = serve("not-an-address", engine, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bind failed"), "{err}");
    }
}
