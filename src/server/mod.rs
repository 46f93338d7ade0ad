//! HTTP server for the chat API.
//!
//! Provides endpoints for:
//! - Streaming chat turns over server-sent events
//! - Conversation creation
//! - Conversation history

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Router with permissive CORS and per-request tracing.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener on all interfaces.
///
/// # Errors
/// Returns an error if the port cannot be bound.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await
}

/// Serve the chat API on `listener` until `shutdown_signal` completes.
///
/// New connections are refused after the signal; in-flight streams are
/// allowed to finish.
///
/// # Errors
/// Returns an error if serving fails.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("ragchat server listening on http://{}", addr);
    }

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal)
        .await
}
