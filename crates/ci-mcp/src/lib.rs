//! MCP Server (spec.md §4.8): the HTTP surface exposing the Registry Store,
//! Unified Router, Tool Supervisor and Health Monitor as a single JSON/SSE
//! API under `/api/mcp/v2`. This crate owns HTTP routing, SSE framing, and
//! error-envelope construction; every handler delegates to one of the
//! component crates (spec.md §4.8 "the server is the only place...").

mod error;
mod handlers;
mod router;
mod state;

pub use error::{McpError, McpResult};
pub use router::{build_router, CorsPolicy};
pub use state::AppState;

use std::net::SocketAddr;

/// Bind and serve the router until the process receives a shutdown signal
/// or `shutdown` resolves, whichever comes first.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    cors: CorsPolicy,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(state, cors);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "ci-mcp listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
