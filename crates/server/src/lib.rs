//! The REST façade the node exposes.
//!
//! Thin handlers over the catalog, the CAS engine and the ledger; every
//! failure maps to one of the stable error codes {invalid, not_found,
//! conflict, integrity, unavailable}.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use strata_cas::CasEngine;
use strata_catalog::SharedCatalog;
use strata_ledger::Ledger;
use strata_network::NetworkClient;
use strata_primitives::NodeId;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;
pub mod handlers;

pub use error::{ApiError, ErrorCode};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub node_id: NodeId,
    pub catalog: SharedCatalog,
    pub cas: CasEngine,
    pub ledger: Ledger,
    pub network: NetworkClient,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/catalog/snapshots",
            get(handlers::list_snapshots),
        )
        .route(
            "/catalog/snapshots/:id",
            post(handlers::add_snapshot)
                .get(handlers::get_snapshot)
                .delete(handlers::remove_snapshot),
        )
        .route(
            "/crdt/deltas",
            get(handlers::pending_deltas).post(handlers::apply_delta),
        )
        .route("/cas/objects", post(handlers::store_object))
        .route("/cas/objects/:root", get(handlers::get_object))
        .route("/gcl/tx", post(handlers::submit_tx))
        .route("/gcl/blocks/:height", get(handlers::get_block))
        .route("/gcl/tx/:hash/proof", get(handlers::get_proof))
        .route("/status", get(handlers::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves until cancellation.
pub async fn serve(
    state: AppState,
    listen: SocketAddr,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!(%listen, "api listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
