use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use strata_catalog::{Delta, EntityRecord, Metadata};
use strata_ledger::{Block, CommitProof, Transaction};
use strata_primitives::Hash;
use tracing::warn;

use crate::error::{ApiError, ErrorCode};
use crate::AppState;

fn parse_hash(raw: &str) -> Result<Hash, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::invalid(format!("{raw} is not a 64-char hex digest")))
}

pub async fn add_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(metadata): Json<Metadata>,
) -> Result<Json<JsonValue>, ApiError> {
    if id.is_empty() {
        return Err(ApiError::invalid("snapshot id must not be empty"));
    }
    state.catalog.write().await.add_snapshot(&id, metadata)?;
    Ok(Json(json!({ "id": id, "status": "registered" })))
}

pub async fn remove_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    state.catalog.write().await.remove_snapshot(&id)?;
    Ok(Json(json!({ "id": id, "status": "removed" })))
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntityRecord>, ApiError> {
    let record = state.catalog.read().await.get_snapshot(&id);
    if !record.present && record.metadata.is_none() {
        return Err(ApiError::not_found(format!("snapshot {id} is unknown")));
    }
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct ListFilter {
    pub filter: Option<String>,
}

pub async fn list_snapshots(
    State(state): State<AppState>,
    Query(query): Query<ListFilter>,
) -> Json<Vec<EntityRecord>> {
    let records = state
        .catalog
        .read()
        .await
        .list_snapshots(query.filter.as_deref());
    Json(records)
}

pub async fn pending_deltas(State(state): State<AppState>) -> Json<Vec<Delta>> {
    Json(state.catalog.read().await.pending_deltas())
}

#[derive(Debug, Serialize)]
pub struct ApplyResponse {
    pub status: &'static str,
}

pub async fn apply_delta(
    State(state): State<AppState>,
    Json(delta): Json<Delta>,
) -> Result<Json<ApplyResponse>, ApiError> {
    // Verification is mandatory before application; unknown origins are
    // rejected outright.
    let public = state
        .ledger
        .public_key_of(&delta.body.origin)
        .ok_or_else(|| {
            ApiError::invalid(format!("origin {} has no known key", delta.body.origin))
        })?;
    if delta.verify(&public).is_err() {
        warn!(origin = %delta.body.origin, "rejecting delta with bad signature");
        return Err(ApiError::new(
            ErrorCode::Integrity,
            "delta signature does not verify",
        ));
    }

    let applied = state.catalog.write().await.apply_delta(&delta)?;
    Ok(Json(ApplyResponse {
        status: if applied { "applied" } else { "duplicate" },
    }))
}

pub async fn store_object(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<strata_cas::ObjectInfo>, ApiError> {
    let info = state.cas.store(body.as_ref(), Metadata::new()).await?;
    Ok(Json(info))
}

pub async fn get_object(
    State(state): State<AppState>,
    Path(root): Path<String>,
) -> Result<Bytes, ApiError> {
    let root = parse_hash(&root)?;
    let bytes = state.cas.retrieve_bytes(root).await?;
    Ok(Bytes::from(bytes))
}

pub async fn submit_tx(
    State(state): State<AppState>,
    Json(tx): Json<Transaction>,
) -> Result<Json<JsonValue>, ApiError> {
    let tx_hash = state.ledger.submit_tx(tx)?;
    Ok(Json(json!({ "tx_hash": tx_hash, "status": "pending" })))
}

pub async fn get_block(
    State(state): State<AppState>,
    Path(height): Path<u64>,
) -> Result<Json<Block>, ApiError> {
    Ok(Json(state.ledger.block(height)?))
}

pub async fn get_proof(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<CommitProof>, ApiError> {
    let tx_hash = parse_hash(&hash)?;
    Ok(Json(state.ledger.proof(&tx_hash)?))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub vector_clock: strata_crdt::VectorClock,
    pub catalog_root: Hash,
    pub last_block_height: u64,
    pub peer_count: usize,
}

pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let (vector_clock, catalog_root) = {
        let catalog = state.catalog.read().await;
        (catalog.clock().clone(), catalog.state_root())
    };
    let peer_count = state.network.peer_count().await.unwrap_or(0);

    Ok(Json(StatusResponse {
        node_id: state.node_id.to_string(),
        vector_clock,
        catalog_root,
        last_block_height: state.ledger.tip(),
        peer_count,
    }))
}
