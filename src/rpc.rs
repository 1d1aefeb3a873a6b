use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::entry::LogIndex;
use crate::error::Error;
use crate::methods::StateMethods;
use crate::options::{ReadOptions, WriteOptions};
use crate::LogId;

/// Shared application state for the forwarding HTTP surface. Any
/// `StateMethods` implementation can sit behind it, local or itself
/// forwarding again -- the route handlers only depend on the trait.
#[derive(Clone)]
pub struct AppState {
    pub methods: Arc<dyn StateMethods>,
}

/// Builds the router exposing exactly the surface in spec.md §6: the
/// insert/remove/multi-remove/cmp-ex/multi-get/snapshot/wait-for-applied/
/// status paths under `/_api/prototype-state/{id}`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/_api/prototype-state/:id/insert", post(insert))
        .route("/_api/prototype-state/:id/entry/:key", delete(remove_one))
        .route("/_api/prototype-state/:id/multi-remove", delete(remove_many))
        .route("/_api/prototype-state/:id/cmp-ex", put(compare_exchange))
        .route("/_api/prototype-state/:id/multi-get", post(multi_get))
        .route("/_api/prototype-state/:id/snapshot", get(snapshot))
        .route("/_api/prototype-state/:id/wait-for-applied/:idx", get(wait_for_applied))
        .route("/_api/prototype-state/:id", get(status))
        .with_state(state)
}

#[derive(Debug, Deserialize, Default)]
struct WriteQuery {
    #[serde(rename = "waitForApplied", default)]
    wait_for_applied: Option<u8>,
    #[serde(rename = "waitForSync", default)]
    wait_for_sync: Option<u8>,
    #[serde(rename = "waitForCommit", default)]
    wait_for_commit: Option<u8>,
}

impl From<WriteQuery> for WriteOptions {
    fn from(q: WriteQuery) -> Self {
        WriteOptions {
            wait_for_applied: q.wait_for_applied.unwrap_or(0) != 0,
            wait_for_sync: q.wait_for_sync.unwrap_or(0) != 0,
            wait_for_commit: q.wait_for_commit.unwrap_or(0) != 0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ReadQuery {
    #[serde(rename = "waitForIndex", default)]
    wait_for_index: Option<u64>,
    #[serde(rename = "allowDirtyRead", default)]
    allow_dirty_read: Option<u8>,
    #[serde(rename = "readFrom", default)]
    read_from: Option<uuid::Uuid>,
}

impl From<ReadQuery> for ReadOptions {
    fn from(q: ReadQuery) -> Self {
        ReadOptions {
            wait_for_applied: q.wait_for_index.map(LogIndex),
            allow_dirty_read: q.allow_dirty_read.unwrap_or(0) != 0,
            read_from: q.read_from.map(crate::ParticipantId),
        }
    }
}

#[derive(Debug, Serialize)]
struct IndexResponse {
    index: u64,
}

#[derive(Debug, Serialize)]
struct ResultResponse<T> {
    result: T,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    id: String,
}

fn log_id_from_path(id: &str) -> Result<LogId, Response> {
    id.parse::<LogId>()
        .map_err(|_| (StatusCode::NOT_FOUND, "invalid log id").into_response())
}

fn map_error(err: Error) -> Response {
    match err {
        Error::NotLeader { .. } => (StatusCode::SERVICE_UNAVAILABLE, "not the leader").into_response(),
        Error::NotFollower => (StatusCode::SERVICE_UNAVAILABLE, "not a follower").into_response(),
        Error::PreconditionFailed => StatusCode::PRECONDITION_FAILED.into_response(),
        Error::NotFound => StatusCode::NOT_FOUND.into_response(),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}

async fn insert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WriteQuery>,
    Json(map): Json<HashMap<String, String>>,
) -> Response {
    let log_id = match log_id_from_path(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.methods.insert(log_id, map, query.into()).await {
        Ok(index) => Json(IndexResponse { index: index.value() }).into_response(),
        Err(err) => map_error(err),
    }
}

async fn remove_one(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
    Query(query): Query<WriteQuery>,
) -> Response {
    let log_id = match log_id_from_path(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.methods.remove(log_id, vec![key], query.into()).await {
        Ok(index) => Json(IndexResponse { index: index.value() }).into_response(),
        Err(err) => map_error(err),
    }
}

async fn remove_many(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WriteQuery>,
    Json(keys): Json<Vec<String>>,
) -> Response {
    let log_id = match log_id_from_path(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.methods.remove(log_id, keys, query.into()).await {
        Ok(index) => Json(IndexResponse { index: index.value() }).into_response(),
        Err(err) => map_error(err),
    }
}

#[derive(Debug, Deserialize)]
struct CasValue {
    #[serde(rename = "oldValue")]
    old_value: String,
    #[serde(rename = "newValue")]
    new_value: String,
}

async fn compare_exchange(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WriteQuery>,
    Json(body): Json<HashMap<String, CasValue>>,
) -> Response {
    let log_id = match log_id_from_path(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Some((key, cas)) = body.into_iter().next() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match state
        .methods
        .compare_exchange(log_id, key, cas.old_value, cas.new_value, query.into())
        .await
    {
        Ok(index) => Json(IndexResponse { index: index.value() }).into_response(),
        Err(err) => map_error(err),
    }
}

async fn multi_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ReadQuery>,
    Json(keys): Json<Vec<String>>,
) -> Response {
    let log_id = match log_id_from_path(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.methods.get_many(log_id, keys, query.into()).await {
        Ok(result) => Json(ResultResponse { result }).into_response(),
        Err(err) => map_error(err),
    }
}

async fn snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Response {
    let log_id = match log_id_from_path(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let wait_for_index = query.wait_for_index.map(LogIndex).unwrap_or(LogIndex::ZERO);
    match state.methods.get_snapshot(log_id, wait_for_index).await {
        Ok(result) => Json(ResultResponse { result }).into_response(),
        Err(err) => map_error(err),
    }
}

async fn wait_for_applied(
    State(state): State<AppState>,
    Path((id, idx)): Path<(String, u64)>,
) -> Response {
    let log_id = match log_id_from_path(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.methods.wait_for_applied(log_id, LogIndex(idx)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => map_error(err),
    }
}

async fn status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let log_id = match log_id_from_path(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.methods.status(log_id).await {
        Ok(_) => Json(ResultResponse { result: StatusResponse { id } }).into_response(),
        Err(err) => map_error(err),
    }
}
