//! HTTP surface of the record store
//!
//! `POST /instances` and `POST /containers` upsert one record each and answer
//! 201 with the resulting record, 400 on missing required fields, 409 on a
//! concurrent uniqueness conflict (transient; callers re-push once). The GET
//! endpoints return the full collections for inspection and tests.

use crate::store::{EntityRecord, ProjectRecord, SessionRecord, Store};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rekuper_core::{Error, RecordPayload, ResourceKind, Result};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

type ApiError = (StatusCode, Json<serde_json::Value>);

pub fn app(store: Arc<Store>) -> Router {
    Router::new()
        .route("/instances", get(list_instances).post(create_instance))
        .route("/containers", get(list_containers).post(create_container))
        .route("/sessions", get(list_sessions))
        .route("/projects", get(list_projects))
        .with_state(store)
}

/// Bind and serve until the process is stopped.
pub async fn serve(store: Arc<Store>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("cannot bind {addr}: {e}")))?;
    info!(addr, "record store listening");
    axum::serve(listener, app(store))
        .await
        .map_err(|e| Error::Internal(format!("server error: {e}")))
}

async fn create_instance(
    State(store): State<Arc<Store>>,
    Json(payload): Json<RecordPayload>,
) -> std::result::Result<(StatusCode, Json<EntityRecord>), ApiError> {
    upsert(&store, ResourceKind::Instance, &payload)
}

async fn create_container(
    State(store): State<Arc<Store>>,
    Json(payload): Json<RecordPayload>,
) -> std::result::Result<(StatusCode, Json<EntityRecord>), ApiError> {
    upsert(&store, ResourceKind::Container, &payload)
}

fn upsert(
    store: &Store,
    kind: ResourceKind,
    payload: &RecordPayload,
) -> std::result::Result<(StatusCode, Json<EntityRecord>), ApiError> {
    match store.upsert(kind, payload) {
        Ok(record) => Ok((StatusCode::CREATED, Json(record))),
        Err(err) => Err(map_error(err)),
    }
}

async fn list_instances(
    State(store): State<Arc<Store>>,
) -> std::result::Result<Json<Vec<EntityRecord>>, ApiError> {
    store
        .list(ResourceKind::Instance)
        .map(Json)
        .map_err(map_error)
}

async fn list_containers(
    State(store): State<Arc<Store>>,
) -> std::result::Result<Json<Vec<EntityRecord>>, ApiError> {
    store
        .list(ResourceKind::Container)
        .map(Json)
        .map_err(map_error)
}

async fn list_sessions(
    State(store): State<Arc<Store>>,
) -> std::result::Result<Json<Vec<SessionRecord>>, ApiError> {
    store.list_sessions().map(Json).map_err(map_error)
}

async fn list_projects(
    State(store): State<Arc<Store>>,
) -> std::result::Result<Json<Vec<ProjectRecord>>, ApiError> {
    store.list_projects().map(Json).map_err(map_error)
}

fn map_error(err: Error) -> ApiError {
    let status = match &err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "message": err.to_string() })))
}
