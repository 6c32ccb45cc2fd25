//! Thin HTTP surface over a `DownloadManager` — mirrors `rdm_server::server`'s
//! `AppState` + `axum::Router` + CORS + SSE shape, generalized from tracking
//! one video download to exposing the manager's full operation set
//! (`spec.md` §4.5: new-download, new-share-download, trigger/resume, pause,
//! cancel, delete, query) plus a per-task progress stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use tower_http::cors::CorsLayer;

use swarmdl_core::model::{FileStatus, ManagerError, TaskId};
use swarmdl_core::store::FileRecordFilter;

use crate::hex;
use crate::types::{
    ErrorResponse, NewDownloadRequest, NewShareDownloadRequest, QueryParams, QueryResponse, TaskIdResponse,
};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<swarmdl_core::manager::DownloadManager>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/downloads", post(new_download).get(list_downloads))
        .route("/downloads/share", post(new_share_download))
        .route("/downloads/{id}/pause", post(pause))
        .route("/downloads/{id}/resume", post(resume))
        .route("/downloads/{id}/cancel", post(cancel))
        .route("/downloads/{id}", axum::routing::delete(delete))
        .route("/downloads/{id}/events", get(events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn manager_error_response(err: ManagerError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        ManagerError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        ManagerError::AlreadyDownloading(_)
        | ManagerError::InvalidTransition { .. }
        | ManagerError::InsufficientPeers { .. }
        | ManagerError::MaxConcurrencyReached => StatusCode::CONFLICT,
        ManagerError::DispatchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ManagerError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: err.to_string() }))
}

async fn new_download(
    State(state): State<AppState>,
    Json(req): Json<NewDownloadRequest>,
) -> impl IntoResponse {
    let owner_key = match req.owner_private_key_hex.as_deref().map(hex::decode).transpose() {
        Ok(k) => k.unwrap_or_default(),
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: e })).into_response(),
    };
    match state.manager.new_download(&owner_key, req.file_id.into(), req.destination_dir).await {
        Ok(task_id) => Json(TaskIdResponse { task_id: task_id.to_string() }).into_response(),
        Err(e) => manager_error_response(e).into_response(),
    }
}

async fn new_share_download(
    State(state): State<AppState>,
    Json(req): Json<NewShareDownloadRequest>,
) -> impl IntoResponse {
    let key_share = match hex::decode(&req.key_share_hex) {
        Ok(b) => b,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: e })).into_response(),
    };
    let owner_pubkey_hash = match hex::decode(&req.owner_pubkey_hash_hex) {
        Ok(b) => b,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: e })).into_response(),
    };
    match state
        .manager
        .new_share_download(req.file_id.into(), key_share, owner_pubkey_hash, req.destination_dir)
        .await
    {
        Ok(task_id) => Json(TaskIdResponse { task_id: task_id.to_string() }).into_response(),
        Err(e) => manager_error_response(e).into_response(),
    }
}

async fn pause(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.manager.pause(&TaskId::from(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => manager_error_response(e).into_response(),
    }
}

async fn resume(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.manager.resume(&TaskId::from(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => manager_error_response(e).into_response(),
    }
}

async fn cancel(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.manager.cancel(&TaskId::from(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => manager_error_response(e).into_response(),
    }
}

async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.manager.delete(&TaskId::from(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => manager_error_response(e).into_response(),
    }
}

async fn list_downloads(State(state): State<AppState>, Query(params): Query<QueryParams>) -> impl IntoResponse {
    let filter = FileRecordFilter { status: params.status.as_deref().and_then(parse_status) };
    match state.manager.query(params.start, params.page_size, filter).await {
        Ok((records, total)) => {
            Json(QueryResponse { records, total, start: params.start, page_size: params.page_size }).into_response()
        }
        Err(e) => manager_error_response(e).into_response(),
    }
}

fn parse_status(s: &str) -> Option<FileStatus> {
    match s.to_ascii_lowercase().as_str() {
        "pending" => Some(FileStatus::Pending),
        "fetching-info" | "fetchinginfo" => Some(FileStatus::FetchingInfo),
        "downloading" => Some(FileStatus::Downloading),
        "paused" => Some(FileStatus::Paused),
        "completed" => Some(FileStatus::Completed),
        "cancelled" | "canceled" => Some(FileStatus::Cancelled),
        "failed" => Some(FileStatus::Failed),
        _ => None,
    }
}

/// SSE progress stream for one task — merges the manager's status and error
/// broadcast channels, filters to `id`, and closes the stream once the task
/// reaches a terminal event. Shape mirrors `rdm_server::server`'s `/progress`
/// SSE handler, built over a `broadcast` receiver instead of a `watch`.
async fn events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let task_id = TaskId::from(id);
    let mut status_rx = state.manager.subscribe_status();
    let mut error_rx = state.manager.subscribe_errors();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                status = status_rx.recv() => {
                    match status {
                        Ok(event) if event.task_id == task_id => {
                            let complete = event.is_complete;
                            if let Ok(json) = serde_json::to_string(&event) {
                                yield Ok(Event::default().event("status").data(json));
                            }
                            if complete {
                                break;
                            }
                        }
                        Ok(_) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                error = error_rx.recv() => {
                    match error {
                        Ok((tid, err)) if tid == task_id => {
                            yield Ok(Event::default().event("error").data(err.to_string()));
                            break;
                        }
                        Ok(_) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)))
}
