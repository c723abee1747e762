//! HTTP request handlers.

use super::AppState;
use crate::db::{TargetConfig, NEW_TARGET_TITLE};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

// ============================================================================
// API: Targets
// ============================================================================

pub async fn handle_list_targets(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.list_targets())
}

/// Editable target fields. Anything left out is stored as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub check_interval: Option<f64>,
}

impl TargetRequest {
    fn into_config(self) -> TargetConfig {
        let mut config = TargetConfig::new();
        if let Some(enabled) = self.enabled {
            config.set_enabled_defaulted(enabled);
        }
        if let Some(title) = &self.title {
            config.set_title_defaulted(title);
        }
        if let Some(org) = &self.org {
            config.set_org(org);
        }
        if let Some(repo) = &self.repo {
            config.set_repo(repo);
        }
        if let Some(branch) = &self.branch {
            config.set_branch(branch);
        }
        if let Some(seconds) = self.check_interval {
            config.set_check_interval_defaulted(seconds);
        }
        config
    }
}

pub async fn handle_create_target(
    State(state): State<AppState>,
    Json(req): Json<TargetRequest>,
) -> impl IntoResponse {
    let mut config = req.into_config();
    if config.title.is_none() && config.org.is_none() {
        config.set_title_defaulted(NEW_TARGET_TITLE);
    }

    if !state.monitor.add_target(config.clone()) {
        return (StatusCode::CONFLICT, "Duplicate target").into_response();
    }
    (StatusCode::CREATED, Json(config)).into_response()
}

pub async fn handle_get_target(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    Json(state.monitor.get_target(id))
}

pub async fn handle_update_target(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TargetRequest>,
) -> impl IntoResponse {
    if state.monitor.edit_target(id, req.into_config()) {
        Json(state.monitor.get_target(id)).into_response()
    } else {
        (StatusCode::NOT_FOUND, "Target not found").into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub ids: Vec<Uuid>,
}

pub async fn handle_remove_targets(
    State(state): State<AppState>,
    Json(req): Json<RemoveRequest>,
) -> impl IntoResponse {
    let ids: HashSet<Uuid> = req.ids.into_iter().collect();
    let removed = state.monitor.remove_targets(&ids);
    Json(json!({ "removed": removed }))
}

pub async fn handle_delete_target(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if state.monitor.remove_targets(&HashSet::from([id])) > 0 {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub from: Vec<usize>,
    pub to: usize,
}

pub async fn handle_move_targets(
    State(state): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> impl IntoResponse {
    state.monitor.move_targets(&req.from, req.to);
    Json(state.monitor.list_targets())
}

// ============================================================================
// API: Status
// ============================================================================

pub async fn handle_get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.monitor.get_status(id) {
        Some(status) => Json(status).into_response(),
        None => Json(json!({ "state": "none" })).into_response(),
    }
}

pub async fn handle_get_raw(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.monitor.read_raw(id) {
        Some(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn handle_check_now(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if !state.monitor.contains(id) {
        return (StatusCode::NOT_FOUND, "Target not found").into_response();
    }

    match state.monitor.check_now(id) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "state": "pending" }))).into_response(),
        Err(e) => (StatusCode::CONFLICT, e.to_string()).into_response(),
    }
}

pub async fn handle_cancel_check(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    Json(json!({ "cancelled": state.monitor.cancel_check(id) }))
}

pub async fn handle_check_all(State(state): State<AppState>) -> impl IntoResponse {
    let started = state.monitor.check_all();
    (StatusCode::ACCEPTED, Json(json!({ "started": started })))
}
