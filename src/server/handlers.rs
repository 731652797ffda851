//! HTTP API handlers

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::warn;

use crate::device::DeviceInfo;
use crate::error::DeviceError;
use crate::server::AppState;
use crate::session::SessionSnapshot;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// System status
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub uptime_seconds: u64,
    pub active_sessions: usize,
}

/// Get system status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let status = SystemStatus {
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_sessions: state.registry.len(),
    };

    Json(ApiResponse::ok(status))
}

/// List cameras known to the device API
pub async fn get_devices(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<Vec<DeviceInfo>>>) {
    match state.api.list_devices().await {
        Ok(devices) => (StatusCode::OK, Json(ApiResponse::ok(devices))),
        Err(e) => {
            warn!("Listing devices failed: {}", e);
            (StatusCode::BAD_GATEWAY, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Current still image of one camera
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Response {
    let result = match state.api.find_device(&device_id).await {
        Ok(device) => state.api.snapshot(&device).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        Err(e @ DeviceError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, Json(ApiResponse::<()>::error(e.to_string()))).into_response()
        }
        Err(e) => {
            warn!(device_id = %device_id, "Snapshot failed: {}", e);
            (StatusCode::BAD_GATEWAY, Json(ApiResponse::<()>::error(e.to_string()))).into_response()
        }
    }
}

/// Active relays, oldest first
pub async fn get_sessions(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<SessionSnapshot>>> {
    Json(ApiResponse::ok(state.registry.list()))
}
