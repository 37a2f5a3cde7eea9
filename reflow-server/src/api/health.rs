// Copyright 2025 Reflow Contributors (https://github.com/reflow-dev/reflow)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::api::AppState;

/// Health check response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage: StorageHealth,
    pub streams: StreamHealth,
}

#[derive(Debug, Serialize)]
pub struct StorageHealth {
    pub reachable: bool,
    pub retained_sessions: u64,
}

#[derive(Debug, Serialize)]
pub struct StreamHealth {
    pub active_streams: usize,
    pub conversations: usize,
}

/// GET /health - Liveness probe
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /api/v1/health - Detailed health check endpoint
pub async fn health_check_detailed(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");

    let (reachable, retained_sessions) = match state.chunk_store.session_count().await {
        Ok(count) => (true, count),
        Err(_) => (false, 0),
    };

    let health = HealthResponse {
        status: if reachable {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: StorageHealth {
            reachable,
            retained_sessions,
        },
        streams: StreamHealth {
            active_streams: state.streams.len(),
            conversations: state.conversations.count(),
        },
    };

    let status_code = if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}
