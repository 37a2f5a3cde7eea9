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

//! Sessions API - status of individual generation runs

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use reflow_core::SessionState;
use serde::Serialize;
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::auth::AuthContext;

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: Uuid,
    pub conversation_id: Uuid,
    pub state: SessionState,
    pub chunk_count: usize,
    pub created_at_us: u64,
    pub last_activity_us: u64,
}

/// GET /api/v1/sessions/:session_id - Session status and chunk count
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let snapshot = state
        .chunk_store
        .read(session_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", session_id)))?;

    if snapshot.session.tenant_id != auth.tenant_id {
        return Err(ApiError::Forbidden);
    }

    Ok(Json(SessionStatusResponse {
        session_id: snapshot.session.session_id,
        conversation_id: snapshot.session.conversation_id,
        state: snapshot.session.state,
        chunk_count: snapshot.chunks.len(),
        created_at_us: snapshot.session.created_at_us,
        last_activity_us: snapshot.session.last_activity_us,
    }))
}
