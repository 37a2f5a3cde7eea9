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

//! Conversations API - the resources streams hang off

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::auth::AuthContext;
use crate::conversation_registry::Conversation;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<Conversation>,
    pub total: usize,
}

/// POST /api/v1/conversations - Create a conversation
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    if req.title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let conversation = state.conversations.create(auth.tenant_id, req.title);
    debug!(conversation_id = %conversation.conversation_id, "conversation created");
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /api/v1/conversations/:conversation_id - Fetch conversation metadata
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = state
        .conversations
        .get(conversation_id)
        .ok_or_else(|| ApiError::NotFound(format!("Conversation {} not found", conversation_id)))?;

    if conversation.tenant_id != auth.tenant_id {
        return Err(ApiError::Forbidden);
    }

    Ok(Json(conversation))
}

/// GET /api/v1/conversations - List the caller's conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Json<ConversationsResponse> {
    let conversations = state.conversations.list_for_tenant(auth.tenant_id);
    let total = conversations.len();
    Json(ConversationsResponse {
        conversations,
        total,
    })
}
