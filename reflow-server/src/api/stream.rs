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

//! Stream API - begin, resume, and clear conversation streams
//!
//! The live response and a resumed response share one framing: one SSE
//! event per fragment, flushed individually, so consumers need no
//! branching between the two paths.

use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use futures::{Stream, StreamExt};
use reflow_core::{ReflowError, StreamFragment, StreamSession};
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::auth::AuthContext;
use crate::conversation_registry::Conversation;
use crate::resumer::ResumeOutcome;

/// Response header carrying the session id of a freshly started stream.
pub const SESSION_ID_HEADER: &str = "x-reflow-session-id";

#[derive(Debug, Deserialize)]
pub struct StartStreamRequest {
    pub prompt: String,
}

fn authorized_conversation(
    state: &AppState,
    conversation_id: Uuid,
    auth: &AuthContext,
) -> Result<Conversation, ApiError> {
    let conversation = state
        .conversations
        .get(conversation_id)
        .ok_or_else(|| ApiError::NotFound(format!("Conversation {} not found", conversation_id)))?;
    if conversation.tenant_id != auth.tenant_id {
        return Err(ApiError::Forbidden);
    }
    Ok(conversation)
}

fn sse_response(stream: impl Stream<Item = StreamFragment> + Send + 'static) -> Response {
    let events = stream.map(|fragment| Ok::<_, Infallible>(Event::default().data(fragment.to_json())));
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// POST /api/v1/conversations/:conversation_id/stream - Begin a generation
pub async fn start_stream(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<StartStreamRequest>,
) -> Result<Response, ApiError> {
    authorized_conversation(&state, conversation_id, &auth)?;

    if req.prompt.is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".to_string()));
    }

    let session = StreamSession::new(Uuid::new_v4(), conversation_id, auth.tenant_id);
    let session_id = session.session_id;
    info!(%conversation_id, %session_id, "starting stream");

    let producer_rx = state
        .producer
        .produce(conversation_id, req.prompt)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to start generation: {}", e)))?;

    let live = state.publisher.publish(session, producer_rx).await;

    let mut response = sse_response(live);
    if let Ok(value) = HeaderValue::from_str(&session_id.to_string()) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    Ok(response)
}

/// GET /api/v1/conversations/:conversation_id/resume - Reattach to the most
/// recent stream
///
/// 200 with the replayed/live stream, 204 when there is nothing to resume
/// (unknown session, expired log, or unreachable store), 403 for foreign
/// tenants, 404 for unknown conversations.
pub async fn resume_stream(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    authorized_conversation(&state, conversation_id, &auth)?;

    let Some(session_id) = state.resumer.latest_session(conversation_id).await else {
        debug!(%conversation_id, "nothing to resume");
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    match state.resumer.resume(session_id, auth.tenant_id).await {
        Ok(ResumeOutcome::Stream(stream)) => {
            info!(%conversation_id, %session_id, "resuming stream");
            Ok(sse_response(stream))
        }
        Ok(ResumeOutcome::NoSession) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(ReflowError::NotSessionOwner(_)) => Err(ApiError::Forbidden),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

/// DELETE /api/v1/conversations/:conversation_id/stream - Explicitly clear
/// the most recent session's log
pub async fn clear_stream(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(auth): Extension<AuthContext>,
) -> Result<StatusCode, ApiError> {
    authorized_conversation(&state, conversation_id, &auth)?;

    if let Some(session_id) = state.resumer.latest_session(conversation_id).await {
        state
            .chunk_store
            .clear_session(session_id)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        info!(%conversation_id, %session_id, "stream cleared");
    }

    Ok(StatusCode::NO_CONTENT)
}
