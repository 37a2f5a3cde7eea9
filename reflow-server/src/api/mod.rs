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

pub mod conversations;
pub mod health;
pub mod sessions;
pub mod stream;

pub use conversations::{create_conversation, get_conversation, list_conversations};
pub use health::{health_check, health_check_detailed};
pub use sessions::get_session;
pub use stream::{clear_stream, resume_stream, start_stream};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::conversation_registry::ConversationRegistry;
use crate::producer::FragmentProducer;
use crate::publisher::{ActiveStreams, StreamPublisher};
use crate::resumer::StreamResumer;
use reflow_storage::ChunkStore;

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub chunk_store: Arc<dyn ChunkStore>,
    pub streams: Arc<ActiveStreams>,
    pub conversations: Arc<ConversationRegistry>,
    pub producer: Arc<dyn FragmentProducer>,
    pub publisher: Arc<StreamPublisher>,
    pub resumer: Arc<StreamResumer>,
}
