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

use uuid::Uuid;

use crate::session::state_machine::InvalidTransition;

/// Error type shared across the Reflow crates.
#[derive(Debug, thiserror::Error)]
pub enum ReflowError {
    /// The chunk store could not be reached or answered with an error.
    /// Callers on the publish path swallow this; callers on the resume
    /// path treat it as "no active session".
    #[error("chunk store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("no such session: {0}")]
    SessionNotFound(Uuid),

    /// The session exists but belongs to a different tenant than the caller.
    #[error("session {0} is not owned by the caller")]
    NotSessionOwner(Uuid),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ReflowError>;
