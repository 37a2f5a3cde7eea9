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

//! Session lifecycle state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The generation is still producing chunks.
    Publishing,
    /// The generation completed or errored; the log is read-only.
    Finished,
    /// The retention window elapsed or the session was cleared.
    Expired,
}

impl SessionState {
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Publishing)
    }

    /// A session can be replayed while it still has a log entry, whether or
    /// not the generation behind it is done.
    pub fn is_resumable(self) -> bool {
        matches!(self, SessionState::Publishing | SessionState::Finished)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Generation completed or errored.
    Finish,
    /// Retention window elapsed or the session was explicitly cleared.
    Expire,
}

#[derive(Debug, Error)]
#[error("invalid session transition: {current:?} -> {event:?}")]
pub struct InvalidTransition {
    pub current: SessionState,
    pub event: SessionEvent,
}

impl SessionState {
    pub fn transition(self, event: SessionEvent) -> Result<SessionState, InvalidTransition> {
        use SessionEvent::*;
        use SessionState::*;

        let next = match (self, event) {
            (Publishing, Finish) => Finished,
            (Publishing, Expire) => Expired,
            (Finished, Expire) => Expired,
            _ => {
                return Err(InvalidTransition {
                    current: self,
                    event,
                })
            }
        };

        Ok(next)
    }
}
