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

//! Stream session identity and lifecycle.

pub mod state_machine;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use state_machine::{InvalidTransition, SessionEvent, SessionState};

/// One generation run, spanning possible reattachment.
///
/// Created by the publisher when a generation begins; the publisher is the
/// only writer of its lifecycle state. Resumers read it to decide whether a
/// replay should stay open for a live tail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSession {
    pub session_id: Uuid,
    pub conversation_id: Uuid,
    /// Tenant that started the generation; resume requests from any other
    /// tenant are rejected.
    pub tenant_id: u64,
    pub state: SessionState,
    /// Creation timestamp (microseconds since epoch).
    pub created_at_us: u64,
    /// Last write timestamp (microseconds since epoch).
    pub last_activity_us: u64,
}

impl StreamSession {
    pub fn new(session_id: Uuid, conversation_id: Uuid, tenant_id: u64) -> Self {
        let now = current_timestamp_us();
        Self {
            session_id,
            conversation_id,
            tenant_id,
            state: SessionState::Publishing,
            created_at_us: now,
            last_activity_us: now,
        }
    }

    /// Update the activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity_us = current_timestamp_us();
    }

    /// Apply a lifecycle event, refusing invalid transitions.
    pub fn apply(&mut self, event: SessionEvent) -> Result<(), InvalidTransition> {
        self.state = self.state.transition(event)?;
        self.touch();
        Ok(())
    }

    pub fn is_publishing(&self) -> bool {
        self.state.is_live()
    }

    pub fn duration_ms(&self) -> u64 {
        self.last_activity_us.saturating_sub(self.created_at_us) / 1000
    }
}

fn current_timestamp_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_publishing() {
        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 7);
        assert!(session.is_publishing());
        assert_eq!(session.tenant_id, 7);
        assert_eq!(session.created_at_us, session.last_activity_us);
    }

    #[test]
    fn finish_then_expire() {
        let mut session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        session.apply(SessionEvent::Finish).unwrap();
        assert_eq!(session.state, SessionState::Finished);
        session.apply(SessionEvent::Expire).unwrap();
        assert_eq!(session.state, SessionState::Expired);
    }

    #[test]
    fn double_finish_is_rejected() {
        let mut session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        session.apply(SessionEvent::Finish).unwrap();
        assert!(session.apply(SessionEvent::Finish).is_err());
        assert_eq!(session.state, SessionState::Finished);
    }
}
