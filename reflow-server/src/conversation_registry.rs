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

//! In-process registry of conversations.
//!
//! Streams hang off conversations; the registry is what lets the resume
//! endpoint distinguish "unknown conversation" (404) from "known
//! conversation with nothing to resume" (204).

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: Uuid,
    pub tenant_id: u64,
    pub title: String,
    /// Creation timestamp (microseconds since epoch).
    pub created_at_us: u64,
}

#[derive(Default)]
pub struct ConversationRegistry {
    conversations: DashMap<Uuid, Conversation>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, tenant_id: u64, title: impl Into<String>) -> Conversation {
        let conversation = Conversation {
            conversation_id: Uuid::new_v4(),
            tenant_id,
            title: title.into(),
            created_at_us: current_timestamp_us(),
        };
        self.conversations
            .insert(conversation.conversation_id, conversation.clone());
        conversation
    }

    pub fn get(&self, conversation_id: Uuid) -> Option<Conversation> {
        self.conversations
            .get(&conversation_id)
            .map(|entry| entry.clone())
    }

    pub fn list_for_tenant(&self, tenant_id: u64) -> Vec<Conversation> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|entry| entry.tenant_id == tenant_id)
            .map(|entry| entry.clone())
            .collect();
        // Most recent first.
        conversations.sort_by(|a, b| b.created_at_us.cmp(&a.created_at_us));
        conversations
    }

    pub fn count(&self) -> usize {
        self.conversations.len()
    }
}

fn current_timestamp_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
