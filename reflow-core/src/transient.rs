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

//! Ephemeral status annotations that ride alongside the content stream.
//!
//! Transient entries are presentation-only: they are never written to the
//! chunk log and do not survive a reload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire type tag distinguishing transient updates from content fragments.
pub const TRANSIENT_TYPE_TAG: &str = "transient";

/// Presentation channel a transient entry is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    ChatInline,
    SidePanel,
    Toast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    Status,
    Thinking,
    Notification,
    Progress,
    Celebration,
    TitleUpdate,
}

/// One ephemeral status annotation.
///
/// An empty `text` is the clear signal for the entry with the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientEntry {
    pub id: String,
    pub destination: Destination,
    pub kind: TransientKind,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Completion percentage for `Progress` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Explicit wire marker; producers always set it, and consumers drop
    /// any payload where it is absent or false.
    #[serde(default)]
    pub transient: bool,
}

impl TransientEntry {
    pub fn new(
        id: impl Into<String>,
        destination: Destination,
        kind: TransientKind,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            destination,
            kind,
            text: text.into(),
            icon: None,
            progress: None,
            metadata: None,
            transient: true,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    /// An empty text means "clear the entry with this id".
    pub fn is_clear(&self) -> bool {
        self.text.is_empty()
    }

    /// Strict structural decode of an incoming payload.
    ///
    /// The stream carries heterogeneous fragment kinds; anything that is
    /// not an object tagged `"transient"` with the marker flag set is not
    /// for the overlay and yields `None`. Decode failure is a no-op for
    /// callers, never an error path.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.get("type").and_then(Value::as_str) != Some(TRANSIENT_TYPE_TAG) {
            return None;
        }
        if object.get("transient").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}
