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

//! Fragment wire format.
//!
//! Every fragment is a discrete, independently-flushed unit: one event on
//! the wire per fragment, for live emission and replay alike, so fragment
//! boundaries stay externally observable.

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::transient::TransientEntry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFragment {
    /// One unit of generated text.
    Content { text: String },
    /// An ephemeral status annotation; never persisted.
    Transient(TransientEntry),
    /// Normal end of the stream.
    Done,
    /// The generation failed; terminal.
    Error { message: String },
}

impl StreamFragment {
    pub fn content(text: impl Into<String>) -> Self {
        StreamFragment::Content { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamFragment::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFragment::Done | StreamFragment::Error { .. })
    }

    /// Wire encoding for one event.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<&Chunk> for StreamFragment {
    fn from(chunk: &Chunk) -> Self {
        StreamFragment::Content {
            text: chunk.payload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transient::{Destination, TransientKind};
    use serde_json::json;

    #[test]
    fn content_round_trips() {
        let fragment = StreamFragment::content("Hello");
        let json = fragment.to_json();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&json).unwrap(),
            json!({"type": "content", "text": "Hello"})
        );
        let back: StreamFragment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fragment);
    }

    #[test]
    fn done_is_a_bare_tag() {
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&StreamFragment::Done.to_json()).unwrap(),
            json!({"type": "done"})
        );
    }

    #[test]
    fn transient_fragments_carry_the_wire_marker() {
        let entry = TransientEntry::new(
            "search",
            Destination::ChatInline,
            TransientKind::Status,
            "Searching...",
        );
        let value =
            serde_json::to_value(StreamFragment::Transient(entry.clone())).unwrap();
        assert_eq!(value["type"], "transient");
        assert_eq!(value["transient"], true);

        let back: StreamFragment = serde_json::from_value(value).unwrap();
        assert_eq!(back, StreamFragment::Transient(entry));
    }

    #[test]
    fn terminal_fragments() {
        assert!(StreamFragment::Done.is_terminal());
        assert!(StreamFragment::error("boom").is_terminal());
        assert!(!StreamFragment::content("x").is_terminal());
    }
}
