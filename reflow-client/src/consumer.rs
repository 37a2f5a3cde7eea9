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

//! Stream consumer - routes wire fragments to their destinations
//!
//! Content fragments accumulate in the transcript with their boundaries
//! intact; transient-shaped payloads go to the overlay; anything else is
//! dropped silently. Live and resumed streams share one framing, so a
//! single consumer handles both.

use reflow_core::{StreamFragment, TransientEntry};
use serde_json::Value;
use tracing::debug;

use crate::overlay::TransientOverlayStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerState {
    Streaming,
    Done,
    Failed(String),
}

pub struct StreamConsumer {
    overlay: TransientOverlayStore,
    fragments: Vec<String>,
    state: ConsumerState,
}

impl StreamConsumer {
    pub fn new(overlay: TransientOverlayStore) -> Self {
        Self {
            overlay,
            fragments: Vec::new(),
            state: ConsumerState::Streaming,
        }
    }

    /// Feed one wire event (the `data` of one SSE event).
    pub fn handle_event(&mut self, data: &str) {
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "ignoring undecodable stream event");
                return;
            }
        };

        // The overlay does its own structural validation, so transient
        // payloads are handed over raw.
        if TransientEntry::from_value(&value).is_some() {
            self.overlay.handle_update(&value);
            return;
        }

        match serde_json::from_value::<StreamFragment>(value) {
            Ok(StreamFragment::Content { text }) => self.fragments.push(text),
            Ok(StreamFragment::Done) => self.state = ConsumerState::Done,
            Ok(StreamFragment::Error { message }) => {
                self.state = ConsumerState::Failed(message);
            }
            Ok(StreamFragment::Transient(_)) => {
                // Tagged transient but failed the overlay's marker check;
                // not for us.
            }
            Err(e) => {
                debug!(error = %e, "ignoring unrecognized fragment shape");
            }
        }
    }

    /// The transcript as discrete fragments, boundaries preserved.
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Flattened transcript for presentation.
    pub fn text(&self) -> String {
        self.fragments.concat()
    }

    pub fn state(&self) -> &ConsumerState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state != ConsumerState::Streaming
    }

    pub fn overlay(&self) -> &TransientOverlayStore {
        &self.overlay
    }
}
