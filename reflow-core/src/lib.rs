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

//! Reflow Core
//!
//! Fundamental data structures for the streaming continuity subsystem:
//! sessions and their lifecycle, output chunks, the fragment wire format,
//! and transient overlay entries.

pub mod chunk;
pub mod error;
pub mod fragment;
pub mod session;
pub mod transient;

pub use chunk::Chunk;
pub use error::{ReflowError, Result};
pub use fragment::StreamFragment;
pub use session::{
    state_machine::{InvalidTransition, SessionEvent, SessionState},
    StreamSession,
};
pub use transient::{Destination, TransientEntry, TransientKind, TRANSIENT_TYPE_TAG};
