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

//! Reflow Client
//!
//! Consumer-side pieces of the streaming subsystem: the transient overlay
//! store, the fragment consumer that partitions a stream between transcript
//! and overlay, and the SSE transport.

pub mod consumer;
pub mod overlay;
pub mod sse;

pub use consumer::{ConsumerState, StreamConsumer};
pub use overlay::{TransientOverlayStore, MIN_VISIBLE};
pub use sse::{ClientError, FragmentStream, SseClient, SseParser};
