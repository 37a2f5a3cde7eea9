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

//! One atomically-delivered unit of streamed content.

use serde::{Deserialize, Serialize};

/// A single output fragment as written to the chunk log.
///
/// Chunks within a session are strictly ordered by `seq` and are never
/// merged, split, or reordered by any consumer: a replay reproduces the
/// exact boundaries the publisher wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Monotonic position within the owning session, assigned by the
    /// publisher before the chunk reaches any destination.
    pub seq: u64,
    pub payload: String,
    /// Emission timestamp (microseconds since epoch).
    pub timestamp_us: u64,
}

impl Chunk {
    pub fn new(seq: u64, payload: impl Into<String>) -> Self {
        Self {
            seq,
            payload: payload.into(),
            timestamp_us: current_timestamp_us(),
        }
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
    fn new_stamps_emission_time() {
        let chunk = Chunk::new(0, "Hello");
        assert_eq!(chunk.seq, 0);
        assert_eq!(chunk.payload, "Hello");
        assert!(chunk.timestamp_us > 0);
    }

    #[test]
    fn chunks_round_trip_through_json() {
        let chunk = Chunk::new(3, " world");
        let json = serde_json::to_string(&chunk).unwrap();
        let back: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chunk);
    }
}
