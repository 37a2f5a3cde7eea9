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

//! Chunk Log - append-only session output store
//!
//! Stores each in-flight generation's chunks so a later consumer can
//! reattach to the stream. Uses a bounded cache with TTL-based retention:
//! sessions fall out of the log after the retention window and the log
//! never grows past its configured capacity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use parking_lot::RwLock;
use reflow_core::{Chunk, ReflowError, Result, SessionEvent, StreamSession};
use tracing::trace;
use uuid::Uuid;

/// Default retention window for session logs (1 hour).
const DEFAULT_TTL_SECS: u64 = 3600;

/// Default maximum number of sessions kept in the log.
const DEFAULT_MAX_SESSIONS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct ChunkLogConfig {
    /// Maximum sessions retained before LRU eviction.
    pub max_sessions: u64,
    /// Retention window in seconds.
    pub ttl_secs: u64,
}

impl Default for ChunkLogConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

/// Point-in-time view of one session's log.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: StreamSession,
    pub chunks: Vec<Chunk>,
}

/// Seam to the separately-addressable store that holds in-flight session
/// output. The in-memory implementation below is the default; remote
/// implementations get the same failure contract: publishers swallow write
/// errors, resumers degrade reads to "no session".
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Register a session and index it as its conversation's most recent
    /// stream.
    async fn create_session(&self, session: StreamSession) -> Result<()>;

    /// Append one pre-sequenced chunk, returning its sequence position.
    async fn append(&self, session_id: Uuid, chunk: Chunk) -> Result<u64>;

    /// Read the session and its ordered chunks. `None` for unknown or
    /// expired sessions.
    async fn read(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>>;

    /// Mark the generation behind a session as done. Idempotent.
    async fn mark_finished(&self, session_id: Uuid) -> Result<()>;

    /// Explicitly delete a session's log. Deleting an unknown session is a
    /// no-op.
    async fn clear_session(&self, session_id: Uuid) -> Result<()>;

    /// Most recent session started for a conversation, if it is still
    /// retained.
    async fn latest_session(&self, conversation_id: Uuid) -> Result<Option<Uuid>>;

    /// Number of retained sessions; doubles as a reachability probe.
    async fn session_count(&self) -> Result<u64>;
}

struct SessionRecord {
    session: StreamSession,
    chunks: Vec<Chunk>,
}

/// Bounded in-memory chunk log.
pub struct MemoryChunkLog {
    sessions: Cache<Uuid, Arc<RwLock<SessionRecord>>>,
    by_conversation: Cache<Uuid, Uuid>,
}

impl MemoryChunkLog {
    pub fn new() -> Self {
        Self::with_config(ChunkLogConfig::default())
    }

    pub fn with_config(config: ChunkLogConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);
        let sessions = Cache::builder()
            .max_capacity(config.max_sessions)
            .time_to_live(ttl)
            .build();
        let by_conversation = Cache::builder()
            .max_capacity(config.max_sessions)
            .time_to_live(ttl)
            .build();

        Self {
            sessions,
            by_conversation,
        }
    }

    fn record(&self, session_id: Uuid) -> Option<Arc<RwLock<SessionRecord>>> {
        self.sessions.get(&session_id)
    }
}

impl Default for MemoryChunkLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkLog {
    async fn create_session(&self, session: StreamSession) -> Result<()> {
        let session_id = session.session_id;
        let conversation_id = session.conversation_id;
        let record = Arc::new(RwLock::new(SessionRecord {
            session,
            chunks: Vec::new(),
        }));
        self.sessions.insert(session_id, record);
        self.by_conversation.insert(conversation_id, session_id);
        trace!(%session_id, %conversation_id, "session registered in chunk log");
        Ok(())
    }

    async fn append(&self, session_id: Uuid, chunk: Chunk) -> Result<u64> {
        let record = self
            .record(session_id)
            .ok_or(ReflowError::SessionNotFound(session_id))?;
        let mut record = record.write();
        let seq = chunk.seq;
        record.chunks.push(chunk);
        record.session.touch();
        Ok(seq)
    }

    async fn read(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>> {
        let Some(record) = self.record(session_id) else {
            return Ok(None);
        };
        let record = record.read();
        Ok(Some(SessionSnapshot {
            session: record.session.clone(),
            chunks: record.chunks.clone(),
        }))
    }

    async fn mark_finished(&self, session_id: Uuid) -> Result<()> {
        let record = self
            .record(session_id)
            .ok_or(ReflowError::SessionNotFound(session_id))?;
        let mut record = record.write();
        if record.session.state.is_live() {
            record.session.apply(SessionEvent::Finish)?;
        }
        Ok(())
    }

    async fn clear_session(&self, session_id: Uuid) -> Result<()> {
        if let Some(record) = self.record(session_id) {
            let conversation_id = record.read().session.conversation_id;
            if self.by_conversation.get(&conversation_id) == Some(session_id) {
                self.by_conversation.invalidate(&conversation_id);
            }
        }
        self.sessions.invalidate(&session_id);
        Ok(())
    }

    async fn latest_session(&self, conversation_id: Uuid) -> Result<Option<Uuid>> {
        let Some(session_id) = self.by_conversation.get(&conversation_id) else {
            return Ok(None);
        };
        // The index can outlive the session record when capacity eviction
        // takes the record first.
        if self.record(session_id).is_none() {
            return Ok(None);
        }
        Ok(Some(session_id))
    }

    async fn session_count(&self) -> Result<u64> {
        self.sessions.run_pending_tasks();
        Ok(self.sessions.entry_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(conversation_id: Uuid) -> StreamSession {
        StreamSession::new(Uuid::new_v4(), conversation_id, 1)
    }

    #[tokio::test]
    async fn append_and_read_preserve_chunk_boundaries() {
        let log = MemoryChunkLog::new();
        let s = session(Uuid::new_v4());
        let session_id = s.session_id;
        log.create_session(s).await.unwrap();

        let payloads = ["Hello", " ", "world", "!"];
        for (seq, payload) in payloads.iter().enumerate() {
            let stored = log
                .append(session_id, Chunk::new(seq as u64, *payload))
                .await
                .unwrap();
            assert_eq!(stored, seq as u64);
        }

        let snapshot = log.read(session_id).await.unwrap().unwrap();
        assert_eq!(snapshot.chunks.len(), payloads.len());
        for (chunk, payload) in snapshot.chunks.iter().zip(payloads) {
            assert_eq!(chunk.payload, payload);
        }
        assert!(snapshot.session.is_publishing());
    }

    #[tokio::test]
    async fn read_unknown_session_is_none() {
        let log = MemoryChunkLog::new();
        assert!(log.read(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_to_unknown_session_errors() {
        let log = MemoryChunkLog::new();
        let err = log
            .append(Uuid::new_v4(), Chunk::new(0, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReflowError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn mark_finished_is_idempotent() {
        let log = MemoryChunkLog::new();
        let s = session(Uuid::new_v4());
        let session_id = s.session_id;
        log.create_session(s).await.unwrap();

        log.mark_finished(session_id).await.unwrap();
        log.mark_finished(session_id).await.unwrap();

        let snapshot = log.read(session_id).await.unwrap().unwrap();
        assert!(!snapshot.session.is_publishing());
    }

    #[tokio::test]
    async fn latest_session_tracks_the_most_recent_stream() {
        let log = MemoryChunkLog::new();
        let conversation_id = Uuid::new_v4();

        let first = session(conversation_id);
        let first_id = first.session_id;
        log.create_session(first).await.unwrap();
        assert_eq!(
            log.latest_session(conversation_id).await.unwrap(),
            Some(first_id)
        );

        let second = session(conversation_id);
        let second_id = second.session_id;
        log.create_session(second).await.unwrap();
        assert_eq!(
            log.latest_session(conversation_id).await.unwrap(),
            Some(second_id)
        );
    }

    #[tokio::test]
    async fn clear_session_removes_log_and_index() {
        let log = MemoryChunkLog::new();
        let conversation_id = Uuid::new_v4();
        let s = session(conversation_id);
        let session_id = s.session_id;
        log.create_session(s).await.unwrap();
        log.append(session_id, Chunk::new(0, "Hello")).await.unwrap();

        log.clear_session(session_id).await.unwrap();
        assert!(log.read(session_id).await.unwrap().is_none());
        assert!(log.latest_session(conversation_id).await.unwrap().is_none());

        // Deleting again is a no-op.
        log.clear_session(session_id).await.unwrap();
    }

    #[tokio::test]
    async fn retention_window_expires_sessions() {
        let log = MemoryChunkLog::with_config(ChunkLogConfig {
            max_sessions: 16,
            ttl_secs: 1,
        });
        let conversation_id = Uuid::new_v4();
        let s = session(conversation_id);
        let session_id = s.session_id;
        log.create_session(s).await.unwrap();
        assert!(log.read(session_id).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(log.read(session_id).await.unwrap().is_none());
        assert!(log.latest_session(conversation_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_count_reflects_retained_sessions() {
        let log = MemoryChunkLog::new();
        assert_eq!(log.session_count().await.unwrap(), 0);
        log.create_session(session(Uuid::new_v4())).await.unwrap();
        log.create_session(session(Uuid::new_v4())).await.unwrap();
        assert_eq!(log.session_count().await.unwrap(), 2);
    }
}
