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

//! Stream Resumer - reattach a consumer to an existing session
//!
//! Replays the chunk log one fragment per stored chunk (boundaries are
//! part of the contract; a replay is never a concatenation), then tails
//! the live broadcast until the generation finishes. Every store read is
//! bounded; a timeout or store error degrades to "nothing to resume"
//! rather than failing the request.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use reflow_core::{ReflowError, Result, SessionState, StreamFragment};
use reflow_storage::ChunkStore;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::publisher::{ActiveStreams, LiveEvent};

pub enum ResumeOutcome {
    /// The session never existed, already expired, or the store could not
    /// be read. Callers surface this as an empty result, not an error.
    NoSession,
    /// Replay of the stored chunks, staying open for a live tail while the
    /// generation is still publishing.
    Stream(BoxStream<'static, StreamFragment>),
}

impl std::fmt::Debug for ResumeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResumeOutcome::NoSession => f.write_str("NoSession"),
            ResumeOutcome::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

pub struct StreamResumer {
    store: Arc<dyn ChunkStore>,
    streams: Arc<ActiveStreams>,
    read_timeout: Duration,
}

impl StreamResumer {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        streams: Arc<ActiveStreams>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            store,
            streams,
            read_timeout,
        }
    }

    /// Most recent resumable session for a conversation. Store errors and
    /// timeouts degrade to `None`.
    pub async fn latest_session(&self, conversation_id: Uuid) -> Option<Uuid> {
        match timeout(self.read_timeout, self.store.latest_session(conversation_id)).await {
            Ok(Ok(session_id)) => session_id,
            Ok(Err(e)) => {
                warn!(%conversation_id, error = %e, "chunk log lookup failed; treating as no active session");
                None
            }
            Err(_) => {
                warn!(%conversation_id, "chunk log lookup timed out; treating as no active session");
                None
            }
        }
    }

    /// Reattach to a session. Rejects callers that do not own the session;
    /// every other failure mode collapses into `NoSession`.
    pub async fn resume(&self, session_id: Uuid, tenant_id: u64) -> Result<ResumeOutcome> {
        // Subscribe before snapshotting: the publisher broadcasts a chunk
        // only after appending it, so everything is either in the snapshot
        // or still ahead of this subscription.
        let live_rx = self.streams.subscribe(session_id);

        let snapshot = match timeout(self.read_timeout, self.store.read(session_id)).await {
            Ok(Ok(Some(snapshot))) => snapshot,
            Ok(Ok(None)) => return Ok(ResumeOutcome::NoSession),
            Ok(Err(e)) => {
                warn!(%session_id, error = %e, "chunk log read failed; treating as no active session");
                return Ok(ResumeOutcome::NoSession);
            }
            Err(_) => {
                warn!(%session_id, "chunk log read timed out; treating as no active session");
                return Ok(ResumeOutcome::NoSession);
            }
        };

        if snapshot.session.tenant_id != tenant_id {
            return Err(ReflowError::NotSessionOwner(session_id));
        }

        let store = self.store.clone();
        let read_timeout = self.read_timeout;

        let stream = async_stream::stream! {
            let mut last_seq: Option<u64> = None;

            for chunk in &snapshot.chunks {
                last_seq = Some(chunk.seq);
                yield StreamFragment::content(chunk.payload.clone());
            }

            if snapshot.session.state != SessionState::Publishing {
                yield StreamFragment::Done;
                return;
            }

            let mut live_rx = match live_rx {
                Some(rx) => rx,
                None => {
                    // The session finished between the snapshot and now (or
                    // the process restarted); there is nothing live to tail.
                    yield StreamFragment::Done;
                    return;
                }
            };

            loop {
                match live_rx.recv().await {
                    Ok(LiveEvent::Chunk(chunk)) => {
                        // Skip anything already replayed from the snapshot.
                        if last_seq.map_or(false, |seq| chunk.seq <= seq) {
                            continue;
                        }
                        last_seq = Some(chunk.seq);
                        yield StreamFragment::Content { text: chunk.payload };
                    }
                    Ok(LiveEvent::Transient(entry)) => {
                        yield StreamFragment::Transient(entry);
                    }
                    Ok(LiveEvent::Finished) => {
                        yield StreamFragment::Done;
                        break;
                    }
                    Ok(LiveEvent::Failed(message)) => {
                        yield StreamFragment::Error { message };
                        break;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%session_id, skipped, "resume tail lagged; re-reading chunk log");
                        match timeout(read_timeout, store.read(session_id)).await {
                            Ok(Ok(Some(repaired))) => {
                                for chunk in repaired.chunks {
                                    if last_seq.map_or(true, |seq| chunk.seq > seq) {
                                        last_seq = Some(chunk.seq);
                                        yield StreamFragment::content(chunk.payload);
                                    }
                                }
                                if repaired.session.state != SessionState::Publishing {
                                    yield StreamFragment::Done;
                                    break;
                                }
                            }
                            _ => {
                                debug!(%session_id, "lag repair read failed; continuing from the live tail");
                            }
                        }
                    }
                    Err(RecvError::Closed) => {
                        // Publisher went away without a terminal event on
                        // this subscription; the stream is over.
                        yield StreamFragment::Done;
                        break;
                    }
                }
            }
        };

        Ok(ResumeOutcome::Stream(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use reflow_core::{Chunk, StreamSession, TransientEntry};
    use reflow_storage::{MemoryChunkLog, SessionSnapshot};

    struct FailingStore;

    #[async_trait]
    impl ChunkStore for FailingStore {
        async fn create_session(&self, _session: StreamSession) -> Result<()> {
            Err(ReflowError::StoreUnavailable("down".to_string()))
        }
        async fn append(&self, _session_id: Uuid, _chunk: Chunk) -> Result<u64> {
            Err(ReflowError::StoreUnavailable("down".to_string()))
        }
        async fn read(&self, _session_id: Uuid) -> Result<Option<SessionSnapshot>> {
            Err(ReflowError::StoreUnavailable("down".to_string()))
        }
        async fn mark_finished(&self, _session_id: Uuid) -> Result<()> {
            Err(ReflowError::StoreUnavailable("down".to_string()))
        }
        async fn clear_session(&self, _session_id: Uuid) -> Result<()> {
            Err(ReflowError::StoreUnavailable("down".to_string()))
        }
        async fn latest_session(&self, _conversation_id: Uuid) -> Result<Option<Uuid>> {
            Err(ReflowError::StoreUnavailable("down".to_string()))
        }
        async fn session_count(&self) -> Result<u64> {
            Err(ReflowError::StoreUnavailable("down".to_string()))
        }
    }

    fn resumer_over(store: Arc<dyn ChunkStore>) -> StreamResumer {
        StreamResumer::new(
            store,
            Arc::new(ActiveStreams::new()),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn unknown_session_is_no_session() {
        let resumer = resumer_over(Arc::new(MemoryChunkLog::new()));
        let outcome = resumer.resume(Uuid::new_v4(), 1).await.unwrap();
        assert!(matches!(outcome, ResumeOutcome::NoSession));
    }

    #[tokio::test]
    async fn store_failure_looks_like_no_session() {
        let resumer = resumer_over(Arc::new(FailingStore));
        let outcome = resumer.resume(Uuid::new_v4(), 1).await.unwrap();
        assert!(matches!(outcome, ResumeOutcome::NoSession));
        assert!(resumer.latest_session(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn foreign_tenant_is_rejected() {
        let store = Arc::new(MemoryChunkLog::new());
        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let session_id = session.session_id;
        store.create_session(session).await.unwrap();

        let resumer = resumer_over(store);
        let err = resumer.resume(session_id, 2).await.unwrap_err();
        assert!(matches!(err, ReflowError::NotSessionOwner(_)));
    }

    #[tokio::test]
    async fn finished_session_replays_every_chunk_discretely() {
        let store = Arc::new(MemoryChunkLog::new());
        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let session_id = session.session_id;
        store.create_session(session).await.unwrap();
        for (seq, payload) in ["Hello", " ", "world", "!"].iter().enumerate() {
            store
                .append(session_id, Chunk::new(seq as u64, *payload))
                .await
                .unwrap();
        }
        store.mark_finished(session_id).await.unwrap();

        let resumer = resumer_over(store);
        let ResumeOutcome::Stream(stream) = resumer.resume(session_id, 1).await.unwrap() else {
            panic!("expected a replay stream");
        };
        let fragments: Vec<StreamFragment> = stream.collect().await;
        assert_eq!(
            fragments,
            vec![
                StreamFragment::content("Hello"),
                StreamFragment::content(" "),
                StreamFragment::content("world"),
                StreamFragment::content("!"),
                StreamFragment::Done,
            ]
        );
    }

    #[tokio::test]
    async fn publishing_session_replays_then_tails_without_duplicates() {
        let store = Arc::new(MemoryChunkLog::new());
        let streams = Arc::new(ActiveStreams::new());

        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let session_id = session.session_id;
        store.create_session(session).await.unwrap();
        for (seq, payload) in ["Hello", " "].iter().enumerate() {
            store
                .append(session_id, Chunk::new(seq as u64, *payload))
                .await
                .unwrap();
        }
        let broadcast_tx = streams.register(session_id);

        let resumer = StreamResumer::new(store, streams, Duration::from_millis(500));
        let ResumeOutcome::Stream(stream) = resumer.resume(session_id, 1).await.unwrap() else {
            panic!("expected a replay stream");
        };

        // One duplicate of a stored chunk, then new material and the end.
        broadcast_tx
            .send(LiveEvent::Chunk(Chunk::new(1, " ")))
            .unwrap();
        broadcast_tx
            .send(LiveEvent::Chunk(Chunk::new(2, "world")))
            .unwrap();
        broadcast_tx
            .send(LiveEvent::Transient(TransientEntry::new(
                "s",
                reflow_core::Destination::ChatInline,
                reflow_core::TransientKind::Status,
                "Polishing...",
            )))
            .unwrap();
        broadcast_tx
            .send(LiveEvent::Chunk(Chunk::new(3, "!")))
            .unwrap();
        broadcast_tx.send(LiveEvent::Finished).unwrap();

        let fragments: Vec<StreamFragment> = stream.collect().await;
        let contents: Vec<&str> = fragments
            .iter()
            .filter_map(|f| match f {
                StreamFragment::Content { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["Hello", " ", "world", "!"]);
        assert!(fragments
            .iter()
            .any(|f| matches!(f, StreamFragment::Transient(_))));
        assert_eq!(fragments.last(), Some(&StreamFragment::Done));
    }

    #[tokio::test]
    async fn concurrent_resumers_replay_independently() {
        let store = Arc::new(MemoryChunkLog::new());
        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let session_id = session.session_id;
        store.create_session(session).await.unwrap();
        for (seq, payload) in ["a", "b", "c"].iter().enumerate() {
            store
                .append(session_id, Chunk::new(seq as u64, *payload))
                .await
                .unwrap();
        }
        store.mark_finished(session_id).await.unwrap();

        let resumer = resumer_over(store);
        let ResumeOutcome::Stream(first) = resumer.resume(session_id, 1).await.unwrap() else {
            panic!("expected a replay stream");
        };
        let ResumeOutcome::Stream(second) = resumer.resume(session_id, 1).await.unwrap() else {
            panic!("expected a replay stream");
        };

        // One caller goes away mid-replay; the other is unaffected.
        drop(first);

        let fragments: Vec<StreamFragment> = second.collect().await;
        assert_eq!(
            fragments,
            vec![
                StreamFragment::content("a"),
                StreamFragment::content("b"),
                StreamFragment::content("c"),
                StreamFragment::Done,
            ]
        );
    }

    #[tokio::test]
    async fn generation_failure_surfaces_in_the_tail() {
        let store = Arc::new(MemoryChunkLog::new());
        let streams = Arc::new(ActiveStreams::new());

        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let session_id = session.session_id;
        store.create_session(session).await.unwrap();
        let broadcast_tx = streams.register(session_id);

        let resumer = StreamResumer::new(store, streams, Duration::from_millis(500));
        let ResumeOutcome::Stream(stream) = resumer.resume(session_id, 1).await.unwrap() else {
            panic!("expected a replay stream");
        };

        broadcast_tx
            .send(LiveEvent::Failed("backend exploded".to_string()))
            .unwrap();

        let fragments: Vec<StreamFragment> = stream.collect().await;
        assert_eq!(fragments, vec![StreamFragment::error("backend exploded")]);
    }
}
