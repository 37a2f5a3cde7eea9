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

//! Stream Publisher - fan-out from one generation to every consumer
//!
//! Two tasks per session:
//!
//! - the driver owns the producer channel and forwards every fragment to
//!   the original caller's live channel and to the writer queue. The live
//!   channel is unbounded and send errors are ignored, so a disconnected
//!   caller never stops the generation.
//! - the writer drains its queue in order: content chunks are appended to
//!   the chunk log (best effort; failures are logged and swallowed) and
//!   then broadcast to attached resumers. Broadcasting strictly after the
//!   append means a resumer that subscribes before snapshotting the log
//!   sees every chunk exactly once.

use std::sync::Arc;

use dashmap::DashMap;
use reflow_core::{Chunk, StreamFragment, StreamSession, TransientEntry};
use reflow_storage::ChunkStore;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-resumer buffer; a tail that falls further behind than this re-reads
/// the chunk log to recover.
const BROADCAST_CAPACITY: usize = 1024;

/// Event fanned out to resumers attached to a live session.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    Chunk(Chunk),
    Transient(TransientEntry),
    Finished,
    Failed(String),
}

/// Registry of sessions that are still publishing, keyed by session id.
#[derive(Default)]
pub struct ActiveStreams {
    inner: DashMap<Uuid, broadcast::Sender<LiveEvent>>,
}

impl ActiveStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, session_id: Uuid) -> broadcast::Sender<LiveEvent> {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        self.inner.insert(session_id, tx.clone());
        tx
    }

    /// Attach to a live session. `None` once the generation has finished
    /// and the channel was torn down.
    pub fn subscribe(&self, session_id: Uuid) -> Option<broadcast::Receiver<LiveEvent>> {
        self.inner.get(&session_id).map(|tx| tx.subscribe())
    }

    fn unregister(&self, session_id: Uuid) {
        self.inner.remove(&session_id);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

enum WriterMessage {
    Chunk(Chunk),
    Transient(TransientEntry),
    Finish,
    Fail(String),
}

pub struct StreamPublisher {
    store: Arc<dyn ChunkStore>,
    streams: Arc<ActiveStreams>,
}

impl StreamPublisher {
    pub fn new(store: Arc<dyn ChunkStore>, streams: Arc<ActiveStreams>) -> Self {
        Self { store, streams }
    }

    /// Begin publishing a generation. The returned stream is the original
    /// caller's live view; dropping it does not stop the generation.
    pub async fn publish(
        &self,
        session: StreamSession,
        producer_rx: mpsc::Receiver<StreamFragment>,
    ) -> UnboundedReceiverStream<StreamFragment> {
        let session_id = session.session_id;

        if let Err(e) = self.store.create_session(session).await {
            warn!(%session_id, error = %e, "chunk log unavailable; stream will not be resumable");
        }

        let broadcast_tx = self.streams.register(session_id);
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_writer(
            self.store.clone(),
            self.streams.clone(),
            session_id,
            broadcast_tx,
            writer_rx,
        ));
        tokio::spawn(run_driver(producer_rx, live_tx, writer_tx));

        UnboundedReceiverStream::new(live_rx)
    }
}

async fn run_driver(
    mut producer_rx: mpsc::Receiver<StreamFragment>,
    live_tx: mpsc::UnboundedSender<StreamFragment>,
    writer_tx: mpsc::UnboundedSender<WriterMessage>,
) {
    let mut seq = 0u64;
    let mut terminated = false;

    while let Some(fragment) = producer_rx.recv().await {
        match fragment {
            StreamFragment::Content { text } => {
                let chunk = Chunk::new(seq, text.clone());
                seq += 1;
                let _ = writer_tx.send(WriterMessage::Chunk(chunk));
                let _ = live_tx.send(StreamFragment::Content { text });
            }
            StreamFragment::Transient(entry) => {
                let _ = writer_tx.send(WriterMessage::Transient(entry.clone()));
                let _ = live_tx.send(StreamFragment::Transient(entry));
            }
            StreamFragment::Done => {
                let _ = writer_tx.send(WriterMessage::Finish);
                let _ = live_tx.send(StreamFragment::Done);
                terminated = true;
                break;
            }
            StreamFragment::Error { message } => {
                let _ = writer_tx.send(WriterMessage::Fail(message.clone()));
                let _ = live_tx.send(StreamFragment::Error { message });
                terminated = true;
                break;
            }
        }
    }

    // Producer channel closed without a terminal fragment.
    if !terminated {
        let _ = writer_tx.send(WriterMessage::Finish);
        let _ = live_tx.send(StreamFragment::Done);
    }
}

async fn run_writer(
    store: Arc<dyn ChunkStore>,
    streams: Arc<ActiveStreams>,
    session_id: Uuid,
    broadcast_tx: broadcast::Sender<LiveEvent>,
    mut writer_rx: mpsc::UnboundedReceiver<WriterMessage>,
) {
    while let Some(message) = writer_rx.recv().await {
        match message {
            WriterMessage::Chunk(chunk) => {
                if let Err(e) = store.append(session_id, chunk.clone()).await {
                    warn!(%session_id, seq = chunk.seq, error = %e, "failed to persist chunk; resume may be incomplete");
                }
                let _ = broadcast_tx.send(LiveEvent::Chunk(chunk));
            }
            WriterMessage::Transient(entry) => {
                // Transient entries are presentation-only; never persisted.
                let _ = broadcast_tx.send(LiveEvent::Transient(entry));
            }
            WriterMessage::Finish => {
                finish_session(&store, session_id).await;
                let _ = broadcast_tx.send(LiveEvent::Finished);
                break;
            }
            WriterMessage::Fail(message) => {
                finish_session(&store, session_id).await;
                let _ = broadcast_tx.send(LiveEvent::Failed(message));
                break;
            }
        }
    }

    streams.unregister(session_id);
    debug!(%session_id, "publisher finished");
}

async fn finish_session(store: &Arc<dyn ChunkStore>, session_id: Uuid) {
    if let Err(e) = store.mark_finished(session_id).await {
        warn!(%session_id, error = %e, "failed to mark session finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use reflow_core::{ReflowError, Result};
    use reflow_storage::{MemoryChunkLog, SessionSnapshot};
    use std::time::Duration;

    /// Chunk store that is permanently unreachable.
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

    async fn send_script(tx: mpsc::Sender<StreamFragment>, payloads: &[&str]) {
        for payload in payloads {
            tx.send(StreamFragment::content(*payload)).await.unwrap();
        }
        tx.send(StreamFragment::Done).await.unwrap();
    }

    async fn wait_for_chunks(store: &MemoryChunkLog, session_id: Uuid, n: usize) -> SessionSnapshot {
        for _ in 0..100 {
            if let Some(snapshot) = store.read(session_id).await.unwrap() {
                if snapshot.chunks.len() >= n && !snapshot.session.is_publishing() {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("chunks never reached the log");
    }

    #[tokio::test]
    async fn live_stream_and_log_both_see_every_fragment() {
        let store = Arc::new(MemoryChunkLog::new());
        let streams = Arc::new(ActiveStreams::new());
        let publisher = StreamPublisher::new(store.clone(), streams.clone());

        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let session_id = session.session_id;

        let (tx, rx) = mpsc::channel(8);
        let live = publisher.publish(session, rx).await;
        send_script(tx, &["Hello", " ", "world", "!"]).await;

        let fragments: Vec<StreamFragment> = live.collect().await;
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

        let snapshot = wait_for_chunks(&store, session_id, 4).await;
        let payloads: Vec<&str> = snapshot.chunks.iter().map(|c| c.payload.as_str()).collect();
        assert_eq!(payloads, vec!["Hello", " ", "world", "!"]);
        let seqs: Vec<u64> = snapshot.chunks.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn store_failure_never_reaches_the_live_stream() {
        let store: Arc<dyn ChunkStore> = Arc::new(FailingStore);
        let streams = Arc::new(ActiveStreams::new());
        let publisher = StreamPublisher::new(store, streams);

        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let (tx, rx) = mpsc::channel(8);
        let live = publisher.publish(session, rx).await;
        send_script(tx, &["still", " ", "alive"]).await;

        let fragments: Vec<StreamFragment> = live.collect().await;
        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments.last(), Some(&StreamFragment::Done));
    }

    #[tokio::test]
    async fn generation_survives_a_dropped_live_stream() {
        let store = Arc::new(MemoryChunkLog::new());
        let streams = Arc::new(ActiveStreams::new());
        let publisher = StreamPublisher::new(store.clone(), streams.clone());

        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let session_id = session.session_id;

        let (tx, rx) = mpsc::channel(8);
        let live = publisher.publish(session, rx).await;
        drop(live); // caller disconnects immediately

        send_script(tx, &["Hello", " ", "world", "!"]).await;

        let snapshot = wait_for_chunks(&store, session_id, 4).await;
        assert_eq!(snapshot.chunks.len(), 4);
        assert!(!snapshot.session.is_publishing());
        // Channel is torn down once the generation is done.
        assert!(streams.subscribe(session_id).is_none());
    }

    #[tokio::test]
    async fn producer_error_propagates_as_terminal_fragment() {
        let store = Arc::new(MemoryChunkLog::new());
        let streams = Arc::new(ActiveStreams::new());
        let publisher = StreamPublisher::new(store.clone(), streams);

        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let session_id = session.session_id;

        let (tx, rx) = mpsc::channel(8);
        let live = publisher.publish(session, rx).await;
        tx.send(StreamFragment::content("partial")).await.unwrap();
        tx.send(StreamFragment::error("backend exploded"))
            .await
            .unwrap();
        drop(tx);

        let fragments: Vec<StreamFragment> = live.collect().await;
        assert_eq!(
            fragments.last(),
            Some(&StreamFragment::error("backend exploded"))
        );

        let snapshot = wait_for_chunks(&store, session_id, 1).await;
        assert!(!snapshot.session.is_publishing());
    }

    #[tokio::test]
    async fn transient_fragments_are_not_persisted() {
        let store = Arc::new(MemoryChunkLog::new());
        let streams = Arc::new(ActiveStreams::new());
        let publisher = StreamPublisher::new(store.clone(), streams);

        let session = StreamSession::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let session_id = session.session_id;

        let (tx, rx) = mpsc::channel(8);
        let live = publisher.publish(session, rx).await;

        let entry = reflow_core::TransientEntry::new(
            "s",
            reflow_core::Destination::ChatInline,
            reflow_core::TransientKind::Status,
            "Searching...",
        );
        tx.send(StreamFragment::Transient(entry)).await.unwrap();
        tx.send(StreamFragment::content("answer")).await.unwrap();
        tx.send(StreamFragment::Done).await.unwrap();

        let fragments: Vec<StreamFragment> = live.collect().await;
        assert_eq!(fragments.len(), 3);

        let snapshot = wait_for_chunks(&store, session_id, 1).await;
        assert_eq!(snapshot.chunks.len(), 1);
        assert_eq!(snapshot.chunks[0].payload, "answer");
    }
}
