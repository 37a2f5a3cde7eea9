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

//! Generation backends.
//!
//! A producer hands back a channel of fragments; the publisher owns
//! everything downstream of that channel.

use std::time::Duration;

use async_trait::async_trait;
use reflow_core::{Destination, Result, StreamFragment, TransientEntry, TransientKind};
use tokio::sync::mpsc;
use uuid::Uuid;

#[async_trait]
pub trait FragmentProducer: Send + Sync {
    /// Start a generation for a conversation and return its fragment
    /// stream. The receiver ends after a terminal fragment, or closes
    /// without one on normal completion.
    async fn produce(
        &self,
        conversation_id: Uuid,
        prompt: String,
    ) -> Result<mpsc::Receiver<StreamFragment>>;
}

/// Development producer: announces itself with a transient status entry,
/// then echoes the prompt back word by word.
pub struct EchoProducer {
    pub chunk_delay: Duration,
}

impl Default for EchoProducer {
    fn default() -> Self {
        Self {
            chunk_delay: Duration::from_millis(30),
        }
    }
}

#[async_trait]
impl FragmentProducer for EchoProducer {
    async fn produce(
        &self,
        _conversation_id: Uuid,
        prompt: String,
    ) -> Result<mpsc::Receiver<StreamFragment>> {
        let (tx, rx) = mpsc::channel(64);
        let chunk_delay = self.chunk_delay;

        tokio::spawn(async move {
            let status = TransientEntry::new(
                "echo-status",
                Destination::ChatInline,
                TransientKind::Thinking,
                "Thinking...",
            );
            if tx.send(StreamFragment::Transient(status)).await.is_err() {
                return;
            }

            for word in prompt.split_inclusive(' ') {
                tokio::time::sleep(chunk_delay).await;
                if tx.send(StreamFragment::content(word)).await.is_err() {
                    return;
                }
            }

            let clear = TransientEntry::new(
                "echo-status",
                Destination::ChatInline,
                TransientKind::Thinking,
                "",
            );
            let _ = tx.send(StreamFragment::Transient(clear)).await;
            let _ = tx.send(StreamFragment::Done).await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_producer_round_trips_the_prompt() {
        let producer = EchoProducer {
            chunk_delay: Duration::from_millis(1),
        };
        let mut rx = producer
            .produce(Uuid::new_v4(), "Hello world!".to_string())
            .await
            .unwrap();

        let mut fragments = Vec::new();
        while let Some(fragment) = rx.recv().await {
            fragments.push(fragment);
        }

        assert!(matches!(
            fragments.first(),
            Some(StreamFragment::Transient(entry)) if !entry.is_clear()
        ));
        assert_eq!(fragments.last(), Some(&StreamFragment::Done));

        let text: String = fragments
            .iter()
            .filter_map(|f| match f {
                StreamFragment::Content { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello world!");
    }
}
