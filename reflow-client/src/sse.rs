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

//! SSE transport for live and resumed streams.
//!
//! One SSE event carries one fragment, so the parser hands payloads to the
//! consumer at exactly the granularity the publisher flushed them.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),
}

/// Incremental SSE parser.
///
/// Feed it raw body bytes as they arrive; it returns the `data` payload of
/// every event completed so far. Comment lines (keep-alives) are dropped.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..boundary + 2).collect();
            if let Some(data) = parse_event_block(&block) {
                payloads.push(data);
            }
        }
        payloads
    }
}

fn parse_event_block(block: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in block.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    Some(data_lines.join("\n"))
}

/// An open stream of fragment payloads.
pub struct FragmentStream {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: SseParser,
    pending: std::collections::VecDeque<String>,
}

impl FragmentStream {
    fn new(inner: BoxStream<'static, reqwest::Result<Bytes>>) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            pending: std::collections::VecDeque::new(),
        }
    }

    /// Next event payload; `None` once the connection closes.
    pub async fn next_event(&mut self) -> Option<String> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return Some(payload);
            }

            match self.inner.next().await? {
                Ok(bytes) => {
                    self.pending.extend(self.parser.push(&bytes));
                }
                Err(e) => {
                    debug!(error = %e, "stream transport ended");
                    return None;
                }
            }
        }
    }
}

/// HTTP client for the conversation stream endpoints.
pub struct SseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SseClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    /// Begin a generation and attach to its live stream.
    pub async fn start_stream(
        &self,
        conversation_id: Uuid,
        prompt: &str,
    ) -> Result<FragmentStream, ClientError> {
        let url = format!(
            "{}/api/v1/conversations/{}/stream",
            self.base_url, conversation_id
        );
        let response = self
            .request(self.http.post(url))
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(ClientError::UnexpectedStatus(response.status()));
        }

        Ok(FragmentStream::new(response.bytes_stream().boxed()))
    }

    /// Reattach to the conversation's most recent stream.
    ///
    /// `Ok(None)` means there is nothing to continue: the session ended,
    /// expired, or the server's store is unavailable. That outcome is
    /// ordinary, not an error.
    pub async fn resume(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<FragmentStream>, ClientError> {
        let url = format!(
            "{}/api/v1/conversations/{}/resume",
            self.base_url, conversation_id
        );
        let response = self
            .request(self.http.get(url))
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::OK => {
                Ok(Some(FragmentStream::new(response.bytes_stream().boxed())))
            }
            reqwest::StatusCode::NO_CONTENT => Ok(None),
            status => Err(ClientError::UnexpectedStatus(status)),
        }
    }
}
