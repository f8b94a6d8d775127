use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse};
use crate::core::error::ChatError;
use crate::core::transport::{CompletionResponse, CompletionTransport};

/// Outcome of decoding one complete `data:` line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Newly generated text for the in-progress message.
    Delta(String),
    /// The provider reported an error inside the stream.
    Error(String),
    /// `[DONE]` sentinel.
    End,
}

/// Incremental parser for an OpenAI-style server-sent event stream.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; incomplete data is
/// buffered until its newline arrives. After `End` or `Error` the decoder is
/// finished and ignores further input.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished || chunk.is_empty() {
            return events;
        }

        self.buffer.extend_from_slice(chunk);
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = match std::str::from_utf8(&line_bytes) {
                Ok(s) => s.trim(),
                Err(e) => {
                    warn!(error = %e, "Skipping stream line with invalid UTF-8");
                    continue;
                }
            };

            if let Some(event) = process_sse_line(line) {
                let terminal = matches!(event, StreamEvent::End | StreamEvent::Error(_));
                events.push(event);
                if terminal {
                    self.finish();
                    break;
                }
            }
        }
        events
    }

    /// The transport is done; anything still buffered had no line terminator
    /// and is dropped.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            debug!(
                bytes = self.buffer.len(),
                "Discarding unterminated trailing stream data"
            );
        }
        self.buffer.clear();
        self.finished = true;
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(payload: &str) -> Option<StreamEvent> {
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(StreamEvent::End);
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(StreamEvent::Delta),
        Err(err) => {
            let summary = serde_json::from_str::<serde_json::Value>(payload)
                .ok()
                .and_then(|value| extract_stream_error(&value))
                .filter(|summary| !summary.is_empty());
            if let Some(summary) = summary {
                return Some(StreamEvent::Error(summary));
            }
            warn!(error = %err, payload = %preview(payload), "Skipping malformed stream frame");
            None
        }
    }
}

fn process_sse_line(line: &str) -> Option<StreamEvent> {
    extract_data_payload(line).and_then(handle_data_payload)
}

fn preview(payload: &str) -> &str {
    match payload.char_indices().nth(120) {
        Some((idx, _)) => &payload[..idx],
        None => payload,
    }
}

/// In-stream failures must carry an explicit `error` key; any other frame
/// without `choices` is skipped like other malformed frames.
fn extract_stream_error(value: &serde_json::Value) -> Option<String> {
    value.get("error")?;
    extract_error_summary(value)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Human-readable message for a non-2xx response body.
pub(crate) fn describe_error_body(status: u16, body: &str) -> String {
    let trimmed = body.trim();

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            if !summary.is_empty() {
                return summary;
            }
        }
    }

    if trimmed.is_empty() {
        format!("HTTP {status} with empty body")
    } else {
        format!("HTTP {status}: {trimmed}")
    }
}

/// Messages delivered from a running stream task, tagged with its stream id.
/// Every stream ends with exactly one `End` or `Error`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    /// The API accepted the request; content will follow.
    Opened,
    Chunk(String),
    Error(ChatError),
    End,
}

pub struct StreamParams {
    pub transport: Arc<dyn CompletionTransport>,
    pub api_key: String,
    pub request: ChatRequest,
    pub stream_id: u64,
    pub idle_timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) -> JoinHandle<()> {
        let tx_clone = self.tx.clone();
        tokio::spawn(async move {
            run_stream(params, &tx_clone).await;
        })
    }
}

/// Issue the request and forward decoded events until the stream ends.
pub async fn run_stream(params: StreamParams, tx: &mpsc::UnboundedSender<(StreamMessage, u64)>) {
    let StreamParams {
        transport,
        api_key,
        request,
        stream_id,
        idle_timeout,
    } = params;

    let send = |message: StreamMessage| {
        let _ = tx.send((message, stream_id));
    };

    debug!(
        stream_id,
        model = %request.model,
        messages = request.messages.len(),
        "Opening completion stream"
    );

    let mut body = match transport.open_completion(&api_key, &request).await {
        Ok(CompletionResponse::Streaming(body)) => body,
        Ok(CompletionResponse::Rejected { status, body }) => {
            debug!(stream_id, status, "Completion request rejected");
            send(StreamMessage::Error(ChatError::Remote(describe_error_body(
                status, &body,
            ))));
            return;
        }
        Err(err) => {
            send(StreamMessage::Error(err));
            return;
        }
    };

    send(StreamMessage::Opened);
    let mut decoder = StreamDecoder::new();

    loop {
        let read = async {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, body.next())
                    .await
                    .map_err(|_| limit),
                None => Ok(body.next().await),
            }
        };

        let next = tokio::select! {
            _ = tx.closed() => {
                debug!(stream_id, "Stream receiver dropped; abandoning completion stream");
                return;
            }
            read = read => match read {
                Ok(next) => next,
                Err(limit) => {
                    debug!(stream_id, "Completion stream idle timeout");
                    send(StreamMessage::Error(ChatError::transport(format!(
                        "No data received for {} ms",
                        limit.as_millis()
                    ))));
                    return;
                }
            },
        };

        match next {
            Some(Ok(chunk)) => {
                for event in decoder.feed(&chunk) {
                    match event {
                        StreamEvent::Delta(text) => send(StreamMessage::Chunk(text)),
                        StreamEvent::Error(message) => {
                            send(StreamMessage::Error(ChatError::Remote(message)));
                            return;
                        }
                        StreamEvent::End => {
                            debug!(stream_id, "Completion stream finished");
                            send(StreamMessage::End);
                            return;
                        }
                    }
                }
            }
            Some(Err(err)) => {
                debug!(stream_id, error = %err, "Completion stream broke");
                send(StreamMessage::Error(ChatError::transport(err)));
                return;
            }
            None => {
                decoder.finish();
                debug!(stream_id, "Completion stream closed without [DONE]");
                send(StreamMessage::End);
                return;
            }
        }
    }
}
