use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::api::{ChatRequest, ModelInfo, ModelsResponse};
use crate::core::app::{AppSettings, ChatApp};
use crate::core::error::ChatError;
use crate::core::ids::SequentialIdGenerator;
use crate::core::repository::ConversationRepository;
use crate::core::store::MemoryStore;
use crate::core::transport::{CompletionResponse, CompletionTransport};

/// One `data:` line carrying a content delta, newline included.
pub fn sse_delta(content: &str) -> String {
    let payload = serde_json::json!({
        "choices": [{"index": 0, "delta": {"content": content}}]
    });
    format!("data: {payload}\n")
}

pub enum ScriptedReply {
    Stream(Vec<Result<Vec<u8>, String>>),
    /// Deliver the chunks, then never produce another one.
    Stall(Vec<String>),
    Rejected { status: u16, body: String },
    Fail(ChatError),
}

impl ScriptedReply {
    pub fn chunks(chunks: Vec<String>) -> Self {
        ScriptedReply::Stream(chunks.into_iter().map(|c| Ok(c.into_bytes())).collect())
    }
}

/// In-process transport that replays queued replies and records requests.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<(String, ChatRequest)>>,
    models: Mutex<Option<Result<Vec<String>, ChatError>>>,
    model_requests: Mutex<usize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn set_models(&self, models: Result<Vec<&str>, ChatError>) {
        let models = models.map(|ids| ids.into_iter().map(str::to_string).collect());
        *self.models.lock().unwrap() = Some(models);
    }

    /// `(api_key, request)` pairs in the order they were sent.
    pub fn requests(&self) -> Vec<(String, ChatRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn model_requests(&self) -> usize {
        *self.model_requests.lock().unwrap()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn open_completion(
        &self,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<CompletionResponse, ChatError> {
        self.requests
            .lock()
            .unwrap()
            .push((api_key.to_string(), request.clone()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply queued");
        match reply {
            ScriptedReply::Stream(chunks) => Ok(CompletionResponse::Streaming(
                stream::iter(chunks).boxed(),
            )),
            ScriptedReply::Stall(chunks) => Ok(CompletionResponse::Streaming(
                stream::iter(chunks.into_iter().map(|c| Ok(c.into_bytes())))
                    .chain(stream::pending())
                    .boxed(),
            )),
            ScriptedReply::Rejected { status, body } => {
                Ok(CompletionResponse::Rejected { status, body })
            }
            ScriptedReply::Fail(err) => Err(err),
        }
    }

    async fn list_models(&self, _api_key: &str) -> Result<ModelsResponse, ChatError> {
        *self.model_requests.lock().unwrap() += 1;
        let models = self
            .models
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))?;
        Ok(ModelsResponse {
            data: models
                .into_iter()
                .map(|id| ModelInfo {
                    id,
                    created: None,
                    owned_by: None,
                })
                .collect(),
        })
    }
}

/// App over an in-memory store with deterministic ids and an API key set.
pub fn create_test_app() -> (ChatApp, MemoryStore, Arc<ScriptedTransport>) {
    let store = MemoryStore::new();
    let mut repository = ConversationRepository::open(
        Box::new(store.clone()),
        Box::new(SequentialIdGenerator::default()),
    )
    .unwrap();
    repository.set_api_key("sk-test").unwrap();
    let transport = Arc::new(ScriptedTransport::new());
    let app = ChatApp::new(repository, transport.clone(), AppSettings::default());
    (app, store, transport)
}

/// Like [`create_test_app`], with project "P" and chat "C" created and selected.
pub fn create_test_app_with_chat() -> (ChatApp, MemoryStore, Arc<ScriptedTransport>, String) {
    let (mut app, store, transport) = create_test_app();
    let project = app.create_project("P").unwrap();
    app.select_project(&project.id).unwrap();
    let chat = app.create_chat("C").unwrap();
    (app, store, transport, chat.id)
}

pub struct CannedResponse {
    status: u16,
    content_type: &'static str,
    chunks: Vec<String>,
    chunked: bool,
    truncate: bool,
}

impl CannedResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body.to_string()],
            chunked: false,
            truncate: false,
        }
    }

    /// Event-stream body written as separate HTTP chunks with a pause
    /// between them.
    pub fn chunked(status: u16, chunks: Vec<String>) -> Self {
        Self {
            status,
            content_type: "text/event-stream",
            chunks,
            chunked: true,
            truncate: false,
        }
    }

    /// Like [`CannedResponse::chunked`], but the connection is dropped
    /// before the terminating chunk.
    pub fn truncated(chunks: Vec<String>) -> Self {
        Self {
            truncate: true,
            ..Self::chunked(200, chunks)
        }
    }
}

#[derive(Clone, Debug)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub struct TestServer {
    pub base_url: String,
    captured: Arc<tokio::sync::Mutex<Vec<CapturedRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Requests received so far; waits for the server to finish its script.
    pub async fn requests(self) -> Vec<CapturedRequest> {
        let _ = self.task.await;
        self.captured.lock().await.clone()
    }
}

/// Serve one canned response per incoming connection, in order.
pub async fn spawn_http_server(responses: Vec<CannedResponse>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    let captured = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let captured_for_server = Arc::clone(&captured);

    let task = tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(request) = read_http_request(&mut stream).await else {
                return;
            };
            captured_for_server.lock().await.push(request);
            if write_response(&mut stream, response).await.is_err() {
                return;
            }
        }
    });

    TestServer {
        base_url: format!("http://{addr}"),
        captured,
        task,
    }
}

async fn write_response(stream: &mut TcpStream, response: CannedResponse) -> std::io::Result<()> {
    let reason = if response.status < 400 { "OK" } else { "Error" };
    if !response.chunked {
        let body = response.chunks.concat();
        let head = format!(
            "HTTP/1.1 {} {reason}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            response.status,
            response.content_type,
            body.len()
        );
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(body.as_bytes()).await?;
        return stream.flush().await;
    }

    let head = format!(
        "HTTP/1.1 {} {reason}\r\ncontent-type: {}\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n",
        response.status, response.content_type
    );
    stream.write_all(head.as_bytes()).await?;
    stream.flush().await?;
    for chunk in &response.chunks {
        let framed = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
        stream.write_all(framed.as_bytes()).await?;
        stream.flush().await?;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    if response.truncate {
        return stream.shutdown().await;
    }
    stream.write_all(b"0\r\n\r\n").await?;
    stream.flush().await
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}
