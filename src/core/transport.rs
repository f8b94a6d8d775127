//! HTTP seam between the stream engine and the remote API.
//!
//! [`CompletionTransport`] is the only place that knows about reqwest; the
//! stream engine sees a status code and a stream of byte chunks.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::api::models::fetch_models;
use crate::api::{ChatRequest, ModelsResponse};
use crate::core::error::ChatError;
use crate::utils::auth::add_auth_headers;
use crate::utils::url::construct_api_url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Response body chunks as they arrive. An `Err` item is a connection
/// failure; the stream ends after it.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, String>>;

pub enum CompletionResponse {
    /// 2xx: the body is an event stream.
    Streaming(ByteStream),
    /// Any other status, with the full error body.
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn open_completion(
        &self,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<CompletionResponse, ChatError>;

    async fn list_models(&self, api_key: &str) -> Result<ModelsResponse, ChatError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn open_completion(
        &self,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<CompletionResponse, ChatError> {
        let chat_url = construct_api_url(&self.base_url, "chat/completions");
        let http_request = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json");
        let http_request = add_auth_headers(http_request, api_key);

        let response = http_request
            .json(request)
            .send()
            .await
            .map_err(|err| ChatError::transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Ok(CompletionResponse::Rejected { status, body });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|err| err.to_string()))
            .boxed();
        Ok(CompletionResponse::Streaming(stream))
    }

    async fn list_models(&self, api_key: &str) -> Result<ModelsResponse, ChatError> {
        fetch_models(&self.client, &self.base_url, api_key).await
    }
}
