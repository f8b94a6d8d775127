//! Authentication utilities for API requests

/// Attach the bearer credential used by OpenAI-compatible endpoints.
pub fn add_auth_headers(request: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
    request.header("Authorization", format!("Bearer {api_key}"))
}
