use std::cmp::Ordering;

use crate::api::ModelsResponse;
use crate::core::chat_stream::describe_error_body;
use crate::core::error::ChatError;
use crate::utils::auth::add_auth_headers;
use crate::utils::url::construct_api_url;

/// Substring that marks an identifier as a chat model.
pub const DEFAULT_CHAT_MODEL_MARKER: &str = "gpt";

/// Models whose identifier contains this family sort ahead of the rest.
pub const DEFAULT_PREFERRED_FAMILY: &str = "gpt-4";

pub async fn fetch_models(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
) -> Result<ModelsResponse, ChatError> {
    let models_url = construct_api_url(base_url, "models");
    let request = client
        .get(models_url)
        .header("Content-Type", "application/json");
    let request = add_auth_headers(request, api_key);

    let response = request
        .send()
        .await
        .map_err(|err| ChatError::transport(err.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ChatError::Remote(describe_error_body(
            status.as_u16(),
            &error_text,
        )));
    }

    response
        .json::<ModelsResponse>()
        .await
        .map_err(|err| ChatError::transport(format!("Invalid models response: {err}")))
}

/// Keep chat models and order them for a model picker: ids in the preferred
/// family first, then everything else, each group in lexical order.
pub fn rank_models<I, S>(ids: I, marker: &str, preferred_family: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut models: Vec<String> = ids
        .into_iter()
        .map(Into::into)
        .filter(|id| id.contains(marker))
        .collect();

    models.sort_by(|a, b| {
        let a_preferred = a.contains(preferred_family);
        let b_preferred = b.contains(preferred_family);
        match (a_preferred, b_preferred) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.cmp(b),
        }
    });
    models.dedup();
    models
}
