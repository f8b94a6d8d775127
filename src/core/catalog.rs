use tracing::{debug, warn};

use crate::api::models::{rank_models, DEFAULT_CHAT_MODEL_MARKER, DEFAULT_PREFERRED_FAMILY};
use crate::core::transport::CompletionTransport;

/// Best-effort list of chat models offered by the API.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<String>,
    marker: String,
    preferred_family: String,
}

impl ModelCatalog {
    pub fn new(marker: impl Into<String>, preferred_family: impl Into<String>) -> Self {
        Self {
            models: Vec::new(),
            marker: marker.into(),
            preferred_family: preferred_family.into(),
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Fetch and rank the model list. Failures are logged and the previous
    /// list is kept; this never returns an error.
    pub async fn refresh(
        &mut self,
        transport: &dyn CompletionTransport,
        api_key: &str,
    ) -> &[String] {
        if api_key.is_empty() {
            debug!("Skipping model refresh without an API key");
            return &self.models;
        }

        match transport.list_models(api_key).await {
            Ok(response) => {
                self.models = rank_models(
                    response.data.into_iter().map(|model| model.id),
                    &self.marker,
                    &self.preferred_family,
                );
                debug!(count = self.models.len(), "Refreshed model list");
            }
            Err(err) => {
                warn!(error = %err, "Failed to fetch models; keeping previous list");
            }
        }
        &self.models
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_CHAT_MODEL_MARKER, DEFAULT_PREFERRED_FAMILY)
    }
}
