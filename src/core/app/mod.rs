//! Session context tying the repository, the current selection and the
//! streaming engine together.
//!
//! A presentation layer owns one [`ChatApp`] and calls into it; updates flow
//! back through the live-update callback registered with
//! [`ChatApp::subscribe`].

pub mod session;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::api::models::{DEFAULT_CHAT_MODEL_MARKER, DEFAULT_PREFERRED_FAMILY};
use crate::api::ChatRequest;
use crate::core::catalog::ModelCatalog;
use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamParams};
use crate::core::error::{ChatError, Precondition, Result};
use crate::core::message::Role;
use crate::core::repository::ConversationRepository;
use crate::core::state::{Chat, Project};
use crate::core::transport::CompletionTransport;

pub use session::{CompletionSession, SessionState};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Invoked with `(message_id, accumulated_text)` every time a streamed
/// message grows.
pub type LiveUpdateCallback = Box<dyn FnMut(&str, &str) + Send>;

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub model: String,
    pub idle_timeout: Option<Duration>,
    pub chat_model_marker: String,
    pub preferred_model_family: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            idle_timeout: None,
            chat_model_marker: DEFAULT_CHAT_MODEL_MARKER.to_string(),
            preferred_model_family: DEFAULT_PREFERRED_FAMILY.to_string(),
        }
    }
}

pub struct ChatApp {
    repository: ConversationRepository,
    transport: Arc<dyn CompletionTransport>,
    current_project: Option<String>,
    current_chat: Option<String>,
    model: String,
    idle_timeout: Option<Duration>,
    catalog: ModelCatalog,
    sessions: HashMap<String, CompletionSession>,
    next_stream_id: u64,
    on_update: Option<LiveUpdateCallback>,
    fallback_api_key: Option<String>,
}

impl ChatApp {
    pub fn new(
        repository: ConversationRepository,
        transport: Arc<dyn CompletionTransport>,
        settings: AppSettings,
    ) -> Self {
        Self {
            repository,
            transport,
            current_project: None,
            current_chat: None,
            model: settings.model,
            idle_timeout: settings.idle_timeout,
            catalog: ModelCatalog::new(
                settings.chat_model_marker,
                settings.preferred_model_family,
            ),
            sessions: HashMap::new(),
            next_stream_id: 0,
            on_update: None,
            fallback_api_key: None,
        }
    }

    pub fn repository(&self) -> &ConversationRepository {
        &self.repository
    }

    pub fn current_project(&self) -> Option<&str> {
        self.current_project.as_deref()
    }

    pub fn current_chat(&self) -> Option<&str> {
        self.current_chat.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn available_models(&self) -> &[String] {
        self.catalog.models()
    }

    /// Register the live-update callback, replacing any previous one.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&str, &str) + Send + 'static,
    {
        self.on_update = Some(Box::new(callback));
    }

    pub fn set_api_key(&mut self, api_key: &str) -> Result<()> {
        self.repository.set_api_key(api_key)
    }

    /// Key used when none is stored, e.g. from the environment. Never saved.
    pub fn set_fallback_api_key(&mut self, api_key: Option<String>) {
        self.fallback_api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
    }

    /// The stored key, or the fallback when no key is stored.
    pub fn api_key(&self) -> &str {
        let stored = self.repository.api_key();
        if stored.is_empty() {
            self.fallback_api_key.as_deref().unwrap_or_default()
        } else {
            stored
        }
    }

    pub fn select_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    pub async fn refresh_models(&mut self) -> &[String] {
        let api_key = self.api_key().to_string();
        self.catalog
            .refresh(self.transport.as_ref(), &api_key)
            .await
    }

    pub fn create_project(&mut self, name: &str) -> Result<Project> {
        self.repository.create_project(name)
    }

    /// Create a chat under the selected project and select it.
    pub fn create_chat(&mut self, name: &str) -> Result<Chat> {
        let chat = self
            .repository
            .create_chat(self.current_project.as_deref(), name)?;
        self.current_chat = Some(chat.id.clone());
        Ok(chat)
    }

    pub fn delete_project(&mut self, project_id: &str) -> Result<()> {
        let removed = self.repository.delete_project(project_id)?;
        if self.current_project.as_deref() == Some(project_id) {
            self.current_project = None;
            self.current_chat = None;
        }
        for chat_id in &removed {
            self.forget_chat(chat_id);
        }
        Ok(())
    }

    pub fn delete_chat(&mut self, chat_id: &str) -> Result<()> {
        self.repository.delete_chat(chat_id)?;
        self.forget_chat(chat_id);
        Ok(())
    }

    pub fn select_project(&mut self, project_id: &str) -> Result<()> {
        if self.repository.project(project_id).is_none() {
            return Err(Precondition::UnknownProject(project_id.to_string()).into());
        }
        self.current_project = Some(project_id.to_string());
        self.current_chat = None;
        Ok(())
    }

    /// Select a chat; its project becomes the selected project.
    pub fn select_chat(&mut self, chat_id: &str) -> Result<()> {
        let chat = self
            .repository
            .chat(chat_id)
            .ok_or_else(|| Precondition::UnknownChat(chat_id.to_string()))?;
        self.current_project = Some(chat.project_id.clone());
        self.current_chat = Some(chat.id.clone());
        Ok(())
    }

    pub fn session(&self, chat_id: &str) -> Option<&CompletionSession> {
        self.sessions.get(chat_id)
    }

    pub fn session_state(&self, chat_id: &str) -> SessionState {
        self.sessions
            .get(chat_id)
            .map_or(SessionState::Idle, CompletionSession::state)
    }

    /// Record the user's message in the selected chat and prepare the
    /// completion request. Nothing is recorded when a precondition fails.
    pub fn begin_send(&mut self, text: &str) -> Result<StreamParams> {
        let chat_id = self
            .current_chat
            .clone()
            .ok_or(Precondition::NoChatSelected)?;
        if self.api_key().is_empty() {
            return Err(Precondition::NoCredential.into());
        }
        if self.session_state(&chat_id).is_active() {
            return Err(Precondition::SessionBusy.into());
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::validation("Message must not be empty"));
        }

        self.repository
            .append_message(&chat_id, Role::User, text, None)?;
        // The history already ends with the message just recorded.
        let messages = self.repository.history(&chat_id)?;

        self.next_stream_id += 1;
        let stream_id = self.next_stream_id;
        self.sessions
            .insert(chat_id.clone(), CompletionSession::new(chat_id.clone(), stream_id));
        debug!(%chat_id, stream_id, model = %self.model, "Prepared completion request");

        Ok(StreamParams {
            transport: Arc::clone(&self.transport),
            api_key: self.api_key().to_string(),
            request: ChatRequest {
                model: self.model.clone(),
                messages,
                stream: true,
            },
            stream_id,
            idle_timeout: self.idle_timeout,
        })
    }

    /// Apply one message from a running stream. Returns the final outcome
    /// once the stream has completed or failed; messages for streams that are
    /// no longer active are ignored.
    pub fn handle_stream_message(
        &mut self,
        message: StreamMessage,
        stream_id: u64,
    ) -> Option<Result<()>> {
        let Some(session) = self
            .sessions
            .values_mut()
            .find(|session| session.stream_id() == stream_id && session.is_active())
        else {
            debug!(stream_id, "Ignoring message for inactive stream");
            return None;
        };

        match message {
            StreamMessage::Opened => match session.open(&mut self.repository) {
                Ok(()) => None,
                Err(err) => {
                    session.fail(err.clone());
                    Some(Err(err))
                }
            },
            StreamMessage::Chunk(text) => {
                if let Some((message_id, content)) = session.push_delta(&text) {
                    if let Some(callback) = self.on_update.as_mut() {
                        callback(message_id, content);
                    }
                }
                None
            }
            StreamMessage::End => match session.complete(&mut self.repository) {
                Ok(()) => {
                    debug!(stream_id, chat_id = %session.chat_id(), "Committed streamed response");
                    Some(Ok(()))
                }
                Err(err) => {
                    session.fail(err.clone());
                    Some(Err(err))
                }
            },
            StreamMessage::Error(err) => {
                debug!(stream_id, error = %err, "Completion failed");
                session.fail(err.clone());
                Some(Err(err))
            }
        }
    }

    /// Send `text` to the selected chat and stream the answer to completion.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let params = self.begin_send(text)?;
        let stream_id = params.stream_id;

        let (service, mut rx) = ChatStreamService::new();
        let handle = service.spawn_stream(params);
        drop(service);

        while let Some((message, id)) = rx.recv().await {
            if let Some(outcome) = self.handle_stream_message(message, id) {
                handle.abort();
                return outcome;
            }
        }

        let err = ChatError::transport("Stream ended without a result");
        if let Some(session) = self
            .sessions
            .values_mut()
            .find(|session| session.stream_id() == stream_id && session.is_active())
        {
            session.fail(err.clone());
        }
        Err(err)
    }

    fn forget_chat(&mut self, chat_id: &str) {
        if self.current_chat.as_deref() == Some(chat_id) {
            self.current_chat = None;
        }
        if self.sessions.remove(chat_id).is_some() {
            debug!(chat_id, "Dropped session for deleted chat");
        }
    }
}
