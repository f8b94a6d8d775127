use crate::core::error::{ChatError, Result};
use crate::core::message::Role;
use crate::core::repository::ConversationRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Sending | SessionState::Streaming)
    }
}

/// One request/response cycle for a chat.
///
/// The session starts in `Sending` once the user message is recorded, moves
/// to `Streaming` when the API accepts the request (at which point the empty
/// assistant placeholder is appended), and ends in `Completed` after the
/// accumulated text is committed, or in `Failed`.
#[derive(Debug, Clone)]
pub struct CompletionSession {
    chat_id: String,
    stream_id: u64,
    state: SessionState,
    message_id: Option<String>,
    content: String,
    error: Option<ChatError>,
}

impl CompletionSession {
    pub(crate) fn new(chat_id: String, stream_id: u64) -> Self {
        Self {
            chat_id,
            stream_id,
            state: SessionState::Sending,
            message_id: None,
            content: String::new(),
            error: None,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Id of the streamed assistant message, once the placeholder exists.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Text accumulated so far. After a failure this may be ahead of what the
    /// repository holds.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn error(&self) -> Option<&ChatError> {
        self.error.as_ref()
    }

    pub(crate) fn open(&mut self, repository: &mut ConversationRepository) -> Result<()> {
        if self.state != SessionState::Sending {
            return Ok(());
        }
        let message_id = repository.generate_id();
        repository.append_message(
            &self.chat_id,
            Role::Assistant,
            "",
            Some(message_id.clone()),
        )?;
        self.message_id = Some(message_id);
        self.state = SessionState::Streaming;
        Ok(())
    }

    /// Accumulate a delta; returns `(message_id, accumulated_text)` for the
    /// live-update callback.
    pub(crate) fn push_delta(&mut self, text: &str) -> Option<(&str, &str)> {
        if self.state != SessionState::Streaming {
            return None;
        }
        self.content.push_str(text);
        let message_id = self.message_id.as_deref()?;
        Some((message_id, self.content.as_str()))
    }

    /// Commit the accumulated text as the durable content of the placeholder.
    pub(crate) fn complete(&mut self, repository: &mut ConversationRepository) -> Result<()> {
        self.open(repository)?;
        repository.update_last_message_content(&self.chat_id, &self.content)?;
        self.state = SessionState::Completed;
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: ChatError) {
        self.state = SessionState::Failed;
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::SequentialIdGenerator;
    use crate::core::store::MemoryStore;

    fn repo_with_chat() -> (ConversationRepository, String) {
        let mut repo = ConversationRepository::open(
            Box::new(MemoryStore::new()),
            Box::new(SequentialIdGenerator::default()),
        )
        .unwrap();
        let project = repo.create_project("P").unwrap();
        let chat = repo.create_chat(Some(&project.id), "C").unwrap();
        (repo, chat.id)
    }

    #[test]
    fn deltas_before_open_are_ignored() {
        let mut session = CompletionSession::new("c".into(), 1);
        assert!(session.push_delta("early").is_none());
        assert_eq!(session.content(), "");
    }

    #[test]
    fn full_lifecycle_commits_accumulated_text() {
        let (mut repo, chat_id) = repo_with_chat();
        let mut session = CompletionSession::new(chat_id.clone(), 1);
        assert_eq!(session.state(), SessionState::Sending);

        session.open(&mut repo).unwrap();
        assert_eq!(session.state(), SessionState::Streaming);
        let message_id = session.message_id().unwrap().to_string();

        assert_eq!(session.push_delta("Hel"), Some((message_id.as_str(), "Hel")));
        assert_eq!(session.push_delta("lo"), Some((message_id.as_str(), "Hello")));
        assert_eq!(repo.messages(&chat_id).unwrap()[0].content, "");

        session.complete(&mut repo).unwrap();
        assert_eq!(session.state(), SessionState::Completed);
        let stored = &repo.messages(&chat_id).unwrap()[0];
        assert_eq!(stored.content, "Hello");
        assert_eq!(stored.id.as_deref(), Some(message_id.as_str()));
        assert!(session.push_delta("late").is_none());
    }

    #[test]
    fn failure_keeps_partial_text_out_of_the_repository() {
        let (mut repo, chat_id) = repo_with_chat();
        let mut session = CompletionSession::new(chat_id.clone(), 1);
        session.open(&mut repo).unwrap();
        session.push_delta("partial");

        session.fail(ChatError::transport("reset"));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.content(), "partial");
        assert_eq!(repo.messages(&chat_id).unwrap()[0].content, "");
        assert!(!session.is_active());
    }
}
