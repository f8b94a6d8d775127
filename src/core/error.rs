//! Error types shared by the repository, the stream engine and the CLI.
//!
//! Every variant carries a message that can be shown to the user verbatim.
//! Malformed stream frames never reach this type: the decoder logs and skips
//! them so a single bad frame cannot abort a response.

use thiserror::Error;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// A user-supplied value (project name, chat name, message text) was rejected.
    #[error("{0}")]
    Validation(String),

    /// The operation is not allowed in the current state.
    #[error(transparent)]
    Precondition(#[from] Precondition),

    /// The request could not be sent, or the connection failed mid-stream.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The API answered with a structured error message.
    #[error("API Error: {0}")]
    Remote(String),

    /// The conversation snapshot could not be loaded or saved.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("Please select a project first")]
    NoProjectSelected,

    #[error("Please select a chat first")]
    NoChatSelected,

    #[error("No API key configured")]
    NoCredential,

    #[error("A response is still streaming for this chat")]
    SessionBusy,

    #[error("No project with id {0}")]
    UnknownProject(String),

    #[error("No chat with id {0}")]
    UnknownChat(String),

    #[error("Chat {0} has no messages")]
    EmptyChat(String),
}

/// Failures of the persistence backend.
///
/// Messages are kept as strings so the error stays `Clone` and can travel
/// across the stream channel alongside other [`ChatError`]s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("storage serialization error: {0}")]
    Serialization(String),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ChatError::Transport(message.into())
    }

    pub fn is_precondition(&self, expected: &Precondition) -> bool {
        matches!(self, ChatError::Precondition(actual) if actual == expected)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_messages_pass_through_unchanged() {
        let err: ChatError = Precondition::NoChatSelected.into();
        assert_eq!(err.to_string(), "Please select a chat first");
        assert!(err.is_precondition(&Precondition::NoChatSelected));
        assert!(!err.is_precondition(&Precondition::SessionBusy));
    }

    #[test]
    fn remote_errors_are_prefixed() {
        let err = ChatError::Remote("model overloaded".into());
        assert_eq!(err.to_string(), "API Error: model overloaded");
    }

    #[test]
    fn io_errors_convert_into_storage_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ChatError = StoreError::from(io).into();
        assert!(matches!(err, ChatError::Storage(StoreError::Io(ref msg)) if msg == "denied"));
    }
}
