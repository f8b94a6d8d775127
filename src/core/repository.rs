//! In-memory project/chat/message hierarchy backed by a [`PersistentStore`].

use tracing::{debug, warn};

use crate::api::ChatMessage;
use crate::core::error::{ChatError, Precondition, Result};
use crate::core::ids::IdGenerator;
use crate::core::message::{Message, Role};
use crate::core::state::{Chat, ConversationState, Project};
use crate::core::store::PersistentStore;

pub struct ConversationRepository {
    state: ConversationState,
    store: Box<dyn PersistentStore>,
    ids: Box<dyn IdGenerator>,
}

impl ConversationRepository {
    /// Load the stored snapshot, or start from the empty default state.
    pub fn open(
        store: Box<dyn PersistentStore>,
        ids: Box<dyn IdGenerator>,
    ) -> Result<Self> {
        let state = match store.load()? {
            Some(mut state) => {
                if state.repair() {
                    warn!("Loaded conversation snapshot violated hierarchy invariants; repaired");
                }
                state
            }
            None => ConversationState::default(),
        };
        Ok(Self { state, store, ids })
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn api_key(&self) -> &str {
        &self.state.api_key
    }

    pub fn projects(&self) -> &[Project] {
        &self.state.projects
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.state.project(id)
    }

    pub fn chat(&self, id: &str) -> Option<&Chat> {
        self.state.chat(id)
    }

    pub fn chats_for_project<'a>(&'a self, project_id: &'a str) -> impl Iterator<Item = &'a Chat> {
        self.state
            .chats
            .iter()
            .filter(move |chat| chat.project_id == project_id)
    }

    pub fn messages(&self, chat_id: &str) -> Option<&[Message]> {
        self.state.messages.get(chat_id).map(Vec::as_slice)
    }

    pub fn generate_id(&mut self) -> String {
        self.ids.next_id()
    }

    pub fn set_api_key(&mut self, api_key: &str) -> Result<()> {
        let api_key = api_key.trim().to_string();
        self.mutate(|state| {
            state.api_key = api_key;
            Ok(())
        })
    }

    pub fn create_project(&mut self, name: &str) -> Result<Project> {
        let name = validate_name(name, "Project")?;
        let project = Project {
            id: self.ids.next_id(),
            name,
        };
        let created = project.clone();
        self.mutate(|state| {
            state.projects.push(project);
            Ok(())
        })?;
        debug!(project_id = %created.id, "Created project");
        Ok(created)
    }

    /// `project_id` is the caller's current project selection.
    pub fn create_chat(&mut self, project_id: Option<&str>, name: &str) -> Result<Chat> {
        let project_id = project_id.ok_or(Precondition::NoProjectSelected)?;
        if self.state.project(project_id).is_none() {
            return Err(Precondition::UnknownProject(project_id.to_string()).into());
        }
        let name = validate_name(name, "Chat")?;
        let chat = Chat {
            id: self.ids.next_id(),
            project_id: project_id.to_string(),
            name,
        };
        let created = chat.clone();
        self.mutate(|state| {
            state.messages.insert(chat.id.clone(), Vec::new());
            state.chats.push(chat);
            Ok(())
        })?;
        debug!(chat_id = %created.id, project_id = %created.project_id, "Created chat");
        Ok(created)
    }

    /// Remove a project with all of its chats and their messages in a single
    /// save. Returns the ids of the removed chats. Unknown ids are a no-op.
    pub fn delete_project(&mut self, project_id: &str) -> Result<Vec<String>> {
        if self.state.project(project_id).is_none()
            && self.chats_for_project(project_id).next().is_none()
        {
            return Ok(Vec::new());
        }

        let removed = self.mutate(|state| {
            let removed: Vec<String> = state
                .chats
                .iter()
                .filter(|chat| chat.project_id == project_id)
                .map(|chat| chat.id.clone())
                .collect();
            for chat_id in &removed {
                state.messages.remove(chat_id);
            }
            state.chats.retain(|chat| chat.project_id != project_id);
            state.projects.retain(|project| project.id != project_id);
            Ok(removed)
        })?;
        debug!(project_id, chats = removed.len(), "Deleted project");
        Ok(removed)
    }

    /// Remove a chat and its messages. Returns false if it did not exist.
    pub fn delete_chat(&mut self, chat_id: &str) -> Result<bool> {
        if self.state.chat(chat_id).is_none() && !self.state.messages.contains_key(chat_id) {
            return Ok(false);
        }
        self.mutate(|state| {
            state.messages.remove(chat_id);
            state.chats.retain(|chat| chat.id != chat_id);
            Ok(())
        })?;
        debug!(chat_id, "Deleted chat");
        Ok(true)
    }

    pub fn append_message(
        &mut self,
        chat_id: &str,
        role: Role,
        content: &str,
        id: Option<String>,
    ) -> Result<()> {
        if !self.state.messages.contains_key(chat_id) {
            return Err(Precondition::UnknownChat(chat_id.to_string()).into());
        }
        let message = Message {
            role,
            content: content.to_string(),
            id,
        };
        self.mutate(|state| {
            if let Some(messages) = state.messages.get_mut(chat_id) {
                messages.push(message);
            }
            Ok(())
        })
    }

    /// Replace the content of the newest message in a chat.
    pub fn update_last_message_content(&mut self, chat_id: &str, content: &str) -> Result<()> {
        match self.state.messages.get(chat_id) {
            None => return Err(Precondition::UnknownChat(chat_id.to_string()).into()),
            Some(messages) if messages.is_empty() => {
                return Err(Precondition::EmptyChat(chat_id.to_string()).into())
            }
            Some(_) => {}
        }
        self.mutate(|state| {
            if let Some(last) = state
                .messages
                .get_mut(chat_id)
                .and_then(|messages| messages.last_mut())
            {
                last.content = content.to_string();
            }
            Ok(())
        })
    }

    /// Transcript in the shape sent to the completion endpoint.
    pub fn history(&self, chat_id: &str) -> Result<Vec<ChatMessage>> {
        let messages = self
            .state
            .messages
            .get(chat_id)
            .ok_or_else(|| Precondition::UnknownChat(chat_id.to_string()))?;
        Ok(messages.iter().map(Message::to_api_message).collect())
    }

    /// Apply `mutator` to a copy of the state, persist the copy, and only
    /// then make it current. A failed save leaves the repository untouched.
    fn mutate<F, T>(&mut self, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut ConversationState) -> Result<T>,
    {
        let mut working = self.state.clone();
        let result = mutator(&mut working)?;
        self.store.save(&working)?;
        self.state = working;
        Ok(result)
    }
}

fn validate_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ChatError::validation(format!("{what} name must not be empty")));
    }
    Ok(trimmed.to_string())
}
