//! The persisted conversation hierarchy.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::message::Message;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub project_id: String,
    pub name: String,
}

/// Root aggregate; always saved and loaded as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub chats: Vec<Chat>,
    #[serde(default)]
    pub messages: BTreeMap<String, Vec<Message>>,
}

impl ConversationState {
    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn chat(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    /// Bring a loaded snapshot back in line with the hierarchy invariants:
    /// chats must point at a live project, every chat owns a message list,
    /// and no message list outlives its chat. Returns true if anything changed.
    pub fn repair(&mut self) -> bool {
        let mut changed = false;

        let project_ids: HashSet<&str> = self.projects.iter().map(|p| p.id.as_str()).collect();
        let before = self.chats.len();
        self.chats
            .retain(|chat| project_ids.contains(chat.project_id.as_str()));
        if self.chats.len() != before {
            warn!(
                dropped = before - self.chats.len(),
                "Dropped chats whose project no longer exists"
            );
            changed = true;
        }

        for chat in &self.chats {
            if !self.messages.contains_key(&chat.id) {
                self.messages.insert(chat.id.clone(), Vec::new());
                changed = true;
            }
        }

        let chat_ids: HashSet<&str> = self.chats.iter().map(|c| c.id.as_str()).collect();
        let before = self.messages.len();
        self.messages
            .retain(|chat_id, _| chat_ids.contains(chat_id.as_str()));
        if self.messages.len() != before {
            warn!(
                dropped = before - self.messages.len(),
                "Dropped message lists without a chat"
            );
            changed = true;
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_matches_first_run_shape() {
        let json = serde_json::to_value(ConversationState::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"apiKey": "", "projects": [], "chats": [], "messages": {}})
        );
    }

    #[test]
    fn loads_snapshot_written_by_browser_client() {
        let raw = r#"{
            "apiKey": "sk-test",
            "projects": [{"id": "1700000000000", "name": "Work"}],
            "chats": [{"id": "1700000000001", "projectId": "1700000000000", "name": "Ideas"}],
            "messages": {
                "1700000000001": [
                    {"role": "user", "content": "hello", "id": null},
                    {"role": "assistant", "content": "Hello!", "id": "1700000000002"}
                ]
            }
        }"#;
        let state: ConversationState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.api_key, "sk-test");
        assert_eq!(state.chats[0].project_id, "1700000000000");
        let messages = &state.messages["1700000000001"];
        assert_eq!(messages[1].id.as_deref(), Some("1700000000002"));
    }

    #[test]
    fn repair_fills_missing_lists_and_drops_orphans() {
        let mut state = ConversationState {
            api_key: String::new(),
            projects: vec![Project {
                id: "p".into(),
                name: "P".into(),
            }],
            chats: vec![
                Chat {
                    id: "c1".into(),
                    project_id: "p".into(),
                    name: "kept".into(),
                },
                Chat {
                    id: "c2".into(),
                    project_id: "gone".into(),
                    name: "orphan".into(),
                },
            ],
            messages: BTreeMap::from([("stale".to_string(), vec![Message::user("x")])]),
        };

        assert!(state.repair());
        assert_eq!(state.chats.len(), 1);
        assert_eq!(state.messages.keys().collect::<Vec<_>>(), vec!["c1"]);
        assert!(!state.repair());
    }
}
