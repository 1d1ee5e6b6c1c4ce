//! Per-session conversation log.
//!
//! Nothing here is persisted by the server itself: the caller keeps the
//! encoded history in its context blob and hands it back on the next call
//! (see [`codec`]).

pub mod codec;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::llm::types::{ChatMessage, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_USER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    System,
}

impl Role {
    /// Wire role used by chat-completion APIs.
    pub fn as_chat_role(&self) -> &'static str {
        match self {
            Role::Human => ROLE_USER,
            Role::Ai => ROLE_ASSISTANT,
            Role::System => ROLE_SYSTEM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role.as_chat_role(), self.content.clone())
    }
}

/// Session id → ordered turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistory {
    sessions: BTreeMap<String, Vec<Turn>>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the turn log for `session_id`, creating an empty one on first use.
    pub fn session(&mut self, session_id: &str) -> &mut Vec<Turn> {
        self.sessions.entry(session_id.to_string()).or_default()
    }

    pub fn messages(&self, session_id: &str) -> &[Turn] {
        self.sessions
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The last `n` turns of a session, oldest first.
    pub fn recent(&self, session_id: &str, n: usize) -> &[Turn] {
        let turns = self.messages(session_id);
        &turns[turns.len().saturating_sub(n)..]
    }

    pub fn add_message(&mut self, session_id: &str, role: Role, content: impl Into<String>) {
        self.session(session_id).push(Turn {
            role,
            content: content.into(),
        });
    }

    pub fn add_user_message(&mut self, session_id: &str, content: impl Into<String>) {
        self.add_message(session_id, Role::Human, content);
    }

    pub fn add_ai_message(&mut self, session_id: &str, content: impl Into<String>) {
        self.add_message(session_id, Role::Ai, content);
    }
}
