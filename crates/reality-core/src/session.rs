//! Session state: chat threads, the last compiler rationale, and view mode

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder posted while the intent compiler is working.
pub const THINKING_PLACEHOLDER: &str = "🤔 Thinking...";

/// Message role
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            thought: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// A conversation, either global (`target_id = None`) or attached to a node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatThread {
    pub id: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub is_open: bool,
}

impl ChatThread {
    pub fn new(id: impl Into<String>, target_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            target_id,
            messages: Vec::new(),
            is_open: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Run,
    Source,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    #[serde(rename = "2d")]
    Flat,
    #[serde(rename = "3d")]
    Spatial,
    #[serde(rename = "split")]
    Split,
}

/// Everything the session tracks besides the program itself.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub interaction_mode: InteractionMode,
    pub view: ViewMode,
    pub last_thought: Option<String>,
    pub main_chat_id: String,
    pub threads: Vec<ChatThread>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let main_chat_id = "main".to_string();
        Self {
            interaction_mode: InteractionMode::Run,
            view: ViewMode::Flat,
            last_thought: None,
            threads: vec![ChatThread::new(main_chat_id.clone(), None)],
            main_chat_id,
        }
    }

    pub fn thread(&self, id: &str) -> Option<&ChatThread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn thread_mut(&mut self, id: &str) -> Option<&mut ChatThread> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    pub fn main_thread(&self) -> Option<&ChatThread> {
        self.thread(&self.main_chat_id)
    }

    /// Switching to run mode shows the flat view, source mode the spatial one.
    pub fn set_interaction_mode(&mut self, mode: InteractionMode) {
        self.interaction_mode = mode;
        self.view = match mode {
            InteractionMode::Run => ViewMode::Flat,
            InteractionMode::Source => ViewMode::Spatial,
        };
    }
}
