//! Branching conversation tree.
//!
//! This module holds the canonical conversation state: branch records, message
//! records, each branch's ordered message list and the active-branch pointer.
//! Branches are stored as a flat id map with parent back-references; children
//! are derived on demand rather than stored.

mod store;


pub use store::TreeState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title shown for a branch that has none.
pub const UNTITLED: &str = "untitled";

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text typed by the person driving the conversation.
    User,
    /// Text produced by the model.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A node in the branch tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchNode {
    /// Unique branch identifier.
    pub id: String,
    /// Parent branch ID, `None` for the root.
    pub parent_id: Option<String>,
    /// Parent-branch `seq` this branch diverges at (inclusive), `None` for the root.
    pub fork_seq: Option<u64>,
    /// Optional display label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// When the branch was created.
    pub created_at: DateTime<Utc>,
}

impl BranchNode {
    /// Create a root branch
    pub fn root(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            fork_seq: None,
            title: Some(title.into()),
            created_at: Utc::now(),
        }
    }

    /// Create a branch diverging from `parent_id` after message `fork_seq`
    pub fn forked(parent_id: impl Into<String>, fork_seq: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: Some(parent_id.into()),
            fork_seq: Some(fork_seq),
            title: None,
            created_at: Utc::now(),
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Whether this is the root branch
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The title, or [`UNTITLED`] when none was set
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED)
    }
}

/// A single turn in a branch's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: String,
    /// Branch the message was appended to.
    pub branch_id: String,
    /// 1-based position within the owning branch.
    pub seq: u64,
    /// Who produced the message.
    pub role: Role,
    /// Text body; replaced in place while a reply streams.
    pub content: String,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

/// Input for [`TreeState::append_message`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    /// Branch to append to.
    pub branch_id: String,
    /// Who produced the message.
    pub role: Role,
    /// Initial text body.
    pub content: String,
    /// Creation timestamp; defaults to now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    /// Create append input for a branch
    pub fn new(branch_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            branch_id: branch_id.into(),
            role,
            content: content.into(),
            created_at: None,
        }
    }

    /// Set an explicit creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// A transcript entry in the shape a chat-completion request expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display_and_parse() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_root_branch() {
        let root = BranchNode::root("root");
        assert!(root.is_root());
        assert_eq!(root.fork_seq, None);
        assert_eq!(root.display_title(), "root");
    }

    #[test]
    fn test_forked_branch_defaults_to_untitled() {
        let fork = BranchNode::forked("parent", 3);
        assert!(!fork.is_root());
        assert_eq!(fork.parent_id.as_deref(), Some("parent"));
        assert_eq!(fork.fork_seq, Some(3));
        assert_eq!(fork.display_title(), UNTITLED);

        let titled = fork.with_title("alt");
        assert_eq!(titled.display_title(), "alt");
    }

    #[test]
    fn test_untitled_branch_omits_title_in_json() {
        let fork = BranchNode::forked("parent", 1);
        let json = serde_json::to_value(&fork).unwrap();
        assert!(json.get("title").is_none());
        assert_eq!(json["fork_seq"], 1);
    }

    #[test]
    fn test_chat_message_from_message() {
        let message = Message {
            id: "m1".to_string(),
            branch_id: "b1".to_string(),
            seq: 1,
            role: Role::User,
            content: "hi".to_string(),
            created_at: Utc::now(),
        };
        let chat = ChatMessage::from(&message);
        assert_eq!(chat.role, Role::User);
        assert_eq!(chat.content, "hi");

        let json = serde_json::to_value(&chat).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }
}
