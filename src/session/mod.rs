//! Conversation session facade.
//!
//! A [`TreeSession`] owns exactly one [`TreeState`] for the lifetime of a UI
//! session. Mutations go through the facade, which bumps a version counter
//! after every successful change; consumers re-read views (`path`,
//! `transcript`, `children`) after each bump. Views are computed fresh on
//! every call and returned as owned snapshots.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{SessionConfig, MAX_FORK_TITLE_LEN};
use crate::error::{TreeError, TreeResult};
use crate::tree::{BranchNode, ChatMessage, Message, NewMessage, Role, TreeState};

/// Shared handle to the single session a process drives.
pub type SharedSession = Arc<Mutex<TreeSession>>;

/// One entry of the root-to-active breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Branch ID.
    pub id: String,
    /// Branch title, "untitled" when none was set.
    pub title: String,
}

/// Result of [`TreeSession::begin_exchange`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    /// The user message just appended.
    pub user: Message,
    /// Empty assistant placeholder to stream the reply into.
    pub assistant: Message,
    /// Chat request for the reply, ending with the user message.
    pub request: Vec<ChatMessage>,
}

/// Live session over one conversation tree.
#[derive(Debug)]
pub struct TreeSession {
    state: TreeState,
    version: u64,
    fork_title_len: usize,
    changes: watch::Sender<u64>,
}

impl TreeSession {
    /// Start a session with a fresh tree
    pub fn new(config: &SessionConfig) -> Self {
        let state = TreeState::with_root_title(config.root_title.clone());
        let (changes, _) = watch::channel(0);

        info!(
            root_id = %state.root().id,
            root_title = %config.root_title,
            "Conversation session started"
        );

        Self {
            state,
            version: 0,
            fork_title_len: config.fork_title_len.clamp(1, MAX_FORK_TITLE_LEN),
            changes,
        }
    }

    /// Wrap the session in a shared handle
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Append a user message to the active branch
    pub fn send_user(&mut self, content: impl Into<String>) -> TreeResult<Message> {
        self.append_to_active(Role::User, content.into())
    }

    /// Append an assistant message to the active branch
    pub fn append_assistant(&mut self, content: impl Into<String>) -> TreeResult<Message> {
        self.append_to_active(Role::Assistant, content.into())
    }

    /// Replace a message's content
    pub fn update_message(
        &mut self,
        message_id: &str,
        content: impl Into<String>,
    ) -> TreeResult<Message> {
        let message = self
            .state
            .update_message_content(message_id, content)
            .map_err(|e| rejected("update_message", e))?
            .clone();
        self.bump();
        Ok(message)
    }

    /// Fork a new, randomly titled branch from a message and make it active
    pub fn fork(&mut self, from_message_id: &str) -> TreeResult<BranchNode> {
        let title = self.fork_title();
        let branch = self
            .state
            .fork_branch(from_message_id, Some(title))
            .map_err(|e| rejected("fork", e))?
            .clone();

        info!(
            branch_id = %branch.id,
            title = %branch.display_title(),
            fork_seq = ?branch.fork_seq,
            "Forked conversation"
        );

        self.bump();
        Ok(branch)
    }

    /// Make `branch_id` the active branch
    pub fn set_active_branch(&mut self, branch_id: &str) -> TreeResult<()> {
        self.state
            .set_active_branch(branch_id)
            .map_err(|e| rejected("set_active_branch", e))?;
        debug!(branch_id = %branch_id, "Active branch changed");
        self.bump();
        Ok(())
    }

    /// Retitle a branch
    pub fn rename_branch(
        &mut self,
        branch_id: &str,
        title: impl Into<String>,
    ) -> TreeResult<BranchNode> {
        let branch = self
            .state
            .rename_branch(branch_id, title)
            .map_err(|e| rejected("rename_branch", e))?
            .clone();
        debug!(branch_id = %branch.id, title = %branch.display_title(), "Branch renamed");
        self.bump();
        Ok(branch)
    }

    /// Append a user message and an empty assistant placeholder.
    ///
    /// The returned request is the transcript as it stood right after the
    /// user message, so the placeholder is never part of it. This differs
    /// from calling [`chat_messages`](Self::chat_messages) once the call
    /// returns, which would end with an empty assistant turn.
    pub fn begin_exchange(&mut self, user_content: impl Into<String>) -> TreeResult<Exchange> {
        let user = self.send_user(user_content)?;
        let request = self.chat_messages();
        let assistant = self.append_assistant(String::new())?;
        Ok(Exchange {
            user,
            assistant,
            request,
        })
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Branches from the root to the active branch
    pub fn path(&self) -> Vec<BranchNode> {
        self.state
            .get_path(self.state.active_branch_id())
            .into_iter()
            .cloned()
            .collect()
    }

    /// Path to the active branch as `{id, title}` pairs
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.state
            .get_path(self.state.active_branch_id())
            .into_iter()
            .map(|b| Breadcrumb {
                id: b.id.clone(),
                title: b.display_title().to_string(),
            })
            .collect()
    }

    /// Transcript of the active branch
    pub fn transcript(&self) -> Vec<Message> {
        self.transcript_for(self.state.active_branch_id())
    }

    /// Transcript of any branch (empty for an unknown id)
    pub fn transcript_for(&self, branch_id: &str) -> Vec<Message> {
        self.state
            .get_transcript(branch_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Children of the active branch
    pub fn children(&self) -> Vec<BranchNode> {
        self.children_of(self.state.active_branch_id())
    }

    /// Children of any branch
    pub fn children_of(&self, branch_id: &str) -> Vec<BranchNode> {
        self.state
            .get_children(branch_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Active transcript as chat-completion input
    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.chat_messages_for(self.state.active_branch_id())
    }

    /// Transcript of `branch_id` as chat-completion input
    pub fn chat_messages_for(&self, branch_id: &str) -> Vec<ChatMessage> {
        self.state
            .get_transcript(branch_id)
            .into_iter()
            .map(ChatMessage::from)
            .collect()
    }

    /// Every branch, in creation order
    pub fn branches(&self) -> Vec<BranchNode> {
        self.state.branches().cloned().collect()
    }

    /// ID of the active branch
    pub fn active_branch_id(&self) -> &str {
        self.state.active_branch_id()
    }

    /// Look up a message
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.state.get_message(message_id)
    }

    /// Read access to the underlying tree
    pub fn state(&self) -> &TreeState {
        &self.state
    }

    /// Number of successful mutations so far
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Receiver that observes every version bump
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn append_to_active(&mut self, role: Role, content: String) -> TreeResult<Message> {
        let branch_id = self.state.active_branch_id().to_string();
        let message = self
            .state
            .append_message(NewMessage::new(branch_id, role, content))
            .map_err(|e| rejected("append", e))?
            .clone();
        self.bump();
        Ok(message)
    }

    fn fork_title(&self) -> String {
        let mut title = Uuid::new_v4().simple().to_string();
        title.truncate(self.fork_title_len);
        title
    }

    fn bump(&mut self) {
        self.version += 1;
        self.changes.send_replace(self.version);
    }
}

fn rejected(operation: &'static str, err: TreeError) -> TreeError {
    warn!(operation, error = %err, "Tree operation rejected");
    err
}
