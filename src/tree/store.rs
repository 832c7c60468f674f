use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::{BranchNode, Message, NewMessage};
use crate::error::{TreeError, TreeResult};

/// Canonical state of one conversation tree.
///
/// Every mutation checks the ids it references before touching any field, so
/// a rejected call leaves the state exactly as it was.
#[derive(Debug, Clone)]
pub struct TreeState {
    branches: HashMap<String, BranchNode>,
    messages: HashMap<String, Message>,
    /// Message ids per branch, in ascending `seq` order.
    messages_by_branch: HashMap<String, Vec<String>>,
    /// Branch ids in creation order; sibling tie-break.
    branch_order: Vec<String>,
    active_branch_id: String,
    root_id: String,
}

impl TreeState {
    /// Create a tree with a single root branch titled "root"
    pub fn create_initial_state() -> Self {
        Self::with_root_title("root")
    }

    /// Create a tree with a single root branch carrying `title`.
    ///
    /// The root starts with an empty message list and is the active branch.
    pub fn with_root_title(title: impl Into<String>) -> Self {
        let root = BranchNode::root(title);
        let root_id = root.id.clone();

        Self {
            branches: HashMap::from([(root_id.clone(), root)]),
            messages: HashMap::new(),
            messages_by_branch: HashMap::from([(root_id.clone(), Vec::new())]),
            branch_order: vec![root_id.clone()],
            active_branch_id: root_id.clone(),
            root_id,
        }
    }

    /// Append a message to the end of a branch.
    ///
    /// The new message gets `seq` = last seq in that branch + 1.
    pub fn append_message(&mut self, new: NewMessage) -> TreeResult<&Message> {
        let list = self.messages_by_branch.get_mut(&new.branch_id).ok_or_else(|| {
            TreeError::UnknownBranch {
                branch_id: new.branch_id.clone(),
            }
        })?;

        let last_seq = list
            .last()
            .and_then(|id| self.messages.get(id))
            .map(|m| m.seq)
            .unwrap_or(0);

        let message = Message {
            id: Uuid::new_v4().to_string(),
            branch_id: new.branch_id,
            seq: last_seq + 1,
            role: new.role,
            content: new.content,
            created_at: new.created_at.unwrap_or_else(Utc::now),
        };

        debug!(
            branch_id = %message.branch_id,
            message_id = %message.id,
            seq = message.seq,
            role = %message.role,
            "Appended message"
        );

        list.push(message.id.clone());
        Ok(&*self.messages.entry(message.id.clone()).or_insert(message))
    }

    /// Replace the content of an existing message
    pub fn update_message_content(
        &mut self,
        message_id: &str,
        content: impl Into<String>,
    ) -> TreeResult<&Message> {
        let message = self
            .messages
            .get_mut(message_id)
            .ok_or_else(|| TreeError::UnknownMessage {
                message_id: message_id.to_string(),
            })?;
        message.content = content.into();
        Ok(&*message)
    }

    /// Fork a new branch that continues from `from_message_id`.
    ///
    /// The new branch's parent is the branch owning that message and its
    /// `fork_seq` is the message's `seq`, so the forked-from message is part
    /// of the new branch's transcript. The new branch becomes active.
    pub fn fork_branch(
        &mut self,
        from_message_id: &str,
        title: Option<String>,
    ) -> TreeResult<&BranchNode> {
        self.fork_branch_at(from_message_id, title, Utc::now())
    }

    /// [`fork_branch`](Self::fork_branch) with an explicit creation time.
    pub(crate) fn fork_branch_at(
        &mut self,
        from_message_id: &str,
        title: Option<String>,
        created_at: DateTime<Utc>,
    ) -> TreeResult<&BranchNode> {
        let from = self
            .messages
            .get(from_message_id)
            .ok_or_else(|| TreeError::UnknownMessage {
                message_id: from_message_id.to_string(),
            })?;

        let mut node = BranchNode::forked(from.branch_id.clone(), from.seq);
        node.title = title;
        node.created_at = created_at;
        let id = node.id.clone();

        debug!(
            branch_id = %id,
            parent_id = %from.branch_id,
            fork_seq = from.seq,
            "Forked branch"
        );

        self.messages_by_branch.insert(id.clone(), Vec::new());
        self.branch_order.push(id.clone());
        self.active_branch_id = id.clone();
        Ok(&*self.branches.entry(id).or_insert(node))
    }

    /// Point the active branch at `branch_id`
    pub fn set_active_branch(&mut self, branch_id: &str) -> TreeResult<()> {
        if !self.branches.contains_key(branch_id) {
            return Err(TreeError::UnknownBranch {
                branch_id: branch_id.to_string(),
            });
        }
        self.active_branch_id = branch_id.to_string();
        Ok(())
    }

    /// Overwrite a branch's title
    pub fn rename_branch(
        &mut self,
        branch_id: &str,
        title: impl Into<String>,
    ) -> TreeResult<&BranchNode> {
        let branch = self
            .branches
            .get_mut(branch_id)
            .ok_or_else(|| TreeError::UnknownBranch {
                branch_id: branch_id.to_string(),
            })?;
        branch.title = Some(title.into());
        Ok(&*branch)
    }

    /// Branches from the root down to `leaf_id`, inclusive.
    ///
    /// Returns an empty path for an unknown leaf. Parent links are acyclic by
    /// construction, so the upward walk always ends at the root.
    pub fn get_path(&self, leaf_id: &str) -> Vec<&BranchNode> {
        let mut path = Vec::new();
        let mut current = self.branches.get(leaf_id);
        while let Some(node) = current {
            path.push(node);
            current = node
                .parent_id
                .as_deref()
                .and_then(|parent| self.branches.get(parent));
        }
        path.reverse();
        path
    }

    /// Messages visible from `leaf_id`.
    ///
    /// Each ancestor contributes the prefix of its own messages up to and
    /// including the next path node's `fork_seq`; the leaf contributes all of
    /// its messages.
    pub fn get_transcript(&self, leaf_id: &str) -> Vec<&Message> {
        let path = self.get_path(leaf_id);
        let mut transcript = Vec::new();

        for (i, node) in path.iter().enumerate() {
            let own = self.iter_branch_messages(&node.id);
            match path.get(i + 1) {
                Some(child) => {
                    let cutoff = child.fork_seq.unwrap_or(0);
                    transcript.extend(own.take_while(|m| m.seq <= cutoff));
                }
                None => transcript.extend(own),
            }
        }

        transcript
    }

    /// Direct children of `parent_id`, oldest first.
    ///
    /// Siblings with equal timestamps keep creation order.
    pub fn get_children(&self, parent_id: &str) -> Vec<&BranchNode> {
        let mut children: Vec<&BranchNode> = self
            .branches()
            .filter(|b| b.parent_id.as_deref() == Some(parent_id))
            .collect();
        children.sort_by_key(|b| b.created_at);
        children
    }

    /// ID of the active branch
    pub fn active_branch_id(&self) -> &str {
        &self.active_branch_id
    }

    /// The active branch
    pub fn active_branch(&self) -> &BranchNode {
        // active_branch_id only ever holds ids present in `branches`
        &self.branches[&self.active_branch_id]
    }

    /// The root branch
    pub fn root(&self) -> &BranchNode {
        &self.branches[&self.root_id]
    }

    /// Look up a branch
    pub fn get_branch(&self, branch_id: &str) -> Option<&BranchNode> {
        self.branches.get(branch_id)
    }

    /// Look up a message
    pub fn get_message(&self, message_id: &str) -> Option<&Message> {
        self.messages.get(message_id)
    }

    /// Every branch, in creation order
    pub fn branches(&self) -> impl Iterator<Item = &BranchNode> + '_ {
        self.branch_order.iter().filter_map(|id| self.branches.get(id))
    }

    /// Number of branches in the tree
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Number of messages across all branches
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// A branch's own messages in `seq` order (empty for an unknown branch)
    pub fn branch_messages(&self, branch_id: &str) -> Vec<&Message> {
        self.iter_branch_messages(branch_id).collect()
    }

    fn iter_branch_messages<'a>(
        &'a self,
        branch_id: &str,
    ) -> impl Iterator<Item = &'a Message> + 'a {
        self.messages_by_branch
            .get(branch_id)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.messages.get(id))
    }
}
