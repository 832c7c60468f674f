//! Streaming assistant replies into the tree.
//!
//! A reply arrives as ordered text fragments from an external source (the
//! network collaborator). Each fragment is appended to a running buffer and
//! the whole buffer is written with
//! [`TreeSession::update_message`](crate::session::TreeSession::update_message), so the
//! store only ever sees full-content replacements, in arrival order.
//!
//! Cancellation stops further updates; content already written stays.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{StreamError, StreamResult, TreeError};
use crate::session::SharedSession;

/// Ordered producer of reply fragments.
///
/// `next_fragment` must be cancel-safe: [`stream_reply`] drops a pending call
/// whenever the cancel switch changes or is dropped, then polls again. A
/// dropped call must not consume a fragment. `mpsc::Receiver::recv` meets
/// this.
#[async_trait]
pub trait FragmentSource: Send {
    /// Next fragment, or `None` once the reply is complete.
    async fn next_fragment(&mut self) -> Option<StreamResult<String>>;
}

#[async_trait]
impl FragmentSource for mpsc::Receiver<StreamResult<String>> {
    async fn next_fragment(&mut self) -> Option<StreamResult<String>> {
        self.recv().await
    }
}

/// Cancellation switch for an in-flight reply.
#[derive(Debug)]
pub struct ReplyCancel {
    tx: watch::Sender<bool>,
}

impl ReplyCancel {
    /// Create a switch and the receiver to hand to [`stream_reply`]
    pub fn channel() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    /// Stop the reply after the fragment currently being applied, if any
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Summary of a finished or cancelled reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyOutcome {
    /// The assistant message that received the fragments.
    pub message_id: String,
    /// Number of non-empty fragments written.
    pub fragments_applied: usize,
    /// Whether the reply stopped because of cancellation.
    pub cancelled: bool,
    /// Message content when streaming stopped.
    pub content: String,
}

/// Apply fragments from `source` to `message_id` until the source ends, fails,
/// or `cancel` flips to `true`.
///
/// Starts from the message's current content. The session lock is taken per
/// fragment, never across an await on the source.
pub async fn stream_reply<S>(
    session: &SharedSession,
    message_id: &str,
    mut source: S,
    mut cancel: watch::Receiver<bool>,
) -> StreamResult<ReplyOutcome>
where
    S: FragmentSource,
{
    let mut content = {
        let guard = session.lock().await;
        guard
            .message(message_id)
            .map(|m| m.content.clone())
            .ok_or_else(|| TreeError::UnknownMessage {
                message_id: message_id.to_string(),
            })?
    };

    let mut fragments_applied = 0;
    let mut cancel_open = true;

    debug!(message_id = %message_id, "Reply stream started");

    loop {
        if *cancel.borrow() {
            info!(
                message_id = %message_id,
                fragments_applied,
                "Reply stream cancelled"
            );
            return Ok(ReplyOutcome {
                message_id: message_id.to_string(),
                fragments_applied,
                cancelled: true,
                content,
            });
        }

        let fragment = if cancel_open {
            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    // A dropped switch can no longer cancel.
                    if changed.is_err() {
                        cancel_open = false;
                    }
                    continue;
                }
                fragment = source.next_fragment() => fragment,
            }
        } else {
            source.next_fragment().await
        };

        match fragment {
            None => break,
            Some(Err(e)) => {
                warn!(
                    message_id = %message_id,
                    fragments_applied,
                    error = %e,
                    "Reply stream failed"
                );
                return Err(e);
            }
            Some(Ok(delta)) => {
                if delta.is_empty() || *cancel.borrow() {
                    continue;
                }
                content.push_str(&delta);
                session
                    .lock()
                    .await
                    .update_message(message_id, content.clone())?;
                fragments_applied += 1;
            }
        }
    }

    info!(
        message_id = %message_id,
        fragments_applied,
        "Reply stream completed"
    );

    Ok(ReplyOutcome {
        message_id: message_id.to_string(),
        fragments_applied,
        cancelled: false,
        content,
    })
}

/// Handle to a reply streaming on a background task.
#[derive(Debug)]
pub struct ReplyHandle {
    cancel: ReplyCancel,
    task: JoinHandle<StreamResult<ReplyOutcome>>,
}

impl ReplyHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the reply to finish
    pub async fn finish(self) -> StreamResult<ReplyOutcome> {
        self.task.await.map_err(|e| StreamError::Task {
            message: e.to_string(),
        })?
    }
}

/// Stream a reply on a spawned task
pub fn spawn_reply<S>(session: SharedSession, message_id: String, source: S) -> ReplyHandle
where
    S: FragmentSource + 'static,
{
    let (cancel, rx) = ReplyCancel::channel();
    let task =
        tokio::spawn(async move { stream_reply(&session, &message_id, source, rx).await });
    ReplyHandle { cancel, task }
}
