//! ReplySink port - write-once acknowledgment channel for a command.
//!
//! Every inbound command carries a sink the registry answers through exactly
//! once: either an immediate `reply`, or a `defer` followed by one `edit` of
//! the deferred acknowledgment. Whether an acknowledgment is ephemeral
//! (visible only to the issuer) or public is an explicit parameter, not a
//! protocol detail hidden in the adapter.

use async_trait::async_trait;

/// Errors surfaced while delivering an acknowledgment.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReplyError {
    /// The acknowledgment target no longer exists (for example the channel
    /// the command was issued in has been deleted in the meantime).
    #[error("acknowledgment target no longer exists")]
    Stale,

    /// The platform could not deliver the acknowledgment.
    #[error("failed to deliver acknowledgment: {reason}")]
    Delivery { reason: String },
}

impl ReplyError {
    /// Creates a delivery error.
    pub fn delivery(reason: impl Into<String>) -> Self {
        ReplyError::Delivery { reason: reason.into() }
    }
}

/// Handle to a deferred acknowledgment, edited once the outcome is known.
#[async_trait]
pub trait ReplyHandle: Send + Sync {
    /// Replace the deferred placeholder with the final text.
    async fn edit(&self, text: &str) -> Result<(), ReplyError>;
}

/// Port for acknowledging a single inbound command.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Signal that the outcome will take a while; returns a handle used to
    /// deliver the final text via [`ReplyHandle::edit`].
    async fn defer(&self, ephemeral: bool) -> Result<Box<dyn ReplyHandle>, ReplyError>;

    /// Send the final text immediately, without a prior defer.
    async fn reply(&self, text: &str, ephemeral: bool) -> Result<(), ReplyError>;
}
