//! Error types for session operations.

use thiserror::Error;

use crate::domain::{GuildId, UserId};
use crate::ports::{GatewayError, ReplyError};

/// Errors produced while handling a session command.
///
/// None of these are process-fatal; every variant is scoped to the single
/// request that produced it.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The command's guild has no session registry (it never became ready,
    /// or no session container was found for it).
    #[error("no session registry for guild {guild}")]
    RegistryNotFound { guild: GuildId },

    /// No uniquely-named session container could be resolved for the guild.
    #[error("no session container resolvable for guild {guild}")]
    ContainerNotFound { guild: GuildId },

    /// A second session slot was observed for the same user. The atomic
    /// insert-or-fetch makes this unreachable through the command path, so
    /// seeing it indicates a bug or inconsistent platform state.
    #[error("duplicate session slot for user {user}")]
    Conflict { user: UserId },

    /// The platform gateway rejected or failed a create/delete call.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// An acknowledgment targeted a channel that no longer exists.
    #[error("stale acknowledgment target")]
    StaleReply,

    /// An acknowledgment could not be delivered.
    #[error("acknowledgment delivery failed: {0}")]
    Reply(ReplyError),
}

impl From<ReplyError> for SessionError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::Stale => SessionError::StaleReply,
            other => SessionError::Reply(other),
        }
    }
}
