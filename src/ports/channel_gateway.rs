//! ChannelGateway port - interface to the platform's channel API.
//!
//! The session core never talks to the chat platform directly; it calls this
//! port with identities and an audit reason and gets futures back. All
//! durable state lives behind this boundary - the registry reconstructs its
//! view at startup via [`ChannelGateway::list_session_channels`].

use async_trait::async_trait;

use crate::domain::{ChannelId, ContainerId, GuildId, UserId};

/// Errors surfaced by the platform gateway.
///
/// `Clone` is required because a creation failure is broadcast to every
/// caller waiting on the same session slot.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The referenced entity does not exist on the platform.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    /// The platform rejected the request (permissions, validation, ...).
    #[error("request rejected by the platform: {reason}")]
    Rejected { reason: String },

    /// The request never completed (network failure, 5xx, aborted task).
    #[error("transport failure: {reason}")]
    Transport { reason: String },
}

impl GatewayError {
    /// Creates a not-found error for the given entity kind.
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        GatewayError::NotFound { entity, id }
    }

    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        GatewayError::Rejected { reason: reason.into() }
    }

    /// Creates a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        GatewayError::Transport { reason: reason.into() }
    }
}

/// A session channel discovered under the container during seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionChannel {
    /// The channel itself.
    pub channel: ChannelId,
    /// The user the channel was created for.
    pub owner: UserId,
}

/// A category channel that can hold session channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
}

/// Port for creating and destroying session channels.
///
/// Implementations must be safe to call from many concurrent tasks; the
/// registry relies on calls for different users progressing independently.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    /// Create a session channel under `container`, visible only to `target`.
    ///
    /// `reason` is a human-readable audit justification naming the issuer
    /// (and the target when they differ); it is data only.
    async fn create_session_channel(
        &self,
        container: ContainerId,
        name: &str,
        issuer: UserId,
        target: UserId,
        reason: &str,
    ) -> Result<ChannelId, GatewayError>;

    /// Delete a session channel.
    async fn delete_session_channel(
        &self,
        channel: ChannelId,
        reason: &str,
    ) -> Result<(), GatewayError>;

    /// Enumerate session channels already existing under `container`,
    /// paired with their designated owners. Used for registry seeding.
    async fn list_session_channels(
        &self,
        container: ContainerId,
    ) -> Result<Vec<SessionChannel>, GatewayError>;

    /// Enumerate the category channels of a guild. Used by the dispatcher to
    /// resolve the configured session container when a guild becomes ready.
    async fn list_containers(&self, guild: GuildId) -> Result<Vec<ContainerInfo>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn channel_gateway_is_object_safe() {
        fn _accepts_dyn(_gateway: &dyn ChannelGateway) {}
    }

    #[test]
    fn gateway_errors_render_their_context() {
        let err = GatewayError::not_found("channel", 42);
        assert_eq!(err.to_string(), "channel 42 not found");

        let err = GatewayError::rejected("missing permission");
        assert!(err.to_string().contains("missing permission"));
    }
}
