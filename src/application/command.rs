//! Inbound command events.
//!
//! The platform glue decodes interactions into [`SessionCommand`]s and hands
//! them to the [`crate::application::Dispatcher`]. The command carries
//! everything the core needs: who asked, who the session is for, where the
//! command was issued, and the sink to answer through.

use std::fmt;
use std::sync::Arc;

use crate::domain::{ChannelId, GuildId, UserId};
use crate::ports::ReplySink;

/// What the issuer wants done with the target's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Open a help session for the target.
    Start,
    /// Close the target's help session.
    End,
}

/// A user referenced by a command, with the display name used for audit
/// reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: UserId,
    pub display_name: String,
}

impl Participant {
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A typed command event routed to the guild's session registry.
#[derive(Clone)]
pub struct SessionCommand {
    pub action: SessionAction,
    pub guild: GuildId,
    /// Whoever triggered the action (the user themselves, or an admin).
    pub issuer: Participant,
    /// The user the session is for. Equal to `issuer` for self-service.
    pub target: Participant,
    /// The channel the command was issued in, when known. Used to suppress
    /// acknowledgments into a channel that was just deleted.
    pub origin_channel: Option<ChannelId>,
    /// Write-once acknowledgment sink for this command.
    pub reply: Arc<dyn ReplySink>,
}

impl SessionCommand {
    /// True when the issuer acts on their own session.
    pub fn is_self_service(&self) -> bool {
        self.issuer.id == self.target.id
    }
}

impl fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCommand")
            .field("action", &self.action)
            .field("guild", &self.guild)
            .field("issuer", &self.issuer)
            .field("target", &self.target)
            .field("origin_channel", &self.origin_channel)
            .finish_non_exhaustive()
    }
}

/// Audit justification passed to the gateway on every create/delete.
///
/// Names the issuer, and the target as well when the command was issued on
/// someone else's behalf.
pub(crate) fn audit_reason(issuer: &Participant, target: &Participant) -> String {
    let mut reason = format!("Requested by {} ({})", issuer.display_name, issuer.id);

    if issuer.id != target.id {
        reason.push_str(&format!(
            " on behalf of {} ({})",
            target.display_name, target.id
        ));
    }

    reason
}
