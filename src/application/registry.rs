//! SessionRegistry - the per-guild session core.
//!
//! One registry per guild. It owns the user → [`SessionSlot`] map and the
//! session counter, and guarantees:
//!
//! - at most one channel creation in flight per user ("does a session exist"
//!   and "reserve the slot" are a single atomic map operation);
//! - safe deletion under races: the map entry is removed before anything is
//!   awaited, so a second concurrent end observes "no active session" and
//!   can never double-delete, while the removed slot's value is still
//!   awaited so ending an in-flight creation deletes the channel it made;
//! - full independence across users: nothing is held across gateway latency.
//!
//! Creation runs in its own spawned task. Once initiated it completes or
//! fails regardless of whether the acknowledgment can still be delivered,
//! and a failure clears the slot so the user can retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::{ChannelId, ContainerId, GuildId, UserId};
use crate::ports::{ChannelGateway, ReplyHandle};

use super::command::{audit_reason, Participant, SessionCommand};
use super::errors::SessionError;
use super::slot::SessionSlot;

/// Per-guild session state and lifecycle logic.
pub struct SessionRegistry {
    guild: GuildId,
    /// Category all session channels are created under. Immutable.
    container: ContainerId,
    /// Prefix for derived channel names (`<prefix>-<counter>`).
    channel_prefix: String,
    gateway: Arc<dyn ChannelGateway>,
    /// The only shared mutable structure: user → pending-or-ready slot.
    sessions: Arc<DashMap<UserId, SessionSlot>>,
    /// Monotonic; post-increment values name channels and are never reused.
    session_counter: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new(
        guild: GuildId,
        container: ContainerId,
        channel_prefix: impl Into<String>,
        gateway: Arc<dyn ChannelGateway>,
    ) -> Self {
        Self {
            guild,
            container,
            channel_prefix: channel_prefix.into(),
            gateway,
            sessions: Arc::new(DashMap::new()),
            session_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Index channels that already exist under the container, keyed by their
    /// designated owner. Best-effort: a listing failure leaves the registry
    /// empty rather than unusable, and a user whose channel is listed but
    /// not yet indexed may race a fresh start until this completes.
    pub async fn seed(&self) {
        match self.gateway.list_session_channels(self.container).await {
            Ok(existing) => {
                for found in existing {
                    match self.sessions.entry(found.owner) {
                        Entry::Vacant(vacant) => {
                            vacant.insert(SessionSlot::ready(found.channel));
                        }
                        Entry::Occupied(_) => {
                            tracing::warn!(
                                guild = %self.guild,
                                user = %found.owner,
                                channel = %found.channel,
                                error = %SessionError::Conflict { user: found.owner },
                                "duplicate session channel during seeding; keeping the first"
                            );
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(
                    guild = %self.guild,
                    container = %self.container,
                    error = %err,
                    "failed to index existing session channels"
                );
            }
        }
    }

    /// Handle a start command: create the target's session channel if none
    /// exists, and acknowledge through the command's reply sink.
    pub async fn start(&self, cmd: &SessionCommand) -> Result<(), SessionError> {
        // Atomic insert-or-fetch. The branch taken here is the new/existing
        // decision; it is never re-derived after the fact, so a caller that
        // lost the race while creation is still pending is reported
        // "existing", not "new".
        let (slot, inserted) = match self.sessions.entry(cmd.target.id) {
            Entry::Occupied(occupied) => (occupied.get().clone(), false),
            Entry::Vacant(vacant) => {
                let slot = SessionSlot::pending();
                vacant.insert(slot.clone());
                (slot, true)
            }
        };

        if inserted {
            self.spawn_creation(slot.clone(), cmd.issuer.clone(), cmd.target.clone());

            let ack = cmd.reply.defer(false).await?;
            match slot.resolved().await {
                Ok(channel) => {
                    ack.edit(&ready_text(cmd, channel)).await?;
                    Ok(())
                }
                Err(err) => {
                    // The creation task already cleared the slot; a retry is
                    // possible immediately.
                    deliver_failure(ack.as_ref(), CREATE_FAILED_TEXT).await;
                    Err(err.into())
                }
            }
        } else {
            match slot.resolved().await {
                Ok(channel) => {
                    cmd.reply.reply(&exists_text(cmd, channel), true).await?;
                    Ok(())
                }
                Err(err) => {
                    let _ = cmd.reply.reply(CREATE_FAILED_TEXT, true).await;
                    Err(err.into())
                }
            }
        }
    }

    /// Handle an end command: remove the target's session entry, delete the
    /// channel behind it, and acknowledge.
    pub async fn end(&self, cmd: &SessionCommand) -> Result<(), SessionError> {
        // The removal is the atomic step: a concurrent end for the same user
        // sees an absent entry and cannot race the delete below.
        let Some((_, slot)) = self.sessions.remove(&cmd.target.id) else {
            cmd.reply.reply(&absent_text(cmd), true).await?;
            return Ok(());
        };

        let ack = cmd.reply.defer(false).await?;

        // Await the slot before deleting: ending a session whose creation is
        // still in flight must wait for the channel id, not orphan it.
        let channel = match slot.resolved().await {
            Ok(channel) => channel,
            Err(err) => {
                // Creation failed; there is no channel to delete.
                deliver_failure(ack.as_ref(), &absent_text(cmd)).await;
                return Err(err.into());
            }
        };

        let reason = audit_reason(&cmd.issuer, &cmd.target);
        match self.gateway.delete_session_channel(channel, &reason).await {
            Ok(()) => {
                if cmd.origin_channel == Some(channel) {
                    // The command came from inside the channel just deleted;
                    // sending the acknowledgment there would itself fail.
                    tracing::debug!(
                        guild = %self.guild,
                        channel = %channel,
                        "acknowledgment suppressed: origin channel was deleted"
                    );
                } else {
                    ack.edit(&ended_text(cmd)).await?;
                }
                Ok(())
            }
            Err(err) => {
                // The entry stays removed; deletion is not retried.
                deliver_failure(ack.as_ref(), DELETE_FAILED_TEXT).await;
                Err(err.into())
            }
        }
    }

    /// Number of active or in-creation sessions. Exposed for seeding checks.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Launch the gateway create call in its own task so it runs to
    /// completion even if acknowledgment delivery fails or the caller's task
    /// ends first.
    fn spawn_creation(&self, slot: SessionSlot, issuer: Participant, target: Participant) {
        let number = self.session_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}-{}", self.channel_prefix, number);
        let reason = audit_reason(&issuer, &target);

        let guild = self.guild;
        let container = self.container;
        let gateway = Arc::clone(&self.gateway);
        let sessions = Arc::clone(&self.sessions);

        tokio::spawn(async move {
            let outcome = gateway
                .create_session_channel(container, &name, issuer.id, target.id, &reason)
                .await;

            if let Err(err) = &outcome {
                tracing::warn!(
                    guild = %guild,
                    user = %target.id,
                    name = %name,
                    error = %err,
                    "session channel creation failed; clearing the slot"
                );
                // Clear only our own reservation. A newer generation's slot
                // (inserted after an earlier end) must survive.
                sessions.remove_if(&target.id, |_, current| current.same_cell(&slot));
            }

            slot.resolve(outcome);
        });
    }
}

const CREATE_FAILED_TEXT: &str =
    "Something went wrong while creating the session. Please try again.";
const DELETE_FAILED_TEXT: &str = "Something went wrong while ending the session.";

/// Edit a deferred acknowledgment with failure text; delivery problems at
/// this point are logged, not propagated, so they cannot mask the original
/// error.
async fn deliver_failure(ack: &dyn ReplyHandle, text: &str) {
    if let Err(err) = ack.edit(text).await {
        tracing::debug!(error = %err, "failed to deliver failure acknowledgment");
    }
}

fn ready_text(cmd: &SessionCommand, channel: ChannelId) -> String {
    if cmd.is_self_service() {
        format!("Your new session is ready: {}", channel.mention())
    } else {
        format!(
            "{}'s new session is ready: {}",
            cmd.target.id.mention(),
            channel.mention()
        )
    }
}

fn exists_text(cmd: &SessionCommand, channel: ChannelId) -> String {
    if cmd.is_self_service() {
        format!("You already have an active session: {}", channel.mention())
    } else {
        format!(
            "{} already has an active session: {}",
            cmd.target.id.mention(),
            channel.mention()
        )
    }
}

fn absent_text(cmd: &SessionCommand) -> String {
    if cmd.is_self_service() {
        "You do not have an active session".to_string()
    } else {
        format!("{} does not have an active session", cmd.target.id.mention())
    }
}

fn ended_text(cmd: &SessionCommand) -> String {
    if cmd.is_self_service() {
        "Your session has been successfully ended".to_string()
    } else {
        format!(
            "{}'s session has been successfully ended",
            cmd.target.id.mention()
        )
    }
}
