//! In-memory test doubles for the gateway and reply ports.
//!
//! Used by the crate's own tests and reusable by embedders. Supports:
//! - call tracking (created/deleted channels with their audit reasons)
//! - error injection
//! - holding creations open to script concurrent interleavings

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{ChannelId, ContainerId, GuildId, UserId};
use crate::ports::{
    ChannelGateway, ContainerInfo, GatewayError, ReplyError, ReplyHandle, ReplySink,
    SessionChannel,
};

/// A recorded `create_session_channel` call.
#[derive(Debug, Clone)]
pub struct CreateCall {
    pub channel: ChannelId,
    pub container: ContainerId,
    pub name: String,
    pub issuer: UserId,
    pub target: UserId,
    pub reason: String,
}

/// A recorded `delete_session_channel` call.
#[derive(Debug, Clone)]
pub struct DeleteCall {
    pub channel: ChannelId,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct ChannelRecord {
    container: ContainerId,
    owner: UserId,
}

#[derive(Default)]
struct GatewayState {
    next_channel: u64,
    containers: HashMap<GuildId, Vec<ContainerInfo>>,
    channels: HashMap<ChannelId, ChannelRecord>,
    created: Vec<CreateCall>,
    deleted: Vec<DeleteCall>,
    fail_next_create: Option<GatewayError>,
    fail_next_delete: Option<GatewayError>,
}

/// In-memory [`ChannelGateway`] with scripted failures and a create gate.
pub struct InMemoryChannelGateway {
    state: Arc<Mutex<GatewayState>>,
    /// While `true`, create calls park before touching state.
    create_gate: watch::Sender<bool>,
}

impl Default for InMemoryChannelGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChannelGateway {
    pub fn new() -> Self {
        let (create_gate, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(GatewayState {
                next_channel: 1000,
                ..GatewayState::default()
            })),
            create_gate,
        }
    }

    /// Register a category in a guild.
    pub fn add_container(&self, guild: GuildId, container: ContainerId, name: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state
            .containers
            .entry(guild)
            .or_default()
            .push(ContainerInfo {
                id: container,
                name: name.into(),
            });
    }

    /// Register a session channel that existed before the registry started,
    /// for seeding tests.
    pub fn add_existing_channel(&self, container: ContainerId, channel: ChannelId, owner: UserId) {
        let mut state = self.state.lock().unwrap();
        state
            .channels
            .insert(channel, ChannelRecord { container, owner });
    }

    /// Park subsequent create calls (`true`) or release them (`false`).
    pub fn hold_creates(&self, hold: bool) {
        self.create_gate.send_replace(hold);
    }

    /// Fail the next create call with `err`.
    pub fn fail_next_create(&self, err: GatewayError) {
        self.state.lock().unwrap().fail_next_create = Some(err);
    }

    /// Fail the next delete call with `err`.
    pub fn fail_next_delete(&self, err: GatewayError) {
        self.state.lock().unwrap().fail_next_delete = Some(err);
    }

    pub fn create_calls(&self) -> Vec<CreateCall> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn delete_calls(&self) -> Vec<DeleteCall> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Channels currently alive.
    pub fn channel_count(&self) -> usize {
        self.state.lock().unwrap().channels.len()
    }

    pub fn channel_exists(&self, channel: ChannelId) -> bool {
        self.state.lock().unwrap().channels.contains_key(&channel)
    }

    async fn wait_for_gate(&self) {
        let mut gate = self.create_gate.subscribe();
        while *gate.borrow_and_update() {
            if gate.changed().await.is_err() {
                break;
            }
        }
    }
}

#[async_trait]
impl ChannelGateway for InMemoryChannelGateway {
    async fn create_session_channel(
        &self,
        container: ContainerId,
        name: &str,
        issuer: UserId,
        target: UserId,
        reason: &str,
    ) -> Result<ChannelId, GatewayError> {
        self.wait_for_gate().await;

        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next_create.take() {
            return Err(err);
        }

        state.next_channel += 1;
        let channel = ChannelId::new(state.next_channel);
        state.channels.insert(
            channel,
            ChannelRecord {
                container,
                owner: target,
            },
        );
        state.created.push(CreateCall {
            channel,
            container,
            name: name.to_string(),
            issuer,
            target,
            reason: reason.to_string(),
        });
        Ok(channel)
    }

    async fn delete_session_channel(
        &self,
        channel: ChannelId,
        reason: &str,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next_delete.take() {
            return Err(err);
        }
        if state.channels.remove(&channel).is_none() {
            return Err(GatewayError::not_found("channel", channel.get()));
        }
        state.deleted.push(DeleteCall {
            channel,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn list_session_channels(
        &self,
        container: ContainerId,
    ) -> Result<Vec<SessionChannel>, GatewayError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .channels
            .iter()
            .filter(|(_, record)| record.container == container)
            .map(|(channel, record)| SessionChannel {
                channel: *channel,
                owner: record.owner,
            })
            .collect())
    }

    async fn list_containers(&self, guild: GuildId) -> Result<Vec<ContainerInfo>, GatewayError> {
        let state = self.state.lock().unwrap();
        Ok(state.containers.get(&guild).cloned().unwrap_or_default())
    }
}

/// An acknowledgment event observed by a [`RecordingReplySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    Deferred { ephemeral: bool },
    Edited { text: String },
    Replied { text: String, ephemeral: bool },
}

/// [`ReplySink`] that records every acknowledgment for assertions.
pub struct RecordingReplySink {
    events: Arc<Mutex<Vec<ReplyEvent>>>,
    /// Counts terminal acknowledgments (edits and replies) so tests can wait
    /// for fire-and-forget dispatches to finish.
    terminal: Arc<watch::Sender<u32>>,
}

impl Default for RecordingReplySink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingReplySink {
    pub fn new() -> Self {
        let (terminal, _) = watch::channel(0);
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            terminal: Arc::new(terminal),
        }
    }

    pub fn events(&self) -> Vec<ReplyEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Text of the last terminal acknowledgment, if any.
    pub fn final_text(&self) -> Option<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|event| match event {
                ReplyEvent::Edited { text } | ReplyEvent::Replied { text, .. } => {
                    Some(text.clone())
                }
                ReplyEvent::Deferred { .. } => None,
            })
    }

    /// Suspend until at least one terminal acknowledgment was recorded.
    pub async fn wait_for_ack(&self) {
        let mut rx = self.terminal.subscribe();
        while *rx.borrow_and_update() == 0 {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    fn record_terminal(events: &Arc<Mutex<Vec<ReplyEvent>>>, terminal: &watch::Sender<u32>, event: ReplyEvent) {
        events.lock().unwrap().push(event);
        terminal.send_modify(|count| *count += 1);
    }
}

struct RecordingReplyHandle {
    events: Arc<Mutex<Vec<ReplyEvent>>>,
    terminal: Arc<watch::Sender<u32>>,
}

#[async_trait]
impl ReplyHandle for RecordingReplyHandle {
    async fn edit(&self, text: &str) -> Result<(), ReplyError> {
        RecordingReplySink::record_terminal(
            &self.events,
            &self.terminal,
            ReplyEvent::Edited {
                text: text.to_string(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ReplySink for RecordingReplySink {
    async fn defer(&self, ephemeral: bool) -> Result<Box<dyn ReplyHandle>, ReplyError> {
        self.events
            .lock()
            .unwrap()
            .push(ReplyEvent::Deferred { ephemeral });
        Ok(Box::new(RecordingReplyHandle {
            events: Arc::clone(&self.events),
            terminal: Arc::clone(&self.terminal),
        }))
    }

    async fn reply(&self, text: &str, ephemeral: bool) -> Result<(), ReplyError> {
        Self::record_terminal(
            &self.events,
            &self.terminal,
            ReplyEvent::Replied {
                text: text.to_string(),
                ephemeral,
            },
        );
        Ok(())
    }
}
