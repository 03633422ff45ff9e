//! The pending-or-ready handle stored per user in the registry map.
//!
//! A [`SessionSlot`] is a write-once state cell: it starts `Pending` at the
//! moment the slot is reserved in the map, and resolves exactly once to
//! `Ready(channel)` or `Failed(error)` when the gateway call completes.
//! Readers suspend until the state is no longer `Pending`. Resolution is
//! broadcast: every waiter observes the same outcome.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::ChannelId;
use crate::ports::GatewayError;

/// Resolution state of a session slot.
#[derive(Debug, Clone)]
pub enum SlotState {
    /// Creation is in flight.
    Pending,
    /// The session channel exists.
    Ready(ChannelId),
    /// Creation failed; the slot is being cleared from the map.
    Failed(GatewayError),
}

/// Shared write-once handle to a session channel that may still be under
/// creation.
///
/// Cloning is cheap and shares the underlying cell. Only the creation task
/// resolves the slot; everyone else observes.
#[derive(Debug, Clone)]
pub struct SessionSlot {
    cell: Arc<watch::Sender<SlotState>>,
}

impl SessionSlot {
    /// New unresolved slot, reserved ahead of an in-flight creation.
    pub fn pending() -> Self {
        let (tx, _rx) = watch::channel(SlotState::Pending);
        Self { cell: Arc::new(tx) }
    }

    /// Already-resolved slot, used when seeding from pre-existing channels.
    pub fn ready(channel: ChannelId) -> Self {
        let (tx, _rx) = watch::channel(SlotState::Ready(channel));
        Self { cell: Arc::new(tx) }
    }

    /// Current state without suspending.
    pub fn peek(&self) -> SlotState {
        self.cell.borrow().clone()
    }

    /// True when both handles point at the same underlying cell. Used to
    /// make sure a failed creation only clears its own map entry, never a
    /// newer generation's.
    pub fn same_cell(&self, other: &SessionSlot) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Resolve the slot. Called exactly once, by the creation task.
    pub(crate) fn resolve(&self, outcome: Result<ChannelId, GatewayError>) {
        let state = match outcome {
            Ok(channel) => SlotState::Ready(channel),
            Err(err) => SlotState::Failed(err),
        };
        self.cell.send_replace(state);
    }

    /// Suspend until the slot is resolved, then return the outcome.
    pub async fn resolved(&self) -> Result<ChannelId, GatewayError> {
        let mut rx = self.cell.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                SlotState::Ready(channel) => return Ok(channel),
                SlotState::Failed(err) => return Err(err),
                SlotState::Pending => {
                    if rx.changed().await.is_err() {
                        // The cell is kept alive by the map entry and every
                        // clone; losing it means the creation task was torn
                        // down without resolving.
                        return Err(GatewayError::transport("creation task dropped"));
                    }
                }
            }
        }
    }
}
