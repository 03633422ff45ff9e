//! Application layer: the session registry, its concurrency primitives, and
//! the dispatcher that routes commands to the registry owning their guild.

mod command;
mod dispatcher;
mod errors;
mod registry;
mod slot;

pub use command::{Participant, SessionAction, SessionCommand};
pub use dispatcher::Dispatcher;
pub use errors::SessionError;
pub use registry::SessionRegistry;
pub use slot::{SessionSlot, SlotState};
