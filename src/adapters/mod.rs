//! Adapters: implementations of the ports in [`crate::ports`].

pub mod discord;
pub mod memory;

pub use discord::DiscordRestGateway;
pub use memory::{InMemoryChannelGateway, RecordingReplySink, ReplyEvent};
