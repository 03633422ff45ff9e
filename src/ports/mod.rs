//! Ports: the contracts the session core depends on.
//!
//! Implementations live in [`crate::adapters`] (a REST adapter for the real
//! platform, in-memory doubles for tests) or in the embedding application.

mod channel_gateway;
mod reply_sink;

pub use channel_gateway::{ChannelGateway, ContainerInfo, GatewayError, SessionChannel};
pub use reply_sink::{ReplyError, ReplyHandle, ReplySink};
