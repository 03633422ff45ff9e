//! Domain layer: identifier value objects shared by every component.

mod ids;

pub use ids::{ChannelId, ContainerId, GuildId, UserId};
