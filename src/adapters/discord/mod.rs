//! Discord REST adapter for the [`crate::ports::ChannelGateway`] port.
//!
//! Talks to the guild channel endpoints directly over `reqwest`:
//! - `POST /guilds/{id}/channels` to create a session channel visible only
//!   to its owner
//! - `DELETE /channels/{id}` to tear it down
//! - `GET /guilds/{id}/channels` to resolve containers and seed registries
//!
//! Audit reasons travel in the `X-Audit-Log-Reason` header. The bot token is
//! handled via `secrecy::SecretString` and never logged.

mod rest;
mod wire;

pub use rest::DiscordRestGateway;
