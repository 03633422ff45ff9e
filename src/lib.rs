//! Session Aide - concurrency-safe help session channels for chat guilds.
//!
//! Each guild gets a [`application::SessionRegistry`] that owns the mapping
//! from user to their help session channel and guarantees that concurrent
//! start/end commands for the same user never create duplicate channels or
//! double-delete one. The [`application::Dispatcher`] routes typed command
//! events to the registry owning the event's guild.
//!
//! Platform glue (gateway connection, slash command registration, payload
//! decoding) stays outside this crate: embedders feed
//! [`application::SessionCommand`]s in and provide the ports in [`ports`],
//! or use the shipped [`adapters::discord`] REST adapter.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
