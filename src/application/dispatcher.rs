//! Dispatcher - routes inbound commands to the registry owning their guild.
//!
//! Owns the process-wide guild → registry table. Entries are inserted when a
//! guild becomes ready and a uniquely-named session container is found, are
//! read-only afterwards, and are never removed (guilds do not disappear at
//! runtime in this design).

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::SessionSettings;
use crate::domain::GuildId;
use crate::ports::ChannelGateway;

use super::command::{SessionAction, SessionCommand};
use super::errors::SessionError;
use super::registry::SessionRegistry;

/// Routes commands to per-guild session registries.
pub struct Dispatcher {
    registries: DashMap<GuildId, Arc<SessionRegistry>>,
    gateway: Arc<dyn ChannelGateway>,
    container_name: String,
    channel_prefix: String,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn ChannelGateway>, settings: &SessionSettings) -> Self {
        Self {
            registries: DashMap::new(),
            gateway,
            container_name: settings.container_name.clone(),
            channel_prefix: settings.channel_prefix.clone(),
        }
    }

    /// Register a guild once it becomes ready.
    ///
    /// Resolves the configured container by name (case-insensitive). Absence
    /// or ambiguity is a non-fatal "no registry created" condition: commands
    /// for the guild will be answered with a setup hint until a later
    /// `guild_ready` succeeds.
    ///
    /// Seeding of pre-existing session channels runs in the background; see
    /// [`SessionRegistry::seed`].
    pub async fn guild_ready(&self, guild: GuildId) -> Result<(), SessionError> {
        if self.registries.contains_key(&guild) {
            return Ok(());
        }

        let containers = self.gateway.list_containers(guild).await?;
        let mut matching = containers
            .into_iter()
            .filter(|c| c.name.eq_ignore_ascii_case(&self.container_name));

        let container = match (matching.next(), matching.next()) {
            (Some(only), None) => only,
            (None, _) => {
                tracing::info!(
                    guild = %guild,
                    container_name = %self.container_name,
                    "no session container in guild; registry not created"
                );
                return Err(SessionError::ContainerNotFound { guild });
            }
            (Some(first), Some(second)) => {
                tracing::warn!(
                    guild = %guild,
                    container_name = %self.container_name,
                    first = %first.id,
                    second = %second.id,
                    "ambiguous session containers in guild; registry not created"
                );
                return Err(SessionError::ContainerNotFound { guild });
            }
        };

        let registry = Arc::new(SessionRegistry::new(
            guild,
            container.id,
            self.channel_prefix.clone(),
            Arc::clone(&self.gateway),
        ));

        // Two concurrent ready events for the same guild must end up with a
        // single registry; the table's entry is the atomic step. Only the
        // inserted registry gets seeded.
        match self.registries.entry(guild) {
            dashmap::mapref::entry::Entry::Occupied(_) => {}
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&registry));
                tokio::spawn(async move { registry.seed().await });
            }
        }

        tracing::info!(guild = %guild, container = %container.id, "session registry ready");
        Ok(())
    }

    /// Route a command and wait for it to finish. Used by embedders that
    /// manage their own task per event, and by tests.
    pub async fn handle(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        route(self.registry(cmd.guild), cmd).await
    }

    /// Route a command in its own task, fire-and-forget.
    ///
    /// Failure isolation: an error while handling one command is logged and
    /// terminates only that task; it never affects other sessions.
    pub fn dispatch(&self, cmd: SessionCommand) {
        let registry = self.registry(cmd.guild);
        tokio::spawn(async move {
            let guild = cmd.guild;
            let target = cmd.target.id;
            if let Err(err) = route(registry, cmd).await {
                tracing::error!(
                    guild = %guild,
                    target = %target,
                    error = %err,
                    "session command failed"
                );
            }
        });
    }

    /// Registry for a guild, when one has been created.
    pub fn registry(&self, guild: GuildId) -> Option<Arc<SessionRegistry>> {
        self.registries.get(&guild).map(|r| Arc::clone(r.value()))
    }
}

async fn route(
    registry: Option<Arc<SessionRegistry>>,
    cmd: SessionCommand,
) -> Result<(), SessionError> {
    let Some(registry) = registry else {
        let _ = cmd
            .reply
            .reply("Help sessions are not set up in this guild.", true)
            .await;
        return Err(SessionError::RegistryNotFound { guild: cmd.guild });
    };

    match cmd.action {
        SessionAction::Start => registry.start(&cmd).await,
        SessionAction::End => registry.end(&cmd).await,
    }
}
