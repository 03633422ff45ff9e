//! The REST gateway implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{header, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;

use crate::config::DiscordSettings;
use crate::domain::{ChannelId, ContainerId, GuildId, UserId};
use crate::ports::{ChannelGateway, ContainerInfo, GatewayError, SessionChannel};

use super::wire::{
    parse_snowflake, session_owner, ChannelPayload, CreateChannelBody, OverwritePayload,
    CHANNEL_KIND_CATEGORY, CHANNEL_KIND_TEXT,
};

const AUDIT_REASON_HEADER: &str = "X-Audit-Log-Reason";

/// [`ChannelGateway`] backed by the platform's REST API.
pub struct DiscordRestGateway {
    settings: DiscordSettings,
    http: reqwest::Client,
    /// Container → guild cache. The channel-create and channel-list
    /// endpoints are guild-scoped while the port speaks in containers;
    /// listings fill this, with a single channel lookup as fallback.
    container_guilds: DashMap<ContainerId, GuildId>,
}

impl DiscordRestGateway {
    pub fn new(settings: DiscordSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
            container_guilds: DashMap::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.api_base_url.trim_end_matches('/'), path)
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.settings.token.expose_secret())
    }

    /// Resolve the guild owning `container`, via cache or channel lookup.
    async fn guild_for(&self, container: ContainerId) -> Result<GuildId, GatewayError> {
        if let Some(guild) = self.container_guilds.get(&container) {
            return Ok(*guild);
        }

        let response = self
            .http
            .get(self.url(&format!("/channels/{container}")))
            .header(header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(transport)?;
        let payload: ChannelPayload = decode(response, "container", container.get()).await?;

        if payload.kind != CHANNEL_KIND_CATEGORY {
            return Err(GatewayError::rejected(format!(
                "container {container} is not a category channel"
            )));
        }
        let guild_raw = payload
            .guild_id
            .ok_or_else(|| GatewayError::rejected(format!("container {container} has no guild")))?;
        let guild = GuildId::new(parse_snowflake(&guild_raw, "guild")?);

        self.container_guilds.insert(container, guild);
        Ok(guild)
    }

    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelPayload>, GatewayError> {
        let response = self
            .http
            .get(self.url(&format!("/guilds/{guild}/channels")))
            .header(header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(transport)?;
        decode(response, "guild", guild.get()).await
    }
}

#[async_trait]
impl ChannelGateway for DiscordRestGateway {
    async fn create_session_channel(
        &self,
        container: ContainerId,
        name: &str,
        _issuer: UserId,
        target: UserId,
        reason: &str,
    ) -> Result<ChannelId, GatewayError> {
        let guild = self.guild_for(container).await?;
        let body = CreateChannelBody {
            name,
            kind: CHANNEL_KIND_TEXT,
            parent_id: container.to_string(),
            permission_overwrites: vec![OverwritePayload::member_view(target)],
        };

        let response = self
            .http
            .post(self.url(&format!("/guilds/{guild}/channels")))
            .header(header::AUTHORIZATION, self.authorization())
            .header(AUDIT_REASON_HEADER, header_safe(reason))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let payload: ChannelPayload = decode(response, "container", container.get()).await?;

        tracing::debug!(channel = %payload.id, name = %name, "session channel created");
        Ok(ChannelId::new(parse_snowflake(&payload.id, "channel")?))
    }

    async fn delete_session_channel(
        &self,
        channel: ChannelId,
        reason: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .http
            .delete(self.url(&format!("/channels/{channel}")))
            .header(header::AUTHORIZATION, self.authorization())
            .header(AUDIT_REASON_HEADER, header_safe(reason))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(channel = %channel, "session channel deleted");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(error_for_status(status, body, "channel", channel.get()))
        }
    }

    async fn list_session_channels(
        &self,
        container: ContainerId,
    ) -> Result<Vec<SessionChannel>, GatewayError> {
        let guild = self.guild_for(container).await?;
        let parent = container.to_string();

        let mut sessions = Vec::new();
        for payload in self.guild_channels(guild).await? {
            if payload.kind != CHANNEL_KIND_TEXT || payload.parent_id.as_deref() != Some(&*parent)
            {
                continue;
            }
            let Some(owner) = session_owner(&payload) else {
                tracing::debug!(
                    channel = %payload.id,
                    "channel under the container has no single owner; skipping"
                );
                continue;
            };
            sessions.push(SessionChannel {
                channel: ChannelId::new(parse_snowflake(&payload.id, "channel")?),
                owner,
            });
        }
        Ok(sessions)
    }

    async fn list_containers(&self, guild: GuildId) -> Result<Vec<ContainerInfo>, GatewayError> {
        let mut containers = Vec::new();
        for payload in self.guild_channels(guild).await? {
            if payload.kind != CHANNEL_KIND_CATEGORY {
                continue;
            }
            let id = ContainerId::new(parse_snowflake(&payload.id, "container")?);
            self.container_guilds.insert(id, guild);
            containers.push(ContainerInfo {
                id,
                name: payload.name.unwrap_or_default(),
            });
        }
        Ok(containers)
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    GatewayError::transport(err.to_string())
}

fn error_for_status(
    status: StatusCode,
    body: String,
    entity: &'static str,
    id: u64,
) -> GatewayError {
    if status == StatusCode::NOT_FOUND {
        GatewayError::not_found(entity, id)
    } else if status.is_client_error() {
        GatewayError::rejected(format!("{status}: {body}"))
    } else {
        GatewayError::transport(format!("{status}: {body}"))
    }
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    entity: &'static str,
    id: u64,
) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        response
            .json()
            .await
            .map_err(|err| GatewayError::transport(format!("invalid response body: {err}")))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, body, entity, id))
    }
}

/// Audit reasons travel in a header; display names may contain characters a
/// header value cannot.
fn header_safe(reason: &str) -> String {
    reason
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
        .collect()
}
