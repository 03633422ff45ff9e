//! Wire payload types for the channel endpoints.
//!
//! Snowflakes travel as strings on the wire; conversion to the domain's
//! numeric ids happens here.

use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::ports::GatewayError;

/// Guild text channel.
pub(super) const CHANNEL_KIND_TEXT: u8 = 0;
/// Category channel (the session container).
pub(super) const CHANNEL_KIND_CATEGORY: u8 = 4;
/// Permission overwrite targeting a single member.
pub(super) const OVERWRITE_KIND_MEMBER: u8 = 1;
/// VIEW_CHANNEL permission bit.
pub(super) const PERM_VIEW_CHANNEL: u64 = 1 << 10;

/// Channel object as returned by the channel endpoints. Only the fields the
/// adapter reads are modeled.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct ChannelPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub permission_overwrites: Vec<OverwritePayload>,
}

/// Permission overwrite entry. `allow`/`deny` are stringified bitsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct OverwritePayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub allow: String,
    #[serde(default)]
    pub deny: String,
}

impl OverwritePayload {
    /// Overwrite granting VIEW_CHANNEL to a single member.
    pub fn member_view(user: UserId) -> Self {
        Self {
            id: user.to_string(),
            kind: OVERWRITE_KIND_MEMBER,
            allow: PERM_VIEW_CHANNEL.to_string(),
            deny: "0".to_string(),
        }
    }
}

/// Body of `POST /guilds/{id}/channels`.
#[derive(Debug, Serialize)]
pub(super) struct CreateChannelBody<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub kind: u8,
    pub parent_id: String,
    pub permission_overwrites: Vec<OverwritePayload>,
}

/// The designated owner of a session channel: the single member the channel
/// carries a permission overwrite for. Channels with zero or several member
/// overwrites are not session channels.
pub(super) fn session_owner(payload: &ChannelPayload) -> Option<UserId> {
    let mut members = payload
        .permission_overwrites
        .iter()
        .filter(|o| o.kind == OVERWRITE_KIND_MEMBER);

    match (members.next(), members.next()) {
        (Some(only), None) => only.id.parse().ok().map(UserId::new),
        _ => None,
    }
}

pub(super) fn parse_snowflake(raw: &str, entity: &'static str) -> Result<u64, GatewayError> {
    raw.parse()
        .map_err(|_| GatewayError::rejected(format!("malformed {entity} id: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> ChannelPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn deserializes_a_session_channel() {
        let channel = payload(
            r#"{
                "id": "1001",
                "type": 0,
                "name": "session-3",
                "parent_id": "555",
                "guild_id": "42",
                "permission_overwrites": [
                    { "id": "77", "type": 1, "allow": "1024", "deny": "0" }
                ]
            }"#,
        );

        assert_eq!(channel.kind, CHANNEL_KIND_TEXT);
        assert_eq!(channel.parent_id.as_deref(), Some("555"));
        assert_eq!(session_owner(&channel), Some(UserId::new(77)));
    }

    #[test]
    fn channels_without_a_single_member_overwrite_have_no_owner() {
        let none = payload(r#"{ "id": "1", "type": 0, "permission_overwrites": [] }"#);
        assert_eq!(session_owner(&none), None);

        let two = payload(
            r#"{
                "id": "1",
                "type": 0,
                "permission_overwrites": [
                    { "id": "7", "type": 1, "allow": "1024", "deny": "0" },
                    { "id": "8", "type": 1, "allow": "1024", "deny": "0" }
                ]
            }"#,
        );
        assert_eq!(session_owner(&two), None);

        // Role overwrites don't count as owners.
        let role = payload(
            r#"{
                "id": "1",
                "type": 0,
                "permission_overwrites": [
                    { "id": "9", "type": 0, "allow": "1024", "deny": "0" },
                    { "id": "7", "type": 1, "allow": "1024", "deny": "0" }
                ]
            }"#,
        );
        assert_eq!(session_owner(&role), Some(UserId::new(7)));
    }

    #[test]
    fn member_view_overwrite_encodes_the_permission_bit() {
        let overwrite = OverwritePayload::member_view(UserId::new(42));
        let json = serde_json::to_value(&overwrite).unwrap();
        assert_eq!(json["id"], "42");
        assert_eq!(json["type"], 1);
        assert_eq!(json["allow"], "1024");
    }

    #[test]
    fn malformed_snowflakes_are_rejected() {
        assert_eq!(parse_snowflake("123", "channel").unwrap(), 123);
        assert!(matches!(
            parse_snowflake("abc", "channel"),
            Err(GatewayError::Rejected { .. })
        ));
    }
}
