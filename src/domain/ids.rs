//! Strongly-typed identifier value objects.
//!
//! All identifiers are platform snowflakes (64-bit unsigned integers). The
//! newtypes exist so a user id can never be passed where a channel id is
//! expected; conversion to the wire's string form lives in the adapters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a guild (a logical group of users and channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(u64);

/// Unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

/// Unique identifier for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

/// Unique identifier for the category channel session channels live under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(u64);

macro_rules! snowflake_id {
    ($name:ident) => {
        impl $name {
            /// Wraps a raw snowflake.
            pub fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw snowflake value.
            pub fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake_id!(GuildId);
snowflake_id!(UserId);
snowflake_id!(ChannelId);
snowflake_id!(ContainerId);

impl UserId {
    /// Chat-markup mention of this user (`<@id>`).
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl ChannelId {
    /// Chat-markup reference to this channel (`<#id>`).
    pub fn mention(&self) -> String {
        format!("<#{}>", self.0)
    }
}
