use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use std::str::FromStr;

/// Milliseconds between the unix epoch and the first second of 2015, the epoch of Discord IDs.
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;
const TIMESTAMP_SHIFT: u32 = 22;

/// A Discord ID. The upper 42 bits hold the creation time in milliseconds since [`DISCORD_EPOCH_MS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, derive_more::Display, derive_more::From)]
pub struct Snowflake(u64);

pub type GuildId = Snowflake;
pub type ChannelId = Snowflake;
pub type UserId = Snowflake;
pub type RoleId = Snowflake;
pub type MessageId = Snowflake;

impl Snowflake {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The smallest ID that could have been created at `timestamp`.
    ///
    /// Used as an `after` cursor: Discord returns only IDs strictly greater than it.
    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        let millis = (timestamp.timestamp_millis() - DISCORD_EPOCH_MS).max(0) as u64;
        Self(millis << TIMESTAMP_SHIFT)
    }

    pub fn timestamp(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis((self.0 >> TIMESTAMP_SHIFT) as i64 + DISCORD_EPOCH_MS)
    }
}

impl FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // IDs are sent as strings, but accept numbers as well.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Number(number) => Ok(Self(number)),
        }
    }
}
