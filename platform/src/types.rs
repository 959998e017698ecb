use crate::{
    ChannelId,
    GuildId,
    MessageId,
    UserId,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};

/// The monitored guild as seen by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
    pub channels: Vec<Channel>,
}

impl Guild {
    /// Channels that carry a message history.
    pub fn text_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|channel| channel.kind.is_text_bearing())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    /// Whether the bot's effective permissions in this channel allow reading the message history.
    pub can_read_history: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ChannelKind {
    Text,
    Announcement,
    Voice,
    Stage,
    Category,
    Forum,
    Other,
}

impl ChannelKind {
    /// Map the numeric channel type of the Discord API.
    pub fn from_discord(kind: u8) -> Self {
        match kind {
            0 => ChannelKind::Text,
            2 => ChannelKind::Voice,
            4 => ChannelKind::Category,
            5 => ChannelKind::Announcement,
            13 => ChannelKind::Stage,
            15 => ChannelKind::Forum,
            _ => ChannelKind::Other,
        }
    }

    pub fn is_text_bearing(&self) -> bool {
        matches!(self, ChannelKind::Text | ChannelKind::Announcement)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub user_id: UserId,
    pub presence: PresenceStatus,
}

/// Presence of a member. Invisible members are reported as offline by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Idle,
    #[serde(rename = "dnd")]
    #[strum(serialize = "dnd")]
    DoNotDisturb,
    #[default]
    Offline,
}

impl<'de> Deserialize<'de> for PresenceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let status = String::deserialize(deserializer)?;
        Ok(match status.as_str() {
            "online" => PresenceStatus::Online,
            "idle" => PresenceStatus::Idle,
            "dnd" => PresenceStatus::DoNotDisturb,
            _ => PresenceStatus::Offline,
        })
    }
}

impl PresenceStatus {
    pub fn is_online(&self) -> bool {
        !matches!(self, PresenceStatus::Offline)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub timestamp: DateTime<Utc>,
}
