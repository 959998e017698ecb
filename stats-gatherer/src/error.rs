use guild_pulse_platform::{
    GuildId,
    PlatformError,
};

/// Failures that abort a whole collection. Failures of single channels are absorbed by the collectors.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("guild {0} not found or the bot is not a member")]
    GuildNotFound(GuildId),

    #[error("failed to resolve guild {guild_id}: {source}")]
    Guild {
        guild_id: GuildId,
        #[source]
        source: PlatformError,
    },

    #[error("failed to list the members of guild {guild_id}: {source}")]
    Roster {
        guild_id: GuildId,
        #[source]
        source: PlatformError,
    },
}
