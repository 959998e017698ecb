use crate::GuildId;

#[derive(thiserror::Error, Debug)]
pub enum PlatformError {
    #[error("Guild {0} could not be resolved, is the bot a member of it?")]
    GuildNotFound(GuildId),
    #[error("Missing permissions for {endpoint}: {body}")]
    Forbidden { endpoint: String, body: String },
    #[error("The platform rejected the bot token")]
    Unauthorized,
    #[error("{endpoint} does not exist")]
    NotFound { endpoint: String },
    #[error("Still rate limited on {endpoint} after {attempts} attempts")]
    RateLimited { endpoint: String, attempts: u32 },
    #[error("Unexpected status {status} from {endpoint}: {body}")]
    Status { status: u16, endpoint: String, body: String },
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unable to decode the response of {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PlatformError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, PlatformError::Forbidden { .. })
    }
}
