mod model;

pub use model::CurrentUser;

use crate::{
    gateway::PresenceMap,
    permissions::{
        MemberPermissions,
        PermissionOverwrite,
    },
    Channel,
    ChannelId,
    ChannelKind,
    ChannelMessage,
    Guild,
    GuildId,
    Member,
    MessageStream,
    Platform,
    PlatformError,
    PlatformFuture,
    Snowflake,
};
use chrono::{
    DateTime,
    Utc,
};
use futures::{
    stream,
    StreamExt,
    TryStreamExt,
};
use guild_pulse_config::{
    PlatformSettings,
    Secret,
};
use model::{
    ApiChannel,
    ApiGuild,
    ApiMember,
    ApiMessage,
    RateLimited,
};
use reqwest::{
    header::AUTHORIZATION,
    StatusCode,
};
use serde::de::DeserializeOwned;
use std::{
    collections::HashMap,
    time::Duration,
};

const MEMBERS_PAGE_SIZE: usize = 1000;
const MESSAGES_PAGE_SIZE: usize = 100;
const MAX_ATTEMPTS: u32 = 5;
const USER_AGENT: &str = concat!("DiscordBot (", env!("CARGO_PKG_REPOSITORY"), ", ", env!("CARGO_PKG_VERSION"), ")");

/// Discord REST client implementing [`Platform`].
///
/// Presences are read from the [`PresenceMap`] that the gateway session keeps up to date.
#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    token: Secret,
    max_history_pages: usize,
    presences: PresenceMap,
}

impl DiscordClient {
    pub fn new(settings: &PlatformSettings, presences: PresenceMap) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: settings.api_base_url.as_str().trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            max_history_pages: settings.max_history_pages,
            presences,
        })
    }

    /// The bot user. Fails with [`PlatformError::Unauthorized`] if the token is rejected.
    pub async fn current_user(&self) -> Result<CurrentUser, PlatformError> {
        self.get("/users/@me", &[]).await
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<T, PlatformError> {
        let url = format!("{}{}", self.base_url, endpoint);

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .http
                .get(&url)
                .header(AUTHORIZATION, format!("Bot {}", self.token.expose()))
                .query(query)
                .send()
                .await?;

            let status = response.status();
            let body = response.bytes().await?;

            match status {
                status if status.is_success() => {
                    return serde_json::from_slice(&body).map_err(|source| PlatformError::Decode {
                        endpoint: endpoint.to_string(),
                        source,
                    });
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let limited: RateLimited = serde_json::from_slice(&body).unwrap_or_default();
                    let wait = Duration::from_secs_f64(limited.retry_after.clamp(0.0, 60.0));
                    warn!(endpoint, attempt, ?wait, "Rate limited, waiting before retrying");
                    tokio::time::sleep(wait).await;
                }
                StatusCode::UNAUTHORIZED => return Err(PlatformError::Unauthorized),
                StatusCode::FORBIDDEN => {
                    return Err(PlatformError::Forbidden {
                        endpoint: endpoint.to_string(),
                        body: String::from_utf8_lossy(&body).into_owned(),
                    });
                }
                StatusCode::NOT_FOUND => {
                    return Err(PlatformError::NotFound {
                        endpoint: endpoint.to_string(),
                    });
                }
                status => {
                    return Err(PlatformError::Status {
                        status: status.as_u16(),
                        endpoint: endpoint.to_string(),
                        body: String::from_utf8_lossy(&body).into_owned(),
                    });
                }
            }
        }

        Err(PlatformError::RateLimited {
            endpoint: endpoint.to_string(),
            attempts: MAX_ATTEMPTS,
        })
    }

    async fn guild(&self, guild_id: GuildId) -> Result<Guild, PlatformError> {
        let guild: ApiGuild = self.get(&format!("/guilds/{guild_id}"), &[]).await?;
        let me = self.current_user().await?;
        let member: ApiMember = self.get(&format!("/guilds/{guild_id}/members/{}", me.id), &[]).await?;
        let channels: Vec<ApiChannel> = self.get(&format!("/guilds/{guild_id}/channels"), &[]).await?;

        let role_permissions: HashMap<_, _> = guild.roles.iter().map(|role| (role.id, role.permissions)).collect();
        let permissions = MemberPermissions {
            guild_id: guild.id,
            owner_id: guild.owner_id,
            role_permissions: &role_permissions,
            user_id: me.id,
            roles: &member.roles,
        };

        let channels = channels
            .into_iter()
            .map(|channel| {
                let overwrites: Vec<_> = channel
                    .permission_overwrites
                    .iter()
                    .filter_map(|ow| PermissionOverwrite::from_discord(ow.id, ow.kind, ow.allow, ow.deny))
                    .collect();
                Channel {
                    id: channel.id,
                    name: channel.name.unwrap_or_else(|| channel.id.to_string()),
                    kind: ChannelKind::from_discord(channel.kind),
                    can_read_history: permissions.in_channel(&overwrites).can_read_history(),
                }
            })
            .collect();

        Ok(Guild {
            id: guild.id,
            name: guild.name,
            channels,
        })
    }

    async fn members(&self, guild_id: GuildId) -> Result<Vec<Member>, PlatformError> {
        let endpoint = format!("/guilds/{guild_id}/members");
        let mut members = Vec::new();
        let mut after = Snowflake::default();

        loop {
            let page: Vec<ApiMember> = self
                .get(
                    &endpoint,
                    &[("limit", MEMBERS_PAGE_SIZE.to_string()), ("after", after.to_string())],
                )
                .await?;
            let page_len = page.len();

            for user in page.into_iter().filter_map(|member| member.user) {
                after = after.max(user.id);
                members.push(Member {
                    user_id: user.id,
                    presence: self.presences.status(user.id),
                });
            }

            if page_len < MEMBERS_PAGE_SIZE {
                break;
            }
        }

        debug!(%guild_id, members = members.len(), "Fetched guild roster");
        Ok(members)
    }

    async fn messages_after(&self, channel_id: ChannelId, after: Snowflake) -> Result<Vec<ApiMessage>, PlatformError> {
        self.get(
            &format!("/channels/{channel_id}/messages"),
            &[("limit", MESSAGES_PAGE_SIZE.to_string()), ("after", after.to_string())],
        )
        .await
    }
}

impl Platform for DiscordClient {
    fn resolve_guild(&self, guild_id: GuildId) -> PlatformFuture<'_, Guild> {
        Box::pin(async move {
            self.guild(guild_id).await.map_err(|err| match err {
                PlatformError::NotFound { .. } | PlatformError::Forbidden { .. } => {
                    debug!(%err, "Guild lookup failed");
                    PlatformError::GuildNotFound(guild_id)
                }
                err => err,
            })
        })
    }

    fn list_guild_members(&self, guild_id: GuildId) -> PlatformFuture<'_, Vec<Member>> {
        Box::pin(self.members(guild_id))
    }

    fn stream_channel_history_since(&self, channel_id: ChannelId, since: DateTime<Utc>) -> MessageStream<'_> {
        let max_pages = self.max_history_pages;
        let start = Some((Snowflake::from_timestamp(since), 0usize));

        stream::try_unfold(start, move |cursor| async move {
            let Some((after, fetched)) = cursor else {
                return Ok::<_, PlatformError>(None);
            };
            if fetched >= max_pages {
                warn!(%channel_id, pages = fetched, "Stopped paging through the history, the count is approximate");
                return Ok(None);
            }

            let page = self.messages_after(channel_id, after).await?;
            let next = (page.len() >= MESSAGES_PAGE_SIZE)
                .then(|| page.iter().map(|message| message.id).max())
                .flatten()
                .map(|newest| (newest, fetched + 1));

            let messages: Vec<_> = page
                .into_iter()
                .map(|message| ChannelMessage {
                    id: message.id,
                    channel_id: message.channel_id,
                    timestamp: message.timestamp,
                })
                .collect();
            Ok(Some((messages, next)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, PlatformError>)))
        .try_flatten()
        .boxed()
    }
}
