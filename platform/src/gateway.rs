//! A minimal Discord gateway session.
//!
//! Only what sampling needs is implemented: identify with the presence and member intents, keep the heartbeat
//! going, publish readiness and mirror the presences of the monitored guild into a [`PresenceMap`]. The session
//! counts as ready once the presences of the monitored guild are loaded, not on `READY` itself. Lost connections
//! are re-established with a fresh identify, session resume is not supported.

use crate::{
    GuildId,
    PresenceStatus,
    UserId,
};
use futures::{
    Sink,
    SinkExt,
    Stream,
    StreamExt,
};
use guild_pulse_config::{
    PlatformSettings,
    Secret,
};
use serde::Deserialize;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::watch,
    time::Instant,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        protocol::CloseFrame,
        Message,
    },
};
use tokio_util::sync::CancellationToken;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INTENT_GUILDS: u64 = 1 << 0;
const INTENT_GUILD_MEMBERS: u64 = 1 << 1;
const INTENT_GUILD_PRESENCES: u64 = 1 << 8;

const CLOSE_AUTHENTICATION_FAILED: u16 = 4004;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("The gateway rejected the bot token")]
    AuthenticationFailed,
    #[error("The gateway closed the session permanently ({code}): {reason}")]
    Fatal { code: u16, reason: String },
    #[error("Websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("Invalid gateway payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Gateway protocol violation: {0}")]
    Protocol(String),
    #[error("Connection closed: {0}")]
    Disconnected(String),
    #[error("The gateway asked for a new session")]
    SessionInvalidated,
    #[error("No heartbeat acknowledgement received")]
    Zombie,
    #[error("The gateway session stopped")]
    Stopped,
}

impl GatewayError {
    /// Errors a reconnect can not fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::AuthenticationFailed | GatewayError::Fatal { .. })
    }

    fn from_close_frame(frame: Option<CloseFrame>) -> Self {
        let Some(frame) = frame else {
            return GatewayError::Disconnected("closed without a close frame".to_string());
        };
        let code = u16::from(frame.code);
        let reason = frame.reason.to_string();
        match code {
            CLOSE_AUTHENTICATION_FAILED => GatewayError::AuthenticationFailed,
            // Invalid shard, sharding required, invalid API version, invalid and disallowed intents.
            4010..=4014 => GatewayError::Fatal { code, reason },
            _ => GatewayError::Disconnected(format!("{code}: {reason}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// `READY` was received, the monitored guild has not arrived yet.
    Identified { user_id: UserId },
    Ready { user_id: UserId },
    Disconnected,
}

/// Presences of the members of the monitored guild, shared between the gateway session and the REST client.
#[derive(Debug, Clone, Default)]
pub struct PresenceMap {
    inner: Arc<Mutex<HashMap<UserId, PresenceStatus>>>,
}

impl PresenceMap {
    /// Members without a known presence are offline.
    pub fn status(&self, user_id: UserId) -> PresenceStatus {
        self.inner
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&self, user_id: UserId, status: PresenceStatus) {
        self.inner.lock().unwrap().insert(user_id, status);
    }

    pub fn remove(&self, user_id: UserId) {
        self.inner.lock().unwrap().remove(&user_id);
    }

    pub fn replace_all(&self, presences: impl IntoIterator<Item = (UserId, PresenceStatus)>) {
        let mut inner = self.inner.lock().unwrap();
        inner.clear();
        inner.extend(presences);
    }

    pub fn online(&self) -> usize {
        self.inner.lock().unwrap().values().filter(|s| s.is_online()).count()
    }
}

/// Cloneable view on the connection state of a [`GatewaySession`].
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    state: watch::Receiver<ConnectionState>,
}

impl GatewayHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Resolves once the session is ready for the first time, i.e. the presences of the monitored guild are loaded.
    pub async fn wait_until_ready(&mut self) -> Result<UserId, GatewayError> {
        let state = self
            .state
            .wait_for(|state| matches!(state, ConnectionState::Ready { .. }))
            .await
            .map_err(|_| GatewayError::Stopped)?;
        match *state {
            ConnectionState::Ready { user_id } => Ok(user_id),
            _ => Err(GatewayError::Stopped),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Payload {
    op: u8,
    #[serde(default)]
    d: serde_json::Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct PartialUser {
    id: UserId,
}

#[derive(Debug, Deserialize)]
struct PartialGuild {
    id: GuildId,
}

#[derive(Debug, Deserialize)]
struct Ready {
    user: PartialUser,
    /// Guilds the bot is in. Their data follows in separate `GUILD_CREATE` events.
    #[serde(default)]
    guilds: Vec<PartialGuild>,
}

#[derive(Debug, Deserialize)]
struct PresenceUpdate {
    user: PartialUser,
    #[serde(default)]
    guild_id: Option<GuildId>,
    status: PresenceStatus,
}

#[derive(Debug, Deserialize)]
struct GuildCreate {
    id: GuildId,
    #[serde(default)]
    presences: Vec<PresenceUpdate>,
}

#[derive(Debug, Deserialize)]
struct GuildMemberRemove {
    guild_id: GuildId,
    user: PartialUser,
}

pub struct GatewaySession {
    url: url::Url,
    token: Secret,
    guild_id: GuildId,
    presences: PresenceMap,
    state: watch::Sender<ConnectionState>,
}

impl GatewaySession {
    pub fn new(settings: &PlatformSettings, presences: PresenceMap) -> (Self, GatewayHandle) {
        let (state, receiver) = watch::channel(ConnectionState::Connecting);
        let session = Self {
            url: settings.gateway_url.clone(),
            token: settings.token.clone(),
            guild_id: GuildId::new(settings.guild_id),
            presences,
            state,
        };
        (session, GatewayHandle { state: receiver })
    }

    /// Keep a session alive until `shutdown` is cancelled or the gateway fails permanently.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        let mut backoff = maybe_backoff::MaybeBackoff::default();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                _ = backoff.sleep() => {}
            }

            self.state.send_replace(ConnectionState::Connecting);
            match self.connect(&shutdown).await {
                Ok(()) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(err) if err.is_fatal() => {
                    error!(%err, "Gateway session failed permanently");
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Err(err);
                }
                Err(err) => {
                    warn!(%err, "Gateway connection lost, reconnecting");
                    let was_ready = matches!(*self.state.borrow(), ConnectionState::Ready { .. });
                    self.state.send_replace(ConnectionState::Disconnected);
                    // A session that got ready starts over with the shortest delay.
                    if was_ready {
                        backoff.disarm();
                    }
                    backoff.arm();
                }
            }
        }
    }

    async fn connect(&self, shutdown: &CancellationToken) -> Result<(), GatewayError> {
        debug!(url = %self.url, "Connecting to the gateway");
        let (socket, _response) = connect_async(self.url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let hello = next_payload(&mut stream).await?;
        if hello.op != OP_HELLO {
            return Err(GatewayError::Protocol(format!("expected hello, got op {}", hello.op)));
        }
        let hello: Hello = serde_json::from_value(hello.d)?;
        let period = Duration::from_millis(hello.heartbeat_interval);
        debug!(?period, "Received gateway hello");

        send(&mut sink, self.identify()).await?;

        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        let mut sequence: Option<u64> = None;
        let mut awaiting_ack = false;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        return Err(GatewayError::Zombie);
                    }
                    send(&mut sink, heartbeat_payload(sequence)).await?;
                    awaiting_ack = true;
                }
                message = stream.next() => {
                    let Some(message) = message else {
                        return Err(GatewayError::Disconnected("stream ended".to_string()));
                    };
                    let payload = match message? {
                        Message::Text(text) => serde_json::from_str::<Payload>(text.as_str())?,
                        Message::Close(frame) => return Err(GatewayError::from_close_frame(frame)),
                        _ => continue,
                    };
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }
                    match payload.op {
                        OP_DISPATCH => self.dispatch(payload.t.as_deref().unwrap_or_default(), payload.d)?,
                        OP_HEARTBEAT => send(&mut sink, heartbeat_payload(sequence)).await?,
                        OP_HEARTBEAT_ACK => awaiting_ack = false,
                        OP_RECONNECT => return Err(GatewayError::Disconnected("reconnect requested".to_string())),
                        OP_INVALID_SESSION => return Err(GatewayError::SessionInvalidated),
                        op => trace!(op, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }

    fn identify(&self) -> serde_json::Value {
        serde_json::json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.token.expose(),
                "intents": INTENT_GUILDS | INTENT_GUILD_MEMBERS | INTENT_GUILD_PRESENCES,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": env!("CARGO_PKG_NAME"),
                    "device": env!("CARGO_PKG_NAME"),
                },
            },
        })
    }

    fn dispatch(&self, event: &str, data: serde_json::Value) -> Result<(), GatewayError> {
        match event {
            "READY" => {
                let ready: Ready = serde_json::from_value(data)?;
                let user_id = ready.user.id;
                info!(%user_id, "Connected to the gateway");
                if ready.guilds.iter().any(|guild| guild.id == self.guild_id) {
                    self.state.send_replace(ConnectionState::Identified { user_id });
                } else {
                    warn!(guild_id = %self.guild_id, "The bot is not a member of the monitored guild");
                    self.state.send_replace(ConnectionState::Ready { user_id });
                }
            }
            "GUILD_CREATE" => {
                let guild: GuildCreate = serde_json::from_value(data)?;
                if guild.id == self.guild_id {
                    self.presences
                        .replace_all(guild.presences.into_iter().map(|p| (p.user.id, p.status)));
                    debug!(online = self.presences.online(), "Loaded guild presences");
                    self.state.send_if_modified(|state| match *state {
                        ConnectionState::Identified { user_id } => {
                            *state = ConnectionState::Ready { user_id };
                            true
                        }
                        _ => false,
                    });
                }
            }
            "PRESENCE_UPDATE" => {
                let update: PresenceUpdate = serde_json::from_value(data)?;
                if update.guild_id == Some(self.guild_id) {
                    self.presences.set(update.user.id, update.status);
                }
            }
            "GUILD_MEMBER_REMOVE" => {
                let removed: GuildMemberRemove = serde_json::from_value(data)?;
                if removed.guild_id == self.guild_id {
                    self.presences.remove(removed.user.id);
                }
            }
            _ => trace!(event, "Ignoring gateway event"),
        }
        Ok(())
    }
}

fn heartbeat_payload(sequence: Option<u64>) -> serde_json::Value {
    serde_json::json!({ "op": OP_HEARTBEAT, "d": sequence })
}

async fn send<S>(sink: &mut S, payload: serde_json::Value) -> Result<(), GatewayError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(payload.to_string().into())).await?;
    Ok(())
}

async fn next_payload<S>(stream: &mut S) -> Result<Payload, GatewayError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
            Message::Close(frame) => return Err(GatewayError::from_close_frame(frame)),
            _ => continue,
        }
    }
    Err(GatewayError::Disconnected("stream ended before hello".to_string()))
}
