use crate::{
    cycle::SamplingCycle,
    scheduler::Scheduler,
};
use color_eyre::{
    eyre::{
        eyre,
        WrapErr,
    },
    Result,
};
use guild_pulse_config::{
    Args,
    Config,
    Settings,
};
use guild_pulse_platform::{
    discord::DiscordClient,
    gateway::{
        GatewayError,
        GatewaySession,
        PresenceMap,
    },
    GuildId,
    PlatformError,
};
use guild_pulse_stats_gatherer::{
    MetricsCollector,
    RecordStore,
};
use guild_pulse_sync::Publisher;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const GATEWAY_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct App {
    settings: Settings,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        let settings = Config::new(&args)
            .wrap_err("Failed to load the configuration")?
            .into_settings()?;
        Ok(Self { settings })
    }

    pub async fn run(self) -> Result<()> {
        let Settings {
            platform,
            schedule,
            data_dir,
            sync,
        } = self.settings;
        let guild_id = GuildId::new(platform.guild_id);

        let presences = PresenceMap::default();
        let client = DiscordClient::new(&platform, presences.clone())?;
        let me = client.current_user().await.map_err(|err| match err {
            PlatformError::Unauthorized => eyre!("The platform rejected PLATFORM_TOKEN"),
            err => eyre!(err).wrap_err("Failed to verify PLATFORM_TOKEN"),
        })?;
        info!(user = %me.username, user_id = %me.id, %guild_id, "Authenticated");

        let store = RecordStore::new(&data_dir);
        store
            .prepare()
            .wrap_err_with(|| format!("Failed to prepare the data directory {}", data_dir.display()))?;
        let publisher = Publisher::from_settings(&sync).await;

        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_signal(shutdown.clone()));

        let (session, mut gateway) = GatewaySession::new(&platform, presences);
        let mut session = tokio::spawn(session.run(shutdown.child_token()));

        let collector = MetricsCollector::new(Arc::new(client), guild_id, schedule.message_window);
        let cycle = SamplingCycle::new(collector, store, publisher);
        let scheduler = Scheduler::new(&schedule);
        let ready = async move {
            let user_id = gateway.wait_until_ready().await?;
            debug!(%user_id, "Gateway ready");
            Ok::<_, color_eyre::Report>(())
        };

        let result = tokio::select! {
            result = scheduler.run(&cycle, ready, shutdown.clone()) => result.map(|cycles| {
                debug!(cycles, "Sampling finished");
            }),
            err = gateway_failure(&mut session) => Err(eyre!(err).wrap_err("The gateway session failed")),
        };

        shutdown.cancel();
        if tokio::time::timeout(GATEWAY_STOP_TIMEOUT, &mut session).await.is_err() {
            warn!("Gateway session did not stop in time");
            session.abort();
        }
        result
    }
}

/// Resolves with the error that ended the gateway session. Never resolves if the session stopped on shutdown.
async fn gateway_failure(session: &mut JoinHandle<Result<(), GatewayError>>) -> GatewayError {
    match session.await {
        Ok(Err(err)) => err,
        Ok(Ok(())) => std::future::pending().await,
        Err(err) => GatewayError::Protocol(format!("gateway task panicked: {err}")),
    }
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
