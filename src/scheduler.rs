use crate::cycle::{
    CycleReport,
    SamplingCycle,
};
use color_eyre::Result;
use guild_pulse_config::ScheduleSettings;
use guild_pulse_platform::Platform;
use std::{
    future::Future,
    time::Duration,
};
use tokio::{
    sync::watch,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SchedulerState {
    Idle,
    AwaitingConnection,
    Running,
    Sleeping,
}

enum CycleEnd {
    Completed(CycleReport),
    TimedOut,
    /// Cancelled and still running after the shutdown grace period.
    Abandoned,
}

/// Runs sampling cycles on a fixed interval, one at a time.
///
/// The first cycle starts as soon as the platform connection is ready. Ticks that are missed while a cycle runs
/// are skipped, so a slow cycle delays the schedule instead of causing a burst.
pub struct Scheduler {
    interval: Duration,
    cycle_timeout: Duration,
    shutdown_grace: Duration,
    run_once: bool,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(settings: &ScheduleSettings) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            interval: settings.sample_interval,
            cycle_timeout: settings.cycle_timeout,
            shutdown_grace: settings.shutdown_grace,
            run_once: settings.run_once,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
        trace!(%state, "Scheduler state");
    }

    /// Wait for `ready`, then run cycles until `shutdown` is cancelled or, in run-once mode, after the first cycle.
    ///
    /// Returns the number of cycles that were started. Fails only if `ready` fails.
    pub async fn run<P, R>(&self, cycle: &SamplingCycle<P>, ready: R, shutdown: CancellationToken) -> Result<u64>
    where
        P: Platform + ?Sized,
        R: Future<Output = Result<()>>,
    {
        self.set_state(SchedulerState::AwaitingConnection);
        info!("Waiting for the platform connection");
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                self.set_state(SchedulerState::Idle);
                return Ok(0);
            }
            ready = ready => {
                if let Err(err) = ready {
                    self.set_state(SchedulerState::Idle);
                    return Err(err);
                }
            }
        }
        info!(interval = %humantime::format_duration(self.interval), "Connection ready, sampling");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            cycles += 1;
            self.set_state(SchedulerState::Running);
            info!(cycle = cycles, "Cycle started");

            match self.run_cycle(cycle, &shutdown).await {
                CycleEnd::Completed(report) => report.log(cycles),
                CycleEnd::TimedOut => {
                    error!(cycle = cycles, timeout = %humantime::format_duration(self.cycle_timeout), "Cycle timed out and was abandoned");
                }
                CycleEnd::Abandoned => {
                    warn!(cycle = cycles, "Cycle abandoned on shutdown");
                    break;
                }
            }

            if self.run_once {
                break;
            }
            self.set_state(SchedulerState::Sleeping);
        }

        self.set_state(SchedulerState::Idle);
        info!(cycles, "Scheduler stopped");
        Ok(cycles)
    }

    async fn run_cycle<P: Platform + ?Sized>(&self, cycle: &SamplingCycle<P>, shutdown: &CancellationToken) -> CycleEnd {
        let work = tokio::time::timeout(self.cycle_timeout, cycle.run());
        tokio::pin!(work);

        tokio::select! {
            biased;
            result = &mut work => return result.map_or(CycleEnd::TimedOut, CycleEnd::Completed),
            _ = shutdown.cancelled() => {}
        }

        info!(grace = %humantime::format_duration(self.shutdown_grace), "Shutting down, letting the running cycle finish");
        match tokio::time::timeout(self.shutdown_grace, work).await {
            Ok(Ok(report)) => CycleEnd::Completed(report),
            Ok(Err(_)) => CycleEnd::TimedOut,
            Err(_) => CycleEnd::Abandoned,
        }
    }
}
