//! The cycle loop: computes when to next act, then drives one
//! notify → connect → stream → disconnect pass per wake-up.
//!
//! The loop is deliberately self-healing: a bad cycle (unreachable channel,
//! decoder crash, failed notice) is logged and abandoned, and the next
//! wake-up proceeds on schedule.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Timelike};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use alertbot_common::models::AlertConfig;

use crate::Error;
use crate::audio::AudioStreamer;
use crate::services::notifier::Notifier;
use crate::services::voice_session::{GRACE_PERIOD, VoiceSession, VoiceSessionManager};

/// Per-cycle failure, caught at the loop boundary and never propagated
/// past it.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("voice connection failed: {0}")]
    Connection(#[source] Error),

    #[error("audio streaming failed: {0}")]
    Audio(#[source] Error),

    #[error("text notification failed: {0}")]
    Channel(#[source] Error),
}

/// Delay until the first cycle: one minute before the top of the hour.
pub fn initial_delay<Tz: TimeZone>(now: DateTime<Tz>) -> Duration {
    const LEAD_SECS: u32 = 60;
    let into_hour = now.minute() * 60 + now.second();
    let target = 3600 - LEAD_SECS;
    let secs = if into_hour < target {
        target - into_hour
    } else {
        target + 3600 - into_hour
    };
    Duration::from_secs(u64::from(secs))
}

/// Steady-state delay between cycles. The grace period spent inside the
/// session teardown is subtracted so successive cycles stay aligned to the
/// configured interval instead of drifting later each time.
pub fn steady_delay(interval_minutes: u32) -> Duration {
    Duration::from_secs(u64::from(interval_minutes) * 60).saturating_sub(GRACE_PERIOD)
}

/// Owns the wake-up timing policy and drives one streaming cycle per
/// wake-up. Collaborators are passed in as constructed dependencies.
pub struct AlertScheduler {
    config: Arc<AlertConfig>,
    notifier: Notifier,
    sessions: VoiceSessionManager,
    pipeline: Arc<dyn AudioStreamer>,
}

impl AlertScheduler {
    pub fn new(
        config: Arc<AlertConfig>,
        notifier: Notifier,
        sessions: VoiceSessionManager,
        pipeline: Arc<dyn AudioStreamer>,
    ) -> Self {
        Self {
            config,
            notifier,
            sessions,
            pipeline,
        }
    }

    /// Runs until the shutdown token is cancelled. Never returns early on
    /// cycle failures.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut wait = initial_delay(Local::now());
        loop {
            info!(
                "(AlertScheduler) next alert cycle in {}m{}s",
                wait.as_secs() / 60,
                wait.as_secs() % 60
            );
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("(AlertScheduler) shutdown requested; stopping");
                    return;
                }
                _ = sleep(wait) => {}
            }

            match self.run_cycle(&shutdown).await {
                Ok(()) => info!("(AlertScheduler) alert cycle completed"),
                Err(e) => error!("(AlertScheduler) alert cycle failed: {e}"),
            }

            wait = steady_delay(self.config.alert_interval);
        }
    }

    /// One wake-up: optional notice, then the full voice session bracket.
    /// `close` runs on every exit path past a successful `open`.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<(), CycleError> {
        if let Some(message) = self.config.notice() {
            self.notifier
                .notify(self.config.text_channel_id, message)
                .await
                .map_err(CycleError::Channel)?;
        }

        let mut session = self
            .sessions
            .open(self.config.guild_id, self.config.voice_channel_id)
            .await
            .map_err(CycleError::Connection)?;

        let streamed = self.transmit(&mut session, shutdown).await;
        self.sessions.close(session, shutdown).await;
        streamed
    }

    async fn transmit(
        &self,
        session: &mut VoiceSession,
        shutdown: &CancellationToken,
    ) -> Result<(), CycleError> {
        self.sessions
            .begin_transmitting(session)
            .await
            .map_err(CycleError::Connection)?;
        let mut sink = self.sessions.sink(session).map_err(CycleError::Connection)?;

        let result = self
            .pipeline
            .stream(&self.config.file_name, sink.as_mut(), shutdown)
            .await;
        drop(sink);
        result.map_err(|e| match e {
            e @ Error::Connection(_) => CycleError::Connection(e),
            e => CycleError::Audio(e),
        })?;

        self.sessions
            .end_transmitting(session)
            .await
            .map_err(CycleError::Connection)?;
        Ok(())
    }
}

/// Spawns the cycle loop as its own task so a long-running voice cycle
/// never blocks command handling. The caller keeps the handle and observes
/// its termination.
pub fn spawn_alert_scheduler(
    scheduler: AlertScheduler,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        scheduler.run(shutdown).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 5, h, m, s).unwrap()
    }

    #[test]
    fn initial_delay_lands_one_minute_before_the_hour() {
        for (h, m, s) in [
            (14, 30, 0),
            (0, 0, 0),
            (8, 58, 59),
            (8, 59, 0),
            (23, 59, 30),
            (11, 1, 1),
        ] {
            let now = at(h, m, s);
            let wait = initial_delay(now).as_secs();
            let into_hour = u64::from(m * 60 + s);
            assert_eq!(
                (into_hour + wait) % 3600,
                59 * 60,
                "from {h:02}:{m:02}:{s:02}"
            );
            assert!(wait > 0 && wait <= 3600);
        }
    }

    #[test]
    fn initial_delay_from_half_past_is_29_minutes() {
        assert_eq!(initial_delay(at(10, 30, 0)), Duration::from_secs(29 * 60));
    }

    #[test]
    fn steady_delay_shortens_interval_by_grace_period() {
        assert_eq!(steady_delay(60), Duration::from_secs(59 * 60 + 40));
        assert_eq!(steady_delay(2), Duration::from_secs(100));
    }

    #[test]
    fn steady_delay_never_goes_negative() {
        // The smallest valid config value still leaves a positive wait.
        assert_eq!(steady_delay(1), Duration::from_secs(40));
    }
}
