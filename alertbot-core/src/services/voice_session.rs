use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Error;
use crate::audio::AudioSink;
use crate::platforms::{VoiceConnection, VoiceTransport};

/// Trailing delay after streaming ends, before the connection is torn down,
/// so already-buffered audio finishes playing on the listener side. The
/// scheduler subtracts the same amount from its steady-state wait.
pub const GRACE_PERIOD: Duration = Duration::from_secs(20);

/// One live voice connection, transmitting flag included.
pub struct VoiceSession {
    conn: Box<dyn VoiceConnection>,
    transmitting: bool,
}

/// Manages the full lifecycle of exactly one voice connection per cycle:
/// open, the begin/end transmit bracket, and a close that runs on every
/// exit path.
pub struct VoiceSessionManager {
    transport: Arc<dyn VoiceTransport>,
    grace: Duration,
    in_flight: AtomicBool,
}

impl VoiceSessionManager {
    pub fn new(transport: Arc<dyn VoiceTransport>) -> Self {
        Self::with_grace(transport, GRACE_PERIOD)
    }

    pub fn with_grace(transport: Arc<dyn VoiceTransport>, grace: Duration) -> Self {
        Self {
            transport,
            grace,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Opens a session against the given voice channel. At most one session
    /// may exist at a time; a second open before the first close is refused.
    pub async fn open(&self, guild_id: u64, channel_id: u64) -> Result<VoiceSession, Error> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(Error::Connection(
                "a voice session is already open".to_string(),
            ));
        }
        match self.transport.open(guild_id, channel_id).await {
            Ok(conn) => Ok(VoiceSession {
                conn,
                transmitting: false,
            }),
            Err(e) => {
                self.in_flight.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Signals that audio frames are about to flow. Idempotent.
    pub async fn begin_transmitting(&self, session: &mut VoiceSession) -> Result<(), Error> {
        if session.transmitting {
            return Ok(());
        }
        session.conn.begin_transmitting().await?;
        session.transmitting = true;
        Ok(())
    }

    /// Hands out the session's write endpoint. Valid once per session.
    pub fn sink(&self, session: &mut VoiceSession) -> Result<Box<dyn AudioSink>, Error> {
        session.conn.take_sink()
    }

    /// Marks transmission as finished. Idempotent.
    pub async fn end_transmitting(&self, session: &mut VoiceSession) -> Result<(), Error> {
        if !session.transmitting {
            return Ok(());
        }
        session.conn.end_transmitting().await?;
        session.transmitting = false;
        Ok(())
    }

    /// Tears the session down. Waits out the grace period first so buffered
    /// audio finishes playing; a cancelled token skips the wait. Errors here
    /// are logged, never propagated — the session is gone either way.
    pub async fn close(&self, mut session: VoiceSession, cancel: &CancellationToken) {
        if session.transmitting {
            if let Err(e) = session.conn.end_transmitting().await {
                warn!("(VoiceSessionManager) error ending transmission: {e}");
            }
            session.transmitting = false;
        }

        if !cancel.is_cancelled() && !self.grace.is_zero() {
            debug!(
                "(VoiceSessionManager) waiting {}s grace before disconnect",
                self.grace.as_secs()
            );
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep(self.grace) => {}
            }
        }

        if let Err(e) = session.conn.close().await {
            warn!("(VoiceSessionManager) error closing voice session: {e}");
        }
        self.in_flight.store(false, Ordering::SeqCst);
    }
}
