use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Error;
use super::{AudioSink, AudioStreamer};

const COPY_BUF_LEN: usize = 16 * 1024;

/// Spawns an external decoder process against a media file and copies its
/// stdout into an [`AudioSink`] until end-of-stream.
///
/// The decoder is invoked as
/// `<bin> -i <file> -ac 2 -f s16le -ar 48000 pipe:1`, i.e. interleaved
/// little-endian 16-bit PCM, stereo, 48 kHz on stdout. The voice transport
/// consumes exactly this layout, so any replacement binary must honor the
/// same argument contract.
///
/// The child process never outlives a `stream()` call: it is killed and
/// reaped on every path, including sink failures and cancellation. There is
/// no retry here — a failed stream surfaces as `Error::Audio` and the
/// scheduler's next cycle is the retry policy.
pub struct AudioPipeline {
    decoder_bin: String,
}

impl AudioPipeline {
    pub fn new() -> Self {
        Self::with_decoder("ffmpeg")
    }

    /// Use a different decoder binary. The argument contract stays the same.
    pub fn with_decoder(bin: impl Into<String>) -> Self {
        Self {
            decoder_bin: bin.into(),
        }
    }
}

impl Default for AudioPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioStreamer for AudioPipeline {
    async fn stream(
        &self,
        media_path: &str,
        sink: &mut dyn AudioSink,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        debug!("(AudioPipeline) starting decoder '{}' for '{media_path}'", self.decoder_bin);

        let mut child = Command::new(&self.decoder_bin)
            .arg("-i")
            .arg(media_path)
            .args(["-ac", "2", "-f", "s16le", "-ar", "48000", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Audio(format!(
                    "failed to start decoder '{}': {e}",
                    self.decoder_bin
                ))
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Audio("decoder stdout was not captured".to_string()))?;

        let mut buf = vec![0u8; COPY_BUF_LEN];
        let mut copied: u64 = 0;
        let copy_result: Result<(), Error> = loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                r = stdout.read(&mut buf) => r,
            };
            match read {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    if let Err(e) = sink.write_all(&buf[..n]).await {
                        break Err(e);
                    }
                    copied += n as u64;
                }
                Err(e) => break Err(Error::Audio(format!("error reading decoder output: {e}"))),
            }
        };

        if cancel.is_cancelled() {
            warn!("(AudioPipeline) cancelled after {copied} bytes; stopping decoder");
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Ok(());
        }

        match copy_result {
            Ok(()) => {
                let flushed = sink.flush().await;
                let status = child
                    .wait()
                    .await
                    .map_err(|e| Error::Audio(format!("failed to reap decoder: {e}")))?;
                flushed?;
                if !status.success() {
                    return Err(Error::Audio(format!("decoder exited with {status}")));
                }
                debug!("(AudioPipeline) streamed {copied} bytes from '{media_path}'");
                Ok(())
            }
            Err(e) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(e)
            }
        }
    }
}
