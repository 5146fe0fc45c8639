//! src/audio/mod.rs
//!
//! Audio byte-stream plumbing: the sink/streamer seams and the ffmpeg-backed
//! pipeline that feeds decoded PCM into a voice session.

pub mod pipeline;

pub use pipeline::AudioPipeline;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Error;

/// Output sample rate the decoder is forced to (Discord native format).
pub const SAMPLE_RATE: u32 = 48_000;

/// Output channel count the decoder is forced to.
pub const CHANNELS: u32 = 2;

/// Write endpoint for raw audio bytes, owned by the active voice session.
#[async_trait]
pub trait AudioSink: Send {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), Error>;
    async fn flush(&mut self) -> Result<(), Error>;
}

/// Produces a live byte stream of decoded audio from a media file and
/// forwards it unmodified into a caller-supplied sink.
#[async_trait]
pub trait AudioStreamer: Send + Sync {
    async fn stream(
        &self,
        media_path: &str,
        sink: &mut dyn AudioSink,
        cancel: &CancellationToken,
    ) -> Result<(), Error>;
}
