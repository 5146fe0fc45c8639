//! Songbird-backed voice transport.
//!
//! Joins voice channels through the twilight gateway and plays a live raw
//! PCM stream fed by the audio pipeline. The pipeline writes the decoder's
//! s16le frames into a [`PcmSink`]; the driver pulls them back out of a
//! bounded channel on its mixer thread, as the f32 interleaved samples it
//! mixes natively.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use async_trait::async_trait;
use songbird::Songbird;
use songbird::id::{ChannelId, GuildId};
use songbird::input::core::io::MediaSource;
use songbird::input::{Input, RawAdapter};
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tracing::debug;
use twilight_model::id::Id;

use crate::Error;
use crate::audio::{AudioSink, CHANNELS, SAMPLE_RATE};
use crate::platforms::{VoiceConnection, VoiceTransport};

/// Chunks buffered between the pipeline and the mixer thread. Bounded so a
/// fast decoder backpressures instead of ballooning memory.
const SOURCE_QUEUE_CHUNKS: usize = 32;

pub struct DiscordVoice {
    songbird: Arc<Songbird>,
}

impl DiscordVoice {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self { songbird }
    }
}

#[async_trait]
impl VoiceTransport for DiscordVoice {
    async fn open(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<Box<dyn VoiceConnection>, Error> {
        let call = self
            .songbird
            .join(GuildId::from(Id::new(guild_id)), ChannelId::from(Id::new(channel_id)))
            .await
            .map_err(|e| {
                Error::Connection(format!("could not join voice channel {channel_id}: {e}"))
            })?;
        debug!("(DiscordVoice) joined voice channel {channel_id} in guild {guild_id}");

        let (tx, rx) = channel::<Vec<u8>>(SOURCE_QUEUE_CHUNKS);
        Ok(Box::new(DiscordVoiceConnection {
            songbird: self.songbird.clone(),
            guild_id,
            call,
            sink_tx: Some(tx),
            source_rx: Some(rx),
        }))
    }
}

struct DiscordVoiceConnection {
    songbird: Arc<Songbird>,
    guild_id: u64,
    call: Arc<tokio::sync::Mutex<songbird::Call>>,
    sink_tx: Option<Sender<Vec<u8>>>,
    source_rx: Option<Receiver<Vec<u8>>>,
}

#[async_trait]
impl VoiceConnection for DiscordVoiceConnection {
    async fn begin_transmitting(&mut self) -> Result<(), Error> {
        let rx = self
            .source_rx
            .take()
            .ok_or_else(|| Error::Connection("transmission already started".to_string()))?;
        let source = PcmSource::new(rx);
        let input: Input = RawAdapter::new(source, SAMPLE_RATE, CHANNELS).into();

        let mut call = self.call.lock().await;
        let _ = call.play_only_input(input);
        Ok(())
    }

    fn take_sink(&mut self) -> Result<Box<dyn AudioSink>, Error> {
        let tx = self
            .sink_tx
            .take()
            .ok_or_else(|| Error::Connection("transmit sink already taken".to_string()))?;
        Ok(Box::new(PcmSink::new(tx)))
    }

    async fn end_transmitting(&mut self) -> Result<(), Error> {
        // Dropping the last sender closes the channel; the source then hits
        // EOF once the driver has drained what is already buffered.
        self.sink_tx = None;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.sink_tx = None;
        self.songbird
            .remove(GuildId::from(Id::new(self.guild_id)))
            .await
            .map_err(|e| {
                Error::Connection(format!(
                    "could not leave voice channel in guild {}: {e}",
                    self.guild_id
                ))
            })
    }
}

/// Sink half: accepts the decoder's s16le byte stream in arbitrary chunk
/// sizes and queues it for the mixer as f32le samples. A sample split
/// across two writes is carried over to the next one.
struct PcmSink {
    tx: Sender<Vec<u8>>,
    carry: Option<u8>,
}

impl PcmSink {
    fn new(tx: Sender<Vec<u8>>) -> Self {
        Self { tx, carry: None }
    }
}

#[async_trait]
impl AudioSink for PcmSink {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut joined: Vec<u8>;
        let data = match self.carry.take() {
            Some(first) => {
                joined = Vec::with_capacity(data.len() + 1);
                joined.push(first);
                joined.extend_from_slice(data);
                &joined[..]
            }
            None => data,
        };

        let even = data.len() & !1;
        if even > 0 {
            let converted = s16le_to_f32le(&data[..even]);
            self.tx
                .send(converted)
                .await
                .map_err(|_| Error::Connection("voice transmit stream closed".to_string()))?;
        }
        if data.len() != even {
            self.carry = Some(data[even]);
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

fn s16le_to_f32le(pcm: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm.chunks_exact(2) {
        let v = i16::from_le_bytes([sample[0], sample[1]]);
        let f = f32::from(v) / 32_768.0;
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

/// Source half: a blocking [`MediaSource`] the driver reads on its mixer
/// thread. Returns EOF once all senders are gone and the queue is drained.
struct PcmSource {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl PcmSource {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            offset: 0,
        }
    }
}

impl Read for PcmSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.offset >= self.pending.len() {
            match self.rx.blocking_recv() {
                Some(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                None => return Ok(0),
            }
        }
        let n = (self.pending.len() - self.offset).min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

impl Seek for PcmSource {
    fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "live PCM stream is not seekable",
        ))
    }
}

impl MediaSource for PcmSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_s16le_samples_to_f32le() {
        // 0, 16384 (0.5), -32768 (-1.0)
        let pcm: Vec<u8> = [0i16, 16_384, -32_768]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let out = s16le_to_f32le(&pcm);

        let floats: Vec<f32> = out
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(floats, vec![0.0, 0.5, -1.0]);
    }

    #[tokio::test]
    async fn sink_carries_split_samples_across_writes() {
        let pcm: Vec<u8> = [100i16, -200, 300, -400]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();

        let (tx, mut rx) = channel(8);
        let mut sink = PcmSink::new(tx);
        // Split on an odd boundary so one sample straddles the two writes.
        sink.write_all(&pcm[..3]).await.unwrap();
        sink.write_all(&pcm[3..]).await.unwrap();
        drop(sink);

        let mut queued = Vec::new();
        while let Some(chunk) = rx.recv().await {
            queued.extend_from_slice(&chunk);
        }
        assert_eq!(queued, s16le_to_f32le(&pcm));
    }

    #[test]
    fn source_drains_queue_then_signals_eof() {
        let (tx, rx) = channel(8);
        tx.try_send(vec![1u8, 2, 3]).unwrap();
        tx.try_send(Vec::new()).unwrap();
        tx.try_send(vec![4u8, 5]).unwrap();
        drop(tx);

        let mut source = PcmSource::new(rx);
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }
}
