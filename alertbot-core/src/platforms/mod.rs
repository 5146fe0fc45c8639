// File: src/platforms/mod.rs

use async_trait::async_trait;

use crate::Error;
use crate::audio::AudioSink;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error(String),
}

#[async_trait]
pub trait PlatformAuth {
    async fn authenticate(&mut self) -> Result<(), Error>;
    async fn is_authenticated(&self) -> Result<bool, Error>;
}

#[async_trait]
pub trait PlatformIntegration: PlatformAuth {
    async fn connect(&mut self) -> Result<(), Error>;
    async fn disconnect(&mut self) -> Result<(), Error>;
    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error>;
}

/// One outbound text-send call, the seam the notifier and command replies
/// go through.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, channel_id: u64, message: &str) -> Result<(), Error>;
}

/// Opens live voice connections. Implemented by the realtime transport;
/// faked in tests.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn open(&self, guild_id: u64, channel_id: u64)
        -> Result<Box<dyn VoiceConnection>, Error>;
}

/// A single live connection to a voice channel.
///
/// The transmit bracket is `begin_transmitting` / `end_transmitting`, with
/// `take_sink` handing out the write endpoint exactly once in between.
/// `close` tears the connection down; callers must invoke it on every exit
/// path.
#[async_trait]
pub trait VoiceConnection: Send {
    async fn begin_transmitting(&mut self) -> Result<(), Error>;
    fn take_sink(&mut self) -> Result<Box<dyn AudioSink>, Error>;
    async fn end_transmitting(&mut self) -> Result<(), Error>;
    async fn close(&mut self) -> Result<(), Error>;
}

pub mod discord;
