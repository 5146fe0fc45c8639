// File: src/platforms/discord/mod.rs

pub mod runtime;
pub mod voice;

pub use runtime::{DiscordMessageEvent, DiscordPlatform};
pub use voice::DiscordVoice;
