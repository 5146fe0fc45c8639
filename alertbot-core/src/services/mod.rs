// File: src/services/mod.rs

pub mod notifier;
pub mod voice_session;

pub use notifier::Notifier;
pub use voice_session::{GRACE_PERIOD, VoiceSession, VoiceSessionManager};
