use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

/// Bot configuration, read once from a JSON file at startup and immutable
/// for the rest of the process lifetime.
///
/// `alert_interval` is in minutes. Channel/guild ids are Discord snowflakes.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    pub alert_interval: u32,

    #[serde(default)]
    pub custom_message: Option<String>,

    /// Command prefixes, consumed by the chat command dispatch.
    #[serde(default)]
    pub prefixes: Vec<String>,

    pub voice_channel_id: u64,
    pub text_channel_id: u64,
    pub guild_id: u64,

    /// Path to the media file handed to the decoder process.
    pub file_name: String,
}

impl AlertConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("could not read '{}': {e}", path.display())))?;
        let config: AlertConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("could not parse '{}': {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.alert_interval == 0 {
            return Err(Error::Config(
                "alert_interval must be at least 1 minute".to_string(),
            ));
        }
        if self.file_name.trim().is_empty() {
            return Err(Error::Config("file_name must not be empty".to_string()));
        }
        if self.guild_id == 0 || self.voice_channel_id == 0 || self.text_channel_id == 0 {
            return Err(Error::Config(
                "guild_id, voice_channel_id and text_channel_id must all be set".to_string(),
            ));
        }
        Ok(())
    }

    /// The message to post before streaming, if one is configured.
    /// Absent or blank means the notify step is skipped entirely.
    pub fn notice(&self) -> Option<&str> {
        self.custom_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<AlertConfig, Error> {
        let config: AlertConfig = serde_json::from_str(json).map_err(Error::Json)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn parses_full_config() {
        let config = parse(
            r#"{
                "alert_interval": 60,
                "custom_message": "Starting!",
                "prefixes": ["!"],
                "voice_channel_id": 1,
                "text_channel_id": 2,
                "guild_id": 3,
                "file_name": "song.pcm"
            }"#,
        )
        .unwrap();

        assert_eq!(config.alert_interval, 60);
        assert_eq!(config.notice(), Some("Starting!"));
        assert_eq!(config.prefixes, vec!["!".to_string()]);
        assert_eq!(config.voice_channel_id, 1);
        assert_eq!(config.text_channel_id, 2);
        assert_eq!(config.guild_id, 3);
        assert_eq!(config.file_name, "song.pcm");
    }

    #[test]
    fn custom_message_and_prefixes_are_optional() {
        let config = parse(
            r#"{
                "alert_interval": 15,
                "voice_channel_id": 1,
                "text_channel_id": 2,
                "guild_id": 3,
                "file_name": "song.pcm"
            }"#,
        )
        .unwrap();

        assert_eq!(config.custom_message, None);
        assert_eq!(config.notice(), None);
        assert!(config.prefixes.is_empty());
    }

    #[test]
    fn blank_custom_message_yields_no_notice() {
        let config = parse(
            r#"{
                "alert_interval": 15,
                "custom_message": "   ",
                "voice_channel_id": 1,
                "text_channel_id": 2,
                "guild_id": 3,
                "file_name": "song.pcm"
            }"#,
        )
        .unwrap();

        assert_eq!(config.notice(), None);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = parse(
            r#"{
                "alert_interval": 0,
                "voice_channel_id": 1,
                "text_channel_id": 2,
                "guild_id": 3,
                "file_name": "song.pcm"
            }"#,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_ids_are_rejected() {
        let err = parse(
            r#"{
                "alert_interval": 60,
                "voice_channel_id": 0,
                "text_channel_id": 2,
                "guild_id": 3,
                "file_name": "song.pcm"
            }"#,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
    }
}
