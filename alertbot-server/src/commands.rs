//! Chat command dispatch: a plain function table keyed by command name,
//! resolved case-insensitively behind the configured prefixes.

use std::collections::HashMap;

use alertbot_core::platforms::discord::DiscordMessageEvent;

pub type CommandHandler = fn(&DiscordMessageEvent) -> String;

pub struct CommandRegistry {
    prefixes: Vec<String>,
    handlers: HashMap<&'static str, CommandHandler>,
}

impl CommandRegistry {
    pub fn new(prefixes: Vec<String>) -> Self {
        let mut handlers: HashMap<&'static str, CommandHandler> = HashMap::new();
        handlers.insert("ping", ping);
        Self { prefixes, handlers }
    }

    /// Resolves `text` to a registered command, if it starts with one of the
    /// configured prefixes. Returns the canonical command name and handler.
    pub fn resolve(&self, text: &str) -> Option<(&'static str, CommandHandler)> {
        let trimmed = text.trim();
        let rest = self
            .prefixes
            .iter()
            .find_map(|p| trimmed.strip_prefix(p.as_str()))?;
        let name = rest.split_whitespace().next()?.to_ascii_lowercase();
        self.handlers
            .get_key_value(name.as_str())
            .map(|(k, h)| (*k, *h))
    }
}

fn ping(_event: &DiscordMessageEvent) -> String {
    ":ping_pong: Pong!".to_string()
}
