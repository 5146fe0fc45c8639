use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use songbird::Songbird;
use songbird::shards::TwilightMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{
    self as gateway,
    CloseFrame,
    Config,
    Event,
    EventTypeFlags,
    Intents,
    MessageSender,
    Shard,
    StreamExt,
};
use twilight_http::Client as HttpClient;
use twilight_http::client::ClientBuilder;
use twilight_model::id::Id;
use twilight_model::id::marker::ChannelMarker;

use crate::Error;
use crate::platforms::{ChatSender, ConnectionStatus, PlatformAuth, PlatformIntegration};

/// An inbound guild text message, as surfaced to the command dispatch.
#[derive(Debug, Clone)]
pub struct DiscordMessageEvent {
    pub channel_id: u64,
    pub user_id: String,
    pub username: String,
    pub text: String,
}

/// The per-shard event loop:
///   - updates the in-memory cache
///   - feeds every event to songbird so it can track voice state
///   - forwards inbound chat messages to `tx`.
async fn shard_runner(
    mut shard: Shard,
    tx: UnboundedSender<DiscordMessageEvent>,
    cache: Arc<InMemoryCache>,
    songbird: Arc<Songbird>,
) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        match item {
            Ok(event) => {
                cache.update(&event);
                songbird.process(&event).await;

                match &event {
                    Event::Ready(ready) => {
                        info!(
                            "Shard {shard_id} => connected as {} (ID={})",
                            ready.user.name, ready.user.id
                        );
                    }
                    Event::MessageCreate(msg) => {
                        if msg.author.bot {
                            continue;
                        }
                        let _ = tx.send(DiscordMessageEvent {
                            channel_id: msg.channel_id.get(),
                            user_id: msg.author.id.to_string(),
                            username: msg.author.name.clone(),
                            text: msg.content.clone(),
                        });
                    }
                    _ => {
                        trace!("Shard {shard_id} => unhandled event: {event:?}");
                    }
                }
            }
            Err(err) => {
                error!("Shard {shard_id} => error receiving event: {err:?}");
            }
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

/// The gateway client: twilight shards plus the songbird voice driver that
/// rides on top of them.
pub struct DiscordPlatform {
    pub token: String,
    pub connection_status: ConnectionStatus,

    /// Receiver for inbound chat messages; `None` until `connect`.
    pub rx: Mutex<Option<UnboundedReceiver<DiscordMessageEvent>>>,

    pub shard_tasks: Vec<JoinHandle<()>>,
    pub shard_senders: Vec<MessageSender>,

    pub http: Option<Arc<HttpClient>>,
    pub cache: Option<Arc<InMemoryCache>>,
    pub songbird: Option<Arc<Songbird>>,
}

impl DiscordPlatform {
    pub fn new(token: String) -> Self {
        Self {
            token,
            connection_status: ConnectionStatus::Disconnected,
            rx: Mutex::new(None),
            shard_tasks: Vec::new(),
            shard_senders: Vec::new(),
            http: None,
            cache: None,
            songbird: None,
        }
    }

    /// Await the next inbound chat message, if connected.
    pub async fn next_message_event(&self) -> Option<DiscordMessageEvent> {
        let mut guard = self.rx.lock().await;
        match guard.as_mut() {
            Some(r) => r.recv().await,
            None => None,
        }
    }

    async fn send_to_channel(
        &self,
        channel_id: Id<ChannelMarker>,
        message: &str,
    ) -> Result<(), Error> {
        let http = self
            .http
            .as_ref()
            .ok_or_else(|| Error::Platform("Discord HTTP client not connected".to_string()))?;
        http.create_message(channel_id)
            .content(message)
            .await
            .map_err(|e| Error::Platform(format!("error sending Discord message: {e:?}")))?;
        Ok(())
    }
}

#[async_trait]
impl PlatformAuth for DiscordPlatform {
    async fn authenticate(&mut self) -> Result<(), Error> {
        if self.token.is_empty() {
            return Err(Error::Auth("Discord token is empty".into()));
        }
        Ok(())
    }

    async fn is_authenticated(&self) -> Result<bool, Error> {
        Ok(!self.token.is_empty())
    }
}

#[async_trait]
impl PlatformIntegration for DiscordPlatform {
    async fn connect(&mut self) -> Result<(), Error> {
        if matches!(self.connection_status, ConnectionStatus::Connected) {
            info!("(DiscordPlatform) Already connected => skipping");
            return Ok(());
        }

        let (tx, rx) = unbounded_channel::<DiscordMessageEvent>();
        {
            let mut guard = self.rx.lock().await;
            *guard = Some(rx);
        }

        let http_client = Arc::new(
            ClientBuilder::new()
                .token(self.token.clone())
                .timeout(Duration::from_secs(30))
                .build(),
        );
        self.http = Some(http_client.clone());

        // The voice driver needs our own user id before any shard is up.
        let current_user = http_client
            .current_user()
            .await
            .map_err(|e| Error::Platform(format!("could not fetch current user: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("could not parse current user: {e}")))?;

        let cache = InMemoryCache::builder()
            .resource_types(ResourceType::GUILD | ResourceType::CHANNEL | ResourceType::VOICE_STATE)
            .build();
        let cache = Arc::new(cache);
        self.cache = Some(cache.clone());

        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS
                | Intents::GUILD_MESSAGES
                | Intents::MESSAGE_CONTENT
                | Intents::GUILD_VOICE_STATES,
        );

        let shards: Vec<Shard> = gateway::create_recommended(&http_client, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?
            .collect();

        let senders = TwilightMap::new(
            shards
                .iter()
                .map(|s| (s.id().number(), s.sender()))
                .collect(),
        );
        let songbird = Arc::new(Songbird::twilight(Arc::new(senders), current_user.id));
        self.songbird = Some(songbird.clone());

        for shard in shards {
            self.shard_senders.push(shard.sender());

            let tx_for_shard = tx.clone();
            let cache_for_shard = cache.clone();
            let songbird_for_shard = songbird.clone();

            let handle = tokio::spawn(async move {
                shard_runner(shard, tx_for_shard, cache_for_shard, songbird_for_shard).await;
            });
            self.shard_tasks.push(handle);
        }

        self.connection_status = ConnectionStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;

        for sender in &self.shard_senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        for task in &mut self.shard_tasks {
            let _ = task.await;
        }

        self.shard_senders.clear();
        self.shard_tasks.clear();
        self.songbird = None;

        {
            let mut guard = self.rx.lock().await;
            *guard = None;
        }

        Ok(())
    }

    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error> {
        Ok(self.connection_status.clone())
    }
}

#[async_trait]
impl ChatSender for DiscordPlatform {
    async fn send_message(&self, channel_id: u64, message: &str) -> Result<(), Error> {
        self.send_to_channel(Id::new(channel_id), message).await
    }
}
