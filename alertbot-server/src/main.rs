use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use alertbot_common::Error;
use alertbot_common::models::AlertConfig;
use alertbot_core::audio::AudioPipeline;
use alertbot_core::platforms::discord::{DiscordPlatform, DiscordVoice};
use alertbot_core::platforms::{ChatSender, PlatformAuth, PlatformIntegration};
use alertbot_core::services::notifier::Notifier;
use alertbot_core::services::voice_session::VoiceSessionManager;
use alertbot_core::tasks::alert_scheduler::{AlertScheduler, spawn_alert_scheduler};

mod commands;
use commands::CommandRegistry;

#[derive(Parser, Debug, Clone)]
#[command(name = "alertbot")]
#[command(author, version, about = "AlertBot - scheduled voice channel alerts")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: String,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("alertbot=info".parse().unwrap_or_default())
        .add_directive("alertbot_core=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    dotenv().ok();
    let args = Args::parse();

    // Startup failures are the only fatal ones: bad config or bad token
    // terminates the process with a clear message before the loop starts.
    let config = match AlertConfig::load(&args.config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Could not load config '{}': {e}", args.config);
            return Err(e);
        }
    };
    let token = std::env::var("ALERTBOT_TOKEN").map_err(|_| {
        error!("ALERTBOT_TOKEN is not set");
        Error::Auth("ALERTBOT_TOKEN is not set".to_string())
    })?;

    info!(
        "AlertBot starting. guild={} voice_channel={} text_channel={} interval={}min",
        config.guild_id, config.voice_channel_id, config.text_channel_id, config.alert_interval
    );

    let mut platform = DiscordPlatform::new(token);
    platform.authenticate().await?;
    platform.connect().await?;

    let songbird = platform
        .songbird
        .clone()
        .ok_or_else(|| Error::Platform("voice driver unavailable after connect".to_string()))?;
    let platform = Arc::new(platform);

    let shutdown = CancellationToken::new();

    let scheduler = AlertScheduler::new(
        config.clone(),
        Notifier::new(platform.clone()),
        VoiceSessionManager::new(Arc::new(DiscordVoice::new(songbird))),
        Arc::new(AudioPipeline::new()),
    );
    let mut scheduler_handle = spawn_alert_scheduler(scheduler, shutdown.clone());

    let registry = CommandRegistry::new(config.prefixes.clone());
    let command_platform = platform.clone();
    let command_shutdown = shutdown.clone();
    let mut command_handle = tokio::spawn(async move {
        command_loop(command_platform, registry, command_shutdown).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C detected; shutting down");
        }
        res = &mut scheduler_handle => {
            error!("Alert scheduler task ended unexpectedly: {res:?}");
        }
        res = &mut command_handle => {
            error!("Command loop task ended unexpectedly: {res:?}");
        }
    }

    shutdown.cancel();
    if !scheduler_handle.is_finished() {
        let _ = scheduler_handle.await;
    }
    if !command_handle.is_finished() {
        let _ = command_handle.await;
    }

    // All task-held references are gone now; disconnect the gateway.
    let mut platform = Arc::try_unwrap(platform)
        .map_err(|_| Error::Platform("platform still referenced at shutdown".to_string()))?;
    platform.disconnect().await?;

    info!("Main finished. Goodbye!");
    Ok(())
}

async fn command_loop(
    platform: Arc<DiscordPlatform>,
    registry: CommandRegistry,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            evt = platform.next_message_event() => match evt {
                Some(e) => e,
                None => break,
            },
        };

        let Some((name, handler)) = registry.resolve(&event.text) else {
            continue;
        };
        let reply = handler(&event);

        match platform.send_message(event.channel_id, &reply).await {
            Ok(()) => info!("{} successfully executed '{name}'", event.username),
            Err(e) => error!("{} tried executing '{name}' but it errored: {e}", event.username),
        }
    }
    info!("Command loop stopped.");
}
