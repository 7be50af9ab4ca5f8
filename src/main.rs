use serenity::{
    async_trait,
    model::{channel::Message, gateway::Ready},
    prelude::*,
};
use songbird::SerenityInit;
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod controller;
mod dashboard;
mod error;
mod media_tools;
mod presence;
mod resolver;
mod session;
mod sink;
mod song;
mod spotify;
#[cfg(test)]
mod testing;
mod voice;
mod worker;

use crate::commands::{Invocation, handle_command, parse_command};
use crate::config::BotConfig;
use crate::controller::QueueController;
use crate::dashboard::DashboardState;
use crate::presence::{DiscordPresence, PresenceProjector};
use crate::resolver::YtDlpResolver;
use crate::spotify::SpotifyLookup;
use crate::voice::SongbirdConnector;

struct Handler {
    bot: BotConfig,
    presence: Arc<DiscordPresence>,
}

// Playback controller shared by chat commands and the dashboard
struct ControllerStore;
impl TypeMapKey for ControllerStore { type Value = QueueController; }

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(command) = parse_command(&msg.content, &self.bot.prefix) else {
            return;
        };

        // move what we need out of the `Message` before awaiting
        let call = Invocation {
            channel: msg.channel_id,
            guild: msg.guild_id,
            author: msg.author.id,
            author_name: msg.author.display_name().to_string(),
        };
        drop(msg);

        let Some(controller) = ctx.data.read().await.get::<ControllerStore>().cloned() else {
            tracing::error!("controller missing from client data");
            return;
        };

        if let Err(why) = handle_command(&ctx, &controller, &self.bot.prefix, self.bot.embed_color, &call, command).await {
            tracing::warn!(error = ?why, channel = %call.channel, "error handling command");
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, guilds = ready.guilds.len(), "connected");
        self.presence.attach(ctx.clone());

        let controller = ctx.data.read().await.get::<ControllerStore>().cloned();
        if let Some(controller) = controller {
            controller.presence().republish().await;
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,discord_jukebox=debug,tower_http=info"));
    let format = env::var("JUKEBOX_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true);
    match format.as_str() {
        "json" => builder.json().flatten_event(true).init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    let token = env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN not set");
    let cfg = config::load_config().await.expect("Failed to load config.jsonc");

    let http = reqwest::Client::new();
    media_tools::ensure_media_tools(&http)
        .await
        .expect("Failed to prepare media tools (yt-dlp)");

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_PRESENCES
        | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = songbird::Songbird::serenity();
    let discord_presence = Arc::new(DiscordPresence::new(cfg.presence.clone()));
    let projector = Arc::new(PresenceProjector::new(discord_presence.clone()));
    let resolver = Arc::new(YtDlpResolver::new(cfg.resolver.clone(), SpotifyLookup::from_env(http.clone())));
    let connector = Arc::new(SongbirdConnector::new(songbird.clone(), http, cfg.playback.clone()));
    let controller = QueueController::new(resolver, connector, projector);

    let handler = Handler {
        bot: cfg.bot.clone(),
        presence: discord_presence,
    };

    let mut client = Client::builder(token, intents)
        .register_songbird_with(songbird)
        .event_handler(handler)
        .await
        .expect("Err creating client");

    {
        let mut data = client.data.write().await;
        data.insert::<ControllerStore>(controller.clone());
    }

    if cfg.dashboard.enabled {
        let state = DashboardState {
            controller,
            cache: client.cache.clone(),
        };
        let (bind, port) = (cfg.dashboard.bind.clone(), cfg.dashboard.port);
        tokio::spawn(async move {
            if let Err(e) = dashboard::serve(state, &bind, port).await {
                tracing::error!(error = %e, "dashboard stopped");
            }
        });
    }

    if let Err(why) = client.start().await {
        tracing::error!(error = ?why, "client error");
    }
}
