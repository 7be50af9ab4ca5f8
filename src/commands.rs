use crate::controller::QueueController;
use crate::error::MusicError;
use crate::session::SessionSnapshot;
use crate::worker::PlayOutcome;
use serenity::builder::{CreateEmbed, CreateMessage};
use serenity::model::prelude::*;
use serenity::prelude::*;

type CommandResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Play(String),
    Skip,
    Stop,
    Pause,
    Resume,
    Queue,
    Help,
    Ping,
}

/// Parse `<prefix><command> [args]`. Anything else is not for us.
pub fn parse_command(content: &str, prefix: &str) -> Option<ChatCommand> {
    let command = content.trim().strip_prefix(prefix)?.trim();

    let mut parts = command.split_whitespace();
    let cmd = parts.next()?.to_lowercase();
    let args = parts.collect::<Vec<_>>().join(" ");

    let parsed = match cmd.as_str() {
        "play" | "p" => ChatCommand::Play(args),
        "skip" => ChatCommand::Skip,
        "stop" | "leave" | "disconnect" => ChatCommand::Stop,
        "pause" => ChatCommand::Pause,
        "resume" => ChatCommand::Resume,
        "queue" | "np" => ChatCommand::Queue,
        "help" => ChatCommand::Help,
        "ping" => ChatCommand::Ping,
        _ => return None,
    };
    Some(parsed)
}

/// Who sent the command and where.
pub struct Invocation {
    pub channel: ChannelId,
    pub guild: Option<GuildId>,
    pub author: UserId,
    pub author_name: String,
}

pub async fn handle_command(
    ctx: &Context,
    controller: &QueueController,
    prefix: &str,
    color: u32,
    call: &Invocation,
    command: ChatCommand,
) -> CommandResult<()> {
    if let ChatCommand::Ping = command {
        call.channel.say(&ctx.http, "Pong!").await?;
        return Ok(());
    }
    if let ChatCommand::Help = command {
        return send_help(ctx, call.channel, prefix, color).await;
    }

    let Some(guild) = call.guild else {
        return send_info(ctx, call.channel, color, "Music", "This command only works in a server.").await;
    };

    let reply = match command {
        ChatCommand::Play(query) => {
            let voice = voice_channel_for_user_id(ctx, guild, call.author);
            let typing = call.channel.start_typing(&ctx.http);
            let result = controller.request_play(guild, voice, &query, &call.author_name).await;
            typing.stop();
            match result {
                Ok(PlayOutcome::Started(song)) => format!("▶ Now playing: **{}**", song.title),
                Ok(PlayOutcome::Queued { song, position }) => format!("✅ Queued (#{position}): **{}**", song.title),
                Err(e) => failure(&e),
            }
        }
        ChatCommand::Skip => match controller.request_skip(guild).await {
            Ok(()) => "⏭ Skipped!".to_string(),
            Err(e) => failure(&e),
        },
        ChatCommand::Stop => {
            if controller.request_stop(guild).await {
                "👋 Stopped and left the voice channel.".to_string()
            } else {
                "Nothing to stop.".to_string()
            }
        }
        ChatCommand::Pause => match controller.request_pause(guild).await {
            Ok(true) => "⏸ Paused.".to_string(),
            Ok(false) => "Nothing is playing.".to_string(),
            Err(e) => failure(&e),
        },
        ChatCommand::Resume => match controller.request_resume(guild).await {
            Ok(true) => "▶ Resumed.".to_string(),
            Ok(false) => "Nothing is paused.".to_string(),
            Err(e) => failure(&e),
        },
        ChatCommand::Queue => describe_snapshot(&controller.snapshot(guild).await),
        ChatCommand::Help | ChatCommand::Ping => return Ok(()),
    };

    send_info(ctx, call.channel, color, "Music", &reply).await
}

fn failure(e: &MusicError) -> String {
    format!("❌ {e}")
}

/// Text for the `queue` command.
pub fn describe_snapshot(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();
    if snapshot.current.is_empty() {
        out.push_str("Nothing playing.\n");
    } else {
        let state = if snapshot.paused { "Paused" } else { "Now playing" };
        out.push_str(&format!(
            "**{state}:** {} (requested by {})\n",
            snapshot.current.title, snapshot.current.requested_by
        ));
    }

    if !snapshot.pending.is_empty() {
        out.push_str("\n**Up next:**\n");
        for (i, song) in snapshot.pending.iter().enumerate() {
            out.push_str(&format!("{}. {} ({})\n", i + 1, song.title, song.requested_by));
        }
    }

    if !snapshot.history.is_empty() {
        out.push_str("\n**Recently played:**\n");
        for song in &snapshot.history {
            out.push_str(&format!("• {}\n", song.title));
        }
    }
    out
}

async fn send_help(ctx: &Context, channel: ChannelId, prefix: &str, color: u32) -> CommandResult<()> {
    let fields: Vec<(String, String, bool)> = [
        ("play <song>", "Search and play, or add to the queue"),
        ("skip", "Skip the current song"),
        ("pause", "Pause playback"),
        ("resume", "Resume playback"),
        ("stop", "Clear the queue and leave voice"),
        ("queue", "Show what's playing and what's next"),
        ("ping", "Pong reply"),
    ]
    .iter()
    .map(|(name, desc)| (format!("{}{}", prefix, name), (*desc).to_string(), false))
    .collect();

    let embed = CreateEmbed::new()
        .title("Help Menu")
        .description("Use the commands below with the prefix")
        .color(color)
        .fields(fields);

    channel.send_message(&ctx.http, CreateMessage::new().embed(embed)).await?;
    Ok(())
}

async fn send_info(ctx: &Context, channel: ChannelId, color: u32, title: &str, desc: &str) -> CommandResult<()> {
    let embed = CreateEmbed::new().title(title).description(desc).color(color);

    let message = CreateMessage::new().embed(embed);
    channel.send_message(&ctx.http, message).await?;
    Ok(())
}

fn voice_channel_for_user_id(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    ctx.cache
        .guild(guild_id)
        .and_then(|guild| guild.voice_states.get(&user_id).and_then(|vs| vs.channel_id))
}
