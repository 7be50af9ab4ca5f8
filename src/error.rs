use thiserror::Error;

/// Failures surfaced to whoever asked the controller for something.
/// The `Display` text is what the user gets to see.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MusicError {
    #[error("Provide a song name or link.")]
    EmptyQuery,

    #[error("Join a voice channel first.")]
    NoVoiceChannel,

    #[error("The bot is not in a voice channel.")]
    NotConnected,

    #[error("Couldn't join the voice channel: {0}")]
    Connect(String),

    #[error("Couldn't find anything playable for '{query}'.")]
    ResolutionFailed { query: String, reason: String },

    #[error("Couldn't start '{title}'.")]
    SinkStartFailed { title: String, reason: String },

    #[error("The voice session was closed before the request finished.")]
    SessionClosed,

    #[error("Nothing is playing.")]
    NothingPlaying,

    #[error("Playback control failed: {0}")]
    Control(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to spawn yt-dlp: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("yt-dlp exited with {status}: {stderr}")]
    Process { status: String, stderr: String },

    #[error("unexpected yt-dlp output: {0}")]
    Parse(String),

    #[error("resolution timed out after {0}s")]
    Timeout(u64),

    #[error("no results")]
    NoResults,
}

impl From<serde_json::Error> for ResolveError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("track failed to start: {0}")]
    Start(String),

    #[error("track control failed: {0}")]
    Control(String),

    #[error("no active track")]
    NotReady,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("gateway not ready")]
    NotReady,
}
