use crate::config::PlaybackConfig;
use crate::error::{MusicError, SinkError};
use crate::sink::{AudioSink, EndNotifier};
use crate::song::Song;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serenity::all::{ChannelId, GuildId};
use songbird::events::{Event, EventContext, TrackEvent};
use songbird::input::HttpRequest;
use songbird::tracks::TrackHandle;
use songbird::{Call, Songbird};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Opens voice connections. Called at most once per live session.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<Box<dyn AudioSink>, MusicError>;
}

pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: Client,
    playback: PlaybackConfig,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, http: Client, playback: PlaybackConfig) -> Self {
        Self {
            manager,
            http,
            playback,
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<Box<dyn AudioSink>, MusicError> {
        let call = self
            .manager
            .join(guild, channel)
            .await
            .map_err(|e| MusicError::Connect(e.to_string()))?;

        if self.playback.self_deafen {
            if let Err(e) = call.lock().await.deafen(true).await {
                tracing::warn!(guild = %guild, error = %e, "couldn't self-deafen");
            }
        }

        Ok(Box::new(SongbirdSink {
            manager: self.manager.clone(),
            guild,
            call,
            http: self.http.clone(),
            volume: self.playback.volume,
            track: None,
            paused: false,
            ended: None,
        }))
    }
}

pub struct SongbirdSink {
    manager: Arc<Songbird>,
    guild: GuildId,
    call: Arc<Mutex<Call>>,
    http: Client,
    volume: f32,
    track: Option<TrackHandle>,
    paused: bool,
    ended: Option<EndNotifier>,
}

/// Forwards songbird's end/error track events to the session worker.
struct TrackEndRelay(EndNotifier);

#[async_trait]
impl songbird::events::EventHandler for TrackEndRelay {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.0.notify();
        Some(Event::Cancel)
    }
}

impl SongbirdSink {
    fn track_ended(&self) -> bool {
        self.ended.as_ref().is_some_and(EndNotifier::has_fired)
    }
}

fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (k, v) in headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
            map.insert(name, value);
        }
    }
    map
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(&mut self, song: &Song, on_end: EndNotifier) -> Result<(), SinkError> {
        let input = HttpRequest::new_with_headers(self.http.clone(), song.url.clone(), header_map(&song.headers));

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input.into())
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), TrackEndRelay(on_end.clone()))
                .map_err(|e| SinkError::Start(e.to_string()))?;
        }

        if let Err(e) = handle.make_playable_async().await {
            let _ = handle.stop();
            return Err(SinkError::Start(e.to_string()));
        }
        if let Err(e) = handle.play() {
            tracing::warn!(guild = %self.guild, error = %e, "couldn't unpause new track");
        }
        if let Err(e) = handle.set_volume(self.volume) {
            tracing::warn!(guild = %self.guild, error = %e, "couldn't set volume");
        }

        self.track = Some(handle);
        self.paused = false;
        self.ended = Some(on_end);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SinkError> {
        let track = self.track.as_ref().ok_or(SinkError::NotReady)?;
        track.pause().map_err(|e| SinkError::Control(e.to_string()))?;
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SinkError> {
        let track = self.track.as_ref().ok_or(SinkError::NotReady)?;
        track.play().map_err(|e| SinkError::Control(e.to_string()))?;
        self.paused = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        let track = self.track.take().ok_or(SinkError::NotReady)?;
        self.paused = false;
        track.stop().map_err(|e| SinkError::Control(e.to_string()))
    }

    fn is_playing(&self) -> bool {
        self.track.is_some() && !self.paused && !self.track_ended()
    }

    fn is_paused(&self) -> bool {
        self.track.is_some() && self.paused && !self.track_ended()
    }

    async fn disconnect(&mut self) {
        self.track = None;
        if let Err(e) = self.manager.remove(self.guild).await {
            tracing::warn!(guild = %self.guild, error = %e, "failed to leave voice channel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_headers_are_skipped() {
        let map = header_map(&[
            ("User-Agent".into(), "jukebox".into()),
            ("bad header".into(), "x".into()),
            ("Accept".into(), "bad\nvalue".into()),
        ]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("user-agent").map(|v| v.to_str().unwrap()), Some("jukebox"));
    }
}
