use crate::error::MusicError;
use crate::presence::PresenceProjector;
use crate::resolver::MediaResolver;
use crate::session::SessionSnapshot;
use crate::song::Song;
use crate::voice::VoiceConnector;
use crate::worker::{PlayOutcome, SessionHandle};
use dashmap::DashMap;
use serenity::all::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::OnceCell;

type SessionSlot = Arc<OnceCell<SessionHandle>>;

/// Entry point for every playback request, whether it came from chat or the
/// dashboard. Sessions are independent per guild; within one guild all state
/// changes go through that guild's worker.
#[derive(Clone)]
pub struct QueueController {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: Arc<dyn MediaResolver>,
    connector: Arc<dyn VoiceConnector>,
    presence: Arc<PresenceProjector>,
    sessions: DashMap<GuildId, SessionSlot>,
    /// History of sessions that were stopped, so it survives a reconnect.
    archive: DashMap<GuildId, Vec<Song>>,
}

impl QueueController {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        connector: Arc<dyn VoiceConnector>,
        presence: Arc<PresenceProjector>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                connector,
                presence,
                sessions: DashMap::new(),
                archive: DashMap::new(),
            }),
        }
    }

    pub fn presence(&self) -> &PresenceProjector {
        &self.inner.presence
    }

    pub fn is_connected(&self, guild: GuildId) -> bool {
        self.live_session(guild).is_some()
    }

    pub fn connected_guilds(&self) -> Vec<GuildId> {
        self.inner
            .sessions
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Resolve `query` and either start it or queue it. Connects to
    /// `voice_channel` first when the guild has no session; without a session
    /// and without a channel this fails with `NoVoiceChannel`.
    ///
    /// Resolution happens outside the session worker, so queue order is the
    /// order in which lookups finish, not the order requests were made.
    #[tracing::instrument(level = "debug", skip(self, voice_channel))]
    pub async fn request_play(
        &self,
        guild: GuildId,
        voice_channel: Option<ChannelId>,
        query: &str,
        requested_by: &str,
    ) -> Result<PlayOutcome, MusicError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::EmptyQuery);
        }

        let session = self.ensure_session(guild, voice_channel).await?;
        let song = self.resolve(query, requested_by).await?;
        session.enqueue(song).await
    }

    /// Stop the current track; the queue advances through the normal
    /// playback-ended path.
    pub async fn request_skip(&self, guild: GuildId) -> Result<(), MusicError> {
        self.live_session(guild).ok_or(MusicError::NotConnected)?.skip().await
    }

    /// Pause if playing. `Ok(false)` when there was nothing to pause.
    pub async fn request_pause(&self, guild: GuildId) -> Result<bool, MusicError> {
        self.live_session(guild).ok_or(MusicError::NotConnected)?.pause().await
    }

    /// Resume if paused. `Ok(false)` when there was nothing to resume.
    pub async fn request_resume(&self, guild: GuildId) -> Result<bool, MusicError> {
        self.live_session(guild).ok_or(MusicError::NotConnected)?.resume().await
    }

    /// Drop the queue, leave the voice channel and destroy the session.
    /// Safe to repeat; returns whether there was a session to stop.
    pub async fn request_stop(&self, guild: GuildId) -> bool {
        let slot = self.inner.sessions.remove(&guild).map(|(_, slot)| slot);
        let session = slot.as_ref().and_then(|slot| slot.get().cloned());

        let stopped = match session {
            Some(session) => match session.shutdown().await {
                Ok(history) => {
                    self.inner.archive.insert(guild, history);
                    true
                }
                Err(_) => false,
            },
            None => false,
        };

        self.inner.presence.idle(guild).await;
        stopped
    }

    /// Read-only view for the dashboard and the `queue` command.
    pub async fn snapshot(&self, guild: GuildId) -> SessionSnapshot {
        if let Some(session) = self.live_session(guild) {
            if let Ok(snapshot) = session.snapshot().await {
                return snapshot;
            }
        }
        let history = self
            .inner
            .archive
            .get(&guild)
            .map(|h| h.value().clone())
            .unwrap_or_default();
        SessionSnapshot::idle(history)
    }

    fn live_session(&self, guild: GuildId) -> Option<SessionHandle> {
        self.inner.sessions.get(&guild).and_then(|slot| slot.get().cloned())
    }

    /// Get the guild's session, connecting if needed. Concurrent callers for
    /// the same guild share one connection attempt.
    async fn ensure_session(
        &self,
        guild: GuildId,
        voice_channel: Option<ChannelId>,
    ) -> Result<SessionHandle, MusicError> {
        let slot = self
            .inner
            .sessions
            .entry(guild)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let init = slot
            .get_or_try_init(|| async {
                let channel = voice_channel.ok_or(MusicError::NoVoiceChannel)?;
                let sink = self.inner.connector.connect(guild, channel).await?;
                let history = self
                    .inner
                    .archive
                    .remove(&guild)
                    .map(|(_, h)| h)
                    .unwrap_or_default();
                tracing::info!(guild = %guild, channel = %channel, "voice session opened");
                Ok::<_, MusicError>(SessionHandle::spawn(
                    guild,
                    sink,
                    self.inner.presence.clone(),
                    history,
                ))
            })
            .await;

        let session = match init {
            Ok(session) => session.clone(),
            Err(e) => {
                self.inner
                    .sessions
                    .remove_if(&guild, |_, current| Arc::ptr_eq(current, &slot) && !current.initialized());
                return Err(e);
            }
        };

        // A stop may have removed the slot while we were connecting.
        let still_current = self
            .inner
            .sessions
            .get(&guild)
            .is_some_and(|current| Arc::ptr_eq(current.value(), &slot));
        if !still_current {
            if let Ok(history) = session.shutdown().await {
                self.inner.archive.insert(guild, history);
            }
            return Err(MusicError::SessionClosed);
        }

        Ok(session)
    }

    async fn resolve(&self, query: &str, requested_by: &str) -> Result<Song, MusicError> {
        match self.inner.resolver.resolve(query).await {
            Ok(candidates) => match candidates.into_iter().next() {
                Some(first) => Ok(first.into_song(requested_by)),
                None => Err(MusicError::ResolutionFailed {
                    query: query.to_string(),
                    reason: "no results".into(),
                }),
            },
            Err(e) => {
                tracing::warn!(query, error = %e, "resolution failed");
                Err(MusicError::ResolutionFailed {
                    query: query.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
