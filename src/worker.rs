//! The per-session serialized section.
//!
//! Each voice session gets one task that owns its [`SessionState`] and
//! [`AudioSink`]. Chat commands, dashboard requests and playback-ended events
//! all arrive as [`SessionCommand`]s on one channel and are handled strictly
//! one after another, so two requests can never both see an idle sink and
//! both start playback.

use crate::error::MusicError;
use crate::presence::PresenceProjector;
use crate::session::{SessionSnapshot, SessionState};
use crate::sink::{AudioSink, EndNotifier};
use crate::song::Song;
use serenity::all::GuildId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Result of handing a resolved song to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started(Song),
    Queued { song: Song, position: usize },
}

pub(crate) enum SessionCommand {
    Enqueue {
        song: Song,
        reply: oneshot::Sender<Result<PlayOutcome, MusicError>>,
    },
    PlaybackEnded {
        generation: u64,
    },
    Skip {
        reply: oneshot::Sender<Result<(), MusicError>>,
    },
    Pause {
        reply: oneshot::Sender<bool>,
    },
    Resume {
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<Vec<Song>>,
    },
}

/// Cheap handle to a running session worker.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn spawn(
        guild: GuildId,
        sink: Box<dyn AudioSink>,
        presence: Arc<PresenceProjector>,
        history: Vec<Song>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = SessionWorker {
            guild,
            state: SessionState::with_history(history),
            sink,
            presence,
            generation: 0,
            active: None,
            tx: tx.downgrade(),
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Send a command and wait for its reply. A worker that is gone (or goes
    /// away before answering) means the session was torn down.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, MusicError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| MusicError::SessionClosed)?;
        rx.await.map_err(|_| MusicError::SessionClosed)
    }

    pub(crate) async fn enqueue(&self, song: Song) -> Result<PlayOutcome, MusicError> {
        self.request(|reply| SessionCommand::Enqueue { song, reply }).await?
    }

    pub(crate) async fn skip(&self) -> Result<(), MusicError> {
        self.request(|reply| SessionCommand::Skip { reply }).await?
    }

    pub(crate) async fn pause(&self) -> Result<bool, MusicError> {
        self.request(|reply| SessionCommand::Pause { reply }).await
    }

    pub(crate) async fn resume(&self) -> Result<bool, MusicError> {
        self.request(|reply| SessionCommand::Resume { reply }).await
    }

    pub(crate) async fn snapshot(&self) -> Result<SessionSnapshot, MusicError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Tear the session down; returns the final history.
    pub(crate) async fn shutdown(&self) -> Result<Vec<Song>, MusicError> {
        self.request(|reply| SessionCommand::Shutdown { reply }).await
    }
}

struct SessionWorker {
    guild: GuildId,
    state: SessionState,
    sink: Box<dyn AudioSink>,
    presence: Arc<PresenceProjector>,
    generation: u64,
    /// Generation of the track currently backing `state.current`.
    active: Option<u64>,
    tx: mpsc::WeakUnboundedSender<SessionCommand>,
}

impl SessionWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) {
        tracing::debug!(guild = %self.guild, "session worker started");
        while let Some(cmd) = rx.recv().await {
            match cmd {
                SessionCommand::Enqueue { song, reply } => {
                    let result = self.enqueue(song).await;
                    let _ = reply.send(result);
                }
                SessionCommand::PlaybackEnded { generation } => self.playback_ended(generation).await,
                SessionCommand::Skip { reply } => {
                    let _ = reply.send(self.skip());
                }
                SessionCommand::Pause { reply } => {
                    let _ = reply.send(self.pause());
                }
                SessionCommand::Resume { reply } => {
                    let _ = reply.send(self.resume());
                }
                SessionCommand::Snapshot { reply } => {
                    let _ = reply.send(self.state.snapshot(self.sink.is_paused()));
                }
                SessionCommand::Shutdown { reply } => {
                    let history = self.shutdown().await;
                    let _ = reply.send(history);
                    break;
                }
            }
        }
        tracing::debug!(guild = %self.guild, "session worker stopped");
    }

    fn sink_busy(&self) -> bool {
        self.sink.is_playing() || self.sink.is_paused()
    }

    /// A track is started and its end event not yet handled, or songs are
    /// waiting. The sink alone can already look idle while the end event is
    /// still in flight.
    fn occupied(&self) -> bool {
        self.active.is_some() || self.state.has_pending() || self.sink_busy()
    }

    async fn enqueue(&mut self, song: Song) -> Result<PlayOutcome, MusicError> {
        if self.occupied() {
            let position = self.state.enqueue(song.clone());
            tracing::info!(guild = %self.guild, title = %song.title, position, "queued");
            return Ok(PlayOutcome::Queued { song, position });
        }

        self.start(song.clone()).await.map_err(|reason| MusicError::SinkStartFailed {
            title: song.title.clone(),
            reason,
        })?;
        Ok(PlayOutcome::Started(song))
    }

    /// Offer `song` to the sink and make it `current` only once the sink has
    /// accepted it.
    async fn start(&mut self, song: Song) -> Result<(), String> {
        self.generation += 1;
        let generation = self.generation;
        let notifier = EndNotifier::new(generation, self.tx.clone());

        if let Err(e) = self.sink.play(&song, notifier).await {
            tracing::warn!(guild = %self.guild, title = %song.title, error = %e, "sink refused track");
            return Err(e.to_string());
        }

        tracing::info!(guild = %self.guild, title = %song.title, generation, "now playing");
        self.active = Some(generation);
        self.state.supersede(song);
        self.presence.playing(self.guild).await;
        Ok(())
    }

    async fn playback_ended(&mut self, generation: u64) {
        if self.active != Some(generation) {
            tracing::debug!(guild = %self.guild, generation, "ignoring stale playback end");
            return;
        }
        self.active = None;
        tracing::debug!(guild = %self.guild, title = %self.state.current().title, generation, "track finished");
        self.state.retire_current();

        while let Some(next) = self.state.next_pending() {
            let title = next.title.clone();
            match self.start(next).await {
                Ok(()) => return,
                Err(reason) => {
                    tracing::warn!(guild = %self.guild, title = %title, reason = %reason, "dropping unplayable queued song")
                }
            }
        }

        tracing::info!(guild = %self.guild, "queue finished");
        self.presence.idle(self.guild).await;
    }

    fn skip(&mut self) -> Result<(), MusicError> {
        if !self.sink_busy() {
            return Err(MusicError::NothingPlaying);
        }
        // The sink's end notification does the advancing.
        self.sink.stop().map_err(|e| {
            tracing::warn!(guild = %self.guild, error = %e, "skip failed");
            MusicError::Control(e.to_string())
        })
    }

    fn pause(&mut self) -> bool {
        if !self.sink.is_playing() {
            return false;
        }
        match self.sink.pause() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(guild = %self.guild, error = %e, "pause failed");
                false
            }
        }
    }

    fn resume(&mut self) -> bool {
        if !self.sink.is_paused() {
            return false;
        }
        match self.sink.resume() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(guild = %self.guild, error = %e, "resume failed");
                false
            }
        }
    }

    async fn shutdown(&mut self) -> Vec<Song> {
        let dropped = self.state.clear_pending();
        self.active = None;
        if self.sink_busy() {
            if let Err(e) = self.sink.stop() {
                tracing::warn!(guild = %self.guild, error = %e, "stop failed during shutdown");
            }
        }
        self.state.retire_current();
        self.sink.disconnect().await;
        self.presence.idle(self.guild).await;
        tracing::info!(guild = %self.guild, dropped, "session closed");
        self.state.history()
    }
}
