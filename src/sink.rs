use crate::error::SinkError;
use crate::song::Song;
use crate::worker::SessionCommand;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::WeakUnboundedSender;

/// Audio output for one voice session. Only ever driven from that session's
/// worker, so implementations don't need internal locking for their own state.
#[async_trait]
pub trait AudioSink: Send {
    /// Start `song`, replacing anything currently playing. `on_end` must be
    /// fired once the track finishes, errors out or is stopped.
    async fn play(&mut self, song: &Song, on_end: EndNotifier) -> Result<(), SinkError>;

    fn pause(&mut self) -> Result<(), SinkError>;

    fn resume(&mut self) -> Result<(), SinkError>;

    fn stop(&mut self) -> Result<(), SinkError>;

    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Leave the voice channel. The sink is not used afterwards.
    async fn disconnect(&mut self);
}

/// Hands a "playback ended" event for one specific track back to the
/// session worker. Clones share the same fired flag.
#[derive(Clone)]
pub struct EndNotifier {
    generation: u64,
    fired: Arc<AtomicBool>,
    tx: WeakUnboundedSender<SessionCommand>,
}

impl EndNotifier {
    pub(crate) fn new(generation: u64, tx: WeakUnboundedSender<SessionCommand>) -> Self {
        Self {
            generation,
            fired: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    /// True once the track has ended; sinks use it to answer `is_playing`
    /// without a round trip to the driver.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub fn notify(&self) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        // Worker gone means the session was torn down; nothing to advance.
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(SessionCommand::PlaybackEnded {
                generation: self.generation,
            });
        }
    }
}
