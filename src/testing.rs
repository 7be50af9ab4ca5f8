//! In-memory stand-ins for the resolver, voice connection and presence used
//! by the controller and dashboard tests.

use crate::error::{MusicError, NotifyError, ResolveError, SinkError};
use crate::presence::{Presence, PresenceSink};
use crate::resolver::{MediaResolver, ResolvedMedia};
use crate::sink::{AudioSink, EndNotifier};
use crate::song::Song;
use crate::voice::VoiceConnector;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Resolves from a fixed table. Queries can be gated so the test decides when
/// each lookup completes.
#[derive(Default)]
pub struct FakeResolver {
    table: Mutex<HashMap<String, Vec<ResolvedMedia>>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeResolver {
    pub fn add(&self, query: &str, url: &str, title: &str) {
        self.add_many(query, &[(url, title)]);
    }

    pub fn add_many(&self, query: &str, candidates: &[(&str, &str)]) {
        let media = candidates
            .iter()
            .map(|(url, title)| ResolvedMedia {
                url: url.to_string(),
                title: title.to_string(),
                headers: Vec::new(),
            })
            .collect();
        self.table.lock().insert(query.to_string(), media);
    }

    /// Hold resolution of `query` until the returned sender fires.
    pub fn gate(&self, query: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(query.to_string(), rx);
        tx
    }

    pub fn calls(&self, query: &str) -> usize {
        self.calls.lock().get(query).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve(&self, query: &str) -> Result<Vec<ResolvedMedia>, ResolveError> {
        *self.calls.lock().entry(query.to_string()).or_default() += 1;
        let gate = self.gates.lock().remove(query);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.table.lock().get(query).cloned().ok_or(ResolveError::NoResults)
    }
}

#[derive(Default)]
struct FakeSinkState {
    played: Vec<String>,
    current: Option<EndNotifier>,
    paused: bool,
    disconnected: bool,
    broken: bool,
}

/// Test-side view of a sink the connector handed out.
#[derive(Clone)]
pub struct FakeSinkHandle(Arc<Mutex<FakeSinkState>>);

impl FakeSinkHandle {
    pub fn played(&self) -> Vec<String> {
        self.0.lock().played.clone()
    }

    /// The active track runs out; the sink reports it like a real one would.
    pub fn finish_current(&self) {
        if let Some(notifier) = self.end_silently_inner() {
            notifier.notify();
        }
    }

    /// The active track stops but the end event is held back; the caller
    /// delivers it later with `notify`.
    pub fn end_silently(&self) -> EndNotifier {
        self.end_silently_inner().expect("no active track")
    }

    pub fn disconnected(&self) -> bool {
        self.0.lock().disconnected
    }

    /// From now on pause, resume and stop fail in the driver.
    pub fn break_controls(&self) {
        self.0.lock().broken = true;
    }

    fn end_silently_inner(&self) -> Option<EndNotifier> {
        let mut state = self.0.lock();
        state.paused = false;
        state.current.take()
    }
}

struct FakeSink {
    state: Arc<Mutex<FakeSinkState>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&mut self, song: &Song, on_end: EndNotifier) -> Result<(), SinkError> {
        if self.failing.lock().contains(&song.url) {
            return Err(SinkError::Start(format!("cannot open {}", song.url)));
        }
        let mut state = self.state.lock();
        state.played.push(song.url.clone());
        state.current = Some(on_end);
        state.paused = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.broken {
            return Err(SinkError::Control("driver gone".into()));
        }
        if state.current.is_none() {
            return Err(SinkError::NotReady);
        }
        state.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.broken {
            return Err(SinkError::Control("driver gone".into()));
        }
        if state.current.is_none() {
            return Err(SinkError::NotReady);
        }
        state.paused = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        let notifier = {
            let mut state = self.state.lock();
            if state.broken {
                return Err(SinkError::Control("driver gone".into()));
            }
            state.paused = false;
            state.current.take()
        };
        let notifier = notifier.ok_or(SinkError::NotReady)?;
        notifier.notify();
        Ok(())
    }

    fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.current.as_ref().is_some_and(|n| !n.has_fired()) && !state.paused
    }

    fn is_paused(&self) -> bool {
        let state = self.state.lock();
        state.current.as_ref().is_some_and(|n| !n.has_fired()) && state.paused
    }

    async fn disconnect(&mut self) {
        self.state.lock().disconnected = true;
    }
}

/// Hands out fake sinks and remembers them per guild.
#[derive(Default)]
pub struct FakeConnector {
    sinks: Mutex<HashMap<GuildId, FakeSinkHandle>>,
    connections: AtomicUsize,
    attempts: AtomicUsize,
    failing: Arc<Mutex<HashSet<String>>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeConnector {
    /// Latest sink created for `guild`.
    pub fn sink(&self, guild: GuildId) -> FakeSinkHandle {
        self.sinks.lock().get(&guild).cloned().expect("guild never connected")
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Connect attempts so far, including ones still waiting on a gate.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Hold the next connect until the returned sender fires.
    pub fn gate(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    /// Sinks refuse to start these URLs.
    pub fn fail_urls(&self, urls: &[&str]) {
        self.failing.lock().extend(urls.iter().map(|u| u.to_string()));
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn connect(&self, guild: GuildId, _channel: ChannelId) -> Result<Box<dyn AudioSink>, MusicError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        // Give racing callers a chance to pile up on the same connection.
        tokio::task::yield_now().await;
        self.connections.fetch_add(1, Ordering::SeqCst);
        let state = Arc::new(Mutex::new(FakeSinkState::default()));
        self.sinks.lock().insert(guild, FakeSinkHandle(state.clone()));
        Ok(Box::new(FakeSink {
            state,
            failing: self.failing.clone(),
        }))
    }
}

/// Records every presence the projector publishes.
#[derive(Default)]
pub struct RecordingPresence {
    seen: Mutex<Vec<Presence>>,
    fail: bool,
    delays: Mutex<VecDeque<usize>>,
}

impl RecordingPresence {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// The next updates take this many scheduler turns each before landing,
    /// like network round trips of different lengths.
    pub fn delay_next(&self, turns: &[usize]) {
        self.delays.lock().extend(turns.iter().copied());
    }

    pub fn history(&self) -> Vec<Presence> {
        self.seen.lock().clone()
    }

    pub fn last(&self) -> Option<Presence> {
        self.seen.lock().last().copied()
    }
}

#[async_trait]
impl PresenceSink for RecordingPresence {
    async fn set_presence(&self, presence: Presence) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::NotReady);
        }
        let turns = self.delays.lock().pop_front().unwrap_or(0);
        for _ in 0..turns {
            tokio::task::yield_now().await;
        }
        self.seen.lock().push(presence);
        Ok(())
    }
}
