use crate::song::Song;
use serde::Serialize;
use std::collections::VecDeque;

pub const HISTORY_LIMIT: usize = 5;

/// Per-guild playback record. Only the session worker holds one; everyone
/// else sees a [`SessionSnapshot`].
#[derive(Debug, Default)]
pub struct SessionState {
    current: Song,
    pending: VecDeque<Song>,
    history: VecDeque<Song>,
}

impl SessionState {
    /// Start a session with history carried over from an earlier connection.
    pub fn with_history(history: Vec<Song>) -> Self {
        let mut history: VecDeque<Song> = history.into_iter().filter(|s| !s.is_empty()).collect();
        history.truncate(HISTORY_LIMIT);
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn current(&self) -> &Song {
        &self.current
    }

    /// Replace `current` with a song that just started; the previous one, if
    /// any, is finished as far as history is concerned.
    pub fn supersede(&mut self, song: Song) {
        let previous = std::mem::replace(&mut self.current, song);
        self.remember(previous);
    }

    /// `current` stopped and nothing replaces it (yet).
    pub fn retire_current(&mut self) {
        let previous = std::mem::take(&mut self.current);
        self.remember(previous);
    }

    /// Queue a song; returns its 1-based position in the pending queue.
    pub fn enqueue(&mut self, song: Song) -> usize {
        self.pending.push_back(song);
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn next_pending(&mut self) -> Option<Song> {
        self.pending.pop_front()
    }

    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn history(&self) -> Vec<Song> {
        self.history.iter().cloned().collect()
    }

    pub fn snapshot(&self, paused: bool) -> SessionSnapshot {
        SessionSnapshot {
            current: self.current.clone(),
            pending: self.pending.iter().cloned().collect(),
            history: self.history(),
            paused,
        }
    }

    fn remember(&mut self, song: Song) {
        if song.is_empty() {
            return;
        }
        self.history.push_front(song);
        self.history.truncate(HISTORY_LIMIT);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub current: Song,
    pub pending: Vec<Song>,
    pub history: Vec<Song>,
    pub paused: bool,
}

impl SessionSnapshot {
    /// What a guild without a live session looks like.
    pub fn idle(history: Vec<Song>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }
}
