use serde::Serialize;

pub const NOTHING_PLAYING: &str = "nothing playing";

/// A resolved, playable track. `url` is whatever the resolver handed out and
/// usually expires after a few hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub title: String,
    pub requested_by: String,
    /// Request headers the stream host expects alongside `url`.
    #[serde(skip)]
    pub headers: Vec<(String, String)>,
}

impl Song {
    pub fn new(url: impl Into<String>, title: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            requested_by: requested_by.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// The "nothing playing" sentinel. Used instead of an `Option` so every
    /// projection always has a song-shaped `current`.
    pub fn nothing_playing() -> Self {
        Self::new("", NOTHING_PLAYING, "")
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_empty() && self.requested_by.is_empty() && self.title == NOTHING_PLAYING
    }
}

impl Default for Song {
    fn default() -> Self {
        Self::nothing_playing()
    }
}
