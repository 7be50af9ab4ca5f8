use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::song::Song;
use crate::spotify::SpotifyLookup;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

/// One playable candidate for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub url: String,
    pub title: String,
    pub headers: Vec<(String, String)>,
}

impl ResolvedMedia {
    pub fn into_song(self, requested_by: &str) -> Song {
        Song::new(self.url, self.title, requested_by).with_headers(self.headers)
    }
}

/// Turns free text (or a link) into playable stream URLs. May be slow; callers
/// must not hold session state while waiting on it.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Vec<ResolvedMedia>, ResolveError>;
}

pub struct YtDlpResolver {
    cfg: ResolverConfig,
    spotify: Option<SpotifyLookup>,
}

impl YtDlpResolver {
    pub fn new(cfg: ResolverConfig, spotify: Option<SpotifyLookup>) -> Self {
        let spotify = spotify.filter(|_| cfg.spotify_lookup);
        Self { cfg, spotify }
    }

    async fn search_text(&self, query: &str) -> String {
        let Some(spotify) = &self.spotify else {
            return query.to_string();
        };
        match spotify.rewrite(query).await {
            Ok(Some(rewritten)) => {
                tracing::debug!(query, rewritten = %rewritten, "spotify lookup rewrote query");
                rewritten
            }
            Ok(None) => query.to_string(),
            Err(e) => {
                tracing::warn!(query, error = %e, "spotify lookup failed, using raw query");
                query.to_string()
            }
        }
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn resolve(&self, query: &str) -> Result<Vec<ResolvedMedia>, ResolveError> {
        let search = self.search_text(query).await;
        let target = ytdl_target(&search);

        let mut cmd = Command::new("yt-dlp");
        cmd.arg("-f")
            .arg(&self.cfg.format)
            .arg("--no-playlist")
            .arg("-j");
        if let Some(cookies) = &self.cfg.cookies_file {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.arg(&target).kill_on_drop(true);

        let timeout = Duration::from_secs(self.cfg.timeout_secs);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| ResolveError::Timeout(self.cfg.timeout_secs))??;

        if !output.status.success() {
            return Err(ResolveError::Process {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_candidates(&String::from_utf8_lossy(&output.stdout), &search)
    }
}

/// Links go to yt-dlp as-is, everything else becomes a single-result search.
fn ytdl_target(search: &str) -> String {
    if search.starts_with("http") {
        search.to_string()
    } else {
        format!("ytsearch1:{search}")
    }
}

/// Parse `yt-dlp -j` output. The first JSON line is either a single video or a
/// playlist-shaped object with `entries`; every entry with a stream URL is a
/// candidate.
pub fn parse_candidates(stdout: &str, fallback_title: &str) -> Result<Vec<ResolvedMedia>, ResolveError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or(ResolveError::NoResults)?;
    let info: serde_json::Value = serde_json::from_str(line)?;

    let entries: Vec<&serde_json::Value> = match info.get("entries").and_then(|e| e.as_array()) {
        Some(entries) => entries.iter().collect(),
        None => vec![&info],
    };

    let candidates: Vec<ResolvedMedia> = entries
        .into_iter()
        .filter_map(|entry| candidate_from(entry, fallback_title))
        .collect();

    if candidates.is_empty() {
        Err(ResolveError::NoResults)
    } else {
        Ok(candidates)
    }
}

fn candidate_from(entry: &serde_json::Value, fallback_title: &str) -> Option<ResolvedMedia> {
    let url = entry.get("url").and_then(|v| v.as_str()).filter(|u| !u.is_empty())?;
    let title = entry
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or(fallback_title)
        .to_string();

    let mut headers = Vec::new();
    if let Some(hm) = entry.get("http_headers").and_then(|v| v.as_object()) {
        for (k, v) in hm {
            if let Some(s) = v.as_str() {
                headers.push((k.clone(), s.to_string()));
            }
        }
    }

    Some(ResolvedMedia {
        url: url.to_string(),
        title,
        headers,
    })
}
