use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use reqwest::Client;
use serde::Deserialize;
use std::env;

type SpotifyResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Deserialize)]
struct SpotifyToken {
    access_token: String,
}

#[derive(Deserialize)]
struct SpotifySearch {
    tracks: SpotifyTracks,
}

#[derive(Deserialize)]
struct SpotifyTracks {
    items: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    name: String,
    artists: Vec<SpotifyArtist>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: String,
}

impl SpotifyTrack {
    fn search_string(&self) -> String {
        let artist = self.artists.first().map(|a| a.name.as_str()).unwrap_or("Unknown");
        format!("{} {}", self.name, artist)
    }
}

/// Client-credentials Spotify lookups used to turn links and loose queries
/// into "title artist" strings that YouTube search handles well.
pub struct SpotifyLookup {
    http: Client,
    client_id: String,
    client_secret: String,
}

impl SpotifyLookup {
    /// `None` unless both `SPOTIFY_CLIENT_ID` and `SPOTIFY_CLIENT_SECRET` are set.
    pub fn from_env(http: Client) -> Option<Self> {
        let client_id = env::var("SPOTIFY_CLIENT_ID").ok().filter(|v| !v.is_empty())?;
        let client_secret = env::var("SPOTIFY_CLIENT_SECRET").ok().filter(|v| !v.is_empty())?;
        Some(Self {
            http,
            client_id,
            client_secret,
        })
    }

    /// Returns a search string for `query`, or `None` when Spotify had nothing.
    pub async fn rewrite(&self, query: &str) -> SpotifyResult<Option<String>> {
        if query.starts_with("http") || query.starts_with("spotify:") {
            let Some(id) = parse_spotify_track_id(query).filter(|_| query.contains("spotify")) else {
                return Ok(None);
            };
            let token = self.fetch_token().await?;
            self.track_by_id(&token.access_token, &id).await
        } else {
            let token = self.fetch_token().await?;
            self.search(&token.access_token, query).await
        }
    }

    async fn fetch_token(&self) -> SpotifyResult<SpotifyToken> {
        let auth = format!("{}:{}", self.client_id, self.client_secret);
        let auth_b64 = B64_ENGINE.encode(auth);

        let res = self
            .http
            .post("https://accounts.spotify.com/api/token")
            .header("Authorization", format!("Basic {}", auth_b64))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?;

        Ok(res.json().await?)
    }

    async fn track_by_id(&self, token: &str, id: &str) -> SpotifyResult<Option<String>> {
        let url = format!("https://api.spotify.com/v1/tracks/{}", id);
        let res = self.http.get(&url).bearer_auth(token).send().await?.error_for_status()?;
        let track: SpotifyTrack = res.json().await?;
        Ok(Some(track.search_string()))
    }

    async fn search(&self, token: &str, query: &str) -> SpotifyResult<Option<String>> {
        let res = self
            .http
            .get("https://api.spotify.com/v1/search")
            .query(&[("q", query), ("type", "track"), ("limit", "1")])
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;

        let data: SpotifySearch = res.json().await?;
        Ok(data.tracks.items.first().map(SpotifyTrack::search_string))
    }
}

/// Track id from `spotify:track:ID` or `https://open.spotify.com/track/ID?...`.
pub fn parse_spotify_track_id(s: &str) -> Option<String> {
    if let Some(pos) = s.find("spotify:track:") {
        return s[pos + "spotify:track:".len()..]
            .split(&['?', '&'][..])
            .next()
            .filter(|id| !id.is_empty())
            .map(|x| x.to_string());
    }

    if let Some(idx) = s.find("/track/") {
        return s[idx + "/track/".len()..]
            .split(&['?', '&', '/'][..])
            .next()
            .filter(|id| !id.is_empty())
            .map(|x| x.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_track_ids() {
        assert_eq!(parse_spotify_track_id("spotify:track:abc123").as_deref(), Some("abc123"));
        assert_eq!(
            parse_spotify_track_id("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=xyz").as_deref(),
            Some("4uLU6hMCjMI75M1A2tKUQC")
        );
        assert_eq!(parse_spotify_track_id("https://open.spotify.com/album/abc"), None);
        assert_eq!(parse_spotify_track_id("spotify:track:"), None);
    }

    #[test]
    fn search_string_uses_first_artist() {
        let track: SpotifyTrack = serde_json::from_str(
            r#"{ "name": "Song", "artists": [{ "name": "Band" }, { "name": "Other" }] }"#,
        )
        .unwrap();
        assert_eq!(track.search_string(), "Song Band");

        let lonely: SpotifyTrack = serde_json::from_str(r#"{ "name": "Song", "artists": [] }"#).unwrap();
        assert_eq!(lonely.search_string(), "Song Unknown");
    }
}
