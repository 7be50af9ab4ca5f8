use serde::Deserialize;
use std::io::ErrorKind;

pub const CONFIG_PATH: &str = "config.jsonc";

const DEFAULT_CONFIG: &str = r#"// Jukebox bot config (JSONC: supports comments)
{
  // Chat command prefix and embed colour
  "bot": {
    "prefix": "!",
    "embed_color": 5793266 // 0x5865F2
  },
  // Web dashboard; the PORT env var overrides the port
  "dashboard": {
    "enabled": true,
    "bind": "0.0.0.0",
    "port": 8080
  },
  // Discord activity texts
  "presence": {
    "playing": "music 🎶",
    "idle": "nothing 🌈"
  },
  "resolver": {
    "format": "bestaudio/best",
    "timeout_secs": 60,
    // "cookies_file": "www.youtube.com_cookies.txt",
    "spotify_lookup": true
  },
  "playback": {
    "volume": 0.2,
    "self_deafen": true
  }
}
"#;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_embed_color")]
    pub embed_color: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            embed_color: default_embed_color(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PresenceConfig {
    #[serde(default = "default_playing_text")]
    pub playing: String,
    #[serde(default = "default_idle_text")]
    pub idle: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            playing: default_playing_text(),
            idle: default_idle_text(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub cookies_file: Option<String>,
    #[serde(default = "default_true")]
    pub spotify_lookup: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            timeout_secs: default_timeout_secs(),
            cookies_file: None,
            spotify_lookup: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlaybackConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_true")]
    pub self_deafen: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            self_deafen: true,
        }
    }
}

fn default_prefix() -> String {
    "!".into()
}

fn default_embed_color() -> u32 {
    0x5865F2
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_playing_text() -> String {
    "music 🎶".into()
}

fn default_idle_text() -> String {
    "nothing 🌈".into()
}

fn default_format() -> String {
    "bestaudio/best".into()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_volume() -> f32 {
    0.2
}

impl AppConfig {
    pub fn parse(contents: &str) -> Result<Self, json5::Error> {
        json5::from_str(contents)
    }

    /// `PORT` wins over the file, as on most PaaS hosts.
    fn apply_env(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.dashboard.port = port;
        }
    }
}

pub async fn ensure_default_config() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match tokio::fs::metadata(CONFIG_PATH).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::write(CONFIG_PATH, DEFAULT_CONFIG).await?;
            tracing::info!(path = CONFIG_PATH, "wrote default config");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

pub async fn load_config() -> Result<AppConfig, Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = ensure_default_config().await {
        tracing::warn!(error = %e, "couldn't write default config");
    }

    let contents = match tokio::fs::read_to_string(CONFIG_PATH).await {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => DEFAULT_CONFIG.to_string(),
        Err(e) => return Err(Box::new(e)),
    };
    let mut cfg = AppConfig::parse(&contents)?;
    cfg.apply_env();
    Ok(cfg)
}
