use reqwest::Client;
use std::env;
use std::path::PathBuf;
use tokio::fs;

type ToolResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const BIN_DIR: &str = ".bin";
const YTDLP_BIN: &str = "yt-dlp";
const YTDLP_URL: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp";

/// Make sure yt-dlp is runnable: download it into `.bin/` when missing and
/// put that directory first on `PATH`. A missing ffmpeg only gets a warning.
pub async fn ensure_media_tools(http: &Client) -> ToolResult<()> {
    let ytdlp_path = PathBuf::from(BIN_DIR).join(YTDLP_BIN);

    if fs::metadata(&ytdlp_path).await.is_err() {
        tracing::info!(url = YTDLP_URL, "downloading yt-dlp");
        fs::create_dir_all(BIN_DIR).await?;
        let content = http.get(YTDLP_URL).send().await?.error_for_status()?.bytes().await?;
        fs::write(&ytdlp_path, &content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&ytdlp_path).await?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&ytdlp_path, perms).await?;
        }
    }

    match tokio::process::Command::new("ffmpeg").arg("-version").output().await {
        Ok(o) if o.status.success() => tracing::debug!("ffmpeg found"),
        Ok(o) => tracing::warn!(stderr = %String::from_utf8_lossy(&o.stderr), "ffmpeg exists but failed to run"),
        Err(_) => tracing::warn!("ffmpeg not found on PATH, playback may fail"),
    }

    prepend_path(BIN_DIR)
}

fn prepend_path(dir: &str) -> ToolResult<()> {
    let dir = PathBuf::from(dir);
    let current = env::var_os("PATH").unwrap_or_default();
    if env::split_paths(&current).any(|p| p == dir) {
        return Ok(());
    }

    let joined = env::join_paths(std::iter::once(dir).chain(env::split_paths(&current)))?;
    // Runs once at startup, before any yt-dlp child is spawned.
    unsafe {
        env::set_var("PATH", joined);
    }
    Ok(())
}
