use crate::controller::QueueController;
use crate::error::MusicError;
use crate::worker::PlayOutcome;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serenity::all::GuildId;
use serenity::cache::Cache;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct DashboardState {
    pub controller: QueueController,
    pub cache: Arc<Cache>,
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/guilds/{guild_id}/now_playing", get(now_playing))
        .route("/api/guilds/{guild_id}/online_users", get(online_users))
        .route("/api/guilds/{guild_id}/play", post(play))
        .route("/api/guilds/{guild_id}/skip", post(skip))
        .route("/api/guilds/{guild_id}/pause", post(pause))
        .route("/api/guilds/{guild_id}/resume", post(resume))
        .route("/api/guilds/{guild_id}/stop", post(stop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: DashboardState, bind: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "dashboard listening");
    axum::serve(listener, router(state)).await
}

enum ApiError {
    BadGuild,
    Music(MusicError),
}

impl From<MusicError> for ApiError {
    fn from(e: MusicError) -> Self {
        Self::Music(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadGuild => (StatusCode::BAD_REQUEST, "invalid guild id".to_string()),
            ApiError::Music(e) => {
                let status = match e {
                    MusicError::EmptyQuery => StatusCode::BAD_REQUEST,
                    MusicError::NoVoiceChannel | MusicError::NotConnected => StatusCode::NOT_FOUND,
                    MusicError::ResolutionFailed { .. } | MusicError::SinkStartFailed { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    MusicError::SessionClosed | MusicError::NothingPlaying => StatusCode::CONFLICT,
                    MusicError::Connect(_) => StatusCode::BAD_GATEWAY,
                    MusicError::Control(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
        };
        (status, Json(serde_json::json!({ "status": "error", "error": message }))).into_response()
    }
}

fn guild_id(raw: u64) -> Result<GuildId, ApiError> {
    if raw == 0 {
        return Err(ApiError::BadGuild);
    }
    Ok(GuildId::new(raw))
}

fn ok(extra: serde_json::Value) -> Json<serde_json::Value> {
    let mut body = serde_json::json!({ "status": "ok" });
    if let (Some(body), serde_json::Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    Json(body)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[tracing::instrument(level = "debug", skip_all)]
async fn status(State(state): State<DashboardState>) -> Json<serde_json::Value> {
    let sessions: Vec<String> = state
        .controller
        .connected_guilds()
        .into_iter()
        .map(|g| g.to_string())
        .collect();
    Json(serde_json::json!({
        "presence": state.controller.presence().current().as_str(),
        "sessions": sessions,
    }))
}

#[tracing::instrument(level = "debug", skip(state))]
async fn now_playing(State(state): State<DashboardState>, Path(raw): Path<u64>) -> Result<Response, ApiError> {
    let guild = guild_id(raw)?;
    Ok(Json(state.controller.snapshot(guild).await).into_response())
}

#[derive(Debug, Serialize)]
struct OnlineUser {
    name: String,
    status: String,
    avatar: String,
}

#[tracing::instrument(level = "debug", skip(state))]
async fn online_users(State(state): State<DashboardState>, Path(raw): Path<u64>) -> Result<Json<Vec<OnlineUser>>, ApiError> {
    let guild = guild_id(raw)?;
    let Some(guild) = state.cache.guild(guild) else {
        return Ok(Json(Vec::new()));
    };
    let users = guild
        .members
        .values()
        .filter(|m| !m.user.bot)
        .map(|m| OnlineUser {
            name: m.display_name().to_string(),
            status: guild
                .presences
                .get(&m.user.id)
                .map(|p| p.status.name())
                .unwrap_or("offline")
                .to_string(),
            avatar: m.face(),
        })
        .collect();
    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayRequest {
    query: String,
    #[serde(default)]
    requested_by: Option<String>,
}

#[tracing::instrument(level = "info", skip(state))]
async fn play(
    State(state): State<DashboardState>,
    Path(raw): Path<u64>,
    Json(req): Json<PlayRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let guild = guild_id(raw)?;
    if !state.controller.is_connected(guild) {
        return Err(MusicError::NotConnected.into());
    }
    let requested_by = req.requested_by.as_deref().unwrap_or("dashboard");
    let outcome = state
        .controller
        .request_play(guild, None, &req.query, requested_by)
        .await?;
    let body = match outcome {
        PlayOutcome::Started(song) => serde_json::json!({ "started": song }),
        PlayOutcome::Queued { song, position } => serde_json::json!({ "queued": song, "position": position }),
    };
    Ok(ok(body))
}

#[tracing::instrument(level = "info", skip(state))]
async fn skip(State(state): State<DashboardState>, Path(raw): Path<u64>) -> Result<Json<serde_json::Value>, ApiError> {
    let guild = guild_id(raw)?;
    state.controller.request_skip(guild).await?;
    Ok(ok(serde_json::json!({})))
}

#[tracing::instrument(level = "info", skip(state))]
async fn pause(State(state): State<DashboardState>, Path(raw): Path<u64>) -> Result<Json<serde_json::Value>, ApiError> {
    let guild = guild_id(raw)?;
    let changed = state.controller.request_pause(guild).await?;
    Ok(ok(serde_json::json!({ "changed": changed })))
}

#[tracing::instrument(level = "info", skip(state))]
async fn resume(State(state): State<DashboardState>, Path(raw): Path<u64>) -> Result<Json<serde_json::Value>, ApiError> {
    let guild = guild_id(raw)?;
    let changed = state.controller.request_resume(guild).await?;
    Ok(ok(serde_json::json!({ "changed": changed })))
}

#[tracing::instrument(level = "info", skip(state))]
async fn stop(State(state): State<DashboardState>, Path(raw): Path<u64>) -> Result<Json<serde_json::Value>, ApiError> {
    let guild = guild_id(raw)?;
    let stopped = state.controller.request_stop(guild).await;
    Ok(ok(serde_json::json!({ "stopped": stopped })))
}
