// ABOUTME: HTTP host service exposing the catalog, settings, hotkeys and save inspection as JSON
// ABOUTME: Also serves the rot13 play route and the hotkeys-helper.js script injected into game frames

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post, put},
    Json, Router,
};
use kittengames_core::catalog::{play_path, rot13_decode, CatalogEntry, CatalogError};
use kittengames_core::hotkeys::{Hotkey, HotkeyDef, HotkeyError};
use kittengames_core::launch::cloaked_document;
use kittengames_core::save::{self, SaveError};
use kittengames_core::script::{analyze_script, RiskFinding};
use kittengames_core::settings::{CloakSettings, LaunchSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::app::App;

pub const HOTKEYS_HELPER_JS: &str = include_str!("../assets/hotkeys-helper.js");

type AppState = Arc<App>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            kind: None,
        }),
    )
}

fn catalog_error(e: CatalogError) -> ApiError {
    tracing::warn!(error = %e, "Catalog unavailable");
    api_error(StatusCode::BAD_GATEWAY, e)
}

fn hotkey_error(e: HotkeyError) -> ApiError {
    let status = match e {
        HotkeyError::EmptyKeys => StatusCode::UNPROCESSABLE_ENTITY,
        HotkeyError::NotFound(_) => StatusCode::NOT_FOUND,
        HotkeyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e)
}

fn internal(e: anyhow::Error) -> ApiError {
    tracing::error!(error = %e, "Request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
}

/// Build the router with all routes and request tracing.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/hotkeys-helper.js", get(hotkeys_helper))
        .route("/play/{code}", get(play))
        .route("/api/games", get(list_games))
        .route("/api/games/{slug}", get(get_game))
        .route(
            "/api/settings/launch",
            get(get_launch_settings).put(put_launch_settings),
        )
        .route(
            "/api/settings/cloak",
            get(get_cloak_settings).put(put_cloak_settings),
        )
        .route("/api/hotkeys", get(list_hotkeys).post(add_hotkey))
        .route("/api/hotkeys/analyze", post(analyze_hotkey_script))
        .route(
            "/api/hotkeys/{id}",
            put(update_hotkey).delete(delete_hotkey),
        )
        .route("/api/hotkeys/{id}/toggle", post(toggle_hotkey))
        .route("/api/saves/inspect", post(inspect_save))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// Bind and serve until the process is stopped.
pub async fn serve(app: Arc<App>) -> Result<()> {
    let addr = format!("{}:{}", app.config.server.host, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "HTTP host service listening");

    axum::serve(listener, router(app))
        .await
        .context("HTTP server error")
}

async fn health() -> &'static str {
    "ok"
}

async fn hotkeys_helper() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        HOTKEYS_HELPER_JS,
    )
}

// ─── Games ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub slug: String,
    pub play_path: String,
}

impl From<&CatalogEntry> for GameSummary {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            slug: entry.slug(),
            play_path: play_path(&entry.name),
            entry: entry.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GamesQuery {
    #[serde(default)]
    refresh: bool,
    #[serde(default)]
    q: Option<String>,
}

async fn list_games(
    State(app): State<AppState>,
    Query(query): Query<GamesQuery>,
) -> Result<Json<Vec<GameSummary>>, ApiError> {
    let catalog = app
        .catalog
        .get_catalog(query.refresh)
        .await
        .map_err(catalog_error)?;
    let needle = query.q.as_deref().map(str::to_lowercase);
    let games = catalog
        .iter()
        .filter(|e| match &needle {
            Some(n) => e.name.to_lowercase().contains(n),
            None => true,
        })
        .map(GameSummary::from)
        .collect();
    Ok(Json(games))
}

async fn get_game(
    State(app): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<GameSummary>, ApiError> {
    match app.catalog.find_by_slug(&slug).await.map_err(catalog_error)? {
        Some(entry) => Ok(Json(GameSummary::from(&entry))),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Unknown game: {}", slug),
        )),
    }
}

/// Player shell for `/play/<rot13 name>`: the game in a full-bleed frame,
/// titled with the current cloak.
async fn play(
    State(app): State<AppState>,
    Path(code): Path<String>,
) -> Result<Html<String>, ApiError> {
    let name = rot13_decode(&code);
    let entry = app
        .catalog
        .find_by_slug(&name)
        .await
        .map_err(catalog_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown game: {}", name)))?;
    let url = entry
        .play_url(app.catalog.base_url())
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e))?;
    tracing::info!(game = %entry.name, url = %url, "Serving player shell");
    Ok(Html(cloaked_document(url.as_str(), &app.settings.cloak())))
}

// ─── Settings ───────────────────────────────────────────────────

async fn get_launch_settings(State(app): State<AppState>) -> Json<LaunchSettings> {
    Json(app.settings.launch())
}

async fn put_launch_settings(
    State(app): State<AppState>,
    Json(next): Json<LaunchSettings>,
) -> Result<Json<LaunchSettings>, ApiError> {
    app.settings
        .update_launch(|s| *s = next)
        .map(Json)
        .map_err(internal)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloakUpdate {
    /// Applying a preset overwrites name and icon before the explicit fields.
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub tab_name: Option<String>,
    #[serde(default)]
    pub tab_icon_url: Option<String>,
}

async fn get_cloak_settings(State(app): State<AppState>) -> Json<CloakSettings> {
    Json(app.settings.cloak())
}

async fn put_cloak_settings(
    State(app): State<AppState>,
    Json(update): Json<CloakUpdate>,
) -> Result<Json<CloakSettings>, ApiError> {
    if let Some(preset) = &update.preset {
        app.settings
            .set_cloak_preset(preset)
            .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    }
    if update.tab_name.is_none() && update.tab_icon_url.is_none() {
        return Ok(Json(app.settings.cloak()));
    }
    app.settings
        .update_cloak(|c| {
            if let Some(name) = update.tab_name {
                c.tab_name = name;
            }
            if let Some(icon) = update.tab_icon_url {
                c.tab_icon_url = icon;
            }
        })
        .map(Json)
        .map_err(internal)
}

// ─── Hotkeys ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedHotkey {
    pub hotkey: Hotkey,
    /// Ids of other hotkeys bound to the same keys.
    pub conflicts: Vec<String>,
}

fn saved(app: &App, id: &str) -> Result<Json<SavedHotkey>, ApiError> {
    let hotkey = app
        .hotkeys
        .get(id)
        .ok_or_else(|| hotkey_error(HotkeyError::NotFound(id.to_string())))?;
    let conflicts = app.hotkeys.conflicts(&hotkey.keys, Some(id));
    Ok(Json(SavedHotkey { hotkey, conflicts }))
}

async fn list_hotkeys(State(app): State<AppState>) -> Json<Vec<Hotkey>> {
    Json(app.hotkeys.list())
}

async fn add_hotkey(
    State(app): State<AppState>,
    Json(def): Json<HotkeyDef>,
) -> Result<(StatusCode, Json<SavedHotkey>), ApiError> {
    let id = app.hotkeys.add(def).map_err(hotkey_error)?;
    saved(&app, &id).map(|body| (StatusCode::CREATED, body))
}

async fn update_hotkey(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(def): Json<HotkeyDef>,
) -> Result<Json<SavedHotkey>, ApiError> {
    app.hotkeys.update(&id, def).map_err(hotkey_error)?;
    saved(&app, &id)
}

async fn delete_hotkey(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    app.hotkeys.remove(&id).map_err(hotkey_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_hotkey(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SavedHotkey>, ApiError> {
    let current = app
        .hotkeys
        .get(&id)
        .ok_or_else(|| hotkey_error(HotkeyError::NotFound(id.clone())))?;
    app.hotkeys
        .set_enabled(&id, !current.enabled)
        .map_err(hotkey_error)?;
    saved(&app, &id)
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    script: String,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    findings: Vec<RiskFinding>,
}

async fn analyze_hotkey_script(Json(req): Json<AnalyzeRequest>) -> Json<AnalyzeResponse> {
    Json(AnalyzeResponse {
        findings: analyze_script(&req.script),
    })
}

// ─── Saves ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSummary {
    pub scope: String,
    pub version: String,
    pub timestamp: String,
    pub url: String,
    pub local_storage_keys: usize,
    pub cookies: usize,
    pub indexed_db_databases: usize,
}

fn save_error_kind(e: &SaveError) -> &'static str {
    match e {
        SaveError::NotASaveFile(_) => "not-a-save-file",
        SaveError::ScopeMismatch { .. } => "scope-mismatch",
        SaveError::Corrupt(_) => "corrupt",
    }
}

/// Validate an uploaded save file without restoring it anywhere.
async fn inspect_save(body: axum::body::Bytes) -> Result<Json<SaveSummary>, ApiError> {
    let bundle = save::decode(&body).map_err(|e| {
        tracing::info!(error = %e, "Rejected save file");
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: e.to_string(),
                kind: Some(save_error_kind(&e)),
            }),
        )
    })?;
    let data = &bundle.game_data;
    Ok(Json(SaveSummary {
        scope: bundle.metadata.scope.clone(),
        version: bundle.metadata.version.clone(),
        timestamp: bundle.metadata.timestamp.clone(),
        url: bundle.metadata.url.clone(),
        local_storage_keys: data.local_storage.len(),
        cookies: data.cookies.len(),
        indexed_db_databases: data.indexed_db.len(),
    }))
}
