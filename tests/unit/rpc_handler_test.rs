//! Integration-level tests for the JSON-RPC method handler.
//!
//! Calls `handle_method` directly with an in-memory backend and a settings
//! file in a temp directory.

use serde_json::json;
use smartmarks::app::App;
use smartmarks::backend::memory::{MemoryClient, MemoryServer};
use smartmarks::rpc_handler::{handle_method, RpcContext};
use smartmarks::services::settings_engine::{EnvOverrides, SettingsEngine};
use smartmarks::types::settings::AuthSettings;
use tempfile::TempDir;

/// Helper: a mounted context over a fresh server.
async fn setup(server: &MemoryServer, dir: &TempDir) -> RpcContext<MemoryClient> {
    let path = dir.path().join("settings.json").to_string_lossy().to_string();
    let settings = SettingsEngine::with_overrides(Some(path), EnvOverrides::default());
    let mut ctx = RpcContext::new(App::new(server.client(), AuthSettings::default()), settings);
    ctx.app.mount().await;
    ctx
}

async fn signed_in(server: &MemoryServer, dir: &TempDir) -> RpcContext<MemoryClient> {
    let mut ctx = setup(server, dir).await;
    handle_method(&mut ctx, "auth.callback", &json!({"code": "alice"}))
        .await
        .unwrap();
    ctx.app.drain_events().await;
    ctx
}

// ─── Basics ───

#[tokio::test]
async fn test_ping() {
    let server = MemoryServer::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = setup(&server, &dir).await;
    let result = handle_method(&mut ctx, "ping", &json!({})).await.unwrap();
    assert_eq!(result, json!({"pong": true}));
}

#[tokio::test]
async fn test_unknown_method() {
    let server = MemoryServer::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = setup(&server, &dir).await;
    let err = handle_method(&mut ctx, "tabs.create", &json!({})).await.unwrap_err();
    assert_eq!(err, "unknown method: tabs.create");
}

#[tokio::test]
async fn test_view_signed_out() {
    let server = MemoryServer::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = setup(&server, &dir).await;
    let view = handle_method(&mut ctx, "view", &json!({})).await.unwrap();
    assert_eq!(view["screen"], "signed_out");
}

// ─── Auth ───

#[tokio::test]
async fn test_sign_in_and_out() {
    let server = MemoryServer::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = setup(&server, &dir).await;

    let result = handle_method(&mut ctx, "auth.sign_in", &json!({})).await.unwrap();
    assert!(result["url"].as_str().unwrap().contains("provider=google"));

    let result = handle_method(
        &mut ctx,
        "auth.callback",
        &json!({"url": "http://127.0.0.1:54321/auth/callback?code=alice"}),
    )
    .await
    .unwrap();
    assert_eq!(result["view"]["screen"], "signed_in");
    assert_eq!(result["view"]["user"]["id"], "alice");

    let result = handle_method(&mut ctx, "auth.sign_out", &json!({})).await.unwrap();
    assert_eq!(result["view"]["screen"], "signed_out");
}

#[tokio::test]
async fn test_callback_requires_url_or_code() {
    let server = MemoryServer::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = setup(&server, &dir).await;
    let err = handle_method(&mut ctx, "auth.callback", &json!({})).await.unwrap_err();
    assert_eq!(err, "missing code");
}

// ─── Form and bookmarks ───

#[tokio::test]
async fn test_create_through_form() {
    let server = MemoryServer::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = signed_in(&server, &dir).await;

    handle_method(
        &mut ctx,
        "form.set",
        &json!({"title": "Example", "url": "https://example.com"}),
    )
    .await
    .unwrap();
    let result = handle_method(&mut ctx, "form.submit", &json!({})).await.unwrap();
    assert_eq!(result["outcome"], "created");
    assert_eq!(result["bookmark"]["title"], "Example");
    assert_eq!(result["view"]["rows"].as_array().unwrap().len(), 1);
    assert_eq!(result["view"]["form"]["title"], "");
}

#[tokio::test]
async fn test_invalid_submit_reports_error_and_notice() {
    let server = MemoryServer::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = signed_in(&server, &dir).await;

    let err = handle_method(&mut ctx, "form.submit", &json!({})).await.unwrap_err();
    assert_eq!(err, "Title is required");

    let notices = handle_method(&mut ctx, "notices.take", &json!({})).await.unwrap();
    assert_eq!(notices, json!([{"level": "error", "message": "Title is required"}]));
    let notices = handle_method(&mut ctx, "notices.take", &json!({})).await.unwrap();
    assert_eq!(notices, json!([]));
}

#[tokio::test]
async fn test_edit_and_update() {
    let server = MemoryServer::new();
    let row = server.seed("Old", "https://example.com", "alice");
    let dir = TempDir::new().unwrap();
    let mut ctx = signed_in(&server, &dir).await;

    let result = handle_method(&mut ctx, "form.edit", &json!({"id": row.id})).await.unwrap();
    assert_eq!(result["view"]["form"]["editing_id"], row.id.as_str());
    assert_eq!(result["view"]["form"]["title"], "Old");

    handle_method(&mut ctx, "form.set", &json!({"title": "New"})).await.unwrap();
    let result = handle_method(&mut ctx, "form.submit", &json!({})).await.unwrap();
    assert_eq!(result["outcome"], "updated");
    assert_eq!(result["view"]["rows"][0]["title"], "New");
    assert!(result["view"]["form"]["editing_id"].is_null());
}

#[tokio::test]
async fn test_edit_errors() {
    let server = MemoryServer::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = signed_in(&server, &dir).await;

    let err = handle_method(&mut ctx, "form.edit", &json!({})).await.unwrap_err();
    assert_eq!(err, "missing id");
    let err = handle_method(&mut ctx, "form.edit", &json!({"id": "ghost"}))
        .await
        .unwrap_err();
    assert_eq!(err, "Unknown bookmark: ghost");
}

#[tokio::test]
async fn test_cancel_edit() {
    let server = MemoryServer::new();
    let row = server.seed("Old", "https://example.com", "alice");
    let dir = TempDir::new().unwrap();
    let mut ctx = signed_in(&server, &dir).await;

    handle_method(&mut ctx, "form.edit", &json!({"id": row.id})).await.unwrap();
    let result = handle_method(&mut ctx, "form.cancel", &json!({})).await.unwrap();
    assert_eq!(result["view"]["form"]["heading"], "Add New Bookmark");
}

#[tokio::test]
async fn test_delete_needs_confirmation() {
    let server = MemoryServer::new();
    let row = server.seed("Doomed", "https://example.com", "alice");
    let dir = TempDir::new().unwrap();
    let mut ctx = signed_in(&server, &dir).await;

    let result = handle_method(&mut ctx, "bookmark.delete", &json!({"id": row.id}))
        .await
        .unwrap();
    assert_eq!(result["deleted"], false);
    assert_eq!(server.rows().len(), 1);

    let result = handle_method(
        &mut ctx,
        "bookmark.delete",
        &json!({"id": row.id, "confirmed": true}),
    )
    .await
    .unwrap();
    assert_eq!(result["deleted"], true);
    assert!(result["view"]["rows"].as_array().unwrap().is_empty());
    assert!(server.rows().is_empty());
}

// ─── Settings ───

#[tokio::test]
async fn test_settings_get_and_set() {
    let server = MemoryServer::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = setup(&server, &dir).await;

    let settings = handle_method(&mut ctx, "settings.get", &json!({})).await.unwrap();
    assert_eq!(settings["realtime"]["heartbeat_secs"], 25);

    let result = handle_method(
        &mut ctx,
        "settings.set",
        &json!({"key": "realtime.heartbeat_secs", "value": 10}),
    )
    .await
    .unwrap();
    assert_eq!(result, json!({"ok": true, "restart_required": true}));

    let settings = handle_method(&mut ctx, "settings.get", &json!({})).await.unwrap();
    assert_eq!(settings["realtime"]["heartbeat_secs"], 10);
    assert!(dir.path().join("settings.json").exists());
}

#[tokio::test]
async fn test_settings_set_errors() {
    let server = MemoryServer::new();
    let dir = TempDir::new().unwrap();
    let mut ctx = setup(&server, &dir).await;

    let err = handle_method(&mut ctx, "settings.set", &json!({"key": "realtime.heartbeat_secs"}))
        .await
        .unwrap_err();
    assert_eq!(err, "missing value");
    let err = handle_method(&mut ctx, "settings.set", &json!({"key": "nope", "value": 1}))
        .await
        .unwrap_err();
    assert!(err.starts_with("Invalid settings key"));
}
