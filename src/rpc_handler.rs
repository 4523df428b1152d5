//! RPC method handler for the SmartMarks JSON-RPC protocol.
//!
//! Kept apart from `rpc_server.rs` so it can be tested against the in-memory
//! backend. `handle_method` dispatches one call to the view-model or the
//! settings engine; mutating calls answer with the new screen view.

use serde_json::{json, Value};

use crate::app::App;
use crate::backend::Backend;
use crate::managers::bookmark_manager::{DeleteOutcome, SubmitOutcome};
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};

/// State behind the RPC server.
pub struct RpcContext<B: Backend> {
    pub app: App<B>,
    pub settings: SettingsEngine,
}

impl<B: Backend> RpcContext<B> {
    pub fn new(app: App<B>, settings: SettingsEngine) -> Self {
        Self { app, settings }
    }
}

fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", name))
}

fn view_json<B: Backend>(app: &App<B>) -> Result<Value, String> {
    serde_json::to_value(app.view()).map_err(|e| e.to_string())
}

fn ok_with_view<B: Backend>(app: &App<B>) -> Result<Value, String> {
    Ok(json!({"ok": true, "view": view_json(app)?}))
}

/// Dispatch a JSON-RPC method call.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method<B: Backend>(
    ctx: &mut RpcContext<B>,
    method: &str,
    params: &Value,
) -> Result<Value, String> {
    let app = &mut ctx.app;
    match method {
        "ping" => Ok(json!({"pong": true})),
        "view" => view_json(app),

        // ─── Auth ───
        "auth.sign_in" => {
            let url = app.sign_in().await.map_err(|e| e.to_string())?;
            Ok(json!({"url": url}))
        }
        "auth.callback" => {
            let callback = str_param(params, "url").or_else(|_| str_param(params, "code"))?;
            app.complete_sign_in(callback).await.map_err(|e| e.to_string())?;
            ok_with_view(app)
        }
        "auth.sign_out" => {
            app.sign_out().await;
            ok_with_view(app)
        }

        // ─── Form ───
        "form.set" => {
            if let Some(title) = params.get("title").and_then(|v| v.as_str()) {
                app.set_title(title);
            }
            if let Some(url) = params.get("url").and_then(|v| v.as_str()) {
                app.set_url(url);
            }
            ok_with_view(app)
        }
        "form.edit" => {
            let id = str_param(params, "id")?;
            app.start_edit(id).map_err(|e| e.to_string())?;
            ok_with_view(app)
        }
        "form.cancel" => {
            app.cancel_edit();
            ok_with_view(app)
        }
        "form.submit" => {
            let outcome = app.submit().await.map_err(|e| e.to_string())?;
            let (kind, bookmark) = match outcome {
                SubmitOutcome::Created(b) => ("created", b),
                SubmitOutcome::Updated(b) => ("updated", b),
            };
            Ok(json!({"outcome": kind, "bookmark": bookmark, "view": view_json(app)?}))
        }

        // ─── Bookmarks ───
        "bookmark.delete" => {
            let id = str_param(params, "id")?;
            let confirmed = params
                .get("confirmed")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let mut confirm = |_: &str| confirmed;
            let outcome = app.delete(id, &mut confirm).await.map_err(|e| e.to_string())?;
            Ok(json!({
                "deleted": outcome == DeleteOutcome::Deleted,
                "view": view_json(app)?,
            }))
        }
        "notices.take" => {
            let notices = app.take_notices();
            serde_json::to_value(notices).map_err(|e| e.to_string())
        }

        // ─── Settings ───
        "settings.get" => {
            serde_json::to_value(ctx.settings.get_settings()).map_err(|e| e.to_string())
        }
        "settings.set" => {
            let key = str_param(params, "key")?;
            let value = params.get("value").cloned().ok_or("missing value")?;
            ctx.settings.set_value(key, value).map_err(|e| e.to_string())?;
            Ok(json!({"ok": true, "restart_required": true}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
