//! SmartMarks RPC Server: JSON-RPC over stdin/stdout for an external UI shell.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"form.set", "params":{"title":"...","url":"..."}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Push:     {"event":"view", "view":{...}} whenever auth or live changes alter the screen.
//!
//! `--demo` serves an in-memory backend instead of the hosted one.

use std::io::{self, Write};
use std::time::Instant;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use smartmarks::app::App;
use smartmarks::backend::memory::MemoryServer;
use smartmarks::backend::supabase::SupabaseBackend;
use smartmarks::backend::Backend;
use smartmarks::logging::init_tracing;
use smartmarks::platform;
use smartmarks::rpc_handler::{handle_method, RpcContext};
use smartmarks::services::settings_engine::{SettingsEngine, SettingsEngineTrait};

/// Simple rate limiter: max requests per second.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self { window_start: Instant::now(), request_count: 0, max_per_second }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    fn check(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

fn emit(value: &Value) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", value)?;
    out.flush()
}

async fn respond<B: Backend>(ctx: &mut RpcContext<B>, limiter: &mut RateLimiter, line: &str) -> Value {
    let req: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return json!({"id": null, "error": format!("parse error: {}", e)}),
    };
    let id = req.get("id").cloned().unwrap_or(Value::Null);

    if !limiter.check() {
        tracing::warn!("rpc rate limit exceeded");
        return json!({"id": id, "error": "rate limit exceeded"});
    }

    let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("");
    let params = req.get("params").cloned().unwrap_or(json!({}));
    tracing::debug!(method, "rpc call");

    match handle_method(ctx, method, &params).await {
        Ok(val) => json!({"id": id, "result": val}),
        Err(err) => json!({"id": id, "error": err}),
    }
}

async fn serve<B: Backend>(mut ctx: RpcContext<B>) -> io::Result<()> {
    ctx.app.mount().await;
    emit(&json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}))?;
    emit(&json!({"event": "view", "view": ctx.app.view()}))?;

    let mut limiter = RateLimiter::new(200);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let response = respond(&mut ctx, &mut limiter, &line).await;
                emit(&response)?;
            }
            event = ctx.app.next_event() => {
                if ctx.app.handle_event(event).await {
                    emit(&json!({"event": "view", "view": ctx.app.view()}))?;
                }
            }
        }
    }

    ctx.app.unmount();
    Ok(())
}

#[tokio::main]
async fn main() {
    let mut settings = SettingsEngine::new(None);
    if let Err(e) = settings.load() {
        eprintln!("smartmarks-rpc: {}", e);
        std::process::exit(2);
    }
    let effective = settings.effective_settings();
    if let Err(e) = init_tracing(&effective.logging.filter) {
        eprintln!("smartmarks-rpc: {}", e);
    }

    let result = if std::env::args().any(|a| a == "--demo") {
        tracing::info!("serving the in-memory demo backend");
        let app = App::new(MemoryServer::new().client(), effective.auth.clone());
        serve(RpcContext::new(app, settings)).await
    } else {
        let backend = settings
            .validate()
            .and_then(|valid| SupabaseBackend::open(&valid, &platform::get_data_dir()));
        match backend {
            Ok(backend) => {
                let app = App::new(backend, effective.auth.clone());
                serve(RpcContext::new(app, settings)).await
            }
            Err(e) => {
                tracing::error!(error = %e, "backend unavailable");
                let _ = emit(&json!({"event": "fatal", "error": e.to_string()}));
                std::process::exit(2);
            }
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "rpc server stopped");
        std::process::exit(1);
    }
}
