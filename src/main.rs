//! SmartMarks — personal bookmarks with live sync across sessions.
//!
//! Entry point: an interactive terminal screen over the bookmark view-model.
//! Signed out it offers sign-in through the browser; signed in it lists the
//! bookmarks newest first and accepts add/edit/delete commands. Changes made
//! from other sessions appear as they happen.
//!
//! `--demo` runs against an in-memory backend with a couple of seeded rows.

use std::io::{self, Write};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use smartmarks::app::{App, ScreenView};
use smartmarks::backend::memory::MemoryServer;
use smartmarks::backend::supabase::SupabaseBackend;
use smartmarks::backend::Backend;
use smartmarks::logging::init_tracing;
use smartmarks::managers::bookmark_manager::{DeleteOutcome, NoticeLevel, SubmitOutcome, DELETE_PROMPT};
use smartmarks::platform;
use smartmarks::services::oauth_callback::CallbackListener;
use smartmarks::services::settings_engine::{SettingsEngine, SettingsEngineTrait};

/// How long to wait for the browser to come back from the provider.
const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(300);

/// User id the demo seeds rows for.
const DEMO_USER: &str = "demo";

type Input = Lines<BufReader<Stdin>>;

fn section(name: &str) {
    println!("───────────────────────────────────────────────────────────────");
    println!("  {}", name);
    println!("───────────────────────────────────────────────────────────────");
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = io::stdout().flush();
}

fn render(view: &ScreenView) {
    println!();
    match view {
        ScreenView::Loading => println!("  Loading..."),
        ScreenView::SignedOut { notices } => {
            section("🔖 SmartMarks");
            println!("  Organize and access your favorite links.");
            println!();
            println!("  login   continue with Google");
            println!("  quit    exit");
            print_notices(notices);
        }
        ScreenView::SignedIn { user, rows, form, live, notices } => {
            section("🔖 SmartMarks");
            let who = user.email.as_deref().unwrap_or(&user.id);
            let sync = if *live { "live" } else { "offline" };
            println!("  Signed in as {} ({})", who, sync);
            println!();

            if rows.is_empty() {
                println!("  No bookmarks yet. Add your first one below.");
            }
            for (i, row) in rows.iter().enumerate() {
                let marker = if row.editing {
                    "  [editing]"
                } else if !row.edit_enabled {
                    "  [locked]"
                } else {
                    ""
                };
                println!(
                    "  {:>2}. {}  <{}>  {}{}",
                    i + 1,
                    row.title,
                    row.url,
                    row.created_at.format("%Y-%m-%d %H:%M"),
                    marker
                );
            }

            println!();
            println!("  {}", form.heading);
            println!("    title: {}", form.title);
            println!("    url:   {}", form.url);
            println!("    [{}]", form.submit_label);
            println!();
            if form.editing_id.is_some() {
                println!("  commands: title <text> | url <text> | save | cancel | delete <n> | logout | quit");
            } else {
                println!("  commands: title <text> | url <text> | save | edit <n> | delete <n> | logout | quit");
            }
            print_notices(notices);
        }
    }
}

fn print_notices(notices: &[smartmarks::managers::bookmark_manager::Notice]) {
    for notice in notices {
        match notice.level {
            NoticeLevel::Info => println!("  ℹ {}", notice.message),
            NoticeLevel::Error => println!("  ✗ {}", notice.message),
        }
    }
}

/// 1-based row number to bookmark id.
fn row_id<B: Backend>(app: &App<B>, arg: &str) -> Option<String> {
    let index: usize = arg.trim().parse().ok()?;
    let list = app.bookmarks()?;
    list.nth(index.checked_sub(1)?).map(|b| b.id.clone())
}

async fn sign_in<B: Backend>(app: &mut App<B>, input: &mut Input, redirect_to: &str, demo: bool) -> io::Result<()> {
    if demo {
        let Ok(url) = app.sign_in().await else { return Ok(()) };
        println!("  (demo) provider URL: {}", url);
        prompt(&format!("  sign in as [{}]: ", DEMO_USER));
        let answer = input.next_line().await?.unwrap_or_default();
        let user = if answer.trim().is_empty() { DEMO_USER } else { answer.trim() };
        let _ = app.complete_sign_in(user).await;
        return Ok(());
    }

    let listener = match CallbackListener::bind(redirect_to).await {
        Ok(listener) => listener,
        Err(e) => {
            println!("  ✗ {}", e);
            return Ok(());
        }
    };
    let Ok(url) = app.sign_in().await else { return Ok(()) };
    println!("  Open this URL in your browser to continue with Google:");
    println!();
    println!("  {}", url);
    println!();
    println!("  Waiting for the sign-in redirect...");
    match listener.wait(SIGN_IN_TIMEOUT).await {
        Ok(callback) => {
            let _ = app.complete_sign_in(&callback).await;
        }
        Err(e) => println!("  ✗ {}", e),
    }
    Ok(())
}

/// Runs one command line. Returns false when the user asked to quit.
async fn execute<B: Backend>(
    app: &mut App<B>,
    input: &mut Input,
    line: &str,
    redirect_to: &str,
    demo: bool,
) -> io::Result<bool> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let signed_in = app.user().is_some();

    match (command, signed_in) {
        ("quit" | "exit", _) => return Ok(false),
        ("login", false) => sign_in(app, input, redirect_to, demo).await?,
        ("logout", true) => app.sign_out().await,
        ("add", true) | ("cancel", true) => app.cancel_edit(),
        ("title", true) => app.set_title(rest),
        ("url", true) => app.set_url(rest),
        ("save", true) => match app.submit().await {
            Ok(SubmitOutcome::Created(b)) => println!("  ✓ added {}", b.title),
            Ok(SubmitOutcome::Updated(b)) => println!("  ✓ updated {}", b.title),
            Err(_) => {}
        },
        ("edit", true) => match row_id(app, rest) {
            Some(id) => {
                if let Err(e) = app.start_edit(&id) {
                    println!("  ✗ {}", e);
                }
            }
            None => println!("  ✗ no bookmark #{}", rest.trim()),
        },
        ("delete", true) => match row_id(app, rest) {
            Some(id) => {
                prompt(&format!("  {} [y/N] ", DELETE_PROMPT));
                let answer = input.next_line().await?.unwrap_or_default();
                let yes = matches!(answer.trim(), "y" | "Y" | "yes");
                let mut confirm = |_: &str| yes;
                if let Ok(DeleteOutcome::Deleted) = app.delete(&id, &mut confirm).await {
                    println!("  ✓ deleted");
                }
            }
            None => println!("  ✗ no bookmark #{}", rest.trim()),
        },
        ("", _) => {}
        (other, _) => println!("  ✗ unknown command: {}", other),
    }
    Ok(true)
}

async fn run<B: Backend>(mut app: App<B>, redirect_to: &str, demo: bool) -> io::Result<()> {
    app.mount().await;
    render(&app.view());
    app.take_notices();

    let mut input: Input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt("> ");
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else { break };
                if !execute(&mut app, &mut input, line.trim(), redirect_to, demo).await? {
                    break;
                }
                app.drain_events().await;
                render(&app.view());
                app.take_notices();
            }
            event = app.next_event() => {
                if app.handle_event(event).await {
                    render(&app.view());
                    app.take_notices();
                }
            }
        }
    }

    app.unmount();
    Ok(())
}

#[tokio::main]
async fn main() {
    let demo = std::env::args().any(|a| a == "--demo");

    let mut settings = SettingsEngine::new(None);
    if let Err(e) = settings.load() {
        eprintln!("smartmarks: {}", e);
        std::process::exit(2);
    }
    let effective = settings.effective_settings();
    if let Err(e) = init_tracing(&effective.logging.filter) {
        eprintln!("smartmarks: {}", e);
    }
    let redirect_to = effective.auth.redirect_to.clone();

    let result = if demo {
        let server = MemoryServer::new();
        server.seed("Rust Book", "https://doc.rust-lang.org/book/", DEMO_USER);
        server.seed("Tokio", "https://tokio.rs", DEMO_USER);
        run(App::new(server.client(), effective.auth.clone()), &redirect_to, true).await
    } else {
        let backend = settings
            .validate()
            .and_then(|valid| SupabaseBackend::open(&valid, &platform::get_data_dir()));
        match backend {
            Ok(backend) => run(App::new(backend, effective.auth.clone()), &redirect_to, false).await,
            Err(e) => {
                eprintln!("smartmarks: {}", e);
                eprintln!("Set SUPABASE_URL and SUPABASE_ANON_KEY, or run with --demo.");
                std::process::exit(2);
            }
        }
    };

    if let Err(e) = result {
        eprintln!("smartmarks: {}", e);
        std::process::exit(1);
    }
}
