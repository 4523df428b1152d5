//! End-to-end tests of the single-screen view-model over the in-memory backend.
//!
//! Each test drives [`App`] the way a front end does: mount, user commands,
//! then `drain_events` to absorb whatever the backend pushed meanwhile.

use std::time::Duration;

use smartmarks::app::{App, AppEvent, ScreenView};
use smartmarks::backend::memory::{MemoryClient, MemoryServer};
use smartmarks::backend::{AuthApi, BookmarkTable};
use smartmarks::managers::bookmark_manager::{DeleteOutcome, NoticeLevel, SubmitOutcome};
use smartmarks::types::bookmark::{BookmarkPatch, NewBookmark};
use smartmarks::types::errors::CommandError;
use smartmarks::types::settings::AuthSettings;

fn new_app(server: &MemoryServer) -> App<MemoryClient> {
    App::new(server.client(), AuthSettings::default())
}

/// Helper: a mounted app signed in as `user`, with startup events drained.
async fn signed_in_app(server: &MemoryServer, user: &str) -> App<MemoryClient> {
    let mut app = new_app(server);
    app.mount().await;
    app.complete_sign_in(user).await.unwrap();
    app.drain_events().await;
    app
}

fn titles(app: &App<MemoryClient>) -> Vec<String> {
    app.bookmarks()
        .map(|list| list.iter().map(|b| b.title.clone()).collect())
        .unwrap_or_default()
}

// ─── Session ───

#[tokio::test]
async fn test_loading_then_signed_out() {
    let server = MemoryServer::new();
    let mut app = new_app(&server);
    assert_eq!(app.view(), ScreenView::Loading);

    app.mount().await;
    assert!(matches!(app.view(), ScreenView::SignedOut { .. }));
    assert!(app.bookmarks().is_none());
    assert!(!app.is_live());
}

#[tokio::test]
async fn test_existing_session_loads_owned_rows_newest_first() {
    let server = MemoryServer::new();
    server.seed("Older", "https://older.example", "alice");
    server.seed("Not mine", "https://bob.example", "bob");
    server.seed("Newer", "https://newer.example", "alice");

    let client = server.client();
    client.exchange_code("alice").await.unwrap();
    let mut app = App::new(client, AuthSettings::default());
    app.mount().await;

    assert_eq!(titles(&app), vec!["Newer", "Older"]);
    assert!(app.is_live());
    let ScreenView::SignedIn { user, rows, .. } = app.view() else {
        panic!("expected the signed-in screen");
    };
    assert_eq!(user.id, "alice");
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_sign_in_flow() {
    let server = MemoryServer::new();
    server.seed("Mine", "https://mine.example", "alice");
    let mut app = new_app(&server);
    app.mount().await;

    let url = app.sign_in().await.unwrap();
    assert!(url.contains("provider=google"));
    app.complete_sign_in("http://127.0.0.1:54321/auth/callback?code=alice")
        .await
        .unwrap();

    assert_eq!(app.user().unwrap().id, "alice");
    assert_eq!(titles(&app), vec!["Mine"]);
}

#[tokio::test]
async fn test_rejected_callback_becomes_notice() {
    let server = MemoryServer::new();
    let mut app = new_app(&server);
    app.mount().await;

    let result = app
        .complete_sign_in("http://127.0.0.1:54321/auth/callback?error=access_denied")
        .await;
    assert!(result.is_err());
    assert!(app.user().is_none());
    let notices = app.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert!(app.notices().is_empty());
}

#[tokio::test]
async fn test_sign_out_tears_down_user_state() {
    let server = MemoryServer::new();
    let mut app = signed_in_app(&server, "alice").await;
    assert_eq!(server.subscriber_count(), 1);

    app.sign_out().await;
    app.drain_events().await;
    assert!(app.user().is_none());
    assert!(app.bookmarks().is_none());
    assert!(!app.is_live());
    assert_eq!(server.subscriber_count(), 0);
    assert!(matches!(app.view(), ScreenView::SignedOut { .. }));
}

#[tokio::test]
async fn test_switching_user_reloads_list() {
    let server = MemoryServer::new();
    server.seed("Alice's", "https://alice.example", "alice");
    server.seed("Bob's", "https://bob.example", "bob");
    let mut app = signed_in_app(&server, "alice").await;
    assert_eq!(titles(&app), vec!["Alice's"]);

    app.complete_sign_in("bob").await.unwrap();
    app.drain_events().await;
    assert_eq!(titles(&app), vec!["Bob's"]);
    assert_eq!(app.bookmarks().unwrap().owner(), "bob");
    assert_eq!(server.subscriber_count(), 1);
}

// ─── Commands ───

#[tokio::test]
async fn test_create_and_echo_give_one_row() {
    let server = MemoryServer::new();
    let mut app = signed_in_app(&server, "alice").await;

    app.set_title("Example");
    app.set_url("https://example.com");
    let outcome = app.submit().await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Created(_)));

    app.drain_events().await;
    assert_eq!(titles(&app), vec!["Example"]);
    assert_eq!(app.form().title(), "");
}

#[tokio::test]
async fn test_edit_flags_in_view() {
    let server = MemoryServer::new();
    let first = server.seed("First", "https://first.example", "alice");
    server.seed("Second", "https://second.example", "alice");
    let mut app = signed_in_app(&server, "alice").await;

    app.start_edit(&first.id).unwrap();
    let ScreenView::SignedIn { rows, form, .. } = app.view() else {
        panic!("expected the signed-in screen");
    };
    assert_eq!(form.heading, "Edit Bookmark");
    assert_eq!(form.submit_label, "Update");
    assert_eq!(form.title, "First");
    for row in rows {
        assert_eq!(row.editing, row.id == first.id);
        assert_eq!(row.edit_enabled, row.id == first.id);
    }

    app.cancel_edit();
    assert!(app.form().editing_id().is_none());
}

#[tokio::test]
async fn test_rename_through_app() {
    let server = MemoryServer::new();
    let row = server.seed("Old", "https://example.com", "alice");
    let mut app = signed_in_app(&server, "alice").await;

    app.start_edit(&row.id).unwrap();
    app.set_title("New");
    assert!(matches!(app.submit().await, Ok(SubmitOutcome::Updated(_))));
    app.drain_events().await;

    assert_eq!(titles(&app), vec!["New"]);
    assert_eq!(app.bookmarks().unwrap().get(&row.id).unwrap().url, "https://example.com");
    assert!(app.form().editing_id().is_none());
}

#[tokio::test]
async fn test_delete_asks_first() {
    let server = MemoryServer::new();
    let row = server.seed("Doomed", "https://example.com", "alice");
    let mut app = signed_in_app(&server, "alice").await;

    let mut no = |_: &str| false;
    assert_eq!(app.delete(&row.id, &mut no).await.unwrap(), DeleteOutcome::Cancelled);
    assert_eq!(titles(&app), vec!["Doomed"]);

    let mut yes = |_: &str| true;
    assert_eq!(app.delete(&row.id, &mut yes).await.unwrap(), DeleteOutcome::Deleted);
    app.drain_events().await;
    assert!(titles(&app).is_empty());
    assert!(server.rows().is_empty());
}

#[tokio::test]
async fn test_commands_signed_out_fail_with_notice() {
    let server = MemoryServer::new();
    let mut app = new_app(&server);
    app.mount().await;
    app.set_title("Example");
    app.set_url("https://example.com");

    assert!(matches!(app.submit().await, Err(CommandError::NotSignedIn)));
    assert_eq!(app.notices().len(), 1);
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn test_validation_failure_is_reported_not_sent() {
    let server = MemoryServer::new();
    let mut app = signed_in_app(&server, "alice").await;
    let before = server.request_count();

    assert!(matches!(app.submit().await, Err(CommandError::Validation(_))));
    assert_eq!(server.request_count(), before);
    assert_eq!(app.take_notices()[0].message, "Title is required");
}

// ─── Live updates ───

#[tokio::test]
async fn test_changes_from_another_session_appear() {
    let server = MemoryServer::new();
    let mut app = signed_in_app(&server, "alice").await;
    let phone = server.client();
    phone.exchange_code("alice").await.unwrap();

    let created = phone
        .insert(&NewBookmark {
            title: "From phone".to_string(),
            url: "https://phone.example".to_string(),
            user_id: "alice".to_string(),
        })
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), app.next_event())
        .await
        .expect("push should arrive");
    assert!(matches!(event, AppEvent::Feed(_)));
    assert!(app.handle_event(event).await);
    assert_eq!(titles(&app), vec!["From phone"]);

    phone
        .update(
            &created.id,
            "alice",
            &BookmarkPatch {
                title: "Renamed on phone".to_string(),
                url: created.url.clone(),
            },
        )
        .await
        .unwrap();
    app.drain_events().await;
    assert_eq!(titles(&app), vec!["Renamed on phone"]);
}

#[tokio::test]
async fn test_remote_delete_of_edit_target_leaves_edit_mode() {
    let server = MemoryServer::new();
    let row = server.seed("Shared", "https://example.com", "alice");
    let mut app = signed_in_app(&server, "alice").await;
    app.start_edit(&row.id).unwrap();

    let phone = server.client();
    phone.exchange_code("alice").await.unwrap();
    phone.delete(&row.id, "alice").await.unwrap();
    app.drain_events().await;

    assert!(titles(&app).is_empty());
    assert!(app.form().editing_id().is_none());
}

#[tokio::test]
async fn test_reconnect_refetches_list() {
    let server = MemoryServer::new();
    let mut app = signed_in_app(&server, "alice").await;
    let before = server.request_count();

    server.simulate_reconnect();
    app.drain_events().await;
    assert_eq!(server.request_count(), before + 1);
    assert!(app.is_live());
}

#[tokio::test]
async fn test_unmount_stops_everything() {
    let server = MemoryServer::new();
    let mut app = signed_in_app(&server, "alice").await;
    app.unmount();
    assert!(!app.is_live());
    assert_eq!(server.subscriber_count(), 0);
    assert!(app.try_next_event().is_none());
}

#[tokio::test]
async fn test_view_serializes_with_screen_tag() {
    let server = MemoryServer::new();
    let app = signed_in_app(&server, "alice").await;
    let value = serde_json::to_value(app.view()).unwrap();
    assert_eq!(value["screen"], "signed_in");
    assert_eq!(value["user"]["id"], "alice");
    assert_eq!(value["live"], true);
    assert_eq!(value["form"]["submit_label"], "Add Bookmark");
}
