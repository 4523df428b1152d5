//! Unit tests for the add/edit form and its edit-mode state machine.

use chrono::Utc;
use rstest::rstest;
use smartmarks::managers::edit_form::*;
use smartmarks::types::bookmark::Bookmark;
use smartmarks::types::errors::{FormError, ValidationError};

fn bookmark(id: &str) -> Bookmark {
    Bookmark {
        id: id.to_string(),
        title: format!("Title {}", id),
        url: format!("https://example.com/{}", id),
        user_id: "alice".to_string(),
        created_at: Utc::now(),
    }
}

// ─── Validation ───

#[rstest]
#[case("", "https://example.com", ValidationError::EmptyTitle)]
#[case("   ", "https://example.com", ValidationError::EmptyTitle)]
#[case("Example", "", ValidationError::EmptyUrl)]
#[case("Example", "  ", ValidationError::EmptyUrl)]
#[case("Example", "example.com", ValidationError::InvalidUrl("example.com".to_string()))]
#[case("Example", "ftp://example.com", ValidationError::InvalidUrl("ftp://example.com".to_string()))]
fn test_validate_rejects(#[case] title: &str, #[case] url: &str, #[case] expected: ValidationError) {
    assert_eq!(validate_fields(title, url), Err(expected));
}

#[test]
fn test_validate_trims_fields() {
    let draft = validate_fields("  Example ", " https://example.com ").unwrap();
    assert_eq!(draft.title, "Example");
    assert_eq!(draft.url, "https://example.com");
}

// ─── Edit mode ───

#[test]
fn test_new_form_is_idle_and_empty() {
    let form = BookmarkForm::new();
    assert_eq!(form.mode(), &EditMode::Idle);
    assert_eq!(form.title(), "");
    assert_eq!(form.url(), "");
    assert_eq!(form.heading(), HEADING_ADD);
    assert_eq!(form.submit_label(), LABEL_ADD);
}

#[test]
fn test_start_edit_loads_fields() {
    let mut form = BookmarkForm::new();
    form.start_edit(&bookmark("a")).unwrap();
    assert_eq!(form.editing_id(), Some("a"));
    assert_eq!(form.title(), "Title a");
    assert_eq!(form.url(), "https://example.com/a");
    assert_eq!(form.heading(), HEADING_EDIT);
    assert_eq!(form.submit_label(), LABEL_UPDATE);
}

#[test]
fn test_only_one_bookmark_edited_at_a_time() {
    let mut form = BookmarkForm::new();
    form.start_edit(&bookmark("a")).unwrap();
    assert_eq!(
        form.start_edit(&bookmark("b")),
        Err(FormError::EditInProgress("a".to_string()))
    );
    assert!(form.can_start_edit("a"));
    assert!(!form.can_start_edit("b"));
    // Re-entering the same target reloads it.
    assert!(form.start_edit(&bookmark("a")).is_ok());
}

#[test]
fn test_cancel_returns_to_idle_and_clears() {
    let mut form = BookmarkForm::new();
    form.start_edit(&bookmark("a")).unwrap();
    form.cancel();
    assert_eq!(form.mode(), &EditMode::Idle);
    assert_eq!(form.title(), "");
    assert!(form.can_start_edit("b"));
}

// ─── Submit lifecycle ───

#[test]
fn test_submitting_blocks_edits_and_second_submit() {
    let mut form = BookmarkForm::new();
    form.begin_submit().unwrap();
    assert!(form.is_submitting());
    assert_eq!(form.submit_label(), LABEL_SAVING);
    assert_eq!(form.begin_submit(), Err(FormError::Busy));
    assert_eq!(form.start_edit(&bookmark("a")), Err(FormError::Busy));
    assert!(!form.can_start_edit("a"));
}

#[test]
fn test_successful_create_clears_fields() {
    let mut form = BookmarkForm::new();
    form.set_title("Example");
    form.set_url("https://example.com");
    form.begin_submit().unwrap();
    form.finish_submit(true);
    assert!(!form.is_submitting());
    assert_eq!(form.title(), "");
    assert_eq!(form.url(), "");
}

#[test]
fn test_failed_create_keeps_fields() {
    let mut form = BookmarkForm::new();
    form.set_title("Example");
    form.set_url("https://example.com");
    form.begin_submit().unwrap();
    form.finish_submit(false);
    assert_eq!(form.title(), "Example");
    assert_eq!(form.url(), "https://example.com");
}

#[rstest]
#[case(true)]
#[case(false)]
fn test_edit_always_returns_to_idle(#[case] succeeded: bool) {
    let mut form = BookmarkForm::new();
    form.start_edit(&bookmark("a")).unwrap();
    form.set_title("Renamed");
    form.begin_submit().unwrap();
    form.finish_submit(succeeded);
    assert_eq!(form.mode(), &EditMode::Idle);
    assert_eq!(form.title(), "");
}

#[test]
fn test_forget_target_only_for_current_target() {
    let mut form = BookmarkForm::new();
    form.start_edit(&bookmark("a")).unwrap();
    form.forget_target("b");
    assert_eq!(form.editing_id(), Some("a"));
    form.forget_target("a");
    assert_eq!(form.editing_id(), None);
}

#[test]
fn test_edit_mode_serializes_with_tag() {
    let value = serde_json::to_value(EditMode::Editing { target_id: "a".to_string() }).unwrap();
    assert_eq!(value, serde_json::json!({"mode": "editing", "target_id": "a"}));
}
