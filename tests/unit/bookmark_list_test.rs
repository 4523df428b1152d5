//! Unit tests for the keyed local bookmark list.
//!
//! Covers display order, owner filtering, idempotent upserts, tombstones and
//! applying pushed changes.

use chrono::{TimeZone, Utc};
use smartmarks::managers::bookmark_list::BookmarkList;
use smartmarks::types::bookmark::Bookmark;
use smartmarks::types::change::ChangeEvent;

fn bookmark(id: &str, owner: &str, created_secs: i64) -> Bookmark {
    Bookmark {
        id: id.to_string(),
        title: format!("Title {}", id),
        url: format!("https://example.com/{}", id),
        user_id: owner.to_string(),
        created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
    }
}

fn ids(list: &BookmarkList) -> Vec<&str> {
    list.iter().map(|b| b.id.as_str()).collect()
}

// === Loading ===

#[test]
fn test_replace_all_sorts_newest_first() {
    let mut list = BookmarkList::new("alice");
    list.replace_all(vec![
        bookmark("a", "alice", 100),
        bookmark("c", "alice", 300),
        bookmark("b", "alice", 200),
    ]);
    assert_eq!(ids(&list), vec!["c", "b", "a"]);
}

#[test]
fn test_equal_timestamps_are_ordered_by_id() {
    let mut list = BookmarkList::new("alice");
    list.replace_all(vec![bookmark("y", "alice", 100), bookmark("x", "alice", 100)]);
    assert_eq!(ids(&list), vec!["x", "y"]);
}

#[test]
fn test_replace_all_drops_foreign_rows() {
    let mut list = BookmarkList::new("alice");
    list.replace_all(vec![bookmark("a", "alice", 100), bookmark("m", "mallory", 200)]);
    assert_eq!(ids(&list), vec!["a"]);
    assert_eq!(list.owner(), "alice");
}

#[test]
fn test_replace_all_clears_tombstones() {
    let mut list = BookmarkList::new("alice");
    list.upsert(bookmark("a", "alice", 100));
    list.remove("a");
    list.replace_all(vec![bookmark("a", "alice", 100)]);
    assert_eq!(list.len(), 1);
}

// === Upsert / remove ===

#[test]
fn test_upsert_same_row_twice_is_a_noop() {
    let mut list = BookmarkList::new("alice");
    assert!(list.upsert(bookmark("a", "alice", 100)));
    assert!(!list.upsert(bookmark("a", "alice", 100)));
    assert_eq!(list.len(), 1);
}

#[test]
fn test_upsert_replaces_existing_row() {
    let mut list = BookmarkList::new("alice");
    list.upsert(bookmark("a", "alice", 100));
    let mut renamed = bookmark("a", "alice", 100);
    renamed.title = "Renamed".to_string();
    assert!(list.upsert(renamed));
    assert_eq!(list.len(), 1);
    assert_eq!(list.get("a").unwrap().title, "Renamed");
}

#[test]
fn test_removed_row_is_not_resurrected() {
    let mut list = BookmarkList::new("alice");
    list.upsert(bookmark("a", "alice", 100));
    assert!(list.remove("a").is_some());
    assert!(!list.upsert(bookmark("a", "alice", 100)));
    assert!(list.is_empty());
}

#[test]
fn test_remove_unknown_returns_none() {
    let mut list = BookmarkList::new("alice");
    assert!(list.remove("ghost").is_none());
}

#[test]
fn test_nth_follows_display_order() {
    let mut list = BookmarkList::new("alice");
    list.upsert(bookmark("old", "alice", 1));
    list.upsert(bookmark("new", "alice", 2));
    assert_eq!(list.nth(0).unwrap().id, "new");
    assert_eq!(list.nth(1).unwrap().id, "old");
    assert!(list.nth(2).is_none());
}

// === Pushed changes ===

#[test]
fn test_apply_insert_update_delete() {
    let mut list = BookmarkList::new("alice");
    assert!(list.apply(&ChangeEvent::Insert(bookmark("a", "alice", 100))));

    let mut updated = bookmark("a", "alice", 100);
    updated.url = "https://example.org".to_string();
    assert!(list.apply(&ChangeEvent::Update(updated)));
    assert_eq!(list.get("a").unwrap().url, "https://example.org");

    assert!(list.apply(&ChangeEvent::Delete { id: "a".to_string() }));
    assert!(list.is_empty());
    assert!(!list.apply(&ChangeEvent::Delete { id: "a".to_string() }));
}

#[test]
fn test_update_for_unknown_row_is_inserted() {
    let mut list = BookmarkList::new("alice");
    assert!(list.apply(&ChangeEvent::Update(bookmark("late", "alice", 100))));
    assert_eq!(ids(&list), vec!["late"]);
}

#[test]
fn test_foreign_insert_is_ignored() {
    let mut list = BookmarkList::new("alice");
    assert!(!list.apply(&ChangeEvent::Insert(bookmark("m", "mallory", 100))));
    assert!(list.is_empty());
}
