//! Local, owner-scoped bookmark list.
//!
//! Rows are keyed by id: inserting an id that is already present replaces the
//! row, so an optimistic insert and its push echo collapse into one entry.
//! Ids removed locally or by a delete event are remembered until the next
//! [`BookmarkList::replace_all`] so a late echo cannot bring them back. The
//! tombstone set therefore holds at most the ids deleted since the last full
//! fetch; a reconnect refetch resets it.

use std::collections::HashSet;

use crate::types::bookmark::Bookmark;
use crate::types::change::ChangeEvent;

#[derive(Debug, Clone)]
pub struct BookmarkList {
    owner: String,
    rows: Vec<Bookmark>,
    tombstones: HashSet<String>,
}

/// Newest first; equal timestamps fall back to id so the order is total.
fn display_order(a: &Bookmark, b: &Bookmark) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

impl BookmarkList {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            rows: Vec::new(),
            tombstones: HashSet::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Replaces the whole list with a fresh fetch. Foreign rows are dropped,
    /// duplicate ids keep the last occurrence, tombstones are forgotten.
    pub fn replace_all(&mut self, rows: Vec<Bookmark>) {
        self.tombstones.clear();
        self.rows.clear();
        for row in rows {
            self.upsert(row);
        }
    }

    /// Inserts or replaces the row with the same id. Returns whether the list changed.
    pub fn upsert(&mut self, bookmark: Bookmark) -> bool {
        if bookmark.user_id != self.owner {
            tracing::warn!(id = %bookmark.id, "ignoring bookmark of another owner");
            return false;
        }
        if self.tombstones.contains(&bookmark.id) {
            tracing::debug!(id = %bookmark.id, "ignoring echo of deleted bookmark");
            return false;
        }

        if let Some(existing) = self.rows.iter_mut().find(|b| b.id == bookmark.id) {
            if *existing == bookmark {
                return false;
            }
            *existing = bookmark;
        } else {
            self.rows.push(bookmark);
        }
        self.rows.sort_by(display_order);
        true
    }

    /// Removes the row and tombstones its id.
    pub fn remove(&mut self, id: &str) -> Option<Bookmark> {
        self.tombstones.insert(id.to_string());
        let index = self.rows.iter().position(|b| b.id == id)?;
        Some(self.rows.remove(index))
    }

    /// Applies one push notification. Returns whether the list changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match event {
            ChangeEvent::Insert(bookmark) | ChangeEvent::Update(bookmark) => {
                self.upsert(bookmark.clone())
            }
            ChangeEvent::Delete { id } => self.remove(id).is_some(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Bookmark> {
        self.rows.iter().find(|b| b.id == id)
    }

    /// Row at display position `index`.
    pub fn nth(&self, index: usize) -> Option<&Bookmark> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bookmark> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
