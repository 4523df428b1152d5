//! Property-based tests for the keyed bookmark list.
//!
//! Arbitrary sequences of upserts, pushed changes and removals are applied to
//! a list and to a plain model; after every step the list must hold exactly
//! the model's rows, in display order, with no duplicate ids, no rows of
//! another owner and no resurrected deletions.

use std::collections::{HashMap, HashSet};

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use smartmarks::managers::bookmark_list::BookmarkList;
use smartmarks::types::bookmark::Bookmark;
use smartmarks::types::change::ChangeEvent;

const OWNER: &str = "alice";

#[derive(Debug, Clone)]
enum Op {
    Upsert(Bookmark),
    Push(ChangeEvent),
    Remove(String),
}

/// Small id space so operations collide often.
fn arb_id() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|n| format!("b-{}", n))
}

fn arb_bookmark() -> impl Strategy<Value = Bookmark> {
    (
        arb_id(),
        prop_oneof![4 => Just(OWNER), 1 => Just("bob")],
        0i64..50,
        "[a-z]{1,8}",
    )
        .prop_map(|(id, owner, secs, title)| Bookmark {
            url: format!("https://{}.example", title),
            title,
            id,
            user_id: owner.to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        })
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => arb_bookmark().prop_map(Op::Upsert),
        2 => arb_bookmark().prop_map(|b| Op::Push(ChangeEvent::Insert(b))),
        2 => arb_bookmark().prop_map(|b| Op::Push(ChangeEvent::Update(b))),
        1 => arb_id().prop_map(|id| Op::Push(ChangeEvent::Delete { id })),
        1 => arb_id().prop_map(Op::Remove),
    ]
}

#[derive(Default)]
struct Model {
    rows: HashMap<String, Bookmark>,
    deleted: HashSet<String>,
}

impl Model {
    fn upsert(&mut self, bookmark: &Bookmark) {
        if bookmark.user_id == OWNER && !self.deleted.contains(&bookmark.id) {
            self.rows.insert(bookmark.id.clone(), bookmark.clone());
        }
    }

    fn remove(&mut self, id: &str) {
        self.deleted.insert(id.to_string());
        self.rows.remove(id);
    }
}

fn check(list: &BookmarkList, model: &Model) -> Result<(), TestCaseError> {
    let rows: Vec<&Bookmark> = list.iter().collect();

    let ids: HashSet<&str> = rows.iter().map(|b| b.id.as_str()).collect();
    prop_assert_eq!(ids.len(), rows.len(), "duplicate ids in list");
    prop_assert_eq!(rows.len(), model.rows.len());

    for pair in rows.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        prop_assert!(
            a.created_at > b.created_at || (a.created_at == b.created_at && a.id < b.id),
            "rows out of order: {} before {}",
            a.id,
            b.id
        );
    }
    for row in &rows {
        prop_assert_eq!(row.user_id.as_str(), OWNER);
        prop_assert!(!model.deleted.contains(&row.id));
        prop_assert_eq!(Some(*row), model.rows.get(&row.id));
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn list_matches_model_after_every_step(ops in proptest::collection::vec(arb_op(), 1..40)) {
        let mut list = BookmarkList::new(OWNER);
        let mut model = Model::default();

        for op in &ops {
            match op {
                Op::Upsert(bookmark) => {
                    list.upsert(bookmark.clone());
                    model.upsert(bookmark);
                }
                Op::Push(event) => {
                    list.apply(event);
                    match event {
                        ChangeEvent::Insert(b) | ChangeEvent::Update(b) => model.upsert(b),
                        ChangeEvent::Delete { id } => model.remove(id),
                    }
                }
                Op::Remove(id) => {
                    list.remove(id);
                    model.remove(id);
                }
            }
            check(&list, &model)?;
        }
    }

    /// Applying the same event twice changes the list at most once.
    #[test]
    fn repeated_event_is_idempotent(bookmark in arb_bookmark()) {
        let mut list = BookmarkList::new(OWNER);
        let event = ChangeEvent::Insert(bookmark.clone());
        let first = list.apply(&event);
        let second = list.apply(&event);
        prop_assert_eq!(first, bookmark.user_id == OWNER);
        prop_assert!(!second);
        prop_assert!(list.len() <= 1);
    }

    /// A full load keeps exactly the owned rows, newest first.
    #[test]
    fn replace_all_keeps_owned_rows_sorted(rows in proptest::collection::vec(arb_bookmark(), 0..20)) {
        let mut list = BookmarkList::new(OWNER);
        list.replace_all(rows.clone());

        let mut model = Model::default();
        for row in &rows {
            model.upsert(row);
        }
        check(&list, &model)?;
    }
}
