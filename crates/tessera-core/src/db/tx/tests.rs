use super::*;
use crate::{
    db::{
        index::{IndexKind, KeyRange},
        schema::{ClassDef, Property},
    },
    test_support::{capture, simple_index},
    value::{Value, ValueType},
};
use proptest::prelude::*;
use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
};

fn item_db(kind: IndexKind) -> Database {
    let db = Database::new();
    db.create_class(ClassDef::new("Item").property(Property::new("a", ValueType::Int)))
        .unwrap();
    db.create_index(simple_index("item_a", kind, "Item", "a", ValueType::Int))
        .unwrap();

    db
}

fn key(a: i64) -> IndexKey {
    IndexKey::new([Value::Int(a)])
}

fn item(a: i64) -> Document {
    Document::new("Item").with("a", a)
}

fn all_entries(db: &Database) -> Vec<IndexEntry> {
    db.index("item_a")
        .unwrap()
        .entries_between(&KeyRange::all(), true)
        .unwrap()
}

fn query_a(a: i64) -> Query {
    Query::select("Item").filter(crate::db::query::Predicate::eq("a", a))
}

#[test]
fn buffered_writes_are_visible_only_inside_the_transaction() {
    let db = item_db(IndexKind::NotUnique);
    let mut tx = db.begin();
    let rid = tx.insert(item(7)).unwrap();

    assert_eq!(tx.index_get("item_a", &key(7)).unwrap(), BTreeSet::from([rid]));
    assert_eq!(tx.query(&query_a(7)).unwrap().len(), 1);
    assert!(db.index("item_a").unwrap().get(&key(7)).unwrap().is_empty());
    assert!(db.query(&query_a(7)).unwrap().is_empty());
    assert!(db.load(rid).is_none());

    tx.commit().unwrap();
    assert_eq!(db.query(&query_a(7)).unwrap().len(), 1);
    assert_eq!(db.load(rid).map(|d| d.version()), Some(1));
}

#[test]
fn rollback_leaves_stores_as_they_were() {
    let db = item_db(IndexKind::NotUnique);
    let kept = db.insert(item(1)).unwrap();
    db.insert(item(2)).unwrap();
    let before = all_entries(&db);

    let mut tx = db.begin();
    tx.insert(item(3)).unwrap();
    tx.delete(kept).unwrap();
    tx.index_clear("item_a").unwrap();
    assert_eq!(tx.index_len("item_a").unwrap(), 0);
    tx.rollback().unwrap();

    assert_eq!(all_entries(&db), before);
    assert_eq!(db.record_count(), 2);
    assert!(db.load(kept).is_some());
}

#[test]
fn clear_hides_earlier_puts_and_commit_matches_the_view() {
    let db = item_db(IndexKind::NotUnique);
    let first = RecordId::new(0, 1);
    let second = RecordId::new(2, 3);

    let mut tx = db.begin();
    tx.index_put("item_a", key(1), first).unwrap();
    tx.index_clear("item_a").unwrap();
    tx.index_put("item_a", key(2), second).unwrap();

    let inside = tx
        .index_entries_for_keys("item_a", &[key(1), key(2)], true)
        .unwrap();
    assert_eq!(inside, vec![(key(2), second)]);
    tx.commit().unwrap();

    let committed = db
        .index("item_a")
        .unwrap()
        .entries_for_keys(&[key(1), key(2)], true)
        .unwrap();
    assert_eq!(committed, inside);
}

#[test]
fn raw_puts_validate_key_shape_before_logging() {
    let db = item_db(IndexKind::NotUnique);
    let mut tx = db.begin();

    let err = tx
        .index_put("item_a", IndexKey::new([Value::Int(1), Value::Int(2)]), RecordId::new(0, 0))
        .unwrap_err();
    assert!(err.is_invalid_key());
    assert_eq!(tx.index_len("item_a").unwrap(), 0);
    assert!(tx.index_put("missing", key(1), RecordId::new(0, 0)).unwrap_err().is_not_found());
}

#[test]
fn unique_conflict_aborts_the_whole_commit() {
    let db = item_db(IndexKind::Unique);
    db.insert(item(1)).unwrap();
    let before = all_entries(&db);

    let mut tx = db.begin();
    tx.insert(item(5)).unwrap();
    // the duplicate is only detected when the log is folded
    tx.insert(item(1)).unwrap();
    let err = tx.commit().unwrap_err();

    assert!(err.is_unique_violation());
    assert_eq!(all_entries(&db), before);
    assert_eq!(db.record_count(), 1);
}

#[test]
fn duplicate_buffered_in_two_transactions_fails_the_second_commit() {
    let db = item_db(IndexKind::Unique);
    let mut first = db.begin();
    let mut second = db.begin();
    first.insert(item(4)).unwrap();
    second.insert(item(4)).unwrap();

    first.commit().unwrap();
    let err = second.commit().unwrap_err();
    assert!(err.is_unique_violation());
    assert!(!err.is_retryable());
    assert_eq!(all_entries(&db).len(), 1);
}

#[test]
fn concurrent_update_is_a_retryable_conflict() {
    let db = item_db(IndexKind::NotUnique);
    let rid = db.insert(item(1)).unwrap();

    let mut first = db.begin();
    let mut second = db.begin();
    let doc = first.load(rid).unwrap();
    first.save(doc.clone().with("a", 2)).unwrap();
    second.save(doc.with("a", 3)).unwrap();
    first.commit().unwrap();

    let (result, events) = capture(|| second.commit());
    let err = result.unwrap_err();
    assert!(err.is_retryable());
    assert!(events.contains(&"TxConflict".to_string()));
    assert!(events.contains(&"TxRollback".to_string()));

    assert_eq!(db.load(rid).unwrap().get("a"), &Value::Int(2));
    assert_eq!(all_entries(&db), vec![(key(2), rid)]);
}

#[test]
fn stale_version_is_rejected_on_save() {
    let db = item_db(IndexKind::NotUnique);
    let rid = db.insert(item(1)).unwrap();
    let stale = db.load(rid).unwrap();
    db.save(stale.clone().with("a", 2)).unwrap();

    let err = db.save(stale.with("a", 3)).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(db.load(rid).unwrap().version(), 2);
}

#[test]
fn dropping_an_active_transaction_rolls_it_back() {
    let db = item_db(IndexKind::NotUnique);

    let ((), events) = capture(|| {
        let mut tx = db.begin();
        tx.insert(item(9)).unwrap();
    });

    assert!(events.contains(&"TxRollback".to_string()));
    assert!(all_entries(&db).is_empty());
    assert_eq!(db.record_count(), 0);
}

#[test]
fn finished_transactions_reject_further_use() {
    let db = item_db(IndexKind::NotUnique);
    let tx = db.begin();
    let id = tx.id();
    tx.commit().unwrap();

    let mut next = db.begin();
    assert!(next.id() > id);
    next.discard();
    assert_eq!(next.state(), TxState::RolledBack);
    assert!(next.insert(item(1)).is_err());
}

#[test]
fn updates_move_keys_inside_the_overlay() {
    let db = item_db(IndexKind::NotUnique);
    let rid = db.insert(item(1)).unwrap();

    let mut tx = db.begin();
    let doc = tx.load(rid).unwrap();
    tx.save(doc.with("a", 8)).unwrap();
    assert!(tx.index_get("item_a", &key(1)).unwrap().is_empty());
    assert_eq!(tx.index_get("item_a", &key(8)).unwrap(), BTreeSet::from([rid]));
    assert_eq!(tx.index_len("item_a").unwrap(), 1);
    tx.commit().unwrap();

    assert_eq!(all_entries(&db), vec![(key(8), rid)]);
}

///
/// Op
///

#[derive(Clone, Debug)]
enum Op {
    Put(i64, i64),
    Remove(i64, Option<i64>),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => (0..6_i64, 0..4_i64).prop_map(|(k, r)| Op::Put(k, r)),
        3 => (0..6_i64, proptest::option::of(0..4_i64)).prop_map(|(k, r)| Op::Remove(k, r)),
        1 => Just(Op::Clear),
    ]
}

fn rid(position: i64) -> RecordId {
    RecordId::new(0, position)
}

fn seeded(seed: &[(i64, i64)]) -> Database {
    let db = item_db(IndexKind::NotUnique);
    let handle = db.index("item_a").unwrap();
    for (k, r) in seed {
        handle.put(key(*k), rid(*r)).unwrap();
    }

    db
}

proptest! {
    #[test]
    fn overlay_view_equals_direct_replay(
        seed in proptest::collection::vec((0..6_i64, 0..4_i64), 0..8),
        ops in proptest::collection::vec(op(), 0..24),
    ) {
        let buffered = seeded(&seed);
        let direct = seeded(&seed);
        let direct_index = direct.index("item_a").unwrap();

        let mut tx = buffered.begin();
        for op in &ops {
            match op {
                Op::Put(k, r) => {
                    tx.index_put("item_a", key(*k), rid(*r)).unwrap();
                    direct_index.put(key(*k), rid(*r)).unwrap();
                }
                Op::Remove(k, r) => {
                    tx.index_remove("item_a", key(*k), r.map(rid)).unwrap();
                    direct_index.remove(&key(*k), r.map(rid)).unwrap();
                }
                Op::Clear => {
                    tx.index_clear("item_a").unwrap();
                    direct_index.clear();
                }
            }
        }

        let expected = all_entries(&direct);
        let view = tx.index_entries_between("item_a", &KeyRange::all(), true).unwrap();
        prop_assert_eq!(&view, &expected);
        prop_assert_eq!(tx.index_len("item_a").unwrap(), expected.len());

        let descending = tx.index_entries_between("item_a", &KeyRange::all(), false).unwrap();
        let mut reversed = expected.clone();
        reversed.reverse();
        prop_assert_eq!(descending, reversed);

        tx.commit().unwrap();
        prop_assert_eq!(all_entries(&buffered), expected);
    }
}

const PAIR: [&str; 2] = ["pair_a", "pair_b"];

fn pair_db() -> Database {
    let db = Database::new();
    db.create_class(
        ClassDef::new("Pair")
            .property(Property::new("a", ValueType::Int))
            .property(Property::new("b", ValueType::Int)),
    )
    .unwrap();
    db.create_index(simple_index("pair_a", IndexKind::NotUnique, "Pair", "a", ValueType::Int))
        .unwrap();
    db.create_index(simple_index("pair_b", IndexKind::Unique, "Pair", "b", ValueType::Int))
        .unwrap();
    for i in 0..20_i64 {
        db.insert(Document::new("Pair").with("a", i).with("b", i)).unwrap();
    }

    db
}

fn pair_entries(tx: &Transaction<'_>) -> [Vec<IndexEntry>; 2] {
    PAIR.map(|name| tx.index_entries_between(name, &KeyRange::all(), true).unwrap())
}

#[test]
fn concurrent_readers_see_a_commit_whole_or_not_at_all() {
    let db = pair_db();
    let pre = pair_entries(&db.begin());

    let mut tx = db.begin();
    for i in 20..60_i64 {
        tx.insert(Document::new("Pair").with("a", i % 7).with("b", -i))
            .unwrap();
    }
    tx.delete(pre[0][0].1).unwrap();
    let moved = tx.load(pre[0][1].1).unwrap();
    tx.save(moved.with("a", 1000).with("b", 1000)).unwrap();
    let post = pair_entries(&tx);
    assert_ne!(pre, post);

    let committed = AtomicBool::new(false);
    let started = AtomicUsize::new(0);
    let (db_ref, pre_ref, post_ref) = (&db, &pre, &post);
    let (committed_ref, started_ref) = (&committed, &started);

    thread::scope(|s| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(move || {
                    // false while the pre-commit state is seen, true after
                    let mut seen = Vec::new();
                    let mut rounds = 0;
                    loop {
                        let last_round = committed_ref.load(Ordering::Acquire);
                        let reader = db_ref.begin();
                        for (i, name) in PAIR.into_iter().enumerate() {
                            let (pre, post) = (&pre_ref[i], &post_ref[i]);

                            let len = reader.index_len(name).unwrap();
                            assert!(len == pre.len() || len == post.len(), "{name}: len {len}");
                            seen.push(len == post.len());

                            let entries = reader
                                .index_entries_between(name, &KeyRange::all(), true)
                                .unwrap();
                            assert!(entries == *pre || entries == *post, "{name}: partial entries");
                            seen.push(entries == *post);
                        }
                        rounds += 1;
                        if rounds == 1 {
                            started_ref.fetch_add(1, Ordering::AcqRel);
                        }
                        if last_round {
                            break;
                        }
                    }

                    seen
                })
            })
            .collect();

        while started.load(Ordering::Acquire) < 4 {
            thread::yield_now();
        }
        tx.commit().unwrap();
        committed.store(true, Ordering::Release);

        for reader in readers {
            let seen = reader.join().unwrap();
            assert!(seen.windows(2).all(|w| w[0] <= w[1]), "reverted to the pre-commit state");
            assert_eq!(seen.first(), Some(&false));
            assert_eq!(seen.last(), Some(&true));
        }
    });

    assert_eq!(pair_entries(&db.begin()), post);
}
