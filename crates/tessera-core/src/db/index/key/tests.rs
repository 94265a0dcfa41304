use crate::{
    db::index::key::{IndexKey, KeyRange},
    value::Value,
};
use proptest::prelude::*;
use std::{cmp::Ordering, collections::BTreeSet};

fn key2(a: i64, b: i64) -> IndexKey {
    IndexKey::new([Value::Int(a), Value::Int(b)])
}

fn grid(n: i64) -> BTreeSet<IndexKey> {
    (0..n)
        .flat_map(|a| (0..n).map(move |b| key2(a, b)))
        .collect()
}

fn scan(keys: &BTreeSet<IndexKey>, range: &KeyRange) -> Vec<IndexKey> {
    if range.is_empty() {
        return Vec::new();
    }
    keys.range(range.as_bounds()).cloned().collect()
}

#[test]
fn composite_keys_order_lexicographically() {
    assert!(key2(1, 9) < key2(2, 0));
    assert!(key2(2, 0) < key2(2, 1));
}

#[test]
fn null_components_sort_lowest() {
    let with_null = IndexKey::new([Value::Int(1), Value::Null]);
    assert!(with_null < key2(1, i64::MIN));
    assert!(with_null.has_null());
}

#[test]
fn prefix_comparison_truncates_to_shorter_arity() {
    let partial = IndexKey::simple(2);
    assert_eq!(partial.cmp_prefix(&key2(2, 7)), Ordering::Equal);
    assert_eq!(key2(3, 0).cmp_prefix(&partial), Ordering::Greater);
    assert!(key2(2, 7).starts_with(&partial));
}

#[test]
fn composite_between_counts_grid_cells() {
    // 10x10 grid, between [2,5] and [5,6]: row 2 cols 5..9, rows 3-4 full, row 5 cols 0..6.
    let keys = grid(10);
    let range = KeyRange::between(2, Some(&key2(2, 5)), true, Some(&key2(5, 6)), true);
    let hits = scan(&keys, &range);

    assert_eq!(hits.len(), 5 + 10 + 10 + 7);
    assert_eq!(hits.first(), Some(&key2(2, 5)));
    assert_eq!(hits.last(), Some(&key2(5, 6)));
    assert!(hits.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn partial_bounds_cover_whole_prefix_groups() {
    let keys = grid(10);
    let lo = IndexKey::simple(2);
    let hi = IndexKey::simple(4);

    let inclusive = scan(&keys, &KeyRange::between(2, Some(&lo), true, Some(&hi), true));
    assert_eq!(inclusive.len(), 30);

    let exclusive = scan(&keys, &KeyRange::between(2, Some(&lo), false, Some(&hi), false));
    assert_eq!(exclusive, (0..10).map(|b| key2(3, b)).collect::<Vec<_>>());
}

#[test]
fn prefix_range_includes_null_completions() {
    let mut keys = grid(3);
    keys.insert(IndexKey::new([Value::Int(1), Value::Null]));

    let hits = scan(&keys, &KeyRange::prefix(2, &IndexKey::simple(1)));
    assert_eq!(hits.len(), 4);
    assert!(hits[0].has_null());
}

#[test]
fn inverted_and_degenerate_ranges_are_empty() {
    let inverted = KeyRange::between(1, Some(&IndexKey::simple(5)), true, Some(&IndexKey::simple(1)), true);
    assert!(inverted.is_empty());

    let point_open = KeyRange::between(1, Some(&IndexKey::simple(3)), false, Some(&IndexKey::simple(3)), true);
    assert!(point_open.is_empty());

    let point = KeyRange::between(1, Some(&IndexKey::simple(3)), true, Some(&IndexKey::simple(3)), true);
    assert!(!point.is_empty());
    assert!(point.contains(&IndexKey::simple(3)));
    assert!(!KeyRange::all().is_empty());
}

#[test]
fn display_renders_simple_and_composite_keys() {
    assert_eq!(IndexKey::simple(7).to_string(), "7");
    assert_eq!(
        IndexKey::new([Value::Int(1), Value::Text("a".into())]).to_string(),
        "[1, 'a']"
    );
}

proptest! {
    #[test]
    fn partial_scan_equals_union_of_completions(
        keys in prop::collection::btree_set((0i64..6, 0i64..6), 0..30),
        prefix in 0i64..6,
    ) {
        let stored: BTreeSet<IndexKey> = keys.iter().map(|(a, b)| key2(*a, *b)).collect();
        let hits = scan(&stored, &KeyRange::prefix(2, &IndexKey::simple(prefix)));

        let expected: Vec<IndexKey> = stored
            .iter()
            .filter(|k| k.starts_with(&IndexKey::simple(prefix)))
            .cloned()
            .collect();
        prop_assert_eq!(hits, expected);
    }

    #[test]
    fn range_contains_agrees_with_scan(
        keys in prop::collection::btree_set((0i64..5, 0i64..5), 0..25),
        lo in (0i64..5, 0i64..5),
        hi in (0i64..5, 0i64..5),
        lo_incl in any::<bool>(),
        hi_incl in any::<bool>(),
    ) {
        let stored: BTreeSet<IndexKey> = keys.iter().map(|(a, b)| key2(*a, *b)).collect();
        let range = KeyRange::between(2, Some(&key2(lo.0, lo.1)), lo_incl, Some(&key2(hi.0, hi.1)), hi_incl);

        let scanned = scan(&stored, &range);
        let filtered: Vec<IndexKey> = stored.iter().filter(|k| range.contains(k)).cloned().collect();
        prop_assert_eq!(scanned, filtered);
    }
}
