use super::*;
use crate::{
    config::PlanCacheConfig,
    db::{
        Database,
        index::{IndexDefinition, IndexField, IndexKey, IndexKind, IndexSpec},
        query::{Query, predicate::normalize},
        record::Document,
        schema::{ClassDef, Property},
    },
    test_support::{capture, composite_index, school_schema, seed_school, simple_index},
    value::{Value, ValueType},
};
use std::sync::Arc;

fn item_db() -> Database {
    let db = Database::new();
    db.create_class(
        ClassDef::new("Item")
            .property(Property::new("a", ValueType::Int))
            .property(Property::new("b", ValueType::Int))
            .property(Property::list("tags", ValueType::Text))
            .property(Property::map("prefs", ValueType::Text)),
    )
    .unwrap();
    for a in 0..4_i64 {
        for b in 0..4_i64 {
            db.insert(Document::new("Item").with("a", a).with("b", b))
                .unwrap();
        }
    }

    db
}

fn best(db: &Database, predicate: Predicate) -> AccessPlan {
    db.prepare(&Query::select("Item").filter(predicate))
        .unwrap()
        .best()
        .clone()
}

fn best_index(plan: &AccessPlan) -> Option<String> {
    plan.indexes().first().map(|i| i.name.clone())
}

#[test]
fn equality_uses_the_single_field_index() {
    let db = item_db();
    db.create_index(simple_index("item_a", IndexKind::NotUnique, "Item", "a", ValueType::Int))
        .unwrap();

    let plan = best(&db, Predicate::eq("a", 2));
    assert_eq!(best_index(&plan).as_deref(), Some("item_a"));
    let AccessPlan::Path(AccessPath::IndexKeys { keys, index }) = plan else {
        panic!("expected key lookup, got {plan}");
    };
    assert_eq!(keys, vec![IndexKey::new([Value::Int(2)])]);
    assert_eq!(index.params, 1);
}

#[test]
fn more_covered_fields_win_then_exact_match() {
    let db = item_db();
    db.create_index(simple_index("item_a", IndexKind::NotUnique, "Item", "a", ValueType::Int))
        .unwrap();
    db.create_index(composite_index(
        "item_ab",
        IndexKind::NotUnique,
        "Item",
        &[("a", ValueType::Int), ("b", ValueType::Int)],
    ))
    .unwrap();

    let both = best(&db, Predicate::eq("a", 1) & Predicate::eq("b", 2));
    assert_eq!(best_index(&both).as_deref(), Some("item_ab"));

    // same coverage; the index the condition matches completely wins
    let one = best(&db, Predicate::eq("a", 1));
    assert_eq!(best_index(&one).as_deref(), Some("item_a"));
}

#[test]
fn composite_prefix_then_range_binds_two_fields() {
    let db = item_db();
    db.create_index(composite_index(
        "item_ab",
        IndexKind::Unique,
        "Item",
        &[("a", ValueType::Int), ("b", ValueType::Int)],
    ))
    .unwrap();

    let plan = best(&db, Predicate::eq("a", 1) & Predicate::gt("b", 1));
    let AccessPlan::Path(AccessPath::IndexRange { index, .. }) = &plan else {
        panic!("expected range, got {plan}");
    };
    assert_eq!(index.params, 2);

    let rows = db
        .query(&Query::select("Item").filter(Predicate::eq("a", 1) & Predicate::gt("b", 1)))
        .unwrap();
    let bs: Vec<_> = rows.iter().map(|d| d.get("b").clone()).collect();
    assert_eq!(bs, vec![Value::Int(2), Value::Int(3)]);
}

#[test]
fn trailing_condition_without_leading_field_is_not_indexed() {
    let db = item_db();
    db.create_index(composite_index(
        "item_ab",
        IndexKind::NotUnique,
        "Item",
        &[("a", ValueType::Int), ("b", ValueType::Int)],
    ))
    .unwrap();

    assert!(best(&db, Predicate::eq("b", 1)).is_full_scan());
}

#[test]
fn composite_ignoring_nulls_needs_a_full_match() {
    let db = item_db();
    let def = IndexDefinition::new(
        "Item",
        [
            IndexField::new("a", ValueType::Int),
            IndexField::new("b", ValueType::Int),
        ],
    )
    .unwrap()
    .with_ignore_nulls(true);
    db.create_index(IndexSpec::new("item_ab", IndexKind::NotUnique, def))
        .unwrap();

    assert!(best(&db, Predicate::eq("a", 1)).is_full_scan());
    assert_eq!(
        best_index(&best(&db, Predicate::eq("a", 1) & Predicate::eq("b", 1))).as_deref(),
        Some("item_ab")
    );
}

#[test]
fn hash_indexes_answer_points_only() {
    let db = item_db();
    db.create_index(simple_index("item_a_hash", IndexKind::NotUniqueHash, "Item", "a", ValueType::Int))
        .unwrap();

    assert!(best(&db, Predicate::gt("a", 1)).is_full_scan());
    assert_eq!(
        best_index(&best(&db, Predicate::eq("a", 1))).as_deref(),
        Some("item_a_hash")
    );
}

#[test]
fn in_list_becomes_sorted_distinct_key_lookups() {
    let db = item_db();
    db.create_index(simple_index("item_a", IndexKind::NotUnique, "Item", "a", ValueType::Int))
        .unwrap();

    let plan = best(&db, Predicate::in_list("a", [3, 1, 1]));
    let AccessPlan::Path(AccessPath::IndexKeys { keys, .. }) = plan else {
        panic!("expected key lookup");
    };
    assert_eq!(
        keys,
        vec![IndexKey::new([Value::Int(1)]), IndexKey::new([Value::Int(3)])]
    );

    let rows = db
        .query(&Query::select("Item").filter(Predicate::in_list("a", [3, 1])))
        .unwrap();
    assert_eq!(rows.len(), 8);
}

#[test]
fn disjunction_is_a_union_only_when_every_branch_is_indexed() {
    let db = item_db();
    db.create_index(simple_index("item_a", IndexKind::NotUnique, "Item", "a", ValueType::Int))
        .unwrap();

    let union = best(&db, Predicate::eq("a", 0) | Predicate::eq("a", 3));
    assert!(matches!(union, AccessPlan::Union(ref paths) if paths.len() == 2));
    let rows = db
        .query(&Query::select("Item").filter(Predicate::eq("a", 0) | Predicate::eq("a", 3)))
        .unwrap();
    assert_eq!(rows.len(), 8);

    let mixed = best(&db, Predicate::eq("a", 0) | Predicate::eq("b", 3));
    assert!(mixed.is_full_scan());
}

#[test]
fn collection_operators_match_collection_modes() {
    let db = item_db();
    let tags = IndexDefinition::new("Item", [IndexField::by_element("tags", ValueType::Text)]).unwrap();
    let prefs = IndexDefinition::new("Item", [IndexField::by_map_key("prefs")]).unwrap();
    db.create_index(IndexSpec::new("item_tags", IndexKind::NotUnique, tags))
        .unwrap();
    db.create_index(IndexSpec::new("item_prefs", IndexKind::NotUnique, prefs))
        .unwrap();

    assert_eq!(
        best_index(&best(&db, Predicate::contains("tags", "red"))).as_deref(),
        Some("item_tags")
    );
    assert_eq!(
        best_index(&best(&db, Predicate::contains_key("prefs", "color"))).as_deref(),
        Some("item_prefs")
    );
    // plain equality never reads an element index
    assert!(best(&db, Predicate::eq("tags", "red")).is_full_scan());
}

#[test]
fn literals_without_a_key_representation_fall_back() {
    let db = item_db();
    db.create_index(simple_index("item_a", IndexKind::NotUnique, "Item", "a", ValueType::Int))
        .unwrap();

    assert!(best(&db, Predicate::eq("a", "not a number")).is_full_scan());
    // text that parses as the declared type still uses the index
    assert_eq!(
        best_index(&best(&db, Predicate::eq("a", "2"))).as_deref(),
        Some("item_a")
    );
}

#[test]
fn is_null_reads_the_null_component_unless_nulls_are_ignored() {
    let db = item_db();
    db.insert(Document::new("Item").with("b", 9)).unwrap();
    db.create_index(composite_index(
        "item_ab",
        IndexKind::NotUnique,
        "Item",
        &[("a", ValueType::Int), ("b", ValueType::Int)],
    ))
    .unwrap();

    let plan = best(&db, Predicate::is_null("a"));
    let AccessPlan::Path(AccessPath::IndexKeys { keys, .. }) = &plan else {
        panic!("expected key lookup, got {plan}");
    };
    assert_eq!(keys, &vec![IndexKey::new([Value::Null])]);

    let rows = db
        .query(&Query::select("Item").filter(Predicate::is_null("a")))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("b"), &Value::Int(9));
}

#[test]
fn dotted_paths_resolve_to_chains() {
    let db = Database::new();
    school_schema(&db);
    seed_school(&db, 3, 6);
    db.create_index(simple_index("student_group", IndexKind::NotUnique, "Student", "group", ValueType::Link))
        .unwrap();
    db.create_index(simple_index("group_curator", IndexKind::NotUniqueHash, "Group", "curator", ValueType::Link))
        .unwrap();
    db.create_index(simple_index("curator_salary", IndexKind::NotUnique, "Curator", "salary", ValueType::Int))
        .unwrap();

    let explain = db
        .explain(&Query::select("Student").filter(Predicate::lt("group.curator.salary", 300)))
        .unwrap();
    assert_eq!(explain.chain_hops, 3);
    assert!(!explain.full_scan);
    assert_eq!(
        explain.involved_indexes.into_iter().collect::<Vec<_>>(),
        vec!["curator_salary", "group_curator", "student_group"]
    );
    assert!(explain.access.starts_with("IndexChain{student_group, group_curator, curator_salary}"));

    // a missing hop index leaves only the full scan
    db.drop_index("group_curator").unwrap();
    let explain = db
        .explain(&Query::select("Student").filter(Predicate::lt("group.curator.salary", 300)))
        .unwrap();
    assert!(explain.full_scan);
}

#[test]
fn explain_reports_between_conversions() {
    let db = item_db();
    db.create_index(simple_index("item_a", IndexKind::NotUnique, "Item", "a", ValueType::Int))
        .unwrap();

    let explain = db
        .explain(
            &Query::select("Item")
                .filter(Predicate::gte("a", 1) & Predicate::lte("a", 2))
                .limit(3),
        )
        .unwrap();
    assert_eq!(explain.range_query_converted_in_between, 1);
    assert_eq!(explain.limit, Some(3));
    assert!(explain.access.starts_with("INDEX item_a RANGE"));

    let plain = db
        .explain(&Query::select("Item").filter(Predicate::eq("a", 1)))
        .unwrap();
    assert_eq!(plain.range_query_converted_in_between, 0);
}

#[test]
fn fingerprints_ignore_neutral_rewrites_but_not_limits() {
    let base = Query::select("Item").filter(Predicate::eq("a", 1));
    let padded = Query::select("ITEM").filter(Predicate::and([Predicate::True, Predicate::eq("a", 1)]));
    let limited = base.clone().limit(5);

    let fp = |q: &Query| fingerprint(q, &normalize(q.predicate()));
    assert_eq!(fp(&base), fp(&padded));
    assert_ne!(fp(&base), fp(&limited));
    assert_eq!(fp(&base).as_hex().len(), 64);
}

#[test]
fn plan_cache_evicts_oldest_first() {
    let mut cache = PlanCache::new(&PlanCacheConfig {
        enabled: true,
        capacity: 2,
    });
    let db = item_db();
    let queries: Vec<Query> = (0..3)
        .map(|i| Query::select("Item").filter(Predicate::eq("a", i)))
        .collect();
    let plans: Vec<Arc<LogicalPlan>> = queries.iter().map(|q| db.prepare(q).unwrap()).collect();

    for plan in &plans {
        cache.insert(plan.fingerprint(), Arc::clone(plan));
    }
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&plans[0].fingerprint()).is_none());
    assert!(cache.get(&plans[2].fingerprint()).is_some());
}

#[test]
fn prepared_plans_are_cached_until_the_registry_changes() {
    let db = item_db();
    let query = Query::select("Item").filter(Predicate::eq("a", 1));

    let (plans, events) = capture(|| (db.prepare(&query).unwrap(), db.prepare(&query).unwrap()));
    assert!(Arc::ptr_eq(&plans.0, &plans.1));
    assert!(events.contains(&"PlanCache { hit: false }".to_string()));
    assert!(events.contains(&"PlanCache { hit: true }".to_string()));
    assert_eq!(db.cached_plans(), 1);

    db.create_index(simple_index("item_a", IndexKind::NotUnique, "Item", "a", ValueType::Int))
        .unwrap();
    assert_eq!(db.cached_plans(), 0);
    assert!(!db.prepare(&query).unwrap().best().is_full_scan());
}

#[test]
fn subclass_indexes_are_skipped_when_the_base_class_is_indexed() {
    let db = Database::new();
    db.create_class(
        ClassDef::new("Animal")
            .property(Property::new("legs", ValueType::Int))
            .property(Property::new("name", ValueType::Text)),
    )
    .unwrap();
    db.create_class(ClassDef::new("Dog").extends("Animal")).unwrap();
    db.create_index(simple_index("dog_legs", IndexKind::UniqueHash, "Dog", "legs", ValueType::Int))
        .unwrap();
    db.create_index(simple_index("animal_legs", IndexKind::NotUnique, "Animal", "legs", ValueType::Int))
        .unwrap();
    db.create_index(simple_index("dog_name", IndexKind::NotUnique, "Dog", "name", ValueType::Text))
        .unwrap();

    let legs = db
        .prepare(&Query::select("Dog").filter(Predicate::eq("legs", 4)))
        .unwrap();
    assert_eq!(best_index(legs.best()).as_deref(), Some("animal_legs"));
    assert_eq!(legs.explain().candidates, 1);

    // nothing on the base class matches, so the subclass index is used
    let name = db
        .prepare(&Query::select("Dog").filter(Predicate::eq("name", "rex")))
        .unwrap();
    assert_eq!(best_index(name.best()).as_deref(), Some("dog_name"));
}
