use super::*;
use crate::{
    db::{
        index::{IndexDefinition, IndexField, IndexKey, IndexKind},
        record::{Document, MemoryRecords, RecordId},
        schema::{ClassDef, Property},
    },
    error::ErrorClass,
    test_support::ProgressRecorder,
    value::{Value, ValueType},
};

fn schema() -> Schema {
    let mut schema = Schema::new();
    schema
        .create_class(
            ClassDef::new("Person")
                .cluster(10)
                .property(Property::new("name", ValueType::Text))
                .property(Property::new("age", ValueType::Int)),
        )
        .unwrap();
    schema
        .create_class(ClassDef::new("Employee").extends("Person").cluster(11))
        .unwrap();

    schema
}

fn records(people: &[(&str, i64)]) -> MemoryRecords {
    let mut records = MemoryRecords::new();
    for (i, (name, age)) in people.iter().enumerate() {
        let class = if i % 2 == 0 { "Person" } else { "Employee" };
        let cluster = if i % 2 == 0 { 10 } else { 11 };
        let mut doc = Document::new(class).with("name", *name).with("age", *age);
        doc.assign(records.allocate(cluster), 1);
        records.insert(doc);
    }

    records
}

fn spec(name: &str, kind: IndexKind, fields: &[&str]) -> IndexSpec {
    let def = IndexDefinition::new(
        "Person",
        fields.iter().map(|f| {
            let ty = if *f == "age" { ValueType::Int } else { ValueType::Text };
            IndexField::new(*f, ty)
        }),
    )
    .unwrap();

    IndexSpec::new(name, kind, def)
}

fn create(
    manager: &mut IndexManager,
    schema: &Schema,
    records: &MemoryRecords,
    spec: IndexSpec,
) -> Result<Arc<IndexHandle>, InternalError> {
    manager.create(spec, schema, records, &DbConfig::default(), &mut NoProgress)
}

#[test]
fn create_builds_over_subclass_records_and_rejects_duplicates() {
    let schema = schema();
    let records = records(&[("ann", 30), ("bob", 40), ("cy", 30)]);
    let mut manager = IndexManager::new();

    let handle = create(&mut manager, &schema, &records, spec("by_age", IndexKind::NotUnique, &["age"])).unwrap();
    assert_eq!(handle.len(), 3);
    assert_eq!(handle.key_count(), 2);
    assert_eq!(handle.get(&IndexKey::new([Value::Int(30)])).unwrap().len(), 2);
    assert_eq!(handle.clusters().iter().copied().collect::<Vec<_>>(), vec![10, 11]);

    let err = create(&mut manager, &schema, &records, spec("BY_AGE", IndexKind::Unique, &["name"])).unwrap_err();
    assert_eq!(err.class, ErrorClass::AlreadyExists);
    assert_eq!(manager.len(), 1);
}

#[test]
fn failed_build_leaves_nothing_registered() {
    let schema = schema();
    let records = records(&[("ann", 30), ("bob", 30)]);
    let mut manager = IndexManager::new();
    let mut progress = ProgressRecorder::default();

    let err = manager
        .create(
            spec("uniq_age", IndexKind::Unique, &["age"]),
            &schema,
            &records,
            &DbConfig::default(),
            &mut progress,
        )
        .unwrap_err();
    assert!(err.is_unique_violation());
    assert!(manager.get("uniq_age").is_none());
    assert_eq!(progress.events.last().map(String::as_str), Some("completed uniq_age false"));
}

#[test]
fn unknown_class_and_composite_fulltext_are_rejected() {
    let schema = schema();
    let records = MemoryRecords::new();
    let mut manager = IndexManager::new();

    let def = IndexDefinition::simple("Nobody", "name", ValueType::Text).unwrap();
    let err = create(&mut manager, &schema, &records, IndexSpec::new("x", IndexKind::NotUnique, def)).unwrap_err();
    assert_eq!(err.class, ErrorClass::NotFound);

    let err = create(&mut manager, &schema, &records, spec("ft", IndexKind::FullText, &["name", "age"])).unwrap_err();
    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn drop_removes_every_lookup_path() {
    let schema = schema();
    let records = records(&[("ann", 30)]);
    let mut manager = IndexManager::new();
    create(&mut manager, &schema, &records, spec("name_age", IndexKind::NotUnique, &["name", "age"])).unwrap();
    assert!(manager.are_indexed(&schema, "Person", &["name"]));

    manager.drop_index("NAME_AGE").unwrap();
    assert!(manager.is_empty());
    assert!(!manager.are_indexed(&schema, "Person", &["name"]));
    assert!(manager.class_index.is_empty());
    assert_eq!(
        manager.drop_index("name_age").unwrap_err().class,
        ErrorClass::NotFound
    );
}

#[test]
fn recreated_index_gets_a_new_id() {
    let schema = schema();
    let records = records(&[("ann", 30)]);
    let mut manager = IndexManager::new();

    let first = create(&mut manager, &schema, &records, spec("by_age", IndexKind::NotUnique, &["age"])).unwrap();
    manager.drop_index("by_age").unwrap();
    let second = create(&mut manager, &schema, &records, spec("by_age", IndexKind::NotUnique, &["age"])).unwrap();
    assert_ne!(first.id(), second.id());
}

#[test]
fn are_indexed_matches_leading_fields_in_any_order_through_ancestors() {
    let schema = schema();
    let records = MemoryRecords::new();
    let mut manager = IndexManager::new();
    create(&mut manager, &schema, &records, spec("name_age", IndexKind::NotUnique, &["name", "age"])).unwrap();

    assert!(manager.are_indexed(&schema, "person", &["NAME"]));
    assert!(manager.are_indexed(&schema, "Employee", &["age", "name"]));
    // trailing field alone is not a leading prefix
    assert!(!manager.are_indexed(&schema, "Person", &["age"]));
    assert!(!manager.are_indexed(&schema, "Nobody", &["name"]));
}

#[test]
fn involved_indexes_skip_partial_matches_that_ignore_nulls() {
    let schema = schema();
    let records = MemoryRecords::new();
    let mut manager = IndexManager::new();
    create(&mut manager, &schema, &records, spec("keeps_nulls", IndexKind::NotUnique, &["name", "age"])).unwrap();
    let mut drops = spec("drops_nulls", IndexKind::NotUnique, &["name", "age"]);
    drops.definition = drops.definition.with_ignore_nulls(true);
    create(&mut manager, &schema, &records, drops).unwrap();

    let names = |fields: &[&str]| -> Vec<String> {
        manager
            .involved_indexes(&schema, "Employee", fields)
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    };
    assert_eq!(names(&["name"]), vec!["keeps_nulls"]);
    assert_eq!(names(&["age", "name"]), vec!["drops_nulls", "keeps_nulls"]);
    assert!(names(&["age"]).is_empty());
}

#[test]
fn indexes_for_class_lists_the_base_class_first() {
    let schema = schema();
    let records = MemoryRecords::new();
    let mut manager = IndexManager::new();
    let employee = IndexDefinition::simple("Employee", "name", ValueType::Text).unwrap();
    create(&mut manager, &schema, &records, IndexSpec::new("employee_name", IndexKind::NotUnique, employee)).unwrap();
    create(&mut manager, &schema, &records, spec("person_name", IndexKind::NotUnique, &["name"])).unwrap();

    let names: Vec<String> = manager
        .indexes_for_class(&schema, "Employee")
        .iter()
        .map(|h| h.name().to_string())
        .collect();
    assert_eq!(names, vec!["person_name", "employee_name"]);
    assert_eq!(manager.get_for_class("person").len(), 1);
    assert!(manager.class_index("Employee", "person_name").is_none());
}

#[test]
fn progress_is_reported_every_step() {
    let schema = schema();
    let records = records(&[("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)]);
    let mut manager = IndexManager::new();
    let mut config = DbConfig::default();
    config.build.progress_step = 2;
    let mut progress = ProgressRecorder::default();

    manager
        .create(spec("by_age", IndexKind::NotUnique, &["age"]), &schema, &records, &config, &mut progress)
        .unwrap();
    assert_eq!(
        progress.events,
        vec![
            "begin by_age 5",
            "progress by_age 2/5",
            "progress by_age 4/5",
            "completed by_age true",
        ]
    );
}

#[test]
fn rebuild_discards_direct_edits_and_repopulates() {
    let schema = schema();
    let records = records(&[("ann", 30), ("bob", 40)]);
    let mut manager = IndexManager::new();
    let handle = create(&mut manager, &schema, &records, spec("by_age", IndexKind::NotUnique, &["age"])).unwrap();

    handle
        .put(IndexKey::new([Value::Int(99)]), RecordId::new(10, 42))
        .unwrap();
    assert_eq!(handle.len(), 3);

    let entries = manager
        .rebuild("by_age", &schema, &records, &DbConfig::default(), &mut NoProgress)
        .unwrap();
    assert_eq!(entries, 2);
    assert!(!handle.contains(&IndexKey::new([Value::Int(99)])).unwrap());
}
