use crate::{
    db::schema::{ClassCatalog, ClassDef, Property, Schema},
    value::ValueType,
};

fn school() -> Schema {
    let mut schema = Schema::new();
    schema
        .create_class(ClassDef::new("Person").property(Property::new("name", ValueType::Text)))
        .expect("person");
    schema
        .create_class(
            ClassDef::new("Student")
                .extends("Person")
                .property(Property::link("group", "Group")),
        )
        .expect("student");
    schema
        .create_class(ClassDef::new("Professor").extends("Person"))
        .expect("professor");

    schema
}

#[test]
fn classes_resolve_case_insensitively() {
    let schema = school();
    assert_eq!(schema.class("STUDENT").map(|c| c.name.as_str()), Some("Student"));
    assert!(schema.class("nobody").is_none());
}

#[test]
fn superclass_chain_lists_nearest_first() {
    let schema = school();
    let names: Vec<_> = schema
        .superclass_chain("student")
        .iter()
        .map(|c| c.name.clone())
        .collect();
    assert_eq!(names, vec!["Student", "Person"]);
}

#[test]
fn properties_are_inherited() {
    let schema = school();
    let name = schema.property("Student", "NAME").expect("inherited property");
    assert_eq!(name.ty, ValueType::Text);
    assert_eq!(
        schema
            .property("Student", "group")
            .and_then(|p| p.linked_class.as_deref()),
        Some("Group")
    );
    assert!(schema.property("Person", "group").is_none());
}

#[test]
fn polymorphic_clusters_cover_subclasses() {
    let schema = school();
    let person = schema.polymorphic_clusters("Person");
    let student = schema.polymorphic_clusters("Student");
    assert_eq!(person.len(), 3);
    assert_eq!(student.len(), 1);
    assert!(person.contains(&student[0]));
}

#[test]
fn duplicate_classes_and_unknown_parents_are_rejected() {
    let mut schema = school();
    let dup = schema
        .create_class(ClassDef::new("person"))
        .expect_err("duplicate class");
    assert_eq!(dup.class, crate::error::ErrorClass::AlreadyExists);

    let orphan = schema
        .create_class(ClassDef::new("Orphan").extends("Missing"))
        .expect_err("unknown parent");
    assert!(orphan.is_not_found());
}

#[test]
fn explicit_clusters_are_kept_and_not_reused() {
    let mut schema = Schema::new();
    schema
        .create_class(ClassDef::new("A").cluster(0))
        .expect("a");
    schema.create_class(ClassDef::new("B")).expect("b");

    assert_eq!(schema.class("B").map(|c| c.clusters.clone()), Some(vec![1]));
    assert!(
        schema
            .create_class(ClassDef::new("C").cluster(1))
            .is_err()
    );
}
