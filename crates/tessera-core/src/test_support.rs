use crate::{
    db::{
        Database,
        index::{IndexDefinition, IndexField, IndexKind, IndexSpec},
        manager::ProgressListener,
        record::{Document, RecordId},
        schema::{ClassDef, Property},
    },
    obs::sink::{MetricsEvent, MetricsSink, with_metrics_sink},
    value::{Value, ValueType},
};
use std::{cell::RefCell, rc::Rc};

///
/// CapturingSink
///
/// Test sink keeping the Debug rendering of every event.
///

#[derive(Default)]
pub(crate) struct CapturingSink {
    events: RefCell<Vec<String>>,
}

impl MetricsSink for CapturingSink {
    fn record(&self, event: MetricsEvent<'_>) {
        self.events.borrow_mut().push(format!("{event:?}"));
    }
}

/// Run `f` with a fresh capturing sink installed.
pub(crate) fn capture<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    let sink = Rc::new(CapturingSink::default());
    let out = with_metrics_sink(sink.clone(), f);
    let events = sink.events.borrow().clone();

    (out, events)
}

///
/// ProgressRecorder
///

#[derive(Debug, Default)]
pub(crate) struct ProgressRecorder {
    pub(crate) events: Vec<String>,
}

impl ProgressListener for ProgressRecorder {
    fn on_begin(&mut self, index: &str, total: usize) {
        self.events.push(format!("begin {index} {total}"));
    }

    fn on_progress(&mut self, index: &str, done: usize, total: usize) {
        self.events.push(format!("progress {index} {done}/{total}"));
    }

    fn on_completed(&mut self, index: &str, succeeded: bool) {
        self.events.push(format!("completed {index} {succeeded}"));
    }
}

/// Single-field index spec.
pub(crate) fn simple_index(name: &str, kind: IndexKind, class: &str, field: &str, ty: ValueType) -> IndexSpec {
    let def = IndexDefinition::simple(class, field, ty).expect("definition");

    IndexSpec::new(name, kind, def)
}

/// Scalar composite index spec over `fields` in order.
pub(crate) fn composite_index(
    name: &str,
    kind: IndexKind,
    class: &str,
    fields: &[(&str, ValueType)],
) -> IndexSpec {
    let def = IndexDefinition::new(
        class,
        fields.iter().map(|(field, ty)| IndexField::new(*field, *ty)),
    )
    .expect("definition");

    IndexSpec::new(name, kind, def)
}

///
/// School
///
/// Student -> Group -> Curator, linked by `group` and `curator`.
///

pub(crate) struct School {
    pub(crate) curators: Vec<RecordId>,
    pub(crate) groups: Vec<RecordId>,
    pub(crate) students: Vec<RecordId>,
}

pub(crate) fn school_schema(db: &Database) {
    db.create_class(
        ClassDef::new("Curator")
            .property(Property::new("name", ValueType::Text))
            .property(Property::new("salary", ValueType::Int)),
    )
    .expect("curator");
    db.create_class(
        ClassDef::new("Group")
            .property(Property::new("name", ValueType::Text))
            .property(Property::link("curator", "Curator")),
    )
    .expect("group");
    db.create_class(
        ClassDef::new("Student")
            .property(Property::new("name", ValueType::Text))
            .property(Property::link("group", "Group")),
    )
    .expect("student");
}

/// Curator `i` earns `i * 250`; group `i` belongs to curator `i`; students
/// are spread over the groups round robin. One student has no group.
pub(crate) fn seed_school(db: &Database, curators: usize, students: usize) -> School {
    let mut school = School {
        curators: Vec::new(),
        groups: Vec::new(),
        students: Vec::new(),
    };

    for i in 0..curators {
        let salary = i64::try_from(i).expect("salary") * 250;
        let curator = db
            .insert(
                Document::new("Curator")
                    .with("name", format!("curator-{i}"))
                    .with("salary", salary),
            )
            .expect("insert curator");
        let group = db
            .insert(
                Document::new("Group")
                    .with("name", format!("group-{i}"))
                    .with("curator", Value::Link(curator)),
            )
            .expect("insert group");
        school.curators.push(curator);
        school.groups.push(group);
    }

    for i in 0..students {
        let group = school.groups[i % school.groups.len()];
        let student = db
            .insert(
                Document::new("Student")
                    .with("name", format!("student-{i}"))
                    .with("group", Value::Link(group)),
            )
            .expect("insert student");
        school.students.push(student);
    }
    let orphan = db
        .insert(Document::new("Student").with("name", "orphan"))
        .expect("insert orphan");
    school.students.push(orphan);

    school
}

/// Record ids of `docs`, sorted.
pub(crate) fn rids(docs: &[Document]) -> Vec<RecordId> {
    let mut out: Vec<RecordId> = docs.iter().map(Document::rid).collect();
    out.sort();
    out
}
