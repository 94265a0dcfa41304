//! Class metadata consulted by index maintenance and planning.
//!
//! Class and property names are matched case-insensitively.

#[cfg(test)]
mod tests;

use crate::{
    error::{ErrorOrigin, InternalError},
    value::ValueType,
};
use std::collections::BTreeMap;

///
/// Property
///
/// Declared property of a class. `linked_class` is set for links and link
/// collections; `element` is the element type of list and map properties.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Property {
    pub name: String,
    pub ty: ValueType,
    pub element: ValueType,
    pub linked_class: Option<String>,
}

impl Property {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            element: ValueType::Any,
            linked_class: None,
        }
    }

    /// Single link to a record of `class`.
    #[must_use]
    pub fn link(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            linked_class: Some(class.into()),
            ..Self::new(name, ValueType::Link)
        }
    }

    /// List of links to records of `class`.
    #[must_use]
    pub fn link_list(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            element: ValueType::Link,
            linked_class: Some(class.into()),
            ..Self::new(name, ValueType::List)
        }
    }

    #[must_use]
    pub fn list(name: impl Into<String>, element: ValueType) -> Self {
        Self {
            element,
            ..Self::new(name, ValueType::List)
        }
    }

    #[must_use]
    pub fn map(name: impl Into<String>, element: ValueType) -> Self {
        Self {
            element,
            ..Self::new(name, ValueType::Map)
        }
    }
}

///
/// ClassDef
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub superclass: Option<String>,
    pub properties: Vec<Property>,
    pub clusters: Vec<i32>,
}

impl ClassDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            properties: Vec::new(),
            clusters: Vec::new(),
        }
    }

    #[must_use]
    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn cluster(mut self, cluster: i32) -> Self {
        self.clusters.push(cluster);
        self
    }

    /// Own property lookup; inherited properties resolve through the catalog.
    #[must_use]
    pub fn own_property(&self, field: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(field))
    }

    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

///
/// ClassCatalog
///
/// Read-only class hierarchy contract.
///

pub trait ClassCatalog {
    fn class(&self, name: &str) -> Option<&ClassDef>;

    fn classes(&self) -> Vec<&ClassDef>;

    /// `name` followed by its ancestors, nearest first.
    fn superclass_chain(&self, name: &str) -> Vec<&ClassDef> {
        let mut chain = Vec::new();
        let mut current = self.class(name);
        while let Some(class) = current {
            if chain.iter().any(|c: &&ClassDef| c.is(&class.name)) {
                break;
            }
            chain.push(class);
            current = class
                .superclass
                .as_deref()
                .and_then(|parent| self.class(parent));
        }

        chain
    }

    fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        self.superclass_chain(class)
            .iter()
            .any(|c| c.is(ancestor))
    }

    /// `name` and every class that inherits from it.
    fn polymorphic_classes(&self, name: &str) -> Vec<&ClassDef> {
        self.classes()
            .into_iter()
            .filter(|c| self.is_subclass_of(&c.name, name))
            .collect()
    }

    fn property(&self, class: &str, field: &str) -> Option<&Property> {
        self.superclass_chain(class)
            .into_iter()
            .find_map(|c| c.own_property(field))
    }

    fn polymorphic_clusters(&self, name: &str) -> Vec<i32> {
        let mut clusters: Vec<i32> = self
            .polymorphic_classes(name)
            .iter()
            .flat_map(|c| c.clusters.iter().copied())
            .collect();
        clusters.sort_unstable();
        clusters.dedup();

        clusters
    }
}

///
/// Schema
///
/// In-memory class catalog. Classes without explicit clusters receive one.
///

#[derive(Debug, Default)]
pub struct Schema {
    classes: BTreeMap<String, ClassDef>,
    next_cluster: i32,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_class(&mut self, mut def: ClassDef) -> Result<(), InternalError> {
        let key = def.name.to_ascii_lowercase();
        if self.classes.contains_key(&key) {
            return Err(InternalError::already_exists(
                ErrorOrigin::Schema,
                "class",
                &def.name,
            ));
        }
        if let Some(parent) = &def.superclass
            && self.class(parent).is_none()
        {
            return Err(InternalError::not_found(ErrorOrigin::Schema, "class", parent));
        }

        let taken: Vec<i32> = self
            .classes
            .values()
            .flat_map(|c| c.clusters.iter().copied())
            .collect();
        if let Some(cluster) = def.clusters.iter().find(|c| taken.contains(c)) {
            return Err(InternalError::already_exists(
                ErrorOrigin::Schema,
                "cluster",
                &cluster.to_string(),
            ));
        }
        if def.clusters.is_empty() {
            while taken.contains(&self.next_cluster) {
                self.next_cluster += 1;
            }
            def.clusters.push(self.next_cluster);
        }
        self.next_cluster = self
            .next_cluster
            .max(def.clusters.iter().copied().max().unwrap_or(0) + 1);

        self.classes.insert(key, def);

        Ok(())
    }

    /// Class owning `cluster`, if any.
    #[must_use]
    pub fn class_for_cluster(&self, cluster: i32) -> Option<&ClassDef> {
        self.classes.values().find(|c| c.clusters.contains(&cluster))
    }
}

impl ClassCatalog for Schema {
    fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(&name.to_ascii_lowercase())
    }

    fn classes(&self) -> Vec<&ClassDef> {
        self.classes.values().collect()
    }
}
