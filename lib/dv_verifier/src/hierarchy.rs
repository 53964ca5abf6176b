//! Classes hierarchy graph representation.

use crate::errors::{VerifierError, VerifierResult};
use crate::repo::{Class, RepoCounters, JAVA_LANG_OBJECT};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use std::collections::BTreeMap;
use std::fmt;
use Direction::Outgoing;

#[derive(Debug, PartialEq, Eq)]
pub enum Inheritance {
    Extends,
    Implements,
}

impl fmt::Display for Inheritance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Extends => write!(f, "<extends>"),
            Self::Implements => write!(f, "<implements>"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Hierarchy {
    inner: DiGraph<Class, Inheritance>,
    node_ids: BTreeMap<String, NodeIndex>,
}

impl Hierarchy {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_class(&mut self, class: Class) -> VerifierResult<()> {
        if self.node_ids.contains_key(class.descriptor()) {
            return Err(VerifierError::Internal(
                "duplicate object in hierarchy graph".to_string(),
            ));
        }

        let descriptor = class.descriptor().to_string();
        let id = self.inner.add_node(class);
        self.node_ids.insert(descriptor, id);
        Ok(())
    }

    /// Replaces a placeholder by the class definition, keeping the links
    /// already pointing to it.
    pub(crate) fn update_class(&mut self, class: Class) -> VerifierResult<()> {
        if let Some(id) = self.node_ids.get(class.descriptor()) {
            self.inner[*id] = class;
            Ok(())
        } else {
            Err(VerifierError::ClassNotFound(class.descriptor().to_string()))
        }
    }

    pub(crate) fn get_class_mut(&mut self, descriptor: &str) -> Option<&mut Class> {
        let id = self.node_ids.get(descriptor)?;
        self.inner.node_weight_mut(*id)
    }

    pub(crate) fn contains_class(&self, descriptor: &str) -> bool {
        self.node_ids.contains_key(descriptor)
    }

    pub fn iter_classes(&self) -> impl Iterator<Item = &Class> {
        self.inner.node_weights()
    }

    pub(crate) fn insert_extends(&mut self, class: &str, superclass: &str) -> VerifierResult<()> {
        self.insert_link(class, superclass, Inheritance::Extends)
    }

    pub(crate) fn insert_implements(&mut self, class: &str, interface: &str) -> VerifierResult<()> {
        self.insert_link(class, interface, Inheritance::Implements)
    }

    fn insert_link(&mut self, from: &str, to: &str, link: Inheritance) -> VerifierResult<()> {
        let src = self
            .node_ids
            .get(from)
            .ok_or_else(|| VerifierError::ClassNotFound(from.to_string()))?;
        let dst = self
            .node_ids
            .get(to)
            .ok_or_else(|| VerifierError::ClassNotFound(to.to_string()))?;
        self.inner.add_edge(*src, *dst, link);
        Ok(())
    }

    /// Links defined classes declaring no superclass to `java.lang.Object`.
    /// Placeholders are left alone: their supertypes are unknown.
    pub(crate) fn close(&mut self, counters: &mut RepoCounters) -> VerifierResult<()> {
        if !self.contains_class(JAVA_LANG_OBJECT) {
            self.insert_class(Class::new_no_def(counters.new_class_uid(), JAVA_LANG_OBJECT))?;
        }

        let id_orphans: Vec<NodeIndex> = self
            .inner
            .externals(Outgoing)
            .filter(|id| {
                let class = &self.inner[*id];
                class.is_defined() && class.descriptor() != JAVA_LANG_OBJECT
            })
            .collect();

        for id in id_orphans {
            let descriptor = self.inner[id].descriptor().to_string();
            log::warn!("add missing java.lang.Object inheritance to {descriptor}");
            self.inner[id].set_superclass(JAVA_LANG_OBJECT);
            self.insert_extends(&descriptor, JAVA_LANG_OBJECT)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn get_class(&self, descriptor: &str) -> Option<&Class> {
        self.node_ids.get(descriptor).map(|id| &self.inner[*id])
    }

    /// Returns the class and all its direct and indirect supertypes.
    #[must_use]
    pub fn all_parents(&self, descriptor: &str) -> Vec<&Class> {
        let Some(id) = self.node_ids.get(descriptor) else {
            return Vec::new();
        };
        let mut parents = Vec::new();
        let mut dfs = Dfs::new(&self.inner, *id);
        while let Some(id) = dfs.next(&self.inner) {
            parents.push(&self.inner[id]);
        }
        parents
    }

    /// Returns the direct superclass, following the `Extends` link.
    #[must_use]
    pub fn super_class(&self, descriptor: &str) -> Option<&Class> {
        let id = self.node_ids.get(descriptor)?;
        self.inner
            .edges_directed(*id, Outgoing)
            .find(|edge| *edge.weight() == Inheritance::Extends)
            .map(|edge| &self.inner[edge.target()])
    }

    /// Returns the directly implemented (or extended, for interfaces) interfaces.
    pub fn direct_interfaces(&self, descriptor: &str) -> Vec<&Class> {
        let Some(id) = self.node_ids.get(descriptor) else {
            return Vec::new();
        };
        let mut interfaces: Vec<&Class> = self
            .inner
            .edges_directed(*id, Outgoing)
            .filter(|edge| *edge.weight() == Inheritance::Implements)
            .map(|edge| &self.inner[edge.target()])
            .collect();
        // petgraph iterates the most recent edges first
        interfaces.reverse();
        interfaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dv_dex::classes::ClassFlags;

    #[test]
    fn close_links_orphans_to_object() {
        let mut counters = RepoCounters::new();
        let mut hierarchy = Hierarchy::new();
        hierarchy
            .insert_class(Class::new_def(
                counters.new_class_uid(),
                "LFoo;",
                ClassFlags::ACC_PUBLIC,
                None,
                &[],
                false,
            ))
            .unwrap();
        hierarchy
            .insert_class(Class::new_no_def(counters.new_class_uid(), "LMissing;"))
            .unwrap();
        hierarchy.close(&mut counters).unwrap();

        assert_eq!(
            hierarchy.super_class("LFoo;").map(Class::descriptor),
            Some(JAVA_LANG_OBJECT)
        );
        assert!(hierarchy.super_class("LMissing;").is_none());
        assert!(hierarchy
            .insert_class(Class::new_no_def(counters.new_class_uid(), "LFoo;"))
            .is_err());
    }
}
