//! A repository to centralize application, system and core classes.

use crate::errors::VerifierResult;
use crate::hierarchy::Hierarchy;
use crate::repo::builtins::CORE_CLASSES;
use crate::repo::*;
use dv_dex::classes::{ClassDefItem, ClassFlags};
use dv_dex::types::Type;
use dv_dex::{Dex, DexIndex};
use regex::Regex;
use std::ops;

/// The class path: a hierarchy of classes with their declared members.
///
/// Types are designated by their descriptors. Array classes are never
/// registered, their properties derive from their element type.
#[derive(Debug)]
pub struct Repo {
    hierarchy: Hierarchy,
    counters: RepoCounters,
    methods: Vec<Method>,
    fields: Vec<Field>,
}

impl Default for Repo {
    fn default() -> Self {
        Self::new()
    }
}

impl ops::Index<MethodUid> for Repo {
    type Output = Method;

    fn index(&self, muid: MethodUid) -> &Method {
        &self.methods[muid.idx()]
    }
}

impl ops::Index<FieldUid> for Repo {
    type Output = Field;

    fn index(&self, fuid: FieldUid) -> &Field {
        &self.fields[fuid.idx()]
    }
}

impl Repo {
    /// Creates a repository holding the core classes only.
    #[must_use]
    pub fn new() -> Self {
        let mut repo = Self {
            hierarchy: Hierarchy::new(),
            counters: RepoCounters::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        };
        for core in CORE_CLASSES.iter() {
            let uid = repo.counters.new_class_uid();
            let mut class = Class::new_def(
                uid,
                core.descriptor,
                core.flags,
                core.superclass,
                core.interfaces,
                true,
            );
            for (name, signature, flags) in &core.methods {
                let muid = repo.counters.new_method_uid();
                repo.methods
                    .push(Method::new(muid, uid, core.descriptor, name, signature, *flags));
                class.push_method(muid);
            }
            if let Err(err) = repo.insert_with_links(class, false) {
                log::error!("core class {} cannot be registered: {err}", core.descriptor);
            }
        }
        repo
    }

    /// Registers every class defined by a dex model. Classes of system dexes
    /// are flagged as such, and a class already defined is kept unchanged.
    pub fn register_dex(&mut self, dex: &Dex, is_system: bool) -> VerifierResult<()> {
        for class_def in dex.iter_class_defs() {
            self.register_class(class_def, dex, is_system)?;
        }
        Ok(())
    }

    fn register_class(
        &mut self,
        class_def: &ClassDefItem,
        dex: &Dex,
        is_system: bool,
    ) -> VerifierResult<()> {
        let descriptor = class_def.descriptor(dex)?;
        log::trace!(
            "pushing '{}'{} in repository",
            descriptor,
            if is_system { " (SYS)" } else { "" }
        );

        let mut uid_to_update = None;
        if let Some(class_h) = self.hierarchy.get_class(descriptor) {
            if class_h.is_defined() {
                log::warn!(
                    "class '{}'{} has already been pushed in repository",
                    descriptor,
                    if is_system { " (SYS)" } else { "" }
                );
                // no change of the hierarchy nor of the repository for this class
                return Ok(());
            }
            uid_to_update = Some(class_h.uid());
        }

        let uid = uid_to_update.unwrap_or_else(|| self.counters.new_class_uid());
        let superclass = class_def.superclass(dex)?;
        let interfaces = class_def.interfaces(dex)?;
        let mut class = Class::new_def(
            uid,
            descriptor,
            class_def.flags(),
            superclass,
            &interfaces,
            is_system,
        );

        for encoded_method in class_def.methods() {
            let method_id = encoded_method.descriptor(dex)?;
            let muid = self.counters.new_method_uid();
            self.methods.push(Method::new(
                muid,
                uid,
                descriptor,
                method_id.name(dex)?,
                &method_id.signature(dex)?,
                encoded_method.flags(),
            ));
            class.push_method(muid);
        }
        for encoded_field in class_def.fields() {
            let field_id = encoded_field.field_idx().get(dex)?;
            let fuid = self.counters.new_field_uid();
            self.fields.push(Field::new(
                fuid,
                uid,
                descriptor,
                field_id.name(dex)?,
                field_id.type_descriptor(dex)?,
                encoded_field.flags(),
            ));
            class.push_field(fuid);
        }

        self.insert_with_links(class, uid_to_update.is_some())
    }

    fn insert_with_links(&mut self, class: Class, update: bool) -> VerifierResult<()> {
        let descriptor = class.descriptor().to_string();
        let superclass = class.superclass().map(str::to_string);
        let interfaces: Vec<String> = class.interfaces().map(str::to_string).collect();
        if update {
            self.hierarchy.update_class(class)?;
        } else {
            self.hierarchy.insert_class(class)?;
        }

        // filling in the hierarchy links
        if let Some(superclass) = superclass {
            self.ensure_node(&superclass)?;
            self.hierarchy.insert_extends(&descriptor, &superclass)?;
        }
        for interface in &interfaces {
            self.ensure_node(interface)?;
            self.hierarchy.insert_implements(&descriptor, interface)?;
        }
        Ok(())
    }

    fn ensure_node(&mut self, descriptor: &str) -> VerifierResult<()> {
        if !self.hierarchy.contains_class(descriptor) {
            self.hierarchy
                .insert_class(Class::new_no_def(self.counters.new_class_uid(), descriptor))?;
        }
        Ok(())
    }

    /// Links classes declaring no superclass to `java.lang.Object`. To be
    /// called once every dex has been registered.
    pub fn close_hierarchy(&mut self) -> VerifierResult<()> {
        self.hierarchy.close(&mut self.counters)?;
        let missing = self.iter_missing_classes().count();
        if missing > 0 {
            log::debug!("{missing} classes are referenced but not defined in the class path");
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub const fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    #[inline]
    pub fn iter_classes(&self) -> impl Iterator<Item = &Class> {
        self.hierarchy.iter_classes()
    }

    pub fn iter_missing_classes(&self) -> impl Iterator<Item = &str> {
        self.hierarchy
            .iter_classes()
            .filter_map(|class| (!class.is_defined()).then(|| class.descriptor()))
    }

    #[must_use]
    pub fn get_class(&self, descriptor: &str) -> Option<&Class> {
        self.hierarchy.get_class(descriptor)
    }

    pub fn find_classes<'r>(&'r self, pattern: &'r Regex) -> impl Iterator<Item = &'r Class> {
        self.hierarchy
            .iter_classes()
            .filter(|class| class.is_defined() && pattern.is_match(class.descriptor()))
    }

    /// Returns the class declaring the method.
    #[must_use]
    pub fn declaring_class(&self, method: &Method) -> Option<&Class> {
        self.get_class(method.class_descriptor())
    }

    /// A class is resolved when it is defined, as well as all its supertypes.
    /// Arrays are resolved when their element type is.
    #[must_use]
    pub fn is_resolved(&self, descriptor: &str) -> bool {
        match descriptor.as_bytes().first() {
            Some(b'[') => {
                let element = descriptor.trim_start_matches('[');
                element.len() == 1 || self.is_resolved(element)
            }
            Some(b'L') => {
                let parents = self.hierarchy.all_parents(descriptor);
                !parents.is_empty() && parents.iter().all(|c| c.is_defined())
            }
            _ => false,
        }
    }

    /// Returns the definition of a resolved class.
    #[must_use]
    pub fn resolve_class(&self, descriptor: &str) -> Option<&Class> {
        if self.is_resolved(descriptor) {
            self.get_class(descriptor)
        } else {
            None
        }
    }

    /// Access flags of a resolved class. Arrays are final and abstract, and
    /// share the visibility of their element type.
    #[must_use]
    pub fn class_flags(&self, descriptor: &str) -> Option<ClassFlags> {
        if descriptor.starts_with('[') {
            let element = descriptor.trim_start_matches('[');
            let visibility = if element.len() == 1 {
                ClassFlags::ACC_PUBLIC
            } else {
                self.class_flags(element)?
                    & (ClassFlags::ACC_PUBLIC | ClassFlags::ACC_PRIVATE | ClassFlags::ACC_PROTECTED)
            };
            return Some(visibility | ClassFlags::ACC_FINAL | ClassFlags::ACC_ABSTRACT);
        }
        self.get_class(descriptor)
            .filter(|class| class.is_defined())
            .map(Class::flags)
    }

    #[must_use]
    pub fn is_interface(&self, descriptor: &str) -> bool {
        self.class_flags(descriptor)
            .map_or(false, |flags| flags.contains(ClassFlags::ACC_INTERFACE))
    }

    /// Returns the superclass descriptor: `java.lang.Object` for arrays and
    /// interfaces, none for `java.lang.Object` itself.
    #[must_use]
    pub fn super_class(&self, descriptor: &str) -> Option<&str> {
        if descriptor.starts_with('[') {
            return Some(JAVA_LANG_OBJECT);
        }
        if descriptor == JAVA_LANG_OBJECT {
            return None;
        }
        if self.is_interface(descriptor) {
            return Some(JAVA_LANG_OBJECT);
        }
        self.hierarchy
            .super_class(descriptor)
            .map(Class::descriptor)
    }

    /// Checks that `sub` is `sup` or one of its subclasses (following superclasses only).
    #[must_use]
    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        let mut current = Some(sub);
        // bounded walk, malformed class paths may contain cycles
        for _ in 0..=self.counters.nb_classes() {
            match current {
                Some(c) if c == sup => return true,
                Some(c) => current = self.super_class(c),
                None => return false,
            }
        }
        false
    }

    /// Checks that `class` implements (directly or not) the `interface`.
    #[must_use]
    pub fn implements(&self, class: &str, interface: &str) -> bool {
        if class.starts_with('[') {
            return interface == JAVA_LANG_CLONEABLE || interface == JAVA_IO_SERIALIZABLE;
        }
        self.hierarchy
            .all_parents(class)
            .iter()
            .any(|parent| parent.descriptor() == interface)
    }

    /// Checks whether a value of resolved type `rhs` can be stored in a
    /// location of resolved type `lhs`.
    #[must_use]
    pub fn is_assignable(&self, lhs: &str, rhs: &str) -> bool {
        if lhs == rhs || lhs == JAVA_LANG_OBJECT {
            return true;
        }
        if let Some(lhs_component) = lhs.strip_prefix('[') {
            return match rhs.strip_prefix('[') {
                Some(rhs_component) => {
                    if is_primitive(lhs_component) || is_primitive(rhs_component) {
                        lhs_component == rhs_component
                    } else {
                        self.is_assignable(lhs_component, rhs_component)
                    }
                }
                None => false,
            };
        }
        if self.is_interface(lhs) {
            return self.implements(rhs, lhs);
        }
        !rhs.starts_with('[') && self.is_subclass(rhs, lhs)
    }

    /// Computes the join of two resolved reference types: the first superclass
    /// of `a` that `b` is assignable to, with arrays joined component-wise.
    #[must_use]
    pub fn common_super_class(&self, a: &str, b: &str) -> String {
        if self.is_assignable(a, b) {
            return a.to_string();
        }
        if self.is_assignable(b, a) {
            return b.to_string();
        }
        if let (Some(ca), Some(cb)) = (a.strip_prefix('['), b.strip_prefix('[')) {
            if is_primitive(ca) || is_primitive(cb) {
                return JAVA_LANG_OBJECT.to_string();
            }
            return format!("[{}", self.common_super_class(ca, cb));
        }
        let mut current = self.super_class(a);
        for _ in 0..=self.counters.nb_classes() {
            match current {
                Some(c) if self.is_assignable(c, b) => return c.to_string(),
                Some(c) => current = self.super_class(c),
                None => break,
            }
        }
        JAVA_LANG_OBJECT.to_string()
    }

    /// Looks a method up in a class and its superclasses, then in the
    /// interfaces it implements. Arrays only have the methods of `java.lang.Object`.
    #[must_use]
    pub fn find_class_method(&self, class: &str, name: &str, signature: &str) -> Option<&Method> {
        let class = if class.starts_with('[') { JAVA_LANG_OBJECT } else { class };
        let mut current = Some(class);
        for _ in 0..=self.counters.nb_classes() {
            let Some(c) = current else { break };
            if let Some(method) = self
                .get_class(c)
                .and_then(|def| def.get_method(name, signature, self))
            {
                return Some(method);
            }
            current = self.super_class(c);
        }
        self.hierarchy
            .all_parents(class)
            .into_iter()
            .filter(|parent| parent.is_interface())
            .find_map(|iface| iface.get_method(name, signature, self))
    }

    /// Looks a method up in an interface and its superinterfaces, then in the
    /// public methods of `java.lang.Object`.
    #[must_use]
    pub fn find_interface_method(
        &self,
        interface: &str,
        name: &str,
        signature: &str,
    ) -> Option<&Method> {
        self.hierarchy
            .all_parents(interface)
            .into_iter()
            .filter(|parent| parent.is_interface())
            .find_map(|iface| iface.get_method(name, signature, self))
            .or_else(|| {
                self.get_class(JAVA_LANG_OBJECT)
                    .and_then(|object| object.get_method(name, signature, self))
                    .filter(|method| method.is_public())
            })
    }

    /// Resolves a field the way the Java language specification orders the
    /// lookup: declared fields, then superinterfaces, then the superclass.
    #[must_use]
    pub fn resolve_field_jls(&self, class: &str, name: &str, type_descriptor: &str) -> Option<&Field> {
        self.resolve_field_jls_bounded(class, name, type_descriptor, self.counters.nb_classes())
    }

    fn resolve_field_jls_bounded(
        &self,
        class: &str,
        name: &str,
        type_descriptor: &str,
        depth: usize,
    ) -> Option<&Field> {
        if depth == 0 {
            return None;
        }
        let def = self.get_class(class)?;
        if let Some(field) = def.get_field(name, type_descriptor, self) {
            return Some(field);
        }
        for iface in self.hierarchy.direct_interfaces(class) {
            if let Some(field) =
                self.resolve_field_jls_bounded(iface.descriptor(), name, type_descriptor, depth - 1)
            {
                return Some(field);
            }
        }
        let superclass = self.hierarchy.super_class(class)?;
        self.resolve_field_jls_bounded(superclass.descriptor(), name, type_descriptor, depth - 1)
    }

    /// Checks that code of class `from` can refer to class `to`.
    #[must_use]
    pub fn can_access_class(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let element = to.trim_start_matches('[');
        if element.len() == 1 {
            return true;
        }
        match self.class_flags(element) {
            Some(flags) if flags.contains(ClassFlags::ACC_PUBLIC) => true,
            Some(_) => package_name(from) == package_name(element),
            None => false,
        }
    }

    /// Checks that code of class `from` can access a member of class
    /// `declaring` with the given visibility.
    #[must_use]
    pub fn can_access_member(&self, from: &str, declaring: &str, visibility: Visibility) -> bool {
        if from == declaring {
            return true;
        }
        match visibility {
            Visibility::Public => true,
            Visibility::Private => false,
            Visibility::Protected
                if !self.is_interface(from) && self.is_subclass(from, declaring) =>
            {
                true
            }
            Visibility::Protected | Visibility::Package => {
                package_name(from) == package_name(declaring)
            }
        }
    }

    pub fn nb_classes(&self) -> usize {
        self.counters.nb_classes()
    }

    pub fn nb_methods(&self) -> usize {
        self.counters.nb_methods()
    }

    pub fn nb_fields(&self) -> usize {
        self.counters.nb_fields()
    }
}

fn is_primitive(descriptor: &str) -> bool {
    Type::try_from(descriptor).map_or(false, |t| t.is_primitive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dv_dex::builder::DexBuilder;
    use dv_dex::fields::FieldFlags;
    use dv_dex::methods::MethodFlags;

    fn sample_repo() -> Repo {
        let mut builder = DexBuilder::new();
        builder.class("Lapp/Base;", ClassFlags::ACC_PUBLIC, Some(JAVA_LANG_OBJECT), &["Lapp/Api;"]);
        builder.class(
            "Lapp/Api;",
            ClassFlags::ACC_PUBLIC | ClassFlags::ACC_INTERFACE | ClassFlags::ACC_ABSTRACT,
            Some(JAVA_LANG_OBJECT),
            &[],
        );
        let derived = builder.class("Lapp/Derived;", ClassFlags::empty(), Some("Lapp/Base;"), &[]);
        builder.class("Lapp/Other;", ClassFlags::ACC_PUBLIC, Some("Lapp/Base;"), &[]);
        builder.class("Lapp/Orphan;", ClassFlags::ACC_PUBLIC, Some("Lmissing/Parent;"), &[]);
        let f = builder.field("Lapp/Derived;", "count", "I");
        builder.add_field(derived, f, FieldFlags::ACC_PRIVATE);
        let m = builder.method("Lapp/Derived;", "run", "V", &[]);
        builder.add_method(derived, m, MethodFlags::ACC_PUBLIC, None);
        let dex = builder.build();

        let mut repo = Repo::new();
        repo.register_dex(&dex, false).unwrap();
        repo.close_hierarchy().unwrap();
        repo
    }

    #[test]
    fn resolution() {
        let repo = sample_repo();
        assert!(repo.is_resolved("Lapp/Derived;"));
        assert!(repo.is_resolved("[[Lapp/Derived;"));
        assert!(repo.is_resolved("[I"));
        assert!(!repo.is_resolved("Lapp/Orphan;"));
        assert!(!repo.is_resolved("Lmissing/Parent;"));
        assert!(!repo.is_resolved("I"));
        assert_eq!(repo.iter_missing_classes().collect::<Vec<_>>(), vec!["Lmissing/Parent;"]);
    }

    #[test]
    fn assignability_and_joins() {
        let repo = sample_repo();
        assert!(repo.is_assignable("Lapp/Base;", "Lapp/Derived;"));
        assert!(!repo.is_assignable("Lapp/Derived;", "Lapp/Base;"));
        assert!(repo.is_assignable("Lapp/Api;", "Lapp/Derived;"));
        assert!(repo.is_assignable(JAVA_LANG_CLONEABLE, "[I"));
        assert!(repo.is_assignable("[Lapp/Base;", "[Lapp/Derived;"));
        assert!(!repo.is_assignable("[J", "[I"));
        assert_eq!(repo.common_super_class("Lapp/Derived;", "Lapp/Other;"), "Lapp/Base;");
        assert_eq!(repo.common_super_class("Lapp/Api;", "Ljava/lang/String;"), JAVA_LANG_OBJECT);
        assert_eq!(
            repo.common_super_class("[Lapp/Derived;", "[Lapp/Other;"),
            "[Lapp/Base;"
        );
        assert_eq!(repo.common_super_class("[I", "[J"), JAVA_LANG_OBJECT);
    }

    #[test]
    fn member_lookup_and_access() {
        let repo = sample_repo();
        let method = repo.find_class_method("Lapp/Derived;", "hashCode", "()I").unwrap();
        assert_eq!(method.class_descriptor(), JAVA_LANG_OBJECT);
        assert!(repo.find_class_method("Lapp/Derived;", "run", "()V").is_some());
        assert!(repo.find_interface_method("Lapp/Api;", "toString", "()Ljava/lang/String;").is_some());
        let field = repo.resolve_field_jls("Lapp/Derived;", "count", "I").unwrap();
        assert_eq!(format!("{field}"), "int app.Derived.count");

        assert!(repo.can_access_class("Lother/Foo;", "Lapp/Base;"));
        assert!(!repo.can_access_class("Lother/Foo;", "Lapp/Derived;"));
        assert!(repo.can_access_class("Lapp/Foo;", "[Lapp/Derived;"));
        assert!(!repo.can_access_member("Lapp/Base;", "Lapp/Derived;", Visibility::Private));
        assert!(repo.can_access_member("Lapp/Derived;", JAVA_LANG_OBJECT, Visibility::Protected));
        assert!(!repo.can_access_member("Lother/Foo;", "Lapp/Base;", Visibility::Package));
    }
}
