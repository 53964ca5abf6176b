use crate::repo::*;
use dv_dex::classes::ClassFlags;
use dv_dex::types::pretty_descriptor;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

/// A class of the class path, either defined by a dex model (or by the
/// built-in core classes), or a placeholder for a class that is only
/// referenced.
#[derive(Debug, Clone)]
pub struct Class {
    // Unique identifier in the repository
    uid: ClassUid,
    // Type descriptor, as 'Lcom/example/Foo;'
    descriptor: String,
    // Access flags, empty for placeholders
    flags: ClassFlags,
    // Whether a definition has been registered for this class
    defined: bool,
    // Flag to indicate that the class comes from a system dex or the core classes
    system: bool,
    superclass: Option<String>,
    interfaces: Vec<String>,
    // List of contained methods (declaration level)
    methods: Vec<MethodUid>,
    // List of contained fields (declaration level)
    fields: Vec<FieldUid>,
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for Class {}

impl PartialOrd for Class {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Class {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uid.cmp(&other.uid)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", pretty_descriptor(&self.descriptor))
    }
}

impl Class {
    pub(crate) fn new_def(
        uid: ClassUid,
        descriptor: &str,
        flags: ClassFlags,
        superclass: Option<&str>,
        interfaces: &[&str],
        system: bool,
    ) -> Self {
        Self {
            uid,
            descriptor: descriptor.to_string(),
            flags,
            defined: true,
            system,
            superclass: superclass.map(str::to_string),
            interfaces: interfaces.iter().map(|i| (*i).to_string()).collect(),
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Builds a class declaration for a class that is referenced but not defined.
    pub(crate) fn new_no_def(uid: ClassUid, descriptor: &str) -> Self {
        Self {
            uid,
            descriptor: descriptor.to_string(),
            flags: ClassFlags::empty(),
            defined: false,
            system: false,
            superclass: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub(crate) fn push_method(&mut self, method: MethodUid) {
        self.methods.push(method);
    }

    pub(crate) fn push_field(&mut self, field: FieldUid) {
        self.fields.push(field);
    }

    #[inline]
    #[must_use]
    pub const fn uid(&self) -> ClassUid {
        self.uid
    }

    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> ClassFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub const fn is_defined(&self) -> bool {
        self.defined
    }

    #[inline]
    #[must_use]
    pub const fn is_system(&self) -> bool {
        self.system
    }

    #[inline]
    #[must_use]
    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    pub(crate) fn set_superclass(&mut self, superclass: &str) {
        self.superclass = Some(superclass.to_string());
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.interfaces.iter().map(String::as_str)
    }

    /// Returns the package part of the class name (`com/example` for `Lcom/example/Foo;`).
    #[must_use]
    pub fn package(&self) -> &str {
        package_name(&self.descriptor)
    }

    /// Returns a iterator over all methods declared by the class.
    pub fn iter_methods<'s, 'r: 's>(&'s self, repo: &'r Repo) -> impl Iterator<Item = &'r Method> + 's {
        self.methods.iter().map(move |muid| &repo[*muid])
    }

    /// Returns the declared method with the given name and signature (`(IJ)V`).
    pub fn get_method<'r>(&self, name: &str, signature: &str, repo: &'r Repo) -> Option<&'r Method> {
        self.iter_methods(repo)
            .find(|meth| meth.name() == name && meth.signature() == signature)
    }

    pub fn find_methods<'r>(
        &'r self,
        pattern: &'r Regex,
        repo: &'r Repo,
    ) -> impl Iterator<Item = &'r Method> {
        self.iter_methods(repo)
            .filter(|m| pattern.is_match(m.name()))
    }

    pub fn iter_fields<'s, 'r: 's>(&'s self, repo: &'r Repo) -> impl Iterator<Item = &'r Field> + 's {
        self.fields.iter().map(move |fuid| &repo[*fuid])
    }

    pub fn get_field<'r>(&self, name: &str, type_descriptor: &str, repo: &'r Repo) -> Option<&'r Field> {
        self.iter_fields(repo)
            .find(|field| field.name() == name && field.type_descriptor() == type_descriptor)
    }

    #[inline]
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags.contains(ClassFlags::ACC_PUBLIC)
    }

    #[inline]
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.flags.contains(ClassFlags::ACC_FINAL)
    }

    #[inline]
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(ClassFlags::ACC_INTERFACE)
    }

    #[inline]
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(ClassFlags::ACC_ABSTRACT)
    }
}

/// Returns the package of a class or array descriptor, the empty string
/// for the default package and for primitive types.
#[must_use]
pub fn package_name(descriptor: &str) -> &str {
    let element = descriptor.trim_start_matches('[');
    let Some(name) = element.strip_prefix('L').and_then(|n| n.strip_suffix(';')) else {
        return "";
    };
    name.rfind('/').map_or("", |pos| &name[..pos])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packages() {
        assert_eq!(package_name("Lcom/example/Foo;"), "com/example");
        assert_eq!(package_name("[[Lcom/example/Foo;"), "com/example");
        assert_eq!(package_name("LFoo;"), "");
        assert_eq!(package_name("[I"), "");
    }
}
