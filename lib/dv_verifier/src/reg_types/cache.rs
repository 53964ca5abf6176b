use crate::reg_types::{RegType, RegTypeId, CONSTANT_KINDS, FIXED_TYPES};
use crate::repo::{Repo, JAVA_LANG_OBJECT};
use dv_dex::errors::DexResult;
use dv_dex::types::TypeIdItem;
use dv_dex::{Dex, Index};
use std::collections::HashMap;
use std::fmt::Write;

static CONFLICT: RegType = RegType::Conflict;

/// Interning table of the register types used while verifying one method.
///
/// Types are stored once in an arena and designated by their index. The
/// fixed types (primitives, constant kinds, `java.lang.Object`) always
/// have the same ids, see [`RegTypeId`].
#[derive(Debug)]
pub struct RegTypeCache<'r> {
    repo: &'r Repo,
    entries: Vec<RegType>,
    ids: HashMap<RegType, RegTypeId>,
}

impl<'r> RegTypeCache<'r> {
    #[must_use]
    pub fn new(repo: &'r Repo) -> Self {
        let mut cache = Self {
            repo,
            entries: Vec::with_capacity(64),
            ids: HashMap::with_capacity(64),
        };
        for t in FIXED_TYPES {
            cache.intern(t);
        }
        cache
    }

    #[inline]
    #[must_use]
    pub fn repo(&self) -> &'r Repo {
        self.repo
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the type designated by an id. Ids are only built by the
    /// cache, an id of another cache yields `Conflict` if out of bounds.
    #[must_use]
    pub fn get(&self, id: RegTypeId) -> &RegType {
        self.entries.get(id.index()).unwrap_or(&CONFLICT)
    }

    pub(crate) fn intern(&mut self, t: RegType) -> RegTypeId {
        let t = match t {
            RegType::Reference(d) if d == JAVA_LANG_OBJECT => RegType::JavaLangObject,
            t => t,
        };
        if let Some(id) = self.ids.get(&t) {
            return *id;
        }
        let id = RegTypeId::new(self.entries.len() as u32);
        log::trace!("new register type {id}: {t}");
        self.entries.push(t.clone());
        self.ids.insert(t, id);
        id
    }

    /// Builds the type of a field, parameter or return descriptor.
    /// `void` has no register type and gives `Conflict`.
    pub fn from_descriptor(&mut self, descriptor: &str) -> RegTypeId {
        match descriptor {
            "Z" => RegTypeId::BOOLEAN,
            "B" => RegTypeId::BYTE,
            "S" => RegTypeId::SHORT,
            "C" => RegTypeId::CHAR,
            "I" => RegTypeId::INTEGER,
            "F" => RegTypeId::FLOAT,
            "J" => RegTypeId::LONG_LO,
            "D" => RegTypeId::DOUBLE_LO,
            JAVA_LANG_OBJECT => RegTypeId::JAVA_LANG_OBJECT,
            d if d.starts_with('L') || d.starts_with('[') => {
                if self.repo.is_resolved(d) {
                    self.intern(RegType::Reference(d.to_string()))
                } else {
                    self.intern(RegType::UnresolvedReference(d.to_string()))
                }
            }
            _ => RegTypeId::CONFLICT,
        }
    }

    pub fn from_type_idx(&mut self, dex: &Dex, idx: Index<TypeIdItem>) -> DexResult<RegTypeId> {
        let descriptor = dex.type_descriptor(idx)?;
        Ok(self.from_descriptor(descriptor))
    }

    /// Returns the smallest constant kind holding the given value.
    #[must_use]
    pub fn from_cat1_const(value: i32) -> RegTypeId {
        match value {
            v if v < i32::from(i16::MIN) => RegTypeId::INTEGER_CONSTANT,
            v if v < i32::from(i8::MIN) => RegTypeId::SHORT_CONSTANT,
            v if v < 0 => RegTypeId::BYTE_CONSTANT,
            0 => RegTypeId::ZERO,
            1 => RegTypeId::BOOLEAN_CONSTANT,
            v if v <= i32::from(i8::MAX) => RegTypeId::POSITIVE_BYTE_CONSTANT,
            v if v <= i32::from(i16::MAX) => RegTypeId::POSITIVE_SHORT_CONSTANT,
            v if v <= i32::from(u16::MAX) => RegTypeId::CHAR_CONSTANT,
            _ => RegTypeId::INTEGER_CONSTANT,
        }
    }

    /// Value range of an integer constant kind.
    pub(crate) fn constant_range(id: RegTypeId) -> Option<(i32, i32)> {
        CONSTANT_KINDS
            .iter()
            .find(|(kind, _, _)| *kind == id)
            .map(|(_, lo, hi)| (*lo, *hi))
    }

    /// The type of an object allocated by a `new-instance` at the given pc.
    pub fn uninitialized(&mut self, id: RegTypeId, pc: u32) -> RegTypeId {
        let t = match self.get(id) {
            RegType::JavaLangObject | RegType::Reference(_) => self
                .get(id)
                .descriptor()
                .map(|d| RegType::UninitializedReference(d.to_string(), pc)),
            RegType::UnresolvedReference(d) => {
                Some(RegType::UnresolvedUninitializedReference(d.clone(), pc))
            }
            _ => None,
        };
        t.map_or(RegTypeId::CONFLICT, |t| self.intern(t))
    }

    /// The type of the receiver of a constructor, before the call to the
    /// super or delegated constructor.
    pub fn uninitialized_this(&mut self, id: RegTypeId) -> RegTypeId {
        let t = match self.get(id) {
            RegType::JavaLangObject | RegType::Reference(_) => self
                .get(id)
                .descriptor()
                .map(|d| RegType::UninitializedThisReference(d.to_string())),
            RegType::UnresolvedReference(d) => {
                Some(RegType::UnresolvedUninitializedThisReference(d.clone()))
            }
            _ => None,
        };
        t.map_or(RegTypeId::CONFLICT, |t| self.intern(t))
    }

    /// The initialized counterpart of an uninitialized type.
    pub fn from_uninitialized(&mut self, id: RegTypeId) -> RegTypeId {
        let t = match self.get(id) {
            RegType::UninitializedReference(d, _) | RegType::UninitializedThisReference(d) => {
                RegType::Reference(d.clone())
            }
            RegType::UnresolvedUninitializedReference(d, _)
            | RegType::UnresolvedUninitializedThisReference(d) => {
                RegType::UnresolvedReference(d.clone())
            }
            _ => return RegTypeId::CONFLICT,
        };
        self.intern(t)
    }

    /// The element type of an array type. Arrays of unknown content, and
    /// non array types, give `Conflict`.
    pub fn component_type(&mut self, id: RegTypeId) -> RegTypeId {
        let component = match self.get(id) {
            RegType::Reference(d) | RegType::UnresolvedReference(d) => {
                d.strip_prefix('[').map(ToString::to_string)
            }
            _ => None,
        };
        component.map_or(RegTypeId::CONFLICT, |d| self.from_descriptor(&d))
    }

    /// The type of the register holding the high half of a wide value.
    #[must_use]
    pub fn high_half(id: RegTypeId) -> RegTypeId {
        match id {
            RegTypeId::LONG_LO => RegTypeId::LONG_HI,
            RegTypeId::DOUBLE_LO => RegTypeId::DOUBLE_HI,
            RegTypeId::CONSTANT_LO => RegTypeId::CONSTANT_HI,
            _ => RegTypeId::CONFLICT,
        }
    }

    #[must_use]
    pub fn descriptor(&self, id: RegTypeId) -> Option<&str> {
        self.get(id).descriptor()
    }

    /// Array types, including unresolved ones and merges of arrays.
    #[must_use]
    pub fn is_array_types(&self, id: RegTypeId) -> bool {
        self.all_components(id, &|d| d.starts_with('['))
    }

    /// Arrays of references.
    #[must_use]
    pub fn is_object_array_types(&self, id: RegTypeId) -> bool {
        self.all_components(id, &|d| d.starts_with("[L") || d.starts_with("[["))
    }

    fn all_components(&self, id: RegTypeId, pred: &dyn Fn(&str) -> bool) -> bool {
        match self.get(id) {
            RegType::Reference(d) | RegType::UnresolvedReference(d) => pred(d),
            RegType::UnresolvedMergedReference(resolved, unresolved) => {
                (*resolved == RegTypeId::ZERO || self.all_components(*resolved, pred))
                    && unresolved
                        .ones()
                        .all(|i| self.all_components(RegTypeId::new(i as u32), pred))
            }
            _ => false,
        }
    }

    /// Resolved interfaces.
    #[must_use]
    pub fn is_interface(&self, id: RegTypeId) -> bool {
        let t = self.get(id);
        t.has_class() && t.descriptor().map_or(false, |d| self.repo.is_interface(d))
    }

    /// Resolved classes that can be instantiated by `new-instance`.
    #[must_use]
    pub fn is_instantiable(&self, id: RegTypeId) -> bool {
        self.descriptor(id)
            .and_then(|d| self.repo.class_flags(d))
            .map_or(true, |flags| {
                !flags.intersects(
                    dv_dex::classes::ClassFlags::ACC_INTERFACE
                        | dv_dex::classes::ClassFlags::ACC_ABSTRACT,
                )
            })
    }

    /// Human readable form of a type, as used in failure messages.
    #[must_use]
    pub fn name(&self, id: RegTypeId) -> String {
        match self.get(id) {
            RegType::UnresolvedMergedReference(resolved, unresolved) => {
                let parts: Vec<String> = unresolved
                    .ones()
                    .map(|i| self.name(RegTypeId::new(i as u32)))
                    .collect();
                format!(
                    "UnresolvedMergedReferences({} | {})",
                    self.name(*resolved),
                    parts.join(", ")
                )
            }
            t => t.to_string(),
        }
    }

    /// Listing of the cache content, one type per line.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for i in 0..self.entries.len() {
            let id = RegTypeId::new(i as u32);
            let _ = writeln!(out, "{id}: {}", self.name(id));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning() {
        let repo = Repo::new();
        let mut cache = RegTypeCache::new(&repo);
        let s1 = cache.from_descriptor("Ljava/lang/String;");
        let s2 = cache.from_descriptor("Ljava/lang/String;");
        assert_eq!(s1, s2);
        assert_eq!(
            cache.from_descriptor("Ljava/lang/Object;"),
            RegTypeId::JAVA_LANG_OBJECT
        );
        assert_eq!(cache.from_descriptor("V"), RegTypeId::CONFLICT);
        assert_eq!(cache.from_descriptor("J"), RegTypeId::LONG_LO);

        let unknown = cache.from_descriptor("Lapp/Unknown;");
        assert!(cache.get(unknown).is_unresolved_types());
        assert!(cache.get(s1).has_class());
        assert_eq!(cache.len(), FIXED_TYPES.len() + 2);
    }

    #[test]
    fn constants() {
        assert_eq!(RegTypeCache::from_cat1_const(0), RegTypeId::ZERO);
        assert_eq!(RegTypeCache::from_cat1_const(1), RegTypeId::BOOLEAN_CONSTANT);
        assert_eq!(RegTypeCache::from_cat1_const(127), RegTypeId::POSITIVE_BYTE_CONSTANT);
        assert_eq!(RegTypeCache::from_cat1_const(128), RegTypeId::POSITIVE_SHORT_CONSTANT);
        assert_eq!(RegTypeCache::from_cat1_const(-1), RegTypeId::BYTE_CONSTANT);
        assert_eq!(RegTypeCache::from_cat1_const(-129), RegTypeId::SHORT_CONSTANT);
        assert_eq!(RegTypeCache::from_cat1_const(40000), RegTypeId::CHAR_CONSTANT);
        assert_eq!(RegTypeCache::from_cat1_const(70000), RegTypeId::INTEGER_CONSTANT);
        assert_eq!(RegTypeCache::from_cat1_const(-40000), RegTypeId::INTEGER_CONSTANT);
    }

    #[test]
    fn uninitialized_types() {
        let repo = Repo::new();
        let mut cache = RegTypeCache::new(&repo);
        let string = cache.from_descriptor("Ljava/lang/String;");
        let new = cache.uninitialized(string, 4);
        assert_ne!(new, cache.uninitialized(string, 6));
        assert_eq!(new, cache.uninitialized(string, 4));
        assert!(cache.get(new).is_uninitialized_types());
        assert_eq!(cache.from_uninitialized(new), string);

        let this = cache.uninitialized_this(RegTypeId::JAVA_LANG_OBJECT);
        assert_eq!(cache.from_uninitialized(this), RegTypeId::JAVA_LANG_OBJECT);
        assert_eq!(cache.uninitialized(RegTypeId::INTEGER, 0), RegTypeId::CONFLICT);
    }

    #[test]
    fn arrays() {
        let repo = Repo::new();
        let mut cache = RegTypeCache::new(&repo);
        let ints = cache.from_descriptor("[I");
        let strings = cache.from_descriptor("[Ljava/lang/String;");
        assert!(cache.is_array_types(ints) && !cache.is_object_array_types(ints));
        assert!(cache.is_object_array_types(strings));
        assert_eq!(cache.component_type(ints), RegTypeId::INTEGER);
        let string = cache.from_descriptor("Ljava/lang/String;");
        assert_eq!(cache.component_type(strings), string);
        assert_eq!(cache.component_type(string), RegTypeId::CONFLICT);
        assert!(cache.dump().contains("Reference: java.lang.String[]"));
    }
}
