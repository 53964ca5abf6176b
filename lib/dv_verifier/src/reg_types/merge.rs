//! Lattice operations on register types: join and assignability.

use crate::reg_types::{RegType, RegTypeCache, RegTypeId, CONSTANT_KINDS};
use fixedbitset::FixedBitSet;

impl<'r> RegTypeCache<'r> {
    /// Computes the least upper bound of two types, `Conflict` when there
    /// is none. The operation is commutative.
    pub fn merge(&mut self, a: RegTypeId, b: RegTypeId) -> RegTypeId {
        if a == b {
            return a;
        }
        let (ta, tb) = (self.get(a), self.get(b));
        if ta.is_conflict() || tb.is_conflict() || ta.is_undefined() || tb.is_undefined() {
            return RegTypeId::CONFLICT;
        }

        if ta.is_constant() && tb.is_constant() {
            return merge_constants(a, b);
        }
        if ta.is_integral_types() && tb.is_integral_types() {
            return if ta.is_boolean_types() && tb.is_boolean_types() {
                RegTypeId::BOOLEAN
            } else if ta.is_byte_types() && tb.is_byte_types() {
                RegTypeId::BYTE
            } else if ta.is_short_types() && tb.is_short_types() {
                RegTypeId::SHORT
            } else if ta.is_char_types() && tb.is_char_types() {
                RegTypeId::CHAR
            } else {
                RegTypeId::INTEGER
            };
        }
        if (ta.is_float_types() && tb.is_float_types())
            || (ta.is_long_types() && tb.is_long_types())
            || (ta.is_long_high_types() && tb.is_long_high_types())
            || (ta.is_double_types() && tb.is_double_types())
            || (ta.is_double_high_types() && tb.is_double_high_types())
        {
            // one side at most is a constant here
            return if ta.is_constant_types() { b } else { a };
        }
        if !ta.is_reference_types() || !tb.is_reference_types() {
            return RegTypeId::CONFLICT;
        }

        if ta.is_uninitialized_types() || tb.is_uninitialized_types() {
            // uninitialized types only merge with themselves
            return RegTypeId::CONFLICT;
        }
        if ta.is_zero_or_null() && tb.is_zero_or_null() {
            return RegTypeId::NULL;
        }
        if ta.is_java_lang_object() || tb.is_java_lang_object() {
            return RegTypeId::JAVA_LANG_OBJECT;
        }
        if ta.is_zero_or_null() {
            return b;
        }
        if tb.is_zero_or_null() {
            return a;
        }
        if ta.is_unresolved_types() || tb.is_unresolved_types() {
            return self.merge_unresolved(a, b);
        }

        match (ta.descriptor(), tb.descriptor()) {
            (Some(da), Some(db)) => {
                let join = self.repo().common_super_class(da, db);
                log::trace!("class join of {da} and {db} is {join}");
                self.from_descriptor(&join)
            }
            _ => RegTypeId::CONFLICT,
        }
    }

    /// Merges types of which one at least is unresolved, keeping track of
    /// the unresolved components symbolically.
    fn merge_unresolved(&mut self, a: RegTypeId, b: RegTypeId) -> RegTypeId {
        let mut unresolved = FixedBitSet::default();
        let left = self.split_unresolved(a, &mut unresolved);
        let right = self.split_unresolved(b, &mut unresolved);

        let resolved = self.merge(left, right);
        if self.get(resolved).is_conflict() {
            return RegTypeId::CONFLICT;
        }
        if self.get(resolved).is_java_lang_object() {
            return RegTypeId::JAVA_LANG_OBJECT;
        }
        // canonical size, so that equal sets compare equal
        let len = unresolved.ones().last().map_or(0, |max| max + 1);
        let mut canonical = FixedBitSet::with_capacity(len);
        canonical.extend(unresolved.ones());
        self.intern(RegType::UnresolvedMergedReference(resolved, canonical))
    }

    /// Returns the resolved part of a type (`Zero` if there is none),
    /// recording its unresolved components in `unresolved`.
    fn split_unresolved(&self, id: RegTypeId, unresolved: &mut FixedBitSet) -> RegTypeId {
        match self.get(id) {
            RegType::UnresolvedMergedReference(resolved, parts) => {
                unresolved.grow(parts.len());
                unresolved.union_with(parts);
                *resolved
            }
            t if t.is_unresolved_types() => {
                unresolved.grow(id.index() + 1);
                unresolved.insert(id.index());
                RegTypeId::ZERO
            }
            _ => id,
        }
    }

    /// Checks that a value of type `rhs` can be stored where a `lhs` is
    /// expected. Resolved interfaces accept any reference.
    #[must_use]
    pub fn is_assignable_from(&self, lhs: RegTypeId, rhs: RegTypeId) -> bool {
        self.assignable_from(lhs, rhs, false)
    }

    /// Same as [`Self::is_assignable_from`], interfaces being checked too.
    #[must_use]
    pub fn is_strictly_assignable_from(&self, lhs: RegTypeId, rhs: RegTypeId) -> bool {
        self.assignable_from(lhs, rhs, true)
    }

    fn assignable_from(&self, lhs: RegTypeId, rhs: RegTypeId, strict: bool) -> bool {
        if lhs == rhs {
            return true;
        }
        let (tl, tr) = (self.get(lhs), self.get(rhs));
        match tl {
            RegType::Boolean => tr.is_boolean_types(),
            RegType::Byte => tr.is_byte_types(),
            RegType::Short => tr.is_short_types(),
            RegType::Char => tr.is_char_types(),
            RegType::Integer => tr.is_integral_types(),
            RegType::Float => tr.is_float_types(),
            RegType::LongLo => tr.is_long_types(),
            RegType::DoubleLo => tr.is_double_types(),
            RegType::Conflict => {
                log::warn!("assignability check against a conflict type");
                false
            }
            t if t.is_reference_types() => {
                if tr.is_zero_or_null() {
                    true
                } else if !tr.is_reference_types() {
                    false
                } else if tl.is_uninitialized_types() || tr.is_uninitialized_types() {
                    false
                } else if tl.is_java_lang_object() {
                    true
                } else if !strict && self.is_interface(lhs) {
                    // interfaces are checked at runtime
                    true
                } else if tl.descriptor() == Some("[Ljava/lang/Object;") && tl.has_class() {
                    self.is_object_array_types(rhs)
                } else if tl.has_class() && tr.has_class() {
                    match (tl.descriptor(), tr.descriptor()) {
                        (Some(dl), Some(dr)) => self.repo().is_assignable(dl, dr),
                        _ => false,
                    }
                } else {
                    // unresolved types are only assignable from null and themselves
                    false
                }
            }
            _ => false,
        }
    }
}

/// Joins two integer constants into the smallest kind holding both ranges.
fn merge_constants(a: RegTypeId, b: RegTypeId) -> RegTypeId {
    let (Some((alo, ahi)), Some((blo, bhi))) = (
        RegTypeCache::constant_range(a),
        RegTypeCache::constant_range(b),
    ) else {
        return RegTypeId::CONFLICT;
    };
    let (lo, hi) = (alo.min(blo), ahi.max(bhi));
    CONSTANT_KINDS
        .iter()
        .find(|(_, klo, khi)| *klo <= lo && hi <= *khi)
        .map_or(RegTypeId::INTEGER_CONSTANT, |(kind, _, _)| *kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::Repo;
    use crate::reg_types::FIXED_TYPES;
    use crate::testing::base_classes_repo;
    use proptest::prelude::*;

    #[test]
    fn primitive_merges() {
        let repo = Repo::new();
        let mut cache = RegTypeCache::new(&repo);
        assert_eq!(
            cache.merge(RegTypeId::ZERO, RegTypeId::POSITIVE_BYTE_CONSTANT),
            RegTypeId::POSITIVE_BYTE_CONSTANT
        );
        assert_eq!(
            cache.merge(RegTypeId::BYTE_CONSTANT, RegTypeId::CHAR_CONSTANT),
            RegTypeId::INTEGER_CONSTANT
        );
        assert_eq!(
            cache.merge(RegTypeId::BYTE_CONSTANT, RegTypeId::POSITIVE_SHORT_CONSTANT),
            RegTypeId::SHORT_CONSTANT
        );
        assert_eq!(cache.merge(RegTypeId::ZERO, RegTypeId::BOOLEAN), RegTypeId::BOOLEAN);
        assert_eq!(cache.merge(RegTypeId::BYTE, RegTypeId::CHAR), RegTypeId::INTEGER);
        assert_eq!(cache.merge(RegTypeId::BOOLEAN, RegTypeId::BYTE), RegTypeId::BYTE);
        assert_eq!(cache.merge(RegTypeId::ZERO, RegTypeId::FLOAT), RegTypeId::FLOAT);
        assert_eq!(cache.merge(RegTypeId::INTEGER, RegTypeId::FLOAT), RegTypeId::CONFLICT);
        assert_eq!(
            cache.merge(RegTypeId::CONSTANT_LO, RegTypeId::DOUBLE_LO),
            RegTypeId::DOUBLE_LO
        );
        assert_eq!(cache.merge(RegTypeId::LONG_LO, RegTypeId::DOUBLE_LO), RegTypeId::CONFLICT);
        assert_eq!(cache.merge(RegTypeId::UNDEFINED, RegTypeId::INTEGER), RegTypeId::CONFLICT);
    }

    #[test]
    fn reference_merges() {
        let repo = base_classes_repo();
        let mut cache = RegTypeCache::new(&repo);
        let derived = cache.from_descriptor("Lapp/Derived;");
        let other = cache.from_descriptor("Lapp/Other;");
        let base = cache.from_descriptor("Lapp/Base;");
        let string = cache.from_descriptor("Ljava/lang/String;");

        assert_eq!(cache.merge(derived, other), base);
        assert_eq!(cache.merge(derived, string), RegTypeId::JAVA_LANG_OBJECT);
        assert_eq!(cache.merge(RegTypeId::ZERO, derived), derived);
        assert_eq!(cache.merge(RegTypeId::NULL, RegTypeId::ZERO), RegTypeId::NULL);
        assert_eq!(cache.merge(RegTypeId::INTEGER, derived), RegTypeId::CONFLICT);

        let new = cache.uninitialized(derived, 2);
        assert_eq!(cache.merge(new, derived), RegTypeId::CONFLICT);
        assert_eq!(cache.merge(new, new), new);

        let derived_array = cache.from_descriptor("[Lapp/Derived;");
        let other_array = cache.from_descriptor("[Lapp/Other;");
        let base_array = cache.from_descriptor("[Lapp/Base;");
        assert_eq!(cache.merge(derived_array, other_array), base_array);
        let ints = cache.from_descriptor("[I");
        assert_eq!(cache.merge(ints, base_array), RegTypeId::JAVA_LANG_OBJECT);
    }

    #[test]
    fn unresolved_merges() {
        let repo = base_classes_repo();
        let mut cache = RegTypeCache::new(&repo);
        let orphan = cache.from_descriptor("Lapp/Orphan;");
        let unknown = cache.from_descriptor("Lapp/Unknown;");
        let derived = cache.from_descriptor("Lapp/Derived;");
        assert!(cache.get(orphan).is_unresolved_types());

        let m1 = cache.merge(orphan, unknown);
        assert!(cache.get(m1).is_unresolved_merged_reference());
        assert_eq!(m1, cache.merge(unknown, orphan));
        assert_eq!(cache.merge(m1, orphan), m1);

        let m2 = cache.merge(m1, derived);
        assert_ne!(m1, m2);
        assert_eq!(m2, cache.merge(derived, m1));
        assert!(cache.name(m2).starts_with("UnresolvedMergedReferences(Reference: app.Derived | "));

        assert_eq!(
            cache.merge(unknown, RegTypeId::JAVA_LANG_OBJECT),
            RegTypeId::JAVA_LANG_OBJECT
        );
        let unknown_array = cache.from_descriptor("[Lapp/Unknown;");
        let orphan_array = cache.from_descriptor("[Lapp/Orphan;");
        let ints = cache.from_descriptor("[I");
        let m3 = cache.merge(unknown_array, orphan_array);
        assert!(cache.is_object_array_types(m3));
        let m4 = cache.merge(unknown_array, ints);
        assert!(cache.is_array_types(m4) && !cache.is_object_array_types(m4));
    }

    #[test]
    fn assignability() {
        let repo = base_classes_repo();
        let mut cache = RegTypeCache::new(&repo);
        let base = cache.from_descriptor("Lapp/Base;");
        let derived = cache.from_descriptor("Lapp/Derived;");
        let api = cache.from_descriptor("Lapp/Api;");
        let string = cache.from_descriptor("Ljava/lang/String;");
        let unknown = cache.from_descriptor("Lapp/Unknown;");
        let objects = cache.from_descriptor("[Ljava/lang/Object;");
        let strings = cache.from_descriptor("[Ljava/lang/String;");
        let ints = cache.from_descriptor("[I");

        assert!(cache.is_assignable_from(base, derived));
        assert!(!cache.is_assignable_from(derived, base));
        assert!(cache.is_assignable_from(base, RegTypeId::ZERO));
        assert!(cache.is_assignable_from(RegTypeId::JAVA_LANG_OBJECT, unknown));
        assert!(!cache.is_assignable_from(base, unknown));
        assert!(cache.is_assignable_from(api, string));
        assert!(!cache.is_strictly_assignable_from(api, string));
        assert!(cache.is_strictly_assignable_from(api, derived));
        assert!(cache.is_assignable_from(objects, strings));
        assert!(!cache.is_assignable_from(objects, ints));

        assert!(cache.is_assignable_from(RegTypeId::BOOLEAN, RegTypeId::ZERO));
        assert!(!cache.is_assignable_from(RegTypeId::BOOLEAN, RegTypeId::POSITIVE_BYTE_CONSTANT));
        assert!(cache.is_assignable_from(RegTypeId::INTEGER, RegTypeId::CHAR));
        assert!(!cache.is_assignable_from(RegTypeId::INTEGER, RegTypeId::FLOAT));
        assert!(cache.is_assignable_from(RegTypeId::FLOAT, RegTypeId::INTEGER_CONSTANT));
        assert!(cache.is_assignable_from(RegTypeId::LONG_LO, RegTypeId::CONSTANT_LO));
        assert!(!cache.is_assignable_from(RegTypeId::LONG_LO, RegTypeId::DOUBLE_LO));
    }

    const REFERENCES: &[&str] = &[
        "Lapp/Base;",
        "Lapp/Derived;",
        "Lapp/Other;",
        "Lapp/Api;",
        "Lapp/Orphan;",
        "Lapp/Unknown;",
        "Ljava/lang/String;",
        "[Lapp/Derived;",
        "[Lapp/Other;",
        "[Lapp/Unknown;",
        "[I",
    ];

    /// A type to intern in a fresh cache: a fixed type, a reference type,
    /// or the join of two reference types (possibly an unresolved merge).
    #[derive(Debug, Clone)]
    enum Sample {
        Fixed(u32),
        Reference(usize),
        Joined(usize, usize),
    }

    fn sample() -> impl Strategy<Value = Sample> {
        prop_oneof![
            (0..FIXED_TYPES.len() as u32).prop_map(Sample::Fixed),
            (0..REFERENCES.len()).prop_map(Sample::Reference),
            (0..REFERENCES.len(), 0..REFERENCES.len()).prop_map(|(a, b)| Sample::Joined(a, b)),
        ]
    }

    fn intern(cache: &mut RegTypeCache, sample: &Sample) -> RegTypeId {
        match sample {
            Sample::Fixed(id) => RegTypeId::new(*id),
            Sample::Reference(i) => cache.from_descriptor(REFERENCES[*i]),
            Sample::Joined(i, j) => {
                let a = cache.from_descriptor(REFERENCES[*i]);
                let b = cache.from_descriptor(REFERENCES[*j]);
                cache.merge(a, b)
            }
        }
    }

    proptest! {
        #[test]
        fn merge_is_commutative(a in sample(), b in sample()) {
            let repo = base_classes_repo();
            let mut cache = RegTypeCache::new(&repo);
            let (a, b) = (intern(&mut cache, &a), intern(&mut cache, &b));
            prop_assert_eq!(cache.merge(a, b), cache.merge(b, a));
        }

        #[test]
        fn merge_is_idempotent(a in sample(), b in sample()) {
            let repo = base_classes_repo();
            let mut cache = RegTypeCache::new(&repo);
            let (a, b) = (intern(&mut cache, &a), intern(&mut cache, &b));
            let ab = cache.merge(a, b);
            prop_assert_eq!(cache.merge(a, ab), ab);
            prop_assert_eq!(cache.merge(ab, ab), ab);
        }
    }
}
