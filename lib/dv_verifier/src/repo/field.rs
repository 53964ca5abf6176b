use crate::repo::{ClassUid, FieldUid};
use dv_dex::fields::FieldFlags;
use dv_dex::types::pretty_descriptor;
use std::fmt;

/// A field declared by a class of the class path.
#[derive(Debug, Clone)]
pub struct Field {
    // Unique identifier in the repository
    uid: FieldUid,
    // Declaring class
    class: ClassUid,
    class_descriptor: String,
    name: String,
    type_descriptor: String,
    flags: FieldFlags,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}.{}",
            pretty_descriptor(&self.type_descriptor),
            pretty_descriptor(&self.class_descriptor),
            self.name
        )
    }
}

impl Field {
    pub(crate) fn new(
        uid: FieldUid,
        class: ClassUid,
        class_descriptor: &str,
        name: &str,
        type_descriptor: &str,
        flags: FieldFlags,
    ) -> Self {
        Self {
            uid,
            class,
            class_descriptor: class_descriptor.to_string(),
            name: name.to_string(),
            type_descriptor: type_descriptor.to_string(),
            flags,
        }
    }

    #[inline]
    #[must_use]
    pub const fn uid(&self) -> FieldUid {
        self.uid
    }

    #[inline]
    #[must_use]
    pub const fn class(&self) -> ClassUid {
        self.class
    }

    #[inline]
    #[must_use]
    pub fn class_descriptor(&self) -> &str {
        &self.class_descriptor
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn type_descriptor(&self) -> &str {
        &self.type_descriptor
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> FieldFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::ACC_STATIC)
    }

    #[inline]
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.flags.contains(FieldFlags::ACC_FINAL)
    }
}
