//! Dalvik classes data structures.

use crate::errors::DexResult;
use crate::fields::EncodedField;
use crate::methods::EncodedMethod;
use crate::types::TypeIdItem;
use crate::{Dex, Index};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The Dalvik class definition, with its class data inlined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDefItem {
    pub(crate) class_idx: Index<TypeIdItem>,
    pub(crate) access_flags: ClassFlags,
    #[serde(default)]
    pub(crate) superclass_idx: Option<Index<TypeIdItem>>,
    #[serde(default)]
    pub(crate) interfaces: Vec<Index<TypeIdItem>>,
    #[serde(default)]
    pub(crate) static_fields: Vec<EncodedField>,
    #[serde(default)]
    pub(crate) instance_fields: Vec<EncodedField>,
    #[serde(default)]
    pub(crate) direct_methods: Vec<EncodedMethod>,
    #[serde(default)]
    pub(crate) virtual_methods: Vec<EncodedMethod>,
}

impl ClassDefItem {
    #[inline]
    #[must_use]
    pub fn class_idx(&self) -> Index<TypeIdItem> {
        self.class_idx
    }

    /// Returns the descriptor of the class (`Lcom/example/Foo;`).
    pub fn descriptor<'a>(&self, dex: &'a Dex) -> DexResult<&'a str> {
        dex.type_descriptor(self.class_idx)
    }

    /// Returns the flags of the class.
    #[inline]
    #[must_use]
    pub const fn flags(&self) -> ClassFlags {
        self.access_flags
    }

    /// Returns the descriptor of the superclass if it exists, returns [`None`] otherwise.
    pub fn superclass<'a>(&self, dex: &'a Dex) -> DexResult<Option<&'a str>> {
        self.superclass_idx
            .map(|idx| dex.type_descriptor(idx))
            .transpose()
    }

    /// Returns the descriptors of the interfaces implemented by the class.
    pub fn interfaces<'a>(&self, dex: &'a Dex) -> DexResult<Vec<&'a str>> {
        self.interfaces
            .iter()
            .map(|idx| dex.type_descriptor(*idx))
            .collect()
    }

    #[inline]
    pub fn static_fields(&self) -> impl Iterator<Item = &EncodedField> {
        self.static_fields.iter()
    }

    #[inline]
    pub fn instance_fields(&self) -> impl Iterator<Item = &EncodedField> {
        self.instance_fields.iter()
    }

    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = &EncodedField> {
        self.static_fields.iter().chain(self.instance_fields.iter())
    }

    #[inline]
    pub fn direct_methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods.iter()
    }

    #[inline]
    pub fn virtual_methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.virtual_methods.iter()
    }

    /// Direct methods first, then virtual ones, as they are verified.
    #[inline]
    pub fn methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }
}

bitflags! {
    /// Dalvik class flags
    pub struct ClassFlags: u32 {
        const ACC_PUBLIC                = 0x00001;
        const ACC_PRIVATE               = 0x00002;
        const ACC_PROTECTED             = 0x00004;
        const ACC_STATIC                = 0x00008;
        const ACC_FINAL                 = 0x00010;
        const ACC_INTERFACE             = 0x00200;
        const ACC_ABSTRACT              = 0x00400;
        const ACC_SYNTHETIC             = 0x01000;
        const ACC_ANNOTATION            = 0x02000;
        const ACC_ENUM                  = 0x04000;
    }
}

serde_flags!(ClassFlags);

impl fmt::Display for ClassFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (Self::ACC_PUBLIC, "public"),
            (Self::ACC_PRIVATE, "private"),
            (Self::ACC_PROTECTED, "protected"),
            (Self::ACC_STATIC, "static"),
            (Self::ACC_FINAL, "final"),
            (Self::ACC_INTERFACE, "interface"),
            (Self::ACC_ABSTRACT, "abstract"),
            (Self::ACC_SYNTHETIC, "synthetic"),
            (Self::ACC_ANNOTATION, "annotation"),
            (Self::ACC_ENUM, "enum"),
        ];
        for (flag, name) in names {
            if self.contains(flag) {
                write!(f, "{name} ")?;
            }
        }
        Ok(())
    }
}
