//! Dalvik class fields data structures.

use crate::errors::DexResult;
use crate::strings::StringIdItem;
use crate::types::{Type, TypeIdItem};
use crate::{Dex, Index, PrettyPrint};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldIdItem {
    pub(crate) class_idx: Index<TypeIdItem>,
    pub(crate) type_idx: Index<TypeIdItem>,
    pub(crate) name_idx: Index<StringIdItem>,
}

impl FieldIdItem {
    #[inline]
    #[must_use]
    pub fn class_idx(&self) -> Index<TypeIdItem> {
        self.class_idx
    }

    #[inline]
    #[must_use]
    pub fn type_idx(&self) -> Index<TypeIdItem> {
        self.type_idx
    }

    /// Descriptor of the class that defines the field.
    pub fn class_descriptor<'a>(&self, dex: &'a Dex) -> DexResult<&'a str> {
        dex.type_descriptor(self.class_idx)
    }

    /// Descriptor of the field type.
    pub fn type_descriptor<'a>(&self, dex: &'a Dex) -> DexResult<&'a str> {
        dex.type_descriptor(self.type_idx)
    }

    pub fn name<'a>(&self, dex: &'a Dex) -> DexResult<&'a str> {
        dex.string(self.name_idx)
    }
}

impl PrettyPrint for FieldIdItem {
    fn pp(&self, f: &mut fmt::Formatter, dex: &Dex) -> DexResult<()> {
        let class = Type::try_from(self.class_descriptor(dex)?)?;
        let type_ = Type::try_from(self.type_descriptor(dex)?)?;
        write!(
            f,
            "{} {}.{}",
            type_.to_java_string(),
            class.to_java_string(),
            self.name(dex)?
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedField {
    pub(crate) field_idx: Index<FieldIdItem>,
    pub(crate) access_flags: FieldFlags,
}

impl EncodedField {
    #[inline]
    #[must_use]
    pub fn new(field_idx: Index<FieldIdItem>, access_flags: FieldFlags) -> Self {
        Self {
            field_idx,
            access_flags,
        }
    }

    #[inline]
    #[must_use]
    pub fn field_idx(&self) -> Index<FieldIdItem> {
        self.field_idx
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> FieldFlags {
        self.access_flags
    }
}

bitflags! {
    pub struct FieldFlags: u32 {
        const ACC_PUBLIC                = 0x00001;
        const ACC_PRIVATE               = 0x00002;
        const ACC_PROTECTED             = 0x00004;
        const ACC_STATIC                = 0x00008;
        const ACC_FINAL                 = 0x00010;
        const ACC_VOLATILE              = 0x00040;
        const ACC_TRANSIENT             = 0x00080;
        const ACC_SYNTHETIC             = 0x01000;
        const ACC_ENUM                  = 0x04000;
    }
}

serde_flags!(FieldFlags);

impl fmt::Display for FieldFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (Self::ACC_PUBLIC, "public"),
            (Self::ACC_PRIVATE, "private"),
            (Self::ACC_PROTECTED, "protected"),
            (Self::ACC_STATIC, "static"),
            (Self::ACC_FINAL, "final"),
            (Self::ACC_VOLATILE, "volatile"),
            (Self::ACC_TRANSIENT, "transient"),
            (Self::ACC_SYNTHETIC, "synthetic"),
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
