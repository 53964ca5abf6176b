//! Dalvik class methods data structures.

use crate::code::CodeItem;
use crate::errors::DexResult;
use crate::strings::StringIdItem;
use crate::types::{ProtoIdItem, Type, TypeIdItem};
use crate::{Dex, DexIndex, Index, PrettyPrint};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodIdItem {
    pub(crate) class_idx: Index<TypeIdItem>,
    pub(crate) proto_idx: Index<ProtoIdItem>,
    pub(crate) name_idx: Index<StringIdItem>,
}

impl MethodIdItem {
    #[inline]
    #[must_use]
    pub fn class_idx(&self) -> Index<TypeIdItem> {
        self.class_idx
    }

    #[inline]
    #[must_use]
    pub fn proto_idx(&self) -> Index<ProtoIdItem> {
        self.proto_idx
    }

    /// Descriptor of the type that defines the method.
    /// According to the Dalvik documentation, this must be a class type or an array type.
    pub fn class_descriptor<'a>(&self, dex: &'a Dex) -> DexResult<&'a str> {
        dex.type_descriptor(self.class_idx)
    }

    pub fn proto<'a>(&self, dex: &'a Dex) -> DexResult<&'a ProtoIdItem> {
        self.proto_idx.get(dex)
    }

    pub fn name<'a>(&self, dex: &'a Dex) -> DexResult<&'a str> {
        dex.string(self.name_idx)
    }

    /// Returns the `(params)ret` signature, the key used for method lookups.
    pub fn signature(&self, dex: &Dex) -> DexResult<String> {
        let proto = self.proto(dex)?;
        let mut s = String::from("(");
        for p in proto.parameter_descriptors(dex)? {
            s.push_str(p);
        }
        s.push(')');
        s.push_str(proto.return_descriptor(dex)?);
        Ok(s)
    }
}

impl PrettyPrint for MethodIdItem {
    fn pp(&self, f: &mut fmt::Formatter, dex: &Dex) -> DexResult<()> {
        let proto = self.proto(dex)?;
        let definer = Type::try_from(self.class_descriptor(dex)?)?;
        write!(
            f,
            "{} {}.{}(",
            proto.return_type(dex)?.to_java_string(),
            definer.to_java_string(),
            self.name(dex)?
        )?;
        for (i, p) in proto.parameters_types(dex)?.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.to_java_string())?;
        }
        write!(f, ")")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedMethod {
    pub(crate) method_idx: Index<MethodIdItem>,
    pub(crate) access_flags: MethodFlags,
    #[serde(default)]
    pub(crate) code: Option<CodeItem>,
}

impl EncodedMethod {
    #[inline]
    #[must_use]
    pub fn new(
        method_idx: Index<MethodIdItem>,
        access_flags: MethodFlags,
        code: Option<CodeItem>,
    ) -> Self {
        Self {
            method_idx,
            access_flags,
            code,
        }
    }

    #[inline]
    #[must_use]
    pub fn method_idx(&self) -> Index<MethodIdItem> {
        self.method_idx
    }

    pub fn descriptor<'a>(&self, dex: &'a Dex) -> DexResult<&'a MethodIdItem> {
        self.method_idx.get(dex)
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> MethodFlags {
        self.access_flags
    }

    #[inline]
    #[must_use]
    pub fn code(&self) -> Option<&CodeItem> {
        self.code.as_ref()
    }
}

bitflags! {
    pub struct MethodFlags: u32 {
        const ACC_PUBLIC                = 0x00001;
        const ACC_PRIVATE               = 0x00002;
        const ACC_PROTECTED             = 0x00004;
        const ACC_STATIC                = 0x00008;
        const ACC_FINAL                 = 0x00010;
        const ACC_SYNCHRONIZED          = 0x00020;
        const ACC_BRIDGE                = 0x00040;
        const ACC_VARARGS               = 0x00080;
        const ACC_NATIVE                = 0x00100;
        const ACC_ABSTRACT              = 0x00400;
        const ACC_STRICT                = 0x00800;
        const ACC_SYNTHETIC             = 0x01000;
        const ACC_CONSTRUCTOR           = 0x10000;
        const ACC_DECLARED_SYNCHRONIZED = 0x20000;
    }
}

serde_flags!(MethodFlags);

impl fmt::Display for MethodFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (Self::ACC_PUBLIC, "public"),
            (Self::ACC_PRIVATE, "private"),
            (Self::ACC_PROTECTED, "protected"),
            (Self::ACC_STATIC, "static"),
            (Self::ACC_FINAL, "final"),
            (Self::ACC_SYNCHRONIZED, "synchronized"),
            (Self::ACC_BRIDGE, "bridge"),
            (Self::ACC_VARARGS, "varargs"),
            (Self::ACC_NATIVE, "native"),
            (Self::ACC_ABSTRACT, "abstract"),
            (Self::ACC_STRICT, "strict"),
            (Self::ACC_SYNTHETIC, "synthetic"),
            (Self::ACC_CONSTRUCTOR, "constructor"),
            (Self::ACC_DECLARED_SYNCHRONIZED, "declared_synchronized"),
        ];
        for (flag, name) in names {
            if self.contains(flag) {
                write!(f, "{name} ")?;
            }
        }
        Ok(())
    }
}
