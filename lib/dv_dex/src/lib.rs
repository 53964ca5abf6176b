//! Dex index tables, Dalvik instructions and bytecode decoding.
//!
//! The binary dex container is not parsed here: a [`Dex`] is the in-memory
//! image of the index tables of a dex file (strings, types, prototypes, fields,
//! methods, class definitions, call sites and method handles) together with the
//! code items of the defined methods. It can be loaded from its JSON form
//! ([`open`], [`Dex::from_json_str`]) or assembled with a [`builder::DexBuilder`].
//!
//! Method bytecode is kept as raw 16-bit code units, as in a dex file, and
//! decoded on demand ([`decode`]) into [`instrs::Instr`] values.

// Access flags are stored as plain integers, unknown bits are dropped on load.
macro_rules! serde_flags {
    ($flags:ty) => {
        impl serde::Serialize for $flags {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u32(self.bits())
            }
        }

        impl<'de> serde::Deserialize<'de> for $flags {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                <u32 as serde::Deserialize>::deserialize(deserializer).map(Self::from_bits_truncate)
            }
        }
    };
}

mod decoder;
mod formats;
mod strings;

pub mod builder;
pub mod classes;
pub mod code;
pub mod errors;
pub mod fields;
pub mod instrs;
pub mod methods;
pub mod registers;
pub mod types;

pub use crate::decoder::{assemble, decode, decode_all};
pub use crate::strings::StringIdItem;

use crate::classes::ClassDefItem;
use crate::code::{CallSiteIdItem, MethodHandleItem};
use crate::errors::{DexError, DexResult};
use crate::fields::FieldIdItem;
use crate::methods::MethodIdItem;
use crate::types::{ProtoIdItem, TypeIdItem};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;

/// A typed index into one of the [`Dex`] tables.
pub struct Index<T> {
    value: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Index<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Index<T> {}

impl<T> PartialEq for Index<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Index<T> {}

impl<T> PartialOrd for Index<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Index<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Index<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> fmt::Debug for Index<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.value)
    }
}

impl<T> fmt::Display for Index<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> From<u16> for Index<T> {
    fn from(value: u16) -> Self {
        Self::new(u32::from(value))
    }
}

impl<T> From<u32> for Index<T> {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl<T> Serialize for Index<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.value)
    }
}

impl<'de, T> Deserialize<'de> for Index<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(Self::new)
    }
}

impl<T> Index<T> {
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self {
            value,
            marker: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.value
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.value as usize
    }
}

/// Resolution of a typed [`Index`] into the corresponding table entry.
pub trait DexIndex: Sized {
    type T;

    fn get(self, dex: &Dex) -> DexResult<&Self::T>;
}

macro_rules! dex_table {
    ($item:ty, $table:ident, $name:literal) => {
        impl DexIndex for Index<$item> {
            type T = $item;

            fn get(self, dex: &Dex) -> DexResult<&Self::T> {
                dex.$table
                    .get(self.as_usize())
                    .ok_or_else(|| DexError::ResNotFound(format!("{} #{}", $name, self.value)))
            }
        }
    };
}

dex_table!(StringIdItem, strings, "StringIdItem");
dex_table!(TypeIdItem, types, "TypeIdItem");
dex_table!(ProtoIdItem, protos, "ProtoIdItem");
dex_table!(FieldIdItem, fields, "FieldIdItem");
dex_table!(MethodIdItem, methods, "MethodIdItem");
dex_table!(ClassDefItem, classes, "ClassDefItem");
dex_table!(CallSiteIdItem, call_sites, "CallSiteIdItem");
dex_table!(MethodHandleItem, method_handles, "MethodHandleItem");

pub trait PrettyPrint {
    fn pp(&self, f: &mut fmt::Formatter, dex: &Dex) -> DexResult<()>;
}

pub struct PrettyPrinter<'a, T>(pub &'a T, pub &'a Dex);

impl<'a, T: PrettyPrint> fmt::Display for PrettyPrinter<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.pp(f, self.1).map_err(|_| fmt::Error)
    }
}

/// The top-level Dex data structure.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Dex {
    #[serde(default)]
    pub(crate) strings: Vec<StringIdItem>,
    #[serde(default)]
    pub(crate) types: Vec<TypeIdItem>,
    #[serde(default)]
    pub(crate) protos: Vec<ProtoIdItem>,
    #[serde(default)]
    pub(crate) fields: Vec<FieldIdItem>,
    #[serde(default)]
    pub(crate) methods: Vec<MethodIdItem>,
    #[serde(default)]
    pub(crate) classes: Vec<ClassDefItem>,
    #[serde(default)]
    pub(crate) call_sites: Vec<CallSiteIdItem>,
    #[serde(default)]
    pub(crate) method_handles: Vec<MethodHandleItem>,
}

impl Dex {
    /// Parses the JSON form of a dex model.
    pub fn from_json_str(input: &str) -> DexResult<Self> {
        let dex: Self = serde_json::from_str(input)?;
        log::debug!(
            "loaded dex model: {} classes, {} methods, {} fields",
            dex.classes.len(),
            dex.methods.len(),
            dex.fields.len()
        );
        Ok(dex)
    }

    /// Serializes the dex model to its JSON form.
    pub fn to_json_string(&self) -> DexResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[inline]
    #[must_use]
    pub fn nb_strings(&self) -> usize {
        self.strings.len()
    }

    #[inline]
    #[must_use]
    pub fn nb_types(&self) -> usize {
        self.types.len()
    }

    #[inline]
    #[must_use]
    pub fn nb_protos(&self) -> usize {
        self.protos.len()
    }

    #[inline]
    #[must_use]
    pub fn nb_fields(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    #[must_use]
    pub fn nb_methods(&self) -> usize {
        self.methods.len()
    }

    #[inline]
    #[must_use]
    pub fn nb_call_sites(&self) -> usize {
        self.call_sites.len()
    }

    #[inline]
    #[must_use]
    pub fn nb_method_handles(&self) -> usize {
        self.method_handles.len()
    }

    #[inline]
    pub fn iter_type_ids(&self) -> impl Iterator<Item = (Index<TypeIdItem>, &TypeIdItem)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (Index::new(i as u32), t))
    }

    #[inline]
    pub fn iter_method_ids(&self) -> impl Iterator<Item = (Index<MethodIdItem>, &MethodIdItem)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (Index::new(i as u32), m))
    }

    #[inline]
    pub fn iter_class_defs(&self) -> impl Iterator<Item = &ClassDefItem> {
        self.classes.iter()
    }

    /// Returns the descriptor string of a type index (`Ljava/lang/Object;`, `[I`, ...).
    pub fn type_descriptor(&self, idx: Index<TypeIdItem>) -> DexResult<&str> {
        idx.get(self)?.descriptor(self)
    }

    /// Returns the content of a string index.
    pub fn string(&self, idx: Index<StringIdItem>) -> DexResult<&str> {
        Ok(idx.get(self)?.as_str())
    }
}

/// Opens and parses the given dex model file (JSON form).
pub fn open<P: AsRef<Path>>(path: P) -> DexResult<Dex> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Dex::from_json_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DexBuilder;

    #[test]
    fn index_out_of_table() {
        let dex = Dex::default();
        let idx: Index<TypeIdItem> = Index::new(3);
        assert!(matches!(idx.get(&dex), Err(DexError::ResNotFound(_))));
    }

    #[test]
    fn json_model_roundtrip() {
        let mut builder = DexBuilder::new();
        let m = builder.method("LFoo;", "bar", "I", &["J", "Ljava/lang/String;"]);
        let dex = builder.build();

        let json = dex.to_json_string().unwrap();
        let reloaded = Dex::from_json_str(&json).unwrap();
        let method = m.get(&reloaded).unwrap();
        assert_eq!(method.name(&reloaded).unwrap(), "bar");
        assert_eq!(
            format!("{}", PrettyPrinter(method, &reloaded)),
            "int Foo.bar(long, java.lang.String)"
        );
    }

    #[test]
    fn json_model_with_missing_tables() {
        let dex = Dex::from_json_str(r#"{"strings": ["LFoo;"], "types": [{"descriptor_idx": 0}]}"#)
            .unwrap();
        assert_eq!(dex.type_descriptor(Index::new(0)).unwrap(), "LFoo;");
        assert_eq!(dex.nb_methods(), 0);
    }
}
