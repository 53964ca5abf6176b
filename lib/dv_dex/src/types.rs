//! Dalvik typing informations data structures.

use crate::errors::{DexError, DexResult};
use crate::strings::StringIdItem;
use crate::{Dex, DexIndex, Index, PrettyPrint};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// The Dalvik type descriptor to be used for referencing it from other Dex data items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeIdItem {
    pub(crate) descriptor_idx: Index<StringIdItem>,
}

impl TypeIdItem {
    /// Returns the raw descriptor string (`I`, `[J`, `Ljava/lang/Object;`, ...).
    pub fn descriptor<'a>(&self, dex: &'a Dex) -> DexResult<&'a str> {
        dex.string(self.descriptor_idx)
    }

    /// Returns the concrete Dalvik [`Type`] designated by the descriptor.
    pub fn to_type(&self, dex: &Dex) -> DexResult<Type> {
        Type::try_from(self.descriptor(dex)?)
    }
}

impl PrettyPrint for TypeIdItem {
    fn pp(&self, f: &mut fmt::Formatter, dex: &Dex) -> DexResult<()> {
        let typ = self.to_type(dex)?;
        write!(f, "{}", typ.to_java_string())?;
        Ok(())
    }
}

/// The Dalvik prototype descriptor to be used for referencing it from other Dex data items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtoIdItem {
    pub(crate) return_type_idx: Index<TypeIdItem>,
    #[serde(default)]
    pub(crate) parameters: Vec<Index<TypeIdItem>>,
}

impl ProtoIdItem {
    #[inline]
    #[must_use]
    pub fn return_type_idx(&self) -> Index<TypeIdItem> {
        self.return_type_idx
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &[Index<TypeIdItem>] {
        &self.parameters
    }

    /// Returns the return type descriptor of the prototype.
    pub fn return_descriptor<'a>(&self, dex: &'a Dex) -> DexResult<&'a str> {
        dex.type_descriptor(self.return_type_idx)
    }

    /// Returns the parameters type descriptors of the prototype.
    pub fn parameter_descriptors<'a>(&self, dex: &'a Dex) -> DexResult<Vec<&'a str>> {
        self.parameters
            .iter()
            .map(|idx| dex.type_descriptor(*idx))
            .collect()
    }

    /// Returns the return type of the prototype.
    pub fn return_type(&self, dex: &Dex) -> DexResult<Type> {
        self.return_type_idx.get(dex)?.to_type(dex)
    }

    /// Returns the parameters types of the prototype.
    pub fn parameters_types(&self, dex: &Dex) -> DexResult<Vec<Type>> {
        self.parameters
            .iter()
            .map(|idx| idx.get(dex)?.to_type(dex))
            .collect()
    }
}

impl PrettyPrint for ProtoIdItem {
    fn pp(&self, f: &mut fmt::Formatter, dex: &Dex) -> DexResult<()> {
        write!(f, "(")?;
        for t in &self.parameters_types(dex)? {
            write!(f, "{t}")?;
        }
        write!(f, "){}", self.return_type(dex)?)?;
        Ok(())
    }
}

/// Dalvik concrete type descriptor type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Type {
    /// `void` type, only valid for return types.
    Void,
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    /// Array of the given type descriptor. It is invalid to have more than 255 dimensions.
    Array(usize, Box<Self>),
    /// Type of a fully-qualified class, in its internal form (`java/lang/Object`).
    Class(String),
}

impl Type {
    /// Returns a java-like representation of the type. The `Display`
    /// implementation produces the Dalvik descriptor instead.
    #[must_use]
    pub fn to_java_string(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Byte => "byte".to_string(),
            Self::Short => "short".to_string(),
            Self::Char => "char".to_string(),
            Self::Int => "int".to_string(),
            Self::Long => "long".to_string(),
            Self::Float => "float".to_string(),
            Self::Double => "double".to_string(),
            Self::Array(n, sub) => {
                let mut s = sub.to_java_string();
                for _ in 0..*n {
                    s.push_str("[]");
                }
                s
            }
            Self::Class(name) => name.replace('/', "."),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Void | Self::Array(_, _) | Self::Class(_))
    }

    /// Long and double values take two registers.
    #[inline]
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    pub fn as_class_name(&self) -> DexResult<&str> {
        if let Self::Class(name) = self {
            Ok(name)
        } else {
            Err(DexError::InvalidType)
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Void => write!(f, "V"),
            Self::Boolean => write!(f, "Z"),
            Self::Byte => write!(f, "B"),
            Self::Short => write!(f, "S"),
            Self::Char => write!(f, "C"),
            Self::Int => write!(f, "I"),
            Self::Long => write!(f, "J"),
            Self::Float => write!(f, "F"),
            Self::Double => write!(f, "D"),
            Self::Array(n, inner) => {
                for _ in 0..*n {
                    write!(f, "[")?;
                }
                write!(f, "{inner}")
            }
            Self::Class(classname) => write!(f, "L{classname};"),
        }
    }
}

fn conversion_error(s: &str) -> DexError {
    DexError::Conversion {
        from: format!("&str ({s:?})"),
        to: "Type".to_string(),
    }
}

impl TryFrom<&str> for Type {
    type Error = DexError;

    fn try_from(s: &str) -> DexResult<Self> {
        if s == "V" {
            return Ok(Self::Void);
        }

        let dims = s.bytes().take_while(|b| *b == b'[').count();
        if dims >= s.len() || dims > 255 {
            return Err(conversion_error(s));
        }

        let t = match &s[dims..] {
            "Z" => Self::Boolean,
            "B" => Self::Byte,
            "S" => Self::Short,
            "C" => Self::Char,
            "I" => Self::Int,
            "J" => Self::Long,
            "F" => Self::Float,
            "D" => Self::Double,
            sub => match sub.strip_prefix('L').and_then(|c| c.strip_suffix(';')) {
                Some(name) if !name.is_empty() => Self::Class(name.to_string()),
                _ => return Err(conversion_error(s)),
            },
        };
        if dims == 0 {
            Ok(t)
        } else {
            Ok(Self::Array(dims, Box::new(t)))
        }
    }
}

/// Converts a descriptor to its java form, or leaves it untouched if it does not parse.
#[must_use]
pub fn pretty_descriptor(descriptor: &str) -> String {
    Type::try_from(descriptor).map_or_else(|_| descriptor.to_string(), |t| t.to_java_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_descriptors() {
        assert_eq!(Type::try_from("I").unwrap(), Type::Int);
        assert_eq!(
            Type::try_from("[[Ljava/lang/String;").unwrap(),
            Type::Array(2, Box::new(Type::Class("java/lang/String".to_string())))
        );
        assert!(Type::try_from("").is_err());
        assert!(Type::try_from("[").is_err());
        assert!(Type::try_from("[V").is_err());
        assert!(Type::try_from("L;").is_err());
        assert!(Type::try_from("Lfoo").is_err());
        assert!(Type::try_from(&"[".repeat(256)[..]).is_err());
    }

    #[test]
    fn java_form() {
        assert_eq!(pretty_descriptor("[Ljava/lang/String;"), "java.lang.String[]");
        assert_eq!(pretty_descriptor("J"), "long");
        assert_eq!(pretty_descriptor("garbage"), "garbage");
    }
}
