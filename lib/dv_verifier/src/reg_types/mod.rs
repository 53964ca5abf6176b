//! Register types: the abstract values held by Dalvik registers during
//! code-flow verification.
//!
//! Types are interned by a per-method [`RegTypeCache`] and manipulated
//! through opaque [`RegTypeId`] handles: two handles are equal if and only
//! if they designate the same type.

mod cache;
mod merge;

pub use cache::RegTypeCache;

use dv_dex::types::pretty_descriptor;
use fixedbitset::FixedBitSet;
use std::fmt;

/// Handle on a type interned in a [`RegTypeCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegTypeId(u32);

impl RegTypeId {
    pub const UNDEFINED: Self = Self(0);
    pub const CONFLICT: Self = Self(1);
    pub const ZERO: Self = Self(2);
    pub const BOOLEAN_CONSTANT: Self = Self(3);
    pub const POSITIVE_BYTE_CONSTANT: Self = Self(4);
    pub const BYTE_CONSTANT: Self = Self(5);
    pub const POSITIVE_SHORT_CONSTANT: Self = Self(6);
    pub const SHORT_CONSTANT: Self = Self(7);
    pub const CHAR_CONSTANT: Self = Self(8);
    pub const INTEGER_CONSTANT: Self = Self(9);
    pub const CONSTANT_LO: Self = Self(10);
    pub const CONSTANT_HI: Self = Self(11);
    pub const NULL: Self = Self(12);
    pub const BOOLEAN: Self = Self(13);
    pub const BYTE: Self = Self(14);
    pub const SHORT: Self = Self(15);
    pub const CHAR: Self = Self(16);
    pub const INTEGER: Self = Self(17);
    pub const FLOAT: Self = Self(18);
    pub const LONG_LO: Self = Self(19);
    pub const LONG_HI: Self = Self(20);
    pub const DOUBLE_LO: Self = Self(21);
    pub const DOUBLE_HI: Self = Self(22);
    pub const JAVA_LANG_OBJECT: Self = Self(23);

    pub(crate) const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RegTypeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A register type.
///
/// Integer constants are kept as the smallest range kind holding their
/// value (see [`RegTypeCache::from_cat1_const`]). Reference types carry
/// their descriptor; uninitialized references also carry the dex pc of
/// their allocation. Unresolved merged references remember their resolved
/// part (`Zero` when there is none) and the ids of the unresolved types
/// that were merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegType {
    Undefined,
    Conflict,
    Zero,
    BooleanConstant,
    PositiveByteConstant,
    ByteConstant,
    PositiveShortConstant,
    ShortConstant,
    CharConstant,
    IntegerConstant,
    ConstantLo,
    ConstantHi,
    Null,
    Boolean,
    Byte,
    Short,
    Char,
    Integer,
    Float,
    LongLo,
    LongHi,
    DoubleLo,
    DoubleHi,
    JavaLangObject,
    Reference(String),
    UnresolvedReference(String),
    UninitializedReference(String, u32),
    UnresolvedUninitializedReference(String, u32),
    UninitializedThisReference(String),
    UnresolvedUninitializedThisReference(String),
    UnresolvedMergedReference(RegTypeId, FixedBitSet),
}

/// Types interned at fixed ids by every cache, in id order.
pub(crate) const FIXED_TYPES: [RegType; 24] = [
    RegType::Undefined,
    RegType::Conflict,
    RegType::Zero,
    RegType::BooleanConstant,
    RegType::PositiveByteConstant,
    RegType::ByteConstant,
    RegType::PositiveShortConstant,
    RegType::ShortConstant,
    RegType::CharConstant,
    RegType::IntegerConstant,
    RegType::ConstantLo,
    RegType::ConstantHi,
    RegType::Null,
    RegType::Boolean,
    RegType::Byte,
    RegType::Short,
    RegType::Char,
    RegType::Integer,
    RegType::Float,
    RegType::LongLo,
    RegType::LongHi,
    RegType::DoubleLo,
    RegType::DoubleHi,
    RegType::JavaLangObject,
];

/// Integer constant kinds, by increasing value range.
pub(crate) const CONSTANT_KINDS: [(RegTypeId, i32, i32); 8] = [
    (RegTypeId::ZERO, 0, 0),
    (RegTypeId::BOOLEAN_CONSTANT, 0, 1),
    (RegTypeId::POSITIVE_BYTE_CONSTANT, 0, i8::MAX as i32),
    (RegTypeId::BYTE_CONSTANT, i8::MIN as i32, i8::MAX as i32),
    (RegTypeId::POSITIVE_SHORT_CONSTANT, 0, i16::MAX as i32),
    (RegTypeId::SHORT_CONSTANT, i16::MIN as i32, i16::MAX as i32),
    (RegTypeId::CHAR_CONSTANT, 0, u16::MAX as i32),
    (RegTypeId::INTEGER_CONSTANT, i32::MIN, i32::MAX),
];

impl fmt::Display for RegType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "Undefined"),
            Self::Conflict => write!(f, "Conflict"),
            Self::Zero => write!(f, "Zero/null"),
            Self::BooleanConstant => write!(f, "Boolean Constant"),
            Self::PositiveByteConstant => write!(f, "Positive Byte Constant"),
            Self::ByteConstant => write!(f, "Byte Constant"),
            Self::PositiveShortConstant => write!(f, "Positive Short Constant"),
            Self::ShortConstant => write!(f, "Short Constant"),
            Self::CharConstant => write!(f, "Char Constant"),
            Self::IntegerConstant => write!(f, "Integer Constant"),
            Self::ConstantLo => write!(f, "Low-half Constant"),
            Self::ConstantHi => write!(f, "High-half Constant"),
            Self::Null => write!(f, "null"),
            Self::Boolean => write!(f, "Boolean"),
            Self::Byte => write!(f, "Byte"),
            Self::Short => write!(f, "Short"),
            Self::Char => write!(f, "Char"),
            Self::Integer => write!(f, "Integer"),
            Self::Float => write!(f, "Float"),
            Self::LongLo => write!(f, "Long (Low Half)"),
            Self::LongHi => write!(f, "Long (High Half)"),
            Self::DoubleLo => write!(f, "Double (Low Half)"),
            Self::DoubleHi => write!(f, "Double (High Half)"),
            Self::JavaLangObject => write!(f, "Reference: java.lang.Object"),
            Self::Reference(d) => write!(f, "Reference: {}", pretty_descriptor(d)),
            Self::UnresolvedReference(d) => {
                write!(f, "Unresolved Reference: {}", pretty_descriptor(d))
            }
            Self::UninitializedReference(d, pc) => write!(
                f,
                "Uninitialized Reference: {} Allocation PC: {pc}",
                pretty_descriptor(d)
            ),
            Self::UnresolvedUninitializedReference(d, pc) => write!(
                f,
                "Unresolved And Uninitialized Reference: {} Allocation PC: {pc}",
                pretty_descriptor(d)
            ),
            Self::UninitializedThisReference(d) => {
                write!(f, "Uninitialized This Reference: {}", pretty_descriptor(d))
            }
            Self::UnresolvedUninitializedThisReference(d) => write!(
                f,
                "Unresolved And Uninitialized This Reference: {}",
                pretty_descriptor(d)
            ),
            Self::UnresolvedMergedReference(resolved, unresolved) => write!(
                f,
                "UnresolvedMergedReferences(#{resolved} | {} unresolved)",
                unresolved.count_ones(..)
            ),
        }
    }
}

impl RegType {
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        matches!(self, Self::Zero)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn is_zero_or_null(&self) -> bool {
        matches!(self, Self::Zero | Self::Null)
    }

    /// Category 1 integer constants, zero included.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Self::Zero
                | Self::BooleanConstant
                | Self::PositiveByteConstant
                | Self::ByteConstant
                | Self::PositiveShortConstant
                | Self::ShortConstant
                | Self::CharConstant
                | Self::IntegerConstant
        )
    }

    #[must_use]
    pub fn is_constant_lo(&self) -> bool {
        matches!(self, Self::ConstantLo)
    }

    #[must_use]
    pub fn is_constant_hi(&self) -> bool {
        matches!(self, Self::ConstantHi)
    }

    #[must_use]
    pub fn is_constant_types(&self) -> bool {
        self.is_constant() || self.is_constant_lo() || self.is_constant_hi()
    }

    fn is_constant_boolean(&self) -> bool {
        matches!(self, Self::Zero | Self::BooleanConstant)
    }

    fn is_constant_byte(&self) -> bool {
        self.is_constant_boolean() || matches!(self, Self::PositiveByteConstant | Self::ByteConstant)
    }

    fn is_constant_short(&self) -> bool {
        self.is_constant_byte() || matches!(self, Self::PositiveShortConstant | Self::ShortConstant)
    }

    fn is_constant_char(&self) -> bool {
        self.is_constant_boolean()
            || matches!(
                self,
                Self::PositiveByteConstant | Self::PositiveShortConstant | Self::CharConstant
            )
    }

    #[must_use]
    pub fn is_boolean_types(&self) -> bool {
        self.is_constant_boolean() || matches!(self, Self::Boolean)
    }

    #[must_use]
    pub fn is_byte_types(&self) -> bool {
        self.is_constant_byte() || matches!(self, Self::Byte | Self::Boolean)
    }

    #[must_use]
    pub fn is_short_types(&self) -> bool {
        self.is_constant_short() || matches!(self, Self::Short | Self::Byte | Self::Boolean)
    }

    #[must_use]
    pub fn is_char_types(&self) -> bool {
        self.is_constant_char() || matches!(self, Self::Char | Self::Boolean)
    }

    #[must_use]
    pub fn is_integral_types(&self) -> bool {
        self.is_constant()
            || matches!(
                self,
                Self::Integer | Self::Short | Self::Char | Self::Byte | Self::Boolean
            )
    }

    #[must_use]
    pub fn is_array_index_types(&self) -> bool {
        self.is_integral_types()
    }

    #[must_use]
    pub fn is_float_types(&self) -> bool {
        self.is_constant() || matches!(self, Self::Float)
    }

    #[must_use]
    pub fn is_long_types(&self) -> bool {
        matches!(self, Self::ConstantLo | Self::LongLo)
    }

    #[must_use]
    pub fn is_long_high_types(&self) -> bool {
        matches!(self, Self::ConstantHi | Self::LongHi)
    }

    #[must_use]
    pub fn is_double_types(&self) -> bool {
        matches!(self, Self::ConstantLo | Self::DoubleLo)
    }

    #[must_use]
    pub fn is_double_high_types(&self) -> bool {
        matches!(self, Self::ConstantHi | Self::DoubleHi)
    }

    /// Low half of a wide value.
    #[must_use]
    pub fn is_low_half(&self) -> bool {
        matches!(self, Self::ConstantLo | Self::LongLo | Self::DoubleLo)
    }

    #[must_use]
    pub fn is_high_half(&self) -> bool {
        matches!(self, Self::ConstantHi | Self::LongHi | Self::DoubleHi)
    }

    /// Non reference single register values.
    #[must_use]
    pub fn is_category1_types(&self) -> bool {
        self.is_integral_types() || matches!(self, Self::Float)
    }

    #[must_use]
    pub fn is_category2_types(&self) -> bool {
        self.is_low_half()
    }

    #[must_use]
    pub fn is_primitive_types(&self) -> bool {
        self.is_category1_types() || self.is_low_half() || self.is_high_half()
    }

    #[must_use]
    pub fn is_uninitialized_types(&self) -> bool {
        matches!(
            self,
            Self::UninitializedReference(..)
                | Self::UnresolvedUninitializedReference(..)
                | Self::UninitializedThisReference(_)
                | Self::UnresolvedUninitializedThisReference(_)
        )
    }

    #[must_use]
    pub fn is_uninitialized_this_reference(&self) -> bool {
        matches!(
            self,
            Self::UninitializedThisReference(_) | Self::UnresolvedUninitializedThisReference(_)
        )
    }

    #[must_use]
    pub fn is_unresolved_types(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedReference(_)
                | Self::UnresolvedUninitializedReference(..)
                | Self::UnresolvedUninitializedThisReference(_)
                | Self::UnresolvedMergedReference(..)
        )
    }

    #[must_use]
    pub fn is_unresolved_merged_reference(&self) -> bool {
        matches!(self, Self::UnresolvedMergedReference(..))
    }

    #[must_use]
    pub fn is_java_lang_object(&self) -> bool {
        matches!(self, Self::JavaLangObject)
    }

    /// References other than the null constant.
    #[must_use]
    pub fn is_non_zero_reference_types(&self) -> bool {
        matches!(
            self,
            Self::JavaLangObject
                | Self::Reference(_)
                | Self::UnresolvedReference(_)
                | Self::UninitializedReference(..)
                | Self::UnresolvedUninitializedReference(..)
                | Self::UninitializedThisReference(_)
                | Self::UnresolvedUninitializedThisReference(_)
                | Self::UnresolvedMergedReference(..)
        )
    }

    #[must_use]
    pub fn is_reference_types(&self) -> bool {
        self.is_non_zero_reference_types() || self.is_zero_or_null()
    }

    /// Resolved references, initialized or not.
    #[must_use]
    pub fn has_class(&self) -> bool {
        matches!(
            self,
            Self::JavaLangObject
                | Self::Reference(_)
                | Self::UninitializedReference(..)
                | Self::UninitializedThisReference(_)
        )
    }

    /// The descriptor of reference types, `None` for other types.
    #[must_use]
    pub fn descriptor(&self) -> Option<&str> {
        match self {
            Self::JavaLangObject => Some(crate::repo::JAVA_LANG_OBJECT),
            Self::Reference(d)
            | Self::UnresolvedReference(d)
            | Self::UninitializedReference(d, _)
            | Self::UnresolvedUninitializedReference(d, _)
            | Self::UninitializedThisReference(d)
            | Self::UnresolvedUninitializedThisReference(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_ids_match_table() {
        assert_eq!(FIXED_TYPES[RegTypeId::ZERO.index()], RegType::Zero);
        assert_eq!(FIXED_TYPES[RegTypeId::NULL.index()], RegType::Null);
        assert_eq!(FIXED_TYPES[RegTypeId::DOUBLE_HI.index()], RegType::DoubleHi);
        assert_eq!(
            FIXED_TYPES[RegTypeId::JAVA_LANG_OBJECT.index()],
            RegType::JavaLangObject
        );
        for (id, _, _) in CONSTANT_KINDS {
            assert!(FIXED_TYPES[id.index()].is_constant());
        }
    }

    #[test]
    fn categories() {
        assert!(RegType::Zero.is_boolean_types());
        assert!(RegType::Zero.is_reference_types());
        assert!(RegType::PositiveByteConstant.is_char_types());
        assert!(!RegType::ByteConstant.is_char_types());
        assert!(RegType::Boolean.is_short_types());
        assert!(!RegType::Char.is_short_types());
        assert!(RegType::CharConstant.is_float_types());
        assert!(RegType::ConstantLo.is_double_types() && RegType::ConstantLo.is_long_types());
        assert!(!RegType::Float.is_integral_types());
        assert!(RegType::UninitializedThisReference("LFoo;".to_string()).has_class());
        assert!(!RegType::UnresolvedReference("LFoo;".to_string()).has_class());
    }

    #[test]
    fn display() {
        assert_eq!(
            format!("{}", RegType::UninitializedReference("Lapp/Foo;".to_string(), 3)),
            "Uninitialized Reference: app.Foo Allocation PC: 3"
        );
        assert_eq!(
            format!("{}", RegType::Reference("[Ljava/lang/String;".to_string())),
            "Reference: java.lang.String[]"
        );
        assert_eq!(format!("{}", RegType::Zero), "Zero/null");
    }
}
