//! Types definitions to address Dalvik registers.
//!
//! Registers are addressed on 4, 8 or 16 bits depending on the instruction format.
//! The [register](Reg) wrapper over a 16 bits integer keeps registers apart from
//! constant operands in instruction definitions.
//!
//! Argument registers of invoke-kind instructions come either as an explicit
//! [list](RegList) or as a [range](RegRange) of consecutive slots.

use serde::Serialize;
use std::fmt;

/// The register type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Reg(u16);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u8> for Reg {
    fn from(r: u8) -> Self {
        Self(u16::from(r))
    }
}

impl From<u16> for Reg {
    fn from(r: u16) -> Self {
        Self(r)
    }
}

impl From<Reg> for u16 {
    fn from(r: Reg) -> Self {
        r.0
    }
}

impl Reg {
    /// Returns the wrapped register slot number.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Returns the slot number as a `u32`, the unit used for register lines.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the following register, used to address the high half of register pairs.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// An explicit list of at most five registers (35c and 45cc formats).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RegList(Vec<Reg>);

impl fmt::Display for RegList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, r) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{r}")?;
        }
        write!(f, "}}")
    }
}

impl<T> From<Vec<T>> for RegList
where
    Reg: From<T>,
{
    fn from(args: Vec<T>) -> Self {
        Self(args.into_iter().map(Reg::from).collect())
    }
}

impl RegList {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, i: usize) -> Option<Reg> {
        self.0.get(i).copied()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = Reg> + '_ {
        self.0.iter().copied()
    }
}

/// A range of consecutive registers (3rc and 4rcc formats).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegRange {
    first: Reg,
    count: u8,
}

impl fmt::Display for RegRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.count == 0 {
            write!(f, "{{}}")
        } else {
            let last = u32::from(self.first.value()) + u32::from(self.count) - 1;
            write!(f, "{{{} .. v{last}}}", self.first)
        }
    }
}

impl RegRange {
    #[inline]
    #[must_use]
    pub fn new(first: Reg, count: u8) -> Self {
        Self { first, count }
    }

    /// Returns the first register of the range.
    #[inline]
    #[must_use]
    pub const fn first(&self) -> Reg {
        self.first
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count as usize
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the slot following the last register of the range, which may
    /// exceed `u16` for malformed ranges.
    #[inline]
    #[must_use]
    pub fn end(&self) -> u32 {
        u32::from(self.first.value()) + u32::from(self.count)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> {
        u32::from(self.first.value())..self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(format!("{}", Reg::from(3u8)), "v3");
        assert_eq!(format!("{}", RegList::from(vec![1u8, 2u8])), "{v1, v2}");
        assert_eq!(format!("{}", RegRange::new(Reg::from(4u16), 3)), "{v4 .. v6}");
        assert_eq!(format!("{}", RegRange::new(Reg::from(4u16), 0)), "{}");
    }

    #[test]
    fn range_near_the_top() {
        let range = RegRange::new(Reg::from(0xffffu16), 2);
        assert_eq!(range.end(), 0x10001);
        assert_eq!(range.iter().count(), 2);
    }
}
