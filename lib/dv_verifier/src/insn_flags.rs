//! Per dex pc static and dynamic facts of a method code.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    #[derive(Default)]
    pub struct InsnFlags: u8 {
        /// First code unit of an instruction.
        const OPCODE = 0x01;
        /// Target of a branch, a switch or an exception handler.
        const BRANCH_TARGET = 0x02;
        /// Covered by a try block.
        const IN_TRY = 0x04;
        /// Reached by the code-flow analysis.
        const VISITED = 0x08;
        /// Register state changed since the last visit.
        const CHANGED = 0x10;
        /// Return instruction.
        const RETURN = 0x20;
        /// The checked interpreter always throws at this instruction.
        const RUNTIME_THROW = 0x40;
    }
}

impl InsnFlags {
    #[inline]
    #[must_use]
    pub fn is_opcode(self) -> bool {
        self.contains(Self::OPCODE)
    }

    #[inline]
    #[must_use]
    pub fn is_branch_target(self) -> bool {
        self.contains(Self::BRANCH_TARGET)
    }

    #[inline]
    #[must_use]
    pub fn is_in_try(self) -> bool {
        self.contains(Self::IN_TRY)
    }

    #[inline]
    #[must_use]
    pub fn is_visited(self) -> bool {
        self.contains(Self::VISITED)
    }

    #[inline]
    #[must_use]
    pub fn is_changed(self) -> bool {
        self.contains(Self::CHANGED)
    }

    #[inline]
    #[must_use]
    pub fn is_visited_or_changed(self) -> bool {
        self.intersects(Self::VISITED | Self::CHANGED)
    }

    #[inline]
    #[must_use]
    pub fn is_return(self) -> bool {
        self.contains(Self::RETURN)
    }
}

/// Dump form: `V` visited, `C` changed, `T` in try, `B` branch target,
/// `O` opcode start, `R` return, `-` for unset flags.
impl fmt::Display for InsnFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let marks = [
            (Self::VISITED, 'V'),
            (Self::CHANGED, 'C'),
            (Self::IN_TRY, 'T'),
            (Self::BRANCH_TARGET, 'B'),
            (Self::OPCODE, 'O'),
            (Self::RETURN, 'R'),
        ];
        for (flag, c) in marks {
            write!(f, "{}", if self.contains(flag) { c } else { '-' })?;
        }
        Ok(())
    }
}

/// The flags of every code unit of a method.
#[derive(Debug, Clone)]
pub struct InsnFlagsTable {
    flags: Vec<InsnFlags>,
}

impl InsnFlagsTable {
    #[must_use]
    pub fn new(insns_size: usize) -> Self {
        Self {
            flags: vec![InsnFlags::empty(); insns_size],
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Flags of a dex pc, empty outside of the code.
    #[inline]
    #[must_use]
    pub fn get(&self, pc: u32) -> InsnFlags {
        self.flags.get(pc as usize).copied().unwrap_or_default()
    }

    pub fn set(&mut self, pc: u32, flag: InsnFlags) {
        if let Some(flags) = self.flags.get_mut(pc as usize) {
            flags.insert(flag);
        }
    }

    pub fn clear(&mut self, pc: u32, flag: InsnFlags) {
        if let Some(flags) = self.flags.get_mut(pc as usize) {
            flags.remove(flag);
        }
    }

    /// Starting pcs of instructions, in code order.
    pub fn iter_opcodes(&self) -> impl Iterator<Item = u32> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, flags)| flags.is_opcode())
            .map(|(pc, _)| pc as u32)
    }

    /// First instruction at or after `start` that has the `CHANGED` flag.
    #[must_use]
    pub fn next_changed(&self, start: u32) -> Option<u32> {
        self.flags
            .iter()
            .enumerate()
            .skip(start as usize)
            .find(|(_, flags)| flags.is_changed())
            .map(|(pc, _)| pc as u32)
    }

    /// Start of the instruction following the one at `pc`.
    #[must_use]
    pub fn next_opcode(&self, pc: u32) -> Option<u32> {
        self.flags
            .iter()
            .enumerate()
            .skip(pc as usize + 1)
            .find(|(_, flags)| flags.is_opcode())
            .map(|(pc, _)| pc as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table() {
        let mut table = InsnFlagsTable::new(6);
        for pc in [0, 1, 3] {
            table.set(pc, InsnFlags::OPCODE);
        }
        table.set(3, InsnFlags::CHANGED | InsnFlags::BRANCH_TARGET);
        table.set(12, InsnFlags::CHANGED);
        assert_eq!(table.iter_opcodes().collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(table.next_changed(0), Some(3));
        assert_eq!(table.next_changed(4), None);
        assert_eq!(table.next_opcode(1), Some(3));
        assert_eq!(table.next_opcode(3), None);
        table.clear(3, InsnFlags::CHANGED);
        table.set(3, InsnFlags::VISITED);
        assert_eq!(format!("{}", table.get(3)), "V--BO-");
        assert!(table.get(40).is_empty());
    }
}
