//! Register lines: the abstract state of the registers at a point of a method.

use crate::failures::VerifyError;
use crate::reg_types::{RegTypeCache, RegTypeId};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Deepest monitor stack a method may build.
pub const MAX_MONITOR_STACK_DEPTH: usize = 32;

/// Register used to track locks taken on the null literal, whose aliases
/// cannot be followed.
const VIRTUAL_NULL_REGISTER: u32 = u32::MAX;

/// A failure detected by a register line operation. The verifier records
/// it at the pc of the instruction being verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFailure {
    pub kind: VerifyError,
    pub message: String,
}

impl LineFailure {
    pub(crate) fn hard(message: String) -> Self {
        Self {
            kind: VerifyError::BAD_CLASS_HARD,
            message,
        }
    }

    pub(crate) fn locking(message: String) -> Self {
        Self {
            kind: VerifyError::LOCKING,
            message,
        }
    }
}

pub type LineResult = Result<(), LineFailure>;

/// What to do with the locks held through a register that is overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOp {
    Clear,
    Keep,
}

/// Category of the value copied by a `move` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// Single register, non reference.
    Category1nr,
    Reference,
}

/// The type of every register, the pending result of the last invoke or
/// `filled-new-array`, and the locks held.
#[derive(Debug, Clone)]
pub struct RegisterLine {
    line: Vec<RegTypeId>,
    result: [RegTypeId; 2],
    // dex pcs of the monitor-enter instructions of the held locks
    monitors: Vec<u32>,
    // register to the bitset of the monitor stack depths it locked
    reg_to_lock_depths: BTreeMap<u32, u32>,
    this_initialized: bool,
}

impl PartialEq for RegisterLine {
    fn eq(&self, other: &Self) -> bool {
        self.line == other.line
            && self.monitors == other.monitors
            && self.reg_to_lock_depths == other.reg_to_lock_depths
            && self.this_initialized == other.this_initialized
    }
}

impl Eq for RegisterLine {}

impl RegisterLine {
    /// A line with every register undefined.
    #[must_use]
    pub fn new(nb_registers: usize) -> Self {
        Self {
            line: vec![RegTypeId::UNDEFINED; nb_registers],
            result: [RegTypeId::UNDEFINED; 2],
            monitors: Vec::new(),
            reg_to_lock_depths: BTreeMap::new(),
            this_initialized: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn nb_registers(&self) -> usize {
        self.line.len()
    }

    /// Type of a register, `Conflict` for registers outside of the line.
    #[inline]
    #[must_use]
    pub fn get(&self, vsrc: u32) -> RegTypeId {
        self.line
            .get(vsrc as usize)
            .copied()
            .unwrap_or(RegTypeId::CONFLICT)
    }

    #[inline]
    #[must_use]
    pub fn result(&self) -> [RegTypeId; 2] {
        self.result
    }

    #[inline]
    #[must_use]
    pub fn is_this_initialized(&self) -> bool {
        self.this_initialized
    }

    pub(crate) fn set_this_initialized(&mut self) {
        self.this_initialized = true;
    }

    pub fn copy_from(&mut self, other: &Self) {
        self.line.clone_from(&other.line);
        self.result = other.result;
        self.monitors.clone_from(&other.monitors);
        self.reg_to_lock_depths.clone_from(&other.reg_to_lock_depths);
        self.this_initialized = other.this_initialized;
    }

    fn put(&mut self, vdst: u32, t: RegTypeId) {
        if let Some(slot) = self.line.get_mut(vdst as usize) {
            *slot = t;
        }
    }

    /// Sets a single register type. Wide halves are rejected.
    pub fn set_register_type(
        &mut self,
        cache: &RegTypeCache,
        vdst: u32,
        t: RegTypeId,
        op: LockOp,
    ) -> LineResult {
        let new = cache.get(t);
        if new.is_low_half() || new.is_high_half() {
            return Err(LineFailure::hard(format!(
                "Expected category1 register type not '{}'",
                cache.name(t)
            )));
        }
        self.put(vdst, t);
        if op == LockOp::Clear {
            self.reg_to_lock_depths.remove(&vdst);
        }
        Ok(())
    }

    /// Sets the two registers of a wide value.
    pub fn set_register_type_wide(
        &mut self,
        cache: &RegTypeCache,
        vdst: u32,
        lo: RegTypeId,
        hi: RegTypeId,
    ) -> LineResult {
        if !check_wide_pair(lo, hi) {
            return Err(LineFailure::hard(format!(
                "Invalid wide pair '{}' '{}'",
                cache.name(lo),
                cache.name(hi)
            )));
        }
        self.put(vdst, lo);
        self.put(vdst + 1, hi);
        self.reg_to_lock_depths.remove(&vdst);
        self.reg_to_lock_depths.remove(&(vdst + 1));
        Ok(())
    }

    pub fn set_result_type_to_unknown(&mut self) {
        self.result = [RegTypeId::UNDEFINED; 2];
    }

    pub fn set_result_register_type(&mut self, t: RegTypeId) {
        self.result = [t, RegTypeId::UNDEFINED];
    }

    pub fn set_result_register_type_wide(&mut self, lo: RegTypeId, hi: RegTypeId) {
        self.result = [lo, hi];
    }

    /// Implements `move` and `move-object`.
    pub fn copy_register1(
        &mut self,
        cache: &RegTypeCache,
        vdst: u32,
        vsrc: u32,
        category: TypeCategory,
    ) -> LineResult {
        let t = self.get(vsrc);
        self.set_register_type(cache, vdst, t, LockOp::Keep)?;
        let ty = cache.get(t);
        let mismatch = match category {
            TypeCategory::Category1nr => !ty.is_category1_types(),
            TypeCategory::Reference => !ty.is_reference_types(),
        };
        if !ty.is_conflict() && mismatch {
            return Err(LineFailure::hard(format!(
                "copy1 v{vdst}<-v{vsrc} type={} cat={category:?}",
                cache.name(t)
            )));
        }
        if category == TypeCategory::Reference {
            match self.reg_to_lock_depths.get(&vsrc).copied() {
                Some(depths) => self.reg_to_lock_depths.insert(vdst, depths),
                None => self.reg_to_lock_depths.remove(&vdst),
            };
        }
        Ok(())
    }

    /// Implements `move-wide`.
    pub fn copy_register2(&mut self, cache: &RegTypeCache, vdst: u32, vsrc: u32) -> LineResult {
        let (lo, hi) = (self.get(vsrc), self.get(vsrc + 1));
        if !check_wide_pair(lo, hi) {
            return Err(LineFailure::hard(format!(
                "copy2 v{vdst}<-v{vsrc} type={}/{}",
                cache.name(lo),
                cache.name(hi)
            )));
        }
        self.set_register_type_wide(cache, vdst, lo, hi)
    }

    /// Implements `move-result` and `move-result-object`.
    pub fn copy_result_register1(
        &mut self,
        cache: &RegTypeCache,
        vdst: u32,
        is_reference: bool,
    ) -> LineResult {
        let t = self.result[0];
        let ty = cache.get(t);
        if (!is_reference && !ty.is_category1_types()) || (is_reference && !ty.is_reference_types())
        {
            return Err(LineFailure::hard(format!(
                "copyRes1 v{vdst}<- result0 type={}",
                cache.name(t)
            )));
        }
        self.set_register_type(cache, vdst, t, LockOp::Clear)?;
        self.result[0] = RegTypeId::UNDEFINED;
        Ok(())
    }

    /// Implements `move-result-wide`.
    pub fn copy_result_register2(&mut self, cache: &RegTypeCache, vdst: u32) -> LineResult {
        let [lo, hi] = self.result;
        if !cache.get(lo).is_category2_types() {
            return Err(LineFailure::hard(format!(
                "copyRes2 v{vdst}<- result0 type={}",
                cache.name(lo)
            )));
        }
        self.set_register_type_wide(cache, vdst, lo, hi)?;
        self.set_result_type_to_unknown();
        Ok(())
    }

    /// Checks that a register holds a value assignable to `expected`.
    pub fn verify_register_type(
        &self,
        cache: &RegTypeCache,
        vsrc: u32,
        expected: RegTypeId,
    ) -> LineResult {
        let actual = self.get(vsrc);
        if !cache.is_assignable_from(expected, actual) {
            let (te, ta) = (cache.get(expected), cache.get(actual));
            let kind = if !te.is_non_zero_reference_types()
                || !ta.is_non_zero_reference_types()
                || te.is_uninitialized_types()
                || ta.is_uninitialized_types()
            {
                VerifyError::BAD_CLASS_HARD
            } else if te.is_unresolved_types() || ta.is_unresolved_types() {
                VerifyError::UNRESOLVED_TYPE_CHECK
            } else {
                VerifyError::BAD_CLASS_HARD
            };
            return Err(LineFailure {
                kind,
                message: format!(
                    "register v{vsrc} has type {} but expected {}",
                    cache.name(actual),
                    cache.name(expected)
                ),
            });
        }
        if cache.get(expected).is_low_half() {
            let hi = self.get(vsrc + 1);
            if !check_wide_pair(actual, hi) {
                return Err(LineFailure::hard(format!(
                    "wide register v{vsrc} has type {}/{}",
                    cache.name(actual),
                    cache.name(hi)
                )));
            }
        }
        Ok(())
    }

    /// Checks that a register pair holds a wide value assignable to `expected`.
    pub fn verify_register_type_wide(
        &self,
        cache: &RegTypeCache,
        vsrc: u32,
        expected: RegTypeId,
    ) -> LineResult {
        let lo = self.get(vsrc);
        if !cache.is_assignable_from(expected, lo) {
            return Err(LineFailure::hard(format!(
                "register v{vsrc} has type {} but expected {}",
                cache.name(lo),
                cache.name(expected)
            )));
        }
        let hi = self.get(vsrc + 1);
        if !check_wide_pair(lo, hi) {
            return Err(LineFailure::hard(format!(
                "wide register v{vsrc} has type {}/{}",
                cache.name(lo),
                cache.name(hi)
            )));
        }
        Ok(())
    }

    /// Replaces every alias of an uninitialized object by its initialized type.
    pub fn mark_refs_as_initialized(&mut self, cache: &mut RegTypeCache, uninit: RegTypeId) {
        let init = cache.from_uninitialized(uninit);
        let mut changed = 0;
        for slot in self.line.iter_mut().filter(|slot| **slot == uninit) {
            *slot = init;
            changed += 1;
        }
        if cache.get(uninit).is_uninitialized_this_reference() {
            self.this_initialized = true;
        }
        log::trace!("{changed} registers initialized to {}", cache.name(init));
    }

    /// Invalidates the registers still holding an older allocation of the
    /// same `new-instance`.
    pub fn mark_uninit_refs_as_invalid(&mut self, uninit: RegTypeId) {
        for (idx, slot) in self.line.iter_mut().enumerate() {
            if *slot == uninit {
                *slot = RegTypeId::CONFLICT;
                self.reg_to_lock_depths.remove(&(idx as u32));
            }
        }
    }

    pub fn mark_all_registers_as_conflicts(&mut self) {
        self.line.fill(RegTypeId::CONFLICT);
    }

    pub fn mark_all_registers_as_conflicts_except(&mut self, vsrc: u32) {
        for (i, slot) in self.line.iter_mut().enumerate() {
            if i as u32 != vsrc {
                *slot = RegTypeId::CONFLICT;
            }
        }
    }

    pub fn mark_all_registers_as_conflicts_except_wide(&mut self, vsrc: u32) {
        for (i, slot) in self.line.iter_mut().enumerate() {
            if i as u32 != vsrc && i as u32 != vsrc + 1 {
                *slot = RegTypeId::CONFLICT;
            }
        }
    }

    /// Constructors must call a super or delegated constructor on every path.
    pub fn check_constructor_return(&self) -> LineResult {
        if self.this_initialized {
            Ok(())
        } else {
            Err(LineFailure::hard(
                "Constructor returning without calling superclass constructor".to_string(),
            ))
        }
    }

    #[inline]
    #[must_use]
    pub fn monitor_stack_depth(&self) -> usize {
        self.monitors.len()
    }

    /// Pcs of the monitor-enter instructions of the locks held, outermost first.
    #[must_use]
    pub fn monitors(&self) -> &[u32] {
        &self.monitors
    }

    /// Registers holding the lock taken at the given monitor stack depth.
    pub fn registers_locked_at(&self, depth: usize) -> impl Iterator<Item = u32> + '_ {
        self.reg_to_lock_depths
            .iter()
            .filter(move |(reg, depths)| {
                **reg != VIRTUAL_NULL_REGISTER && depth < 32 && (*depths & (1 << depth)) != 0
            })
            .map(|(reg, _)| *reg)
    }

    fn is_set_lock_depth(&self, reg: u32, depth: usize) -> bool {
        self.reg_to_lock_depths
            .get(&reg)
            .map_or(false, |depths| depths & (1 << depth) != 0)
    }

    fn set_reg_to_lock_depth(&mut self, reg: u32, depth: usize) -> bool {
        if self.is_set_lock_depth(reg, depth) {
            // locking twice through the same register
            return false;
        }
        *self.reg_to_lock_depths.entry(reg).or_insert(0) |= 1 << depth;
        true
    }

    fn clear_reg_to_lock_depth(&mut self, reg: u32, depth: usize) {
        let mask = 1 << depth;
        // aliases locked at the same depth are unlocked together
        for depths in self.reg_to_lock_depths.values_mut() {
            *depths &= !mask;
        }
        self.reg_to_lock_depths.retain(|_, depths| *depths != 0);
        log::trace!("unlocked v{reg} at depth {depth}");
    }

    /// Implements `monitor-enter`.
    pub fn push_monitor(&mut self, cache: &RegTypeCache, reg: u32, pc: u32) -> LineResult {
        let t = self.get(reg);
        let ty = cache.get(t);
        if !ty.is_reference_types() {
            return Err(LineFailure::hard(format!(
                "monitor-enter on non-object ({})",
                cache.name(t)
            )));
        }
        let depth = self.monitors.len();
        if depth >= MAX_MONITOR_STACK_DEPTH {
            return Err(LineFailure::locking(
                "monitor-enter stack overflow".to_string(),
            ));
        }
        if !self.set_reg_to_lock_depth(reg, depth) {
            return Err(LineFailure::locking(format!(
                "unexpected monitor-enter on register v{reg}"
            )));
        }
        if ty.is_zero() {
            self.set_reg_to_lock_depth(VIRTUAL_NULL_REGISTER, depth);
        }
        self.monitors.push(pc);
        Ok(())
    }

    /// Implements `monitor-exit`.
    pub fn pop_monitor(&mut self, cache: &RegTypeCache, reg: u32) -> LineResult {
        let t = self.get(reg);
        let ty = cache.get(t);
        if !ty.is_reference_types() {
            return Err(LineFailure::hard(format!(
                "monitor-exit on non-object ({})",
                cache.name(t)
            )));
        }
        if self.monitors.pop().is_none() {
            return Err(LineFailure::locking(
                "monitor-exit stack underflow".to_string(),
            ));
        }
        let depth = self.monitors.len();
        let mut unlocked = reg;
        let mut success = self.is_set_lock_depth(reg, depth);
        if !success && ty.is_zero() {
            success = self.is_set_lock_depth(VIRTUAL_NULL_REGISTER, depth);
            unlocked = VIRTUAL_NULL_REGISTER;
        }
        if !success {
            return Err(LineFailure::locking(
                "monitor-exit not unlocking the top of the monitor stack".to_string(),
            ));
        }
        self.clear_reg_to_lock_depth(unlocked, depth);
        Ok(())
    }

    /// Checks that no lock is held, at returns.
    pub fn verify_monitor_stack_empty(&self) -> LineResult {
        if self.monitors.is_empty() {
            Ok(())
        } else {
            Err(LineFailure::locking(format!(
                "expected empty monitor stack, but got {} locks",
                self.monitors.len()
            )))
        }
    }

    /// Merges an incoming line into this one, at a control-flow join.
    /// Returns whether this line changed; lock mismatches are reported in
    /// `failures`.
    pub fn merge_registers(
        &mut self,
        cache: &mut RegTypeCache,
        incoming: &Self,
        failures: &mut Vec<LineFailure>,
    ) -> bool {
        let mut changed = false;
        for (idx, slot) in self.line.iter_mut().enumerate() {
            let theirs = incoming.get(idx as u32);
            if *slot != theirs {
                let merged = cache.merge(*slot, theirs);
                changed = changed || merged != *slot;
                *slot = merged;
            }
        }

        if !self.monitors.is_empty() || !incoming.monitors.is_empty() {
            if self.monitors.len() != incoming.monitors.len() {
                failures.push(LineFailure::locking(format!(
                    "mismatched stack depths (depth={}, incoming depth={})",
                    self.monitors.len(),
                    incoming.monitors.len()
                )));
            } else if self.reg_to_lock_depths != incoming.reg_to_lock_depths {
                for idx in 0..self.line.len() as u32 {
                    let ours = self.reg_to_lock_depths.get(&idx).copied();
                    let theirs = incoming.reg_to_lock_depths.get(&idx).copied();
                    match (ours, theirs) {
                        (Some(a), Some(b)) if a != b => {
                            failures.push(LineFailure::locking(format!(
                                "mismatched lock levels for register v{idx}: {a:x} != {b:x}"
                            )));
                            break;
                        }
                        (Some(_), None) | (None, Some(_)) => {
                            if !find_lock_aliased_register(
                                idx,
                                &self.reg_to_lock_depths,
                                &incoming.reg_to_lock_depths,
                            ) || !find_lock_aliased_register(
                                idx,
                                &incoming.reg_to_lock_depths,
                                &self.reg_to_lock_depths,
                            ) {
                                failures.push(LineFailure::locking(format!(
                                    "mismatched stack depths for register v{idx}: {} != {}",
                                    u32::from(ours.is_some()),
                                    u32::from(theirs.is_some())
                                )));
                                break;
                            }
                            // the lock is still held through an alias
                            self.reg_to_lock_depths.remove(&idx);
                        }
                        _ => (),
                    }
                }
            }
        }

        if self.this_initialized && !incoming.this_initialized {
            self.this_initialized = false;
            changed = true;
        }
        changed
    }

    /// Human readable listing of the line.
    #[must_use]
    pub fn dump(&self, cache: &RegTypeCache) -> String {
        let mut out = String::new();
        for (i, t) in self.line.iter().enumerate() {
            let _ = write!(out, "{i}:[{}],", cache.name(*t));
        }
        for pc in &self.monitors {
            let _ = write!(out, "{{{pc}}},");
        }
        for (reg, depths) in &self.reg_to_lock_depths {
            let _ = write!(out, "<{reg} -> {depths:x}>");
        }
        out
    }
}

/// Checks that `lo` and `hi` are the two halves of a wide value.
#[must_use]
pub fn check_wide_pair(lo: RegTypeId, hi: RegTypeId) -> bool {
    matches!(
        (lo, hi),
        (RegTypeId::CONSTANT_LO, RegTypeId::CONSTANT_HI)
            | (RegTypeId::LONG_LO, RegTypeId::LONG_HI)
            | (RegTypeId::DOUBLE_LO, RegTypeId::DOUBLE_HI)
    )
}

/// A register locked in `src` and not in the other map is fine when the
/// same lock is held through another register.
fn find_lock_aliased_register(
    reg: u32,
    src: &BTreeMap<u32, u32>,
    search: &BTreeMap<u32, u32>,
) -> bool {
    match src.get(&reg) {
        None | Some(0) => true,
        Some(depths) => search
            .iter()
            .any(|(other, other_depths)| *other != reg && other_depths == depths),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::Repo;

    #[test]
    fn copies_and_results() {
        let repo = Repo::new();
        let mut cache = RegTypeCache::new(&repo);
        let string = cache.from_descriptor("Ljava/lang/String;");
        let mut line = RegisterLine::new(4);

        line.set_register_type(&cache, 0, string, LockOp::Clear).unwrap();
        line.copy_register1(&cache, 1, 0, TypeCategory::Reference).unwrap();
        assert_eq!(line.get(1), string);
        assert!(line.copy_register1(&cache, 2, 0, TypeCategory::Category1nr).is_err());

        line.set_register_type_wide(&cache, 2, RegTypeId::LONG_LO, RegTypeId::LONG_HI)
            .unwrap();
        assert!(line.set_register_type(&cache, 0, RegTypeId::LONG_LO, LockOp::Clear).is_err());
        assert!(line.copy_register2(&cache, 0, 1).is_err());
        line.verify_register_type(&cache, 2, RegTypeId::LONG_LO).unwrap();
        assert!(line.verify_register_type(&cache, 2, RegTypeId::DOUBLE_LO).is_err());

        line.set_result_register_type(RegTypeId::INTEGER);
        assert!(line.copy_result_register1(&cache, 0, true).is_err());
        line.copy_result_register1(&cache, 0, false).unwrap();
        assert_eq!(line.get(0), RegTypeId::INTEGER);
        assert_eq!(line.result(), [RegTypeId::UNDEFINED; 2]);
    }

    #[test]
    fn unresolved_check_is_soft() {
        let repo = Repo::new();
        let mut cache = RegTypeCache::new(&repo);
        let unknown = cache.from_descriptor("Lapp/Unknown;");
        let string = cache.from_descriptor("Ljava/lang/String;");
        let mut line = RegisterLine::new(1);
        line.set_register_type(&cache, 0, unknown, LockOp::Clear).unwrap();
        let failure = line.verify_register_type(&cache, 0, string).unwrap_err();
        assert_eq!(failure.kind, VerifyError::UNRESOLVED_TYPE_CHECK);
        line.set_register_type(&cache, 0, RegTypeId::FLOAT, LockOp::Clear).unwrap();
        let failure = line.verify_register_type(&cache, 0, string).unwrap_err();
        assert_eq!(failure.kind, VerifyError::BAD_CLASS_HARD);
        assert_eq!(
            failure.message,
            "register v0 has type Float but expected Reference: java.lang.String"
        );
    }

    #[test]
    fn monitors_with_aliases() {
        let repo = Repo::new();
        let cache = RegTypeCache::new(&repo);
        let object = RegTypeId::JAVA_LANG_OBJECT;
        let mut line = RegisterLine::new(3);
        line.set_register_type(&cache, 0, object, LockOp::Clear).unwrap();
        line.copy_register1(&cache, 1, 0, TypeCategory::Reference).unwrap();
        line.push_monitor(&cache, 0, 4).unwrap();
        line.copy_register1(&cache, 2, 0, TypeCategory::Reference).unwrap();
        assert_eq!(line.monitors(), &[4]);
        assert_eq!(line.registers_locked_at(0).collect::<Vec<_>>(), vec![0, 2]);

        // re-entrant lock through an alias, one level deeper
        line.push_monitor(&cache, 2, 6).unwrap();
        assert_eq!(line.monitors(), &[4, 6]);
        assert_eq!(line.registers_locked_at(1).collect::<Vec<_>>(), vec![2]);

        // unlocking through an alias releases the lock
        line.pop_monitor(&cache, 2).unwrap();
        line.pop_monitor(&cache, 2).unwrap();
        assert_eq!(line.monitor_stack_depth(), 0);
        assert_eq!(line.registers_locked_at(0).count(), 0);
        assert!(line.verify_monitor_stack_empty().is_ok());
        assert_eq!(
            line.pop_monitor(&cache, 0).unwrap_err().kind,
            VerifyError::LOCKING
        );
        assert!(line.push_monitor(&cache, 1, 8).is_ok());
        assert!(line.verify_monitor_stack_empty().is_err());
    }

    #[test]
    fn lock_taken_twice_at_same_depth() {
        let repo = Repo::new();
        let cache = RegTypeCache::new(&repo);
        let mut line = RegisterLine::new(1);
        line.set_register_type(&cache, 0, RegTypeId::JAVA_LANG_OBJECT, LockOp::Clear)
            .unwrap();
        assert!(line.set_reg_to_lock_depth(0, 0));
        assert!(!line.set_reg_to_lock_depth(0, 0));
        let failure = line.push_monitor(&cache, 0, 2).unwrap_err();
        assert_eq!(failure.kind, VerifyError::LOCKING);
        assert_eq!(failure.message, "unexpected monitor-enter on register v0");
        assert!(line.monitors().is_empty());
    }

    #[test]
    fn merges() {
        let repo = Repo::new();
        let mut cache = RegTypeCache::new(&repo);
        let mut a = RegisterLine::new(2);
        let mut b = RegisterLine::new(2);
        a.set_register_type(&cache, 0, RegTypeId::ZERO, LockOp::Clear).unwrap();
        b.set_register_type(&cache, 0, RegTypeId::POSITIVE_BYTE_CONSTANT, LockOp::Clear)
            .unwrap();
        a.set_register_type(&cache, 1, RegTypeId::JAVA_LANG_OBJECT, LockOp::Clear)
            .unwrap();
        b.set_register_type(&cache, 1, RegTypeId::JAVA_LANG_OBJECT, LockOp::Clear)
            .unwrap();

        let mut failures = Vec::new();
        assert!(a.merge_registers(&mut cache, &b, &mut failures));
        assert_eq!(a.get(0), RegTypeId::POSITIVE_BYTE_CONSTANT);
        assert!(!a.merge_registers(&mut cache, &b, &mut failures));
        assert!(failures.is_empty());

        b.push_monitor(&cache, 1, 0).unwrap();
        a.merge_registers(&mut cache, &b, &mut failures);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, VerifyError::LOCKING);

        assert_eq!(
            a.dump(&cache),
            "0:[Positive Byte Constant],1:[Reference: java.lang.Object],"
        );
        assert_ne!(a, b);
    }

    #[test]
    fn constructor_returns() {
        let repo = Repo::new();
        let mut cache = RegTypeCache::new(&repo);
        let this = cache.uninitialized_this(RegTypeId::JAVA_LANG_OBJECT);
        let mut line = RegisterLine::new(2);
        line.set_register_type(&cache, 1, this, LockOp::Clear).unwrap();
        line.copy_register1(&cache, 0, 1, TypeCategory::Reference).unwrap();
        assert!(line.check_constructor_return().is_err());
        line.mark_refs_as_initialized(&mut cache, this);
        assert_eq!(line.get(0), RegTypeId::JAVA_LANG_OBJECT);
        assert_eq!(line.get(1), RegTypeId::JAVA_LANG_OBJECT);
        assert!(line.check_constructor_return().is_ok());
        line.mark_all_registers_as_conflicts_except(1);
        assert_eq!(line.get(0), RegTypeId::CONFLICT);
    }
}
