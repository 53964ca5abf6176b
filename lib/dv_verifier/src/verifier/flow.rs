//! Fixed-point code-flow analysis: register lines are propagated along the
//! branch, switch, exception and fallthrough edges until none changes.

use super::{LockInfo, MethodVerifier, RegisterTracking};
use crate::failures::VerifyError;
use crate::insn_flags::InsnFlags;
use crate::reg_types::{RegTypeCache, RegTypeId};
use crate::register_line::{LineFailure, LockOp, RegisterLine};
use crate::repo::JAVA_LANG_THROWABLE;
use dv_dex::instrs::{Instr, Instruction};
use dv_dex::types::TypeIdItem;
use dv_dex::Index;

/// The line merged into a successor.
#[derive(Clone, Copy)]
enum LineSource<'l> {
    Work,
    /// Line before the current instruction, for exception edges.
    Saved,
    Other(&'l RegisterLine),
}

/// Registers still alive at a return instruction.
#[derive(Debug, Clone, Copy)]
enum ReturnKind {
    Void,
    Single(u32),
    Wide(u32),
}

fn return_kind(instr: &Instr) -> Option<ReturnKind> {
    match instr {
        Instr::ReturnVoid => Some(ReturnKind::Void),
        Instr::Return(r) | Instr::ReturnObject(r) => Some(ReturnKind::Single(r.index())),
        Instr::ReturnWide(r) => Some(ReturnKind::Wide(r.index())),
        _ => None,
    }
}

/// At a return only the returned registers are alive, the other ones are
/// set to `Conflict`.
fn adjust_return_line(
    line: &mut RegisterLine,
    kind: ReturnKind,
    instance_constructor: bool,
    failures: &mut Vec<LineFailure>,
) {
    match kind {
        ReturnKind::Void => {
            if instance_constructor {
                if let Err(failure) = line.check_constructor_return() {
                    failures.push(failure);
                }
            }
            line.mark_all_registers_as_conflicts();
        }
        ReturnKind::Single(vsrc) => line.mark_all_registers_as_conflicts_except(vsrc),
        ReturnKind::Wide(vsrc) => line.mark_all_registers_as_conflicts_except_wide(vsrc),
    }
}

/// Checks the shape of a return type descriptor.
fn is_valid_return_descriptor(descriptor: &str) -> bool {
    let element = descriptor.trim_start_matches('[');
    let is_array = element.len() != descriptor.len();
    match element.as_bytes() {
        [b'V'] => !is_array,
        [b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D'] => true,
        [b'L', .., b';'] => element.len() > 2,
        _ => false,
    }
}

impl<'a> MethodVerifier<'a> {
    /// Runs the code-flow analysis from the entry of the method.
    pub(super) fn verify_code_flow(&mut self) -> bool {
        let nb_registers = self.registers_size() as usize;
        for pc in self.insn_flags.iter_opcodes() {
            let tracked = match self.tracking {
                RegisterTracking::All => true,
                RegisterTracking::Branches => self.insn_flags.get(pc).is_branch_target(),
            };
            if tracked {
                self.saved_lines[pc as usize] = Some(RegisterLine::new(nb_registers));
            }
        }
        self.work_line = RegisterLine::new(nb_registers);
        self.saved_line = RegisterLine::new(nb_registers);

        self.work_pc = 0;
        if !self.set_types_from_signature() {
            self.prepend_to_last("Bad signature in ");
            return false;
        }
        self.failures.clear_pending_runtime_throw();

        self.code_flow_verify_method()
    }

    /// Sets the types of the argument registers at pc 0: `this` first for
    /// instance methods, then the parameters, wide ones on two registers.
    fn set_types_from_signature(&mut self) -> bool {
        let Some(code) = self.code() else {
            return false;
        };
        let registers_size = u32::from(code.registers_size());
        let expected_args = u32::from(code.ins_size());
        let arg_start = registers_size - expected_args;
        let mut line = RegisterLine::new(registers_size as usize);

        let mut cur_arg = 0;
        if !self.is_static() {
            if expected_args == 0 {
                self.fail_hard("expected 0 args, but method is not static");
                return false;
            }
            let declaring_class = self.declaring_class;
            let this_type = if !self.is_constructor {
                declaring_class
            } else if self.cache.get(declaring_class).is_java_lang_object() {
                // the constructor of Object has nothing to initialize
                line.set_this_initialized();
                declaring_class
            } else {
                self.cache.uninitialized_this(declaring_class)
            };
            let result = line.set_register_type(&self.cache, arg_start, this_type, LockOp::Clear);
            if !self.check_line(result) {
                return false;
            }
            cur_arg += 1;
        }

        let proto = match self.method_id.proto(self.dex) {
            Ok(proto) => proto,
            Err(err) => {
                self.fail_hard(format!("bad prototype: {err}"));
                return false;
            }
        };
        let parameters = match proto.parameter_descriptors(self.dex) {
            Ok(parameters) => parameters,
            Err(err) => {
                self.fail_hard(format!("bad parameters: {err}"));
                return false;
            }
        };
        for descriptor in parameters {
            if cur_arg >= expected_args {
                self.fail_hard(format!(
                    "expected {expected_args} args, found more ({descriptor})"
                ));
                return false;
            }
            let vdst = arg_start + cur_arg;
            let result = match descriptor.as_bytes().first() {
                Some(b'L' | b'[') => {
                    // no access check, only uses of the class are checked
                    let t = self.cache.from_descriptor(descriptor);
                    if !self.cache.get(t).is_non_zero_reference_types() {
                        let class = self.declaring_class_name();
                        self.fail_hard(format!(
                            "accessing broken descriptor '{descriptor}' in {class}"
                        ));
                        return false;
                    }
                    line.set_register_type(&self.cache, vdst, t, LockOp::Clear)
                }
                Some(b'J' | b'D') => {
                    if cur_arg + 1 >= expected_args {
                        self.fail_hard(format!(
                            "expected {expected_args} args, found more ({descriptor})"
                        ));
                        return false;
                    }
                    let lo = if descriptor == "J" {
                        RegTypeId::LONG_LO
                    } else {
                        RegTypeId::DOUBLE_LO
                    };
                    cur_arg += 1;
                    line.set_register_type_wide(&self.cache, vdst, lo, RegTypeCache::high_half(lo))
                }
                Some(b'Z' | b'C' | b'B' | b'I' | b'S' | b'F') if descriptor.len() == 1 => {
                    let t = self.cache.from_descriptor(descriptor);
                    line.set_register_type(&self.cache, vdst, t, LockOp::Clear)
                }
                _ => {
                    self.fail_hard(format!("unexpected signature type char '{descriptor}'"));
                    return false;
                }
            };
            if !self.check_line(result) {
                return false;
            }
            cur_arg += 1;
        }
        if cur_arg != expected_args {
            self.fail_hard(format!(
                "expected {expected_args} arguments, found {cur_arg}"
            ));
            return false;
        }

        match proto.return_descriptor(self.dex) {
            Ok(descriptor) if is_valid_return_descriptor(descriptor) => (),
            Ok(descriptor) => {
                self.fail_hard(format!(
                    "unexpected char in return type descriptor '{descriptor}'"
                ));
                return false;
            }
            Err(err) => {
                self.fail_hard(format!("bad return type: {err}"));
                return false;
            }
        }

        match self.saved_lines.get_mut(0) {
            Some(entry) => *entry = Some(line),
            None => return false,
        }
        true
    }

    /// Verifies the instructions marked as changed until none is left.
    fn code_flow_verify_method(&mut self) -> bool {
        self.insn_flags.set(0, InsnFlags::CHANGED);
        let mut start_guess = 0;

        loop {
            let pc = match self.insn_flags.next_changed(start_guess) {
                Some(pc) => pc,
                None if start_guess != 0 => {
                    // try again, from the top
                    start_guess = 0;
                    continue;
                }
                None => break,
            };

            // straight-line code carries the work line over, other entries
            // reload the saved one
            self.work_pc = pc;
            if self.insn_flags.get(pc).is_branch_target() {
                if let Some(Some(line)) = self.saved_lines.get(pc as usize) {
                    self.work_line.copy_from(line);
                }
            }

            // locks held before the instruction executes
            if self.interesting_pc == Some(pc) {
                self.gather_locks();
            }

            if !self.code_flow_verify_instruction(&mut start_guess) {
                log::debug!("{}: rejecting opcode at 0x{pc:04x}", self.name);
                return false;
            }
            self.insn_flags.set(pc, InsnFlags::VISITED);
            self.insn_flags.clear(pc, InsnFlags::CHANGED);
        }

        if log::log_enabled!(log::Level::Trace) {
            let dead: Vec<u32> = self
                .insn_flags
                .iter_opcodes()
                .filter(|pc| {
                    !self.insn_flags.get(*pc).is_visited()
                        && !self.insn_at(*pc).map_or(false, Instr::is_payload)
                })
                .collect();
            if let (Some(first), Some(last)) = (dead.first(), dead.last()) {
                log::trace!(
                    "{}: dead code 0x{first:04x}-0x{last:04x} ({} instructions)",
                    self.name,
                    dead.len()
                );
            }
        }
        true
    }

    fn gather_locks(&mut self) {
        let work_line = &self.work_line;
        self.locks = work_line
            .monitors()
            .iter()
            .enumerate()
            .map(|(depth, dex_pc)| LockInfo {
                dex_pc: *dex_pc,
                dex_registers: work_line.registers_locked_at(depth).collect(),
            })
            .filter(|lock| !lock.dex_registers.is_empty())
            .collect();
    }

    /// Verifies the instruction at the work pc and propagates the resulting
    /// line to its successors.
    fn code_flow_verify_instruction(&mut self, start_guess: &mut u32) -> bool {
        let pc = self.work_pc;
        let Some(instr) = self.insn_at(pc).cloned() else {
            self.fail_hard(format!("no instruction at 0x{pc:x}"));
            return false;
        };

        let mut can_throw = instr.can_throw();
        let mut can_branch = instr.can_branch();
        let mut can_switch = instr.can_switch();
        let mut can_continue = instr.can_continue();
        let mut is_return = instr.is_return();
        let in_try = self.insn_flags.get(pc).is_in_try();
        if can_throw && in_try {
            self.saved_line.copy_from(&self.work_line);
        }

        let transfer = self.transfer(&instr);
        if transfer.no_throw {
            can_throw = false;
        }

        if self.failures.has_pending_hard_failure() {
            return false;
        }
        if self.failures.has_pending_runtime_throw() {
            // the checked interpreter throws here, only the handlers follow
            log::trace!("{}: 0x{pc:04x} elevated to throw", self.name);
            self.insn_flags.set(pc, InsnFlags::RUNTIME_THROW);
            can_throw = true;
            can_branch = false;
            can_switch = false;
            can_continue = false;
            is_return = false;
            self.failures.clear_pending_runtime_throw();
        }

        // move-result* must directly follow what set the result
        if !transfer.just_set_result {
            self.work_line.set_result_type_to_unknown();
        }

        let mut branch_target = None;
        if can_branch {
            let target = instr
                .branch_offset()
                .and_then(|offset| self.absolute_target(pc, offset));
            let Some(target) = target else {
                self.fail_hard(format!("invalid branch at 0x{pc:x}"));
                return false;
            };
            if !self.check_not_move_exception_or_result(target) {
                return false;
            }
            let source = transfer
                .branch_line
                .as_ref()
                .map_or(LineSource::Work, LineSource::Other);
            if !self.update_registers(target, source, false) {
                return false;
            }
            branch_target = Some(target);
        }

        if can_switch {
            for target in self.switch_targets(&instr) {
                let Some(target) = target else {
                    self.fail_hard(format!("invalid switch target at 0x{pc:x}"));
                    return false;
                };
                if !self.check_not_move_exception_or_result(target)
                    || !self.update_registers(target, LineSource::Work, false)
                {
                    return false;
                }
            }
        }

        if can_throw && in_try {
            let handlers: Vec<(Option<Index<TypeIdItem>>, u32)> = self
                .code()
                .and_then(|code| code.find_catch_handler(pc))
                .map(|handler| handler.iter().collect())
                .unwrap_or_default();
            let mut has_catch_all = false;
            for (type_idx, addr) in handlers {
                // catching Throwable catches everything
                has_catch_all |= type_idx.map_or(true, |idx| {
                    self.dex
                        .type_descriptor(idx)
                        .map_or(false, |d| d == JAVA_LANG_THROWABLE)
                });
                if !self.update_registers(addr, LineSource::Saved, false) {
                    return false;
                }
            }
            // monitor-enter throws before taking its lock
            let depth = self.work_line.monitor_stack_depth();
            if depth > 0
                && !has_catch_all
                && !(matches!(instr, Instr::MonitorEnter(_)) && depth == 1)
            {
                self.fail_hard(
                    "expected to be within a catch-all for an instruction where a monitor is held",
                );
                return false;
            }
        }

        let next = pc + instr.size() as u32;
        if can_continue && !transfer.exc_handler_unreachable {
            if next >= self.insns_size() {
                self.fail_hard("Execution can walk off end of code area");
                return false;
            }
            if !self.check_not_move_exception(next) {
                return false;
            }
            if let Some(line) = transfer.fallthrough_line.as_ref() {
                self.work_line.copy_from(line);
            }
            if let Some(kind) = self.insn_at(next).and_then(return_kind) {
                let instance_constructor = self.is_instance_constructor();
                let mut failures = Vec::new();
                adjust_return_line(&mut self.work_line, kind, instance_constructor, &mut failures);
                for failure in failures {
                    self.fail_line(failure);
                }
                if self.failures.has_pending_hard_failure() {
                    return false;
                }
            }
            if !self.update_registers(next, LineSource::Work, true) {
                return false;
            }
        }

        if is_return {
            if let Err(failure) = self.work_line.verify_monitor_stack_empty() {
                // returning with a lock held cannot be salvaged at runtime
                self.fail(failure.kind | VerifyError::BAD_CLASS_HARD, failure.message);
                return false;
            }
        }

        if can_continue {
            *start_guess = next;
        } else if let Some(target) = branch_target {
            *start_guess = target;
        }

        if self.failures.has_pending_runtime_throw() {
            self.failures
                .note(VerifyError::RUNTIME_THROW, pc, "instruction throws at runtime");
            self.failures.clear_pending_runtime_throw();
        }
        true
    }

    /// Absolute targets of a switch, `None` for the ones outside of the code.
    fn switch_targets(&self, instr: &Instr) -> Vec<Option<u32>> {
        let pc = self.work_pc;
        let payload = instr
            .payload_offset()
            .and_then(|offset| self.absolute_target(pc, offset))
            .and_then(|table| self.insn_at(table));
        let targets = match payload {
            Some(Instr::PackedSwitchPayload(_, targets) | Instr::SparseSwitchPayload(_, targets)) => {
                targets.as_slice()
            }
            _ => &[],
        };
        targets
            .iter()
            .map(|offset| self.absolute_target(pc, *offset))
            .collect()
    }

    /// Merges a line into the saved line of a successor and flags the
    /// successor as changed when its line changed. On the fallthrough edge
    /// the work line follows the merged line.
    fn update_registers(&mut self, target: u32, source: LineSource, update_merge_line: bool) -> bool {
        let flags = self.insn_flags.get(target);
        let adjust = if flags.is_visited_or_changed() {
            None
        } else {
            self.insn_at(target).and_then(return_kind)
        };
        let instance_constructor = self.is_instance_constructor();

        let mut failures = Vec::new();
        let merge_line = match source {
            LineSource::Work => &self.work_line,
            LineSource::Saved => &self.saved_line,
            LineSource::Other(line) => line,
        };
        let Some(target_line) = self
            .saved_lines
            .get_mut(target as usize)
            .and_then(Option::as_mut)
        else {
            // no saved line to compare with, verify it again
            self.insn_flags.set(target, InsnFlags::CHANGED);
            return true;
        };
        let changed = if flags.is_visited_or_changed() {
            let changed = target_line.merge_registers(&mut self.cache, merge_line, &mut failures);
            if changed {
                log::trace!("{}: merge at 0x{:04x} into 0x{target:04x}", self.name, self.work_pc);
            }
            changed
        } else {
            // first time here, the line leaves the undefined state
            target_line.copy_from(merge_line);
            if let Some(kind) = adjust {
                adjust_return_line(target_line, kind, instance_constructor, &mut failures);
            }
            true
        };

        for failure in failures {
            self.fail_line(failure);
        }
        if self.failures.has_pending_hard_failure() {
            return false;
        }
        if update_merge_line && changed && flags.is_visited_or_changed() {
            if let Some(Some(line)) = self.saved_lines.get(target as usize) {
                self.work_line.copy_from(line);
            }
        }
        if changed {
            self.insn_flags.set(target, InsnFlags::CHANGED);
        }
        true
    }

    fn check_not_move_exception(&mut self, pc: u32) -> bool {
        if matches!(self.insn_at(pc), Some(Instr::MoveException(_))) {
            self.fail_hard("invalid use of move-exception");
            return false;
        }
        true
    }

    /// Branches may not target the `move-result*` of an invoke.
    fn check_not_move_exception_or_result(&mut self, pc: u32) -> bool {
        if !self.check_not_move_exception(pc) {
            return false;
        }
        if self.insn_at(pc).map_or(false, Instr::is_move_result) {
            self.fail_hard("invalid use of move-result*");
            return false;
        }
        true
    }

    /// `move-exception`: the register gets the common superclass of the
    /// exceptions caught by the handlers starting here. Returns `false`
    /// when the handler can never be entered.
    pub(super) fn handle_move_exception(&mut self, vdst: u32) -> bool {
        // pc 0 is also reached by the method entry
        if self.work_pc == 0 {
            self.fail_hard("move-exception at pc 0x0");
            return true;
        }
        let (reachable, caught) = self.caught_exception_type();
        self.set_reg(vdst, caught);
        reachable
    }

    fn caught_exception_type(&mut self) -> (bool, RegTypeId) {
        let pc = self.work_pc;
        let handler_types: Vec<Option<Index<TypeIdItem>>> = self
            .code()
            .map(|code| {
                code.tries()
                    .iter()
                    .flat_map(|try_item| try_item.handler().iter())
                    .filter(|(_, addr)| *addr == pc)
                    .map(|(type_idx, _)| type_idx)
                    .collect()
            })
            .unwrap_or_default();

        let throwable = self.cache.from_descriptor(JAVA_LANG_THROWABLE);
        let mut common_super: Option<RegTypeId> = None;
        let mut unresolved: Option<RegTypeId> = None;
        for type_idx in handler_types {
            let Some(type_idx) = type_idx else {
                common_super = Some(throwable);
                continue;
            };
            let exception = self.resolve_class(type_idx, true);
            if !self.cache.is_assignable_from(throwable, exception) {
                if self.cache.get(exception).is_unresolved_types() {
                    unresolved = Some(match unresolved {
                        Some(previous) => self.cache.merge(previous, exception),
                        None => exception,
                    });
                } else {
                    let msg = format!("unexpected non-throwable class {}", self.type_name(exception));
                    self.fail_hard(msg);
                    return (true, RegTypeId::CONFLICT);
                }
            } else {
                common_super = Some(match common_super {
                    Some(previous) if previous != exception => self.cache.merge(previous, exception),
                    _ => exception,
                });
            }
        }

        if let Some(unresolved) = unresolved {
            // checked again at runtime, not a runtime throw
            self.failures
                .note(VerifyError::UNRESOLVED_TYPE_CHECK, pc, "Unresolved catch handler");
            return match common_super {
                Some(common_super) => (true, self.cache.merge(unresolved, common_super)),
                None => (!self.potentially_mark_runtime_throw(), unresolved),
            };
        }
        let Some(common_super) = common_super else {
            self.fail_hard("unable to find exception handler");
            return (true, RegTypeId::CONFLICT);
        };
        if let Some(descriptor) = self.cache.descriptor(common_super).map(str::to_string) {
            self.check_for_final_abstract_class(&descriptor);
        }
        (true, common_super)
    }

    /// A handler catching only unresolved classes is never entered by the
    /// checked interpreter. Returns whether the code after it is dead.
    fn potentially_mark_runtime_throw(&mut self) -> bool {
        if !self.options.tracks_runtime_throws() {
            return false;
        }
        let pc = self.work_pc;
        self.failures
            .note(VerifyError::RUNTIME_THROW, pc, "unreachable exception handler");
        self.insn_flags.set(pc, InsnFlags::RUNTIME_THROW);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_descriptors() {
        assert!(is_valid_return_descriptor("V"));
        assert!(is_valid_return_descriptor("J"));
        assert!(is_valid_return_descriptor("[[I"));
        assert!(is_valid_return_descriptor("Ljava/lang/String;"));
        assert!(is_valid_return_descriptor("[Lfoo/Bar;"));
        assert!(!is_valid_return_descriptor("[V"));
        assert!(!is_valid_return_descriptor("L;"));
        assert!(!is_valid_return_descriptor("Ljava/lang/String"));
        assert!(!is_valid_return_descriptor("II"));
        assert!(!is_valid_return_descriptor(""));
    }

    #[test]
    fn return_lines() {
        let mut line = RegisterLine::new(4);
        let mut failures = Vec::new();
        adjust_return_line(&mut line, ReturnKind::Void, true, &mut failures);
        assert_eq!(failures.len(), 1);
        assert!((0..4).all(|v| line.get(v) == RegTypeId::CONFLICT));

        let mut line = RegisterLine::new(4);
        adjust_return_line(&mut line, ReturnKind::Wide(1), false, &mut failures);
        assert_eq!(line.get(0), RegTypeId::CONFLICT);
        assert_eq!(line.get(1), RegTypeId::UNDEFINED);
        assert_eq!(line.get(2), RegTypeId::UNDEFINED);
        assert_eq!(line.get(3), RegTypeId::CONFLICT);
    }
}
