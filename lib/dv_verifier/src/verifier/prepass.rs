//! Static checks of a method code, done once before the code-flow analysis.

use super::fields::field_access;
use super::MethodVerifier;
use crate::failures::VerifyError;
use crate::insn_flags::InsnFlags;
use crate::repo::JAVA_LANG_CLASS;
use dv_dex::errors::DexError;
use dv_dex::instrs::{Instr, Instruction, Operand};
use dv_dex::types::TypeIdItem;
use dv_dex::{decode, DexIndex, Index};

const PACKED_SWITCH_SIGNATURE: u16 = 0x0100;
const SPARSE_SWITCH_SIGNATURE: u16 = 0x0200;
const ARRAY_DATA_SIGNATURE: u16 = 0x0300;

/// Largest number of registers of a non-range invoke.
const MAX_VAR_ARG_REGS: usize = 5;

/// Positions, among the operands, of the registers holding a wide value.
fn wide_register_operands(instr: &Instr) -> &'static [usize] {
    use Instr::*;
    match instr {
        MoveWide(..) | MoveWideFrom16(..) | MoveWide16(..) => &[0, 1],
        MoveResultWide(_) | ReturnWide(_) => &[0],
        ConstWide16(..) | ConstWide32(..) | ConstWide(..) | ConstWideHigh16(..) => &[0],
        CmplDouble(..) | CmpgDouble(..) | CmpLong(..) => &[1, 2],
        AgetWide(..) | AputWide(..) => &[0],
        IgetWide(..) | IputWide(..) | SgetWide(..) | SputWide(..) => &[0],
        NegLong(..) | NotLong(..) | NegDouble(..) | LongToDouble(..) | DoubleToLong(..) => &[0, 1],
        IntToLong(..) | IntToDouble(..) | FloatToLong(..) | FloatToDouble(..) => &[0],
        LongToInt(..) | LongToFloat(..) | DoubleToInt(..) | DoubleToFloat(..) => &[1],
        AddLong(..) | SubLong(..) | MulLong(..) | DivLong(..) | RemLong(..) | AndLong(..)
        | OrLong(..) | XorLong(..) | AddDouble(..) | SubDouble(..) | MulDouble(..)
        | DivDouble(..) | RemDouble(..) => &[0, 1, 2],
        ShlLong(..) | ShrLong(..) | UshrLong(..) => &[0, 1],
        AddLong2addr(..) | SubLong2addr(..) | MulLong2addr(..) | DivLong2addr(..)
        | RemLong2addr(..) | AndLong2addr(..) | OrLong2addr(..) | XorLong2addr(..)
        | AddDouble2addr(..) | SubDouble2addr(..) | MulDouble2addr(..) | DivDouble2addr(..)
        | RemDouble2addr(..) => &[0, 1],
        ShlLong2addr(..) | ShrLong2addr(..) | UshrLong2addr(..) => &[0],
        _ => &[],
    }
}

/// Vararg instructions that need at least one register, the receiver.
fn needs_receiver(instr: &Instr) -> bool {
    use Instr::*;
    matches!(
        instr,
        InvokeVirtual(..)
            | InvokeSuper(..)
            | InvokeDirect(..)
            | InvokeInterface(..)
            | InvokeVirtualRange(..)
            | InvokeSuperRange(..)
            | InvokeDirectRange(..)
            | InvokeInterfaceRange(..)
            | InvokePolymorphic(..)
            | InvokePolymorphicRange(..)
    )
}

impl<'a> MethodVerifier<'a> {
    /// Decodes the instruction stream and flags the start of each instruction.
    pub(super) fn compute_widths_and_count_ops(&mut self) -> bool {
        let Some(code) = self.code() else {
            return false;
        };
        let insns = code.insns();
        if insns.is_empty() {
            self.fail_hard("code item has no opcode");
            return false;
        }
        let mut pc = 0;
        while pc < insns.len() {
            match decode(insns, pc) {
                Ok(instr) => {
                    let size = instr.size();
                    self.insn_flags.set(pc as u32, InsnFlags::OPCODE);
                    self.insns[pc] = Some(instr);
                    pc += size;
                }
                Err(DexError::Truncated(_)) => {
                    self.work_pc = pc as u32;
                    self.fail_hard(format!(
                        "code did not end where expected ({pc} vs. {})",
                        insns.len()
                    ));
                    return false;
                }
                Err(err) => {
                    self.work_pc = pc as u32;
                    self.fail_hard(format!("invalid instruction: {err}"));
                    return false;
                }
            }
        }
        true
    }

    /// Flags the instructions covered by try blocks and checks the handlers.
    pub(super) fn scan_try_catch_blocks(&mut self) -> bool {
        let Some(code) = self.code() else {
            return false;
        };
        let insns_size = self.insns_size();
        for try_item in code.tries() {
            let start = try_item.start_addr();
            let end = try_item.end_addr();
            if start >= end || start >= insns_size || end > insns_size {
                self.fail_hard(format!(
                    "bad exception entry: startAddr={start} endAddr={end} (size={insns_size})"
                ));
                return false;
            }
            if !self.insn_flags.get(start).is_opcode() {
                self.fail_hard(format!("'try' block starts inside an instruction ({start})"));
                return false;
            }
            for pc in start..end {
                if self.insn_flags.get(pc).is_opcode() {
                    self.insn_flags.set(pc, InsnFlags::IN_TRY);
                }
            }
        }

        for try_item in code.tries() {
            for (type_idx, addr) in try_item.handler().iter() {
                if !self.insn_flags.get(addr).is_opcode() {
                    self.fail_hard(format!("exception handler starts at bad address ({addr})"));
                    return false;
                }
                if self.insn_at(addr).map_or(false, Instr::is_move_result) {
                    self.fail_hard(format!("exception handler begins with move-result* ({addr})"));
                    return false;
                }
                if let Some(type_idx) = type_idx {
                    if type_idx.get(self.dex).is_err() {
                        self.fail_hard(format!(
                            "bad type index {type_idx} (max {})",
                            self.dex.nb_types()
                        ));
                        return false;
                    }
                }
                self.insn_flags.set(addr, InsnFlags::BRANCH_TARGET);
            }
        }
        true
    }

    /// Per-instruction static checks: register and index bounds, branch,
    /// switch and array data targets.
    pub(super) fn verify_instructions(&mut self) -> bool {
        self.insn_flags.set(0, InsnFlags::BRANCH_TARGET);
        let pcs: Vec<u32> = self.insn_flags.iter_opcodes().collect();
        for pc in pcs {
            let Some(instr) = self.insn_at(pc).cloned() else {
                continue;
            };
            self.work_pc = pc;
            if !self.verify_instruction(&instr, pc) {
                return false;
            }
            if instr.is_return() {
                self.insn_flags.set(pc, InsnFlags::RETURN);
            }
        }
        true
    }

    fn verify_instruction(&mut self, instr: &Instr, pc: u32) -> bool {
        if let Instr::Unused(op) = instr {
            self.fail_hard(format!("unexpected opcode 0x{op:02x}"));
            return false;
        }
        if instr.is_payload() {
            return true;
        }

        let operands = instr.operands();
        let wide = wide_register_operands(instr);
        for (pos, operand) in operands.iter().enumerate() {
            let valid = match operand {
                Operand::Reg(reg) if wide.contains(&pos) => {
                    self.check_wide_register_index(reg.index())
                }
                Operand::Reg(reg) => self.check_register_index(reg.index()),
                Operand::RegList(list) => {
                    self.check_var_arg_regs(instr, list.len(), list.iter().map(|r| r.index()))
                }
                Operand::RegRange(range) => {
                    self.check_var_arg_range_regs(instr, range.len(), range.first().index())
                }
                Operand::String(idx) => {
                    self.check_index("string", idx.value(), self.dex.nb_strings())
                }
                Operand::Type(idx) => self.check_index("type", idx.value(), self.dex.nb_types()),
                Operand::Field(idx) => self.check_index("field", idx.value(), self.dex.nb_fields()),
                Operand::Method(idx) => {
                    self.check_index("method", idx.value(), self.dex.nb_methods())
                }
                Operand::Proto(idx) => {
                    self.check_index("prototype", idx.value(), self.dex.nb_protos())
                }
                Operand::CallSite(idx) => {
                    self.check_index("call site", idx.value(), self.dex.nb_call_sites())
                }
                Operand::MethodHandle(idx) => self.check_index(
                    "method handle",
                    idx.value(),
                    self.dex.nb_method_handles(),
                ),
                Operand::Literal(_) | Operand::Offset(_) => true,
            };
            if !valid {
                return false;
            }
        }

        match instr {
            Instr::NewInstance(_, idx) => self.check_new_instance(*idx),
            Instr::NewArray(_, _, idx)
            | Instr::FilledNewArray(_, idx)
            | Instr::FilledNewArrayRange(_, idx) => self.check_new_array(*idx),
            Instr::FillArrayData(_, offset) => self.check_array_data(pc, *offset),
            Instr::PackedSwitch(_, offset) | Instr::SparseSwitch(_, offset) => {
                self.check_switch_targets(pc, *offset, matches!(instr, Instr::PackedSwitch(..)))
            }
            _ if instr.can_branch() => self.check_branch_target(instr, pc),
            _ => self.check_field_index(instr),
        }
    }

    fn check_register_index(&mut self, idx: u32) -> bool {
        let regs = self.registers_size();
        if idx >= regs {
            self.fail_hard(format!("register index out of range ({idx} >= {regs})"));
            return false;
        }
        true
    }

    fn check_wide_register_index(&mut self, idx: u32) -> bool {
        let regs = self.registers_size();
        if idx + 1 >= regs {
            self.fail_hard(format!("wide register index out of range ({idx}+1 >= {regs})"));
            return false;
        }
        true
    }

    fn check_index(&mut self, what: &str, idx: u32, limit: usize) -> bool {
        if idx as usize >= limit {
            self.fail_hard(format!("bad {what} index {idx} (max {limit})"));
            return false;
        }
        true
    }

    fn check_var_arg_regs(
        &mut self,
        instr: &Instr,
        count: usize,
        mut regs: impl Iterator<Item = u32>,
    ) -> bool {
        if count > MAX_VAR_ARG_REGS || (count == 0 && needs_receiver(instr)) {
            self.fail_hard(format!("invalid arg count ({count}) in {}", instr.mnemonic()));
            return false;
        }
        let registers_size = self.registers_size();
        if let Some(bad) = regs.find(|r| *r >= registers_size) {
            self.fail_hard(format!(
                "invalid reg index ({bad}) in non-range invoke (>= {registers_size})"
            ));
            return false;
        }
        true
    }

    fn check_var_arg_range_regs(&mut self, instr: &Instr, count: usize, first: u32) -> bool {
        if count == 0 && needs_receiver(instr) {
            self.fail_hard(format!("invalid arg count ({count}) in {}", instr.mnemonic()));
            return false;
        }
        let registers_size = self.registers_size();
        if count as u32 + first > registers_size {
            self.fail_hard(format!(
                "invalid reg index {count}+{first} in range invoke (> {registers_size})"
            ));
            return false;
        }
        true
    }

    fn check_new_instance(&mut self, idx: Index<TypeIdItem>) -> bool {
        let descriptor = match self.dex.type_descriptor(idx) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                self.fail_hard(format!("bad type index {idx}: {err}"));
                return false;
            }
        };
        if !descriptor.starts_with('L') {
            self.fail_hard(format!("can't call new-instance on type '{descriptor}'"));
            return false;
        }
        if descriptor == JAVA_LANG_CLASS {
            self.fail(VerifyError::INSTANTIATION, "new-instance on java.lang.Class");
        }
        true
    }

    fn check_new_array(&mut self, idx: Index<TypeIdItem>) -> bool {
        let descriptor = match self.dex.type_descriptor(idx) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                self.fail_hard(format!("bad type index {idx}: {err}"));
                return false;
            }
        };
        let dimensions = descriptor.bytes().take_while(|b| *b == b'[').count();
        if dimensions == 0 {
            self.fail_hard(format!("can't new-array class '{descriptor}' (not an array)"));
            return false;
        }
        if dimensions > 255 {
            self.fail_hard(format!("can't new-array class '{descriptor}' (exceeds limit)"));
            return false;
        }
        true
    }

    /// Resolves the absolute target of a relative offset, `None` when it
    /// falls outside of the code.
    pub(super) fn absolute_target(&self, pc: u32, offset: i32) -> Option<u32> {
        let target = i64::from(pc) + i64::from(offset);
        (0..i64::from(self.insns_size()))
            .contains(&target)
            .then_some(target as u32)
    }

    /// Code unit at a dex pc, 0 outside of the code.
    fn code_unit(&self, pc: u32) -> u16 {
        self.code()
            .and_then(|code| code.insns().get(pc as usize).copied())
            .unwrap_or(0)
    }

    fn check_branch_target(&mut self, instr: &Instr, pc: u32) -> bool {
        let Some(offset) = instr.branch_offset() else {
            return true;
        };
        if offset == 0 && !matches!(instr, Instr::Goto32(_)) {
            self.fail_hard(format!("branch offset of zero not allowed at 0x{pc:x}"));
            return false;
        }
        match self.absolute_target(pc, offset) {
            Some(target) if self.insn_flags.get(target).is_opcode() => {
                self.insn_flags.set(target, InsnFlags::BRANCH_TARGET);
                true
            }
            _ => {
                self.fail_hard(format!(
                    "invalid branch target {offset} (-> 0x{:x}) at 0x{pc:x}",
                    i64::from(pc) + i64::from(offset)
                ));
                false
            }
        }
    }

    fn check_switch_targets(&mut self, pc: u32, offset: i32, is_packed: bool) -> bool {
        let insns_size = self.insns_size();
        let table = match self.absolute_target(pc, offset) {
            Some(table) if table + 2 <= insns_size => table,
            _ => {
                self.fail_hard(format!(
                    "invalid switch start: at {pc}, switch offset {offset}, count {insns_size}"
                ));
                return false;
            }
        };
        if table % 2 != 0 {
            self.fail_hard(format!(
                "unaligned switch table: at {pc}, switch offset {offset}"
            ));
            return false;
        }
        if !self.insn_flags.get(table).is_opcode() {
            self.fail_hard(format!(
                "switch table at {pc}, switch offset {offset} not correctly visited, probably bad padding."
            ));
            return false;
        }
        let expected = if is_packed {
            PACKED_SWITCH_SIGNATURE
        } else {
            SPARSE_SWITCH_SIGNATURE
        };
        let signature = self.code_unit(table);
        if signature != expected {
            self.fail_hard(format!(
                "wrong signature for switch table ({signature:x}, wanted {expected:x})"
            ));
            return false;
        }
        let (targets, key_failure) = match self.insn_at(table) {
            Some(Instr::PackedSwitchPayload(first_key, targets)) => {
                let max_first_key = i64::from(i32::MAX) - (targets.len() as i64 - 1);
                let valid = targets.len() <= 1 || i64::from(*first_key) <= max_first_key;
                let message = (!valid).then(|| {
                    format!(
                        "invalid packed switch: first_key={first_key}, switch_count={}",
                        targets.len()
                    )
                });
                (targets.clone(), message)
            }
            Some(Instr::SparseSwitchPayload(keys, targets)) => {
                let message = keys.windows(2).find(|w| w[1] <= w[0]).map(|w| {
                    format!("invalid sparse switch: last key={}, this={}", w[0], w[1])
                });
                (targets.clone(), message)
            }
            _ => {
                self.fail_hard(format!(
                    "invalid switch end: at {pc}, switch offset {offset}, count {insns_size}"
                ));
                return false;
            }
        };
        if let Some(message) = key_failure {
            self.fail_hard(message);
            return false;
        }
        for (i, target_offset) in targets.iter().enumerate() {
            match self.absolute_target(pc, *target_offset) {
                Some(target) if self.insn_flags.get(target).is_opcode() => {
                    self.insn_flags.set(target, InsnFlags::BRANCH_TARGET);
                }
                _ => {
                    self.fail_hard(format!(
                        "invalid switch target {target_offset} (-> 0x{:x}) at 0x{pc:x}[{i}]",
                        i64::from(pc) + i64::from(*target_offset)
                    ));
                    return false;
                }
            }
        }
        true
    }

    fn check_array_data(&mut self, pc: u32, offset: i32) -> bool {
        let insns_size = self.insns_size();
        let table = match self.absolute_target(pc, offset) {
            Some(table) if table + 2 < insns_size => table,
            _ => {
                self.fail_hard(format!(
                    "invalid array data start: at {pc}, data offset {offset}, count {insns_size}"
                ));
                return false;
            }
        };
        if table % 2 != 0 {
            self.fail_hard(format!(
                "unaligned array data table: at {pc}, data offset {offset}"
            ));
            return false;
        }
        if !self.insn_flags.get(table).is_opcode() {
            self.fail_hard(format!(
                "array data table at {pc}, data offset {offset} not correctly visited, probably bad padding."
            ));
            return false;
        }
        if self.code_unit(table) != ARRAY_DATA_SIGNATURE {
            self.fail_hard("invalid magic for array-data");
            return false;
        }
        let end = self.insn_at(table).map(|payload| table as usize + payload.size());
        match end {
            Some(end) if end <= insns_size as usize => true,
            _ => {
                self.fail_hard(format!(
                    "invalid array data end: at {pc}, data offset {offset}, count {insns_size}"
                ));
                false
            }
        }
    }

    /// Field instructions must match the kind of the field type.
    fn check_field_index(&mut self, instr: &Instr) -> bool {
        let Some(access) = field_access(instr) else {
            return true;
        };
        let field_id = match access.field.get(self.dex) {
            Ok(field_id) => field_id,
            Err(_) => return true,
        };
        let descriptor = field_id.type_descriptor(self.dex).unwrap_or("");
        let (first, second) = access.mem.permitted_descriptors();
        let found = descriptor.chars().next().unwrap_or(' ');
        if found != first && found != second {
            let permitted = if first == second {
                format!("'{first}'")
            } else {
                format!("'{first}' or '{second}'")
            };
            let name = field_id.name(self.dex).unwrap_or("?");
            self.fail_hard(format!(
                "expected field {name} to have type descriptor starting with {permitted} but found '{found}' in {}",
                instr.mnemonic()
            ));
            return false;
        }
        true
    }
}
