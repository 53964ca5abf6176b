//! Per-instruction transfer: checks the operands of the instruction at the
//! current pc against the work line and applies its effect on the registers.

use super::fields::{field_access, MemType};
use super::invoke::InvokeArgs;
use super::{MethodType, MethodVerifier};
use crate::failures::VerifyError;
use crate::reg_types::{RegTypeCache, RegTypeId};
use crate::register_line::{LockOp, RegisterLine, TypeCategory};
use crate::repo::{
    JAVA_LANG_CLASS, JAVA_LANG_STRING, JAVA_LANG_THROWABLE, METHOD_HANDLE, METHOD_TYPE,
};
use dv_dex::instrs::Instr;
use dv_dex::registers::Reg;
use dv_dex::types::TypeIdItem;
use dv_dex::Index;

/// What the code-flow driver needs to know after the transfer of one
/// instruction, besides the work line itself.
#[derive(Debug, Default)]
pub(super) struct Transfer {
    /// Line to propagate to the branch target instead of the work line.
    pub(super) branch_line: Option<RegisterLine>,
    /// Line to propagate to the next instruction instead of the work line.
    pub(super) fallthrough_line: Option<RegisterLine>,
    /// The instruction wrote the result register.
    pub(super) just_set_result: bool,
    /// `move-exception` of a handler that can never be entered.
    pub(super) exc_handler_unreachable: bool,
    /// Exceptions of `monitor-exit` are not propagated to handlers.
    pub(super) no_throw: bool,
}

fn object_move(instr: &Instr) -> Option<(u32, u32)> {
    match instr {
        Instr::MoveObject(a, b) | Instr::MoveObjectFrom16(a, b) | Instr::MoveObject16(a, b) => {
            Some((a.index(), b.index()))
        }
        _ => None,
    }
}

impl<'a> MethodVerifier<'a> {
    pub(super) fn transfer(&mut self, instr: &Instr) -> Transfer {
        use Instr::*;

        let mut transfer = Transfer::default();
        match instr {
            Nop | Goto(_) | Goto16(_) | Goto32(_) => (),
            PackedSwitchPayload(..) | SparseSwitchPayload(..) | FillArrayDataPayload(..) => {
                self.fail_hard("encountered data table in instruction stream");
            }

            Move(a, b) | MoveFrom16(a, b) | Move16(a, b) => {
                self.copy1(a, b, TypeCategory::Category1nr);
            }
            MoveObject(a, b) | MoveObjectFrom16(a, b) | MoveObject16(a, b) => {
                self.copy1(a, b, TypeCategory::Reference);
            }
            MoveWide(a, b) | MoveWideFrom16(a, b) | MoveWide16(a, b) => {
                let result = self
                    .work_line
                    .copy_register2(&self.cache, a.index(), b.index());
                self.check_line(result);
            }
            MoveResult(a) | MoveResultObject(a) => {
                let is_reference = matches!(instr, MoveResultObject(_));
                let result =
                    self.work_line
                        .copy_result_register1(&self.cache, a.index(), is_reference);
                self.check_line(result);
            }
            MoveResultWide(a) => {
                let result = self.work_line.copy_result_register2(&self.cache, a.index());
                self.check_line(result);
            }
            MoveException(a) => {
                transfer.exc_handler_unreachable = !self.handle_move_exception(a.index());
            }

            ReturnVoid => {
                if self.check_constructor_return() && self.return_type != RegTypeId::CONFLICT {
                    self.fail_hard("return-void not expected");
                }
            }
            Return(a) => {
                if self.check_constructor_return() {
                    self.verify_return(a.index());
                }
            }
            ReturnWide(a) => {
                if self.check_constructor_return() {
                    if self.cache.get(self.return_type).is_category2_types() {
                        let vsrc = a.index();
                        if !self.verify_reg_wide(vsrc, self.return_type) {
                            self.append_to_last(&format!(" return-wide on invalid register v{vsrc}"));
                        }
                    } else {
                        self.fail_hard("return-wide not expected");
                    }
                }
            }
            ReturnObject(a) => {
                if self.check_constructor_return() {
                    self.verify_return_object(a.index());
                }
            }

            Const4(a, v) => self.set_const(a, i32::from(*v)),
            Const16(a, v) => self.set_const(a, i32::from(*v)),
            Const(a, v) => self.set_const(a, *v),
            ConstHigh16(a, v) => self.set_const(a, i32::from(*v) << 16),
            ConstWide16(a, _) | ConstWide32(a, _) | ConstWide(a, _) | ConstWideHigh16(a, _) => {
                self.set_reg_wide(a.index(), RegTypeId::CONSTANT_LO);
            }
            ConstString(a, _) | ConstStringJumbo(a, _) => {
                let string = self.cache.from_descriptor(JAVA_LANG_STRING);
                self.set_reg(a.index(), string);
            }
            ConstClass(a, idx) => {
                let res_type = self.resolve_class(*idx, true);
                let t = if self.cache.get(res_type).is_conflict() {
                    res_type
                } else {
                    self.cache.from_descriptor(JAVA_LANG_CLASS)
                };
                self.set_reg(a.index(), t);
            }
            ConstMethodHandle(a, _) => {
                let t = self.cache.from_descriptor(METHOD_HANDLE);
                self.set_reg(a.index(), t);
            }
            ConstMethodType(a, _) => {
                let t = self.cache.from_descriptor(METHOD_TYPE);
                self.set_reg(a.index(), t);
            }

            MonitorEnter(a) => self.monitor_enter(a.index()),
            MonitorExit(a) => {
                transfer.no_throw = true;
                let result = self.work_line.pop_monitor(&self.cache, a.index());
                self.check_line(result);
            }

            CheckCast(a, idx) => self.verify_check_cast(a.index(), *idx),
            InstanceOf(a, b, idx) => self.verify_instance_of(a.index(), b.index(), *idx),
            ArrayLength(a, b) => {
                let res_type = self.reg_type(b.index());
                let t = self.cache.get(res_type);
                if t.is_reference_types()
                    && (t.is_zero_or_null() || self.cache.is_array_types(res_type))
                {
                    self.set_reg(a.index(), RegTypeId::INTEGER);
                } else {
                    let msg = format!("array-length on non-array {}", self.type_name(res_type));
                    self.fail_hard(msg);
                }
            }
            NewInstance(a, idx) => self.verify_new_instance(a.index(), *idx),
            NewArray(a, b, idx) => self.verify_new_array(a.index(), b.index(), *idx),
            FilledNewArray(regs, idx) => {
                self.verify_filled_new_array(InvokeArgs::List(regs), *idx);
                transfer.just_set_result = true;
            }
            FilledNewArrayRange(range, idx) => {
                self.verify_filled_new_array(InvokeArgs::Range(*range), *idx);
                transfer.just_set_result = true;
            }
            FillArrayData(a, offset) => self.verify_fill_array_data(a.index(), *offset),
            Throw(a) => self.verify_throw(a.index()),

            PackedSwitch(a, _) | SparseSwitch(a, _) => {
                self.verify_reg(a.index(), RegTypeId::INTEGER);
            }

            CmplFloat(a, b, c) | CmpgFloat(a, b, c) => {
                self.check_op(a, RegTypeId::INTEGER, &[(b, RegTypeId::FLOAT), (c, RegTypeId::FLOAT)], false);
            }
            CmplDouble(a, b, c) | CmpgDouble(a, b, c) => {
                self.check_op(
                    a,
                    RegTypeId::INTEGER,
                    &[(b, RegTypeId::DOUBLE_LO), (c, RegTypeId::DOUBLE_LO)],
                    false,
                );
            }
            CmpLong(a, b, c) => {
                self.check_op(
                    a,
                    RegTypeId::INTEGER,
                    &[(b, RegTypeId::LONG_LO), (c, RegTypeId::LONG_LO)],
                    false,
                );
            }

            IfEq(a, b, _) | IfNe(a, b, _) => {
                let (t1, t2) = (self.reg_type(a.index()), self.reg_type(b.index()));
                let (type1, type2) = (self.cache.get(t1), self.cache.get(t2));
                let mismatch = if type1.is_zero_or_null() {
                    !type2.is_reference_types() && !type2.is_integral_types()
                } else if type1.is_reference_types() {
                    !type2.is_reference_types()
                } else {
                    !type1.is_integral_types() || !type2.is_integral_types()
                };
                if mismatch {
                    let msg = format!(
                        "args to if-eq/if-ne ({},{}) must both be references or integral",
                        self.type_name(t1),
                        self.type_name(t2)
                    );
                    self.fail_hard(msg);
                }
            }
            IfLt(a, b, _) | IfGe(a, b, _) | IfGt(a, b, _) | IfLe(a, b, _) => {
                let (t1, t2) = (self.reg_type(a.index()), self.reg_type(b.index()));
                if !self.cache.get(t1).is_integral_types() || !self.cache.get(t2).is_integral_types()
                {
                    let msg = format!(
                        "args to 'if' ({},{}) must be integral",
                        self.type_name(t1),
                        self.type_name(t2)
                    );
                    self.fail_hard(msg);
                }
            }
            IfEqz(a, _) | IfNez(a, _) => {
                let t = self.reg_type(a.index());
                let reg_type = self.cache.get(t);
                if !reg_type.is_reference_types() && !reg_type.is_integral_types() {
                    let msg = format!(
                        "type {} unexpected as arg to if-eqz/if-nez",
                        self.type_name(t)
                    );
                    self.fail_hard(msg);
                }
                if let Some(line) = self.instance_of_peephole(a.index()) {
                    if matches!(instr, IfEqz(..)) {
                        transfer.fallthrough_line = Some(line);
                    } else {
                        transfer.branch_line = Some(line);
                    }
                }
            }
            IfLtz(a, _) | IfGez(a, _) | IfGtz(a, _) | IfLez(a, _) => {
                let t = self.reg_type(a.index());
                if !self.cache.get(t).is_integral_types() {
                    let msg = format!(
                        "type {} unexpected as arg to if-ltz/if-gez/if-gtz/if-lez",
                        self.type_name(t)
                    );
                    self.fail_hard(msg);
                }
            }

            Aget(a, b, c) => self.verify_aget(MemType::Word, a.index(), b.index(), c.index()),
            AgetWide(a, b, c) => self.verify_aget(MemType::Wide, a.index(), b.index(), c.index()),
            AgetObject(a, b, c) => {
                self.verify_aget(MemType::Object, a.index(), b.index(), c.index());
            }
            AgetBoolean(a, b, c) => {
                self.verify_aget(MemType::Boolean, a.index(), b.index(), c.index());
            }
            AgetByte(a, b, c) => self.verify_aget(MemType::Byte, a.index(), b.index(), c.index()),
            AgetChar(a, b, c) => self.verify_aget(MemType::Char, a.index(), b.index(), c.index()),
            AgetShort(a, b, c) => {
                self.verify_aget(MemType::Short, a.index(), b.index(), c.index());
            }
            Aput(a, b, c) => self.verify_aput(MemType::Word, a.index(), b.index(), c.index()),
            AputWide(a, b, c) => self.verify_aput(MemType::Wide, a.index(), b.index(), c.index()),
            AputObject(a, b, c) => {
                self.verify_aput(MemType::Object, a.index(), b.index(), c.index());
            }
            AputBoolean(a, b, c) => {
                self.verify_aput(MemType::Boolean, a.index(), b.index(), c.index());
            }
            AputByte(a, b, c) => self.verify_aput(MemType::Byte, a.index(), b.index(), c.index()),
            AputChar(a, b, c) => self.verify_aput(MemType::Char, a.index(), b.index(), c.index()),
            AputShort(a, b, c) => {
                self.verify_aput(MemType::Short, a.index(), b.index(), c.index());
            }

            Iget(..) | IgetWide(..) | IgetObject(..) | IgetBoolean(..) | IgetByte(..)
            | IgetChar(..) | IgetShort(..) | Iput(..) | IputWide(..) | IputObject(..)
            | IputBoolean(..) | IputByte(..) | IputChar(..) | IputShort(..) | Sget(..)
            | SgetWide(..) | SgetObject(..) | SgetBoolean(..) | SgetByte(..) | SgetChar(..)
            | SgetShort(..) | Sput(..) | SputWide(..) | SputObject(..) | SputBoolean(..)
            | SputByte(..) | SputChar(..) | SputShort(..) => {
                if let Some(access) = field_access(instr) {
                    self.verify_is_field_access(&access);
                }
            }

            InvokeVirtual(regs, idx) => self.invoke(&mut transfer, InvokeArgs::List(regs), *idx, MethodType::Virtual),
            InvokeSuper(regs, idx) => self.invoke(&mut transfer, InvokeArgs::List(regs), *idx, MethodType::Super),
            InvokeDirect(regs, idx) => self.invoke(&mut transfer, InvokeArgs::List(regs), *idx, MethodType::Direct),
            InvokeStatic(regs, idx) => self.invoke(&mut transfer, InvokeArgs::List(regs), *idx, MethodType::Static),
            InvokeInterface(regs, idx) => {
                self.invoke(&mut transfer, InvokeArgs::List(regs), *idx, MethodType::Interface);
            }
            InvokeVirtualRange(range, idx) => {
                self.invoke(&mut transfer, InvokeArgs::Range(*range), *idx, MethodType::Virtual);
            }
            InvokeSuperRange(range, idx) => {
                self.invoke(&mut transfer, InvokeArgs::Range(*range), *idx, MethodType::Super);
            }
            InvokeDirectRange(range, idx) => {
                self.invoke(&mut transfer, InvokeArgs::Range(*range), *idx, MethodType::Direct);
            }
            InvokeStaticRange(range, idx) => {
                self.invoke(&mut transfer, InvokeArgs::Range(*range), *idx, MethodType::Static);
            }
            InvokeInterfaceRange(range, idx) => {
                self.invoke(&mut transfer, InvokeArgs::Range(*range), *idx, MethodType::Interface);
            }
            InvokePolymorphic(regs, idx, proto) => {
                self.verify_invoke_polymorphic(InvokeArgs::List(regs), *idx, *proto);
                transfer.just_set_result = true;
            }
            InvokePolymorphicRange(range, idx, proto) => {
                self.verify_invoke_polymorphic(InvokeArgs::Range(*range), *idx, *proto);
                transfer.just_set_result = true;
            }
            InvokeCustom(regs, idx) => {
                self.verify_invoke_custom(InvokeArgs::List(regs), *idx);
                transfer.just_set_result = true;
            }
            InvokeCustomRange(range, idx) => {
                self.verify_invoke_custom(InvokeArgs::Range(*range), *idx);
                transfer.just_set_result = true;
            }

            NegInt(a, b) | NotInt(a, b) => self.unary_op(a, b, RegTypeId::INTEGER, RegTypeId::INTEGER),
            NegLong(a, b) | NotLong(a, b) => self.unary_op(a, b, RegTypeId::LONG_LO, RegTypeId::LONG_LO),
            NegFloat(a, b) => self.unary_op(a, b, RegTypeId::FLOAT, RegTypeId::FLOAT),
            NegDouble(a, b) => self.unary_op(a, b, RegTypeId::DOUBLE_LO, RegTypeId::DOUBLE_LO),
            IntToLong(a, b) => self.unary_op(a, b, RegTypeId::LONG_LO, RegTypeId::INTEGER),
            IntToFloat(a, b) => self.unary_op(a, b, RegTypeId::FLOAT, RegTypeId::INTEGER),
            IntToDouble(a, b) => self.unary_op(a, b, RegTypeId::DOUBLE_LO, RegTypeId::INTEGER),
            LongToInt(a, b) => self.unary_op(a, b, RegTypeId::INTEGER, RegTypeId::LONG_LO),
            LongToFloat(a, b) => self.unary_op(a, b, RegTypeId::FLOAT, RegTypeId::LONG_LO),
            LongToDouble(a, b) => self.unary_op(a, b, RegTypeId::DOUBLE_LO, RegTypeId::LONG_LO),
            FloatToInt(a, b) => self.unary_op(a, b, RegTypeId::INTEGER, RegTypeId::FLOAT),
            FloatToLong(a, b) => self.unary_op(a, b, RegTypeId::LONG_LO, RegTypeId::FLOAT),
            FloatToDouble(a, b) => self.unary_op(a, b, RegTypeId::DOUBLE_LO, RegTypeId::FLOAT),
            DoubleToInt(a, b) => self.unary_op(a, b, RegTypeId::INTEGER, RegTypeId::DOUBLE_LO),
            DoubleToLong(a, b) => self.unary_op(a, b, RegTypeId::LONG_LO, RegTypeId::DOUBLE_LO),
            DoubleToFloat(a, b) => self.unary_op(a, b, RegTypeId::FLOAT, RegTypeId::DOUBLE_LO),
            IntToByte(a, b) => self.unary_op(a, b, RegTypeId::BYTE, RegTypeId::INTEGER),
            IntToChar(a, b) => self.unary_op(a, b, RegTypeId::CHAR, RegTypeId::INTEGER),
            IntToShort(a, b) => self.unary_op(a, b, RegTypeId::SHORT, RegTypeId::INTEGER),

            AddInt(a, b, c) | SubInt(a, b, c) | MulInt(a, b, c) | DivInt(a, b, c)
            | RemInt(a, b, c) | ShlInt(a, b, c) | ShrInt(a, b, c) | UshrInt(a, b, c) => {
                self.binary_op(a, b, c, RegTypeId::INTEGER, RegTypeId::INTEGER, false);
            }
            AndInt(a, b, c) | OrInt(a, b, c) | XorInt(a, b, c) => {
                self.binary_op(a, b, c, RegTypeId::INTEGER, RegTypeId::INTEGER, true);
            }
            AddLong(a, b, c) | SubLong(a, b, c) | MulLong(a, b, c) | DivLong(a, b, c)
            | RemLong(a, b, c) | AndLong(a, b, c) | OrLong(a, b, c) | XorLong(a, b, c) => {
                self.binary_op(a, b, c, RegTypeId::LONG_LO, RegTypeId::LONG_LO, false);
            }
            // the shift distance is an int
            ShlLong(a, b, c) | ShrLong(a, b, c) | UshrLong(a, b, c) => {
                self.binary_op(a, b, c, RegTypeId::LONG_LO, RegTypeId::INTEGER, false);
            }
            AddFloat(a, b, c) | SubFloat(a, b, c) | MulFloat(a, b, c) | DivFloat(a, b, c)
            | RemFloat(a, b, c) => {
                self.binary_op(a, b, c, RegTypeId::FLOAT, RegTypeId::FLOAT, false);
            }
            AddDouble(a, b, c) | SubDouble(a, b, c) | MulDouble(a, b, c) | DivDouble(a, b, c)
            | RemDouble(a, b, c) => {
                self.binary_op(a, b, c, RegTypeId::DOUBLE_LO, RegTypeId::DOUBLE_LO, false);
            }

            AddInt2addr(a, b) | SubInt2addr(a, b) | MulInt2addr(a, b) | DivInt2addr(a, b)
            | RemInt2addr(a, b) | ShlInt2addr(a, b) | ShrInt2addr(a, b) | UshrInt2addr(a, b) => {
                self.binary_op(a, a, b, RegTypeId::INTEGER, RegTypeId::INTEGER, false);
            }
            AndInt2addr(a, b) | OrInt2addr(a, b) | XorInt2addr(a, b) => {
                self.binary_op(a, a, b, RegTypeId::INTEGER, RegTypeId::INTEGER, true);
            }
            AddLong2addr(a, b) | SubLong2addr(a, b) | MulLong2addr(a, b) | DivLong2addr(a, b)
            | RemLong2addr(a, b) | AndLong2addr(a, b) | OrLong2addr(a, b) | XorLong2addr(a, b) => {
                self.binary_op(a, a, b, RegTypeId::LONG_LO, RegTypeId::LONG_LO, false);
            }
            ShlLong2addr(a, b) | ShrLong2addr(a, b) | UshrLong2addr(a, b) => {
                self.binary_op(a, a, b, RegTypeId::LONG_LO, RegTypeId::INTEGER, false);
            }
            AddFloat2addr(a, b) | SubFloat2addr(a, b) | MulFloat2addr(a, b)
            | DivFloat2addr(a, b) | RemFloat2addr(a, b) => {
                self.binary_op(a, a, b, RegTypeId::FLOAT, RegTypeId::FLOAT, false);
            }
            AddDouble2addr(a, b) | SubDouble2addr(a, b) | MulDouble2addr(a, b)
            | DivDouble2addr(a, b) | RemDouble2addr(a, b) => {
                self.binary_op(a, a, b, RegTypeId::DOUBLE_LO, RegTypeId::DOUBLE_LO, false);
            }

            AddIntLit16(a, b, _) | RsubInt(a, b, _) | MulIntLit16(a, b, _)
            | DivIntLit16(a, b, _) | RemIntLit16(a, b, _) => self.literal_op(a, b, None),
            AndIntLit16(a, b, lit) | OrIntLit16(a, b, lit) | XorIntLit16(a, b, lit) => {
                self.literal_op(a, b, Some(i32::from(*lit)));
            }
            AddIntLit8(a, b, _) | RsubIntLit8(a, b, _) | MulIntLit8(a, b, _)
            | DivIntLit8(a, b, _) | RemIntLit8(a, b, _) | ShlIntLit8(a, b, _)
            | ShrIntLit8(a, b, _) | UshrIntLit8(a, b, _) => self.literal_op(a, b, None),
            AndIntLit8(a, b, lit) | OrIntLit8(a, b, lit) | XorIntLit8(a, b, lit) => {
                self.literal_op(a, b, Some(i32::from(*lit)));
            }

            Unused(op) => {
                self.fail_hard(format!("Unexpected opcode unused-{op:02x}"));
            }
        }
        transfer
    }

    fn copy1(&mut self, vdst: &Reg, vsrc: &Reg, category: TypeCategory) {
        let result =
            self.work_line
                .copy_register1(&self.cache, vdst.index(), vsrc.index(), category);
        self.check_line(result);
    }

    fn set_const(&mut self, vdst: &Reg, value: i32) {
        self.set_reg_keep(vdst.index(), RegTypeCache::from_cat1_const(value));
    }

    fn invoke(
        &mut self,
        transfer: &mut Transfer,
        args: InvokeArgs,
        idx: Index<dv_dex::methods::MethodIdItem>,
        method_type: MethodType,
    ) {
        self.verify_invoke(args, idx, method_type);
        transfer.just_set_result = true;
    }

    /// Instance constructors must have initialized `this` before returning.
    fn check_constructor_return(&mut self) -> bool {
        if !self.is_instance_constructor() {
            return true;
        }
        let result = self.work_line.check_constructor_return();
        self.check_line(result)
    }

    /// `return`: integral values may be returned for any narrower
    /// integral return type.
    fn verify_return(&mut self, vsrc: u32) {
        let return_type = self.return_type;
        if !self.cache.get(return_type).is_category1_types() {
            let msg = format!(
                "unexpected non-category 1 return type {}",
                self.type_name(return_type)
            );
            self.fail_hard(msg);
            return;
        }
        let src_type = self.reg_type(vsrc);
        let use_src = (return_type == RegTypeId::BOOLEAN && src_type == RegTypeId::BYTE)
            || (matches!(
                return_type,
                RegTypeId::BOOLEAN | RegTypeId::BYTE | RegTypeId::SHORT | RegTypeId::CHAR
            ) && src_type == RegTypeId::INTEGER);
        let expected = if use_src { src_type } else { return_type };
        if !self.verify_reg(vsrc, expected) {
            self.append_to_last(&format!(" return-1nr on invalid register v{vsrc}"));
        }
    }

    fn verify_return_object(&mut self, vsrc: u32) {
        let return_type = self.return_type;
        if !self.cache.get(return_type).is_reference_types() {
            self.fail_hard("return-object not expected");
            return;
        }
        let reg = self.reg_type(vsrc);
        let reg_type = self.cache.get(reg);
        let message = if reg_type.is_undefined() {
            "returning undefined register".to_string()
        } else if reg_type.is_conflict() {
            "returning register with conflict".to_string()
        } else if reg_type.is_uninitialized_types() {
            format!("returning uninitialized object '{}'", self.type_name(reg))
        } else if !reg_type.is_reference_types() {
            format!(
                "return-object returns a non-reference type {}",
                self.type_name(reg)
            )
        } else if !self.cache.is_assignable_from(return_type, reg) {
            let unresolved = reg_type.is_unresolved_types()
                || self.cache.get(return_type).is_unresolved_types();
            if unresolved {
                let msg = format!(
                    " can't resolve returned type '{}' or '{}'",
                    self.type_name(return_type),
                    self.type_name(reg)
                );
                self.fail(VerifyError::UNRESOLVED_TYPE_CHECK, msg);
                return;
            }
            format!(
                "returning '{}', but expected from declaration '{}'",
                self.type_name(reg),
                self.type_name(return_type)
            )
        } else {
            return;
        };
        self.fail_hard(message);
    }

    /// `monitor-enter`, with the lock aliases a preceding `move-object` or
    /// pair of `const-class` creates.
    fn monitor_enter(&mut self, vreg: u32) {
        let pc = self.work_pc;
        let result = self.work_line.push_monitor(&self.cache, vreg, pc);
        self.check_line(result);
        if pc == 0 || self.insn_flags.get(pc).is_branch_target() {
            return;
        }
        let Some(prev_pc) = self.previous_insn(pc) else {
            return;
        };
        let copy = match self.insn_at(prev_pc) {
            Some(Instr::ConstClass(prev_dst, prev_idx)) => {
                let (prev_dst, prev_idx) = (prev_dst.index(), *prev_idx);
                if prev_pc == 0 || self.insn_flags.get(prev_pc).is_branch_target() {
                    return;
                }
                match self.previous_insn(prev_pc).and_then(|p| self.insn_at(p)) {
                    Some(Instr::ConstClass(prev2_dst, prev2_idx)) if *prev2_idx == prev_idx => {
                        let prev2_dst = prev2_dst.index();
                        if prev_dst == vreg {
                            Some((prev2_dst, vreg))
                        } else if prev2_dst == vreg {
                            Some((prev_dst, vreg))
                        } else {
                            None
                        }
                    }
                    _ => None,
                }
            }
            Some(prev) => object_move(prev).filter(|(_, src)| *src == vreg),
            None => None,
        };
        if let Some((vdst, vsrc)) = copy {
            // same types, only the lock status of the alias changes
            let result =
                self.work_line
                    .copy_register1(&self.cache, vdst, vsrc, TypeCategory::Reference);
            self.check_line(result);
        }
    }

    fn verify_check_cast(&mut self, vreg: u32, idx: Index<TypeIdItem>) {
        let res_type = self.resolve_class(idx, true);
        if self.cache.get(res_type).is_conflict() {
            return;
        }
        if self.check_cast_operand(vreg, res_type, "check-cast") {
            self.set_reg_keep(vreg, res_type);
        }
    }

    fn verify_instance_of(&mut self, vdst: u32, vsrc: u32, idx: Index<TypeIdItem>) {
        let res_type = self.resolve_class(idx, true);
        // the result stays a boolean when the class is broken
        if self.cache.get(res_type).is_conflict()
            || self.check_cast_operand(vsrc, res_type, "instance-of")
        {
            self.set_reg(vdst, RegTypeId::BOOLEAN);
        }
    }

    /// Common checks of `check-cast` and `instance-of`.
    fn check_cast_operand(&mut self, vreg: u32, res_type: RegTypeId, what: &str) -> bool {
        let orig = self.reg_type(vreg);
        let orig_type = self.cache.get(orig);
        let message = if !self.cache.get(res_type).is_non_zero_reference_types() {
            format!("{what} on unexpected class {}", self.type_name(res_type))
        } else if !orig_type.is_reference_types() {
            format!("{what} on non-reference in v{vreg}")
        } else if orig_type.is_uninitialized_types() {
            format!("{what} on uninitialized reference in v{vreg}")
        } else {
            return true;
        };
        self.fail_hard(message);
        false
    }

    fn verify_new_instance(&mut self, vdst: u32, idx: Index<TypeIdItem>) {
        let res_type = self.resolve_class(idx, true);
        if self.cache.get(res_type).is_conflict() {
            return;
        }
        if !self.cache.is_instantiable(res_type) {
            let msg = format!(
                "new-instance on primitive, interface or abstract class{}",
                self.type_name(res_type)
            );
            // soft, the register is still set
            self.fail(VerifyError::INSTANTIATION, msg);
        }
        let uninit_type = self.cache.uninitialized(res_type, self.work_pc);
        // a previous allocation at this pc cannot be initialized anymore
        self.work_line.mark_uninit_refs_as_invalid(uninit_type);
        self.set_reg(vdst, uninit_type);
    }

    fn verify_throw(&mut self, vsrc: u32) {
        let res = self.reg_type(vsrc);
        let throwable = self.cache.from_descriptor(JAVA_LANG_THROWABLE);
        if self.cache.is_assignable_from(throwable, res) {
            return;
        }
        let res_type = self.cache.get(res);
        if res_type.is_uninitialized_types() {
            self.fail_hard("thrown exception not initialized");
        } else if !res_type.is_reference_types() {
            let msg = format!("thrown value of non-reference type {}", self.type_name(res));
            self.fail_hard(msg);
        } else {
            let kind = if res_type.is_unresolved_types() {
                VerifyError::UNRESOLVED_TYPE_CHECK
            } else {
                VerifyError::BAD_CLASS_HARD
            };
            let msg = format!("thrown class {} not instanceof Throwable", self.type_name(res));
            self.fail(kind, msg);
        }
    }

    /// After `instance-of vX, vY, T; if-eqz/if-nez vX`, vY is known to be a
    /// `T` on one of the two paths. Returns the line of that path when the
    /// cast sharpens the type of vY.
    fn instance_of_peephole(&mut self, vtest: u32) -> Option<RegisterLine> {
        let pc = self.work_pc;
        if pc == 0 || self.insn_flags.get(pc).is_branch_target() {
            return None;
        }
        let instance_of_pc = self.previous_insn(pc)?;
        let (vdst, vobj, idx) = match self.insn_at(instance_of_pc) {
            Some(Instr::InstanceOf(a, b, idx)) => (a.index(), b.index(), *idx),
            _ => return None,
        };
        if vdst != vtest || vdst == vobj {
            return None;
        }
        // no access check, a runtime throw belongs to the instance-of
        let orig = self.reg_type(vobj);
        let cast = self.resolve_class(idx, false);
        if orig == cast {
            return None;
        }
        let sharpens = {
            let (orig_type, cast_type) = (self.cache.get(orig), self.cache.get(cast));
            !cast_type.is_unresolved_types()
                && !orig_type.is_unresolved_types()
                && cast_type.has_class()
                && !orig_type.is_zero_or_null()
        };
        if !sharpens || self.cache.is_interface(cast) {
            return None;
        }
        let merged = self.cache.merge(cast, orig);
        if !self.cache.is_strictly_assignable_from(orig, merged) {
            return None;
        }

        let mut update_line = self.work_line.clone();
        // type changes keep the locks
        let result = update_line.set_register_type(&self.cache, vobj, cast, LockOp::Keep);
        if !self.check_line(result) {
            return None;
        }
        if instance_of_pc != 0 && !self.insn_flags.get(instance_of_pc).is_branch_target() {
            // propagate to the source of a move-object feeding the instance-of
            let moved = self
                .previous_insn(instance_of_pc)
                .and_then(|p| self.insn_at(p))
                .and_then(object_move);
            if let Some((move_dst, move_src)) = moved {
                if move_dst == vobj && move_src != vdst {
                    let result =
                        update_line.set_register_type(&self.cache, move_src, cast, LockOp::Keep);
                    if !self.check_line(result) {
                        return None;
                    }
                }
            }
        }
        Some(update_line)
    }

    fn unary_op(&mut self, vdst: &Reg, vsrc: &Reg, dst: RegTypeId, src: RegTypeId) {
        if self.verify_reg(vsrc.index(), src) {
            self.set_reg_any(vdst.index(), dst);
        }
    }

    /// Checks both operands of a binary operation and sets its result. For
    /// `and`, `or` and `xor` on two booleans the result stays a boolean.
    fn binary_op(
        &mut self,
        vdst: &Reg,
        vsrc1: &Reg,
        vsrc2: &Reg,
        dst: RegTypeId,
        src2: RegTypeId,
        boolean_op: bool,
    ) {
        // first operand of the same type as the result
        self.check_op(vdst, dst, &[(vsrc1, dst), (vsrc2, src2)], boolean_op);
    }

    fn check_op(&mut self, vdst: &Reg, dst: RegTypeId, srcs: &[(&Reg, RegTypeId)], boolean_op: bool) {
        for (vsrc, expected) in srcs {
            if !self.verify_reg(vsrc.index(), *expected) {
                return;
            }
        }
        let booleans = boolean_op
            && srcs
                .iter()
                .all(|(vsrc, _)| self.cache.get(self.reg_type(vsrc.index())).is_boolean_types());
        self.set_reg_any(vdst.index(), if booleans { RegTypeId::BOOLEAN } else { dst });
    }

    /// `*-int/lit16` and `*-int/lit8`. `literal` is set for the boolean
    /// operations only.
    fn literal_op(&mut self, vdst: &Reg, vsrc: &Reg, literal: Option<i32>) {
        if !self.verify_reg(vsrc.index(), RegTypeId::INTEGER) {
            return;
        }
        let booleans = matches!(literal, Some(0 | 1))
            && self.cache.get(self.reg_type(vsrc.index())).is_boolean_types();
        let t = if booleans {
            RegTypeId::BOOLEAN
        } else {
            RegTypeId::INTEGER
        };
        self.set_reg(vdst.index(), t);
    }
}
