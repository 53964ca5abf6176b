//! Dalvik bytecode instructions definitions.
//!
//! Each opcode is one variant of [`Instr`]. Its static facts (mnemonic, format,
//! size, control-flow flags) and its operand codec are derived from the
//! `#[instruction(...)]` attributes. Throwing opcodes follow the runtime: any
//! instruction that may raise an exception before completing is `can_throw`,
//! including `monitor-exit`, while floating point divisions are not.

use crate::code::{CallSiteIdItem, MethodHandleItem};
use crate::errors::{DexError, DexResult};
use crate::fields::FieldIdItem;
use crate::methods::MethodIdItem;
use crate::registers::{Reg, RegList, RegRange};
use crate::strings::StringIdItem;
use crate::types::{pretty_descriptor, ProtoIdItem, TypeIdItem};
use crate::{Dex, DexIndex, Index, PrettyPrint, PrettyPrinter};
use instruction_derive::Instruction;
use nom::bytes::complete::take;
use nom::multi::count;
use nom::number::complete::{le_i32, le_u16, le_u32, le_u8};
use nom::IResult;
use std::fmt;

/// Static facts of an instruction.
pub trait Instruction {
    fn opcode(&self) -> u8;
    fn mnemonic(&self) -> &str;
    /// Format identifier, `custom` for payloads and unused opcodes.
    fn format(&self) -> &str;
    /// Size in 16-bit code units.
    fn size(&self) -> usize;
    fn can_throw(&self) -> bool;
    fn can_branch(&self) -> bool;
    fn can_switch(&self) -> bool;
    /// Whether control may fall through to the next instruction.
    fn can_continue(&self) -> bool;
    fn is_return(&self) -> bool;
    fn is_invoke(&self) -> bool;
}

/// A decoded operand, used for listings.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg(Reg),
    RegList(RegList),
    RegRange(RegRange),
    Literal(i64),
    /// Relative offset in code units.
    Offset(i32),
    String(Index<StringIdItem>),
    Type(Index<TypeIdItem>),
    Field(Index<FieldIdItem>),
    Method(Index<MethodIdItem>),
    Proto(Index<ProtoIdItem>),
    CallSite(Index<CallSiteIdItem>),
    MethodHandle(Index<MethodHandleItem>),
}

pub trait IntoOperand {
    fn to_operand(&self) -> Operand;
}

macro_rules! into_operand {
    ($t:ty, $v:ident, $conv:expr) => {
        impl IntoOperand for $t {
            fn to_operand(&self) -> Operand {
                let $v = self;
                $conv
            }
        }
    };
}

into_operand!(Reg, r, Operand::Reg(*r));
into_operand!(RegList, l, Operand::RegList(l.clone()));
into_operand!(RegRange, r, Operand::RegRange(*r));
into_operand!(i8, v, Operand::Literal(i64::from(*v)));
into_operand!(i16, v, Operand::Literal(i64::from(*v)));
into_operand!(i32, v, Operand::Literal(i64::from(*v)));
into_operand!(i64, v, Operand::Literal(*v));
into_operand!(Index<StringIdItem>, i, Operand::String(*i));
into_operand!(Index<TypeIdItem>, i, Operand::Type(*i));
into_operand!(Index<FieldIdItem>, i, Operand::Field(*i));
into_operand!(Index<MethodIdItem>, i, Operand::Method(*i));
into_operand!(Index<ProtoIdItem>, i, Operand::Proto(*i));
into_operand!(Index<CallSiteIdItem>, i, Operand::CallSite(*i));
into_operand!(Index<MethodHandleItem>, i, Operand::MethodHandle(*i));

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Reg(r) => write!(f, "{r}"),
            Self::RegList(l) => write!(f, "{l}"),
            Self::RegRange(r) => write!(f, "{r}"),
            Self::Literal(v) => write!(f, "#{v:+}"),
            Self::Offset(o) => write!(f, "{o:+}"),
            Self::String(i) => write!(f, "string@{i}"),
            Self::Type(i) => write!(f, "type@{i}"),
            Self::Field(i) => write!(f, "field@{i}"),
            Self::Method(i) => write!(f, "method@{i}"),
            Self::Proto(i) => write!(f, "proto@{i}"),
            Self::CallSite(i) => write!(f, "call_site@{i}"),
            Self::MethodHandle(i) => write!(f, "method_handle@{i}"),
        }
    }
}

impl PrettyPrint for Operand {
    fn pp(&self, f: &mut fmt::Formatter, dex: &Dex) -> DexResult<()> {
        match self {
            Self::String(i) => write!(f, "{:?}", dex.string(*i)?)?,
            Self::Type(i) => write!(f, "{}", pretty_descriptor(dex.type_descriptor(*i)?))?,
            Self::Field(i) => i.get(dex)?.pp(f, dex)?,
            Self::Method(i) => i.get(dex)?.pp(f, dex)?,
            Self::Proto(i) => i.get(dex)?.pp(f, dex)?,
            Self::CallSite(i) => i.get(dex)?.pp(f, dex)?,
            Self::MethodHandle(i) => i.get(dex)?.pp(f, dex)?,
            _ => write!(f, "{self}")?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Instruction)]
pub enum Instr {
    /// Waste cycles. Payload pseudo-instructions share its opcode.
    #[instruction(opcode_expr = "0x00", mnemonic = "nop", format = "custom", size = "1")]
    Nop,

    /// Move the contents of one non-object register to another.
    #[instruction(opcode = 0x01, mnemonic = "move", format = "12x")]
    Move(Reg, Reg),
    #[instruction(opcode = 0x02, mnemonic = "move/from16", format = "22x")]
    MoveFrom16(Reg, Reg),
    #[instruction(opcode = 0x03, mnemonic = "move/16", format = "32x")]
    Move16(Reg, Reg),
    /// Move the contents of one register-pair to another.
    #[instruction(opcode = 0x04, mnemonic = "move-wide", format = "12x")]
    MoveWide(Reg, Reg),
    #[instruction(opcode = 0x05, mnemonic = "move-wide/from16", format = "22x")]
    MoveWideFrom16(Reg, Reg),
    #[instruction(opcode = 0x06, mnemonic = "move-wide/16", format = "32x")]
    MoveWide16(Reg, Reg),
    /// Move the contents of one object-bearing register to another.
    #[instruction(opcode = 0x07, mnemonic = "move-object", format = "12x")]
    MoveObject(Reg, Reg),
    #[instruction(opcode = 0x08, mnemonic = "move-object/from16", format = "22x")]
    MoveObjectFrom16(Reg, Reg),
    #[instruction(opcode = 0x09, mnemonic = "move-object/16", format = "32x")]
    MoveObject16(Reg, Reg),

    /// Move the result of the immediately preceding invoke-kind (or filled-new-array)
    /// into the indicated register.
    #[instruction(opcode = 0x0a, mnemonic = "move-result", format = "11x")]
    MoveResult(Reg),
    #[instruction(opcode = 0x0b, mnemonic = "move-result-wide", format = "11x")]
    MoveResultWide(Reg),
    #[instruction(opcode = 0x0c, mnemonic = "move-result-object", format = "11x")]
    MoveResultObject(Reg),
    /// Save a just-caught exception, only valid as the first instruction of a handler.
    #[instruction(opcode = 0x0d, mnemonic = "move-exception", format = "11x")]
    MoveException(Reg),

    #[instruction(opcode = 0x0e, mnemonic = "return-void", format = "10x", is_return, no_continue)]
    ReturnVoid,
    #[instruction(opcode = 0x0f, mnemonic = "return", format = "11x", is_return, no_continue)]
    Return(Reg),
    #[instruction(opcode = 0x10, mnemonic = "return-wide", format = "11x", is_return, no_continue)]
    ReturnWide(Reg),
    #[instruction(opcode = 0x11, mnemonic = "return-object", format = "11x", is_return, no_continue)]
    ReturnObject(Reg),

    /// Literal loads. `high16` variants hold the upper bits of the value.
    #[instruction(opcode = 0x12, mnemonic = "const/4", format = "11n")]
    Const4(Reg, i8),
    #[instruction(opcode = 0x13, mnemonic = "const/16", format = "21s")]
    Const16(Reg, i16),
    #[instruction(opcode = 0x14, mnemonic = "const", format = "31i")]
    Const(Reg, i32),
    #[instruction(opcode = 0x15, mnemonic = "const/high16", format = "21h")]
    ConstHigh16(Reg, i16),
    #[instruction(opcode = 0x16, mnemonic = "const-wide/16", format = "21s")]
    ConstWide16(Reg, i16),
    #[instruction(opcode = 0x17, mnemonic = "const-wide/32", format = "31i")]
    ConstWide32(Reg, i32),
    #[instruction(opcode = 0x18, mnemonic = "const-wide", format = "51l")]
    ConstWide(Reg, i64),
    #[instruction(opcode = 0x19, mnemonic = "const-wide/high16", format = "21h")]
    ConstWideHigh16(Reg, i16),
    #[instruction(opcode = 0x1a, mnemonic = "const-string", format = "21c", can_throw)]
    ConstString(Reg, Index<StringIdItem>),
    #[instruction(opcode = 0x1b, mnemonic = "const-string/jumbo", format = "31c", can_throw)]
    ConstStringJumbo(Reg, Index<StringIdItem>),
    #[instruction(opcode = 0x1c, mnemonic = "const-class", format = "21c", can_throw)]
    ConstClass(Reg, Index<TypeIdItem>),

    #[instruction(opcode = 0x1d, mnemonic = "monitor-enter", format = "11x", can_throw)]
    MonitorEnter(Reg),
    #[instruction(opcode = 0x1e, mnemonic = "monitor-exit", format = "11x", can_throw)]
    MonitorExit(Reg),
    #[instruction(opcode = 0x1f, mnemonic = "check-cast", format = "21c", can_throw)]
    CheckCast(Reg, Index<TypeIdItem>),
    #[instruction(opcode = 0x20, mnemonic = "instance-of", format = "22c", can_throw)]
    InstanceOf(Reg, Reg, Index<TypeIdItem>),
    #[instruction(opcode = 0x21, mnemonic = "array-length", format = "12x", can_throw)]
    ArrayLength(Reg, Reg),
    #[instruction(opcode = 0x22, mnemonic = "new-instance", format = "21c", can_throw)]
    NewInstance(Reg, Index<TypeIdItem>),
    #[instruction(opcode = 0x23, mnemonic = "new-array", format = "22c", can_throw)]
    NewArray(Reg, Reg, Index<TypeIdItem>),
    /// The array is left in the result register for a following `move-result-object`.
    #[instruction(opcode = 0x24, mnemonic = "filled-new-array", format = "35c", can_throw)]
    FilledNewArray(RegList, Index<TypeIdItem>),
    #[instruction(opcode = 0x25, mnemonic = "filled-new-array/range", format = "3rc", can_throw)]
    FilledNewArrayRange(RegRange, Index<TypeIdItem>),
    #[instruction(opcode = 0x26, mnemonic = "fill-array-data", format = "31t", can_throw)]
    FillArrayData(Reg, i32),
    #[instruction(opcode = 0x27, mnemonic = "throw", format = "11x", can_throw, no_continue)]
    Throw(Reg),

    #[instruction(opcode = 0x28, mnemonic = "goto", format = "10t", can_branch, no_continue)]
    Goto(i8),
    #[instruction(opcode = 0x29, mnemonic = "goto/16", format = "20t", can_branch, no_continue)]
    Goto16(i16),
    #[instruction(opcode = 0x2a, mnemonic = "goto/32", format = "30t", can_branch, no_continue)]
    Goto32(i32),
    /// Offsets of switches point to their payload.
    #[instruction(opcode = 0x2b, mnemonic = "packed-switch", format = "31t", can_switch)]
    PackedSwitch(Reg, i32),
    #[instruction(opcode = 0x2c, mnemonic = "sparse-switch", format = "31t", can_switch)]
    SparseSwitch(Reg, i32),

    #[instruction(opcode = 0x2d, mnemonic = "cmpl-float", format = "23x")]
    CmplFloat(Reg, Reg, Reg),
    #[instruction(opcode = 0x2e, mnemonic = "cmpg-float", format = "23x")]
    CmpgFloat(Reg, Reg, Reg),
    #[instruction(opcode = 0x2f, mnemonic = "cmpl-double", format = "23x")]
    CmplDouble(Reg, Reg, Reg),
    #[instruction(opcode = 0x30, mnemonic = "cmpg-double", format = "23x")]
    CmpgDouble(Reg, Reg, Reg),
    #[instruction(opcode = 0x31, mnemonic = "cmp-long", format = "23x")]
    CmpLong(Reg, Reg, Reg),

    #[instruction(opcode = 0x32, mnemonic = "if-eq", format = "22t", can_branch)]
    IfEq(Reg, Reg, i16),
    #[instruction(opcode = 0x33, mnemonic = "if-ne", format = "22t", can_branch)]
    IfNe(Reg, Reg, i16),
    #[instruction(opcode = 0x34, mnemonic = "if-lt", format = "22t", can_branch)]
    IfLt(Reg, Reg, i16),
    #[instruction(opcode = 0x35, mnemonic = "if-ge", format = "22t", can_branch)]
    IfGe(Reg, Reg, i16),
    #[instruction(opcode = 0x36, mnemonic = "if-gt", format = "22t", can_branch)]
    IfGt(Reg, Reg, i16),
    #[instruction(opcode = 0x37, mnemonic = "if-le", format = "22t", can_branch)]
    IfLe(Reg, Reg, i16),
    #[instruction(opcode = 0x38, mnemonic = "if-eqz", format = "21t", can_branch)]
    IfEqz(Reg, i16),
    #[instruction(opcode = 0x39, mnemonic = "if-nez", format = "21t", can_branch)]
    IfNez(Reg, i16),
    #[instruction(opcode = 0x3a, mnemonic = "if-ltz", format = "21t", can_branch)]
    IfLtz(Reg, i16),
    #[instruction(opcode = 0x3b, mnemonic = "if-gez", format = "21t", can_branch)]
    IfGez(Reg, i16),
    #[instruction(opcode = 0x3c, mnemonic = "if-gtz", format = "21t", can_branch)]
    IfGtz(Reg, i16),
    #[instruction(opcode = 0x3d, mnemonic = "if-lez", format = "21t", can_branch)]
    IfLez(Reg, i16),

    #[instruction(opcode = 0x44, mnemonic = "aget", format = "23x", can_throw)]
    Aget(Reg, Reg, Reg),
    #[instruction(opcode = 0x45, mnemonic = "aget-wide", format = "23x", can_throw)]
    AgetWide(Reg, Reg, Reg),
    #[instruction(opcode = 0x46, mnemonic = "aget-object", format = "23x", can_throw)]
    AgetObject(Reg, Reg, Reg),
    #[instruction(opcode = 0x47, mnemonic = "aget-boolean", format = "23x", can_throw)]
    AgetBoolean(Reg, Reg, Reg),
    #[instruction(opcode = 0x48, mnemonic = "aget-byte", format = "23x", can_throw)]
    AgetByte(Reg, Reg, Reg),
    #[instruction(opcode = 0x49, mnemonic = "aget-char", format = "23x", can_throw)]
    AgetChar(Reg, Reg, Reg),
    #[instruction(opcode = 0x4a, mnemonic = "aget-short", format = "23x", can_throw)]
    AgetShort(Reg, Reg, Reg),
    #[instruction(opcode = 0x4b, mnemonic = "aput", format = "23x", can_throw)]
    Aput(Reg, Reg, Reg),
    #[instruction(opcode = 0x4c, mnemonic = "aput-wide", format = "23x", can_throw)]
    AputWide(Reg, Reg, Reg),
    #[instruction(opcode = 0x4d, mnemonic = "aput-object", format = "23x", can_throw)]
    AputObject(Reg, Reg, Reg),
    #[instruction(opcode = 0x4e, mnemonic = "aput-boolean", format = "23x", can_throw)]
    AputBoolean(Reg, Reg, Reg),
    #[instruction(opcode = 0x4f, mnemonic = "aput-byte", format = "23x", can_throw)]
    AputByte(Reg, Reg, Reg),
    #[instruction(opcode = 0x50, mnemonic = "aput-char", format = "23x", can_throw)]
    AputChar(Reg, Reg, Reg),
    #[instruction(opcode = 0x51, mnemonic = "aput-short", format = "23x", can_throw)]
    AputShort(Reg, Reg, Reg),
    #[instruction(opcode = 0x52, mnemonic = "iget", format = "22c", can_throw)]
    Iget(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x53, mnemonic = "iget-wide", format = "22c", can_throw)]
    IgetWide(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x54, mnemonic = "iget-object", format = "22c", can_throw)]
    IgetObject(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x55, mnemonic = "iget-boolean", format = "22c", can_throw)]
    IgetBoolean(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x56, mnemonic = "iget-byte", format = "22c", can_throw)]
    IgetByte(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x57, mnemonic = "iget-char", format = "22c", can_throw)]
    IgetChar(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x58, mnemonic = "iget-short", format = "22c", can_throw)]
    IgetShort(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x59, mnemonic = "iput", format = "22c", can_throw)]
    Iput(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x5a, mnemonic = "iput-wide", format = "22c", can_throw)]
    IputWide(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x5b, mnemonic = "iput-object", format = "22c", can_throw)]
    IputObject(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x5c, mnemonic = "iput-boolean", format = "22c", can_throw)]
    IputBoolean(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x5d, mnemonic = "iput-byte", format = "22c", can_throw)]
    IputByte(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x5e, mnemonic = "iput-char", format = "22c", can_throw)]
    IputChar(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x5f, mnemonic = "iput-short", format = "22c", can_throw)]
    IputShort(Reg, Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x60, mnemonic = "sget", format = "21c", can_throw)]
    Sget(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x61, mnemonic = "sget-wide", format = "21c", can_throw)]
    SgetWide(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x62, mnemonic = "sget-object", format = "21c", can_throw)]
    SgetObject(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x63, mnemonic = "sget-boolean", format = "21c", can_throw)]
    SgetBoolean(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x64, mnemonic = "sget-byte", format = "21c", can_throw)]
    SgetByte(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x65, mnemonic = "sget-char", format = "21c", can_throw)]
    SgetChar(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x66, mnemonic = "sget-short", format = "21c", can_throw)]
    SgetShort(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x67, mnemonic = "sput", format = "21c", can_throw)]
    Sput(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x68, mnemonic = "sput-wide", format = "21c", can_throw)]
    SputWide(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x69, mnemonic = "sput-object", format = "21c", can_throw)]
    SputObject(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x6a, mnemonic = "sput-boolean", format = "21c", can_throw)]
    SputBoolean(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x6b, mnemonic = "sput-byte", format = "21c", can_throw)]
    SputByte(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x6c, mnemonic = "sput-char", format = "21c", can_throw)]
    SputChar(Reg, Index<FieldIdItem>),
    #[instruction(opcode = 0x6d, mnemonic = "sput-short", format = "21c", can_throw)]
    SputShort(Reg, Index<FieldIdItem>),

    #[instruction(opcode = 0x6e, mnemonic = "invoke-virtual", format = "35c", can_throw, is_invoke)]
    InvokeVirtual(RegList, Index<MethodIdItem>),
    #[instruction(opcode = 0x6f, mnemonic = "invoke-super", format = "35c", can_throw, is_invoke)]
    InvokeSuper(RegList, Index<MethodIdItem>),
    #[instruction(opcode = 0x70, mnemonic = "invoke-direct", format = "35c", can_throw, is_invoke)]
    InvokeDirect(RegList, Index<MethodIdItem>),
    #[instruction(opcode = 0x71, mnemonic = "invoke-static", format = "35c", can_throw, is_invoke)]
    InvokeStatic(RegList, Index<MethodIdItem>),
    #[instruction(opcode = 0x72, mnemonic = "invoke-interface", format = "35c", can_throw, is_invoke)]
    InvokeInterface(RegList, Index<MethodIdItem>),
    #[instruction(opcode = 0x74, mnemonic = "invoke-virtual/range", format = "3rc", can_throw, is_invoke)]
    InvokeVirtualRange(RegRange, Index<MethodIdItem>),
    #[instruction(opcode = 0x75, mnemonic = "invoke-super/range", format = "3rc", can_throw, is_invoke)]
    InvokeSuperRange(RegRange, Index<MethodIdItem>),
    #[instruction(opcode = 0x76, mnemonic = "invoke-direct/range", format = "3rc", can_throw, is_invoke)]
    InvokeDirectRange(RegRange, Index<MethodIdItem>),
    #[instruction(opcode = 0x77, mnemonic = "invoke-static/range", format = "3rc", can_throw, is_invoke)]
    InvokeStaticRange(RegRange, Index<MethodIdItem>),
    #[instruction(opcode = 0x78, mnemonic = "invoke-interface/range", format = "3rc", can_throw, is_invoke)]
    InvokeInterfaceRange(RegRange, Index<MethodIdItem>),

    #[instruction(opcode = 0x7b, mnemonic = "neg-int", format = "12x")]
    NegInt(Reg, Reg),
    #[instruction(opcode = 0x7c, mnemonic = "not-int", format = "12x")]
    NotInt(Reg, Reg),
    #[instruction(opcode = 0x7d, mnemonic = "neg-long", format = "12x")]
    NegLong(Reg, Reg),
    #[instruction(opcode = 0x7e, mnemonic = "not-long", format = "12x")]
    NotLong(Reg, Reg),
    #[instruction(opcode = 0x7f, mnemonic = "neg-float", format = "12x")]
    NegFloat(Reg, Reg),
    #[instruction(opcode = 0x80, mnemonic = "neg-double", format = "12x")]
    NegDouble(Reg, Reg),
    #[instruction(opcode = 0x81, mnemonic = "int-to-long", format = "12x")]
    IntToLong(Reg, Reg),
    #[instruction(opcode = 0x82, mnemonic = "int-to-float", format = "12x")]
    IntToFloat(Reg, Reg),
    #[instruction(opcode = 0x83, mnemonic = "int-to-double", format = "12x")]
    IntToDouble(Reg, Reg),
    #[instruction(opcode = 0x84, mnemonic = "long-to-int", format = "12x")]
    LongToInt(Reg, Reg),
    #[instruction(opcode = 0x85, mnemonic = "long-to-float", format = "12x")]
    LongToFloat(Reg, Reg),
    #[instruction(opcode = 0x86, mnemonic = "long-to-double", format = "12x")]
    LongToDouble(Reg, Reg),
    #[instruction(opcode = 0x87, mnemonic = "float-to-int", format = "12x")]
    FloatToInt(Reg, Reg),
    #[instruction(opcode = 0x88, mnemonic = "float-to-long", format = "12x")]
    FloatToLong(Reg, Reg),
    #[instruction(opcode = 0x89, mnemonic = "float-to-double", format = "12x")]
    FloatToDouble(Reg, Reg),
    #[instruction(opcode = 0x8a, mnemonic = "double-to-int", format = "12x")]
    DoubleToInt(Reg, Reg),
    #[instruction(opcode = 0x8b, mnemonic = "double-to-long", format = "12x")]
    DoubleToLong(Reg, Reg),
    #[instruction(opcode = 0x8c, mnemonic = "double-to-float", format = "12x")]
    DoubleToFloat(Reg, Reg),
    #[instruction(opcode = 0x8d, mnemonic = "int-to-byte", format = "12x")]
    IntToByte(Reg, Reg),
    #[instruction(opcode = 0x8e, mnemonic = "int-to-char", format = "12x")]
    IntToChar(Reg, Reg),
    #[instruction(opcode = 0x8f, mnemonic = "int-to-short", format = "12x")]
    IntToShort(Reg, Reg),

    #[instruction(opcode = 0x90, mnemonic = "add-int", format = "23x")]
    AddInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x91, mnemonic = "sub-int", format = "23x")]
    SubInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x92, mnemonic = "mul-int", format = "23x")]
    MulInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x93, mnemonic = "div-int", format = "23x", can_throw)]
    DivInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x94, mnemonic = "rem-int", format = "23x", can_throw)]
    RemInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x95, mnemonic = "and-int", format = "23x")]
    AndInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x96, mnemonic = "or-int", format = "23x")]
    OrInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x97, mnemonic = "xor-int", format = "23x")]
    XorInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x98, mnemonic = "shl-int", format = "23x")]
    ShlInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x99, mnemonic = "shr-int", format = "23x")]
    ShrInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x9a, mnemonic = "ushr-int", format = "23x")]
    UshrInt(Reg, Reg, Reg),
    #[instruction(opcode = 0x9b, mnemonic = "add-long", format = "23x")]
    AddLong(Reg, Reg, Reg),
    #[instruction(opcode = 0x9c, mnemonic = "sub-long", format = "23x")]
    SubLong(Reg, Reg, Reg),
    #[instruction(opcode = 0x9d, mnemonic = "mul-long", format = "23x")]
    MulLong(Reg, Reg, Reg),
    #[instruction(opcode = 0x9e, mnemonic = "div-long", format = "23x", can_throw)]
    DivLong(Reg, Reg, Reg),
    #[instruction(opcode = 0x9f, mnemonic = "rem-long", format = "23x", can_throw)]
    RemLong(Reg, Reg, Reg),
    #[instruction(opcode = 0xa0, mnemonic = "and-long", format = "23x")]
    AndLong(Reg, Reg, Reg),
    #[instruction(opcode = 0xa1, mnemonic = "or-long", format = "23x")]
    OrLong(Reg, Reg, Reg),
    #[instruction(opcode = 0xa2, mnemonic = "xor-long", format = "23x")]
    XorLong(Reg, Reg, Reg),
    #[instruction(opcode = 0xa3, mnemonic = "shl-long", format = "23x")]
    ShlLong(Reg, Reg, Reg),
    #[instruction(opcode = 0xa4, mnemonic = "shr-long", format = "23x")]
    ShrLong(Reg, Reg, Reg),
    #[instruction(opcode = 0xa5, mnemonic = "ushr-long", format = "23x")]
    UshrLong(Reg, Reg, Reg),
    #[instruction(opcode = 0xa6, mnemonic = "add-float", format = "23x")]
    AddFloat(Reg, Reg, Reg),
    #[instruction(opcode = 0xa7, mnemonic = "sub-float", format = "23x")]
    SubFloat(Reg, Reg, Reg),
    #[instruction(opcode = 0xa8, mnemonic = "mul-float", format = "23x")]
    MulFloat(Reg, Reg, Reg),
    #[instruction(opcode = 0xa9, mnemonic = "div-float", format = "23x")]
    DivFloat(Reg, Reg, Reg),
    #[instruction(opcode = 0xaa, mnemonic = "rem-float", format = "23x")]
    RemFloat(Reg, Reg, Reg),
    #[instruction(opcode = 0xab, mnemonic = "add-double", format = "23x")]
    AddDouble(Reg, Reg, Reg),
    #[instruction(opcode = 0xac, mnemonic = "sub-double", format = "23x")]
    SubDouble(Reg, Reg, Reg),
    #[instruction(opcode = 0xad, mnemonic = "mul-double", format = "23x")]
    MulDouble(Reg, Reg, Reg),
    #[instruction(opcode = 0xae, mnemonic = "div-double", format = "23x")]
    DivDouble(Reg, Reg, Reg),
    #[instruction(opcode = 0xaf, mnemonic = "rem-double", format = "23x")]
    RemDouble(Reg, Reg, Reg),
    #[instruction(opcode = 0xb0, mnemonic = "add-int/2addr", format = "12x")]
    AddInt2addr(Reg, Reg),
    #[instruction(opcode = 0xb1, mnemonic = "sub-int/2addr", format = "12x")]
    SubInt2addr(Reg, Reg),
    #[instruction(opcode = 0xb2, mnemonic = "mul-int/2addr", format = "12x")]
    MulInt2addr(Reg, Reg),
    #[instruction(opcode = 0xb3, mnemonic = "div-int/2addr", format = "12x", can_throw)]
    DivInt2addr(Reg, Reg),
    #[instruction(opcode = 0xb4, mnemonic = "rem-int/2addr", format = "12x", can_throw)]
    RemInt2addr(Reg, Reg),
    #[instruction(opcode = 0xb5, mnemonic = "and-int/2addr", format = "12x")]
    AndInt2addr(Reg, Reg),
    #[instruction(opcode = 0xb6, mnemonic = "or-int/2addr", format = "12x")]
    OrInt2addr(Reg, Reg),
    #[instruction(opcode = 0xb7, mnemonic = "xor-int/2addr", format = "12x")]
    XorInt2addr(Reg, Reg),
    #[instruction(opcode = 0xb8, mnemonic = "shl-int/2addr", format = "12x")]
    ShlInt2addr(Reg, Reg),
    #[instruction(opcode = 0xb9, mnemonic = "shr-int/2addr", format = "12x")]
    ShrInt2addr(Reg, Reg),
    #[instruction(opcode = 0xba, mnemonic = "ushr-int/2addr", format = "12x")]
    UshrInt2addr(Reg, Reg),
    #[instruction(opcode = 0xbb, mnemonic = "add-long/2addr", format = "12x")]
    AddLong2addr(Reg, Reg),
    #[instruction(opcode = 0xbc, mnemonic = "sub-long/2addr", format = "12x")]
    SubLong2addr(Reg, Reg),
    #[instruction(opcode = 0xbd, mnemonic = "mul-long/2addr", format = "12x")]
    MulLong2addr(Reg, Reg),
    #[instruction(opcode = 0xbe, mnemonic = "div-long/2addr", format = "12x", can_throw)]
    DivLong2addr(Reg, Reg),
    #[instruction(opcode = 0xbf, mnemonic = "rem-long/2addr", format = "12x", can_throw)]
    RemLong2addr(Reg, Reg),
    #[instruction(opcode = 0xc0, mnemonic = "and-long/2addr", format = "12x")]
    AndLong2addr(Reg, Reg),
    #[instruction(opcode = 0xc1, mnemonic = "or-long/2addr", format = "12x")]
    OrLong2addr(Reg, Reg),
    #[instruction(opcode = 0xc2, mnemonic = "xor-long/2addr", format = "12x")]
    XorLong2addr(Reg, Reg),
    #[instruction(opcode = 0xc3, mnemonic = "shl-long/2addr", format = "12x")]
    ShlLong2addr(Reg, Reg),
    #[instruction(opcode = 0xc4, mnemonic = "shr-long/2addr", format = "12x")]
    ShrLong2addr(Reg, Reg),
    #[instruction(opcode = 0xc5, mnemonic = "ushr-long/2addr", format = "12x")]
    UshrLong2addr(Reg, Reg),
    #[instruction(opcode = 0xc6, mnemonic = "add-float/2addr", format = "12x")]
    AddFloat2addr(Reg, Reg),
    #[instruction(opcode = 0xc7, mnemonic = "sub-float/2addr", format = "12x")]
    SubFloat2addr(Reg, Reg),
    #[instruction(opcode = 0xc8, mnemonic = "mul-float/2addr", format = "12x")]
    MulFloat2addr(Reg, Reg),
    #[instruction(opcode = 0xc9, mnemonic = "div-float/2addr", format = "12x")]
    DivFloat2addr(Reg, Reg),
    #[instruction(opcode = 0xca, mnemonic = "rem-float/2addr", format = "12x")]
    RemFloat2addr(Reg, Reg),
    #[instruction(opcode = 0xcb, mnemonic = "add-double/2addr", format = "12x")]
    AddDouble2addr(Reg, Reg),
    #[instruction(opcode = 0xcc, mnemonic = "sub-double/2addr", format = "12x")]
    SubDouble2addr(Reg, Reg),
    #[instruction(opcode = 0xcd, mnemonic = "mul-double/2addr", format = "12x")]
    MulDouble2addr(Reg, Reg),
    #[instruction(opcode = 0xce, mnemonic = "div-double/2addr", format = "12x")]
    DivDouble2addr(Reg, Reg),
    #[instruction(opcode = 0xcf, mnemonic = "rem-double/2addr", format = "12x")]
    RemDouble2addr(Reg, Reg),

    #[instruction(opcode = 0xd0, mnemonic = "add-int/lit16", format = "22s")]
    AddIntLit16(Reg, Reg, i16),
    #[instruction(opcode = 0xd1, mnemonic = "rsub-int", format = "22s")]
    RsubInt(Reg, Reg, i16),
    #[instruction(opcode = 0xd2, mnemonic = "mul-int/lit16", format = "22s")]
    MulIntLit16(Reg, Reg, i16),
    #[instruction(opcode = 0xd3, mnemonic = "div-int/lit16", format = "22s", can_throw)]
    DivIntLit16(Reg, Reg, i16),
    #[instruction(opcode = 0xd4, mnemonic = "rem-int/lit16", format = "22s", can_throw)]
    RemIntLit16(Reg, Reg, i16),
    #[instruction(opcode = 0xd5, mnemonic = "and-int/lit16", format = "22s")]
    AndIntLit16(Reg, Reg, i16),
    #[instruction(opcode = 0xd6, mnemonic = "or-int/lit16", format = "22s")]
    OrIntLit16(Reg, Reg, i16),
    #[instruction(opcode = 0xd7, mnemonic = "xor-int/lit16", format = "22s")]
    XorIntLit16(Reg, Reg, i16),
    #[instruction(opcode = 0xd8, mnemonic = "add-int/lit8", format = "22b")]
    AddIntLit8(Reg, Reg, i8),
    #[instruction(opcode = 0xd9, mnemonic = "rsub-int/lit8", format = "22b")]
    RsubIntLit8(Reg, Reg, i8),
    #[instruction(opcode = 0xda, mnemonic = "mul-int/lit8", format = "22b")]
    MulIntLit8(Reg, Reg, i8),
    #[instruction(opcode = 0xdb, mnemonic = "div-int/lit8", format = "22b", can_throw)]
    DivIntLit8(Reg, Reg, i8),
    #[instruction(opcode = 0xdc, mnemonic = "rem-int/lit8", format = "22b", can_throw)]
    RemIntLit8(Reg, Reg, i8),
    #[instruction(opcode = 0xdd, mnemonic = "and-int/lit8", format = "22b")]
    AndIntLit8(Reg, Reg, i8),
    #[instruction(opcode = 0xde, mnemonic = "or-int/lit8", format = "22b")]
    OrIntLit8(Reg, Reg, i8),
    #[instruction(opcode = 0xdf, mnemonic = "xor-int/lit8", format = "22b")]
    XorIntLit8(Reg, Reg, i8),
    #[instruction(opcode = 0xe0, mnemonic = "shl-int/lit8", format = "22b")]
    ShlIntLit8(Reg, Reg, i8),
    #[instruction(opcode = 0xe1, mnemonic = "shr-int/lit8", format = "22b")]
    ShrIntLit8(Reg, Reg, i8),
    #[instruction(opcode = 0xe2, mnemonic = "ushr-int/lit8", format = "22b")]
    UshrIntLit8(Reg, Reg, i8),

    #[instruction(opcode = 0xfa, mnemonic = "invoke-polymorphic", format = "45cc", can_throw, is_invoke)]
    InvokePolymorphic(RegList, Index<MethodIdItem>, Index<ProtoIdItem>),
    #[instruction(opcode = 0xfb, mnemonic = "invoke-polymorphic/range", format = "4rcc", can_throw, is_invoke)]
    InvokePolymorphicRange(RegRange, Index<MethodIdItem>, Index<ProtoIdItem>),
    #[instruction(opcode = 0xfc, mnemonic = "invoke-custom", format = "35c", can_throw, is_invoke)]
    InvokeCustom(RegList, Index<CallSiteIdItem>),
    #[instruction(opcode = 0xfd, mnemonic = "invoke-custom/range", format = "3rc", can_throw, is_invoke)]
    InvokeCustomRange(RegRange, Index<CallSiteIdItem>),
    #[instruction(opcode = 0xfe, mnemonic = "const-method-handle", format = "21c", can_throw)]
    ConstMethodHandle(Reg, Index<MethodHandleItem>),
    #[instruction(opcode = 0xff, mnemonic = "const-method-type", format = "21c", can_throw)]
    ConstMethodType(Reg, Index<ProtoIdItem>),

    /// `(first_key, targets)`
    #[instruction(opcode_expr = "0x00", mnemonic = "packed-switch-payload", format = "custom", size = "4 + _1.len() * 2")]
    PackedSwitchPayload(i32, Vec<i32>),
    /// `(keys, targets)`
    #[instruction(opcode_expr = "0x00", mnemonic = "sparse-switch-payload", format = "custom", size = "2 + _0.len() * 4")]
    SparseSwitchPayload(Vec<i32>, Vec<i32>),
    /// `(element_width, data)`, the data being `element_width * count` bytes.
    #[instruction(opcode_expr = "0x00", mnemonic = "fill-array-data-payload", format = "custom", size = "4 + (_1.len() + 1) / 2")]
    FillArrayDataPayload(u16, Vec<u8>),

    /// Opcodes with no assigned instruction.
    #[instruction(opcode_expr = "*_0", mnemonic = "unused", format = "custom", size = "1")]
    Unused(u8),
}

const PACKED_SWITCH_IDENT: u8 = 0x01;
const SPARSE_SWITCH_IDENT: u8 = 0x02;
const FILL_ARRAY_DATA_IDENT: u8 = 0x03;

impl Instr {
    fn decode_custom(op: u8, input: &[u8]) -> IResult<&[u8], Self, DexError> {
        if op != 0x00 {
            let (input, _) = le_u8(input)?;
            return Ok((input, Self::Unused(op)));
        }
        let (input, ident) = le_u8(input)?;
        match ident {
            PACKED_SWITCH_IDENT => {
                let (input, size) = le_u16(input)?;
                let (input, first_key) = le_i32(input)?;
                let (input, targets) = count(le_i32, usize::from(size))(input)?;
                Ok((input, Self::PackedSwitchPayload(first_key, targets)))
            }
            SPARSE_SWITCH_IDENT => {
                let (input, size) = le_u16(input)?;
                let (input, keys) = count(le_i32, usize::from(size))(input)?;
                let (input, targets) = count(le_i32, usize::from(size))(input)?;
                Ok((input, Self::SparseSwitchPayload(keys, targets)))
            }
            FILL_ARRAY_DATA_IDENT => {
                let (input, width) = le_u16(input)?;
                let (input, size) = le_u32(input)?;
                let len = usize::from(width) * size as usize;
                let (input, data) = take(len)(input)?;
                let (input, _) = take(len % 2)(input)?;
                Ok((input, Self::FillArrayDataPayload(width, data.to_vec())))
            }
            // any other high byte is a plain one unit nop
            _ => Ok((input, Self::Nop)),
        }
    }

    fn encode_custom(&self, out: &mut Vec<u8>) -> DexResult<()> {
        match self {
            Self::Nop => out.extend_from_slice(&[0x00, 0x00]),
            Self::PackedSwitchPayload(first_key, targets) => {
                out.extend_from_slice(&[0x00, PACKED_SWITCH_IDENT]);
                out.extend_from_slice(&table_len(targets.len())?.to_le_bytes());
                out.extend_from_slice(&first_key.to_le_bytes());
                for t in targets {
                    out.extend_from_slice(&t.to_le_bytes());
                }
            }
            Self::SparseSwitchPayload(keys, targets) => {
                if keys.len() != targets.len() {
                    return Err(DexError::OperandOverflow(targets.len() as i64));
                }
                out.extend_from_slice(&[0x00, SPARSE_SWITCH_IDENT]);
                out.extend_from_slice(&table_len(keys.len())?.to_le_bytes());
                for v in keys.iter().chain(targets.iter()) {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            Self::FillArrayDataPayload(width, data) => {
                let count = if *width == 0 {
                    0
                } else {
                    data.len() / usize::from(*width)
                };
                out.extend_from_slice(&[0x00, FILL_ARRAY_DATA_IDENT]);
                out.extend_from_slice(&width.to_le_bytes());
                out.extend_from_slice(&(count as u32).to_le_bytes());
                out.extend_from_slice(data);
                if data.len() % 2 == 1 {
                    out.push(0);
                }
            }
            Self::Unused(op) => out.extend_from_slice(&[*op, 0x00]),
            _ => return Err(DexError::InvalidType),
        }
        Ok(())
    }

    fn custom_operands(&self) -> Vec<Operand> {
        match self {
            Self::PackedSwitchPayload(first_key, targets) => {
                let mut ops = vec![Operand::Literal(i64::from(*first_key))];
                ops.extend(targets.iter().map(|t| Operand::Offset(*t)));
                ops
            }
            Self::SparseSwitchPayload(keys, targets) => keys
                .iter()
                .zip(targets.iter())
                .flat_map(|(k, t)| [Operand::Literal(i64::from(*k)), Operand::Offset(*t)])
                .collect(),
            Self::FillArrayDataPayload(width, data) => vec![
                Operand::Literal(i64::from(*width)),
                Operand::Literal(data.len() as i64),
            ],
            _ => Vec::new(),
        }
    }

    /// Relative target of `goto` and `if` instructions.
    #[must_use]
    pub fn branch_offset(&self) -> Option<i32> {
        match self {
            Self::Goto(o) => Some(i32::from(*o)),
            Self::Goto16(o) => Some(i32::from(*o)),
            Self::Goto32(o) => Some(*o),
            Self::IfEq(_, _, o)
            | Self::IfNe(_, _, o)
            | Self::IfLt(_, _, o)
            | Self::IfGe(_, _, o)
            | Self::IfGt(_, _, o)
            | Self::IfLe(_, _, o)
            | Self::IfEqz(_, o)
            | Self::IfNez(_, o)
            | Self::IfLtz(_, o)
            | Self::IfGez(_, o)
            | Self::IfGtz(_, o)
            | Self::IfLez(_, o) => Some(i32::from(*o)),
            _ => None,
        }
    }

    /// Relative position of the payload of switches and `fill-array-data`.
    #[must_use]
    pub fn payload_offset(&self) -> Option<i32> {
        match self {
            Self::PackedSwitch(_, o) | Self::SparseSwitch(_, o) | Self::FillArrayData(_, o) => {
                Some(*o)
            }
            _ => None,
        }
    }

    /// The first operand, when it is a single register.
    #[must_use]
    pub fn vreg_a(&self) -> Option<Reg> {
        match self.operands().first() {
            Some(Operand::Reg(r)) => Some(*r),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_payload(&self) -> bool {
        matches!(
            self,
            Self::PackedSwitchPayload(..) | Self::SparseSwitchPayload(..) | Self::FillArrayDataPayload(..)
        )
    }

    #[must_use]
    pub fn is_move_result(&self) -> bool {
        matches!(
            self,
            Self::MoveResult(_) | Self::MoveResultWide(_) | Self::MoveResultObject(_)
        )
    }

    #[must_use]
    pub fn is_move_exception(&self) -> bool {
        matches!(self, Self::MoveException(_))
    }

    #[must_use]
    pub fn is_unused(&self) -> bool {
        matches!(self, Self::Unused(_))
    }
}

fn table_len(len: usize) -> DexResult<u16> {
    u16::try_from(len).map_err(|_| DexError::OperandOverflow(len as i64))
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())?;
        for (i, op) in self.operands().iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{op}")?;
        }
        Ok(())
    }
}

impl PrettyPrint for Instr {
    fn pp(&self, f: &mut fmt::Formatter, dex: &Dex) -> DexResult<()> {
        write!(f, "{}", self.mnemonic())?;
        for (i, op) in self.operands().iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{}", PrettyPrinter(op, dex))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_facts() {
        let goto = Instr::Goto(4);
        assert!(goto.can_branch() && !goto.can_continue() && !goto.can_throw());
        let if_eqz = Instr::IfEqz(Reg::from(0u8), 3);
        assert!(if_eqz.can_branch() && if_eqz.can_continue());
        let exit = Instr::MonitorExit(Reg::from(0u8));
        assert!(exit.can_throw() && exit.can_continue());
        let throw = Instr::Throw(Reg::from(0u8));
        assert!(throw.can_throw() && !throw.can_continue());
        assert!(!Instr::DivFloat(Reg::from(0u8), Reg::from(1u8), Reg::from(2u8)).can_throw());
        assert!(Instr::RemLong2addr(Reg::from(0u8), Reg::from(2u8)).can_throw());
        assert!(Instr::ReturnVoid.is_return() && !Instr::ReturnVoid.can_continue());
        assert_eq!(Instr::Unused(0x3e).opcode(), 0x3e);
        assert_eq!(Instr::PackedSwitchPayload(0, vec![1, 2, 3]).size(), 10);
        assert_eq!(Instr::SparseSwitchPayload(vec![1, 5], vec![3, 4]).size(), 10);
        assert_eq!(Instr::FillArrayDataPayload(4, vec![0; 12]).size(), 10);
        assert_eq!(Instr::FillArrayDataPayload(1, vec![0; 3]).size(), 6);
    }

    #[test]
    fn display() {
        let i = Instr::InvokeStatic(RegList::from(vec![1u8, 2u8]), Index::new(7));
        assert_eq!(format!("{i}"), "invoke-static {v1, v2}, method@7");
        let i = Instr::IfLtz(Reg::from(3u8), -4);
        assert_eq!(format!("{i}"), "if-ltz v3, -4");
        assert_eq!(format!("{}", Instr::Const4(Reg::from(0u8), 5)), "const/4 v0, #+5");
        assert_eq!(Instr::Return(Reg::from(4u8)).vreg_a(), Some(Reg::from(4u8)));
    }
}
