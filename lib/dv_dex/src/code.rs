//! Dalvik bytecode-related structures.

use crate::errors::DexResult;
use crate::fields::FieldIdItem;
use crate::methods::MethodIdItem;
use crate::strings::StringIdItem;
use crate::types::{ProtoIdItem, TypeIdItem};
use crate::{Dex, DexIndex, Index, PrettyPrint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A call site: the bootstrap arguments of an `invoke-custom`.
///
/// The first three arguments must be the bootstrap method handle, the method
/// name and the method type. Extra arguments follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSiteIdItem {
    pub(crate) arguments: Vec<EncodedValue>,
}

impl CallSiteIdItem {
    #[inline]
    #[must_use]
    pub fn new(arguments: Vec<EncodedValue>) -> Self {
        Self { arguments }
    }

    #[inline]
    #[must_use]
    pub fn arguments(&self) -> &[EncodedValue] {
        &self.arguments
    }
}

impl PrettyPrint for CallSiteIdItem {
    fn pp(&self, f: &mut fmt::Formatter, _dex: &Dex) -> DexResult<()> {
        write!(f, "callsite(")?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")?;
        Ok(())
    }
}

/// The subset of encoded values a call site can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EncodedValue {
    Int(i64),
    Float(f64),
    String(Index<StringIdItem>),
    Type(Index<TypeIdItem>),
    MethodType(Index<ProtoIdItem>),
    MethodHandle(Index<MethodHandleItem>),
}

impl EncodedValue {
    /// Name of the value type, as reported in verification messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::Type(_) => "Type",
            Self::MethodType(_) => "MethodType",
            Self::MethodHandle(_) => "MethodHandle",
        }
    }
}

impl fmt::Display for EncodedValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(idx) => write!(f, "string@{idx}"),
            Self::Type(idx) => write!(f, "type@{idx}"),
            Self::MethodType(idx) => write!(f, "proto@{idx}"),
            Self::MethodHandle(idx) => write!(f, "method_handle@{idx}"),
        }
    }
}

/// Method handle kinds, with their dex encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MethodHandleType {
    StaticPut = 0,
    StaticGet = 1,
    InstancePut = 2,
    InstanceGet = 3,
    InvokeStatic = 4,
    InvokeInstance = 5,
    InvokeConstructor = 6,
    InvokeDirect = 7,
    InvokeInterface = 8,
}

impl MethodHandleType {
    #[must_use]
    pub fn from_u16(kind: u16) -> Option<Self> {
        Some(match kind {
            0 => Self::StaticPut,
            1 => Self::StaticGet,
            2 => Self::InstancePut,
            3 => Self::InstanceGet,
            4 => Self::InvokeStatic,
            5 => Self::InvokeInstance,
            6 => Self::InvokeConstructor,
            7 => Self::InvokeDirect,
            8 => Self::InvokeInterface,
            _ => return None,
        })
    }

    #[must_use]
    pub fn is_field_accessor(self) -> bool {
        (self as u16) <= (Self::InstanceGet as u16)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::StaticPut => "static-put",
            Self::StaticGet => "static-get",
            Self::InstancePut => "instance-put",
            Self::InstanceGet => "instance-get",
            Self::InvokeStatic => "invoke-static",
            Self::InvokeInstance => "invoke-instance",
            Self::InvokeConstructor => "invoke-constructor",
            Self::InvokeDirect => "invoke-direct",
            Self::InvokeInterface => "invoke-interface",
        }
    }
}

/// A method handle: its raw kind and the index of the field or method it designates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodHandleItem {
    pub(crate) kind: u16,
    pub(crate) field_or_method: u32,
}

impl MethodHandleItem {
    #[inline]
    #[must_use]
    pub fn new(kind: MethodHandleType, field_or_method: u32) -> Self {
        Self {
            kind: kind as u16,
            field_or_method,
        }
    }

    #[inline]
    #[must_use]
    pub fn raw_kind(&self) -> u16 {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<MethodHandleType> {
        MethodHandleType::from_u16(self.kind)
    }

    #[inline]
    #[must_use]
    pub fn field_or_method(&self) -> u32 {
        self.field_or_method
    }
}

impl PrettyPrint for MethodHandleItem {
    fn pp(&self, f: &mut fmt::Formatter, dex: &Dex) -> DexResult<()> {
        match self.kind() {
            Some(kind) if kind.is_field_accessor() => {
                write!(f, "{}(", kind.name())?;
                Index::<FieldIdItem>::new(self.field_or_method)
                    .get(dex)?
                    .pp(f, dex)?;
                write!(f, ")")?;
            }
            Some(kind) => {
                write!(f, "{}(", kind.name())?;
                Index::<MethodIdItem>::new(self.field_or_method)
                    .get(dex)?
                    .pp(f, dex)?;
                write!(f, ")")?;
            }
            None => write!(f, "method-handle-kind-{}({})", self.kind, self.field_or_method)?,
        }
        Ok(())
    }
}

/// The bytecode of a method and its exception table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeItem {
    pub(crate) registers_size: u16,
    pub(crate) ins_size: u16,
    pub(crate) outs_size: u16,
    pub(crate) insns: Vec<u16>,
    #[serde(default)]
    pub(crate) tries: Vec<TryItem>,
}

impl CodeItem {
    #[inline]
    #[must_use]
    pub fn new(registers_size: u16, ins_size: u16, outs_size: u16, insns: Vec<u16>) -> Self {
        Self {
            registers_size,
            ins_size,
            outs_size,
            insns,
            tries: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tries(mut self, tries: Vec<TryItem>) -> Self {
        self.tries = tries;
        self
    }

    #[inline]
    #[must_use]
    pub fn registers_size(&self) -> u16 {
        self.registers_size
    }

    #[inline]
    #[must_use]
    pub fn ins_size(&self) -> u16 {
        self.ins_size
    }

    #[inline]
    #[must_use]
    pub fn outs_size(&self) -> u16 {
        self.outs_size
    }

    /// Raw code units of the method.
    #[inline]
    #[must_use]
    pub fn insns(&self) -> &[u16] {
        &self.insns
    }

    /// Size of the bytecode, in 16-bit code units.
    #[inline]
    #[must_use]
    pub fn insns_size(&self) -> usize {
        self.insns.len()
    }

    #[inline]
    #[must_use]
    pub fn tries(&self) -> &[TryItem] {
        &self.tries
    }

    /// Returns the handler list covering `pc`, if any. Try items do not overlap.
    #[must_use]
    pub fn find_catch_handler(&self, pc: u32) -> Option<&CatchHandler> {
        self.tries
            .iter()
            .find(|t| t.covers(pc))
            .map(|t| &t.handler)
    }
}

/// A try block: a range of code units and the handlers covering it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryItem {
    pub(crate) start_addr: u32,
    pub(crate) insn_count: u16,
    pub(crate) handler: CatchHandler,
}

impl TryItem {
    #[inline]
    #[must_use]
    pub fn new(start_addr: u32, insn_count: u16, handler: CatchHandler) -> Self {
        Self {
            start_addr,
            insn_count,
            handler,
        }
    }

    #[inline]
    #[must_use]
    pub fn start_addr(&self) -> u32 {
        self.start_addr
    }

    #[inline]
    #[must_use]
    pub fn insn_count(&self) -> u16 {
        self.insn_count
    }

    /// First code unit after the try block.
    #[inline]
    #[must_use]
    pub fn end_addr(&self) -> u32 {
        self.start_addr + u32::from(self.insn_count)
    }

    #[inline]
    #[must_use]
    pub fn covers(&self, pc: u32) -> bool {
        pc >= self.start_addr && pc < self.end_addr()
    }

    #[inline]
    #[must_use]
    pub fn handler(&self) -> &CatchHandler {
        &self.handler
    }
}

/// Handlers of a try block, typed ones first in priority order, then the optional catch-all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatchHandler {
    #[serde(default)]
    pub(crate) handlers: Vec<TypeAddrPair>,
    #[serde(default)]
    pub(crate) catch_all_addr: Option<u32>,
}

impl CatchHandler {
    #[inline]
    #[must_use]
    pub fn new(handlers: Vec<TypeAddrPair>, catch_all_addr: Option<u32>) -> Self {
        Self {
            handlers,
            catch_all_addr,
        }
    }

    #[inline]
    #[must_use]
    pub fn catch_all_addr(&self) -> Option<u32> {
        self.catch_all_addr
    }

    #[inline]
    #[must_use]
    pub fn has_catch_all(&self) -> bool {
        self.catch_all_addr.is_some()
    }

    /// Iterates over `(type, address)` pairs, the catch-all coming last with no type.
    pub fn iter(&self) -> impl Iterator<Item = (Option<Index<TypeIdItem>>, u32)> + '_ {
        self.handlers
            .iter()
            .map(|p| (Some(p.type_idx), p.addr))
            .chain(self.catch_all_addr.map(|addr| (None, addr)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TypeAddrPair {
    pub(crate) type_idx: Index<TypeIdItem>,
    pub(crate) addr: u32,
}

impl TypeAddrPair {
    #[inline]
    #[must_use]
    pub fn new(type_idx: Index<TypeIdItem>, addr: u32) -> Self {
        Self { type_idx, addr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_handlers_order() {
        let handler = CatchHandler::new(
            vec![
                TypeAddrPair::new(Index::new(2), 10),
                TypeAddrPair::new(Index::new(3), 12),
            ],
            Some(14),
        );
        let code = CodeItem::new(2, 0, 0, vec![0; 16]).with_tries(vec![TryItem::new(2, 4, handler)]);
        assert!(code.find_catch_handler(1).is_none());
        assert!(code.find_catch_handler(6).is_none());
        let addrs: Vec<u32> = code
            .find_catch_handler(5)
            .unwrap()
            .iter()
            .map(|(_, addr)| addr)
            .collect();
        assert_eq!(addrs, vec![10, 12, 14]);
    }

    #[test]
    fn call_site_json() {
        let site: CallSiteIdItem = serde_json::from_str(
            r#"{"arguments": [{"type": "method_handle", "value": 0}, {"type": "string", "value": 1}, {"type": "method_type", "value": 2}]}"#,
        )
        .unwrap();
        assert_eq!(site.arguments().len(), 3);
        assert_eq!(site.arguments()[0].type_name(), "MethodHandle");
    }
}
