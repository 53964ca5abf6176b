//! Method verification: static pre-pass, fixed-point code-flow analysis and
//! per-instruction transfer functions.
//!
//! A [`MethodVerifier`] is built for one method, runs to completion (or to
//! its first hard failure) and is consumed into a [`MethodVerification`].
//! Everything it allocates (register type cache, instruction flags, saved
//! register lines) lives and dies with it.

mod arrays;
mod dump;
mod fields;
mod flow;
mod invoke;
mod prepass;
mod transfer;

pub use dump::dump_method;

use crate::errors::{VerifierError, VerifierResult};
use crate::failures::{Failure, FailureData, FailureKind, FailureRef, Failures, VerifyError};
use crate::insn_flags::{InsnFlags, InsnFlagsTable};
use crate::reg_types::{RegTypeCache, RegTypeId};
use crate::register_line::{LineFailure, LineResult, LockOp, RegisterLine};
use crate::repo::{Repo, Visibility, JAVA_LANG_OBJECT};
use dv_dex::classes::{ClassDefItem, ClassFlags};
use dv_dex::code::CodeItem;
use dv_dex::errors::DexResult;
use dv_dex::instrs::{Instr, Instruction};
use dv_dex::methods::{EncodedMethod, MethodFlags, MethodIdItem};
use dv_dex::types::{pretty_descriptor, TypeIdItem};
use dv_dex::{Dex, Index};
use serde::{Deserialize, Serialize};

/// First API level whose runtime verifier no longer turns soft failures
/// into runtime throws.
const API_LEVEL_S_V2: u32 = 32;
/// First API level checking access to unresolved classes.
const API_LEVEL_P: u32 = 28;

/// Verification settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VerifyOptions {
    /// Verify as the ahead-of-time compiler does: soft failures never mark
    /// instructions as throwing.
    pub aot_mode: bool,
    /// Target API level, 0 when unset.
    pub api_level: u32,
    /// Log the messages of hard failures at warn level.
    pub log_hard_failures: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            aot_mode: false,
            api_level: 0,
            log_hard_failures: true,
        }
    }
}

impl VerifyOptions {
    fn api_level_at_least(&self, level: u32) -> bool {
        self.api_level != 0 && self.api_level >= level
    }

    #[must_use]
    pub fn tracks_runtime_throws(&self) -> bool {
        !self.aot_mode && !self.api_level_at_least(API_LEVEL_S_V2)
    }
}

/// Result of a method verification.
#[derive(Debug, Clone, Serialize)]
pub struct MethodVerification {
    /// Pretty form of the verified method.
    pub method: String,
    pub data: FailureData,
    pub failures: Vec<Failure>,
    /// Dex pcs where the checked interpreter always throws.
    pub runtime_throw_pcs: Vec<u32>,
}

impl MethodVerification {
    #[must_use]
    pub fn is_hard_failure(&self) -> bool {
        self.data.kind == FailureKind::HardFailure
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.data.kind == FailureKind::NoFailure
    }
}

/// A monitor held at some dex pc: the pc of the `monitor-enter` that
/// acquired it and the registers known to hold the locked object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockInfo {
    pub dex_pc: u32,
    pub dex_registers: Vec<u32>,
}

/// Which dex pcs keep a copy of their entry register line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegisterTracking {
    /// Branch targets only, exception handler entries being branch targets.
    Branches,
    /// Every instruction, for dumps.
    All,
}

/// The kind of a method invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MethodType {
    Direct,
    Static,
    Virtual,
    Super,
    Interface,
    Polymorphic,
}

impl std::fmt::Display for MethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Self::Direct => "direct",
            Self::Static => "static",
            Self::Virtual => "virtual",
            Self::Super => "super",
            Self::Interface => "interface",
            Self::Polymorphic => "polymorphic",
        };
        write!(f, "{s}")
    }
}

/// Verification state of one method.
pub(crate) struct MethodVerifier<'a> {
    repo: &'a Repo,
    dex: &'a Dex,
    class_def: &'a ClassDefItem,
    method: &'a EncodedMethod,
    method_id: &'a MethodIdItem,
    options: VerifyOptions,
    class_descriptor: &'a str,
    name: String,
    is_constructor: bool,

    cache: RegTypeCache<'a>,
    failures: Failures,
    declaring_class: RegTypeId,
    return_type: RegTypeId,

    insn_flags: InsnFlagsTable,
    // decoded instructions, indexed by their starting pc
    insns: Vec<Option<Instr>>,
    tracking: RegisterTracking,
    saved_lines: Vec<Option<RegisterLine>>,
    work_line: RegisterLine,
    // line before the current instruction, for exception edges
    saved_line: RegisterLine,
    work_pc: u32,

    interesting_pc: Option<u32>,
    locks: Vec<LockInfo>,
}

impl<'a> MethodVerifier<'a> {
    pub(crate) fn new(
        repo: &'a Repo,
        dex: &'a Dex,
        class_def: &'a ClassDefItem,
        method: &'a EncodedMethod,
        options: VerifyOptions,
    ) -> VerifierResult<Self> {
        let method_id = method.descriptor(dex)?;
        let class_descriptor = class_def.descriptor(dex)?;
        let name = pretty_method_id(dex, method_id)?;
        let return_descriptor = method_id.proto(dex)?.return_descriptor(dex)?;

        let mut cache = RegTypeCache::new(repo);
        let declaring_class = cache.from_descriptor(class_descriptor);
        let return_type = cache.from_descriptor(return_descriptor);
        let (nb_registers, insns_size) = method.code().map_or((0, 0), |code| {
            (usize::from(code.registers_size()), code.insns_size())
        });

        Ok(Self {
            repo,
            dex,
            class_def,
            method,
            method_id,
            options,
            class_descriptor,
            failures: Failures::new(name.clone(), options.tracks_runtime_throws()),
            name,
            is_constructor: false,
            cache,
            declaring_class,
            return_type,
            insn_flags: InsnFlagsTable::new(insns_size),
            insns: vec![None; insns_size],
            tracking: RegisterTracking::Branches,
            saved_lines: vec![None; insns_size],
            work_line: RegisterLine::new(nb_registers),
            saved_line: RegisterLine::new(nb_registers),
            work_pc: 0,
            interesting_pc: None,
            locks: Vec::new(),
        })
    }

    pub(crate) fn with_tracking(mut self, tracking: RegisterTracking) -> Self {
        self.tracking = tracking;
        self
    }

    pub(crate) fn with_interesting_pc(mut self, pc: u32) -> Self {
        self.interesting_pc = Some(pc);
        self
    }

    fn code(&self) -> Option<&'a CodeItem> {
        self.method.code()
    }

    fn flags(&self) -> MethodFlags {
        self.method.flags()
    }

    fn is_static(&self) -> bool {
        self.flags().contains(MethodFlags::ACC_STATIC)
    }

    fn is_instance_constructor(&self) -> bool {
        self.is_constructor && !self.is_static()
    }

    fn registers_size(&self) -> u32 {
        self.code().map_or(0, |code| u32::from(code.registers_size()))
    }

    fn insns_size(&self) -> u32 {
        self.insn_flags.len() as u32
    }

    fn insn_at(&self, pc: u32) -> Option<&Instr> {
        self.insns.get(pc as usize).and_then(Option::as_ref)
    }

    /// Start of the instruction preceding the one at `pc`.
    fn previous_insn(&self, pc: u32) -> Option<u32> {
        (0..pc).rev().find(|p| self.insn_flags.get(*p).is_opcode())
    }

    /// Records a failure at the current dex pc.
    fn fail(&mut self, kind: VerifyError, message: impl AsRef<str>) -> FailureRef {
        let was_pending = self.failures.has_pending_runtime_throw();
        let failure = self.failures.fail(kind, self.work_pc, message.as_ref());
        if !was_pending && self.failures.has_pending_runtime_throw() {
            self.on_runtime_throw();
        }
        failure
    }

    fn fail_hard(&mut self, message: impl AsRef<str>) -> FailureRef {
        self.fail(VerifyError::BAD_CLASS_HARD, message)
    }

    fn fail_line(&mut self, failure: LineFailure) -> FailureRef {
        self.fail(failure.kind, failure.message)
    }

    /// Records the failure of a register line operation, if any.
    fn check_line(&mut self, result: LineResult) -> bool {
        match result {
            Ok(()) => true,
            Err(failure) => {
                self.fail_line(failure);
                false
            }
        }
    }

    fn append_to_last(&mut self, text: &str) {
        if let Some(last) = self.failures.last() {
            self.failures.append(last, text);
        }
    }

    fn prepend_to_last(&mut self, text: &str) {
        if let Some(last) = self.failures.last() {
            self.failures.prepend(last, text);
        }
    }

    /// The checked interpreter will throw at the current instruction. When
    /// it is not a throwing one, its handlers see the line as it is now.
    fn on_runtime_throw(&mut self) {
        let pc = self.work_pc;
        let can_throw = self.insn_at(pc).map_or(true, Instruction::can_throw);
        if !can_throw && self.insn_flags.get(pc).is_in_try() {
            self.saved_line.copy_from(&self.work_line);
        }
    }

    fn type_name(&self, t: RegTypeId) -> String {
        self.cache.name(t)
    }

    fn declaring_class_name(&self) -> String {
        self.type_name(self.declaring_class)
    }

    /// Resolves a type referenced by the code, checking that the current
    /// class can access it.
    fn resolve_class(&mut self, idx: Index<TypeIdItem>, check_access: bool) -> RegTypeId {
        let descriptor = match self.dex.type_descriptor(idx) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                self.fail_hard(format!("bad type index {}: {err}", idx.value()));
                return RegTypeId::CONFLICT;
            }
        };
        let result = self.cache.from_descriptor(descriptor);
        if self.cache.get(result).is_conflict() {
            let class = self.declaring_class_name();
            self.fail_hard(format!("accessing broken descriptor '{descriptor}' in {class}"));
            return result;
        }
        let check_unresolved = self.options.api_level_at_least(API_LEVEL_P);
        let t = self.cache.get(result);
        if check_access
            && t.is_non_zero_reference_types()
            && (check_unresolved || !t.is_unresolved_types())
        {
            let referrer = self.cache.get(self.declaring_class);
            if (check_unresolved || !referrer.is_unresolved_types()) && !self.can_access(result) {
                let msg = format!(
                    "(possibly) illegal class access: '{}' -> '{}'",
                    self.declaring_class_name(),
                    self.type_name(result)
                );
                self.fail(VerifyError::ACCESS_CLASS, msg);
            }
        }
        result
    }

    /// Whether the current class can access a type.
    fn can_access(&self, other: RegTypeId) -> bool {
        if other == self.declaring_class {
            return true;
        }
        let other_type = self.cache.get(other);
        if other_type.is_unresolved_types() {
            return false;
        }
        let Some(descriptor) = other_type.descriptor() else {
            return false;
        };
        if self.cache.get(self.declaring_class).is_unresolved_types() {
            return descriptor == JAVA_LANG_OBJECT
                || self
                    .repo
                    .class_flags(descriptor)
                    .map_or(false, |flags| flags.contains(ClassFlags::ACC_PUBLIC));
        }
        self.repo.can_access_class(self.class_descriptor, descriptor)
    }

    /// Whether the current class can access a member of another class.
    fn can_access_member(&self, declaring: &str, visibility: Visibility) -> bool {
        if self.cache.get(self.declaring_class).is_unresolved_types() {
            return false;
        }
        self.repo
            .can_access_member(self.class_descriptor, declaring, visibility)
    }

    /// Classes both final and abstract cannot be used where a verified
    /// class is required.
    fn check_for_final_abstract_class(&mut self, descriptor: &str) {
        if descriptor.starts_with('[') {
            return;
        }
        if let Some(flags) = self.repo.class_flags(descriptor) {
            if flags.contains(ClassFlags::ACC_FINAL | ClassFlags::ACC_ABSTRACT)
                && !flags.contains(ClassFlags::ACC_INTERFACE)
            {
                self.fail(
                    VerifyError::NO_CLASS,
                    format!(
                        "Final abstract class used in a context that requires a verified class: {}",
                        pretty_descriptor(descriptor)
                    ),
                );
            }
        }
    }

    fn set_reg(&mut self, vdst: u32, t: RegTypeId) -> bool {
        let result = self
            .work_line
            .set_register_type(&self.cache, vdst, t, LockOp::Clear);
        self.check_line(result)
    }

    fn set_reg_keep(&mut self, vdst: u32, t: RegTypeId) -> bool {
        let result = self
            .work_line
            .set_register_type(&self.cache, vdst, t, LockOp::Keep);
        self.check_line(result)
    }

    fn set_reg_wide(&mut self, vdst: u32, lo: RegTypeId) -> bool {
        let hi = RegTypeCache::high_half(lo);
        let result = self
            .work_line
            .set_register_type_wide(&self.cache, vdst, lo, hi);
        self.check_line(result)
    }

    /// Sets a register from a type that may be wide.
    fn set_reg_any(&mut self, vdst: u32, t: RegTypeId) -> bool {
        if self.cache.get(t).is_low_half() {
            self.set_reg_wide(vdst, t)
        } else {
            self.set_reg(vdst, t)
        }
    }

    fn set_result(&mut self, t: RegTypeId) {
        if self.cache.get(t).is_low_half() {
            self.work_line
                .set_result_register_type_wide(t, RegTypeCache::high_half(t));
        } else {
            self.work_line.set_result_register_type(t);
        }
    }

    fn verify_reg(&mut self, vsrc: u32, expected: RegTypeId) -> bool {
        let result = self
            .work_line
            .verify_register_type(&self.cache, vsrc, expected);
        self.check_line(result)
    }

    fn verify_reg_wide(&mut self, vsrc: u32, expected: RegTypeId) -> bool {
        let result = self
            .work_line
            .verify_register_type_wide(&self.cache, vsrc, expected);
        self.check_line(result)
    }

    fn reg_type(&self, vsrc: u32) -> RegTypeId {
        self.work_line.get(vsrc)
    }

    /// Runs every verification step and reports the outcome.
    pub(crate) fn run(mut self) -> MethodVerification {
        let verified = self.verify();
        log::debug!(
            "{}: {} ({} failures)",
            self.name,
            if verified { "passed" } else { "rejected" },
            self.failures.iter().count()
        );
        self.into_verification()
    }

    fn into_verification(self) -> MethodVerification {
        let data = self.failures.data();
        if data.kind == FailureKind::HardFailure && self.options.log_hard_failures {
            for failure in self
                .failures
                .iter()
                .filter(|f| f.kind.contains(VerifyError::BAD_CLASS_HARD))
            {
                log::warn!("{failure}");
            }
        }
        let runtime_throw_pcs = (0..self.insns_size())
            .filter(|pc| self.insn_flags.get(*pc).contains(InsnFlags::RUNTIME_THROW))
            .collect();
        MethodVerification {
            method: self.name,
            data,
            failures: self.failures.into_records(),
            runtime_throw_pcs,
        }
    }

    /// Method-level checks, then the passes over the code.
    fn verify(&mut self) -> bool {
        let flags = self.flags();
        let method_name = match self.method_id.name(self.dex) {
            Ok(name) => name,
            Err(err) => {
                self.fail_hard(format!("bad method name: {err}"));
                return false;
            }
        };
        let constructor_by_name = method_name == "<init>" || method_name == "<clinit>";
        if flags.contains(MethodFlags::ACC_CONSTRUCTOR) {
            if !constructor_by_name {
                self.fail_hard("method is marked as constructor, but not named accordingly");
                return false;
            }
            self.is_constructor = true;
        } else if constructor_by_name {
            log::warn!("method {} not marked as constructor", self.name);
            self.is_constructor = true;
        }

        let is_interface_class = self.class_def.flags().contains(ClassFlags::ACC_INTERFACE);
        let Some(code) = self.code() else {
            return self.verify_method_without_code(is_interface_class);
        };

        if flags.intersects(MethodFlags::ACC_NATIVE | MethodFlags::ACC_ABSTRACT) {
            self.fail_hard("method has code, but is marked native or abstract");
            return false;
        }
        if is_interface_class && !(self.is_constructor && self.is_static()) {
            if self.is_instance_constructor() {
                self.fail_hard("interface methods may not have non-static constructor");
                return false;
            }
            if flags.contains(MethodFlags::ACC_FINAL) {
                self.fail_hard("interface methods may not be final");
                return false;
            }
            if !flags.intersects(MethodFlags::ACC_PUBLIC | MethodFlags::ACC_PRIVATE) {
                self.fail_hard("interfaces may not have protected or package-private members");
                return false;
            }
        }
        if self.is_instance_constructor() && flags.contains(MethodFlags::ACC_SYNCHRONIZED) {
            self.fail_hard("constructor can't be synchronized");
            return false;
        }
        if code.ins_size() > code.registers_size() {
            self.fail_hard(format!(
                "bad register counts (ins={} regs={})",
                code.ins_size(),
                code.registers_size()
            ));
            return false;
        }

        self.compute_widths_and_count_ops()
            && self.scan_try_catch_blocks()
            && self.verify_instructions()
            && self.verify_code_flow()
    }

    fn verify_method_without_code(&mut self, is_interface_class: bool) -> bool {
        let flags = self.flags();
        if !flags.intersects(MethodFlags::ACC_NATIVE | MethodFlags::ACC_ABSTRACT) {
            self.fail_hard("zero-length code in concrete non-native method");
            return false;
        }
        if flags.contains(MethodFlags::ACC_ABSTRACT) {
            let forbidden = MethodFlags::ACC_PRIVATE
                | MethodFlags::ACC_STATIC
                | MethodFlags::ACC_FINAL
                | MethodFlags::ACC_NATIVE
                | MethodFlags::ACC_STRICT
                | MethodFlags::ACC_SYNCHRONIZED;
            if flags.intersects(forbidden) {
                self.fail_hard(
                    "method can't be abstract and private/static/final/native/strict/synchronized",
                );
                return false;
            }
        }
        if self.is_constructor {
            self.fail_hard("constructors can't be abstract or native");
            return false;
        }
        if is_interface_class && !flags.contains(MethodFlags::ACC_PUBLIC) {
            self.fail_hard("interface methods must be public");
            return false;
        }
        true
    }
}

/// Pretty form of a method id, `int Foo.bar(long, java.lang.String)`.
pub(crate) fn pretty_method_id(dex: &Dex, method_id: &MethodIdItem) -> DexResult<String> {
    let proto = method_id.proto(dex)?;
    let params: Vec<String> = proto
        .parameter_descriptors(dex)?
        .into_iter()
        .map(pretty_descriptor)
        .collect();
    Ok(format!(
        "{} {}.{}({})",
        pretty_descriptor(proto.return_descriptor(dex)?),
        pretty_descriptor(method_id.class_descriptor(dex)?),
        method_id.name(dex)?,
        params.join(", ")
    ))
}

/// Verifies a method of a class definition.
pub fn verify_method(
    repo: &Repo,
    dex: &Dex,
    class_def: &ClassDefItem,
    method: &EncodedMethod,
    options: &VerifyOptions,
) -> VerifierResult<MethodVerification> {
    Ok(MethodVerifier::new(repo, dex, class_def, method, *options)?.run())
}

/// Runs the code-flow analysis of a method and reports the monitors held
/// when entering the instruction at `dex_pc`, outermost first.
pub fn find_locks_at_dex_pc(
    repo: &Repo,
    dex: &Dex,
    class_def: &ClassDefItem,
    method: &EncodedMethod,
    dex_pc: u32,
) -> VerifierResult<Vec<LockInfo>> {
    let code = method.code().ok_or(VerifierError::NoCode)?;
    if dex_pc as usize >= code.insns_size() {
        return Err(VerifierError::InvalidDexPc(dex_pc));
    }
    let options = VerifyOptions {
        log_hard_failures: false,
        ..VerifyOptions::default()
    };
    let mut verifier =
        MethodVerifier::new(repo, dex, class_def, method, options)?.with_interesting_pc(dex_pc);
    verifier.verify();
    Ok(verifier.locks)
}

/// Looks a method up by class descriptor and method name. The name may
/// carry a prototype, as in `run(I)V`, to select among overloads.
pub fn find_method<'d>(
    dex: &'d Dex,
    class: &str,
    method: &str,
) -> VerifierResult<(&'d ClassDefItem, &'d EncodedMethod)> {
    let class_def = dex
        .iter_class_defs()
        .find(|def| def.descriptor(dex).map_or(false, |d| d == class))
        .ok_or_else(|| VerifierError::ClassNotFound(class.to_string()))?;
    let (name, signature) = match method.find('(') {
        Some(pos) => (&method[..pos], Some(&method[pos..])),
        None => (method, None),
    };
    for encoded in class_def.methods() {
        let method_id = encoded.descriptor(dex)?;
        if method_id.name(dex)? != name {
            continue;
        }
        if let Some(signature) = signature {
            if method_id.signature(dex)? != signature {
                continue;
            }
        }
        return Ok((class_def, encoded));
    }
    Err(VerifierError::MethodNotFound(format!("{class}->{method}")))
}

#[cfg(test)]
mod tests;
