//! Method invocations: resolution, access and argument checks.

use super::{pretty_method_id, MethodType, MethodVerifier};
use crate::failures::VerifyError;
use crate::reg_types::{RegType, RegTypeId};
use crate::repo::{
    polymorphic_return_descriptor, split_signature, Method, Visibility, JAVA_LANG_OBJECT,
    METHOD_HANDLE, VAR_HANDLE,
};
use dv_dex::code::{CallSiteIdItem, EncodedValue, MethodHandleType};
use dv_dex::methods::MethodIdItem;
use dv_dex::registers::{RegList, RegRange};
use dv_dex::types::{pretty_descriptor, ProtoIdItem};
use dv_dex::{DexIndex, Index};

/// Number of leading call site arguments checked by `invoke-custom`: the
/// bootstrap method handle, the method name and the method type.
const CALL_SITE_REQUIRED_ARGUMENTS: usize = 3;

/// Argument registers of an invoke instruction.
#[derive(Debug, Clone, Copy)]
pub(crate) enum InvokeArgs<'i> {
    List(&'i RegList),
    Range(RegRange),
}

impl<'i> InvokeArgs<'i> {
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::List(list) => list.len(),
            Self::Range(range) => range.len(),
        }
    }

    pub(crate) fn is_range(&self) -> bool {
        matches!(self, Self::Range(_))
    }

    /// Register holding the `i`-th argument slot.
    pub(crate) fn reg(&self, i: usize) -> Option<u32> {
        match self {
            Self::List(list) => list.get(i).map(|r| r.index()),
            Self::Range(range) => (i < range.len()).then(|| range.first().index() + i as u32),
        }
    }
}

impl<'a> MethodVerifier<'a> {
    fn method_id(&mut self, idx: Index<MethodIdItem>) -> Option<&'a MethodIdItem> {
        match idx.get(self.dex) {
            Ok(method_id) => Some(method_id),
            Err(err) => {
                self.fail_hard(format!("bad method index {idx}: {err}"));
                None
            }
        }
    }

    fn pretty_method(&self, idx: Index<MethodIdItem>) -> String {
        idx.get(self.dex)
            .and_then(|method_id| pretty_method_id(self.dex, method_id))
            .unwrap_or_else(|_| format!("method@{idx}"))
    }

    /// Parameter descriptors of a prototype.
    fn proto_parameters(&mut self, idx: Index<ProtoIdItem>) -> Option<Vec<&'a str>> {
        match idx.get(self.dex).and_then(|proto| proto.parameter_descriptors(self.dex)) {
            Ok(params) => Some(params),
            Err(err) => {
                self.fail_hard(format!("bad prototype {idx}: {err}"));
                None
            }
        }
    }

    /// Type of the values returned by methods of a prototype.
    fn proto_return_type(&mut self, idx: Index<ProtoIdItem>) -> RegTypeId {
        match idx.get(self.dex).and_then(|proto| proto.return_descriptor(self.dex)) {
            Ok(descriptor) => self.cache.from_descriptor(descriptor),
            Err(err) => {
                self.fail_hard(format!("bad prototype {idx}: {err}"));
                RegTypeId::CONFLICT
            }
        }
    }

    /// Type of the receiver register, `Conflict` after a failure.
    pub(super) fn get_invocation_this(&mut self, args: InvokeArgs) -> RegTypeId {
        let Some(this_reg) = args.reg(0) else {
            self.fail_hard("invoke lacks 'this'");
            return RegTypeId::CONFLICT;
        };
        let this_type = self.reg_type(this_reg);
        if !self.cache.get(this_type).is_reference_types() {
            let msg = format!(
                "tried to get class from non-reference register v{this_reg} (type={})",
                self.type_name(this_type)
            );
            self.fail_hard(msg);
            return RegTypeId::CONFLICT;
        }
        this_type
    }

    fn resolve_method_and_check_access(
        &mut self,
        method_idx: Index<MethodIdItem>,
        method_type: MethodType,
    ) -> Option<&'a Method> {
        let method_id = self.method_id(method_idx)?;
        let klass_type = self.resolve_class(method_id.class_idx(), true);
        let name = method_id.name(self.dex).unwrap_or("?");
        if self.cache.get(klass_type).is_conflict() {
            self.append_to_last(&format!(" in attempt to access method {name}"));
            return None;
        }
        if self.cache.get(klass_type).is_unresolved_types() {
            return None;
        }
        let class = match method_id.class_descriptor(self.dex) {
            Ok(class) => class,
            Err(err) => {
                self.fail_hard(format!("bad method class: {err}"));
                return None;
            }
        };
        let signature = method_id.signature(self.dex).unwrap_or_default();
        let klass_is_interface = self.repo.is_interface(class);

        let (found, must_fail) = {
            let (lookup, fallback) = if klass_is_interface {
                (
                    self.repo.find_interface_method(class, name, &signature),
                    self.repo.find_class_method(class, name, &signature),
                )
            } else {
                (
                    self.repo.find_class_method(class, name, &signature),
                    self.repo.find_interface_method(class, name, &signature),
                )
            };
            match lookup {
                Some(method) => (Some(method), false),
                // only for better reporting below
                None => (fallback, true),
            }
        };
        let Some(res_method) = found else {
            self.fail(
                VerifyError::NO_METHOD,
                format!(
                    "couldn't find method {}.{name} {signature}",
                    pretty_descriptor(class)
                ),
            );
            return None;
        };

        if res_method.is_constructor() && method_type != MethodType::Direct {
            self.fail_hard(format!("rejecting non-direct call to constructor {res_method}"));
            return None;
        }
        if res_method.is_class_initializer() {
            self.fail_hard(format!("rejecting call to class initializer {res_method}"));
            return None;
        }
        if klass_is_interface {
            if !matches!(
                method_type,
                MethodType::Interface | MethodType::Static | MethodType::Direct | MethodType::Super
            ) {
                let msg = format!(
                    "non-interface method {} is in an interface class {}",
                    self.pretty_method(method_idx),
                    pretty_descriptor(class)
                );
                self.fail(VerifyError::CLASS_CHANGE, msg);
                return None;
            }
        } else if method_type == MethodType::Interface {
            let msg = format!(
                "interface method {} is in a non-interface class {}",
                self.pretty_method(method_idx),
                pretty_descriptor(class)
            );
            self.fail(VerifyError::CLASS_CHANGE, msg);
            return None;
        }
        if method_type == MethodType::Interface
            && res_method.class_descriptor() == JAVA_LANG_OBJECT
            && !res_method.is_public()
        {
            self.fail(
                VerifyError::NO_METHOD,
                format!(
                    "invoke-interface {}.{name} {signature} resolved to non-public object method {res_method} but non-public Object methods are excluded from interface method resolution.",
                    pretty_descriptor(class)
                ),
            );
            return None;
        }
        if !self.can_access_member(
            res_method.class_descriptor(),
            Visibility::from(res_method.flags()),
        ) {
            let msg = format!(
                "illegal method access (call {res_method} from {})",
                self.declaring_class_name()
            );
            self.fail(VerifyError::ACCESS_METHOD, msg);
            return Some(res_method);
        }
        if res_method.is_private()
            && matches!(method_type, MethodType::Virtual | MethodType::Super)
        {
            self.fail_hard(format!(
                "invoke-super/virtual can't be used on private method {res_method}"
            ));
            return None;
        }
        let kind_mismatch = match method_type {
            MethodType::Direct => !res_method.is_direct() || res_method.is_static(),
            MethodType::Static => !res_method.is_static(),
            MethodType::Super | MethodType::Virtual | MethodType::Interface => {
                res_method.is_direct()
            }
            MethodType::Polymorphic => !res_method.is_native() || !res_method.is_varargs(),
        };
        if kind_mismatch {
            self.fail(
                VerifyError::CLASS_CHANGE,
                format!("invoke type ({method_type}) does not match method type of {res_method}"),
            );
            return None;
        }
        if must_fail {
            self.fail(
                VerifyError::NO_METHOD,
                format!(
                    "couldn't find method {}.{name} {signature}",
                    pretty_descriptor(class)
                ),
            );
            return None;
        }
        Some(res_method)
    }

    /// Checks the receiver and the argument registers against the parameter
    /// descriptors of the callee.
    fn verify_invocation_args_from_params(
        &mut self,
        args: InvokeArgs,
        method_idx: Option<Index<MethodIdItem>>,
        params: &[&str],
        method_type: MethodType,
        res_method: Option<&'a Method>,
    ) -> Option<&'a Method> {
        let expected_args = args.len();
        let outs_size = self.code().map_or(0, |code| usize::from(code.outs_size()));
        if expected_args > outs_size {
            self.fail_hard(format!(
                "invalid argument count ({expected_args}) exceeds outsSize ({outs_size})"
            ));
            return None;
        }

        if method_type != MethodType::Static {
            let actual_arg_type = self.get_invocation_this(args);
            if self.cache.get(actual_arg_type).is_conflict() {
                return None;
            }
            let method_id = method_idx.and_then(|idx| idx.get(self.dex).ok());
            let is_init = self.cache.get(actual_arg_type).is_uninitialized_types();
            if is_init {
                let calls_constructor = match res_method {
                    Some(method) => method.is_constructor(),
                    None => method_id
                        .and_then(|id| id.name(self.dex).ok())
                        .map_or(false, |name| name == "<init>"),
                };
                if !calls_constructor {
                    self.fail_hard("'this' arg must be initialized");
                    return None;
                }
            }
            let adjusted_type = if is_init {
                self.cache.from_uninitialized(actual_arg_type)
            } else {
                actual_arg_type
            };
            let referenced = method_id.and_then(|id| id.class_descriptor(self.dex).ok());
            let check_receiver = method_type != MethodType::Interface
                && !self.cache.get(adjusted_type).is_zero_or_null();
            if let Some(referenced) = referenced.filter(|_| check_receiver) {
                let mut res_method_class = self.cache.from_descriptor(referenced);
                if let Some(method) = res_method {
                    let inherited = self.cache.get(res_method_class).has_class()
                        && !self.cache.get(res_method_class).is_java_lang_object()
                        && method.class_descriptor() != referenced
                        && !self.repo.is_interface(method.class_descriptor());
                    if inherited {
                        res_method_class = self.cache.from_descriptor(method.class_descriptor());
                    }
                }
                if !self.cache.is_assignable_from(res_method_class, adjusted_type) {
                    let kind = if self.cache.get(adjusted_type).is_unresolved_types() {
                        VerifyError::UNRESOLVED_TYPE_CHECK
                    } else {
                        VerifyError::BAD_CLASS_HARD
                    };
                    let msg = format!(
                        "'this' argument '{}' not instance of '{}'",
                        self.type_name(actual_arg_type),
                        self.type_name(res_method_class)
                    );
                    self.fail(kind, msg);
                    if self.failures.has_pending_hard_failure() {
                        return None;
                    }
                }
            }
        }

        let mut sig_registers = usize::from(method_type != MethodType::Static);
        for param in params {
            if sig_registers >= expected_args {
                self.fail_hard(format!(
                    "Rejecting invocation, expected {expected_args} argument registers, method signature has {} or more",
                    sig_registers + 1
                ));
                return None;
            }
            let reg_type = self.cache.from_descriptor(param);
            let Some(get_reg) = args.reg(sig_registers) else {
                self.fail_hard(format!("missing argument register {sig_registers}"));
                return None;
            };
            let is_wide = self.cache.get(reg_type).is_low_half();
            if self.cache.get(reg_type).is_integral_types() {
                let src_type = self.reg_type(get_reg);
                if !self.cache.get(src_type).is_integral_types() {
                    let msg = format!(
                        "register v{get_reg} has type {} but expected {}",
                        self.type_name(src_type),
                        self.type_name(reg_type)
                    );
                    self.fail_hard(msg);
                    return None;
                }
            } else if !self.verify_reg(get_reg, reg_type) {
                if self.failures.has_pending_hard_failure() {
                    return None;
                }
            } else if is_wide && !args.is_range() && sig_registers + 1 < expected_args {
                let second_reg = args.reg(sig_registers + 1).unwrap_or(u32::MAX);
                if second_reg != get_reg + 1 {
                    self.fail_hard(format!(
                        "Rejecting invocation, long or double parameter at index {sig_registers} is not a pair: {get_reg} + {second_reg}."
                    ));
                    return None;
                }
            }
            sig_registers += if is_wide { 2 } else { 1 };
        }
        if expected_args != sig_registers {
            self.fail_hard(format!(
                "Rejecting invocation, expected {expected_args} argument registers, method signature has {sig_registers}"
            ));
            return None;
        }
        res_method
    }

    /// Checks what can be checked against the method id alone, when the
    /// callee could not be resolved.
    fn verify_invocation_args_unresolved_method(
        &mut self,
        args: InvokeArgs,
        method_idx: Index<MethodIdItem>,
        method_type: MethodType,
    ) {
        let Some(method_id) = self.method_id(method_idx) else {
            return;
        };
        let Some(params) = self.proto_parameters(method_id.proto_idx()) else {
            return;
        };
        self.verify_invocation_args_from_params(args, Some(method_idx), &params, method_type, None);
    }

    /// Resolves the callee of an invoke and checks its arguments. The
    /// prototype of `invoke-polymorphic` call sites replaces the callee one.
    pub(super) fn verify_invocation_args(
        &mut self,
        args: InvokeArgs,
        method_idx: Index<MethodIdItem>,
        method_type: MethodType,
        call_site_proto: Option<Index<ProtoIdItem>>,
    ) -> Option<&'a Method> {
        let Some(res_method) = self.resolve_method_and_check_access(method_idx, method_type) else {
            if !self.failures.has_pending_hard_failure() {
                self.verify_invocation_args_unresolved_method(args, method_idx, method_type);
            }
            return None;
        };
        let method_id = self.method_id(method_idx)?;

        if method_type == MethodType::Super && !self.check_invoke_super(args, method_idx, res_method)
        {
            return None;
        }

        let proto_idx = call_site_proto.unwrap_or_else(|| method_id.proto_idx());
        let params = self.proto_parameters(proto_idx)?;
        let verified = self.verify_invocation_args_from_params(
            args,
            Some(method_idx),
            &params,
            method_type,
            Some(res_method),
        );
        if let Some(method) = verified {
            if !self.repo.is_interface(method.class_descriptor()) {
                self.check_for_final_abstract_class(method.class_descriptor());
            }
        }
        verified
    }

    /// `invoke-super` targets a superinterface of the current class, or a
    /// method reachable from its superclass.
    fn check_invoke_super(
        &mut self,
        args: InvokeArgs,
        method_idx: Index<MethodIdItem>,
        res_method: &'a Method,
    ) -> bool {
        let Some(method_id) = self.method_id(method_idx) else {
            return false;
        };
        let referenced = method_id.class_descriptor(self.dex).unwrap_or("");
        let reference_type = self.cache.from_descriptor(referenced);
        if self.cache.get(reference_type).is_unresolved_types() {
            self.fail(
                VerifyError::NO_METHOD,
                "Unable to find referenced class from invoke-super",
            );
            self.verify_invocation_args_unresolved_method(args, method_idx, MethodType::Super);
            return false;
        }

        if self.cache.is_interface(reference_type) {
            if !self.cache.get(self.declaring_class).has_class() {
                self.fail(
                    VerifyError::NO_CLASS,
                    "Unable to resolve the full class of 'this' used in an interface invoke-super",
                );
                self.verify_invocation_args_unresolved_method(args, method_idx, MethodType::Super);
                return false;
            }
            if !self
                .cache
                .is_strictly_assignable_from(reference_type, self.declaring_class)
            {
                let msg = format!(
                    "invoke-super in {} in method {} to method {} references non-super-interface type {}",
                    pretty_descriptor(self.class_descriptor),
                    self.name,
                    self.pretty_method(method_idx),
                    pretty_descriptor(referenced)
                );
                self.fail(VerifyError::CLASS_CHANGE, msg);
                self.verify_invocation_args_unresolved_method(args, method_idx, MethodType::Super);
                return false;
            }
            return true;
        }

        let superclass = match self.class_def.superclass(self.dex) {
            Ok(Some(superclass)) => superclass,
            _ => {
                self.fail_hard(format!(
                    "No superclass for invoke-super from {} to super {res_method}.",
                    self.name
                ));
                return false;
            }
        };
        let super_type = self.cache.from_descriptor(superclass);
        if self.cache.get(super_type).is_unresolved_types() {
            let msg = format!(
                "unknown super class in invoke-super from {} to super {res_method}",
                self.name
            );
            self.fail(VerifyError::NO_METHOD, msg);
            self.verify_invocation_args_unresolved_method(args, method_idx, MethodType::Super);
            return false;
        }
        let in_super = self
            .repo
            .find_class_method(superclass, res_method.name(), res_method.signature())
            .map_or(false, |method| !method.is_direct());
        if !self
            .cache
            .is_strictly_assignable_from(reference_type, self.declaring_class)
            || !in_super
        {
            let msg = format!(
                "invalid invoke-super from {} to super {}.{}{}",
                self.name,
                self.type_name(super_type),
                res_method.name(),
                res_method.signature()
            );
            self.fail(VerifyError::NO_METHOD, msg);
            self.verify_invocation_args_unresolved_method(args, method_idx, MethodType::Super);
            return false;
        }
        true
    }

    /// Checks the bootstrap arguments of an `invoke-custom` call site.
    fn check_call_site(&mut self, idx: Index<CallSiteIdItem>) -> bool {
        let nb_call_sites = self.dex.nb_call_sites();
        let call_site = match idx.get(self.dex) {
            Ok(call_site) => call_site,
            Err(_) => {
                self.fail_hard(format!("Bad call site id #{idx} >= {nb_call_sites}"));
                return false;
            }
        };
        let arguments = call_site.arguments();
        if arguments.len() < CALL_SITE_REQUIRED_ARGUMENTS {
            self.fail_hard(format!(
                "Call site #{idx} has too few arguments: {} < {CALL_SITE_REQUIRED_ARGUMENTS}",
                arguments.len()
            ));
            return false;
        }

        let expected = [
            ("MethodHandle", self.dex.nb_method_handles()),
            ("String", self.dex.nb_strings()),
            ("MethodType", self.dex.nb_protos()),
        ];
        for (i, (argument, (type_name, max))) in arguments.iter().zip(expected).enumerate() {
            let index = match (i, argument) {
                (0, EncodedValue::MethodHandle(h)) => h.as_usize(),
                (1, EncodedValue::String(s)) => s.as_usize(),
                (2, EncodedValue::MethodType(p)) => p.as_usize(),
                _ => {
                    self.fail_hard(format!(
                        "Call site id #{idx} argument {i} has wrong type {}!={type_name}",
                        argument.type_name()
                    ));
                    return false;
                }
            };
            if index >= max {
                self.fail_hard(format!(
                    "Call site id #{idx} argument {i} bad index {index} >= {max}"
                ));
                return false;
            }
        }

        let bootstrap = match &arguments[0] {
            EncodedValue::MethodHandle(h) => h.get(self.dex).ok(),
            _ => None,
        };
        match bootstrap {
            Some(handle) if handle.kind() == Some(MethodHandleType::InvokeStatic) => true,
            Some(handle) => {
                self.fail_hard(format!(
                    "Call site #{idx} argument 0 method handle type is not InvokeStatic: {}",
                    handle.raw_kind()
                ));
                false
            }
            None => {
                self.fail_hard(format!("Call site #{idx} has no bootstrap method handle"));
                false
            }
        }
    }

    /// The callee of `invoke-polymorphic` must be one of the signature
    /// polymorphic methods of `MethodHandle` or `VarHandle`.
    fn check_signature_polymorphic_method(&mut self, method: &'a Method) -> bool {
        let class = method.class_descriptor();
        if class != METHOD_HANDLE && class != VAR_HANDLE {
            self.fail_hard(format!(
                "Signature polymorphic method in unsuppported class: {}",
                pretty_descriptor(class)
            ));
            return false;
        }
        let Some(expected_return) = polymorphic_return_descriptor(class, method.name()) else {
            self.fail_hard(format!(
                "Signature polymorphic method name invalid: {}",
                method.name()
            ));
            return false;
        };
        let (params, ret) = split_signature(method.signature());
        if params.len() != 1 {
            self.fail_hard(format!(
                "Signature polymorphic method has too many arguments {} != 1",
                params.len()
            ));
            return false;
        }
        if params[0] != "[Ljava/lang/Object;" {
            self.fail_hard(format!(
                "Signature polymorphic method has unexpected argument type: {}",
                params[0]
            ));
            return false;
        }
        if ret != expected_return {
            self.fail_hard(format!(
                "Signature polymorphic method has unexpected return type: {ret} != {expected_return}"
            ));
            return false;
        }
        true
    }

    fn check_signature_polymorphic_receiver(&mut self, args: InvokeArgs) -> bool {
        let this_type = self.get_invocation_this(args);
        let this = self.cache.get(this_type);
        let problem = if this.is_zero_or_null() {
            // always fails at run time
            return true;
        } else if !this.is_non_zero_reference_types() {
            "is not a reference"
        } else if matches!(this, RegType::UninitializedReference(..)) {
            "is uninitialized"
        } else if !this.has_class() {
            "has no class"
        } else {
            let descriptor = this.descriptor().unwrap_or("");
            if self.repo.is_subclass(descriptor, METHOD_HANDLE)
                || self.repo.is_subclass(descriptor, VAR_HANDLE)
            {
                return true;
            }
            "is not a subclass of MethodHandle or VarHandle"
        };
        let msg = format!(
            "invoke-polymorphic receiver {problem}: {}",
            self.type_name(this_type)
        );
        self.fail_hard(msg);
        false
    }

    /// `invoke-virtual`, `invoke-super`, `invoke-direct`, `invoke-static` and
    /// `invoke-interface`, plain or range.
    pub(super) fn verify_invoke(
        &mut self,
        args: InvokeArgs,
        method_idx: Index<MethodIdItem>,
        method_type: MethodType,
    ) {
        let called = self.verify_invocation_args(args, method_idx, method_type, None);
        let Some(method_id) = self.method_id(method_idx) else {
            return;
        };
        match method_type {
            MethodType::Direct => {
                let is_constructor = match called {
                    Some(method) => method.is_constructor(),
                    None => method_id.name(self.dex).map_or(false, |name| name == "<init>"),
                };
                if is_constructor && !self.initialize_receiver(args) {
                    return;
                }
            }
            MethodType::Interface => {
                if let Some(method) = called {
                    let declaring = method.class_descriptor();
                    if !self.repo.is_interface(declaring) && declaring != JAVA_LANG_OBJECT {
                        self.fail(
                            VerifyError::CLASS_CHANGE,
                            format!("expected interface class in invoke-interface '{method}'"),
                        );
                        return;
                    }
                }
                let this_type = self.get_invocation_this(args);
                let this = self.cache.get(this_type);
                if !this.is_zero_or_null() && this.is_uninitialized_types() {
                    let msg = format!(
                        "interface call on uninitialized object {}",
                        self.type_name(this_type)
                    );
                    self.fail_hard(msg);
                    return;
                }
            }
            _ => (),
        }
        let return_type = self.proto_return_type(method_id.proto_idx());
        self.set_result(return_type);
    }

    /// After a constructor call, every alias of the receiver is initialized.
    fn initialize_receiver(&mut self, args: InvokeArgs) -> bool {
        let this_type = self.get_invocation_this(args);
        let this = self.cache.get(this_type);
        if this.is_conflict() {
            return false;
        }
        if this.is_zero_or_null() {
            self.fail_hard("unable to initialize null ref");
            return false;
        }
        if !this.is_uninitialized_types() {
            let msg = format!(
                "Expected initialization on uninitialized reference {}",
                self.type_name(this_type)
            );
            self.fail_hard(msg);
            return false;
        }
        self.work_line
            .mark_refs_as_initialized(&mut self.cache, this_type);
        true
    }

    /// `invoke-polymorphic`, plain or range.
    pub(super) fn verify_invoke_polymorphic(
        &mut self,
        args: InvokeArgs,
        method_idx: Index<MethodIdItem>,
        proto_idx: Index<ProtoIdItem>,
    ) {
        let called =
            self.verify_invocation_args(args, method_idx, MethodType::Polymorphic, Some(proto_idx));
        let Some(called) = called else {
            // soft failures of the resolution are hard for signature polymorphic calls
            let message = self
                .failures
                .last_detail()
                .unwrap_or("invoke-polymorphic verification failure.")
                .to_string();
            self.fail_hard(message);
            return;
        };
        if !self.check_signature_polymorphic_method(called)
            || !self.check_signature_polymorphic_receiver(args)
        {
            return;
        }
        let return_type = self.proto_return_type(proto_idx);
        self.set_result(return_type);
    }

    /// `invoke-custom`, plain or range.
    pub(super) fn verify_invoke_custom(&mut self, args: InvokeArgs, idx: Index<CallSiteIdItem>) {
        if !self.check_call_site(idx) {
            return;
        }
        let proto_idx = match idx.get(self.dex).map(|site| &site.arguments()[2]) {
            Ok(EncodedValue::MethodType(proto_idx)) => *proto_idx,
            _ => return,
        };
        let Some(params) = self.proto_parameters(proto_idx) else {
            return;
        };
        // the callee is unknown until the bootstrap method runs
        self.verify_invocation_args_from_params(args, None, &params, MethodType::Static, None);
        let return_type = self.proto_return_type(proto_idx);
        self.set_result(return_type);
    }
}
