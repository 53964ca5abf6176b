//! Static and instance field accesses.

use super::MethodVerifier;
use crate::failures::VerifyError;
use crate::reg_types::RegTypeId;
use crate::repo::{Field, Visibility};
use dv_dex::fields::FieldIdItem;
use dv_dex::instrs::Instr;
use dv_dex::registers::Reg;
use dv_dex::types::pretty_descriptor;
use dv_dex::{Dex, DexIndex, Index};

/// Kind of value moved by a field or array instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemType {
    /// `int` or `float`
    Word,
    /// `long` or `double`
    Wide,
    Object,
    Boolean,
    Byte,
    Char,
    Short,
}

impl MemType {
    /// First characters of the field descriptors the instruction may access.
    pub(crate) fn permitted_descriptors(self) -> (char, char) {
        match self {
            Self::Word => ('I', 'F'),
            Self::Wide => ('J', 'D'),
            Self::Object => ('L', '['),
            Self::Boolean => ('Z', 'Z'),
            Self::Byte => ('B', 'B'),
            Self::Char => ('C', 'C'),
            Self::Short => ('S', 'S'),
        }
    }

    /// Type implied by the instruction alone.
    pub(crate) fn insn_type(self) -> RegTypeId {
        match self {
            Self::Word => RegTypeId::INTEGER,
            Self::Wide => RegTypeId::LONG_LO,
            Self::Object => RegTypeId::JAVA_LANG_OBJECT,
            Self::Boolean => RegTypeId::BOOLEAN,
            Self::Byte => RegTypeId::BYTE,
            Self::Char => RegTypeId::CHAR,
            Self::Short => RegTypeId::SHORT,
        }
    }

    pub(crate) fn is_primitive(self) -> bool {
        self != Self::Object
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessKind {
    Get,
    Put,
}

/// Operands of an `iget*`, `iput*`, `sget*` or `sput*` instruction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldAccess {
    pub(crate) kind: AccessKind,
    pub(crate) mem: MemType,
    /// Register read by puts, written by gets.
    pub(crate) value: Reg,
    /// Object register of instance accesses.
    pub(crate) object: Option<Reg>,
    pub(crate) field: Index<FieldIdItem>,
}

impl FieldAccess {
    pub(crate) fn is_static(&self) -> bool {
        self.object.is_none()
    }

    pub(crate) fn is_put(&self) -> bool {
        self.kind == AccessKind::Put
    }
}

/// Decomposes field instructions, `None` for other instructions.
pub(crate) fn field_access(instr: &Instr) -> Option<FieldAccess> {
    use AccessKind::{Get, Put};
    use Instr::*;
    use MemType::*;

    let instance = |kind, mem, value: &Reg, object: &Reg, field: &Index<FieldIdItem>| {
        Some(FieldAccess {
            kind,
            mem,
            value: *value,
            object: Some(*object),
            field: *field,
        })
    };
    let static_ = |kind, mem, value: &Reg, field: &Index<FieldIdItem>| {
        Some(FieldAccess {
            kind,
            mem,
            value: *value,
            object: None,
            field: *field,
        })
    };

    match instr {
        Iget(a, b, f) => instance(Get, Word, a, b, f),
        IgetWide(a, b, f) => instance(Get, Wide, a, b, f),
        IgetObject(a, b, f) => instance(Get, Object, a, b, f),
        IgetBoolean(a, b, f) => instance(Get, Boolean, a, b, f),
        IgetByte(a, b, f) => instance(Get, Byte, a, b, f),
        IgetChar(a, b, f) => instance(Get, Char, a, b, f),
        IgetShort(a, b, f) => instance(Get, Short, a, b, f),
        Iput(a, b, f) => instance(Put, Word, a, b, f),
        IputWide(a, b, f) => instance(Put, Wide, a, b, f),
        IputObject(a, b, f) => instance(Put, Object, a, b, f),
        IputBoolean(a, b, f) => instance(Put, Boolean, a, b, f),
        IputByte(a, b, f) => instance(Put, Byte, a, b, f),
        IputChar(a, b, f) => instance(Put, Char, a, b, f),
        IputShort(a, b, f) => instance(Put, Short, a, b, f),
        Sget(a, f) => static_(Get, Word, a, f),
        SgetWide(a, f) => static_(Get, Wide, a, f),
        SgetObject(a, f) => static_(Get, Object, a, f),
        SgetBoolean(a, f) => static_(Get, Boolean, a, f),
        SgetByte(a, f) => static_(Get, Byte, a, f),
        SgetChar(a, f) => static_(Get, Char, a, f),
        SgetShort(a, f) => static_(Get, Short, a, f),
        Sput(a, f) => static_(Put, Word, a, f),
        SputWide(a, f) => static_(Put, Wide, a, f),
        SputObject(a, f) => static_(Put, Object, a, f),
        SputBoolean(a, f) => static_(Put, Boolean, a, f),
        SputByte(a, f) => static_(Put, Byte, a, f),
        SputChar(a, f) => static_(Put, Char, a, f),
        SputShort(a, f) => static_(Put, Short, a, f),
        _ => None,
    }
}

/// Pretty form of a field id, `int Foo.bar`.
pub(crate) fn pretty_field_id(dex: &Dex, field_id: &FieldIdItem) -> String {
    let type_ = field_id.type_descriptor(dex).unwrap_or("?");
    let class = field_id.class_descriptor(dex).unwrap_or("?");
    let name = field_id.name(dex).unwrap_or("?");
    format!(
        "{} {}.{name}",
        pretty_descriptor(type_),
        pretty_descriptor(class)
    )
}

impl<'a> MethodVerifier<'a> {
    /// Whether a descriptor designates the resolved class being verified.
    fn is_declaring_class(&self, descriptor: &str) -> bool {
        !self.cache.get(self.declaring_class).is_unresolved_types()
            && descriptor == self.class_descriptor
    }

    fn pretty_field(&self, idx: Index<FieldIdItem>) -> String {
        idx.get(self.dex).map_or_else(
            |_| format!("field@{idx}"),
            |field_id| pretty_field_id(self.dex, field_id),
        )
    }

    /// Resolves the field of an id the way the runtime linker does.
    fn resolve_field(&self, field_id: &FieldIdItem) -> Option<&'a Field> {
        let class = field_id.class_descriptor(self.dex).ok()?;
        let name = field_id.name(self.dex).ok()?;
        let type_ = field_id.type_descriptor(self.dex).ok()?;
        let field = self.repo.resolve_field_jls(class, name, type_);
        if field.is_none() {
            log::trace!("unable to resolve field {name} in {class}");
        }
        field
    }

    fn get_static_field(&mut self, idx: Index<FieldIdItem>, is_put: bool) -> Option<&'a Field> {
        let field_id = match idx.get(self.dex) {
            Ok(field_id) => field_id,
            Err(err) => {
                self.fail_hard(format!("bad field index {idx}: {err}"));
                return None;
            }
        };
        let klass_type = self.resolve_class(field_id.class_idx(), true);
        let klass = self.cache.get(klass_type);
        if klass.is_conflict() || klass.is_unresolved_types() {
            return None;
        }
        let Some(field) = self.resolve_field(field_id) else {
            let msg = format!(
                "field {} not found in the resolved type {}",
                self.pretty_field(idx),
                self.type_name(klass_type)
            );
            self.fail(VerifyError::NO_FIELD, msg);
            return None;
        };
        if !field.is_static() {
            self.fail(
                VerifyError::CLASS_CHANGE,
                format!("expected field {field} to be static"),
            );
            return None;
        }
        self.get_is_field_common(field, is_put)
    }

    fn get_instance_field(
        &mut self,
        vobj: u32,
        idx: Index<FieldIdItem>,
        is_put: bool,
    ) -> Option<&'a Field> {
        let obj_type = self.reg_type(vobj);
        if !self.cache.get(obj_type).is_reference_types() {
            let msg = format!(
                "instance field access on object that has non-reference type {}",
                self.type_name(obj_type)
            );
            self.fail_hard(msg);
            return None;
        }
        let field_id = match idx.get(self.dex) {
            Ok(field_id) => field_id,
            Err(err) => {
                self.fail_hard(format!("bad field index {idx}: {err}"));
                return None;
            }
        };
        let klass_type = self.resolve_class(field_id.class_idx(), true);
        if self.cache.get(klass_type).is_conflict() {
            return None;
        }
        let klass_unresolved = self.cache.get(klass_type).is_unresolved_types();
        let field = if klass_unresolved {
            None
        } else {
            self.resolve_field(field_id)
        };

        let obj = self.cache.get(obj_type);
        let (obj_uninit_this, obj_unresolved, obj_zero) = (
            obj.is_uninitialized_this_reference(),
            obj.is_unresolved_types(),
            obj.is_zero_or_null(),
        );
        if obj.is_uninitialized_types() {
            // Only writes to fields of the class itself are allowed before
            // the constructor call, reads of them are tolerated.
            let own_field = field_id.class_idx() == self.class_def.class_idx();
            if is_put && own_field {
                if obj_uninit_this && obj_unresolved {
                    let declared = self
                        .class_def
                        .instance_fields()
                        .any(|f| f.field_idx() == idx);
                    if declared {
                        return None;
                    }
                } else if obj_uninit_this {
                    if let Some(field) = field {
                        if self.is_declaring_class(field.class_descriptor()) && !field.is_static() {
                            return Some(field);
                        }
                    }
                }
            }
            if !is_put && obj_uninit_this && !obj_unresolved {
                if let Some(field) = field {
                    if self.is_declaring_class(field.class_descriptor()) {
                        return Some(field);
                    }
                }
            }
            let msg = format!(
                "cannot access instance field {} of a not fully initialized object within the context of {}",
                self.pretty_field(idx),
                self.name
            );
            self.fail_hard(msg);
            return None;
        }

        if klass_unresolved {
            return None;
        }
        let Some(field) = field else {
            let msg = format!(
                "field {} not found in the resolved type {}",
                self.pretty_field(idx),
                self.type_name(klass_type)
            );
            self.fail(VerifyError::NO_FIELD, msg);
            return None;
        };
        if !obj_zero {
            let field_klass = if self.cache.get(klass_type).is_java_lang_object()
                || self.cache.descriptor(klass_type) == Some(field.class_descriptor())
            {
                klass_type
            } else {
                self.cache.from_descriptor(field.class_descriptor())
            };
            if !self.cache.is_assignable_from(field_klass, obj_type) {
                let kind = if obj_unresolved {
                    VerifyError::UNRESOLVED_TYPE_CHECK
                } else {
                    VerifyError::BAD_CLASS_HARD
                };
                let msg = format!(
                    "cannot access instance field {field} from object of type {}",
                    self.type_name(obj_type)
                );
                self.fail(kind, msg);
                return None;
            }
        }
        if field.is_static() {
            self.fail(
                VerifyError::CLASS_CHANGE,
                format!("expected field {field} to not be static"),
            );
            return None;
        }
        self.get_is_field_common(field, is_put)
    }

    fn get_is_field_common(&mut self, field: &'a Field, is_put: bool) -> Option<&'a Field> {
        let declaring = field.class_descriptor();
        if !self.can_access_member(declaring, Visibility::from(field.flags())) {
            let msg = format!(
                "cannot access {} field {field} from {}",
                if field.is_static() { "static" } else { "instance" },
                self.declaring_class_name()
            );
            self.fail(VerifyError::ACCESS_FIELD, msg);
            return None;
        }
        if is_put && field.is_final() && !self.is_declaring_class(declaring) {
            let msg = format!(
                "cannot modify final field {field} from other class {}",
                self.declaring_class_name()
            );
            self.fail(VerifyError::ACCESS_FIELD, msg);
            return None;
        }
        self.check_for_final_abstract_class(declaring);
        Some(field)
    }

    /// Checks a field access and updates the value register of gets.
    pub(super) fn verify_is_field_access(&mut self, access: &FieldAccess) {
        match access.object {
            None => {
                self.get_static_field(access.field, access.is_put());
            }
            Some(object) => {
                self.get_instance_field(object.index(), access.field, access.is_put());
            }
        }
        if self.failures.has_pending_hard_failure() {
            return;
        }
        let field_type = match access.field.get(self.dex) {
            Ok(field_id) => match self.cache.from_type_idx(self.dex, field_id.type_idx()) {
                Ok(t) => t,
                Err(err) => {
                    self.fail_hard(format!("bad field type: {err}"));
                    return;
                }
            },
            Err(err) => {
                self.fail_hard(format!("bad field index {}: {err}", access.field));
                return;
            }
        };
        let value = access.value.index();
        match access.kind {
            AccessKind::Put if access.mem.is_primitive() => {
                self.verify_primitive_put(field_type, value);
            }
            AccessKind::Put => {
                self.verify_reg(value, field_type);
            }
            AccessKind::Get => {
                self.set_reg_any(value, field_type);
            }
        }
    }

    /// Primitive stores only check the value category, not its exact type.
    pub(super) fn verify_primitive_put(&mut self, target: RegTypeId, vsrc: u32) {
        let value = self.reg_type(vsrc);
        let value_type = self.cache.get(value);
        let target_type = self.cache.get(target);
        let compatible = if target_type.is_integral_types() {
            value_type.is_integral_types()
        } else if target == RegTypeId::FLOAT {
            value_type.is_float_types()
        } else if target == RegTypeId::LONG_LO {
            value_type.is_long_types()
                && crate::register_line::check_wide_pair(value, self.reg_type(vsrc + 1))
        } else if target == RegTypeId::DOUBLE_LO {
            value_type.is_double_types()
                && crate::register_line::check_wide_pair(value, self.reg_type(vsrc + 1))
        } else {
            false
        };
        if !compatible {
            let msg = format!(
                "unexpected value in v{vsrc} of type {} but expected {} for put",
                self.type_name(value),
                self.type_name(target)
            );
            self.fail_hard(msg);
        }
    }
}
