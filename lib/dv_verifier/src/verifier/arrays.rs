//! Array creation, element loads and stores, and array data fills.

use super::fields::MemType;
use super::invoke::InvokeArgs;
use super::MethodVerifier;
use crate::failures::VerifyError;
use crate::reg_types::{RegTypeCache, RegTypeId};
use dv_dex::instrs::Instr;
use dv_dex::types::TypeIdItem;
use dv_dex::Index;

/// Width in bytes of the elements of a primitive array.
fn component_size(component: RegTypeId) -> Option<u16> {
    match component {
        RegTypeId::BOOLEAN | RegTypeId::BYTE => Some(1),
        RegTypeId::CHAR | RegTypeId::SHORT => Some(2),
        RegTypeId::INTEGER | RegTypeId::FLOAT => Some(4),
        RegTypeId::LONG_LO | RegTypeId::DOUBLE_LO => Some(8),
        _ => None,
    }
}

impl<'a> MethodVerifier<'a> {
    /// `new-array vA, vB, type`.
    pub(super) fn verify_new_array(&mut self, vdst: u32, vsize: u32, idx: Index<TypeIdItem>) {
        let Some(res_type) = self.resolve_array_class(idx) else {
            return;
        };
        self.verify_reg(vsize, RegTypeId::INTEGER);
        self.set_reg(vdst, res_type);
    }

    /// `filled-new-array` and `filled-new-array/range`: every argument must
    /// fit the component type; the array goes to the result register.
    pub(super) fn verify_filled_new_array(&mut self, args: InvokeArgs, idx: Index<TypeIdItem>) {
        let Some(res_type) = self.resolve_array_class(idx) else {
            return;
        };
        let expected = self.cache.component_type(res_type);
        for i in 0..args.len() {
            let Some(reg) = args.reg(i) else {
                break;
            };
            self.verify_reg(reg, expected);
            if self.failures.has_pending_hard_failure() {
                return;
            }
        }
        self.work_line.set_result_register_type(res_type);
    }

    fn resolve_array_class(&mut self, idx: Index<TypeIdItem>) -> Option<RegTypeId> {
        let res_type = self.resolve_class(idx, true);
        if self.cache.get(res_type).is_conflict() {
            return None;
        }
        if !self.cache.is_array_types(res_type) {
            let msg = format!("new-array on non-array class {}", self.type_name(res_type));
            self.fail_hard(msg);
            return None;
        }
        Some(res_type)
    }

    /// `aget*`: the loaded value takes the component type of the array when
    /// it is known, a type inferred from the instruction otherwise.
    pub(super) fn verify_aget(&mut self, mem: MemType, vdst: u32, varray: u32, vindex: u32) {
        let insn_type = mem.insn_type();
        let is_primitive = mem.is_primitive();
        let index_type = self.reg_type(vindex);
        if !self.cache.get(index_type).is_array_index_types() {
            let msg = format!(
                "Invalid reg type for array index ({})",
                self.type_name(index_type)
            );
            self.fail_hard(msg);
            return;
        }
        let array_type = self.reg_type(varray);
        if self.cache.get(array_type).is_zero_or_null() {
            // always throws, keep a type that merges with any outcome
            if !is_primitive {
                self.set_reg(vdst, RegTypeId::NULL);
            } else if insn_type == RegTypeId::INTEGER {
                self.set_reg(vdst, RegTypeCache::from_cat1_const(1));
            } else if self.cache.get(insn_type).is_category1_types() {
                self.set_reg(vdst, insn_type);
            } else {
                let result = self.work_line.set_register_type_wide(
                    &self.cache,
                    vdst,
                    RegTypeId::CONSTANT_LO,
                    RegTypeId::CONSTANT_HI,
                );
                self.check_line(result);
            }
            return;
        }
        if !self.cache.is_array_types(array_type) {
            let msg = format!("not array type {} with aget", self.type_name(array_type));
            self.fail_hard(msg);
            return;
        }
        if self.cache.get(array_type).is_unresolved_merged_reference() {
            let name = self.type_name(array_type);
            if is_primitive {
                self.fail_hard(format!(
                    "reference array type {name} source for category 1 aget"
                ));
            } else {
                self.fail(
                    VerifyError::NO_CLASS,
                    format!("cannot verify aget for {name} because of missing class"),
                );
                self.set_reg(vdst, RegTypeId::JAVA_LANG_OBJECT);
            }
            return;
        }

        let component = self.cache.component_type(array_type);
        let array_name = self.type_name(array_type);
        let component_type = self.cache.get(component);
        let failure = if !component_type.is_reference_types() && !is_primitive {
            Some(format!("primitive array type {array_name} source for aget-object"))
        } else if component_type.is_non_zero_reference_types() && is_primitive {
            Some(format!("reference array type {array_name} source for category 1 aget"))
        } else if is_primitive
            && insn_type != component
            && !(insn_type == RegTypeId::INTEGER && component == RegTypeId::FLOAT)
            && !(insn_type == RegTypeId::LONG_LO && component == RegTypeId::DOUBLE_LO)
        {
            Some(format!(
                "array type {array_name} incompatible with aget of type {}",
                self.type_name(insn_type)
            ))
        } else {
            None
        };
        match failure {
            Some(msg) => {
                self.fail_hard(msg);
            }
            // the array type is more precise than the instruction
            None => {
                self.set_reg_any(vdst, component);
            }
        }
    }

    /// `aput*`: the stored value must fit both the instruction and the
    /// component type of the array.
    pub(super) fn verify_aput(&mut self, mem: MemType, vsrc: u32, varray: u32, vindex: u32) {
        let insn_type = mem.insn_type();
        let is_primitive = mem.is_primitive();
        let index_type = self.reg_type(vindex);
        if !self.cache.get(index_type).is_array_index_types() {
            let msg = format!(
                "Invalid reg type for array index ({})",
                self.type_name(index_type)
            );
            self.fail_hard(msg);
            return;
        }
        let array_type = self.reg_type(varray);
        if self.cache.get(array_type).is_zero_or_null() {
            // always throws, still check the value against the instruction
            let value_type = self.reg_type(vsrc);
            let expected = match (insn_type, value_type) {
                (RegTypeId::INTEGER, RegTypeId::FLOAT) => RegTypeId::FLOAT,
                (RegTypeId::LONG_LO, RegTypeId::DOUBLE_LO) => RegTypeId::DOUBLE_LO,
                _ => insn_type,
            };
            self.verify_reg(vsrc, expected);
            return;
        }
        if !self.cache.is_array_types(array_type) {
            let msg = format!("not array type {} with aput", self.type_name(array_type));
            self.fail_hard(msg);
            return;
        }
        if self.cache.get(array_type).is_unresolved_merged_reference() {
            let name = self.type_name(array_type);
            if is_primitive {
                let msg = format!(
                    "aput insn has type '{}' but unresolved type '{name}'",
                    self.type_name(insn_type)
                );
                self.fail_hard(msg);
            } else {
                self.fail(
                    VerifyError::NO_CLASS,
                    format!("cannot verify aput for {name} because of missing class"),
                );
            }
            return;
        }

        let component = self.cache.component_type(array_type);
        if is_primitive {
            let component_type = self.cache.get(component);
            // no put-float or put-double, those use the int and long forms
            let instruction_compatible = if component_type.is_integral_types() {
                component == insn_type
            } else if component == RegTypeId::FLOAT {
                insn_type == RegTypeId::INTEGER
            } else if component == RegTypeId::LONG_LO || component == RegTypeId::DOUBLE_LO {
                insn_type == RegTypeId::LONG_LO
            } else {
                false
            };
            if !instruction_compatible {
                let msg = format!(
                    "aput insn has type '{}' but expected type '{}'",
                    self.type_name(insn_type),
                    self.type_name(component)
                );
                self.fail_hard(msg);
                return;
            }
            self.verify_primitive_put(component, vsrc);
        } else if !self.cache.get(component).is_reference_types() {
            let msg = format!(
                "primitive array type {} source for aput-object",
                self.type_name(array_type)
            );
            self.fail_hard(msg);
        } else {
            // store exceptions are left to the runtime
            self.verify_reg(vsrc, insn_type);
        }
    }

    /// `fill-array-data`: the element width of the payload must match the
    /// primitive component type of the array.
    pub(super) fn verify_fill_array_data(&mut self, varray: u32, offset: i32) {
        let array_type = self.reg_type(varray);
        if self.cache.get(array_type).is_zero_or_null() {
            return;
        }
        if !self.cache.is_array_types(array_type) {
            let msg = format!(
                "invalid fill-array-data with array type {}",
                self.type_name(array_type)
            );
            self.fail_hard(msg);
            return;
        }
        if self.cache.get(array_type).is_unresolved_types() {
            let msg = format!(
                "invalid fill-array-data for array of type {}",
                self.type_name(array_type)
            );
            self.fail_hard(msg);
            return;
        }
        let component = self.cache.component_type(array_type);
        if self.cache.get(component).is_non_zero_reference_types() {
            let msg = format!(
                "invalid fill-array-data with component type {}",
                self.type_name(component)
            );
            self.fail_hard(msg);
            return;
        }
        let payload = self
            .absolute_target(self.work_pc, offset)
            .and_then(|table| self.insn_at(table));
        let Some(Instr::FillArrayDataPayload(width, _)) = payload else {
            self.fail_hard("invalid magic for array-data");
            return;
        };
        let width = *width;
        let elem_width = component_size(component).unwrap_or(0);
        if width != elem_width {
            self.fail_hard(format!(
                "array-data size mismatch ({width} vs {elem_width})"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_widths() {
        assert_eq!(component_size(RegTypeId::BOOLEAN), Some(1));
        assert_eq!(component_size(RegTypeId::CHAR), Some(2));
        assert_eq!(component_size(RegTypeId::FLOAT), Some(4));
        assert_eq!(component_size(RegTypeId::DOUBLE_LO), Some(8));
        assert_eq!(component_size(RegTypeId::JAVA_LANG_OBJECT), None);
    }
}
