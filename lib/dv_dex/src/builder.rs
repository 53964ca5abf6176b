//! In-memory construction of [`Dex`] models.
//!
//! Table entries are interned: asking twice for the same string, type,
//! prototype, field or method returns the same index.

use crate::classes::{ClassDefItem, ClassFlags};
use crate::code::{CallSiteIdItem, CodeItem, EncodedValue, MethodHandleItem, MethodHandleType};
use crate::fields::{EncodedField, FieldFlags, FieldIdItem};
use crate::methods::{EncodedMethod, MethodFlags, MethodIdItem};
use crate::strings::StringIdItem;
use crate::types::{ProtoIdItem, TypeIdItem};
use crate::{Dex, Index};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct DexBuilder {
    dex: Dex,
    strings: HashMap<String, Index<StringIdItem>>,
    types: HashMap<Index<StringIdItem>, Index<TypeIdItem>>,
    protos: HashMap<(Index<TypeIdItem>, Vec<Index<TypeIdItem>>), Index<ProtoIdItem>>,
    fields: HashMap<(Index<TypeIdItem>, Index<StringIdItem>, Index<TypeIdItem>), Index<FieldIdItem>>,
    methods:
        HashMap<(Index<TypeIdItem>, Index<StringIdItem>, Index<ProtoIdItem>), Index<MethodIdItem>>,
}

fn next_index<T, U>(table: &[U]) -> Index<T> {
    Index::new(table.len() as u32)
}

impl DexBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string(&mut self, s: &str) -> Index<StringIdItem> {
        if let Some(idx) = self.strings.get(s) {
            return *idx;
        }
        let idx = next_index(&self.dex.strings);
        self.dex.strings.push(StringIdItem::from(s));
        self.strings.insert(s.to_string(), idx);
        idx
    }

    /// Interns a type from its descriptor. The descriptor is not validated so
    /// that malformed models can be built.
    pub fn type_(&mut self, descriptor: &str) -> Index<TypeIdItem> {
        let descriptor_idx = self.string(descriptor);
        if let Some(idx) = self.types.get(&descriptor_idx) {
            return *idx;
        }
        let idx = next_index(&self.dex.types);
        self.dex.types.push(TypeIdItem { descriptor_idx });
        self.types.insert(descriptor_idx, idx);
        idx
    }

    pub fn proto(&mut self, ret: &str, params: &[&str]) -> Index<ProtoIdItem> {
        let return_type_idx = self.type_(ret);
        let parameters: Vec<_> = params.iter().map(|p| self.type_(p)).collect();
        let key = (return_type_idx, parameters);
        if let Some(idx) = self.protos.get(&key) {
            return *idx;
        }
        let idx = next_index(&self.dex.protos);
        self.dex.protos.push(ProtoIdItem {
            return_type_idx,
            parameters: key.1.clone(),
        });
        self.protos.insert(key, idx);
        idx
    }

    pub fn field(&mut self, class: &str, name: &str, type_: &str) -> Index<FieldIdItem> {
        let class_idx = self.type_(class);
        let name_idx = self.string(name);
        let type_idx = self.type_(type_);
        *self
            .fields
            .entry((class_idx, name_idx, type_idx))
            .or_insert_with(|| {
                let idx = next_index(&self.dex.fields);
                self.dex.fields.push(FieldIdItem {
                    class_idx,
                    type_idx,
                    name_idx,
                });
                idx
            })
    }

    pub fn method(
        &mut self,
        class: &str,
        name: &str,
        ret: &str,
        params: &[&str],
    ) -> Index<MethodIdItem> {
        let class_idx = self.type_(class);
        let name_idx = self.string(name);
        let proto_idx = self.proto(ret, params);
        *self
            .methods
            .entry((class_idx, name_idx, proto_idx))
            .or_insert_with(|| {
                let idx = next_index(&self.dex.methods);
                self.dex.methods.push(MethodIdItem {
                    class_idx,
                    proto_idx,
                    name_idx,
                });
                idx
            })
    }

    pub fn method_handle(&mut self, kind: MethodHandleType, target: u32) -> Index<MethodHandleItem> {
        let idx = next_index(&self.dex.method_handles);
        self.dex
            .method_handles
            .push(MethodHandleItem::new(kind, target));
        idx
    }

    pub fn call_site(&mut self, arguments: Vec<EncodedValue>) -> Index<CallSiteIdItem> {
        let idx = next_index(&self.dex.call_sites);
        self.dex.call_sites.push(CallSiteIdItem::new(arguments));
        idx
    }

    /// Defines a class and returns its position in the class definitions table.
    pub fn class(
        &mut self,
        descriptor: &str,
        access_flags: ClassFlags,
        superclass: Option<&str>,
        interfaces: &[&str],
    ) -> usize {
        let class_idx = self.type_(descriptor);
        let superclass_idx = superclass.map(|s| self.type_(s));
        let interfaces = interfaces.iter().map(|i| self.type_(i)).collect();
        self.dex.classes.push(ClassDefItem {
            class_idx,
            access_flags,
            superclass_idx,
            interfaces,
            static_fields: Vec::new(),
            instance_fields: Vec::new(),
            direct_methods: Vec::new(),
            virtual_methods: Vec::new(),
        });
        self.dex.classes.len() - 1
    }

    /// Adds a field definition to a class, as static or instance field depending on the flags.
    pub fn add_field(&mut self, class: usize, field_idx: Index<FieldIdItem>, flags: FieldFlags) {
        if let Some(def) = self.dex.classes.get_mut(class) {
            let field = EncodedField::new(field_idx, flags);
            if flags.contains(FieldFlags::ACC_STATIC) {
                def.static_fields.push(field);
            } else {
                def.instance_fields.push(field);
            }
        }
    }

    /// Adds a method definition to a class. Static, private and constructor
    /// methods are direct methods, others are virtual.
    pub fn add_method(
        &mut self,
        class: usize,
        method_idx: Index<MethodIdItem>,
        flags: MethodFlags,
        code: Option<CodeItem>,
    ) {
        if let Some(def) = self.dex.classes.get_mut(class) {
            let method = EncodedMethod::new(method_idx, flags, code);
            let direct = MethodFlags::ACC_STATIC | MethodFlags::ACC_PRIVATE | MethodFlags::ACC_CONSTRUCTOR;
            if flags.intersects(direct) {
                def.direct_methods.push(method);
            } else {
                def.virtual_methods.push(method);
            }
        }
    }

    #[must_use]
    pub fn build(self) -> Dex {
        self.dex
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DexIndex;

    #[test]
    fn interning() {
        let mut builder = DexBuilder::new();
        let a = builder.method("LFoo;", "bar", "V", &["I"]);
        let b = builder.method("LFoo;", "bar", "V", &["I"]);
        let c = builder.method("LFoo;", "bar", "V", &["J"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(builder.type_("I"), builder.type_("I"));
        let dex = builder.build();
        assert_eq!(dex.nb_methods(), 2);
        assert_eq!(dex.nb_protos(), 2);
    }

    #[test]
    fn class_members() {
        let mut builder = DexBuilder::new();
        let class = builder.class(
            "LFoo;",
            ClassFlags::ACC_PUBLIC,
            Some("Ljava/lang/Object;"),
            &["Ljava/lang/Runnable;"],
        );
        let f = builder.field("LFoo;", "count", "I");
        builder.add_field(class, f, FieldFlags::ACC_STATIC);
        let init = builder.method("LFoo;", "<init>", "V", &[]);
        builder.add_method(class, init, MethodFlags::ACC_CONSTRUCTOR, None);
        let run = builder.method("LFoo;", "run", "V", &[]);
        builder.add_method(class, run, MethodFlags::ACC_PUBLIC, None);
        let dex = builder.build();

        let def = dex.iter_class_defs().next().unwrap();
        assert_eq!(def.descriptor(&dex).unwrap(), "LFoo;");
        assert_eq!(def.superclass(&dex).unwrap(), Some("Ljava/lang/Object;"));
        assert_eq!(def.interfaces(&dex).unwrap(), vec!["Ljava/lang/Runnable;"]);
        assert_eq!(def.static_fields().count(), 1);
        assert_eq!(def.direct_methods().count(), 1);
        assert_eq!(def.virtual_methods().count(), 1);
        assert_eq!(
            run.get(&dex).unwrap().signature(&dex).unwrap(),
            "()V"
        );
    }
}
