//! Helpers building small dex models around a single test class.

use crate::repo::{Repo, JAVA_LANG_OBJECT};
use crate::verifier::{find_method, verify_method, MethodVerification, VerifyOptions};
use dv_dex::builder::DexBuilder;
use dv_dex::classes::ClassFlags;
use dv_dex::code::{CodeItem, TryItem};
use dv_dex::fields::{FieldFlags, FieldIdItem};
use dv_dex::instrs::Instr;
use dv_dex::methods::{MethodFlags, MethodIdItem};
use dv_dex::{assemble, Dex, Index};

pub(crate) const TEST_CLASS: &str = "Ltest/Foo;";

pub(crate) struct TestDex {
    builder: DexBuilder,
    class: usize,
}

impl TestDex {
    pub(crate) fn new() -> Self {
        let mut builder = DexBuilder::new();
        let class = builder.class(TEST_CLASS, ClassFlags::ACC_PUBLIC, Some(JAVA_LANG_OBJECT), &[]);
        Self { builder, class }
    }

    /// Access to the underlying builder, to intern the ids instructions refer to.
    pub(crate) fn builder(&mut self) -> &mut DexBuilder {
        &mut self.builder
    }

    pub(crate) fn field(&mut self, name: &str, type_: &str, flags: FieldFlags) -> Index<FieldIdItem> {
        let idx = self.builder.field(TEST_CLASS, name, type_);
        self.builder.add_field(self.class, idx, flags);
        idx
    }

    /// Defines a method of the test class. The arguments take the last
    /// registers of the frame.
    pub(crate) fn method(
        &mut self,
        name: &str,
        ret: &str,
        params: &[&str],
        flags: MethodFlags,
        registers: u16,
        insns: &[Instr],
    ) -> Index<MethodIdItem> {
        self.method_with_tries(name, ret, params, flags, registers, insns, Vec::new())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn method_with_tries(
        &mut self,
        name: &str,
        ret: &str,
        params: &[&str],
        flags: MethodFlags,
        registers: u16,
        insns: &[Instr],
        tries: Vec<TryItem>,
    ) -> Index<MethodIdItem> {
        let mut ins_size: u16 = params
            .iter()
            .map(|p| if *p == "J" || *p == "D" { 2 } else { 1 })
            .sum();
        if !flags.contains(MethodFlags::ACC_STATIC) {
            ins_size += 1;
        }
        let code = CodeItem::new(registers, ins_size, registers, assemble(insns).unwrap())
            .with_tries(tries);
        let idx = self.builder.method(TEST_CLASS, name, ret, params);
        self.builder.add_method(self.class, idx, flags, Some(code));
        idx
    }

    pub(crate) fn build(self) -> (Repo, Dex) {
        let dex = self.builder.build();
        let mut repo = Repo::new();
        repo.register_dex(&dex, false).unwrap();
        repo.close_hierarchy().unwrap();
        (repo, dex)
    }
}

/// Verifies a method of the test class with the default options.
pub(crate) fn verify(repo: &Repo, dex: &Dex, method: &str) -> MethodVerification {
    let (class_def, encoded) = find_method(dex, TEST_CLASS, method).unwrap();
    verify_method(repo, dex, class_def, encoded, &VerifyOptions::default()).unwrap()
}

/// Class path with a small application hierarchy: `Base` and its two
/// subclasses `Derived` (which implements the `Api` interface) and
/// `Other`, plus `Orphan` whose superclass is missing.
pub(crate) fn base_classes_repo() -> Repo {
    let mut builder = DexBuilder::new();
    builder.class(
        "Lapp/Api;",
        ClassFlags::ACC_PUBLIC | ClassFlags::ACC_INTERFACE | ClassFlags::ACC_ABSTRACT,
        Some(JAVA_LANG_OBJECT),
        &[],
    );
    builder.class("Lapp/Base;", ClassFlags::ACC_PUBLIC, Some(JAVA_LANG_OBJECT), &[]);
    builder.class("Lapp/Derived;", ClassFlags::ACC_PUBLIC, Some("Lapp/Base;"), &["Lapp/Api;"]);
    builder.class("Lapp/Other;", ClassFlags::ACC_PUBLIC, Some("Lapp/Base;"), &[]);
    builder.class("Lapp/Orphan;", ClassFlags::ACC_PUBLIC, Some("Lmissing/Parent;"), &[]);
    let dex = builder.build();

    let mut repo = Repo::new();
    repo.register_dex(&dex, false).unwrap();
    repo.close_hierarchy().unwrap();
    repo
}

pub(crate) fn has_failure_containing(verification: &MethodVerification, text: &str) -> bool {
    verification.failures.iter().any(|f| f.message.contains(text))
}
