//! Verification of all the methods of a class definition.

use crate::errors::VerifierResult;
use crate::failures::{Failure, FailureData, FailureKind, VerifyError};
use crate::repo::Repo;
use crate::verifier::{verify_method, MethodVerification, VerifyOptions};
use dv_dex::classes::ClassDefItem;
use dv_dex::Dex;
use serde::Serialize;
use std::collections::BTreeSet;

/// Result of a class verification.
#[derive(Debug, Clone, Serialize)]
pub struct ClassVerification {
    pub class: String,
    /// Merged outcome of the class-level checks and of every method.
    pub data: FailureData,
    /// Failures that are not attached to a method body.
    pub failures: Vec<Failure>,
    pub methods: Vec<MethodVerification>,
}

impl ClassVerification {
    #[must_use]
    pub fn is_hard_failure(&self) -> bool {
        self.data.kind == FailureKind::HardFailure
    }

    /// Every failure message, class-level ones first.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.failures
            .iter()
            .chain(self.methods.iter().flat_map(|m| m.failures.iter()))
            .map(|f| f.message.as_str())
    }
}

/// Verifies the direct methods, then the virtual methods, of a class.
pub fn verify_class(
    repo: &Repo,
    dex: &Dex,
    class_def: &ClassDefItem,
    options: &VerifyOptions,
) -> VerifierResult<ClassVerification> {
    let class = class_def.descriptor(dex)?.to_string();
    let mut verification = ClassVerification {
        class,
        data: FailureData::default(),
        failures: Vec::new(),
        methods: Vec::new(),
    };
    let mut seen = BTreeSet::new();
    for method in class_def.methods() {
        if !seen.insert(method.method_idx()) {
            let message = format!(
                "{}: duplicate definition of method index {}",
                verification.class,
                method.method_idx()
            );
            if options.log_hard_failures {
                log::warn!("{message}");
            }
            verification.failures.push(Failure {
                kind: VerifyError::BAD_CLASS_HARD,
                message,
            });
            verification.data.merge(&FailureData {
                kind: FailureKind::HardFailure,
                types: VerifyError::BAD_CLASS_HARD,
            });
            continue;
        }
        let result = verify_method(repo, dex, class_def, method, options)?;
        verification.data.merge(&result.data);
        verification.methods.push(result);
    }
    log::debug!(
        "{}: {} ({} methods)",
        verification.class,
        verification.data.kind,
        verification.methods.len()
    );
    Ok(verification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestDex, TEST_CLASS};
    use dv_dex::code::CodeItem;
    use dv_dex::instrs::Instr;
    use dv_dex::methods::MethodFlags;
    use dv_dex::registers::Reg;

    fn test_class(dex: &Dex) -> &ClassDefItem {
        dex.iter_class_defs()
            .find(|def| def.descriptor(dex).unwrap() == TEST_CLASS)
            .unwrap()
    }

    #[test]
    fn merges_method_outcomes() {
        let mut t = TestDex::new();
        let flags = MethodFlags::ACC_PUBLIC | MethodFlags::ACC_STATIC;
        t.method("ok", "V", &[], flags, 0, &[Instr::ReturnVoid]);
        t.method(
            "bad",
            "I",
            &[],
            flags,
            1,
            &[Instr::ConstWide16(Reg::from(0u8), 0), Instr::ReturnVoid],
        );
        let (repo, dex) = t.build();
        let verification =
            verify_class(&repo, &dex, test_class(&dex), &VerifyOptions::default()).unwrap();
        assert_eq!(verification.class, TEST_CLASS);
        assert_eq!(verification.methods.len(), 2);
        assert!(verification.is_hard_failure());
        assert!(verification.methods.iter().any(|m| m.is_verified()));
        assert!(verification.messages().count() >= 1);
    }

    #[test]
    fn duplicate_method_index() {
        let mut t = TestDex::new();
        let flags = MethodFlags::ACC_PUBLIC | MethodFlags::ACC_STATIC;
        let idx = t.method("twice", "V", &[], flags, 0, &[Instr::ReturnVoid]);
        t.builder().add_method(
            0,
            idx,
            flags,
            Some(CodeItem::new(0, 0, 0, vec![0x000e])),
        );
        let (repo, dex) = t.build();
        let verification =
            verify_class(&repo, &dex, test_class(&dex), &VerifyOptions::default()).unwrap();
        assert!(verification.is_hard_failure());
        assert_eq!(verification.methods.len(), 1);
        assert!(verification.failures[0].message.contains("duplicate definition"));
    }
}
