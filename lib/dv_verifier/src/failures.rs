//! Verification failures: kinds, per-method records and outcomes.

use bitflags::bitflags;
use serde::Serialize;
use std::fmt;

bitflags! {
    /// Kinds of verification failures. The set of kinds encountered while
    /// verifying a method drives the outcome of its verification.
    #[derive(Default)]
    pub struct VerifyError: u32 {
        /// Malformed or unsafe code, the method is rejected.
        const BAD_CLASS_HARD = 0x0001;
        const NO_CLASS = 0x0002;
        /// Type check involving an unresolved type, done again at runtime.
        const UNRESOLVED_TYPE_CHECK = 0x0004;
        const NO_METHOD = 0x0008;
        const NO_FIELD = 0x0010;
        const ACCESS_CLASS = 0x0020;
        const ACCESS_FIELD = 0x0040;
        const ACCESS_METHOD = 0x0080;
        const CLASS_CHANGE = 0x0100;
        const INSTANTIATION = 0x0200;
        const LOCKING = 0x0400;
        /// The checked interpreter throws before completing the instruction.
        const RUNTIME_THROW = 0x0800;

        /// Failures that the runtime checks when the instruction executes.
        const RUNTIME_HANDLEABLE = Self::NO_CLASS.bits
            | Self::UNRESOLVED_TYPE_CHECK.bits
            | Self::NO_METHOD.bits
            | Self::NO_FIELD.bits
            | Self::ACCESS_CLASS.bits
            | Self::ACCESS_FIELD.bits
            | Self::ACCESS_METHOD.bits
            | Self::CLASS_CHANGE.bits
            | Self::INSTANTIATION.bits
            | Self::RUNTIME_THROW.bits;
        /// Failures that make the faulty instruction throw at runtime.
        const THROWING = Self::RUNTIME_HANDLEABLE.bits
            & !Self::RUNTIME_THROW.bits
            | Self::LOCKING.bits;
    }
}

impl VerifyError {
    /// Short name, as printed in reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::BAD_CLASS_HARD => "VERIFY_ERROR_BAD_CLASS_HARD",
            Self::NO_CLASS => "VERIFY_ERROR_NO_CLASS",
            Self::UNRESOLVED_TYPE_CHECK => "VERIFY_ERROR_UNRESOLVED_TYPE_CHECK",
            Self::NO_METHOD => "VERIFY_ERROR_NO_METHOD",
            Self::NO_FIELD => "VERIFY_ERROR_NO_FIELD",
            Self::ACCESS_CLASS => "VERIFY_ERROR_ACCESS_CLASS",
            Self::ACCESS_FIELD => "VERIFY_ERROR_ACCESS_FIELD",
            Self::ACCESS_METHOD => "VERIFY_ERROR_ACCESS_METHOD",
            Self::CLASS_CHANGE => "VERIFY_ERROR_CLASS_CHANGE",
            Self::INSTANTIATION => "VERIFY_ERROR_INSTANTIATION",
            Self::LOCKING => "VERIFY_ERROR_LOCKING",
            Self::RUNTIME_THROW => "VERIFY_ERROR_RUNTIME_THROW",
            _ => "VERIFY_ERROR_MULTIPLE",
        }
    }

    /// Single kinds of the set, by increasing bit.
    pub fn iter_kinds(self) -> impl Iterator<Item = Self> {
        (0..u32::BITS)
            .map(|bit| Self::from_bits_truncate(1 << bit))
            .filter(move |kind| !kind.is_empty() && self.contains(*kind))
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = self.iter_kinds().map(Self::name).collect();
        write!(f, "{}", names.join("|"))
    }
}

impl Serialize for VerifyError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

/// Outcome of a verification, by increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FailureKind {
    NoFailure,
    /// Only access checks have to be done at runtime.
    AccessChecksFailure,
    /// Type checks involving unresolved types have to be done at runtime.
    TypeChecksFailure,
    SoftFailure,
    HardFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::NoFailure => "verified",
            Self::AccessChecksFailure => "access checks",
            Self::TypeChecksFailure => "type checks",
            Self::SoftFailure => "soft failure",
            Self::HardFailure => "hard failure",
        };
        write!(f, "{s}")
    }
}

/// Summary of a verification: its outcome and the failure kinds met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailureData {
    pub kind: FailureKind,
    pub types: VerifyError,
}

impl Default for FailureData {
    fn default() -> Self {
        Self {
            kind: FailureKind::NoFailure,
            types: VerifyError::empty(),
        }
    }
}

impl FailureData {
    /// Combines the results of several verifications (the methods of a class).
    pub fn merge(&mut self, other: &Self) {
        self.kind = self.kind.max(other.kind);
        self.types |= other.types;
    }
}

/// Handle on a failure record, to complete its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRef(usize);

/// A failure record.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub kind: VerifyError,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Ordered failure records of one method verification, with the pending
/// failure states read by the code-flow driver after each instruction.
#[derive(Debug)]
pub struct Failures {
    method: String,
    records: Vec<Failure>,
    encountered: VerifyError,
    pending_hard_failure: bool,
    pending_runtime_throw: bool,
    // runtime throws are only tracked by the runtime verifier of old API levels
    runtime_throws: bool,
}

impl Failures {
    #[must_use]
    pub fn new(method: String, runtime_throws: bool) -> Self {
        Self {
            method,
            records: Vec::new(),
            encountered: VerifyError::empty(),
            pending_hard_failure: false,
            pending_runtime_throw: false,
            runtime_throws,
        }
    }

    /// Records a failure of the given kind at a dex pc.
    pub fn fail(&mut self, kind: VerifyError, pc: u32, message: &str) -> FailureRef {
        self.encountered |= kind;
        if kind.contains(VerifyError::BAD_CLASS_HARD) {
            self.pending_hard_failure = true;
        } else if kind.intersects(VerifyError::THROWING) && self.runtime_throws {
            self.pending_runtime_throw = true;
        }
        let message = format!("{}: [0x{pc:X}] {message}", self.method);
        log::trace!("{}: {message}", kind.name());
        self.records.push(Failure { kind, message });
        FailureRef(self.records.len() - 1)
    }

    /// Records a failure kind without changing the pending states.
    pub(crate) fn note(&mut self, kind: VerifyError, pc: u32, message: &str) -> FailureRef {
        self.encountered |= kind;
        let message = format!("{}: [0x{pc:X}] {message}", self.method);
        self.records.push(Failure { kind, message });
        FailureRef(self.records.len() - 1)
    }

    pub fn append(&mut self, failure: FailureRef, text: &str) {
        if let Some(record) = self.records.get_mut(failure.0) {
            record.message.push_str(text);
        }
    }

    pub fn prepend(&mut self, failure: FailureRef, text: &str) {
        if let Some(record) = self.records.get_mut(failure.0) {
            record.message.insert_str(0, text);
        }
    }

    #[inline]
    #[must_use]
    pub fn has_pending_hard_failure(&self) -> bool {
        self.pending_hard_failure
    }

    #[inline]
    #[must_use]
    pub fn has_pending_runtime_throw(&self) -> bool {
        self.pending_runtime_throw
    }

    #[inline]
    #[must_use]
    pub fn tracks_runtime_throws(&self) -> bool {
        self.runtime_throws
    }

    pub(crate) fn clear_pending_runtime_throw(&mut self) {
        self.pending_runtime_throw = false;
    }

    #[inline]
    #[must_use]
    pub fn encountered(&self) -> VerifyError {
        self.encountered
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Failure> {
        self.records.iter()
    }

    /// Classifies the verification outcome.
    #[must_use]
    pub fn data(&self) -> FailureData {
        let kind = if self.records.is_empty() {
            FailureKind::NoFailure
        } else if self.pending_hard_failure {
            FailureKind::HardFailure
        } else if VerifyError::RUNTIME_HANDLEABLE.contains(self.encountered) {
            if self.encountered.contains(VerifyError::UNRESOLVED_TYPE_CHECK) {
                FailureKind::TypeChecksFailure
            } else {
                FailureKind::AccessChecksFailure
            }
        } else {
            FailureKind::SoftFailure
        };
        FailureData {
            kind,
            types: self.encountered,
        }
    }

    /// Handle on the most recent record.
    pub(crate) fn last(&self) -> Option<FailureRef> {
        self.records.len().checked_sub(1).map(FailureRef)
    }

    /// Message of the most recent record, without its method and pc prefix.
    pub(crate) fn last_detail(&self) -> Option<&str> {
        self.records
            .last()
            .map(|record| record.message.split_once("] ").map_or(record.message.as_str(), |(_, d)| d))
    }

    pub(crate) fn into_records(self) -> Vec<Failure> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let mut failures = Failures::new("void Foo.bar()".to_string(), true);
        let f = failures.fail(VerifyError::NO_CLASS, 0x1a, "unable to resolve");
        failures.append(f, " Lfoo/Bar;");
        failures.prepend(f, "[first] ");
        assert_eq!(
            failures.iter().next().map(|f| f.message.as_str()),
            Some("[first] void Foo.bar(): [0x1A] unable to resolve Lfoo/Bar;")
        );
        assert!(failures.has_pending_runtime_throw());
        assert!(!failures.has_pending_hard_failure());
        assert_eq!(failures.data().kind, FailureKind::AccessChecksFailure);
    }

    #[test]
    fn outcomes() {
        let mut failures = Failures::new("m".to_string(), false);
        assert_eq!(failures.data().kind, FailureKind::NoFailure);
        failures.fail(VerifyError::UNRESOLVED_TYPE_CHECK, 0, "");
        assert!(!failures.has_pending_runtime_throw());
        assert_eq!(failures.data().kind, FailureKind::TypeChecksFailure);
        failures.fail(VerifyError::LOCKING, 0, "");
        assert_eq!(failures.data().kind, FailureKind::SoftFailure);
        failures.fail(VerifyError::BAD_CLASS_HARD, 0, "");
        let data = failures.data();
        assert_eq!(data.kind, FailureKind::HardFailure);
        assert_eq!(
            format!("{}", data.types),
            "VERIFY_ERROR_BAD_CLASS_HARD|VERIFY_ERROR_UNRESOLVED_TYPE_CHECK|VERIFY_ERROR_LOCKING"
        );

        let mut merged = FailureData::default();
        merged.merge(&data);
        merged.merge(&FailureData::default());
        assert_eq!(merged, data);
    }
}
