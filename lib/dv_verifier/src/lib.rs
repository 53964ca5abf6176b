//! This crate provides the Dalvik bytecode verifier of the `dexverify`
//! project: a type-inferring abstract interpretation of method bodies, as
//! the Android runtime performs before running them.
//!
//! Classes are looked up in a [`repo::Repo`] filled from one or more dex
//! models. Methods are verified one at a time with
//! [`verifier::verify_method`], or a whole class definition at once with
//! [`class_verifier::verify_class`].

pub mod class_verifier;
pub mod errors;
pub mod failures;
pub mod hierarchy;
pub mod insn_flags;
pub mod reg_types;
pub mod register_line;
pub mod repo;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use class_verifier::{verify_class, ClassVerification};
pub use verifier::{
    dump_method, find_locks_at_dex_pc, find_method, verify_method, LockInfo, MethodVerification,
    VerifyOptions,
};
