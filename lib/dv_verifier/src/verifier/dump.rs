//! Diagnostic listing of a verified method: the register types met, then
//! every instruction with its flags and the register line on entry.

use super::{MethodVerification, MethodVerifier, RegisterTracking, VerifyOptions};
use crate::errors::VerifierResult;
use crate::repo::Repo;
use dv_dex::classes::ClassDefItem;
use dv_dex::methods::EncodedMethod;
use dv_dex::{Dex, PrettyPrinter};
use std::fmt::Write;

impl<'a> MethodVerifier<'a> {
    fn dump(&self) -> String {
        let mut out = String::new();
        if self.code().is_none() {
            out.push_str("Native method\n");
            return out;
        }
        out.push_str("Register Types:\n");
        for line in self.cache.dump().lines() {
            let _ = writeln!(out, "  {line}");
        }
        out.push_str("Dumping instructions and register lines:\n");
        for pc in self.insn_flags.iter_opcodes() {
            if let Some(Some(line)) = self.saved_lines.get(pc as usize) {
                let _ = writeln!(out, "  {}", line.dump(&self.cache));
            }
            let flags = self.insn_flags.get(pc);
            match self.insn_at(pc) {
                Some(instr) => {
                    let _ = writeln!(out, "  0x{pc:04x}: {flags} {}", PrettyPrinter(instr, self.dex));
                }
                None => {
                    let _ = writeln!(out, "  0x{pc:04x}: {flags} ?");
                }
            }
        }
        out
    }
}

/// Verifies a method keeping the register line of every instruction, and
/// returns the outcome with the listing of the analysis.
pub fn dump_method(
    repo: &Repo,
    dex: &Dex,
    class_def: &ClassDefItem,
    method: &EncodedMethod,
    options: &VerifyOptions,
) -> VerifierResult<(MethodVerification, String)> {
    let mut verifier = MethodVerifier::new(repo, dex, class_def, method, *options)?
        .with_tracking(RegisterTracking::All);
    verifier.verify();
    let listing = verifier.dump();
    Ok((verifier.into_verification(), listing))
}
