//! Verifier errors definition.
//!
//! These errors are reserved to malformed requests made to the library
//! (unknown classes or methods, dex pcs outside of the code). The result
//! of a verification, successful or not, is never an error.

use dv_dex::errors::DexError;
use regex::Error as RegexError;
use thiserror::Error;

pub type VerifierResult<T> = Result<T, VerifierError>;

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("internal error: {0}")]
    Internal(String),

    #[error("dex error: {0}")]
    Dex(#[from] DexError),

    #[error("regex error: {0}")]
    Regex(#[from] RegexError),

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("the method has no implementation")]
    NoCode,

    #[error("dex pc 0x{0:x} is not the start of an instruction")]
    InvalidDexPc(u32),
}
