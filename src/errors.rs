//! Global error handling.
//!
//! Each sub-crate of the project defines its own type error.
//! Their types can be unified, for example in a main function,
//! when winding results at the top-level.
//!
//! ```rust,no_run
//! use dexverify::prelude::*;
//! use dexverify::dex;
//!
//! fn main() -> DvResult<()> { // can return a DvError
//!    let _dex = dex::open("app.json")?; // can return a DexError
//!    Ok(())
//! }
//! ```

use dv_dex::errors::DexError;
use dv_verifier::errors::VerifierError;
use std::io;
use thiserror::Error;

/// An alias for result that can be a [`DvError`].
pub type DvResult<T> = Result<T, DvError>;

/// The main error type for error winding at the top-level.
/// It mainly consists of transparent wrapper over error types that
/// are defined in dependencies.
#[derive(Debug, Error)]
pub enum DvError {
    /// Custom error for reporting bad command line arguments usage.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// Error that can be returned from [I/O operations](std::io).
    #[error(transparent)]
    IO(#[from] io::Error),

    /// Error that can be returned from regex compilation.
    #[error(transparent)]
    Regex(#[from] regex::Error),

    /// Error that can be returned when reading input models.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error that can be returned from [`dv_verifier`] functions.
    #[error(transparent)]
    Verifier(#[from] VerifierError),

    /// Error that can be returned from [`dv_dex`] functions.
    #[error(transparent)]
    Dex(#[from] DexError),
}
