//! # `dexverify`
//!
//! `dexverify` is the main crate of a Dalvik bytecode verifier. It checks,
//! method by method, that bytecode is type-safe and structurally sound
//! the way the Android runtime does before executing it. The project is
//! subdivided into multiple crates, `dexverify` acts as entry point by
//! reexporting important structs and functions from those sub-crates. Most
//! of the reexport are done within the `dexverify::prelude` namespace.
//!
//! ## Library basics
//!
//! Dex files are consumed as in-memory models of their index tables and
//! code items, loaded from their JSON form:
//!
//! ```rust,no_run
//! use dexverify::prelude::*;
//! use dexverify::dex;
//!
//! let dex = dex::open("app.json")?;
//! println!("methods count: {}", dex.nb_methods());
//! # Ok::<(), DvError>(())
//! ```
//!
//! Verification needs the classes the bytecode refers to. They are stored
//! in a `Repo`, filled from the application dexes and, optionally, from
//! dexes of the platform:
//!
//! ```rust,no_run
//! use dexverify::prelude::*;
//! use dexverify::dex;
//!
//! let dex = dex::open("app.json")?;
//! let mut repository = Repo::new();
//! repository.register_dex(&dex, false)?;
//! repository.close_hierarchy()?;
//! for class_def in dex.iter_class_defs() {
//!     let result = verify_class(&repository, &dex, class_def, &VerifyOptions::default())?;
//!     println!("{}: {}", result.class, result.data.kind);
//! }
//! # Ok::<(), DvError>(())
//! ```
//!
//! ## Sub-crates
//!
//!  - [`dv_dex`] contains the dex model, the Dalvik instruction set and its
//!    decoder,
//!  - [`dv_verifier`] contains the class repository, the register type
//!    lattice and the method verifier.

mod errors;

pub mod cli;
pub mod dv_dump;
pub mod dv_locks;
pub mod dv_verify;
pub mod owndex;

pub use dv_dex as dex;
pub use dv_verifier as verifier;

/// Reexport module of commonly used structures and functions from the
/// `dexverify` sub-crates:
///
/// ```rust
/// use dexverify::prelude::*;
/// ```
pub mod prelude {
    pub use crate::errors::{DvError, DvResult};

    pub use dv_dex::{Dex, PrettyPrinter};

    pub use dv_verifier::failures::{FailureData, FailureKind, VerifyError};
    pub use dv_verifier::repo::Repo;
    pub use dv_verifier::{
        dump_method, find_locks_at_dex_pc, find_method, verify_class, verify_method,
        ClassVerification, LockInfo, MethodVerification, VerifyOptions,
    };

    use clap::ArgMatches;

    pub fn init_logger(args: &ArgMatches) {
        let env = env_logger::Env::new()
            .filter_or("DV_LOG", "info")
            .write_style("DV_LOG_STYLE");

        let mut builder = env_logger::Builder::from_env(env);
        if args.get_flag("verbose") {
            builder.filter_level(log::LevelFilter::Trace);
        } else if args.get_flag("debug") {
            builder.filter_level(log::LevelFilter::Debug);
        }
        if args.get_flag("ecslog") {
            builder.format(ecs_logger::format);
        }
        builder.init();
    }
}
