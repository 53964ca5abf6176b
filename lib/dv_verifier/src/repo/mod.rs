//! The class path used to resolve types, methods and fields referenced by
//! the verified code: classes of application and system dex models, and
//! the built-in core classes.

mod builtins;
mod class;
mod field;
mod method;
mod repository;
mod uids;

pub use class::{package_name, Class};
pub use field::Field;
pub use method::{split_signature, Method};
pub use repository::Repo;
pub use uids::{ClassUid, FieldUid, MethodUid, RepoCounters};

use dv_dex::fields::FieldFlags;
use dv_dex::methods::MethodFlags;

pub const JAVA_LANG_OBJECT: &str = "Ljava/lang/Object;";
pub const JAVA_LANG_STRING: &str = "Ljava/lang/String;";
pub const JAVA_LANG_CLASS: &str = "Ljava/lang/Class;";
pub const JAVA_LANG_THROWABLE: &str = "Ljava/lang/Throwable;";
pub const JAVA_LANG_CLONEABLE: &str = "Ljava/lang/Cloneable;";
pub const JAVA_IO_SERIALIZABLE: &str = "Ljava/io/Serializable;";
pub const METHOD_HANDLE: &str = "Ljava/lang/invoke/MethodHandle;";
pub const METHOD_TYPE: &str = "Ljava/lang/invoke/MethodType;";
pub const VAR_HANDLE: &str = "Ljava/lang/invoke/VarHandle;";

/// Member visibility, as used by access checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Package,
    Private,
}

impl From<MethodFlags> for Visibility {
    fn from(flags: MethodFlags) -> Self {
        if flags.contains(MethodFlags::ACC_PUBLIC) {
            Self::Public
        } else if flags.contains(MethodFlags::ACC_PRIVATE) {
            Self::Private
        } else if flags.contains(MethodFlags::ACC_PROTECTED) {
            Self::Protected
        } else {
            Self::Package
        }
    }
}

impl From<FieldFlags> for Visibility {
    fn from(flags: FieldFlags) -> Self {
        if flags.contains(FieldFlags::ACC_PUBLIC) {
            Self::Public
        } else if flags.contains(FieldFlags::ACC_PRIVATE) {
            Self::Private
        } else if flags.contains(FieldFlags::ACC_PROTECTED) {
            Self::Protected
        } else {
            Self::Package
        }
    }
}

/// Return descriptor of a signature polymorphic method of `MethodHandle`
/// or `VarHandle`, `None` for other methods.
pub(crate) fn polymorphic_return_descriptor(class: &str, name: &str) -> Option<&'static str> {
    match class {
        METHOD_HANDLE => builtins::METHOD_HANDLE_INVOKERS
            .contains(&name)
            .then_some(JAVA_LANG_OBJECT),
        VAR_HANDLE => builtins::VAR_HANDLE_ACCESS_MODES
            .iter()
            .find(|(mode, _)| *mode == name)
            .map(|(_, ret)| *ret),
        _ => None,
    }
}
