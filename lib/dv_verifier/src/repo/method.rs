use crate::repo::{ClassUid, MethodUid};
use dv_dex::methods::MethodFlags;
use dv_dex::types::pretty_descriptor;
use std::fmt;

/// A method declared by a class of the class path.
#[derive(Debug, Clone)]
pub struct Method {
    // Unique identifier in the repository
    uid: MethodUid,
    // Declaring class
    class: ClassUid,
    class_descriptor: String,
    name: String,
    // Prototype in descriptor form, as '(IJ)V'
    signature: String,
    flags: MethodFlags,
}

/// Pretty form of a method, `int Foo.bar(long, java.lang.String)`.
impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (params, ret) = split_signature(&self.signature);
        write!(
            f,
            "{} {}.{}(",
            pretty_descriptor(ret),
            pretty_descriptor(&self.class_descriptor),
            self.name
        )?;
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", pretty_descriptor(param))?;
        }
        write!(f, ")")
    }
}

impl Method {
    pub(crate) fn new(
        uid: MethodUid,
        class: ClassUid,
        class_descriptor: &str,
        name: &str,
        signature: &str,
        flags: MethodFlags,
    ) -> Self {
        Self {
            uid,
            class,
            class_descriptor: class_descriptor.to_string(),
            name: name.to_string(),
            signature: signature.to_string(),
            flags,
        }
    }

    #[inline]
    #[must_use]
    pub const fn uid(&self) -> MethodUid {
        self.uid
    }

    #[inline]
    #[must_use]
    pub const fn class(&self) -> ClassUid {
        self.class
    }

    #[inline]
    #[must_use]
    pub fn class_descriptor(&self) -> &str {
        &self.class_descriptor
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> MethodFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_PUBLIC)
    }

    #[inline]
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_PRIVATE)
    }

    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_STATIC)
    }

    #[inline]
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_NATIVE)
    }

    #[inline]
    #[must_use]
    pub fn is_varargs(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_VARARGS)
    }

    #[inline]
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.flags.contains(MethodFlags::ACC_CONSTRUCTOR)
            || self.name == "<init>"
            || self.name == "<clinit>"
    }

    #[inline]
    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        self.is_constructor() && self.name == "<clinit>"
    }

    /// Static, private and constructor methods are not dispatched.
    #[inline]
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.is_static() || self.is_private() || self.is_constructor()
    }

    /// Native varargs methods of `MethodHandle` and `VarHandle`.
    #[inline]
    #[must_use]
    pub fn is_signature_polymorphic(&self) -> bool {
        self.is_native() && self.is_varargs()
    }
}

/// Splits a `(params)ret` prototype descriptor into its parameters and return descriptors.
#[must_use]
pub fn split_signature(signature: &str) -> (Vec<&str>, &str) {
    let Some(rest) = signature.strip_prefix('(') else {
        return (Vec::new(), signature);
    };
    let Some(close) = rest.find(')') else {
        return (Vec::new(), signature);
    };
    let (mut params_str, ret) = (&rest[..close], &rest[close + 1..]);
    let mut params = Vec::new();
    while !params_str.is_empty() {
        let dims = params_str.len() - params_str.trim_start_matches('[').len();
        let len = match params_str.as_bytes().get(dims) {
            Some(b'L') => params_str[dims..].find(';').map_or(params_str.len(), |p| dims + p + 1),
            Some(_) => dims + 1,
            None => params_str.len(),
        };
        params.push(&params_str[..len]);
        params_str = &params_str[len..];
    }
    (params, ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures() {
        let (params, ret) = split_signature("(I[[JLjava/lang/String;[Lfoo/Bar;Z)V");
        assert_eq!(params, vec!["I", "[[J", "Ljava/lang/String;", "[Lfoo/Bar;", "Z"]);
        assert_eq!(ret, "V");
        let (params, ret) = split_signature("()Ljava/lang/Object;");
        assert!(params.is_empty());
        assert_eq!(ret, "Ljava/lang/Object;");
    }
}
