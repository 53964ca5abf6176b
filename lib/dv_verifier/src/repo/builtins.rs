//! Core classes known without any system dex.
//!
//! The verifier relies on a few runtime classes (the root of the hierarchy,
//! strings, class objects, throwables, the interfaces implemented by
//! arrays and the invocation handles). Their definitions are reduced to the
//! members used by the bytecode shapes that the verifier reasons about.

use crate::repo::*;
use dv_dex::classes::ClassFlags;
use dv_dex::methods::MethodFlags;
use lazy_static::lazy_static;

pub(crate) struct CoreClass {
    pub(crate) descriptor: &'static str,
    pub(crate) flags: ClassFlags,
    pub(crate) superclass: Option<&'static str>,
    pub(crate) interfaces: &'static [&'static str],
    pub(crate) methods: Vec<(&'static str, &'static str, MethodFlags)>,
}

const EXCEPTION: &str = "Ljava/lang/Exception;";
const RUNTIME_EXCEPTION: &str = "Ljava/lang/RuntimeException;";
const ERROR: &str = "Ljava/lang/Error;";

const SERIALIZABLE: &[&str] = &[JAVA_IO_SERIALIZABLE];
const NO_INTERFACES: &[&str] = &[];

/// Access modes of `VarHandle` and the return descriptor of their accessor.
pub(crate) const VAR_HANDLE_ACCESS_MODES: &[(&str, &str)] = &[
    ("get", "Ljava/lang/Object;"),
    ("getVolatile", "Ljava/lang/Object;"),
    ("getAcquire", "Ljava/lang/Object;"),
    ("getOpaque", "Ljava/lang/Object;"),
    ("set", "V"),
    ("setVolatile", "V"),
    ("setRelease", "V"),
    ("setOpaque", "V"),
    ("compareAndSet", "Z"),
    ("weakCompareAndSet", "Z"),
    ("weakCompareAndSetPlain", "Z"),
    ("weakCompareAndSetAcquire", "Z"),
    ("weakCompareAndSetRelease", "Z"),
    ("compareAndExchange", "Ljava/lang/Object;"),
    ("compareAndExchangeAcquire", "Ljava/lang/Object;"),
    ("compareAndExchangeRelease", "Ljava/lang/Object;"),
    ("getAndSet", "Ljava/lang/Object;"),
    ("getAndSetAcquire", "Ljava/lang/Object;"),
    ("getAndSetRelease", "Ljava/lang/Object;"),
    ("getAndAdd", "Ljava/lang/Object;"),
    ("getAndAddAcquire", "Ljava/lang/Object;"),
    ("getAndAddRelease", "Ljava/lang/Object;"),
    ("getAndBitwiseOr", "Ljava/lang/Object;"),
    ("getAndBitwiseOrRelease", "Ljava/lang/Object;"),
    ("getAndBitwiseOrAcquire", "Ljava/lang/Object;"),
    ("getAndBitwiseAnd", "Ljava/lang/Object;"),
    ("getAndBitwiseAndRelease", "Ljava/lang/Object;"),
    ("getAndBitwiseAndAcquire", "Ljava/lang/Object;"),
    ("getAndBitwiseXor", "Ljava/lang/Object;"),
    ("getAndBitwiseXorRelease", "Ljava/lang/Object;"),
    ("getAndBitwiseXorAcquire", "Ljava/lang/Object;"),
];

/// Signature polymorphic methods of `MethodHandle`.
pub(crate) const METHOD_HANDLE_INVOKERS: &[&str] = &["invoke", "invokeExact"];

fn throwable_like(
    descriptor: &'static str,
    superclass: &'static str,
    public_ctor: MethodFlags,
) -> CoreClass {
    CoreClass {
        descriptor,
        flags: ClassFlags::ACC_PUBLIC,
        superclass: Some(superclass),
        interfaces: if superclass == JAVA_LANG_OBJECT {
            SERIALIZABLE
        } else {
            NO_INTERFACES
        },
        methods: vec![
            ("<init>", "()V", public_ctor),
            ("<init>", "(Ljava/lang/String;)V", public_ctor),
        ],
    }
}

lazy_static! {
    pub(crate) static ref CORE_CLASSES: Vec<CoreClass> = {
        let public = MethodFlags::ACC_PUBLIC;
        let public_ctor = MethodFlags::ACC_PUBLIC | MethodFlags::ACC_CONSTRUCTOR;
        let public_final = MethodFlags::ACC_PUBLIC | MethodFlags::ACC_FINAL;
        let protected = MethodFlags::ACC_PROTECTED;
        let polymorphic = MethodFlags::ACC_PUBLIC
            | MethodFlags::ACC_FINAL
            | MethodFlags::ACC_NATIVE
            | MethodFlags::ACC_VARARGS;
        let interface = ClassFlags::ACC_PUBLIC | ClassFlags::ACC_INTERFACE | ClassFlags::ACC_ABSTRACT;

        let mut throwable = throwable_like(JAVA_LANG_THROWABLE, JAVA_LANG_OBJECT, public_ctor);
        throwable
            .methods
            .push(("getMessage", "()Ljava/lang/String;", public));

        let mut var_handle_methods: Vec<_> = VAR_HANDLE_ACCESS_MODES
            .iter()
            .map(|(name, ret)| {
                let signature: &'static str = match *ret {
                    "V" => "([Ljava/lang/Object;)V",
                    "Z" => "([Ljava/lang/Object;)Z",
                    _ => "([Ljava/lang/Object;)Ljava/lang/Object;",
                };
                (*name, signature, polymorphic)
            })
            .collect();
        var_handle_methods.push(("<init>", "()V", MethodFlags::ACC_PROTECTED | MethodFlags::ACC_CONSTRUCTOR));

        vec![
            CoreClass {
                descriptor: JAVA_LANG_OBJECT,
                flags: ClassFlags::ACC_PUBLIC,
                superclass: None,
                interfaces: NO_INTERFACES,
                methods: vec![
                    ("<init>", "()V", public_ctor),
                    ("getClass", "()Ljava/lang/Class;", public_final | MethodFlags::ACC_NATIVE),
                    ("hashCode", "()I", public),
                    ("equals", "(Ljava/lang/Object;)Z", public),
                    ("toString", "()Ljava/lang/String;", public),
                    ("clone", "()Ljava/lang/Object;", protected),
                    ("finalize", "()V", protected),
                    ("notify", "()V", public_final | MethodFlags::ACC_NATIVE),
                    ("notifyAll", "()V", public_final | MethodFlags::ACC_NATIVE),
                    ("wait", "()V", public_final),
                ],
            },
            CoreClass {
                descriptor: JAVA_LANG_CLONEABLE,
                flags: interface,
                superclass: Some(JAVA_LANG_OBJECT),
                interfaces: NO_INTERFACES,
                methods: Vec::new(),
            },
            CoreClass {
                descriptor: JAVA_IO_SERIALIZABLE,
                flags: interface,
                superclass: Some(JAVA_LANG_OBJECT),
                interfaces: NO_INTERFACES,
                methods: Vec::new(),
            },
            CoreClass {
                descriptor: JAVA_LANG_STRING,
                flags: ClassFlags::ACC_PUBLIC | ClassFlags::ACC_FINAL,
                superclass: Some(JAVA_LANG_OBJECT),
                interfaces: SERIALIZABLE,
                methods: vec![
                    ("<init>", "()V", public_ctor),
                    ("length", "()I", public),
                    ("charAt", "(I)C", public),
                    ("concat", "(Ljava/lang/String;)Ljava/lang/String;", public),
                    (
                        "valueOf",
                        "(Ljava/lang/Object;)Ljava/lang/String;",
                        public | MethodFlags::ACC_STATIC,
                    ),
                ],
            },
            CoreClass {
                descriptor: JAVA_LANG_CLASS,
                flags: ClassFlags::ACC_PUBLIC | ClassFlags::ACC_FINAL,
                superclass: Some(JAVA_LANG_OBJECT),
                interfaces: SERIALIZABLE,
                methods: vec![("getName", "()Ljava/lang/String;", public)],
            },
            throwable,
            throwable_like(EXCEPTION, JAVA_LANG_THROWABLE, public_ctor),
            throwable_like(RUNTIME_EXCEPTION, EXCEPTION, public_ctor),
            throwable_like(ERROR, JAVA_LANG_THROWABLE, public_ctor),
            CoreClass {
                descriptor: METHOD_HANDLE,
                flags: ClassFlags::ACC_PUBLIC | ClassFlags::ACC_ABSTRACT,
                superclass: Some(JAVA_LANG_OBJECT),
                interfaces: NO_INTERFACES,
                methods: METHOD_HANDLE_INVOKERS
                    .iter()
                    .map(|name| (*name, "([Ljava/lang/Object;)Ljava/lang/Object;", polymorphic))
                    .chain(std::iter::once((
                        "type",
                        "()Ljava/lang/invoke/MethodType;",
                        public,
                    )))
                    .collect(),
            },
            CoreClass {
                descriptor: METHOD_TYPE,
                flags: ClassFlags::ACC_PUBLIC | ClassFlags::ACC_FINAL,
                superclass: Some(JAVA_LANG_OBJECT),
                interfaces: SERIALIZABLE,
                methods: Vec::new(),
            },
            CoreClass {
                descriptor: VAR_HANDLE,
                flags: ClassFlags::ACC_PUBLIC | ClassFlags::ACC_ABSTRACT,
                superclass: Some(JAVA_LANG_OBJECT),
                interfaces: NO_INTERFACES,
                methods: var_handle_methods,
            },
        ]
    };
}
