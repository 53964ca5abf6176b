use super::*;
use crate::testing::{has_failure_containing, verify, TestDex, TEST_CLASS};
use dv_dex::code::{CatchHandler, TryItem};
use dv_dex::fields::FieldFlags;
use dv_dex::registers::{Reg, RegList};

fn v(i: u8) -> Reg {
    Reg::from(i)
}

fn static_flags() -> MethodFlags {
    MethodFlags::ACC_PUBLIC | MethodFlags::ACC_STATIC
}

fn listing(repo: &Repo, dex: &Dex, method: &str) -> (MethodVerification, String) {
    let (class_def, encoded) = find_method(dex, TEST_CLASS, method).unwrap();
    dump_method(repo, dex, class_def, encoded, &VerifyOptions::default()).unwrap()
}

#[test]
fn loop_reaches_fixed_point() {
    let mut t = TestDex::new();
    t.method(
        "count",
        "I",
        &["I"],
        static_flags(),
        3,
        &[
            Instr::Const4(v(0), 0),
            Instr::IfGe(v(0), v(2), 6),
            Instr::Const16(v(1), 1000),
            Instr::AddInt2addr(v(0), v(1)),
            Instr::Goto(-5),
            Instr::Return(v(0)),
        ],
    );
    let (repo, dex) = t.build();
    let (verification, dump) = listing(&repo, &dex, "count");
    assert!(verification.is_verified(), "{:?}", verification.failures);
    // zero at entry joined with the sum of the back edge
    assert!(dump.contains("0:[Integer],1:[Conflict],2:[Integer],"), "{dump}");
}

#[test]
fn constructor_initializing_this() {
    let mut t = TestDex::new();
    let object_init = t.builder().method(JAVA_LANG_OBJECT, "<init>", "V", &[]);
    t.method(
        "<init>",
        "V",
        &[],
        MethodFlags::ACC_PUBLIC | MethodFlags::ACC_CONSTRUCTOR,
        1,
        &[
            Instr::InvokeDirect(RegList::from(vec![0u8]), object_init),
            Instr::ReturnVoid,
        ],
    );
    let (repo, dex) = t.build();
    let verification = verify(&repo, &dex, "<init>");
    assert!(verification.is_verified(), "{:?}", verification.failures);
}

#[test]
fn constructor_using_uninitialized_this() {
    let mut t = TestDex::new();
    let object_init = t.builder().method(JAVA_LANG_OBJECT, "<init>", "V", &[]);
    let hash_code = t.builder().method(JAVA_LANG_OBJECT, "hashCode", "I", &[]);
    t.method(
        "<init>",
        "V",
        &[],
        MethodFlags::ACC_PUBLIC | MethodFlags::ACC_CONSTRUCTOR,
        1,
        &[
            Instr::InvokeVirtual(RegList::from(vec![0u8]), hash_code),
            Instr::InvokeDirect(RegList::from(vec![0u8]), object_init),
            Instr::ReturnVoid,
        ],
    );
    let (repo, dex) = t.build();
    let verification = verify(&repo, &dex, "<init>");
    assert!(verification.is_hard_failure());
    assert!(has_failure_containing(&verification, "'this' arg must be initialized"));
}

#[test]
fn constructor_returning_uninitialized() {
    let mut t = TestDex::new();
    t.method(
        "<init>",
        "V",
        &[],
        MethodFlags::ACC_PUBLIC | MethodFlags::ACC_CONSTRUCTOR,
        1,
        &[Instr::ReturnVoid],
    );
    let (repo, dex) = t.build();
    let verification = verify(&repo, &dex, "<init>");
    assert!(verification.is_hard_failure());
    assert!(has_failure_containing(
        &verification,
        "Constructor returning without calling superclass constructor"
    ));
}

#[test]
fn handler_sees_line_before_throwing_instruction() {
    let mut t = TestDex::new();
    let f = t.field("f", "I", FieldFlags::ACC_PRIVATE);
    t.method_with_tries(
        "get",
        "I",
        &[],
        MethodFlags::ACC_PUBLIC,
        3,
        &[
            Instr::MoveObject(v(1), v(2)),
            Instr::Iget(v(1), v(1), f),
            Instr::Return(v(1)),
            Instr::MoveException(v(0)),
            Instr::Iget(v(0), v(1), f),
            Instr::Return(v(0)),
        ],
        vec![TryItem::new(1, 2, CatchHandler::new(Vec::new(), Some(4)))],
    );
    let (repo, dex) = t.build();
    let (verification, dump) = listing(&repo, &dex, "get");
    assert!(verification.is_verified(), "{:?}", verification.failures);
    // only the returned value survives at the return
    assert!(dump.contains("0:[Conflict],1:[Integer],2:[Conflict],"), "{dump}");
    // handler entry keeps the object
    assert!(
        dump.contains("0:[Undefined],1:[Reference: test.Foo],2:[Reference: test.Foo],"),
        "{dump}"
    );
}

#[test]
fn return_narrowing() {
    let mut t = TestDex::new();
    t.method(
        "byteAsBoolean",
        "Z",
        &[],
        static_flags(),
        1,
        &[
            Instr::Const4(v(0), 1),
            Instr::IntToByte(v(0), v(0)),
            Instr::Return(v(0)),
        ],
    );
    t.method("intAsShort", "S", &["I"], static_flags(), 1, &[Instr::Return(v(0))]);
    t.method(
        "longAsBoolean",
        "Z",
        &[],
        static_flags(),
        2,
        &[Instr::ConstWide16(v(0), 1), Instr::Return(v(0))],
    );
    let (repo, dex) = t.build();

    let verification = verify(&repo, &dex, "byteAsBoolean");
    assert!(verification.is_verified(), "{:?}", verification.failures);
    let verification = verify(&repo, &dex, "intAsShort");
    assert!(verification.is_verified(), "{:?}", verification.failures);
    let verification = verify(&repo, &dex, "longAsBoolean");
    assert!(verification.is_hard_failure());
    assert!(has_failure_containing(&verification, "return-1nr on invalid register v0"));
}

#[test]
fn constant_return_narrowing() {
    let mut t = TestDex::new();
    let constants = [
        ("oneAsBoolean", "Z", Instr::Const4(v(0), 1)),
        ("minusOneAsBoolean", "Z", Instr::Const4(v(0), -1)),
        ("letterAsShort", "S", Instr::Const16(v(0), 0x61)),
        ("largeCharAsShort", "S", Instr::Const(v(0), 0xffff)),
        ("largeCharAsChar", "C", Instr::Const(v(0), 0xffff)),
    ];
    for (name, ret, load) in &constants {
        t.method(name, ret, &[], static_flags(), 1, &[load.clone(), Instr::Return(v(0))]);
    }
    let (repo, dex) = t.build();

    for name in ["oneAsBoolean", "letterAsShort", "largeCharAsChar"] {
        let verification = verify(&repo, &dex, name);
        assert!(verification.is_verified(), "{name}: {:?}", verification.failures);
    }
    let verification = verify(&repo, &dex, "minusOneAsBoolean");
    assert!(verification.is_hard_failure());
    assert!(has_failure_containing(
        &verification,
        "register v0 has type Byte Constant but expected Boolean"
    ));
    assert!(has_failure_containing(&verification, "return-1nr on invalid register v0"));
    let verification = verify(&repo, &dex, "largeCharAsShort");
    assert!(verification.is_hard_failure());
    assert!(has_failure_containing(&verification, "return-1nr on invalid register v0"));
}

fn checked_cast(branch_on_zero: bool) -> (Repo, Dex) {
    let mut t = TestDex::new();
    let string = t.builder().type_("Ljava/lang/String;");
    let test = if branch_on_zero {
        Instr::IfEqz(v(0), 3)
    } else {
        Instr::IfNez(v(0), 3)
    };
    t.method(
        "asString",
        "Ljava/lang/String;",
        &[JAVA_LANG_OBJECT],
        static_flags(),
        3,
        &[
            Instr::MoveObject(v(1), v(2)),
            Instr::InstanceOf(v(0), v(1), string),
            test,
            Instr::ReturnObject(v(2)),
            Instr::Const4(v(0), 0),
            Instr::ReturnObject(v(0)),
        ],
    );
    t.build()
}

#[test]
fn instance_of_narrows_tested_path() {
    // the source of the move feeding the instance-of is narrowed too
    let (repo, dex) = checked_cast(true);
    let (verification, dump) = listing(&repo, &dex, "asString");
    assert!(verification.is_verified(), "{:?}", verification.failures);
    assert!(dump.contains("2:[Reference: java.lang.String],"), "{dump}");

    let (repo, dex) = checked_cast(false);
    let verification = verify(&repo, &dex, "asString");
    assert!(verification.is_hard_failure());
    assert!(has_failure_containing(
        &verification,
        "returning 'Reference: java.lang.Object', but expected from declaration"
    ));
}

fn array_store(param: &'static str) -> (Repo, Dex) {
    let mut t = TestDex::new();
    t.method(
        "store",
        "V",
        &["[I", param],
        static_flags(),
        4,
        &[
            Instr::MoveObject(v(1), v(2)),
            Instr::Move(v(0), v(3)),
            Instr::Const4(v(2), 0),
            Instr::Aput(v(0), v(1), v(2)),
            Instr::ReturnVoid,
        ],
    );
    t.build()
}

#[test]
fn aput_float_into_int_array() {
    let (repo, dex) = array_store("F");
    let verification = verify(&repo, &dex, "store");
    assert!(verification.is_hard_failure());
    assert_eq!(verification.failures.len(), 1);
    assert!(verification.failures[0].kind.contains(VerifyError::BAD_CLASS_HARD));
}

#[test]
fn aput_int_into_int_array() {
    let (repo, dex) = array_store("I");
    let verification = verify(&repo, &dex, "store");
    assert!(verification.is_verified(), "{:?}", verification.failures);
}

#[test]
fn null_check_join() {
    let mut t = TestDex::new();
    t.method(
        "length",
        "I",
        &["[I"],
        static_flags(),
        2,
        &[
            Instr::IfNez(v(1), 4),
            Instr::Const4(v(0), 1),
            Instr::Goto(2),
            Instr::ArrayLength(v(0), v(1)),
            Instr::Return(v(0)),
        ],
    );
    let (repo, dex) = t.build();
    let (verification, dump) = listing(&repo, &dex, "length");
    assert!(verification.is_verified(), "{:?}", verification.failures);
    // non-null branch
    assert!(dump.contains("0:[Undefined],1:[Reference: int[]],"), "{dump}");
    // constant joined with the length, the array is dead at the return
    assert!(dump.contains("0:[Integer],1:[Conflict],"), "{dump}");
    assert!(dump.contains("0x0005:"), "{dump}");
}

fn synchronized(balanced: bool) -> (Repo, Dex) {
    let mut t = TestDex::new();
    let mut insns = vec![Instr::MonitorEnter(v(0))];
    if balanced {
        insns.push(Instr::MonitorExit(v(0)));
    }
    insns.push(Instr::ReturnVoid);
    t.method("sync", "V", &[JAVA_LANG_OBJECT], static_flags(), 1, &insns);
    t.build()
}

#[test]
fn unbalanced_monitor() {
    let (repo, dex) = synchronized(false);
    let verification = verify(&repo, &dex, "sync");
    assert!(verification.is_hard_failure());
    assert!(verification.data.types.contains(VerifyError::LOCKING));
    assert!(has_failure_containing(&verification, "expected empty monitor stack"));
}

#[test]
fn balanced_monitor() {
    let (repo, dex) = synchronized(true);
    let verification = verify(&repo, &dex, "sync");
    assert!(verification.is_verified(), "{:?}", verification.failures);
}

#[test]
fn locks_held() {
    let (repo, dex) = synchronized(true);
    let (class_def, encoded) = find_method(&dex, TEST_CLASS, "sync").unwrap();
    let locks = find_locks_at_dex_pc(&repo, &dex, class_def, encoded, 1).unwrap();
    assert_eq!(
        locks,
        vec![LockInfo {
            dex_pc: 0,
            dex_registers: vec![0],
        }]
    );
    let locks = find_locks_at_dex_pc(&repo, &dex, class_def, encoded, 0).unwrap();
    assert!(locks.is_empty());
    assert!(matches!(
        find_locks_at_dex_pc(&repo, &dex, class_def, encoded, 10),
        Err(VerifierError::InvalidDexPc(10))
    ));
}

#[test]
fn saved_lines_at_branch_targets_only() {
    let (repo, dex) = checked_cast(true);
    let (class_def, encoded) = find_method(&dex, TEST_CLASS, "asString").unwrap();
    let mut verifier =
        MethodVerifier::new(&repo, &dex, class_def, encoded, VerifyOptions::default())
            .unwrap()
            .with_interesting_pc(5);
    verifier.verify();
    let saved: Vec<u32> = (0..verifier.saved_lines.len() as u32)
        .filter(|pc| verifier.saved_lines[*pc as usize].is_some())
        .collect();
    assert_eq!(saved.last(), Some(&6));
    assert!(!saved.contains(&5));
    assert!(saved
        .iter()
        .all(|pc| verifier.insn_flags.get(*pc).is_branch_target()));
}

#[test]
fn method_lookup() {
    let mut t = TestDex::new();
    t.method("run", "V", &["I"], static_flags(), 1, &[Instr::ReturnVoid]);
    t.method("run", "V", &["J"], static_flags(), 2, &[Instr::ReturnVoid]);
    let (_, dex) = t.build();
    let (_, m) = find_method(&dex, TEST_CLASS, "run(J)V").unwrap();
    assert_eq!(m.code().map(|c| c.registers_size()), Some(2));
    assert!(matches!(
        find_method(&dex, TEST_CLASS, "walk"),
        Err(VerifierError::MethodNotFound(_))
    ));
    assert!(matches!(
        find_method(&dex, "Lnot/There;", "run"),
        Err(VerifierError::ClassNotFound(_))
    ));
}

#[test]
fn dump_listing() {
    let (repo, dex) = synchronized(true);
    let (verification, dump) = listing(&repo, &dex, "sync");
    assert!(verification.is_verified());
    assert!(dump.starts_with("Register Types:\n"));
    assert!(dump.contains("Dumping instructions and register lines:\n"));
    assert!(dump.contains("0x0000:"));
    assert!(dump.contains("monitor-enter"));
    // lock held on entry of monitor-exit
    assert!(dump.contains("{0},"), "{dump}");
}

#[test]
fn walking_off_the_end() {
    let mut t = TestDex::new();
    t.method("fall", "V", &[], static_flags(), 1, &[Instr::Const4(v(0), 0)]);
    let (repo, dex) = t.build();
    let verification = verify(&repo, &dex, "fall");
    assert!(verification.is_hard_failure());
}

#[test]
fn aot_mode_skips_runtime_throws() {
    assert!(VerifyOptions::default().tracks_runtime_throws());
    let aot = VerifyOptions {
        aot_mode: true,
        ..VerifyOptions::default()
    };
    assert!(!aot.tracks_runtime_throws());
    let recent = VerifyOptions {
        api_level: 33,
        ..VerifyOptions::default()
    };
    assert!(!recent.tracks_runtime_throws());
}
