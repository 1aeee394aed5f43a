//! End-to-end engine tests
//!
//! Programs are assembled from source with `viua-asm` and executed on a
//! fresh `Cpu`. Results are observed through the exit condition and the
//! global register set (values are parked there with `tmpri`/`tmpro`
//! before returning).

use viua_asm::{assemble, CompileOptions};
use viua_engine::{Cpu, Frame, RegisterSet};

fn run_source(source: &str) -> Cpu {
    let lines: Vec<String> = source.lines().map(str::to_string).collect();
    let image = assemble(&lines, &[], &CompileOptions::default()).expect("source assembles");
    let mut cpu = Cpu::new();
    cpu.load(image);
    cpu.run();
    cpu
}

fn global_integer(cpu: &Cpu, register: usize) -> Option<i32> {
    cpu.global_registers()
        .at(register)
        .ok()
        .flatten()
        .and_then(|value| value.borrow().as_integer())
}

#[test]
fn test_add_two_integers() {
    let cpu = run_source(
        "\
.function: main
    istore 1 40
    istore 2 2
    iadd 1 2 3
    move 0 3
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
}

#[test]
fn test_catch_thrown_string() {
    let cpu = run_source(
        "\
.block: handler
    pull 1
    leave
.end
.block: body
    strstore 1 \"boom\"
    throw 1
    leave
.end
.function: main
    tryframe
    catch \"Exception\" handler
    try body
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
}

#[test]
fn test_uncaught_exception_reports_type_and_message() {
    let cpu = run_source(
        "\
.function: main
    strstore 1 \"boom\"
    throw 1
    izero 0
    end
.end
",
    );
    let (code, exception, message) = cpu.exit_condition();
    assert_eq!(code, 1);
    assert_eq!(exception, "String");
    assert_eq!(message, "boom");
}

#[test]
fn test_machine_exception_is_catchable_by_kind() {
    let cpu = run_source(
        "\
.block: handler
    pull 1
    leave
.end
.block: body
    print 5
    leave
.end
.function: main
    tryframe
    catch \"NullDeref\" handler
    try body
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
}

#[test]
fn test_uncaught_machine_exception_message() {
    let cpu = run_source(
        "\
.function: main
    print 5
    izero 0
    end
.end
",
    );
    let (code, exception, message) = cpu.exit_condition();
    assert_eq!(code, 1);
    assert_eq!(exception, "NullDeref");
    assert_eq!(message, "(get) read from null register: 5");
}

#[test]
fn test_call_returns_deep_copy() {
    let cpu = run_source(
        "\
.function: answer
    istore 1 42
    move 0 1
    end
.end
.function: main
    frame 0
    call 3 answer
    tmpri 3
    ress global
    tmpro 7
    ress local
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
    assert_eq!(global_integer(&cpu, 7), Some(42));
}

#[test]
fn test_paref_lets_callee_mutate_caller_register() {
    let cpu = run_source(
        "\
.function: bump
    arg 0 1
    iinc 1
    izero 0
    end
.end
.function: main
    istore 1 10
    frame 1
    paref 0 1
    call 0 bump
    tmpri 1
    ress global
    tmpro 7
    ress local
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
    assert_eq!(global_integer(&cpu, 7), Some(11));
}

#[test]
fn test_param_passes_by_copy() {
    let cpu = run_source(
        "\
.function: bump
    arg 0 1
    iinc 1
    izero 0
    end
.end
.function: main
    istore 1 10
    frame 1
    param 0 1
    call 0 bump
    tmpri 1
    ress global
    tmpro 7
    ress local
    izero 0
    end
.end
",
    );
    assert_eq!(global_integer(&cpu, 7), Some(10));
}

#[test]
fn test_param_beyond_frame_arity_fails() {
    let cpu = run_source(
        "\
.function: f
    izero 0
    end
.end
.function: main
    istore 1 5
    frame 1
    param 1 1
    call 0 f
    izero 0
    end
.end
",
    );
    let (code, exception, _) = cpu.exit_condition();
    assert_eq!(code, 1);
    assert_eq!(exception, "OutOfRange");
}

#[test]
fn test_stack_overflow_on_unbounded_recursion() {
    let cpu = run_source(
        "\
.function: recurse
    frame 0
    call 0 recurse
    izero 0
    end
.end
.function: main
    frame 0
    call 0 recurse
    izero 0
    end
.end
",
    );
    let (code, exception, _) = cpu.exit_condition();
    assert_eq!(code, 1);
    assert_eq!(exception, "StackOverflow");
}

#[test]
fn test_unwind_trims_call_stack_to_tryframe() {
    // The throw happens two calls deep; the catcher resumes in main's
    // frame and can still use main's registers.
    let cpu = run_source(
        "\
.block: handler
    pull 1
    tmpri 2
    ress global
    tmpro 7
    ress local
    leave
.end
.block: body
    frame 0
    call 0 outer
    leave
.end
.function: outer
    frame 0
    call 0 inner
    izero 0
    end
.end
.function: inner
    strstore 1 \"deep\"
    throw 1
    izero 0
    end
.end
.function: main
    istore 2 33
    tryframe
    catch \"String\" handler
    try body
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
    // Register 2 still held main's value when the handler ran.
    assert_eq!(global_integer(&cpu, 7), Some(33));
}

#[test]
fn test_branch_and_marks_loop() {
    let cpu = run_source(
        "\
.function: main
    izero 1
    istore 2 5
    .mark: again
    iinc 1
    ilt 1 2 3
    branch 3 again +1
    tmpri 1
    ress global
    tmpro 7
    ress local
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
    assert_eq!(global_integer(&cpu, 7), Some(5));
}

#[test]
fn test_static_registers_persist_across_calls() {
    let cpu = run_source(
        "\
.function: counter
    ress static
    isnull 1 2
    branch 2 +1 +2
    izero 1
    iinc 1
    tmpri 1
    ress global
    tmpro 7
    ress local
    izero 0
    end
.end
.function: main
    frame 0
    call 0 counter
    frame 0
    call 0 counter
    frame 0
    call 0 counter
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
    assert_eq!(global_integer(&cpu, 7), Some(3));
}

#[test]
fn test_vectors_and_strings() {
    let cpu = run_source(
        "\
.function: main
    vec 1
    istore 2 10
    vpush 1 2
    istore 2 20
    vpush 1 2
    istore 2 30
    vpush 1 2
    vlen 1 3
    vpop 1 4 -1
    iadd 3 4 5
    tmpri 5
    ress global
    tmpro 7
    ress local
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
    // 3 elements + popped 30
    assert_eq!(global_integer(&cpu, 7), Some(33));
}

#[test]
fn test_closure_captures_register() {
    let cpu = run_source(
        "\
.function: adder
    ress local
    arg 0 2
    iadd 1 2 3
    move 0 3
    end
.end
.function: main
    istore 1 40
    clbind 1
    closure 4 adder
    istore 5 2
    frame 1
    param 0 5
    fcall 6 4
    tmpri 6
    ress global
    tmpro 7
    ress local
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
    assert_eq!(global_integer(&cpu, 7), Some(42));
}

#[test]
fn test_prototype_message_dispatch() {
    let cpu = run_source(
        "\
.function: account_balance
    istore 0 700
    end
.end
.function: main
    class 1 Account
    attach 1 account_balance balance
    register 1
    new 2 Account
    frame 1
    param 0 2
    msg 3 balance
    tmpri 3
    ress global
    tmpro 7
    ress local
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
    assert_eq!(global_integer(&cpu, 7), Some(700));
}

#[test]
fn test_derived_class_inherits_methods() {
    let cpu = run_source(
        "\
.function: account_balance
    istore 0 700
    end
.end
.function: main
    class 1 Account
    attach 1 account_balance balance
    register 1
    class 1 Savings
    derive 1 Account
    register 1
    new 2 Savings
    frame 1
    param 0 2
    msg 3 balance
    tmpri 3
    ress global
    tmpro 7
    ress local
    izero 0
    end
.end
",
    );
    assert_eq!(cpu.exit_condition(), (0, "", ""));
    assert_eq!(global_integer(&cpu, 7), Some(700));
}

#[test]
fn test_foreign_function_call() {
    unsafe extern "C" fn add(
        frame: *mut Frame,
        _static_regs: *mut RegisterSet,
        _global: *mut RegisterSet,
    ) {
        let frame = &mut *frame;
        let lhs = frame
            .args
            .get(0)
            .unwrap()
            .borrow()
            .as_integer()
            .expect("first argument is an Integer");
        let rhs = frame
            .args
            .get(1)
            .unwrap()
            .borrow()
            .as_integer()
            .expect("second argument is an Integer");
        frame
            .regset
            .put(0, viua_engine::Value::Integer(lhs + rhs))
            .unwrap();
    }

    let source = "\
.signature: mathlib.add
.function: main
    istore 1 40
    istore 2 2
    frame 2
    param 0 1
    param 1 2
    call 3 mathlib.add
    tmpri 3
    ress global
    tmpro 7
    ress local
    izero 0
    end
.end
";
    let lines: Vec<String> = source.lines().map(str::to_string).collect();
    let image = assemble(&lines, &[], &CompileOptions::default()).unwrap();

    let mut cpu = Cpu::new();
    cpu.load(image);
    cpu.register_foreign_function("mathlib.add", add);
    cpu.run();

    assert_eq!(cpu.exit_condition(), (0, "", ""));
    assert_eq!(global_integer(&cpu, 7), Some(42));
}

#[test]
fn test_instruction_counter_advances() {
    let cpu = run_source(
        "\
.function: main
    izero 0
    end
.end
",
    );
    // main's two instructions plus the synthesized entry sequence.
    assert!(cpu.counter() >= 6);
}
