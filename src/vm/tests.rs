//! End-to-end: generate, link and run small programs.

use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::ast::{
    BinaryOp, Block, ClassDefinition, Conversion, Expr, FunctionDefinition, MemberDecl, Program,
    Stmt, StmtKind, Type, VariableDecl,
};
use crate::config::VmConfig;
use crate::error::{FourgError, Fault, LinkError, RuntimeError};

use super::heap::HeapObject;
use super::native::{NativeRegistry, LANG_PACKAGE};
use super::{Compiler, Value, Vm};

fn var(name: &str, ty: Type) -> VariableDecl {
    VariableDecl::new(name, ty)
}

fn global(slot: u16, ty: Type) -> Expr {
    Expr::global(slot, ty)
}

fn set(target: Expr, value: Expr) -> Stmt {
    Stmt::expr(Expr::assign(target, value))
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::binary(op, lhs, rhs)
}

fn call(program_functions: &[FunctionDefinition], index: u16, args: Vec<Expr>) -> Expr {
    let function = &program_functions[index as usize];
    Expr::call(
        Expr::function(index, function.function_type()),
        args,
        function.return_type.clone(),
    )
}

fn linked_vm(program: &Program, config: VmConfig) -> Vm {
    let exe = Rc::new(Compiler::compile(program).unwrap());
    let mut vm = Vm::new(exe, config);
    vm.link(&NativeRegistry::with_defaults()).unwrap();
    vm
}

fn run(program: &Program) -> Vm {
    crate::run_program(program).unwrap()
}

fn run_err(program: &Program) -> RuntimeError {
    match crate::run_program(program) {
        Err(FourgError::Runtime(e)) => e,
        Err(other) => panic!("expected a runtime error, got {}", other),
        Ok(_) => panic!("expected a runtime error"),
    }
}

fn add_function() -> FunctionDefinition {
    FunctionDefinition::new(
        "add",
        Type::Int,
        vec![var("a", Type::Int), var("b", Type::Int)],
        vec![],
        vec![Stmt::ret(Some(binary(
            BinaryOp::Add,
            Expr::local(0, Type::Int),
            Expr::local(1, Type::Int),
        )))],
    )
}

#[test]
fn test_call_and_return_value() {
    let functions = vec![add_function()];
    let program = Program {
        globals: vec![var("r", Type::Int)],
        statements: vec![set(
            global(0, Type::Int),
            call(&functions, 0, vec![Expr::int(2), Expr::int(3)]),
        )],
        functions,
        ..Program::default()
    };
    let vm = run(&program);
    assert_eq!(vm.global(0).unwrap().as_int(), 5);
    assert_eq!(vm.stack.sp(), 0);
}

#[test]
fn test_host_call_restores_registers() {
    let program = Program {
        functions: vec![add_function()],
        ..Program::default()
    };
    let mut vm = linked_vm(&program, VmConfig::default());
    vm.stack.push(Value::int(99)).unwrap();

    let result = vm.call_function(0, &[Value::int(40), Value::int(2)]).unwrap();
    assert_eq!(result.as_int(), 42);
    assert_eq!(vm.stack.sp(), 1);
    assert_eq!(vm.stack.peek(0).as_int(), 99);
    assert_eq!((vm.current, vm.pc, vm.base), (None, 0, 0));

    let err = vm.call_function(0, &[Value::int(1)]).unwrap_err();
    assert_eq!(err.fault, Fault::ArgumentCount { expected: 2, got: 1 });
}

#[test]
fn test_locals_live_past_call_info() {
    // twice_plus_one(x) { int y; y = x * 2; return y + 1; }
    // outer(x) { return twice_plus_one(x) + twice_plus_one(x + 1); }
    let inner = FunctionDefinition::new(
        "twice_plus_one",
        Type::Int,
        vec![var("x", Type::Int)],
        vec![var("y", Type::Int)],
        vec![
            set(
                Expr::local(1, Type::Int),
                binary(BinaryOp::Mul, Expr::local(0, Type::Int), Expr::int(2)),
            ),
            Stmt::ret(Some(binary(BinaryOp::Add, Expr::local(1, Type::Int), Expr::int(1)))),
        ],
    );
    let mut functions = vec![inner];
    let outer_body = vec![Stmt::ret(Some(binary(
        BinaryOp::Add,
        call(&functions, 0, vec![Expr::local(0, Type::Int)]),
        call(
            &functions,
            0,
            vec![binary(BinaryOp::Add, Expr::local(0, Type::Int), Expr::int(1))],
        ),
    )))];
    functions.push(FunctionDefinition::new(
        "outer",
        Type::Int,
        vec![var("x", Type::Int)],
        vec![],
        outer_body,
    ));
    let program = Program {
        globals: vec![var("r", Type::Int)],
        statements: vec![set(global(0, Type::Int), call(&functions, 1, vec![Expr::int(10)]))],
        functions,
        ..Program::default()
    };
    let vm = run(&program);
    assert_eq!(vm.global(0).unwrap().as_int(), 21 + 23);
}

#[test]
fn test_recursive_fib() {
    let fib_type = Type::Function {
        ret: Box::new(Type::Int),
        params: vec![Type::Int],
    };
    let n = || Expr::local(0, Type::Int);
    let fib_of = |arg: Expr| Expr::call(Expr::function(0, fib_type.clone()), vec![arg], Type::Int);
    let fib = FunctionDefinition::new(
        "fib",
        Type::Int,
        vec![var("n", Type::Int)],
        vec![],
        vec![
            Stmt::if_else(
                binary(BinaryOp::Lt, n(), Expr::int(2)),
                Block::new(vec![Stmt::ret(Some(n()))]),
                None,
            ),
            Stmt::ret(Some(binary(
                BinaryOp::Add,
                fib_of(binary(BinaryOp::Sub, n(), Expr::int(1))),
                fib_of(binary(BinaryOp::Sub, n(), Expr::int(2))),
            ))),
        ],
    );
    let program = Program {
        functions: vec![fib],
        ..Program::default()
    };
    let mut vm = linked_vm(&program, VmConfig::default());
    let result = vm.call_function(0, &[Value::int(15)]).unwrap();
    assert_eq!(result.as_int(), 610);
}

#[test]
fn test_for_with_break_runs_body_twice() {
    let i = || global(0, Type::Int);
    let count = || global(1, Type::Int);
    let program = Program {
        globals: vec![var("i", Type::Int), var("count", Type::Int)],
        statements: vec![Stmt::for_loop(
            Some(Expr::assign(i(), Expr::int(0))),
            Some(binary(BinaryOp::Lt, i(), Expr::int(10))),
            Some(Expr::assign(i(), binary(BinaryOp::Add, i(), Expr::int(1)))),
            Block::new(vec![
                set(count(), binary(BinaryOp::Add, count(), Expr::int(1))),
                Stmt::if_else(
                    binary(BinaryOp::Eq, i(), Expr::int(1)),
                    Block::new(vec![Stmt::new(StmtKind::Break)]),
                    None,
                ),
            ]),
        )],
        ..Program::default()
    };
    let vm = run(&program);
    assert_eq!(vm.global(1).unwrap().as_int(), 2);
    assert_eq!(vm.global(0).unwrap().as_int(), 1);
}

#[test]
fn test_concatenation_allocates_new_string() {
    let s = |slot| global(slot, Type::String);
    let program = Program {
        globals: vec![
            var("s1", Type::String),
            var("s2", Type::String),
            var("s3", Type::String),
        ],
        statements: vec![
            set(s(0), Expr::string("ab")),
            set(s(1), Expr::string("cd")),
            set(s(2), binary(BinaryOp::Add, s(0), s(1))),
        ],
        ..Program::default()
    };
    let vm = run(&program);
    let (s1, s2, s3) = (
        vm.global(0).unwrap(),
        vm.global(1).unwrap(),
        vm.global(2).unwrap(),
    );
    assert_eq!(vm.string_value(s3), Some("abcd"));
    assert_ne!(s3.as_object(), s1.as_object());
    assert_ne!(s3.as_object(), s2.as_object());
    assert_eq!(vm.string_value(s1), Some("ab"));
    assert_eq!(vm.string_value(s2), Some("cd"));
}

#[test]
fn test_unreachable_array_and_strings_are_freed() {
    let string_array = Type::array_of(Type::String);
    let arr = || global(0, string_array.clone());
    let i = || global(1, Type::Int);
    let clear = FunctionDefinition::new(
        "clear",
        Type::Void,
        vec![],
        vec![],
        vec![set(arr(), Expr::null())],
    );
    let program = Program {
        globals: vec![var("arr", string_array.clone()), var("i", Type::Int)],
        functions: vec![clear],
        statements: vec![
            set(arr(), Expr::new_array(Type::String, Expr::int(10))),
            Stmt::for_loop(
                Some(Expr::assign(i(), Expr::int(0))),
                Some(binary(BinaryOp::Lt, i(), Expr::int(10))),
                Some(Expr::assign(i(), binary(BinaryOp::Add, i(), Expr::int(1)))),
                Block::new(vec![set(
                    Expr::index(arr(), i()),
                    binary(
                        BinaryOp::Add,
                        Expr::string("x"),
                        Expr::convert(Conversion::IntToString, i()),
                    ),
                )]),
            ),
        ],
        ..Program::default()
    };
    let mut vm = linked_vm(&program, VmConfig::default());
    vm.run().unwrap();

    vm.collect_garbage();
    let live = vm.heap().live_count();
    let array = vm.global(0).unwrap().as_object().unwrap();
    match vm.heap().get(array) {
        HeapObject::ArrayObject(items) => {
            assert_eq!(items.len(), 10);
            assert_eq!(vm.heap().string(items[3].unwrap()), Some("x3"));
        }
        other => panic!("expected an object array, got {}", other.kind_name()),
    }

    vm.call_function(0, &[]).unwrap();
    assert_eq!(vm.collect_garbage(), 11);
    assert_eq!(vm.heap().live_count(), live - 11);
    assert!(!vm.heap().contains(array));
}

#[test]
fn test_nulled_array_element_is_freed_while_shared_one_survives() {
    let string_array = Type::array_of(Type::String);
    let arr = || global(0, string_array.clone());
    let keep = || global(1, Type::String);
    let clear_last = FunctionDefinition::new(
        "clear_last",
        Type::Void,
        vec![],
        vec![],
        vec![set(Expr::index(arr(), Expr::int(9)), Expr::null())],
    );
    let program = Program {
        globals: vec![var("arr", string_array.clone()), var("keep", Type::String)],
        functions: vec![clear_last],
        statements: vec![
            set(arr(), Expr::new_array(Type::String, Expr::int(10))),
            set(Expr::index(arr(), Expr::int(0)), Expr::string("zero")),
            set(Expr::index(arr(), Expr::int(9)), Expr::string("nine")),
            set(keep(), Expr::index(arr(), Expr::int(0))),
        ],
        ..Program::default()
    };
    let mut vm = linked_vm(&program, VmConfig::default());
    vm.run().unwrap();

    let array = vm.global(0).unwrap().as_object().unwrap();
    let (zero, nine) = match vm.heap().get(array) {
        HeapObject::ArrayObject(items) => (items[0].unwrap(), items[9].unwrap()),
        other => panic!("expected an object array, got {}", other.kind_name()),
    };
    assert_eq!(vm.global(1).unwrap().as_object(), Some(zero));

    vm.call_function(0, &[]).unwrap();
    vm.collect_garbage();

    assert!(vm.heap().contains(zero));
    assert!(!vm.heap().contains(nine));
    assert_eq!(vm.heap().string(zero), Some("zero"));
    match vm.heap().get(array) {
        HeapObject::ArrayObject(items) => assert_eq!(items[9], None),
        other => panic!("expected an object array, got {}", other.kind_name()),
    }
}

#[test]
fn test_live_objects_stay_bounded_under_allocation_pressure() {
    // for (i = 0; i < 2000; i = i + 1) s = "x" + (string)i;
    let s = || global(0, Type::String);
    let i = || global(1, Type::Int);
    let iterations = 2000;
    let program = Program {
        globals: vec![var("s", Type::String), var("i", Type::Int)],
        statements: vec![Stmt::for_loop(
            Some(Expr::assign(i(), Expr::int(0))),
            Some(binary(BinaryOp::Lt, i(), Expr::int(iterations))),
            Some(Expr::assign(i(), binary(BinaryOp::Add, i(), Expr::int(1)))),
            Block::new(vec![set(
                s(),
                binary(
                    BinaryOp::Add,
                    Expr::string("x"),
                    Expr::convert(Conversion::IntToString, i()),
                ),
            )]),
        )],
        ..Program::default()
    };
    let increment = 16;
    let mut vm = linked_vm(&program, VmConfig::default().with_gc_threshold(16, increment));
    vm.run().unwrap();

    let stats = vm.heap_stats();
    assert!(stats.cycles > 1);
    assert_eq!(stats.threshold, 16 + increment * stats.cycles);
    assert!(stats.live <= stats.threshold + increment);
    assert!(stats.live < iterations as usize);
    assert_eq!(stats.allocated - stats.freed, stats.live);

    vm.collect_garbage();
    assert_eq!(vm.heap().live_count(), 1);
    assert_eq!(vm.string_value(vm.global(0).unwrap()), Some("x1999"));
}

/// A { int x; int m() { return 1; } }  B : A { int m() { return this.x + 1; } }
fn class_program(statements: Vec<Stmt>, globals: Vec<VariableDecl>) -> Program {
    let mut a_m = FunctionDefinition::new(
        "m",
        Type::Int,
        vec![var("this", Type::Class(0))],
        vec![],
        vec![Stmt::ret(Some(Expr::int(1)))],
    );
    a_m.class = Some(0);
    let mut b_m = FunctionDefinition::new(
        "m",
        Type::Int,
        vec![var("this", Type::Class(1))],
        vec![],
        vec![Stmt::ret(Some(binary(
            BinaryOp::Add,
            Expr::field(Expr::local(0, Type::Class(1)), 0, Type::Int),
            Expr::int(1),
        )))],
    );
    b_m.class = Some(1);

    Program {
        globals,
        classes: vec![
            ClassDefinition::new(
                "A",
                None,
                vec![MemberDecl::field("x", Type::Int), MemberDecl::method("m", 0)],
            ),
            ClassDefinition::new("B", Some(0), vec![MemberDecl::method("m", 1)]),
        ],
        functions: vec![a_m, b_m],
        statements,
        ..Program::default()
    }
}

#[test]
fn test_override_dispatches_on_dynamic_class() {
    let a = || global(0, Type::Class(0));
    let program = class_program(
        vec![
            set(a(), Expr::new_object(1)),
            set(Expr::field(a(), 0, Type::Int), Expr::int(5)),
            set(global(1, Type::Int), Expr::method_call(a(), 0, vec![], Type::Int)),
            set(global(2, Type::Boolean), Expr::instance_of(1, a())),
            set(global(3, Type::Class(1)), Expr::down_cast(1, a())),
            set(a(), Expr::new_object(0)),
            set(global(4, Type::Int), Expr::method_call(a(), 0, vec![], Type::Int)),
        ],
        vec![
            var("a", Type::Class(0)),
            var("r", Type::Int),
            var("is_b", Type::Boolean),
            var("b", Type::Class(1)),
            var("r2", Type::Int),
        ],
    );
    let vm = run(&program);
    assert_eq!(vm.global(1).unwrap().as_int(), 6);
    assert!(vm.global(2).unwrap().as_bool());
    assert!(vm.global(3).unwrap().as_object().is_some());
    assert_eq!(vm.global(4).unwrap().as_int(), 1);
}

#[test]
fn test_bad_downcast_faults() {
    let a = || global(0, Type::Class(0));
    let program = class_program(
        vec![
            set(a(), Expr::new_object(0)),
            set(global(1, Type::Class(1)), Expr::down_cast(1, a())).at(3),
        ],
        vec![var("a", Type::Class(0)), var("b", Type::Class(1))],
    );
    let err = run_err(&program);
    assert_eq!(
        err.fault,
        Fault::ClassCast {
            from: "A".into(),
            to: "B".into()
        }
    );
    assert_eq!(err.line, 3);
}

#[test]
fn test_null_downcast_and_field_access() {
    let program = class_program(
        vec![
            set(global(1, Type::Class(1)), Expr::down_cast(1, global(0, Type::Class(0)))),
            set(global(2, Type::Int), Expr::field(global(0, Type::Class(0)), 0, Type::Int)).at(2),
        ],
        vec![
            var("a", Type::Class(0)),
            var("b", Type::Class(1)),
            var("x", Type::Int),
        ],
    );
    let err = run_err(&program);
    assert_eq!(err.fault, Fault::NullPointer);
    assert_eq!(err.line, 2);
}

#[test]
fn test_division_by_zero_halts_immediately() {
    let a = || global(0, Type::Int);
    let b = || global(1, Type::Int);
    let program = Program {
        globals: vec![var("a", Type::Int), var("b", Type::Int)],
        statements: vec![
            set(a(), Expr::int(1)).at(1),
            set(b(), binary(BinaryOp::Div, Expr::int(10), b())).at(2),
            set(a(), Expr::int(7)).at(3),
        ],
        ..Program::default()
    };
    let mut vm = linked_vm(&program, VmConfig::default());
    let err = vm.run().unwrap_err();
    assert_eq!(err.fault, Fault::DivisionByZero);
    assert_eq!(err.line, 2);
    assert_eq!(err.function, "<top level>");
    assert_eq!(vm.global(0).unwrap().as_int(), 1);
}

#[test]
fn test_array_index_out_of_bounds() {
    let ints = Type::array_of(Type::Int);
    let program = Program {
        globals: vec![var("arr", ints.clone()), var("r", Type::Int)],
        statements: vec![
            set(
                global(0, ints.clone()),
                Expr::array_literal(Type::Int, vec![Expr::int(1), Expr::int(2), Expr::int(3)]),
            ),
            set(global(1, Type::Int), Expr::index(global(0, ints), Expr::int(5))),
        ],
        ..Program::default()
    };
    let err = run_err(&program);
    assert_eq!(err.fault, Fault::IndexOutOfBounds { index: 5, size: 3 });
}

#[test]
fn test_runaway_recursion_overflows_stack() {
    let ty = Type::Function {
        ret: Box::new(Type::Int),
        params: vec![],
    };
    let forever = FunctionDefinition::new(
        "forever",
        Type::Int,
        vec![],
        vec![],
        vec![Stmt::ret(Some(Expr::call(Expr::function(0, ty), vec![], Type::Int)))],
    );
    let program = Program {
        functions: vec![forever],
        ..Program::default()
    };
    let config = VmConfig {
        initial_stack_size: 8,
        max_stack_size: 64,
        ..VmConfig::default()
    };
    let mut vm = linked_vm(&program, config);
    let err = vm.call_function(0, &[]).unwrap_err();
    assert_eq!(err.fault, Fault::StackOverflow(64));
    assert_eq!(err.function, "forever");
    assert_eq!(vm.stack.sp(), 0);
}

#[test]
fn test_short_circuit_skips_faulting_operand() {
    let zero = || global(1, Type::Int);
    let program = Program {
        globals: vec![var("ok", Type::Boolean), var("zero", Type::Int)],
        statements: vec![set(
            global(0, Type::Boolean),
            binary(
                BinaryOp::And,
                Expr::boolean(false),
                binary(
                    BinaryOp::Eq,
                    binary(BinaryOp::Div, Expr::int(1), zero()),
                    Expr::int(0),
                ),
            ),
        )],
        ..Program::default()
    };
    let vm = run(&program);
    assert!(!vm.global(0).unwrap().as_bool());
}

#[test]
fn test_conversions_and_lengths() {
    let program = Program {
        globals: vec![
            var("s", Type::String),
            var("d", Type::Double),
            var("n", Type::Int),
            var("less", Type::Boolean),
        ],
        statements: vec![
            set(
                global(0, Type::String),
                binary(
                    BinaryOp::Add,
                    binary(
                        BinaryOp::Add,
                        Expr::convert(Conversion::IntToString, Expr::int(42)),
                        Expr::string("/"),
                    ),
                    Expr::convert(Conversion::BooleanToString, Expr::boolean(true)),
                ),
            ),
            set(
                global(1, Type::Double),
                binary(
                    BinaryOp::Div,
                    Expr::convert(Conversion::IntToDouble, Expr::int(7)),
                    Expr::double(2.0),
                ),
            ),
            set(
                global(2, Type::Int),
                binary(
                    BinaryOp::Add,
                    Expr::array_length(Expr::array_literal(
                        Type::Double,
                        vec![Expr::double(1.5), Expr::double(2.5)],
                    )),
                    Expr::string_length(global(0, Type::String)),
                ),
            ),
            set(
                global(3, Type::Boolean),
                binary(BinaryOp::Lt, Expr::string("abc"), Expr::string("abd")),
            ),
        ],
        ..Program::default()
    };
    let vm = run(&program);
    assert_eq!(vm.string_value(vm.global(0).unwrap()), Some("42/true"));
    assert_eq!(vm.global(1).unwrap().as_double(), 3.5);
    assert_eq!(vm.global(2).unwrap().as_int(), 2 + 7);
    assert!(vm.global(3).unwrap().as_bool());
}

#[test]
fn test_string_locals_start_empty() {
    let f = FunctionDefinition::new(
        "len_of_local",
        Type::Int,
        vec![],
        vec![var("s", Type::String)],
        vec![Stmt::ret(Some(Expr::string_length(Expr::local(0, Type::String))))],
    );
    let program = Program {
        functions: vec![f],
        ..Program::default()
    };
    let mut vm = linked_vm(&program, VmConfig::default());
    assert_eq!(vm.call_function(0, &[]).unwrap().as_int(), 0);
}

#[test]
fn test_native_output_is_captured() {
    let println = FunctionDefinition::native(
        LANG_PACKAGE,
        "println",
        Type::Void,
        vec![var("text", Type::String)],
    );
    let functions = vec![println];
    let program = Program {
        statements: vec![Stmt::expr(call(&functions, 0, vec![Expr::string("hello")]))],
        functions,
        ..Program::default()
    };
    let vm = run(&program);
    assert_eq!(vm.output, vec!["hello\n".to_string()]);
    assert_eq!(vm.stack.sp(), 0);
}

#[test]
fn test_missing_native_fails_to_link() {
    let program = Program {
        functions: vec![FunctionDefinition::native("nowhere", "missing", Type::Void, vec![])],
        ..Program::default()
    };
    match crate::run_program(&program) {
        Err(FourgError::Link(LinkError::NativeNotFound { package, name })) => {
            assert_eq!((package.as_str(), name.as_str()), ("nowhere", "missing"));
        }
        Err(other) => panic!("expected a link error, got {}", other),
        Ok(_) => panic!("expected a link error"),
    }
}

#[test]
fn test_native_arity_checked_at_link() {
    let program = Program {
        functions: vec![FunctionDefinition::native(LANG_PACKAGE, "sqrt", Type::Double, vec![])],
        ..Program::default()
    };
    let exe = Rc::new(Compiler::compile(&program).unwrap());
    let mut vm = Vm::new(exe, VmConfig::default());
    let err = vm.link(&NativeRegistry::with_defaults()).unwrap_err();
    assert!(matches!(
        err,
        LinkError::ArgumentCountMismatch {
            registered: 1,
            declared: 0,
            ..
        }
    ));
}
