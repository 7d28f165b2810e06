//! Error types for generation, linking and execution.

use crate::span::Position;
use thiserror::Error;

/// What went wrong while generating bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileErrorKind {
    #[error("function '{0}' is defined more than once")]
    FunctionMultipleDefine(String),

    #[error("class '{0}' is defined more than once")]
    ClassMultipleDefine(String),

    #[error("member #{index} not found in class '{class}'")]
    MemberNotFound { class: String, index: u16 },

    #[error("condition of 'if' must be boolean, found {0}")]
    IfConditionNotBoolean(String),

    #[error("condition of 'for' must be boolean, found {0}")]
    ForConditionNotBoolean(String),

    #[error("'break' outside of a loop")]
    BreakOutsideLoop,

    #[error("'continue' outside of a loop")]
    ContinueOutsideLoop,

    #[error("cannot assign to method")]
    AssignToMethod,

    #[error("invalid assignment target")]
    InvalidAssignTarget,

    #[error("a method can only be called")]
    MethodNotCalled,

    #[error("field '{field}' of class '{class}' overrides a method")]
    FieldOverridesMethod { class: String, field: String },

    #[error("method '{method}' of class '{class}' overrides a field")]
    MethodOverridesField { class: String, method: String },

    #[error("field '{field}' is declared twice in the hierarchy of class '{class}'")]
    FieldNameDuplicate { class: String, field: String },

    #[error("function '{0}' returns void but 'return' has a value")]
    ReturnValueInVoidFunction(String),

    #[error("'return' outside of a function")]
    ReturnOutsideFunction,

    #[error("local variable used outside of a function")]
    LocalOutsideFunction,

    #[error("unknown class #{0}")]
    UnknownClass(u16),

    #[error("unknown function #{0}")]
    UnknownFunction(u16),

    #[error("class '{0}' inherits from itself")]
    ClassHierarchyCycle(String),

    #[error("constant pool is full")]
    ConstantPoolOverflow,

    #[error("code block exceeds the 64 KiB jump range")]
    CodeTooLarge,

    #[error("operand {value} does not fit instruction {mnemonic}")]
    OperandOutOfRange { mnemonic: &'static str, value: i64 },

    #[error("label {0} was never set")]
    UnresolvedLabel(u16),

    #[error("malformed generated code: {0}")]
    MalformedCode(DecodeError),
}

/// A compile-time fault. Generation stops at the first one.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at {position}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub position: Position,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, position: Position) -> Self {
        Self { kind, position }
    }
}

/// Malformed bytecode found while walking an instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {byte:#04x} at pc {pc}")]
    UnknownOpcode { byte: u8, pc: usize },

    #[error("instruction at pc {pc} is truncated")]
    Truncated { pc: usize },

    #[error("constant #{index} is missing or has the wrong kind")]
    BadConstant { index: usize },
}

/// Native references that could not be bound to a host procedure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("native function '{package}.{name}' is not registered")]
    NativeNotFound { package: String, name: String },

    #[error("native function '{name}' takes {registered} arguments, declared with {declared}")]
    ArgumentCountMismatch {
        name: String,
        registered: usize,
        declared: usize,
    },
}

/// A run-time fault kind. Every fault halts execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    #[error("array index {index} out of bounds (size {size})")]
    IndexOutOfBounds { index: i64, size: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("null pointer dereference")]
    NullPointer,

    #[error("cannot cast {from} to {to}")]
    ClassCast { from: String, to: String },

    #[error("stack overflow (limit {0} slots)")]
    StackOverflow(usize),

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("wrong number of arguments: expected {expected}, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("no call info at stack slot {0}")]
    CorruptStack(usize),

    #[error("{name}: {message}")]
    Native { name: String, message: String },

    #[error("malformed bytecode: {0}")]
    Decode(#[from] DecodeError),
}

impl Fault {
    pub fn native(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Native {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A fault with the location it was raised at.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{fault} in {function} at line {line}")]
pub struct RuntimeError {
    pub fault: Fault,
    pub function: String,
    pub line: u32,
}

/// Any error from loading, generating, linking or running a program.
#[derive(Debug, Error)]
pub enum FourgError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Invalid program: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
