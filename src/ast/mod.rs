//! The resolved program tree handed to the bytecode generator.
//!
//! Every identifier is already bound to a storage location and every
//! expression carries its static type. Nothing here is looked up by name.

pub mod expr;
pub mod stmt;
pub mod types;

pub use expr::{BinaryOp, Conversion, Expr, ExprKind, UnaryOp, Variable};
pub use stmt::{
    Block, ClassDefinition, Elif, FunctionDefinition, MemberDecl, Program, Stmt, StmtKind,
    VariableDecl,
};
pub use types::{SlotKind, Type};
