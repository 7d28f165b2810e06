//! Bytecode back end: generator, executable format and the stack VM.
//!
//! A resolved [`Program`](crate::ast::Program) goes through [`Compiler`] into an
//! [`Executable`], which a [`Vm`] links against a [`NativeRegistry`] and runs.

pub mod chunk;
pub mod compiler;
pub mod compiler_classes;
pub mod compiler_exprs;
pub mod compiler_stmts;
pub mod disassembler;
pub mod executable;
pub mod heap;
pub mod native;
pub mod opcode;
pub mod stack;
pub mod value;
#[allow(clippy::module_inception)]
pub mod vm;
pub mod vm_calls;
pub mod vm_classes;

#[cfg(test)]
mod tests;

pub use chunk::{CodeBlock, CodeBuffer, InstructionCursor, Label, LineNumber};
pub use compiler::Compiler;
pub use disassembler::disassemble;
pub use executable::{Class, Constant, Executable, Function, FunctionKind};
pub use heap::{GcStats, Heap, HeapObject};
pub use native::{NativeContext, NativeFunction, NativeRegistry, LANG_PACKAGE};
pub use opcode::{Op, OperandShape, OPCODE_INFO};
pub use value::{ObjectRef, Value};
pub use vm::Vm;
