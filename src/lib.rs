//! Fourg: bytecode back end and virtual machine for a small statically-typed
//! class-based language.
//!
//! The front end hands over a resolved [`ast::Program`]; this crate generates
//! an [`vm::Executable`] from it and runs that on a stack VM with a
//! mark-sweep heap.

// Allow some clippy lints that are stylistic and not critical
#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::unnecessary_cast)]

pub mod ast;
pub mod config;
pub mod error;
pub mod span;
pub mod vm;

use std::rc::Rc;

use ast::Program;
use config::VmConfig;
use error::FourgError;
use vm::{Compiler, Executable, NativeRegistry, Vm};

/// Generate an executable for a resolved program.
pub fn compile(program: &Program) -> Result<Executable, FourgError> {
    Ok(Compiler::compile(program)?)
}

/// Read a resolved program from its JSON form.
pub fn load_program(json: &str) -> Result<Program, FourgError> {
    Ok(serde_json::from_str(json)?)
}

/// Compile, link against the default natives, and run the top-level code.
/// The VM is returned for inspecting globals, output and heap statistics.
pub fn run_program(program: &Program) -> Result<Vm, FourgError> {
    run_with_config(program, VmConfig::default())
}

pub fn run_with_config(program: &Program, config: VmConfig) -> Result<Vm, FourgError> {
    let exe = Rc::new(compile(program)?);
    let mut vm = Vm::new(exe, config);
    vm.link(&NativeRegistry::with_defaults())?;
    vm.run()?;
    Ok(vm)
}
