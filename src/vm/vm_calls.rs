//! Calling convention: linking, invoke, return and host entry.
//!
//! The caller pushes the arguments, then the function index, then `INVOKE`.
//! The callee's frame starts at its first argument; a call info record goes
//! right above the arguments and the locals follow it. `RETURN` drops the
//! whole frame, leaves the result where the first argument was, and resumes
//! the caller after its `INVOKE`.

use log::{debug, trace};

use crate::error::{Fault, LinkError, RuntimeError};

use super::native::{NativeContext, NativeRegistry};
use super::opcode::Op;
use super::stack::{CallInfo, Caller, CALL_INFO_SIZE};
use super::value::Value;
use super::vm::{default_value, Vm};

impl Vm {
    /// Bind every body-less function to the registered procedure with the
    /// same package and name. Fails on the first one missing or mismatched.
    pub fn link(&mut self, registry: &NativeRegistry) -> Result<(), LinkError> {
        for (index, function) in self.exe.functions.iter().enumerate() {
            if !function.is_native() {
                continue;
            }
            let native = registry
                .lookup(&function.package, &function.name)
                .ok_or_else(|| LinkError::NativeNotFound {
                    package: function.package.clone(),
                    name: function.name.clone(),
                })?;
            if native.arg_count != function.params.len() {
                return Err(LinkError::ArgumentCountMismatch {
                    name: native.qualified_name(),
                    registered: native.arg_count,
                    declared: function.params.len(),
                });
            }
            trace!("linked native {} as function #{}", native.qualified_name(), index);
            self.natives[index] = Some(native.clone());
        }
        debug!(
            "linked {} native functions",
            self.natives.iter().filter(|n| n.is_some()).count()
        );
        Ok(())
    }

    /// `INVOKE` with `pc` still on the instruction.
    pub(crate) fn invoke(&mut self) -> Result<(), Fault> {
        let index = self.stack.pop().as_int() as usize;
        if self.exe.functions[index].is_native() {
            self.call_native(index)?;
            self.pc += Op::Invoke.info().size();
            return Ok(());
        }
        let caller = match self.current {
            None => Caller::TopLevel,
            Some(current) => Caller::Function(current),
        };
        self.enter_function(index, caller, self.pc)
    }

    /// Call a bound native on the top `argc` values and replace them with
    /// the result. The native borrows its arguments straight from the stack.
    fn call_native(&mut self, index: usize) -> Result<(), Fault> {
        let native = self.natives[index].clone().ok_or_else(|| {
            Fault::native(self.exe.functions[index].qualified_name(), "not linked")
        })?;
        let args = self.stack.top(native.arg_count);
        let mut ctx = NativeContext {
            heap: &mut self.heap,
            output: &mut self.output,
            echo: self.config.echo_output,
        };
        let result = (native.func)(&mut ctx, args)?;
        self.stack.shrink(native.arg_count);
        self.stack.push(result)
    }

    /// Build a frame for a bytecode function whose arguments are on top of
    /// the stack and point the registers at its first instruction.
    fn enter_function(&mut self, index: usize, caller: Caller, caller_pc: usize) -> Result<(), Fault> {
        let exe = self.exe.clone();
        let function = &exe.functions[index];
        self.stack.reserve(CALL_INFO_SIZE + function.locals.len())?;

        let base = self.stack.sp() - function.params.len();
        self.stack.push_call_info(CallInfo {
            caller,
            caller_pc,
            caller_base: self.base,
        })?;
        for local in &function.locals {
            let value = default_value(&mut self.heap, &local.ty);
            self.stack.push(value)?;
        }

        self.current = Some(index);
        self.base = base;
        self.pc = 0;
        Ok(())
    }

    /// `RETURN`. Yields the value when the frame was entered by the host.
    pub(crate) fn return_from_function(&mut self) -> Result<Option<Value>, Fault> {
        let value = self.stack.pop();
        let Some(index) = self.current else {
            return Ok(Some(value));
        };
        let info_slot = self.base + self.exe.functions[index].params.len();
        let info = self
            .stack
            .call_info(info_slot)
            .ok_or(Fault::CorruptStack(info_slot))?;

        self.stack.truncate(self.base);
        self.stack.push(value)?;
        self.base = info.caller_base;
        self.pc = info.caller_pc + Op::Invoke.info().size();
        match info.caller {
            Caller::Host => return Ok(Some(value)),
            Caller::TopLevel => self.current = None,
            Caller::Function(caller) => self.current = Some(caller),
        }
        Ok(None)
    }

    /// Run one function to completion from the host, through the same
    /// calling convention as bytecode calls. The registers and the stack
    /// pointer are restored afterwards, also on failure.
    pub fn call_function(&mut self, index: usize, args: &[Value]) -> Result<Value, RuntimeError> {
        let saved = (self.current, self.pc, self.base, self.op_pc);
        let entry_sp = self.stack.sp();
        let result = self.call_from_host(index, args);
        (self.current, self.pc, self.base, self.op_pc) = saved;
        self.stack.truncate(entry_sp);
        result
    }

    fn call_from_host(&mut self, index: usize, args: &[Value]) -> Result<Value, RuntimeError> {
        let host_fault = |vm: &Vm, fault: Fault| RuntimeError {
            fault,
            function: vm
                .exe
                .functions
                .get(index)
                .map_or_else(|| format!("#{}", index), |f| f.qualified_name()),
            line: 0,
        };

        let Some(function) = self.exe.functions.get(index) else {
            return Err(host_fault(self, Fault::native("host", format!("no function #{}", index))));
        };
        if function.params.len() != args.len() {
            let fault = Fault::ArgumentCount {
                expected: function.params.len(),
                got: args.len(),
            };
            return Err(host_fault(self, fault));
        }

        for &arg in args {
            self.stack.push(arg).map_err(|fault| host_fault(self, fault))?;
        }
        if function.is_native() {
            self.call_native(index).map_err(|fault| host_fault(self, fault))?;
            return Ok(self.stack.pop());
        }

        self.enter_function(index, Caller::Host, self.pc)
            .map_err(|fault| host_fault(self, fault))?;
        Ok(self.execute()?.unwrap_or(Value::ZERO))
    }
}
