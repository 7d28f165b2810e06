//! The shared value stack.
//!
//! Every frame lives in one growable array. A frame is laid out as
//! `[params..][call info][locals..][operands..]`, with `base` at the first
//! parameter; the call info is the only non-value slot.

use crate::error::Fault;

use super::value::{ObjectRef, Value};

/// Who to resume when a frame returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// The executable's top-level code.
    TopLevel,
    /// A bytecode function, by function-table index.
    Function(usize),
    /// A host entering through `Vm::call_function`; returning stops the loop.
    Host,
}

/// The caller's resume state, stored between a frame's parameters and locals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallInfo {
    pub caller: Caller,
    pub caller_pc: usize,
    pub caller_base: usize,
}

/// Slots taken by one call info record.
pub const CALL_INFO_SIZE: usize = 1;

/// Value payloads and call info records are kept in parallel arrays so that
/// a run of slots can be lent out as a plain `&[Value]`. The value under a
/// call info slot is always zero.
pub struct Stack {
    values: Vec<Value>,
    call_infos: Vec<Option<CallInfo>>,
    sp: usize,
    max_size: usize,
}

impl Stack {
    pub fn new(initial_size: usize, max_size: usize) -> Self {
        let size = initial_size.max(1);
        Self {
            values: vec![Value::ZERO; size],
            call_infos: vec![None; size],
            sp: 0,
            max_size,
        }
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.sp
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Make room for `needed` more slots above `sp`, growing the array if it must.
    pub fn reserve(&mut self, needed: usize) -> Result<(), Fault> {
        let required = self.sp + needed;
        if required <= self.values.len() {
            return Ok(());
        }
        if required > self.max_size {
            return Err(Fault::StackOverflow(self.max_size));
        }
        let new_len = (self.values.len() * 2).max(required).min(self.max_size);
        self.values.resize(new_len, Value::ZERO);
        self.call_infos.resize(new_len, None);
        Ok(())
    }

    #[inline]
    pub fn push(&mut self, value: Value) -> Result<(), Fault> {
        if self.sp == self.values.len() {
            self.reserve(1)?;
        }
        self.values[self.sp] = value;
        self.call_infos[self.sp] = None;
        self.sp += 1;
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.get(self.sp)
    }

    /// The value `depth` slots below the top; 0 is the top.
    #[inline]
    pub fn peek(&self, depth: usize) -> Value {
        self.get(self.sp - 1 - depth)
    }

    /// Overwrite the value `depth` slots below the top.
    #[inline]
    pub fn replace(&mut self, depth: usize, value: Value) {
        let index = self.sp - 1 - depth;
        self.set(index, value);
    }

    /// # Panics
    /// If the slot holds a call info record, which generated code never addresses.
    #[inline]
    pub fn get(&self, index: usize) -> Value {
        if self.call_infos[index].is_some() {
            panic!("stack slot {} holds call info", index);
        }
        self.values[index]
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: Value) {
        self.values[index] = value;
        self.call_infos[index] = None;
    }

    /// The top `count` values, oldest first, borrowed in place.
    pub fn top(&self, count: usize) -> &[Value] {
        &self.values[self.sp - count..self.sp]
    }

    /// Drop `count` values.
    pub fn shrink(&mut self, count: usize) {
        self.sp -= count;
    }

    pub fn truncate(&mut self, sp: usize) {
        self.sp = sp;
    }

    pub fn push_call_info(&mut self, info: CallInfo) -> Result<(), Fault> {
        if self.sp == self.values.len() {
            self.reserve(1)?;
        }
        self.values[self.sp] = Value::ZERO;
        self.call_infos[self.sp] = Some(info);
        self.sp += 1;
        Ok(())
    }

    pub fn call_info(&self, index: usize) -> Option<CallInfo> {
        self.call_infos.get(index).copied().flatten()
    }

    /// Objects referenced from live slots. Slots at or above `sp` are ignored.
    pub fn roots(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.values[..self.sp]
            .iter()
            .zip(&self.call_infos[..self.sp])
            .filter(|(_, info)| info.is_none())
            .filter_map(|(value, _)| value.as_object())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_peek() {
        let mut stack = Stack::new(2, 64);
        stack.push(Value::int(1)).unwrap();
        stack.push(Value::int(2)).unwrap();
        stack.push(Value::int(3)).unwrap();
        assert_eq!(stack.sp(), 3);
        assert_eq!(stack.peek(0), Value::int(3));
        assert_eq!(stack.peek(2), Value::int(1));
        assert_eq!(stack.pop(), Value::int(3));
        assert_eq!(stack.top(2), &[Value::int(1), Value::int(2)]);
    }

    #[test]
    fn test_grows_until_limit() {
        let mut stack = Stack::new(1, 4);
        for i in 0..4 {
            stack.push(Value::int(i)).unwrap();
        }
        assert_eq!(stack.capacity(), 4);
        assert_eq!(stack.push(Value::int(5)), Err(Fault::StackOverflow(4)));
    }

    #[test]
    fn test_roots_skip_call_info_and_dead_slots() {
        let mut stack = Stack::new(8, 64);
        stack.push(Value::object(ObjectRef::new(1))).unwrap();
        stack
            .push_call_info(CallInfo {
                caller: Caller::TopLevel,
                caller_pc: 4,
                caller_base: 0,
            })
            .unwrap();
        stack.push(Value::NULL).unwrap();
        stack.push(Value::int(9)).unwrap();
        stack.push(Value::object(ObjectRef::new(2))).unwrap();
        stack.pop();

        let roots: Vec<_> = stack.roots().collect();
        assert_eq!(roots, vec![ObjectRef::new(1)]);
        assert_eq!(stack.call_info(1).map(|i| i.caller_pc), Some(4));
        assert_eq!(stack.call_info(0), None);
    }

    #[test]
    fn test_top_borrows_argument_slots_above_call_info() {
        let mut stack = Stack::new(2, 64);
        stack.push(Value::int(7)).unwrap();
        stack
            .push_call_info(CallInfo {
                caller: Caller::Host,
                caller_pc: 0,
                caller_base: 0,
            })
            .unwrap();
        stack.push(Value::object(ObjectRef::new(3))).unwrap();
        stack.push(Value::double(1.5)).unwrap();

        let args = stack.top(2);
        assert_eq!(args, &[Value::object(ObjectRef::new(3)), Value::double(1.5)]);
        assert_eq!(args.as_ptr(), stack.values[2..].as_ptr());

        stack.truncate(1);
        stack.push(Value::int(8)).unwrap();
        assert_eq!(stack.call_info(1), None);
        assert_eq!(stack.peek(0), Value::int(8));
    }
}
