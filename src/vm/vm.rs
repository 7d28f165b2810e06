//! The bytecode virtual machine: shared-stack dispatch loop.

use std::rc::Rc;

use crate::ast::Type;
use crate::config::VmConfig;
use crate::error::{DecodeError, Fault, RuntimeError};

use super::chunk::{line_at, read_u16};
use super::executable::{Constant, Executable};
use super::heap::{GcStats, Heap, HeapObject};
use super::native::NativeFunction;
use super::opcode::Op;
use super::stack::Stack;
use super::value::{ObjectRef, Value};

/// Executes one [`Executable`].
///
/// Registers are `current` (function index, `None` for top-level code), `pc`
/// and `base`. Every frame lives in the one [`Stack`].
pub struct Vm {
    pub(crate) exe: Rc<Executable>,
    /// Bound procedures by function index; `None` for bytecode functions.
    pub(crate) natives: Vec<Option<NativeFunction>>,
    pub(crate) stack: Stack,
    pub(crate) heap: Heap,
    pub(crate) globals: Vec<Value>,
    pub(crate) config: VmConfig,
    /// Text written by natives, in order.
    pub output: Vec<String>,
    pub(crate) current: Option<usize>,
    pub(crate) pc: usize,
    pub(crate) base: usize,
    /// Start of the instruction being executed, for fault locations.
    pub(crate) op_pc: usize,
}

impl Vm {
    /// Allocate the stack, the heap and the global area. Natives are bound
    /// separately by [`Vm::link`].
    pub fn new(exe: Rc<Executable>, config: VmConfig) -> Self {
        let layouts = exe.classes.iter().map(|c| c.reference_fields()).collect();
        let mut heap = Heap::new(config.gc_threshold, config.gc_threshold_increment)
            .with_class_layouts(layouts);
        let globals = exe
            .globals
            .iter()
            .map(|global| default_value(&mut heap, &global.ty))
            .collect();

        Self {
            natives: vec![None; exe.functions.len()],
            stack: Stack::new(config.initial_stack_size, config.max_stack_size),
            heap,
            globals,
            config,
            output: Vec::new(),
            current: None,
            pc: 0,
            base: 0,
            op_pc: 0,
            exe,
        }
    }

    pub fn executable(&self) -> &Rc<Executable> {
        &self.exe
    }

    /// Run the top-level code to its end.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        self.current = None;
        self.pc = 0;
        self.base = 0;
        self.stack.truncate(0);
        self.execute().map(|_| ())
    }

    pub fn global(&self, index: usize) -> Option<Value> {
        self.globals.get(index).copied()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_stats(&self) -> GcStats {
        self.heap.stats()
    }

    /// Text of a string value; `None` for null or a non-string.
    pub fn string_value(&self, value: Value) -> Option<&str> {
        value.as_object().and_then(|object| self.heap.string(object))
    }

    /// Allocate a string, e.g. for an argument to [`Vm::call_function`].
    pub fn new_string(&mut self, text: impl Into<String>) -> Value {
        Value::object(self.heap.alloc_string(text))
    }

    /// Full collection with the globals and the live stack as roots.
    pub fn collect_garbage(&mut self) -> usize {
        let roots: Vec<ObjectRef> = self
            .globals
            .iter()
            .filter_map(|value| value.as_object())
            .chain(self.stack.roots())
            .collect();
        self.heap.collect(roots)
    }

    /// Run from the current registers until top-level code ends or a frame
    /// entered by the host returns.
    pub(crate) fn execute(&mut self) -> Result<Option<Value>, RuntimeError> {
        self.dispatch().map_err(|fault| self.locate(fault))
    }

    fn locate(&self, fault: Fault) -> RuntimeError {
        let function = match self.current {
            None => "<top level>".to_string(),
            Some(index) => self.exe.functions[index].qualified_name(),
        };
        let line = self
            .exe
            .code(self.current)
            .and_then(|code| line_at(&code.line_numbers, self.op_pc))
            .unwrap_or(0);
        RuntimeError {
            fault,
            function,
            line,
        }
    }

    fn dispatch(&mut self) -> Result<Option<Value>, Fault> {
        let exe = Rc::clone(&self.exe);
        let mut code = code_of(&exe, self.current);

        loop {
            if self.heap.needs_collection() {
                self.collect_garbage();
            }

            let pc = self.pc;
            let Some(&byte) = code.get(pc) else {
                return Ok(None);
            };
            let op = Op::from_byte(byte).ok_or(DecodeError::UnknownOpcode { byte, pc })?;
            let size = op.info().size();
            if pc + size > code.len() {
                return Err(DecodeError::Truncated { pc }.into());
            }
            self.op_pc = pc;
            let operand = move || read_u16(code, pc + 1) as usize;
            self.pc = pc + size;

            match op {
                Op::PushInt1Byte => self.stack.push(Value::int(code[pc + 1] as i64))?,
                Op::PushInt2Byte => {
                    let value = read_u16(code, pc + 1) as i16;
                    self.stack.push(Value::int(value as i64))?;
                }
                Op::PushInt => match exe.constants.get(operand()) {
                    Some(Constant::Int(value)) => self.stack.push(Value::int(*value))?,
                    _ => return Err(DecodeError::BadConstant { index: operand() }.into()),
                },
                Op::PushDouble0 => self.stack.push(Value::double(0.0))?,
                Op::PushDouble1 => self.stack.push(Value::double(1.0))?,
                Op::PushDouble => match exe.constants.get(operand()) {
                    Some(Constant::Double(value)) => self.stack.push(Value::double(*value))?,
                    _ => return Err(DecodeError::BadConstant { index: operand() }.into()),
                },
                Op::PushString => match exe.constants.get(operand()) {
                    Some(Constant::String(text)) => {
                        let object = self.heap.alloc_string(text.as_str());
                        self.stack.push(Value::object(object))?;
                    }
                    _ => return Err(DecodeError::BadConstant { index: operand() }.into()),
                },
                Op::PushNull => self.stack.push(Value::NULL)?,

                Op::PushStackInt | Op::PushStackDouble | Op::PushStackObject => {
                    let value = self.stack.get(self.base + operand());
                    self.stack.push(value)?;
                }
                Op::PopStackInt | Op::PopStackDouble | Op::PopStackObject => {
                    let value = self.stack.pop();
                    self.stack.set(self.base + operand(), value);
                }
                Op::PushStaticInt | Op::PushStaticDouble | Op::PushStaticObject => {
                    let value = self.globals[operand()];
                    self.stack.push(value)?;
                }
                Op::PopStaticInt | Op::PopStaticDouble | Op::PopStaticObject => {
                    self.globals[operand()] = self.stack.pop();
                }

                Op::PushArrayInt | Op::PushArrayDouble | Op::PushArrayObject => {
                    let index = self.stack.pop().as_int();
                    let array = self.stack.pop();
                    let value = self.array_get(array, index)?;
                    self.stack.push(value)?;
                }
                Op::PopArrayInt | Op::PopArrayDouble | Op::PopArrayObject => {
                    let index = self.stack.pop().as_int();
                    let array = self.stack.pop();
                    let value = self.stack.pop();
                    self.array_set(array, index, value)?;
                }
                Op::PushFieldInt | Op::PushFieldDouble | Op::PushFieldObject => {
                    let object = self.stack.pop();
                    let value = self.get_field(object, operand())?;
                    self.stack.push(value)?;
                }
                Op::PopFieldInt | Op::PopFieldDouble | Op::PopFieldObject => {
                    let object = self.stack.pop();
                    let value = self.stack.pop();
                    self.set_field(object, operand(), value)?;
                }

                Op::AddInt => self.binary_int(|a, b| Ok(a.wrapping_add(b)))?,
                Op::SubInt => self.binary_int(|a, b| Ok(a.wrapping_sub(b)))?,
                Op::MulInt => self.binary_int(|a, b| Ok(a.wrapping_mul(b)))?,
                Op::DivInt => self.binary_int(|a, b| {
                    if b == 0 {
                        Err(Fault::DivisionByZero)
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                Op::ModInt => self.binary_int(|a, b| {
                    if b == 0 {
                        Err(Fault::DivisionByZero)
                    } else {
                        Ok(a.wrapping_rem(b))
                    }
                })?,
                Op::AddDouble => self.binary_double(|a, b| a + b)?,
                Op::SubDouble => self.binary_double(|a, b| a - b)?,
                Op::MulDouble => self.binary_double(|a, b| a * b)?,
                Op::DivDouble => self.binary_double(|a, b| a / b)?,
                Op::ModDouble => self.binary_double(|a, b| a % b)?,
                Op::AddString => {
                    let rhs = self.stack.peek(0);
                    let lhs = self.stack.peek(1);
                    let joined = format!("{}{}", self.display_string(lhs), self.display_string(rhs));
                    let object = self.heap.alloc_string(joined);
                    self.stack.shrink(2);
                    self.stack.push(Value::object(object))?;
                }
                Op::MinusInt => {
                    let value = self.stack.peek(0).as_int();
                    self.stack.replace(0, Value::int(value.wrapping_neg()));
                }
                Op::MinusDouble => {
                    let value = self.stack.peek(0).as_double();
                    self.stack.replace(0, Value::double(-value));
                }

                Op::CastIntToDouble => {
                    let value = self.stack.peek(0).as_int();
                    self.stack.replace(0, Value::double(value as f64));
                }
                Op::CastDoubleToInt => {
                    let value = self.stack.peek(0).as_double();
                    self.stack.replace(0, Value::int(value as i64));
                }
                Op::CastBooleanToString => {
                    let text = if self.stack.peek(0).as_bool() { "true" } else { "false" };
                    self.replace_with_string(text.to_string());
                }
                Op::CastIntToString => {
                    let text = self.stack.peek(0).as_int().to_string();
                    self.replace_with_string(text);
                }
                Op::CastDoubleToString => {
                    let text = self.stack.peek(0).as_double().to_string();
                    self.replace_with_string(text);
                }

                Op::EqInt => self.compare_int(|a, b| a == b)?,
                Op::NeInt => self.compare_int(|a, b| a != b)?,
                Op::GtInt => self.compare_int(|a, b| a > b)?,
                Op::GeInt => self.compare_int(|a, b| a >= b)?,
                Op::LtInt => self.compare_int(|a, b| a < b)?,
                Op::LeInt => self.compare_int(|a, b| a <= b)?,
                Op::EqDouble => self.compare_double(|a, b| a == b)?,
                Op::NeDouble => self.compare_double(|a, b| a != b)?,
                Op::GtDouble => self.compare_double(|a, b| a > b)?,
                Op::GeDouble => self.compare_double(|a, b| a >= b)?,
                Op::LtDouble => self.compare_double(|a, b| a < b)?,
                Op::LeDouble => self.compare_double(|a, b| a <= b)?,
                Op::EqString => self.string_equality(true)?,
                Op::NeString => self.string_equality(false)?,
                Op::GtString => self.compare_string(|o| o.is_gt())?,
                Op::GeString => self.compare_string(|o| o.is_ge())?,
                Op::LtString => self.compare_string(|o| o.is_lt())?,
                Op::LeString => self.compare_string(|o| o.is_le())?,
                Op::EqObject | Op::NeObject => {
                    let rhs = self.stack.pop();
                    let lhs = self.stack.pop();
                    let same = lhs.as_object() == rhs.as_object();
                    self.stack.push(Value::boolean(same == (op == Op::EqObject)))?;
                }
                Op::LogicalNot => {
                    let value = self.stack.peek(0).as_bool();
                    self.stack.replace(0, Value::boolean(!value));
                }

                Op::Pop => {
                    self.stack.pop();
                }
                Op::Duplicate => {
                    let value = self.stack.peek(0);
                    self.stack.push(value)?;
                }

                Op::Jump => self.pc = operand(),
                Op::JumpIfTrue => {
                    if self.stack.pop().as_bool() {
                        self.pc = operand();
                    }
                }
                Op::JumpIfFalse => {
                    if !self.stack.pop().as_bool() {
                        self.pc = operand();
                    }
                }

                Op::PushFunction => self.stack.push(Value::int(operand() as i64))?,
                Op::PushMethod => {
                    let object = self.stack.peek(0);
                    let function = self.method_function(object, operand())?;
                    self.stack.push(Value::int(function as i64))?;
                }
                Op::Invoke => {
                    self.pc = pc;
                    self.invoke()?;
                    code = code_of(&exe, self.current);
                }
                Op::Return => {
                    self.pc = pc;
                    if let Some(value) = self.return_from_function()? {
                        return Ok(Some(value));
                    }
                    code = code_of(&exe, self.current);
                }

                Op::New => {
                    let object = self.new_instance(operand())?;
                    self.stack.push(object)?;
                }
                Op::NewArrayInt | Op::NewArrayDouble | Op::NewArrayObject => {
                    let size = self.stack.pop().as_int();
                    let size = usize::try_from(size)
                        .map_err(|_| Fault::IndexOutOfBounds { index: size, size: 0 })?;
                    let array = match op {
                        Op::NewArrayInt => HeapObject::ArrayInt(vec![0; size]),
                        Op::NewArrayDouble => HeapObject::ArrayDouble(vec![0.0; size]),
                        _ => HeapObject::ArrayObject(vec![None; size]),
                    };
                    let object = self.heap.alloc(array);
                    self.stack.push(Value::object(object))?;
                }
                Op::NewArrayLiteralInt | Op::NewArrayLiteralDouble | Op::NewArrayLiteralObject => {
                    let count = operand();
                    let values = self.stack.top(count);
                    let array = match op {
                        Op::NewArrayLiteralInt => {
                            HeapObject::ArrayInt(values.iter().map(|v| v.as_int()).collect())
                        }
                        Op::NewArrayLiteralDouble => {
                            HeapObject::ArrayDouble(values.iter().map(|v| v.as_double()).collect())
                        }
                        _ => HeapObject::ArrayObject(values.iter().map(|v| v.as_object()).collect()),
                    };
                    let object = self.heap.alloc(array);
                    self.stack.shrink(count);
                    self.stack.push(Value::object(object))?;
                }
                Op::ArraySize => {
                    let object = self.stack.peek(0).as_object().ok_or(Fault::NullPointer)?;
                    let heap_object = self.heap.get(object);
                    let len = heap_object.array_len().ok_or_else(|| Fault::TypeMismatch {
                        expected: "array",
                        found: heap_object.kind_name(),
                    })?;
                    self.stack.replace(0, Value::int(len as i64));
                }
                Op::StringLength => {
                    let value = self.stack.peek(0);
                    let text = self.expect_string(value)?;
                    let len = text.chars().count();
                    self.stack.replace(0, Value::int(len as i64));
                }
                Op::DownCast => {
                    self.down_cast(self.stack.peek(0), operand())?;
                }
                Op::InstanceOf => {
                    let result = self.instance_of(self.stack.peek(0), operand());
                    self.stack.replace(0, Value::boolean(result));
                }
            }
        }
    }

    #[inline]
    fn binary_int(&mut self, f: impl Fn(i64, i64) -> Result<i64, Fault>) -> Result<(), Fault> {
        let rhs = self.stack.pop().as_int();
        let lhs = self.stack.peek(0).as_int();
        self.stack.replace(0, Value::int(f(lhs, rhs)?));
        Ok(())
    }

    #[inline]
    fn binary_double(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), Fault> {
        let rhs = self.stack.pop().as_double();
        let lhs = self.stack.peek(0).as_double();
        self.stack.replace(0, Value::double(f(lhs, rhs)));
        Ok(())
    }

    #[inline]
    fn compare_int(&mut self, f: impl Fn(i64, i64) -> bool) -> Result<(), Fault> {
        let rhs = self.stack.pop().as_int();
        let lhs = self.stack.peek(0).as_int();
        self.stack.replace(0, Value::boolean(f(lhs, rhs)));
        Ok(())
    }

    #[inline]
    fn compare_double(&mut self, f: impl Fn(f64, f64) -> bool) -> Result<(), Fault> {
        let rhs = self.stack.pop().as_double();
        let lhs = self.stack.peek(0).as_double();
        self.stack.replace(0, Value::boolean(f(lhs, rhs)));
        Ok(())
    }

    /// Null equals only null.
    fn string_equality(&mut self, equal: bool) -> Result<(), Fault> {
        let rhs = self.stack.pop();
        let lhs = self.stack.peek(0);
        let same = match (lhs.as_object(), rhs.as_object()) {
            (None, None) => true,
            (Some(a), Some(b)) => self.heap.string(a) == self.heap.string(b),
            _ => false,
        };
        self.stack.replace(0, Value::boolean(same == equal));
        Ok(())
    }

    fn compare_string(&mut self, f: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), Fault> {
        let rhs = self.stack.pop();
        let lhs = self.stack.peek(0);
        let ordering = self.expect_string(lhs)?.cmp(self.expect_string(rhs)?);
        self.stack.replace(0, Value::boolean(f(ordering)));
        Ok(())
    }

    pub(crate) fn expect_string(&self, value: Value) -> Result<&str, Fault> {
        let object = value.as_object().ok_or(Fault::NullPointer)?;
        match self.heap.get(object) {
            HeapObject::String(text) => Ok(text),
            other => Err(Fault::TypeMismatch {
                expected: "string",
                found: other.kind_name(),
            }),
        }
    }

    /// Concatenation renders null as `null`.
    fn display_string(&self, value: Value) -> &str {
        self.string_value(value).unwrap_or("null")
    }

    fn replace_with_string(&mut self, text: String) {
        let object = self.heap.alloc_string(text);
        self.stack.replace(0, Value::object(object));
    }

    fn array_get(&self, array: Value, index: i64) -> Result<Value, Fault> {
        let object = array.as_object().ok_or(Fault::NullPointer)?;
        let heap_object = self.heap.get(object);
        let size = heap_object.array_len().unwrap_or(0);
        let i = checked_index(index, size)?;
        match heap_object {
            HeapObject::ArrayInt(values) => Ok(Value::int(values[i])),
            HeapObject::ArrayDouble(values) => Ok(Value::double(values[i])),
            HeapObject::ArrayObject(values) => Ok(Value::reference(values[i])),
            other => Err(Fault::TypeMismatch {
                expected: "array",
                found: other.kind_name(),
            }),
        }
    }

    fn array_set(&mut self, array: Value, index: i64, value: Value) -> Result<(), Fault> {
        let object = array.as_object().ok_or(Fault::NullPointer)?;
        let heap_object = self.heap.get_mut(object);
        let size = heap_object.array_len().unwrap_or(0);
        let i = checked_index(index, size)?;
        match heap_object {
            HeapObject::ArrayInt(values) => values[i] = value.as_int(),
            HeapObject::ArrayDouble(values) => values[i] = value.as_double(),
            HeapObject::ArrayObject(values) => values[i] = value.as_object(),
            other => {
                return Err(Fault::TypeMismatch {
                    expected: "array",
                    found: other.kind_name(),
                })
            }
        }
        Ok(())
    }
}

/// Zero value of a slot: 0, 0.0, a fresh empty string, or null.
pub(crate) fn default_value(heap: &mut Heap, ty: &Type) -> Value {
    match ty {
        Type::Double => Value::double(0.0),
        Type::String => Value::object(heap.alloc_string("")),
        t if t.is_reference() => Value::NULL,
        _ => Value::ZERO,
    }
}

fn code_of(exe: &Executable, function: Option<usize>) -> &[u8] {
    exe.code(function).map_or(&[], |block| block.code.as_slice())
}

fn checked_index(index: i64, size: usize) -> Result<usize, Fault> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < size)
        .ok_or(Fault::IndexOutOfBounds { index, size })
}
