//! Host procedures callable from bytecode.
//!
//! A function declared without a body is bound at link time to the procedure
//! registered under the same (package, name).

use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;

use crate::error::Fault;

use super::heap::Heap;
use super::value::Value;

/// Package holding the built-in natives.
pub const LANG_PACKAGE: &str = "fourg.lang";

/// What a native may touch while it runs.
pub struct NativeContext<'a> {
    pub heap: &'a mut Heap,
    pub output: &'a mut Vec<String>,
    pub echo: bool,
}

impl NativeContext<'_> {
    /// Text of a string argument; `None` for null.
    pub fn string(&self, value: Value) -> Option<&str> {
        value.as_object().and_then(|object| self.heap.string(object))
    }

    pub fn new_string(&mut self, text: impl Into<String>) -> Value {
        Value::object(self.heap.alloc_string(text))
    }

    pub fn write(&mut self, text: String) {
        if self.echo {
            print!("{}", text);
        }
        self.output.push(text);
    }
}

pub type NativeProc = Rc<dyn Fn(&mut NativeContext<'_>, &[Value]) -> Result<Value, Fault>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub package: String,
    pub name: String,
    pub arg_count: usize,
    pub func: NativeProc,
}

impl NativeFunction {
    pub fn new<F>(package: impl Into<String>, name: impl Into<String>, arg_count: usize, func: F) -> Self
    where
        F: Fn(&mut NativeContext<'_>, &[Value]) -> Result<Value, Fault> + 'static,
    {
        Self {
            package: package.into(),
            name: name.into(),
            arg_count,
            func: Rc::new(func),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({}/{})", self.qualified_name(), self.arg_count)
    }
}

/// Procedures by (package, name), in registration order.
#[derive(Debug, Clone, Default)]
pub struct NativeRegistry {
    functions: IndexMap<(String, String), NativeFunction>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the `fourg.lang` built-ins.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        register_lang_natives(&mut registry);
        registry
    }

    /// Add a procedure, replacing any earlier one with the same key.
    pub fn register(&mut self, function: NativeFunction) {
        let key = (function.package.clone(), function.name.clone());
        self.functions.insert(key, function);
    }

    pub fn lookup(&self, package: &str, name: &str) -> Option<&NativeFunction> {
        self.functions
            .get(&(package.to_string(), name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NativeFunction> {
        self.functions.values()
    }
}

fn register_lang_natives(registry: &mut NativeRegistry) {
    // print(text) - write without a newline
    registry.register(NativeFunction::new(LANG_PACKAGE, "print", 1, |ctx, args| {
        let text = ctx.string(args[0]).unwrap_or("null").to_string();
        ctx.write(text);
        Ok(Value::ZERO)
    }));

    // println(text)
    registry.register(NativeFunction::new(LANG_PACKAGE, "println", 1, |ctx, args| {
        let text = format!("{}\n", ctx.string(args[0]).unwrap_or("null"));
        ctx.write(text);
        Ok(Value::ZERO)
    }));

    registry.register(NativeFunction::new(LANG_PACKAGE, "sqrt", 1, |_, args| {
        let x = args[0].as_double();
        if x < 0.0 {
            return Err(Fault::native("sqrt", format!("negative argument {}", x)));
        }
        Ok(Value::double(x.sqrt()))
    }));

    registry.register(NativeFunction::new(LANG_PACKAGE, "now_millis", 0, |_, _| {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(Value::int(millis))
    }));
}
