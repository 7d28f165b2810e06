//! The generated unit: constant pool, descriptors and code.
//!
//! Immutable once built; several VMs may run the same executable.

use serde::Serialize;

use crate::ast::Type;
use crate::error::CompileErrorKind;

use super::chunk::CodeBlock;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Int(i64),
    Double(f64),
    String(String),
}

impl Constant {
    fn same_as(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) => a == b,
            _ => false,
        }
    }
}

/// Append-only literal table. Equal literals share one entry.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    constants: Vec<Constant>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, constant: Constant) -> Result<u16, CompileErrorKind> {
        if let Some(index) = self.constants.iter().position(|c| c.same_as(&constant)) {
            return Ok(index as u16);
        }
        let index = self.constants.len();
        if index > u16::MAX as usize {
            return Err(CompileErrorKind::ConstantPoolOverflow);
        }
        self.constants.push(constant);
        Ok(index as u16)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn into_vec(self) -> Vec<Constant> {
        self.constants
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// Bound to a host procedure by (package, name) at link time.
    Native,
    Implemented(CodeBlock),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub package: String,
    /// Owning class for methods.
    pub class: Option<u16>,
    pub return_type: Type,
    pub params: Vec<VariableDescriptor>,
    /// Locals beyond the parameters, in slot order.
    pub locals: Vec<VariableDescriptor>,
    pub kind: FunctionKind,
}

impl Function {
    pub fn is_native(&self) -> bool {
        matches!(self.kind, FunctionKind::Native)
    }

    pub fn code(&self) -> Option<&CodeBlock> {
        match &self.kind {
            FunctionKind::Implemented(block) => Some(block),
            FunctionKind::Native => None,
        }
    }

    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Method {
    pub name: String,
    /// Function-table index of the implementation this class dispatches to.
    pub function: u16,
}

/// A class with its flattened, superclass-prefixed member layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Class {
    pub name: String,
    pub package: String,
    pub super_class: Option<u16>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
}

impl Class {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    pub fn reference_fields(&self) -> Vec<bool> {
        self.fields.iter().map(|f| f.ty.is_reference()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Executable {
    pub package: String,
    pub constants: Vec<Constant>,
    pub globals: Vec<VariableDescriptor>,
    pub functions: Vec<Function>,
    pub classes: Vec<Class>,
    pub top_level: CodeBlock,
}

impl Executable {
    /// Code of a function, or the top level for `None`. Natives have none.
    pub fn code(&self, function: Option<usize>) -> Option<&CodeBlock> {
        match function {
            None => Some(&self.top_level),
            Some(index) => self.functions.get(index).and_then(Function::code),
        }
    }

    pub fn function_index(&self, package: &str, name: &str) -> Option<usize> {
        self.functions
            .iter()
            .position(|f| f.class.is_none() && f.package == package && f.name == name)
    }

    /// Whether `class` is `ancestor` or inherits from it.
    pub fn is_subclass(&self, class: u16, ancestor: u16) -> bool {
        let mut current = Some(class);
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.classes.get(index as usize).and_then(|c| c.super_class);
        }
        false
    }

    pub fn class_name(&self, class: u16) -> &str {
        self.classes
            .get(class as usize)
            .map_or("<unknown>", |c| c.name.as_str())
    }
}
