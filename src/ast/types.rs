//! Resolved static types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The static type of an expression, variable or member, already checked by the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Void,
    Boolean,
    Int,
    Double,
    String,
    /// The type of the `null` literal.
    Null,
    /// An instance of the class at this index in the program's class table.
    Class(u16),
    /// Array of the element type.
    Array(Box<Type>),
    Function {
        ret: Box<Type>,
        params: Vec<Type>,
    },
}

/// The storage shape a value of some type occupies in a slot.
///
/// Selects between the int/double/object variants of every load and store
/// instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Int,
    Double,
    Object,
}

impl SlotKind {
    /// Pick the variant of an instruction family for this kind.
    pub fn select<T>(self, int: T, double: T, object: T) -> T {
        match self {
            SlotKind::Int => int,
            SlotKind::Double => double,
            SlotKind::Object => object,
        }
    }
}

impl Type {
    pub fn array_of(element: Type) -> Self {
        Type::Array(Box::new(element))
    }

    /// Heap-resident types. Slots holding them carry the reference flag.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::String | Type::Null | Type::Class(_) | Type::Array(_)
        )
    }

    pub fn slot_kind(&self) -> SlotKind {
        match self {
            Type::Double => SlotKind::Double,
            t if t.is_reference() => SlotKind::Object,
            _ => SlotKind::Int,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(element) => Some(element),
            _ => None,
        }
    }

    pub fn class_index(&self) -> Option<u16> {
        match self {
            Type::Class(index) => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Boolean => write!(f, "boolean"),
            Type::Int => write!(f, "int"),
            Type::Double => write!(f, "double"),
            Type::String => write!(f, "string"),
            Type::Null => write!(f, "null"),
            Type::Class(index) => write!(f, "class#{}", index),
            Type::Array(element) => write!(f, "{}[]", element),
            Type::Function { ret, params } => {
                write!(f, "{}(", ret)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ")")
            }
        }
    }
}
