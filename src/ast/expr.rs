//! Resolved expression nodes.

use serde::{Deserialize, Serialize};

use crate::ast::types::Type;
use crate::span::Position;

/// An expression with its resolved static type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    #[serde(default)]
    pub position: Position,
}

/// A variable's storage location, bound by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    /// Parameter or local slot, counted from the first parameter.
    Local(u16),
    /// Index into the program's global table.
    Global(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Minus,
    Not,
}

/// Explicit conversions. The language never converts implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    IntToDouble,
    DoubleToInt,
    BooleanToString,
    IntToString,
    DoubleToString,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Boolean(bool),
    Int(i64),
    Double(f64),
    String(String),
    Null,
    Variable(Variable),
    /// A reference to an entry of the function table.
    Function(u16),
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// A method slot of an object; only valid as the callee of a call.
    Method {
        object: Box<Expr>,
        index: u16,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        object: Box<Expr>,
        index: u16,
    },
    New {
        class: u16,
    },
    /// `new T[size]`; the element type comes from the expression's type.
    NewArray {
        size: Box<Expr>,
    },
    ArrayLiteral(Vec<Expr>),
    Convert {
        conversion: Conversion,
        operand: Box<Expr>,
    },
    DownCast {
        class: u16,
        operand: Box<Expr>,
    },
    InstanceOf {
        class: u16,
        operand: Box<Expr>,
    },
    ArrayLength(Box<Expr>),
    StringLength(Box<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            position: Position::synthesized(),
        }
    }

    /// Attach a source line.
    pub fn at(mut self, line: u32) -> Self {
        self.position = Position::new(line, 0);
        self
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ExprKind::Boolean(value), Type::Boolean)
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Int(value), Type::Int)
    }

    pub fn double(value: f64) -> Self {
        Self::new(ExprKind::Double(value), Type::Double)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ExprKind::String(value.into()), Type::String)
    }

    pub fn null() -> Self {
        Self::new(ExprKind::Null, Type::Null)
    }

    pub fn local(slot: u16, ty: Type) -> Self {
        Self::new(ExprKind::Variable(Variable::Local(slot)), ty)
    }

    pub fn global(slot: u16, ty: Type) -> Self {
        Self::new(ExprKind::Variable(Variable::Global(slot)), ty)
    }

    pub fn function(index: u16, ty: Type) -> Self {
        Self::new(ExprKind::Function(index), ty)
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        let ty = target.ty.clone();
        Self::new(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
        )
    }

    /// A binary expression. Comparison and logical operators produce `boolean`,
    /// arithmetic keeps the left operand's type.
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        let ty = match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                lhs.ty.clone()
            }
            _ => Type::Boolean,
        };
        Self::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
        )
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let ty = operand.ty.clone();
        Self::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn call(callee: Expr, args: Vec<Expr>, ty: Type) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            ty,
        )
    }

    pub fn method_call(object: Expr, index: u16, args: Vec<Expr>, ty: Type) -> Self {
        let method = Self::new(
            ExprKind::Method {
                object: Box::new(object),
                index,
            },
            Type::Void,
        );
        Self::call(method, args, ty)
    }

    pub fn index(array: Expr, index: Expr) -> Self {
        let ty = array.ty.element_type().cloned().unwrap_or(Type::Void);
        Self::new(
            ExprKind::Index {
                array: Box::new(array),
                index: Box::new(index),
            },
            ty,
        )
    }

    pub fn field(object: Expr, index: u16, ty: Type) -> Self {
        Self::new(
            ExprKind::Field {
                object: Box::new(object),
                index,
            },
            ty,
        )
    }

    pub fn new_object(class: u16) -> Self {
        Self::new(ExprKind::New { class }, Type::Class(class))
    }

    pub fn new_array(element: Type, size: Expr) -> Self {
        Self::new(
            ExprKind::NewArray {
                size: Box::new(size),
            },
            Type::array_of(element),
        )
    }

    pub fn array_literal(element: Type, items: Vec<Expr>) -> Self {
        Self::new(ExprKind::ArrayLiteral(items), Type::array_of(element))
    }

    pub fn convert(conversion: Conversion, operand: Expr) -> Self {
        let ty = match conversion {
            Conversion::IntToDouble => Type::Double,
            Conversion::DoubleToInt => Type::Int,
            _ => Type::String,
        };
        Self::new(
            ExprKind::Convert {
                conversion,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn down_cast(class: u16, operand: Expr) -> Self {
        Self::new(
            ExprKind::DownCast {
                class,
                operand: Box::new(operand),
            },
            Type::Class(class),
        )
    }

    pub fn instance_of(class: u16, operand: Expr) -> Self {
        Self::new(
            ExprKind::InstanceOf {
                class,
                operand: Box::new(operand),
            },
            Type::Boolean,
        )
    }

    pub fn array_length(array: Expr) -> Self {
        Self::new(ExprKind::ArrayLength(Box::new(array)), Type::Int)
    }

    pub fn string_length(string: Expr) -> Self {
        Self::new(ExprKind::StringLength(Box::new(string)), Type::Int)
    }
}
