//! Resolved statements and program-level declarations.

use serde::{Deserialize, Serialize};

use crate::ast::expr::{Expr, Variable};
use crate::ast::types::Type;
use crate::span::Position;

/// A statement with its source position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elif {
    pub condition: Expr,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtKind {
    Expression(Expr),
    /// A declaration with an optional initializer. Storage is already bound.
    Declaration {
        variable: Variable,
        ty: Type,
        initializer: Option<Expr>,
    },
    If {
        condition: Expr,
        then_block: Block,
        #[serde(default)]
        elifs: Vec<Elif>,
        else_block: Option<Block>,
    },
    For {
        init: Option<Expr>,
        condition: Option<Expr>,
        post: Option<Expr>,
        body: Block,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Block(Block),
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            position: Position::synthesized(),
        }
    }

    pub fn at(mut self, line: u32) -> Self {
        self.position = Position::new(line, 0);
        self
    }

    pub fn expr(expr: Expr) -> Self {
        let line = expr.position.line;
        Self::new(StmtKind::Expression(expr)).at(line)
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(StmtKind::Return(value))
    }

    pub fn if_else(condition: Expr, then_block: Block, else_block: Option<Block>) -> Self {
        Self::new(StmtKind::If {
            condition,
            then_block,
            elifs: Vec::new(),
            else_block,
        })
    }

    pub fn for_loop(
        init: Option<Expr>,
        condition: Option<Expr>,
        post: Option<Expr>,
        body: Block,
    ) -> Self {
        Self::new(StmtKind::For {
            init,
            condition,
            post,
            body,
        })
    }
}

impl Block {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}

/// A named, typed slot: parameter, local or global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    pub ty: Type,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A function or method. Without a body it is native and resolved at link time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub package: String,
    pub return_type: Type,
    pub params: Vec<VariableDecl>,
    /// Locals beyond the parameters, in slot order.
    #[serde(default)]
    pub locals: Vec<VariableDecl>,
    pub body: Option<Block>,
    /// Owning class for methods. A method's last parameter is `this`.
    #[serde(default)]
    pub class: Option<u16>,
    #[serde(default)]
    pub position: Position,
}

impl FunctionDefinition {
    pub fn new(
        name: impl Into<String>,
        return_type: Type,
        params: Vec<VariableDecl>,
        locals: Vec<VariableDecl>,
        body: Vec<Stmt>,
    ) -> Self {
        Self {
            name: name.into(),
            package: String::new(),
            return_type,
            params,
            locals,
            body: Some(Block::new(body)),
            class: None,
            position: Position::synthesized(),
        }
    }

    pub fn native(
        package: impl Into<String>,
        name: impl Into<String>,
        return_type: Type,
        params: Vec<VariableDecl>,
    ) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            return_type,
            params,
            locals: Vec::new(),
            body: None,
            class: None,
            position: Position::synthesized(),
        }
    }

    pub fn is_native(&self) -> bool {
        self.body.is_none()
    }

    pub fn function_type(&self) -> Type {
        Type::Function {
            ret: Box::new(self.return_type.clone()),
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberDecl {
    Field {
        name: String,
        ty: Type,
        #[serde(default)]
        position: Position,
    },
    /// A method whose body is the function table entry `function`.
    Method {
        name: String,
        function: u16,
        #[serde(default)]
        position: Position,
    },
}

impl MemberDecl {
    pub fn field(name: impl Into<String>, ty: Type) -> Self {
        MemberDecl::Field {
            name: name.into(),
            ty,
            position: Position::synthesized(),
        }
    }

    pub fn method(name: impl Into<String>, function: u16) -> Self {
        MemberDecl::Method {
            name: name.into(),
            function,
            position: Position::synthesized(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MemberDecl::Field { name, .. } | MemberDecl::Method { name, .. } => name,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            MemberDecl::Field { position, .. } | MemberDecl::Method { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub name: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub super_class: Option<u16>,
    /// Members declared by this class only, in source order.
    pub members: Vec<MemberDecl>,
    #[serde(default)]
    pub position: Position,
}

impl ClassDefinition {
    pub fn new(name: impl Into<String>, super_class: Option<u16>, members: Vec<MemberDecl>) -> Self {
        Self {
            name: name.into(),
            package: String::new(),
            super_class,
            members,
            position: Position::synthesized(),
        }
    }
}

/// A fully resolved compilation unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub globals: Vec<VariableDecl>,
    #[serde(default)]
    pub classes: Vec<ClassDefinition>,
    #[serde(default)]
    pub functions: Vec<FunctionDefinition>,
    #[serde(default)]
    pub statements: Vec<Stmt>,
}
