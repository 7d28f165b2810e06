//! Expression generation.
//!
//! Every expression leaves exactly one value on the stack. Operands are
//! pushed left to right before their operator.

use crate::ast::{BinaryOp, Conversion, Expr, ExprKind, SlotKind, Type, UnaryOp, Variable};
use crate::error::{CompileError, CompileErrorKind};
use crate::span::Position;

use super::compiler::{BodyContext, CompileResult, Compiler};
use super::opcode::Op;

impl<'p> Compiler<'p> {
    /// Generate an expression.
    pub(crate) fn gen_expr(&mut self, ctx: &mut BodyContext<'p>, expr: &Expr) -> CompileResult<()> {
        let pos = expr.position;
        match &expr.kind {
            ExprKind::Boolean(value) => {
                ctx.emit(pos, Op::PushInt1Byte, &[*value as i64])?;
            }
            ExprKind::Int(value) => {
                self.emit_int(ctx, pos, *value)?;
            }
            ExprKind::Double(value) => {
                self.emit_double(ctx, pos, *value)?;
            }
            ExprKind::String(value) => {
                self.emit_string(ctx, pos, value)?;
            }
            ExprKind::Null => {
                ctx.emit(pos, Op::PushNull, &[])?;
            }
            ExprKind::Variable(variable) => self.gen_push_variable(ctx, *variable, &expr.ty, pos)?,
            ExprKind::Function(index) => {
                self.check_function(*index, pos)?;
                ctx.emit(pos, Op::PushFunction, &[*index as i64])?;
            }
            ExprKind::Assign { target, value } => self.gen_assign(ctx, target, value, false, pos)?,
            ExprKind::Binary { op, lhs, rhs } => self.gen_binary(ctx, *op, lhs, rhs, pos)?,
            ExprKind::Unary { op, operand } => {
                self.gen_expr(ctx, operand)?;
                let op = match op {
                    UnaryOp::Minus if operand.ty == Type::Double => Op::MinusDouble,
                    UnaryOp::Minus => Op::MinusInt,
                    UnaryOp::Not => Op::LogicalNot,
                };
                ctx.emit(pos, op, &[])?;
            }
            ExprKind::Call { callee, args } => self.gen_call(ctx, callee, args, pos)?,
            ExprKind::Method { .. } => {
                return Err(CompileError::new(CompileErrorKind::MethodNotCalled, pos));
            }
            ExprKind::Index { array, index } => {
                self.gen_expr(ctx, array)?;
                self.gen_expr(ctx, index)?;
                let op = expr
                    .ty
                    .slot_kind()
                    .select(Op::PushArrayInt, Op::PushArrayDouble, Op::PushArrayObject);
                ctx.emit(pos, op, &[])?;
            }
            ExprKind::Field { object, index } => {
                self.check_field(&object.ty, *index, pos)?;
                self.gen_expr(ctx, object)?;
                let op = expr
                    .ty
                    .slot_kind()
                    .select(Op::PushFieldInt, Op::PushFieldDouble, Op::PushFieldObject);
                ctx.emit(pos, op, &[*index as i64])?;
            }
            ExprKind::New { class } => {
                self.class(*class, pos)?;
                ctx.emit(pos, Op::New, &[*class as i64])?;
            }
            ExprKind::NewArray { size } => {
                self.gen_expr(ctx, size)?;
                let op = element_kind(&expr.ty).select(
                    Op::NewArrayInt,
                    Op::NewArrayDouble,
                    Op::NewArrayObject,
                );
                ctx.emit(pos, op, &[])?;
            }
            ExprKind::ArrayLiteral(items) => {
                for item in items {
                    self.gen_expr(ctx, item)?;
                }
                let op = element_kind(&expr.ty).select(
                    Op::NewArrayLiteralInt,
                    Op::NewArrayLiteralDouble,
                    Op::NewArrayLiteralObject,
                );
                ctx.emit(pos, op, &[items.len() as i64])?;
            }
            ExprKind::Convert {
                conversion,
                operand,
            } => {
                self.gen_expr(ctx, operand)?;
                let op = match conversion {
                    Conversion::IntToDouble => Op::CastIntToDouble,
                    Conversion::DoubleToInt => Op::CastDoubleToInt,
                    Conversion::BooleanToString => Op::CastBooleanToString,
                    Conversion::IntToString => Op::CastIntToString,
                    Conversion::DoubleToString => Op::CastDoubleToString,
                };
                ctx.emit(pos, op, &[])?;
            }
            ExprKind::DownCast { class, operand } => {
                self.class(*class, pos)?;
                self.gen_expr(ctx, operand)?;
                ctx.emit(pos, Op::DownCast, &[*class as i64])?;
            }
            ExprKind::InstanceOf { class, operand } => {
                self.class(*class, pos)?;
                self.gen_expr(ctx, operand)?;
                ctx.emit(pos, Op::InstanceOf, &[*class as i64])?;
            }
            ExprKind::ArrayLength(array) => {
                self.gen_expr(ctx, array)?;
                ctx.emit(pos, Op::ArraySize, &[])?;
            }
            ExprKind::StringLength(string) => {
                self.gen_expr(ctx, string)?;
                ctx.emit(pos, Op::StringLength, &[])?;
            }
        }
        Ok(())
    }

    fn gen_push_variable(
        &mut self,
        ctx: &mut BodyContext<'p>,
        variable: Variable,
        ty: &Type,
        pos: Position,
    ) -> CompileResult<()> {
        match variable {
            Variable::Local(slot) => {
                let offset = ctx.local_offset(slot, pos)?;
                let op = ty
                    .slot_kind()
                    .select(Op::PushStackInt, Op::PushStackDouble, Op::PushStackObject);
                ctx.emit(pos, op, &[offset])?;
            }
            Variable::Global(index) => {
                let op = ty
                    .slot_kind()
                    .select(Op::PushStaticInt, Op::PushStaticDouble, Op::PushStaticObject);
                ctx.emit(pos, op, &[index as i64])?;
            }
        }
        Ok(())
    }

    /// Assignment evaluates the value first, then the target's own operands,
    /// then stores. Unless `discard` is set a copy of the value stays on the stack.
    pub(crate) fn gen_assign(
        &mut self,
        ctx: &mut BodyContext<'p>,
        target: &Expr,
        value: &Expr,
        discard: bool,
        pos: Position,
    ) -> CompileResult<()> {
        match &target.kind {
            ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Field { .. } => {}
            ExprKind::Method { .. } => {
                return Err(CompileError::new(CompileErrorKind::AssignToMethod, pos))
            }
            _ => return Err(CompileError::new(CompileErrorKind::InvalidAssignTarget, pos)),
        }

        self.gen_expr(ctx, value)?;
        if !discard {
            ctx.emit(pos, Op::Duplicate, &[])?;
        }

        let kind = target.ty.slot_kind();
        match &target.kind {
            ExprKind::Variable(variable) => {
                self.gen_pop_variable(ctx, *variable, &target.ty, pos)?;
            }
            ExprKind::Index { array, index } => {
                self.gen_expr(ctx, array)?;
                self.gen_expr(ctx, index)?;
                let op = kind.select(Op::PopArrayInt, Op::PopArrayDouble, Op::PopArrayObject);
                ctx.emit(pos, op, &[])?;
            }
            ExprKind::Field { object, index } => {
                self.check_field(&object.ty, *index, pos)?;
                self.gen_expr(ctx, object)?;
                let op = kind.select(Op::PopFieldInt, Op::PopFieldDouble, Op::PopFieldObject);
                ctx.emit(pos, op, &[*index as i64])?;
            }
            _ => {}
        }
        Ok(())
    }

    fn gen_binary(
        &mut self,
        ctx: &mut BodyContext<'p>,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: Position,
    ) -> CompileResult<()> {
        // && and || leave the deciding operand on the stack and skip the rest.
        if let BinaryOp::And | BinaryOp::Or = op {
            let end = ctx.buf.new_label();
            self.gen_expr(ctx, lhs)?;
            ctx.emit(pos, Op::Duplicate, &[])?;
            let jump = if op == BinaryOp::And {
                Op::JumpIfFalse
            } else {
                Op::JumpIfTrue
            };
            ctx.emit_jump(pos, jump, end)?;
            ctx.emit(pos, Op::Pop, &[])?;
            self.gen_expr(ctx, rhs)?;
            ctx.buf.set_label(end);
            return Ok(());
        }

        self.gen_expr(ctx, lhs)?;
        self.gen_expr(ctx, rhs)?;
        let operands = Operands::of(&lhs.ty, &rhs.ty);
        let instruction = match (op, operands) {
            (BinaryOp::Add, Operands::String) => Op::AddString,
            (BinaryOp::Add, Operands::Double) => Op::AddDouble,
            (BinaryOp::Add, _) => Op::AddInt,
            (BinaryOp::Sub, Operands::Double) => Op::SubDouble,
            (BinaryOp::Sub, _) => Op::SubInt,
            (BinaryOp::Mul, Operands::Double) => Op::MulDouble,
            (BinaryOp::Mul, _) => Op::MulInt,
            (BinaryOp::Div, Operands::Double) => Op::DivDouble,
            (BinaryOp::Div, _) => Op::DivInt,
            (BinaryOp::Mod, Operands::Double) => Op::ModDouble,
            (BinaryOp::Mod, _) => Op::ModInt,
            (BinaryOp::Eq, o) => o.select(Op::EqInt, Op::EqDouble, Op::EqString, Op::EqObject),
            (BinaryOp::Ne, o) => o.select(Op::NeInt, Op::NeDouble, Op::NeString, Op::NeObject),
            (BinaryOp::Gt, o) => o.select(Op::GtInt, Op::GtDouble, Op::GtString, Op::GtInt),
            (BinaryOp::Ge, o) => o.select(Op::GeInt, Op::GeDouble, Op::GeString, Op::GeInt),
            (BinaryOp::Lt, o) => o.select(Op::LtInt, Op::LtDouble, Op::LtString, Op::LtInt),
            (BinaryOp::Le, o) => o.select(Op::LeInt, Op::LeDouble, Op::LeString, Op::LeInt),
            (BinaryOp::And | BinaryOp::Or, _) => unreachable!("handled above"),
        };
        ctx.emit(pos, instruction, &[])?;
        Ok(())
    }

    /// Arguments left to right, then the callee, then INVOKE. A method callee
    /// pushes its object, which becomes the trailing `this` argument.
    fn gen_call(
        &mut self,
        ctx: &mut BodyContext<'p>,
        callee: &Expr,
        args: &[Expr],
        pos: Position,
    ) -> CompileResult<()> {
        for arg in args {
            self.gen_expr(ctx, arg)?;
        }
        match &callee.kind {
            ExprKind::Method { object, index } => {
                self.check_method(&object.ty, *index, pos)?;
                self.gen_expr(ctx, object)?;
                ctx.emit(pos, Op::PushMethod, &[*index as i64])?;
            }
            _ => self.gen_expr(ctx, callee)?,
        }
        ctx.emit(pos, Op::Invoke, &[])?;
        Ok(())
    }

    fn check_function(&self, index: u16, pos: Position) -> CompileResult<()> {
        if index as usize >= self.program.functions.len() {
            return Err(CompileError::new(CompileErrorKind::UnknownFunction(index), pos));
        }
        Ok(())
    }

    fn check_field(&self, object: &Type, index: u16, pos: Position) -> CompileResult<()> {
        let Some(class_index) = object.class_index() else {
            return Ok(());
        };
        let class = self.class(class_index, pos)?;
        if index as usize >= class.fields.len() {
            return Err(CompileError::new(
                CompileErrorKind::MemberNotFound {
                    class: class.name.clone(),
                    index,
                },
                pos,
            ));
        }
        Ok(())
    }

    fn check_method(&self, object: &Type, index: u16, pos: Position) -> CompileResult<()> {
        let Some(class_index) = object.class_index() else {
            return Ok(());
        };
        let class = self.class(class_index, pos)?;
        if index as usize >= class.methods.len() {
            return Err(CompileError::new(
                CompileErrorKind::MemberNotFound {
                    class: class.name.clone(),
                    index,
                },
                pos,
            ));
        }
        Ok(())
    }
}

/// Operand family of a binary operator, decided from both sides so that
/// `null == s` still compares strings.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Operands {
    Int,
    Double,
    String,
    Object,
}

impl Operands {
    fn of(lhs: &Type, rhs: &Type) -> Self {
        if *lhs == Type::String || *rhs == Type::String {
            Operands::String
        } else if *lhs == Type::Double {
            Operands::Double
        } else if lhs.is_reference() {
            Operands::Object
        } else {
            Operands::Int
        }
    }

    fn select(self, int: Op, double: Op, string: Op, object: Op) -> Op {
        match self {
            Operands::Int => int,
            Operands::Double => double,
            Operands::String => string,
            Operands::Object => object,
        }
    }
}

fn element_kind(array: &Type) -> SlotKind {
    array
        .element_type()
        .map_or(SlotKind::Object, |element| element.slot_kind())
}

#[cfg(test)]
mod tests {
    use crate::ast::{
        BinaryOp, ClassDefinition, Conversion, Expr, FunctionDefinition, MemberDecl, Program,
        Stmt, Type, VariableDecl,
    };
    use crate::error::CompileErrorKind;
    use crate::vm::chunk::InstructionCursor;
    use crate::vm::compiler::Compiler;
    use crate::vm::opcode::Op;
    use pretty_assertions::assert_eq;

    fn compile_ops(program: &Program) -> Vec<(Op, Vec<u16>)> {
        let exe = Compiler::compile(program).unwrap();
        InstructionCursor::new(&exe.top_level.code)
            .map(|i| {
                let i = i.unwrap();
                (i.op, i.operands().to_vec())
            })
            .collect()
    }

    fn with_globals(globals: Vec<VariableDecl>, statements: Vec<Stmt>) -> Program {
        Program {
            globals,
            statements,
            ..Program::default()
        }
    }

    #[test]
    fn test_assignment_families() {
        let program = with_globals(
            vec![
                VariableDecl::new("d", Type::Double),
                VariableDecl::new("a", Type::array_of(Type::String)),
            ],
            vec![
                Stmt::expr(Expr::assign(Expr::global(0, Type::Double), Expr::double(2.5))),
                Stmt::expr(Expr::assign(
                    Expr::index(Expr::global(1, Type::array_of(Type::String)), Expr::int(3)),
                    Expr::string("x"),
                )),
            ],
        );
        assert_eq!(
            compile_ops(&program),
            vec![
                (Op::PushDouble, vec![0]),
                (Op::PopStaticDouble, vec![0]),
                (Op::PushString, vec![1]),
                (Op::PushStaticObject, vec![1]),
                (Op::PushInt1Byte, vec![3]),
                (Op::PopArrayObject, vec![]),
            ]
        );
    }

    #[test]
    fn test_assignment_as_value_duplicates() {
        let program = with_globals(
            vec![VariableDecl::new("x", Type::Int)],
            vec![Stmt::expr(Expr::binary(
                BinaryOp::Add,
                Expr::assign(Expr::global(0, Type::Int), Expr::int(1)),
                Expr::int(2),
            ))],
        );
        assert_eq!(
            compile_ops(&program),
            vec![
                (Op::PushInt1Byte, vec![1]),
                (Op::Duplicate, vec![]),
                (Op::PopStaticInt, vec![0]),
                (Op::PushInt1Byte, vec![2]),
                (Op::AddInt, vec![]),
                (Op::Pop, vec![]),
            ]
        );
    }

    #[test]
    fn test_field_assignment_and_method_target() {
        let class = ClassDefinition::new(
            "P",
            None,
            vec![MemberDecl::field("x", Type::Double), MemberDecl::method("m", 0)],
        );
        let mut method = FunctionDefinition::new(
            "m",
            Type::Void,
            vec![VariableDecl::new("this", Type::Class(0))],
            vec![],
            vec![],
        );
        method.class = Some(0);
        let p = || Expr::global(0, Type::Class(0));

        let program = Program {
            globals: vec![VariableDecl::new("p", Type::Class(0))],
            classes: vec![class.clone()],
            functions: vec![method.clone()],
            statements: vec![Stmt::expr(Expr::assign(
                Expr::field(p(), 0, Type::Double),
                Expr::double(0.0),
            ))],
            ..Program::default()
        };
        assert_eq!(
            compile_ops(&program),
            vec![
                (Op::PushDouble0, vec![]),
                (Op::PushStaticObject, vec![0]),
                (Op::PopFieldDouble, vec![0]),
            ]
        );

        let method_ref = Expr::new(
            crate::ast::ExprKind::Method {
                object: Box::new(p()),
                index: 0,
            },
            Type::Void,
        );
        let program = Program {
            globals: vec![VariableDecl::new("p", Type::Class(0))],
            classes: vec![class],
            functions: vec![method],
            statements: vec![Stmt::expr(Expr::assign(method_ref, Expr::int(1)))],
            ..Program::default()
        };
        assert_eq!(
            Compiler::compile(&program).unwrap_err().kind,
            CompileErrorKind::AssignToMethod
        );
    }

    #[test]
    fn test_invalid_assign_target() {
        let program = with_globals(vec![], vec![Stmt::expr(Expr::assign(Expr::int(1), Expr::int(2)))]);
        assert_eq!(
            Compiler::compile(&program).unwrap_err().kind,
            CompileErrorKind::InvalidAssignTarget
        );
    }

    #[test]
    fn test_operand_families() {
        let program = with_globals(
            vec![],
            vec![
                Stmt::expr(Expr::binary(BinaryOp::Add, Expr::string("ab"), Expr::string("cd"))),
                Stmt::expr(Expr::binary(BinaryOp::Lt, Expr::string("a"), Expr::string("b"))),
                Stmt::expr(Expr::binary(BinaryOp::Eq, Expr::null(), Expr::string("b"))),
                Stmt::expr(Expr::binary(BinaryOp::Eq, Expr::null(), Expr::null())),
                Stmt::expr(Expr::binary(BinaryOp::Mod, Expr::double(2.5), Expr::double(2.5))),
            ],
        );
        let ops: Vec<_> = compile_ops(&program)
            .into_iter()
            .map(|(op, _)| op)
            .filter(|op| !matches!(op, Op::PushString | Op::PushNull | Op::PushDouble | Op::Pop))
            .collect();
        assert_eq!(
            ops,
            vec![Op::AddString, Op::LtString, Op::EqString, Op::EqObject, Op::ModDouble]
        );
    }

    #[test]
    fn test_short_circuit_and() {
        let program = with_globals(
            vec![],
            vec![Stmt::expr(Expr::binary(
                BinaryOp::And,
                Expr::boolean(false),
                Expr::boolean(true),
            ))],
        );
        assert_eq!(
            compile_ops(&program),
            vec![
                (Op::PushInt1Byte, vec![0]),
                (Op::Duplicate, vec![]),
                (Op::JumpIfFalse, vec![9]),
                (Op::Pop, vec![]),
                (Op::PushInt1Byte, vec![1]),
                (Op::Pop, vec![]),
            ]
        );
    }

    #[test]
    fn test_method_call_pushes_object_last() {
        let class = ClassDefinition::new("P", None, vec![MemberDecl::method("m", 0)]);
        let mut method = FunctionDefinition::new(
            "m",
            Type::Int,
            vec![VariableDecl::new("n", Type::Int), VariableDecl::new("this", Type::Class(0))],
            vec![],
            vec![],
        );
        method.class = Some(0);
        let program = Program {
            globals: vec![VariableDecl::new("p", Type::Class(0))],
            classes: vec![class],
            functions: vec![method],
            statements: vec![Stmt::expr(Expr::method_call(
                Expr::global(0, Type::Class(0)),
                0,
                vec![Expr::int(7)],
                Type::Int,
            ))],
            ..Program::default()
        };
        assert_eq!(
            compile_ops(&program),
            vec![
                (Op::PushInt1Byte, vec![7]),
                (Op::PushStaticObject, vec![0]),
                (Op::PushMethod, vec![0]),
                (Op::Invoke, vec![]),
                (Op::Pop, vec![]),
            ]
        );
    }

    #[test]
    fn test_unknown_member_index() {
        let class = ClassDefinition::new("P", None, vec![MemberDecl::field("x", Type::Int)]);
        let program = Program {
            globals: vec![VariableDecl::new("p", Type::Class(0))],
            classes: vec![class],
            statements: vec![Stmt::expr(Expr::field(
                Expr::global(0, Type::Class(0)),
                4,
                Type::Int,
            ))],
            ..Program::default()
        };
        assert_eq!(
            Compiler::compile(&program).unwrap_err().kind,
            CompileErrorKind::MemberNotFound {
                class: "P".into(),
                index: 4
            }
        );
    }

    #[test]
    fn test_conversions_and_arrays() {
        let program = with_globals(
            vec![],
            vec![
                Stmt::expr(Expr::convert(Conversion::DoubleToInt, Expr::double(2.5))),
                Stmt::expr(Expr::new_array(Type::Double, Expr::int(4))),
                Stmt::expr(Expr::array_literal(Type::Int, vec![Expr::int(1), Expr::int(2)])),
            ],
        );
        let ops: Vec<_> = compile_ops(&program).into_iter().map(|(op, _)| op).collect();
        assert_eq!(
            ops,
            vec![
                Op::PushDouble,
                Op::CastDoubleToInt,
                Op::Pop,
                Op::PushInt1Byte,
                Op::NewArrayDouble,
                Op::Pop,
                Op::PushInt1Byte,
                Op::PushInt1Byte,
                Op::NewArrayLiteralInt,
                Op::Pop,
            ]
        );
    }
}
