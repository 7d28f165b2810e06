//! Statement generation.

use crate::ast::{Block, Elif, Expr, ExprKind, Stmt, StmtKind, Type, Variable};
use crate::error::{CompileError, CompileErrorKind};
use crate::span::Position;

use super::chunk::Label;
use super::compiler::{BlockKind, BodyContext, CompileResult, Compiler};
use super::opcode::Op;

impl<'p> Compiler<'p> {
    pub(crate) fn gen_block(
        &mut self,
        ctx: &mut BodyContext<'p>,
        block: &Block,
        kind: BlockKind,
    ) -> CompileResult<()> {
        ctx.enter_block(kind);
        for stmt in &block.statements {
            self.gen_stmt(ctx, stmt)?;
        }
        ctx.leave_block();
        Ok(())
    }

    /// Generate a statement.
    pub(crate) fn gen_stmt(&mut self, ctx: &mut BodyContext<'p>, stmt: &Stmt) -> CompileResult<()> {
        let enclosing_line = ctx.enter_line(stmt.position.line);
        self.gen_stmt_kind(ctx, stmt)?;
        ctx.restore_line(enclosing_line);
        Ok(())
    }

    fn gen_stmt_kind(&mut self, ctx: &mut BodyContext<'p>, stmt: &Stmt) -> CompileResult<()> {
        let pos = stmt.position;
        match &stmt.kind {
            StmtKind::Expression(expr) => self.gen_expr_stmt(ctx, expr)?,
            StmtKind::Declaration {
                variable,
                ty,
                initializer,
            } => {
                if let Some(init) = initializer {
                    self.gen_expr(ctx, init)?;
                    self.gen_pop_variable(ctx, *variable, ty, pos)?;
                }
            }
            StmtKind::If {
                condition,
                then_block,
                elifs,
                else_block,
            } => self.gen_if(ctx, condition, then_block, elifs, else_block.as_ref())?,
            StmtKind::For {
                init,
                condition,
                post,
                body,
            } => self.gen_for(
                ctx,
                init.as_ref(),
                condition.as_ref(),
                post.as_ref(),
                body,
                pos,
            )?,
            StmtKind::Return(value) => self.gen_return(ctx, value.as_ref(), pos)?,
            StmtKind::Break => {
                let (break_label, _) = ctx
                    .innermost_loop()
                    .ok_or_else(|| CompileError::new(CompileErrorKind::BreakOutsideLoop, pos))?;
                ctx.emit_jump(pos, Op::Jump, break_label)?;
            }
            StmtKind::Continue => {
                let (_, continue_label) = ctx
                    .innermost_loop()
                    .ok_or_else(|| CompileError::new(CompileErrorKind::ContinueOutsideLoop, pos))?;
                ctx.emit_jump(pos, Op::Jump, continue_label)?;
            }
            StmtKind::Block(block) => self.gen_block(ctx, block, BlockKind::Plain)?,
        }
        Ok(())
    }

    /// An expression evaluated for its effect. Assignments skip the copy they
    /// would otherwise leave behind; everything else is popped.
    pub(crate) fn gen_expr_stmt(&mut self, ctx: &mut BodyContext<'p>, expr: &Expr) -> CompileResult<()> {
        if let ExprKind::Assign { target, value } = &expr.kind {
            return self.gen_assign(ctx, target, value, true, expr.position);
        }
        self.gen_expr(ctx, expr)?;
        ctx.emit(expr.position, Op::Pop, &[])?;
        Ok(())
    }

    fn gen_if(
        &mut self,
        ctx: &mut BodyContext<'p>,
        condition: &Expr,
        then_block: &Block,
        elifs: &[Elif],
        else_block: Option<&Block>,
    ) -> CompileResult<()> {
        let end = ctx.buf.new_label();

        let mut next = self.gen_branch_condition(ctx, condition)?;
        self.gen_block(ctx, then_block, BlockKind::Plain)?;
        ctx.emit_jump(condition.position, Op::Jump, end)?;
        ctx.buf.set_label(next);

        for elif in elifs {
            next = self.gen_branch_condition(ctx, &elif.condition)?;
            self.gen_block(ctx, &elif.block, BlockKind::Plain)?;
            ctx.emit_jump(elif.condition.position, Op::Jump, end)?;
            ctx.buf.set_label(next);
        }

        if let Some(block) = else_block {
            self.gen_block(ctx, block, BlockKind::Plain)?;
        }
        ctx.buf.set_label(end);
        Ok(())
    }

    /// Push an `if`/`elif` condition and jump past the branch when it is false.
    fn gen_branch_condition(
        &mut self,
        ctx: &mut BodyContext<'p>,
        condition: &Expr,
    ) -> CompileResult<Label> {
        if condition.ty != Type::Boolean {
            return Err(CompileError::new(
                CompileErrorKind::IfConditionNotBoolean(condition.ty.to_string()),
                condition.position,
            ));
        }
        self.gen_expr(ctx, condition)?;
        let skip = ctx.buf.new_label();
        ctx.emit_jump(condition.position, Op::JumpIfFalse, skip)?;
        Ok(skip)
    }

    fn gen_for(
        &mut self,
        ctx: &mut BodyContext<'p>,
        init: Option<&Expr>,
        condition: Option<&Expr>,
        post: Option<&Expr>,
        body: &Block,
        pos: Position,
    ) -> CompileResult<()> {
        if let Some(init) = init {
            self.gen_expr_stmt(ctx, init)?;
        }

        let top = ctx.buf.new_label();
        let break_label = ctx.buf.new_label();
        let continue_label = ctx.buf.new_label();

        ctx.buf.set_label(top);
        if let Some(condition) = condition {
            if condition.ty != Type::Boolean {
                return Err(CompileError::new(
                    CompileErrorKind::ForConditionNotBoolean(condition.ty.to_string()),
                    condition.position,
                ));
            }
            self.gen_expr(ctx, condition)?;
            ctx.emit_jump(condition.position, Op::JumpIfFalse, break_label)?;
        }

        self.gen_block(
            ctx,
            body,
            BlockKind::Loop {
                break_label,
                continue_label,
            },
        )?;

        ctx.buf.set_label(continue_label);
        if let Some(post) = post {
            self.gen_expr_stmt(ctx, post)?;
        }
        ctx.emit_jump(pos, Op::Jump, top)?;
        ctx.buf.set_label(break_label);
        Ok(())
    }

    fn gen_return(
        &mut self,
        ctx: &mut BodyContext<'p>,
        value: Option<&Expr>,
        pos: Position,
    ) -> CompileResult<()> {
        let function = ctx
            .function()
            .ok_or_else(|| CompileError::new(CompileErrorKind::ReturnOutsideFunction, pos))?;
        match value {
            Some(value) => {
                if function.return_type == Type::Void {
                    return Err(CompileError::new(
                        CompileErrorKind::ReturnValueInVoidFunction(function.name.clone()),
                        pos,
                    ));
                }
                self.gen_expr(ctx, value)?;
            }
            None => self.gen_default_value(ctx, &function.return_type, pos)?,
        }
        ctx.emit(pos, Op::Return, &[])?;
        Ok(())
    }

    /// Store the top of the stack into a variable.
    pub(crate) fn gen_pop_variable(
        &mut self,
        ctx: &mut BodyContext<'p>,
        variable: Variable,
        ty: &Type,
        pos: Position,
    ) -> CompileResult<()> {
        match variable {
            Variable::Local(slot) => {
                let offset = ctx.local_offset(slot, pos)?;
                let op = ty.slot_kind().select(Op::PopStackInt, Op::PopStackDouble, Op::PopStackObject);
                ctx.emit(pos, op, &[offset])?;
            }
            Variable::Global(index) => {
                let op = ty
                    .slot_kind()
                    .select(Op::PopStaticInt, Op::PopStaticDouble, Op::PopStaticObject);
                ctx.emit(pos, op, &[index as i64])?;
            }
        }
        Ok(())
    }
}
