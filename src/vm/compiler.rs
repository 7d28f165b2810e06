//! Resolved tree to bytecode.
//!
//! Generation order is globals, classes, functions, then top-level code.
//! Each body is emitted into its own [`CodeBuffer`]; jumps go to labels and
//! are resolved when the buffer is finished. The per-body state travels as an
//! explicit [`BodyContext`] argument.

use std::collections::HashSet;

use log::debug;

use crate::ast::{FunctionDefinition, Program, Stmt, StmtKind, Type};
use crate::error::{CompileError, CompileErrorKind};
use crate::span::Position;

use super::chunk::{CodeBlock, CodeBuffer, Label};
use super::executable::{
    Class, Constant, ConstantPool, Executable, Function, FunctionKind, VariableDescriptor,
};
use super::opcode::Op;
use super::stack::CALL_INFO_SIZE;

/// Result type for generation.
pub type CompileResult<T> = Result<T, CompileError>;

/// What an enclosing block offers to `break` and `continue`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockKind {
    Plain,
    Loop { break_label: Label, continue_label: Label },
}

/// Generation state for one body.
pub struct BodyContext<'p> {
    pub buf: CodeBuffer,
    /// Enclosing blocks, innermost last.
    blocks: Vec<BlockKind>,
    /// The function being generated; `None` for top-level code.
    function: Option<&'p FunctionDefinition>,
    /// Line of the innermost statement, used for nodes without their own.
    line: u32,
}

impl<'p> BodyContext<'p> {
    pub fn new(function: Option<&'p FunctionDefinition>) -> Self {
        Self {
            buf: CodeBuffer::new(),
            blocks: Vec::new(),
            function,
            line: 0,
        }
    }

    pub fn function(&self) -> Option<&'p FunctionDefinition> {
        self.function
    }

    /// Make `line` current if it is known; returns the previous one.
    pub fn enter_line(&mut self, line: u32) -> u32 {
        let previous = self.line;
        if line != 0 {
            self.line = line;
        }
        previous
    }

    pub fn restore_line(&mut self, line: u32) {
        self.line = line;
    }

    fn line_of(&self, pos: Position) -> u32 {
        if pos.line == 0 {
            self.line
        } else {
            pos.line
        }
    }

    pub fn emit(&mut self, pos: Position, op: Op, operands: &[i64]) -> CompileResult<usize> {
        let line = self.line_of(pos);
        self.buf
            .emit(line, op, operands)
            .map_err(|kind| CompileError::new(kind, pos))
    }

    pub fn emit_jump(&mut self, pos: Position, op: Op, label: Label) -> CompileResult<usize> {
        let line = self.line_of(pos);
        self.buf
            .emit_jump(line, op, label)
            .map_err(|kind| CompileError::new(kind, pos))
    }

    pub fn enter_block(&mut self, kind: BlockKind) {
        self.blocks.push(kind);
    }

    pub fn leave_block(&mut self) {
        self.blocks.pop();
    }

    /// The innermost loop's (break, continue) labels.
    pub fn innermost_loop(&self) -> Option<(Label, Label)> {
        self.blocks.iter().rev().find_map(|block| match block {
            BlockKind::Loop {
                break_label,
                continue_label,
            } => Some((*break_label, *continue_label)),
            BlockKind::Plain => None,
        })
    }

    /// Frame offset of a local slot: parameters sit below the call info, locals above it.
    pub fn local_offset(&self, slot: u16, pos: Position) -> CompileResult<i64> {
        let function = self
            .function
            .ok_or_else(|| CompileError::new(CompileErrorKind::LocalOutsideFunction, pos))?;
        let slot = slot as usize;
        let offset = if slot < function.params.len() {
            slot
        } else {
            slot + CALL_INFO_SIZE
        };
        Ok(offset as i64)
    }
}

/// The bytecode generator.
pub struct Compiler<'p> {
    pub(crate) program: &'p Program,
    pub(crate) constants: ConstantPool,
    pub(crate) classes: Vec<Class>,
}

impl<'p> Compiler<'p> {
    /// Generate an executable for a resolved program.
    pub fn compile(program: &'p Program) -> CompileResult<Executable> {
        check_duplicates(program)?;
        let classes = super::compiler_classes::layout_classes(program)?;

        let mut compiler = Compiler {
            program,
            constants: ConstantPool::new(),
            classes,
        };

        let globals = program.globals.iter().map(describe).collect();

        let mut functions = Vec::with_capacity(program.functions.len());
        for definition in &program.functions {
            functions.push(compiler.compile_function(definition)?);
        }

        let mut ctx = BodyContext::new(None);
        for stmt in &program.statements {
            compiler.gen_stmt(&mut ctx, stmt)?;
        }
        let top_level = finish(ctx, Position::synthesized())?;

        debug!(
            "generated {}: {} functions, {} classes, {} constants, {} top-level bytes",
            if program.package.is_empty() { "<main>" } else { &program.package },
            functions.len(),
            compiler.classes.len(),
            compiler.constants.len(),
            top_level.code.len()
        );

        Ok(Executable {
            package: program.package.clone(),
            constants: compiler.constants.into_vec(),
            globals,
            functions,
            classes: compiler.classes,
            top_level,
        })
    }

    fn compile_function(&mut self, definition: &'p FunctionDefinition) -> CompileResult<Function> {
        let kind = match &definition.body {
            None => FunctionKind::Native,
            Some(body) => {
                let mut ctx = BodyContext::new(Some(definition));
                self.gen_block(&mut ctx, body, BlockKind::Plain)?;
                let ends_with_return = matches!(
                    body.statements.last(),
                    Some(Stmt {
                        kind: StmtKind::Return(_),
                        ..
                    })
                );
                if !ends_with_return {
                    self.gen_default_value(&mut ctx, &definition.return_type, definition.position)?;
                    ctx.emit(definition.position, Op::Return, &[])?;
                }
                FunctionKind::Implemented(finish(ctx, definition.position)?)
            }
        };

        Ok(Function {
            name: definition.name.clone(),
            package: definition.package.clone(),
            class: definition.class,
            return_type: definition.return_type.clone(),
            params: definition.params.iter().map(describe).collect(),
            locals: definition.locals.iter().map(describe).collect(),
            kind,
        })
    }

    /// The value an implicit or valueless `return` yields for `ty`.
    pub(crate) fn gen_default_value(
        &mut self,
        ctx: &mut BodyContext<'p>,
        ty: &Type,
        pos: Position,
    ) -> CompileResult<()> {
        match ty {
            Type::Double => ctx.emit(pos, Op::PushDouble0, &[])?,
            Type::String => self.emit_string(ctx, pos, "")?,
            t if t.is_reference() => ctx.emit(pos, Op::PushNull, &[])?,
            _ => ctx.emit(pos, Op::PushInt1Byte, &[0])?,
        };
        Ok(())
    }

    // --- Constant helpers ---

    pub(crate) fn add_constant(&mut self, constant: Constant, pos: Position) -> CompileResult<i64> {
        self.constants
            .add(constant)
            .map(i64::from)
            .map_err(|kind| CompileError::new(kind, pos))
    }

    pub(crate) fn emit_int(
        &mut self,
        ctx: &mut BodyContext<'p>,
        pos: Position,
        value: i64,
    ) -> CompileResult<usize> {
        if (0..=u8::MAX as i64).contains(&value) {
            ctx.emit(pos, Op::PushInt1Byte, &[value])
        } else if (i16::MIN as i64..=i16::MAX as i64).contains(&value) {
            ctx.emit(pos, Op::PushInt2Byte, &[value])
        } else {
            let index = self.add_constant(Constant::Int(value), pos)?;
            ctx.emit(pos, Op::PushInt, &[index])
        }
    }

    pub(crate) fn emit_double(
        &mut self,
        ctx: &mut BodyContext<'p>,
        pos: Position,
        value: f64,
    ) -> CompileResult<usize> {
        if value.to_bits() == 0f64.to_bits() {
            ctx.emit(pos, Op::PushDouble0, &[])
        } else if value == 1.0 {
            ctx.emit(pos, Op::PushDouble1, &[])
        } else {
            let index = self.add_constant(Constant::Double(value), pos)?;
            ctx.emit(pos, Op::PushDouble, &[index])
        }
    }

    pub(crate) fn emit_string(
        &mut self,
        ctx: &mut BodyContext<'p>,
        pos: Position,
        value: &str,
    ) -> CompileResult<usize> {
        let index = self.add_constant(Constant::String(value.to_string()), pos)?;
        ctx.emit(pos, Op::PushString, &[index])
    }

    pub(crate) fn class(&self, index: u16, pos: Position) -> CompileResult<&Class> {
        self.classes
            .get(index as usize)
            .ok_or_else(|| CompileError::new(CompileErrorKind::UnknownClass(index), pos))
    }
}

fn describe(decl: &crate::ast::VariableDecl) -> VariableDescriptor {
    VariableDescriptor {
        name: decl.name.clone(),
        ty: decl.ty.clone(),
    }
}

fn finish(ctx: BodyContext<'_>, pos: Position) -> CompileResult<CodeBlock> {
    ctx.buf
        .finish()
        .map_err(|kind| CompileError::new(kind, pos))
}

/// Reject a second function or class with the same qualified name.
fn check_duplicates(program: &Program) -> CompileResult<()> {
    let mut seen = HashSet::new();
    for function in &program.functions {
        if !seen.insert((&function.package, function.class, &function.name)) {
            return Err(CompileError::new(
                CompileErrorKind::FunctionMultipleDefine(function.name.clone()),
                function.position,
            ));
        }
    }

    let mut seen = HashSet::new();
    for class in &program.classes {
        if !seen.insert((&class.package, &class.name)) {
            return Err(CompileError::new(
                CompileErrorKind::ClassMultipleDefine(class.name.clone()),
                class.position,
            ));
        }
    }
    Ok(())
}
