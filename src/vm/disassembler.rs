//! Bytecode disassembler for debug output.

use std::fmt::Write;

use super::chunk::{line_at, CodeBlock, Instruction, InstructionCursor};
use super::executable::{Constant, Executable, FunctionKind};
use super::opcode::Op;

/// Disassemble a whole executable to a human-readable string.
pub fn disassemble(exe: &Executable) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== constants ({}) ==", exe.constants.len());
    for (i, constant) in exe.constants.iter().enumerate() {
        let _ = writeln!(out, "{:5} {}", i, format_constant(Some(constant)));
    }

    let _ = writeln!(out, "== globals ({}) ==", exe.globals.len());
    for (i, global) in exe.globals.iter().enumerate() {
        let _ = writeln!(out, "{:5} {}: {}", i, global.name, global.ty);
    }

    for class in &exe.classes {
        let super_name = class
            .super_class
            .map(|s| format!(" < {}", exe.class_name(s)))
            .unwrap_or_default();
        let _ = writeln!(out, "== class {}{} ==", class.name, super_name);
        for (i, field) in class.fields.iter().enumerate() {
            let _ = writeln!(out, "  field  {:3} {}: {}", i, field.name, field.ty);
        }
        for (i, method) in class.methods.iter().enumerate() {
            let _ = writeln!(out, "  method {:3} {} -> #{}", i, method.name, method.function);
        }
    }

    let _ = writeln!(out, "== <top level> ==");
    disassemble_block(exe, &exe.top_level, &mut out);

    for (i, function) in exe.functions.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n== #{} {} (params={}, locals={}) ==",
            i,
            function.qualified_name(),
            function.params.len(),
            function.locals.len()
        );
        match &function.kind {
            FunctionKind::Native => out.push_str("  <native>\n"),
            FunctionKind::Implemented(block) => disassemble_block(exe, block, &mut out),
        }
    }
    out
}

fn disassemble_block(exe: &Executable, block: &CodeBlock, out: &mut String) {
    let mut previous_line = None;
    for decoded in InstructionCursor::new(&block.code) {
        let instruction = match decoded {
            Ok(instruction) => instruction,
            Err(e) => {
                let _ = writeln!(out, "  !! {}", e);
                return;
            }
        };
        let line = line_at(&block.line_numbers, instruction.pc);
        let line_str = if line.is_some() && line == previous_line {
            "   |".to_string()
        } else {
            format!("{:4}", line.unwrap_or(0))
        };
        previous_line = line;
        let _ = write!(out, "{:04} {} ", instruction.pc, line_str);
        disassemble_instruction(exe, &instruction, out);
        out.push('\n');
    }
}

fn disassemble_instruction(exe: &Executable, instruction: &Instruction, out: &mut String) {
    let op = instruction.op;
    if instruction.operands().is_empty() {
        out.push_str(op.mnemonic());
        return;
    }

    let operand = instruction.operand(0);
    let shown = match op {
        Op::PushInt2Byte => (operand as i16).to_string(),
        _ => operand.to_string(),
    };
    let _ = write!(out, "{:<24} {:>5}", op.mnemonic(), shown);

    let index = operand as usize;
    let note = match op {
        Op::PushInt | Op::PushDouble | Op::PushString => {
            Some(format_constant(exe.constants.get(index)))
        }
        Op::PushStaticInt
        | Op::PushStaticDouble
        | Op::PushStaticObject
        | Op::PopStaticInt
        | Op::PopStaticDouble
        | Op::PopStaticObject => exe.globals.get(index).map(|g| g.name.clone()),
        Op::PushFunction => exe.functions.get(index).map(|f| f.qualified_name()),
        Op::New | Op::DownCast | Op::InstanceOf => Some(exe.class_name(operand).to_string()),
        _ => None,
    };
    if let Some(note) = note {
        let _ = write!(out, " ({})", note);
    }
}

fn format_constant(constant: Option<&Constant>) -> String {
    match constant {
        Some(Constant::Int(n)) => n.to_string(),
        Some(Constant::Double(d)) => format!("{:?}", d),
        Some(Constant::String(s)) => format!("\"{}\"", s),
        None => "???".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Program, Stmt, Type, VariableDecl};
    use crate::vm::compiler::Compiler;

    #[test]
    fn test_disassemble_annotates_operands() {
        let program = Program {
            globals: vec![VariableDecl::new("greeting", Type::String)],
            statements: vec![
                Stmt::expr(Expr::assign(Expr::global(0, Type::String), Expr::string("hi"))).at(1),
                Stmt::expr(Expr::assign(Expr::global(0, Type::String), Expr::string("yo"))).at(1),
                Stmt::expr(Expr::int(-300)).at(2),
            ],
            ..Program::default()
        };
        let exe = Compiler::compile(&program).unwrap();
        let text = disassemble(&exe);

        assert!(text.contains("    0 greeting: string"));
        assert!(text.contains("0000    1 PUSH_STRING"));
        assert!(text.contains("(\"hi\")"));
        assert!(text.contains("(greeting)"));
        assert!(text.contains("   | PUSH_STRING"));
        assert!(text.contains("-300"));
    }
}
