//! Code buffers: instruction bytes, labels and the line-number table.

use serde::Serialize;

use crate::error::{CompileErrorKind, DecodeError};

use super::opcode::{Op, OperandShape};

/// A generation-time placeholder for a code address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(u16);

impl Label {
    pub fn number(self) -> u16 {
        self.0
    }
}

/// A run of consecutive bytes generated from one source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineNumber {
    pub line: u32,
    pub start_pc: usize,
    pub pc_count: usize,
}

/// Source line of the instruction at `pc`.
pub fn line_at(lines: &[LineNumber], pc: usize) -> Option<u32> {
    lines
        .iter()
        .find(|run| pc >= run.start_pc && pc < run.start_pc + run.pc_count)
        .map(|run| run.line)
}

/// Finished code for one function body or the top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodeBlock {
    pub code: Vec<u8>,
    pub line_numbers: Vec<LineNumber>,
}

/// Accumulates instructions for one body while it is being generated.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    line_numbers: Vec<LineNumber>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Append one instruction. `operands` must match the opcode's shape.
    pub fn emit(&mut self, line: u32, op: Op, operands: &[i64]) -> Result<usize, CompileErrorKind> {
        let info = op.info();
        debug_assert_eq!(
            info.operands.len(),
            operands.len(),
            "operand count mismatch for {}",
            info.mnemonic
        );

        let start = self.code.len();
        self.code.push(op as u8);
        for (shape, &value) in info.operands.iter().zip(operands) {
            let out_of_range = CompileErrorKind::OperandOutOfRange {
                mnemonic: info.mnemonic,
                value,
            };
            match shape {
                OperandShape::Byte => {
                    let byte = u8::try_from(value).map_err(|_| out_of_range)?;
                    self.code.push(byte);
                }
                OperandShape::Short | OperandShape::Pool => {
                    if value < i16::MIN as i64 || value > u16::MAX as i64 {
                        return Err(out_of_range);
                    }
                    self.code.extend_from_slice(&(value as u16).to_be_bytes());
                }
            }
        }
        self.add_line_number(line, start);
        Ok(start)
    }

    fn add_line_number(&mut self, line: u32, start_pc: usize) {
        let count = self.code.len() - start_pc;
        match self.line_numbers.last_mut() {
            Some(last) if last.line == line => last.pc_count += count,
            _ => self.line_numbers.push(LineNumber {
                line,
                start_pc,
                pc_count: count,
            }),
        }
    }

    /// Reserve a label whose address is not known yet.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label((self.labels.len() - 1) as u16)
    }

    /// Bind the label to the current end of the buffer.
    pub fn set_label(&mut self, label: Label) {
        self.labels[label.0 as usize] = Some(self.code.len());
    }

    pub fn emit_jump(&mut self, line: u32, op: Op, label: Label) -> Result<usize, CompileErrorKind> {
        debug_assert!(op.is_jump());
        self.emit(line, op, &[label.0 as i64])
    }

    /// Rewrite every jump's label number to its address and drop the label table.
    pub fn finish(mut self) -> Result<CodeBlock, CompileErrorKind> {
        if self.code.len() > u16::MAX as usize {
            return Err(CompileErrorKind::CodeTooLarge);
        }
        self.fix_labels()?;
        Ok(CodeBlock {
            code: self.code,
            line_numbers: self.line_numbers,
        })
    }

    fn fix_labels(&mut self) -> Result<(), CompileErrorKind> {
        let mut patches = Vec::new();
        for instruction in InstructionCursor::new(&self.code) {
            let instruction = instruction.map_err(CompileErrorKind::MalformedCode)?;
            if !instruction.op.is_jump() {
                continue;
            }
            let label = instruction.operand(0);
            let address = self
                .labels
                .get(label as usize)
                .copied()
                .flatten()
                .ok_or(CompileErrorKind::UnresolvedLabel(label))?;
            patches.push((instruction.pc + 1, address as u16));
        }
        for (at, address) in patches {
            self.code[at..at + 2].copy_from_slice(&address.to_be_bytes());
        }
        self.labels.clear();
        Ok(())
    }
}

/// Read a big-endian two-byte operand.
#[inline]
pub fn read_u16(code: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([code[at], code[at + 1]])
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub pc: usize,
    pub op: Op,
    operands: [u16; 2],
    count: usize,
}

impl Instruction {
    pub fn operands(&self) -> &[u16] {
        &self.operands[..self.count]
    }

    pub fn operand(&self, i: usize) -> u16 {
        self.operands()[i]
    }

    pub fn next_pc(&self) -> usize {
        self.pc + self.op.info().size()
    }
}

/// Walks an instruction stream by the widths in the shape table.
pub struct InstructionCursor<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> InstructionCursor<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, pc: 0 }
    }

    fn decode(&self) -> Result<Instruction, DecodeError> {
        let pc = self.pc;
        let byte = self.code[pc];
        let op = Op::from_byte(byte).ok_or(DecodeError::UnknownOpcode { byte, pc })?;
        let info = op.info();
        if pc + info.size() > self.code.len() {
            return Err(DecodeError::Truncated { pc });
        }

        let mut operands = [0u16; 2];
        let mut at = pc + 1;
        for (slot, shape) in operands.iter_mut().zip(info.operands) {
            *slot = match shape {
                OperandShape::Byte => self.code[at] as u16,
                OperandShape::Short | OperandShape::Pool => read_u16(self.code, at),
            };
            at += shape.width();
        }
        Ok(Instruction {
            pc,
            op,
            operands,
            count: info.operands.len(),
        })
    }
}

impl Iterator for InstructionCursor<'_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pc >= self.code.len() {
            return None;
        }
        match self.decode() {
            Ok(instruction) => {
                self.pc = instruction.next_pc();
                Some(Ok(instruction))
            }
            Err(err) => {
                self.pc = self.code.len();
                Some(Err(err))
            }
        }
    }
}
