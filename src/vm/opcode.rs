//! Instruction set and its operand-shape table.
//!
//! An instruction is one opcode byte followed by the operands its shape
//! declares. Two-byte operands are big-endian.

/// The encoding of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// One unsigned byte (`b`).
    Byte,
    /// Two bytes, a signed immediate or a table index depending on the opcode (`s`).
    Short,
    /// Two bytes indexing the constant pool (`p`).
    Pool,
}

impl OperandShape {
    pub fn width(self) -> usize {
        match self {
            OperandShape::Byte => 1,
            OperandShape::Short | OperandShape::Pool => 2,
        }
    }

    pub fn code(self) -> char {
        match self {
            OperandShape::Byte => 'b',
            OperandShape::Short => 's',
            OperandShape::Pool => 'p',
        }
    }
}

/// Static description of one opcode.
#[derive(Debug)]
pub struct OpcodeInfo {
    pub op: Op,
    pub mnemonic: &'static str,
    pub operands: &'static [OperandShape],
    /// Net stack effect. Calls, returns and array literals report 0; theirs depends on the callee or operand.
    pub stack_effect: i8,
}

impl OpcodeInfo {
    /// Encoded size in bytes, opcode included.
    pub fn size(&self) -> usize {
        1 + self.operands.iter().map(|s| s.width()).sum::<usize>()
    }

    /// The shape string, e.g. `"s"` or `""`.
    pub fn shape(&self) -> String {
        self.operands.iter().map(|s| s.code()).collect()
    }
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $variant:ident = $mnemonic:literal, [$($shape:ident),*], $effect:literal; )*) => {
        /// A bytecode opcode. The discriminant is the encoded byte.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Op {
            $( $(#[$doc])* $variant, )*
        }

        /// Indexed by opcode byte.
        pub static OPCODE_INFO: &[OpcodeInfo] = &[
            $(
                OpcodeInfo {
                    op: Op::$variant,
                    mnemonic: $mnemonic,
                    operands: &[$(OperandShape::$shape),*],
                    stack_effect: $effect,
                },
            )*
        ];
    };
}

opcodes! {
    // --- Constants ---
    PushInt1Byte = "PUSH_INT_1BYTE", [Byte], 1;
    /// Signed 16-bit immediate.
    PushInt2Byte = "PUSH_INT_2BYTE", [Short], 1;
    PushInt = "PUSH_INT", [Pool], 1;
    PushDouble0 = "PUSH_DOUBLE_0", [], 1;
    PushDouble1 = "PUSH_DOUBLE_1", [], 1;
    PushDouble = "PUSH_DOUBLE", [Pool], 1;
    /// Allocates a fresh string object from a pool literal.
    PushString = "PUSH_STRING", [Pool], 1;
    PushNull = "PUSH_NULL", [], 1;

    // --- Locals (operand is the frame offset from base) ---
    PushStackInt = "PUSH_STACK_INT", [Short], 1;
    PushStackDouble = "PUSH_STACK_DOUBLE", [Short], 1;
    PushStackObject = "PUSH_STACK_OBJECT", [Short], 1;
    PopStackInt = "POP_STACK_INT", [Short], -1;
    PopStackDouble = "POP_STACK_DOUBLE", [Short], -1;
    PopStackObject = "POP_STACK_OBJECT", [Short], -1;

    // --- Globals ---
    PushStaticInt = "PUSH_STATIC_INT", [Short], 1;
    PushStaticDouble = "PUSH_STATIC_DOUBLE", [Short], 1;
    PushStaticObject = "PUSH_STATIC_OBJECT", [Short], 1;
    PopStaticInt = "POP_STATIC_INT", [Short], -1;
    PopStaticDouble = "POP_STATIC_DOUBLE", [Short], -1;
    PopStaticObject = "POP_STATIC_OBJECT", [Short], -1;

    // --- Array elements: [array, index] -> [value]; [value, array, index] -> [] ---
    PushArrayInt = "PUSH_ARRAY_INT", [], -1;
    PushArrayDouble = "PUSH_ARRAY_DOUBLE", [], -1;
    PushArrayObject = "PUSH_ARRAY_OBJECT", [], -1;
    PopArrayInt = "POP_ARRAY_INT", [], -3;
    PopArrayDouble = "POP_ARRAY_DOUBLE", [], -3;
    PopArrayObject = "POP_ARRAY_OBJECT", [], -3;

    // --- Fields: [object] -> [value]; [value, object] -> [] ---
    PushFieldInt = "PUSH_FIELD_INT", [Short], 0;
    PushFieldDouble = "PUSH_FIELD_DOUBLE", [Short], 0;
    PushFieldObject = "PUSH_FIELD_OBJECT", [Short], 0;
    PopFieldInt = "POP_FIELD_INT", [Short], -2;
    PopFieldDouble = "POP_FIELD_DOUBLE", [Short], -2;
    PopFieldObject = "POP_FIELD_OBJECT", [Short], -2;

    // --- Arithmetic ---
    AddInt = "ADD_INT", [], -1;
    AddDouble = "ADD_DOUBLE", [], -1;
    /// Allocates the concatenation; operands are never mutated.
    AddString = "ADD_STRING", [], -1;
    SubInt = "SUB_INT", [], -1;
    SubDouble = "SUB_DOUBLE", [], -1;
    MulInt = "MUL_INT", [], -1;
    MulDouble = "MUL_DOUBLE", [], -1;
    DivInt = "DIV_INT", [], -1;
    DivDouble = "DIV_DOUBLE", [], -1;
    ModInt = "MOD_INT", [], -1;
    ModDouble = "MOD_DOUBLE", [], -1;
    MinusInt = "MINUS_INT", [], 0;
    MinusDouble = "MINUS_DOUBLE", [], 0;

    // --- Conversions ---
    CastIntToDouble = "CAST_INT_TO_DOUBLE", [], 0;
    /// Truncates toward zero.
    CastDoubleToInt = "CAST_DOUBLE_TO_INT", [], 0;
    CastBooleanToString = "CAST_BOOLEAN_TO_STRING", [], 0;
    CastIntToString = "CAST_INT_TO_STRING", [], 0;
    CastDoubleToString = "CAST_DOUBLE_TO_STRING", [], 0;

    // --- Comparison ---
    EqInt = "EQ_INT", [], -1;
    EqDouble = "EQ_DOUBLE", [], -1;
    EqString = "EQ_STRING", [], -1;
    /// Reference identity.
    EqObject = "EQ_OBJECT", [], -1;
    NeInt = "NE_INT", [], -1;
    NeDouble = "NE_DOUBLE", [], -1;
    NeString = "NE_STRING", [], -1;
    NeObject = "NE_OBJECT", [], -1;
    GtInt = "GT_INT", [], -1;
    GtDouble = "GT_DOUBLE", [], -1;
    GtString = "GT_STRING", [], -1;
    GeInt = "GE_INT", [], -1;
    GeDouble = "GE_DOUBLE", [], -1;
    GeString = "GE_STRING", [], -1;
    LtInt = "LT_INT", [], -1;
    LtDouble = "LT_DOUBLE", [], -1;
    LtString = "LT_STRING", [], -1;
    LeInt = "LE_INT", [], -1;
    LeDouble = "LE_DOUBLE", [], -1;
    LeString = "LE_STRING", [], -1;
    LogicalNot = "LOGICAL_NOT", [], 0;

    // --- Stack ---
    Pop = "POP", [], -1;
    Duplicate = "DUPLICATE", [], 1;

    // --- Jumps (operand is an absolute pc after fixup) ---
    Jump = "JUMP", [Short], 0;
    JumpIfTrue = "JUMP_IF_TRUE", [Short], -1;
    JumpIfFalse = "JUMP_IF_FALSE", [Short], -1;

    // --- Calls ---
    PushFunction = "PUSH_FUNCTION", [Short], 1;
    /// Looks the method up on the object at the top of the stack, which stays as `this`.
    PushMethod = "PUSH_METHOD", [Short], 1;
    Invoke = "INVOKE", [], 0;
    Return = "RETURN", [], 0;

    // --- Objects ---
    New = "NEW", [Short], 1;
    NewArrayInt = "NEW_ARRAY_INT", [], 0;
    NewArrayDouble = "NEW_ARRAY_DOUBLE", [], 0;
    NewArrayObject = "NEW_ARRAY_OBJECT", [], 0;
    /// Collects the top `n` values into an array.
    NewArrayLiteralInt = "NEW_ARRAY_LITERAL_INT", [Short], 0;
    NewArrayLiteralDouble = "NEW_ARRAY_LITERAL_DOUBLE", [Short], 0;
    NewArrayLiteralObject = "NEW_ARRAY_LITERAL_OBJECT", [Short], 0;
    ArraySize = "ARRAY_SIZE", [], 0;
    StringLength = "STRING_LENGTH", [], 0;
    DownCast = "DOWN_CAST", [Short], 0;
    InstanceOf = "INSTANCEOF", [Short], 0;
}

impl Op {
    pub fn from_byte(byte: u8) -> Option<Op> {
        OPCODE_INFO.get(byte as usize).map(|info| info.op)
    }

    pub fn info(self) -> &'static OpcodeInfo {
        &OPCODE_INFO[self as usize]
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    /// Instructions whose operand is a label before fixup and a pc after it.
    pub fn is_jump(self) -> bool {
        matches!(self, Op::Jump | Op::JumpIfTrue | Op::JumpIfFalse)
    }
}
