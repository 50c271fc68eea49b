//! Decoded instructions and their component parts
use std::fmt;

use crate::zmachine::state::memory::Version;

pub mod decoder;
pub mod processor;

/// How the opcode was encoded: single byte (short or long form), or
/// with a separate operand type byte (variable and extended forms).
#[derive(Debug, Eq, PartialEq)]
pub enum OpcodeForm {
    Short,
    Long,
    Var,
    Ext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    LargeConstant,
    SmallConstant,
    Variable,
}

#[derive(Debug, Eq, PartialEq)]
pub enum OperandCount {
    _0OP,
    _1OP,
    _2OP,
    _VAR,
}

/// Writes a variable reference the way a disassembly would: the stack,
/// a local `Lxx`, or a global `Gxx`.
fn format_variable(f: &mut fmt::Formatter, variable: u8, push: bool) -> fmt::Result {
    match variable {
        0 if push => write!(f, "-(SP)"),
        0 => write!(f, "(SP)+"),
        1..=15 => write!(f, "L{:02x}", variable - 1),
        _ => write!(f, "G{:02x}", variable - 16),
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Operand {
    operand_type: OperandType,
    value: u16,
}

impl Operand {
    pub(crate) fn new(operand_type: OperandType, value: u16) -> Operand {
        Operand {
            operand_type,
            value,
        }
    }

    pub fn operand_type(&self) -> OperandType {
        self.operand_type
    }

    pub fn value(&self) -> u16 {
        self.value
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.operand_type {
            OperandType::LargeConstant => write!(f, "#{:04x}", self.value),
            OperandType::SmallConstant => write!(f, "#{:02x}", self.value as u8),
            OperandType::Variable => format_variable(f, self.value as u8, false),
        }
    }
}

/// Where an instruction stores its result: the variable, plus the byte
/// address of the store variable within the instruction itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoreResult {
    address: usize,
    variable: u8,
}

impl StoreResult {
    pub fn new(address: usize, variable: u8) -> StoreResult {
        StoreResult { address, variable }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn variable(&self) -> u8 {
        self.variable
    }
}

impl fmt::Display for StoreResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        format_variable(f, self.variable, true)
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Branch {
    address: usize,
    condition: bool,
    branch_address: usize,
}

impl Branch {
    pub(crate) fn new(address: usize, condition: bool, branch_address: usize) -> Branch {
        Branch {
            address,
            condition,
            branch_address,
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn condition(&self) -> bool {
        self.condition
    }

    /// Addresses 0 and 1 mean return-false and return-true; anything
    /// else is a jump target.
    pub fn branch_address(&self) -> usize {
        self.branch_address
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.branch_address {
            0 => write!(f, "[{}] RFALSE", self.condition),
            1 => write!(f, "[{}] RTRUE", self.condition),
            address => write!(f, "[{}] ${:05x}", self.condition, address),
        }
    }
}

pub struct Opcode {
    version: Version,
    opcode: u8,
    form: OpcodeForm,
    instruction: u8,
    operand_count: OperandCount,
}

impl Opcode {
    pub fn new(
        version: Version,
        opcode: u8,
        instruction: u8,
        form: OpcodeForm,
        operand_count: OperandCount,
    ) -> Opcode {
        Opcode {
            version,
            opcode,
            instruction,
            form,
            operand_count,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn form(&self) -> &OpcodeForm {
        &self.form
    }

    pub fn instruction(&self) -> u8 {
        self.instruction
    }

    pub fn operand_count(&self) -> &OperandCount {
        &self.operand_count
    }

    /// Disassembly mnemonic.  A few opcode numbers were reassigned in
    /// V5, so the name depends on the version as well.
    fn name(&self) -> &'static str {
        let v5 = self.version >= Version::V5;
        if self.form == OpcodeForm::Ext {
            return match self.instruction {
                0x00 => "SAVE",
                0x01 => "RESTORE",
                0x02 => "LOG_SHIFT",
                0x03 => "ART_SHIFT",
                0x04 => "SET_FONT",
                0x09 => "SAVE_UNDO",
                0x0A => "RESTORE_UNDO",
                _ => "UNKNOWN!",
            };
        }

        match (&self.operand_count, self.instruction) {
            (OperandCount::_0OP, 0x0) => "RTRUE",
            (OperandCount::_0OP, 0x1) => "RFALSE",
            (OperandCount::_0OP, 0x2) => "PRINT",
            (OperandCount::_0OP, 0x3) => "PRINT_RET",
            (OperandCount::_0OP, 0x4) => "NOP",
            (OperandCount::_0OP, 0x5) => "SAVE",
            (OperandCount::_0OP, 0x6) => "RESTORE",
            (OperandCount::_0OP, 0x7) => "RESTART",
            (OperandCount::_0OP, 0x8) => "RET_POPPED",
            (OperandCount::_0OP, 0x9) if v5 => "CATCH",
            (OperandCount::_0OP, 0x9) => "POP",
            (OperandCount::_0OP, 0xA) => "QUIT",
            (OperandCount::_0OP, 0xB) => "NEW_LINE",
            (OperandCount::_0OP, 0xC) => "SHOW_STATUS",
            (OperandCount::_0OP, 0xD) => "VERIFY",
            (OperandCount::_0OP, 0xF) => "PIRACY",
            (OperandCount::_1OP, 0x0) => "JZ",
            (OperandCount::_1OP, 0x1) => "GET_SIBLING",
            (OperandCount::_1OP, 0x2) => "GET_CHILD",
            (OperandCount::_1OP, 0x3) => "GET_PARENT",
            (OperandCount::_1OP, 0x4) => "GET_PROP_LEN",
            (OperandCount::_1OP, 0x5) => "INC",
            (OperandCount::_1OP, 0x6) => "DEC",
            (OperandCount::_1OP, 0x7) => "PRINT_ADDR",
            (OperandCount::_1OP, 0x8) => "CALL_1S",
            (OperandCount::_1OP, 0x9) => "REMOVE_OBJ",
            (OperandCount::_1OP, 0xA) => "PRINT_OBJ",
            (OperandCount::_1OP, 0xB) => "RET",
            (OperandCount::_1OP, 0xC) => "JUMP",
            (OperandCount::_1OP, 0xD) => "PRINT_PADDR",
            (OperandCount::_1OP, 0xE) => "LOAD",
            (OperandCount::_1OP, 0xF) if v5 => "CALL_1N",
            (OperandCount::_1OP, 0xF) => "NOT",
            (OperandCount::_2OP, 0x01) => "JE",
            (OperandCount::_2OP, 0x02) => "JL",
            (OperandCount::_2OP, 0x03) => "JG",
            (OperandCount::_2OP, 0x04) => "DEC_CHK",
            (OperandCount::_2OP, 0x05) => "INC_CHK",
            (OperandCount::_2OP, 0x06) => "JIN",
            (OperandCount::_2OP, 0x07) => "TEST",
            (OperandCount::_2OP, 0x08) => "OR",
            (OperandCount::_2OP, 0x09) => "AND",
            (OperandCount::_2OP, 0x0A) => "TEST_ATTR",
            (OperandCount::_2OP, 0x0B) => "SET_ATTR",
            (OperandCount::_2OP, 0x0C) => "CLEAR_ATTR",
            (OperandCount::_2OP, 0x0D) => "STORE",
            (OperandCount::_2OP, 0x0E) => "INSERT_OBJ",
            (OperandCount::_2OP, 0x0F) => "LOADW",
            (OperandCount::_2OP, 0x10) => "LOADB",
            (OperandCount::_2OP, 0x11) => "GET_PROP",
            (OperandCount::_2OP, 0x12) => "GET_PROP_ADDR",
            (OperandCount::_2OP, 0x13) => "GET_NEXT_PROP",
            (OperandCount::_2OP, 0x14) => "ADD",
            (OperandCount::_2OP, 0x15) => "SUB",
            (OperandCount::_2OP, 0x16) => "MUL",
            (OperandCount::_2OP, 0x17) => "DIV",
            (OperandCount::_2OP, 0x18) => "MOD",
            (OperandCount::_2OP, 0x19) => "CALL_2S",
            (OperandCount::_2OP, 0x1A) => "CALL_2N",
            (OperandCount::_2OP, 0x1B) => "SET_COLOUR",
            (OperandCount::_2OP, 0x1C) => "THROW",
            (OperandCount::_VAR, 0x00) if v5 => "CALL_VS",
            (OperandCount::_VAR, 0x00) => "CALL",
            (OperandCount::_VAR, 0x01) => "STOREW",
            (OperandCount::_VAR, 0x02) => "STOREB",
            (OperandCount::_VAR, 0x03) => "PUT_PROP",
            (OperandCount::_VAR, 0x04) if v5 => "AREAD",
            (OperandCount::_VAR, 0x04) => "SREAD",
            (OperandCount::_VAR, 0x05) => "PRINT_CHAR",
            (OperandCount::_VAR, 0x06) => "PRINT_NUM",
            (OperandCount::_VAR, 0x07) => "RANDOM",
            (OperandCount::_VAR, 0x08) => "PUSH",
            (OperandCount::_VAR, 0x09) => "PULL",
            (OperandCount::_VAR, 0x0A) => "SPLIT_WINDOW",
            (OperandCount::_VAR, 0x0B) => "SET_WINDOW",
            (OperandCount::_VAR, 0x0C) => "CALL_VS2",
            (OperandCount::_VAR, 0x0D) => "ERASE_WINDOW",
            (OperandCount::_VAR, 0x0E) => "ERASE_LINE",
            (OperandCount::_VAR, 0x0F) => "SET_CURSOR",
            (OperandCount::_VAR, 0x10) => "GET_CURSOR",
            (OperandCount::_VAR, 0x11) => "SET_TEXT_STYLE",
            (OperandCount::_VAR, 0x12) => "BUFFER_MODE",
            (OperandCount::_VAR, 0x13) => "OUTPUT_STREAM",
            (OperandCount::_VAR, 0x14) => "INPUT_STREAM",
            (OperandCount::_VAR, 0x15) => "SOUND_EFFECT",
            (OperandCount::_VAR, 0x16) => "READ_CHAR",
            (OperandCount::_VAR, 0x17) => "SCAN_TABLE",
            (OperandCount::_VAR, 0x18) => "NOT",
            (OperandCount::_VAR, 0x19) => "CALL_VN",
            (OperandCount::_VAR, 0x1A) => "CALL_VN2",
            (OperandCount::_VAR, 0x1B) => "TOKENISE",
            (OperandCount::_VAR, 0x1C) => "ENCODE_TEXT",
            (OperandCount::_VAR, 0x1D) => "COPY_TABLE",
            (OperandCount::_VAR, 0x1E) => "PRINT_TABLE",
            (OperandCount::_VAR, 0x1F) => "CHECK_ARG_COUNT",
            _ => "UNKNOWN!",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct Instruction {
    address: usize,
    opcode: Opcode,
    operands: Vec<Operand>,
    store: Option<StoreResult>,
    branch: Option<Branch>,
    next_address: usize,
}

impl Instruction {
    pub(crate) fn new(
        address: usize,
        opcode: Opcode,
        operands: Vec<Operand>,
        store: Option<StoreResult>,
        branch: Option<Branch>,
        next_address: usize,
    ) -> Instruction {
        Instruction {
            address,
            opcode,
            operands,
            store,
            branch,
            next_address,
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn opcode(&self) -> &Opcode {
        &self.opcode
    }

    pub fn operands(&self) -> &Vec<Operand> {
        &self.operands
    }

    pub fn store(&self) -> Option<&StoreResult> {
        self.store.as_ref()
    }

    pub fn branch(&self) -> Option<&Branch> {
        self.branch.as_ref()
    }

    /// Address of the next instruction in sequence, before any branch,
    /// call, or return redirection.
    pub fn next_address(&self) -> usize {
        self.next_address
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "${:05x} ", self.address)?;
        if self.opcode.form == OpcodeForm::Ext {
            write!(f, "be ")?;
        }
        write!(f, "{:02x} {}", self.opcode.opcode, self.opcode)?;
        for operand in &self.operands {
            write!(f, " {}", operand)?;
        }
        if let Some(store) = &self.store {
            write!(f, " -> {}", store)?;
        }
        if let Some(branch) = &self.branch {
            write!(f, " {}", branch)?;
        }
        Ok(())
    }
}
