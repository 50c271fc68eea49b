use super::*;
use crate::error::*;
use crate::zmachine::state::memory::{self, Version};
use crate::zmachine::ZMachine;

// Operand types pack four to a byte, two bits each, high bits first.
// 0b11 ends the list.
fn var_operand_type(type_byte: u8, index: u8) -> Option<OperandType> {
    match (type_byte >> (6 - (index * 2))) & 3 {
        0 => Some(OperandType::LargeConstant),
        1 => Some(OperandType::SmallConstant),
        2 => Some(OperandType::Variable),
        _ => None,
    }
}

// Long form carries one type bit per operand in bits 6 and 5
fn long_operand_type(opcode: u8, index: u8) -> OperandType {
    if opcode & (0x40 >> index) == 0 {
        OperandType::SmallConstant
    } else {
        OperandType::Variable
    }
}

fn push_type_byte(types: &mut Vec<OperandType>, b: u8) {
    for i in 0..4 {
        match var_operand_type(b, i) {
            Some(t) => types.push(t),
            None => break,
        }
    }
}

fn operand_types(
    bytes: &[u8],
    opcode: &Opcode,
    offset: usize,
) -> Result<(usize, Vec<OperandType>), RuntimeError> {
    let mut types = Vec::new();
    match opcode.form() {
        OpcodeForm::Short => {
            // Bits 5 and 4 hold the type, 0b11 meaning no operand
            if let Some(t) = var_operand_type(opcode.opcode(), 1) {
                types.push(t);
            }
            Ok((offset, types))
        }
        OpcodeForm::Long => {
            types.push(long_operand_type(opcode.opcode(), 0));
            types.push(long_operand_type(opcode.opcode(), 1));
            Ok((offset, types))
        }
        OpcodeForm::Var | OpcodeForm::Ext => {
            push_type_byte(&mut types, bytes[offset]);
            // CALL_VS2 and CALL_VN2 carry a second byte of types
            if opcode.form() == &OpcodeForm::Var
                && (opcode.opcode() == 0xEC || opcode.opcode() == 0xFA)
            {
                push_type_byte(&mut types, bytes[offset + 1]);
                Ok((offset + 2, types))
            } else {
                Ok((offset + 1, types))
            }
        }
    }
}

fn operands(
    bytes: &[u8],
    types: &[OperandType],
    mut offset: usize,
) -> Result<(usize, Vec<Operand>), RuntimeError> {
    let mut operands = Vec::with_capacity(types.len());
    for t in types {
        let value = match t {
            OperandType::LargeConstant => {
                offset += 2;
                memory::word_value(bytes[offset - 2], bytes[offset - 1])
            }
            OperandType::SmallConstant | OperandType::Variable => {
                offset += 1;
                bytes[offset - 1] as u16
            }
        };
        operands.push(Operand::new(*t, value));
    }

    Ok((offset, operands))
}

fn is_store_instruction(opcode: &Opcode) -> bool {
    let v5 = opcode.version() >= Version::V5;
    match opcode.form() {
        OpcodeForm::Ext => matches!(opcode.instruction(), 0x00..=0x04 | 0x09 | 0x0a),
        _ => match opcode.operand_count() {
            // CATCH stores in V5+
            OperandCount::_0OP => v5 && opcode.instruction() == 0x09,
            OperandCount::_1OP => matches!(opcode.instruction(), 0x01..=0x04 | 0x08 | 0x0e),
            OperandCount::_2OP => matches!(opcode.instruction(), 0x08 | 0x09 | 0x0f..=0x19),
            OperandCount::_VAR => {
                // AREAD stores in V5+
                matches!(opcode.instruction(), 0x00 | 0x07 | 0x0c | 0x16..=0x18)
                    || (v5 && opcode.instruction() == 0x04)
            }
        },
    }
}

fn result_variable(
    address: usize,
    bytes: &[u8],
    opcode: &Opcode,
    offset: usize,
) -> Result<(usize, Option<StoreResult>), RuntimeError> {
    if is_store_instruction(opcode) {
        Ok((offset + 1, Some(StoreResult::new(address, bytes[offset]))))
    } else {
        Ok((offset, None))
    }
}

// Offsets 0 and 1 mean RFALSE and RTRUE, not a branch
fn branch_address(address: usize, offset: i16) -> usize {
    match offset {
        0 => 0,
        1 => 1,
        _ => ((address as isize) + offset as isize) as usize,
    }
}

fn branch_condition(
    address: usize,
    bytes: &[u8],
    offset: usize,
) -> Result<(usize, Option<Branch>), RuntimeError> {
    let b = bytes[offset];
    let condition = b & 0x80 == 0x80;
    if b & 0x40 == 0x40 {
        // Single byte, 6-bit unsigned offset
        let target = branch_address(address + offset - 1, (b & 0x3f) as i16);
        Ok((
            offset + 1,
            Some(Branch::new(address + offset, condition, target)),
        ))
    } else {
        // Two bytes, 14-bit signed offset
        let mut o = ((b as u16 & 0x3f) << 8) | bytes[offset + 1] as u16;
        if o & 0x2000 == 0x2000 {
            o |= 0xC000;
        }
        let target = branch_address(address + offset, o as i16);
        Ok((
            offset + 2,
            Some(Branch::new(address + offset, condition, target)),
        ))
    }
}

fn is_branch_instruction(opcode: &Opcode) -> bool {
    match opcode.form() {
        OpcodeForm::Ext => false,
        _ => match opcode.operand_count() {
            OperandCount::_0OP => match opcode.instruction() {
                0x0d | 0x0f => true,
                // SAVE and RESTORE branch in V3
                0x05 | 0x06 => opcode.version() == Version::V3,
                _ => false,
            },
            OperandCount::_1OP => opcode.instruction() < 0x03,
            OperandCount::_2OP => matches!(opcode.instruction(), 0x01..=0x07 | 0x0a),
            OperandCount::_VAR => matches!(opcode.instruction(), 0x17 | 0x1f),
        },
    }
}

fn branch(
    address: usize,
    bytes: &[u8],
    opcode: &Opcode,
    offset: usize,
) -> Result<(usize, Option<Branch>), RuntimeError> {
    if is_branch_instruction(opcode) {
        branch_condition(address, bytes, offset)
    } else {
        Ok((offset, None))
    }
}

fn opcode(bytes: &[u8], version: Version, offset: usize) -> Result<(usize, Opcode), RuntimeError> {
    // 0xBE prefixes the extended opcode table
    if bytes[offset] == 0xBE {
        let op = bytes[offset + 1];
        let opcode = Opcode::new(version, op, op, OpcodeForm::Ext, OperandCount::_VAR);
        return Ok((offset + 2, opcode));
    }

    let op = bytes[offset];
    let (form, instruction, operand_count) = match op >> 6 {
        3 => (
            OpcodeForm::Var,
            op & 0x1F,
            if op & 0x20 == 0x20 {
                OperandCount::_VAR
            } else {
                OperandCount::_2OP
            },
        ),
        2 => (
            OpcodeForm::Short,
            op & 0xF,
            if op & 0x30 == 0x30 {
                OperandCount::_0OP
            } else {
                OperandCount::_1OP
            },
        ),
        _ => (OpcodeForm::Long, op & 0x1F, OperandCount::_2OP),
    };

    Ok((
        offset + 1,
        Opcode::new(version, op, instruction, form, operand_count),
    ))
}

pub fn decode_instruction(vm: &ZMachine, address: usize) -> Result<Instruction, RuntimeError> {
    let bytes = vm.instruction(address);
    let (offset, opcode) = opcode(&bytes, vm.version(), 0)?;
    let (offset, types) = operand_types(&bytes, &opcode, offset)?;
    let (offset, operands) = operands(&bytes, &types, offset)?;
    let (offset, store) = result_variable(address + offset, &bytes, &opcode, offset)?;
    let (offset, branch) = branch(address, &bytes, &opcode, offset)?;

    Ok(Instruction::new(
        address,
        opcode,
        operands,
        store,
        branch,
        address + offset,
    ))
}
