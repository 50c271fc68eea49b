use crate::error::{ErrorCode, RuntimeError};
use crate::fatal_error;
use crate::instruction::{decoder, Instruction};
use crate::zmachine::ZMachine;

use super::{operand_values, store_result};

pub fn save(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    if !operands.is_empty() {
        return fatal_error!(
            ErrorCode::UnimplementedInstruction,
            "SAVE with a table argument is not implemented"
        );
    }

    let pc = match instruction.store() {
        Some(r) => r.address(),
        None => {
            return fatal_error!(ErrorCode::Save, "SAVE should be a store instruction");
        }
    };

    match vm.save(pc) {
        Ok(_) => store_result(vm, instruction, 1)?,
        // An interrupted filename prompt rewinds and repeats on resume
        Err(e) if e.is_interrupt() => return Err(e),
        Err(e) => {
            vm.print_str(format!("Error saving: {}\r", e))?;
            store_result(vm, instruction, 0)?;
        }
    }

    Ok(instruction.next_address())
}

pub fn restore(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    if !operands.is_empty() {
        return fatal_error!(
            ErrorCode::UnimplementedInstruction,
            "RESTORE with a table argument is not implemented"
        );
    }

    match vm.restore() {
        Ok(Some(address)) => {
            // Execution resumes at the SAVE instruction's store byte, which
            // follows the 2-byte opcode and the operand type byte
            let i = decoder::decode_instruction(vm, address - 3)?;
            store_result(vm, &i, 2)?;
            Ok(i.next_address())
        }
        Ok(None) => {
            store_result(vm, instruction, 0)?;
            Ok(instruction.next_address())
        }
        Err(e) if e.is_interrupt() => Err(e),
        Err(e) => {
            vm.print_str(format!("Error restoring: {}\r", e))?;
            store_result(vm, instruction, 0)?;
            Ok(instruction.next_address())
        }
    }
}

pub fn log_shift(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let value = operands[0];
    let places = operands[1] as i16;
    let new_value = if places < 0 && places > -16 {
        u16::overflowing_shr(value, places.unsigned_abs() as u32).0
    } else if places > 0 && places < 16 {
        u16::overflowing_shl(value, places as u32).0
    } else if places == 0 {
        value
    } else {
        return fatal_error!(
            ErrorCode::InvalidShift,
            "LOG_SHIFT of {:04x} by {} places",
            value,
            places
        );
    };

    store_result(vm, instruction, new_value)?;
    Ok(instruction.next_address())
}

pub fn art_shift(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let value = operands[0] as i16;
    let places = operands[1] as i16;
    let new_value = if places < 0 && places > -16 {
        i16::overflowing_shr(value, places.unsigned_abs() as u32).0
    } else if places > 0 && places < 16 {
        i16::overflowing_shl(value, places as u32).0
    } else if places == 0 {
        value
    } else {
        return fatal_error!(
            ErrorCode::InvalidShift,
            "ART_SHIFT of {:04x} by {} places",
            value,
            places
        );
    };

    store_result(vm, instruction, new_value as u16)?;
    Ok(instruction.next_address())
}

pub fn set_font(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let result = vm.set_font(operands[0])?;
    store_result(vm, instruction, result)?;
    Ok(instruction.next_address())
}

pub fn save_undo(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let pc = match instruction.store() {
        Some(r) => r.address(),
        None => {
            return fatal_error!(ErrorCode::Save, "SAVE_UNDO should be a store instruction");
        }
    };

    match vm.save_undo(pc) {
        Ok(_) => store_result(vm, instruction, 1)?,
        Err(e) => {
            error!(target: "app::state", "Error storing undo state: {}", e);
            store_result(vm, instruction, 0)?;
        }
    }
    Ok(instruction.next_address())
}

pub fn restore_undo(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    match vm.restore_undo() {
        Ok(Some(address)) => {
            let i = decoder::decode_instruction(vm, address - 3)?;
            store_result(vm, &i, 2)?;
            Ok(i.next_address())
        }
        Ok(None) => {
            store_result(vm, instruction, 0)?;
            Ok(instruction.next_address())
        }
        Err(e) => {
            error!(target: "app::state", "Error restoring undo state: {}", e);
            store_result(vm, instruction, 0)?;
            Ok(instruction.next_address())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use crate::{
        assert_ok_eq,
        instruction::{processor::dispatch, Opcode, OpcodeForm, OperandCount, OperandType},
        test_util::*,
        zmachine::state::memory::Version,
    };

    fn opcode(version: u8, instruction: u8) -> Opcode {
        Opcode::new(
            Version::try_from(version).expect("invalid test version"),
            instruction,
            instruction,
            OpcodeForm::Ext,
            OperandCount::_VAR,
        )
    }

    // SAVE as it would be decoded from memory: BE 00 FF, store byte
    fn mock_save_bytes(map: &mut [u8], address: usize, ext: u8, variable: u8) {
        map[address] = 0xBE;
        map[address + 1] = ext;
        map[address + 2] = 0xFF;
        map[address + 3] = variable;
    }

    #[test]
    fn test_save() {
        reply_file_name("test-xs5.ifzs");

        let mut map = test_map(5);
        mock_save_bytes(&mut map, 0x480, 0x00, 0x80);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(0x480, vec![], opcode(5, 0), 0x484, store(0x483, 0x80));

        let a = dispatch(&mut vm, &i);
        assert!(Path::new("test-xs5.ifzs").exists());
        assert!(fs::remove_file(Path::new("test-xs5.ifzs")).is_ok());
        assert!(a.is_ok_and(|x| x == 0x484));
        assert_ok_eq!(vm.variable(0x80), 1);
    }

    #[test]
    fn test_save_fail() {
        reply_file_name("/no-such-dir/test.ifzs");

        let mut map = test_map(5);
        mock_save_bytes(&mut map, 0x480, 0x00, 0x80);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(0x480, vec![], opcode(5, 0), 0x484, store(0x483, 0x80));

        assert_ok_eq!(dispatch(&mut vm, &i), 0x484);
        assert_ok_eq!(vm.variable(0x80), 0);
    }

    #[test]
    fn test_save_table_argument() {
        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(
            0x480,
            vec![operand(OperandType::LargeConstant, 0x380)],
            opcode(5, 0),
            0x486,
            store(0x485, 0x80),
        );

        assert!(dispatch(&mut vm, &i).is_err());
    }

    #[test]
    fn test_restore() {
        reply_file_name("test-xr5.ifzs");

        let mut map = test_map(5);
        mock_save_bytes(&mut map, 0x480, 0x00, 0x80);
        let mut vm = mock_zmachine(map);
        let save = mock_store_instruction(0x480, vec![], opcode(5, 0), 0x484, store(0x483, 0x80));

        let a = dispatch(&mut vm, &save);
        assert!(Path::new("test-xr5.ifzs").exists());
        assert!(a.is_ok_and(|x| x == 0x484));

        reply_file_name("test-xr5.ifzs");
        let restore =
            mock_store_instruction(0x490, vec![], opcode(5, 1), 0x494, store(0x493, 0x81));
        let a = dispatch(&mut vm, &restore);
        assert!(fs::remove_file(Path::new("test-xr5.ifzs")).is_ok());
        // Stores 2 via the re-decoded save instruction
        assert!(a.is_ok_and(|x| x == 0x484));
        assert_ok_eq!(vm.variable(0x80), 2);
    }

    #[test]
    fn test_restore_fail() {
        reply_file_name("no-such-file.ifzs");

        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(0x490, vec![], opcode(5, 1), 0x494, store(0x493, 0x81));

        assert_ok_eq!(dispatch(&mut vm, &i), 0x494);
        assert_ok_eq!(vm.variable(0x81), 0);
    }

    #[test]
    fn test_log_shift_left() {
        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(
            0x400,
            vec![
                operand(OperandType::LargeConstant, 0x8001),
                operand(OperandType::SmallConstant, 1),
            ],
            opcode(5, 2),
            0x406,
            store(0x405, 0x80),
        );

        assert_ok_eq!(dispatch(&mut vm, &i), 0x406);
        assert_ok_eq!(vm.variable(0x80), 0x0002);
    }

    #[test]
    fn test_log_shift_right() {
        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(
            0x400,
            vec![
                operand(OperandType::LargeConstant, 0x8000),
                operand(OperandType::LargeConstant, 0xFFFF),
            ],
            opcode(5, 2),
            0x406,
            store(0x405, 0x80),
        );

        // Logical shift fills with 0
        assert_ok_eq!(dispatch(&mut vm, &i), 0x406);
        assert_ok_eq!(vm.variable(0x80), 0x4000);
    }

    #[test]
    fn test_log_shift_zero() {
        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(
            0x400,
            vec![
                operand(OperandType::LargeConstant, 0x1234),
                operand(OperandType::SmallConstant, 0),
            ],
            opcode(5, 2),
            0x406,
            store(0x405, 0x80),
        );

        assert_ok_eq!(dispatch(&mut vm, &i), 0x406);
        assert_ok_eq!(vm.variable(0x80), 0x1234);
    }

    #[test]
    fn test_log_shift_invalid() {
        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(
            0x400,
            vec![
                operand(OperandType::LargeConstant, 0x1234),
                operand(OperandType::SmallConstant, 16),
            ],
            opcode(5, 2),
            0x406,
            store(0x405, 0x80),
        );

        assert!(dispatch(&mut vm, &i).is_err());
    }

    #[test]
    fn test_art_shift_left() {
        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(
            0x400,
            vec![
                operand(OperandType::LargeConstant, 0x4001),
                operand(OperandType::SmallConstant, 1),
            ],
            opcode(5, 3),
            0x406,
            store(0x405, 0x80),
        );

        assert_ok_eq!(dispatch(&mut vm, &i), 0x406);
        assert_ok_eq!(vm.variable(0x80), 0x8002);
    }

    #[test]
    fn test_art_shift_right() {
        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(
            0x400,
            vec![
                operand(OperandType::LargeConstant, 0x8000),
                operand(OperandType::LargeConstant, 0xFFFF),
            ],
            opcode(5, 3),
            0x406,
            store(0x405, 0x80),
        );

        // Arithmetic shift preserves the sign bit
        assert_ok_eq!(dispatch(&mut vm, &i), 0x406);
        assert_ok_eq!(vm.variable(0x80), 0xC000);
    }

    #[test]
    fn test_art_shift_invalid() {
        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(
            0x400,
            vec![
                operand(OperandType::LargeConstant, 0x1234),
                operand(OperandType::LargeConstant, 0xFFF0),
            ],
            opcode(5, 3),
            0x406,
            store(0x405, 0x80),
        );

        assert!(dispatch(&mut vm, &i).is_err());
    }

    #[test]
    fn test_set_font() {
        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(
            0x400,
            vec![operand(OperandType::SmallConstant, 4)],
            opcode(5, 4),
            0x403,
            store(0x402, 0x80),
        );

        // The previous font is stored
        assert_ok_eq!(dispatch(&mut vm, &i), 0x403);
        assert_ok_eq!(vm.variable(0x80), 1);
    }

    #[test]
    fn test_save_undo() {
        let mut map = test_map(5);
        mock_save_bytes(&mut map, 0x480, 0x09, 0x80);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(0x480, vec![], opcode(5, 9), 0x484, store(0x483, 0x80));

        assert_ok_eq!(dispatch(&mut vm, &i), 0x484);
        assert_ok_eq!(vm.variable(0x80), 1);
    }

    #[test]
    fn test_restore_undo() {
        let mut map = test_map(5);
        mock_save_bytes(&mut map, 0x480, 0x09, 0x80);
        let mut vm = mock_zmachine(map);
        let save = mock_store_instruction(0x480, vec![], opcode(5, 9), 0x484, store(0x483, 0x80));
        assert_ok_eq!(dispatch(&mut vm, &save), 0x484);
        assert_ok_eq!(vm.variable(0x80), 1);

        let restore =
            mock_store_instruction(0x490, vec![], opcode(5, 0xa), 0x494, store(0x493, 0x81));
        let a = dispatch(&mut vm, &restore);
        // Stores 2 via the re-decoded save_undo instruction
        assert!(a.is_ok_and(|x| x == 0x484));
        assert_ok_eq!(vm.variable(0x80), 2);
    }

    #[test]
    fn test_restore_undo_no_state() {
        let map = test_map(5);
        let mut vm = mock_zmachine(map);
        let i = mock_store_instruction(0x490, vec![], opcode(5, 0xa), 0x494, store(0x493, 0x81));

        assert_ok_eq!(dispatch(&mut vm, &i), 0x494);
        assert_ok_eq!(vm.variable(0x81), 0);
    }
}
