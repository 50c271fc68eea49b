use crate::error::{ErrorCode, RuntimeError};
use crate::fatal_error;
use crate::instruction::{decoder, Instruction};
use crate::text;
use crate::zmachine::state::header::HeaderField;
use crate::zmachine::state::memory::Version;
use crate::zmachine::ZMachine;

use super::{branch, store_result};

pub fn rtrue(vm: &mut ZMachine, _instruction: &Instruction) -> Result<usize, RuntimeError> {
    vm.return_routine(1)
}

pub fn rfalse(vm: &mut ZMachine, _instruction: &Instruction) -> Result<usize, RuntimeError> {
    vm.return_routine(0)
}

pub fn print(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let ztext = vm.string_literal(instruction.address() + 1)?;
    let text = text::from_vec(vm, &ztext)?;
    vm.print(&text)?;
    // The literal sits between the opcode and the next instruction
    Ok(instruction.next_address() + (ztext.len() * 2))
}

pub fn print_ret(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let ztext = vm.string_literal(instruction.address() + 1)?;
    let text = text::from_vec(vm, &ztext)?;
    vm.print(&text)?;
    vm.new_line()?;
    vm.return_routine(1)
}

pub fn nop(_vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    Ok(instruction.next_address())
}

// V3 branches on success, V4+ stores a result
fn save_result(
    vm: &mut ZMachine,
    instruction: &Instruction,
    success: bool,
) -> Result<usize, RuntimeError> {
    if vm.version() == Version::V3 {
        branch(vm, instruction, success)
    } else {
        store_result(vm, instruction, u16::from(success))?;
        Ok(instruction.next_address())
    }
}

pub fn save(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    // The saved pc addresses the branch or store byte, so a restored game
    // re-runs the tail of the SAVE instruction
    let pc = if vm.version() == Version::V3 {
        match instruction.branch() {
            Some(b) => b.address(),
            None => return fatal_error!(ErrorCode::Save, "V3 SAVE is a branch instruction"),
        }
    } else {
        match instruction.store() {
            Some(r) => r.address(),
            None => return fatal_error!(ErrorCode::Save, "V5 SAVE is a store instruction"),
        }
    };

    match vm.save(pc) {
        Ok(_) => save_result(vm, instruction, true),
        // An interrupted filename prompt rewinds and repeats on resume
        Err(e) if e.is_interrupt() => Err(e),
        Err(e) => {
            vm.print_str(format!("Error saving: {}\r", e))?;
            save_result(vm, instruction, false)
        }
    }
}

pub fn restore(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    match vm.restore() {
        Ok(Some(address)) => {
            // The stored pc addresses the byte after the SAVE opcode
            let save_instruction = decoder::decode_instruction(vm, address - 1)?;
            if vm.version() == Version::V3 {
                branch(vm, &save_instruction, true)
            } else {
                store_result(vm, &save_instruction, 2)?;
                Ok(save_instruction.next_address())
            }
        }
        Ok(None) => save_result(vm, instruction, false),
        Err(e) if e.is_interrupt() => Err(e),
        Err(e) => {
            vm.print_str(format!("Error restoring: {}\r", e))?;
            save_result(vm, instruction, false)
        }
    }
}

pub fn restart(vm: &mut ZMachine, _instruction: &Instruction) -> Result<usize, RuntimeError> {
    vm.restart()
}

pub fn ret_popped(vm: &mut ZMachine, _instruction: &Instruction) -> Result<usize, RuntimeError> {
    let value = vm.variable(0)?;
    vm.return_routine(value)
}

pub fn pop(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    vm.variable(0)?;
    Ok(instruction.next_address())
}

pub fn catch(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let depth = vm.frame_count();
    store_result(vm, instruction, depth as u16)?;
    Ok(instruction.next_address())
}

pub fn quit(vm: &mut ZMachine, _instruction: &Instruction) -> Result<usize, RuntimeError> {
    vm.quit()?;
    Ok(0)
}

pub fn new_line(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    vm.new_line()?;
    Ok(instruction.next_address())
}

pub fn show_status(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    vm.status_line()?;
    Ok(instruction.next_address())
}

pub fn verify(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let expected = vm.header_word(HeaderField::Checksum)?;
    let checksum = vm.checksum()?;
    branch(vm, instruction, expected == checksum)
}

pub fn piracy(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    branch(vm, instruction, true)
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use crate::instruction::processor::dispatch;
    use crate::instruction::{Instruction, Opcode, OpcodeForm, OperandCount};
    use crate::test_util::*;
    use crate::zmachine::state::memory::Version;
    use crate::{assert_ok_eq, assert_print};

    fn opcode(version: u8, instruction: u8) -> Opcode {
        Opcode::new(
            Version::try_from(version).expect("invalid test version"),
            instruction,
            instruction,
            OpcodeForm::Short,
            OperandCount::_0OP,
        )
    }

    fn plain_op(version: u8, op: u8, address: usize, next: usize) -> Instruction {
        mock_instruction(address, vec![], opcode(version, op), next)
    }

    fn branch_op(version: u8, op: u8, address: usize, next: usize, target: usize) -> Instruction {
        mock_branch_instruction(
            address,
            vec![],
            opcode(version, op),
            next,
            branch(next - 1, true, target),
        )
    }

    // Map with object 1 named "Status Object" wired to the status globals
    fn status_map(timed: bool, score: u16, turns: u16) -> Vec<u8> {
        let mut map = test_map(3);
        if timed {
            map[0x01] = 0x02;
        }
        mock_object(
            &mut map,
            1,
            vec![0x1319, 0x1B3A, 0x6004, 0x50EF, 0xA919],
            (0, 0, 0),
        );
        set_variable(&mut map, 0x10, 1);
        set_variable(&mut map, 0x11, score);
        set_variable(&mut map, 0x12, turns);
        map
    }

    #[test]
    fn test_rtrue() {
        let mut map = test_map(5);
        set_variable(&mut map, 0x80, 0xFF);
        let mut vm = mock_zmachine(map);
        mock_frame(&mut vm, 0x500, Some(0x80), 0x482);
        assert_eq!(vm.frame_count(), 2);

        let i = plain_op(5, 0, 0x500, 0x501);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x482);
        assert_eq!(vm.frame_count(), 1);
        assert_ok_eq!(vm.variable(0x80), 0x01);
    }

    #[test]
    fn test_rfalse() {
        let mut map = test_map(5);
        set_variable(&mut map, 0x80, 0xFF);
        let mut vm = mock_zmachine(map);
        mock_frame(&mut vm, 0x500, Some(0x80), 0x482);

        let i = plain_op(5, 1, 0x500, 0x501);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x482);
        assert_ok_eq!(vm.variable(0x80), 0x00);
    }

    #[test]
    fn test_print() {
        let mut map = test_map(5);
        // "Hello"
        map[0x481] = 0x11;
        map[0x482] = 0xaa;
        map[0x483] = 0xc6;
        map[0x484] = 0x34;
        let mut vm = mock_zmachine(map);

        let i = plain_op(5, 2, 0x480, 0x481);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x485);
        assert_print!("Hello");
    }

    #[test]
    fn test_print_ret() {
        let mut map = test_map(5);
        set_variable(&mut map, 0x80, 0xFF);
        // "Hello"
        map[0x502] = 0x11;
        map[0x503] = 0xaa;
        map[0x504] = 0xc6;
        map[0x505] = 0x34;
        let mut vm = mock_zmachine(map);
        mock_frame(&mut vm, 0x500, Some(0x80), 0x482);

        let i = plain_op(5, 3, 0x501, 0x502);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x482);
        assert_eq!(vm.frame_count(), 1);
        assert_print!("Hello\n");
        assert_ok_eq!(vm.variable(0x80), 0x01);
    }

    #[test]
    fn test_nop() {
        let mut vm = mock_zmachine(test_map(3));
        let i = plain_op(3, 4, 0x400, 0x401);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x401);
    }

    #[test]
    fn test_save_v3() {
        reply_file_name("test-0s3.ifzs");
        let mut vm = mock_zmachine(test_map(3));
        let i = branch_op(3, 5, 0x480, 0x482, 0x484);

        let a = dispatch(&mut vm, &i);
        assert!(Path::new("test-0s3.ifzs").exists());
        assert!(fs::remove_file(Path::new("test-0s3.ifzs")).is_ok());
        assert_ok_eq!(a, 0x484);
    }

    #[test]
    fn test_save_v3_fail() {
        reply_file_name("/no-such-dir/test.ifzs");
        let mut vm = mock_zmachine(test_map(3));
        let i = branch_op(3, 5, 0x480, 0x482, 0x484);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x482);
    }

    #[test]
    fn test_save_v3_not_a_branch() {
        let mut vm = mock_zmachine(test_map(3));
        let i = plain_op(3, 5, 0x480, 0x482);
        assert!(dispatch(&mut vm, &i).is_err());
    }

    #[test]
    fn test_restore_v3() {
        reply_file_name("test-0r3.ifzs");
        let mut map = test_map(3);
        // The SAVE instruction the restore will re-decode
        map[0x480] = 0xb5;
        map[0x481] = 0xc9;
        let mut vm = mock_zmachine(map);

        let save = branch_op(3, 5, 0x480, 0x482, 0x483);
        let a = dispatch(&mut vm, &save);
        assert!(Path::new("test-0r3.ifzs").exists());
        assert_ok_eq!(a, 0x483);

        reply_file_name("test-0r3.ifzs");
        let restore = branch_op(3, 6, 0x480, 0x482, 0x490);
        let a = dispatch(&mut vm, &restore);
        assert!(fs::remove_file(Path::new("test-0r3.ifzs")).is_ok());
        // Branches via the re-decoded SAVE instruction
        assert_ok_eq!(a, 0x489);
    }

    #[test]
    fn test_restore_v3_fail() {
        reply_file_name("no-such-file.ifzs");
        let mut vm = mock_zmachine(test_map(3));
        let i = branch_op(3, 6, 0x480, 0x482, 0x490);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x482);
    }

    #[test]
    fn test_restart() {
        let mut vm = mock_zmachine(test_map(3));
        let i = plain_op(3, 7, 0x480, 0x481);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x400);
    }

    #[test]
    fn test_ret_popped() {
        let mut vm = mock_zmachine(test_map(3));
        mock_frame(&mut vm, 0x500, Some(0x80), 0x402);
        assert!(vm.push(0x1122).is_ok());
        assert!(vm.push(0x3344).is_ok());

        let i = plain_op(3, 8, 0x501, 0x502);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x402);
        assert_ok_eq!(vm.variable(0x80), 0x3344);
        assert!(vm.variable(0).is_err());
    }

    #[test]
    fn test_pop() {
        let mut vm = mock_zmachine(test_map(3));
        assert!(vm.push(0x1122).is_ok());
        assert!(vm.push(0x3344).is_ok());

        let i = plain_op(3, 9, 0x501, 0x502);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x502);
        assert_ok_eq!(vm.peek_variable(0), 0x1122);
    }

    #[test]
    fn test_catch() {
        let mut vm = mock_zmachine(test_map(5));
        mock_frame(&mut vm, 0x480, None, 0x404);
        mock_frame(&mut vm, 0x500, None, 0x404);

        let i = mock_store_instruction(0x500, vec![], opcode(5, 9), 0x502, store(0x501, 0x80));
        assert_ok_eq!(dispatch(&mut vm, &i), 0x502);
        assert_ok_eq!(vm.variable(0x80), 3);
    }

    #[test]
    fn test_quit() {
        let mut vm = mock_zmachine(test_map(3));
        let i = plain_op(3, 10, 0x400, 0x401);
        assert_ok_eq!(dispatch(&mut vm, &i), 0);
    }

    #[test]
    fn test_new_line() {
        let mut vm = mock_zmachine(test_map(3));
        let i = plain_op(3, 11, 0x400, 0x401);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x401);
        assert_print!("\n");
    }

    #[test]
    fn test_show_status_score() {
        let mut vm = mock_zmachine(status_map(false, 0xFF0A, 4567));
        let i = plain_op(3, 12, 0x400, 0x401);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x401);
        assert_print!(
            " Status Object                                                         -246/4567",
        );
    }

    #[test]
    fn test_show_status_time_am() {
        let mut vm = mock_zmachine(status_map(true, 0, 0));
        let i = plain_op(3, 12, 0x400, 0x401);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x401);
        assert_print!(
            " Status Object                                                          12:00 AM",
        );
    }

    #[test]
    fn test_show_status_time_pm() {
        let mut vm = mock_zmachine(status_map(true, 12, 0));
        let i = plain_op(3, 12, 0x400, 0x401);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x401);
        assert_print!(
            " Status Object                                                          12:00 PM",
        );
    }

    #[test]
    fn test_show_status_time_padding() {
        let mut vm = mock_zmachine(status_map(true, 1, 59));
        let i = plain_op(3, 12, 0x400, 0x401);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x401);
        assert_print!(
            " Status Object                                                           1:59 AM",
        );
    }

    #[test]
    fn test_verify() {
        let mut map = test_map(3);
        for i in 0x40..0x800 {
            map[i] = i as u8;
        }
        // File length 0x800, stored divided by 2
        map[0x1A] = 0x04;
        // Checksum
        map[0x1C] = 0xf4;
        map[0x1D] = 0x20;
        let mut vm = mock_zmachine(map);

        let i = branch_op(3, 13, 0x400, 0x402, 0x40a);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x40a);
    }

    #[test]
    fn test_verify_fail() {
        let mut map = test_map(3);
        for i in 0x40..0x800 {
            map[i] = i as u8;
        }
        map[0x1A] = 0x04;
        // One more than the computed checksum
        map[0x1C] = 0xf4;
        map[0x1D] = 0x21;
        let mut vm = mock_zmachine(map);

        let i = branch_op(3, 13, 0x400, 0x402, 0x40a);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x402);
    }

    #[test]
    fn test_piracy() {
        let mut vm = mock_zmachine(test_map(3));
        let i = branch_op(3, 15, 0x400, 0x402, 0x40a);
        assert_ok_eq!(dispatch(&mut vm, &i), 0x40a);
    }

    #[test]
    fn test_piracy_inverted_branch() {
        let mut vm = mock_zmachine(test_map(3));
        let i = mock_branch_instruction(
            0x400,
            vec![],
            opcode(3, 15),
            0x402,
            branch(0x401, false, 0x40a),
        );
        assert_ok_eq!(dispatch(&mut vm, &i), 0x402);
    }
}
