use crate::error::{ErrorCode, RuntimeError};
use crate::instruction::Instruction;
use crate::object::property;
use crate::text;
use crate::zmachine::state::header::HeaderField;
use crate::zmachine::state::memory::Version;
use crate::zmachine::ZMachine;
use crate::{fatal_error, recoverable_error};

use super::{branch, call_fn, operand_values, store_result};

pub fn call_vs(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = vm.packed_routine_address(operands[0])?;
    let arguments = operands[1..].to_vec();

    call_fn(
        vm,
        address,
        instruction.next_address(),
        &arguments,
        instruction.store().copied(),
    )
}

pub fn storew(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = operands[0] as isize + (operands[1] as i16 * 2) as isize;
    vm.write_word(address as usize, operands[2])?;
    Ok(instruction.next_address())
}

pub fn storeb(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = operands[0] as isize + (operands[1] as i16) as isize;
    vm.write_byte(address as usize, operands[2] as u8)?;
    Ok(instruction.next_address())
}

pub fn put_prop(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    property::set_property(
        vm,
        operands[0] as usize,
        operands[1] as u8,
        operands[2],
    )?;
    Ok(instruction.next_address())
}

fn terminators(vm: &ZMachine) -> Result<Vec<u16>, RuntimeError> {
    let mut terminators = vec!['\r' as u16];

    if vm.version() >= Version::V5 {
        let mut table_addr = vm.header_word(HeaderField::TerminatorTable)? as usize;
        if table_addr > 0 {
            loop {
                let b = vm.read_byte(table_addr)?;
                if b == 0 {
                    break;
                } else if (129..=154).contains(&b) || b >= 252 {
                    terminators.push(b as u16);
                }
                table_addr += 1;
            }
        }
    }

    Ok(terminators)
}

fn to_lower_case(c: u16) -> u8 {
    // Uppercase ASCII is 0x41 - 0x5A
    if c > 0x40 && c < 0x5b {
        (c | 0x20) as u8
    } else {
        c as u8
    }
}

pub fn read(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;

    let text_buffer = operands[0] as usize;
    let parse = if operands.len() > 1 {
        operands[1] as usize
    } else {
        0
    };

    // Timed input is not supported, the interrupt routine is never called
    if operands.len() > 2 && operands[2] > 0 {
        debug!(target: "app::input", "READ: ignoring {}ms timeout", operands[2] * 100);
    }

    let len = if vm.version() < Version::V5 {
        vm.read_byte(text_buffer)? - 1
    } else {
        vm.read_byte(text_buffer)?
    } as usize;

    let mut existing_input = Vec::new();
    if vm.version() == Version::V3 {
        vm.status_line()?;
    } else {
        // A restored state may leave input in the text buffer
        let existing_len = vm.read_byte(text_buffer + 1)? as usize;
        for i in 0..existing_len {
            existing_input.push(vm.read_byte(text_buffer + 2 + i)? as u16);
        }
    }

    let terminators = terminators(vm)?;
    let input_buffer = vm.read_line(&existing_input, len, &terminators)?;
    let terminator = match input_buffer.last() {
        Some(c) if terminators.contains(c) => Some(*c),
        _ => None,
    };

    debug!(target: "app::input", "READ: input {:?}, terminator {:?}", input_buffer, terminator);

    let end = input_buffer.len()
        - match terminator {
            Some(_) => 1,
            None => 0,
        };

    if vm.version() < Version::V5 {
        for (i, c) in input_buffer[0..end].iter().enumerate() {
            vm.write_byte(text_buffer + 1 + i, to_lower_case(*c))?;
        }
        // Terminated by a 0
        vm.write_byte(text_buffer + 1 + end, 0)?;
    } else {
        vm.write_byte(text_buffer + 1, end as u8)?;
        for (i, c) in input_buffer[0..end].iter().enumerate() {
            vm.write_byte(text_buffer + 2 + i, to_lower_case(*c))?;
        }
    }

    // Lexical analysis
    if parse > 0 || vm.version() < Version::V5 {
        let dictionary = vm.header_word(HeaderField::Dictionary)? as usize;
        text::parse_text(vm, text_buffer, parse, dictionary, false)?;
    }

    if vm.version() >= Version::V5 {
        match terminator {
            Some(t) => store_result(vm, instruction, t)?,
            None => store_result(vm, instruction, 0)?,
        }
    }

    Ok(instruction.next_address())
}

pub fn print_char(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.print(&vec![operands[0]])?;
    Ok(instruction.next_address())
}

pub fn print_num(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let s = format!("{}", operands[0] as i16);
    let mut text = Vec::new();
    for c in s.chars() {
        text.push(c as u16);
    }
    vm.print(&text)?;
    Ok(instruction.next_address())
}

pub fn random(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;

    let range = operands[0] as i16;
    if range < 1 {
        if range == 0 || range.abs() >= 1000 {
            vm.seed(range.unsigned_abs())
        } else {
            vm.predictable(range.unsigned_abs())
        }
        store_result(vm, instruction, 0)?;
    } else {
        let value = vm.random(range as u16);
        store_result(vm, instruction, value)?;
    }

    Ok(instruction.next_address())
}

pub fn push(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.push(operands[0])?;
    Ok(instruction.next_address())
}

pub fn pull(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let value = vm.variable(0)?;

    // Pulling to the stack pops the value underneath the one just pulled,
    // then pushes the pulled value back
    if operands[0] == 0 {
        vm.variable(0)?;
    }

    vm.set_variable(operands[0] as u8, value)?;
    Ok(instruction.next_address())
}

pub fn split_window(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.split_window(operands[0])?;
    Ok(instruction.next_address())
}

pub fn set_window(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.set_window(operands[0])?;
    Ok(instruction.next_address())
}

pub fn call_vs2(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = vm.packed_routine_address(operands[0])?;
    let arguments = operands[1..].to_vec();

    call_fn(
        vm,
        address,
        instruction.next_address(),
        &arguments,
        instruction.store().copied(),
    )
}

pub fn erase_window(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.erase_window(operands[0] as i16)?;
    Ok(instruction.next_address())
}

pub fn erase_line(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    if operands[0] == 1 {
        vm.erase_line()?;
    }
    Ok(instruction.next_address())
}

pub fn set_cursor(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.set_cursor(operands[0], operands[1])?;
    Ok(instruction.next_address())
}

pub fn get_cursor(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let (row, column) = vm.cursor()?;
    vm.write_word(operands[0] as usize, row)?;
    vm.write_word(operands[0] as usize + 2, column)?;
    Ok(instruction.next_address())
}

pub fn set_text_style(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.set_text_style(operands[0])?;
    Ok(instruction.next_address())
}

pub fn buffer_mode(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.buffer_mode(operands[0])?;
    Ok(instruction.next_address())
}

pub fn output_stream(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let stream = operands[0] as i16;
    let table = if stream == 3 {
        Some(operands[1] as usize)
    } else {
        None
    };

    vm.output_stream(stream, table)?;
    Ok(instruction.next_address())
}

pub fn input_stream(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    if operands[0] == 0 {
        Ok(instruction.next_address())
    } else {
        recoverable_error!(
            ErrorCode::Interpreter,
            "Input stream {} is not supported",
            operands[0]
        )
    }
}

pub fn sound_effect(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    match operands[0] {
        1 | 2 => vm.beep()?,
        _ => {
            // Sampled sound playback is not supported
            debug!(target: "app::screen", "SOUND_EFFECT: ignoring {:?}", operands);
        }
    }

    Ok(instruction.next_address())
}

pub fn read_char(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    if !operands.is_empty() && operands[0] != 1 {
        return fatal_error!(
            ErrorCode::InvalidInstruction,
            "READ_CHAR argument 1 must be 1, was {}",
            operands[0]
        );
    }

    // Timed input is not supported, the interrupt routine is never called
    if operands.len() > 1 && operands[1] > 0 {
        debug!(target: "app::input", "READ_CHAR: ignoring {}ms timeout", operands[1] * 100);
    }

    let key = vm.read_key()?;
    store_result(vm, instruction, key)?;
    Ok(instruction.next_address())
}

pub fn scan_table(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;

    let scan = if operands.len() == 4 && operands[3] & 0x80 == 0 {
        1
    } else {
        2
    };

    let entry_size = if operands.len() == 4 {
        operands[3] & 0x3f
    } else {
        2
    } as usize;

    let len = operands[2] as usize;
    let mut condition = false;
    for i in 0..len {
        let address = operands[1] as usize + (i * entry_size);
        let value = if scan == 2 {
            vm.read_word(address)?
        } else {
            vm.read_byte(address)? as u16
        };

        if value == operands[0] {
            store_result(vm, instruction, address as u16)?;
            condition = true;
            break;
        }
    }

    if !condition {
        store_result(vm, instruction, 0)?;
    }

    branch(vm, instruction, condition)
}

pub fn not(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    store_result(vm, instruction, !operands[0])?;
    Ok(instruction.next_address())
}

pub fn call_vn(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = vm.packed_routine_address(operands[0])?;
    let arguments = operands[1..].to_vec();

    call_fn(
        vm,
        address,
        instruction.next_address(),
        &arguments,
        None,
    )
}

pub fn call_vn2(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = vm.packed_routine_address(operands[0])?;
    let arguments = operands[1..].to_vec();

    call_fn(
        vm,
        address,
        instruction.next_address(),
        &arguments,
        None,
    )
}

pub fn tokenise(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let text_buffer = operands[0] as usize;
    let parse_buffer = operands[1] as usize;
    let dictionary = if operands.len() > 2 && operands[2] > 0 {
        operands[2] as usize
    } else {
        vm.header_word(HeaderField::Dictionary)? as usize
    };
    let flag = if operands.len() > 3 {
        operands[3] > 0
    } else {
        false
    };

    text::parse_text(vm, text_buffer, parse_buffer, dictionary, flag)?;
    Ok(instruction.next_address())
}

pub fn encode_text(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let text_buffer = operands[0] as usize;
    let length = operands[1] as usize;
    let from = operands[2] as usize;
    let dest_buffer = operands[3] as usize;

    let mut zchars = Vec::new();
    for i in 0..length {
        zchars.push(vm.read_byte(text_buffer + from + i)? as u16);
    }

    let encoded_text = text::encode_text(&zchars, 3);
    for (i, w) in encoded_text.iter().enumerate() {
        vm.write_word(dest_buffer + (i * 2), *w)?
    }

    Ok(instruction.next_address())
}

pub fn copy_table(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;

    let src = operands[0] as usize;
    let dst = operands[1] as usize;
    let len = operands[2] as i16;

    if dst == 0 {
        for i in 0..len as usize {
            vm.write_byte(src + i, 0)?;
        }
    } else if len > 0 && dst > src && dst < src + len as usize {
        // An overlapping forward copy would corrupt the source
        for i in (0..len as usize).rev() {
            let b = vm.read_byte(src + i)?;
            vm.write_byte(dst + i, b)?;
        }
    } else {
        for i in 0..len.unsigned_abs() as usize {
            let b = vm.read_byte(src + i)?;
            vm.write_byte(dst + i, b)?;
        }
    }

    Ok(instruction.next_address())
}

pub fn print_table(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let table = operands[0] as usize;
    let width = operands[1] as usize;
    let height = if operands.len() > 2 { operands[2] } else { 1 };
    let skip = if operands.len() > 3 { operands[3] } else { 0 } as usize;

    let origin = vm.cursor()?;
    let rows = vm.rows();
    for i in 0..height as usize {
        if origin.0 + i as u16 > rows {
            vm.new_line()?;
            vm.set_cursor(rows, origin.1)?;
        } else {
            vm.set_cursor(origin.0 + i as u16, origin.1)?;
        }
        let mut text = Vec::new();
        for j in 0..width {
            let offset = i * (width + skip);
            text.push(vm.read_byte(table + offset + j)? as u16);
        }
        vm.print(&text)?;
    }

    Ok(instruction.next_address())
}

pub fn check_arg_count(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let count = vm.argument_count()?;
    branch(vm, instruction, count >= operands[0] as u8)
}
