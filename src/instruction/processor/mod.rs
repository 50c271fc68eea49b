use crate::error::*;
use crate::fatal_error;
use crate::zmachine::state::memory::Version;
use crate::zmachine::ZMachine;

use super::*;

mod processor_0op;
mod processor_1op;
mod processor_2op;
mod processor_ext;
mod processor_var;

fn operand_value(vm: &mut ZMachine, operand: &Operand) -> Result<u16, RuntimeError> {
    match operand.operand_type() {
        OperandType::SmallConstant | OperandType::LargeConstant => Ok(operand.value()),
        OperandType::Variable => vm.variable(operand.value() as u8),
    }
}

fn operand_values(
    vm: &mut ZMachine,
    instruction: &Instruction,
) -> Result<Vec<u16>, RuntimeError> {
    let mut v = Vec::new();
    let mut l = "Operand values:".to_string();
    for o in instruction.operands() {
        let value = operand_value(vm, o)?;
        match o.operand_type() {
            OperandType::SmallConstant => l.push_str(&format!(" #{:02x}", value as u8)),
            _ => l.push_str(&format!(" #{:04x}", value)),
        }
        v.push(value)
    }
    if !v.is_empty() {
        debug!(target: "app::instruction", "{}", l);
    }
    Ok(v)
}

/// Resolve a branch: taken branches to address 0 or 1 return false or
/// true from the current routine.
fn branch(
    vm: &mut ZMachine,
    instruction: &Instruction,
    condition: bool,
) -> Result<usize, RuntimeError> {
    match instruction.branch() {
        Some(b) => {
            if condition == b.condition() {
                match b.branch_address() {
                    0 => vm.return_routine(0),
                    1 => vm.return_routine(1),
                    _ => Ok(b.branch_address()),
                }
            } else {
                Ok(instruction.next_address())
            }
        }
        None => Ok(instruction.next_address()),
    }
}

fn store_result(
    vm: &mut ZMachine,
    instruction: &Instruction,
    value: u16,
) -> Result<(), RuntimeError> {
    match instruction.store() {
        Some(s) => vm.set_variable(s.variable(), value),
        None => Ok(()),
    }
}

/// Routine call helper: addresses 0 and 1 store the address as a constant
/// result instead of calling.
fn call_fn(
    vm: &mut ZMachine,
    address: usize,
    return_addr: usize,
    arguments: &[u16],
    result: Option<StoreResult>,
) -> Result<usize, RuntimeError> {
    match address {
        0 | 1 => {
            if let Some(r) = result {
                vm.set_variable(r.variable(), address as u16)?
            }

            Ok(return_addr)
        }
        _ => vm.call_routine(address, arguments, result, return_addr),
    }
}

pub fn dispatch(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    debug!(target: "app::instruction", "dispatch: {}", instruction);
    match instruction.opcode().form() {
        OpcodeForm::Ext => match instruction.opcode().instruction() {
            0x00 => processor_ext::save(vm, instruction),
            0x01 => processor_ext::restore(vm, instruction),
            0x02 => processor_ext::log_shift(vm, instruction),
            0x03 => processor_ext::art_shift(vm, instruction),
            0x04 => processor_ext::set_font(vm, instruction),
            0x09 => processor_ext::save_undo(vm, instruction),
            0x0a => processor_ext::restore_undo(vm, instruction),
            _ => fatal_error!(
                ErrorCode::UnimplementedInstruction,
                "Unimplemented EXT instruction: {}",
                instruction.opcode()
            ),
        },
        _ => match instruction.opcode().operand_count() {
            OperandCount::_0OP => match instruction.opcode().instruction() {
                0x0 => processor_0op::rtrue(vm, instruction),
                0x1 => processor_0op::rfalse(vm, instruction),
                0x2 => processor_0op::print(vm, instruction),
                0x3 => processor_0op::print_ret(vm, instruction),
                0x4 => processor_0op::nop(vm, instruction),
                0x5 => processor_0op::save(vm, instruction),
                0x6 => processor_0op::restore(vm, instruction),
                0x7 => processor_0op::restart(vm, instruction),
                0x8 => processor_0op::ret_popped(vm, instruction),
                0x9 => {
                    if vm.version() < Version::V5 {
                        processor_0op::pop(vm, instruction)
                    } else {
                        processor_0op::catch(vm, instruction)
                    }
                }
                0xa => processor_0op::quit(vm, instruction),
                0xb => processor_0op::new_line(vm, instruction),
                0xc => processor_0op::show_status(vm, instruction),
                0xd => processor_0op::verify(vm, instruction),
                0xf => processor_0op::piracy(vm, instruction),
                _ => fatal_error!(
                    ErrorCode::UnimplementedInstruction,
                    "Unimplemented instruction: {}",
                    instruction.opcode()
                ),
            },
            OperandCount::_1OP => match instruction.opcode().instruction() {
                0x0 => processor_1op::jz(vm, instruction),
                0x1 => processor_1op::get_sibling(vm, instruction),
                0x2 => processor_1op::get_child(vm, instruction),
                0x3 => processor_1op::get_parent(vm, instruction),
                0x4 => processor_1op::get_prop_len(vm, instruction),
                0x5 => processor_1op::inc(vm, instruction),
                0x6 => processor_1op::dec(vm, instruction),
                0x7 => processor_1op::print_addr(vm, instruction),
                0x8 => processor_1op::call_1s(vm, instruction),
                0x9 => processor_1op::remove_obj(vm, instruction),
                0xa => processor_1op::print_obj(vm, instruction),
                0xb => processor_1op::ret(vm, instruction),
                0xc => processor_1op::jump(vm, instruction),
                0xd => processor_1op::print_paddr(vm, instruction),
                0xe => processor_1op::load(vm, instruction),
                0xf => {
                    if vm.version() < Version::V5 {
                        processor_1op::not(vm, instruction)
                    } else {
                        processor_1op::call_1n(vm, instruction)
                    }
                }
                _ => fatal_error!(
                    ErrorCode::UnimplementedInstruction,
                    "Unimplemented instruction: {}",
                    instruction.opcode()
                ),
            },
            OperandCount::_2OP => match instruction.opcode().instruction() {
                0x01 => processor_2op::je(vm, instruction),
                0x02 => processor_2op::jl(vm, instruction),
                0x03 => processor_2op::jg(vm, instruction),
                0x04 => processor_2op::dec_chk(vm, instruction),
                0x05 => processor_2op::inc_chk(vm, instruction),
                0x06 => processor_2op::jin(vm, instruction),
                0x07 => processor_2op::test(vm, instruction),
                0x08 => processor_2op::or(vm, instruction),
                0x09 => processor_2op::and(vm, instruction),
                0x0a => processor_2op::test_attr(vm, instruction),
                0x0b => processor_2op::set_attr(vm, instruction),
                0x0c => processor_2op::clear_attr(vm, instruction),
                0x0d => processor_2op::store(vm, instruction),
                0x0e => processor_2op::insert_obj(vm, instruction),
                0x0f => processor_2op::loadw(vm, instruction),
                0x10 => processor_2op::loadb(vm, instruction),
                0x11 => processor_2op::get_prop(vm, instruction),
                0x12 => processor_2op::get_prop_addr(vm, instruction),
                0x13 => processor_2op::get_next_prop(vm, instruction),
                0x14 => processor_2op::add(vm, instruction),
                0x15 => processor_2op::sub(vm, instruction),
                0x16 => processor_2op::mul(vm, instruction),
                0x17 => processor_2op::div(vm, instruction),
                0x18 => processor_2op::modulus(vm, instruction),
                0x19 => processor_2op::call_2s(vm, instruction),
                0x1a => processor_2op::call_2n(vm, instruction),
                0x1b => processor_2op::set_colour(vm, instruction),
                0x1c => processor_2op::throw(vm, instruction),
                _ => fatal_error!(
                    ErrorCode::UnimplementedInstruction,
                    "Unimplemented instruction: {}",
                    instruction.opcode()
                ),
            },
            OperandCount::_VAR => match instruction.opcode().instruction() {
                0x00 => processor_var::call_vs(vm, instruction),
                0x01 => processor_var::storew(vm, instruction),
                0x02 => processor_var::storeb(vm, instruction),
                0x03 => processor_var::put_prop(vm, instruction),
                0x04 => processor_var::read(vm, instruction),
                0x05 => processor_var::print_char(vm, instruction),
                0x06 => processor_var::print_num(vm, instruction),
                0x07 => processor_var::random(vm, instruction),
                0x08 => processor_var::push(vm, instruction),
                0x09 => processor_var::pull(vm, instruction),
                0x0a => processor_var::split_window(vm, instruction),
                0x0b => processor_var::set_window(vm, instruction),
                0x0c => processor_var::call_vs2(vm, instruction),
                0x0d => processor_var::erase_window(vm, instruction),
                0x0e => processor_var::erase_line(vm, instruction),
                0x0f => processor_var::set_cursor(vm, instruction),
                0x10 => processor_var::get_cursor(vm, instruction),
                0x11 => processor_var::set_text_style(vm, instruction),
                0x12 => processor_var::buffer_mode(vm, instruction),
                0x13 => processor_var::output_stream(vm, instruction),
                0x14 => processor_var::input_stream(vm, instruction),
                0x15 => processor_var::sound_effect(vm, instruction),
                0x16 => processor_var::read_char(vm, instruction),
                0x17 => processor_var::scan_table(vm, instruction),
                0x18 => processor_var::not(vm, instruction),
                0x19 => processor_var::call_vn(vm, instruction),
                0x1a => processor_var::call_vn2(vm, instruction),
                0x1b => processor_var::tokenise(vm, instruction),
                0x1c => processor_var::encode_text(vm, instruction),
                0x1d => processor_var::copy_table(vm, instruction),
                0x1e => processor_var::print_table(vm, instruction),
                0x1f => processor_var::check_arg_count(vm, instruction),
                _ => fatal_error!(
                    ErrorCode::UnimplementedInstruction,
                    "Unimplemented instruction: {}",
                    instruction.opcode()
                ),
            },
        },
    }
}
