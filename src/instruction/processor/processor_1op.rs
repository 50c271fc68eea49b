use crate::error::RuntimeError;
use crate::instruction::Instruction;
use crate::object::{self, property};
use crate::text;
use crate::zmachine::ZMachine;

use super::processor_2op::unlink;
use super::{branch, operand_values, store_result};

pub fn jz(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    branch(vm, instruction, operands[0] == 0)
}

pub fn get_sibling(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let sibling = object::sibling(vm, operands[0] as usize)?;
    store_result(vm, instruction, sibling as u16)?;
    branch(vm, instruction, sibling != 0)
}

pub fn get_child(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let child = object::child(vm, operands[0] as usize)?;
    store_result(vm, instruction, child as u16)?;
    branch(vm, instruction, child != 0)
}

pub fn get_parent(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let parent = object::parent(vm, operands[0] as usize)?;
    store_result(vm, instruction, parent as u16)?;
    Ok(instruction.next_address())
}

pub fn get_prop_len(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let length = property::property_length(vm, operands[0] as usize)?;
    store_result(vm, instruction, length as u16)?;
    Ok(instruction.next_address())
}

pub fn inc(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let variable = operands[0] as u8;
    let value = (vm.peek_variable(variable)? as i16).wrapping_add(1);
    vm.set_variable_indirect(variable, value as u16)?;
    Ok(instruction.next_address())
}

pub fn dec(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let variable = operands[0] as u8;
    let value = (vm.peek_variable(variable)? as i16).wrapping_sub(1);
    vm.set_variable_indirect(variable, value as u16)?;
    Ok(instruction.next_address())
}

pub fn print_addr(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let text = text::as_text(vm, operands[0] as usize)?;
    vm.print(&text)?;
    Ok(instruction.next_address())
}

pub fn call_1s(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = vm.packed_routine_address(operands[0])?;
    vm.call_routine(
        address,
        &[],
        instruction.store().copied(),
        instruction.next_address(),
    )
}

pub fn remove_obj(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let object = operands[0] as usize;
    if object != 0 {
        let parent = object::parent(vm, object)?;
        if parent != 0 {
            unlink(vm, object, parent)?;
            // The removed object keeps its children
            object::set_parent(vm, object, 0)?;
            object::set_sibling(vm, object, 0)?;
        }
    }

    Ok(instruction.next_address())
}

pub fn print_obj(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let ztext = property::short_name(vm, operands[0] as usize)?;
    let text = text::from_vec(vm, &ztext)?;
    vm.print(&text)?;
    Ok(instruction.next_address())
}

pub fn ret(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.return_routine(operands[0])
}

pub fn jump(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let offset = operands[0] as i16 as isize;
    Ok((instruction.next_address() as isize + offset - 2) as usize)
}

pub fn print_paddr(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = vm.packed_string_address(operands[0])?;
    let text = text::as_text(vm, address)?;
    vm.print(&text)?;
    Ok(instruction.next_address())
}

pub fn load(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let value = vm.peek_variable(operands[0] as u8)?;
    store_result(vm, instruction, value)?;
    Ok(instruction.next_address())
}

pub fn not(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    store_result(vm, instruction, !operands[0])?;
    Ok(instruction.next_address())
}

pub fn call_1n(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = vm.packed_routine_address(operands[0])?;
    vm.call_routine(address, &[], None, instruction.next_address())
}
