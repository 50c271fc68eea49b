use crate::error::{ErrorCode, RuntimeError};
use crate::fatal_error;
use crate::instruction::Instruction;
use crate::object::{self, attribute, property};
use crate::zmachine::ZMachine;

use super::{branch, call_fn, operand_values, store_result};

/// Folds the operands left to right as signed 16-bit values, wrapping on
/// overflow.
fn fold_signed(operands: &[u16], op: fn(i16, i16) -> (i16, bool)) -> u16 {
    let mut value = operands[0] as i16;
    for w in &operands[1..] {
        value = op(value, *w as i16).0;
    }
    value as u16
}

pub fn je(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let first = operands[0] as i16;
    let equal = operands[1..].iter().any(|&o| o as i16 == first);
    branch(vm, instruction, equal)
}

pub fn jl(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    branch(vm, instruction, (operands[0] as i16) < (operands[1] as i16))
}

pub fn jg(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    branch(vm, instruction, (operands[0] as i16) > (operands[1] as i16))
}

pub fn dec_chk(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let variable = operands[0] as u8;
    let value = (vm.peek_variable(variable)? as i16).wrapping_sub(1);
    vm.set_variable_indirect(variable, value as u16)?;
    branch(vm, instruction, value < operands[1] as i16)
}

pub fn inc_chk(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let variable = operands[0] as u8;
    let value = (vm.peek_variable(variable)? as i16).wrapping_add(1);
    vm.set_variable_indirect(variable, value as u16)?;
    branch(vm, instruction, value > operands[1] as i16)
}

pub fn jin(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let parent = object::parent(vm, operands[0] as usize)?;
    branch(vm, instruction, parent == operands[1] as usize)
}

pub fn test(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let mask = operands[1];
    branch(vm, instruction, operands[0] & mask == mask)
}

pub fn or(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let value = operands[1..].iter().fold(operands[0], |acc, w| acc | w);
    store_result(vm, instruction, value)?;
    Ok(instruction.next_address())
}

pub fn and(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let value = operands[1..].iter().fold(operands[0], |acc, w| acc & w);
    store_result(vm, instruction, value)?;
    Ok(instruction.next_address())
}

pub fn test_attr(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let set = attribute::value(vm, operands[0] as usize, operands[1] as u8)?;
    branch(vm, instruction, set)
}

pub fn set_attr(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    if operands[0] > 0 {
        attribute::set(vm, operands[0] as usize, operands[1] as u8)?;
    }
    Ok(instruction.next_address())
}

pub fn clear_attr(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    if operands[0] > 0 {
        attribute::clear(vm, operands[0] as usize, operands[1] as u8)?;
    }
    Ok(instruction.next_address())
}

pub fn store(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.set_variable_indirect(operands[0] as u8, operands[1])?;
    Ok(instruction.next_address())
}

/// Removes `object` from the child list of `parent`.
pub(super) fn unlink(vm: &mut ZMachine, object: usize, parent: usize) -> Result<(), RuntimeError> {
    let next = object::sibling(vm, object)?;
    if object::child(vm, parent)? == object {
        return object::set_child(vm, parent, next);
    }

    let mut prev = object::child(vm, parent)?;
    while prev != 0 && object::sibling(vm, prev)? != object {
        prev = object::sibling(vm, prev)?;
    }
    if prev == 0 {
        return fatal_error!(
            ErrorCode::InvalidObjectTree,
            "Object {} is not among the children of {}",
            object,
            parent
        );
    }

    object::set_sibling(vm, prev, next)
}

pub fn insert_obj(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let object = operands[0] as usize;
    let destination = operands[1] as usize;

    if object != 0 && object::parent(vm, object)? != destination {
        let old_parent = object::parent(vm, object)?;
        if old_parent != 0 {
            unlink(vm, object, old_parent)?;
        }

        // The object becomes the first child of its new parent
        let first = object::child(vm, destination)?;
        object::set_sibling(vm, object, first)?;
        object::set_child(vm, destination, object)?;
        object::set_parent(vm, object, destination)?;
    }

    Ok(instruction.next_address())
}

pub fn loadw(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = operands[0] as isize + (operands[1] as i16 as isize * 2);
    let value = vm.read_word(address as usize)?;
    store_result(vm, instruction, value)?;
    Ok(instruction.next_address())
}

pub fn loadb(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = operands[0] as isize + operands[1] as i16 as isize;
    let value = vm.read_byte(address as usize)? as u16;
    store_result(vm, instruction, value)?;
    Ok(instruction.next_address())
}

pub fn get_prop(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let value = if operands[0] == 0 {
        0
    } else {
        property::property(vm, operands[0] as usize, operands[1] as u8)?
    };
    store_result(vm, instruction, value)?;
    Ok(instruction.next_address())
}

pub fn get_prop_addr(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let value = if operands[0] == 0 {
        0
    } else {
        property::property_data_address(vm, operands[0] as usize, operands[1] as u8)? as u16
    };
    store_result(vm, instruction, value)?;
    Ok(instruction.next_address())
}

pub fn get_next_prop(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let value = if operands[0] == 0 {
        0
    } else {
        property::next_property(vm, operands[0] as usize, operands[1] as u8)? as u16
    };
    store_result(vm, instruction, value)?;
    Ok(instruction.next_address())
}

pub fn add(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    store_result(vm, instruction, fold_signed(&operands, i16::overflowing_add))?;
    Ok(instruction.next_address())
}

pub fn sub(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    store_result(vm, instruction, fold_signed(&operands, i16::overflowing_sub))?;
    Ok(instruction.next_address())
}

pub fn mul(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    store_result(vm, instruction, fold_signed(&operands, i16::overflowing_mul))?;
    Ok(instruction.next_address())
}

pub fn div(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    if operands[1..].contains(&0) {
        return fatal_error!(ErrorCode::DivideByZero, "Division by zero: {}", instruction);
    }
    store_result(vm, instruction, fold_signed(&operands, i16::overflowing_div))?;
    Ok(instruction.next_address())
}

pub fn modulus(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    if operands[1..].contains(&0) {
        return fatal_error!(ErrorCode::DivideByZero, "Remainder by zero: {}", instruction);
    }
    store_result(vm, instruction, fold_signed(&operands, i16::overflowing_rem))?;
    Ok(instruction.next_address())
}

pub fn call_2s(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = vm.packed_routine_address(operands[0])?;
    call_fn(
        vm,
        address,
        instruction.next_address(),
        &[operands[1]],
        instruction.store().copied(),
    )
}

pub fn call_2n(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    let address = vm.packed_routine_address(operands[0])?;
    call_fn(vm, address, instruction.next_address(), &[operands[1]], None)
}

pub fn set_colour(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.set_colors(operands[0], operands[1])?;
    Ok(instruction.next_address())
}

pub fn throw(vm: &mut ZMachine, instruction: &Instruction) -> Result<usize, RuntimeError> {
    let operands = operand_values(vm, instruction)?;
    vm.throw(operands[1], operands[0])
}
