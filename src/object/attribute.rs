use crate::error::{ErrorCode, RuntimeError};
use crate::recoverable_error;
use crate::zmachine::state::memory::Version;
use crate::zmachine::ZMachine;

use super::object_address;

// Attribute bits run high to low from the start of the table entry.
// V3 objects have 32 attributes, V4+ have 48.
fn location(vm: &ZMachine, object: usize, attribute: u8) -> Result<(usize, u8), RuntimeError> {
    let max = match vm.version() {
        Version::V3 => 32,
        _ => 48,
    };
    if attribute >= max {
        return recoverable_error!(
            ErrorCode::InvalidObjectAttribute,
            "Invalid attribute {} on object {}",
            attribute,
            object
        );
    }

    let address = object_address(vm, object)? + (attribute as usize / 8);
    Ok((address, 0x80 >> (attribute % 8)))
}

pub fn value(vm: &ZMachine, object: usize, attribute: u8) -> Result<bool, RuntimeError> {
    let (address, mask) = location(vm, object, attribute)?;
    Ok(vm.read_byte(address)? & mask == mask)
}

pub fn set(vm: &mut ZMachine, object: usize, attribute: u8) -> Result<(), RuntimeError> {
    let (address, mask) = location(vm, object, attribute)?;
    let b = vm.read_byte(address)?;
    vm.write_byte(address, b | mask)
}

pub fn clear(vm: &mut ZMachine, object: usize, attribute: u8) -> Result<(), RuntimeError> {
    let (address, mask) = location(vm, object, attribute)?;
    let b = vm.read_byte(address)?;
    vm.write_byte(address, b & !mask)
}
