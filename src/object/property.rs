//! Object [property](https://inform-fiction.org/zmachine/standards/z1point1/sect12.html#four) utility functions
use std::cmp::Ordering;

use crate::error::{ErrorCode, RuntimeError};
use crate::fatal_error;
use crate::zmachine::state::header::HeaderField;
use crate::zmachine::state::memory::Version;
use crate::zmachine::ZMachine;

use super::object_address;

// Decoded property entry header: property number, header length in
// bytes, data length in bytes
struct PropertyHeader {
    number: u8,
    header: usize,
    data: usize,
}

fn header(vm: &ZMachine, address: usize) -> Result<PropertyHeader, RuntimeError> {
    let b = vm.read_byte(address)?;
    match vm.version() {
        Version::V3 => Ok(PropertyHeader {
            number: b & 0x1F,
            header: 1,
            data: (b as usize / 32) + 1,
        }),
        _ => {
            if b & 0x80 == 0x80 {
                // Two-byte header; a size field of 0 means 64 bytes
                let size = vm.read_byte(address + 1)? as usize & 0x3F;
                Ok(PropertyHeader {
                    number: b & 0x3F,
                    header: 2,
                    data: if size == 0 { 64 } else { size },
                })
            } else {
                Ok(PropertyHeader {
                    number: b & 0x3F,
                    header: 1,
                    data: if b & 0x40 == 0x40 { 2 } else { 1 },
                })
            }
        }
    }
}

fn table_address(vm: &ZMachine, object: usize) -> Result<usize, RuntimeError> {
    let offset = match vm.version() {
        Version::V3 => 7,
        _ => 12,
    };
    Ok(vm.read_word(object_address(vm, object)? + offset)? as usize)
}

/// Byte address of a property entry for an object, or 0 if the object
/// doesn't have the property.
fn address(vm: &ZMachine, object: usize, property: u8) -> Result<usize, RuntimeError> {
    let table = table_address(vm, object)?;
    let name_words = vm.read_byte(table)? as usize;
    let mut addr = table + 1 + (name_words * 2);

    // Entries are sorted in descending property order, so the scan can
    // stop at the first lower number
    loop {
        if vm.read_byte(addr)? == 0 {
            return Ok(0);
        }
        let h = header(vm, addr)?;
        match h.number.cmp(&property) {
            Ordering::Equal => return Ok(addr),
            Ordering::Less => return Ok(0),
            Ordering::Greater => addr = addr + h.header + h.data,
        }
    }
}

/// Byte address of a property's data, or 0 if the object doesn't have
/// the property.
pub fn property_data_address(
    vm: &ZMachine,
    object: usize,
    property: u8,
) -> Result<usize, RuntimeError> {
    match address(vm, object, property)? {
        0 => Ok(0),
        addr => Ok(addr + header(vm, addr)?.header),
    }
}

/// Length of a property's data. A `property_data_address` of 0 has
/// length 0.
pub fn property_length(vm: &ZMachine, property_data_address: usize) -> Result<usize, RuntimeError> {
    if property_data_address == 0 {
        return Ok(0);
    }

    // The byte before the data is either a one-byte header or the size
    // half of a two-byte header
    let b = vm.read_byte(property_data_address - 1)?;
    if vm.version() != Version::V3 && b & 0x80 == 0x80 {
        Ok(header(vm, property_data_address - 2)?.data)
    } else {
        Ok(header(vm, property_data_address - 1)?.data)
    }
}

/// Ztext of an object's short name.
pub fn short_name(vm: &ZMachine, object: usize) -> Result<Vec<u16>, RuntimeError> {
    let table = table_address(vm, object)?;
    let words = vm.read_byte(table)? as usize;
    (0..words)
        .map(|i| vm.read_word(table + 1 + (i * 2)))
        .collect()
}

fn default_property(vm: &ZMachine, property: u8) -> Result<u16, RuntimeError> {
    let table = vm.header_word(HeaderField::ObjectTable)? as usize;
    vm.read_word(table + ((property as usize - 1) * 2))
}

/// Byte or word value of a property for an object.
///
/// Falls back to the default property table when the object doesn't
/// have the property.
pub fn property(vm: &ZMachine, object: usize, property: u8) -> Result<u16, RuntimeError> {
    let addr = address(vm, object, property)?;
    if addr == 0 {
        return default_property(vm, property);
    }

    let h = header(vm, addr)?;
    match h.data {
        1 => Ok(vm.read_byte(addr + h.header)? as u16),
        2 => vm.read_word(addr + h.header),
        _ => fatal_error!(
            ErrorCode::InvalidObjectPropertySize,
            "Read of property {} on object {} needs size 1 or 2, was {}",
            property,
            object,
            h.data
        ),
    }
}

/// Next property number set on an object, in descending order.
///
/// A `property` of 0 returns the first property number. Returns 0 when
/// there is no next property.
pub fn next_property(vm: &ZMachine, object: usize, property: u8) -> Result<u8, RuntimeError> {
    if property == 0 {
        let table = table_address(vm, object)?;
        let name_words = vm.read_byte(table)? as usize;
        return Ok(header(vm, table + 1 + (name_words * 2))?.number);
    }

    let addr = address(vm, object, property)?;
    if addr == 0 {
        return Ok(0);
    }

    let h = header(vm, addr)?;
    Ok(header(vm, addr + h.header + h.data)?.number)
}

/// Sets the byte or word value of a property for an object.
///
/// The property must exist on the object.
pub fn set_property(
    vm: &mut ZMachine,
    object: usize,
    property: u8,
    value: u16,
) -> Result<(), RuntimeError> {
    let addr = address(vm, object, property)?;
    if addr == 0 {
        return fatal_error!(
            ErrorCode::InvalidObjectProperty,
            "Object {} does not have property {}",
            object,
            property
        );
    }

    let h = header(vm, addr)?;
    match h.data {
        1 => vm.write_byte(addr + h.header, value as u8),
        2 => vm.write_word(addr + h.header, value),
        _ => fatal_error!(
            ErrorCode::InvalidObjectProperty,
            "Write of property {} on object {} needs size 1 or 2, was {}",
            property,
            object,
            h.data
        ),
    }
}
