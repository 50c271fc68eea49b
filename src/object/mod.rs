//! [Object](https://inform-fiction.org/zmachine/standards/z1point1/sect12.html) utility functions

use crate::error::RuntimeError;
use crate::zmachine::state::header::HeaderField;
use crate::zmachine::state::memory::Version;
use crate::zmachine::ZMachine;

pub mod attribute;
pub mod property;

#[derive(Clone, Copy, Debug)]
enum Relation {
    Parent,
    Sibling,
    Child,
}

impl Relation {
    fn offset(&self, version: Version) -> usize {
        match (self, version) {
            (Relation::Parent, Version::V3) => 4,
            (Relation::Sibling, Version::V3) => 5,
            (Relation::Child, Version::V3) => 6,
            (Relation::Parent, _) => 6,
            (Relation::Sibling, _) => 8,
            (Relation::Child, _) => 10,
        }
    }
}

/// Byte address of an object's table entry, or 0 for object 0.
fn object_address(vm: &ZMachine, object: usize) -> Result<usize, RuntimeError> {
    if object == 0 {
        return Ok(0);
    }

    let table = vm.header_word(HeaderField::ObjectTable)? as usize;
    let (defaults, entry_size) = match vm.version() {
        Version::V3 => (62, 9),
        _ => (126, 14),
    };

    Ok(table + defaults + (entry_size * (object - 1)))
}

// Object 0 has no relatives
fn relation(vm: &ZMachine, object: usize, relation: Relation) -> Result<usize, RuntimeError> {
    if object == 0 {
        return Ok(0);
    }

    let address = object_address(vm, object)? + relation.offset(vm.version());
    match vm.version() {
        Version::V3 => Ok(vm.read_byte(address)? as usize),
        _ => Ok(vm.read_word(address)? as usize),
    }
}

// Updates only this object's entry; the relative itself is not touched
fn set_relation(
    vm: &mut ZMachine,
    object: usize,
    relation: Relation,
    value: usize,
) -> Result<(), RuntimeError> {
    let address = object_address(vm, object)? + relation.offset(vm.version());
    match vm.version() {
        Version::V3 => vm.write_byte(address, value as u8),
        _ => vm.write_word(address, value as u16),
    }
}

pub fn parent(vm: &ZMachine, object: usize) -> Result<usize, RuntimeError> {
    relation(vm, object, Relation::Parent)
}

pub fn sibling(vm: &ZMachine, object: usize) -> Result<usize, RuntimeError> {
    relation(vm, object, Relation::Sibling)
}

pub fn child(vm: &ZMachine, object: usize) -> Result<usize, RuntimeError> {
    relation(vm, object, Relation::Child)
}

pub fn set_parent(vm: &mut ZMachine, object: usize, parent: usize) -> Result<(), RuntimeError> {
    set_relation(vm, object, Relation::Parent, parent)
}

pub fn set_sibling(vm: &mut ZMachine, object: usize, sibling: usize) -> Result<(), RuntimeError> {
    set_relation(vm, object, Relation::Sibling, sibling)
}

pub fn set_child(vm: &mut ZMachine, object: usize, child: usize) -> Result<(), RuntimeError> {
    set_relation(vm, object, Relation::Child, child)
}
