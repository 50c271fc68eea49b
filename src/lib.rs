//! Z-machine interpreter core for story file versions 3, 5 and 8.
//!
//! The [interpreter::Interpreter] owns a dedicated execution thread and
//! exposes the host-facing lifecycle (start, pause, resume, abort, save,
//! restore).  Hosts supply a [zmachine::io::Screen] implementation and feed
//! input through the interpreter.
#[macro_use]
extern crate log;

pub mod config;
pub mod error;
pub mod files;
pub mod instruction;
pub mod interpreter;
pub mod object;
pub mod quetzal;
#[cfg(test)]
pub mod test_util;
pub mod text;
pub mod zmachine;
