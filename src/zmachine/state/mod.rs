use std::fmt;

use crate::error::{ErrorCode, RuntimeError};
use crate::instruction::StoreResult;
use crate::quetzal::{IFhd, Mem, Quetzal, Stk, Stks};
use crate::{fatal_error, recoverable_error};

use self::{
    frame::Frame,
    header::{Flags1v3, Flags1v5, HeaderField},
    memory::{Memory, Version},
};

pub mod frame;
pub mod header;
pub mod memory;

/// Mutable machine state: the memory image, the frame stack, and the
/// undo slot.  Frame 0 is the initial frame created by [State::initialize]
/// and never returns.
pub struct State {
    memory: Memory,
    static_mark: usize,
    frames: Vec<Frame>,
    undo: Option<Quetzal>,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "State: version {}, address space {:06x}, dynamic space {:04x}, frames {}",
            self.memory.version(),
            self.memory.size(),
            self.static_mark,
            self.frames.len()
        )
    }
}

impl TryFrom<(&State, usize)> for Quetzal {
    type Error = RuntimeError;

    fn try_from((state, pc): (&State, usize)) -> Result<Self, Self::Error> {
        let ifhd = IFhd::try_from((state, pc))?;
        let mem = Mem::try_from(state)?;
        let stks = Stks::try_from(state)?;
        Ok(Quetzal::new(ifhd, mem, stks))
    }
}

impl TryFrom<&State> for Mem {
    type Error = RuntimeError;

    fn try_from(value: &State) -> Result<Self, Self::Error> {
        let mem = Mem::new(true, value.memory().compress());
        debug!(target: "app::quetzal", "Mem: {}", mem);
        Ok(mem)
    }
}

impl TryFrom<(&State, usize)> for IFhd {
    type Error = RuntimeError;

    fn try_from((state, pc): (&State, usize)) -> Result<Self, Self::Error> {
        let release = header::field_word(state, HeaderField::Release)?;
        let mut serial = Vec::new();
        for i in 0..6 {
            serial.push(state.read_byte(HeaderField::Serial as usize + i)?);
        }
        let checksum = header::field_word(state, HeaderField::Checksum)?;

        let ifhd = IFhd::new(release, &serial, checksum, (pc as u32) & 0xFFFFFF);
        debug!(target: "app::quetzal", "IFhd: {}", ifhd);
        Ok(ifhd)
    }
}

impl TryFrom<&State> for Stks {
    type Error = RuntimeError;

    fn try_from(value: &State) -> Result<Self, Self::Error> {
        let mut stks = Vec::new();
        for (i, f) in value.frames.iter().enumerate() {
            // Flags: 0b000rvvvv
            //  r = 1 if the frame routine does not store a result
            //  vvvv = the number of local variables (0 - 15)
            // Frame 0 is the dummy frame and stores all-zero fields.
            let flags = if i == 0 {
                0
            } else {
                let discard = if f.result().is_some() { 0x00 } else { 0x10 };
                discard | f.local_variables().len() as u8
            };

            let result_variable = match f.result() {
                Some(r) if i > 0 => r.variable(),
                _ => 0,
            };

            let stk = Stk::new(
                f.return_address() as u32,
                flags,
                result_variable,
                if i == 0 { 0 } else { f.argument_count() },
                f.local_variables(),
                f.stack(),
            );
            debug!(target: "app::quetzal", "Stk: {}", stk);
            stks.push(stk);
        }

        Ok(Stks::new(stks))
    }
}

impl State {
    pub fn new(memory: Memory) -> Result<State, RuntimeError> {
        let static_mark = memory.read_word(HeaderField::StaticMark as usize)? as usize;
        Ok(State {
            memory,
            static_mark,
            frames: Vec::new(),
            undo: None,
        })
    }

    pub fn version(&self) -> Version {
        self.memory.version()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn current_frame(&self) -> Result<&Frame, RuntimeError> {
        if let Some(frame) = self.frames.last() {
            Ok(frame)
        } else {
            fatal_error!(ErrorCode::FrameUnderflow, "No runtime frame")
        }
    }

    fn current_frame_mut(&mut self) -> Result<&mut Frame, RuntimeError> {
        if let Some(frame) = self.frames.last_mut() {
            Ok(frame)
        } else {
            fatal_error!(ErrorCode::FrameUnderflow, "No runtime frame")
        }
    }

    /// Stamp interpreter capabilities into the header and, on first call,
    /// push the initial frame.  Run again on restart and restore, when the
    /// dynamic memory image has been replaced wholesale.
    pub fn initialize(
        &mut self,
        rows: u8,
        columns: u8,
        default_colors: (u8, u8),
    ) -> Result<(), RuntimeError> {
        if self.version() == Version::V3 {
            header::clear_flag1(self, Flags1v3::StatusLineNotAvailable as u8)?;
            header::set_flag1(self, Flags1v3::ScreenSplitAvailable as u8)?;
            header::clear_flag1(self, Flags1v3::VariablePitchDefault as u8)?;
        } else {
            header::set_flag1(self, Flags1v5::ColoursAvailable as u8)?;
            header::set_flag1(self, Flags1v5::BoldfaceAvailable as u8)?;
            header::set_flag1(self, Flags1v5::ItalicAvailable as u8)?;
            header::set_flag1(self, Flags1v5::FixedSpaceAvailable as u8)?;
            header::clear_flag1(self, Flags1v5::TimedInputAvailable as u8)?;

            header::set_byte(self, HeaderField::DefaultBackground, default_colors.1)?;
            header::set_byte(self, HeaderField::DefaultForeground, default_colors.0)?;
            header::set_byte(self, HeaderField::ScreenLines, rows)?;
            header::set_byte(self, HeaderField::ScreenColumns, columns)?;
            header::set_word(self, HeaderField::ScreenHeight, rows as u16)?;
            header::set_word(self, HeaderField::ScreenWidth, columns as u16)?;
        }

        // Interpreter number and version
        header::set_byte(self, HeaderField::InterpreterNumber, 6)?;
        header::set_byte(self, HeaderField::InterpreterVersion, b'Z')?;

        // Standard revision 1.0
        self.write_byte(HeaderField::Revision as usize, 1)?;
        self.write_byte(HeaderField::Revision as usize + 1, 0)?;

        if self.frames.is_empty() {
            let pc = header::field_word(self, HeaderField::InitialPC)? as usize;
            self.frames.push(Frame::new(pc, pc, &[], 0, &[], None, 0));
        }

        Ok(())
    }

    // Reads are allowed up to the end of the 16-bit address space, writes
    // to dynamic memory only
    pub fn read_byte(&self, address: usize) -> Result<u8, RuntimeError> {
        if address < 0x10000 {
            self.memory.read_byte(address)
        } else {
            fatal_error!(
                ErrorCode::IllegalMemoryAccess,
                "Byte address {:#06x} is in high memory",
                address
            )
        }
    }

    pub fn read_word(&self, address: usize) -> Result<u16, RuntimeError> {
        if address < 0xFFFF {
            self.memory.read_word(address)
        } else {
            fatal_error!(
                ErrorCode::IllegalMemoryAccess,
                "Word address {:#06x} is in high memory",
                address
            )
        }
    }

    pub fn write_byte(&mut self, address: usize, value: u8) -> Result<(), RuntimeError> {
        if address < self.static_mark {
            self.memory.write_byte(address, value)
        } else {
            fatal_error!(
                ErrorCode::IllegalMemoryAccess,
                "Byte address {:#04x} is above the end of dynamic memory ({:#04x})",
                address,
                self.static_mark
            )
        }
    }

    pub fn write_word(&mut self, address: usize, value: u16) -> Result<(), RuntimeError> {
        if address + 1 < self.static_mark {
            self.memory.write_word(address, value)
        } else {
            fatal_error!(
                ErrorCode::IllegalMemoryAccess,
                "Word address {:#04x} is above the end of dynamic memory ({:#04x})",
                address,
                self.static_mark
            )
        }
    }

    pub fn checksum(&self) -> Result<u16, RuntimeError> {
        self.memory.checksum()
    }

    fn global_variable_address(&self, variable: u8) -> Result<usize, RuntimeError> {
        let table = header::field_word(self, HeaderField::GlobalTable)? as usize;
        Ok(table + ((variable as usize - 16) * 2))
    }

    /// Read a variable.  Variable 0 pops the current frame's stack.
    pub fn variable(&mut self, variable: u8) -> Result<u16, RuntimeError> {
        if variable < 16 {
            self.current_frame_mut()?.local_variable(variable)
        } else {
            let address = self.global_variable_address(variable)?;
            self.read_word(address)
        }
    }

    /// Read a variable without popping the stack.
    pub fn peek_variable(&self, variable: u8) -> Result<u16, RuntimeError> {
        if variable < 16 {
            self.current_frame()?.peek_local_variable(variable)
        } else {
            let address = self.global_variable_address(variable)?;
            self.read_word(address)
        }
    }

    /// Write a variable.  Variable 0 pushes the current frame's stack.
    pub fn set_variable(&mut self, variable: u8, value: u16) -> Result<(), RuntimeError> {
        debug!(target: "app::state", "Set variable {:02x} to {:04x}", variable, value);
        if variable < 16 {
            self.current_frame_mut()?
                .set_local_variable(variable, value)
        } else {
            let address = self.global_variable_address(variable)?;
            self.write_word(address, value)
        }
    }

    /// Indirect variable write: variable 0 replaces the top of stack.
    pub fn set_variable_indirect(&mut self, variable: u8, value: u16) -> Result<(), RuntimeError> {
        debug!(target: "app::state", "Set variable {:02x} to {:04x} (indirect)", variable, value);
        if variable < 16 {
            self.current_frame_mut()?
                .set_local_variable_indirect(variable, value)
        } else {
            let address = self.global_variable_address(variable)?;
            self.write_word(address, value)
        }
    }

    pub fn push(&mut self, value: u16) -> Result<(), RuntimeError> {
        self.current_frame_mut()?.set_local_variable(0, value)
    }

    /// Raw instruction bytes at an address, sized for the worst case:
    /// 2 opcode bytes, 2 operand type bytes, 16 operand bytes, a store
    /// variable, and a 2-byte branch offset.
    pub fn instruction(&self, address: usize) -> Vec<u8> {
        self.memory.slice(address, 23)
    }

    /// Encoded string literal at an address, read to the terminating word.
    pub fn string_literal(&self, address: usize) -> Result<Vec<u16>, RuntimeError> {
        let mut d = Vec::new();
        loop {
            let w = self.memory.read_word(address + (d.len() * 2))?;
            d.push(w);
            if w & 0x8000 == 0x8000 {
                return Ok(d);
            }
        }
    }

    pub fn packed_routine_address(&self, address: u16) -> Result<usize, RuntimeError> {
        Ok(address as usize * self.version().routine_multiplier())
    }

    pub fn packed_string_address(&self, address: u16) -> Result<usize, RuntimeError> {
        Ok(address as usize * self.version().string_multiplier())
    }

    fn routine_header(&self, address: usize) -> Result<(usize, Vec<u16>), RuntimeError> {
        let variable_count = self.memory.read_byte(address)? as usize;
        if variable_count > 15 {
            return fatal_error!(
                ErrorCode::InvalidAddress,
                "Routine at {:#06x} has {} local variables",
                address,
                variable_count
            );
        }

        if self.version() < Version::V5 {
            let mut local_variables = Vec::new();
            for i in 0..variable_count {
                local_variables.push(self.memory.read_word(address + 1 + (i * 2))?);
            }
            Ok((address + 1 + (variable_count * 2), local_variables))
        } else {
            Ok((address + 1, vec![0; variable_count]))
        }
    }

    /// Push a frame for a routine call and return the address of its first
    /// instruction.  Calling address 0 stores FALSE and proceeds at the
    /// return address without a new frame.
    pub fn call_routine(
        &mut self,
        address: usize,
        arguments: &[u16],
        result: Option<StoreResult>,
        return_address: usize,
    ) -> Result<usize, RuntimeError> {
        if address == 0 {
            if let Some(r) = result {
                self.set_variable(r.variable(), 0)?;
            }
            Ok(return_address)
        } else {
            let (initial_pc, local_variables) = self.routine_header(address)?;
            let frame = Frame::call_routine(
                address,
                initial_pc,
                arguments,
                local_variables,
                result,
                return_address,
            );
            debug!(target: "app::state", "Call routine {:06x} -> frame {}", address, self.frames.len());
            self.frames.push(frame);
            Ok(initial_pc)
        }
    }

    /// Pop the current frame and return execution to the caller, storing
    /// `value` if the call expected a result.
    pub fn return_routine(&mut self, value: u16) -> Result<usize, RuntimeError> {
        if self.frames.len() < 2 {
            return fatal_error!(ErrorCode::ReturnNoCaller, "Return with no caller frame");
        }

        // Checked above
        if let Some(f) = self.frames.pop() {
            debug!(target: "app::state", "Return {:04x} to {:06x}", value, f.return_address());
            self.current_frame_mut()?.set_pc(f.return_address());
            if let Some(r) = f.result() {
                self.set_variable(r.variable(), value)?;
            }
        }

        Ok(self.current_frame()?.pc())
    }

    /// Unwind the frame stack to `depth` frames, then return with `result`.
    pub fn throw(&mut self, depth: u16, result: u16) -> Result<usize, RuntimeError> {
        if depth as usize > self.frames.len() {
            return fatal_error!(
                ErrorCode::FrameUnderflow,
                "Throw to frame {} with only {} frames",
                depth,
                self.frames.len()
            );
        }
        self.frames.truncate(depth as usize);
        self.return_routine(result)
    }

    pub fn pc(&self) -> Result<usize, RuntimeError> {
        Ok(self.current_frame()?.pc())
    }

    pub fn set_pc(&mut self, pc: usize) -> Result<(), RuntimeError> {
        self.current_frame_mut()?.set_pc(pc);
        Ok(())
    }

    pub fn argument_count(&self) -> Result<u8, RuntimeError> {
        Ok(self.current_frame()?.argument_count())
    }

    /// Serialize the current state.  `pc` should address the instruction
    /// that resumes execution after a restore.
    pub fn save(&self, pc: usize) -> Result<Vec<u8>, RuntimeError> {
        let quetzal = Quetzal::try_from((self, pc))?;
        debug!(target: "app::quetzal", "Saving state: {}", quetzal);
        Ok(Vec::from(&quetzal))
    }

    fn restore_state(&mut self, quetzal: Quetzal) -> Result<Option<usize>, RuntimeError> {
        // Interpreter-owned header state survives the memory overwrite
        let flags2 = header::field_word(self, HeaderField::Flags2)?;
        let fg = header::field_byte(self, HeaderField::DefaultForeground)?;
        let bg = header::field_byte(self, HeaderField::DefaultBackground)?;
        let rows = header::field_byte(self, HeaderField::ScreenLines)?;
        let columns = header::field_byte(self, HeaderField::ScreenColumns)?;

        // The memory image is replaced before the frame stack so a bad
        // save leaves the running state untouched
        let frames = Vec::from(quetzal.stks());
        let mem = quetzal.mem();
        if mem.compressed() {
            self.memory.restore_compressed(mem.memory())?;
        } else {
            self.memory.restore(mem.memory())?;
        }
        self.frames = frames;

        self.initialize(rows, columns, (fg, bg))?;
        self.memory
            .write_word(HeaderField::Flags2 as usize, flags2)?;

        Ok(Some(quetzal.ifhd().pc() as usize))
    }

    /// Restore from serialized data, rejecting saves from a different
    /// story file.  Returns the pc stored in the save.
    pub fn restore(&mut self, data: &[u8]) -> Result<Option<usize>, RuntimeError> {
        let quetzal = Quetzal::try_from(data)?;
        debug!(target: "app::quetzal", "Restoring state: {}", quetzal);
        let ifhd = IFhd::try_from((&*self, 0))?;
        if &ifhd != quetzal.ifhd() {
            error!(target: "app::quetzal", "Save state does not match the running story");
            recoverable_error!(
                ErrorCode::Restore,
                "Save state was created from a different story file"
            )
        } else {
            self.restore_state(quetzal)
        }
    }

    /// Store the undo state, replacing any previous one.
    pub fn save_undo(&mut self, pc: usize) -> Result<(), RuntimeError> {
        let quetzal = Quetzal::try_from((&*self, pc))?;
        debug!(target: "app::quetzal", "Storing undo state");
        self.undo = Some(quetzal);
        Ok(())
    }

    pub fn restore_undo(&mut self) -> Result<Option<usize>, RuntimeError> {
        if let Some(quetzal) = self.undo.take() {
            debug!(target: "app::quetzal", "Restoring undo state");
            self.restore_state(quetzal)
        } else {
            recoverable_error!(ErrorCode::UndoNoState, "No undo state to restore")
        }
    }

    /// Reset dynamic memory and the frame stack to the initial state,
    /// preserving interpreter-owned header fields.
    pub fn restart(&mut self) -> Result<usize, RuntimeError> {
        let flags2 = header::field_word(self, HeaderField::Flags2)?;
        let fg = header::field_byte(self, HeaderField::DefaultForeground)?;
        let bg = header::field_byte(self, HeaderField::DefaultBackground)?;
        let rows = header::field_byte(self, HeaderField::ScreenLines)?;
        let columns = header::field_byte(self, HeaderField::ScreenColumns)?;

        self.memory.reset();
        self.frames.clear();

        self.initialize(rows, columns, (fg, bg))?;
        self.memory
            .write_word(HeaderField::Flags2 as usize, flags2)?;

        self.pc()
    }
}
