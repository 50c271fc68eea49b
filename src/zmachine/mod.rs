pub mod io;
pub mod rng;
pub mod state;

use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::Path,
    sync::Arc,
};

use regex::Regex;

use crate::{
    error::{ErrorCode, RuntimeError},
    fatal_error, files,
    instruction::{decoder, processor, StoreResult},
    object::property,
    recoverable_error, text,
};

use self::{
    io::{InputQueue, NamePrompt, Screen, IO},
    rng::{chacha_rng::ChaChaRng, ZRng},
    state::{
        header::{self, Flags1v3, HeaderField},
        memory::{Memory, Version},
        State,
    },
};

/// The virtual machine.
///
/// Owns the runtime state and the output side of the I/O layer, and
/// pulls input from the shared [InputQueue] and [NamePrompt] channels
/// that the controlling thread feeds.
pub struct ZMachine {
    story: String,
    version: Version,
    core: State,
    io: IO,
    rng: Box<dyn ZRng>,
    input: Arc<InputQueue>,
    prompt: Arc<NamePrompt>,
}

impl ZMachine {
    pub fn new(
        memory: Memory,
        screen: Box<dyn Screen>,
        input: Arc<InputQueue>,
        prompt: Arc<NamePrompt>,
        name: &str,
    ) -> Result<ZMachine, RuntimeError> {
        let io = IO::new(screen);
        let mut core = State::new(memory)?;
        let version = core.version();
        core.initialize(io.rows() as u8, io.columns() as u8, io.default_colors())?;

        Ok(ZMachine {
            story: name.to_string(),
            version,
            core,
            io,
            rng: Box::new(ChaChaRng::new()),
            input,
            prompt,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    // Memory and variables
    pub fn read_byte(&self, addr: usize) -> Result<u8, RuntimeError> {
        self.core.read_byte(addr)
    }

    pub fn read_word(&self, addr: usize) -> Result<u16, RuntimeError> {
        self.core.read_word(addr)
    }

    // A write that flips the Flags 2 transcript bit opens or closes
    // output stream 2 as a side effect.
    fn sync_transcript(&mut self, old: u16, new: u16) -> Result<(), RuntimeError> {
        match (old & 0x1, new & 0x1) {
            (0, 1) => {
                if !self.io.is_stream_2_open() {
                    self.start_stream_2()?;
                }
                self.io.enable_output_stream(2, None)
            }
            (1, 0) => self.io.disable_output_stream(&mut self.core, 2),
            _ => Ok(()),
        }
    }

    pub fn write_byte(&mut self, addr: usize, value: u8) -> Result<(), RuntimeError> {
        // Flags 2 low byte
        if addr == 0x11 {
            let old = self.core.read_byte(0x11)?;
            if self.sync_transcript(old as u16, value as u16).is_err() {
                warn!(target: "app::memory", "Transcript did not start; leaving Flags 2 alone");
                return Ok(());
            }
        }

        self.core.write_byte(addr, value)
    }

    pub fn write_word(&mut self, addr: usize, value: u16) -> Result<(), RuntimeError> {
        // Flags 2
        if addr == 0x10 {
            let old = self.core.read_word(0x10)?;
            if self.sync_transcript(old, value).is_err() {
                warn!(target: "app::memory", "Transcript did not start; leaving Flags 2 alone");
                return Ok(());
            }
        }

        self.core.write_word(addr, value)
    }

    pub fn variable(&mut self, var: u8) -> Result<u16, RuntimeError> {
        self.core.variable(var)
    }

    pub fn peek_variable(&self, var: u8) -> Result<u16, RuntimeError> {
        self.core.peek_variable(var)
    }

    pub fn set_variable(&mut self, var: u8, value: u16) -> Result<(), RuntimeError> {
        self.core.set_variable(var, value)
    }

    pub fn set_variable_indirect(&mut self, var: u8, value: u16) -> Result<(), RuntimeError> {
        self.core.set_variable_indirect(var, value)
    }

    pub fn push(&mut self, value: u16) -> Result<(), RuntimeError> {
        self.core.push(value)
    }

    pub fn string_literal(&self, addr: usize) -> Result<Vec<u16>, RuntimeError> {
        self.core.string_literal(addr)
    }

    pub fn packed_routine_address(&self, addr: u16) -> Result<usize, RuntimeError> {
        self.core.packed_routine_address(addr)
    }

    pub fn packed_string_address(&self, addr: u16) -> Result<usize, RuntimeError> {
        self.core.packed_string_address(addr)
    }

    pub fn instruction(&self, addr: usize) -> Vec<u8> {
        self.core.instruction(addr)
    }

    pub fn frame_count(&self) -> usize {
        self.core.frame_count()
    }

    pub fn checksum(&self) -> Result<u16, RuntimeError> {
        self.core.checksum()
    }

    // Saved games
    pub fn save(&mut self, pc: usize) -> Result<(), RuntimeError> {
        let data = self.core.save(pc)?;
        self.prompt_and_write("ifzs", &data, false)
    }

    pub fn restore(&mut self) -> Result<Option<usize>, RuntimeError> {
        let data = self.prompt_and_read("ifzs").inspect_err(
            |e| error!(target: "app::state", "Error restoring: {}", e),
        )?;
        self.core.restore(&data)
    }

    pub fn pc(&self) -> Result<usize, RuntimeError> {
        self.core.pc()
    }

    pub fn set_pc(&mut self, pc: usize) -> Result<(), RuntimeError> {
        self.core.set_pc(pc)
    }

    /// Captures the machine state without prompting for a filename.
    pub fn freeze(&self, pc: usize) -> Result<Vec<u8>, RuntimeError> {
        self.core.save(pc)
    }

    /// Applies a state capture, setting the program counter to the stored
    /// address.  A failed restore leaves the machine untouched.
    pub fn thaw(&mut self, data: &[u8]) -> Result<bool, RuntimeError> {
        match self.core.restore(data)? {
            Some(pc) => {
                self.core.set_pc(pc)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn save_undo(&mut self, pc: usize) -> Result<(), RuntimeError> {
        self.core.save_undo(pc)
    }

    pub fn restore_undo(&mut self) -> Result<Option<usize>, RuntimeError> {
        self.core.restore_undo()
    }

    pub fn restart(&mut self) -> Result<usize, RuntimeError> {
        self.rng.seed(0);
        self.io.reset();
        self.core.restart()
    }

    // Routines
    pub fn call_routine(
        &mut self,
        addr: usize,
        arguments: &[u16],
        result: Option<StoreResult>,
        return_addr: usize,
    ) -> Result<usize, RuntimeError> {
        self.core.call_routine(addr, arguments, result, return_addr)
    }

    pub fn return_routine(&mut self, value: u16) -> Result<usize, RuntimeError> {
        self.core.return_routine(value)
    }

    pub fn throw(&mut self, depth: u16, result: u16) -> Result<usize, RuntimeError> {
        self.core.throw(depth, result)
    }

    pub fn argument_count(&self) -> Result<u8, RuntimeError> {
        self.core.argument_count()
    }

    // Header
    pub fn header_byte(&self, field: HeaderField) -> Result<u8, RuntimeError> {
        header::field_byte(&self.core, field)
    }

    pub fn header_word(&self, field: HeaderField) -> Result<u16, RuntimeError> {
        header::field_word(&self.core, field)
    }

    // RNG
    pub fn random(&mut self, range: u16) -> u16 {
        self.rng.random(range)
    }

    pub fn seed(&mut self, seed: u16) {
        self.rng.seed(seed)
    }

    pub fn predictable(&mut self, seed: u16) {
        self.rng.predictable(seed)
    }

    // Screen
    pub fn rows(&self) -> u16 {
        self.io.rows()
    }

    pub fn columns(&self) -> u16 {
        self.io.columns()
    }

    fn start_stream_2(&mut self) -> Result<(), RuntimeError> {
        let file = self.prompt_and_create("txt", true)?;
        self.io.set_stream_2(file);
        Ok(())
    }

    pub fn output_stream(&mut self, stream: i16, table: Option<usize>) -> Result<(), RuntimeError> {
        match stream {
            1..=4 => {
                debug!(target: "app::stream", "Enabling output stream {}", stream);
                if stream == 2 && !self.io.is_stream_2_open() {
                    self.start_stream_2()?;
                }
                self.io.enable_output_stream(stream as u8, table)
            }
            -4..=-1 => {
                debug!(target: "app::stream", "Disabling output stream {}", -stream);
                self.io.disable_output_stream(&mut self.core, -stream as u8)
            }
            _ => recoverable_error!(
                ErrorCode::InvalidOutputStream,
                "Output stream {} is not valid: [-4..4]",
                stream
            ),
        }
    }

    pub fn print(&mut self, text: &[u16]) -> Result<(), RuntimeError> {
        self.io.print_vec(text)
    }

    pub fn print_str(&mut self, text: String) -> Result<(), RuntimeError> {
        let zchars: Vec<u16> = text.chars().map(|c| c as u16).collect();
        self.io.print_vec(&zchars)
    }

    pub fn new_line(&mut self) -> Result<(), RuntimeError> {
        self.io.new_line()
    }

    pub fn backspace(&mut self) -> Result<(), RuntimeError> {
        self.io.backspace()
    }

    pub fn split_window(&mut self, lines: u16) -> Result<(), RuntimeError> {
        self.io.split_window(lines)
    }

    pub fn set_window(&mut self, window: u16) -> Result<(), RuntimeError> {
        self.io.set_window(window)
    }

    pub fn erase_window(&mut self, window: i16) -> Result<(), RuntimeError> {
        self.io.erase_window(window)
    }

    pub fn erase_line(&mut self) -> Result<(), RuntimeError> {
        self.io.erase_line()
    }

    /// Builds and prints the version 3 status line from global variables
    /// G0 (location), G1 and G2 (score/turns or hours/minutes).
    pub fn status_line(&mut self) -> Result<(), RuntimeError> {
        let object = self.core.variable(16)? as usize;
        let mut left = match object {
            0 => Vec::new(),
            _ => text::from_vec(self, &property::short_name(self, object)?)?,
        };

        let g1 = self.core.variable(17)?;
        let g2 = self.core.variable(18)?;
        let right = match header::flag1(&self.core, Flags1v3::StatusLineType as u8)? {
            0 => format!("{:<8}", format!("{}/{}", g1 as i16, g2)),
            _ => {
                let suffix = if g1 > 11 { "PM" } else { "AM" };
                let hour = if g1 % 12 == 0 { 12 } else { g1 % 12 };
                format!("{:2}:{:02} {}", hour, g2, suffix)
            }
        };
        let mut right: Vec<u16> = right.bytes().map(u16::from).collect();

        self.io.status_line(&mut left, &mut right)
    }

    pub fn set_font(&mut self, font: u16) -> Result<u16, RuntimeError> {
        Ok(self.io.set_font(font))
    }

    pub fn set_text_style(&mut self, style: u16) -> Result<(), RuntimeError> {
        self.io.set_style(style)
    }

    pub fn cursor(&mut self) -> Result<(u16, u16), RuntimeError> {
        self.io.cursor()
    }

    pub fn set_cursor(&mut self, row: u16, column: u16) -> Result<(), RuntimeError> {
        self.io.set_cursor(row, column)
    }

    pub fn buffer_mode(&mut self, mode: u16) -> Result<(), RuntimeError> {
        self.io.buffer_mode(mode)
    }

    pub fn beep(&mut self) -> Result<(), RuntimeError> {
        self.io.beep()
    }

    pub fn set_colors(&mut self, foreground: u16, background: u16) -> Result<(), RuntimeError> {
        self.io.set_colors(foreground, background)
    }

    // Input
    /// Blocks until a single key arrives.
    pub fn read_key(&mut self) -> Result<u16, RuntimeError> {
        self.input.next_key()
    }

    /// Blocks collecting keys until a terminator arrives or the buffer
    /// fills.
    ///
    /// `text` holds input left over from an earlier interrupted read.
    /// If this read is itself interrupted, the collected input is pushed
    /// back on the queue so the repeated instruction sees it again.
    pub fn read_line(
        &mut self,
        text: &[u16],
        len: usize,
        terminators: &[u16],
    ) -> Result<Vec<u16>, RuntimeError> {
        let mut buffer = text.to_vec();

        loop {
            let key = match self.input.next_key() {
                Ok(key) => key,
                Err(e) => {
                    self.input.restore(&buffer[text.len()..]);
                    return Err(e);
                }
            };

            if terminators.contains(&key) || (terminators.contains(&255) && key > 128) {
                buffer.push(key);
                if key == 0x0d {
                    self.io.print_vec(&[key])?;
                }
                return Ok(buffer);
            }

            match key {
                0x08 => {
                    if !buffer.is_empty() {
                        buffer.pop();
                        self.backspace()?;
                    }
                }
                0x20..=0x7e if buffer.len() < len => {
                    buffer.push(key);
                    self.io.print_vec(&[key])?;
                }
                _ => {}
            }
        }
    }

    /// Asks the host for a filename, suggesting a default derived from
    /// the story name.
    pub fn prompt_filename(
        &mut self,
        suffix: &str,
        overwrite: bool,
        first: bool,
    ) -> Result<String, RuntimeError> {
        let default_name = match first {
            true => files::first_available(&self.story, suffix),
            false => files::last_existing(&self.story, suffix),
        };

        let filename = self.prompt.request(&default_name)?.trim().to_string();

        if !overwrite {
            match Path::new(&filename).try_exists() {
                Ok(true) => {
                    return recoverable_error!(
                        ErrorCode::InvalidFilename,
                        "'{}' already exists",
                        filename
                    )
                }
                Ok(false) => {}
                Err(e) => {
                    return recoverable_error!(
                        ErrorCode::FileError,
                        "Error checking if '{}' exists: {}",
                        filename,
                        e
                    )
                }
            }
        }

        // Refuse names that look like story files
        let story_pattern = Regex::new(r".*\.z\d").map_err(|e| {
            RuntimeError::fatal(
                ErrorCode::Interpreter,
                format!("Internal error with regex checking filename: {}", e),
            )
        })?;
        if story_pattern.is_match(&filename) {
            recoverable_error!(
                ErrorCode::InvalidFilename,
                "Filenames ending in '.z#' are not allowed"
            )
        } else {
            Ok(filename)
        }
    }

    fn prompt_and_create(&mut self, suffix: &str, overwrite: bool) -> Result<File, RuntimeError> {
        let filename = self.prompt_filename(suffix, overwrite, true)?;
        OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(filename.trim())
            .map_err(|e| RuntimeError::recoverable(ErrorCode::FileError, e.to_string()))
    }

    fn prompt_and_write(
        &mut self,
        suffix: &str,
        data: &[u8],
        overwrite: bool,
    ) -> Result<(), RuntimeError> {
        let mut file = self.prompt_and_create(suffix, overwrite)?;
        file.write_all(data)
            .and_then(|_| file.flush())
            .map_err(|e| RuntimeError::recoverable(ErrorCode::FileError, e.to_string()))
    }

    fn prompt_and_read(&mut self, suffix: &str) -> Result<Vec<u8>, RuntimeError> {
        let filename = self.prompt_filename(suffix, true, false)?;
        let mut data = Vec::new();
        File::open(filename.trim())
            .and_then(|mut file| file.read_to_end(&mut data))
            .map_err(|e| RuntimeError::recoverable(ErrorCode::FileError, e.to_string()))?;
        Ok(data)
    }

    pub fn quit(&mut self) -> Result<(), RuntimeError> {
        self.io.quit();
        Ok(())
    }

    pub fn finished(&mut self, message: Option<String>) {
        self.io.finished(message)
    }

    /// Decodes and executes the instruction at the current program
    /// counter.
    ///
    /// Returns false when the program quit.  An interrupted input read
    /// leaves the program counter on the interrupted instruction so it
    /// repeats on resume.
    pub fn step(&mut self) -> Result<bool, RuntimeError> {
        let instruction = decoder::decode_instruction(self, self.core.pc()?)?;
        match processor::dispatch(self, &instruction)? {
            0 => Ok(false),
            pc => {
                self.core.set_pc(pc)?;
                Ok(true)
            }
        }
    }
}
