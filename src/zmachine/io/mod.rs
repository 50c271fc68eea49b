//! Output stream handling and host-facing I/O channels
use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::sync::{Condvar, Mutex};

use crate::error::{ErrorCode, RuntimeError};
use crate::recoverable_error;
use crate::zmachine::state::State;

/// Interface to the host screen model.
///
/// The interpreter core never draws anything itself.  Every screen
/// operation the running program requests is forwarded through this
/// trait and the host is free to honor or ignore it.  Implementations
/// must be [Send] because the interpreter runs on its own thread.
pub trait Screen: Send {
    /// Screen height in rows
    fn rows(&self) -> u16;
    /// Screen width in columns
    fn columns(&self) -> u16;
    /// Default (foreground, background) colors
    fn default_colors(&self) -> (u8, u8);
    /// Print text to the currently selected window
    fn print(&mut self, text: &[u16]);
    /// Print the version 3 status line
    fn status_line(&mut self, text: &[u16]);
    fn new_line(&mut self);
    /// Erase the character behind the cursor during line input
    fn backspace(&mut self);
    fn split_window(&mut self, lines: u16);
    fn set_window(&mut self, window: u16);
    fn erase_window(&mut self, window: i16);
    fn erase_line(&mut self);
    /// Cursor position as (row, column), 1-based
    fn cursor(&self) -> (u16, u16);
    fn set_cursor(&mut self, row: u16, column: u16);
    fn set_style(&mut self, style: u16);
    fn buffer_mode(&mut self, mode: u16);
    fn set_colors(&mut self, foreground: u16, background: u16);
    /// Request a font change, returning the previous font or 0 if the
    /// requested font is unavailable
    fn set_font(&mut self, font: u16) -> u16;
    /// Notification that an output stream was enabled (mask bit set) or
    /// disabled, with the table address for stream 3
    fn output_stream(&mut self, mask: u8, table: Option<usize>);
    fn beep(&mut self);
    /// Reset the screen to its initial state after a restart
    fn reset(&mut self);
    /// Notification that the program executed QUIT
    fn quit(&mut self);
    /// Notification that execution halted.  `message` carries the text
    /// of an uncaught fault, or None for a normal exit.
    fn on_finished(&mut self, message: Option<String>);
}

/// Stream 3 table writer.
///
/// Stream 3 selections nest.  Each entry captures output until the
/// stream is deselected, at which point the buffered text is written
/// back to the table in memory.
#[derive(Debug)]
struct Stream3 {
    address: usize,
    buffer: Vec<u16>,
}

impl Stream3 {
    fn new(address: usize) -> Stream3 {
        Stream3 {
            address,
            buffer: Vec::new(),
        }
    }

    fn address(&self) -> usize {
        self.address
    }

    fn buffer(&self) -> &Vec<u16> {
        &self.buffer
    }

    fn push(&mut self, c: u16) {
        self.buffer.push(c);
    }
}

pub struct IO {
    screen: Box<dyn Screen>,
    output_streams: u8,
    stream_2: Option<File>,
    stream_3: Vec<Stream3>,
    selected_window: u8,
    buffered: bool,
}

impl IO {
    pub fn new(screen: Box<dyn Screen>) -> IO {
        IO {
            screen,
            // Stream 1 starts enabled
            output_streams: 0x1,
            stream_2: None,
            stream_3: Vec::new(),
            selected_window: 0,
            buffered: true,
        }
    }

    pub fn rows(&self) -> u16 {
        self.screen.rows()
    }

    pub fn columns(&self) -> u16 {
        self.screen.columns()
    }

    pub fn default_colors(&self) -> (u8, u8) {
        self.screen.default_colors()
    }

    pub fn is_stream_2_open(&self) -> bool {
        self.stream_2.is_some()
    }

    pub fn set_stream_2(&mut self, file: File) {
        self.stream_2 = Some(file)
    }

    pub fn is_stream_enabled(&self, stream: u8) -> bool {
        let mask = (1 << (stream - 1)) & 0xF;
        self.output_streams & mask == mask
    }

    pub fn enable_output_stream(
        &mut self,
        stream: u8,
        table: Option<usize>,
    ) -> Result<(), RuntimeError> {
        match stream {
            1..=2 => {
                self.output_streams |= 1 << (stream - 1);
                debug!(target: "app::stream", "Enable output stream {} => {:04b}", stream, self.output_streams);
            }
            3 => {
                if let Some(address) = table {
                    self.output_streams |= 0x4;
                    self.stream_3.push(Stream3::new(address));
                    debug!(target: "app::stream", "Enable output stream 3 [{}] => {:04b}", self.stream_3.len(), self.output_streams);
                } else {
                    return recoverable_error!(
                        ErrorCode::Stream3Table,
                        "Stream 3 enabled without a table address"
                    );
                }
            }
            4 => {
                return recoverable_error!(
                    ErrorCode::InvalidOutputStream,
                    "Stream 4 is not supported"
                )
            }
            _ => {
                return recoverable_error!(
                    ErrorCode::InvalidOutputStream,
                    "Stream {} is not a valid output stream [1..4]",
                    stream
                )
            }
        }

        self.screen.output_stream(self.output_streams, table);
        Ok(())
    }

    pub fn disable_output_stream(
        &mut self,
        state: &mut State,
        stream: u8,
    ) -> Result<(), RuntimeError> {
        match stream {
            1..=2 => {
                self.output_streams &= !(1 << (stream - 1));
                debug!(target: "app::stream", "Disable output stream {} => {:04b}", stream, self.output_streams);
            }
            3 => {
                if let Some(s3) = self.stream_3.pop() {
                    let address = s3.address();
                    let buffer = s3.buffer();
                    state.write_word(address, buffer.len() as u16)?;
                    for (i, c) in buffer.iter().enumerate() {
                        state.write_byte(address + 2 + i, *c as u8)?;
                    }
                }

                if self.stream_3.is_empty() {
                    self.output_streams &= !0x4;
                }
                debug!(target: "app::stream", "Disable output stream 3 [{}] => {:04b}", self.stream_3.len(), self.output_streams);
            }
            4 => {
                return recoverable_error!(
                    ErrorCode::InvalidOutputStream,
                    "Stream 4 is not supported"
                )
            }
            _ => {
                return recoverable_error!(
                    ErrorCode::InvalidOutputStream,
                    "Stream {} is not a valid output stream [1..4]",
                    stream
                )
            }
        }

        self.screen.output_stream(self.output_streams, None);
        Ok(())
    }

    fn transcript(&mut self, text: &[u16]) {
        if let Some(f) = self.stream_2.as_mut() {
            let t: Vec<u8> = text
                .iter()
                .map(|c| if *c == 0x0d { 0x0a } else { *c as u8 })
                .collect();
            if let Err(e) = f.write_all(&t) {
                error!(target: "app::stream", "Error writing to transcript file: {}", e);
            } else if let Err(e) = f.flush() {
                error!(target: "app::stream", "Error flushing transcript file: {}", e);
            }
        }
    }

    /// Prints text to the enabled output streams.
    ///
    /// Stream 3 is exclusive.  While it is selected no text reaches the
    /// screen or the transcript.
    pub fn print_vec(&mut self, text: &[u16]) -> Result<(), RuntimeError> {
        if self.is_stream_enabled(3) {
            if let Some(s3) = self.stream_3.last_mut() {
                for c in text {
                    match *c {
                        // ZSCII 0 is not printed
                        0 => {}
                        0xa => s3.push(0xd),
                        _ => s3.push(*c),
                    }
                }
            }
        } else if self.is_stream_enabled(1) {
            self.screen.print(text);
            // The transcript only records the lower window
            if self.is_stream_enabled(2) && self.selected_window == 0 {
                self.transcript(text);
            }
        }

        Ok(())
    }

    pub fn new_line(&mut self) -> Result<(), RuntimeError> {
        if self.is_stream_enabled(3) {
            if let Some(s3) = self.stream_3.last_mut() {
                s3.push(0x0d);
            }
        } else if self.is_stream_enabled(1) {
            self.screen.new_line();
            if self.is_stream_enabled(2) && self.selected_window == 0 {
                self.transcript(&[0x0a]);
            }
        }

        Ok(())
    }

    pub fn status_line(
        &mut self,
        left: &mut Vec<u16>,
        right: &mut Vec<u16>,
    ) -> Result<(), RuntimeError> {
        let width = self.columns() as usize;
        let available_for_left = width.saturating_sub(right.len() + 1);
        if left.len() > available_for_left {
            left.truncate(available_for_left.saturating_sub(3));
            left.extend_from_slice(&[b'.' as u16; 3]);
        }

        let mut spaces = vec![0x20; width.saturating_sub(left.len() + right.len() + 1)];
        let mut status_line = vec![0x20];
        status_line.append(left);
        status_line.append(&mut spaces);
        status_line.append(right);
        self.screen.status_line(&status_line);
        Ok(())
    }

    pub fn split_window(&mut self, lines: u16) -> Result<(), RuntimeError> {
        self.screen.split_window(lines);
        Ok(())
    }

    pub fn set_window(&mut self, window: u16) -> Result<(), RuntimeError> {
        if window > 1 {
            recoverable_error!(
                ErrorCode::Interpreter,
                "{} is not a valid window [0..1]",
                window
            )
        } else {
            self.selected_window = window as u8;
            self.screen.set_window(window);
            Ok(())
        }
    }

    pub fn erase_window(&mut self, window: i16) -> Result<(), RuntimeError> {
        if (-2..=1).contains(&window) {
            if window < 0 {
                self.selected_window = 0;
            }
            self.screen.erase_window(window);
            Ok(())
        } else {
            recoverable_error!(
                ErrorCode::Interpreter,
                "{} is not a valid window to erase [-2..1]",
                window
            )
        }
    }

    pub fn erase_line(&mut self) -> Result<(), RuntimeError> {
        self.screen.erase_line();
        Ok(())
    }

    pub fn cursor(&self) -> Result<(u16, u16), RuntimeError> {
        Ok(self.screen.cursor())
    }

    pub fn set_cursor(&mut self, row: u16, column: u16) -> Result<(), RuntimeError> {
        self.screen.set_cursor(row, column);
        Ok(())
    }

    pub fn set_style(&mut self, style: u16) -> Result<(), RuntimeError> {
        self.screen.set_style(style);
        Ok(())
    }

    pub fn buffer_mode(&mut self, mode: u16) -> Result<(), RuntimeError> {
        self.buffered = mode != 0;
        self.screen.buffer_mode(mode);
        Ok(())
    }

    pub fn set_colors(&mut self, foreground: u16, background: u16) -> Result<(), RuntimeError> {
        self.screen.set_colors(foreground, background);
        Ok(())
    }

    pub fn set_font(&mut self, font: u16) -> u16 {
        self.screen.set_font(font)
    }

    pub fn beep(&mut self) -> Result<(), RuntimeError> {
        self.screen.beep();
        Ok(())
    }

    pub fn backspace(&mut self) -> Result<(), RuntimeError> {
        self.screen.backspace();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.selected_window = 0;
        self.buffered = true;
        self.screen.reset();
    }

    pub fn quit(&mut self) {
        self.screen.quit();
    }

    pub fn finished(&mut self, message: Option<String>) {
        self.screen.on_finished(message);
    }
}

struct InputState {
    keys: VecDeque<u16>,
    interrupted: bool,
}

/// Keystroke channel between the host and the interpreter thread.
///
/// The host pushes keys in; blocked reads on the interpreter thread
/// wake when a key arrives or when the queue is interrupted.
pub struct InputQueue {
    state: Mutex<InputState>,
    ready: Condvar,
}

impl Default for InputQueue {
    fn default() -> Self {
        InputQueue::new()
    }
}

impl InputQueue {
    pub fn new() -> InputQueue {
        InputQueue {
            state: Mutex::new(InputState {
                keys: VecDeque::new(),
                interrupted: false,
            }),
            ready: Condvar::new(),
        }
    }

    pub fn push_key(&self, key: u16) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.keys.push_back(key);
        self.ready.notify_all();
    }

    /// Puts keys back at the front of the queue, preserving their
    /// order.  Used when an interrupted READ returns its partial input.
    pub fn restore(&self, keys: &[u16]) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for key in keys.iter().rev() {
            state.keys.push_front(*key);
        }
        self.ready.notify_all();
    }

    /// Blocks until a key is available.
    ///
    /// An interrupt takes priority over queued keys and surfaces as a
    /// recoverable [ErrorCode::Interrupted] error.
    pub fn next_key(&self) -> Result<u16, RuntimeError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if state.interrupted {
                return recoverable_error!(ErrorCode::Interrupted, "Input interrupted");
            }

            if let Some(key) = state.keys.pop_front() {
                return Ok(key);
            }

            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn interrupt(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.interrupted = true;
        self.ready.notify_all();
    }

    pub fn clear_interrupt(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.interrupted = false;
    }
}

struct PromptState {
    request: Option<String>,
    reply: Option<String>,
    interrupted: bool,
}

/// Filename rendezvous between the interpreter thread and the host.
///
/// SAVE and RESTORE need a filename from the host.  The interpreter
/// thread posts a request with a suggested default and blocks until the
/// host replies or the request is interrupted.  A reply posted before
/// the request is consumed by the next request without blocking.
pub struct NamePrompt {
    state: Mutex<PromptState>,
    ready: Condvar,
}

impl Default for NamePrompt {
    fn default() -> Self {
        NamePrompt::new()
    }
}

impl NamePrompt {
    pub fn new() -> NamePrompt {
        NamePrompt {
            state: Mutex::new(PromptState {
                request: None,
                reply: None,
                interrupted: false,
            }),
            ready: Condvar::new(),
        }
    }

    pub fn request(&self, default_name: &str) -> Result<String, RuntimeError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(reply) = state.reply.take() {
            return Ok(reply);
        }

        state.request = Some(default_name.to_string());
        self.ready.notify_all();
        loop {
            if state.interrupted {
                state.request = None;
                return recoverable_error!(ErrorCode::Interrupted, "Filename prompt interrupted");
            }

            if let Some(reply) = state.reply.take() {
                state.request = None;
                return Ok(reply);
            }

            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Suggested filename of the outstanding request, if any.
    pub fn pending(&self) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.request.clone()
    }

    pub fn reply(&self, name: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.reply = Some(name.to_string());
        self.ready.notify_all();
    }

    pub fn interrupt(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.interrupted = true;
        self.ready.notify_all();
    }

    pub fn clear_interrupt(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.interrupted = false;
    }
}
