//! Minimal terminal runner: reads a story file, wires stdin/stdout to the
//! interpreter and runs it to completion.
#[macro_use]
extern crate log;

use std::env;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::panic;
use std::process::exit;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use zplet::config::Config;
use zplet::files;
use zplet::interpreter::{Interpreter, RunState};
use zplet::zmachine::io::Screen;

struct StdioScreen {
    foreground: u8,
    background: u8,
}

impl StdioScreen {
    fn write_str(&self, s: &str) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(s.as_bytes());
        let _ = stdout.flush();
    }
}

impl Screen for StdioScreen {
    fn rows(&self) -> u16 {
        24
    }

    fn columns(&self) -> u16 {
        80
    }

    fn default_colors(&self) -> (u8, u8) {
        (self.foreground, self.background)
    }

    fn print(&mut self, text: &[u16]) {
        let s: String = text
            .iter()
            .map(|c| char::from_u32(*c as u32).unwrap_or(' '))
            .collect();
        self.write_str(&s);
    }

    fn status_line(&mut self, text: &[u16]) {
        let s: String = text
            .iter()
            .map(|c| char::from_u32(*c as u32).unwrap_or(' '))
            .collect();
        self.write_str(&format!("[{}]\n", s.trim_end()));
    }

    fn new_line(&mut self) {
        self.write_str("\n");
    }

    fn backspace(&mut self) {
        self.write_str("\x08 \x08");
    }

    // Window control is advisory on a dumb terminal
    fn split_window(&mut self, _lines: u16) {}

    fn set_window(&mut self, _window: u16) {}

    fn erase_window(&mut self, _window: i16) {}

    fn erase_line(&mut self) {}

    fn cursor(&self) -> (u16, u16) {
        (24, 1)
    }

    fn set_cursor(&mut self, _row: u16, _column: u16) {}

    fn set_style(&mut self, _style: u16) {}

    fn buffer_mode(&mut self, _mode: u16) {}

    fn set_colors(&mut self, _foreground: u16, _background: u16) {}

    fn set_font(&mut self, _font: u16) -> u16 {
        1
    }

    fn output_stream(&mut self, _mask: u8, _table: Option<usize>) {}

    fn beep(&mut self) {
        self.write_str("\x07");
    }

    fn reset(&mut self) {}

    fn quit(&mut self) {}

    fn on_finished(&mut self, message: Option<String>) {
        if let Some(message) = message {
            self.write_str(&format!("\n{}\n", message));
        }
    }
}

fn initialize_config() -> Config {
    if let Some(filename) = files::config_file("config.yml") {
        match File::open(&filename) {
            Ok(f) => match Config::try_from(f) {
                Ok(config) => config,
                Err(e) => {
                    info!(target: "app::trace", "Error parsing configuration from {}: {}", filename, e);
                    Config::default()
                }
            },
            Err(e) => {
                info!(target: "app::trace", "Error reading configuration from {}: {}", filename, e);
                Config::default()
            }
        }
    } else {
        Config::default()
    }
}

/// Maps a terminal byte to a Z-machine input code.
fn input_code(byte: u8) -> Option<u16> {
    match byte {
        b'\n' | b'\r' => Some(0x0d),
        0x08 | 0x7f => Some(0x08),
        0x20..=0x7e => Some(byte as u16),
        _ => None,
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: zplet story-file");
        exit(-1);
    }

    let filename = &args[1];
    let name = filename
        .split('/')
        .last()
        .and_then(|x| x.split('.').next())
        .unwrap_or("story")
        .to_string();

    let config = initialize_config();
    if config.logging() {
        if let Some(filename) = files::config_file("log4rs.yml") {
            if log4rs::init_file(filename, Default::default()).is_ok() {
                log_mdc::insert("instruction_count", format!("{:8x}", 0));
            }

            info!(target: "app::instruction", "Start instruction log for '{}'", name);
            info!(target: "app::state", "Start state log for '{}'", name);
        }

        let prev = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            error!(target: "app::trace", "{}", &info);
            prev(info);
        }));
    }

    let story = match fs::read(filename) {
        Ok(story) => story,
        Err(e) => {
            eprintln!("Error reading '{}': {}", filename, e);
            exit(-1);
        }
    };

    let screen = Box::new(StdioScreen {
        foreground: config.foreground(),
        background: config.background(),
    });

    let mut interpreter = match Interpreter::load(story, screen, &name) {
        Ok(interpreter) => interpreter,
        Err(e) => {
            eprintln!("Error loading '{}': {}", filename, e);
            exit(-1);
        }
    };

    if !interpreter.start() {
        eprintln!("Error starting '{}'", filename);
        exit(-1);
    }

    // Feed stdin bytes through a channel so the main loop can also watch
    // for lifecycle changes and filename prompts
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut stdin = io::stdin();
        let mut byte = [0; 1];
        while let Ok(1) = stdin.read(&mut byte) {
            if tx.send(byte[0]).is_err() {
                break;
            }
        }
    });

    let mut prompt_line = String::new();
    let mut announced: Option<String> = None;
    loop {
        if interpreter.state() == RunState::Finished {
            break;
        }

        let pending_prompt = interpreter.file_name_request();
        match &pending_prompt {
            Some(default_name) => {
                if announced.as_deref() != Some(default_name.as_str()) {
                    print!("File name ({}): ", default_name);
                    let _ = io::stdout().flush();
                    announced = Some(default_name.clone());
                }
            }
            None => announced = None,
        }
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(byte) => {
                if let Some(default_name) = pending_prompt {
                    if byte == b'\n' || byte == b'\r' {
                        let reply = if prompt_line.trim().is_empty() {
                            default_name
                        } else {
                            prompt_line.trim().to_string()
                        };
                        interpreter.reply_file_name(&reply);
                        prompt_line.clear();
                    } else {
                        prompt_line.push(byte as char);
                    }
                } else if let Some(code) = input_code(byte) {
                    interpreter.input(code);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                interpreter.abort();
                break;
            }
        }
    }

    interpreter.join();
}
