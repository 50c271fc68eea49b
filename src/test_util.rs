use std::cell::RefCell;
use std::sync::Arc;

use crate::{
    error::RuntimeError,
    instruction::{
        Branch, Instruction, Opcode, OpcodeForm, Operand, OperandCount, OperandType, StoreResult,
    },
    zmachine::{
        io::{InputQueue, NamePrompt, Screen},
        state::{memory::Memory, State},
        ZMachine,
    },
};

pub use crate::{assert_ok, assert_ok_eq, assert_print, assert_some, assert_some_eq};

thread_local! {
    pub static PRINT: RefCell<String> = RefCell::new(String::new());
    pub static INPUT: RefCell<Option<Arc<InputQueue>>> = RefCell::new(None);
    pub static PENDING_INPUT: RefCell<Vec<char>> = RefCell::new(Vec::new());
    pub static PROMPT: RefCell<Option<Arc<NamePrompt>>> = RefCell::new(None);
    pub static PENDING_REPLY: RefCell<Option<String>> = RefCell::new(None);
    pub static COLORS: RefCell<(u8, u8)> = RefCell::new((0, 0));
    pub static SPLIT: RefCell<u8> = RefCell::new(0);
    pub static WINDOW: RefCell<u8> = RefCell::new(0);
    pub static ERASE_WINDOW: RefCell<Vec<i8>> = RefCell::new(Vec::new());
    pub static ERASE_LINE: RefCell<bool> = RefCell::new(false);
    pub static STYLE: RefCell<u8> = RefCell::new(0);
    pub static BUFFER: RefCell<u16> = RefCell::new(0);
    pub static STREAM: RefCell<(u8, Option<usize>)> = RefCell::new((0, None));
    pub static BEEP: RefCell<bool> = RefCell::new(false);
    pub static CURSOR: RefCell<(u16, u16)> = RefCell::new((1, 1));
    pub static FONT: RefCell<u16> = RefCell::new(1);
    pub static BACKSPACE: RefCell<bool> = RefCell::new(false);
    pub static RESET: RefCell<bool> = RefCell::new(false);
    pub static QUIT: RefCell<bool> = RefCell::new(false);
    pub static FINISHED: RefCell<Option<Option<String>>> = RefCell::new(None);
}

fn print_char(c: char) {
    PRINT.with_borrow_mut(|p| p.push(c));
}

pub fn print() -> String {
    PRINT.with_borrow(|p| p.clone())
}

/// Feeds key codes to the machine under test.
pub fn input(keys: &[char]) {
    INPUT.with_borrow(|q| match q {
        Some(queue) => {
            for c in keys {
                queue.push_key(*c as u16);
            }
        }
        None => PENDING_INPUT.with_borrow_mut(|p| p.extend_from_slice(keys)),
    });
}

/// Answers (or preloads the answer to) a save/restore filename prompt.
pub fn reply_file_name(name: &str) {
    PROMPT.with_borrow(|p| match p {
        Some(prompt) => prompt.reply(name),
        None => PENDING_REPLY.set(Some(name.to_string())),
    });
}

pub fn colors() -> (u8, u8) {
    COLORS.with_borrow(|v| *v)
}

pub fn split() -> u8 {
    SPLIT.with_borrow(|v| *v)
}

pub fn window() -> u8 {
    WINDOW.with_borrow(|v| *v)
}

pub fn erase_window() -> Vec<i8> {
    ERASE_WINDOW.with_borrow(|v| v.clone())
}

pub fn erase_line() -> bool {
    ERASE_LINE.with_borrow(|v| *v)
}

pub fn style() -> u8 {
    STYLE.with_borrow(|v| *v)
}

pub fn buffer_mode() -> u16 {
    BUFFER.with_borrow(|v| *v)
}

pub fn output_stream() -> (u8, Option<usize>) {
    STREAM.with_borrow(|v| *v)
}

pub fn beep() -> bool {
    BEEP.with_borrow(|v| *v)
}

pub fn cursor() -> (u16, u16) {
    CURSOR.with_borrow(|v| *v)
}

pub fn backspace() -> bool {
    BACKSPACE.with_borrow(|v| *v)
}

pub fn reset() -> bool {
    RESET.with_borrow(|v| *v)
}

pub fn quit() -> bool {
    QUIT.with_borrow(|v| *v)
}

pub fn finished() -> Option<Option<String>> {
    FINISHED.with_borrow(|v| v.clone())
}

/// Screen double that records every advisory call in thread-local
/// cells the test can assert against.
struct TestScreen;

impl Screen for TestScreen {
    fn rows(&self) -> u16 {
        24
    }

    fn columns(&self) -> u16 {
        80
    }

    fn default_colors(&self) -> (u8, u8) {
        (9, 2)
    }

    fn print(&mut self, text: &[u16]) {
        for c in text {
            print_char(char::from_u32(*c as u32).unwrap_or(' '));
        }
    }

    fn status_line(&mut self, text: &[u16]) {
        for c in text {
            print_char(char::from_u32(*c as u32).unwrap_or(' '));
        }
    }

    fn new_line(&mut self) {
        print_char('\n');
    }

    fn backspace(&mut self) {
        BACKSPACE.set(true);
        PRINT.with_borrow_mut(|p| {
            p.pop();
        });
    }

    fn split_window(&mut self, lines: u16) {
        SPLIT.set(lines as u8);
    }

    fn set_window(&mut self, window: u16) {
        WINDOW.set(window as u8);
    }

    fn erase_window(&mut self, window: i16) {
        ERASE_WINDOW.with_borrow_mut(|w| w.push(window as i8));
    }

    fn erase_line(&mut self) {
        ERASE_LINE.set(true);
    }

    fn cursor(&self) -> (u16, u16) {
        CURSOR.with_borrow(|v| *v)
    }

    fn set_cursor(&mut self, row: u16, column: u16) {
        CURSOR.set((row, column));
    }

    fn set_style(&mut self, style: u16) {
        STYLE.set(style as u8);
    }

    fn buffer_mode(&mut self, mode: u16) {
        BUFFER.set(mode);
    }

    fn set_colors(&mut self, foreground: u16, background: u16) {
        COLORS.set((foreground as u8, background as u8));
    }

    fn set_font(&mut self, font: u16) -> u16 {
        FONT.replace(font)
    }

    fn output_stream(&mut self, mask: u8, table: Option<usize>) {
        STREAM.set((mask, table));
    }

    fn beep(&mut self) {
        BEEP.set(true);
    }

    fn reset(&mut self) {
        RESET.set(true);
    }

    fn quit(&mut self) {
        QUIT.set(true);
    }

    fn on_finished(&mut self, message: Option<String>) {
        FINISHED.set(Some(message));
    }
}

pub fn test_screen() -> Box<dyn Screen> {
    Box::new(TestScreen {})
}

pub fn put_word(map: &mut [u8], address: usize, value: u16) {
    map[address] = (value >> 8) as u8;
    map[address + 1] = value as u8;
}

pub fn test_map(version: u8) -> Vec<u8> {
    let mut v = vec![0; 0x800];
    v[0] = version;
    // Initial PC at $0400
    v[6] = 0x4;
    // Object table at $0200
    v[0x0A] = 0x02;
    // Global variables at $0100
    v[0x0C] = 0x01;
    // Static mark at $0400
    v[0x0E] = 0x04;

    v
}

pub fn set_variable(map: &mut [u8], variable: u8, value: u16) {
    put_word(map, 0x100 + ((variable as usize - 16) * 2), value);
}

pub fn test_state(version: u8) -> State {
    mock_state(test_map(version))
}

pub fn mock_zmachine(map: Vec<u8>) -> ZMachine {
    let m = Memory::new(map);
    assert!(m.is_ok());
    let input = Arc::new(InputQueue::new());
    let prompt = Arc::new(NamePrompt::new());
    PENDING_INPUT.with_borrow_mut(|p| {
        for c in p.drain(..) {
            input.push_key(c as u16);
        }
    });
    if let Some(name) = PENDING_REPLY.take() {
        prompt.reply(&name);
    }
    INPUT.set(Some(input.clone()));
    PROMPT.set(Some(prompt.clone()));

    let z = ZMachine::new(m.unwrap(), test_screen(), input, prompt, "test");
    assert!(z.is_ok());
    z.unwrap()
}

pub fn mock_state(map: Vec<u8>) -> State {
    let m = Memory::new(map);
    assert!(m.is_ok());
    let s = State::new(m.unwrap());
    assert!(s.is_ok());
    let mut state = s.unwrap();
    // Stamp the header and push the initial frame, as loading would
    assert!(state.initialize(24, 80, (9, 2)).is_ok());
    state
}

pub fn operand(operand_type: OperandType, value: u16) -> Operand {
    Operand::new(operand_type, value)
}

pub fn branch(byte_address: usize, condition: bool, branch_address: usize) -> Branch {
    Branch::new(byte_address, condition, branch_address)
}

pub fn store(byte_address: usize, variable: u8) -> StoreResult {
    StoreResult::new(byte_address, variable)
}

pub fn mock_instruction(
    addr: usize,
    ops: Vec<Operand>,
    opcode: Opcode,
    next: usize,
) -> Instruction {
    Instruction::new(addr, opcode, ops, None, None, next)
}

pub fn mock_branch_instruction(
    addr: usize,
    ops: Vec<Operand>,
    opcode: Opcode,
    next: usize,
    branch: Branch,
) -> Instruction {
    Instruction::new(addr, opcode, ops, None, Some(branch), next)
}

pub fn mock_store_instruction(
    addr: usize,
    ops: Vec<Operand>,
    opcode: Opcode,
    next: usize,
    result: StoreResult,
) -> Instruction {
    Instruction::new(addr, opcode, ops, Some(result), None, next)
}

pub fn mock_branch_store_instruction(
    addr: usize,
    ops: Vec<Operand>,
    opcode: Opcode,
    next: usize,
    branch: Branch,
    result: StoreResult,
) -> Instruction {
    Instruction::new(addr, opcode, ops, Some(result), Some(branch), next)
}

pub fn mock_branch(condition: bool, branch_address: usize, next: usize) -> Instruction {
    let opcode = Opcode::new(
        crate::zmachine::state::memory::Version::V5,
        1,
        1,
        OpcodeForm::Var,
        OperandCount::_VAR,
    );
    Instruction::new(
        0,
        opcode,
        vec![],
        None,
        Some(Branch::new(0, condition, branch_address)),
        next,
    )
}

pub fn mock_frame(vm: &mut ZMachine, address: usize, result: Option<u8>, return_address: usize) {
    let r = result.map(|x| StoreResult::new(0, x));
    assert!(vm.call_routine(address, &[], r, return_address).is_ok());
}

pub fn mock_routine(map: &mut [u8], address: usize, locals: &[u16]) {
    map[address] = locals.len() as u8;
    // Initial local values are only part of the header before V5
    if map[0] < 5 {
        for (i, w) in locals.iter().enumerate() {
            put_word(map, address + 1 + (i * 2), *w);
        }
    }
}

fn put_dictionary_words(map: &mut [u8], address: usize, entry_size: usize, entries: &[&[u16]]) {
    for (i, entry) in entries.iter().enumerate() {
        for (j, w) in entry.iter().enumerate() {
            put_word(map, address + (i * entry_size) + (j * 2), *w);
        }
    }
}

/// Sorted dictionary at 0x300 with 4 words: hello, inventory, look,
/// sailor. Also reserves a text buffer at 0x380 and a parse buffer at
/// 0x3A0.
pub fn mock_dictionary(map: &mut [u8]) {
    map[0x08] = 0x03;
    map[0x300] = 3;
    map[0x301] = b'.';
    map[0x302] = b',';
    map[0x303] = b'"';
    // 4 entries of 9 bytes
    map[0x304] = 0x9;
    map[0x306] = 4;

    if map[0] == 3 {
        // Text buffer holds up to 10 characters, parse buffer 2 entries
        map[0x380] = 11;
        map[0x3A0] = 2;
        put_dictionary_words(
            map,
            0x307,
            9,
            &[
                &[0x3551, 0xC685],
                &[0x3A7B, 0xAA79],
                &[0x4694, 0xC0A5],
                &[0x60CE, 0xC697],
            ],
        );
    } else {
        map[0x380] = 10;
        map[0x3A0] = 2;
        put_dictionary_words(
            map,
            0x307,
            9,
            &[
                &[0x3551, 0x4685, 0x94A5],
                &[0x3A7B, 0x2A79, 0xD2FE],
                &[0x4694, 0x40A5, 0x94A5],
                &[0x60CE, 0x4697, 0x94A5],
            ],
        );
    }
}

/// Unsorted dictionary with 3 words: xyzzy, plover, moon.
pub fn mock_custom_dictionary(map: &mut [u8], address: usize) {
    map[address] = 3;
    map[address + 1] = b'.';
    map[address + 2] = b',';
    map[address + 3] = b'"';
    // 3 entries of 9 bytes, count negated to mark the table unsorted
    map[address + 4] = 0x9;
    put_word(map, address + 5, 0xFFFD);

    put_dictionary_words(
        map,
        address + 7,
        9,
        &[
            &[0x77DF, 0x7FC5, 0x94A5],
            &[0x5634, 0x6D57, 0x94A5],
            &[0x4A94, 0x4CA5, 0x94A5],
        ],
    );
}

fn object_entry_address(map: &[u8], object: usize) -> usize {
    let table = ((map[0x0a] as usize) << 8) + map[0x0b] as usize;
    match map[0] {
        3 => table + 62 + ((object - 1) * 9),
        _ => table + 126 + ((object - 1) * 14),
    }
}

pub fn mock_object(
    map: &mut [u8],
    object: usize,
    short_name: Vec<u16>,
    (parent, sibling, child): (u16, u16, u16),
) {
    let address = object_entry_address(map, object);
    // Property tables are packed at 0x300
    let property_table = 0x300 + ((object - 1) * 20);
    if map[0] == 3 {
        map[address + 4] = parent as u8;
        map[address + 5] = sibling as u8;
        map[address + 6] = child as u8;
        put_word(map, address + 7, property_table as u16);
    } else {
        put_word(map, address + 6, parent);
        put_word(map, address + 8, sibling);
        put_word(map, address + 10, child);
        put_word(map, address + 12, property_table as u16);
    }

    map[property_table] = short_name.len() as u8;
    for (i, w) in short_name.iter().enumerate() {
        put_word(map, property_table + 1 + (i * 2), *w);
    }
}

pub fn mock_attributes(map: &mut [u8], object: usize, attributes: &[u8]) {
    let address = object_entry_address(map, object);
    map[address..address + attributes.len()].copy_from_slice(attributes);
}

pub fn mock_default_properties(map: &mut [u8]) {
    let words = if map[0] == 3 { 31 } else { 63 };
    let table = ((map[0x0a] as usize) << 8) + map[0x0b] as usize;
    for i in 0..words as u16 {
        put_word(map, table + (i as usize * 2), ((i % 0x10) << 8) | i);
    }
}

pub fn mock_properties(map: &mut [u8], object: usize, properties: &[(u8, &Vec<u8>)]) {
    let property_table = 0x300 + ((object - 1) * 20);
    let name_words = map[property_table] as usize;

    let mut address = property_table + 1 + (name_words * 2);
    for (number, data) in properties {
        // Entry header, then the data bytes
        address = match (map[0], data.len()) {
            (3, n) => {
                map[address] = ((n - 1) * 32) as u8 + *number;
                address + 1
            }
            (_, 1) => {
                map[address] = *number;
                address + 1
            }
            (_, 2) => {
                map[address] = 0x40 | *number;
                address + 1
            }
            (_, n) => {
                map[address] = 0x80 | *number;
                map[address + 1] = 0x80 | (n as u8 & 0x3F);
                address + 2
            }
        };
        map[address..address + data.len()].copy_from_slice(data);
        address += data.len();
    }
}

pub fn assert_ok<T>(result: Result<T, RuntimeError>) -> T {
    assert!(result.is_ok());
    result.unwrap()
}

pub fn assert_some<T>(option: Option<T>) -> T {
    assert!(option.is_some());
    option.unwrap()
}

#[macro_export]
macro_rules! assert_ok {
    ($expression:expr) => {{
        let result = $expression;
        assert!(result.is_ok(), "unexpected error: {:?}", result.err());
        result.unwrap()
    }};
}

#[macro_export]
macro_rules! assert_ok_eq {
    ($expression:expr, $value:expr $(,)?) => {{
        let result = $expression;
        assert!(result.is_ok(), "unexpected error: {:?}", result.err());
        assert_eq!(result.unwrap(), $value);
    }};
}

#[macro_export]
macro_rules! assert_some {
    ($expression:expr) => {{
        let option = $expression;
        assert!(option.is_some());
        option.unwrap()
    }};
}

#[macro_export]
macro_rules! assert_some_eq {
    ($expression:expr, $value:expr $(,)?) => {{
        let option = $expression;
        assert!(option.is_some());
        assert_eq!(option.unwrap(), $value);
    }};
}

#[macro_export]
macro_rules! assert_print {
    ($string:expr $(,)?) => {
        assert_eq!($crate::test_util::print(), $string)
    };
}
