use crate::error::RuntimeError;

use super::State;

/// Fixed header field offsets.  Fields are always read from the live
/// memory image, never cached.
pub enum HeaderField {
    Version = 0x00,
    Flags1 = 0x01,
    Release = 0x02,
    HighMark = 0x04,
    InitialPC = 0x06,
    Dictionary = 0x08,
    ObjectTable = 0x0A,
    GlobalTable = 0x0C,
    StaticMark = 0x0E,
    Flags2 = 0x10,
    Serial = 0x12,
    AbbreviationsTable = 0x18,
    FileLength = 0x1A,
    Checksum = 0x1C,
    InterpreterNumber = 0x1E,
    InterpreterVersion = 0x1F,
    ScreenLines = 0x20,
    ScreenColumns = 0x21,
    ScreenWidth = 0x22,
    ScreenHeight = 0x24,
    DefaultBackground = 0x2C,
    DefaultForeground = 0x2D,
    TerminatorTable = 0x2E,
    Revision = 0x32,
}

/// Flags 1 masks in V3
pub enum Flags1v3 {
    /// Bit 1: score/turns (clear) or hours:minutes (set)
    StatusLineType = 0x02,
    /// Bit 4
    StatusLineNotAvailable = 0x10,
    /// Bit 5
    ScreenSplitAvailable = 0x20,
    /// Bit 6
    VariablePitchDefault = 0x40,
}

/// Flags 1 masks in V4 and later
pub enum Flags1v5 {
    /// Bit 0
    ColoursAvailable = 0x01,
    /// Bit 2
    BoldfaceAvailable = 0x04,
    /// Bit 3
    ItalicAvailable = 0x08,
    /// Bit 4
    FixedSpaceAvailable = 0x10,
    /// Bit 7
    TimedInputAvailable = 0x80,
}

/// Flags 2 masks
#[derive(Debug)]
pub enum Flags2 {
    /// Bit 0
    Transcripting = 0x0001,
    /// Bit 1
    ForceFixedPitch = 0x0002,
    /// Bit 4
    RequestUndo = 0x0010,
    /// Bit 6
    RequestColours = 0x0040,
}

pub fn field_byte(state: &State, field: HeaderField) -> Result<u8, RuntimeError> {
    state.read_byte(field as usize)
}

pub fn field_word(state: &State, field: HeaderField) -> Result<u16, RuntimeError> {
    state.read_word(field as usize)
}

pub fn set_byte(state: &mut State, field: HeaderField, value: u8) -> Result<(), RuntimeError> {
    state.write_byte(field as usize, value)
}

pub fn set_word(state: &mut State, field: HeaderField, value: u16) -> Result<(), RuntimeError> {
    state.write_word(field as usize, value)
}

pub fn flag1(state: &State, flag: u8) -> Result<u8, RuntimeError> {
    Ok(u8::from(field_byte(state, HeaderField::Flags1)? & flag != 0))
}

pub fn flag2(state: &State, flag: Flags2) -> Result<u8, RuntimeError> {
    Ok(u8::from(field_word(state, HeaderField::Flags2)? & flag as u16 != 0))
}

pub fn set_flag1(state: &mut State, flag: u8) -> Result<(), RuntimeError> {
    let old = field_byte(state, HeaderField::Flags1)?;
    debug!(target: "app::header", "Set FLAG1 {:08b}: {:08b} => {:08b}", flag, old, old | flag);
    set_byte(state, HeaderField::Flags1, old | flag)
}

pub fn clear_flag1(state: &mut State, flag: u8) -> Result<(), RuntimeError> {
    let old = field_byte(state, HeaderField::Flags1)?;
    debug!(target: "app::header", "Clear FLAG1 {:08b}: {:08b} => {:08b}", flag, old, old & !flag);
    set_byte(state, HeaderField::Flags1, old & !flag)
}

// Flags 2 writes bypass the State hook so the transcript bit can be
// stamped without opening stream 2.
pub fn set_flag2(state: &mut State, flag: Flags2) -> Result<(), RuntimeError> {
    let old = field_word(state, HeaderField::Flags2)?;
    let mask = flag as u16;
    debug!(target: "app::header", "Set FLAG2 {:010b}: {:010b} => {:010b}", mask, old, old | mask);
    state.memory_mut().write_word(HeaderField::Flags2 as usize, old | mask)
}

pub fn clear_flag2(state: &mut State, flag: Flags2) -> Result<(), RuntimeError> {
    let old = field_word(state, HeaderField::Flags2)?;
    let mask = flag as u16;
    debug!(target: "app::header", "Clear FLAG2 {:010b}: {:010b} => {:010b}", mask, old, old & !mask);
    state.memory_mut().write_word(HeaderField::Flags2 as usize, old & !mask)
}
