//! [ZSCII](https://inform-fiction.org/vm/standards/z1point1/sect03.html) text
//! decoding, encoding, and lexical analysis.
use std::cmp::Ordering;

use crate::error::{ErrorCode, RuntimeError};
use crate::fatal_error;
use crate::zmachine::state::header::HeaderField;
use crate::zmachine::state::memory::Version;
use crate::zmachine::ZMachine;

// V3+ alphabets: lowercase, uppercase, punctuation
const ALPHABETS: [&[u8; 26]; 3] = [
    b"abcdefghijklmnopqrstuvwxyz",
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    b" \r0123456789.,!?_#'\"/\\-:()",
];

fn abbreviation(vm: &ZMachine, table: u8, index: u8) -> Result<Vec<u16>, RuntimeError> {
    let tables = vm.header_word(HeaderField::AbbreviationsTable)? as usize;
    let entry = (64 * (table as usize - 1)) + (index as usize * 2);
    let address = vm.read_word(tables + entry)? as usize;
    decode(vm, &vm.string_literal(address * 2)?, true)
}

/// Read ztext from an address and decode it to a string.
pub fn as_text(vm: &ZMachine, address: usize) -> Result<Vec<u16>, RuntimeError> {
    from_vec(vm, &vm.string_literal(address)?)
}

/// Decode a vector of ztext words to a string.
pub fn from_vec(vm: &ZMachine, ztext: &[u16]) -> Result<Vec<u16>, RuntimeError> {
    decode(vm, ztext, false)
}

enum DecodeState {
    Alphabet,
    Abbreviation(u8),
    ZsciiHigh,
    ZsciiLow(u8),
}

fn decode(vm: &ZMachine, ztext: &[u16], is_abbreviation: bool) -> Result<Vec<u16>, RuntimeError> {
    let mut s = Vec::new();
    let mut shift = 0;
    let mut state = DecodeState::Alphabet;

    for w in ztext {
        for b in [(w >> 10) as u8 & 0x1F, (w >> 5) as u8 & 0x1F, (w & 0x1F) as u8] {
            state = match state {
                DecodeState::Abbreviation(table) => {
                    s.append(&mut abbreviation(vm, table, b)?);
                    DecodeState::Alphabet
                }
                DecodeState::ZsciiHigh => DecodeState::ZsciiLow(b),
                DecodeState::ZsciiLow(high) => {
                    s.push(((high as u16) << 5 & 0x3E0) | b as u16);
                    DecodeState::Alphabet
                }
                DecodeState::Alphabet => match b {
                    0 => {
                        s.push(0x20);
                        DecodeState::Alphabet
                    }
                    1..=3 => {
                        // Abbreviations may not contain abbreviations
                        if is_abbreviation {
                            return fatal_error!(
                                ErrorCode::InvalidAbbreviation,
                                "Abbreviations can't nest"
                            );
                        }
                        DecodeState::Abbreviation(b)
                    }
                    4 | 5 => {
                        shift = b as usize - 3;
                        DecodeState::Alphabet
                    }
                    // 6 in A2 starts a 10-bit ZSCII escape
                    6 if shift == 2 => DecodeState::ZsciiHigh,
                    _ => {
                        s.push(ALPHABETS[shift][b as usize - 6] as u16);
                        DecodeState::Alphabet
                    }
                },
            };
            // Shifts apply to the next character only
            if b != 4 && b != 5 {
                shift = 0;
            }
        }
    }

    Ok(s)
}

fn separators(vm: &ZMachine, dictionary: usize) -> Result<Vec<char>, RuntimeError> {
    let count = vm.read_byte(dictionary)? as usize;
    (1..=count)
        .map(|i| Ok(vm.read_byte(dictionary + i)? as char))
        .collect()
}

/// The ztext encoding of a character, including any alphabet shift.
/// Characters outside the alphabets become a 10-bit ZSCII escape.
fn find_char(zchar: u16) -> Vec<u16> {
    let c = zchar as u8;
    if c == b' ' {
        return vec![0];
    }

    for (shift, alphabet) in ALPHABETS.iter().enumerate() {
        if let Some(i) = alphabet.iter().position(|&a| a == c) {
            return match shift {
                0 => vec![i as u16 + 6],
                _ => vec![shift as u16 + 3, i as u16 + 6],
            };
        }
    }

    vec![5, 6, (c >> 5) as u16 & 0x1f, (c & 0x1f) as u16]
}

// Three 5-bit characters to a word: 01111122 22233333
fn pack_word(z1: u16, z2: u16, z3: u16) -> u16 {
    ((z1 & 0x1F) << 10) | ((z2 & 0x1F) << 5) | z3 & 0x1F
}

/// Encode a word into ztext, 2 words (6 characters) for V3 and 3 words
/// (9 characters) for V5+, truncating or padding as needed.
pub fn encode_text(word: &[u16], words: usize) -> Vec<u16> {
    let mut zchars: Vec<u16> = word
        .iter()
        .take(words * 3)
        .flat_map(|&c| find_char(c))
        .collect();
    zchars.resize(words * 3, 5);

    let mut zwords: Vec<u16> = zchars
        .chunks(3)
        .map(|c| pack_word(c[0], c[1], c[2]))
        .collect();
    // Bit 15 marks the final word
    if let Some(w) = zwords.last_mut() {
        *w |= 0x8000;
    }

    zwords
}

fn compare_entry(vm: &ZMachine, address: usize, word: &[u16]) -> Result<Ordering, RuntimeError> {
    for (i, w) in word.iter().enumerate() {
        match vm.read_word(address + (i * 2))?.cmp(w) {
            Ordering::Equal => {}
            o => return Ok(o),
        }
    }

    Ok(Ordering::Equal)
}

/// Binary search of a sorted dictionary, returning the address of the
/// matching entry or 0.
fn search_entry(
    vm: &ZMachine,
    address: usize,
    entry_count: usize,
    entry_size: usize,
    word: &[u16],
) -> Result<usize, RuntimeError> {
    let mut min = 0;
    let mut max = entry_count;
    while min < max {
        let pivot = min + ((max - min) / 2);
        let addr = address + (pivot * entry_size);
        match compare_entry(vm, addr, word)? {
            Ordering::Equal => return Ok(addr),
            Ordering::Less => min = pivot + 1,
            Ordering::Greater => max = pivot,
        }
    }

    Ok(0)
}

/// Linear scan of an unsorted dictionary, returning the address of the
/// matching entry or 0.
fn scan_entry(
    vm: &ZMachine,
    address: usize,
    entry_count: usize,
    entry_size: usize,
    word: &[u16],
) -> Result<usize, RuntimeError> {
    for i in 0..entry_count {
        let addr = address + (i * entry_size);
        if compare_entry(vm, addr, word)? == Ordering::Equal {
            return Ok(addr);
        }
    }

    Ok(0)
}

/// Find the address of the dictionary entry for a word, if any.
fn from_dictionary(
    vm: &ZMachine,
    dictionary_address: usize,
    word: &[char],
) -> Result<usize, RuntimeError> {
    let separator_count = vm.read_byte(dictionary_address)? as usize;
    let entry_size = vm.read_byte(dictionary_address + separator_count + 1)? as usize;
    let entry_count = vm.read_word(dictionary_address + separator_count + 2)? as i16;
    let entry_words = if vm.version() == Version::V3 { 2 } else { 3 };
    debug!(target: "app::text", "Lexical analysis: dictionary @ {:04x}, {} entries of {} bytes", dictionary_address, entry_count, entry_size);

    let zchars: Vec<u16> = word.iter().map(|c| *c as u16).collect();
    let encoded = encode_text(&zchars, entry_words);
    let entries = dictionary_address + separator_count + 4;

    // A negative count marks an unsorted dictionary
    if entry_count > 0 {
        search_entry(vm, entries, entry_count as usize, entry_size, &encoded)
    } else {
        scan_entry(
            vm,
            entries,
            entry_count.unsigned_abs() as usize,
            entry_size,
            &encoded,
        )
    }
}

/// Look up a word and store the result in the parse buffer, returning the
/// updated parse index and stored entry count. When `flag` is set, only
/// empty entries for words found in the dictionary are written.
#[allow(clippy::too_many_arguments)]
fn find_word(
    vm: &mut ZMachine,
    dictionary: usize,
    parse_buffer: usize,
    flag: bool,
    index: usize,
    stored: usize,
    word_start: usize,
    word: &[char],
) -> Result<(usize, usize), RuntimeError> {
    let entry = from_dictionary(vm, dictionary, word)?;
    debug!(target: "app::text", "Lexical analysis: {:?} => {:04x}", word, entry);

    // Word positions are relative to the start of the text buffer
    let offset = if vm.version() == Version::V3 { 1 } else { 2 };
    let entry_address = parse_buffer + 2 + (4 * index);

    let skip = if flag {
        entry == 0 || vm.read_word(entry_address)? != 0
    } else {
        false
    };

    if skip {
        Ok((index + 1, stored))
    } else {
        vm.write_word(entry_address, entry as u16)?;
        vm.write_byte(entry_address + 2, word.len() as u8)?;
        vm.write_byte(entry_address + 3, (word_start + offset) as u8)?;
        Ok((index + 1, stored + 1))
    }
}

fn read_text_buffer(vm: &ZMachine, text_buffer: usize) -> Result<Vec<u8>, RuntimeError> {
    let mut data = Vec::new();
    if vm.version() == Version::V3 {
        // Input is 0 terminated
        let mut i = 1;
        loop {
            let b = vm.read_byte(text_buffer + i)?;
            if b == 0 {
                break;
            }
            data.push(b);
            i += 1;
        }
    } else {
        // The second byte holds the input length
        let n = vm.read_byte(text_buffer + 1)? as usize;
        for i in 0..n {
            data.push(vm.read_byte(text_buffer + 2 + i)?);
        }
    }

    Ok(data)
}

/// Parse a text buffer into a parse buffer.
///
/// When `flag` is set, parse buffer entries are not updated for words
/// that aren't found in the dictionary.
pub fn parse_text(
    vm: &mut ZMachine,
    text_buffer: usize,
    parse_buffer: usize,
    dictionary: usize,
    flag: bool,
) -> Result<(), RuntimeError> {
    if parse_buffer == 0 {
        return Ok(());
    }

    debug!(target: "app::text", "Lexical analysis: text @ {:04x}, parse @ {:04x}, dictionary @ {:04x}, skip {}", text_buffer, parse_buffer, dictionary, flag);
    let separators = separators(vm, dictionary)?;
    let data = read_text_buffer(vm, text_buffer)?;
    let max_words = vm.read_byte(parse_buffer)? as usize;

    let mut index = 0;
    let mut stored = 0;
    let mut word: Vec<char> = Vec::new();
    let mut word_start = 0;

    for (i, b) in data.iter().enumerate() {
        if index > max_words {
            break;
        }

        let c = (*b as char).to_ascii_lowercase();
        if c == ' ' || separators.contains(&c) {
            if !word.is_empty() {
                (index, stored) = find_word(
                    vm,
                    dictionary,
                    parse_buffer,
                    flag,
                    index,
                    stored,
                    word_start,
                    &word,
                )?;
            }
            // A separator is itself a word; a space is not
            if c != ' ' && index < max_words {
                (index, stored) = find_word(
                    vm,
                    dictionary,
                    parse_buffer,
                    flag,
                    index,
                    stored,
                    word_start + word.len(),
                    &[c],
                )?;
            }
            word.clear();
            word_start = i + 1;
        } else {
            word.push(c);
        }
    }

    // End of input, parse anything collected
    if !word.is_empty() && index < max_words {
        (_, stored) = find_word(
            vm,
            dictionary,
            parse_buffer,
            flag,
            index,
            stored,
            word_start,
            &word,
        )?;
    }

    // When flag is set, a previous pass already stored the entry count
    if !flag {
        vm.write_byte(parse_buffer + 1, stored as u8)?;
    }

    Ok(())
}
