use std::fmt;

use crate::{error::*, fatal_error, recoverable_error};

use super::header::HeaderField;

/// Machine profile, selected once from header byte 0 when the story is
/// loaded.  Carries the version-dependent constants the rest of the
/// interpreter needs instead of re-matching on a raw version byte.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Version {
    V3,
    V5,
    V8,
}

impl Version {
    /// Packed routine addresses scale by this factor
    pub fn routine_multiplier(&self) -> usize {
        match self {
            Version::V3 => 2,
            Version::V5 => 4,
            Version::V8 => 8,
        }
    }

    /// Packed string addresses scale identically in 3/5/8
    pub fn string_multiplier(&self) -> usize {
        self.routine_multiplier()
    }

    /// The header file length is stored divided by this factor
    pub fn file_length_multiplier(&self) -> usize {
        self.routine_multiplier()
    }

    /// Encoded dictionary words: 2 words (6 zchars) in v3, 3 words in v5+
    pub fn dictionary_word_count(&self) -> usize {
        match self {
            Version::V3 => 2,
            _ => 3,
        }
    }

    pub fn byte(&self) -> u8 {
        match self {
            Version::V3 => 3,
            Version::V5 => 5,
            Version::V8 => 8,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.byte())
    }
}

impl TryFrom<u8> for Version {
    type Error = RuntimeError;

    fn try_from(value: u8) -> Result<Version, RuntimeError> {
        match value {
            3 => Ok(Version::V3),
            5 => Ok(Version::V5),
            8 => Ok(Version::V8),
            _ => recoverable_error!(
                ErrorCode::UnsupportedVersion,
                "Version {} is not supported: [3, 5, 8]",
                value
            ),
        }
    }
}

pub fn word_value(hb: u8, lb: u8) -> u16 {
    ((hb as u16) << 8) | lb as u16
}

/// The story memory image, with a pristine copy of dynamic memory kept from
/// load time for restart, checksum verification, and save compression.
pub struct Memory {
    version: Version,
    bytes: Vec<u8>,
    dynamic: Vec<u8>,
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Memory: version {}, {} bytes", self.version, self.bytes.len())
    }
}

impl Memory {
    pub fn new(bytes: Vec<u8>) -> Result<Memory, RuntimeError> {
        if bytes.len() < 0x40 {
            return recoverable_error!(
                ErrorCode::CorruptHeader,
                "Image is shorter ({:#04x}) than the 64-byte header",
                bytes.len()
            );
        }

        let version = Version::try_from(bytes[HeaderField::Version as usize])?;
        let mark = HeaderField::StaticMark as usize;
        let static_mark = word_value(bytes[mark], bytes[mark + 1]) as usize;
        if static_mark > bytes.len() {
            return recoverable_error!(
                ErrorCode::CorruptHeader,
                "Static memory mark {:#06x} beyond end of image ({:#06x})",
                static_mark,
                bytes.len()
            );
        }

        let dynamic = bytes[..static_mark].to_vec();
        Ok(Memory {
            version,
            bytes,
            dynamic,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn dynamic(&self) -> &[u8] {
        &self.dynamic
    }

    pub fn slice(&self, start: usize, length: usize) -> Vec<u8> {
        let end = (start + length).min(self.bytes.len());
        self.bytes[start..end].to_vec()
    }

    /// Declared story length, scaled by the version factor
    pub fn file_length(&self) -> Result<usize, RuntimeError> {
        let stored = self.read_word(HeaderField::FileLength as usize)? as usize;
        Ok(stored * self.version.file_length_multiplier())
    }

    /// Sum of all bytes from 0x40 to the declared file length, mod 0x10000.
    /// The dynamic region is summed from the pristine copy so a running
    /// game can still VERIFY.
    pub fn checksum(&self) -> Result<u16, RuntimeError> {
        let size = self.file_length()?.min(self.bytes.len());
        let split = self.dynamic.len().min(size);
        let sum = |acc: u16, b: &u8| acc.wrapping_add(*b as u16);
        let checksum = self.dynamic[0x40..split].iter().fold(0, sum);
        Ok(self.bytes[split..size].iter().fold(checksum, sum))
    }

    fn bad_address<T>(&self, kind: &str, addr: usize) -> Result<T, RuntimeError> {
        fatal_error!(
            ErrorCode::InvalidAddress,
            "{} address {:#06x} beyond end of memory ({:#06x})",
            kind,
            addr,
            self.bytes.len() - 1
        )
    }

    pub fn read_byte(&self, addr: usize) -> Result<u8, RuntimeError> {
        match self.bytes.get(addr) {
            Some(b) => Ok(*b),
            None => self.bad_address("Byte", addr),
        }
    }

    pub fn read_word(&self, addr: usize) -> Result<u16, RuntimeError> {
        match self.bytes.get(addr..addr + 2) {
            Some(b) => Ok(word_value(b[0], b[1])),
            None => self.bad_address("Word", addr),
        }
    }

    pub fn write_byte(&mut self, addr: usize, value: u8) -> Result<(), RuntimeError> {
        if addr >= self.bytes.len() {
            return self.bad_address("Byte", addr);
        }

        debug!(target: "app::memory", "Write {:#04x} to ${:04x}", value, addr);
        self.bytes[addr] = value;
        Ok(())
    }

    pub fn write_word(&mut self, addr: usize, value: u16) -> Result<(), RuntimeError> {
        if addr + 1 >= self.bytes.len() {
            return self.bad_address("Word", addr);
        }

        debug!(target: "app::memory", "Write {:#06x} to ${:04x}", value, addr);
        self.bytes[addr] = (value >> 8) as u8;
        self.bytes[addr + 1] = value as u8;
        Ok(())
    }

    /// XOR-RLE delta of current dynamic memory against the pristine image.
    /// A 0 byte is followed by a run length N, meaning N+1 unchanged bytes.
    pub fn compress(&self) -> Vec<u8> {
        let mut delta = Vec::new();
        let mut run: usize = 0;

        for (current, pristine) in self.bytes.iter().zip(self.dynamic.iter()) {
            match current ^ pristine {
                0 => {
                    run += 1;
                    if run == 256 {
                        delta.extend_from_slice(&[0, 255]);
                        run = 0;
                    }
                }
                b => {
                    if run > 0 {
                        delta.extend_from_slice(&[0, (run - 1) as u8]);
                        run = 0;
                    }
                    delta.push(b);
                }
            }
        }

        // Trailing unchanged bytes are implicit, but writing the run out
        // keeps the recorded length equal to the dynamic size
        if run > 0 {
            delta.extend_from_slice(&[0, (run - 1) as u8]);
        }

        delta
    }

    pub fn decompress(&self, delta: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        let mut data = Vec::new();
        let mut iter = delta.iter();

        while let Some(b) = iter.next() {
            let i = data.len();
            match *b {
                0 => {
                    let run = match iter.next() {
                        Some(run) => *run as usize,
                        None => {
                            return recoverable_error!(
                                ErrorCode::Restore,
                                "Compressed memory ends mid-run"
                            )
                        }
                    };
                    match self.dynamic.get(i..=i + run) {
                        Some(unchanged) => data.extend_from_slice(unchanged),
                        None => {
                            return recoverable_error!(
                                ErrorCode::Restore,
                                "Compressed memory run extends past dynamic memory"
                            )
                        }
                    }
                }
                b => match self.dynamic.get(i) {
                    Some(pristine) => data.push(b ^ pristine),
                    None => {
                        return recoverable_error!(
                            ErrorCode::Restore,
                            "Compressed memory longer than dynamic memory"
                        )
                    }
                },
            }
        }

        // Anything not covered by the delta is unchanged
        data.extend_from_slice(&self.dynamic[data.len()..]);

        Ok(data)
    }

    /// Put dynamic memory back to its load-time image
    pub fn reset(&mut self) {
        self.bytes[..self.dynamic.len()].copy_from_slice(&self.dynamic)
    }

    pub fn restore(&mut self, data: &[u8]) -> Result<(), RuntimeError> {
        if data.len() != self.dynamic.len() {
            return recoverable_error!(
                ErrorCode::Restore,
                "Dynamic memory size doesn't match: {:04x} != {:04x}",
                self.dynamic.len(),
                data.len()
            );
        }

        self.bytes[..data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn restore_compressed(&mut self, delta: &[u8]) -> Result<(), RuntimeError> {
        let data = self.decompress(delta)?;
        self.restore(&data)
    }
}

#[cfg(test)]
mod tests {
    use crate::{assert_ok, assert_ok_eq};

    use super::*;

    fn test_image(version: u8) -> Vec<u8> {
        let mut map = vec![0; 0x800];
        map[0] = version;
        // Static memory at 0x400
        map[0xE] = 0x4;
        // File length 0x800, scaled
        map[0x1A] = match version {
            3 => 0x4,
            5 => 0x2,
            _ => 0x1,
        };
        for (i, b) in map.iter_mut().enumerate().skip(0x40) {
            *b = i as u8;
        }
        map
    }

    #[test]
    fn test_version() {
        assert!(Version::try_from(3).is_ok_and(|v| v == Version::V3));
        assert!(Version::try_from(5).is_ok_and(|v| v == Version::V5));
        assert!(Version::try_from(8).is_ok_and(|v| v == Version::V8));
        for v in [0, 1, 2, 4, 6, 7, 9] {
            let e = Version::try_from(v);
            assert!(e
                .as_ref()
                .is_err_and(|e| e.code() == ErrorCode::UnsupportedVersion));
            assert!(e.is_err_and(|e| e.is_recoverable()));
        }
    }

    #[test]
    fn test_version_multipliers() {
        assert_eq!(Version::V3.routine_multiplier(), 2);
        assert_eq!(Version::V5.routine_multiplier(), 4);
        assert_eq!(Version::V8.routine_multiplier(), 8);
        assert_eq!(Version::V3.dictionary_word_count(), 2);
        assert_eq!(Version::V5.dictionary_word_count(), 3);
        assert_eq!(Version::V8.dictionary_word_count(), 3);
    }

    #[test]
    fn test_new() {
        let m = assert_ok!(Memory::new(test_image(5)));
        assert_eq!(m.version(), Version::V5);
        assert_eq!(m.size(), 0x800);
        assert_eq!(m.dynamic().len(), 0x400);
        assert_ok_eq!(m.read_byte(0), 5);
        assert_ok_eq!(m.read_word(0xE), 0x400);
        assert_ok_eq!(m.read_byte(0x123), 0x23);
        // A slice past the end is clamped
        assert_eq!(m.slice(0x7F0, 0x100).len(), 0x10);
    }

    #[test]
    fn test_new_short_image() {
        let e = Memory::new(vec![3; 0x3F]);
        assert!(e.is_err_and(|e| e.code() == ErrorCode::CorruptHeader));
    }

    #[test]
    fn test_new_bad_version() {
        let mut map = test_image(3);
        map[0] = 6;
        let e = Memory::new(map);
        assert!(e.is_err_and(|e| e.code() == ErrorCode::UnsupportedVersion));
    }

    #[test]
    fn test_new_static_mark_beyond_image() {
        let mut map = test_image(3);
        map[0xE] = 0x9;
        let e = Memory::new(map);
        assert!(e.is_err_and(|e| e.code() == ErrorCode::CorruptHeader));
    }

    #[test]
    fn test_checksum() {
        for version in [3, 5, 8] {
            let m = assert_ok!(Memory::new(test_image(version)));
            assert_ok_eq!(m.checksum(), 0xf420);
        }
    }

    #[test]
    fn test_checksum_ignores_dynamic_writes() {
        let mut m = assert_ok!(Memory::new(test_image(3)));
        let checksum = assert_ok!(m.checksum());
        assert!(m.write_byte(0x200, 0xFF).is_ok());
        assert_ok_eq!(m.checksum(), checksum);
    }

    #[test]
    fn test_read_byte() {
        let m = assert_ok!(Memory::new(test_image(8)));
        assert_ok_eq!(m.read_byte(0x40), 0x40);
        assert_ok_eq!(m.read_byte(0x7FF), 0xFF);
        assert!(m.read_byte(0x800).is_err());
    }

    #[test]
    fn test_read_word() {
        let m = assert_ok!(Memory::new(test_image(8)));
        assert_ok_eq!(m.read_word(0x40), 0x4041);
        assert_ok_eq!(m.read_word(0x7FE), 0xFEFF);
        assert!(m.read_word(0x7FF).is_err());
    }

    #[test]
    fn test_write_byte() {
        let mut m = assert_ok!(Memory::new(test_image(8)));
        assert!(m.write_byte(0x40, 0x99).is_ok());
        assert_ok_eq!(m.read_byte(0x3F), 0);
        assert_ok_eq!(m.read_byte(0x40), 0x99);
        assert_ok_eq!(m.read_byte(0x41), 0x41);
        assert!(m.write_byte(0x800, 0).is_err());
    }

    #[test]
    fn test_write_word() {
        let mut m = assert_ok!(Memory::new(test_image(8)));
        assert!(m.write_word(0x40, 0xCAFE).is_ok());
        assert_ok_eq!(m.read_word(0x40), 0xCAFE);
        assert_ok_eq!(m.read_byte(0x42), 0x42);
        assert!(m.write_word(0x7FF, 0).is_err());
    }

    #[test]
    fn test_compress() {
        let mut m = assert_ok!(Memory::new(test_image(8)));
        assert!(m.write_byte(0x200, 0xFC).is_ok());
        assert!(m.write_byte(0x280, 0x10).is_ok());
        assert!(m.write_byte(0x300, 0xFD).is_ok());
        // 0x000-0x1FF unchanged (two 256-byte runs), 0x200 delta 0xFC,
        // 0x201-0x27F unchanged, 0x280 delta 0x10^0x80, 0x281-0x2FF
        // unchanged, 0x300 delta 0xFD, 0x301-0x3FF unchanged
        assert_eq!(
            m.compress(),
            vec![0x00, 0xFF, 0x00, 0xFF, 0xFC, 0x00, 0x7E, 0x90, 0x00, 0x7E, 0xFD, 0x00, 0xFE]
        );
    }

    #[test]
    fn test_compress_round_trip() {
        let mut m = assert_ok!(Memory::new(test_image(5)));
        for i in (0x41..0x400).step_by(7) {
            assert!(m.write_byte(i, (i as u8).wrapping_mul(3)).is_ok());
        }
        let image = m.slice(0, 0x400);
        let delta = m.compress();
        assert_ok_eq!(m.decompress(&delta), image);
    }

    #[test]
    fn test_decompress_short_delta() {
        // A delta that ends early leaves the tail unchanged
        let m = assert_ok!(Memory::new(test_image(8)));
        let data = assert_ok!(m.decompress(&[0x00, 0xFF, 0xFC]));
        assert_eq!(data.len(), 0x400);
        assert_eq!(data[0x100], 0xFC ^ 0x00);
        assert_eq!(data[0x101..], m.dynamic()[0x101..]);
    }

    #[test]
    fn test_decompress_truncated_run() {
        let m = assert_ok!(Memory::new(test_image(8)));
        let e = m.decompress(&[0x01, 0x00]);
        assert!(e.is_err_and(|e| e.code() == ErrorCode::Restore));
    }

    #[test]
    fn test_reset() {
        let mut m = assert_ok!(Memory::new(test_image(8)));
        for i in 0x40..0x400 {
            assert!(m.write_byte(i, 0).is_ok());
        }
        m.reset();
        for i in 0x40..0x400 {
            assert_ok_eq!(m.read_byte(i), i as u8)
        }
    }

    #[test]
    fn test_restore() {
        let mut m = assert_ok!(Memory::new(test_image(8)));
        let mut data = m.dynamic().to_vec();
        for (i, b) in data.iter_mut().enumerate().skip(0x40) {
            *b = !(i as u8);
        }
        assert!(m.restore(&data).is_ok());
        for i in 0x40..0x400 {
            assert_ok_eq!(m.read_byte(i), !(i as u8));
        }
    }

    #[test]
    fn test_restore_wrong_size() {
        let mut m = assert_ok!(Memory::new(test_image(8)));
        let e = m.restore(&vec![0; 0x3FF]);
        assert!(e.is_err_and(|e| e.code() == ErrorCode::Restore));
    }

    #[test]
    fn test_restore_compressed() {
        let mut m = assert_ok!(Memory::new(test_image(8)));
        assert!(m
            .restore_compressed(&[
                0x00, 0xFF, 0x00, 0xFF, 0xFC, 0x00, 0x7E, 0x90, 0x00, 0x7E, 0xFD, 0x00, 0xFE,
            ])
            .is_ok());
        assert_ok_eq!(m.read_byte(0x200), 0xFC);
        assert_ok_eq!(m.read_byte(0x280), 0x10);
        assert_ok_eq!(m.read_byte(0x300), 0xFD);
        assert_ok_eq!(m.read_byte(0x2FF), 0xFF);
    }
}
