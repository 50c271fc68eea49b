//! Quetzal save-state serialization: an IFZS `FORM` holding an `IFhd`
//! story identification chunk, a `CMem` or `UMem` memory chunk, and a
//! `Stks` frame stack chunk.
use std::fmt;

use iff::{chunk_id, unsigned, unsigned_bytes, Chunk};

use crate::{
    error::{ErrorCode, RuntimeError},
    recoverable_error,
};

/// Story file identification: release, serial, checksum, and the pc to
/// resume at.
#[derive(Clone, Debug)]
pub struct IFhd {
    release: u16,
    serial: Vec<u8>,
    checksum: u16,
    pc: u32,
}

impl IFhd {
    pub fn new(release: u16, serial: &[u8], checksum: u16, pc: u32) -> IFhd {
        IFhd {
            release,
            serial: serial.to_vec(),
            checksum,
            pc,
        }
    }

    pub fn release_number(&self) -> u16 {
        self.release
    }

    pub fn serial_number(&self) -> &Vec<u8> {
        &self.serial
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }
}

impl PartialEq for IFhd {
    fn eq(&self, other: &Self) -> bool {
        // Everything but the pc, which varies from save to save
        (self.release, &self.serial, self.checksum)
            == (other.release, &other.serial, other.checksum)
    }
}

impl fmt::Display for IFhd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let serial = String::from_utf8_lossy(&self.serial);
        write!(
            f,
            "Release: {:04x}, serial: {}, checksum: {:04x}, pc: {:06x}",
            self.release, serial, self.checksum, self.pc
        )
    }
}

impl TryFrom<&Chunk> for IFhd {
    type Error = RuntimeError;

    fn try_from(value: &Chunk) -> Result<Self, Self::Error> {
        let data = value.data();
        if data.len() < 13 {
            return recoverable_error!(
                ErrorCode::Restore,
                "IFhd chunk is {} bytes, expected at least 13",
                data.len()
            );
        }

        Ok(IFhd {
            release: unsigned(&data[0..2]) as u16,
            serial: data[2..8].to_vec(),
            checksum: unsigned(&data[8..10]) as u16,
            pc: unsigned(&data[10..13]) as u32,
        })
    }
}

impl From<&IFhd> for Chunk {
    fn from(value: &IFhd) -> Self {
        let mut data = unsigned_bytes(value.release as usize, 2);
        data.extend(&value.serial);
        data.extend(unsigned_bytes(value.checksum as usize, 2));
        data.extend(unsigned_bytes(value.pc as usize, 3));
        Chunk::data_chunk(chunk_id("IFhd"), data)
    }
}

/// Dynamic memory payload, either XOR-run-length compressed (`CMem`) or
/// a raw copy (`UMem`).
pub struct Mem {
    compressed: bool,
    bytes: Vec<u8>,
}

impl Mem {
    pub fn new(compressed: bool, bytes: Vec<u8>) -> Mem {
        Mem { compressed, bytes }
    }

    pub fn compressed(&self) -> bool {
        self.compressed
    }

    pub fn memory(&self) -> &Vec<u8> {
        &self.bytes
    }

    fn chunk_name(&self) -> &'static str {
        if self.compressed {
            "CMem"
        } else {
            "UMem"
        }
    }
}

impl fmt::Debug for Mem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {} bytes", self.chunk_name(), self.bytes.len())
    }
}

impl From<&Chunk> for Mem {
    fn from(value: &Chunk) -> Self {
        Mem {
            compressed: value.id() == *b"CMem",
            bytes: value.data().to_vec(),
        }
    }
}

impl From<&Mem> for Chunk {
    fn from(value: &Mem) -> Self {
        Chunk::data_chunk(chunk_id(value.chunk_name()), value.bytes.clone())
    }
}

/// One serialized frame.  The flag byte holds the local variable count in
/// its low nibble; bit 4 set means the call discards its result.
#[derive(Debug, PartialEq)]
pub struct Stk {
    return_addr: u32,
    flags: u8,
    result_var: u8,
    argc: u8,
    locals: Vec<u16>,
    stack: Vec<u16>,
}

impl Stk {
    pub fn new(
        return_addr: u32,
        flags: u8,
        result_var: u8,
        argc: u8,
        locals: &[u16],
        stack: &[u16],
    ) -> Stk {
        Stk {
            return_addr,
            flags,
            result_var,
            argc,
            locals: locals.to_vec(),
            stack: stack.to_vec(),
        }
    }

    pub fn return_address(&self) -> u32 {
        self.return_addr
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn result_variable(&self) -> u8 {
        self.result_var
    }

    /// Count of arguments supplied to the call.
    pub fn arguments(&self) -> u8 {
        self.argc
    }

    pub fn variables(&self) -> &Vec<u16> {
        &self.locals
    }

    pub fn stack(&self) -> &Vec<u16> {
        &self.stack
    }

    // Byte length of the serialized frame, starting at `data`
    fn parse(data: &[u8]) -> Result<(Stk, usize), RuntimeError> {
        if data.len() < 8 {
            return recoverable_error!(ErrorCode::Restore, "Stks chunk is truncated");
        }

        let local_count = data[3] as usize & 0xF;
        let stack_size = unsigned(&data[6..8]);
        let end = 8 + ((local_count + stack_size) * 2);
        if data.len() < end {
            return recoverable_error!(ErrorCode::Restore, "Stks chunk is truncated");
        }

        let word_at = |i: usize| unsigned(&data[8 + (i * 2)..10 + (i * 2)]) as u16;
        let locals: Vec<u16> = (0..local_count).map(&word_at).collect();
        let stack: Vec<u16> = (local_count..local_count + stack_size)
            .map(&word_at)
            .collect();

        let stk = Stk {
            return_addr: unsigned(&data[0..3]) as u32,
            flags: data[3],
            result_var: data[4],
            argc: data[5].count_ones() as u8,
            locals,
            stack,
        };
        Ok((stk, end))
    }
}

impl fmt::Display for Stk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Return: {:06x}, flags: {:02x}, result: {:02x}, arguments: {}, locals: {}, stack: {}",
            self.return_addr,
            self.flags,
            self.result_var,
            self.argc,
            self.locals.len(),
            self.stack.len()
        )
    }
}

impl From<&Stk> for Vec<u8> {
    fn from(value: &Stk) -> Self {
        let mut data = unsigned_bytes(value.return_addr as usize, 3);
        data.push(value.flags);
        data.push(value.result_var);
        // Arguments are stored as a bitmask, one bit per argument
        data.push(((1_u16 << value.argc) - 1) as u8);
        data.extend(unsigned_bytes(value.stack.len(), 2));
        for w in value.locals.iter().chain(value.stack.iter()) {
            data.extend(unsigned_bytes(*w as usize, 2));
        }

        data
    }
}

/// The frame stack, outermost frame first.
#[derive(Debug, PartialEq)]
pub struct Stks {
    frames: Vec<Stk>,
}

impl Stks {
    pub fn new(frames: Vec<Stk>) -> Stks {
        Stks { frames }
    }

    pub fn stks(&self) -> &Vec<Stk> {
        &self.frames
    }
}

impl TryFrom<&Chunk> for Stks {
    type Error = RuntimeError;

    fn try_from(value: &Chunk) -> Result<Self, Self::Error> {
        let data = value.data();
        let mut frames = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let (stk, length) = Stk::parse(&data[offset..])?;
            frames.push(stk);
            offset += length;
        }

        Ok(Stks::new(frames))
    }
}

impl From<&Stks> for Chunk {
    fn from(value: &Stks) -> Self {
        let data = value.frames.iter().flat_map(|stk| Vec::from(stk)).collect();
        Chunk::data_chunk(chunk_id("Stks"), data)
    }
}

#[derive(Debug)]
pub struct Quetzal {
    ifhd: IFhd,
    mem: Mem,
    stks: Stks,
}

impl Quetzal {
    pub fn new(ifhd: IFhd, mem: Mem, stks: Stks) -> Quetzal {
        Quetzal { ifhd, mem, stks }
    }

    pub fn ifhd(&self) -> &IFhd {
        &self.ifhd
    }

    pub fn mem(&self) -> &Mem {
        &self.mem
    }

    pub fn stks(&self) -> &Stks {
        &self.stks
    }
}

impl fmt::Display for Quetzal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let frames = self.stks.stks().len();
        write!(f, "IFZS: [{}], [{}], {} frames", self.ifhd, self.mem, frames)
    }
}

fn required_chunk<'a>(form: &'a Chunk, id: &str) -> Result<&'a Chunk, RuntimeError> {
    match form.find_chunk(chunk_id(id)) {
        Some(c) => Ok(c),
        None => recoverable_error!(ErrorCode::Restore, "Save data has no {} chunk", id),
    }
}

impl TryFrom<&Chunk> for Quetzal {
    type Error = RuntimeError;

    fn try_from(value: &Chunk) -> Result<Self, Self::Error> {
        if value.id() != iff::FORM || value.sub_id() != Some(chunk_id("IFZS")) {
            return recoverable_error!(ErrorCode::Restore, "Save data is not an IFZS form");
        }

        let ifhd = IFhd::try_from(required_chunk(value, "IFhd")?)?;
        let cmem = value.find_chunk(chunk_id("CMem"));
        let umem = value.find_chunk(chunk_id("UMem"));
        let mem = match cmem.or(umem) {
            Some(c) => Mem::from(c),
            None => {
                return recoverable_error!(ErrorCode::Restore, "Save data has no CMem or UMem chunk")
            }
        };
        let stks = Stks::try_from(required_chunk(value, "Stks")?)?;

        Ok(Quetzal::new(ifhd, mem, stks))
    }
}

impl TryFrom<&[u8]> for Quetzal {
    type Error = RuntimeError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        match Chunk::try_from(value) {
            Ok(chunk) => Quetzal::try_from(&chunk),
            Err(e) => recoverable_error!(ErrorCode::Restore, "Malformed save data: {}", e),
        }
    }
}

impl From<&Quetzal> for Chunk {
    fn from(value: &Quetzal) -> Self {
        Chunk::form(
            chunk_id("IFZS"),
            vec![
                Chunk::from(&value.ifhd),
                Chunk::from(&value.mem),
                Chunk::from(&value.stks),
            ],
        )
    }
}

impl From<&Quetzal> for Vec<u8> {
    fn from(value: &Quetzal) -> Self {
        Vec::from(&Chunk::from(value))
    }
}
