//! Reading and writing of IFF ("Interchange File Format") chunked binary
//! data, as used by Quetzal save files.
//!
//! A chunk is a 4-byte identifier, a 32-bit big-endian length, and `length`
//! bytes of payload, padded to an even byte boundary.  `FORM` chunks carry a
//! 4-byte sub-identifier followed by nested chunks.
use std::fmt;

#[macro_use]
extern crate log;

/// 4-byte chunk identifier
pub type ChunkId = [u8; 4];

pub const FORM: ChunkId = *b"FORM";

/// Build a [ChunkId] from a string, truncating or space-padding to 4 bytes.
pub fn chunk_id(id: &str) -> ChunkId {
    let mut v = [b' '; 4];
    for (i, b) in id.bytes().take(4).enumerate() {
        v[i] = b;
    }
    v
}

/// Big-endian interpretation of a byte slice.
pub fn unsigned(v: &[u8]) -> usize {
    v.iter().fold(0, |acc, b| (acc << 8) | *b as usize)
}

/// Big-endian encoding of a value into `length` bytes.
pub fn unsigned_bytes(value: usize, length: usize) -> Vec<u8> {
    (0..length)
        .map(|i| (value >> (8 * (length - 1 - i))) as u8)
        .collect()
}

#[derive(Debug, Eq, PartialEq)]
pub enum ChunkError {
    /// The input ended before the declared chunk length was satisfied.
    Truncated(usize, usize),
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChunkError::Truncated(wanted, have) => {
                write!(f, "Chunk data truncated: expected {}, got {}", wanted, have)
            }
        }
    }
}

/// A parsed chunk: either a `FORM` holding sub-chunks or a data chunk
/// holding raw payload bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chunk {
    id: ChunkId,
    sub_id: Option<ChunkId>,
    data: Vec<u8>,
    chunks: Vec<Chunk>,
}

impl Chunk {
    pub fn data_chunk(id: ChunkId, data: Vec<u8>) -> Chunk {
        Chunk {
            id,
            sub_id: None,
            data,
            chunks: Vec::new(),
        }
    }

    pub fn form(sub_id: ChunkId, chunks: Vec<Chunk>) -> Chunk {
        Chunk {
            id: FORM,
            sub_id: Some(sub_id),
            data: Vec::new(),
            chunks,
        }
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn sub_id(&self) -> Option<ChunkId> {
        self.sub_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Payload length, excluding the 8-byte chunk header and any pad byte.
    pub fn length(&self) -> usize {
        if self.id == FORM {
            self.chunks.iter().fold(4, |acc, c| {
                let l = c.length();
                acc + 8 + l + (l % 2)
            })
        } else {
            self.data.len()
        }
    }

    /// First nested chunk with the given id, if any.
    pub fn find_chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    fn parse(v: &[u8], offset: usize) -> Result<(Chunk, usize), ChunkError> {
        if v.len() < offset + 8 {
            return Err(ChunkError::Truncated(offset + 8, v.len()));
        }

        let mut id = [0; 4];
        id.copy_from_slice(&v[offset..offset + 4]);
        let length = unsigned(&v[offset + 4..offset + 8]);
        if v.len() < offset + 8 + length {
            return Err(ChunkError::Truncated(offset + 8 + length, v.len()));
        }

        if id == FORM {
            // A FORM payload starts with a 4-byte sub-identifier
            if length < 4 {
                return Err(ChunkError::Truncated(offset + 12, offset + 8 + length));
            }
            let mut sub_id = [0; 4];
            sub_id.copy_from_slice(&v[offset + 8..offset + 12]);
            let mut chunks = Vec::new();
            let end = offset + 8 + length;
            let mut position = offset + 12;
            while position < end {
                let (chunk, next) = Chunk::parse(v, position)?;
                chunks.push(chunk);
                position = next;
            }
            Ok((Chunk::form(sub_id, chunks), end + (length % 2)))
        } else {
            let data = v[offset + 8..offset + 8 + length].to_vec();
            Ok((Chunk::data_chunk(id, data), offset + 8 + length + (length % 2)))
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.id))?;
        if let Some(sub_id) = self.sub_id {
            write!(f, " {}", String::from_utf8_lossy(&sub_id))?;
        }
        write!(f, " [{}]", self.length())
    }
}

impl TryFrom<&[u8]> for Chunk {
    type Error = ChunkError;

    fn try_from(value: &[u8]) -> Result<Chunk, ChunkError> {
        match Chunk::parse(value, 0) {
            Ok((chunk, _)) => Ok(chunk),
            Err(e) => {
                error!(target: "iff", "Error parsing chunk data: {}", e);
                Err(e)
            }
        }
    }
}

impl From<&Chunk> for Vec<u8> {
    fn from(value: &Chunk) -> Vec<u8> {
        let mut writer = ChunkWriter::new();
        write_chunk(&mut writer, value);
        writer.finish()
    }
}

fn write_chunk(writer: &mut ChunkWriter, chunk: &Chunk) {
    writer.open_chunk(chunk.id());
    if let Some(sub_id) = chunk.sub_id() {
        writer.write(&sub_id);
    }
    writer.write(chunk.data());
    for c in chunk.chunks() {
        write_chunk(writer, c);
    }
    writer.close_chunk();
}

/// Serializes chunks with an explicit open/close discipline.
///
/// `open_chunk` reserves a length word that `close_chunk` back-patches once
/// the payload size is known, so nested chunks can be streamed without
/// buffering each one separately.
#[derive(Default)]
pub struct ChunkWriter {
    buffer: Vec<u8>,
    open: Vec<usize>,
}

impl ChunkWriter {
    pub fn new() -> ChunkWriter {
        ChunkWriter::default()
    }

    pub fn open_chunk(&mut self, id: ChunkId) {
        self.buffer.extend_from_slice(&id);
        self.open.push(self.buffer.len());
        self.buffer.extend_from_slice(&[0; 4]);
    }

    /// Current write position, for back-patching data written earlier.
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_byte(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_unsigned(&mut self, value: usize, length: usize) {
        let v = unsigned_bytes(value, length);
        self.buffer.extend_from_slice(&v);
    }

    pub fn patch_unsigned(&mut self, position: usize, value: usize, length: usize) {
        let v = unsigned_bytes(value, length);
        self.buffer[position..position + length].copy_from_slice(&v);
    }

    pub fn close_chunk(&mut self) {
        if let Some(position) = self.open.pop() {
            let length = self.buffer.len() - position - 4;
            self.patch_unsigned(position, length, 4);
            // Pad to an even boundary; the pad byte is not counted in the
            // chunk length
            if length % 2 == 1 {
                self.buffer.push(0);
            }
        } else {
            warn!(target: "iff", "close_chunk with no open chunk");
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}
