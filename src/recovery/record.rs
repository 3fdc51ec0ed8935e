//! Iterator wire record: one key as reported by a remote node.
//!
//! Layout (little-endian, fixed size):
//! [id ID_SIZE][size u64][tsec u64][flags u64]
//!
//! Streams are sorted by id; scratch files are plain concatenations of
//! these records.

use byteorder::{ByteOrder, LittleEndian};

use anyhow::{anyhow, Result};

use crate::blob::Id;
use crate::consts::ID_SIZE;

pub const ITER_RECORD_SIZE: usize = ID_SIZE + 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterRecord {
    pub id: Id,
    /// Stored payload size on the reporting node.
    pub size: u64,
    /// Newest history timestamp (epoch seconds); 0 when no history.
    pub tsec: u64,
    pub flags: u64,
}

impl IterRecord {
    pub fn encode(&self) -> [u8; ITER_RECORD_SIZE] {
        let mut buf = [0u8; ITER_RECORD_SIZE];
        buf[..ID_SIZE].copy_from_slice(&self.id);
        LittleEndian::write_u64(&mut buf[ID_SIZE..ID_SIZE + 8], self.size);
        LittleEndian::write_u64(&mut buf[ID_SIZE + 8..ID_SIZE + 16], self.tsec);
        LittleEndian::write_u64(&mut buf[ID_SIZE + 16..ID_SIZE + 24], self.flags);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ITER_RECORD_SIZE {
            return Err(anyhow!(
                "short iterator record: {} bytes (want {})",
                buf.len(),
                ITER_RECORD_SIZE
            ));
        }
        let mut id = [0u8; ID_SIZE];
        id.copy_from_slice(&buf[..ID_SIZE]);
        Ok(Self {
            id,
            size: LittleEndian::read_u64(&buf[ID_SIZE..ID_SIZE + 8]),
            tsec: LittleEndian::read_u64(&buf[ID_SIZE + 8..ID_SIZE + 16]),
            flags: LittleEndian::read_u64(&buf[ID_SIZE + 16..ID_SIZE + 24]),
        })
    }
}
