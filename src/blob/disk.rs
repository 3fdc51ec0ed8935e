//! On-disk and wire records: DiskControl, IoAttr, HistoryEntry.
//!
//! Все поля хранятся little-endian; конверсия в host order происходит
//! здесь, на границе encode/decode. Layout'ы описаны в consts.rs.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    DISK_CTL_OFF_FLAGS, DISK_CTL_OFF_SIZE, DISK_CTL_REMOVED, DISK_CTL_SIZE, HISTORY_ENTRY_SIZE,
    ID_SIZE, IO_ATTR_SIZE, IO_FLAGS_HISTORY,
};
use crate::errors::{BlobError, BlobResult};

use super::{Id, Kind};

/// Fixed header prepended to every on-disk record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskControl {
    pub id: Id,
    pub flags: u64,
    /// Payload bytes, excluding header and padding.
    pub size: u64,
}

impl DiskControl {
    pub fn new(id: Id, size: u64) -> Self {
        Self { id, flags: 0, size }
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.flags & DISK_CTL_REMOVED != 0
    }

    #[inline]
    pub fn mark_removed(&mut self) {
        self.flags |= DISK_CTL_REMOVED;
    }

    pub fn encode(&self) -> [u8; DISK_CTL_SIZE] {
        let mut buf = [0u8; DISK_CTL_SIZE];
        buf[..ID_SIZE].copy_from_slice(&self.id);
        LittleEndian::write_u64(&mut buf[DISK_CTL_OFF_FLAGS..DISK_CTL_OFF_FLAGS + 8], self.flags);
        LittleEndian::write_u64(&mut buf[DISK_CTL_OFF_SIZE..DISK_CTL_OFF_SIZE + 8], self.size);
        buf
    }

    pub fn decode(buf: &[u8]) -> BlobResult<Self> {
        if buf.len() < DISK_CTL_SIZE {
            return Err(BlobError::InvalidArgument(format!(
                "short disk control: {} bytes (want {})",
                buf.len(),
                DISK_CTL_SIZE
            )));
        }
        let mut id = [0u8; ID_SIZE];
        id.copy_from_slice(&buf[..ID_SIZE]);
        Ok(Self {
            id,
            flags: LittleEndian::read_u64(&buf[DISK_CTL_OFF_FLAGS..DISK_CTL_OFF_FLAGS + 8]),
            size: LittleEndian::read_u64(&buf[DISK_CTL_OFF_SIZE..DISK_CTL_OFF_SIZE + 8]),
        })
    }
}

/// Per-request descriptor carried in command payloads.
///
/// `origin` addresses the stored record; `id` is the logical key recorded
/// in auto-appended history entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoAttr {
    pub id: Id,
    pub origin: Id,
    pub offset: u64,
    pub size: u64,
    pub flags: u64,
}

impl IoAttr {
    pub fn new(id: Id, size: u64, flags: u64) -> Self {
        Self {
            id,
            origin: id,
            offset: 0,
            size,
            flags,
        }
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        if self.flags & IO_FLAGS_HISTORY != 0 {
            Kind::History
        } else {
            Kind::Data
        }
    }

    pub fn encode(&self) -> [u8; IO_ATTR_SIZE] {
        let mut buf = [0u8; IO_ATTR_SIZE];
        buf[..ID_SIZE].copy_from_slice(&self.id);
        buf[ID_SIZE..2 * ID_SIZE].copy_from_slice(&self.origin);
        LittleEndian::write_u64(&mut buf[2 * ID_SIZE..2 * ID_SIZE + 8], self.offset);
        LittleEndian::write_u64(&mut buf[2 * ID_SIZE + 8..2 * ID_SIZE + 16], self.size);
        LittleEndian::write_u64(&mut buf[2 * ID_SIZE + 16..2 * ID_SIZE + 24], self.flags);
        buf
    }

    /// Decode from the head of a command payload (host-order conversion
    /// happens here, once, on entry).
    pub fn decode(buf: &[u8]) -> BlobResult<Self> {
        if buf.len() < IO_ATTR_SIZE {
            return Err(BlobError::InvalidArgument(format!(
                "short io attr: {} bytes (want {})",
                buf.len(),
                IO_ATTR_SIZE
            )));
        }
        let mut id = [0u8; ID_SIZE];
        id.copy_from_slice(&buf[..ID_SIZE]);
        let mut origin = [0u8; ID_SIZE];
        origin.copy_from_slice(&buf[ID_SIZE..2 * ID_SIZE]);
        Ok(Self {
            id,
            origin,
            offset: LittleEndian::read_u64(&buf[2 * ID_SIZE..2 * ID_SIZE + 8]),
            size: LittleEndian::read_u64(&buf[2 * ID_SIZE + 8..2 * ID_SIZE + 16]),
            flags: LittleEndian::read_u64(&buf[2 * ID_SIZE + 16..2 * ID_SIZE + 24]),
        })
    }
}

/// Fixed-size record appended to the per-key history chain on every data
/// write (unless suppressed). Offset/size are the logical request values,
/// not the physical placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: Id,
    pub flags: u64,
    pub tsec: u64,
    pub tnsec: u64,
    pub offset: u64,
    pub size: u64,
}

impl HistoryEntry {
    pub fn encode(&self) -> [u8; HISTORY_ENTRY_SIZE] {
        let mut buf = [0u8; HISTORY_ENTRY_SIZE];
        buf[..ID_SIZE].copy_from_slice(&self.id);
        LittleEndian::write_u64(&mut buf[ID_SIZE..ID_SIZE + 8], self.flags);
        LittleEndian::write_u64(&mut buf[ID_SIZE + 8..ID_SIZE + 16], self.tsec);
        LittleEndian::write_u64(&mut buf[ID_SIZE + 16..ID_SIZE + 24], self.tnsec);
        LittleEndian::write_u64(&mut buf[ID_SIZE + 24..ID_SIZE + 32], self.offset);
        LittleEndian::write_u64(&mut buf[ID_SIZE + 32..ID_SIZE + 40], self.size);
        buf
    }

    pub fn decode(buf: &[u8]) -> BlobResult<Self> {
        if buf.len() < HISTORY_ENTRY_SIZE {
            return Err(BlobError::InvalidArgument(format!(
                "short history entry: {} bytes (want {})",
                buf.len(),
                HISTORY_ENTRY_SIZE
            )));
        }
        let mut id = [0u8; ID_SIZE];
        id.copy_from_slice(&buf[..ID_SIZE]);
        Ok(Self {
            id,
            flags: LittleEndian::read_u64(&buf[ID_SIZE..ID_SIZE + 8]),
            tsec: LittleEndian::read_u64(&buf[ID_SIZE + 8..ID_SIZE + 16]),
            tnsec: LittleEndian::read_u64(&buf[ID_SIZE + 16..ID_SIZE + 24]),
            offset: LittleEndian::read_u64(&buf[ID_SIZE + 24..ID_SIZE + 32]),
            size: LittleEndian::read_u64(&buf[ID_SIZE + 32..ID_SIZE + 40]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id() -> Id {
        let mut id = [0u8; ID_SIZE];
        for (i, b) in id.iter_mut().enumerate() {
            *b = i as u8;
        }
        id
    }

    #[test]
    fn disk_control_roundtrip() {
        let mut ctl = DiskControl::new(sample_id(), 4096);
        ctl.mark_removed();
        let buf = ctl.encode();
        let back = DiskControl::decode(&buf).expect("decode");
        assert_eq!(back, ctl);
        assert!(back.is_removed());

        // little-endian on disk
        assert_eq!(buf[DISK_CTL_OFF_SIZE], 0x00);
        assert_eq!(buf[DISK_CTL_OFF_SIZE + 1], 0x10);
        assert!(DiskControl::decode(&buf[..10]).is_err());
    }

    #[test]
    fn io_attr_roundtrip() {
        let mut io = IoAttr::new(sample_id(), 17, IO_FLAGS_HISTORY);
        io.offset = 9;
        let buf = io.encode();
        let back = IoAttr::decode(&buf).expect("decode");
        assert_eq!(back, io);
        assert_eq!(back.kind(), Kind::History);
        assert!(IoAttr::decode(&buf[..IO_ATTR_SIZE - 1]).is_err());
    }

    #[test]
    fn history_entry_roundtrip() {
        let e = HistoryEntry {
            id: sample_id(),
            flags: 3,
            tsec: 1_700_000_000,
            tnsec: 12345,
            offset: 512,
            size: 100,
        };
        let buf = e.encode();
        assert_eq!(buf.len(), HISTORY_ENTRY_SIZE);
        assert_eq!(HistoryEntry::decode(&buf).expect("decode"), e);
    }
}
