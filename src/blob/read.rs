//! READ path: bounds checks, buffered reply, descriptor-streaming reply.

use log::debug;

use crate::consts::DISK_CTL_SIZE;
use crate::errors::{BlobError, BlobResult};
use crate::metrics::{record_not_found, record_read};
use crate::util::short_id;

use super::backend::{BlobBackend, Reply};
use super::composite_key;
use super::disk::IoAttr;

impl BlobBackend {
    /// Serve a READ. `reply_capacity` is the caller's destination buffer
    /// size; 0 means "no inline buffer" and selects the streaming reply
    /// (the transport sends straight from the log descriptor).
    pub fn read(&self, io: &IoAttr, reply_capacity: usize) -> BlobResult<Reply> {
        let kind = io.kind();
        let key = composite_key(&io.origin, kind);

        let Some(ctl) = self.index().lookup(&key) else {
            record_not_found();
            return Err(BlobError::NotFound);
        };

        // Everything past the header counts as available payload
        // (alignment padding included, as stored).
        let avail = ctl.size - DISK_CTL_SIZE as u64;
        let in_bounds = io.offset <= avail
            && io
                .offset
                .checked_add(io.size)
                .map_or(false, |end| end <= avail);
        if !in_bounds {
            return Err(BlobError::InvalidArgument(format!(
                "read beyond record: offset {} + size {} > available {}",
                io.offset, io.size, avail
            )));
        }
        let size = if io.size == 0 {
            avail - io.offset
        } else {
            io.size
        };

        let offset = ctl.offset + DISK_CTL_SIZE as u64 + io.offset;

        debug!(
            "blob: {}: read: requested offset {}, size {}, stored-size {}, data at {}",
            short_id(&io.origin),
            io.offset,
            size,
            ctl.size,
            ctl.offset
        );

        if reply_capacity == 0 {
            // Zero-copy path: the transport streams from the descriptor.
            return Ok(Reply::Streamed { kind, offset, size });
        }

        let size = size.min(reply_capacity as u64);
        let mut buf = vec![0u8; size as usize];
        self.log().read_at(kind, offset, &mut buf)?;
        record_read(size);
        Ok(Reply::Data(buf))
    }
}
