//! Write paths: data appends and the history chain rewrite.
//!
//! Data writes are always appends — the logical offset from the request is
//! recorded in the history entry but does not affect placement. History
//! updates rewrite the whole per-key chain blob: прочитать старый блоб,
//! пометить его заголовок REMOVED на месте, отрезать заголовок, пропустить
//! через process_meta hook и дописать результат свежей записью.

use log::debug;

use crate::consts::{
    DISK_CTL_SIZE, HISTORY_ENTRY_SIZE, IO_FLAGS_APPEND, IO_FLAGS_HISTORY, IO_FLAGS_META,
    IO_FLAGS_NO_HISTORY_UPDATE,
};
use crate::errors::{BlobError, BlobResult};
use crate::metrics::{record_history_rewrite, record_removed_mark};
use crate::util::{now_ts, short_id};

use super::backend::BlobBackend;
use super::disk::{DiskControl, HistoryEntry, IoAttr};
use super::index::RamControl;
use super::{composite_key, Kind};

impl BlobBackend {
    /// WRITE command behavior: history writes go through the chain-update
    /// path; data writes append and, unless suppressed, also append a
    /// history entry carrying the logical (offset, size) of the request.
    pub fn write(&self, io: &IoAttr, payload: &[u8]) -> BlobResult<(u64, u64)> {
        if io.size != payload.len() as u64 {
            return Err(BlobError::InvalidArgument(format!(
                "io size {} != payload length {}",
                io.size,
                payload.len()
            )));
        }

        if io.flags & IO_FLAGS_HISTORY != 0 {
            return self.write_history(io, payload);
        }

        let placed = self.write_data(io, payload)?;

        if io.flags & IO_FLAGS_NO_HISTORY_UPDATE == 0 {
            let (tsec, tnsec) = now_ts();
            let entry = HistoryEntry {
                id: io.id,
                flags: io.flags,
                tsec,
                tnsec,
                offset: io.offset,
                size: io.size,
            };

            let mut hio = *io;
            hio.flags = (io.flags | IO_FLAGS_HISTORY | IO_FLAGS_APPEND) & !IO_FLAGS_META;
            hio.size = HISTORY_ENTRY_SIZE as u64;
            hio.offset = 0;
            self.write_history(&hio, &entry.encode())?;
        }

        Ok(placed)
    }

    pub(crate) fn write_data(&self, io: &IoAttr, payload: &[u8]) -> BlobResult<(u64, u64)> {
        let ctl = DiskControl::new(io.origin, payload.len() as u64);
        let (offset, total) = self.log().append(Kind::Data, &ctl, payload)?;

        self.index().insert_or_replace(
            composite_key(&io.origin, Kind::Data),
            RamControl {
                offset,
                size: total,
            },
        );

        debug!(
            "blob: {}: written data: position {}, size {}, on-disk {}",
            short_id(&io.origin),
            offset,
            payload.len(),
            total
        );
        Ok((offset, total))
    }

    /// Update the per-key history chain: read the prior blob, tombstone it
    /// in place, strip its header, let process_meta combine old + new, and
    /// append the result as a fresh record.
    pub(crate) fn write_history(&self, io: &IoAttr, payload: &[u8]) -> BlobResult<(u64, u64)> {
        let key = composite_key(&io.origin, Kind::History);

        let mut old: Vec<u8> = Vec::new();
        if let Some(prev) = self.index().lookup(&key) {
            let mut buf: Vec<u8> = Vec::new();
            buf.try_reserve_exact(prev.size as usize)
                .map_err(|_| BlobError::OutOfMemory(prev.size as usize))?;
            buf.resize(prev.size as usize, 0);
            self.log().read_at(Kind::History, prev.offset, &mut buf)?;

            let mut pctl = DiskControl::decode(&buf)?;
            let payload_len = pctl.size as usize;
            if DISK_CTL_SIZE + payload_len > buf.len() {
                return Err(BlobError::InvalidArgument(format!(
                    "history record at {} larger than indexed size {}",
                    prev.offset, prev.size
                )));
            }

            debug!(
                "blob: {}: found existing history block at {}, size {}",
                short_id(&io.origin),
                prev.offset,
                payload_len
            );

            pctl.mark_removed();
            self.log()
                .overwrite_header(Kind::History, prev.offset, &pctl)?;
            record_removed_mark();

            old.try_reserve_exact(payload_len)
                .map_err(|_| BlobError::OutOfMemory(payload_len))?;
            old.extend_from_slice(&buf[DISK_CTL_SIZE..DISK_CTL_SIZE + payload_len]);
            record_history_rewrite();
        }

        let combined = self.process_meta(io, old, payload)?;

        let ctl = DiskControl::new(io.origin, combined.len() as u64);
        let (offset, total) = self.log().append(Kind::History, &ctl, &combined)?;
        self.index().insert_or_replace(
            key,
            RamControl {
                offset,
                size: total,
            },
        );

        debug!(
            "blob: {}: written history: position {}, size {}, on-disk {}",
            short_id(&io.origin),
            offset,
            combined.len(),
            total
        );
        Ok((offset, total))
    }
}
