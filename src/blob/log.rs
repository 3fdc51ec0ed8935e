//! AppendLog — два append-only файла (data + history) с независимыми tails.
//!
//! Инварианты:
//! - Один mutex покрывает продвижение обоих tails и сами записи: байты двух
//!   конкурентных append'ов не перемешиваются.
//! - Tail публикуется только после того, как весь буфер записан; при любой
//!   ошибке tail не двигается.
//! - При ненулевом block size запись дополняется нулями до кратного размера;
//!   padding входит в on-disk size.
//!
//! Positional I/O (`FileExt::{read_exact_at, write_all_at}`) — чтения не
//! трогают tail и не требуют seek-координации с писателями.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::Mutex;

use crate::consts::DISK_CTL_SIZE;
use crate::errors::{BlobError, BlobResult};
use crate::metrics::record_append;

use super::disk::DiskControl;
use super::Kind;

// Zero-fill helper buffer for alignment padding.
const ZERO_CHUNK: [u8; 4096] = [0u8; 4096];

struct Tails {
    data: u64,
    history: u64,
}

pub struct AppendLog {
    data: File,
    history: File,
    data_bsize: u64,
    history_bsize: u64,
    sync: bool,
    tails: Mutex<Tails>,
}

impl AppendLog {
    /// Assemble from already-opened descriptors and scanned tails
    /// (the backend scans both files before constructing the log).
    pub fn new(
        data: File,
        history: File,
        data_tail: u64,
        history_tail: u64,
        data_bsize: u64,
        history_bsize: u64,
        sync: bool,
    ) -> Self {
        Self {
            data,
            history,
            data_bsize,
            history_bsize,
            sync,
            tails: Mutex::new(Tails {
                data: data_tail,
                history: history_tail,
            }),
        }
    }

    #[inline]
    pub fn file(&self, kind: Kind) -> &File {
        match kind {
            Kind::Data => &self.data,
            Kind::History => &self.history,
        }
    }

    #[inline]
    pub fn block_size(&self, kind: Kind) -> u64 {
        match kind {
            Kind::Data => self.data_bsize,
            Kind::History => self.history_bsize,
        }
    }

    pub fn tail(&self, kind: Kind) -> u64 {
        let t = self.tails.lock().unwrap();
        match kind {
            Kind::Data => t.data,
            Kind::History => t.history,
        }
    }

    /// Append one record: header, payload, then zero padding up to the
    /// configured block size. Returns (offset, on_disk_size).
    pub fn append(&self, kind: Kind, ctl: &DiskControl, payload: &[u8]) -> BlobResult<(u64, u64)> {
        let file = self.file(kind);
        let bsize = self.block_size(kind);

        let mut tails = self.tails.lock().unwrap();
        let start = match kind {
            Kind::Data => tails.data,
            Kind::History => tails.history,
        };

        let hdr = ctl.encode();
        let mut offset = start;

        file.write_all_at(&hdr, offset)
            .map_err(|e| BlobError::io(offset, e))?;
        offset += DISK_CTL_SIZE as u64;

        file.write_all_at(payload, offset)
            .map_err(|e| BlobError::io(offset, e))?;
        offset += payload.len() as u64;

        let mut pad = 0u64;
        if bsize > 0 {
            let written = offset - start;
            let rem = written % bsize;
            if rem != 0 {
                pad = bsize - rem;
                let mut left = pad;
                while left > 0 {
                    let chunk = left.min(ZERO_CHUNK.len() as u64) as usize;
                    file.write_all_at(&ZERO_CHUNK[..chunk], offset)
                        .map_err(|e| BlobError::io(offset, e))?;
                    offset += chunk as u64;
                    left -= chunk as u64;
                }
            }
        }

        if self.sync {
            file.sync_data().map_err(|e| BlobError::io(start, e))?;
        }

        let total = offset - start;
        match kind {
            Kind::Data => tails.data = offset,
            Kind::History => tails.history = offset,
        }
        drop(tails);

        record_append(total, pad);
        Ok((start, total))
    }

    /// Positional read; does not touch the tail.
    pub fn read_at(&self, kind: Kind, offset: u64, buf: &mut [u8]) -> BlobResult<()> {
        self.file(kind)
            .read_exact_at(buf, offset)
            .map_err(|e| BlobError::io(offset, e))
    }

    /// Rewrite the header of an existing record in place (REMOVED flip).
    /// Writes exactly one header at `offset`; never resizes the file.
    pub fn overwrite_header(&self, kind: Kind, offset: u64, ctl: &DiskControl) -> BlobResult<()> {
        let hdr = ctl.encode();
        self.file(kind)
            .write_all_at(&hdr, offset)
            .map_err(|e| BlobError::io(offset, e))?;
        if self.sync {
            self.file(kind)
                .sync_data()
                .map_err(|e| BlobError::io(offset, e))?;
        }
        Ok(())
    }
}
