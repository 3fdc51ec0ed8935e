//! Последовательный скан лог-файла: rebuild индекса при старте.
//!
//! Поведение:
//! - Читает DiskControl на текущей позиции; если заголовок или payload
//!   выходит за длину файла — стоп (обрезанный хвост после краха),
//!   Ok(None) как EOF.
//! - REMOVED-записи тоже возвращаются: решение «пропустить» принимает
//!   вызывающий код (rebuild пропускает, офлайн-тулинг может смотреть).
//! - final_offset() после EOF — новое значение tail.
//!
//! Использование:
//!   let mut s = LogScanner::new(&file, bsize)?;
//!   while let Some(rec) = s.read_next()? { ... }
//!   let tail = s.final_offset();

use std::fs::File;
use std::os::unix::fs::FileExt;

use anyhow::{anyhow, Result};

use crate::consts::DISK_CTL_SIZE;

use super::disk::DiskControl;

/// One record located by a sequential scan.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub ctl: DiskControl,
    /// File offset of the record header.
    pub offset: u64,
    /// Header + payload + alignment padding.
    pub on_disk_size: u64,
}

pub struct LogScanner<'a> {
    file: &'a File,
    bsize: u64,
    pos: u64,
    len: u64,
}

impl<'a> LogScanner<'a> {
    pub fn new(file: &'a File, bsize: u64) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            bsize,
            pos: 0,
            len,
        })
    }

    /// Final scanned offset: the tail after the last complete record.
    pub fn final_offset(&self) -> u64 {
        self.pos
    }

    pub fn read_next(&mut self) -> Result<Option<ScanRecord>> {
        if self.pos + (DISK_CTL_SIZE as u64) > self.len {
            return Ok(None);
        }

        let mut hdr = [0u8; DISK_CTL_SIZE];
        self.file
            .read_exact_at(&mut hdr, self.pos)
            .map_err(|e| anyhow!("log scan: read header at {}: {}", self.pos, e))?;
        let ctl = DiskControl::decode(&hdr)?;

        let mut total = DISK_CTL_SIZE as u64 + ctl.size;
        if self.bsize > 0 {
            let rem = total % self.bsize;
            if rem != 0 {
                total += self.bsize - rem;
            }
        }

        // Truncated tail: the header promises more bytes than the file has.
        if self.pos + total > self.len {
            return Ok(None);
        }

        let rec = ScanRecord {
            ctl,
            offset: self.pos,
            on_disk_size: total,
        };
        self.pos += total;
        Ok(Some(rec))
    }
}
