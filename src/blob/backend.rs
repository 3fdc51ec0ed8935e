//! BlobBackend — открытие/rebuild, command dispatch, DEL/STAT, iterate_range.
//!
//! Backend пассивно реентерабелен: транспорт владеет пулом потоков и зовёт
//! handle() из любого из них. Все failure ловятся на границе команды и
//! транслируются транспортом в отрицательный wire-статус
//! (BlobError::wire_status).

use std::fs::OpenOptions;

use anyhow::{Context, Result};
use log::info;

use crate::config::BlobConfig;
use crate::consts::{
    CMD_DEL, CMD_LIST, CMD_READ, CMD_STAT, CMD_WRITE, DISK_CTL_SIZE, HISTORY_ENTRY_SIZE,
    ID_SIZE, IO_ATTR_SIZE, IO_FLAGS_APPEND, KIND_DATA,
};
use crate::errors::{BlobError, BlobResult};
use crate::metrics::{record_delete, record_rebuild, record_removed_mark};
use crate::recovery::record::IterRecord;
use crate::util::short_id;

use super::disk::{DiskControl, HistoryEntry, IoAttr};
use super::index::Index;
use super::log::AppendLog;
use super::scan::LogScanner;
use super::{composite_key, Id, IdRange, Kind};

/// Hook combining the prior history blob (header stripped) with the new
/// payload. The default appends when IO_FLAGS_APPEND is set and replaces
/// otherwise; ring nodes install their own to fold metadata updates in.
pub type MetaProcessor = dyn Fn(&IoAttr, Vec<u8>, &[u8]) -> BlobResult<Vec<u8>> + Send + Sync;

/// Backend-provided STAT delegate.
pub trait StatProvider: Send + Sync {
    fn stat(&self, backend: &BlobBackend) -> BlobResult<BlobStat>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobStat {
    pub data_size: u64,
    pub history_size: u64,
    pub keys: u64,
}

/// Reply of a dispatched command.
#[derive(Debug)]
pub enum Reply {
    Ok,
    Written { offset: u64, on_disk_size: u64 },
    Data(Vec<u8>),
    /// Zero-copy path: the transport streams `size` bytes from the
    /// backing log descriptor at `offset`.
    Streamed { kind: Kind, offset: u64, size: u64 },
    Stat(BlobStat),
}

pub struct BlobBackend {
    cfg: BlobConfig,
    log: AppendLog,
    index: Index,
    meta: Box<MetaProcessor>,
    stat_provider: Option<Box<dyn StatProvider>>,
}

fn default_process_meta(io: &IoAttr, mut old: Vec<u8>, payload: &[u8]) -> BlobResult<Vec<u8>> {
    if io.flags & IO_FLAGS_APPEND != 0 {
        old.try_reserve(payload.len())
            .map_err(|_| BlobError::OutOfMemory(payload.len()))?;
        old.extend_from_slice(payload);
        Ok(old)
    } else {
        Ok(payload.to_vec())
    }
}

impl BlobBackend {
    /// Open (creating if necessary) the data/history logs and rebuild the
    /// index by scanning both files from offset 0.
    pub fn open(cfg: BlobConfig) -> Result<Self> {
        if !cfg.root.exists() {
            std::fs::create_dir_all(&cfg.root)
                .with_context(|| format!("create blob root {}", cfg.root.display()))?;
        }

        let open_rw = |path: &std::path::Path| -> Result<std::fs::File> {
            OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))
        };

        // REMOVED flips happen in place, so even the scan path needs rw.
        let data = open_rw(&cfg.data_path())?;
        let history = open_rw(&cfg.history_path())?;

        let index = Index::new(cfg.index_shards);

        let data_tail = rebuild_from(&data, cfg.data_block_size, Kind::Data, &index)
            .context("data log iteration failed")?;
        let history_tail = rebuild_from(&history, cfg.history_block_size, Kind::History, &index)
            .context("history log iteration failed")?;

        info!(
            "blob: opened {}: {} keys, data tail {}, history tail {}",
            cfg.root.display(),
            index.len(),
            data_tail,
            history_tail
        );

        let log = AppendLog::new(
            data,
            history,
            data_tail,
            history_tail,
            cfg.data_block_size,
            cfg.history_block_size,
            cfg.sync,
        );

        Ok(Self {
            cfg,
            log,
            index,
            meta: Box::new(default_process_meta),
            stat_provider: None,
        })
    }

    pub fn config(&self) -> &BlobConfig {
        &self.cfg
    }

    #[inline]
    pub(crate) fn log(&self) -> &AppendLog {
        &self.log
    }

    #[inline]
    pub(crate) fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Index lookup for (id, kind); None when the key is absent.
    pub fn lookup(&self, id: &Id, kind: Kind) -> Option<super::index::RamControl> {
        self.index.lookup(&composite_key(id, kind))
    }

    pub fn tail(&self, kind: Kind) -> u64 {
        self.log.tail(kind)
    }

    /// Install a custom history meta processor.
    pub fn set_meta_processor(&mut self, meta: Box<MetaProcessor>) {
        self.meta = meta;
    }

    /// Install a STAT delegate.
    pub fn set_stat_provider(&mut self, provider: Box<dyn StatProvider>) {
        self.stat_provider = Some(provider);
    }

    pub(crate) fn process_meta(
        &self,
        io: &IoAttr,
        old: Vec<u8>,
        payload: &[u8],
    ) -> BlobResult<Vec<u8>> {
        (self.meta)(io, old, payload)
    }

    /// Dispatch one wire command. `data` starts with the IoAttr for
    /// WRITE/READ/DEL; WRITE carries the payload right after it.
    /// `reply_capacity` is the caller's destination buffer size for READ
    /// (0 selects the streaming reply).
    pub fn handle(&self, cmd: u32, data: &[u8], reply_capacity: usize) -> BlobResult<Reply> {
        match cmd {
            CMD_WRITE => {
                let io = IoAttr::decode(data)?;
                let payload = &data[IO_ATTR_SIZE..];
                let (offset, on_disk_size) = self.write(&io, payload)?;
                Ok(Reply::Written {
                    offset,
                    on_disk_size,
                })
            }
            CMD_READ => {
                let io = IoAttr::decode(data)?;
                self.read(&io, reply_capacity)
            }
            CMD_DEL => {
                let io = IoAttr::decode(data)?;
                self.del(&io)?;
                Ok(Reply::Ok)
            }
            CMD_STAT => Ok(Reply::Stat(self.stat()?)),
            CMD_LIST => Err(BlobError::Unsupported("LIST")),
            other => Err(BlobError::InvalidArgument(format!(
                "unknown command code {}",
                other
            ))),
        }
    }

    /// Unlink from the index and tombstone the on-disk record in place.
    pub fn del(&self, io: &IoAttr) -> BlobResult<()> {
        let kind = io.kind();
        let key = composite_key(&io.origin, kind);

        let Some(ctl) = self.index.erase(&key) else {
            return Err(BlobError::NotFound);
        };

        let mut hdr = [0u8; DISK_CTL_SIZE];
        self.log.read_at(kind, ctl.offset, &mut hdr)?;
        let mut dctl = DiskControl::decode(&hdr)?;
        dctl.mark_removed();
        self.log.overwrite_header(kind, ctl.offset, &dctl)?;

        record_delete();
        record_removed_mark();
        log::debug!(
            "blob: {}: removed: position {}, on-disk {}",
            short_id(&io.origin),
            ctl.offset,
            ctl.size
        );
        Ok(())
    }

    pub fn stat(&self) -> BlobResult<BlobStat> {
        if let Some(p) = &self.stat_provider {
            return p.stat(self);
        }
        Ok(BlobStat {
            data_size: self.log.tail(Kind::Data),
            history_size: self.log.tail(Kind::History),
            keys: self.index.len() as u64,
        })
    }

    /// Serving side of the recovery iterator: live data keys within the
    /// ring range, each with its exact stored size and the timestamp of
    /// its newest history entry, sorted by id. `since > 0` drops keys
    /// whose newest timestamp is older.
    pub fn iterate_range(&self, range: &IdRange, since: u64) -> BlobResult<Vec<IterRecord>> {
        let mut keys: Vec<(Id, u64)> = Vec::new();
        self.index.for_each(|key, ctl| {
            if key[ID_SIZE] != KIND_DATA {
                return;
            }
            let mut id = [0u8; ID_SIZE];
            id.copy_from_slice(&key[..ID_SIZE]);
            if range.contains(&id) {
                keys.push((id, ctl.offset));
            }
        });

        let mut out = Vec::with_capacity(keys.len());
        for (id, offset) in keys {
            let mut hdr = [0u8; DISK_CTL_SIZE];
            self.log.read_at(Kind::Data, offset, &mut hdr)?;
            let dctl = DiskControl::decode(&hdr)?;
            if dctl.is_removed() {
                continue;
            }

            let tsec = self.newest_history_tsec(&id)?;
            if since > 0 && tsec < since {
                continue;
            }

            out.push(IterRecord {
                id,
                size: dctl.size,
                tsec,
                flags: 0,
            });
        }

        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Timestamp of the newest history entry for `id`, 0 when the key has
    /// no history chain. The chain blob is a concatenation of fixed-size
    /// entries, newest last.
    fn newest_history_tsec(&self, id: &Id) -> BlobResult<u64> {
        let hkey = composite_key(id, Kind::History);
        let Some(hctl) = self.index.lookup(&hkey) else {
            return Ok(0);
        };

        let mut hdr = [0u8; DISK_CTL_SIZE];
        self.log.read_at(Kind::History, hctl.offset, &mut hdr)?;
        let dctl = DiskControl::decode(&hdr)?;
        if dctl.size < HISTORY_ENTRY_SIZE as u64 {
            return Ok(0);
        }

        let last_off =
            hctl.offset + DISK_CTL_SIZE as u64 + dctl.size - HISTORY_ENTRY_SIZE as u64;
        let mut ebuf = [0u8; HISTORY_ENTRY_SIZE];
        self.log.read_at(Kind::History, last_off, &mut ebuf)?;
        Ok(HistoryEntry::decode(&ebuf)?.tsec)
    }
}

/// Sequential scan of one log: skip tombstones, let later records
/// supersede earlier ones, stop at a truncated tail. Returns the final
/// scanned offset — the new tail.
fn rebuild_from(file: &std::fs::File, bsize: u64, kind: Kind, index: &Index) -> Result<u64> {
    let mut scanner = LogScanner::new(file, bsize)?;
    let mut records = 0u64;
    let mut tombstones = 0u64;

    while let Some(rec) = scanner.read_next()? {
        if rec.ctl.is_removed() {
            tombstones += 1;
            continue;
        }
        records += 1;
        index.insert_or_replace(
            composite_key(&rec.ctl.id, kind),
            super::index::RamControl {
                offset: rec.offset,
                size: rec.on_disk_size,
            },
        );
    }

    record_rebuild(records, tombstones);
    Ok(scanner.final_offset())
}
