//! Monitor — shared counters across worker processes.
//!
//! Счётчики лежат в memory-mapped файле под tmp dir: каждая ячейка — u64,
//! обновляется атомарно (per-counter CAS), так что воркеры-подпроцессы,
//! открыв тот же файл, пишут в те же ячейки без общего лока.
//!
//! Раскладка файла: [type (merge=0, dc=1)] x [counter] x u64 LE-in-memory.
//! На shutdown координатор пишет plain-text снапшот в stats.txt; при
//! заданном порте тот же текст отдаёт пассивный HTTP endpoint.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use memmap2::MmapMut;
use tiny_http::{Header, Response, Server};

use crate::consts::{MONITOR_FILE, STATS_FILE};

use super::RecoveryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    IteratedKeys = 0,
    DiffKeys = 1,
    TransferredKeys = 2,
    TransferredBytes = 3,
    FailedKeys = 4,
    FailedUnits = 5,
}

const COUNTERS: usize = 6;
const TYPES: usize = 2;
const FILE_LEN: usize = TYPES * COUNTERS * 8;

const COUNTER_NAMES: [&str; COUNTERS] = [
    "iterated_keys",
    "diff_keys",
    "transferred_keys",
    "transferred_bytes",
    "failed_keys",
    "failed_units",
];

pub struct Monitor {
    map: MmapMut,
    path: PathBuf,
}

impl Monitor {
    /// Open (creating/resizing as needed) the shared stats file in `dir`.
    /// Every process of one run maps the same file.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(MONITOR_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("open monitor file {}", path.display()))?;
        if file.metadata()?.len() < FILE_LEN as u64 {
            file.set_len(FILE_LEN as u64)
                .with_context(|| format!("resize monitor file {}", path.display()))?;
        }
        let map = unsafe { MmapMut::map_mut(&file) }
            .with_context(|| format!("mmap monitor file {}", path.display()))?;
        Ok(Self { map, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    fn slot(&self, rtype: RecoveryType, counter: Counter) -> &AtomicU64 {
        let row = match rtype {
            RecoveryType::Merge => 0usize,
            RecoveryType::Dc => 1,
        };
        let idx = row * COUNTERS + counter as usize;
        debug_assert!((idx + 1) * 8 <= self.map.len());
        // mmap is page aligned, so 8-byte cells are aligned too.
        unsafe { &*(self.map.as_ptr().add(idx * 8) as *const AtomicU64) }
    }

    pub fn add(&self, rtype: RecoveryType, counter: Counter, delta: u64) {
        self.slot(rtype, counter).fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self, rtype: RecoveryType, counter: Counter) -> u64 {
        self.slot(rtype, counter).load(Ordering::Relaxed)
    }

    /// Zero every counter. The coordinator calls this once per run; the
    /// stats file itself is not a scratch file and survives between runs.
    pub fn reset(&self) {
        for rtype in [RecoveryType::Merge, RecoveryType::Dc] {
            for i in 0..COUNTERS {
                let counter = match i {
                    0 => Counter::IteratedKeys,
                    1 => Counter::DiffKeys,
                    2 => Counter::TransferredKeys,
                    3 => Counter::TransferredBytes,
                    4 => Counter::FailedKeys,
                    _ => Counter::FailedUnits,
                };
                self.slot(rtype, counter).store(0, Ordering::Relaxed);
            }
        }
    }

    /// Plain-text snapshot, one `type.counter: value` line each.
    pub fn snapshot_text(&self) -> String {
        let mut out = String::new();
        for rtype in [RecoveryType::Merge, RecoveryType::Dc] {
            for (i, name) in COUNTER_NAMES.iter().enumerate() {
                let counter = match i {
                    0 => Counter::IteratedKeys,
                    1 => Counter::DiffKeys,
                    2 => Counter::TransferredKeys,
                    3 => Counter::TransferredBytes,
                    4 => Counter::FailedKeys,
                    _ => Counter::FailedUnits,
                };
                out.push_str(&format!(
                    "{}.{}: {}\n",
                    rtype.as_str(),
                    name,
                    self.get(rtype, counter)
                ));
            }
        }
        out
    }

    /// Write stats.txt next to the monitor file. Returns its path.
    pub fn write_stats(&self) -> Result<PathBuf> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("monitor file has no parent dir"))?;
        let path = dir.join(STATS_FILE);
        std::fs::write(&path, self.snapshot_text())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// Passive HTTP endpoint serving the same text as stats.txt. The thread
/// runs until process exit.
pub fn spawn_http(monitor: Arc<Monitor>, port: u16) -> Result<JoinHandle<()>> {
    let addr = format!("0.0.0.0:{}", port);
    let server = Server::http(&addr).map_err(|e| anyhow!("bind http at {}: {}", addr, e))?;
    info!("monitor: listening on {}", addr);

    let handle = std::thread::spawn(move || loop {
        let rq = match server.recv() {
            Ok(rq) => rq,
            Err(e) => {
                warn!("monitor: http recv error: {}", e);
                continue;
            }
        };

        let url = rq.url().to_string();
        if rq.method().as_str() == "GET" && (url == "/" || url == "/stats.txt") {
            let mut resp = Response::from_string(monitor.snapshot_text());
            if let Ok(ct) = Header::from_bytes(b"Content-Type", b"text/plain") {
                resp.add_header(ct);
            }
            let _ = rq.respond(resp);
        } else {
            let _ = rq.respond(Response::from_string("not found\n").with_status_code(404));
        }
    });
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64 as TestCounter, Ordering as TestOrdering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static NEXT_ID: TestCounter = TestCounter::new(1);

    fn unique_dir() -> PathBuf {
        let pid = std::process::id();
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let id = NEXT_ID.fetch_add(1, TestOrdering::Relaxed);
        let dir = std::env::temp_dir().join(format!("atoll-monitor-{pid}-{t}-{id}"));
        std::fs::create_dir_all(&dir).expect("create dir");
        dir
    }

    #[test]
    fn counters_shared_between_handles() {
        let dir = unique_dir();

        let a = Monitor::open(&dir).expect("open a");
        let b = Monitor::open(&dir).expect("open b");

        a.add(RecoveryType::Merge, Counter::IteratedKeys, 5);
        b.add(RecoveryType::Merge, Counter::IteratedKeys, 7);
        b.add(RecoveryType::Dc, Counter::TransferredBytes, 100);

        assert_eq!(a.get(RecoveryType::Merge, Counter::IteratedKeys), 12);
        assert_eq!(a.get(RecoveryType::Dc, Counter::TransferredBytes), 100);
        assert_eq!(a.get(RecoveryType::Dc, Counter::IteratedKeys), 0);

        let text = a.snapshot_text();
        assert!(text.contains("merge.iterated_keys: 12"));
        assert!(text.contains("dc.transferred_bytes: 100"));

        let stats = a.write_stats().expect("stats");
        let body = std::fs::read_to_string(&stats).expect("read stats");
        assert_eq!(body, text);

        std::fs::remove_dir_all(&dir).ok();
    }
}
