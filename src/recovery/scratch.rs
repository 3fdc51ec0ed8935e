//! Scratch files под tmp директорией координатора.
//!
//! Фиксированный набор префиксов: iterator_, diff_, merge_. Всё с этими
//! префиксами можно безопасно удалить на старте — незавершённый прогон
//! оставляет их на месте для следующего cleanup-прохода.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::debug;

use crate::consts::{
    SCRATCH_DIFF_PREFIX, SCRATCH_ITERATOR_PREFIX, SCRATCH_MERGE_PREFIX,
};

use super::record::{IterRecord, ITER_RECORD_SIZE};

/// Remove pre-existing scratch files. Returns how many were dropped.
pub fn cleanup_scratch(dir: &Path) -> Result<usize> {
    let mut removed = 0usize;
    let rd = std::fs::read_dir(dir)
        .with_context(|| format!("read tmp dir {}", dir.display()))?;
    for entry in rd {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(SCRATCH_ITERATOR_PREFIX)
            || name.starts_with(SCRATCH_DIFF_PREFIX)
            || name.starts_with(SCRATCH_MERGE_PREFIX)
        {
            std::fs::remove_file(entry.path())
                .with_context(|| format!("remove scratch {}", entry.path().display()))?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("scratch: removed {} stale files in {}", removed, dir.display());
    }
    Ok(removed)
}

fn sanitize(addr: &str) -> String {
    addr.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// `iterator_<node>_<range>` — stream received from one node for one unit.
pub fn iterator_path(dir: &Path, node_addr: &str, unit: usize) -> PathBuf {
    dir.join(format!(
        "{}{}_{}",
        SCRATCH_ITERATOR_PREFIX,
        sanitize(node_addr),
        unit
    ))
}

/// `diff_<tag>_<range>` — transfer set computed for one unit.
pub fn diff_path(dir: &Path, tag: &str, unit: usize) -> PathBuf {
    dir.join(format!("{}{}_{}", SCRATCH_DIFF_PREFIX, sanitize(tag), unit))
}

/// `merge_units_<n>.json` / `merge_config.json` — worker hand-off files.
pub fn units_path(dir: &Path, worker: usize) -> PathBuf {
    dir.join(format!("{}units_{}.json", SCRATCH_MERGE_PREFIX, worker))
}

pub fn worker_config_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}config.json", SCRATCH_MERGE_PREFIX))
}

// -------------------- Record streams --------------------

pub struct RecordWriter {
    w: BufWriter<File>,
    count: u64,
}

impl RecordWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)
            .with_context(|| format!("create scratch {}", path.display()))?;
        Ok(Self {
            w: BufWriter::new(f),
            count: 0,
        })
    }

    pub fn write(&mut self, rec: &IterRecord) -> Result<()> {
        self.w.write_all(&rec.encode())?;
        self.count += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        self.w.flush()?;
        Ok(self.count)
    }
}

pub struct RecordReader {
    r: BufReader<File>,
    path: PathBuf,
}

impl RecordReader {
    pub fn open(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open scratch {}", path.display()))?;
        Ok(Self {
            r: BufReader::new(f),
            path: path.to_path_buf(),
        })
    }

    /// Ok(None) on clean EOF; a partial record is an error — scratch files
    /// are written locally and flushed before reading.
    pub fn read_next(&mut self) -> Result<Option<IterRecord>> {
        let mut buf = [0u8; ITER_RECORD_SIZE];
        let mut off = 0usize;
        while off < buf.len() {
            let n = self.r.read(&mut buf[off..])?;
            if n == 0 {
                if off == 0 {
                    return Ok(None);
                }
                return Err(anyhow!(
                    "partial iterator record in {} ({} of {} bytes)",
                    self.path.display(),
                    off,
                    ITER_RECORD_SIZE
                ));
            }
            off += n;
        }
        Ok(Some(IterRecord::decode(&buf)?))
    }

    /// Drain the whole stream into memory (diff inputs are per-range and
    /// bounded).
    pub fn read_all(mut self) -> Result<Vec<IterRecord>> {
        let mut out = Vec::new();
        while let Some(rec) = self.read_next()? {
            out.push(rec);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ID_SIZE;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    fn unique_dir(prefix: &str) -> PathBuf {
        let pid = std::process::id();
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("atoll-scratch-{prefix}-{pid}-{t}-{id}"));
        std::fs::create_dir_all(&dir).expect("create dir");
        dir
    }

    fn rec(b: u8, tsec: u64) -> IterRecord {
        let mut id = [0u8; ID_SIZE];
        id[0] = b;
        IterRecord {
            id,
            size: 10,
            tsec,
            flags: 0,
        }
    }

    #[test]
    fn stream_roundtrip_and_cleanup() {
        let dir = unique_dir("rw");
        let path = iterator_path(&dir, "node1:1025", 3);
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("iterator_node1_1025_"));

        let mut w = RecordWriter::create(&path).expect("create");
        w.write(&rec(1, 5)).expect("write");
        w.write(&rec(2, 9)).expect("write");
        assert_eq!(w.finish().expect("finish"), 2);

        let got = RecordReader::open(&path).expect("open").read_all().expect("read");
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], rec(1, 5));
        assert_eq!(got[1], rec(2, 9));

        // cleanup drops only prefixed files
        std::fs::write(dir.join("keepme.txt"), b"x").expect("write");
        let removed = cleanup_scratch(&dir).expect("cleanup");
        assert_eq!(removed, 1);
        assert!(dir.join("keepme.txt").exists());
        assert!(!path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
