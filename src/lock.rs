//! File-based locking for single-coordinator safety.
//!
//! Cross-platform (fs2) advisory locks. The recovery driver takes an
//! exclusive lock on `<tmp>/<lockfile>` before touching scratch state;
//! concurrent invocations fail fast instead of blocking.
//!
//! Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // fs2 unlock errors on drop are ignored deliberately.
        let _ = self.file.unlock();
    }
}

fn open_lock_file(path: &Path) -> Result<std::fs::File> {
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    Ok(f)
}

/// Try to acquire an exclusive lock. Returns Err if another process holds it.
pub fn try_acquire_exclusive_lock(path: &Path) -> Result<LockGuard> {
    let file = open_lock_file(path)?;
    file.try_lock_exclusive().with_context(|| {
        format!(
            "try_lock_exclusive failed (another recovery running?): {}",
            path.display()
        )
    })?;
    Ok(LockGuard {
        file,
        path: path.to_path_buf(),
    })
}
