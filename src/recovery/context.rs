//! RecoveryConfig + Context — parsed configuration and shared handles.
//!
//! Context::new — путь координатора: готовит tmp dir (`%TYPE%` уже
//! подставлен при разборе CLI), берёт эксклюзивный lock (fail-fast),
//! выметает старый scratch и открывает monitor. Всё это Fatal-территория:
//! ошибка здесь прерывает запуск до каких-либо мутаций.
//!
//! Context::attach — путь воркера-подпроцесса: тот же tmp dir и monitor,
//! без lock и без cleanup (ими владеет родитель).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_BATCH_SIZE, DEFAULT_LOCK_FILE};
use crate::lock::{try_acquire_exclusive_lock, LockGuard};

use super::monitor::Monitor;
use super::scratch::cleanup_scratch;
use super::RecoveryType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub rtype: RecoveryType,
    /// Bootstrap node, host:port (family already stripped).
    pub remote: String,
    /// Restrict to these groups; empty = all groups in the route table.
    pub groups: Vec<u32>,
    pub batch_size: usize,
    pub nprocess: usize,
    /// Minimal timestamp (epoch seconds); 0 disables the window filter.
    pub since: u64,
    pub tmp_dir: PathBuf,
    pub lock_file: String,
    pub dry_run: bool,
    pub safe: bool,
    pub wait_timeout_secs: u64,
}

impl RecoveryConfig {
    pub fn new(rtype: RecoveryType, remote: &str, tmp_dir: PathBuf) -> Self {
        Self {
            rtype,
            remote: remote.to_string(),
            groups: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            nprocess: 1,
            since: 0,
            tmp_dir,
            lock_file: DEFAULT_LOCK_FILE.to_string(),
            dry_run: false,
            safe: false,
            wait_timeout_secs: 3600,
        }
    }
}

pub struct Context {
    pub cfg: RecoveryConfig,
    pub monitor: Arc<Monitor>,
    _lock: Option<LockGuard>,
}

impl Context {
    /// Coordinator path: prepare tmp dir, take the advisory lock, sweep
    /// stale scratch, open the monitor.
    pub fn new(cfg: RecoveryConfig) -> Result<Self> {
        std::fs::create_dir_all(&cfg.tmp_dir)
            .with_context(|| format!("create tmp dir {}", cfg.tmp_dir.display()))?;

        let lock_path = cfg.tmp_dir.join(&cfg.lock_file);
        let lock = try_acquire_exclusive_lock(&lock_path)?;

        cleanup_scratch(&cfg.tmp_dir)?;

        let monitor = Arc::new(Monitor::open(&cfg.tmp_dir)?);
        monitor.reset();

        Ok(Self {
            cfg,
            monitor,
            _lock: Some(lock),
        })
    }

    /// Worker path: reuse the parent's tmp dir and monitor, no lock.
    pub fn attach(cfg: RecoveryConfig) -> Result<Self> {
        let monitor = Arc::new(Monitor::open(&cfg.tmp_dir)?);
        Ok(Self {
            cfg,
            monitor,
            _lock: None,
        })
    }
}
