//! Centralized configuration for the blob backend.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - BlobConfig::from_env() reads ATOLL_* variables; fluent with_* setters
//!   override specific fields for embedding code and tests.
//!
//! The recovery driver has its own RecoveryConfig (see recovery::context),
//! built from CLI options rather than the environment.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::consts::{DATA_FILE, DEFAULT_INDEX_SHARDS, HISTORY_FILE};

/// Top-level configuration for a blob backend instance.
#[derive(Clone, Debug)]
pub struct BlobConfig {
    /// Directory holding the `data` and `history` log files.
    pub root: PathBuf,

    /// Block alignment for the data log, bytes. 0 disables padding.
    /// Env: ATOLL_DATA_BLOCK_SIZE (default 0)
    pub data_block_size: u64,

    /// Block alignment for the history log, bytes. 0 disables padding.
    /// Env: ATOLL_HISTORY_BLOCK_SIZE (default 0)
    pub history_block_size: u64,

    /// Whether to fsync the log descriptor after every append.
    /// Env: ATOLL_SYNC (default false; "1|true|on|yes" => true)
    pub sync: bool,

    /// Number of index shards (lock granularity).
    /// Env: ATOLL_INDEX_SHARDS (default 16)
    pub index_shards: usize,
}

impl BlobConfig {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            data_block_size: 0,
            history_block_size: 0,
            sync: false,
            index_shards: DEFAULT_INDEX_SHARDS,
        }
    }

    /// Load tunables from environment variables on top of defaults.
    pub fn from_env<P: AsRef<Path>>(root: P) -> Self {
        let mut cfg = Self::new(root);

        if let Ok(v) = std::env::var("ATOLL_DATA_BLOCK_SIZE") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.data_block_size = n;
            }
        }

        if let Ok(v) = std::env::var("ATOLL_HISTORY_BLOCK_SIZE") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.history_block_size = n;
            }
        }

        if let Ok(v) = std::env::var("ATOLL_SYNC") {
            let s = v.trim().to_ascii_lowercase();
            cfg.sync = s == "1" || s == "true" || s == "on" || s == "yes";
        }

        if let Ok(v) = std::env::var("ATOLL_INDEX_SHARDS") {
            if let Ok(n) = v.trim().parse::<usize>() {
                if n > 0 {
                    cfg.index_shards = n;
                }
            }
        }

        cfg
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_data_block_size(mut self, bsize: u64) -> Self {
        self.data_block_size = bsize;
        self
    }

    pub fn with_history_block_size(mut self, bsize: u64) -> Self {
        self.history_block_size = bsize;
        self
    }

    pub fn with_sync(mut self, on: bool) -> Self {
        self.sync = on;
        self
    }

    pub fn with_index_shards(mut self, shards: usize) -> Self {
        self.index_shards = shards.max(1);
        self
    }

    pub fn data_path(&self) -> PathBuf {
        self.root.join(DATA_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join(HISTORY_FILE)
    }
}

impl fmt::Display for BlobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlobConfig {{ root: {}, data_block_size: {}, history_block_size: {}, sync: {}, index_shards: {} }}",
            self.root.display(),
            self.data_block_size,
            self.history_block_size,
            self.sync,
            self.index_shards,
        )
    }
}
