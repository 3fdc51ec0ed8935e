//! Lightweight global metrics for the blob backend.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Append log (записи, байты, padding)
//! - Read path (чтения, not-found)
//! - History chain (rewrites, tombstone marks)
//! - Index rebuild at startup
//!
//! Cross-process recovery counters live elsewhere (recovery::monitor);
//! these are per-process and reset with it.

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Append log -----
static BLOB_APPENDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static BLOB_BYTES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static BLOB_PAD_BYTES: AtomicU64 = AtomicU64::new(0);

// ----- Read path -----
static BLOB_READS_TOTAL: AtomicU64 = AtomicU64::new(0);
static BLOB_READ_BYTES: AtomicU64 = AtomicU64::new(0);
static BLOB_NOT_FOUND: AtomicU64 = AtomicU64::new(0);

// ----- History chain -----
static BLOB_HISTORY_REWRITES: AtomicU64 = AtomicU64::new(0);
static BLOB_REMOVED_MARKS: AtomicU64 = AtomicU64::new(0);

// ----- Deletes -----
static BLOB_DELETES: AtomicU64 = AtomicU64::new(0);

// ----- Index rebuild -----
static INDEX_REBUILD_RECORDS: AtomicU64 = AtomicU64::new(0);
static INDEX_REBUILD_TOMBSTONES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub blob_appends_total: u64,
    pub blob_bytes_written: u64,
    pub blob_pad_bytes: u64,

    pub blob_reads_total: u64,
    pub blob_read_bytes: u64,
    pub blob_not_found: u64,

    pub blob_history_rewrites: u64,
    pub blob_removed_marks: u64,

    pub blob_deletes: u64,

    pub index_rebuild_records: u64,
    pub index_rebuild_tombstones: u64,
}

impl MetricsSnapshot {
    pub fn avg_record_bytes(&self) -> f64 {
        if self.blob_appends_total == 0 {
            0.0
        } else {
            self.blob_bytes_written as f64 / self.blob_appends_total as f64
        }
    }
}

// ----- Recorders -----

pub fn record_append(total_bytes: u64, pad_bytes: u64) {
    BLOB_APPENDS_TOTAL.fetch_add(1, Ordering::Relaxed);
    BLOB_BYTES_WRITTEN.fetch_add(total_bytes, Ordering::Relaxed);
    BLOB_PAD_BYTES.fetch_add(pad_bytes, Ordering::Relaxed);
}

pub fn record_read(bytes: u64) {
    BLOB_READS_TOTAL.fetch_add(1, Ordering::Relaxed);
    BLOB_READ_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

pub fn record_not_found() {
    BLOB_NOT_FOUND.fetch_add(1, Ordering::Relaxed);
}

pub fn record_history_rewrite() {
    BLOB_HISTORY_REWRITES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_removed_mark() {
    BLOB_REMOVED_MARKS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_delete() {
    BLOB_DELETES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_rebuild(records: u64, tombstones: u64) {
    INDEX_REBUILD_RECORDS.fetch_add(records, Ordering::Relaxed);
    INDEX_REBUILD_TOMBSTONES.fetch_add(tombstones, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        blob_appends_total: BLOB_APPENDS_TOTAL.load(Ordering::Relaxed),
        blob_bytes_written: BLOB_BYTES_WRITTEN.load(Ordering::Relaxed),
        blob_pad_bytes: BLOB_PAD_BYTES.load(Ordering::Relaxed),

        blob_reads_total: BLOB_READS_TOTAL.load(Ordering::Relaxed),
        blob_read_bytes: BLOB_READ_BYTES.load(Ordering::Relaxed),
        blob_not_found: BLOB_NOT_FOUND.load(Ordering::Relaxed),

        blob_history_rewrites: BLOB_HISTORY_REWRITES.load(Ordering::Relaxed),
        blob_removed_marks: BLOB_REMOVED_MARKS.load(Ordering::Relaxed),

        blob_deletes: BLOB_DELETES.load(Ordering::Relaxed),

        index_rebuild_records: INDEX_REBUILD_RECORDS.load(Ordering::Relaxed),
        index_rebuild_tombstones: INDEX_REBUILD_TOMBSTONES.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    BLOB_APPENDS_TOTAL.store(0, Ordering::Relaxed);
    BLOB_BYTES_WRITTEN.store(0, Ordering::Relaxed);
    BLOB_PAD_BYTES.store(0, Ordering::Relaxed);

    BLOB_READS_TOTAL.store(0, Ordering::Relaxed);
    BLOB_READ_BYTES.store(0, Ordering::Relaxed);
    BLOB_NOT_FOUND.store(0, Ordering::Relaxed);

    BLOB_HISTORY_REWRITES.store(0, Ordering::Relaxed);
    BLOB_REMOVED_MARKS.store(0, Ordering::Relaxed);

    BLOB_DELETES.store(0, Ordering::Relaxed);

    INDEX_REBUILD_RECORDS.store(0, Ordering::Relaxed);
    INDEX_REBUILD_TOMBSTONES.store(0, Ordering::Relaxed);
}
