//! Cross-replica recovery engine.
//!
//! Разделение:
//! - record.rs   — iterator wire record (id, size, tsec, flags).
//! - route.rs    — parsed ring membership: RouteTable, ranges, replica sets.
//! - client.rs   — NodeClient trait (transport seam) + framed TCP client.
//! - scratch.rs  — scratch files под tmp dir (iterator_/diff_/merge_).
//! - diff.rs     — merge pairwise diff и dc k-way winner diff.
//! - transfer.rs — batching bulk read/write/delete, dry-run counting.
//! - monitor.rs  — cross-process counters (mmap) + stats.txt + HTTP.
//! - unit.rs     — work unit + state machine, JSON для worker'ов.
//! - merge.rs    — recovery внутри одного кольца (rebalance).
//! - dc.rs       — recovery между кольцами (replica reconciliation).
//! - worker.rs   — fan-out юнитов в подпроцессы, сбор статусов.
//! - context.rs  — RecoveryConfig + Context (tmp dir, lock, monitor).
//!
//! Оба координатора разделяют четыре фазы: plan / iterate / diff /
//! transfer. Transient-ошибки валят только свой work unit; прерывает
//! прогон лишь Fatal (lock, tmp dir, CLI).

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod client;
pub mod context;
pub mod dc;
pub mod diff;
pub mod merge;
pub mod monitor;
pub mod record;
pub mod route;
pub mod scratch;
pub mod transfer;
pub mod unit;
pub mod worker;

pub use client::NodeClient;
pub use context::{Context, RecoveryConfig};
pub use monitor::{Counter, Monitor};
pub use route::{RouteEntry, RouteTable};
pub use unit::{UnitState, WorkUnit};

/// Which recovery flow is running; selects counter rows and the
/// `%TYPE%` tmp-dir substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryType {
    Merge,
    Dc,
}

impl RecoveryType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryType::Merge => "merge",
            RecoveryType::Dc => "dc",
        }
    }
}

impl fmt::Display for RecoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
