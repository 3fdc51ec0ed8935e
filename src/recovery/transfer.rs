//! Transfer phase: batched bulk-read/bulk-write между узлами.
//!
//! Ключи группируются пачками batch_size (default 1024). Dry-run считает
//! объём без единого RPC. Для merge при safe == false источнику после
//! успешной записи уходит bulk-delete. Ключ, который источник не смог
//! отдать (исчез между iterate и transfer), попадает в failed.

use std::collections::HashMap;

use anyhow::Result;
use log::debug;

use crate::blob::Id;

use super::client::NodeClient;
use super::diff::{DcTransfer, TransferItem};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub keys: u64,
    pub bytes: u64,
    pub failed: u64,
}

/// Merge transfer: push `items` from `src` (the node holding misplaced
/// keys) to `dst` (the range owner).
pub fn transfer_merge(
    client: &dyn NodeClient,
    src: &str,
    dst: &str,
    items: &[TransferItem],
    batch_size: usize,
    dry_run: bool,
    safe: bool,
) -> Result<TransferStats> {
    let mut stats = TransferStats::default();
    let batch = batch_size.max(1);

    for chunk in items.chunks(batch) {
        if dry_run {
            stats.keys += chunk.len() as u64;
            stats.bytes += chunk.iter().map(|i| i.size).sum::<u64>();
            continue;
        }

        let keys: Vec<Id> = chunk.iter().map(|i| i.id).collect();
        let read = client.bulk_read(src, &keys)?;
        stats.failed += (keys.len() - read.len()) as u64;
        if read.is_empty() {
            continue;
        }

        let bytes = client.bulk_write(dst, &read)?;
        stats.keys += read.len() as u64;
        stats.bytes += bytes;

        if !safe {
            let moved: Vec<Id> = read.iter().map(|i| i.id).collect();
            client.bulk_delete(src, &moved)?;
        }

        debug!(
            "transfer: {} -> {}: batch of {} keys, {} bytes",
            src,
            dst,
            read.len(),
            bytes
        );
    }

    Ok(stats)
}

/// Dc transfer: replay each winner to its stale replicas. Transfers are
/// grouped by (source, destination) pair before batching; one instruction
/// with several destinations counts per destination write.
pub fn transfer_dc(
    client: &dyn NodeClient,
    addrs: &[String],
    transfers: &[DcTransfer],
    batch_size: usize,
    dry_run: bool,
) -> Result<TransferStats> {
    let mut stats = TransferStats::default();
    let batch = batch_size.max(1);

    let mut by_pair: HashMap<(usize, usize), Vec<&DcTransfer>> = HashMap::new();
    for t in transfers {
        for &d in &t.dst {
            by_pair.entry((t.src, d)).or_default().push(t);
        }
    }

    let mut pairs: Vec<_> = by_pair.into_iter().collect();
    pairs.sort_by_key(|((s, d), _)| (*s, *d));

    for ((src, dst), items) in pairs {
        let src_addr = &addrs[src];
        let dst_addr = &addrs[dst];

        for chunk in items.chunks(batch) {
            if dry_run {
                stats.keys += chunk.len() as u64;
                stats.bytes += chunk.iter().map(|t| t.size).sum::<u64>();
                continue;
            }

            let keys: Vec<Id> = chunk.iter().map(|t| t.id).collect();
            let read = client.bulk_read(src_addr, &keys)?;
            stats.failed += (keys.len() - read.len()) as u64;
            if read.is_empty() {
                continue;
            }

            let bytes = client.bulk_write(dst_addr, &read)?;
            stats.keys += read.len() as u64;
            stats.bytes += bytes;

            debug!(
                "transfer: {} -> {}: batch of {} keys, {} bytes",
                src_addr,
                dst_addr,
                read.len(),
                bytes
            );
        }
    }

    Ok(stats)
}
