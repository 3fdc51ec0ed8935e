//! Merge recovery — rebalance внутри одного кольца.
//!
//! После смены топологии узел держит ключи, чьи диапазоны теперь
//! принадлежат другим узлам группы. План: по route table перечислить
//! диапазоны группы локального узла, на каждый чужой диапазон — work unit.
//! Юнит: отитерировать локальный узел и владельца по диапазону, разница
//! (локальный отсутствует у владельца или локально новее) уезжает
//! владельцу; при safe == false локальная копия удаляется после записи.

use anyhow::{anyhow, Result};
use log::{debug, info};

use super::client::NodeClient;
use super::context::Context;
use super::diff::merge_diff;
use super::monitor::Counter;
use super::route::RouteTable;
use super::record::IterRecord;
use super::scratch::{diff_path, iterator_path, RecordReader, RecordWriter};
use super::transfer::transfer_merge;
use super::unit::{UnitKind, UnitState, WorkUnit};
use super::RecoveryType;

pub struct MergeCoordinator;

impl MergeCoordinator {
    /// Enumerate work units: every range of the local node's ring that is
    /// owned by somebody else.
    pub fn plan(ctx: &Context, route: &RouteTable) -> Result<Vec<WorkUnit>> {
        let local = &ctx.cfg.remote;
        let group = route
            .group_of(local)
            .ok_or_else(|| anyhow!("node {} not present in route table", local))?;

        if !ctx.cfg.groups.is_empty() && !ctx.cfg.groups.contains(&group) {
            info!(
                "merge: node {} group {} excluded by -g, nothing to do",
                local, group
            );
            return Ok(Vec::new());
        }

        let mut units = Vec::new();
        for (range, owner) in route.ranges(group) {
            if owner.addr == *local {
                continue;
            }
            units.push(WorkUnit {
                index: units.len(),
                group,
                start: range.start,
                end: range.end,
                kind: UnitKind::Merge {
                    remote: owner.addr.clone(),
                },
            });
        }

        info!(
            "merge: node {} group {}: {} work units",
            local,
            group,
            units.len()
        );
        Ok(units)
    }

    /// Run one unit through ITERATING -> DIFFING -> TRANSFERRING.
    pub fn run_unit(
        ctx: &Context,
        client: &dyn NodeClient,
        unit: &WorkUnit,
        state: &mut UnitState,
    ) -> Result<()> {
        let UnitKind::Merge { remote } = &unit.kind else {
            return Err(anyhow!("unit {} is not a merge unit", unit.index));
        };
        let local = &ctx.cfg.remote;
        let range = unit.range();
        let tmp = &ctx.cfg.tmp_dir;

        *state = UnitState::Iterating;
        let local_path = iterator_path(tmp, local, unit.index);
        let mut w = RecordWriter::create(&local_path)?;
        let n_local = client.iterate(local, unit.group, &range, 0, &mut |rec| w.write(&rec))?;
        w.finish()?;

        let remote_path = iterator_path(tmp, remote, unit.index);
        let mut w = RecordWriter::create(&remote_path)?;
        let n_remote = client.iterate(remote, unit.group, &range, 0, &mut |rec| w.write(&rec))?;
        w.finish()?;

        ctx.monitor
            .add(RecoveryType::Merge, Counter::IteratedKeys, n_local + n_remote);

        *state = UnitState::Diffing;
        let local_recs = RecordReader::open(&local_path)?.read_all()?;
        let remote_recs = RecordReader::open(&remote_path)?.read_all()?;
        let items = merge_diff(&local_recs, &remote_recs, ctx.cfg.since);
        ctx.monitor
            .add(RecoveryType::Merge, Counter::DiffKeys, items.len() as u64);

        // transfer set lands in a diff_ scratch file for post-mortem reads
        let diff_file = diff_path(tmp, remote, unit.index);
        let mut w = RecordWriter::create(&diff_file)?;
        for item in &items {
            w.write(&IterRecord {
                id: item.id,
                size: item.size,
                tsec: item.tsec,
                flags: 0,
            })?;
        }
        w.finish()?;

        debug!(
            "merge: unit {}: {} local, {} remote, {} to transfer",
            unit.index,
            n_local,
            n_remote,
            items.len()
        );

        *state = UnitState::Transferring;
        let stats = transfer_merge(
            client,
            local,
            remote,
            &items,
            ctx.cfg.batch_size,
            ctx.cfg.dry_run,
            ctx.cfg.safe,
        )?;
        ctx.monitor
            .add(RecoveryType::Merge, Counter::TransferredKeys, stats.keys);
        ctx.monitor
            .add(RecoveryType::Merge, Counter::TransferredBytes, stats.bytes);
        ctx.monitor
            .add(RecoveryType::Merge, Counter::FailedKeys, stats.failed);

        // per-unit scratch is consumed; drop it early
        std::fs::remove_file(&local_path).ok();
        std::fs::remove_file(&remote_path).ok();
        std::fs::remove_file(&diff_file).ok();

        *state = UnitState::Done;
        Ok(())
    }
}
