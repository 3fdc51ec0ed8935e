//! Dc recovery — reconciliation реплик между кольцами.
//!
//! План: кольцо режется по объединению границ всех выбранных групп; на
//! каждый поддиапазон — реплика-сет (по одному владельцу из каждой
//! группы) и work unit. Юнит: отитерировать все реплики, k-way diff с
//! выбором победителя (timestamp, затем size, затем младший адрес),
//! победитель реплицируется на отставшие реплики.

use anyhow::{anyhow, Result};
use log::{debug, info};

use super::client::NodeClient;
use super::context::Context;
use super::diff::dc_diff;
use super::monitor::Counter;
use super::route::RouteTable;
use super::record::IterRecord;
use super::scratch::{diff_path, iterator_path, RecordReader, RecordWriter};
use super::transfer::transfer_dc;
use super::unit::{UnitKind, UnitState, WorkUnit};
use super::RecoveryType;

pub struct DcCoordinator;

impl DcCoordinator {
    /// Enumerate (range, replica-set) tuples across the selected groups.
    pub fn plan(ctx: &Context, route: &RouteTable) -> Result<Vec<WorkUnit>> {
        let groups = if ctx.cfg.groups.is_empty() {
            route.groups()
        } else {
            ctx.cfg.groups.clone()
        };
        if groups.len() < 2 {
            return Err(anyhow!(
                "dc recovery needs at least two groups, got {:?}",
                groups
            ));
        }

        let mut units = Vec::new();
        for (range, replicas) in route.replica_sets(&groups) {
            if replicas.len() < 2 {
                continue;
            }
            units.push(WorkUnit {
                index: units.len(),
                group: replicas[0].0,
                start: range.start,
                end: range.end,
                kind: UnitKind::Dc { replicas },
            });
        }

        info!("dc: groups {:?}: {} work units", groups, units.len());
        Ok(units)
    }

    pub fn run_unit(
        ctx: &Context,
        client: &dyn NodeClient,
        unit: &WorkUnit,
        state: &mut UnitState,
    ) -> Result<()> {
        let UnitKind::Dc { replicas } = &unit.kind else {
            return Err(anyhow!("unit {} is not a dc unit", unit.index));
        };
        let range = unit.range();
        let tmp = &ctx.cfg.tmp_dir;

        *state = UnitState::Iterating;
        let mut paths = Vec::with_capacity(replicas.len());
        let mut iterated = 0u64;
        for (group, addr) in replicas {
            let path = iterator_path(tmp, addr, unit.index);
            let mut w = RecordWriter::create(&path)?;
            iterated += client.iterate(addr, *group, &range, 0, &mut |rec| w.write(&rec))?;
            w.finish()?;
            paths.push(path);
        }
        ctx.monitor
            .add(RecoveryType::Dc, Counter::IteratedKeys, iterated);

        *state = UnitState::Diffing;
        let mut streams = Vec::with_capacity(paths.len());
        for path in &paths {
            streams.push(RecordReader::open(path)?.read_all()?);
        }
        let addrs: Vec<String> = replicas.iter().map(|(_, a)| a.clone()).collect();
        let transfers = dc_diff(&streams, &addrs, ctx.cfg.since);
        ctx.monitor
            .add(RecoveryType::Dc, Counter::DiffKeys, transfers.len() as u64);

        // winners land in a diff_ scratch file for post-mortem reads
        let diff_file = diff_path(tmp, "winners", unit.index);
        let mut w = RecordWriter::create(&diff_file)?;
        for t in &transfers {
            w.write(&IterRecord {
                id: t.id,
                size: t.size,
                tsec: t.tsec,
                flags: 0,
            })?;
        }
        w.finish()?;

        debug!(
            "dc: unit {}: {} replicas, {} iterated, {} reconciliations",
            unit.index,
            replicas.len(),
            iterated,
            transfers.len()
        );

        *state = UnitState::Transferring;
        let stats = transfer_dc(
            client,
            &addrs,
            &transfers,
            ctx.cfg.batch_size,
            ctx.cfg.dry_run,
        )?;
        ctx.monitor
            .add(RecoveryType::Dc, Counter::TransferredKeys, stats.keys);
        ctx.monitor
            .add(RecoveryType::Dc, Counter::TransferredBytes, stats.bytes);
        ctx.monitor
            .add(RecoveryType::Dc, Counter::FailedKeys, stats.failed);

        for path in &paths {
            std::fs::remove_file(path).ok();
        }
        std::fs::remove_file(&diff_file).ok();

        *state = UnitState::Done;
        Ok(())
    }
}
