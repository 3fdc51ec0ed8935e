//! WorkerPool — fan-out юнитов в подпроцессы.
//!
//! Юниты раздаются один раз на старте (round-robin, без work stealing) и
//! сериализуются в JSON-файлы под tmp dir. Каждый воркер — повторный
//! запуск текущего бинарника со скрытым сабкомандом `worker`; счётчики он
//! пишет в общий monitor-файл. Родитель ждёт всех; ненулевой exit любого
//! воркера помечает прогон FAILED, но не прерывает остальных.
//!
//! nprocess <= 1 гоняет юниты в текущем процессе — этим же путём ходят
//! тесты с in-memory клиентом.

use std::path::Path;
use std::process::Command;

use anyhow::{Context as AnyhowContext, Result};
use log::{info, warn};

use super::client::{NodeClient, TcpNodeClient};
use super::context::{Context, RecoveryConfig};
use super::dc::DcCoordinator;
use super::merge::MergeCoordinator;
use super::monitor::Counter;
use super::scratch::{units_path, worker_config_path};
use super::unit::{UnitKind, UnitState, WorkUnit};

/// Run units in this process. Returns true when every unit reached Done.
pub fn run_units(ctx: &Context, client: &dyn NodeClient, units: &[WorkUnit]) -> bool {
    let mut all_ok = true;

    for unit in units {
        let mut state = UnitState::Pending;
        let res = match &unit.kind {
            UnitKind::Merge { .. } => MergeCoordinator::run_unit(ctx, client, unit, &mut state),
            UnitKind::Dc { .. } => DcCoordinator::run_unit(ctx, client, unit, &mut state),
        };

        match res {
            Ok(()) => {
                debug_assert_eq!(state, UnitState::Done);
            }
            Err(e) => {
                // transient: the unit fails, the run continues
                all_ok = false;
                ctx.monitor.add(unit.rtype(), Counter::FailedUnits, 1);
                warn!(
                    "unit {} failed during {}: {:#}",
                    unit.index,
                    state.as_str(),
                    e
                );
                state = UnitState::Failed;
                debug_assert!(state.is_terminal());
            }
        }
    }

    all_ok
}

/// Distribute units across nprocess subprocesses and wait for all of
/// them. Returns true when the whole run succeeded.
pub fn run(ctx: &Context, client: &dyn NodeClient, units: Vec<WorkUnit>) -> Result<bool> {
    if units.is_empty() {
        info!("recovery: nothing to do");
        return Ok(true);
    }

    let nprocess = ctx.cfg.nprocess.max(1);
    if nprocess <= 1 {
        return Ok(run_units(ctx, client, &units));
    }

    // once-only distribution, round-robin
    let mut chunks: Vec<Vec<WorkUnit>> = vec![Vec::new(); nprocess];
    for (i, unit) in units.into_iter().enumerate() {
        chunks[i % nprocess].push(unit);
    }

    let cfg_path = worker_config_path(&ctx.cfg.tmp_dir);
    let cfg_json = serde_json::to_vec_pretty(&ctx.cfg)?;
    std::fs::write(&cfg_path, cfg_json)
        .with_context(|| format!("write {}", cfg_path.display()))?;

    let exe = std::env::current_exe().context("resolve current executable")?;
    let mut children = Vec::new();

    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.is_empty() {
            continue;
        }
        let upath = units_path(&ctx.cfg.tmp_dir, i);
        std::fs::write(&upath, serde_json::to_vec_pretty(chunk)?)
            .with_context(|| format!("write {}", upath.display()))?;

        let spawned = Command::new(&exe)
            .arg("worker")
            .arg("--config")
            .arg(&cfg_path)
            .arg("--units")
            .arg(&upath)
            .spawn()
            .with_context(|| format!("spawn worker {}", i));

        match spawned {
            Ok(child) => {
                info!("worker {}: pid {}, {} units", i, child.id(), chunk.len());
                children.push((i, child));
            }
            Err(e) => {
                warn!("worker {}: spawn failed: {:#}", i, e);
                ctx.monitor
                    .add(ctx.cfg.rtype, Counter::FailedUnits, chunk.len() as u64);
            }
        }
    }

    let mut all_ok = children.len() == chunks.iter().filter(|c| !c.is_empty()).count();
    for (i, mut child) in children {
        let status = child
            .wait()
            .with_context(|| format!("wait for worker {}", i))?;
        if !status.success() {
            warn!("worker {}: exited with {}", i, status);
            all_ok = false;
        }
    }

    Ok(all_ok)
}

/// Entry point of the hidden `worker` subcommand.
pub fn worker_main(config_file: &Path, units_file: &Path) -> Result<bool> {
    let cfg_json = std::fs::read(config_file)
        .with_context(|| format!("read {}", config_file.display()))?;
    let cfg: RecoveryConfig = serde_json::from_slice(&cfg_json)?;

    let units_json = std::fs::read(units_file)
        .with_context(|| format!("read {}", units_file.display()))?;
    let units: Vec<WorkUnit> = serde_json::from_slice(&units_json)?;

    let ctx = Context::attach(cfg)?;
    let client = TcpNodeClient::new(&ctx.cfg.remote, ctx.cfg.wait_timeout_secs);

    info!("worker: {} units", units.len());
    Ok(run_units(&ctx, &client, &units))
}
