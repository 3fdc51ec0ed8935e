use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use AtollDB::blob::{HistoryEntry, IoAttr, Reply};
use AtollDB::consts::{
    HISTORY_ENTRY_SIZE, IO_FLAGS_HISTORY, IO_FLAGS_NO_HISTORY_UPDATE,
};
use AtollDB::recovery::client::BulkItem;
use AtollDB::recovery::dc::DcCoordinator;
use AtollDB::recovery::merge::MergeCoordinator;
use AtollDB::recovery::monitor::Counter;
use AtollDB::recovery::record::IterRecord;
use AtollDB::recovery::{
    worker, Context, NodeClient, RecoveryConfig, RecoveryType, RouteEntry, RouteTable,
};
use AtollDB::{BlobBackend, BlobConfig, BlobError, Id, IdRange};

// ---------- helpers ----------

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("atolltest-e2e-{prefix}-{pid}-{t}-{id}"))
}

fn make_id(b: u8) -> Id {
    let mut id = [0u8; 64];
    id[0] = b;
    id
}

/// Write a key with a chosen history timestamp (recovery compares these).
fn put_with_ts(backend: &BlobBackend, id: Id, payload: &[u8], tsec: u64) {
    let io = IoAttr::new(id, payload.len() as u64, IO_FLAGS_NO_HISTORY_UPDATE);
    backend.write(&io, payload).expect("write data");

    let entry = HistoryEntry {
        id,
        flags: 0,
        tsec,
        tnsec: 0,
        offset: 0,
        size: payload.len() as u64,
    };
    let hio = IoAttr::new(id, HISTORY_ENTRY_SIZE as u64, IO_FLAGS_HISTORY);
    backend.write(&hio, &entry.encode()).expect("write history");
}

fn get(backend: &BlobBackend, id: Id) -> Option<Vec<u8>> {
    let io = IoAttr::new(id, 0, 0);
    match backend.read(&io, 1 << 20) {
        Ok(Reply::Data(v)) => Some(v),
        Err(BlobError::NotFound) => None,
        other => panic!("unexpected read result: {:?}", other),
    }
}

/// In-memory ring: every node is a real BlobBackend, RPCs are direct calls.
struct MemClient {
    nodes: HashMap<String, BlobBackend>,
    routes: Vec<RouteEntry>,
}

impl MemClient {
    fn node(&self, addr: &str) -> Result<&BlobBackend> {
        self.nodes
            .get(addr)
            .ok_or_else(|| anyhow::anyhow!("unknown node {}", addr))
    }
}

impl NodeClient for MemClient {
    fn route_table(&self) -> Result<Vec<RouteEntry>> {
        Ok(self.routes.clone())
    }

    fn iterate(
        &self,
        addr: &str,
        _group: u32,
        range: &IdRange,
        since: u64,
        sink: &mut dyn FnMut(IterRecord) -> Result<()>,
    ) -> Result<u64> {
        let records = self.node(addr)?.iterate_range(range, since)?;
        let mut count = 0u64;
        for rec in records {
            sink(rec)?;
            count += 1;
        }
        Ok(count)
    }

    fn bulk_read(&self, addr: &str, keys: &[Id]) -> Result<Vec<BulkItem>> {
        let backend = self.node(addr)?;
        let mut out = Vec::with_capacity(keys.len());
        for &id in keys {
            let data = match backend.read(&IoAttr::new(id, 0, 0), 1 << 24) {
                Ok(Reply::Data(v)) => v,
                Err(BlobError::NotFound) => continue,
                other => panic!("unexpected bulk read result: {:?}", other),
            };
            let hio = IoAttr::new(id, 0, IO_FLAGS_HISTORY);
            let history = match backend.read(&hio, 1 << 24) {
                Ok(Reply::Data(v)) => v,
                Err(BlobError::NotFound) => Vec::new(),
                other => panic!("unexpected history read result: {:?}", other),
            };
            out.push(BulkItem { id, data, history });
        }
        Ok(out)
    }

    fn bulk_write(&self, addr: &str, items: &[BulkItem]) -> Result<u64> {
        let backend = self.node(addr)?;
        let mut bytes = 0u64;
        for item in items {
            let io = IoAttr::new(
                item.id,
                item.data.len() as u64,
                IO_FLAGS_NO_HISTORY_UPDATE,
            );
            backend.write(&io, &item.data)?;
            if !item.history.is_empty() {
                let hio = IoAttr::new(item.id, item.history.len() as u64, IO_FLAGS_HISTORY);
                backend.write(&hio, &item.history)?;
            }
            bytes += item.data.len() as u64;
        }
        Ok(bytes)
    }

    fn bulk_delete(&self, addr: &str, keys: &[Id]) -> Result<()> {
        let backend = self.node(addr)?;
        for &id in keys {
            for flags in [0, IO_FLAGS_HISTORY] {
                match backend.del(&IoAttr::new(id, 0, flags)) {
                    Ok(()) | Err(BlobError::NotFound) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}

fn two_node_ring(prefix: &str) -> MemClient {
    // group 1: "a" owns [0x00, 0x80), "b" owns [0x80, 0x00)
    let mut nodes = HashMap::new();
    nodes.insert(
        "a:1025".to_string(),
        BlobBackend::open(BlobConfig::new(unique_root(&format!("{prefix}-a")))).expect("open a"),
    );
    nodes.insert(
        "b:1025".to_string(),
        BlobBackend::open(BlobConfig::new(unique_root(&format!("{prefix}-b")))).expect("open b"),
    );
    let routes = vec![
        RouteEntry {
            start: make_id(0x00),
            addr: "a:1025".to_string(),
            group: 1,
        },
        RouteEntry {
            start: make_id(0x80),
            addr: "b:1025".to_string(),
            group: 1,
        },
    ];
    MemClient { nodes, routes }
}

fn merge_cfg(tmp: PathBuf) -> RecoveryConfig {
    let mut cfg = RecoveryConfig::new(RecoveryType::Merge, "a:1025", tmp);
    cfg.batch_size = 2; // exercise batching
    cfg
}

// ---------- tests ----------

#[test]
fn merge_moves_misplaced_keys_to_owner() {
    let client = two_node_ring("merge");
    let a = client.node("a:1025").expect("a");

    // k1 belongs to b's range but lives on a; k2 is correctly placed
    let k1 = make_id(0x90);
    let k2 = make_id(0x10);
    put_with_ts(a, k1, b"misplaced", 100);
    put_with_ts(a, k2, b"at home", 100);

    let tmp = unique_root("merge-tmp");
    let ctx = Context::new(merge_cfg(tmp.clone())).expect("context");
    let route = RouteTable::new(client.route_table().expect("routes")).expect("table");
    let units = MergeCoordinator::plan(&ctx, &route).expect("plan");
    assert_eq!(units.len(), 1, "one foreign range, one unit");

    let ok = worker::run(&ctx, &client, units).expect("run");
    assert!(ok);

    let b = client.node("b:1025").expect("b");
    assert_eq!(get(b, k1).expect("moved"), b"misplaced");
    assert!(get(client.node("a:1025").unwrap(), k1).is_none(), "source deleted");
    assert_eq!(
        get(client.node("a:1025").unwrap(), k2).expect("untouched"),
        b"at home"
    );

    assert_eq!(ctx.monitor.get(RecoveryType::Merge, Counter::DiffKeys), 1);
    assert_eq!(
        ctx.monitor.get(RecoveryType::Merge, Counter::TransferredKeys),
        1
    );
    assert_eq!(
        ctx.monitor.get(RecoveryType::Merge, Counter::TransferredBytes),
        9
    );
    assert_eq!(ctx.monitor.get(RecoveryType::Merge, Counter::FailedUnits), 0);

    // idempotence: a second run finds an empty transfer set
    drop(ctx);
    let ctx = Context::new(merge_cfg(tmp)).expect("context 2");
    let units = MergeCoordinator::plan(&ctx, &route).expect("plan 2");
    let ok = worker::run(&ctx, &client, units).expect("run 2");
    assert!(ok);
    assert_eq!(ctx.monitor.get(RecoveryType::Merge, Counter::DiffKeys), 0);
    assert_eq!(
        ctx.monitor.get(RecoveryType::Merge, Counter::TransferredKeys),
        0,
        "no transfers on the second run"
    );
}

#[test]
fn merge_safe_mode_keeps_source_copy() {
    let client = two_node_ring("safe");
    let a = client.node("a:1025").expect("a");
    let k1 = make_id(0xa0);
    put_with_ts(a, k1, b"copied, not moved", 100);

    let mut cfg = merge_cfg(unique_root("safe-tmp"));
    cfg.safe = true;
    let ctx = Context::new(cfg).expect("context");
    let route = RouteTable::new(client.route_table().expect("routes")).expect("table");
    let units = MergeCoordinator::plan(&ctx, &route).expect("plan");
    assert!(worker::run(&ctx, &client, units).expect("run"));

    assert!(get(client.node("b:1025").unwrap(), k1).is_some());
    assert!(
        get(client.node("a:1025").unwrap(), k1).is_some(),
        "safe mode must not delete the source"
    );
}

#[test]
fn merge_dry_run_leaves_destination_unchanged() {
    // P8
    let client = two_node_ring("dry");
    let a = client.node("a:1025").expect("a");
    let k1 = make_id(0xb0);
    put_with_ts(a, k1, b"counted only", 100);

    let mut cfg = merge_cfg(unique_root("dry-tmp"));
    cfg.dry_run = true;
    let ctx = Context::new(cfg).expect("context");
    let route = RouteTable::new(client.route_table().expect("routes")).expect("table");
    let units = MergeCoordinator::plan(&ctx, &route).expect("plan");
    assert!(worker::run(&ctx, &client, units).expect("run"));

    assert!(get(client.node("b:1025").unwrap(), k1).is_none(), "dry run must not write");
    assert!(get(client.node("a:1025").unwrap(), k1).is_some(), "dry run must not delete");
    assert_eq!(
        ctx.monitor.get(RecoveryType::Merge, Counter::TransferredKeys),
        1,
        "would-be transfers are counted"
    );
}

#[test]
fn merge_skips_stale_local_copies() {
    // P6: a key that is newer remotely must not travel
    let client = two_node_ring("stale");
    let a = client.node("a:1025").expect("a");
    let b = client.node("b:1025").expect("b");

    let k = make_id(0xc0);
    put_with_ts(a, k, b"old local", 5);
    put_with_ts(b, k, b"new remote", 7);

    let ctx = Context::new(merge_cfg(unique_root("stale-tmp"))).expect("context");
    let route = RouteTable::new(client.route_table().expect("routes")).expect("table");
    let units = MergeCoordinator::plan(&ctx, &route).expect("plan");
    assert!(worker::run(&ctx, &client, units).expect("run"));

    assert_eq!(get(b, k).expect("kept"), b"new remote");
    assert_eq!(ctx.monitor.get(RecoveryType::Merge, Counter::DiffKeys), 0);
}

#[test]
fn dc_replicates_winner_to_stale_replicas() {
    // three rings, one node each
    let mut nodes = HashMap::new();
    for addr in ["a:1025", "c:1025", "e:1025"] {
        nodes.insert(
            addr.to_string(),
            BlobBackend::open(BlobConfig::new(unique_root(&format!("dc-{}", &addr[..1]))))
                .expect("open"),
        );
    }
    let routes = vec![
        RouteEntry {
            start: make_id(0x00),
            addr: "a:1025".to_string(),
            group: 1,
        },
        RouteEntry {
            start: make_id(0x00),
            addr: "c:1025".to_string(),
            group: 2,
        },
        RouteEntry {
            start: make_id(0x00),
            addr: "e:1025".to_string(),
            group: 3,
        },
    ];
    let client = MemClient { nodes, routes };

    // scenario 6: (k,t=3), (k,t=5), (k,t=5,size=10) -> replica 3 wins
    let k = make_id(0x42);
    put_with_ts(client.node("a:1025").unwrap(), k, b"old", 3);
    put_with_ts(client.node("c:1025").unwrap(), k, b"mid", 5);
    put_with_ts(client.node("e:1025").unwrap(), k, b"winner 10b", 5);

    let tmp = unique_root("dc-tmp");
    let cfg = RecoveryConfig::new(RecoveryType::Dc, "a:1025", tmp.clone());
    let ctx = Context::new(cfg.clone()).expect("context");
    let route = RouteTable::new(client.route_table().expect("routes")).expect("table");
    let units = DcCoordinator::plan(&ctx, &route).expect("plan");
    assert_eq!(units.len(), 1);

    let ok = worker::run(&ctx, &client, units).expect("run");
    assert!(ok);

    for addr in ["a:1025", "c:1025", "e:1025"] {
        assert_eq!(
            get(client.node(addr).unwrap(), k).expect("replica"),
            b"winner 10b",
            "replica {} must hold the winning copy",
            addr
        );
    }
    assert_eq!(ctx.monitor.get(RecoveryType::Dc, Counter::DiffKeys), 1);
    assert_eq!(ctx.monitor.get(RecoveryType::Dc, Counter::TransferredKeys), 2);

    // idempotence: replicas agree now, nothing moves
    drop(ctx);
    let ctx = Context::new(cfg).expect("context 2");
    let units = DcCoordinator::plan(&ctx, &route).expect("plan 2");
    assert!(worker::run(&ctx, &client, units).expect("run 2"));
    assert_eq!(ctx.monitor.get(RecoveryType::Dc, Counter::DiffKeys), 0);
    assert_eq!(
        ctx.monitor.get(RecoveryType::Dc, Counter::TransferredKeys),
        0,
        "no transfers on the second run"
    );
}

#[test]
fn time_window_filter_skips_old_keys() {
    let client = two_node_ring("window");
    let a = client.node("a:1025").expect("a");

    let old = make_id(0x91);
    let recent = make_id(0x92);
    put_with_ts(a, old, b"ancient", 10);
    put_with_ts(a, recent, b"recent", 1000);

    let mut cfg = merge_cfg(unique_root("window-tmp"));
    cfg.since = 500;
    let ctx = Context::new(cfg).expect("context");
    let route = RouteTable::new(client.route_table().expect("routes")).expect("table");
    let units = MergeCoordinator::plan(&ctx, &route).expect("plan");
    assert!(worker::run(&ctx, &client, units).expect("run"));

    let b = client.node("b:1025").expect("b");
    assert!(get(b, recent).is_some());
    assert!(get(b, old).is_none(), "keys older than the cutoff are skipped");
}
