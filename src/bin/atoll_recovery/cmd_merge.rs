use anyhow::Result;
use log::info;

use AtollDB::recovery::client::TcpNodeClient;
use AtollDB::recovery::merge::MergeCoordinator;
use AtollDB::recovery::monitor::spawn_http;
use AtollDB::recovery::{worker, Context, NodeClient, RecoveryType, RouteTable};

use crate::cli::RecoverOpts;
use crate::util::{build_config, finish};

pub fn exec(opts: RecoverOpts) -> Result<()> {
    let cfg = build_config(RecoveryType::Merge, &opts)?;
    let ctx = Context::new(cfg)?;

    if let Some(port) = opts.monitor_port {
        spawn_http(ctx.monitor.clone(), port)?;
    }

    let client = TcpNodeClient::new(&ctx.cfg.remote, ctx.cfg.wait_timeout_secs);
    let route = RouteTable::new(client.route_table()?)?;
    info!(
        "merge: route table: {} entries, groups {:?}",
        route.entries().len(),
        route.groups()
    );

    let units = MergeCoordinator::plan(&ctx, &route)?;
    let ok = worker::run(&ctx, &client, units)?;

    finish(&ctx, &opts, ok)
}
