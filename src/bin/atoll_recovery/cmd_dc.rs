use anyhow::Result;
use log::info;

use AtollDB::recovery::client::TcpNodeClient;
use AtollDB::recovery::dc::DcCoordinator;
use AtollDB::recovery::monitor::spawn_http;
use AtollDB::recovery::{worker, Context, NodeClient, RecoveryType, RouteTable};

use crate::cli::RecoverOpts;
use crate::util::{build_config, finish};

pub fn exec(opts: RecoverOpts) -> Result<()> {
    let cfg = build_config(RecoveryType::Dc, &opts)?;
    let ctx = Context::new(cfg)?;

    if let Some(port) = opts.monitor_port {
        spawn_http(ctx.monitor.clone(), port)?;
    }

    let client = TcpNodeClient::new(&ctx.cfg.remote, ctx.cfg.wait_timeout_secs);
    let route = RouteTable::new(client.route_table()?)?;
    info!(
        "dc: route table: {} entries, groups {:?}",
        route.entries().len(),
        route.groups()
    );

    let units = DcCoordinator::plan(&ctx, &route)?;
    let ok = worker::run(&ctx, &client, units)?;

    finish(&ctx, &opts, ok)
}
