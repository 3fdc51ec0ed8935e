//! Shared helpers for the recovery subcommands.

use std::path::PathBuf;

use anyhow::{anyhow, Context as AnyhowContext, Result};

use AtollDB::recovery::{Context, RecoveryConfig, RecoveryType};
use AtollDB::util::{parse_remote_spec, parse_since_spec};

use crate::cli::RecoverOpts;

/// Build a RecoveryConfig from CLI options (Fatal territory: any parse
/// error aborts before state is touched).
pub fn build_config(rtype: RecoveryType, opts: &RecoverOpts) -> Result<RecoveryConfig> {
    let (remote, _family) = parse_remote_spec(&opts.remote)?;

    let since = match &opts.timestamp {
        Some(spec) => parse_since_spec(spec)?,
        None => 0,
    };

    match opts.stat.as_str() {
        "text" | "none" => {}
        other => return Err(anyhow!("bad -s value '{}': want text|none", other)),
    }

    let tmp_dir = PathBuf::from(opts.tmp_dir.replace("%TYPE%", rtype.as_str()));

    let mut cfg = RecoveryConfig::new(rtype, &remote, tmp_dir);
    cfg.groups = opts.groups.clone();
    cfg.batch_size = opts.batch_size.max(1);
    cfg.nprocess = opts.nprocess.max(1);
    cfg.since = since;
    cfg.lock_file = opts.lock.clone();
    cfg.dry_run = opts.dry_run;
    cfg.safe = opts.safe;
    cfg.wait_timeout_secs = opts.wait_timeout.max(1);
    Ok(cfg)
}

/// Shutdown path shared by merge/dc: write stats.txt, print it when
/// requested, optionally pause for the operator.
pub fn finish(ctx: &Context, opts: &RecoverOpts, ok: bool) -> Result<()> {
    let stats_path = ctx.monitor.write_stats()?;
    if opts.stat == "text" {
        let body = std::fs::read_to_string(&stats_path)
            .with_context(|| format!("read {}", stats_path.display()))?;
        print!("{}", body);
    }

    if opts.pause_at_exit {
        eprintln!("press Enter to exit");
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    }

    if ok {
        Ok(())
    } else {
        Err(anyhow!("recovery finished with failed work units"))
    }
}
