use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env, Target};
use log::error;

mod cli;
mod cmd_dc;
mod cmd_merge;
mod cmd_worker;
mod util;

fn init_logger(opts: Option<&cli::RecoverOpts>) {
    // Default filter from -L (or -d); RUST_LOG still wins when set.
    let default_level = match opts {
        Some(o) if o.debug => "debug",
        Some(o) => o.log_level.as_str(),
        None => "info",
    };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));
    builder.format_timestamp_millis();

    if let Some(path) = opts.and_then(|o| o.log_file.as_ref()) {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(f) => {
                builder.target(Target::Pipe(Box::new(f)));
            }
            Err(e) => eprintln!("warning: cannot open log file {}: {}", path.display(), e),
        }
    }

    builder.init();
}

fn main() {
    let cli = cli::Cli::parse();

    let run: Result<()> = match cli.cmd {
        cli::Cmd::Merge(opts) => {
            init_logger(Some(&opts));
            cmd_merge::exec(opts)
        }
        cli::Cmd::Dc(opts) => {
            init_logger(Some(&opts));
            cmd_dc::exec(opts)
        }
        cli::Cmd::Worker { config, units } => {
            init_logger(None);
            cmd_worker::exec(config, units)
        }
    };

    if let Err(e) = run {
        error!("{:?}", e);
        std::process::exit(1);
    }
}
