use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Recovery driver for the AtollDB ring (merge / dc)
#[derive(Parser, Debug)]
#[command(name = "atoll_recovery", version, about = "AtollDB ring recovery driver")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

/// Options shared by both recovery flows.
#[derive(Args, Debug, Clone)]
pub struct RecoverOpts {
    /// Bootstrap node as host:port:family (family: 2 = IPv4, 10 = IPv6)
    #[arg(short = 'r')]
    pub remote: String,

    /// Restrict recovery to these groups (comma separated)
    #[arg(short = 'g', value_delimiter = ',')]
    pub groups: Vec<u32>,

    /// Batch size for bulk operations
    #[arg(short = 'b', default_value_t = 1024)]
    pub batch_size: usize,

    /// Worker process count (1 = run inline)
    #[arg(short = 'n', default_value_t = 1)]
    pub nprocess: usize,

    /// Minimal timestamp: epoch seconds or an age like 12h/1d/4w
    #[arg(short = 't')]
    pub timestamp: Option<String>,

    /// Tmp directory; the literal %TYPE% is substituted with merge/dc
    #[arg(short = 'D', default_value = "/var/tmp/atoll_recovery_%TYPE%")]
    pub tmp_dir: String,

    /// Advisory lockfile name under the tmp directory
    #[arg(short = 'k', default_value = "recovery.lock")]
    pub lock: String,

    /// Log file (stderr when omitted)
    #[arg(short = 'l')]
    pub log_file: Option<PathBuf>,

    /// Log verbosity: error/warn/info/debug/trace
    #[arg(short = 'L', default_value = "info")]
    pub log_level: String,

    /// Dry run: diff only, count would-be transfers
    #[arg(short = 'N', default_value_t = false)]
    pub dry_run: bool,

    /// Safe mode: no source deletion after merge
    #[arg(short = 'S', default_value_t = false)]
    pub safe: bool,

    /// Stats output at exit: text|none
    #[arg(short = 's', default_value = "text")]
    pub stat: String,

    /// Monitor HTTP port (endpoint serves stats.txt)
    #[arg(short = 'm')]
    pub monitor_port: Option<u16>,

    /// Per-operation wait timeout, seconds
    #[arg(short = 'w', default_value_t = 3600)]
    pub wait_timeout: u64,

    /// Debug logging (same as -L debug)
    #[arg(short = 'd', default_value_t = false)]
    pub debug: bool,

    /// Pause for user input at exit
    #[arg(short = 'e', default_value_t = false)]
    pub pause_at_exit: bool,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Recovery within a single ring: push misplaced keys to their owners
    Merge(RecoverOpts),

    /// Recovery across rings: restore replica invariants
    Dc(RecoverOpts),

    /// Internal: run a unit file produced by the parent coordinator
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        units: PathBuf,
    },
}
