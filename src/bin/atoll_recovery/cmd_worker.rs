use std::path::PathBuf;

use anyhow::{anyhow, Result};

use AtollDB::recovery::worker;

pub fn exec(config: PathBuf, units: PathBuf) -> Result<()> {
    if worker::worker_main(&config, &units)? {
        Ok(())
    } else {
        Err(anyhow!("worker finished with failed units"))
    }
}
