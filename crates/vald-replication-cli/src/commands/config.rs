//! Config command - prints the resolved configuration.

use anyhow::{Context, Result};
use vald_replication_config::ReplicationConfig;

pub fn show(config: &ReplicationConfig) -> Result<()> {
    if let Err(e) = config.validate() {
        eprintln!("warning: {e}");
    }

    let rendered = config.to_toml().context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
