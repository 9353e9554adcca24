//! Config command handler.

use color_eyre::Result;

use crate::config::Config;

pub fn run_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
