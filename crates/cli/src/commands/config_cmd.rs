//! `wayfinder config`: print configuration as TOML.

use std::path::Path;
use wayfinder_config::AppConfig;

pub fn run(path: Option<&Path>, default: bool) -> anyhow::Result<()> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = super::load_config(path)?;
    println!("# fingerprint: {}", config.fingerprint());
    print!("{}", config.to_toml());
    Ok(())
}
