//! `romget config` – show where the config lives and what was loaded.

use anyhow::Result;
use romget_core::config::{self, AppConfig};

pub fn run_config(cfg: &AppConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
