use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

pub const HOME_ENV: &str = "TAXMATE_HOME";

/// `$TAXMATE_HOME`, else `~/.taxmate`.
pub fn taxmate_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".taxmate"))
}

pub fn ensure_taxmate_home() -> Result<PathBuf> {
    let dir = taxmate_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}
