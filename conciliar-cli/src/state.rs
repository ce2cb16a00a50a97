use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `CONCILIAR_HOME`, or `~/.conciliar`.
pub fn conciliar_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CONCILIAR_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".conciliar"))
}

pub fn ensure_conciliar_home() -> Result<PathBuf> {
    let dir = conciliar_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Where the local backend keeps statements and tables unless configured.
pub fn default_data_dir() -> Result<PathBuf> {
    Ok(conciliar_home()?.join("data"))
}
