use anyhow::{Context, Result};
use cadence_core::Snapshot;
use std::fs;
use std::path::{Path, PathBuf};

pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let snapshot: Snapshot =
        serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(snapshot)
}

pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Every `*.json` snapshot in `dir`, sorted by file name.
pub fn read_snapshot_dir(dir: &Path) -> Result<Vec<(PathBuf, Snapshot)>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|p| {
            let snapshot = read_snapshot(&p)?;
            Ok((p, snapshot))
        })
        .collect()
}
