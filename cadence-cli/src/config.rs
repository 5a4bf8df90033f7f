use anyhow::{Context, Result};
use cadence_core::SchedulerConfig;
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::ensure_cadence_home;

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_cadence_home()?.join("config.toml"))
}

/// Load the scheduler configuration. A missing file means defaults; keys absent
/// from the file keep their default values.
pub fn load_config(path: Option<&Path>) -> Result<SchedulerConfig> {
    let p = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if !p.exists() {
        if path.is_some() {
            anyhow::bail!("config not found: {}", p.display());
        }
        return Ok(SchedulerConfig::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    parse_config(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn parse_config(s: &str) -> Result<SchedulerConfig> {
    let cfg: SchedulerConfig = toml::from_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn save_config(cfg: &SchedulerConfig, path: &Path) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn init_config(path: Option<&Path>) -> Result<()> {
    let p = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&SchedulerConfig::default(), &p)?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_overrides_only_named_keys() {
        let cfg = parse_config(
            r#"
timezone = "America/Chicago"
min_buffer_minutes = 15

[working_window]
start_hour = 8
end_hour = 17
"#,
        )
        .unwrap();
        assert_eq!(cfg.timezone, "America/Chicago");
        assert_eq!(cfg.min_buffer_minutes, 15);
        assert_eq!(cfg.working_window.start_hour, 8);
        assert_eq!(cfg.search_horizon_days, SchedulerConfig::default().search_horizon_days);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse_config("deadline_weight = 0.9\npriority_weight = 0.4\n").is_err());
        assert!(parse_config("timezone = \"Nowhere/Land\"\n").is_err());
    }

    #[test]
    fn defaults_survive_a_toml_round_trip() {
        let s = toml::to_string_pretty(&SchedulerConfig::default()).unwrap();
        assert_eq!(parse_config(&s).unwrap(), SchedulerConfig::default());
    }
}
