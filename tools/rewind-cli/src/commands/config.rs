//! Show or initialize the configuration.

use std::path::Path;

use rewind_common::config::AppConfig;

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

pub fn path(config_path: &Path) -> anyhow::Result<()> {
    let marker = if config_path.exists() { "" } else { " (not created)" };
    println!("{}{marker}", config_path.display());
    Ok(())
}

pub fn init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }
    AppConfig::default()
        .save_to(config_path)
        .map_err(|e| anyhow::anyhow!("Failed to write config: {e}"))?;
    println!("Wrote default config to {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        init(&path, false).unwrap();
        assert!(path.exists());
        assert!(init(&path, false).is_err());
        init(&path, true).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.replay.max_replays, AppConfig::default().replay.max_replays);
    }
}
