use std::path::Path;

use anyhow::{Context, Result};

use super::types::Config;

/// File looked up in the working directory when no explicit path is given.
pub const CONFIG_FILE: &str = ".oii-inspector.yaml";

/// Load config from `.oii-inspector.yaml` in the given directory, falling
/// back to defaults when the file does not exist.
pub fn load(dir: &Path) -> Result<Config> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(Config::default());
    }
    load_file(&path)
}

/// Load config from an explicit path. The file must exist.
pub fn load_file(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("invalid config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
