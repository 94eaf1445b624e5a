use std::path::Path;

use serde::{Deserialize, Serialize};
use shizuku::PlayerConfig;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Used when `--base-url` is not given.
    pub base_url: Option<String>,
    pub manifest_path: Option<String>,
    /// Extra `Name: value` headers sent with every request.
    pub headers: Vec<String>,
    pub player: PlayerConfig,
}

impl Config {
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let Some(file) = file else {
            return Ok(Self::default());
        };

        let data = std::fs::read_to_string(file)?;
        let config = toml::from_str(&data)?;
        log::debug!("Loaded config from {}", file.display());
        Ok(config)
    }
}
