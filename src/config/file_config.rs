use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub data_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,

    pub enhancement: Option<EnhancementConfig>,
}

/// `[enhancement]` section.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EnhancementConfig {
    pub ffmpeg_path: Option<String>,
    pub engine_timeout_secs: Option<u64>,
    pub engine_probe_timeout_secs: Option<u64>,
    /// 0 re-checks the engine on every request.
    pub engine_probe_cache_secs: Option<u64>,
    pub cleanup_grace_secs: Option<u64>,
    pub max_upload_mb: Option<u64>,
    pub free_credits: Option<u32>,
    pub charge_simulated: Option<bool>,
    pub temp_dir: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
