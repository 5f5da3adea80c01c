mod file_config;

pub use file_config::{EnhancementConfig, FileConfig};

use crate::server::RequestsLoggingLevel;
use crate::user::DEFAULT_FREE_CREDITS;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_ENGINE_PROBE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CLEANUP_GRACE_SECS: u64 = 30 * 60;
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 100;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub ffmpeg_path: Option<String>,
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,

    pub enhancement: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub ffmpeg_path: PathBuf,
    pub engine_timeout_secs: u64,
    pub engine_probe_timeout_secs: u64,
    pub engine_probe_cache_secs: u64,
    pub cleanup_grace_secs: u64,
    pub max_upload_bytes: u64,
    pub free_credits: u32,
    /// Whether pass-through results cost a credit like real ones.
    pub charge_simulated: bool,
    pub temp_dir: PathBuf,
}

impl PipelineSettings {
    pub fn with_temp_dir(temp_dir: PathBuf) -> Self {
        Self {
            ffmpeg_path: PathBuf::from(DEFAULT_FFMPEG_PATH),
            engine_timeout_secs: DEFAULT_ENGINE_TIMEOUT_SECS,
            engine_probe_timeout_secs: DEFAULT_ENGINE_PROBE_TIMEOUT_SECS,
            engine_probe_cache_secs: 0,
            cleanup_grace_secs: DEFAULT_CLEANUP_GRACE_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            free_credits: DEFAULT_FREE_CREDITS,
            charge_simulated: true,
            temp_dir,
        }
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn engine_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_probe_timeout_secs)
    }

    pub fn engine_probe_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.engine_probe_cache_secs)
    }

    pub fn cleanup_grace_period(&self) -> Duration {
        Duration::from_secs(self.cleanup_grace_secs)
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified via --data-dir or in config file")
            })?;

        if !data_dir.exists() {
            bail!("Data directory does not exist: {:?}", data_dir);
        }
        if !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if port == metrics_port && port != 0 {
            bail!("port and metrics_port must differ, both are {}", port);
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let enhancement_file = file.enhancement.unwrap_or_default();
        let defaults = PipelineSettings::with_temp_dir(data_dir.join("tmp"));

        let max_upload_mb = enhancement_file
            .max_upload_mb
            .unwrap_or(DEFAULT_MAX_UPLOAD_MB);
        if max_upload_mb == 0 {
            bail!("max_upload_mb must be greater than 0");
        }
        let engine_timeout_secs = enhancement_file
            .engine_timeout_secs
            .unwrap_or(defaults.engine_timeout_secs);
        if engine_timeout_secs == 0 {
            bail!("engine_timeout_secs must be greater than 0");
        }

        let enhancement = PipelineSettings {
            ffmpeg_path: enhancement_file
                .ffmpeg_path
                .or_else(|| cli.ffmpeg_path.clone())
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            engine_timeout_secs,
            engine_probe_timeout_secs: enhancement_file
                .engine_probe_timeout_secs
                .unwrap_or(defaults.engine_probe_timeout_secs),
            engine_probe_cache_secs: enhancement_file
                .engine_probe_cache_secs
                .unwrap_or(defaults.engine_probe_cache_secs),
            cleanup_grace_secs: enhancement_file
                .cleanup_grace_secs
                .unwrap_or(defaults.cleanup_grace_secs),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            free_credits: enhancement_file
                .free_credits
                .unwrap_or(defaults.free_credits),
            charge_simulated: enhancement_file
                .charge_simulated
                .unwrap_or(defaults.charge_simulated),
            temp_dir: enhancement_file
                .temp_dir
                .map(PathBuf::from)
                .or_else(|| cli.temp_dir.clone())
                .unwrap_or(defaults.temp_dir),
        };

        Ok(Self {
            data_dir,
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            enhancement,
        })
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.data_dir.join("user.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
