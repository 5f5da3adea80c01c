use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::{fmt::Debug, path::PathBuf};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use audio_humanizer_server::config::{AppConfig, CliConfig, FileConfig};
use audio_humanizer_server::enhancement::{EnhancementPipeline, FfmpegEngine, TempFileManager};
use audio_humanizer_server::server::{self, run_server, RequestsLoggingLevel, ServerConfig};
use audio_humanizer_server::user::{SqliteUserStore, UserManager};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Optional TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the user database and, by default, temporary files.
    #[clap(long, value_parser = parse_path)]
    pub data_dir: Option<PathBuf>,

    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// ffmpeg binary used as the audio engine.
    #[clap(long)]
    pub ffmpeg_path: Option<String>,

    #[clap(long, value_parser = parse_path)]
    pub temp_dir: Option<PathBuf>,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            data_dir: args.data_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            ffmpeg_path: args.ffmpeg_path.clone(),
            temp_dir: args.temp_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&CliConfig::from(&cli_args), file_config)?;
    let settings = &config.enhancement;

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    info!("Opening user database at {:?}...", config.user_db_path());
    let user_store = Arc::new(SqliteUserStore::new(config.user_db_path())?);
    let user_manager = Arc::new(UserManager::new(user_store, settings.free_credits));

    let temp_files = Arc::new(TempFileManager::new(
        &settings.temp_dir,
        settings.cleanup_grace_period(),
    ));
    temp_files
        .init()
        .await
        .with_context(|| format!("Could not prepare temp dir {:?}", settings.temp_dir))?;

    let engine = Arc::new(FfmpegEngine::new(
        &settings.ffmpeg_path,
        settings.engine_timeout(),
        settings.engine_probe_timeout(),
    ));
    let pipeline = Arc::new(EnhancementPipeline::new(
        engine,
        settings.engine_probe_cache_ttl(),
        temp_files,
    ));
    if !pipeline.availability().await.is_available() {
        warn!(
            "Audio engine {:?} is not usable, uploads will be returned unprocessed",
            settings.ffmpeg_path
        );
    }

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        frontend_dir_path: config.frontend_dir_path.clone(),
        max_upload_bytes: settings.max_upload_bytes,
        charge_simulated: settings.charge_simulated,
    };

    info!("Ready to serve at port {}!", config.port);
    info!("Metrics available at port {}!", config.metrics_port);
    tokio::select! {
        result = run_server(server_config, user_manager, pipeline, config.metrics_port) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
