//! Boundary with the external audio-processing engine.

use super::filter_chain::FilterChain;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Output codec handed to the engine. Not configurable per request.
pub const OUTPUT_CODEC: &str = "libmp3lame";
pub const OUTPUT_BITRATE_KBPS: u32 = 320;
pub const OUTPUT_EXTENSION: &str = "mp3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineAvailability {
    Available,
    Unavailable,
}

impl EngineAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, EngineAvailability::Available)
    }
}

/// Errors surfaced by a transformation call. This is the only failure that
/// crosses the pipeline boundary.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Audio engine failed: {message}")]
    EngineFailed {
        message: String,
        /// Tail of the engine's diagnostic stream.
        diagnostics: String,
    },

    #[error("Audio engine timed out after {0:?}")]
    Timeout(Duration),

    #[error("Could not start audio engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ProcessingError::EngineFailed { diagnostics, .. } if !diagnostics.is_empty() => {
                Some(diagnostics)
            }
            _ => None,
        }
    }
}

/// Lifecycle signals emitted while a transformation runs. Advisory only.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started { command_line: String },
    Progress { percent: f32 },
}

pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: EngineEvent);
}

/// Observer that forwards engine events to the log.
pub struct LoggingObserver {
    job_id: String,
}

impl LoggingObserver {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

impl EngineObserver for LoggingObserver {
    fn on_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Started { command_line } => {
                info!("[{}] Engine started: {}", self.job_id, command_line)
            }
            EngineEvent::Progress { percent } => {
                debug!("[{}] Engine progress: {:.1}%", self.job_id, percent)
            }
        }
    }
}

/// Observer that drops every event.
pub struct NoopObserver;

impl EngineObserver for NoopObserver {
    fn on_event(&self, _event: EngineEvent) {}
}

#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Queries the engine for its capabilities. Never fails: any problem
    /// reaching the engine is reported as [`EngineAvailability::Unavailable`].
    async fn probe(&self) -> EngineAvailability;

    /// Runs `chain` over `input` and writes the encoded result to `output`.
    async fn process(
        &self,
        input: &Path,
        output: &Path,
        chain: &FilterChain,
        observer: &dyn EngineObserver,
    ) -> Result<PathBuf, ProcessingError>;
}
