//! Request-scoped orchestration of the enhancement stages.
//!
//! settings -> filter chain -> availability -> engine or pass-through -> tracked temp files.

use super::engine::{AudioEngine, EngineAvailability, LoggingObserver, ProcessingError};
use super::filter_chain::FilterChain;
use super::probe::EngineProbe;
use super::settings::EnhancementSettings;
use super::temp_files::{TempFileGuard, TempFileManager};
use crate::server::metrics;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Real,
    Simulated,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Real => "real",
            ProcessingMode::Simulated => "simulated",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upload's worth of work. Paths are never shared between jobs.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub job_id: String,
    pub input_path: PathBuf,
    /// Equal to `input_path` in simulated mode.
    pub output_path: PathBuf,
    pub chain: FilterChain,
    pub mode: ProcessingMode,
}

/// Successful result of [`EnhancementPipeline::enhance`].
pub struct EnhancementOutcome {
    pub job_id: String,
    pub mode: ProcessingMode,
    pub output_path: PathBuf,
    pub settings: EnhancementSettings,
    pub chain: FilterChain,
    /// Deletes input and output once dropped.
    pub files: TempFileGuard,
}

pub struct EnhancementPipeline {
    engine: Arc<dyn AudioEngine>,
    probe: EngineProbe,
    temp_files: Arc<TempFileManager>,
}

impl EnhancementPipeline {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        probe_cache_ttl: Duration,
        temp_files: Arc<TempFileManager>,
    ) -> Self {
        Self {
            probe: EngineProbe::new(engine.clone(), probe_cache_ttl),
            engine,
            temp_files,
        }
    }

    pub fn temp_files(&self) -> &TempFileManager {
        &self.temp_files
    }

    pub async fn availability(&self) -> EngineAvailability {
        self.probe.check().await
    }

    /// Picks the processing mode and the output path for an upload.
    pub async fn plan(&self, input_path: PathBuf, settings: &EnhancementSettings) -> ProcessingJob {
        let chain = FilterChain::build(settings);
        let job_id = uuid::Uuid::new_v4().to_string();

        match self.probe.check().await {
            EngineAvailability::Available => ProcessingJob {
                job_id,
                output_path: self.temp_files.output_path(),
                input_path,
                chain,
                mode: ProcessingMode::Real,
            },
            EngineAvailability::Unavailable => ProcessingJob {
                job_id,
                output_path: input_path.clone(),
                input_path,
                chain,
                mode: ProcessingMode::Simulated,
            },
        }
    }

    /// Runs a full enhancement for an upload already persisted at `input_path`.
    ///
    /// On success the returned outcome owns both files. On failure both the
    /// input and any partial output have been deleted before this returns.
    pub async fn enhance(
        &self,
        input_path: PathBuf,
        raw_settings: Option<&str>,
    ) -> Result<EnhancementOutcome, ProcessingError> {
        let settings = EnhancementSettings::normalize(raw_settings);
        let job = self.plan(input_path, &settings).await;
        let start = Instant::now();

        info!(
            "[{}] Enhancing {:?} in {} mode with {} stages: {}",
            job.job_id,
            job.input_path,
            job.mode,
            job.chain.len(),
            job.chain
        );

        match job.mode {
            ProcessingMode::Simulated => {
                info!(
                    "[{}] Audio engine unavailable, returning the original file",
                    job.job_id
                );
                metrics::record_enhancement_job(job.mode.as_str(), "success", start.elapsed());
                let files = self.temp_files.track([job.input_path.clone()]);
                Ok(EnhancementOutcome {
                    job_id: job.job_id,
                    mode: job.mode,
                    output_path: job.output_path,
                    settings,
                    chain: job.chain,
                    files,
                })
            }
            ProcessingMode::Real => self.run_engine(job, settings, start).await,
        }
    }

    async fn run_engine(
        &self,
        job: ProcessingJob,
        settings: EnhancementSettings,
        start: Instant,
    ) -> Result<EnhancementOutcome, ProcessingError> {
        let observer = LoggingObserver::new(job.job_id.clone());
        // Covers both paths if this future is dropped mid-run.
        let pending = self
            .temp_files
            .track([job.input_path.clone(), job.output_path.clone()]);
        let result = self
            .engine
            .process(&job.input_path, &job.output_path, &job.chain, &observer)
            .await;

        match result {
            Ok(output_path) => {
                info!(
                    "[{}] Enhancement finished in {:?}",
                    job.job_id,
                    start.elapsed()
                );
                metrics::record_enhancement_job(job.mode.as_str(), "success", start.elapsed());
                pending.disarm();
                let files = self.temp_files.track([
                    job.input_path,
                    job.output_path,
                    output_path.clone(),
                ]);
                Ok(EnhancementOutcome {
                    job_id: job.job_id,
                    mode: job.mode,
                    output_path,
                    settings,
                    chain: job.chain,
                    files,
                })
            }
            Err(err) => {
                warn!("[{}] Enhancement failed: {}", job.job_id, err);
                if let Some(diagnostics) = err.diagnostics() {
                    debug!("[{}] Engine diagnostics:\n{}", job.job_id, diagnostics);
                }
                metrics::record_enhancement_job(job.mode.as_str(), "failure", start.elapsed());
                self.probe.invalidate();
                pending.cleanup_now().await;
                Err(err)
            }
        }
    }
}
