//! Audio humanization pipeline.

mod engine;
mod ffmpeg;
mod filter_chain;
mod pipeline;
mod probe;
mod settings;
mod temp_files;

pub use engine::{
    AudioEngine, EngineAvailability, EngineEvent, EngineObserver, LoggingObserver, NoopObserver,
    ProcessingError, OUTPUT_BITRATE_KBPS, OUTPUT_CODEC, OUTPUT_EXTENSION,
};
pub use ffmpeg::{FfmpegEngine, REQUIRED_FILTERS};
pub use filter_chain::{FilterChain, FilterDirective, StageKind, BASE_SAMPLE_RATE};
pub use pipeline::{EnhancementOutcome, EnhancementPipeline, ProcessingJob, ProcessingMode};
pub use probe::EngineProbe;
pub use settings::EnhancementSettings;
pub use temp_files::{TempFileError, TempFileGuard, TempFileManager};
