//! Audio Humanizer Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod enhancement;
pub mod server;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use enhancement::{AudioEngine, EnhancementPipeline, FfmpegEngine, TempFileManager};
pub use server::{run_server, RequestsLoggingLevel};
pub use user::{SqliteUserStore, UserManager};
