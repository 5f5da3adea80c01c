//! Scripted audio engine so end-to-end tests never depend on ffmpeg.

use super::constants::ENHANCED_MARKER;
use async_trait::async_trait;
use audio_humanizer_server::enhancement::{
    AudioEngine, EngineAvailability, EngineEvent, EngineObserver, FilterChain, ProcessingError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineBehavior {
    /// Writes the marker followed by the input bytes.
    Enhance,
    /// Writes a partial output, then reports a failure.
    Fail,
    /// Probe reports the engine as missing.
    Offline,
}

pub const SCRIPTED_FAILURE_MESSAGE: &str = "Invalid data found when processing input";

pub struct ScriptedEngine {
    behavior: Mutex<EngineBehavior>,
    delay: Duration,
    process_calls: AtomicUsize,
    filtergraphs: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(behavior: EngineBehavior, delay: Duration) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            delay,
            process_calls: AtomicUsize::new(0),
            filtergraphs: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: EngineBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    /// Filter graphs of every processed job, in call order.
    pub fn filtergraphs(&self) -> Vec<String> {
        self.filtergraphs.lock().unwrap().clone()
    }

    fn behavior(&self) -> EngineBehavior {
        *self.behavior.lock().unwrap()
    }
}

#[async_trait]
impl AudioEngine for ScriptedEngine {
    async fn probe(&self) -> EngineAvailability {
        match self.behavior() {
            EngineBehavior::Offline => EngineAvailability::Unavailable,
            _ => EngineAvailability::Available,
        }
    }

    async fn process(
        &self,
        input: &Path,
        output: &Path,
        chain: &FilterChain,
        observer: &dyn EngineObserver,
    ) -> Result<PathBuf, ProcessingError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        self.filtergraphs
            .lock()
            .unwrap()
            .push(chain.to_filtergraph());
        observer.on_event(EngineEvent::Started {
            command_line: format!("scripted {:?} -> {:?}", input, output),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let audio = tokio::fs::read(input).await?;
        match self.behavior() {
            EngineBehavior::Fail => {
                tokio::fs::write(output, &audio[..audio.len() / 2]).await?;
                Err(ProcessingError::EngineFailed {
                    message: SCRIPTED_FAILURE_MESSAGE.to_string(),
                    diagnostics: format!("{}: {}", input.display(), SCRIPTED_FAILURE_MESSAGE),
                })
            }
            _ => {
                let mut enhanced = ENHANCED_MARKER.to_vec();
                enhanced.extend_from_slice(&audio);
                tokio::fs::write(output, enhanced).await?;
                observer.on_event(EngineEvent::Progress { percent: 100.0 });
                Ok(output.to_path_buf())
            }
        }
    }
}
