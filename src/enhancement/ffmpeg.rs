//! ffmpeg-backed [`AudioEngine`].
//!
//! The engine is driven as an external process: capability listings for the
//! probe, and a single `-af` filter graph for the transformation. Progress is
//! read from `-progress pipe:1` on stdout while stderr is kept as the
//! diagnostic stream.

use super::engine::{
    AudioEngine, EngineAvailability, EngineEvent, EngineObserver, ProcessingError,
    OUTPUT_BITRATE_KBPS, OUTPUT_CODEC,
};
use super::filter_chain::FilterChain;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Filters the chain builder can emit.
pub const REQUIRED_FILTERS: &[&str] = &[
    "atempo",
    "asetrate",
    "aresample",
    "acompressor",
    "aecho",
    "dynaudnorm",
    "equalizer",
];

const MAX_DIAGNOSTIC_LINES: usize = 40;

lazy_static! {
    static ref DURATION_RE: Regex =
        Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid duration regex");
}

#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_path: PathBuf,
    process_timeout: Duration,
    probe_timeout: Duration,
}

impl FfmpegEngine {
    pub fn new(
        ffmpeg_path: impl Into<PathBuf>,
        process_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            process_timeout,
            probe_timeout,
        }
    }

    async fn list_capabilities(&self, flag: &str) -> Result<String, String> {
        let output = tokio::time::timeout(
            self.probe_timeout,
            Command::new(&self.ffmpeg_path)
                .args(["-hide_banner", flag])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| format!("'{}' timed out after {:?}", flag, self.probe_timeout))?
        .map_err(|e| format!("could not run {:?}: {}", self.ffmpeg_path, e))?;

        if !output.status.success() {
            return Err(format!("'{}' exited with {}", flag, output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn check_capabilities(&self) -> Result<(), String> {
        let filters = self.list_capabilities("-filters").await?;
        if let Some(missing) = REQUIRED_FILTERS
            .iter()
            .find(|name| !listing_contains(&filters, name))
        {
            return Err(format!("filter '{}' is not available", missing));
        }

        let encoders = self.list_capabilities("-encoders").await?;
        if !listing_contains(&encoders, OUTPUT_CODEC) {
            return Err(format!("encoder '{}' is not available", OUTPUT_CODEC));
        }
        Ok(())
    }
}

#[async_trait]
impl AudioEngine for FfmpegEngine {
    async fn probe(&self) -> EngineAvailability {
        match self.check_capabilities().await {
            Ok(()) => EngineAvailability::Available,
            Err(reason) => {
                warn!("ffmpeg is not usable: {}", reason);
                EngineAvailability::Unavailable
            }
        }
    }

    async fn process(
        &self,
        input: &Path,
        output: &Path,
        chain: &FilterChain,
        observer: &dyn EngineObserver,
    ) -> Result<PathBuf, ProcessingError> {
        let args = build_args(input, output, chain);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProcessingError::Spawn)?;

        observer.on_event(EngineEvent::Started {
            command_line: command_line(&self.ffmpeg_path, &args),
        });

        let total_duration: Arc<Mutex<Option<f64>>> = Arc::new(Mutex::new(None));

        let stderr_task = child.stderr.take().map(|stderr| {
            let total_duration = total_duration.clone();
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(MAX_DIAGNOSTIC_LINES);
                let mut segments = BufReader::new(stderr).split(b'\n');
                while let Ok(Some(segment)) = segments.next_segment().await {
                    let line = decode_line(&segment);
                    if let Some(seconds) = parse_duration_seconds(&line) {
                        let mut total = total_duration.lock().unwrap();
                        if total.is_none() {
                            *total = Some(seconds);
                        }
                    }
                    if tail.len() == MAX_DIAGNOSTIC_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>()
            })
        });

        let stdout = child.stdout.take();
        let run = async {
            if let Some(stdout) = stdout {
                let mut segments = BufReader::new(stdout).split(b'\n');
                while let Some(segment) = segments.next_segment().await? {
                    let line = decode_line(&segment);
                    if let Some(elapsed) = parse_progress_seconds(&line) {
                        let total = *total_duration.lock().unwrap();
                        if let Some(percent) = progress_percent(elapsed, total) {
                            observer.on_event(EngineEvent::Progress { percent });
                        }
                    } else if line.trim() == "progress=end" {
                        observer.on_event(EngineEvent::Progress { percent: 100.0 });
                    }
                }
            }
            child.wait().await
        };
        let result = tokio::time::timeout(self.process_timeout, run).await;

        let status = match result {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "ffmpeg did not finish within {:?}, killing it",
                    self.process_timeout
                );
                if let Err(e) = child.kill().await {
                    debug!("Failed to kill ffmpeg: {}", e);
                }
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Err(ProcessingError::Timeout(self.process_timeout));
            }
        };

        let diagnostics = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            let message = diagnostics
                .iter()
                .rev()
                .find(|line| !line.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| format!("ffmpeg exited with {}", status));
            return Err(ProcessingError::EngineFailed {
                message,
                diagnostics: diagnostics.join("\n"),
            });
        }

        if tokio::fs::metadata(output).await.is_err() {
            return Err(ProcessingError::EngineFailed {
                message: "ffmpeg reported success but produced no output".to_string(),
                diagnostics: diagnostics.join("\n"),
            });
        }

        Ok(output.to_path_buf())
    }
}

/// Arguments for a single transformation, excluding the program itself.
pub fn build_args(input: &Path, output: &Path, chain: &FilterChain) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-af".to_string(),
        chain.to_filtergraph(),
        "-c:a".to_string(),
        OUTPUT_CODEC.to_string(),
        "-b:a".to_string(),
        format!("{}k", OUTPUT_BITRATE_KBPS),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

fn command_line(program: &Path, args: &[String]) -> String {
    let program = program.to_string_lossy();
    let words = std::iter::once(program.as_ref()).chain(args.iter().map(String::as_str));
    shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
}

/// ffmpeg echoes container tags byte for byte, so its output is not always UTF-8.
fn decode_line(segment: &[u8]) -> String {
    let segment = segment.strip_suffix(b"\r").unwrap_or(segment);
    String::from_utf8_lossy(segment).into_owned()
}

/// Whether a `-filters`/`-encoders` listing has an entry named `name`.
fn listing_contains(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

fn parse_duration_seconds(line: &str) -> Option<f64> {
    let captures = DURATION_RE.captures(line)?;
    let hours: f64 = captures.get(1)?.as_str().parse().ok()?;
    let minutes: f64 = captures.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = captures.get(3)?.as_str().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// `out_time_us` and the historically misnamed `out_time_ms` both carry microseconds.
fn parse_progress_seconds(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.parse::<i64>().ok().map(|us| us as f64 / 1e6),
        _ => None,
    }
}

fn progress_percent(elapsed_seconds: f64, total_seconds: Option<f64>) -> Option<f32> {
    let total = total_seconds.filter(|t| *t > 0.0)?;
    Some(((elapsed_seconds / total) * 100.0).clamp(0.0, 100.0) as f32)
}
