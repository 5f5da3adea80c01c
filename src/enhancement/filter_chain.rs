//! Translation of [`EnhancementSettings`] into an ordered ffmpeg audio filter chain.
//!
//! Stage order is fixed: tempo, pitch, warmth, reverb, normalization, EQ. Each
//! stage operates on the output of the previous one, so the chain is never
//! reordered once built.

use super::settings::EnhancementSettings;
use serde::Serialize;
use std::fmt;

/// Sample rate the pitch stage resamples around.
pub const BASE_SAMPLE_RATE: u32 = 44_100;

const WARMTH_THRESHOLD_DB: i32 = -20;
const WARMTH_RATIO: u32 = 2;
const REVERB_IN_GAIN: f64 = 0.8;
const REVERB_OUT_GAIN: f64 = 0.9;
const REVERB_MAX_DELAY_MS: f64 = 50.0;
const REVERB_MAX_DECAY: f64 = 0.3;
const NORMALIZE_FRAME_MS: u32 = 150;
const NORMALIZE_GAUSS_SIZE: u32 = 15;
const EQ_CENTER_HZ: u32 = 1000;
const EQ_WIDTH_HZ: u32 = 200;
const EQ_GAIN_DB: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Tempo,
    Pitch,
    Warmth,
    Reverb,
    Normalize,
    Equalizer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterDirective {
    /// Multiplicative playback rate.
    Tempo { rate: f64 },
    /// Resample at `base_rate * ratio`, then back to `base_rate`.
    PitchShift { ratio: f64, base_rate: u32 },
    /// 2:1 compression at -20 dBFS with a small makeup gain.
    Warmth { makeup: f64 },
    /// Single-tap echo used as a light room reverb.
    Reverb { delay_ms: f64, decay: f64 },
    Normalize,
    Equalizer,
}

impl FilterDirective {
    pub fn kind(&self) -> StageKind {
        match self {
            FilterDirective::Tempo { .. } => StageKind::Tempo,
            FilterDirective::PitchShift { .. } => StageKind::Pitch,
            FilterDirective::Warmth { .. } => StageKind::Warmth,
            FilterDirective::Reverb { .. } => StageKind::Reverb,
            FilterDirective::Normalize => StageKind::Normalize,
            FilterDirective::Equalizer => StageKind::Equalizer,
        }
    }
}

impl fmt::Display for FilterDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterDirective::Tempo { rate } => write!(f, "atempo={}", rate),
            FilterDirective::PitchShift { ratio, base_rate } => write!(
                f,
                "asetrate={},aresample={}",
                *base_rate as f64 * ratio,
                base_rate
            ),
            FilterDirective::Warmth { makeup } => write!(
                f,
                "acompressor=threshold={}dB:ratio={}:makeup={}",
                WARMTH_THRESHOLD_DB, WARMTH_RATIO, makeup
            ),
            FilterDirective::Reverb { delay_ms, decay } => write!(
                f,
                "aecho={}:{}:{}:{}",
                REVERB_IN_GAIN, REVERB_OUT_GAIN, delay_ms, decay
            ),
            FilterDirective::Normalize => write!(
                f,
                "dynaudnorm=f={}:g={}",
                NORMALIZE_FRAME_MS, NORMALIZE_GAUSS_SIZE
            ),
            FilterDirective::Equalizer => write!(
                f,
                "equalizer=f={}:width_type=h:width={}:g={}",
                EQ_CENTER_HZ, EQ_WIDTH_HZ, EQ_GAIN_DB
            ),
        }
    }
}

/// Ordered list of filter directives built from a single set of settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    directives: Vec<FilterDirective>,
}

impl FilterChain {
    pub fn build(settings: &EnhancementSettings) -> Self {
        let mut directives = Vec::with_capacity(6);

        if settings.tempo_percent != 100.0 {
            directives.push(FilterDirective::Tempo {
                rate: settings.tempo_percent / 100.0,
            });
        }

        if settings.pitch_semitones != 0.0 {
            directives.push(FilterDirective::PitchShift {
                ratio: pitch_ratio(settings.pitch_semitones),
                base_rate: BASE_SAMPLE_RATE,
            });
        }

        if settings.warmth_level > 0.0 {
            directives.push(FilterDirective::Warmth {
                makeup: warmth_makeup_gain(settings.warmth_level),
            });
        }

        if settings.reverb_level > 0.0 {
            let amount = settings.reverb_level / 100.0;
            directives.push(FilterDirective::Reverb {
                delay_ms: amount * REVERB_MAX_DELAY_MS,
                decay: amount * REVERB_MAX_DECAY,
            });
        }

        directives.push(FilterDirective::Normalize);
        directives.push(FilterDirective::Equalizer);

        Self { directives }
    }

    pub fn directives(&self) -> &[FilterDirective] {
        &self.directives
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.directives.iter().map(FilterDirective::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// The `-af` argument handed to the engine.
    pub fn to_filtergraph(&self) -> String {
        self.directives
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_filtergraph())
    }
}

/// Frequency ratio for a shift of `semitones`.
pub fn pitch_ratio(semitones: f64) -> f64 {
    2f64.powf(semitones / 12.0)
}

pub fn warmth_makeup_gain(warmth_level: f64) -> f64 {
    1.0 + warmth_level / 200.0
}
