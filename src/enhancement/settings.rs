//! Client-supplied humanization settings.
//!
//! The raw settings blob comes straight from the upload form and may be absent,
//! malformed, or partially filled. Normalization never fails: every field that
//! cannot be read as a number falls back to its default.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_PITCH_SEMITONES: f64 = 0.1;
pub const DEFAULT_TEMPO_PERCENT: f64 = 99.5;
pub const DEFAULT_WARMTH_LEVEL: f64 = 8.0;
pub const DEFAULT_REVERB_LEVEL: f64 = 8.0;

pub const PITCH_RANGE: (f64, f64) = (-12.0, 12.0);
/// `atempo` accepts 0.5..=2.0 on every ffmpeg release in a single instance.
pub const TEMPO_RANGE: (f64, f64) = (50.0, 200.0);
pub const LEVEL_RANGE: (f64, f64) = (0.0, 100.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementSettings {
    pub pitch_semitones: f64,
    pub tempo_percent: f64,
    pub warmth_level: f64,
    pub reverb_level: f64,
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self {
            pitch_semitones: DEFAULT_PITCH_SEMITONES,
            tempo_percent: DEFAULT_TEMPO_PERCENT,
            warmth_level: DEFAULT_WARMTH_LEVEL,
            reverb_level: DEFAULT_REVERB_LEVEL,
        }
    }
}

impl EnhancementSettings {
    /// Parses and clamps the raw settings text of an upload.
    pub fn normalize(raw: Option<&str>) -> Self {
        Self::from_raw(raw).clamped()
    }

    /// Parses the raw settings text without clamping.
    pub fn from_raw(raw: Option<&str>) -> Self {
        let raw = match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Self::default(),
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(&value),
            Err(err) => {
                debug!("Settings are not valid JSON, using defaults: {}", err);
                Self::default()
            }
        }
    }

    /// Reads each field independently from a JSON object, substituting the
    /// default for anything missing or non-numeric.
    pub fn from_value(value: &Value) -> Self {
        let object = match value.as_object() {
            Some(object) => object,
            None => {
                debug!("Settings are not a JSON object, using defaults");
                return Self::default();
            }
        };

        let field = |keys: &[&str], default: f64| -> f64 {
            keys.iter()
                .find_map(|key| object.get(*key))
                .and_then(coerce_number)
                .unwrap_or_else(|| {
                    if let Some(key) = keys.iter().find(|key| object.contains_key(**key)) {
                        debug!("Settings field '{}' is not numeric, using {}", key, default);
                    }
                    default
                })
        };

        Self {
            pitch_semitones: field(&["pitch", "pitchSemitones"], DEFAULT_PITCH_SEMITONES),
            tempo_percent: field(&["tempo", "tempoPercent"], DEFAULT_TEMPO_PERCENT),
            warmth_level: field(&["warmth", "warmthLevel"], DEFAULT_WARMTH_LEVEL),
            reverb_level: field(&["reverb", "reverbLevel"], DEFAULT_REVERB_LEVEL),
        }
    }

    /// Restricts every field to the range the filter chain can express.
    pub fn clamped(self) -> Self {
        let clamped = Self {
            pitch_semitones: self.pitch_semitones.clamp(PITCH_RANGE.0, PITCH_RANGE.1),
            tempo_percent: self.tempo_percent.clamp(TEMPO_RANGE.0, TEMPO_RANGE.1),
            warmth_level: self.warmth_level.clamp(LEVEL_RANGE.0, LEVEL_RANGE.1),
            reverb_level: self.reverb_level.clamp(LEVEL_RANGE.0, LEVEL_RANGE.1),
        };
        if clamped != self {
            debug!("Clamped settings {:?} to {:?}", self, clamped);
        }
        clamped
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}
