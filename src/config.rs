//! Session configuration.
//!
//! A `SessionConfig` is the whole input contract of a playback session and
//! maps one-to-one onto JSON, e.g.
//!
//! ```json
//! { "frequencies": [136.1, 432.0], "mode": "binaural",
//!   "duration": { "finite": { "seconds": 600 } } }
//! ```
//!
//! `sample_rate` and `block_size` may be omitted.

use serde::{Deserialize, Serialize};

use crate::dsp::oscillator::SynthesisMode;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Frames per device callback.
pub const DEFAULT_BLOCK_SIZE: u32 = 1024;

/// Requested playback length, before conversion to samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackDuration {
    /// Whole seconds. Negative values are rejected when the session starts.
    Finite { seconds: i64 },
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub frequencies: Vec<f64>,
    #[serde(default)]
    pub mode: SynthesisMode,
    pub duration: PlaybackDuration,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_block_size")]
    pub block_size: u32,
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_block_size() -> u32 {
    DEFAULT_BLOCK_SIZE
}

impl SessionConfig {
    pub fn new(frequencies: Vec<f64>, mode: SynthesisMode, duration: PlaybackDuration) -> Self {
        SessionConfig {
            frequencies,
            mode,
            duration,
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
