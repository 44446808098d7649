//! Stateless sine synthesis for mono tones and binaural beats.
//!
//! Every sample is computed from its absolute index since stream start, so a
//! stream cut into blocks of any size produces exactly the same waveform as
//! one long block. No phase accumulator is carried between calls.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// Channel layout of the synthesized signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisMode {
    /// One channel: the average of all tones.
    #[default]
    Mono,
    /// Two channels: base tones on the left, tones raised by
    /// [`beat_offset`] on the right.
    Binaural,
}

impl SynthesisMode {
    pub fn channels(self) -> u16 {
        match self {
            SynthesisMode::Mono => 1,
            SynthesisMode::Binaural => 2,
        }
    }
}

/// Beat frequency (Hz) added to the right channel for a base frequency.
pub fn beat_offset(frequency: f64) -> f64 {
    if frequency < 40.0 {
        4.0
    } else if frequency < 100.0 {
        6.0
    } else {
        8.0
    }
}

/// One output frame. `right` is unused in mono mode.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Frame {
    left: f64,
    right: f64,
}

fn frame_at(frequencies: &[f64], sample_rate: u32, index: u64, mode: SynthesisMode) -> Frame {
    let t = index as f64 / sample_rate as f64;
    let count = frequencies.len() as f64;

    let mut left = 0.0;
    let mut right = 0.0;
    for &f in frequencies {
        left += (TAU * f * t).sin();
        if mode == SynthesisMode::Binaural {
            right += (TAU * (f + beat_offset(f)) * t).sin();
        }
    }

    // Plain average; overlapping phases are not renormalized or clamped.
    Frame {
        left: left / count,
        right: right / count,
    }
}

/// Synthesize `block_len` frames starting at absolute sample `start_sample`.
///
/// Mono output has `block_len` values; binaural output has `block_len`
/// interleaved `(left, right)` pairs. `frequencies` must be non-empty and
/// `sample_rate` positive; callers validate both beforehand.
pub fn generate_block(
    frequencies: &[f64],
    sample_rate: u32,
    block_len: usize,
    start_sample: u64,
    mode: SynthesisMode,
) -> Vec<f64> {
    let mut out = Vec::with_capacity(block_len * mode.channels() as usize);
    for i in 0..block_len as u64 {
        let frame = frame_at(frequencies, sample_rate, start_sample + i, mode);
        out.push(frame.left);
        if mode == SynthesisMode::Binaural {
            out.push(frame.right);
        }
    }
    out
}

/// Write `out.len() / channels` frames into `out` without allocating.
///
/// Any trailing partial frame is left untouched. Returns the number of
/// frames written.
pub fn write_block(
    out: &mut [f32],
    frequencies: &[f64],
    sample_rate: u32,
    start_sample: u64,
    mode: SynthesisMode,
) -> usize {
    let channels = mode.channels() as usize;
    let mut frames = 0;
    for (i, slot) in out.chunks_exact_mut(channels).enumerate() {
        let frame = frame_at(frequencies, sample_rate, start_sample + i as u64, mode);
        slot[0] = frame.left as f32;
        if channels == 2 {
            slot[1] = frame.right as f32;
        }
        frames += 1;
    }
    frames
}
