pub mod config;
pub mod dsp;
pub mod error;
pub mod input;
pub mod output;
pub mod session;

pub use crate::config::{PlaybackDuration, SessionConfig};
pub use crate::dsp::oscillator::{SynthesisMode, beat_offset, generate_block};
pub use crate::error::{DeviceError, InputError, ToneError};
pub use crate::session::{CancellationFlag, PlaybackSession, SessionHandle, SessionReport, SessionState};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Render a finite session to interleaved `f32` samples in memory.
pub fn render_samples(config: &SessionConfig) -> Result<Vec<f32>, ToneError> {
    dsp::renderer::render_samples(config)
}
