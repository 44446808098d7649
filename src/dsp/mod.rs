//! DSP: pure tone synthesis and offline rendering.
//!
//! The generator is stateless; the same code fills device buffers in real
//! time and in-memory buffers for offline rendering and tests.

pub mod oscillator;
pub mod renderer;
