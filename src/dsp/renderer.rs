//! Offline renderer: runs a session against an in-memory sink instead of a
//! device, pulling fixed-size blocks through the same block-fill step.

use crate::config::{PlaybackDuration, SessionConfig};
use crate::error::{DeviceError, InputError, ToneError};
use crate::output::{AudioSink, BlockRenderer, FillStatus, Finish, StreamSpec};
use crate::session::{CancellationFlag, PlaybackSession};

/// Collects every block the renderer produces, padding included.
#[derive(Debug, Default)]
pub struct MemorySink {
    samples: Vec<f32>,
    spec: Option<StreamSpec>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interleaved samples, including the zero padding of the final block.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Parameters of the last stream opened on this sink.
    pub fn spec(&self) -> Option<StreamSpec> {
        self.spec
    }
}

impl AudioSink for MemorySink {
    fn play<R: BlockRenderer>(&mut self, spec: StreamSpec, mut renderer: R) -> Result<Finish, DeviceError> {
        self.spec = Some(spec);
        let block_len = spec.block_size as usize * spec.channels as usize;
        loop {
            let start = self.samples.len();
            self.samples.resize(start + block_len, 0.0);
            if let FillStatus::Finished(finish) = renderer.render(&mut self.samples[start..]) {
                return Ok(finish);
            }
        }
    }
}

/// Render a finite session to interleaved `f32` samples, trimmed to the
/// frames actually produced.
pub fn render_samples(config: &SessionConfig) -> Result<Vec<f32>, ToneError> {
    if config.duration == PlaybackDuration::Continuous {
        return Err(InputError::UnboundedRender.into());
    }

    let channels = config.mode.channels() as usize;
    let session = PlaybackSession::new(config.clone(), CancellationFlag::new());
    let mut sink = MemorySink::new();
    let report = session.start(&mut sink)?;

    let mut samples = sink.into_samples();
    samples.truncate(report.frames_produced as usize * channels);
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::dsp::oscillator::{SynthesisMode, generate_block};
    use crate::session::SessionState;

    fn finite(freqs: &[f64], mode: SynthesisMode, seconds: i64) -> SessionConfig {
        SessionConfig {
            frequencies: freqs.to_vec(),
            mode,
            duration: PlaybackDuration::Finite { seconds },
            sample_rate: 8000,
            block_size: 300,
        }
    }

    #[test]
    fn renders_exact_length() {
        let samples = render_samples(&finite(&[440.0], SynthesisMode::Mono, 2)).unwrap();
        assert_eq!(samples.len(), 16_000);

        let stereo = render_samples(&finite(&[440.0], SynthesisMode::Binaural, 1)).unwrap();
        assert_eq!(stereo.len(), 2 * 8000);
    }

    #[test]
    fn matches_single_block_generation() {
        let freqs = [35.0, 70.0, 140.0];
        let samples = render_samples(&finite(&freqs, SynthesisMode::Binaural, 1)).unwrap();
        let reference = generate_block(&freqs, 8000, 8000, 0, SynthesisMode::Binaural);
        assert_eq!(samples.len(), reference.len());
        for (a, b) in samples.iter().zip(&reference) {
            assert_eq!(*a, *b as f32);
        }
    }

    #[test]
    fn sink_keeps_zero_padded_tail() {
        // 8000 frames in 300-frame blocks: 26 full blocks + 200 frames.
        let session = PlaybackSession::new(
            finite(&[100.0], SynthesisMode::Mono, 1),
            CancellationFlag::new(),
        );
        let mut sink = MemorySink::new();
        let report = session.start(&mut sink).unwrap();
        assert_eq!(report.frames_produced, 8000);
        assert_eq!(sink.samples().len(), 27 * 300);
        assert!(sink.samples()[8000..].iter().all(|&s| s == 0.0));
        assert_eq!(sink.spec().map(|s| s.channels), Some(1));
    }

    #[test]
    fn continuous_is_rejected() {
        let mut cfg = finite(&[100.0], SynthesisMode::Mono, 1);
        cfg.duration = PlaybackDuration::Continuous;
        let err = render_samples(&cfg).unwrap_err();
        assert!(matches!(err, ToneError::InvalidInput(InputError::UnboundedRender)));
    }

    #[test]
    fn invalid_config_propagates() {
        let err = render_samples(&finite(&[], SynthesisMode::Mono, 1)).unwrap_err();
        assert!(matches!(err, ToneError::InvalidInput(InputError::EmptyFrequencies)));
    }

    #[test]
    fn continuous_session_cancelled_from_another_thread() {
        let mut cfg = finite(&[440.0], SynthesisMode::Binaural, 1);
        cfg.duration = PlaybackDuration::Continuous;
        let flag = CancellationFlag::new();
        let session = PlaybackSession::new(cfg, flag.clone());
        let handle = session.handle();

        let worker = thread::spawn(move || {
            let mut sink = MemorySink::new();
            let result = session.start(&mut sink);
            (result, sink.into_samples())
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.state() != SessionState::Running && Instant::now() < deadline {
            thread::yield_now();
        }
        assert_eq!(handle.state(), SessionState::Running);
        thread::sleep(Duration::from_millis(10));
        flag.cancel();

        let (result, samples) = worker.join().expect("playback thread panicked");
        let report = result.expect("session failed");
        assert_eq!(report.state, SessionState::Cancelled);
        assert_eq!(handle.state(), SessionState::Cancelled);
        // Every produced frame landed in full blocks before the cancelling one.
        assert_eq!(report.frames_produced % 300, 0);
        assert_eq!(samples.len() as u64, 2 * (report.frames_produced + 300));
    }
}
