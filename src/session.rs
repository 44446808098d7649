//! Playback session: validates a [`SessionConfig`], opens a stream on an
//! [`AudioSink`] and drives the block-fill step until the plan completes,
//! the session is cancelled, or the device fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tracing::{info, warn};

use crate::config::{PlaybackDuration, SessionConfig};
use crate::dsp::oscillator::{SynthesisMode, beat_offset, write_block};
use crate::error::{InputError, ToneError};
use crate::output::{AudioSink, BlockRenderer, FillStatus, Finish, StreamSpec};

// ── Data model ──────────────────────────────────────────────

/// Validated, immutable list of tone frequencies in Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencySet(Arc<[f64]>);

impl FrequencySet {
    /// Accepts a non-empty list of finite, positive frequencies.
    pub fn new(frequencies: &[f64]) -> Result<Self, InputError> {
        if frequencies.is_empty() {
            return Err(InputError::EmptyFrequencies);
        }
        if let Some((index, &value)) = frequencies
            .iter()
            .enumerate()
            .find(|(_, f)| !(f.is_finite() && **f > 0.0))
        {
            return Err(InputError::InvalidFrequency { index, value });
        }
        Ok(FrequencySet(frequencies.into()))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// When a session stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPlan {
    Finite { total_samples: u64 },
    /// Runs until cancelled.
    Continuous,
}

impl PlaybackPlan {
    pub fn from_duration(duration: PlaybackDuration, sample_rate: u32) -> Result<Self, InputError> {
        match duration {
            PlaybackDuration::Continuous => Ok(PlaybackPlan::Continuous),
            PlaybackDuration::Finite { seconds } if seconds < 0 => {
                Err(InputError::NegativeDuration { seconds })
            }
            PlaybackDuration::Finite { seconds } => Ok(PlaybackPlan::Finite {
                total_samples: (seconds as u64).saturating_mul(sample_rate as u64),
            }),
        }
    }
}

/// Absolute index of the next sample to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleClock(u64);

impl SampleClock {
    pub fn position(self) -> u64 {
        self.0
    }

    fn advance(&mut self, frames: usize) {
        self.0 += frames as u64;
    }
}

/// Shared stop request. Cheap to clone; setting it more than once, before
/// the session starts, or after it has ended is harmless.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Session lifecycle. `Completed`, `Cancelled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Running = 1,
    Completed = 2,
    Cancelled = 3,
    Failed = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Running,
            2 => SessionState::Completed,
            3 => SessionState::Cancelled,
            4 => SessionState::Failed,
            _ => SessionState::Idle,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }
}

#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        StateCell(Arc::new(AtomicU8::new(SessionState::Idle as u8)))
    }

    fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Observer and canceller for a session, usable from any thread.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cancel: CancellationFlag,
    state: StateCell,
}

impl SessionHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }
}

/// Final outcome of a session that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    pub frames_produced: u64,
}

// ── Block-fill step ─────────────────────────────────────────

/// Real-time half of a session, moved into the device callback.
#[derive(Debug)]
pub struct ToneRenderer {
    frequencies: FrequencySet,
    mode: SynthesisMode,
    plan: PlaybackPlan,
    sample_rate: u32,
    clock: SampleClock,
    cancel: CancellationFlag,
    state: StateCell,
}

impl ToneRenderer {
    pub fn clock(&self) -> SampleClock {
        self.clock
    }

    fn finish(&self, state: SessionState) -> FillStatus {
        self.state.set(state);
        FillStatus::Finished(Finish {
            state,
            frames_produced: self.clock.position(),
        })
    }
}

impl BlockRenderer for ToneRenderer {
    fn render(&mut self, out: &mut [f32]) -> FillStatus {
        if self.cancel.is_cancelled() {
            out.fill(0.0);
            return self.finish(SessionState::Cancelled);
        }

        let channels = self.mode.channels() as usize;
        let requested = out.len() / channels;
        let frames = match self.plan {
            PlaybackPlan::Continuous => requested,
            PlaybackPlan::Finite { total_samples } => {
                let remaining = total_samples.saturating_sub(self.clock.position());
                if remaining == 0 {
                    out.fill(0.0);
                    return self.finish(SessionState::Completed);
                }
                requested.min(usize::try_from(remaining).unwrap_or(usize::MAX))
            }
        };

        let (head, tail) = out.split_at_mut(frames * channels);
        write_block(
            head,
            self.frequencies.as_slice(),
            self.sample_rate,
            self.clock.position(),
            self.mode,
        );
        tail.fill(0.0);
        self.clock.advance(frames);

        match self.plan {
            PlaybackPlan::Finite { total_samples } if self.clock.position() >= total_samples => {
                self.finish(SessionState::Completed)
            }
            _ => FillStatus::Continue,
        }
    }
}

// ── Session ─────────────────────────────────────────────────

/// A single playback run. Construct, optionally take a [`handle`], then
/// [`start`] it on a sink.
///
/// [`handle`]: PlaybackSession::handle
/// [`start`]: PlaybackSession::start
#[derive(Debug)]
pub struct PlaybackSession {
    config: SessionConfig,
    cancel: CancellationFlag,
    state: StateCell,
}

impl PlaybackSession {
    pub fn new(config: SessionConfig, cancel: CancellationFlag) -> Self {
        PlaybackSession {
            config,
            cancel,
            state: StateCell::new(),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            cancel: self.cancel.clone(),
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Validate the configuration and build the real-time renderer and
    /// stream parameters. Touches no device.
    pub fn prepare(&self) -> Result<(ToneRenderer, StreamSpec), InputError> {
        let config = &self.config;
        let frequencies = FrequencySet::new(&config.frequencies)?;
        if config.sample_rate == 0 {
            return Err(InputError::ZeroSampleRate);
        }
        if config.block_size == 0 {
            return Err(InputError::ZeroBlockSize);
        }
        let plan = PlaybackPlan::from_duration(config.duration, config.sample_rate)?;

        let spec = StreamSpec {
            sample_rate: config.sample_rate,
            channels: config.mode.channels(),
            block_size: config.block_size,
        };
        let renderer = ToneRenderer {
            frequencies,
            mode: config.mode,
            plan,
            sample_rate: config.sample_rate,
            clock: SampleClock::default(),
            cancel: self.cancel.clone(),
            state: self.state.clone(),
        };
        Ok((renderer, spec))
    }

    /// Run the session to its end, blocking the caller.
    ///
    /// Finite plans return after the last sample or on cancellation;
    /// continuous plans only return on cancellation or device failure.
    pub fn start<S: AudioSink>(self, sink: &mut S) -> Result<SessionReport, ToneError> {
        let (renderer, spec) = self.prepare()?;

        info!(
            mode = ?self.config.mode,
            plan = ?renderer.plan,
            sample_rate = spec.sample_rate,
            block_size = spec.block_size,
            "starting playback"
        );
        if self.config.mode == SynthesisMode::Binaural {
            for &f in renderer.frequencies.as_slice() {
                let beat = beat_offset(f);
                info!("binaural beat: left={f:.1}Hz right={:.1}Hz beat={beat:.1}Hz", f + beat);
            }
        }

        self.state.set(SessionState::Running);
        match sink.play(spec, renderer) {
            Ok(finish) => {
                self.state.set(finish.state);
                info!(state = ?finish.state, frames = finish.frames_produced, "playback ended");
                Ok(SessionReport {
                    state: finish.state,
                    frames_produced: finish.frames_produced,
                })
            }
            Err(err) => {
                self.state.set(SessionState::Failed);
                warn!(error = %err, "playback failed");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::oscillator::generate_block;
    use crate::error::DeviceError;

    fn config(freqs: &[f64], mode: SynthesisMode, duration: PlaybackDuration) -> SessionConfig {
        SessionConfig {
            frequencies: freqs.to_vec(),
            mode,
            duration,
            sample_rate: 1000,
            block_size: 64,
        }
    }

    /// Pulls fixed-size blocks, recording what the renderer wrote.
    /// Optionally cancels after `cancel_after` blocks or faults after
    /// `fault_after` blocks.
    #[derive(Default)]
    struct ScriptedSink {
        opened: Option<StreamSpec>,
        blocks: Vec<Vec<f32>>,
        cancel_after: Option<(usize, CancellationFlag)>,
        fault_after: Option<usize>,
        max_blocks: usize,
    }

    impl ScriptedSink {
        fn new() -> Self {
            ScriptedSink {
                max_blocks: 10_000,
                ..Default::default()
            }
        }
    }

    impl AudioSink for ScriptedSink {
        fn play<R: BlockRenderer>(&mut self, spec: StreamSpec, mut renderer: R) -> Result<Finish, DeviceError> {
            self.opened = Some(spec);
            for n in 0..self.max_blocks {
                if self.fault_after == Some(n) {
                    return Err(DeviceError::StreamFault("device unplugged".into()));
                }
                if let Some((after, flag)) = &self.cancel_after {
                    if *after == n {
                        flag.cancel();
                    }
                }
                let mut buf = vec![7.0f32; spec.block_size as usize * spec.channels as usize];
                let status = renderer.render(&mut buf);
                self.blocks.push(buf);
                if let FillStatus::Finished(finish) = status {
                    return Ok(finish);
                }
            }
            Err(DeviceError::StreamFault("block limit reached".into()))
        }
    }

    #[test]
    fn finite_plan_produces_exact_frame_count() {
        // 1 s at 1000 Hz with 64-frame blocks: 15 full blocks + 40 frames.
        let session = PlaybackSession::new(
            config(&[50.0], SynthesisMode::Mono, PlaybackDuration::Finite { seconds: 1 }),
            CancellationFlag::new(),
        );
        let handle = session.handle();
        let mut sink = ScriptedSink::new();
        let report = session.start(&mut sink).expect("session failed");

        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.frames_produced, 1000);
        assert_eq!(handle.state(), SessionState::Completed);
        assert_eq!(sink.blocks.len(), 16);

        let last = sink.blocks.last().unwrap();
        assert!(last[40..].iter().all(|&s| s == 0.0), "tail must be zero padded");

        let played: Vec<f32> = sink.blocks.concat()[..1000].to_vec();
        let reference = generate_block(&[50.0], 1000, 1000, 0, SynthesisMode::Mono);
        for (a, b) in played.iter().zip(&reference) {
            assert_eq!(*a, *b as f32);
        }
    }

    #[test]
    fn finite_plan_on_block_boundary_stops_without_extra_block() {
        let mut cfg = config(&[50.0], SynthesisMode::Mono, PlaybackDuration::Finite { seconds: 1 });
        cfg.block_size = 100;
        let session = PlaybackSession::new(cfg, CancellationFlag::new());
        let mut sink = ScriptedSink::new();
        let report = session.start(&mut sink).unwrap();
        assert_eq!(report.frames_produced, 1000);
        assert_eq!(sink.blocks.len(), 10);
    }

    #[test]
    fn zero_duration_completes_silently() {
        let session = PlaybackSession::new(
            config(&[50.0], SynthesisMode::Binaural, PlaybackDuration::Finite { seconds: 0 }),
            CancellationFlag::new(),
        );
        let mut sink = ScriptedSink::new();
        let report = session.start(&mut sink).unwrap();
        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.frames_produced, 0);
        assert!(sink.blocks[0].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn binaural_opens_two_channels() {
        let session = PlaybackSession::new(
            config(&[200.0], SynthesisMode::Binaural, PlaybackDuration::Finite { seconds: 1 }),
            CancellationFlag::new(),
        );
        let mut sink = ScriptedSink::new();
        let report = session.start(&mut sink).unwrap();
        let spec = sink.opened.unwrap();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.block_size, 64);
        assert_eq!(report.frames_produced, 1000);
        assert_eq!(sink.blocks[0].len(), 128);
    }

    #[test]
    fn cancelled_before_start_produces_nothing() {
        let flag = CancellationFlag::new();
        flag.cancel();
        let session = PlaybackSession::new(
            config(&[440.0], SynthesisMode::Mono, PlaybackDuration::Continuous),
            flag,
        );
        let mut sink = ScriptedSink::new();
        let report = session.start(&mut sink).unwrap();
        assert_eq!(report.state, SessionState::Cancelled);
        assert_eq!(report.frames_produced, 0);
        assert_eq!(sink.blocks.len(), 1);
        assert!(sink.blocks[0].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn continuous_runs_until_cancelled() {
        let flag = CancellationFlag::new();
        let session = PlaybackSession::new(
            config(&[440.0], SynthesisMode::Mono, PlaybackDuration::Continuous),
            flag.clone(),
        );
        let mut sink = ScriptedSink {
            cancel_after: Some((5, flag)),
            ..ScriptedSink::new()
        };
        let report = session.start(&mut sink).unwrap();
        assert_eq!(report.state, SessionState::Cancelled);
        // Five full blocks before the flag was observed, none after.
        assert_eq!(report.frames_produced, 5 * 64);
        assert_eq!(sink.blocks.len(), 6);
    }

    #[test]
    fn cancel_interrupts_finite_plan() {
        let flag = CancellationFlag::new();
        let session = PlaybackSession::new(
            config(&[440.0], SynthesisMode::Binaural, PlaybackDuration::Finite { seconds: 60 }),
            flag.clone(),
        );
        let handle = session.handle();
        let mut sink = ScriptedSink {
            cancel_after: Some((3, flag)),
            ..ScriptedSink::new()
        };
        let report = session.start(&mut sink).unwrap();
        assert_eq!(report.state, SessionState::Cancelled);
        assert_eq!(report.frames_produced, 3 * 64);
        assert_eq!(handle.state(), SessionState::Cancelled);

        // Cancelling again after the end is a no-op.
        handle.cancel();
        assert_eq!(handle.state(), SessionState::Cancelled);
    }

    #[test]
    fn blocks_are_contiguous() {
        let session = PlaybackSession::new(
            config(&[13.0, 97.0], SynthesisMode::Binaural, PlaybackDuration::Finite { seconds: 2 }),
            CancellationFlag::new(),
        );
        let mut sink = ScriptedSink::new();
        session.start(&mut sink).unwrap();
        let played = sink.blocks.concat();
        let reference = generate_block(&[13.0, 97.0], 1000, 2000, 0, SynthesisMode::Binaural);
        assert_eq!(played.len(), 32 * 128);
        for (i, (a, b)) in played.iter().zip(&reference).enumerate() {
            assert_eq!(*a, *b as f32, "mismatch at interleaved sample {i}");
        }
    }

    #[test]
    fn device_fault_fails_session() {
        let session = PlaybackSession::new(
            config(&[440.0], SynthesisMode::Mono, PlaybackDuration::Continuous),
            CancellationFlag::new(),
        );
        let handle = session.handle();
        let mut sink = ScriptedSink {
            fault_after: Some(2),
            ..ScriptedSink::new()
        };
        let err = session.start(&mut sink).unwrap_err();
        assert!(matches!(err, ToneError::Device(DeviceError::StreamFault(_))));
        assert_eq!(handle.state(), SessionState::Failed);
    }

    #[test]
    fn invalid_input_never_opens_device() {
        let cases = [
            (config(&[], SynthesisMode::Mono, PlaybackDuration::Continuous), InputError::EmptyFrequencies),
            (
                config(&[440.0, -1.0], SynthesisMode::Mono, PlaybackDuration::Continuous),
                InputError::InvalidFrequency { index: 1, value: -1.0 },
            ),
            (
                config(&[0.0], SynthesisMode::Binaural, PlaybackDuration::Continuous),
                InputError::InvalidFrequency { index: 0, value: 0.0 },
            ),
            (
                SessionConfig {
                    sample_rate: 0,
                    ..config(&[440.0], SynthesisMode::Mono, PlaybackDuration::Continuous)
                },
                InputError::ZeroSampleRate,
            ),
            (
                SessionConfig {
                    block_size: 0,
                    ..config(&[440.0], SynthesisMode::Mono, PlaybackDuration::Continuous)
                },
                InputError::ZeroBlockSize,
            ),
            (
                config(&[440.0], SynthesisMode::Mono, PlaybackDuration::Finite { seconds: -5 }),
                InputError::NegativeDuration { seconds: -5 },
            ),
        ];

        for (cfg, expected) in cases {
            let session = PlaybackSession::new(cfg, CancellationFlag::new());
            let handle = session.handle();
            let mut sink = ScriptedSink::new();
            match session.start(&mut sink) {
                Err(ToneError::InvalidInput(e)) => assert_eq!(e, expected),
                other => panic!("expected {expected:?}, got {other:?}"),
            }
            assert!(sink.opened.is_none(), "device opened despite invalid input");
            assert_eq!(handle.state(), SessionState::Idle);
        }
    }

    #[test]
    fn nan_frequency_rejected() {
        let err = FrequencySet::new(&[f64::NAN]).unwrap_err();
        assert!(matches!(err, InputError::InvalidFrequency { index: 0, .. }));
    }

    #[test]
    fn renderer_clock_advances_by_frames_written() {
        let session = PlaybackSession::new(
            config(&[440.0], SynthesisMode::Binaural, PlaybackDuration::Continuous),
            CancellationFlag::new(),
        );
        let (mut renderer, _) = session.prepare().unwrap();
        let mut buf = vec![0.0f32; 2 * 10];
        assert_eq!(renderer.render(&mut buf), FillStatus::Continue);
        assert_eq!(renderer.clock().position(), 10);
        let mut odd = vec![0.0f32; 2 * 3];
        renderer.render(&mut odd);
        assert_eq!(renderer.clock().position(), 13);
    }

    #[test]
    fn plan_from_duration() {
        assert_eq!(
            PlaybackPlan::from_duration(PlaybackDuration::Finite { seconds: 90 }, 44100),
            Ok(PlaybackPlan::Finite { total_samples: 90 * 44100 })
        );
        assert_eq!(
            PlaybackPlan::from_duration(PlaybackDuration::Continuous, 44100),
            Ok(PlaybackPlan::Continuous)
        );
    }
}
