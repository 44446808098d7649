//! Output boundary: what a playback session needs from an audio device.
//!
//! A sink opens a stream for a [`StreamSpec`], repeatedly hands interleaved
//! `f32` buffers to a [`BlockRenderer`], and returns once the renderer has
//! reported [`FillStatus::Finished`] or the device has failed.

use std::time::Duration;

use crate::error::DeviceError;
use crate::session::SessionState;

/// Stream parameters requested by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per callback.
    pub block_size: u32,
}

/// How a session ended, as reported by its renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finish {
    /// `Completed` or `Cancelled`.
    pub state: SessionState,
    pub frames_produced: u64,
}

/// Result of one block-fill step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// Keep the stream running.
    Continue,
    /// The buffer just filled is the last one; stop the stream after it.
    Finished(Finish),
}

/// The real-time side of a session. `render` is called from the device
/// callback and must not block, lock, log, or allocate.
pub trait BlockRenderer: Send + 'static {
    /// Fill `out` (interleaved, `out.len() / channels` frames).
    fn render(&mut self, out: &mut [f32]) -> FillStatus;
}

/// An audio output facility.
pub trait AudioSink {
    /// Open a stream for `spec`, drive `renderer` until it finishes, and
    /// block the caller until the stream has stopped.
    fn play<R: BlockRenderer>(&mut self, spec: StreamSpec, renderer: R) -> Result<Finish, DeviceError>;
}

/// Upper bound on silent callbacks spent draining after a finish, for
/// backends that report no usable latency.
const MAX_DRAIN_CALLBACKS: u32 = 64;

/// Silence still owed to the device before the last rendered block has
/// been played out. Covers the device's queued latency plus the final
/// block itself.
#[cfg_attr(not(feature = "device"), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Drain {
    owed: Duration,
    callbacks: u32,
}

#[cfg_attr(not(feature = "device"), allow(dead_code))]
impl Drain {
    pub(crate) fn new(latency: Duration, final_block: Duration) -> Self {
        Drain {
            owed: latency + final_block,
            callbacks: 0,
        }
    }

    /// Account for one silent callback lasting `played`. Returns `true`
    /// once the final block has left the device.
    pub(crate) fn on_silence(&mut self, played: Duration) -> bool {
        self.callbacks += 1;
        self.owed = self.owed.saturating_sub(played);
        self.owed.is_zero() || self.callbacks >= MAX_DRAIN_CALLBACKS
    }
}

#[cfg_attr(not(feature = "device"), allow(dead_code))]
pub(crate) fn frames_duration(samples: usize, channels: u16, sample_rate: u32) -> Duration {
    let frames = samples / channels.max(1) as usize;
    Duration::from_secs_f64(frames as f64 / sample_rate.max(1) as f64)
}

#[cfg(feature = "device")]
pub use self::cpal_sink::CpalSink;

#[cfg(feature = "device")]
mod cpal_sink {
    use std::sync::mpsc::{self, Receiver, SyncSender};

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample, SizedSample};
    use tracing::{debug, error, info};

    use super::{AudioSink, BlockRenderer, Drain, Finish, FillStatus, StreamSpec, frames_duration};
    use crate::error::DeviceError;

    /// Messages from the callback threads to the thread waiting in `play`.
    enum StreamEvent {
        Finished(Finish),
        Fault(String),
    }

    /// Plays through the host's default output device.
    ///
    /// After the session finishes, `play` keeps the stream open, writing
    /// silence, until the device's reported output latency plus the final
    /// block have been played out. Backends reporting no latency get the
    /// final block only, capped at a fixed number of callbacks.
    #[derive(Debug, Default)]
    pub struct CpalSink {
        _private: (),
    }

    impl CpalSink {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl AudioSink for CpalSink {
        fn play<R: BlockRenderer>(&mut self, spec: StreamSpec, renderer: R) -> Result<Finish, DeviceError> {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;
            if let Ok(name) = device.name() {
                info!(device = %name, "output device");
            }

            let default_config = device.default_output_config()?;
            let config = cpal::StreamConfig {
                channels: spec.channels,
                sample_rate: cpal::SampleRate(spec.sample_rate),
                buffer_size: cpal::BufferSize::Fixed(spec.block_size),
            };
            debug!(?config, format = ?default_config.sample_format(), "opening output stream");

            let (events_tx, events_rx) = mpsc::sync_channel(2);

            let stream = match default_config.sample_format() {
                cpal::SampleFormat::I8 => build_stream::<i8, R>(&device, &config, spec, renderer, events_tx)?,
                cpal::SampleFormat::I16 => build_stream::<i16, R>(&device, &config, spec, renderer, events_tx)?,
                cpal::SampleFormat::I32 => build_stream::<i32, R>(&device, &config, spec, renderer, events_tx)?,
                cpal::SampleFormat::U8 => build_stream::<u8, R>(&device, &config, spec, renderer, events_tx)?,
                cpal::SampleFormat::U16 => build_stream::<u16, R>(&device, &config, spec, renderer, events_tx)?,
                cpal::SampleFormat::U32 => build_stream::<u32, R>(&device, &config, spec, renderer, events_tx)?,
                cpal::SampleFormat::F32 => build_stream::<f32, R>(&device, &config, spec, renderer, events_tx)?,
                cpal::SampleFormat::F64 => build_stream::<f64, R>(&device, &config, spec, renderer, events_tx)?,
                sample_format => return Err(DeviceError::UnsupportedFormat(format!("{sample_format}"))),
            };

            stream.play()?;
            debug!("output stream started");

            let result = wait_for_end(&events_rx);
            drop(stream);
            debug!("output stream closed");
            result
        }
    }

    fn wait_for_end(events: &Receiver<StreamEvent>) -> Result<Finish, DeviceError> {
        match events.recv() {
            Ok(StreamEvent::Finished(finish)) => Ok(finish),
            Ok(StreamEvent::Fault(message)) => {
                error!(%message, "output stream fault");
                Err(DeviceError::StreamFault(message))
            }
            Err(_) => Err(DeviceError::Disconnected),
        }
    }

    fn build_stream<T, R>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        spec: StreamSpec,
        mut renderer: R,
        events: SyncSender<StreamEvent>,
    ) -> Result<cpal::Stream, DeviceError>
    where
        T: SizedSample + FromSample<f32>,
        R: BlockRenderer,
    {
        let fault_tx = events.clone();
        let mut scratch = vec![0.0f32; spec.block_size as usize * spec.channels as usize];
        // Set once the renderer has finished; reported once the final block
        // has drained out of the device.
        let mut pending: Option<(Finish, Drain)> = None;
        let mut reported = false;

        let stream = device.build_output_stream(
            config,
            move |output: &mut [T], info: &cpal::OutputCallbackInfo| {
                if let Some((finish, drain)) = pending.as_mut() {
                    output.fill(T::EQUILIBRIUM);
                    let played = frames_duration(output.len(), spec.channels, spec.sample_rate);
                    if !reported && drain.on_silence(played) {
                        reported = events.try_send(StreamEvent::Finished(*finish)).is_ok();
                    }
                    return;
                }

                if scratch.len() < output.len() {
                    // Only when the device hands over more than one block.
                    scratch.resize(output.len(), 0.0);
                }
                let buf = &mut scratch[..output.len()];
                if let FillStatus::Finished(finish) = renderer.render(buf) {
                    let ts = info.timestamp();
                    let latency = ts.playback.duration_since(&ts.callback).unwrap_or_default();
                    let final_block = frames_duration(output.len(), spec.channels, spec.sample_rate);
                    pending = Some((finish, Drain::new(latency, final_block)));
                }
                for (dst, &src) in output.iter_mut().zip(buf.iter()) {
                    *dst = T::from_sample(src);
                }
            },
            move |err| {
                let _ = fault_tx.try_send(StreamEvent::Fault(err.to_string()));
            },
            None,
        )?;

        Ok(stream)
    }
}
