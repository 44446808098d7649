use thiserror::Error;

/// Byte range into the text a `ParseError` was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Top-level error returned by a playback session.
#[derive(Debug, Error)]
pub enum ToneError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("audio device error: {0}")]
    Device(#[from] DeviceError),
}

/// A violated input constraint. Detected before any device stream is opened.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("frequency list is empty")]
    EmptyFrequencies,

    #[error("frequency #{index} must be a positive number of Hz, got {value}")]
    InvalidFrequency { index: usize, value: f64 },

    #[error("sample rate must be positive")]
    ZeroSampleRate,

    #[error("block size must be positive")]
    ZeroBlockSize,

    #[error("duration must not be negative, got {seconds}s")]
    NegativeDuration { seconds: i64 },

    #[error("duration of {hours}h {minutes}m is too long")]
    DurationOverflow { hours: i64, minutes: i64 },

    #[error("a continuous plan has no end and cannot be rendered offline")]
    UnboundedRender,
}

/// Failure of the audio output facility. Fatal to the session.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no default output device")]
    NoDevice,

    #[cfg(feature = "device")]
    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "device")]
    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "device")]
    #[error("failed to play output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format '{0}'")]
    UnsupportedFormat(String),

    #[error("output stream fault: {0}")]
    StreamFault(String),

    #[error("output stream ended without reporting a final state")]
    Disconnected,
}

/// Error from parsing a textual frequency list.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at pos {}", .span.start)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("expected at least one frequency")]
    Empty,

    #[error("empty entry in frequency list")]
    EmptyEntry,

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("frequency must be positive, got {0}")]
    NonPositive(f64),
}
