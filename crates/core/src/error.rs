use thiserror::Error;

/// Highest output rate the mixer accepts.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Errors raised while configuring an audio session.
///
/// Register traffic never fails; only session setup can.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApuError {
    #[error("invalid sample rate {0} Hz (expected 1..={MAX_SAMPLE_RATE})")]
    InvalidSampleRate(u32),
    #[error("invalid channel count {0} (expected 1 or 2)")]
    InvalidChannelCount(u8),
    #[error("could not allocate an audio buffer of {samples} samples")]
    BufferAllocation { samples: usize },
}
