//! Cycle-stepped NES APU and expansion sound chips.
//!
//! Feed the [`Apu`] CPU cycles and register writes; it pushes finished
//! 16-bit PCM frames to an [`AudioSink`] once per video frame.

pub mod apu;
pub mod config;
pub mod error;
pub mod logging;
pub mod mixer;
pub mod session;

pub use apu::{Apu, ChannelId, ChipMask, SoundChip, TimingMode};
pub use config::{ApuConfig, ChipLevels, MixerSettings};
pub use error::ApuError;
pub use mixer::ChipLevel;
pub use session::{
    AudioSink, BufferedSink, FrameObserver, NullSink, RegisterTrace, SampleBank, SampleMemory,
};
