//! NES/Famicom APU with cartridge expansion audio.
//!
//! ## Components
//!
//! - **Scheduler** ([`Apu`]): owns the cycle budget, the register router and
//!   every channel and chip
//! - **Frame Sequencer**: quarter/half/full frame clocks in 4- or 5-step mode
//! - **Pulse Channel**: square wave with duty, envelope, sweep and length
//! - **Triangle Channel**: 32-step triangle with linear and length counters
//! - **Noise Channel**: 15-bit LFSR in long or short mode
//! - **DMC**: delta-modulated sample playback from [`crate::SampleMemory`]
//!
//! ## Expansion Chips
//!
//! VRC6, VRC7, FDS, MMC5, N163 and Sunsoft 5B, behind the [`AudioChip`]
//! trait. See [`expansion`].
//!
//! ## Timing Support
//!
//! NTSC and PAL differ only in clock rate, frame rate, sequencer period and
//! the noise/DMC period tables; see [`TimingMode`].

pub mod audio_chip;
pub mod channel;
pub mod dmc;
pub mod envelope;
pub mod expansion;
pub mod frame_counter;
pub mod length_counter;
pub mod noise;
pub mod pulse;
pub mod registers;
pub mod scheduler;
pub mod sweep;
pub mod timing;
pub mod triangle;

pub use audio_chip::AudioChip;
pub use channel::{ChannelId, ChannelOutput, CHANNEL_COUNT};
pub use dmc::DmcChannel;
pub use envelope::Envelope;
pub use expansion::{ChipMask, Expansion, SoundChip};
pub use frame_counter::{FrameEvents, FrameSequencer, SequencerMode};
pub use length_counter::{LengthCounter, LENGTH_TABLE};
pub use noise::NoiseChannel;
pub use pulse::PulseChannel;
pub use registers::RegisterShadow;
pub use scheduler::Apu;
pub use sweep::SweepUnit;
pub use timing::TimingMode;
pub use triangle::TriangleChannel;
