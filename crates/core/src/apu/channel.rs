//! Channel identity and the shared "push a level to the mixer" plumbing.

use serde::Serialize;

use crate::mixer::{ChipLevel, Mixer};

/// Every sound channel the mixer knows about, internal and expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ChannelId {
    Square1,
    Square2,
    Triangle,
    Noise,
    Dpcm,
    Vrc6Pulse1,
    Vrc6Pulse2,
    Vrc6Sawtooth,
    Mmc5Square1,
    Mmc5Square2,
    Mmc5Voice,
    N163Ch1,
    N163Ch2,
    N163Ch3,
    N163Ch4,
    N163Ch5,
    N163Ch6,
    N163Ch7,
    N163Ch8,
    Fds,
    Vrc7Ch1,
    Vrc7Ch2,
    Vrc7Ch3,
    Vrc7Ch4,
    Vrc7Ch5,
    Vrc7Ch6,
    S5bCh1,
    S5bCh2,
    S5bCh3,
}

pub const CHANNEL_COUNT: usize = 29;

impl ChannelId {
    pub const ALL: [ChannelId; CHANNEL_COUNT] = [
        ChannelId::Square1,
        ChannelId::Square2,
        ChannelId::Triangle,
        ChannelId::Noise,
        ChannelId::Dpcm,
        ChannelId::Vrc6Pulse1,
        ChannelId::Vrc6Pulse2,
        ChannelId::Vrc6Sawtooth,
        ChannelId::Mmc5Square1,
        ChannelId::Mmc5Square2,
        ChannelId::Mmc5Voice,
        ChannelId::N163Ch1,
        ChannelId::N163Ch2,
        ChannelId::N163Ch3,
        ChannelId::N163Ch4,
        ChannelId::N163Ch5,
        ChannelId::N163Ch6,
        ChannelId::N163Ch7,
        ChannelId::N163Ch8,
        ChannelId::Fds,
        ChannelId::Vrc7Ch1,
        ChannelId::Vrc7Ch2,
        ChannelId::Vrc7Ch3,
        ChannelId::Vrc7Ch4,
        ChannelId::Vrc7Ch5,
        ChannelId::Vrc7Ch6,
        ChannelId::S5bCh1,
        ChannelId::S5bCh2,
        ChannelId::S5bCh3,
    ];

    pub const N163: [ChannelId; 8] = [
        ChannelId::N163Ch1,
        ChannelId::N163Ch2,
        ChannelId::N163Ch3,
        ChannelId::N163Ch4,
        ChannelId::N163Ch5,
        ChannelId::N163Ch6,
        ChannelId::N163Ch7,
        ChannelId::N163Ch8,
    ];

    pub const VRC7: [ChannelId; 6] = [
        ChannelId::Vrc7Ch1,
        ChannelId::Vrc7Ch2,
        ChannelId::Vrc7Ch3,
        ChannelId::Vrc7Ch4,
        ChannelId::Vrc7Ch5,
        ChannelId::Vrc7Ch6,
    ];

    pub const S5B: [ChannelId; 3] = [ChannelId::S5bCh1, ChannelId::S5bCh2, ChannelId::S5bCh3];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// The mixer group whose output curve and gain this channel feeds.
    pub const fn level_group(self) -> ChipLevel {
        use ChannelId::*;
        match self {
            Square1 | Square2 => ChipLevel::Apu1,
            Triangle | Noise | Dpcm => ChipLevel::Apu2,
            Vrc6Pulse1 | Vrc6Pulse2 | Vrc6Sawtooth => ChipLevel::Vrc6,
            Mmc5Square1 | Mmc5Square2 | Mmc5Voice => ChipLevel::Mmc5,
            N163Ch1 | N163Ch2 | N163Ch3 | N163Ch4 | N163Ch5 | N163Ch6 | N163Ch7 | N163Ch8 => {
                ChipLevel::N163
            }
            Fds => ChipLevel::Fds,
            Vrc7Ch1 | Vrc7Ch2 | Vrc7Ch3 | Vrc7Ch4 | Vrc7Ch5 | Vrc7Ch6 => ChipLevel::Vrc7,
            S5bCh1 | S5bCh2 | S5bCh3 => ChipLevel::S5b,
        }
    }
}

/// A channel's connection to the mixer.
///
/// Holds the channel's own cycle position within the current frame and the
/// last level it reported. Levels are only forwarded when they change, and
/// are timestamped with the channel's local time, not the scheduler's.
#[derive(Debug, Clone)]
pub struct ChannelOutput {
    id: ChannelId,
    time: u32,
    level: i32,
}

impl ChannelOutput {
    pub fn new(id: ChannelId) -> Self {
        Self { id, time: 0, level: 0 }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Cycles elapsed since the start of the frame
    pub fn time(&self) -> u32 {
        self.time
    }

    /// Last level sent to the mixer
    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn advance(&mut self, cycles: u32) {
        self.time += cycles;
    }

    /// Report `level` at the current local time.
    pub fn mix(&mut self, mixer: &mut Mixer, level: i32) {
        if level != self.level {
            mixer.add_value(self.id, level, self.time);
            self.level = level;
        }
    }

    /// Frame boundary: local time restarts at zero.
    pub fn end_frame(&mut self) {
        self.time = 0;
    }

    /// Forget time and level. The mixer is cleared separately.
    pub fn reset(&mut self) {
        self.time = 0;
        self.level = 0;
    }
}
