//! Cartridge expansion sound chips.
//!
//! The active set is chosen with a [`ChipMask`]; the scheduler holds one
//! [`Expansion`] per enabled chip, always in the order VRC6, VRC7, FDS,
//! MMC5, N163, S5B.

pub mod fds;
pub mod mmc5;
pub mod n163;
pub mod s5b;
pub mod vrc6;
pub mod vrc7;

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use super::audio_chip::AudioChip;
use super::channel::ChannelId;
use crate::mixer::Mixer;

pub use fds::Fds;
pub use mmc5::Mmc5;
pub use n163::N163;
pub use s5b::S5b;
pub use vrc6::Vrc6;
pub use vrc7::Vrc7;

/// Sound chip selector. `Apu` names the internal channels (for register
/// inspection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundChip {
    Apu,
    Vrc6,
    Vrc7,
    Fds,
    Mmc5,
    N163,
    S5b,
}

impl SoundChip {
    /// Construction order of expansion chips
    pub const EXPANSION_ORDER: [SoundChip; 6] = [
        SoundChip::Vrc6,
        SoundChip::Vrc7,
        SoundChip::Fds,
        SoundChip::Mmc5,
        SoundChip::N163,
        SoundChip::S5b,
    ];

    pub const fn mask(self) -> ChipMask {
        match self {
            SoundChip::Apu => ChipMask::NONE,
            SoundChip::Vrc6 => ChipMask::VRC6,
            SoundChip::Vrc7 => ChipMask::VRC7,
            SoundChip::Fds => ChipMask::FDS,
            SoundChip::Mmc5 => ChipMask::MMC5,
            SoundChip::N163 => ChipMask::N163,
            SoundChip::S5b => ChipMask::S5B,
        }
    }
}

/// Bit set of enabled expansion chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChipMask(u8);

impl ChipMask {
    pub const NONE: ChipMask = ChipMask(0);
    pub const VRC6: ChipMask = ChipMask(0x01);
    pub const VRC7: ChipMask = ChipMask(0x02);
    pub const FDS: ChipMask = ChipMask(0x04);
    pub const MMC5: ChipMask = ChipMask(0x08);
    pub const N163: ChipMask = ChipMask(0x10);
    pub const S5B: ChipMask = ChipMask(0x20);
    pub const ALL: ChipMask = ChipMask(0x3F);

    /// Unknown bits are dropped.
    pub const fn from_bits(bits: u8) -> Self {
        ChipMask(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, chip: SoundChip) -> bool {
        let bit = chip.mask().0;
        bit != 0 && self.0 & bit == bit
    }

    /// Enabled chips in construction order
    pub fn chips(self) -> impl Iterator<Item = SoundChip> {
        SoundChip::EXPANSION_ORDER
            .into_iter()
            .filter(move |&chip| self.contains(chip))
    }
}

impl BitOr for ChipMask {
    type Output = ChipMask;

    fn bitor(self, rhs: ChipMask) -> ChipMask {
        ChipMask(self.0 | rhs.0)
    }
}

/// Tracks where output samples fall in CPU time, for chips that synthesize
/// once per output sample rather than per hardware clock.
#[derive(Debug, Clone)]
pub struct SampleClock {
    sample_rate: u32,
    base_clock: u32,
    frame_rate: u32,
    /// Accumulates `sample_rate` per cycle; a sample is due at `base_clock`
    phase: u64,
}

impl Default for SampleClock {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            base_clock: crate::apu::TimingMode::Ntsc.cpu_clock_hz(),
            frame_rate: 60,
            phase: 0,
        }
    }
}

impl SampleClock {
    pub fn configure(&mut self, sample_rate: u32, base_clock: u32, frame_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.base_clock = base_clock.max(1);
        self.frame_rate = frame_rate.max(1);
        self.phase = 0;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn base_clock(&self) -> u32 {
        self.base_clock
    }

    pub fn samples_per_frame(&self) -> u32 {
        self.sample_rate / self.frame_rate
    }

    fn cycles_until_sample(&self) -> u32 {
        let missing = (self.base_clock as u64).saturating_sub(self.phase);
        missing.div_ceil(self.sample_rate as u64).max(1) as u32
    }

    /// Consume up to `time` cycles, stopping early at the next sample.
    /// Returns the cycles consumed and whether a sample is due.
    pub fn step(&mut self, time: u32) -> (u32, bool) {
        let until = self.cycles_until_sample();
        if until > time {
            self.phase += time as u64 * self.sample_rate as u64;
            (time, false)
        } else {
            self.phase += until as u64 * self.sample_rate as u64;
            self.phase -= self.base_clock as u64;
            (until, true)
        }
    }

    pub fn reset(&mut self) {
        self.phase = 0;
    }
}

/// One enabled expansion chip.
pub enum Expansion {
    Vrc6(Vrc6),
    Vrc7(Vrc7),
    Fds(Fds),
    Mmc5(Mmc5),
    N163(N163),
    S5b(S5b),
}

impl Expansion {
    /// `None` for [`SoundChip::Apu`], which is not an expansion.
    pub fn new(chip: SoundChip) -> Option<Self> {
        Some(match chip {
            SoundChip::Apu => return None,
            SoundChip::Vrc6 => Expansion::Vrc6(Vrc6::new()),
            SoundChip::Vrc7 => Expansion::Vrc7(Vrc7::new()),
            SoundChip::Fds => Expansion::Fds(Fds::new()),
            SoundChip::Mmc5 => Expansion::Mmc5(Mmc5::new()),
            SoundChip::N163 => Expansion::N163(N163::new()),
            SoundChip::S5b => Expansion::S5b(S5b::new()),
        })
    }

    pub fn chip(&self) -> SoundChip {
        match self {
            Expansion::Vrc6(_) => SoundChip::Vrc6,
            Expansion::Vrc7(_) => SoundChip::Vrc7,
            Expansion::Fds(_) => SoundChip::Fds,
            Expansion::Mmc5(_) => SoundChip::Mmc5,
            Expansion::N163(_) => SoundChip::N163,
            Expansion::S5b(_) => SoundChip::S5b,
        }
    }

    fn inner(&self) -> &dyn AudioChip {
        match self {
            Expansion::Vrc6(chip) => chip,
            Expansion::Vrc7(chip) => chip,
            Expansion::Fds(chip) => chip,
            Expansion::Mmc5(chip) => chip,
            Expansion::N163(chip) => chip,
            Expansion::S5b(chip) => chip,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn AudioChip {
        match self {
            Expansion::Vrc6(chip) => chip,
            Expansion::Vrc7(chip) => chip,
            Expansion::Fds(chip) => chip,
            Expansion::Mmc5(chip) => chip,
            Expansion::N163(chip) => chip,
            Expansion::S5b(chip) => chip,
        }
    }
}

impl AudioChip for Expansion {
    fn write(&mut self, address: u16, value: u8, mixer: &mut Mixer) {
        self.inner_mut().write(address, value, mixer);
    }

    fn read(&mut self, address: u16) -> Option<u8> {
        self.inner_mut().read(address)
    }

    fn process(&mut self, cycles: u32, mixer: &mut Mixer) {
        self.inner_mut().process(cycles, mixer);
    }

    fn end_frame(&mut self) {
        self.inner_mut().end_frame();
    }

    fn reset(&mut self) {
        self.inner_mut().reset();
    }

    fn set_sample_speed(&mut self, sample_rate: u32, base_clock: u32, frame_rate: u32) {
        self.inner_mut()
            .set_sample_speed(sample_rate, base_clock, frame_rate);
    }

    fn channels(&self) -> &'static [ChannelId] {
        self.inner().channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_bits_follow_chip_order() {
        let mask = ChipMask::from_bits(0xFF);
        assert_eq!(mask, ChipMask::ALL);
        let chips: Vec<_> = mask.chips().collect();
        assert_eq!(chips, SoundChip::EXPANSION_ORDER.to_vec());

        let mask = ChipMask::S5B | ChipMask::VRC6;
        let chips: Vec<_> = mask.chips().collect();
        assert_eq!(chips, vec![SoundChip::Vrc6, SoundChip::S5b]);
        assert!(!mask.contains(SoundChip::Apu));
    }

    #[test]
    fn sample_clock_spaces_samples_evenly() {
        let mut clock = SampleClock::default();
        clock.configure(1_000, 10_000, 50);

        let mut samples = 0;
        let mut elapsed = 0;
        while elapsed < 100_000 {
            let (used, due) = clock.step(3_000);
            elapsed += used;
            if due {
                samples += 1;
                assert_eq!(elapsed % 10, 0);
            }
        }
        assert_eq!(samples, 10_000);
        assert_eq!(clock.samples_per_frame(), 20);
    }

    #[test]
    fn every_chip_reports_its_channels() {
        for chip in SoundChip::EXPANSION_ORDER {
            let expansion = Expansion::new(chip).unwrap();
            assert_eq!(expansion.chip(), chip);
            assert!(!expansion.channels().is_empty());
            for channel in expansion.channels() {
                assert_eq!(channel.level_group().index(), chip_group(chip));
            }
        }
        assert!(Expansion::new(SoundChip::Apu).is_none());
    }

    fn chip_group(chip: SoundChip) -> usize {
        use crate::mixer::ChipLevel;
        match chip {
            SoundChip::Vrc6 => ChipLevel::Vrc6,
            SoundChip::Vrc7 => ChipLevel::Vrc7,
            SoundChip::Fds => ChipLevel::Fds,
            SoundChip::Mmc5 => ChipLevel::Mmc5,
            SoundChip::N163 => ChipLevel::N163,
            SoundChip::S5b => ChipLevel::S5b,
            SoundChip::Apu => ChipLevel::Apu1,
        }
        .index()
    }
}
