//! Session configuration.
//!
//! Everything a host sets before (or between) runs: output format, machine
//! region, expansion chips and mixer tuning. All structs deserialize with
//! defaults for missing fields, so a config file only lists what it changes.

use serde::{Deserialize, Serialize};

use crate::apu::expansion::ChipMask;
use crate::apu::TimingMode;
use crate::mixer::ChipLevel;

/// Output filter and volume settings, applied with [`crate::Apu::setup_mixer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    /// High-pass corner in Hz (0 disables)
    pub low_cut: u32,
    /// Low-pass corner in Hz
    pub high_cut: u32,
    /// Attenuation above `high_cut`, in dB
    pub high_damp: u32,
    /// Master volume in percent
    pub volume: u32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            low_cut: 16,
            high_cut: 12_000,
            high_damp: 24,
            volume: 100,
        }
    }
}

/// Per-chip gain offsets in dB. Zero leaves a chip at its nominal level.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipLevels {
    pub apu1: f32,
    pub apu2: f32,
    pub vrc6: f32,
    pub vrc7: f32,
    pub mmc5: f32,
    pub fds: f32,
    pub n163: f32,
    pub s5b: f32,
}

impl ChipLevels {
    pub fn get(&self, chip: ChipLevel) -> f32 {
        match chip {
            ChipLevel::Apu1 => self.apu1,
            ChipLevel::Apu2 => self.apu2,
            ChipLevel::Vrc6 => self.vrc6,
            ChipLevel::Vrc7 => self.vrc7,
            ChipLevel::Mmc5 => self.mmc5,
            ChipLevel::Fds => self.fds,
            ChipLevel::N163 => self.n163,
            ChipLevel::S5b => self.s5b,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChipLevel, f32)> + '_ {
        ChipLevel::ALL.into_iter().map(move |chip| (chip, self.get(chip)))
    }
}

/// Complete description of an audio session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApuConfig {
    pub sample_rate: u32,
    /// 1 (mono) or 2 (interleaved stereo, both sides identical)
    pub channels: u8,
    pub machine: TimingMode,
    pub expansion: ChipMask,
    pub mixer: MixerSettings,
    pub chip_levels: ChipLevels,
}

impl Default for ApuConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            machine: TimingMode::Ntsc,
            expansion: ChipMask::NONE,
            mixer: MixerSettings::default(),
            chip_levels: ChipLevels::default(),
        }
    }
}

impl ApuConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
