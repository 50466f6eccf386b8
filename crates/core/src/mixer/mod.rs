//! Band-limited mixer.
//!
//! Channels never produce samples. They report level *changes* stamped with
//! a CPU-cycle time inside the current frame. The mixer converts each change
//! of a chip group's combined output into a delta, spreads it over the two
//! output samples that straddle the change (a box filter), and integrates the
//! deltas when samples are read.
//!
//! Chip groups:
//! - **APU1**: both squares through the nonlinear pulse curve
//! - **APU2**: triangle, noise and DPCM through the nonlinear TND curve
//! - **VRC6**, **VRC7**, **FDS**, **N163**, **S5B**: linear sums
//! - **MMC5**: squares on the pulse curve plus the 8-bit PCM voice
//!
//! Each group has a gain (from dB offsets) applied before deltas are taken,
//! so gain changes never leave a DC step in the integrator.

pub mod filter;

use serde::{Deserialize, Serialize};

use crate::apu::channel::{ChannelId, CHANNEL_COUNT};
use crate::config::MixerSettings;
use crate::error::ApuError;
use crate::logging::{log, LogCategory, LogLevel};
use filter::FilterChain;

/// Gain groups the mixer combines channels into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipLevel {
    Apu1,
    Apu2,
    Vrc6,
    Vrc7,
    Mmc5,
    Fds,
    N163,
    S5b,
}

pub const CHIP_LEVEL_COUNT: usize = 8;

impl ChipLevel {
    pub const ALL: [ChipLevel; CHIP_LEVEL_COUNT] = [
        ChipLevel::Apu1,
        ChipLevel::Apu2,
        ChipLevel::Vrc6,
        ChipLevel::Vrc7,
        ChipLevel::Mmc5,
        ChipLevel::Fds,
        ChipLevel::N163,
        ChipLevel::S5b,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Full-scale float output maps to this many i16 steps.
const OUTPUT_SCALE: f32 = 24_000.0;

/// Slots past the end of a frame kept for deltas that straddle the boundary.
const GUARD_SAMPLES: usize = 4;

// Peak group outputs are chosen to sit near the internal squares (~0.26).
const VRC6_SCALE: f32 = 0.1494 / 15.0;
const FDS_SCALE: f32 = 0.358 / 2016.0;
const N163_SCALE: f32 = 0.30 / 120.0;
const VRC7_SCALE: f32 = 0.25 / 4095.0;
const S5B_SCALE: f32 = 0.15 / 4095.0;

fn pulse_curve(sum: f32) -> f32 {
    if sum <= 0.0 {
        0.0
    } else {
        95.88 / (8128.0 / sum + 100.0)
    }
}

fn tnd_curve(triangle: f32, noise: f32, dpcm: f32) -> f32 {
    let weighted = triangle / 8227.0 + noise / 12241.0 + dpcm / 22638.0;
    if weighted <= 0.0 {
        0.0
    } else {
        159.79 / (1.0 / weighted + 100.0)
    }
}

/// Converts a dB offset into a linear gain.
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

pub struct Mixer {
    clock_rate: u32,
    sample_rate: u32,
    channels: u8,
    /// Pending deltas; index 0 is the next sample to be read
    deltas: Vec<f32>,
    /// Fractional sample position of the current frame's cycle 0
    frame_offset: f64,
    available: usize,
    integrator: f32,
    levels: [i32; CHANNEL_COUNT],
    peaks: [i32; CHANNEL_COUNT],
    meters: [i32; CHANNEL_COUNT],
    group_output: [f32; CHIP_LEVEL_COUNT],
    chip_gain: [f32; CHIP_LEVEL_COUNT],
    n163_channels: u8,
    settings: MixerSettings,
    volume: f32,
    filter: FilterChain,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            clock_rate: crate::apu::TimingMode::Ntsc.cpu_clock_hz(),
            sample_rate: 44_100,
            channels: 1,
            deltas: Vec::new(),
            frame_offset: 0.0,
            available: 0,
            integrator: 0.0,
            levels: [0; CHANNEL_COUNT],
            peaks: [0; CHANNEL_COUNT],
            meters: [0; CHANNEL_COUNT],
            group_output: [0.0; CHIP_LEVEL_COUNT],
            chip_gain: [1.0; CHIP_LEVEL_COUNT],
            n163_channels: 1,
            settings: MixerSettings::default(),
            volume: 1.0,
            filter: FilterChain::default(),
        }
    }

    /// Size the delta buffer for `samples_per_frame` output samples.
    pub fn allocate_buffer(
        &mut self,
        samples_per_frame: usize,
        sample_rate: u32,
        channels: u8,
    ) -> Result<(), ApuError> {
        let len = samples_per_frame * 2 + GUARD_SAMPLES;
        let mut deltas = Vec::new();
        deltas
            .try_reserve_exact(len)
            .map_err(|_| ApuError::BufferAllocation { samples: len })?;
        deltas.resize(len, 0.0);

        self.deltas = deltas;
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.filter.configure(sample_rate, &self.settings);
        self.clear_buffer();

        log(LogCategory::Mixer, LogLevel::Info, || {
            format!(
                "buffer: {} slots, {} Hz, {} channel(s)",
                len, sample_rate, channels
            )
        });
        Ok(())
    }

    pub fn set_clock_rate(&mut self, clock_rate: u32) {
        self.clock_rate = clock_rate;
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn settings(&self) -> MixerSettings {
        self.settings
    }

    pub fn update_settings(&mut self, settings: MixerSettings) {
        self.settings = settings;
        self.volume = settings.volume as f32 / 100.0;
        self.filter.configure(self.sample_rate, &settings);
        log(LogCategory::Mixer, LogLevel::Debug, || {
            format!(
                "filters: low cut {} Hz, high cut {} Hz, damp {} dB, volume {}%",
                settings.low_cut, settings.high_cut, settings.high_damp, settings.volume
            )
        });
    }

    /// Set a group's linear gain (1.0 is nominal).
    pub fn set_chip_level(&mut self, chip: ChipLevel, gain: f32) {
        self.chip_gain[chip.index()] = gain;
    }

    pub fn chip_gain(&self, chip: ChipLevel) -> f32 {
        self.chip_gain[chip.index()]
    }

    /// Active N163 channels; the N163 group output is averaged over them.
    pub fn set_n163_channels(&mut self, count: u8) {
        self.n163_channels = count.clamp(1, 8);
    }

    /// Record a channel's new level at `time` cycles into the frame.
    pub fn add_value(&mut self, channel: ChannelId, level: i32, time: u32) {
        let idx = channel.index();
        self.levels[idx] = level;
        self.peaks[idx] = self.peaks[idx].max(level.abs());

        let group = channel.level_group();
        let output = self.group_amplitude(group) * self.chip_gain[group.index()];
        let delta = output - self.group_output[group.index()];
        if delta == 0.0 {
            return;
        }
        self.group_output[group.index()] = output;
        self.add_delta(time, delta);
    }

    fn ratio(&self) -> f64 {
        self.sample_rate as f64 / self.clock_rate as f64
    }

    fn add_delta(&mut self, time: u32, delta: f32) {
        if self.deltas.len() < 2 {
            return;
        }
        let position = self.frame_offset + time as f64 * self.ratio();
        let whole = position.floor();
        let mut index = whole as usize;
        let mut frac = (position - whole) as f32;

        let last = self.deltas.len() - 2;
        if index > last {
            log(LogCategory::Mixer, LogLevel::Warn, || {
                format!(
                    "delta at cycle {} lands past the buffer (slot {}), clamped",
                    time, index
                )
            });
            index = last;
            frac = 1.0;
        }
        self.deltas[index] += delta * (1.0 - frac);
        self.deltas[index + 1] += delta * frac;
    }

    fn group_amplitude(&self, group: ChipLevel) -> f32 {
        let level = |id: ChannelId| self.levels[id.index()] as f32;
        let sum = |ids: &[ChannelId]| ids.iter().map(|&id| level(id)).sum::<f32>();

        match group {
            ChipLevel::Apu1 => pulse_curve(level(ChannelId::Square1) + level(ChannelId::Square2)),
            ChipLevel::Apu2 => tnd_curve(
                level(ChannelId::Triangle),
                level(ChannelId::Noise),
                level(ChannelId::Dpcm),
            ),
            ChipLevel::Vrc6 => {
                sum(&[
                    ChannelId::Vrc6Pulse1,
                    ChannelId::Vrc6Pulse2,
                    ChannelId::Vrc6Sawtooth,
                ]) * VRC6_SCALE
            }
            ChipLevel::Mmc5 => {
                pulse_curve(level(ChannelId::Mmc5Square1) + level(ChannelId::Mmc5Square2))
                    + tnd_curve(0.0, 0.0, level(ChannelId::Mmc5Voice) / 2.0)
            }
            ChipLevel::Fds => level(ChannelId::Fds) * FDS_SCALE,
            ChipLevel::N163 => {
                sum(&ChannelId::N163) / self.n163_channels as f32 * N163_SCALE
            }
            ChipLevel::Vrc7 => sum(&ChannelId::VRC7) * VRC7_SCALE,
            ChipLevel::S5b => sum(&ChannelId::S5B) * S5B_SCALE,
        }
    }

    /// Close the frame that spanned `frame_cycles` CPU cycles. Returns the
    /// number of complete samples now readable.
    pub fn finish_buffer(&mut self, frame_cycles: u32) -> usize {
        let end = self.frame_offset + frame_cycles as f64 * self.ratio();
        let limit = self.deltas.len().saturating_sub(1);
        self.available = (end.floor() as usize).min(limit);
        self.frame_offset = end;

        self.meters = self.peaks;
        for (peak, level) in self.peaks.iter_mut().zip(self.levels.iter()) {
            *peak = level.abs();
        }
        self.available
    }

    pub fn samples_available(&self) -> usize {
        self.available
    }

    /// Integrate, filter and convert up to `count` samples into `dest`.
    ///
    /// Stereo output duplicates each sample into an interleaved pair. Returns
    /// the number of sample frames written.
    pub fn read_buffer(&mut self, count: usize, dest: &mut [i16], stereo: bool) -> usize {
        let width = if stereo { 2 } else { 1 };
        let n = count.min(self.available).min(dest.len() / width);
        let scale = self.volume * OUTPUT_SCALE;

        for (i, delta) in self.deltas[..n].iter().enumerate() {
            self.integrator += delta;
            let filtered = self.filter.process(self.integrator);
            let sample = (filtered * scale).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            dest[i * width..(i + 1) * width].fill(sample);
        }

        self.deltas.copy_within(n.., 0);
        let len = self.deltas.len();
        self.deltas[len - n..].fill(0.0);
        self.available -= n;
        self.frame_offset -= n as f64;
        n
    }

    /// Drop all pending audio and channel state.
    pub fn clear_buffer(&mut self) {
        self.deltas.fill(0.0);
        self.frame_offset = 0.0;
        self.available = 0;
        self.integrator = 0.0;
        self.levels = [0; CHANNEL_COUNT];
        self.peaks = [0; CHANNEL_COUNT];
        self.meters = [0; CHANNEL_COUNT];
        self.group_output = [0.0; CHIP_LEVEL_COUNT];
        self.filter.reset();
    }

    /// Last level a channel reported
    pub fn level(&self, channel: ChannelId) -> i32 {
        self.levels[channel.index()]
    }

    /// Meter reading: the larger of last frame's peak and the current level.
    pub fn chan_output(&self, channel: ChannelId) -> i32 {
        let idx = channel.index();
        self.meters[idx].max(self.levels[idx].abs())
    }
}
