//! Sunsoft 5B: three square tone channels with shared noise and envelope
//! generators (an AY-3-8910 derivative).
//!
//! - `$C000`: register select
//! - `$E000`: register data
//!
//! The generators are advanced by the CPU cycles between output samples and
//! the channel levels are sampled at the output rate.

use super::SampleClock;
use crate::apu::audio_chip::AudioChip;
use crate::apu::channel::{ChannelId, ChannelOutput};
use crate::mixer::Mixer;

const MAX_LEVEL: f64 = 4095.0;
const DB_PER_STEP: f64 = 1.5;

/// 32-step logarithmic output curve; index 0 is silent.
fn volume_table() -> [i32; 32] {
    std::array::from_fn(|index| {
        if index == 0 {
            0
        } else {
            let attenuation = (31 - index) as f64 * DB_PER_STEP;
            (MAX_LEVEL * 10f64.powf(-attenuation / 20.0)).round() as i32
        }
    })
}

#[derive(Debug, Clone, Default)]
struct ToneGenerator {
    period: u16,
    counter: u32,
    high: bool,
}

impl ToneGenerator {
    fn advance(&mut self, cycles: u32) {
        let half_period = 16 * self.period.max(1) as u32;
        self.counter += cycles;
        if (self.counter / half_period) % 2 == 1 {
            self.high = !self.high;
        }
        self.counter %= half_period;
    }
}

#[derive(Debug, Clone)]
struct NoiseGenerator {
    period: u8,
    counter: u32,
    /// 17-bit LFSR
    shift: u32,
}

impl NoiseGenerator {
    fn new() -> Self {
        Self {
            period: 0,
            counter: 0,
            shift: 1,
        }
    }

    fn advance(&mut self, cycles: u32) {
        let step = 32 * self.period.max(1) as u32;
        self.counter += cycles;
        while self.counter >= step {
            self.counter -= step;
            let bit = (self.shift ^ (self.shift >> 3)) & 1;
            self.shift = (self.shift >> 1) | (bit << 16);
        }
    }

    fn output(&self) -> bool {
        self.shift & 1 != 0
    }
}

#[derive(Debug, Clone, Default)]
struct EnvelopeGenerator {
    period: u16,
    counter: u32,
    shape: u8,
    step: u8,
    attack: bool,
    holding: bool,
}

impl EnvelopeGenerator {
    const CONTINUE: u8 = 0x08;
    const ATTACK: u8 = 0x04;
    const ALTERNATE: u8 = 0x02;
    const HOLD: u8 = 0x01;

    fn restart(&mut self, shape: u8) {
        self.shape = shape & 0x0F;
        self.counter = 0;
        self.step = 0;
        self.holding = false;
        self.attack = self.shape & Self::ATTACK != 0;
    }

    fn level(&self) -> u8 {
        if self.attack {
            self.step
        } else {
            31 - self.step
        }
    }

    fn tick(&mut self) {
        if self.holding {
            return;
        }
        if self.step < 31 {
            self.step += 1;
            return;
        }

        if self.shape & Self::CONTINUE == 0 {
            self.holding = true;
            self.attack = false;
        } else if self.shape & Self::HOLD != 0 {
            self.holding = true;
            if self.shape & Self::ALTERNATE != 0 {
                self.attack = !self.attack;
            }
        } else {
            if self.shape & Self::ALTERNATE != 0 {
                self.attack = !self.attack;
            }
            self.step = 0;
        }
    }

    fn advance(&mut self, cycles: u32) {
        let step = 8 * self.period.max(1) as u32;
        self.counter += cycles;
        while self.counter >= step {
            self.counter -= step;
            self.tick();
        }
    }
}

pub struct S5b {
    clock: SampleClock,
    address: u8,
    registers: [u8; 16],
    tones: [ToneGenerator; 3],
    noise: NoiseGenerator,
    envelope: EnvelopeGenerator,
    outputs: [ChannelOutput; 3],
    volume_table: [i32; 32],
    /// Cycles since the last rendered sample
    pending: u32,
}

impl Default for S5b {
    fn default() -> Self {
        Self::new()
    }
}

impl S5b {
    pub fn new() -> Self {
        Self {
            clock: SampleClock::default(),
            address: 0,
            registers: [0; 16],
            tones: Default::default(),
            noise: NoiseGenerator::new(),
            envelope: EnvelopeGenerator::default(),
            outputs: ChannelId::S5B.map(ChannelOutput::new),
            volume_table: volume_table(),
            pending: 0,
        }
    }

    /// Last value written to an internal register
    pub fn register(&self, reg: u8) -> u8 {
        self.registers[(reg & 0x0F) as usize]
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        self.registers[reg as usize] = value;
        let pair = |low: usize| u16::from_le_bytes([self.registers[low], self.registers[low + 1]]);
        match reg {
            0x00..=0x05 => {
                let channel = (reg / 2) as usize;
                let period = pair(channel * 2) & 0x0FFF;
                self.tones[channel].period = period;
            }
            0x06 => self.noise.period = value & 0x1F,
            0x0B | 0x0C => self.envelope.period = pair(0x0B),
            0x0D => self.envelope.restart(value),
            _ => {}
        }
    }

    fn channel_level(&self, channel: usize) -> i32 {
        let enables = self.registers[0x07];
        let tone_on = enables & (0x01 << channel) == 0;
        let noise_on = enables & (0x08 << channel) == 0;
        let gate = (!tone_on || self.tones[channel].high) && (!noise_on || self.noise.output());
        if !gate {
            return 0;
        }

        let volume = self.registers[0x08 + channel];
        let index = if volume & 0x10 != 0 {
            self.envelope.level()
        } else {
            match volume & 0x0F {
                0 => 0,
                v => v * 2 + 1,
            }
        };
        self.volume_table[index as usize]
    }

    fn render_sample(&mut self, mixer: &mut Mixer) {
        let cycles = std::mem::take(&mut self.pending);
        for tone in &mut self.tones {
            tone.advance(cycles);
        }
        self.noise.advance(cycles);
        self.envelope.advance(cycles);

        for channel in 0..self.outputs.len() {
            let level = self.channel_level(channel);
            self.outputs[channel].mix(mixer, level);
        }
    }
}

impl AudioChip for S5b {
    fn write(&mut self, address: u16, value: u8, _mixer: &mut Mixer) {
        match address {
            0xC000 => self.address = value & 0x0F,
            0xE000 => self.write_register(self.address, value),
            _ => {}
        }
    }

    fn process(&mut self, mut cycles: u32, mixer: &mut Mixer) {
        while cycles > 0 {
            let (used, due) = self.clock.step(cycles);
            for output in &mut self.outputs {
                output.advance(used);
            }
            self.pending += used;
            cycles -= used;
            if due {
                self.render_sample(mixer);
            }
        }
    }

    fn end_frame(&mut self) {
        for output in &mut self.outputs {
            output.end_frame();
        }
    }

    fn reset(&mut self) {
        let clock = self.clock.clone();
        *self = Self::new();
        self.clock = clock;
        self.clock.reset();
    }

    fn set_sample_speed(&mut self, sample_rate: u32, base_clock: u32, frame_rate: u32) {
        self.clock.configure(sample_rate, base_clock, frame_rate);
    }

    fn channels(&self) -> &'static [ChannelId] {
        &ChannelId::S5B
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_reg(s5b: &mut S5b, mixer: &mut Mixer, reg: u8, value: u8) {
        s5b.write(0xC000, reg, mixer);
        s5b.write(0xE000, value, mixer);
    }

    #[test]
    fn volume_curve_is_logarithmic() {
        let table = volume_table();
        assert_eq!(table[0], 0);
        assert_eq!(table[31], 4095);
        assert!(table.windows(2).all(|pair| pair[0] <= pair[1]));
        // 6 dB (four steps) halves the level.
        let ratio = table[27] as f64 / table[31] as f64;
        assert!((ratio - 0.501).abs() < 0.005, "ratio {}", ratio);
    }

    #[test]
    fn only_the_two_ports_are_decoded() {
        let mut mixer = Mixer::new();
        let mut s5b = S5b::new();
        s5b.write(0xC000, 0x08, &mut mixer);
        s5b.write(0xE000, 0x0F, &mut mixer);

        // N163 address port and other aliases of the old window
        for address in [0xF800, 0xE001, 0xFFFF, 0xC001, 0xD000] {
            s5b.write(address, 0x80, &mut mixer);
        }
        assert_eq!(s5b.register(0x08), 0x0F);
        s5b.write(0xE000, 0x0A, &mut mixer);
        assert_eq!(s5b.register(0x08), 0x0A);
    }

    #[test]
    fn gated_channel_holds_its_volume() {
        let mut mixer = Mixer::new();
        let mut s5b = S5b::new();
        write_reg(&mut s5b, &mut mixer, 0x07, 0x3F);
        write_reg(&mut s5b, &mut mixer, 0x08, 0x0F);
        s5b.process(100, &mut mixer);
        assert_eq!(s5b.outputs[0].level(), 4095);
        assert_eq!(s5b.outputs[1].level(), 0);
        assert_eq!(s5b.read(0xE000), None);
    }

    #[test]
    fn tone_alternates() {
        let mut mixer = Mixer::new();
        let mut s5b = S5b::new();
        write_reg(&mut s5b, &mut mixer, 0x00, 100); // 1600 cycles per half period
        write_reg(&mut s5b, &mut mixer, 0x07, 0x3E);
        write_reg(&mut s5b, &mut mixer, 0x08, 0x0F);

        let mut levels = Vec::new();
        for _ in 0..100 {
            s5b.process(100, &mut mixer);
            levels.push(s5b.outputs[0].level());
        }
        assert!(levels.contains(&4095));
        assert!(levels.contains(&0));
        assert!(levels.iter().all(|&level| level == 0 || level == 4095));
    }

    #[test]
    fn envelope_attack_and_hold() {
        let mut mixer = Mixer::new();
        let mut s5b = S5b::new();
        write_reg(&mut s5b, &mut mixer, 0x07, 0x3F);
        write_reg(&mut s5b, &mut mixer, 0x08, 0x10);
        write_reg(&mut s5b, &mut mixer, 0x0B, 0x01); // 8 cycles per step
        write_reg(&mut s5b, &mut mixer, 0x0D, 0x0D); // continue, attack, hold

        s5b.process(2_000, &mut mixer);
        assert_eq!(s5b.envelope.level(), 31);
        assert_eq!(s5b.outputs[0].level(), 4095);
    }

    #[test]
    fn envelope_shapes() {
        let run = |shape: u8, ticks: usize| {
            let mut envelope = EnvelopeGenerator::default();
            envelope.restart(shape);
            for _ in 0..ticks {
                envelope.tick();
            }
            envelope.level()
        };
        // One-shot decay ends silent.
        assert_eq!(run(0x00, 40), 0);
        // Sawtooth down restarts at the top.
        assert_eq!(run(0x08, 32), 31);
        // Triangle turns around.
        assert_eq!(run(0x0E, 33), 30);
        // Decay then hold high.
        assert_eq!(run(0x0B, 40), 31);
    }

    #[test]
    fn noise_lfsr_changes() {
        let mut noise = NoiseGenerator::new();
        noise.advance(32 * 40);
        assert_ne!(noise.shift, 1);
        assert!(noise.shift < 1 << 17);
    }
}
