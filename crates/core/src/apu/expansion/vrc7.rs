//! Konami VRC7: six two-operator FM channels, compatible with the YM2413
//! family.
//!
//! - `$9010`: register select
//! - `$9030`: register data
//!
//! Registers `$00`-`$07` hold the custom patch, `$10`-`$15` the low F-number
//! bits, `$20`-`$25` F-number bit 8, block, key and sustain, and `$30`-`$35`
//! instrument and volume. Synthesis runs once per output sample.

use std::f64::consts::TAU;

use super::SampleClock;
use crate::apu::audio_chip::AudioChip;
use crate::apu::channel::{ChannelId, ChannelOutput};
use crate::logging::{log, LogCategory, LogLevel};
use crate::mixer::Mixer;

/// Built-in instruments 1-15
const PATCHES: [[u8; 8]; 15] = [
    [0x03, 0x21, 0x05, 0x06, 0xE8, 0x81, 0x42, 0x27],
    [0x13, 0x41, 0x14, 0x0D, 0xD8, 0xF6, 0x23, 0x12],
    [0x11, 0x11, 0x08, 0x08, 0xFA, 0xB2, 0x20, 0x12],
    [0x31, 0x61, 0x0C, 0x07, 0xA8, 0x64, 0x61, 0x27],
    [0x32, 0x21, 0x1E, 0x06, 0xE1, 0x76, 0x01, 0x28],
    [0x02, 0x01, 0x06, 0x00, 0xA3, 0xE2, 0xF4, 0xF4],
    [0x21, 0x61, 0x1D, 0x07, 0x82, 0x81, 0x11, 0x07],
    [0x23, 0x21, 0x22, 0x17, 0xA2, 0x72, 0x01, 0x17],
    [0x35, 0x11, 0x25, 0x00, 0x40, 0x73, 0x72, 0x01],
    [0xB5, 0x01, 0x0F, 0x0F, 0xA8, 0xA5, 0x51, 0x02],
    [0x17, 0xC1, 0x24, 0x07, 0xF8, 0xF8, 0x22, 0x12],
    [0x71, 0x23, 0x11, 0x06, 0x65, 0x74, 0x18, 0x16],
    [0x01, 0x02, 0xD3, 0x05, 0xC9, 0x95, 0x03, 0x02],
    [0x61, 0x63, 0x0C, 0x00, 0x94, 0xC0, 0x33, 0xF6],
    [0x21, 0x72, 0x0D, 0x00, 0xC1, 0xD5, 0x56, 0x06],
];

const MULTIPLIER: [f64; 16] = [
    0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 10.0, 12.0, 12.0, 15.0, 15.0,
];

/// Key scaling attenuation in dB by the top four F-number bits, at block 7
const KSL_BASE: [f64; 16] = [
    0.0, 18.0, 24.0, 27.75, 30.0, 32.25, 33.75, 35.25, 36.0, 37.5, 38.25, 39.0, 39.75, 40.5,
    41.25, 42.0,
];

/// 0, 1.5, 3 and 6 dB per octave
const KSL_SCALE: [f64; 4] = [0.0, 0.25, 0.5, 1.0];

/// Internal FM sample rate of the chip
const FM_CLOCK_HZ: f64 = 49_715.9;

const MAX_ATTENUATION: f64 = 48.0;
/// Seconds for the slowest decay to cross the full attenuation range
const SLOWEST_DECAY_S: f64 = 39.28;
const ATTACK_SPEEDUP: f64 = 8.0;
/// Release rate while the channel sustain flag is set
const SUSTAIN_RELEASE_RATE: u8 = 5;

const AM_RATE_HZ: f64 = 3.7;
const AM_DEPTH_DB: f64 = 4.8;
const PM_RATE_HZ: f64 = 6.4;
/// About 14 cents
const PM_DEPTH: f64 = 0.0081;

/// Carrier phase offset at full modulator output, in waveform cycles
const MODULATION_DEPTH: f64 = 2.0;
const OUTPUT_SCALE: f64 = 4095.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct OperatorPatch {
    am: bool,
    vibrato: bool,
    sustained: bool,
    ksr: bool,
    multiplier: u8,
    ksl: u8,
    rectify: bool,
    attack: u8,
    decay: u8,
    sustain_level: u8,
    release: u8,
}

impl OperatorPatch {
    /// `op` is 0 for the modulator and 1 for the carrier.
    fn decode(bytes: &[u8; 8], op: usize) -> Self {
        let flags = bytes[op];
        Self {
            am: flags & 0x80 != 0,
            vibrato: flags & 0x40 != 0,
            sustained: flags & 0x20 != 0,
            ksr: flags & 0x10 != 0,
            multiplier: flags & 0x0F,
            ksl: bytes[2 + op] >> 6,
            rectify: bytes[3] & (0x08 << op) != 0,
            attack: bytes[4 + op] >> 4,
            decay: bytes[4 + op] & 0x0F,
            sustain_level: bytes[6 + op] >> 4,
            release: bytes[6 + op] & 0x0F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Patch {
    modulator: OperatorPatch,
    carrier: OperatorPatch,
    total_level: u8,
    feedback: u8,
}

impl Patch {
    fn decode(bytes: &[u8; 8]) -> Self {
        Self {
            modulator: OperatorPatch::decode(bytes, 0),
            carrier: OperatorPatch::decode(bytes, 1),
            total_level: bytes[2] & 0x3F,
            feedback: bytes[3] & 0x07,
        }
    }
}

/// Seconds to cross the full attenuation range, `None` for a frozen rate.
fn envelope_span(rate: u8, rks: u8) -> Option<f64> {
    if rate == 0 {
        return None;
    }
    let effective = (rate as u32 * 4 + rks as u32).min(63);
    Some(SLOWEST_DECAY_S / 2f64.powf((effective as f64 - 4.0) / 4.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeStage {
    Attack,
    Decay,
    Sustain,
    Release,
    Off,
}

#[derive(Debug, Clone)]
struct Operator {
    /// Waveform phase in cycles, 0.0..1.0
    phase: f64,
    /// Envelope attenuation in dB
    attenuation: f64,
    stage: EnvelopeStage,
}

impl Operator {
    fn new() -> Self {
        Self {
            phase: 0.0,
            attenuation: MAX_ATTENUATION,
            stage: EnvelopeStage::Off,
        }
    }

    fn key_on(&mut self) {
        self.phase = 0.0;
        self.stage = EnvelopeStage::Attack;
    }

    fn key_off(&mut self) {
        if self.stage != EnvelopeStage::Off {
            self.stage = EnvelopeStage::Release;
        }
    }

    fn fall(&mut self, rate: u8, rks: u8, dt: f64) {
        if let Some(span) = envelope_span(rate, rks) {
            self.attenuation += MAX_ATTENUATION * dt / span;
        }
        if self.attenuation >= MAX_ATTENUATION {
            self.attenuation = MAX_ATTENUATION;
            self.stage = EnvelopeStage::Off;
        }
    }

    fn update_envelope(&mut self, patch: &OperatorPatch, rks: u8, release: u8, dt: f64) {
        match self.stage {
            EnvelopeStage::Attack => {
                if patch.attack == 15 {
                    self.attenuation = 0.0;
                } else if let Some(span) = envelope_span(patch.attack, rks) {
                    self.attenuation -= MAX_ATTENUATION * ATTACK_SPEEDUP * dt / span;
                }
                if self.attenuation <= 0.0 {
                    self.attenuation = 0.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                let target = patch.sustain_level as f64 * 3.0;
                if let Some(span) = envelope_span(patch.decay, rks) {
                    self.attenuation += MAX_ATTENUATION * dt / span;
                }
                if self.attenuation >= target {
                    self.attenuation = target;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            // Percussive tones keep fading while the key is held.
            EnvelopeStage::Sustain if !patch.sustained => self.fall(release, rks, dt),
            EnvelopeStage::Sustain | EnvelopeStage::Off => {}
            EnvelopeStage::Release => self.fall(release, rks, dt),
        }
    }

    fn amplitude(&self, extra_attenuation: f64) -> f64 {
        if self.stage == EnvelopeStage::Off {
            return 0.0;
        }
        10f64.powf(-(self.attenuation + extra_attenuation) / 20.0)
    }

    fn advance_phase(&mut self, frequency: f64, dt: f64) {
        self.phase = (self.phase + frequency * dt).fract();
    }
}

fn waveform(phase: f64, rectify: bool) -> f64 {
    let value = (TAU * phase).sin();
    if rectify && value < 0.0 {
        0.0
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Lfo {
    am_phase: f64,
    pm_phase: f64,
}

impl Lfo {
    fn advance(&mut self, dt: f64) {
        self.am_phase = (self.am_phase + AM_RATE_HZ * dt).fract();
        self.pm_phase = (self.pm_phase + PM_RATE_HZ * dt).fract();
    }

    fn am_db(&self) -> f64 {
        AM_DEPTH_DB * (1.0 - (TAU * self.am_phase).cos()) / 2.0
    }

    fn pm_factor(&self) -> f64 {
        1.0 + PM_DEPTH * (TAU * self.pm_phase).sin()
    }
}

#[derive(Debug, Clone)]
struct FmChannel {
    fnum: u16,
    block: u8,
    key: bool,
    sustain: bool,
    instrument: u8,
    volume: u8,
    modulator: Operator,
    carrier: Operator,
    /// Last two modulator outputs, for self-feedback
    feedback: [f64; 2],
}

impl FmChannel {
    fn new() -> Self {
        Self {
            fnum: 0,
            block: 0,
            key: false,
            sustain: false,
            instrument: 0,
            volume: 0,
            modulator: Operator::new(),
            carrier: Operator::new(),
            feedback: [0.0; 2],
        }
    }

    fn set_key(&mut self, key: bool) {
        if key && !self.key {
            self.modulator.key_on();
            self.carrier.key_on();
            self.feedback = [0.0; 2];
        } else if !key && self.key {
            self.modulator.key_off();
            self.carrier.key_off();
        }
        self.key = key;
    }

    fn rks(&self, patch: &OperatorPatch) -> u8 {
        let base = (self.block << 1) | (self.fnum >> 8) as u8;
        if patch.ksr {
            base
        } else {
            base >> 2
        }
    }

    fn release_rate(&self, patch: &OperatorPatch) -> u8 {
        if self.sustain {
            SUSTAIN_RELEASE_RATE
        } else {
            patch.release
        }
    }

    fn key_scaling(&self, patch: &OperatorPatch) -> f64 {
        let base = KSL_BASE[(self.fnum >> 5) as usize & 0x0F] - 6.0 * (7 - self.block) as f64;
        base.max(0.0) * KSL_SCALE[patch.ksl as usize]
    }

    fn frequency(&self, patch: &OperatorPatch, lfo: &Lfo) -> f64 {
        let base = self.fnum as f64 * FM_CLOCK_HZ * (1u32 << self.block) as f64 / (1u32 << 19) as f64;
        let vibrato = if patch.vibrato { lfo.pm_factor() } else { 1.0 };
        base * MULTIPLIER[patch.multiplier as usize] * vibrato
    }

    /// Produces one output sample in -1.0..=1.0.
    fn render(&mut self, patch: &Patch, lfo: &Lfo, dt: f64) -> f64 {
        let (m, c) = (&patch.modulator, &patch.carrier);
        let am = lfo.am_db();

        let (rks, release) = (self.rks(m), self.release_rate(m));
        self.modulator.update_envelope(m, rks, release, dt);
        let (rks, release) = (self.rks(c), self.release_rate(c));
        self.carrier.update_envelope(c, rks, release, dt);

        let feedback = if patch.feedback == 0 {
            0.0
        } else {
            (self.feedback[0] + self.feedback[1]) / 2.0 * (1u32 << patch.feedback) as f64 / 64.0
        };
        let mod_attenuation = patch.total_level as f64 * 0.75
            + self.key_scaling(m)
            + if m.am { am } else { 0.0 };
        let modulation = waveform(self.modulator.phase + feedback, m.rectify)
            * self.modulator.amplitude(mod_attenuation);
        self.feedback = [self.feedback[1], modulation];

        let car_attenuation =
            self.volume as f64 * 3.0 + self.key_scaling(c) + if c.am { am } else { 0.0 };
        let output = waveform(self.carrier.phase + modulation * MODULATION_DEPTH, c.rectify)
            * self.carrier.amplitude(car_attenuation);

        self.modulator.advance_phase(self.frequency(m, lfo), dt);
        self.carrier.advance_phase(self.frequency(c, lfo), dt);
        output
    }
}

pub struct Vrc7 {
    clock: SampleClock,
    address: u8,
    registers: [u8; 0x40],
    channels: [FmChannel; 6],
    outputs: [ChannelOutput; 6],
    lfo: Lfo,
}

impl Default for Vrc7 {
    fn default() -> Self {
        Self::new()
    }
}

impl Vrc7 {
    pub fn new() -> Self {
        Self {
            clock: SampleClock::default(),
            address: 0,
            registers: [0; 0x40],
            channels: std::array::from_fn(|_| FmChannel::new()),
            outputs: ChannelId::VRC7.map(ChannelOutput::new),
            lfo: Lfo::default(),
        }
    }

    /// Last value written to an internal register
    pub fn register(&self, reg: u8) -> u8 {
        self.registers[(reg & 0x3F) as usize]
    }

    fn patch(&self, instrument: u8) -> Patch {
        match instrument {
            0 => {
                let mut custom = [0; 8];
                custom.copy_from_slice(&self.registers[..8]);
                Patch::decode(&custom)
            }
            n => Patch::decode(&PATCHES[(n - 1) as usize]),
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        self.registers[reg as usize] = value;
        let index = (reg & 0x0F) as usize;
        if index >= self.channels.len() {
            return;
        }
        let channel = &mut self.channels[index];
        match reg & 0xF0 {
            0x10 => channel.fnum = (channel.fnum & 0x100) | value as u16,
            0x20 => {
                channel.fnum = (channel.fnum & 0xFF) | (((value & 0x01) as u16) << 8);
                channel.block = (value >> 1) & 0x07;
                channel.sustain = value & 0x20 != 0;
                channel.set_key(value & 0x10 != 0);
            }
            0x30 => {
                channel.instrument = value >> 4;
                channel.volume = value & 0x0F;
            }
            _ => {}
        }
    }

    fn render_sample(&mut self, mixer: &mut Mixer) {
        let dt = 1.0 / self.clock.sample_rate() as f64;
        self.lfo.advance(dt);
        let lfo = self.lfo;

        for index in 0..self.channels.len() {
            let patch = self.patch(self.channels[index].instrument);
            let sample = self.channels[index].render(&patch, &lfo, dt);
            let level = (sample * OUTPUT_SCALE).round() as i32;
            self.outputs[index].mix(mixer, level);
        }
    }
}

impl AudioChip for Vrc7 {
    fn write(&mut self, address: u16, value: u8, _mixer: &mut Mixer) {
        match address {
            0x9010 => self.address = value & 0x3F,
            0x9030 => {
                log(LogCategory::Expansion, LogLevel::Trace, || {
                    format!("VRC7 ${:02X} <- ${:02X}", self.address, value)
                });
                self.write_register(self.address, value);
            }
            _ => {}
        }
    }

    fn process(&mut self, mut cycles: u32, mixer: &mut Mixer) {
        while cycles > 0 {
            let (used, due) = self.clock.step(cycles);
            for output in &mut self.outputs {
                output.advance(used);
            }
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
        &ChannelId::VRC7
    }
}
