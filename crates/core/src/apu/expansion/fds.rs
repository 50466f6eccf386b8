//! Famicom Disk System: one 64-step wavetable voice with a frequency
//! modulator and two gain envelopes.
//!
//! The voice is stepped event to event: between two changes of wave
//! position, modulator position or envelope gain nothing audible happens, so
//! each iteration jumps straight to the nearest of those events.

use crate::apu::audio_chip::AudioChip;
use crate::apu::channel::{ChannelId, ChannelOutput};
use crate::mixer::Mixer;

const CHANNELS: [ChannelId; 1] = [ChannelId::Fds];

/// Modulator counter adjustment per table entry; entry 4 resets the counter.
const MOD_ADJUST: [i8; 8] = [0, 1, 2, 4, 0, -4, -2, -1];

/// Master volume numerators over 30 (1, 2/3, 1/2, 2/5)
const MASTER_VOLUME: [u32; 4] = [30, 20, 15, 12];

const ACC_STEP: u32 = 0x10000;

#[derive(Debug, Clone, Default)]
struct GainEnvelope {
    disabled: bool,
    increase: bool,
    speed: u8,
    gain: u8,
    timer: u32,
}

impl GainEnvelope {
    fn write(&mut self, value: u8) {
        self.disabled = value & 0x80 != 0;
        self.increase = value & 0x40 != 0;
        self.speed = value & 0x3F;
        if self.disabled {
            self.gain = self.speed;
        }
    }

    fn period(&self, master_speed: u8) -> Option<u32> {
        if self.disabled || master_speed == 0 {
            None
        } else {
            Some(8 * master_speed as u32 * (self.speed as u32 + 1))
        }
    }

    fn tick(&mut self) {
        if self.increase {
            if self.gain < 32 {
                self.gain += 1;
            }
        } else if self.gain > 0 {
            self.gain -= 1;
        }
    }
}

pub struct Fds {
    output: ChannelOutput,
    wave: [u8; 64],
    wave_write: bool,
    master_volume: u8,
    wave_freq: u16,
    wave_acc: u32,
    wave_halt: bool,
    envelopes_halted: bool,
    envelope_speed: u8,
    volume: GainEnvelope,
    modulation: GainEnvelope,
    mod_freq: u16,
    mod_acc: u32,
    mod_halt: bool,
    mod_table: [u8; 64],
    mod_pos: u8,
    /// Signed 7-bit modulator counter
    mod_counter: i8,
}

impl Default for Fds {
    fn default() -> Self {
        Self::new()
    }
}

impl Fds {
    pub fn new() -> Self {
        Self {
            output: ChannelOutput::new(ChannelId::Fds),
            wave: [0; 64],
            wave_write: false,
            master_volume: 0,
            wave_freq: 0,
            wave_acc: 0,
            wave_halt: true,
            envelopes_halted: false,
            envelope_speed: 0xE8,
            volume: GainEnvelope::default(),
            modulation: GainEnvelope::default(),
            mod_freq: 0,
            mod_acc: 0,
            mod_halt: true,
            mod_table: [0; 64],
            mod_pos: 0,
            mod_counter: 0,
        }
    }

    fn restart_envelope_timers(&mut self) {
        let master = self.envelope_speed;
        self.volume.timer = self.volume.period(master).unwrap_or(0);
        self.modulation.timer = self.modulation.period(master).unwrap_or(0);
    }

    fn envelopes_running(&self) -> bool {
        !self.envelopes_halted && !self.wave_halt
    }

    /// Wave frequency after modulation.
    fn pitch(&self) -> u32 {
        let freq = self.wave_freq as i32;
        if self.mod_halt {
            return freq as u32;
        }

        let mut temp = self.mod_counter as i32 * self.modulation.gain as i32;
        let remainder = temp & 0x0F;
        temp >>= 4;
        if remainder > 0 && temp & 0x80 == 0 {
            temp += if self.mod_counter < 0 { -1 } else { 2 };
        }
        if temp >= 192 {
            temp -= 256;
        } else if temp < -64 {
            temp += 256;
        }

        temp *= freq;
        let remainder = temp & 0x3F;
        temp >>= 6;
        if remainder >= 32 {
            temp += 1;
        }
        (freq + temp).max(0) as u32
    }

    fn wave_position(&self) -> usize {
        ((self.wave_acc >> 16) & 0x3F) as usize
    }

    fn cycles_to_wave_step(&self) -> Option<u32> {
        if self.wave_halt || self.wave_write {
            return None;
        }
        let pitch = self.pitch();
        if pitch == 0 {
            return None;
        }
        let missing = ACC_STEP - (self.wave_acc & 0xFFFF);
        Some(missing.div_ceil(pitch))
    }

    fn cycles_to_mod_step(&self) -> Option<u32> {
        if self.mod_halt || self.mod_freq == 0 {
            return None;
        }
        Some((ACC_STEP - self.mod_acc).div_ceil(self.mod_freq as u32))
    }

    fn envelope_timers(&self) -> [Option<u32>; 2] {
        if !self.envelopes_running() {
            return [None, None];
        }
        let master = self.envelope_speed;
        [
            self.volume.period(master).map(|_| self.volume.timer.max(1)),
            self.modulation.period(master).map(|_| self.modulation.timer.max(1)),
        ]
    }

    fn step_modulator(&mut self) {
        let entry = self.mod_table[self.mod_pos as usize] as usize;
        self.mod_counter = if entry == 4 {
            0
        } else {
            let next = self.mod_counter as i32 + MOD_ADJUST[entry] as i32;
            (((next + 64) & 0x7F) - 64) as i8
        };
        self.mod_pos = (self.mod_pos + 1) & 0x3F;
    }

    fn advance(&mut self, cycles: u32) {
        let pitch = self.pitch();
        if !self.wave_halt && !self.wave_write {
            self.wave_acc = (self.wave_acc + pitch * cycles) & 0x3F_FFFF;
        }

        if !self.mod_halt && self.mod_freq > 0 {
            self.mod_acc += self.mod_freq as u32 * cycles;
            if self.mod_acc >= ACC_STEP {
                self.mod_acc -= ACC_STEP;
                self.step_modulator();
            }
        }

        if self.envelopes_running() {
            let master = self.envelope_speed;
            for envelope in [&mut self.volume, &mut self.modulation] {
                if let Some(period) = envelope.period(master) {
                    envelope.timer = envelope.timer.saturating_sub(cycles);
                    if envelope.timer == 0 {
                        envelope.tick();
                        envelope.timer = period;
                    }
                }
            }
        }
    }

    fn level(&self) -> i32 {
        if self.wave_write {
            return self.output.level();
        }
        let gain = self.volume.gain.min(32) as u32;
        let sample = self.wave[self.wave_position()] as u32;
        (sample * gain * MASTER_VOLUME[self.master_volume as usize] / 30) as i32
    }
}

impl AudioChip for Fds {
    fn write(&mut self, address: u16, value: u8, _mixer: &mut Mixer) {
        match address {
            0x4040..=0x407F => {
                if self.wave_write {
                    self.wave[(address - 0x4040) as usize] = value & 0x3F;
                }
            }
            0x4080 => {
                self.volume.write(value);
                self.restart_envelope_timers();
            }
            0x4082 => self.wave_freq = (self.wave_freq & 0x0F00) | value as u16,
            0x4083 => {
                self.wave_freq = (self.wave_freq & 0x00FF) | (((value & 0x0F) as u16) << 8);
                self.wave_halt = value & 0x80 != 0;
                self.envelopes_halted = value & 0x40 != 0;
                if self.wave_halt {
                    self.wave_acc = 0;
                }
                self.restart_envelope_timers();
            }
            0x4084 => {
                self.modulation.write(value);
                self.restart_envelope_timers();
            }
            0x4085 => self.mod_counter = ((((value & 0x7F) as i32 + 64) & 0x7F) - 64) as i8,
            0x4086 => self.mod_freq = (self.mod_freq & 0x0F00) | value as u16,
            0x4087 => {
                self.mod_freq = (self.mod_freq & 0x00FF) | (((value & 0x0F) as u16) << 8);
                self.mod_halt = value & 0x80 != 0;
            }
            0x4088 => {
                if self.mod_halt {
                    let entry = value & 0x07;
                    self.mod_table[self.mod_pos as usize] = entry;
                    self.mod_table[((self.mod_pos + 1) & 0x3F) as usize] = entry;
                    self.mod_pos = (self.mod_pos + 2) & 0x3F;
                }
            }
            0x4089 => {
                self.wave_write = value & 0x80 != 0;
                self.master_volume = value & 0x03;
            }
            0x408A => {
                self.envelope_speed = value;
                self.restart_envelope_timers();
            }
            _ => {}
        }
    }

    fn read(&mut self, address: u16) -> Option<u8> {
        match address {
            0x4040..=0x407F => Some(self.wave[(address - 0x4040) as usize] | 0x40),
            0x4090 => Some(self.volume.gain | 0x40),
            0x4092 => Some(self.modulation.gain | 0x40),
            _ => None,
        }
    }

    fn process(&mut self, mut cycles: u32, mixer: &mut Mixer) {
        while cycles > 0 {
            let [volume_timer, mod_env_timer] = self.envelope_timers();
            let step = [
                self.cycles_to_wave_step(),
                self.cycles_to_mod_step(),
                volume_timer,
                mod_env_timer,
            ]
            .into_iter()
            .flatten()
            .fold(cycles, u32::min)
            .max(1);

            self.advance(step);
            self.output.advance(step);
            cycles -= step;

            let level = self.level();
            self.output.mix(mixer, level);
        }
    }

    fn end_frame(&mut self) {
        self.output.end_frame();
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn channels(&self) -> &'static [ChannelId] {
        &CHANNELS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_wave(fds: &mut Fds, mixer: &mut Mixer) {
        fds.write(0x4089, 0x80, mixer);
        for i in 0..64u16 {
            fds.write(0x4040 + i, if i < 32 { 63 } else { 0 }, mixer);
        }
        fds.write(0x4089, 0x00, mixer);
    }

    #[test]
    fn wave_ram_is_write_protected() {
        let mut mixer = Mixer::new();
        let mut fds = Fds::new();
        fds.write(0x4040, 0x21, &mut mixer);
        assert_eq!(fds.read(0x4040), Some(0x40));

        fds.write(0x4089, 0x80, &mut mixer);
        fds.write(0x4040, 0x21, &mut mixer);
        assert_eq!(fds.read(0x4040), Some(0x61));
        assert_eq!(fds.read(0x4091), None);
    }

    #[test]
    fn full_gain_square_reaches_peak_level() {
        let mut mixer = Mixer::new();
        let mut fds = Fds::new();
        square_wave(&mut fds, &mut mixer);
        fds.write(0x4080, 0xA0, &mut mixer); // direct gain 32
        fds.write(0x4082, 0x00, &mut mixer);
        fds.write(0x4083, 0x04, &mut mixer); // freq 0x400

        fds.process(1, &mut mixer);
        assert_eq!(fds.output.level(), 2016);
        assert_eq!(fds.read(0x4090), Some(32 | 0x40));

        // Half a wave cycle is 32 steps of 0x10000 / 0x400 = 64 cycles.
        fds.process(32 * 64, &mut mixer);
        assert_eq!(fds.output.level(), 0);
    }

    #[test]
    fn master_volume_scales_output() {
        let mut mixer = Mixer::new();
        let mut fds = Fds::new();
        square_wave(&mut fds, &mut mixer);
        fds.write(0x4089, 0x03, &mut mixer);
        fds.write(0x4080, 0xA0, &mut mixer);
        fds.write(0x4083, 0x04, &mut mixer);
        fds.process(1, &mut mixer);
        assert_eq!(fds.output.level(), 2016 * 12 / 30);
    }

    #[test]
    fn volume_envelope_ramps_up() {
        let mut mixer = Mixer::new();
        let mut fds = Fds::new();
        fds.write(0x408A, 0x01, &mut mixer);
        fds.write(0x4080, 0x40, &mut mixer); // increase, speed 0: every 8 cycles
        fds.write(0x4083, 0x00, &mut mixer);

        fds.process(8 * 10, &mut mixer);
        assert_eq!(fds.read(0x4090), Some(10 | 0x40));
        fds.process(8 * 100, &mut mixer);
        assert_eq!(fds.read(0x4090), Some(32 | 0x40));
    }

    #[test]
    fn modulation_counter_wraps_seven_bits() {
        let mut mixer = Mixer::new();
        let mut fds = Fds::new();
        fds.write(0x4085, 0x3F, &mut mixer);
        assert_eq!(fds.mod_counter, 63);
        fds.write(0x4085, 0x40, &mut mixer);
        assert_eq!(fds.mod_counter, -64);

        fds.write(0x4087, 0x80, &mut mixer);
        fds.write(0x4088, 0x01, &mut mixer);
        fds.mod_pos = 0;
        fds.mod_counter = 63;
        fds.step_modulator();
        assert_eq!(fds.mod_counter, -64);
    }

    #[test]
    fn modulation_bends_pitch() {
        let mut fds = Fds::new();
        fds.wave_freq = 0x100;
        fds.mod_halt = false;
        fds.modulation.gain = 32;
        fds.mod_counter = 8;
        assert!(fds.pitch() > 0x100);
        fds.mod_counter = -8;
        assert!(fds.pitch() < 0x100);
    }
}
