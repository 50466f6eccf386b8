//! Konami VRC6: two pulse channels and a sawtooth.
//!
//! - `$9000`-`$9002`: pulse 1 (`$9003` frequency scaling is not emulated)
//! - `$A000`-`$A002`: pulse 2
//! - `$B000`-`$B002`: sawtooth

use crate::apu::audio_chip::AudioChip;
use crate::apu::channel::{ChannelId, ChannelOutput};
use crate::logging::{log, LogCategory, LogLevel};
use crate::mixer::Mixer;

const CHANNELS: [ChannelId; 3] = [
    ChannelId::Vrc6Pulse1,
    ChannelId::Vrc6Pulse2,
    ChannelId::Vrc6Sawtooth,
];

#[derive(Debug, Clone)]
struct Vrc6Pulse {
    output: ChannelOutput,
    volume: u8,
    /// High steps per 16-step cycle: the duty index plus one
    duty_width: u8,
    /// Constant output, ignoring duty
    gate: bool,
    enabled: bool,
    period: u16,
    counter: u32,
    step: u8,
}

impl Vrc6Pulse {
    fn new(id: ChannelId) -> Self {
        Self {
            output: ChannelOutput::new(id),
            volume: 0,
            duty_width: 1,
            gate: false,
            enabled: false,
            period: 0,
            counter: 0,
            step: 0,
        }
    }

    fn write(&mut self, reg: u16, value: u8, mixer: &mut Mixer) {
        match reg {
            0 => {
                self.gate = value & 0x80 != 0;
                self.duty_width = ((value >> 4) & 0x07) + 1;
                self.volume = value & 0x0F;
                if self.gate && self.enabled {
                    self.output.mix(mixer, self.volume as i32);
                }
            }
            1 => self.period = (self.period & 0x0F00) | value as u16,
            2 => {
                self.period = (self.period & 0x00FF) | (((value & 0x0F) as u16) << 8);
                self.enabled = value & 0x80 != 0;
                if !self.enabled {
                    self.step = 0;
                    self.output.mix(mixer, 0);
                }
            }
            _ => {}
        }
    }

    fn level(&self) -> i32 {
        if self.gate || self.step < self.duty_width {
            self.volume as i32
        } else {
            0
        }
    }

    fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        if !self.enabled || self.period == 0 {
            self.output.mix(mixer, 0);
            self.output.advance(time);
            return;
        }

        while time >= self.counter {
            time -= self.counter;
            self.output.advance(self.counter);
            self.counter = self.period as u32 + 1;
            self.step = (self.step + 1) & 0x0F;
            let level = self.level();
            self.output.mix(mixer, level);
        }

        self.counter -= time;
        self.output.advance(time);
    }
}

#[derive(Debug, Clone)]
struct Vrc6Sawtooth {
    output: ChannelOutput,
    /// Accumulator rate, added on every other clock
    rate: u8,
    enabled: bool,
    period: u16,
    counter: u32,
    accumulator: u8,
    /// 0-13; the accumulator clears after seven additions
    step: u8,
}

impl Vrc6Sawtooth {
    fn new() -> Self {
        Self {
            output: ChannelOutput::new(ChannelId::Vrc6Sawtooth),
            rate: 0,
            enabled: false,
            period: 0,
            counter: 0,
            accumulator: 0,
            step: 0,
        }
    }

    fn write(&mut self, reg: u16, value: u8, mixer: &mut Mixer) {
        match reg {
            0 => self.rate = value & 0x3F,
            1 => self.period = (self.period & 0x0F00) | value as u16,
            2 => {
                self.period = (self.period & 0x00FF) | (((value & 0x0F) as u16) << 8);
                self.enabled = value & 0x80 != 0;
                if !self.enabled {
                    self.accumulator = 0;
                    self.step = 0;
                    self.output.mix(mixer, 0);
                }
            }
            _ => {}
        }
    }

    fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        if !self.enabled || self.period == 0 {
            self.output.mix(mixer, 0);
            self.output.advance(time);
            return;
        }

        while time >= self.counter {
            time -= self.counter;
            self.output.advance(self.counter);
            self.counter = self.period as u32 + 1;

            if self.step & 1 == 1 {
                self.accumulator = self.accumulator.wrapping_add(self.rate);
            }
            self.step += 1;
            if self.step == 14 {
                self.accumulator = 0;
                self.step = 0;
            }
            self.output.mix(mixer, (self.accumulator >> 3) as i32);
        }

        self.counter -= time;
        self.output.advance(time);
    }
}

pub struct Vrc6 {
    pulse: [Vrc6Pulse; 2],
    sawtooth: Vrc6Sawtooth,
}

impl Default for Vrc6 {
    fn default() -> Self {
        Self::new()
    }
}

impl Vrc6 {
    pub fn new() -> Self {
        Self {
            pulse: [
                Vrc6Pulse::new(ChannelId::Vrc6Pulse1),
                Vrc6Pulse::new(ChannelId::Vrc6Pulse2),
            ],
            sawtooth: Vrc6Sawtooth::new(),
        }
    }
}

impl AudioChip for Vrc6 {
    fn write(&mut self, address: u16, value: u8, mixer: &mut Mixer) {
        let reg = address & 0x0003;
        match address {
            0x9003 => log(LogCategory::Stubs, LogLevel::Debug, || {
                format!("VRC6 frequency control ${:02X} ignored", value)
            }),
            0x9000..=0x9002 => self.pulse[0].write(reg, value, mixer),
            0xA000..=0xA002 => self.pulse[1].write(reg, value, mixer),
            0xB000..=0xB002 => self.sawtooth.write(reg, value, mixer),
            _ => {}
        }
    }

    fn process(&mut self, cycles: u32, mixer: &mut Mixer) {
        for pulse in &mut self.pulse {
            pulse.process(cycles, mixer);
        }
        self.sawtooth.process(cycles, mixer);
    }

    fn end_frame(&mut self) {
        for pulse in &mut self.pulse {
            pulse.output.end_frame();
        }
        self.sawtooth.output.end_frame();
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn channels(&self) -> &'static [ChannelId] {
        &CHANNELS
    }
}
