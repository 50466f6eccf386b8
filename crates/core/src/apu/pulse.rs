//! Square wave channel.
//!
//! The same generator serves the two internal squares (with sweep units)
//! and the two MMC5 squares (no sweep, no low-period muting).

use super::channel::{ChannelId, ChannelOutput};
use super::envelope::Envelope;
use super::length_counter::LengthCounter;
use super::registers::{EnvelopeControl, LengthLoad, SweepControl};
use super::sweep::{Negate, SweepUnit};
use crate::mixer::Mixer;

/// Duty sequences indexed by (duty, phase)
/// 0: 0 1 0 0 0 0 0 0 (12.5%)
/// 1: 0 1 1 0 0 0 0 0 (25%)
/// 2: 0 1 1 1 1 0 0 0 (50%)
/// 3: 1 0 0 1 1 1 1 1 (25% negated)
const DUTY_TABLE: [[bool; 8]; 4] = [
    [false, true, false, false, false, false, false, false],
    [false, true, true, false, false, false, false, false],
    [false, true, true, true, true, false, false, false],
    [true, false, false, true, true, true, true, true],
];

#[derive(Debug, Clone)]
pub struct PulseChannel {
    output: ChannelOutput,
    /// Absent on MMC5
    sweep: Option<SweepUnit>,
    duty: u8,
    /// 11-bit timer period from registers 2 and 3
    timer_period: u16,
    /// CPU cycles until the next duty step
    counter: u32,
    phase: u8,
    envelope: Envelope,
    length: LengthCounter,
}

impl PulseChannel {
    fn with_sweep(id: ChannelId, sweep: Option<SweepUnit>) -> Self {
        Self {
            output: ChannelOutput::new(id),
            sweep,
            duty: 0,
            timer_period: 0,
            counter: 0,
            phase: 0,
            envelope: Envelope::new(),
            length: LengthCounter::new(),
        }
    }

    pub fn square1() -> Self {
        Self::with_sweep(
            ChannelId::Square1,
            Some(SweepUnit::new(Negate::OnesComplement)),
        )
    }

    pub fn square2() -> Self {
        Self::with_sweep(
            ChannelId::Square2,
            Some(SweepUnit::new(Negate::TwosComplement)),
        )
    }

    /// MMC5 square: no sweep unit
    pub fn mmc5(id: ChannelId) -> Self {
        Self::with_sweep(id, None)
    }

    /// Register write; `reg` is the address offset 0-3.
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 3 {
            0 => {
                let control = EnvelopeControl::from(value);
                self.duty = control.duty;
                self.length.set_halt(control.halt);
                self.envelope.write(control);
            }
            1 => {
                if let Some(sweep) = self.sweep.as_mut() {
                    sweep.write(SweepControl::from(value));
                }
            }
            2 => self.timer_period = (self.timer_period & 0x0700) | value as u16,
            _ => {
                let load = LengthLoad::from(value);
                self.timer_period = (self.timer_period & 0x00FF) | ((load.timer_high as u16) << 8);
                self.length.load(load.length_index);
                self.envelope.restart();
                self.phase = 0;
            }
        }
    }

    /// `$4015` enable bit
    pub fn write_control(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }

    /// `$4015` status bit
    pub fn read_control(&self) -> bool {
        self.length.is_active()
    }

    fn audible(&self) -> bool {
        if !self.length.is_active() {
            return false;
        }
        match &self.sweep {
            Some(sweep) => self.timer_period >= 8 && !sweep.mutes(self.timer_period),
            None => true,
        }
    }

    pub fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        if !self.audible() {
            self.output.mix(mixer, 0);
        }
        if self.timer_period == 0 {
            // A stopped timer never steps the sequencer; park the output at 0.
            self.output.mix(mixer, 0);
            self.output.advance(time);
            return;
        }

        while time >= self.counter {
            time -= self.counter;
            self.output.advance(self.counter);
            self.counter = (self.timer_period as u32 + 1) * 2;
            self.phase = (self.phase + 1) & 7;

            let high = DUTY_TABLE[self.duty as usize][self.phase as usize];
            let level = if high && self.audible() {
                self.envelope.output() as i32
            } else {
                0
            };
            self.output.mix(mixer, level);
        }

        self.counter -= time;
        self.output.advance(time);
    }

    /// Cycles until the next level change is possible.
    pub fn period(&self) -> u32 {
        if self.timer_period == 0 {
            u32::MAX
        } else {
            self.counter
        }
    }

    pub fn clock_envelope(&mut self) {
        self.envelope.clock();
    }

    pub fn clock_length(&mut self) {
        self.length.clock();
    }

    pub fn clock_sweep(&mut self) {
        if let Some(sweep) = self.sweep.as_mut() {
            if let Some(period) = sweep.clock(self.timer_period) {
                self.timer_period = period;
            }
        }
    }

    pub fn end_frame(&mut self) {
        self.output.end_frame();
    }

    pub fn reset(&mut self) {
        self.output.reset();
        if let Some(sweep) = self.sweep.as_mut() {
            sweep.reset();
        }
        self.duty = 0;
        self.timer_period = 0;
        self.counter = 0;
        self.phase = 0;
        self.envelope.reset();
        self.length.reset();
    }

    pub fn output(&self) -> &ChannelOutput {
        &self.output
    }

    pub fn timer_period(&self) -> u16 {
        self.timer_period
    }

    pub fn length_value(&self) -> u8 {
        self.length.value()
    }
}
