//! Triangle channel: a 32-step sequence gated by a length counter and a
//! linear counter.

use super::channel::{ChannelId, ChannelOutput};
use super::length_counter::LengthCounter;
use super::registers::{LengthLoad, LinearControl};
use crate::mixer::Mixer;

const TRIANGLE_TABLE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, //
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// When silenced the sequencer freezes and the output holds its last step
/// instead of dropping to zero.
#[derive(Debug, Clone)]
pub struct TriangleChannel {
    output: ChannelOutput,
    timer_period: u16,
    counter: u32,
    step: u8,
    length: LengthCounter,
    linear_counter: u8,
    linear_reload: u8,
    reload_flag: bool,
    control: bool,
}

impl Default for TriangleChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl TriangleChannel {
    pub fn new() -> Self {
        Self {
            output: ChannelOutput::new(ChannelId::Triangle),
            timer_period: 0,
            counter: 0,
            step: 0,
            length: LengthCounter::new(),
            linear_counter: 0,
            linear_reload: 0,
            reload_flag: false,
            control: false,
        }
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 3 {
            0 => {
                let control = LinearControl::from(value);
                self.control = control.control;
                self.linear_reload = control.reload;
                self.length.set_halt(control.control);
            }
            1 => {}
            2 => self.timer_period = (self.timer_period & 0x0700) | value as u16,
            _ => {
                let load = LengthLoad::from(value);
                self.timer_period = (self.timer_period & 0x00FF) | ((load.timer_high as u16) << 8);
                self.length.load(load.length_index);
                self.reload_flag = true;
            }
        }
    }

    pub fn write_control(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }

    pub fn read_control(&self) -> bool {
        self.length.is_active()
    }

    /// Sequencer frozen: a counter is out, or the period is ultrasonic.
    fn halted(&self) -> bool {
        !self.length.is_active() || self.linear_counter == 0 || self.timer_period <= 1
    }

    pub fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        if self.halted() {
            self.output.advance(time);
            return;
        }

        while time >= self.counter {
            time -= self.counter;
            self.output.advance(self.counter);
            self.counter = self.timer_period as u32 + 1;
            self.step = (self.step + 1) & 31;
            self.output
                .mix(mixer, TRIANGLE_TABLE[self.step as usize] as i32);
        }

        self.counter -= time;
        self.output.advance(time);
    }

    pub fn period(&self) -> u32 {
        if self.halted() {
            u32::MAX
        } else {
            self.counter
        }
    }

    /// Quarter-frame clock
    pub fn clock_linear_counter(&mut self) {
        if self.reload_flag {
            self.linear_counter = self.linear_reload;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.control {
            self.reload_flag = false;
        }
    }

    /// Half-frame clock
    pub fn clock_length(&mut self) {
        self.length.clock();
    }

    pub fn end_frame(&mut self) {
        self.output.end_frame();
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn output(&self) -> &ChannelOutput {
        &self.output
    }

    pub fn linear_counter(&self) -> u8 {
        self.linear_counter
    }
}
