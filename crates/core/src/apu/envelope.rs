//! Volume envelope shared by the square and noise channels.

use super::registers::EnvelopeControl;

/// Decaying 15-to-0 volume, or a constant volume.
///
/// Clocked on every quarter frame. A write to the channel's fourth register
/// sets the start flag; the next clock reloads the decay level to 15.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    start: bool,
    decay_level: u8,
    divider: u8,
    /// Divider period and constant volume share the same four bits
    volume: u8,
    looping: bool,
    constant: bool,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, control: EnvelopeControl) {
        self.volume = control.volume;
        self.looping = control.halt;
        self.constant = control.constant_volume;
    }

    /// Quarter-frame clock
    pub fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay_level = 15;
            self.divider = self.volume;
            return;
        }

        if self.divider > 0 {
            self.divider -= 1;
            return;
        }

        self.divider = self.volume;
        if self.decay_level > 0 {
            self.decay_level -= 1;
        } else if self.looping {
            self.decay_level = 15;
        }
    }

    pub fn restart(&mut self) {
        self.start = true;
    }

    /// Current output volume, 0-15
    pub fn output(&self) -> u8 {
        if self.constant {
            self.volume
        } else {
            self.decay_level
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
