//! Square-channel frequency sweep.

use super::registers::SweepControl;

/// How the negated change is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negate {
    /// Square 1 subtracts one extra (ones' complement adder)
    OnesComplement,
    /// Square 2 subtracts exactly the shifted period
    TwosComplement,
}

/// Periodically adds or subtracts `period >> shift` to a square's period.
///
/// The target period is computed continuously: a target at or above `$800`
/// mutes the channel even while the sweep is disabled.
#[derive(Debug, Clone)]
pub struct SweepUnit {
    negate_mode: Negate,
    enabled: bool,
    period: u8,
    negate: bool,
    shift: u8,
    divider: u8,
    reload: bool,
}

impl SweepUnit {
    pub fn new(negate_mode: Negate) -> Self {
        Self {
            negate_mode,
            enabled: false,
            period: 0,
            negate: false,
            shift: 0,
            divider: 0,
            reload: false,
        }
    }

    pub fn write(&mut self, control: SweepControl) {
        self.enabled = control.enabled;
        self.period = control.period;
        self.negate = control.negate;
        self.shift = control.shift;
        self.reload = true;
    }

    pub fn target(&self, timer_period: u16) -> u16 {
        let change = timer_period >> self.shift;
        if !self.negate {
            return timer_period + change;
        }
        match self.negate_mode {
            Negate::OnesComplement => timer_period.saturating_sub(change + 1),
            Negate::TwosComplement => timer_period.saturating_sub(change),
        }
    }

    pub fn mutes(&self, timer_period: u16) -> bool {
        !self.negate && self.target(timer_period) >= 0x800
    }

    /// Half-frame clock. Returns the new timer period when the sweep
    /// updates it.
    pub fn clock(&mut self, timer_period: u16) -> Option<u16> {
        let update = self.divider == 0
            && self.enabled
            && self.shift > 0
            && timer_period >= 8
            && !self.mutes(timer_period);
        let result = update.then(|| self.target(timer_period));

        if self.divider == 0 || self.reload {
            self.divider = self.period;
            self.reload = false;
        } else {
            self.divider -= 1;
        }
        result
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.negate_mode);
    }
}
