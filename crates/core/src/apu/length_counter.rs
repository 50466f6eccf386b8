//! Length counter: silences a channel after a programmed number of
//! half-frame clocks.

/// Length values selected by bits 7-3 of a channel's fourth register.
pub const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, //
    12, 16, 24, 18, 48, 20, 96, 22, 192, 24, 72, 26, 16, 28, 32, 30,
];

#[derive(Debug, Clone, Default)]
pub struct LengthCounter {
    remaining: u8,
    halted: bool,
    /// Mirrors this channel's `$4015` enable bit
    enabled: bool,
}

impl LengthCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Half-frame clock
    pub fn clock(&mut self) {
        if !self.halted && self.remaining > 0 {
            self.remaining -= 1;
        }
    }

    /// Reload from the table. Ignored while the channel is disabled.
    pub fn load(&mut self, index: u8) {
        if self.enabled {
            self.remaining = LENGTH_TABLE[(index & 0x1F) as usize];
        }
    }

    pub fn set_halt(&mut self, halted: bool) {
        self.halted = halted;
    }

    /// Disabling clears the counter immediately.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.remaining = 0;
        }
    }

    pub fn value(&self) -> u8 {
        self.remaining
    }

    /// Non-zero counter; this is the channel's `$4015` status bit.
    pub fn is_active(&self) -> bool {
        self.remaining > 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
