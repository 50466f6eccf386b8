//! Register decoding and the shadow copy kept for observers.
//!
//! Bit-packed register bytes are decoded once, where they enter a channel,
//! into the named-field structs below. Channels never shift or mask raw
//! register bytes themselves.

use serde::Serialize;

/// `$4000`/`$4004`/`$400C` and the MMC5 `$5000`/`$5004` control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeControl {
    /// Bits 7-6: square duty (ignored by noise)
    pub duty: u8,
    /// Bit 5: length counter halt / envelope loop
    pub halt: bool,
    /// Bit 4: constant volume
    pub constant_volume: bool,
    /// Bits 3-0: volume, or envelope divider period
    pub volume: u8,
}

impl From<u8> for EnvelopeControl {
    fn from(value: u8) -> Self {
        Self {
            duty: value >> 6,
            halt: value & 0x20 != 0,
            constant_volume: value & 0x10 != 0,
            volume: value & 0x0F,
        }
    }
}

/// `$4001`/`$4005` sweep setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepControl {
    /// Bit 7
    pub enabled: bool,
    /// Bits 6-4: divider period
    pub period: u8,
    /// Bit 3
    pub negate: bool,
    /// Bits 2-0
    pub shift: u8,
}

impl From<u8> for SweepControl {
    fn from(value: u8) -> Self {
        Self {
            enabled: value & 0x80 != 0,
            period: (value >> 4) & 0x07,
            negate: value & 0x08 != 0,
            shift: value & 0x07,
        }
    }
}

/// Fourth register of the square/triangle/noise channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthLoad {
    /// Bits 7-3: index into the length table
    pub length_index: u8,
    /// Bits 2-0: timer period bits 10-8
    pub timer_high: u8,
}

impl From<u8> for LengthLoad {
    fn from(value: u8) -> Self {
        Self {
            length_index: value >> 3,
            timer_high: value & 0x07,
        }
    }
}

/// `$4008` triangle linear counter setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearControl {
    /// Bit 7: length halt and linear counter control
    pub control: bool,
    /// Bits 6-0
    pub reload: u8,
}

impl From<u8> for LinearControl {
    fn from(value: u8) -> Self {
        Self {
            control: value & 0x80 != 0,
            reload: value & 0x7F,
        }
    }
}

/// `$400E` noise mode and period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseControl {
    /// Bit 7: short (93-step) sequence
    pub short_mode: bool,
    /// Bits 3-0
    pub period_index: u8,
}

impl From<u8> for NoiseControl {
    fn from(value: u8) -> Self {
        Self {
            short_mode: value & 0x80 != 0,
            period_index: value & 0x0F,
        }
    }
}

/// `$4010` DPCM flags and rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmcControl {
    /// Bit 7
    pub irq_enabled: bool,
    /// Bit 6
    pub looping: bool,
    /// Bits 3-0
    pub rate_index: u8,
}

impl From<u8> for DmcControl {
    fn from(value: u8) -> Self {
        Self {
            irq_enabled: value & 0x80 != 0,
            looping: value & 0x40 != 0,
            rate_index: value & 0x0F,
        }
    }
}

/// `$4015` write: one enable bit per internal channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEnables {
    pub square1: bool,
    pub square2: bool,
    pub triangle: bool,
    pub noise: bool,
    pub dpcm: bool,
}

impl From<u8> for ChannelEnables {
    fn from(value: u8) -> Self {
        Self {
            square1: value & 0x01 != 0,
            square2: value & 0x02 != 0,
            triangle: value & 0x04 != 0,
            noise: value & 0x08 != 0,
            dpcm: value & 0x10 != 0,
        }
    }
}

/// `$4017` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounterControl {
    /// Bit 7: five-step sequence
    pub five_step: bool,
    /// Bit 6
    pub irq_inhibit: bool,
}

impl From<u8> for FrameCounterControl {
    fn from(value: u8) -> Self {
        Self {
            five_step: value & 0x80 != 0,
            irq_inhibit: value & 0x40 != 0,
        }
    }
}

/// Last value written to each observable register.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterShadow {
    internal: [u8; 0x20],
    /// Four slots per VRC6 window: `$9000`, `$A000`, `$B000`
    vrc6: [u8; 12],
    /// `$4080`-`$408F`
    fds: [u8; 0x10],
}

impl Default for RegisterShadow {
    fn default() -> Self {
        Self {
            internal: [0; 0x20],
            vrc6: [0; 12],
            fds: [0; 0x10],
        }
    }
}

impl RegisterShadow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_internal(&mut self, address: u16, value: u8) {
        self.internal[(address & 0x1F) as usize] = value;
    }

    /// Record expansion writes that fall in a shadowed window. Other
    /// addresses are ignored.
    pub fn log_external(&mut self, address: u16, value: u8) {
        let slot = match address {
            0x9000..=0x9003 => Some(&mut self.vrc6[(address & 3) as usize]),
            0xA000..=0xA003 => Some(&mut self.vrc6[4 + (address & 3) as usize]),
            0xB000..=0xB003 => Some(&mut self.vrc6[8 + (address & 3) as usize]),
            0x4080..=0x408F => Some(&mut self.fds[(address - 0x4080) as usize]),
            _ => None,
        };
        if let Some(slot) = slot {
            *slot = value;
        }
    }

    pub fn internal(&self, reg: u16) -> u8 {
        self.internal[(reg & 0x1F) as usize]
    }

    pub fn vrc6(&self, reg: u16) -> u8 {
        self.vrc6.get((reg & 0x0F) as usize).copied().unwrap_or(0)
    }

    pub fn fds(&self, reg: u16) -> u8 {
        self.fds.get((reg & 0x1F) as usize).copied().unwrap_or(0)
    }

    /// Internal registers `$4000`-`$401F`
    pub fn internal_registers(&self) -> &[u8; 0x20] {
        &self.internal
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_control_fields() {
        let control = EnvelopeControl::from(0b1011_0110);
        assert_eq!(control.duty, 2);
        assert!(control.halt);
        assert!(control.constant_volume);
        assert_eq!(control.volume, 6);
    }

    #[test]
    fn test_sweep_control_fields() {
        let sweep = SweepControl::from(0xAB);
        assert!(sweep.enabled);
        assert_eq!(sweep.period, 2);
        assert!(sweep.negate);
        assert_eq!(sweep.shift, 3);
    }

    #[test]
    fn test_shadow_windows() {
        let mut shadow = RegisterShadow::new();
        shadow.log_internal(0x4002, 0xFD);
        shadow.log_external(0x9003, 0x11);
        shadow.log_external(0xA000, 0x22);
        shadow.log_external(0xB002, 0x33);
        shadow.log_external(0x408F, 0x44);
        shadow.log_external(0xC000, 0x55);

        assert_eq!(shadow.internal(0x02), 0xFD);
        assert_eq!(shadow.vrc6(3), 0x11);
        assert_eq!(shadow.vrc6(4), 0x22);
        assert_eq!(shadow.vrc6(10), 0x33);
        assert_eq!(shadow.vrc6(13), 0);
        assert_eq!(shadow.fds(0x0F), 0x44);
        assert_eq!(shadow.fds(0x10), 0);
    }
}
