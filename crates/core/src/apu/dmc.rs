//! Delta modulation channel.
//!
//! Plays 1-bit delta-encoded samples fetched from cartridge space through
//! the session's [`SampleMemory`].
//!
//! - **$4010**: IRQ enable, loop, rate index
//! - **$4011**: direct load of the 7-bit output level
//! - **$4012**: sample address, `$C000 + value * 64`
//! - **$4013**: sample length, `value * 16 + 1` bytes

use super::channel::{ChannelId, ChannelOutput};
use super::registers::DmcControl;
use super::timing::TimingMode;
use crate::mixer::Mixer;
use crate::session::SampleMemory;

/// CPU cycles per output bit
const DMC_RATES_NTSC: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

const DMC_RATES_PAL: [u16; 16] = [
    398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50,
];

fn rate_table(timing: TimingMode) -> &'static [u16; 16] {
    match timing {
        TimingMode::Ntsc => &DMC_RATES_NTSC,
        TimingMode::Pal => &DMC_RATES_PAL,
    }
}

#[derive(Debug, Clone)]
pub struct DmcChannel {
    output: ChannelOutput,
    rates: &'static [u16; 16],
    rate_index: u8,
    irq_enabled: bool,
    looping: bool,
    load_address: u8,
    load_length: u8,
    counter: u32,
    dma_address: u16,
    bytes_remaining: u16,
    sample_buffer: Option<u8>,
    shift_register: u8,
    bits_remaining: u8,
    silence: bool,
    delta_counter: u8,
    irq_flag: bool,
}

impl DmcChannel {
    pub fn new(timing: TimingMode) -> Self {
        let rates = rate_table(timing);
        Self {
            output: ChannelOutput::new(ChannelId::Dpcm),
            rates,
            rate_index: 0,
            irq_enabled: false,
            looping: false,
            load_address: 0,
            load_length: 0,
            counter: rates[0] as u32,
            dma_address: 0xC000,
            bytes_remaining: 0,
            sample_buffer: None,
            shift_register: 0,
            bits_remaining: 8,
            silence: true,
            delta_counter: 0,
            irq_flag: false,
        }
    }

    pub fn set_timing(&mut self, timing: TimingMode) {
        self.rates = rate_table(timing);
    }

    fn start_address(&self) -> u16 {
        0xC000 | ((self.load_address as u16) << 6)
    }

    fn restart(&mut self) {
        self.dma_address = self.start_address();
        self.bytes_remaining = ((self.load_length as u16) << 4) + 1;
    }

    pub fn write(&mut self, reg: u8, value: u8, mixer: &mut Mixer) {
        match reg & 3 {
            0 => {
                let control = DmcControl::from(value);
                self.irq_enabled = control.irq_enabled;
                self.looping = control.looping;
                self.rate_index = control.rate_index;
                if !self.irq_enabled {
                    self.irq_flag = false;
                }
            }
            1 => {
                self.delta_counter = value & 0x7F;
                self.output.mix(mixer, self.delta_counter as i32);
            }
            2 => self.load_address = value,
            _ => self.load_length = value,
        }
    }

    /// `$4015` bit 4: start a stopped sample, or stop the current one.
    pub fn write_control(&mut self, enabled: bool) {
        self.irq_flag = false;
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart();
        }
    }

    pub fn read_control(&self) -> bool {
        self.bytes_remaining > 0
    }

    fn fill_buffer(&mut self, memory: &dyn SampleMemory) {
        if self.sample_buffer.is_some() || self.bytes_remaining == 0 {
            return;
        }
        self.sample_buffer = Some(memory.read(self.dma_address));
        self.dma_address = if self.dma_address == 0xFFFF {
            0x8000
        } else {
            self.dma_address + 1
        };
        self.bytes_remaining -= 1;
        if self.bytes_remaining == 0 {
            if self.looping {
                self.restart();
            } else if self.irq_enabled {
                self.irq_flag = true;
            }
        }
    }

    fn clock_output_unit(&mut self) {
        if !self.silence {
            if self.shift_register & 1 != 0 {
                if self.delta_counter <= 125 {
                    self.delta_counter += 2;
                }
            } else if self.delta_counter >= 2 {
                self.delta_counter -= 2;
            }
            self.shift_register >>= 1;
        }

        self.bits_remaining -= 1;
        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            match self.sample_buffer.take() {
                Some(byte) => {
                    self.shift_register = byte;
                    self.silence = false;
                }
                None => self.silence = true,
            }
        }
    }

    pub fn process(&mut self, mut time: u32, mixer: &mut Mixer, memory: &dyn SampleMemory) {
        self.fill_buffer(memory);
        while time >= self.counter {
            time -= self.counter;
            self.output.advance(self.counter);
            self.counter = self.rates[self.rate_index as usize] as u32;

            self.clock_output_unit();
            self.fill_buffer(memory);
            self.output.mix(mixer, self.delta_counter as i32);
        }

        self.counter -= time;
        self.output.advance(time);
    }

    pub fn period(&self) -> u32 {
        self.counter
    }

    pub fn end_frame(&mut self) {
        self.output.end_frame();
    }

    pub fn reset(&mut self) {
        let rates = self.rates;
        *self = Self::new(TimingMode::Ntsc);
        self.rates = rates;
        self.counter = rates[0] as u32;
    }

    pub fn output(&self) -> &ChannelOutput {
        &self.output
    }

    /// Sample progress in 64-byte units from the start address
    pub fn sample_pos(&self) -> u8 {
        ((self.dma_address.wrapping_sub(self.start_address()) & 0x7FFF) >> 6) as u8
    }

    pub fn delta_counter(&self) -> u8 {
        self.delta_counter
    }

    pub fn is_playing(&self) -> bool {
        self.bytes_remaining > 0
    }

    pub fn did_irq(&self) -> bool {
        self.irq_flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SampleBank;

    fn bank_of(bytes: &[u8]) -> SampleBank {
        SampleBank::new(bytes.to_vec())
    }

    #[test]
    fn direct_load_sets_level_immediately() {
        let mut mixer = Mixer::new();
        let mut dmc = DmcChannel::new(TimingMode::Ntsc);
        dmc.write(1, 0xC0, &mut mixer);
        assert_eq!(dmc.delta_counter(), 0x40);
        assert_eq!(dmc.output().level(), 0x40);
    }

    #[test]
    fn ones_climb_by_two() {
        let mut mixer = Mixer::new();
        let memory = bank_of(&[0xFF; 17]);
        let mut dmc = DmcChannel::new(TimingMode::Ntsc);
        dmc.write(0, 0x0F, &mut mixer); // rate 54
        dmc.write(1, 10, &mut mixer);
        dmc.write_control(true);

        // First 8 ticks drain the empty shift register, the next 8 play 0xFF.
        dmc.process(428 + 54 * 15, &mut mixer, &memory);
        assert_eq!(dmc.delta_counter(), 10 + 2 * 8);
    }

    #[test]
    fn delta_is_clamped_to_seven_bits() {
        let mut mixer = Mixer::new();
        let memory = bank_of(&[0xFF; 17]);
        let mut dmc = DmcChannel::new(TimingMode::Ntsc);
        dmc.write(0, 0x4F, &mut mixer);
        dmc.write(1, 120, &mut mixer);
        dmc.write_control(true);
        dmc.process(100_000, &mut mixer, &memory);
        assert!(dmc.delta_counter() <= 127);
        assert!(dmc.delta_counter() >= 126);
    }

    #[test]
    fn finished_sample_raises_irq_when_enabled() {
        let mut mixer = Mixer::new();
        let memory = bank_of(&[0x00; 17]);
        let mut dmc = DmcChannel::new(TimingMode::Ntsc);
        dmc.write(0, 0x8F, &mut mixer);
        dmc.write(3, 0, &mut mixer); // one byte
        dmc.write_control(true);
        assert!(dmc.is_playing());

        dmc.process(1, &mut mixer, &memory);
        assert!(!dmc.is_playing());
        assert!(dmc.did_irq());

        dmc.write_control(false);
        assert!(!dmc.did_irq());
    }

    #[test]
    fn looping_sample_keeps_playing() {
        let mut mixer = Mixer::new();
        let memory = bank_of(&[0x55; 17]);
        let mut dmc = DmcChannel::new(TimingMode::Ntsc);
        dmc.write(0, 0x4F, &mut mixer);
        dmc.write(3, 0, &mut mixer);
        dmc.write_control(true);
        dmc.process(50_000, &mut mixer, &memory);
        assert!(dmc.is_playing());
        assert!(!dmc.did_irq());
    }

    #[test]
    fn sample_position_tracks_dma_progress() {
        let mut mixer = Mixer::new();
        let memory = bank_of(&[0xAA; 0x400]);
        let mut dmc = DmcChannel::new(TimingMode::Ntsc);
        dmc.write(0, 0x0F, &mut mixer);
        dmc.write(2, 0x01, &mut mixer);
        dmc.write(3, 0x10, &mut mixer); // 257 bytes
        dmc.write_control(true);
        assert_eq!(dmc.sample_pos(), 0);

        // 130 bytes fetched: one on entry plus one every 8 ticks.
        dmc.process(428 + 54 * (129 * 8 - 1), &mut mixer, &memory);
        assert_eq!(dmc.sample_pos(), 2);
    }
}
