//! Namco 163: up to eight wavetable channels sharing 128 bytes of RAM.
//!
//! - `$F800`: RAM address (bits 6-0), auto-increment (bit 7)
//! - `$4800`: RAM data, read and write
//!
//! Channel `n` (0-based, as numbered by trackers) keeps its registers at
//! `$78 - 8n`. Bits 6-4 of `$7F` select how many channels run. The chip
//! updates one channel every 15 CPU cycles, round robin, and each channel
//! holds its level until its next turn.

use crate::apu::audio_chip::AudioChip;
use crate::apu::channel::{ChannelId, ChannelOutput};
use crate::logging::{log, LogCategory, LogLevel};
use crate::mixer::Mixer;

const CYCLES_PER_UPDATE: u32 = 15;

pub struct N163 {
    ram: [u8; 128],
    address: u8,
    auto_increment: bool,
    outputs: [ChannelOutput; 8],
    /// Cycles until the next channel update
    counter: u32,
    current: usize,
}

impl Default for N163 {
    fn default() -> Self {
        Self::new()
    }
}

impl N163 {
    pub fn new() -> Self {
        Self {
            ram: [0; 128],
            address: 0,
            auto_increment: false,
            outputs: ChannelId::N163.map(ChannelOutput::new),
            counter: CYCLES_PER_UPDATE,
            current: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        ((self.ram[0x7F] >> 4) & 0x07) as usize + 1
    }

    /// Direct RAM peek without touching the address register
    pub fn read_mem(&self, reg: u8) -> u8 {
        self.ram[(reg & 0x7F) as usize]
    }

    fn step_address(&mut self) {
        if self.auto_increment {
            self.address = (self.address + 1) & 0x7F;
        }
    }

    fn update_channel(&mut self, channel: usize, mixer: &mut Mixer) {
        let base = 0x78 - 8 * channel;
        let reg = |offset: usize| self.ram[base + offset] as u32;

        let freq = reg(0) | reg(2) << 8 | (reg(4) & 0x03) << 16;
        let mut phase = reg(1) | reg(3) << 8 | reg(5) << 16;
        let length = (256 - (reg(4) & 0xFC)) << 16;
        let offset = reg(6);
        let volume = (reg(7) & 0x0F) as i32;

        phase = (phase + freq) % length;
        self.ram[base + 1] = phase as u8;
        self.ram[base + 3] = (phase >> 8) as u8;
        self.ram[base + 5] = (phase >> 16) as u8;

        let index = (((phase >> 16) + offset) & 0xFF) as usize;
        let byte = self.ram[index >> 1];
        let nibble = if index & 1 == 0 { byte & 0x0F } else { byte >> 4 };

        self.outputs[channel].mix(mixer, (nibble as i32 - 8) * volume);
    }
}

impl AudioChip for N163 {
    fn write(&mut self, address: u16, value: u8, mixer: &mut Mixer) {
        match address {
            0xF800..=0xFFFF => {
                self.address = value & 0x7F;
                self.auto_increment = value & 0x80 != 0;
            }
            0x4800..=0x4FFF => {
                self.ram[self.address as usize] = value;
                if self.address == 0x7F {
                    let count = self.channel_count();
                    mixer.set_n163_channels(count as u8);
                    log(LogCategory::Expansion, LogLevel::Debug, || {
                        format!("N163 running {} channel(s)", count)
                    });
                }
                self.step_address();
            }
            _ => {}
        }
    }

    fn read(&mut self, address: u16) -> Option<u8> {
        match address {
            0x4800..=0x4FFF => {
                let value = self.ram[self.address as usize];
                self.step_address();
                Some(value)
            }
            _ => None,
        }
    }

    fn process(&mut self, mut cycles: u32, mixer: &mut Mixer) {
        while cycles >= self.counter {
            cycles -= self.counter;
            for output in &mut self.outputs {
                output.advance(self.counter);
            }
            self.counter = CYCLES_PER_UPDATE;

            let count = self.channel_count();
            if self.current >= count {
                self.current = 0;
            }
            self.update_channel(self.current, mixer);
            self.current = (self.current + 1) % count;
        }

        self.counter -= cycles;
        for output in &mut self.outputs {
            output.advance(cycles);
        }
    }

    fn end_frame(&mut self) {
        for output in &mut self.outputs {
            output.end_frame();
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn channels(&self) -> &'static [ChannelId] {
        &ChannelId::N163
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poke(n163: &mut N163, mixer: &mut Mixer, address: u8, bytes: &[u8]) {
        n163.write(0xF800, 0x80 | address, mixer);
        for &byte in bytes {
            n163.write(0x4800, byte, mixer);
        }
    }

    #[test]
    fn auto_increment_reads_and_writes() {
        let mut mixer = Mixer::new();
        let mut n163 = N163::new();
        poke(&mut n163, &mut mixer, 0x10, &[1, 2, 3]);

        n163.write(0xF800, 0x90, &mut mixer);
        assert_eq!(n163.read(0x4800), Some(1));
        assert_eq!(n163.read(0x4800), Some(2));
        assert_eq!(n163.read_mem(0x12), 3);
        assert_eq!(n163.read(0x5000), None);
    }

    #[test]
    fn address_wraps_at_128() {
        let mut mixer = Mixer::new();
        let mut n163 = N163::new();
        poke(&mut n163, &mut mixer, 0x7F, &[0x00, 0xAB]);
        assert_eq!(n163.read_mem(0x00), 0xAB);
    }

    #[test]
    fn channel_plays_its_wave() {
        let mut mixer = Mixer::new();
        let mut n163 = N163::new();
        // Wave at nibble 0: all samples 0xF.
        poke(&mut n163, &mut mixer, 0x00, &[0xFF; 8]);
        // Channel 0 at $78: freq 0x10000 (one sample per update),
        // length 16 samples, offset 0, volume 15, one channel.
        poke(
            &mut n163,
            &mut mixer,
            0x78,
            &[0x00, 0x00, 0x00, 0x00, 0xF1, 0x00, 0x00, 0x0F],
        );

        n163.process(CYCLES_PER_UPDATE, &mut mixer);
        assert_eq!(n163.outputs[0].level(), (15 - 8) * 15);
        assert_eq!(n163.read_mem(0x7D), 1);
    }

    #[test]
    fn channel_count_controls_round_robin() {
        let mut mixer = Mixer::new();
        let mut n163 = N163::new();
        poke(&mut n163, &mut mixer, 0x00, &[0xFF; 8]);
        // Two channels, both at volume 15 with a 16-sample wave.
        poke(&mut n163, &mut mixer, 0x70, &[0, 0, 0, 0, 0xF0, 0, 0, 0x0F]);
        poke(&mut n163, &mut mixer, 0x78, &[0, 0, 0, 0, 0xF0, 0, 0, 0x1F]);
        assert_eq!(n163.channel_count(), 2);

        n163.process(CYCLES_PER_UPDATE, &mut mixer);
        assert_eq!(n163.outputs[0].level(), 105);
        assert_eq!(n163.outputs[1].level(), 0);
        n163.process(CYCLES_PER_UPDATE, &mut mixer);
        assert_eq!(n163.outputs[1].level(), 105);
    }
}
