//! Nintendo MMC5: two squares without sweep plus an 8-bit PCM voice.
//!
//! The squares run their envelopes and length counters from the chip's own
//! 240 Hz divider, independent of the APU frame sequencer.

use crate::apu::audio_chip::AudioChip;
use crate::apu::channel::{ChannelId, ChannelOutput};
use crate::apu::pulse::PulseChannel;
use crate::logging::{log, LogCategory, LogLevel};
use crate::mixer::Mixer;

const CHANNELS: [ChannelId; 3] = [
    ChannelId::Mmc5Square1,
    ChannelId::Mmc5Square2,
    ChannelId::Mmc5Voice,
];

const FRAME_RATE_HZ: u32 = 240;

pub struct Mmc5 {
    squares: [PulseChannel; 2],
    voice: ChannelOutput,
    /// `$5010` bit 0: PCM is fed by CPU reads, which are not emulated
    read_mode: bool,
    frame_period: u32,
    frame_counter: u32,
}

impl Default for Mmc5 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mmc5 {
    pub fn new() -> Self {
        let frame_period = crate::apu::TimingMode::Ntsc.cpu_clock_hz() / FRAME_RATE_HZ;
        Self {
            squares: [
                PulseChannel::mmc5(ChannelId::Mmc5Square1),
                PulseChannel::mmc5(ChannelId::Mmc5Square2),
            ],
            voice: ChannelOutput::new(ChannelId::Mmc5Voice),
            read_mode: false,
            frame_period,
            frame_counter: frame_period,
        }
    }

    fn clock_frame(&mut self) {
        for square in &mut self.squares {
            square.clock_envelope();
            square.clock_length();
        }
    }
}

impl AudioChip for Mmc5 {
    fn write(&mut self, address: u16, value: u8, mixer: &mut Mixer) {
        match address {
            0x5000..=0x5003 => self.squares[0].write((address & 3) as u8, value),
            0x5004..=0x5007 => self.squares[1].write((address & 3) as u8, value),
            0x5010 => {
                self.read_mode = value & 0x01 != 0;
                if self.read_mode {
                    log(LogCategory::Stubs, LogLevel::Debug, || {
                        "MMC5 PCM read mode selected; only direct writes play".to_string()
                    });
                }
            }
            0x5011 => {
                // Zero is ignored by the hardware.
                if !self.read_mode && value != 0 {
                    self.voice.mix(mixer, value as i32);
                }
            }
            0x5015 => {
                self.squares[0].write_control(value & 0x01 != 0);
                self.squares[1].write_control(value & 0x02 != 0);
            }
            _ => {}
        }
    }

    fn read(&mut self, address: u16) -> Option<u8> {
        match address {
            0x5015 => Some(
                self.squares[0].read_control() as u8 | (self.squares[1].read_control() as u8) << 1,
            ),
            0x5010 => Some(0),
            _ => None,
        }
    }

    fn process(&mut self, mut cycles: u32, mixer: &mut Mixer) {
        while cycles > 0 {
            let step = cycles.min(self.frame_counter);
            for square in &mut self.squares {
                square.process(step, mixer);
            }
            self.voice.advance(step);

            cycles -= step;
            self.frame_counter -= step;
            if self.frame_counter == 0 {
                self.frame_counter = self.frame_period;
                self.clock_frame();
            }
        }
    }

    fn end_frame(&mut self) {
        for square in &mut self.squares {
            square.end_frame();
        }
        self.voice.end_frame();
    }

    fn reset(&mut self) {
        for square in &mut self.squares {
            square.reset();
        }
        self.voice.reset();
        self.read_mode = false;
        self.frame_counter = self.frame_period;
    }

    fn set_sample_speed(&mut self, _sample_rate: u32, base_clock: u32, _frame_rate: u32) {
        self.frame_period = (base_clock / FRAME_RATE_HZ).max(1);
        self.frame_counter = self.frame_counter.min(self.frame_period);
    }

    fn channels(&self) -> &'static [ChannelId] {
        &CHANNELS
    }
}
