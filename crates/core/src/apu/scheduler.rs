//! The APU core: cycle scheduler, register router and session state.
//!
//! Callers hand the core CPU cycles with [`Apu::add_time`] and then issue
//! register reads and writes. Every access first runs [`Apu::process`] so
//! that all owed cycles are emulated before the access takes effect.
//!
//! Within [`Apu::process`] time advances in quanta bounded by the cycles
//! still owed, the next frame-sequencer step and the end of the current
//! audio frame. Inside a quantum the two squares are sub-stepped together,
//! as are triangle, noise and DPCM, so each pair of clock domains advances
//! from one audible event to the next.

use super::channel::ChannelId;
use super::dmc::DmcChannel;
use super::expansion::{ChipMask, Expansion, SoundChip};
use super::frame_counter::{FrameEvents, FrameSequencer};
use super::noise::NoiseChannel;
use super::pulse::PulseChannel;
use super::registers::{ChannelEnables, RegisterShadow};
use super::timing::TimingMode;
use super::triangle::TriangleChannel;
use super::AudioChip;
use crate::config::{ApuConfig, MixerSettings};
use crate::error::{ApuError, MAX_SAMPLE_RATE};
use crate::logging::{log, LogCategory, LogLevel};
use crate::mixer::{db_to_gain, ChipLevel, Mixer};
use crate::session::{AudioSink, FrameObserver, SampleMemory};

/// Output buffers are sized for the longest frame (PAL, 50 Hz).
const MIN_FRAME_RATE: u32 = 50;

pub struct Apu {
    timing: TimingMode,
    /// Cycles owed by the caller and not yet emulated
    cycles_to_run: u32,
    /// Cycles emulated in the current audio frame
    frame_cycles: u32,
    frame_cycle_count: u32,
    frame_count: u64,

    sequencer: FrameSequencer,
    square1: PulseChannel,
    square2: PulseChannel,
    triangle: TriangleChannel,
    noise: NoiseChannel,
    dpcm: DmcChannel,
    expansion: Vec<Expansion>,
    chip_mask: ChipMask,

    mixer: Mixer,
    registers: RegisterShadow,
    sound_buffer: Vec<i16>,
    sample_rate: u32,
    stereo: bool,

    sink: Box<dyn AudioSink + Send>,
    sample_memory: Box<dyn SampleMemory + Send>,
    observer: Option<Box<dyn FrameObserver + Send>>,
}

impl Apu {
    /// Create an APU with the default configuration (44.1 kHz mono NTSC, no
    /// expansion chips).
    pub fn new(
        sink: Box<dyn AudioSink + Send>,
        sample_memory: Box<dyn SampleMemory + Send>,
    ) -> Result<Self, ApuError> {
        Self::with_config(&ApuConfig::default(), sink, sample_memory)
    }

    pub fn with_config(
        config: &ApuConfig,
        sink: Box<dyn AudioSink + Send>,
        sample_memory: Box<dyn SampleMemory + Send>,
    ) -> Result<Self, ApuError> {
        let timing = config.machine;
        let mut apu = Self {
            timing,
            cycles_to_run: 0,
            frame_cycles: 0,
            frame_cycle_count: timing.frame_cycle_count(),
            frame_count: 0,
            sequencer: FrameSequencer::new(timing),
            square1: PulseChannel::square1(),
            square2: PulseChannel::square2(),
            triangle: TriangleChannel::new(),
            noise: NoiseChannel::new(timing),
            dpcm: DmcChannel::new(timing),
            expansion: Vec::new(),
            chip_mask: ChipMask::NONE,
            mixer: Mixer::new(),
            registers: RegisterShadow::new(),
            sound_buffer: Vec::new(),
            sample_rate: config.sample_rate,
            stereo: false,
            sink,
            sample_memory,
            observer: None,
        };

        apu.mixer.update_settings(config.mixer);
        for (chip, db) in config.chip_levels.iter() {
            apu.set_chip_level(chip, db);
        }
        apu.setup_sound(config.sample_rate, config.channels, config.machine)?;
        apu.set_external_sound(config.expansion);
        Ok(apu)
    }

    /// Configure the output format and machine, then reset.
    ///
    /// On error the previous output configuration stays in place.
    pub fn setup_sound(
        &mut self,
        sample_rate: u32,
        channels: u8,
        machine: TimingMode,
    ) -> Result<(), ApuError> {
        if sample_rate == 0 || sample_rate > MAX_SAMPLE_RATE {
            return Err(ApuError::InvalidSampleRate(sample_rate));
        }
        if !(1..=2).contains(&channels) {
            return Err(ApuError::InvalidChannelCount(channels));
        }

        let samples = (sample_rate / MIN_FRAME_RATE) as usize;
        let len = (samples * 2 + 4) * channels as usize;
        let mut sound_buffer = Vec::new();
        sound_buffer
            .try_reserve_exact(len)
            .map_err(|_| ApuError::BufferAllocation { samples: len })?;
        sound_buffer.resize(len, 0);
        self.mixer.allocate_buffer(samples, sample_rate, channels)?;

        self.sound_buffer = sound_buffer;
        self.sample_rate = sample_rate;
        self.stereo = channels == 2;
        self.timing = machine;
        self.apply_timing();
        self.reset();
        Ok(())
    }

    /// Switch between NTSC and PAL without rebuilding the session.
    pub fn change_machine(&mut self, machine: TimingMode) {
        log(LogCategory::Scheduler, LogLevel::Info, || {
            format!("machine {:?} -> {:?}", self.timing, machine)
        });
        self.timing = machine;
        self.apply_timing();
        self.reset();
    }

    fn apply_timing(&mut self) {
        let timing = self.timing;
        self.sequencer.set_timing(timing);
        self.noise.set_timing(timing);
        self.dpcm.set_timing(timing);
        self.frame_cycle_count = timing.frame_cycle_count();
        self.mixer.set_clock_rate(timing.cpu_clock_hz());
        self.apply_sample_speed();
    }

    fn apply_sample_speed(&mut self) {
        let (rate, clock, fps) = (
            self.sample_rate,
            self.timing.cpu_clock_hz(),
            self.timing.frame_rate_hz(),
        );
        for chip in &mut self.expansion {
            chip.set_sample_speed(rate, clock, fps);
        }
    }

    /// Rebuild the expansion chip set from `mask` and reset everything.
    pub fn set_external_sound(&mut self, mask: ChipMask) {
        self.expansion = mask.chips().filter_map(Expansion::new).collect();
        self.chip_mask = mask;
        log(LogCategory::Scheduler, LogLevel::Info, || {
            format!("expansion chips: {:?}", self.active_chips())
        });
        self.apply_sample_speed();
        self.reset();
    }

    /// Back to silence: counters, channels, chips, mixer and register shadow.
    pub fn reset(&mut self) {
        self.cycles_to_run = 0;
        self.frame_cycles = 0;
        self.sequencer.reset();

        self.square1.reset();
        self.square2.reset();
        self.triangle.reset();
        self.noise.reset();
        self.dpcm.reset();
        for chip in &mut self.expansion {
            chip.reset();
        }

        self.mixer.clear_buffer();
        self.mixer.set_n163_channels(1);
        self.registers.clear();
    }

    /// Owe the core `cycles` more CPU cycles. Negative values are ignored.
    pub fn add_time(&mut self, cycles: i32) {
        match u32::try_from(cycles) {
            Ok(cycles) => self.cycles_to_run = self.cycles_to_run.saturating_add(cycles),
            Err(_) => log(LogCategory::Scheduler, LogLevel::Debug, || {
                format!("ignoring negative time {}", cycles)
            }),
        }
    }

    /// Emulate every owed cycle.
    pub fn process(&mut self) {
        while self.cycles_to_run > 0 {
            let quantum = self
                .cycles_to_run
                .min(self.sequencer.cycles_until_step())
                .min(self.frame_cycle_count - self.frame_cycles);

            self.run_apu1(quantum);
            self.run_apu2(quantum);
            for chip in &mut self.expansion {
                chip.process(quantum, &mut self.mixer);
            }

            self.cycles_to_run -= quantum;
            self.frame_cycles += quantum;
            self.sequencer.advance(quantum);

            if self.sequencer.cycles_until_step() == 0 {
                let events = self.sequencer.clock();
                self.dispatch(events);
            }
            if self.frame_cycles >= self.frame_cycle_count {
                self.end_frame();
            }
        }
    }

    /// Squares share one clock domain.
    fn run_apu1(&mut self, mut time: u32) {
        while time > 0 {
            let step = self.square1.period().min(self.square2.period()).clamp(1, time);
            self.square1.process(step, &mut self.mixer);
            self.square2.process(step, &mut self.mixer);
            time -= step;
        }
    }

    /// Triangle, noise and DPCM share the other.
    fn run_apu2(&mut self, mut time: u32) {
        while time > 0 {
            let step = self
                .triangle
                .period()
                .min(self.noise.period())
                .min(self.dpcm.period())
                .clamp(1, time);
            self.triangle.process(step, &mut self.mixer);
            self.noise.process(step, &mut self.mixer);
            self.dpcm.process(step, &mut self.mixer, &*self.sample_memory);
            time -= step;
        }
    }

    fn dispatch(&mut self, events: FrameEvents) {
        if events.quarter {
            self.square1.clock_envelope();
            self.square2.clock_envelope();
            self.triangle.clock_linear_counter();
            self.noise.clock_envelope();
        }
        if events.half {
            self.square1.clock_sweep();
            self.square2.clock_sweep();
            self.square1.clock_length();
            self.square2.clock_length();
            self.triangle.clock_length();
            self.noise.clock_length();
        }
        if events.full {
            log(LogCategory::Sequencer, LogLevel::Trace, || {
                "full frame (no frame IRQ)".to_string()
            });
        }
    }

    fn end_frame(&mut self) {
        self.square1.end_frame();
        self.square2.end_frame();
        self.triangle.end_frame();
        self.noise.end_frame();
        self.dpcm.end_frame();
        for chip in &mut self.expansion {
            chip.end_frame();
        }

        let available = self.mixer.finish_buffer(self.frame_cycles);
        let written = self
            .mixer
            .read_buffer(available, &mut self.sound_buffer, self.stereo);
        let width = if self.stereo { 2 } else { 1 };
        self.sink.flush_buffer(&self.sound_buffer[..written * width]);

        self.frame_cycles = 0;
        self.frame_count += 1;
        if let Some(observer) = self.observer.as_mut() {
            observer.on_frame(self.frame_count, &self.registers);
        }
    }

    /// Internal register write (`$4000`-`$4017`).
    pub fn write(&mut self, address: u16, value: u8) {
        self.process();

        if !(0x4000..=0x401F).contains(&address) {
            log(LogCategory::Registers, LogLevel::Debug, || {
                format!("write to ${:04X} is not an APU register", address)
            });
            return;
        }
        log(LogCategory::Registers, LogLevel::Trace, || {
            format!("${:04X} <- ${:02X}", address, value)
        });

        match address {
            0x4015 => {
                let enables = ChannelEnables::from(value);
                self.square1.write_control(enables.square1);
                self.square2.write_control(enables.square2);
                self.triangle.write_control(enables.triangle);
                self.noise.write_control(enables.noise);
                self.dpcm.write_control(enables.dpcm);
            }
            0x4017 => {
                let events = self.sequencer.write_control(value);
                self.dispatch(events);
            }
            _ => {
                let reg = (address & 0x03) as u8;
                match address & 0x1C {
                    0x00 => self.square1.write(reg, value),
                    0x04 => self.square2.write(reg, value),
                    0x08 => self.triangle.write(reg, value),
                    0x0C => self.noise.write(reg, value),
                    0x10 => self.dpcm.write(reg, value, &mut self.mixer),
                    _ => {}
                }
            }
        }
        self.registers.log_internal(address, value);
    }

    fn status(&self) -> u8 {
        self.square1.read_control() as u8
            | (self.square2.read_control() as u8) << 1
            | (self.triangle.read_control() as u8) << 2
            | (self.noise.read_control() as u8) << 3
            | (self.dpcm.read_control() as u8) << 4
            | (self.dpcm.did_irq() as u8) << 7
    }

    /// `$4015` status: length counters active in bits 0-4, DMC IRQ in bit 7.
    pub fn read_4015(&mut self) -> u8 {
        self.process();
        self.status()
    }

    /// Read any address: `$4015` is the status register, everything else
    /// goes to the expansion chips.
    pub fn read(&mut self, address: u16) -> u8 {
        if address == 0x4015 {
            self.read_4015()
        } else {
            self.external_read(address)
        }
    }

    /// Expansion register write, offered to every active chip.
    pub fn external_write(&mut self, address: u16, value: u8) {
        self.process();
        log(LogCategory::Registers, LogLevel::Trace, || {
            format!("${:04X} <- ${:02X} (expansion)", address, value)
        });
        for chip in &mut self.expansion {
            chip.write(address, value, &mut self.mixer);
        }
        self.registers.log_external(address, value);
    }

    /// Expansion register read. The first chip that maps `address` answers;
    /// otherwise the result is open bus (the address high byte).
    pub fn external_read(&mut self, address: u16) -> u8 {
        self.process();
        for chip in &mut self.expansion {
            if let Some(value) = chip.read(address) {
                return value;
            }
        }
        log(LogCategory::Expansion, LogLevel::Trace, || {
            format!("open bus read at ${:04X}", address)
        });
        (address >> 8) as u8
    }

    pub fn setup_mixer(&mut self, low_cut: u32, high_cut: u32, high_damp: u32, volume: u32) {
        self.mixer.update_settings(MixerSettings {
            low_cut,
            high_cut,
            high_damp,
            volume,
        });
    }

    /// Set a chip group's level in dB (0 is nominal).
    pub fn set_chip_level(&mut self, chip: ChipLevel, db: f32) {
        self.mixer.set_chip_level(chip, db_to_gain(db));
    }

    pub fn set_observer(&mut self, observer: Option<Box<dyn FrameObserver + Send>>) {
        self.observer = observer;
    }

    /// Meter reading for a channel
    pub fn get_vol(&self, channel: ChannelId) -> i32 {
        self.mixer.chan_output(channel)
    }

    /// Last level a channel sent to the mixer
    pub fn level(&self, channel: ChannelId) -> i32 {
        self.mixer.level(channel)
    }

    pub fn get_sample_pos(&self) -> u8 {
        self.dpcm.sample_pos()
    }

    pub fn get_delta_counter(&self) -> u8 {
        self.dpcm.delta_counter()
    }

    pub fn dpcm_playing(&self) -> bool {
        self.dpcm.is_playing()
    }

    /// Register read-back for inspection; 0 where a chip keeps no record.
    pub fn get_reg(&self, chip: SoundChip, reg: u16) -> u8 {
        match chip {
            SoundChip::Apu => self.registers.internal(reg),
            SoundChip::Vrc6 => self.registers.vrc6(reg),
            SoundChip::Fds => self.registers.fds(reg),
            SoundChip::Mmc5 => 0,
            SoundChip::N163 | SoundChip::Vrc7 | SoundChip::S5b => self
                .expansion
                .iter()
                .find_map(|expansion| match expansion {
                    Expansion::N163(n163) if chip == SoundChip::N163 => {
                        Some(n163.read_mem(reg as u8))
                    }
                    Expansion::Vrc7(vrc7) if chip == SoundChip::Vrc7 => {
                        Some(vrc7.register(reg as u8))
                    }
                    Expansion::S5b(s5b) if chip == SoundChip::S5b => Some(s5b.register(reg as u8)),
                    _ => None,
                })
                .unwrap_or(0),
        }
    }

    pub fn frame_sequencer_step(&self) -> u8 {
        self.sequencer.step()
    }

    pub fn cycles_to_run(&self) -> u32 {
        self.cycles_to_run
    }

    /// Cycles emulated so far in the current audio frame
    pub fn frame_cycles(&self) -> u32 {
        self.frame_cycles
    }

    pub fn frame_cycle_count(&self) -> u32 {
        self.frame_cycle_count
    }

    /// Audio frames finished since the session started
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn machine(&self) -> TimingMode {
        self.timing
    }

    pub fn chip_mask(&self) -> ChipMask {
        self.chip_mask
    }

    pub fn active_chips(&self) -> Vec<SoundChip> {
        self.expansion.iter().map(Expansion::chip).collect()
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn registers(&self) -> &RegisterShadow {
        &self.registers
    }

    /// Snapshot of scheduler and channel state for debugging.
    pub fn debug_state(&self) -> serde_json::Value {
        serde_json::json!({
            "machine": self.timing,
            "sample_rate": self.sample_rate,
            "stereo": self.stereo,
            "cycles_to_run": self.cycles_to_run,
            "frame_cycles": self.frame_cycles,
            "frame_cycle_count": self.frame_cycle_count,
            "frame_count": self.frame_count,
            "sequencer": {
                "mode": format!("{:?}", self.sequencer.mode()),
                "step": self.sequencer.step(),
                "cycles_until_step": self.sequencer.cycles_until_step(),
            },
            "status": self.status(),
            "dpcm": {
                "playing": self.dpcm.is_playing(),
                "sample_pos": self.dpcm.sample_pos(),
                "delta_counter": self.dpcm.delta_counter(),
                "irq": self.dpcm.did_irq(),
            },
            "chips": self.active_chips(),
            "registers": self.registers,
        })
    }
}
