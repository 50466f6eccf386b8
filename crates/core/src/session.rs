//! Host-facing session interfaces.
//!
//! The core pushes finished audio to an [`AudioSink`], pulls DPCM bytes
//! from a [`SampleMemory`], and optionally reports each completed frame to a
//! [`FrameObserver`]. All three are owned by the [`crate::Apu`] as boxed
//! trait objects.

use std::sync::{Arc, Mutex};

use crate::apu::registers::RegisterShadow;
use crate::logging::{log, LogCategory, LogLevel};

/// Receives one frame of interleaved 16-bit PCM at a time.
pub trait AudioSink {
    fn flush_buffer(&mut self, samples: &[i16]);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn flush_buffer(&mut self, _samples: &[i16]) {}
}

/// Collects every flushed frame. Clones share the same storage, so the host
/// keeps one handle while the APU owns another.
#[derive(Debug, Default, Clone)]
pub struct BufferedSink {
    inner: Arc<Mutex<SinkState>>,
}

#[derive(Debug, Default)]
struct SinkState {
    samples: Vec<i16>,
    frames: usize,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of flushes received
    pub fn frames(&self) -> usize {
        self.state().frames
    }

    pub fn len(&self) -> usize {
        self.state().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take all collected samples, leaving the sink empty.
    pub fn take(&self) -> Vec<i16> {
        std::mem::take(&mut self.state().samples)
    }
}

impl AudioSink for BufferedSink {
    fn flush_buffer(&mut self, samples: &[i16]) {
        let mut state = self.state();
        state.samples.extend_from_slice(samples);
        state.frames += 1;
    }
}

/// Read access to CPU address space for DPCM sample fetches.
pub trait SampleMemory {
    fn read(&self, address: u16) -> u8;
}

/// Sample data mapped from `$C000` upward; reads outside it return 0.
#[derive(Debug, Default, Clone)]
pub struct SampleBank {
    data: Vec<u8>,
}

impl SampleBank {
    pub const BASE: u16 = 0xC000;

    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Copy `bytes` into the bank at CPU address `address`, growing it as
    /// needed. Addresses below `$C000` are ignored.
    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        let Some(offset) = address.checked_sub(Self::BASE) else {
            return;
        };
        let start = offset as usize;
        let end = (start + bytes.len()).min(0x4000);
        if end <= start {
            return;
        }
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(&bytes[..end - start]);
    }
}

impl SampleMemory for SampleBank {
    fn read(&self, address: u16) -> u8 {
        address
            .checked_sub(Self::BASE)
            .and_then(|offset| self.data.get(offset as usize))
            .copied()
            .unwrap_or(0)
    }
}

/// Called once per completed audio frame.
pub trait FrameObserver {
    fn on_frame(&mut self, frame: u64, registers: &RegisterShadow);
}

/// Logs the first twenty internal registers every frame at Trace level,
/// formatted as `Frame NNNNNNNN: XX XX ...`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterTrace;

impl RegisterTrace {
    pub fn format_frame(frame: u64, registers: &RegisterShadow) -> String {
        let mut line = format!("Frame {:08}:", frame);
        for value in &registers.internal_registers()[..0x14] {
            line.push_str(&format!(" {:02X}", value));
        }
        line
    }
}

impl FrameObserver for RegisterTrace {
    fn on_frame(&mut self, frame: u64, registers: &RegisterShadow) {
        log(LogCategory::Registers, LogLevel::Trace, || {
            Self::format_frame(frame, registers)
        });
    }
}
