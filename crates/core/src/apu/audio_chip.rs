//! Common interface for expansion sound chips.
//!
//! Cartridge expansion audio plugs into the same scheduler as the internal
//! channels: the scheduler hands each chip a number of CPU cycles, and the
//! chip pushes level changes for its own channels into the mixer.

use super::channel::ChannelId;
use crate::mixer::Mixer;

pub trait AudioChip {
    /// Register write at a CPU address. Chips ignore addresses they do not
    /// decode.
    fn write(&mut self, address: u16, value: u8, mixer: &mut Mixer);

    /// Register read. `None` when the address is not mapped by this chip.
    fn read(&mut self, address: u16) -> Option<u8> {
        let _ = address;
        None
    }

    /// Run for `cycles` CPU cycles.
    fn process(&mut self, cycles: u32, mixer: &mut Mixer);

    /// Frame boundary: channel-local time restarts at zero.
    fn end_frame(&mut self);

    /// Back to power-on state and silence.
    fn reset(&mut self);

    /// Output-rate information for chips synthesized per output sample.
    fn set_sample_speed(&mut self, sample_rate: u32, base_clock: u32, frame_rate: u32) {
        let _ = (sample_rate, base_clock, frame_rate);
    }

    /// Mixer channels this chip drives
    fn channels(&self) -> &'static [ChannelId];
}
