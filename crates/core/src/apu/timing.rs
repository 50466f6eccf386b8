//! Machine timing for NTSC and PAL consoles.

use serde::{Deserialize, Serialize};

/// Console region. Selects the master clock, frame rate and the
/// machine-dependent period tables used by the noise and DPCM channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// NTSC (North America, Japan) - 1.789773 MHz CPU clock
    #[default]
    Ntsc,
    /// PAL (Europe, Australia) - 1.662607 MHz CPU clock
    Pal,
}

impl TimingMode {
    /// CPU clock in Hz; one APU cycle is one CPU cycle
    pub const fn cpu_clock_hz(self) -> u32 {
        match self {
            TimingMode::Ntsc => 1_789_773,
            TimingMode::Pal => 1_662_607,
        }
    }

    /// Frames per second used to size a frame of audio
    pub const fn frame_rate_hz(self) -> u32 {
        match self {
            TimingMode::Ntsc => 60,
            TimingMode::Pal => 50,
        }
    }

    /// CPU cycles between two frame-sequencer steps (~240 Hz NTSC, ~200 Hz PAL)
    pub const fn sequencer_period(self) -> u32 {
        match self {
            TimingMode::Ntsc => 7458,
            TimingMode::Pal => 8314,
        }
    }

    /// CPU cycles in one audio frame
    pub const fn frame_cycle_count(self) -> u32 {
        self.cpu_clock_hz() / self.frame_rate_hz()
    }
}
