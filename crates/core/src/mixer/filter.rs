//! Output filters applied after the delta buffer is integrated.

use std::f32::consts::PI;

use crate::config::MixerSettings;

/// First-order high-pass; removes the DC offset the unipolar channels leave.
#[derive(Debug, Clone, Default)]
pub struct HighPass {
    coeff: f32,
    prev_in: f32,
    prev_out: f32,
}

impl HighPass {
    pub fn configure(&mut self, sample_rate: u32, cutoff: u32) {
        self.coeff = if cutoff == 0 {
            1.0
        } else {
            let rc = 1.0 / (2.0 * PI * cutoff as f32);
            let dt = 1.0 / sample_rate as f32;
            rc / (rc + dt)
        };
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let out = self.coeff * (self.prev_out + input - self.prev_in);
        self.prev_in = input;
        self.prev_out = out;
        out
    }

    pub fn reset(&mut self) {
        self.prev_in = 0.0;
        self.prev_out = 0.0;
    }
}

/// First-order low-pass. A cutoff at or above Nyquist passes through.
#[derive(Debug, Clone, Default)]
pub struct LowPass {
    coeff: f32,
    out: f32,
}

impl LowPass {
    pub fn configure(&mut self, sample_rate: u32, cutoff: u32) {
        self.coeff = if cutoff == 0 || cutoff.saturating_mul(2) >= sample_rate {
            1.0
        } else {
            let rc = 1.0 / (2.0 * PI * cutoff as f32);
            let dt = 1.0 / sample_rate as f32;
            dt / (rc + dt)
        };
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.out += self.coeff * (input - self.out);
        self.out
    }

    pub fn reset(&mut self) {
        self.out = 0.0;
    }
}

/// High-pass at `low_cut`, then a treble shelf: content above `high_cut`
/// is attenuated by `high_damp` dB instead of removed.
#[derive(Debug, Clone)]
pub struct FilterChain {
    low_cut: HighPass,
    high_cut: LowPass,
    treble_gain: f32,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self {
            low_cut: HighPass::default(),
            high_cut: LowPass::default(),
            treble_gain: 1.0,
        }
    }
}

impl FilterChain {
    pub fn configure(&mut self, sample_rate: u32, settings: &MixerSettings) {
        self.low_cut.configure(sample_rate, settings.low_cut);
        self.high_cut.configure(sample_rate, settings.high_cut);
        self.treble_gain = 10f32.powf(-(settings.high_damp as f32) / 20.0);
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let band = self.low_cut.process(input);
        let low = self.high_cut.process(band);
        low + self.treble_gain * (band - low)
    }

    pub fn reset(&mut self) {
        self.low_cut.reset();
        self.high_cut.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_pass_decays_dc() {
        let mut filter = HighPass::default();
        filter.configure(44_100, 16);

        let first = filter.process(1.0);
        let mut last = first;
        for _ in 0..44_100 {
            last = filter.process(1.0);
        }
        assert!(first > 0.99);
        assert!(last.abs() < 0.01, "DC left after one second: {}", last);
    }

    #[test]
    fn test_low_pass_settles_on_dc() {
        let mut filter = LowPass::default();
        filter.configure(44_100, 12_000);
        let mut out = 0.0;
        for _ in 0..100 {
            out = filter.process(0.5);
        }
        assert!((out - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_shelf_attenuates_alternating_signal() {
        let settings = MixerSettings {
            low_cut: 0,
            high_cut: 2_000,
            high_damp: 24,
            volume: 100,
        };
        let mut chain = FilterChain::default();
        chain.configure(44_100, &settings);

        let mut peak: f32 = 0.0;
        for i in 0..1_000 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let y = chain.process(x);
            if i > 500 {
                peak = peak.max(y.abs());
            }
        }
        // Nyquist-rate content ends up near the -24 dB floor.
        assert!(peak < 0.25, "peak {}", peak);
        assert!(peak > 0.05, "peak {}", peak);
    }
}
