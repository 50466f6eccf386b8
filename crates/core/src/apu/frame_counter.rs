//! Frame sequencer that clocks envelopes, linear/length counters and sweeps.
//!
//! Runs at roughly 240 Hz (NTSC) or 200 Hz (PAL). Each step advances the
//! step index first, then reports which units fire:
//!
//! | mode   | step 0 | step 1 | step 2 | step 3  | step 4 |
//! |--------|--------|--------|--------|---------|--------|
//! | 4-step | Q      | Q H    | Q      | Q H F   |        |
//! | 5-step | Q H    | Q      | Q H    | Q       | -      |
//!
//! Q = quarter frame (envelopes, linear counter), H = half frame (length
//! counters, sweeps), F = full frame.

use super::registers::FrameCounterControl;
use super::timing::TimingMode;
use crate::logging::{log, LogCategory, LogLevel};

/// Sequencer mode selected by `$4017` bit 7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerMode {
    FourStep,
    FiveStep,
}

impl SequencerMode {
    fn steps(self) -> u8 {
        match self {
            SequencerMode::FourStep => 4,
            SequencerMode::FiveStep => 5,
        }
    }
}

/// Units to clock for one sequencer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameEvents {
    pub quarter: bool,
    pub half: bool,
    pub full: bool,
}

impl FrameEvents {
    pub const NONE: FrameEvents = FrameEvents {
        quarter: false,
        half: false,
        full: false,
    };
    pub const ALL: FrameEvents = FrameEvents {
        quarter: true,
        half: true,
        full: true,
    };

    const fn new(quarter: bool, half: bool, full: bool) -> Self {
        Self { quarter, half, full }
    }
}

#[derive(Debug, Clone)]
pub struct FrameSequencer {
    mode: SequencerMode,
    /// Index of the last step taken; the next clock moves past it
    step: u8,
    /// CPU cycles until the next step
    clock: u32,
    period: u32,
}

impl FrameSequencer {
    pub fn new(timing: TimingMode) -> Self {
        let period = timing.sequencer_period();
        Self {
            mode: SequencerMode::FourStep,
            step: 0,
            clock: period,
            period,
        }
    }

    /// Change the step period; the step in flight keeps its deadline.
    pub fn set_timing(&mut self, timing: TimingMode) {
        self.period = timing.sequencer_period();
    }

    pub fn reset(&mut self) {
        self.mode = SequencerMode::FourStep;
        self.step = 0;
        self.clock = self.period;
    }

    pub fn cycles_until_step(&self) -> u32 {
        self.clock
    }

    pub fn advance(&mut self, cycles: u32) {
        self.clock = self.clock.saturating_sub(cycles);
    }

    /// Take the step that is due and report what it clocks.
    pub fn clock(&mut self) -> FrameEvents {
        self.clock += self.period;
        self.step = (self.step + 1) % self.mode.steps();

        let events = match (self.mode, self.step) {
            (SequencerMode::FourStep, 0) => FrameEvents::new(true, false, false),
            (SequencerMode::FourStep, 1) => FrameEvents::new(true, true, false),
            (SequencerMode::FourStep, 2) => FrameEvents::new(true, false, false),
            (SequencerMode::FourStep, _) => FrameEvents::ALL,
            (SequencerMode::FiveStep, 0) | (SequencerMode::FiveStep, 2) => {
                FrameEvents::new(true, true, false)
            }
            (SequencerMode::FiveStep, 1) | (SequencerMode::FiveStep, 3) => {
                FrameEvents::new(true, false, false)
            }
            (SequencerMode::FiveStep, _) => FrameEvents::NONE,
        };

        log(LogCategory::Sequencer, LogLevel::Trace, || {
            format!("step {} ({:?}): {:?}", self.step, self.mode, events)
        });
        events
    }

    /// `$4017` write: select the mode and restart the sequence. Bit 7 also
    /// clocks every unit at once.
    pub fn write_control(&mut self, value: u8) -> FrameEvents {
        let control = FrameCounterControl::from(value);
        self.mode = if control.five_step {
            SequencerMode::FiveStep
        } else {
            SequencerMode::FourStep
        };
        self.step = 0;

        log(LogCategory::Sequencer, LogLevel::Debug, || {
            format!("mode {:?}, irq inhibit {}", self.mode, control.irq_inhibit)
        });
        if control.irq_inhibit {
            log(LogCategory::Stubs, LogLevel::Debug, || {
                "frame IRQ inhibit is accepted but frame IRQs are not generated".to_string()
            });
        }

        if control.five_step {
            FrameEvents::ALL
        } else {
            FrameEvents::NONE
        }
    }

    pub fn mode(&self) -> SequencerMode {
        self.mode
    }

    pub fn step(&self) -> u8 {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_steps(sequencer: &mut FrameSequencer, count: usize) -> Vec<FrameEvents> {
        (0..count)
            .map(|_| {
                let period = sequencer.cycles_until_step();
                sequencer.advance(period);
                sequencer.clock()
            })
            .collect()
    }

    #[test]
    fn four_step_pattern() {
        let mut sequencer = FrameSequencer::new(TimingMode::Ntsc);
        let events = run_steps(&mut sequencer, 4);

        assert!(events.iter().all(|e| e.quarter));
        let halves: Vec<bool> = events.iter().map(|e| e.half).collect();
        assert_eq!(halves, vec![true, false, true, false]);
        assert!(events[2].full);
        assert_eq!(sequencer.step(), 0);
    }

    #[test]
    fn five_step_has_silent_step() {
        let mut sequencer = FrameSequencer::new(TimingMode::Ntsc);
        sequencer.write_control(0x80);
        let events = run_steps(&mut sequencer, 5);

        assert_eq!(events[0], FrameEvents::new(true, false, false));
        assert_eq!(events[1], FrameEvents::new(true, true, false));
        assert_eq!(events[2], FrameEvents::new(true, false, false));
        assert_eq!(events[3], FrameEvents::NONE);
        assert_eq!(events[4], FrameEvents::new(true, true, false));
    }

    #[test]
    fn write_with_bit7_fires_everything_and_restarts() {
        let mut sequencer = FrameSequencer::new(TimingMode::Ntsc);
        run_steps(&mut sequencer, 2);
        assert_eq!(sequencer.write_control(0x80), FrameEvents::ALL);
        assert_eq!(sequencer.step(), 0);
        assert_eq!(sequencer.write_control(0x00), FrameEvents::NONE);
        assert_eq!(sequencer.mode(), SequencerMode::FourStep);
    }

    #[test]
    fn steps_are_one_period_apart() {
        let mut sequencer = FrameSequencer::new(TimingMode::Pal);
        assert_eq!(sequencer.cycles_until_step(), 8314);
        sequencer.advance(8314);
        sequencer.clock();
        assert_eq!(sequencer.cycles_until_step(), 8314);
    }
}
