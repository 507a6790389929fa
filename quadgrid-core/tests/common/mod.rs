#![allow(dead_code)]
//! Harness for driving a control loop against scripted hardware and a
//! recording synth.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use quadgrid_audio::{SharedTestSynth, SynthEngine, TestSynth};
use quadgrid_core::control_loop::{ControlLoop, LoopSettings};
use quadgrid_core::hardware::{HardwareAdapter, SharedTestHardware, TestHardware};
use quadgrid_core::instrument::{Instrument, InstrumentSettings};
use quadgrid_types::{Generation, GridPosition, LedTarget};

pub const SYNC: Duration = Duration::from_secs(2);

pub struct Rig<I: Instrument> {
    pub hardware: Arc<TestHardware>,
    pub synth: Arc<TestSynth>,
    pub control: ControlLoop<I>,
}

/// Build an instrument over a recording synth and start a loop for it.
pub fn rig<I, F>(generation: Generation, build: F) -> Rig<I>
where
    I: Instrument,
    F: FnOnce(Box<dyn SynthEngine>, &InstrumentSettings) -> I,
{
    let hardware = Arc::new(TestHardware::new(generation));
    let synth = Arc::new(TestSynth::new());
    let instrument = build(
        Box::new(SharedTestSynth(Arc::clone(&synth))),
        &InstrumentSettings::default(),
    );
    let adapter: Box<dyn HardwareAdapter> = Box::new(SharedTestHardware(Arc::clone(&hardware)));
    let control = ControlLoop::new(Arc::new(Mutex::new(adapter)), instrument, LoopSettings::default())
        .expect("control loop starts");
    Rig {
        hardware,
        synth,
        control,
    }
}

impl<I: Instrument> Rig<I> {
    /// Queue a press and run one iteration at `now`.
    pub fn press(&mut self, target: LedTarget, now: Instant) -> bool {
        self.hardware.press(target);
        self.control.step_once(now)
    }

    pub fn release(&mut self, target: LedTarget, now: Instant) -> bool {
        self.hardware.release(target);
        self.control.step_once(now)
    }

    /// Wait for queued LED writes to reach the test hardware.
    pub fn settle(&mut self) {
        assert!(self.control.renderer_mut().sync(SYNC), "led writer stalled");
    }

    pub fn led(&mut self, target: LedTarget) -> Option<Vec<u8>> {
        self.settle();
        self.hardware.last_color(target)
    }
}

pub fn pad(x: u8, y: u8) -> GridPosition {
    GridPosition::new(x, y).unwrap()
}
