//! Main control loop: poll, dispatch, step tasks, render, sleep.
//!
//! One loop owns the instrument and its scheduler. The hardware adapter is
//! shared with the `led-writer` thread behind [`SharedHardware`]; every poll
//! takes the same lock as every write.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use quadgrid_audio::SynthError;
use quadgrid_types::{ButtonEvent, Generation, LogicalEvent};

use crate::config::Config;
use crate::hardware::HardwareError;
use crate::input;
use crate::instrument::Instrument;
use crate::led::{lock_hardware, LedFrame, LedRenderer, SharedHardware, LED_QUEUE_CAPACITY};
use crate::scheduler::{Outbox, Scheduler};
use crate::telemetry::LoopTelemetry;

/// Default sleep between iterations.
pub const DEFAULT_QUANTUM: Duration = Duration::from_millis(2);
const TELEMETRY_INTERVAL: Duration = Duration::from_secs(10);
const LED_SYNC_TIMEOUT: Duration = Duration::from_secs(1);

pub type LoopResult<T = ()> = Result<T, LoopError>;

/// Startup or teardown failure of the control loop.
#[derive(Debug, Clone)]
pub struct LoopError(pub String);

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for LoopError {}

impl From<HardwareError> for LoopError {
    fn from(e: HardwareError) -> Self {
        LoopError(format!("hardware: {}", e))
    }
}

impl From<SynthError> for LoopError {
    fn from(e: SynthError) -> Self {
        LoopError(format!("synth: {}", e))
    }
}

impl From<std::io::Error> for LoopError {
    fn from(e: std::io::Error) -> Self {
        LoopError(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub quantum: Duration,
    pub led_queue_capacity: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            quantum: DEFAULT_QUANTUM,
            led_queue_capacity: LED_QUEUE_CAPACITY,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            quantum: config.poll_quantum(),
            led_queue_capacity: config.led_queue_capacity(),
        }
    }
}

/// Cloneable stop flag. Any holder can end the loop from another thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ControlLoop<I: Instrument> {
    hardware: SharedHardware,
    generation: Generation,
    instrument: I,
    scheduler: Scheduler<I>,
    renderer: LedRenderer,
    telemetry: LoopTelemetry,
    settings: LoopSettings,
    shutdown: ShutdownHandle,
    finished: bool,
}

impl<I: Instrument> ControlLoop<I> {
    /// Reset the device, start the LED writer and the instrument's tasks,
    /// and paint the first frame.
    pub fn new(hardware: SharedHardware, mut instrument: I, settings: LoopSettings) -> LoopResult<Self> {
        let generation = {
            let mut hw = lock_hardware(&hardware);
            hw.reset()?;
            hw.generation()
        };
        let renderer = LedRenderer::spawn(Arc::clone(&hardware), settings.led_queue_capacity)?;

        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        instrument.start(&mut scheduler, now)?;
        instrument.controller_mut().mark_all_dirty();
        log::info!(
            target: "loop",
            "{} ready on {} ({} tasks)",
            instrument.name(),
            generation.name(),
            scheduler.len()
        );

        let mut control = Self {
            hardware,
            generation,
            instrument,
            scheduler,
            renderer,
            telemetry: LoopTelemetry::new(),
            settings,
            shutdown: ShutdownHandle::default(),
            finished: false,
        };
        control.refresh(now);
        Ok(control)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn instrument(&self) -> &I {
        &self.instrument
    }

    pub fn instrument_mut(&mut self) -> &mut I {
        &mut self.instrument
    }

    pub fn scheduler(&self) -> &Scheduler<I> {
        &self.scheduler
    }

    pub fn renderer_mut(&mut self) -> &mut LedRenderer {
        &mut self.renderer
    }

    /// One iteration at `now`, without the sleep. Returns `false` once
    /// shutdown has been requested.
    pub fn step_once(&mut self, now: Instant) -> bool {
        let polled = lock_hardware(&self.hardware).poll_event();
        if let Some(event) = polled {
            self.dispatch(event, now);
        }

        let report = self.scheduler.step(&mut self.instrument, now);
        if report.faults > 0 {
            log::debug!(target: "loop", "{} task faults this step", report.faults);
        }
        if report.shutdown {
            self.shutdown.request();
        }

        self.refresh(now);
        !self.shutdown.is_requested()
    }

    fn dispatch(&mut self, event: ButtonEvent, now: Instant) {
        let logical = input::normalize(event.id, self.generation);
        if let LogicalEvent::Unrecognized(id) = logical {
            log::debug!(target: "input", "dropping unrecognized id {}", id);
            return;
        }
        let mut out = Outbox::new();
        if let Err(e) = self.instrument.handle_event(logical, event.pressed, now, &mut out) {
            log::warn!(target: "synth", "{:?} failed: {}", logical, e);
        }
        if self.scheduler.absorb(out, now) {
            self.shutdown.request();
        }
    }

    fn refresh(&mut self, now: Instant) {
        let mut dirty = self.instrument.controller_mut().take_dirty();
        dirty.merge(self.renderer.pending_regions());
        if dirty.any() {
            let frame = self.instrument.frame(now);
            self.renderer.render_regions(&frame, dirty);
        }
    }

    /// Run until shutdown, then tear down.
    pub fn run(&mut self) -> LoopResult {
        let mut last_summary = Instant::now();
        while !self.shutdown.is_requested() {
            let start = Instant::now();
            self.step_once(start);
            self.telemetry.record(start.elapsed(), self.settings.quantum);

            if last_summary.elapsed() >= TELEMETRY_INTERVAL {
                last_summary = Instant::now();
                log::debug!(target: "loop", "{}", self.telemetry.take_summary());
            }
            thread::sleep(self.settings.quantum);
        }
        log::info!(target: "loop", "shutting down {}", self.instrument.name());
        self.finish()
    }

    /// Silence the instrument, clear the LEDs and release the device.
    /// Safe to call more than once.
    pub fn finish(&mut self) -> LoopResult {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        if let Err(e) = self.instrument.shutdown() {
            log::warn!(target: "synth", "shutdown: {}", e);
        }
        self.renderer.render(&LedFrame::new());
        if !self.renderer.sync(LED_SYNC_TIMEOUT) {
            log::warn!(target: "led", "writer did not drain before shutdown");
        }
        self.renderer.shutdown();

        let mut hw = lock_hardware(&self.hardware);
        let reset = hw.reset();
        hw.close();
        reset.map_err(LoopError::from)
    }
}

impl<I: Instrument> Drop for ControlLoop<I> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::warn!(target: "loop", "teardown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HardwareAdapter, HardwareOp, SharedTestHardware, TestHardware};
    use crate::instrument::{HarmonicInstrument, InstrumentSettings};
    use quadgrid_audio::{SharedTestSynth, TestSynth};
    use quadgrid_types::{GridPosition, LedTarget};
    use std::sync::Mutex;

    fn harness(generation: Generation) -> (Arc<TestHardware>, Arc<TestSynth>, ControlLoop<HarmonicInstrument>) {
        let hw = Arc::new(TestHardware::new(generation));
        let synth = Arc::new(TestSynth::new());
        let boxed: Box<dyn HardwareAdapter> = Box::new(SharedTestHardware(Arc::clone(&hw)));
        let inst = HarmonicInstrument::new(
            Box::new(SharedTestSynth(Arc::clone(&synth))),
            &InstrumentSettings::default(),
        );
        let control = ControlLoop::new(Arc::new(Mutex::new(boxed)), inst, LoopSettings::default()).unwrap();
        (hw, synth, control)
    }

    #[test]
    fn startup_resets_and_paints() {
        let (hw, _, mut control) = harness(Generation::Mk2);
        assert!(control.renderer_mut().sync(LED_SYNC_TIMEOUT));
        assert_eq!(hw.operations().first(), Some(&HardwareOp::Reset));
        assert_eq!(hw.write_count(), 80);
    }

    #[test]
    fn unrecognized_ids_are_dropped() {
        let (hw, synth, mut control) = harness(Generation::Mk1);
        synth.clear();
        hw.push_event(ButtonEvent::press(127));
        assert!(control.step_once(Instant::now()));
        assert!(synth.triggers().is_empty());
    }

    #[test]
    fn shutdown_handle_stops_the_loop() {
        let (_, _, mut control) = harness(Generation::Mk2);
        let handle = control.shutdown_handle();
        assert!(control.step_once(Instant::now()));
        handle.request();
        assert!(!control.step_once(Instant::now()));
        control.run().unwrap();
    }

    #[test]
    fn failed_led_writes_are_retried_by_idle_steps() {
        let (hw, _, mut control) = harness(Generation::Mk2);
        assert!(control.renderer_mut().sync(LED_SYNC_TIMEOUT));
        let pad = GridPosition::new(3, 4).unwrap();

        hw.fail_writes(true);
        hw.press(LedTarget::Grid(pad));
        let now = Instant::now();
        control.step_once(now);
        assert!(control.renderer_mut().sync(LED_SYNC_TIMEOUT));

        hw.fail_writes(false);
        hw.clear();
        for _ in 0..3 {
            control.step_once(now);
        }
        assert!(control.renderer_mut().sync(LED_SYNC_TIMEOUT));
        assert!(hw.write_count() > 0);
        assert_eq!(hw.last_color(LedTarget::Grid(pad)), Some(vec![63, 63, 63]));
    }

    #[test]
    fn finish_clears_leds_and_closes() {
        let (hw, synth, mut control) = harness(Generation::Mk2);
        let pad = GridPosition::new(3, 4).unwrap();
        hw.press(LedTarget::Grid(pad));
        control.step_once(Instant::now());
        assert_eq!(synth.triggers().len(), 1);

        control.finish().unwrap();
        assert_eq!(hw.last_color(LedTarget::Grid(pad)), Some(vec![0, 0, 0]));
        let ops = hw.operations();
        assert_eq!(ops[ops.len() - 2], HardwareOp::Reset);
        assert_eq!(ops[ops.len() - 1], HardwareOp::Close);
        assert_eq!(synth.last_effect("master_gain"), Some(0.0));

        // Second call is a no-op.
        control.finish().unwrap();
        assert_eq!(hw.operations().len(), ops.len());
    }
}
