//! Harmonic grid synth.
//!
//! Pads are laid out as fourths: one semitone per column, five per row going
//! up, starting at MIDI 36 plus the root. Every pad press is quantized to the
//! current scale and panned by its position.
//!
//! | control | action |
//! |---|---|
//! | top 0 / 1 | root up / down |
//! | top 2 / 3 | scale next / previous |
//! | top 4 / 5 (held) | harmonics ramp up / down |
//! | top 6 / 7 | volume down / up |
//! | side 0 | reverb mode |
//! | side 1 | delay mode (also sets the step period) |
//! | side 2 | arpeggiator |
//! | side 3 | drum mode |
//! | side 4 / 5 | octave up / down |
//! | side 6 | power off |

pub mod arpeggiator;
pub mod drums;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use quadgrid_audio::{SynthEngine, SynthResult, VoiceRef};
use quadgrid_types::scale::{harmonic_scales, random_micro_scale};
use quadgrid_types::{
    note_name, ControllerState, GridPosition, LedColor, LogicalEvent, ModeId, Region,
    ScaleDegreeSet, ToggleId, GRID_SIZE,
};

use crate::led::LedFrame;
use crate::pool::VoicePool;
use crate::quantize::{grid_gains, is_in_scale, is_root, quantize_pitch};
use crate::scheduler::{Outbox, ScheduledTask, Scheduler, TaskResult};

use super::{gain_meter, mode_color, scale_index_by_name, Instrument, InstrumentSettings, FX_MASTER_GAIN};

pub use arpeggiator::{Arpeggiator, ArpeggiatorTask};
pub use drums::{DrumPattern, DrumTask};

const BASE_PITCH: f64 = 36.0;
const ROW_INTERVAL: f64 = 5.0;
/// Step period while the delay is off.
const DEFAULT_STEP: Duration = Duration::from_millis(200);
const HARMONICS_RAMP: Duration = Duration::from_millis(100);

const REVERB_MIX: [f32; 4] = [0.0, 0.3, 0.5, 0.65];
const REVERB_SIZE: [f32; 4] = [0.5, 0.4, 0.7, 0.95];
const DELAY_INPUT: [f32; 4] = [0.0, 0.3, 0.45, 0.6];
const DELAY_TIME: [f32; 4] = [0.0075, 0.2, 0.4, 1.0];
const DELAY_FEEDBACK: [f32; 4] = [0.55, 0.6, 0.7, 0.8];

const SIDE_REVERB: u8 = 0;
const SIDE_DELAY: u8 = 1;
const SIDE_ARP: u8 = 2;
const SIDE_DRUMS: u8 = 3;
const SIDE_OCTAVE_UP: u8 = 4;
const SIDE_OCTAVE_DOWN: u8 = 5;
const SIDE_POWER: u8 = 6;

const LEVEL_NAMES: [&str; 4] = ["OFF", "LOW", "MED", "HIGH"];

pub struct HarmonicInstrument {
    synth: Box<dyn SynthEngine>,
    controller: ControllerState,
    scales: Vec<ScaleDegreeSet>,
    pool: VoicePool<GridPosition>,
    /// Pads physically held down, including ones whose voice was stolen.
    held: BTreeSet<GridPosition>,
    reverb: ModeId,
    delay: ModeId,
    drums: ModeId,
    arp: ToggleId,
    harmonics_up: ToggleId,
    harmonics_down: ToggleId,
    harmonics: f64,
    harmonics_range: (f64, f64),
    rng_state: u64,
}

impl HarmonicInstrument {
    pub fn new(synth: Box<dyn SynthEngine>, settings: &InstrumentSettings) -> Self {
        let mut rng_state = settings.seed | 1;
        let mut scales = harmonic_scales();
        scales.push(random_micro_scale(&mut rng_state));
        let scale = scale_index_by_name(&scales, settings.scale.as_deref());

        let mut controller = ControllerState::new(scales.len())
            .with_root(settings.root)
            .with_scale(scale)
            .with_gain(settings.gain);
        let reverb = controller.add_mode("reverb", 4, Region::Side);
        let delay = controller.add_mode("delay", 4, Region::Side);
        let drums = controller.add_mode("drums", 4, Region::Side);
        let arp = controller.add_toggle("arpeggiator", Region::Side);
        let harmonics_up = controller.add_toggle("harmonics_up", Region::Top);
        let harmonics_down = controller.add_toggle("harmonics_down", Region::Top);

        let (lo, hi) = (settings.harmonics_min, settings.harmonics_max.max(settings.harmonics_min));
        Self {
            synth,
            controller,
            scales,
            pool: VoicePool::new(settings.voice_capacity),
            held: BTreeSet::new(),
            reverb,
            delay,
            drums,
            arp,
            harmonics_up,
            harmonics_down,
            harmonics: lo,
            harmonics_range: (lo, hi),
            rng_state,
        }
    }

    pub fn pool(&self) -> &VoicePool<GridPosition> {
        &self.pool
    }

    pub fn scales(&self) -> &[ScaleDegreeSet] {
        &self.scales
    }

    pub fn current_scale(&self) -> &ScaleDegreeSet {
        &self.scales[self.controller.scale_index() % self.scales.len()]
    }

    pub fn harmonics(&self) -> f64 {
        self.harmonics
    }

    pub fn arp_active(&self) -> bool {
        self.controller.is_active(self.arp)
    }

    pub fn drum_mode(&self) -> usize {
        self.controller.mode(self.drums)
    }

    pub fn delay_mode(&self) -> usize {
        self.controller.mode(self.delay)
    }

    pub fn reverb_mode(&self) -> usize {
        self.controller.mode(self.reverb)
    }

    /// The drum voice sits just past the pad voices.
    pub fn drum_voice(&self) -> VoiceRef {
        VoiceRef(self.pool.capacity() as u16)
    }

    /// Arpeggiator and drum period: the delay time, or 200 ms with the delay off.
    pub fn step_period(&self) -> Duration {
        match self.delay_mode() {
            0 => DEFAULT_STEP,
            mode => Duration::from_secs_f32(DELAY_TIME[mode.min(3)]),
        }
    }

    /// Unquantized pitch of a pad.
    pub fn raw_pitch(&self, pos: GridPosition) -> f64 {
        BASE_PITCH
            + self.controller.root() as f64
            + pos.x() as f64
            + ROW_INTERVAL * pos.row_from_bottom() as f64
            + 12.0 * self.controller.octave() as f64
    }

    /// Pitch a pad plays under the current scale.
    pub fn pitch_for(&self, pos: GridPosition) -> f64 {
        quantize_pitch(self.raw_pitch(pos), self.current_scale(), self.controller.root())
    }

    fn note_on(&mut self, pos: GridPosition) -> SynthResult {
        self.held.insert(pos);
        let alloc = self.pool.allocate(pos);
        if let Some(prev) = alloc.stolen {
            log::debug!(target: "harmonic", "pad {} lost its voice to {}", prev, pos);
        }
        let pitch = self.pitch_for(pos);
        self.pool
            .apply_parameters(alloc.voice, pitch, grid_gains(pos), self.synth.as_ref())?;
        self.controller.mark_dirty(Region::Grid);
        self.synth.trigger(alloc.voice)
    }

    fn note_off(&mut self, pos: GridPosition) -> SynthResult {
        self.held.remove(&pos);
        self.controller.mark_dirty(Region::Grid);
        self.pool.release(pos, self.synth.as_ref())?;
        Ok(())
    }

    /// Move every sounding voice onto the current root, scale and octave.
    fn retune(&mut self) -> SynthResult {
        let scale = self.current_scale().clone();
        let root = self.controller.root();
        let base = BASE_PITCH + root as f64 + 12.0 * self.controller.octave() as f64;
        let changed = self.pool.retune(
            |pos| {
                let raw = base + pos.x() as f64 + ROW_INTERVAL * pos.row_from_bottom() as f64;
                quantize_pitch(raw, &scale, root)
            },
            self.synth.as_ref(),
        )?;
        if changed > 0 {
            log::debug!(target: "harmonic", "retuned {} voices", changed);
        }
        Ok(())
    }

    fn log_key(&self) {
        log::info!(
            target: "harmonic",
            "Key: {} | Scale: {} | Volume: {:.2}",
            note_name(self.controller.root()),
            self.current_scale().name(),
            self.controller.gain()
        );
    }

    fn push_reverb(&self) -> SynthResult {
        let mode = self.reverb_mode();
        self.synth.set_effect_parameter("reverb_mix", REVERB_MIX[mode])?;
        self.synth.set_effect_parameter("reverb_size", REVERB_SIZE[mode])
    }

    fn push_delay(&self) -> SynthResult {
        let mode = self.delay_mode();
        self.synth.set_effect_parameter("delay_input", DELAY_INPUT[mode])?;
        self.synth.set_effect_parameter("delay_time", DELAY_TIME[mode])?;
        self.synth.set_effect_parameter("delay_feedback", DELAY_FEEDBACK[mode])
    }

    fn push_gain(&self) -> SynthResult {
        self.synth
            .set_effect_parameter(FX_MASTER_GAIN, self.controller.gain() as f32)
    }

    fn handle_top(&mut self, index: u8, pressed: bool) -> SynthResult {
        match (index, pressed) {
            (4, _) => {
                self.controller.set_toggle(self.harmonics_up, pressed);
                return Ok(());
            }
            (5, _) => {
                self.controller.set_toggle(self.harmonics_down, pressed);
                return Ok(());
            }
            (_, false) => return Ok(()),
            (0, true) => {
                self.controller.shift_root(1);
                self.retune()?;
            }
            (1, true) => {
                self.controller.shift_root(-1);
                self.retune()?;
            }
            (2, true) => {
                self.controller.cycle_scale(1);
                self.retune()?;
            }
            (3, true) => {
                self.controller.cycle_scale(-1);
                self.retune()?;
            }
            (6, true) => {
                self.controller.adjust_gain(-1);
                self.push_gain()?;
            }
            (7, true) => {
                self.controller.adjust_gain(1);
                self.push_gain()?;
            }
            _ => return Ok(()),
        }
        self.log_key();
        Ok(())
    }

    fn handle_side(&mut self, index: u8, out: &mut Outbox<Self>) -> SynthResult {
        match index {
            SIDE_REVERB => {
                let mode = self.controller.cycle_mode(self.reverb, 1);
                log::info!(
                    target: "harmonic",
                    "Reverb: {} | Mix: {} | Size: {}",
                    LEVEL_NAMES[mode],
                    REVERB_MIX[mode],
                    REVERB_SIZE[mode]
                );
                self.push_reverb()
            }
            SIDE_DELAY => {
                let mode = self.controller.cycle_mode(self.delay, 1);
                log::info!(
                    target: "harmonic",
                    "Delay: {} | Time: {}s | Feedback: {} | Input: {}",
                    LEVEL_NAMES[mode],
                    DELAY_TIME[mode],
                    DELAY_FEEDBACK[mode],
                    DELAY_INPUT[mode]
                );
                self.push_delay()
            }
            SIDE_ARP => {
                let on = self.controller.toggle(self.arp);
                log::info!(target: "harmonic", "Arpeggiator: {}", if on { "ON" } else { "OFF" });
                Ok(())
            }
            SIDE_DRUMS => {
                let mode = self.controller.cycle_mode(self.drums, 1);
                log::info!(
                    target: "harmonic",
                    "Drums: {}",
                    ["OFF", "BURSTS", "BURSTS", "SPARSE"][mode]
                );
                Ok(())
            }
            SIDE_OCTAVE_UP | SIDE_OCTAVE_DOWN => {
                let delta = if index == SIDE_OCTAVE_UP { 1 } else { -1 };
                if self.controller.adjust_octave(delta) {
                    self.retune()?;
                }
                log::info!(target: "harmonic", "Octave: {}", self.controller.octave());
                Ok(())
            }
            SIDE_POWER => {
                log::info!(target: "harmonic", "power button pressed, exiting");
                out.request_shutdown();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn pad_color(&self, pos: GridPosition) -> LedColor {
        let raw = self.raw_pitch(pos);
        let sounding = self.pool.handle_for(pos).is_some()
            || self
                .held
                .iter()
                .any(|&other| (self.raw_pitch(other) - raw).abs() < 1e-9);
        if sounding {
            return LedColor::WHITE;
        }
        let scale = self.current_scale();
        let root = self.controller.root();
        if is_root(raw, scale, root) {
            LedColor::RED
        } else if is_in_scale(raw, scale, root) {
            LedColor::GREEN
        } else {
            LedColor::OFF
        }
    }
}

/// Ramps the harmonics count while top 4 or 5 is held.
pub struct HarmonicsTask;

impl ScheduledTask<HarmonicInstrument> for HarmonicsTask {
    fn name(&self) -> &str {
        "harmonics"
    }

    fn tick(
        &mut self,
        inst: &mut HarmonicInstrument,
        _now: Instant,
        _out: &mut Outbox<HarmonicInstrument>,
    ) -> TaskResult {
        let up = inst.controller.is_active(inst.harmonics_up);
        let down = inst.controller.is_active(inst.harmonics_down);
        let delta = match (up, down) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => return Ok(HARMONICS_RAMP),
        };
        let (lo, hi) = inst.harmonics_range;
        let next = (inst.harmonics + delta).clamp(lo, hi);
        if next != inst.harmonics {
            inst.harmonics = next;
            inst.controller.mark_dirty(Region::Top);
            inst.synth.set_effect_parameter("harmonics", next as f32)?;
            log::info!(target: "harmonic", "Harmonics: {}", next as i32);
        }
        Ok(HARMONICS_RAMP)
    }
}

impl Instrument for HarmonicInstrument {
    fn name(&self) -> &'static str {
        "harmonic"
    }

    fn controller(&self) -> &ControllerState {
        &self.controller
    }

    fn controller_mut(&mut self) -> &mut ControllerState {
        &mut self.controller
    }

    fn start(&mut self, scheduler: &mut Scheduler<Self>, now: Instant) -> SynthResult {
        self.push_gain()?;
        self.synth
            .set_effect_parameter("harmonics", self.harmonics as f32)?;
        self.push_reverb()?;
        self.push_delay()?;

        scheduler.register(Box::new(ArpeggiatorTask::new()), now);
        scheduler.register(Box::new(DrumTask::new()), now);
        scheduler.register(Box::new(HarmonicsTask), now);

        log::info!(
            target: "harmonic",
            "{} scales loaded, random scale is {}",
            self.scales.len(),
            self.scales.last().map_or("", |s| s.name())
        );
        self.log_key();
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: LogicalEvent,
        pressed: bool,
        _now: Instant,
        out: &mut Outbox<Self>,
    ) -> SynthResult {
        match event {
            LogicalEvent::Grid(pos) if pressed => self.note_on(pos),
            LogicalEvent::Grid(pos) => self.note_off(pos),
            LogicalEvent::TopControl(i) => self.handle_top(i, pressed),
            LogicalEvent::SideControl(i) if pressed => self.handle_side(i, out),
            _ => Ok(()),
        }
    }

    fn frame(&self, _now: Instant) -> LedFrame {
        let mut frame = LedFrame::new();
        for pos in GridPosition::all() {
            frame.set_grid(pos, self.pad_color(pos));
        }

        frame.set_side(SIDE_REVERB, mode_color(self.reverb_mode()));
        let delay_color = match self.delay_mode() {
            0 => LedColor::OFF,
            1 => LedColor::rgb63(0, 30, 0),
            2 => LedColor::rgb63(63, 40, 0),
            _ => LedColor::RED,
        };
        frame.set_side(SIDE_DELAY, delay_color);
        frame.set_side(
            SIDE_ARP,
            if self.arp_active() { LedColor::GREEN } else { LedColor::OFF },
        );
        frame.set_side(SIDE_DRUMS, mode_color(self.drum_mode()));
        let octave_color = if self.controller.octave() == 0 {
            LedColor::GREEN
        } else {
            LedColor::rgb63(63, 20, 0)
        };
        frame.set_side(SIDE_OCTAVE_UP, octave_color);
        frame.set_side(SIDE_OCTAVE_DOWN, octave_color);
        frame.set_side(SIDE_POWER, LedColor::rgb63(10, 10, 63));

        let harmonics_color = if self.harmonics < 20.0 {
            LedColor::GREEN
        } else if self.harmonics < 40.0 {
            LedColor::AMBER
        } else {
            LedColor::RED
        };
        frame.set_top(4, harmonics_color);
        frame.set_top(5, harmonics_color);
        let volume = gain_meter(self.controller.gain(), LedColor::RED);
        frame.set_top(6, volume);
        frame.set_top(7, volume);
        frame
    }

    fn shutdown(&mut self) -> SynthResult {
        self.held.clear();
        let released = self.pool.release_all(self.synth.as_ref())?;
        log::info!(target: "harmonic", "released {} voices", released.len());
        self.synth.set_effect_parameter(FX_MASTER_GAIN, 0.0)
    }
}

/// Pad at `x` columns from the left and `row` rows up from the bottom.
pub fn pad_at(x: u8, row: u8) -> Option<GridPosition> {
    if row >= GRID_SIZE {
        return None;
    }
    GridPosition::new(x, GRID_SIZE - 1 - row)
}
