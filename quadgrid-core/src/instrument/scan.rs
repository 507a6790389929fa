//! Speaker scan and psychoacoustic tester.
//!
//! Six continuous sources run for the whole session; only their channel
//! gains change. A cursor walks the 64 cells and carries whichever moving
//! sources are on across the four speakers.
//!
//! | control | action |
//! |---|---|
//! | top 0..=3 (held) | solo a channel with the sine, pauses the scan |
//! | top 5 | exit |
//! | top 6 / 7 | volume down / up |
//! | side 0 | auto scan (noise) |
//! | side 1 | manual cells (sine) |
//! | side 2 / 3 | Shepard ascending / descending |
//! | side 4 / 5 | Risset accelerating / decelerating |
//! | side 6 | Doppler depth cycle |
//! | side 7 | binaural carrier cycle |

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use quadgrid_audio::{SynthEngine, SynthResult, VoiceRef, CHANNELS};
use quadgrid_types::{
    ControllerState, GridPosition, LedColor, LogicalEvent, ModeId, Region, ToggleId, GRID_CELLS,
};

use crate::led::LedFrame;
use crate::quantize::{gains_f32, grid_gains};
use crate::scheduler::{Outbox, ScheduledTask, Scheduler, TaskResult, IDLE_POLL};

use super::{Instrument, InstrumentSettings, FX_MASTER_GAIN};

/// Cursor rate, one cell per Schumann period.
pub const SCAN_STEP: Duration = Duration::from_nanos(127_713_921);

pub const NOISE: VoiceRef = VoiceRef(0);
pub const SINE: VoiceRef = VoiceRef(1);
pub const SHEPARD: VoiceRef = VoiceRef(2);
pub const RISSET: VoiceRef = VoiceRef(3);
pub const DOPPLER: VoiceRef = VoiceRef(4);
pub const BINAURAL: VoiceRef = VoiceRef(5);
const SOURCES: [VoiceRef; 6] = [NOISE, SINE, SHEPARD, RISSET, DOPPLER, BINAURAL];

const SHEPARD_RATE: f32 = 0.05;
const RISSET_RATE: f32 = 0.04;
const DOPPLER_DEPTH: [f32; 4] = [0.0, 20.0, 60.0, 120.0];
const BINAURAL_CARRIER: [f32; 4] = [0.0, 36.0, 72.0, 108.0];

const SOLO_COUNT: usize = 4;
const TOP_EXIT: u8 = 5;

/// Frequency and channel gains last sent to one source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceState {
    pub frequency: f32,
    pub gains: [f32; CHANNELS],
}

const SILENT: [f32; CHANNELS] = [0.0; CHANNELS];

pub struct ScanInstrument {
    synth: Box<dyn SynthEngine>,
    controller: ControllerState,
    scan: ToggleId,
    manual: ToggleId,
    shepard_up: ToggleId,
    shepard_down: ToggleId,
    risset_up: ToggleId,
    risset_down: ToggleId,
    solos: [ToggleId; SOLO_COUNT],
    doppler: ModeId,
    binaural: ModeId,
    pressed: BTreeSet<GridPosition>,
    cursor: Option<usize>,
    sent: [Option<SourceState>; SOURCES.len()],
}

impl ScanInstrument {
    pub fn new(synth: Box<dyn SynthEngine>, settings: &InstrumentSettings) -> Self {
        let mut controller = ControllerState::new(1).with_gain(settings.gain);
        let scan = controller.add_toggle("scan", Region::Side);
        let manual = controller.add_toggle("manual", Region::Side);
        let shepard_up = controller.add_toggle("shepard_ascending", Region::Side);
        let shepard_down = controller.add_toggle("shepard_descending", Region::Side);
        let risset_up = controller.add_toggle("risset_accelerating", Region::Side);
        let risset_down = controller.add_toggle("risset_decelerating", Region::Side);
        controller.add_exclusion_group(&[shepard_up, shepard_down]);
        controller.add_exclusion_group(&[risset_up, risset_down]);
        let solos = ["solo_tl", "solo_tr", "solo_bl", "solo_br"].map(|name| controller.add_toggle(name, Region::Top));
        let doppler = controller.add_mode("doppler", DOPPLER_DEPTH.len(), Region::Side);
        let binaural = controller.add_mode("binaural", BINAURAL_CARRIER.len(), Region::Side);

        Self {
            synth,
            controller,
            scan,
            manual,
            shepard_up,
            shepard_down,
            risset_up,
            risset_down,
            solos,
            doppler,
            binaural,
            pressed: BTreeSet::new(),
            cursor: None,
            sent: [None; SOURCES.len()],
        }
    }

    fn on(&self, id: ToggleId) -> bool {
        self.controller.is_active(id)
    }

    fn shepard_on(&self) -> bool {
        self.on(self.shepard_up) || self.on(self.shepard_down)
    }

    fn risset_on(&self) -> bool {
        self.on(self.risset_up) || self.on(self.risset_down)
    }

    fn doppler_on(&self) -> bool {
        self.controller.mode(self.doppler) > 0
    }

    /// Whether any source that rides the cursor is on.
    pub fn scanning(&self) -> bool {
        self.on(self.scan) || self.shepard_on() || self.risset_on() || self.doppler_on()
    }

    /// A held solo freezes the cursor.
    pub fn is_paused(&self) -> bool {
        self.solos.iter().any(|&s| self.on(s))
    }

    /// Cursor walks backwards while an ascending or accelerating illusion runs.
    pub fn reversed(&self) -> bool {
        self.on(self.shepard_up) || self.on(self.risset_up)
    }

    pub fn cursor(&self) -> Option<GridPosition> {
        self.cursor.and_then(GridPosition::from_index)
    }

    pub fn pressed(&self) -> &BTreeSet<GridPosition> {
        &self.pressed
    }

    /// Move the cursor one cell. Returns the new position.
    pub fn step_cursor(&mut self) -> Option<GridPosition> {
        let next = match (self.cursor, self.reversed()) {
            (None, false) => 0,
            (None, true) => GRID_CELLS - 1,
            (Some(i), false) => (i + 1) % GRID_CELLS,
            (Some(i), true) => (i + GRID_CELLS - 1) % GRID_CELLS,
        };
        self.cursor = Some(next);
        self.controller.mark_dirty(Region::Grid);
        self.cursor()
    }

    fn clear_cursor(&mut self) {
        if self.cursor.take().is_some() {
            self.controller.mark_dirty(Region::Grid);
        }
    }

    fn cursor_gains(&self, enabled: bool) -> [f32; CHANNELS] {
        match self.cursor() {
            Some(pos) if enabled => gains_f32(grid_gains(pos)),
            _ => SILENT,
        }
    }

    /// Per-channel maximum over the manually held cells, overridden by solos.
    fn sine_gains(&self) -> [f32; CHANNELS] {
        let mut gains = SILENT;
        if self.on(self.manual) {
            for &pos in &self.pressed {
                for (g, cell) in gains.iter_mut().zip(gains_f32(grid_gains(pos))) {
                    *g = g.max(cell);
                }
            }
        }
        for (i, &solo) in self.solos.iter().enumerate() {
            if self.on(solo) {
                gains[i] = 1.0;
            }
        }
        gains
    }

    /// What a source should currently be sending.
    pub fn source_state(&self, source: VoiceRef) -> SourceState {
        match source {
            NOISE => SourceState {
                frequency: 0.0,
                gains: self.cursor_gains(self.on(self.scan) && !self.is_paused()),
            },
            SINE => SourceState {
                frequency: 440.0,
                gains: self.sine_gains(),
            },
            SHEPARD => SourceState {
                frequency: 110.0,
                gains: self.cursor_gains(self.shepard_on()),
            },
            RISSET => SourceState {
                frequency: 600.0,
                gains: self.cursor_gains(self.risset_on()),
            },
            DOPPLER => SourceState {
                frequency: 440.0,
                gains: self.cursor_gains(self.doppler_on()),
            },
            BINAURAL => {
                let mode = self.controller.mode(self.binaural);
                SourceState {
                    frequency: BINAURAL_CARRIER[mode],
                    gains: if mode > 0 { [1.0; CHANNELS] } else { SILENT },
                }
            }
            _ => SourceState {
                frequency: 0.0,
                gains: SILENT,
            },
        }
    }

    /// Send every source whose state changed since the last push.
    fn push_sources(&mut self) -> SynthResult {
        for (slot, &source) in SOURCES.iter().enumerate() {
            let state = self.source_state(source);
            if self.sent[slot] == Some(state) {
                continue;
            }
            self.synth
                .set_voice_parameters(source, state.frequency, state.gains)?;
            self.sent[slot] = Some(state);
        }
        Ok(())
    }

    fn push_gates(&self) -> SynthResult {
        let gate = |on: bool| if on { 1.0 } else { 0.0 };
        self.synth.set_effect_parameter("shepard_gate", gate(self.shepard_on()))?;
        self.synth.set_effect_parameter("risset_gate", gate(self.risset_on()))?;
        self.synth.set_effect_parameter("doppler_gate", gate(self.doppler_on()))?;
        self.synth
            .set_effect_parameter("binaural_gate", gate(self.controller.mode(self.binaural) > 0))
    }

    fn handle_side(&mut self, index: u8) -> SynthResult {
        match index {
            0 => {
                let on = self.controller.toggle(self.scan);
                log::info!(target: "scan", "Scan: {}", if on { "ON" } else { "OFF" });
                if !on && !self.scanning() {
                    self.clear_cursor();
                }
            }
            1 => {
                let on = self.controller.toggle(self.manual);
                if !on && !self.pressed.is_empty() {
                    self.pressed.clear();
                    self.controller.mark_dirty(Region::Grid);
                }
                log::info!(target: "scan", "Manual: {}", if on { "ON" } else { "OFF" });
            }
            2 | 3 => {
                let (id, rate) = if index == 2 {
                    (self.shepard_up, SHEPARD_RATE)
                } else {
                    (self.shepard_down, -SHEPARD_RATE)
                };
                if self.controller.toggle(id) {
                    self.synth.set_effect_parameter("shepard_rate", rate)?;
                }
                log::info!(target: "scan", "Shepard: {}", self.controller.toggle_name(id));
            }
            4 | 5 => {
                let (id, rate) = if index == 4 {
                    (self.risset_up, RISSET_RATE)
                } else {
                    (self.risset_down, -RISSET_RATE)
                };
                if self.controller.toggle(id) {
                    self.synth.set_effect_parameter("risset_rate", rate)?;
                }
                log::info!(target: "scan", "Risset: {}", self.controller.toggle_name(id));
            }
            6 => {
                let mode = self.controller.cycle_mode(self.doppler, 1);
                self.synth
                    .set_effect_parameter("doppler_depth", DOPPLER_DEPTH[mode])?;
                log::info!(target: "scan", "Doppler: mode {}", mode);
            }
            7 => {
                let mode = self.controller.cycle_mode(self.binaural, 1);
                self.synth
                    .set_effect_parameter("binaural_carrier", BINAURAL_CARRIER[mode])?;
                log::info!(target: "scan", "Binaural: {} Hz", BINAURAL_CARRIER[mode]);
            }
            _ => return Ok(()),
        }
        self.push_gates()
    }

    fn handle_top(&mut self, index: u8, pressed: bool, out: &mut Outbox<Self>) -> SynthResult {
        match index as usize {
            i if i < SOLO_COUNT => self.controller.set_toggle(self.solos[i], pressed),
            _ if !pressed => {}
            i if i == TOP_EXIT as usize => {
                log::info!(target: "scan", "exit pressed");
                out.request_shutdown();
            }
            6 | 7 => {
                self.controller.adjust_gain(if index == 7 { 1 } else { -1 });
                log::info!(target: "scan", "Volume: {:.2}", self.controller.gain());
                self.synth
                    .set_effect_parameter(FX_MASTER_GAIN, self.controller.gain() as f32)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_grid(&mut self, pos: GridPosition, pressed: bool) {
        if !self.on(self.manual) {
            return;
        }
        let changed = if pressed {
            self.pressed.insert(pos)
        } else {
            self.pressed.remove(&pos)
        };
        if changed {
            self.controller.mark_dirty(Region::Grid);
        }
    }

    fn volume_color(&self) -> LedColor {
        let gain = self.controller.gain();
        if gain < 0.4 {
            LedColor::GREEN
        } else if gain < 0.7 {
            LedColor::AMBER
        } else if gain < 0.9 {
            LedColor::red_green(2, 0)
        } else {
            LedColor::RED
        }
    }
}

/// Steps the cursor while any scanning source is on.
pub struct ScanTask;

impl ScheduledTask<ScanInstrument> for ScanTask {
    fn name(&self) -> &str {
        "scan"
    }

    fn tick(&mut self, inst: &mut ScanInstrument, _now: Instant, _out: &mut Outbox<ScanInstrument>) -> TaskResult {
        if !inst.scanning() {
            inst.clear_cursor();
            inst.push_sources()?;
            return Ok(IDLE_POLL);
        }
        if !inst.is_paused() {
            inst.step_cursor();
        }
        inst.push_sources()?;
        Ok(SCAN_STEP)
    }
}

impl Instrument for ScanInstrument {
    fn name(&self) -> &'static str {
        "scan"
    }

    fn controller(&self) -> &ControllerState {
        &self.controller
    }

    fn controller_mut(&mut self) -> &mut ControllerState {
        &mut self.controller
    }

    fn start(&mut self, scheduler: &mut Scheduler<Self>, now: Instant) -> SynthResult {
        self.synth
            .set_effect_parameter(FX_MASTER_GAIN, self.controller.gain() as f32)?;
        self.push_gates()?;
        self.push_sources()?;
        for source in SOURCES {
            self.synth.trigger(source)?;
        }
        scheduler.register(Box::new(ScanTask), now);
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
            LogicalEvent::Grid(pos) => self.handle_grid(pos, pressed),
            LogicalEvent::TopControl(i) => self.handle_top(i, pressed, out)?,
            LogicalEvent::SideControl(i) if pressed => self.handle_side(i)?,
            _ => return Ok(()),
        }
        self.push_sources()
    }

    fn frame(&self, _now: Instant) -> LedFrame {
        let mut frame = LedFrame::new();
        for &pos in &self.pressed {
            frame.set_grid(pos, LedColor::GREEN);
        }
        if let Some(pos) = self.cursor() {
            let level = |on: bool| if on { 1.0 } else { 0.0 };
            let color = LedColor::new(
                level(self.shepard_on() || self.doppler_on()),
                level(self.on(self.scan)),
                level(self.risset_on()),
            );
            frame.set_grid(pos, color);
        }

        for (i, &solo) in self.solos.iter().enumerate() {
            let color = if self.on(solo) { LedColor::RED } else { LedColor::GREEN };
            frame.set_top(i as u8, color);
        }
        frame.set_top(TOP_EXIT, LedColor::rgb63(10, 63, 10));
        let volume = self.volume_color();
        frame.set_top(6, volume);
        frame.set_top(7, volume);

        let toggles = [self.scan, self.manual, self.shepard_up, self.shepard_down];
        for (i, &id) in toggles.iter().enumerate() {
            let color = if self.on(id) { LedColor::RED } else { LedColor::GREEN };
            frame.set_side(i as u8, color);
        }
        let lit = |on: bool, r: f32, g: f32, b: f32| {
            let level = if on { 1.0 } else { 1.0 / 3.0 };
            LedColor::new(r * level, g * level, b * level)
        };
        frame.set_side(4, lit(self.on(self.risset_up), 0.0, 0.0, 1.0));
        frame.set_side(5, lit(self.on(self.risset_down), 0.0, 1.0, 1.0));
        frame.set_side(6, lit(self.doppler_on(), 1.0, 0.0, 0.0));
        frame.set_side(7, lit(self.controller.mode(self.binaural) > 0, 1.0, 0.0, 1.0));
        frame
    }

    fn shutdown(&mut self) -> SynthResult {
        for source in SOURCES {
            self.synth.set_voice_parameters(source, 0.0, SILENT)?;
            self.synth.release(source)?;
        }
        self.sent = [None; SOURCES.len()];
        self.synth.set_effect_parameter(FX_MASTER_GAIN, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadgrid_audio::{SharedTestSynth, TestSynth};
    use quadgrid_types::LedTarget;
    use std::sync::Arc;

    fn scanner() -> (Arc<TestSynth>, ScanInstrument) {
        let synth = Arc::new(TestSynth::new());
        let inst = ScanInstrument::new(
            Box::new(SharedTestSynth(Arc::clone(&synth))),
            &InstrumentSettings::default(),
        );
        (synth, inst)
    }

    fn send(inst: &mut ScanInstrument, event: LogicalEvent, pressed: bool) -> Outbox<ScanInstrument> {
        let mut out = Outbox::new();
        inst.handle_event(event, pressed, Instant::now(), &mut out).unwrap();
        out
    }

    fn tick(inst: &mut ScanInstrument) -> Duration {
        ScanTask
            .tick(inst, Instant::now(), &mut Outbox::new())
            .unwrap()
    }

    fn pos(x: u8, y: u8) -> GridPosition {
        GridPosition::new(x, y).unwrap()
    }

    #[test]
    fn scan_walks_forward_from_the_first_cell() {
        let (synth, mut inst) = scanner();
        assert_eq!(tick(&mut inst), IDLE_POLL);
        send(&mut inst, LogicalEvent::SideControl(0), true);
        assert_eq!(tick(&mut inst), SCAN_STEP);
        assert_eq!(inst.cursor(), Some(pos(0, 0)));
        assert_eq!(synth.last_voice(NOISE).unwrap().1, [1.0, 0.0, 0.0, 0.0]);
        tick(&mut inst);
        assert_eq!(inst.cursor(), Some(pos(1, 0)));
    }

    #[test]
    fn ascending_shepard_reverses_the_cursor() {
        let (_, mut inst) = scanner();
        send(&mut inst, LogicalEvent::SideControl(2), true);
        tick(&mut inst);
        assert_eq!(inst.cursor(), Some(pos(7, 7)));
        tick(&mut inst);
        assert_eq!(inst.cursor(), Some(pos(6, 7)));
    }

    #[test]
    fn shepard_directions_exclude_each_other() {
        let (synth, mut inst) = scanner();
        send(&mut inst, LogicalEvent::SideControl(2), true);
        assert_eq!(synth.last_effect("shepard_rate"), Some(0.05));
        send(&mut inst, LogicalEvent::SideControl(3), true);
        assert!(!inst.on(inst.shepard_up));
        assert!(inst.on(inst.shepard_down));
        assert_eq!(synth.last_effect("shepard_rate"), Some(-0.05));
        assert_eq!(synth.last_effect("shepard_gate"), Some(1.0));

        send(&mut inst, LogicalEvent::SideControl(3), true);
        assert_eq!(synth.last_effect("shepard_gate"), Some(0.0));
    }

    #[test]
    fn held_solo_pauses_and_silences_noise() {
        let (synth, mut inst) = scanner();
        send(&mut inst, LogicalEvent::SideControl(0), true);
        tick(&mut inst);
        send(&mut inst, LogicalEvent::TopControl(2), true);
        assert!(inst.is_paused());
        assert_eq!(synth.last_voice(NOISE).unwrap().1, [0.0; 4]);
        assert_eq!(synth.last_voice(SINE).unwrap().1, [0.0, 0.0, 1.0, 0.0]);

        tick(&mut inst);
        tick(&mut inst);
        assert_eq!(inst.cursor(), Some(pos(0, 0)));

        send(&mut inst, LogicalEvent::TopControl(2), false);
        tick(&mut inst);
        assert_eq!(inst.cursor(), Some(pos(1, 0)));
        assert_eq!(synth.last_voice(SINE).unwrap().1, [0.0; 4]);
    }

    #[test]
    fn manual_cells_take_channel_maximum() {
        let (synth, mut inst) = scanner();
        // Ignored until manual mode is on.
        send(&mut inst, LogicalEvent::Grid(pos(0, 0)), true);
        assert!(inst.pressed().is_empty());

        send(&mut inst, LogicalEvent::SideControl(1), true);
        send(&mut inst, LogicalEvent::Grid(pos(0, 0)), true);
        send(&mut inst, LogicalEvent::Grid(pos(7, 7)), true);
        assert_eq!(synth.last_voice(SINE).unwrap().1, [1.0, 0.0, 0.0, 1.0]);

        send(&mut inst, LogicalEvent::Grid(pos(0, 0)), false);
        assert_eq!(synth.last_voice(SINE).unwrap().1, [0.0, 0.0, 0.0, 1.0]);

        // Leaving manual mode drops the held cells.
        send(&mut inst, LogicalEvent::SideControl(1), true);
        assert!(inst.pressed().is_empty());
        assert_eq!(synth.last_voice(SINE).unwrap().1, [0.0; 4]);
    }

    #[test]
    fn unchanged_sources_are_not_resent() {
        let (synth, mut inst) = scanner();
        let mut sched = Scheduler::new();
        inst.start(&mut sched, Instant::now()).unwrap();
        synth.clear();
        send(&mut inst, LogicalEvent::TopControl(6), true);
        assert_eq!(
            synth.count(|op| matches!(op, quadgrid_audio::SynthOp::SetVoice { .. })),
            0
        );
    }

    #[test]
    fn cursor_color_mixes_active_sources() {
        let (_, mut inst) = scanner();
        send(&mut inst, LogicalEvent::SideControl(0), true);
        send(&mut inst, LogicalEvent::SideControl(5), true);
        tick(&mut inst);
        let frame = inst.frame(Instant::now());
        let cursor = inst.cursor().unwrap();
        assert_eq!(frame.get(LedTarget::Grid(cursor)), LedColor::new(0.0, 1.0, 1.0));
        assert_eq!(frame.get(LedTarget::Side(5)), LedColor::new(0.0, 1.0, 1.0));
        assert_eq!(frame.get(LedTarget::Side(0)), LedColor::RED);
    }

    #[test]
    fn stopping_every_source_clears_the_cursor() {
        let (_, mut inst) = scanner();
        send(&mut inst, LogicalEvent::SideControl(6), true);
        tick(&mut inst);
        assert!(inst.cursor().is_some());
        for _ in 0..3 {
            send(&mut inst, LogicalEvent::SideControl(6), true);
        }
        assert_eq!(tick(&mut inst), IDLE_POLL);
        assert_eq!(inst.cursor(), None);
    }

    #[test]
    fn exit_button_requests_shutdown() {
        let (_, mut inst) = scanner();
        let out = send(&mut inst, LogicalEvent::TopControl(TOP_EXIT), true);
        assert!(out.shutdown_requested());
    }

    #[test]
    fn volume_meter_has_four_steps() {
        let (_, mut inst) = scanner();
        inst.controller.set_gain(0.8);
        assert_eq!(inst.volume_color(), LedColor::red_green(2, 0));
        inst.controller.set_gain(0.95);
        assert_eq!(inst.volume_color(), LedColor::RED);
    }
}
