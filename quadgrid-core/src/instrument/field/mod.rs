//! Stochastic field: 64 cell agents that trigger themselves.
//!
//! Pressing a pad toggles its agent. An active agent fires on its own timer
//! with a pitch, speed and FM band derived from where it sits. Root, scale
//! and profile changes reach the agents one at a time through the retune task.

pub mod agent;
pub mod tasks;

use std::time::{Duration, Instant};

use quadgrid_audio::{SynthEngine, SynthResult};
use quadgrid_types::scale::field_scales;
use quadgrid_types::{
    note_name, rng, ControllerState, GridPosition, LedColor, LogicalEvent, ModeId, Region,
    ScaleDegreeSet, ToggleId,
};

use crate::led::LedFrame;
use crate::quantize::{gains_f32, grid_gains};
use crate::scheduler::{Outbox, Scheduler};

use super::{gain_meter, mode_color, scale_index_by_name, Instrument, InstrumentSettings, FX_MASTER_GAIN};

pub use agent::{Agent, Assignment, FmBand, SoundProfile, SOUND_PROFILES};
pub use tasks::{AgentClockTask, MigrationTask, RetuneTask};

/// Fader in front of the master gain, used by panic reset and power off.
pub const FX_MASTER_FADE: &str = "master_fade";
pub const PANIC_RESET_DELAY: Duration = Duration::from_secs(4);
pub const SHUTDOWN_FADE: Duration = Duration::from_millis(4100);

const REVERB_SETTINGS: [(f32, f32); 3] = [(0.2, 0.1), (0.6, 0.4), (0.95, 0.8)];
const REVERB_NAMES: [&str; 3] = ["Small room", "Medium hall", "Large hall"];
const CHORUS_SETTINGS: [(f32, f32); 4] = [(0.0, 0.0), (1.0, 0.1), (3.0, 0.3), (5.0, 0.5)];
const CHORUS_NAMES: [&str; 4] = ["OFF", "SUBTLE", "MOD", "DEEP"];
const DELAY_NAMES: [&str; 4] = ["OFF", "1/4", "1/8", "1/16"];
/// Delay time sent while the delay is off.
const DELAY_IDLE_TIME: f32 = 0.001;

const SIDE_PANIC: u8 = 0;
const SIDE_DELAY: u8 = 1;
const SIDE_CHORUS: u8 = 2;
const SIDE_NEXT_PROFILE: u8 = 4;
const SIDE_PREV_PROFILE: u8 = 5;
const SIDE_POWER: u8 = 6;

/// Bright `(red, green)` per scale on the RGB scale of 0..=63.
const SCALE_COLORS: [(u8, u8); 6] = [(63, 63), (63, 15), (0, 63), (40, 63), (63, 40), (20, 20)];
const ROOT_BRIGHT: (u8, u8) = (63, 0);
const ROOT_DIM: (u8, u8) = (12, 0);

fn dim(color: (u8, u8)) -> (u8, u8) {
    ((color.0 / 6).max(1), (color.1 / 6).max(1))
}

pub struct FieldInstrument {
    synth: Box<dyn SynthEngine>,
    controller: ControllerState,
    scales: Vec<ScaleDegreeSet>,
    agents: Vec<Agent>,
    profile: ModeId,
    reverb: ModeId,
    delay: ModeId,
    chorus: ModeId,
    migration: ToggleId,
    bpm: f64,
    beat_divisions: f64,
    fading: bool,
    rng_state: u64,
}

impl FieldInstrument {
    pub fn new(synth: Box<dyn SynthEngine>, settings: &InstrumentSettings) -> Self {
        let scales = field_scales();
        let scale = scale_index_by_name(&scales, settings.scale.as_deref());
        let mut controller = ControllerState::new(scales.len())
            .with_root(settings.root)
            .with_scale(scale)
            .with_gain(settings.gain);
        let profile = controller.add_mode("profile", SOUND_PROFILES.len(), Region::Side);
        let reverb = controller.add_mode("reverb", REVERB_SETTINGS.len(), Region::Top);
        let delay = controller.add_mode("delay", 4, Region::Side);
        let chorus = controller.add_mode("chorus", CHORUS_SETTINGS.len(), Region::Side);
        let migration = controller.add_toggle("migration", Region::Top);

        Self {
            synth,
            controller,
            scales,
            agents: GridPosition::all().map(Agent::new).collect(),
            profile,
            reverb,
            delay,
            chorus,
            migration,
            bpm: settings.bpm.max(1.0),
            beat_divisions: settings.beat_divisions.max(1.0),
            fading: false,
            rng_state: settings.seed | 1,
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, pos: GridPosition) -> &Agent {
        &self.agents[pos.index()]
    }

    pub fn active_count(&self) -> usize {
        self.agents.iter().filter(|a| a.active).count()
    }

    pub fn scales(&self) -> &[ScaleDegreeSet] {
        &self.scales
    }

    pub fn migration_active(&self) -> bool {
        self.controller.is_active(self.migration)
    }

    pub fn is_fading(&self) -> bool {
        self.fading
    }

    pub fn profile_index(&self) -> usize {
        self.controller.mode(self.profile)
    }

    /// One full agent cycle: `beat_divisions` beats at the current tempo.
    pub fn beat_time(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm * self.beat_divisions)
    }

    /// Profile, scale and root newly activated agents take on.
    pub fn target(&self) -> Assignment {
        Assignment {
            profile: self.profile_index(),
            scale: self.controller.scale_index(),
            root: self.controller.root(),
        }
    }

    /// Activate the agent at `pos`, drawing a division unless one is forced.
    pub fn activate(&mut self, pos: GridPosition, division: Option<u32>) -> SynthResult {
        let idx = pos.index();
        let division = match division {
            Some(d) => d,
            None => self.agents[idx].pick_division(&mut self.rng_state),
        };
        let (beat_time, target) = (self.beat_time(), self.target());
        self.agents[idx].activate(division, beat_time, target);
        self.controller.mark_dirty(Region::Grid);
        self.apply_tuning(idx)
    }

    pub fn deactivate(&mut self, pos: GridPosition) -> SynthResult {
        let agent = &mut self.agents[pos.index()];
        if !agent.active {
            return Ok(());
        }
        agent.deactivate();
        let voice = agent.voice;
        self.controller.mark_dirty(Region::Grid);
        self.synth.release(voice)
    }

    /// Deactivate every agent, releasing all voices even when some releases
    /// fail. Returns the number released or the first error.
    pub fn release_all(&mut self) -> SynthResult<usize> {
        let mut first_err = None;
        let mut released = 0;
        for pos in GridPosition::all() {
            if !self.agent(pos).active {
                continue;
            }
            match self.deactivate(pos) {
                Ok(()) => released += 1,
                Err(e) => {
                    log::warn!(target: "field", "release of {:?} failed: {}", pos, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }

    /// Push the agent's frequency, FM pair and pan to its voice.
    fn apply_tuning(&self, idx: usize) -> SynthResult {
        let agent = &self.agents[idx];
        let (ratio, index) = agent.fm_pair();
        self.synth.set_voice_param(agent.voice, "fm_ratio", ratio as f32)?;
        self.synth.set_voice_param(agent.voice, "fm_index", index as f32)?;
        self.synth.set_voice_parameters(
            agent.voice,
            agent.frequency(&self.scales) as f32,
            gains_f32(grid_gains(agent.pos)),
        )
    }

    /// Trigger every agent whose timer elapsed. Returns how many fired.
    pub fn trigger_due(&mut self, now: Instant) -> SynthResult<usize> {
        let mut fired = 0;
        for agent in self.agents.iter_mut().filter(|a| a.is_due(now)) {
            agent.last_trigger = Some(now);
            agent.flash_until = Some(now + tasks::FLASH);
            self.synth.trigger(agent.voice)?;
            fired += 1;
        }
        if fired > 0 {
            self.controller.mark_dirty(Region::Grid);
        }
        Ok(fired)
    }

    /// Move one random outdated agent onto the target assignment.
    pub fn retune_one(&mut self) -> SynthResult<Option<GridPosition>> {
        let target = self.target();
        let outdated: Vec<usize> = self
            .agents
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_outdated(target))
            .map(|(i, _)| i)
            .collect();
        if outdated.is_empty() {
            return Ok(None);
        }
        let idx = outdated[rng::next_index(&mut self.rng_state, outdated.len())];
        self.agents[idx].assigned = target;
        self.controller.mark_dirty(Region::Grid);
        self.apply_tuning(idx)?;
        Ok(Some(self.agents[idx].pos))
    }

    /// Displace a random active agent to a random empty cell, keeping its
    /// division. The number of active agents is unchanged.
    pub fn migrate(&mut self) -> SynthResult<Option<(GridPosition, GridPosition)>> {
        let active: Vec<usize> = (0..self.agents.len()).filter(|&i| self.agents[i].active).collect();
        let empty: Vec<usize> = (0..self.agents.len()).filter(|&i| !self.agents[i].active).collect();
        if active.is_empty() || empty.is_empty() {
            return Ok(None);
        }
        let src = active[rng::next_index(&mut self.rng_state, active.len())];
        let dst = empty[rng::next_index(&mut self.rng_state, empty.len())];
        let (from, to) = (self.agents[src].pos, self.agents[dst].pos);
        let division = self.agents[src].division;
        let (beat_time, target) = (self.beat_time(), self.target());

        self.agents[src].deactivate();
        self.agents[dst].activate(division, beat_time, target);
        self.controller.mark_dirty(Region::Grid);

        let released = self.synth.release(self.agents[src].voice);
        let tuned = self.apply_tuning(dst);
        released.and(tuned)?;
        Ok(Some((from, to)))
    }

    fn push_reverb(&self) -> SynthResult {
        let (size, damp) = REVERB_SETTINGS[self.controller.mode(self.reverb)];
        self.synth.set_effect_parameter("reverb_size", size)?;
        self.synth.set_effect_parameter("reverb_damp", damp)
    }

    fn delay_time(&self) -> f32 {
        match self.controller.mode(self.delay) {
            0 => 0.0,
            mode => (60.0 / self.bpm / (1 << (mode - 1)) as f64) as f32,
        }
    }

    fn push_delay(&self) -> SynthResult {
        let time = self.delay_time();
        if time > 0.0 {
            self.synth.set_effect_parameter("delay_time", time)?;
            self.synth.set_effect_parameter("delay_mix", 0.5)
        } else {
            self.synth.set_effect_parameter("delay_time", DELAY_IDLE_TIME)?;
            self.synth.set_effect_parameter("delay_mix", 0.0)
        }
    }

    fn push_chorus(&self) -> SynthResult {
        let (depth, feedback) = CHORUS_SETTINGS[self.controller.mode(self.chorus)];
        self.synth.set_effect_parameter("chorus_depth", depth)?;
        self.synth.set_effect_parameter("chorus_feedback", feedback)
    }

    fn push_gain(&self) -> SynthResult {
        self.synth
            .set_effect_parameter(FX_MASTER_GAIN, self.controller.gain() as f32)
    }

    fn handle_top(&mut self, index: u8) -> SynthResult {
        match index {
            0 | 1 => {
                self.controller.shift_root(if index == 1 { 1 } else { -1 });
                log::info!(target: "field", "ROOT: {}", note_name(self.controller.root()));
            }
            2 | 3 => {
                let idx = self.controller.cycle_scale(if index == 3 { 1 } else { -1 });
                log::info!(target: "field", "SCALE: {}", self.scales[idx].name());
            }
            4 => {
                let mode = self.controller.cycle_mode(self.reverb, 1);
                log::info!(target: "field", "REVERB: {}", REVERB_NAMES[mode]);
                self.push_reverb()?;
            }
            5 => {
                let on = self.controller.toggle(self.migration);
                log::info!(target: "field", "MIGRATION: {}", if on { "ON" } else { "OFF" });
            }
            6 | 7 => {
                self.controller.adjust_gain(if index == 7 { 1 } else { -1 });
                log::info!(target: "field", "VOLUME: {}%", (self.controller.gain() * 100.0).round() as i32);
                self.push_gain()?;
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_side(&mut self, index: u8, out: &mut Outbox<Self>) -> SynthResult {
        match index {
            SIDE_PANIC => {
                log::info!(target: "field", "PANIC RESET...");
                self.synth.set_effect_parameter(FX_MASTER_FADE, 0.0)?;
                out.defer(
                    "panic-reset",
                    PANIC_RESET_DELAY,
                    |field: &mut FieldInstrument, _: Instant, _: &mut Outbox<FieldInstrument>| {
                        let released = field.release_all().map(|_| ());
                        let restored = field.synth.set_effect_parameter(FX_MASTER_FADE, 1.0);
                        released.and(restored).map_err(Into::into)
                    },
                );
            }
            SIDE_DELAY => {
                let mode = self.controller.cycle_mode(self.delay, 1);
                log::info!(target: "field", "DELAY: {}", DELAY_NAMES[mode]);
                self.push_delay()?;
            }
            SIDE_CHORUS => {
                let mode = self.controller.cycle_mode(self.chorus, 1);
                log::info!(target: "field", "CHORUS: {}", CHORUS_NAMES[mode]);
                self.push_chorus()?;
            }
            SIDE_NEXT_PROFILE | SIDE_PREV_PROFILE => {
                let delta = if index == SIDE_NEXT_PROFILE { 1 } else { -1 };
                let idx = self.controller.cycle_mode(self.profile, delta);
                log::info!(target: "field", "TARGET SOUND: {}", SOUND_PROFILES[idx].name);
            }
            SIDE_POWER if !self.fading => {
                log::info!(target: "field", "FADING OUT...");
                self.fading = true;
                self.synth.set_effect_parameter(FX_MASTER_FADE, 0.0)?;
                out.defer(
                    "shutdown",
                    SHUTDOWN_FADE,
                    |_: &mut FieldInstrument, _: Instant, out: &mut Outbox<FieldInstrument>| {
                        out.request_shutdown();
                        Ok(())
                    },
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn pad_color(&self, agent: &Agent, now: Instant) -> LedColor {
        if !agent.active {
            return LedColor::OFF;
        }
        let bright = if agent.is_root_note(&self.scales) {
            ROOT_BRIGHT
        } else {
            SCALE_COLORS[agent.assigned.scale % SCALE_COLORS.len()]
        };
        let (r, g) = if agent.is_flashing(now) {
            bright
        } else if agent.is_root_note(&self.scales) {
            ROOT_DIM
        } else {
            dim(bright)
        };
        LedColor::rgb63(r, g, 0)
    }
}

impl Instrument for FieldInstrument {
    fn name(&self) -> &'static str {
        "field"
    }

    fn controller(&self) -> &ControllerState {
        &self.controller
    }

    fn controller_mut(&mut self) -> &mut ControllerState {
        &mut self.controller
    }

    fn start(&mut self, scheduler: &mut Scheduler<Self>, now: Instant) -> SynthResult {
        self.push_gain()?;
        self.synth.set_effect_parameter(FX_MASTER_FADE, 1.0)?;
        self.push_reverb()?;
        self.push_delay()?;
        self.push_chorus()?;

        scheduler.register(Box::new(AgentClockTask), now);
        scheduler.register(Box::new(RetuneTask), now);
        scheduler.register(Box::new(MigrationTask), now);
        log::info!(
            target: "field",
            "field ready: {} bpm, cycle {:.1}s",
            self.bpm,
            self.beat_time().as_secs_f64()
        );
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: LogicalEvent,
        pressed: bool,
        _now: Instant,
        out: &mut Outbox<Self>,
    ) -> SynthResult {
        if !pressed {
            return Ok(());
        }
        match event {
            LogicalEvent::Grid(pos) => {
                if self.agent(pos).active {
                    self.deactivate(pos)
                } else {
                    self.activate(pos, None)
                }
            }
            LogicalEvent::TopControl(i) => self.handle_top(i),
            LogicalEvent::SideControl(i) => self.handle_side(i, out),
            LogicalEvent::Unrecognized(_) => Ok(()),
        }
    }

    fn frame(&self, now: Instant) -> LedFrame {
        let mut frame = LedFrame::new();
        for agent in &self.agents {
            frame.set_grid(agent.pos, self.pad_color(agent, now));
        }

        for i in 0..4u8 {
            let color = if i % 2 == 0 { LedColor::rgb63(0, 20, 0) } else { LedColor::GREEN };
            frame.set_top(i, color);
        }
        let reverb = match self.controller.mode(self.reverb) {
            0 => LedColor::GREEN,
            1 => LedColor::AMBER,
            _ => LedColor::RED,
        };
        frame.set_top(4, reverb);
        frame.set_top(
            5,
            if self.migration_active() { LedColor::AMBER } else { LedColor::OFF },
        );
        let volume = gain_meter(self.controller.gain(), LedColor::rgb63(30, 0, 0));
        frame.set_top(6, volume);
        frame.set_top(7, volume);

        frame.set_side(SIDE_PANIC, LedColor::GREEN);
        frame.set_side(SIDE_DELAY, mode_color(self.controller.mode(self.delay)));
        frame.set_side(SIDE_CHORUS, mode_color(self.controller.mode(self.chorus)));
        frame.set_side(SIDE_NEXT_PROFILE, LedColor::GREEN);
        frame.set_side(SIDE_PREV_PROFILE, LedColor::GREEN);
        frame.set_side(SIDE_POWER, LedColor::GREEN);
        frame
    }

    fn shutdown(&mut self) -> SynthResult {
        let released = self.release_all();
        if let Ok(count) = &released {
            log::info!(target: "field", "released {} agents", count);
        }
        let muted = self.synth.set_effect_parameter(FX_MASTER_GAIN, 0.0);
        released.map(|_| ()).and(muted)
    }
}
