//! The playable instruments.
//!
//! Each instrument owns its controller state, its voices or agents and its
//! synth handle. The control loop feeds it logical events, steps the tasks it
//! registered and asks it for an LED frame whenever a region is dirty.

pub mod field;
pub mod harmonic;
pub mod scan;

use std::fmt;
use std::time::Instant;

use quadgrid_audio::SynthResult;
use quadgrid_types::{ControllerState, LedColor, LogicalEvent};
use serde::{Deserialize, Serialize};

use crate::led::LedFrame;
use crate::scheduler::{Outbox, Scheduler};

pub use field::FieldInstrument;
pub use harmonic::HarmonicInstrument;
pub use scan::ScanInstrument;

/// Effect control carrying the master gain on every instrument.
pub const FX_MASTER_GAIN: &str = "master_gain";

/// Which instrument to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    #[default]
    Harmonic,
    Field,
    Scan,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 3] = [
        InstrumentKind::Harmonic,
        InstrumentKind::Field,
        InstrumentKind::Scan,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            InstrumentKind::Harmonic => "harmonic",
            InstrumentKind::Field => "field",
            InstrumentKind::Scan => "scan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "harmonic" | "harms" | "synth" => Some(InstrumentKind::Harmonic),
            "field" | "stochastic" => Some(InstrumentKind::Field),
            "scan" | "speakers" | "psychoacoustic" => Some(InstrumentKind::Scan),
            _ => None,
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Startup parameters shared by the instruments, resolved from config and
/// command-line flags.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSettings {
    pub bpm: f64,
    pub root: i32,
    /// Name of the scale to start on; unknown names fall back to the first.
    pub scale: Option<String>,
    pub gain: f64,
    pub voice_capacity: usize,
    pub harmonics_min: f64,
    pub harmonics_max: f64,
    /// Beats per agent cycle in the field.
    pub beat_divisions: f64,
    pub seed: u64,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            root: 0,
            scale: None,
            gain: 0.6,
            voice_capacity: 16,
            harmonics_min: 5.0,
            harmonics_max: 60.0,
            beat_divisions: 16.0,
            seed: 0x2545_f491_4f6c_dd1d,
        }
    }
}

/// A playable instrument driven by the control loop.
pub trait Instrument: Sized + 'static {
    fn name(&self) -> &'static str;

    fn controller(&self) -> &ControllerState;

    fn controller_mut(&mut self) -> &mut ControllerState;

    /// Push initial effect state and register background tasks.
    fn start(&mut self, scheduler: &mut Scheduler<Self>, now: Instant) -> SynthResult;

    /// React to one button transition.
    fn handle_event(
        &mut self,
        event: LogicalEvent,
        pressed: bool,
        now: Instant,
        out: &mut Outbox<Self>,
    ) -> SynthResult;

    /// Desired color of every LED.
    fn frame(&self, now: Instant) -> LedFrame;

    /// Silence everything before the loop exits.
    fn shutdown(&mut self) -> SynthResult;
}

/// Off / low / medium / high mode indicator.
pub fn mode_color(index: usize) -> LedColor {
    match index {
        0 => LedColor::OFF,
        1 => LedColor::GREEN,
        2 => LedColor::AMBER,
        _ => LedColor::RED,
    }
}

/// Master gain meter: green, amber, then `high`.
pub fn gain_meter(gain: f64, high: LedColor) -> LedColor {
    if gain < 0.4 {
        LedColor::GREEN
    } else if gain < 0.7 {
        LedColor::AMBER
    } else {
        high
    }
}

/// Index of the scale called `name`, or 0.
pub(crate) fn scale_index_by_name(scales: &[quadgrid_types::ScaleDegreeSet], name: Option<&str>) -> usize {
    name.and_then(|n| scales.iter().position(|s| s.name().eq_ignore_ascii_case(n)))
        .unwrap_or(0)
}
