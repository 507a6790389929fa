//! One self-triggering agent per grid cell.

use std::time::{Duration, Instant};

use quadgrid_audio::VoiceRef;
use quadgrid_types::{rng, GridPosition, ScaleDegreeSet};

use crate::quantize::degree_frequency;

/// Reference frequency of degree 0 at octave offset 0.
pub const BASE_HZ: f64 = 220.0;
/// Distance from the quadrant centre to its corner cell, used to normalize speed.
const MAX_CENTRE_DISTANCE: f64 = 2.12;
const EVEN_DIVISIONS: [u32; 3] = [1, 2, 4];
const ODD_DIVISIONS: [u32; 3] = [1, 3, 5];

/// Register band selecting which FM pair of a profile an agent uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmBand {
    Bell,
    Mid,
    Bass,
}

/// FM `(ratio, index)` pairs per band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundProfile {
    pub name: &'static str,
    pub bell: (f64, f64),
    pub mid: (f64, f64),
    pub bass: (f64, f64),
}

impl SoundProfile {
    pub fn pair(&self, band: FmBand) -> (f64, f64) {
        match band {
            FmBand::Bell => self.bell,
            FmBand::Mid => self.mid,
            FmBand::Bass => self.bass,
        }
    }
}

pub const SOUND_PROFILES: [SoundProfile; 9] = [
    SoundProfile { name: "Pulse", bell: (3.5, 12.0), mid: (1.0, 1.5), bass: (1.0, 0.8) },
    SoundProfile { name: "Glass Pluck", bell: (7.1, 5.0), mid: (2.0, 1.2), bass: (1.0, 0.5) },
    SoundProfile { name: "Digital Marimba", bell: (1.618, 2.0), mid: (1.0, 0.5), bass: (0.5, 1.0) },
    SoundProfile { name: "Crystal Tine", bell: (11.0, 8.0), mid: (4.0, 2.0), bass: (2.0, 1.0) },
    SoundProfile { name: "Bamboo FM", bell: (5.0, 1.5), mid: (2.0, 0.8), bass: (0.5, 2.0) },
    SoundProfile { name: "Sine Perc", bell: (1.0, 0.2), mid: (1.0, 0.1), bass: (1.0, 0.05) },
    SoundProfile { name: "Bells in Rain", bell: (13.5, 10.0), mid: (2.1, 3.0), bass: (1.0, 1.5) },
    SoundProfile { name: "Woody FM", bell: (2.12, 4.0), mid: (1.5, 2.5), bass: (0.7, 5.0) },
    SoundProfile { name: "Tiny Prisms", bell: (9.0, 15.0), mid: (3.0, 4.0), bass: (1.0, 2.0) },
];

/// Profile, scale and root an agent sounds with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Assignment {
    pub profile: usize,
    pub scale: usize,
    pub root: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub pos: GridPosition,
    pub voice: VoiceRef,
    pub active: bool,
    /// Octaves above or below the reference, possibly fractional.
    pub octave_offset: f64,
    pub even: bool,
    pub speed: f64,
    pub note_index: usize,
    pub quadrant: u8,
    pub division: u32,
    pub interval: Duration,
    pub last_trigger: Option<Instant>,
    pub flash_until: Option<Instant>,
    pub assigned: Assignment,
}

impl Agent {
    /// Inactive agent with the traits its cell dictates. The voice is the cell index.
    pub fn new(pos: GridPosition) -> Self {
        let (x, y) = (pos.x(), pos.y());
        let left = x < 4;
        let octave_offset = match y {
            0..=2 => if left { 1.5 } else { 0.5 },
            3..=4 => if left { 0.5 } else { -0.5 },
            _ => if left { -1.0 } else { -1.5 },
        };
        let (qx, qy) = ((x % 4) as f64, (y % 4) as f64);
        let distance = ((qx - 1.5).powi(2) + (qy - 1.5).powi(2)).sqrt();
        let quadrant = match (left, y < 4) {
            (true, true) => 0,
            (false, true) => 1,
            (true, false) => 2,
            (false, false) => 3,
        };
        Self {
            pos,
            voice: VoiceRef(pos.index() as u16),
            active: false,
            octave_offset,
            even: left,
            speed: 1.0 + 3.0 * (1.0 - distance / MAX_CENTRE_DISTANCE),
            note_index: (x % 4) as usize + 4 * (y % 4) as usize,
            quadrant,
            division: 1,
            interval: Duration::ZERO,
            last_trigger: None,
            flash_until: None,
            assigned: Assignment::default(),
        }
    }

    pub fn band(&self) -> FmBand {
        if self.octave_offset >= 1.0 {
            FmBand::Bell
        } else if self.octave_offset <= -1.0 {
            FmBand::Bass
        } else {
            FmBand::Mid
        }
    }

    /// A random division from the agent's family.
    pub fn pick_division(&self, rng_state: &mut u64) -> u32 {
        let family = if self.even { &EVEN_DIVISIONS } else { &ODD_DIVISIONS };
        family[rng::next_index(rng_state, family.len())]
    }

    /// Start self-triggering. The first trigger is due immediately.
    pub fn activate(&mut self, division: u32, beat_time: Duration, assignment: Assignment) {
        let division = division.max(1);
        self.active = true;
        self.division = division;
        self.interval = beat_time.div_f64(division as f64 * self.speed);
        self.last_trigger = None;
        self.flash_until = None;
        self.assigned = assignment;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.last_trigger = None;
        self.flash_until = None;
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.active
            && self
                .last_trigger
                .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    pub fn is_flashing(&self, now: Instant) -> bool {
        self.flash_until.is_some_and(|until| now < until)
    }

    pub fn is_outdated(&self, target: Assignment) -> bool {
        self.active && self.assigned != target
    }

    fn degree(&self, scales: &[ScaleDegreeSet]) -> f64 {
        scales
            .get(self.assigned.scale)
            .map_or(0.0, |s| s.degree_at(self.note_index))
    }

    /// Whether the agent's note is the scale root.
    pub fn is_root_note(&self, scales: &[ScaleDegreeSet]) -> bool {
        self.degree(scales) == 0.0
    }

    pub fn frequency(&self, scales: &[ScaleDegreeSet]) -> f64 {
        degree_frequency(
            BASE_HZ,
            self.degree(scales) + self.assigned.root as f64 + 12.0 * self.octave_offset,
        )
    }

    /// FM `(ratio, index)` for the assigned profile and this agent's band.
    pub fn fm_pair(&self) -> (f64, f64) {
        SOUND_PROFILES[self.assigned.profile % SOUND_PROFILES.len()].pair(self.band())
    }
}
