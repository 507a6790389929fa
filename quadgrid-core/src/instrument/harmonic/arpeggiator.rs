use std::time::{Duration, Instant};

use crate::quantize::{gains_f32, midi_to_hz};
use crate::scheduler::{Outbox, ScheduledTask, TaskResult, IDLE_POLL};

use super::HarmonicInstrument;

/// Octave offset at which the bounce turns around.
const OCTAVE_BOUNCE: i32 = 3;

/// Walks the held pitches in ascending order while bouncing an octave
/// offset between -3 and +3.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arpeggiator {
    pointer: usize,
    octave: i32,
    direction: i32,
}

impl Arpeggiator {
    pub fn new() -> Self {
        Self {
            pointer: 0,
            octave: 0,
            direction: 1,
        }
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// Next pitch to play from `held` (ascending), or `None` with nothing held.
    pub fn next_pitch(&mut self, held: &[f64]) -> Option<f64> {
        if held.is_empty() {
            return None;
        }
        let pitch = held[self.pointer % held.len()] + 12.0 * self.octave as f64;
        self.pointer = self.pointer.wrapping_add(1);
        self.octave += self.direction;
        if self.octave.abs() >= OCTAVE_BOUNCE {
            self.direction = -self.direction;
        }
        Some(pitch)
    }
}

/// Retunes every voice slot to the next arpeggio pitch each step.
pub struct ArpeggiatorTask {
    arp: Arpeggiator,
}

impl ArpeggiatorTask {
    pub fn new() -> Self {
        Self {
            arp: Arpeggiator::new(),
        }
    }
}

impl Default for ArpeggiatorTask {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduledTask<HarmonicInstrument> for ArpeggiatorTask {
    fn name(&self) -> &str {
        "arpeggiator"
    }

    fn tick(
        &mut self,
        inst: &mut HarmonicInstrument,
        _now: Instant,
        _out: &mut Outbox<HarmonicInstrument>,
    ) -> TaskResult {
        if !inst.arp_active() {
            return Ok(IDLE_POLL);
        }
        let held = inst.pool.held_pitches();
        let Some(pitch) = self.arp.next_pitch(&held) else {
            return Ok(IDLE_POLL);
        };
        let hz = midi_to_hz(pitch) as f32;
        // Voices keep their own pan; only the frequency follows the arpeggio.
        for voice in inst.pool.voices() {
            inst.synth.set_voice_parameters(voice.slot, hz, gains_f32(voice.gains))?;
        }
        Ok(inst.step_period())
    }

    fn idle_period(&self) -> Duration {
        IDLE_POLL
    }
}
