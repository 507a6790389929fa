//! Generative drum steps.
//!
//! Modes: 0 off, 1 and 2 bursts of one to four repeats of a random part,
//! 3 single hits with a quarter of the steps left silent. Parts 9..=11 are
//! rests so busy modes still breathe.

use std::time::Instant;

use quadgrid_audio::{SynthEngine, SynthResult, VoiceRef};
use quadgrid_types::rng;

use crate::scheduler::{Outbox, ScheduledTask, TaskResult, IDLE_POLL};

use super::HarmonicInstrument;

pub const STEPS_PER_BAR: usize = 16;
/// Parts drawn from `0..PART_COUNT`; indices from `SOUNDING_PARTS` up are rests.
const PART_COUNT: usize = 12;
const SOUNDING_PARTS: u8 = 9;
const KICK_FREQS: [f32; 3] = [50.0, 55.0, 60.0];

/// Cursor state of the drum sequencer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrumPattern {
    step: usize,
    remaining: usize,
    current: u8,
}

impl DrumPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Advance one step. Returns the part to sound, or `None` for silence
    /// and rests.
    pub fn advance(&mut self, mode: usize, rng_state: &mut u64) -> Option<u8> {
        if mode == 0 {
            self.remaining = 0;
            return None;
        }
        if self.remaining == 0 {
            if mode == 3 && rng::next_unit(rng_state) < 0.25 {
                self.step = (self.step + 1) % STEPS_PER_BAR;
                return None;
            }
            self.remaining = if mode == 3 {
                1
            } else {
                1 + rng::next_index(rng_state, 4)
            };
            self.current = rng::next_index(rng_state, PART_COUNT) as u8;
        }

        self.remaining -= 1;
        self.step += 1;
        if self.step >= STEPS_PER_BAR {
            // A burst never spills into the next bar.
            self.step = 0;
            self.remaining = 0;
        }
        (self.current < SOUNDING_PARTS).then_some(self.current)
    }
}

/// Set the drum voice up for `part` and fire it.
pub fn play_part(synth: &dyn SynthEngine, voice: VoiceRef, part: u8, rng_state: &mut u64) -> SynthResult {
    match part {
        0 => {
            let freq = KICK_FREQS[rng::next_index(rng_state, KICK_FREQS.len())];
            synth.set_voice_param(voice, "kick_freq", freq)?;
        }
        1 => synth.set_voice_param(voice, "snare_level", 0.2)?,
        2 => synth.set_voice_param(voice, "hihat_level", 0.15)?,
        3 => synth.set_voice_param(voice, "fm_carrier", 220.0)?,
        4 => synth.set_voice_param(voice, "fm_carrier", 4000.0)?,
        5 => synth.set_voice_param(voice, "fm_carrier", 800.0)?,
        6 => synth.set_voice_param(voice, "fm_carrier", 140.0)?,
        7 => synth.set_voice_param(voice, "hihat_level", 0.08)?,
        8 => synth.set_voice_param(voice, "snare_level", 0.4)?,
        _ => return Ok(()),
    }
    synth.trigger(voice)
}

pub struct DrumTask {
    pattern: DrumPattern,
}

impl DrumTask {
    pub fn new() -> Self {
        Self {
            pattern: DrumPattern::new(),
        }
    }
}

impl Default for DrumTask {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduledTask<HarmonicInstrument> for DrumTask {
    fn name(&self) -> &str {
        "drums"
    }

    fn tick(
        &mut self,
        inst: &mut HarmonicInstrument,
        _now: Instant,
        _out: &mut Outbox<HarmonicInstrument>,
    ) -> TaskResult {
        let mode = inst.drum_mode();
        if mode == 0 {
            self.pattern.advance(0, &mut inst.rng_state);
            return Ok(IDLE_POLL);
        }
        if let Some(part) = self.pattern.advance(mode, &mut inst.rng_state) {
            play_part(inst.synth.as_ref(), inst.drum_voice(), part, &mut inst.rng_state)?;
        }
        Ok(inst.step_period())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadgrid_audio::{SynthOp, TestSynth};

    #[test]
    fn off_never_plays() {
        let mut pattern = DrumPattern::new();
        let mut rng_state = 1;
        for _ in 0..50 {
            assert_eq!(pattern.advance(0, &mut rng_state), None);
        }
        assert_eq!(pattern.step(), 0);
    }

    #[test]
    fn step_stays_within_the_bar() {
        let mut rng_state = 0xdead_beef;
        for mode in 1..=3 {
            let mut pattern = DrumPattern::new();
            for _ in 0..500 {
                pattern.advance(mode, &mut rng_state);
                assert!(pattern.step() < STEPS_PER_BAR);
            }
        }
    }

    #[test]
    fn bursts_repeat_the_same_part() {
        let mut rng_state = 7;
        let mut pattern = DrumPattern::new();
        let mut burst_part = None;
        for _ in 0..200 {
            let continuing = pattern.remaining > 0;
            let part = pattern.advance(1, &mut rng_state);
            if continuing {
                assert_eq!(part, burst_part);
            }
            burst_part = part;
            assert!(pattern.remaining <= 3);
        }
    }

    #[test]
    fn sparse_mode_leaves_some_steps_silent() {
        let mut rng_state = 99;
        let mut pattern = DrumPattern::new();
        let silent = (0..2000)
            .filter(|_| pattern.advance(3, &mut rng_state).is_none())
            .count();
        // 25% silence plus 3 of 12 parts resting.
        assert!(silent > 600 && silent < 1200, "silent steps: {}", silent);
    }

    #[test]
    fn parts_map_to_voice_params() {
        let synth = TestSynth::new();
        let voice = VoiceRef(16);
        let mut rng_state = 3;
        play_part(&synth, voice, 4, &mut rng_state).unwrap();
        assert_eq!(
            synth.operations(),
            vec![
                SynthOp::SetVoiceParam {
                    voice,
                    name: "fm_carrier".to_string(),
                    value: 4000.0
                },
                SynthOp::Trigger(voice),
            ]
        );

        synth.clear();
        play_part(&synth, voice, 10, &mut rng_state).unwrap();
        assert!(synth.operations().is_empty());

        play_part(&synth, voice, 0, &mut rng_state).unwrap();
        let kick = synth.find(|op| matches!(op, SynthOp::SetVoiceParam { name, .. } if name == "kick_freq"));
        match kick {
            Some(SynthOp::SetVoiceParam { value, .. }) => assert!(KICK_FREQS.contains(&value)),
            other => panic!("expected kick, got {:?}", other),
        }
    }
}
