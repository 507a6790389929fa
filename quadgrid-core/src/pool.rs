use std::fmt::Debug;

use quadgrid_audio::{SynthEngine, SynthResult, VoiceRef};

use crate::quantize::{gains_f32, midi_to_hz};

/// One reusable sound-producing slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice<K> {
    pub slot: VoiceRef,
    pub owner: Option<K>,
    /// Pitch after quantization, in (possibly fractional) MIDI semitones.
    pub pitch: f64,
    pub gains: [f64; 4],
    pub active: bool,
}

/// Outcome of [`VoicePool::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation<K> {
    pub voice: VoiceRef,
    /// False when the identity already owned this voice.
    pub fresh: bool,
    /// Identity whose still-sounding voice was taken over.
    pub stolen: Option<K>,
}

/// Fixed-capacity round-robin voice pool.
///
/// Allocation walks the slots in order regardless of which notes were
/// released, so once capacity is exceeded the oldest-issued slot is reused
/// even if it is still sounding. An identity owns at most one active voice.
///
/// The pool keeps lifecycle bookkeeping; gate and parameter changes go out
/// through the `SynthEngine` passed to the methods that need one.
pub struct VoicePool<K> {
    voices: Vec<Voice<K>>,
    next: usize,
}

impl<K: Copy + Eq + Debug> VoicePool<K> {
    pub fn new(capacity: usize) -> Self {
        let voices = (0..capacity.max(1))
            .map(|i| Voice {
                slot: VoiceRef(i as u16),
                owner: None,
                pitch: 0.0,
                gains: [0.0; 4],
                active: false,
            })
            .collect();
        Self { voices, next: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    /// Assign a voice to `identity`. Re-allocating an identity that already
    /// owns an active voice returns that voice unchanged.
    pub fn allocate(&mut self, identity: K) -> Allocation<K> {
        if let Some(voice) = self.handle_for(identity) {
            return Allocation {
                voice,
                fresh: false,
                stolen: None,
            };
        }

        let idx = self.next;
        self.next = (self.next + 1) % self.voices.len();

        let voice = &mut self.voices[idx];
        let stolen = if voice.active { voice.owner } else { None };
        if let Some(prev) = stolen {
            log::debug!(target: "pool", "{} stolen from {:?} for {:?}", voice.slot, prev, identity);
        }
        voice.active = true;
        voice.owner = Some(identity);
        Allocation {
            voice: voice.slot,
            fresh: true,
            stolen,
        }
    }

    /// Free the voice owned by `identity` and start its release phase.
    /// Returns `Ok(None)` if the identity owned nothing, which makes repeated
    /// releases harmless.
    pub fn release(&mut self, identity: K, synth: &dyn SynthEngine) -> SynthResult<Option<VoiceRef>> {
        let Some(voice) = self
            .voices
            .iter_mut()
            .find(|v| v.active && v.owner == Some(identity))
        else {
            return Ok(None);
        };
        voice.active = false;
        voice.owner = None;
        let slot = voice.slot;
        synth.release(slot)?;
        Ok(Some(slot))
    }

    /// Store pitch and gains on a voice and push them to the engine.
    pub fn apply_parameters(
        &mut self,
        handle: VoiceRef,
        pitch: f64,
        gains: [f64; 4],
        synth: &dyn SynthEngine,
    ) -> SynthResult {
        if let Some(voice) = self.voices.get_mut(handle.0 as usize) {
            voice.pitch = pitch;
            voice.gains = gains;
        }
        synth.set_voice_parameters(handle, midi_to_hz(pitch) as f32, gains_f32(gains))
    }

    /// Recompute the pitch of each active voice and push only the ones that changed.
    pub fn retune<F>(&mut self, mut pitch_for: F, synth: &dyn SynthEngine) -> SynthResult<usize>
    where
        F: FnMut(K) -> f64,
    {
        let mut changed = 0;
        for voice in self.voices.iter_mut().filter(|v| v.active) {
            let Some(owner) = voice.owner else { continue };
            let pitch = pitch_for(owner);
            if (pitch - voice.pitch).abs() > 1e-9 {
                voice.pitch = pitch;
                synth.set_voice_parameters(voice.slot, midi_to_hz(pitch) as f32, gains_f32(voice.gains))?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Release every active voice.
    pub fn release_all(&mut self, synth: &dyn SynthEngine) -> SynthResult<Vec<VoiceRef>> {
        let mut released = Vec::new();
        for voice in self.voices.iter_mut().filter(|v| v.active) {
            voice.active = false;
            voice.owner = None;
            released.push(voice.slot);
        }
        for &slot in &released {
            synth.release(slot)?;
        }
        Ok(released)
    }

    pub fn handle_for(&self, identity: K) -> Option<VoiceRef> {
        self.voices
            .iter()
            .find(|v| v.active && v.owner == Some(identity))
            .map(|v| v.slot)
    }

    pub fn voice(&self, handle: VoiceRef) -> Option<&Voice<K>> {
        self.voices.get(handle.0 as usize)
    }

    pub fn voices(&self) -> &[Voice<K>] {
        &self.voices
    }

    pub fn active(&self) -> impl Iterator<Item = &Voice<K>> {
        self.voices.iter().filter(|v| v.active)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Distinct pitches of active voices, ascending.
    pub fn held_pitches(&self) -> Vec<f64> {
        let mut pitches: Vec<f64> = self.active().map(|v| v.pitch).collect();
        pitches.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        pitches.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        pitches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadgrid_audio::{SynthOp, TestSynth};

    #[test]
    fn same_identity_gets_same_voice() {
        let mut pool: VoicePool<u32> = VoicePool::new(4);
        let first = pool.allocate(7);
        let again = pool.allocate(7);
        assert!(first.fresh);
        assert!(!again.fresh);
        assert_eq!(first.voice, again.voice);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn seventeenth_allocation_steals_the_first_slot() {
        let mut pool: VoicePool<u32> = VoicePool::new(16);
        let first = pool.allocate(0);
        for id in 1..16 {
            pool.allocate(id);
        }
        let overflow = pool.allocate(16);
        assert_eq!(overflow.voice, first.voice);
        assert_eq!(overflow.stolen, Some(0));
        assert_eq!(pool.handle_for(0), None);
        assert_eq!(pool.handle_for(16), Some(first.voice));
        assert_eq!(pool.active_count(), 16);
    }

    #[test]
    fn round_robin_ignores_release_order() {
        let synth = TestSynth::new();
        let mut pool: VoicePool<u32> = VoicePool::new(3);
        let a = pool.allocate(1);
        pool.allocate(2);
        pool.release(1, &synth).unwrap();
        // Slot 0 is free again but the cursor has moved on.
        let c = pool.allocate(3);
        assert_ne!(c.voice, a.voice);
        assert_eq!(c.stolen, None);
    }

    #[test]
    fn release_is_idempotent() {
        let synth = TestSynth::new();
        let mut pool: VoicePool<u32> = VoicePool::new(2);
        let a = pool.allocate(5);
        assert_eq!(pool.release(5, &synth).unwrap(), Some(a.voice));
        assert_eq!(pool.release(5, &synth).unwrap(), None);
        assert_eq!(synth.releases(), vec![a.voice]);
    }

    #[test]
    fn retune_only_touches_changed_voices() {
        let synth = TestSynth::new();
        let mut pool: VoicePool<u32> = VoicePool::new(4);
        for id in [60u32, 64, 67] {
            let alloc = pool.allocate(id);
            pool.apply_parameters(alloc.voice, id as f64, [0.25; 4], &synth).unwrap();
        }
        synth.clear();

        let changed = pool
            .retune(|id| if id == 64 { 65.0 } else { id as f64 }, &synth)
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(synth.count(|op| matches!(op, SynthOp::SetVoice { .. })), 1);
        assert_eq!(pool.held_pitches(), vec![60.0, 65.0, 67.0]);
    }

    #[test]
    fn release_all_frees_everything() {
        let synth = TestSynth::new();
        let mut pool: VoicePool<u32> = VoicePool::new(4);
        pool.allocate(1);
        pool.allocate(2);
        let released = pool.release_all(&synth).unwrap();
        assert_eq!(released.len(), 2);
        assert_eq!(pool.active_count(), 0);
    }
}
