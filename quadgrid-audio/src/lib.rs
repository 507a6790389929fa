//! # quadgrid-audio
//!
//! The boundary to the synthesis engine: the [`SynthEngine`] trait, an OSC
//! implementation with its dedicated sender thread, and recording/null
//! engines for tests and headless runs.

pub mod osc_sender;
pub mod synth;

pub use synth::{
    NullSynth, OscSynth, SharedTestSynth, SynthEngine, SynthError, SynthOp, SynthResult,
    TestSynth, VoiceRef, CHANNELS,
};
