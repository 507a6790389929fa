//! # quadgrid-core
//!
//! Control layer for a quadraphonic Launchpad instrument: input
//! normalization, the voice pool, pitch quantization and panning, the task
//! scheduler, LED feedback and the main control loop, plus the three
//! instruments built on top of them.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::{Arc, Mutex};
//! use quadgrid_core::config::Config;
//! use quadgrid_core::control_loop::{ControlLoop, LoopSettings};
//! use quadgrid_core::hardware::launchpad::LaunchpadAdapter;
//! use quadgrid_core::instrument::{HarmonicInstrument, InstrumentSettings};
//! use quadgrid_audio::OscSynth;
//!
//! let config = Config::load();
//! let adapter = LaunchpadAdapter::open(config.midi_port(), config.generation())?;
//! let synth = OscSynth::connect(config.osc_server().unwrap_or("127.0.0.1:57120"))?;
//! let instrument = HarmonicInstrument::new(Box::new(synth), &config.instrument_settings());
//! let hardware = Arc::new(Mutex::new(Box::new(adapter) as Box<_>));
//! ControlLoop::new(hardware, instrument, LoopSettings::from_config(&config))?.run()?;
//! ```
//!
//! ## Module Overview
//!
//! - [`hardware`]: `HardwareAdapter` trait, the Launchpad MIDI adapter, test and null adapters
//! - [`input`]: raw identifier <-> logical zone mapping per generation
//! - [`quantize`]: scale quantization, quad panning, pitch/frequency helpers
//! - [`pool`]: bounded voice pool with oldest-first stealing
//! - [`scheduler`]: named repeating tasks and deferred one-shots
//! - [`led`]: LED frame, cache and the writer thread
//! - [`control_loop`]: the poll/dispatch/step/render loop
//! - [`instrument`]: harmonic, field and scan instruments
//! - [`config`]: TOML configuration (embedded defaults + user override)
//! - [`telemetry`]: loop timing

pub mod config;
pub mod control_loop;
pub mod hardware;
pub mod input;
pub mod instrument;
pub mod led;
pub mod pool;
pub mod quantize;
pub mod scheduler;
pub mod telemetry;

pub use control_loop::{ControlLoop, LoopError, LoopResult, LoopSettings, ShutdownHandle};
pub use hardware::{HardwareAdapter, HardwareError, HardwareResult};
pub use instrument::{Instrument, InstrumentKind, InstrumentSettings};
pub use led::{LedFrame, LedRenderer, SharedHardware};
pub use scheduler::{Outbox, ScheduledTask, Scheduler, TaskError, TaskResult};
