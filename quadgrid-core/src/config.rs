use std::path::{Path, PathBuf};
use std::time::Duration;

use quadgrid_types::{Generation, NOTE_NAMES};
use serde::Deserialize;

use crate::instrument::{InstrumentKind, InstrumentSettings};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    defaults: DefaultsConfig,
    #[serde(default)]
    runtime: RuntimeConfig,
    #[serde(default)]
    harmonic: HarmonicConfig,
    #[serde(default)]
    field: FieldConfig,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    instrument: Option<String>,
    bpm: Option<f64>,
    root: Option<String>,
    scale: Option<String>,
    gain: Option<f64>,
}

#[derive(Deserialize, Default)]
struct RuntimeConfig {
    poll_quantum_ms: Option<u64>,
    voice_capacity: Option<usize>,
    led_queue_capacity: Option<usize>,
    osc_server: Option<String>,
    midi_port: Option<usize>,
    generation: Option<String>,
}

#[derive(Deserialize, Default)]
struct HarmonicConfig {
    harmonics_min: Option<f64>,
    harmonics_max: Option<f64>,
}

#[derive(Deserialize, Default)]
struct FieldConfig {
    beat_divisions: Option<f64>,
}

pub struct Config {
    defaults: DefaultsConfig,
    runtime: RuntimeConfig,
    harmonic: HarmonicConfig,
    field: FieldConfig,
}

impl Config {
    /// Embedded defaults overlaid with `~/.config/quadgrid/config.toml`.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::embedded(),
        }
    }

    /// Embedded defaults overlaid with the file at `path`, if it exists and parses.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::embedded();
        if !path.exists() {
            return config;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => {
                    merge_defaults(&mut config.defaults, user.defaults);
                    merge_runtime(&mut config.runtime, user.runtime);
                    merge_harmonic(&mut config.harmonic, user.harmonic);
                    merge_field(&mut config.field, user.field);
                }
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
        config
    }

    fn embedded() -> Self {
        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::warn!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });
        Config {
            defaults: base.defaults,
            runtime: base.runtime,
            harmonic: base.harmonic,
            field: base.field,
        }
    }

    pub fn instrument(&self) -> InstrumentKind {
        self.defaults
            .instrument
            .as_deref()
            .and_then(InstrumentKind::parse)
            .unwrap_or_default()
    }

    /// Tempo in beats per minute (clamped to 20..300).
    pub fn bpm(&self) -> f64 {
        self.defaults.bpm.unwrap_or(120.0).clamp(20.0, 300.0)
    }

    /// Starting root as a pitch class.
    pub fn root(&self) -> i32 {
        self.defaults.root.as_deref().and_then(parse_root).unwrap_or(0)
    }

    pub fn scale_name(&self) -> Option<&str> {
        self.defaults.scale.as_deref()
    }

    pub fn gain(&self) -> f64 {
        self.defaults.gain.unwrap_or(0.6).clamp(0.0, 1.0)
    }

    /// Control loop sleep per iteration (clamped to 1..4 ms).
    pub fn poll_quantum(&self) -> Duration {
        Duration::from_millis(self.runtime.poll_quantum_ms.unwrap_or(2).clamp(1, 4))
    }

    pub fn voice_capacity(&self) -> usize {
        self.runtime.voice_capacity.unwrap_or(16).clamp(1, 64)
    }

    pub fn led_queue_capacity(&self) -> usize {
        self.runtime
            .led_queue_capacity
            .unwrap_or(crate::led::LED_QUEUE_CAPACITY)
            .max(1)
    }

    /// Address of the synthesis server. An empty string disables sound.
    pub fn osc_server(&self) -> Option<&str> {
        match self.runtime.osc_server.as_deref() {
            Some("") => None,
            Some(addr) => Some(addr),
            None => Some("127.0.0.1:57120"),
        }
    }

    pub fn midi_port(&self) -> Option<usize> {
        self.runtime.midi_port
    }

    /// Forced hardware generation; `None` means guess from the port name.
    pub fn generation(&self) -> Option<Generation> {
        self.runtime.generation.as_deref().and_then(parse_generation)
    }

    pub fn harmonics_range(&self) -> (f64, f64) {
        let min = self.harmonic.harmonics_min.unwrap_or(5.0).max(1.0);
        let max = self.harmonic.harmonics_max.unwrap_or(60.0).max(min);
        (min, max)
    }

    pub fn beat_divisions(&self) -> f64 {
        self.field.beat_divisions.unwrap_or(16.0).max(1.0)
    }

    /// Startup parameters for the instruments.
    pub fn instrument_settings(&self) -> InstrumentSettings {
        let (harmonics_min, harmonics_max) = self.harmonics_range();
        InstrumentSettings {
            bpm: self.bpm(),
            root: self.root(),
            scale: self.scale_name().map(str::to_string),
            gain: self.gain(),
            voice_capacity: self.voice_capacity(),
            harmonics_min,
            harmonics_max,
            beat_divisions: self.beat_divisions(),
            seed: quadgrid_types::rng::seed_from_clock(),
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("quadgrid").join("config.toml"))
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.instrument.is_some() {
        base.instrument = user.instrument;
    }
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.root.is_some() {
        base.root = user.root;
    }
    if user.scale.is_some() {
        base.scale = user.scale;
    }
    if user.gain.is_some() {
        base.gain = user.gain;
    }
}

fn merge_runtime(base: &mut RuntimeConfig, user: RuntimeConfig) {
    if user.poll_quantum_ms.is_some() {
        base.poll_quantum_ms = user.poll_quantum_ms;
    }
    if user.voice_capacity.is_some() {
        base.voice_capacity = user.voice_capacity;
    }
    if user.led_queue_capacity.is_some() {
        base.led_queue_capacity = user.led_queue_capacity;
    }
    if user.osc_server.is_some() {
        base.osc_server = user.osc_server;
    }
    if user.midi_port.is_some() {
        base.midi_port = user.midi_port;
    }
    if user.generation.is_some() {
        base.generation = user.generation;
    }
}

fn merge_harmonic(base: &mut HarmonicConfig, user: HarmonicConfig) {
    if user.harmonics_min.is_some() {
        base.harmonics_min = user.harmonics_min;
    }
    if user.harmonics_max.is_some() {
        base.harmonics_max = user.harmonics_max;
    }
}

fn merge_field(base: &mut FieldConfig, user: FieldConfig) {
    if user.beat_divisions.is_some() {
        base.beat_divisions = user.beat_divisions;
    }
}

/// Pitch class of a note name. Accepts `C#` and `Cs` spellings.
pub fn parse_root(s: &str) -> Option<i32> {
    let name = s.trim().replace('s', "#");
    NOTE_NAMES
        .iter()
        .position(|n| n.eq_ignore_ascii_case(&name))
        .map(|i| i as i32)
}

pub fn parse_generation(s: &str) -> Option<Generation> {
    match s.trim().to_lowercase().as_str() {
        "mk1" | "s" | "mini" => Some(Generation::Mk1),
        "mk2" => Some(Generation::Mk2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_embedded_config() {
        let config = Config::embedded();
        assert_eq!(config.instrument(), InstrumentKind::Harmonic);
        assert_eq!(config.bpm(), 120.0);
        assert_eq!(config.root(), 0);
        assert_eq!(config.scale_name(), Some("Major"));
        assert_eq!(config.poll_quantum(), Duration::from_millis(2));
        assert_eq!(config.voice_capacity(), 16);
        assert_eq!(config.led_queue_capacity(), 256);
        assert_eq!(config.osc_server(), Some("127.0.0.1:57120"));
        assert_eq!(config.midi_port(), None);
        assert_eq!(config.generation(), None);
        assert_eq!(config.harmonics_range(), (5.0, 60.0));
        assert_eq!(config.beat_divisions(), 16.0);
    }

    #[test]
    fn test_user_file_overrides_only_what_it_sets() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[defaults]\ninstrument = \"field\"\nroot = \"Fs\"\n\n[runtime]\npoll_quantum_ms = 9\ngeneration = \"mk2\"\nosc_server = \"\""
        )
        .unwrap();

        let config = Config::load_from(file.path());
        assert_eq!(config.instrument(), InstrumentKind::Field);
        assert_eq!(config.root(), 6);
        assert_eq!(config.bpm(), 120.0);
        // Clamped to the 4 ms ceiling.
        assert_eq!(config.poll_quantum(), Duration::from_millis(4));
        assert_eq!(config.generation(), Some(Generation::Mk2));
        assert_eq!(config.osc_server(), None);
        assert_eq!(config.voice_capacity(), 16);
    }

    #[test]
    fn test_malformed_user_file_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[defaults\nbpm = fast").unwrap();
        let config = Config::load_from(file.path());
        assert_eq!(config.bpm(), 120.0);
        assert_eq!(config.instrument(), InstrumentKind::Harmonic);
    }

    #[test]
    fn test_missing_user_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml"));
        assert_eq!(config.beat_divisions(), 16.0);
    }

    #[test]
    fn test_parse_root() {
        assert_eq!(parse_root("C"), Some(0));
        assert_eq!(parse_root("C#"), Some(1));
        assert_eq!(parse_root("Cs"), Some(1));
        assert_eq!(parse_root("a"), Some(9));
        assert_eq!(parse_root("H"), None);
    }

    #[test]
    fn test_parse_generation() {
        assert_eq!(parse_generation("MK1"), Some(Generation::Mk1));
        assert_eq!(parse_generation("mk2"), Some(Generation::Mk2));
        assert_eq!(parse_generation("pro"), None);
    }

    #[test]
    fn test_settings_carry_config_values() {
        let settings = Config::embedded().instrument_settings();
        assert_eq!(settings.voice_capacity, 16);
        assert_eq!(settings.scale.as_deref(), Some("Major"));
        assert_eq!(settings.harmonics_max, 60.0);
    }
}
