use std::fmt;

use crate::rng;

/// Note names indexed by pitch class.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

pub fn note_name(pitch_class: i32) -> &'static str {
    NOTE_NAMES[pitch_class.rem_euclid(12) as usize]
}

/// Error building a [`ScaleDegreeSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleError(pub String);

impl fmt::Display for ScaleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ScaleError {}

/// A named, ordered set of pitch-class offsets from the root, in semitones.
/// Offsets may be fractional (microtonal) and may run past 12 for
/// multi-octave tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleDegreeSet {
    name: String,
    degrees: Vec<f64>,
}

impl ScaleDegreeSet {
    /// Degrees must be non-empty, finite and non-decreasing.
    pub fn new(name: impl Into<String>, degrees: Vec<f64>) -> Result<Self, ScaleError> {
        let name = name.into();
        if degrees.is_empty() {
            return Err(ScaleError(format!("scale '{}' has no degrees", name)));
        }
        if degrees.iter().any(|d| !d.is_finite()) {
            return Err(ScaleError(format!("scale '{}' has a non-finite degree", name)));
        }
        if degrees.windows(2).any(|w| w[1] < w[0]) {
            return Err(ScaleError(format!("scale '{}' degrees are not ascending", name)));
        }
        Ok(Self { name, degrees })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn degrees(&self) -> &[f64] {
        &self.degrees
    }

    pub fn len(&self) -> usize {
        self.degrees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.degrees.is_empty()
    }

    /// Degree at `index`, wrapping around the table.
    pub fn degree_at(&self, index: usize) -> f64 {
        self.degrees[index % self.degrees.len()]
    }

    /// The degree closest to `relative` and its distance. The first degree
    /// with the minimal distance wins ties.
    pub fn closest_degree(&self, relative: f64) -> (f64, f64) {
        let mut best = self.degrees[0];
        let mut best_dist = (best - relative).abs();
        for &d in &self.degrees[1..] {
            let dist = (d - relative).abs();
            if dist < best_dist {
                best = d;
                best_dist = dist;
            }
        }
        (best, best_dist)
    }
}

fn table(entries: &[(&str, &[f64])]) -> Vec<ScaleDegreeSet> {
    entries
        .iter()
        .filter_map(|(name, degrees)| ScaleDegreeSet::new(*name, degrees.to_vec()).ok())
        .collect()
}

/// The single-octave table played by the harmonic grid, including its
/// microtonal entries.
pub fn harmonic_scales() -> Vec<ScaleDegreeSet> {
    table(&[
        ("Major", &[0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 11.0]),
        ("Minor", &[0.0, 2.0, 3.0, 5.0, 7.0, 8.0, 10.0]),
        ("Indian Bhairav", &[0.0, 1.12, 3.86, 4.98, 7.02, 8.14, 10.88]),
        ("Indian Marwa", &[0.0, 1.12, 3.86, 5.90, 7.02, 9.06, 10.88]),
        ("Chinese Pentatonic", &[0.0, 2.04, 3.86, 7.02, 9.06]),
        ("Ligeti Micro", &[0.0, 0.5, 2.5, 3.5, 6.5, 7.5, 10.5]),
        ("Spectral", &[0.0, 2.04, 3.86, 5.51, 7.02, 8.41, 9.69, 10.88]),
        ("Partch Otonality", &[0.0, 2.04, 3.86, 4.98, 7.02, 8.84, 10.88]),
        ("Japanese Hirajoshi", &[0.0, 2.04, 3.16, 7.02, 8.14]),
        ("Japanese In Sen", &[0.0, 1.12, 4.98, 7.02, 8.14]),
        ("Dorian", &[0.0, 2.0, 3.0, 5.0, 7.0, 9.0, 10.0]),
        ("Phrygian", &[0.0, 1.0, 3.0, 5.0, 7.0, 8.0, 10.0]),
        ("Lydian", &[0.0, 2.0, 4.0, 6.0, 7.0, 9.0, 11.0]),
        ("Mixolydian", &[0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 10.0]),
        ("Locrian", &[0.0, 1.0, 3.0, 5.0, 6.0, 8.0, 10.0]),
        ("Harmonic Minor", &[0.0, 2.0, 3.0, 5.0, 7.0, 8.0, 11.0]),
        ("Melodic Minor", &[0.0, 2.0, 3.0, 5.0, 7.0, 9.0, 11.0]),
        ("Pentatonic Maj", &[0.0, 2.0, 4.0, 7.0, 9.0]),
        ("Pentatonic Min", &[0.0, 3.0, 5.0, 7.0, 10.0]),
        ("Blues", &[0.0, 3.0, 5.0, 6.0, 7.0, 10.0]),
        ("Whole Tone", &[0.0, 2.0, 4.0, 6.0, 8.0, 10.0]),
        ("Acoustic", &[0.0, 2.0, 4.0, 6.0, 7.0, 9.0, 10.0]),
        ("Altered", &[0.0, 1.0, 3.0, 4.0, 6.0, 8.0, 10.0]),
        ("Phrygian Dom", &[0.0, 1.0, 4.0, 5.0, 7.0, 8.0, 10.0]),
        ("Hungarian Min", &[0.0, 2.0, 3.0, 6.0, 7.0, 8.0, 11.0]),
        ("Double Harm", &[0.0, 1.0, 4.0, 5.0, 7.0, 8.0, 11.0]),
    ])
}

/// Multi-octave tables indexed by a cell's note index in the agent field.
pub fn field_scales() -> Vec<ScaleDegreeSet> {
    table(&[
        (
            "Chromatic",
            &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0],
        ),
        (
            "Harmonic Series",
            &[0.0, 3.86, 7.02, 9.69, 12.0, 14.04, 15.86, 17.51, 19.02, 20.41, 21.69, 22.88, 24.0],
        ),
        (
            "Partch Otonality",
            &[
                0.0, 2.04, 3.86, 4.98, 7.02, 8.84, 10.88, 12.0, 14.04, 15.86, 16.98, 19.02, 20.84,
                22.88, 24.0, 26.0,
            ],
        ),
        (
            "Partch Utonality",
            &[
                0.0, 1.12, 3.16, 4.98, 7.02, 8.14, 9.96, 12.0, 13.12, 15.16, 16.98, 19.02, 20.14,
                21.96, 24.0, 25.12,
            ],
        ),
        (
            "Major",
            &[0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 11.0, 12.0, 14.0, 16.0, 17.0, 19.0, 21.0, 23.0, 24.0, 26.0],
        ),
        (
            "Minor",
            &[0.0, 2.0, 3.0, 5.0, 7.0, 8.0, 10.0, 12.0, 14.0, 15.0, 17.0, 19.0, 20.0, 22.0, 24.0, 26.0],
        ),
    ])
}

/// A random microtonal scale: 5 to 8 degrees, the root plus values in
/// `[0.8, 11.5)` kept more than half a semitone apart.
pub fn random_micro_scale(rng_state: &mut u64) -> ScaleDegreeSet {
    let count = 5 + rng::next_index(rng_state, 4);
    let mut degrees = vec![0.0];
    let mut attempts = 0;
    while degrees.len() < count && attempts < 10_000 {
        attempts += 1;
        let val = rng::next_range(rng_state, 0.8, 11.5);
        if degrees.iter().all(|d: &f64| (val - d).abs() > 0.5) {
            degrees.push(val);
        }
    }
    degrees.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let name = format!("Rnd Micro {}", 100 + rng::next_index(rng_state, 900));
    ScaleDegreeSet { name, degrees }
}
