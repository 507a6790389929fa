//! Pure pitch and panning math.

use quadgrid_types::{GridPosition, ScaleDegreeSet, GRID_SIZE};

/// Maximum distance, in semitones, at which a pitch snaps to a scale degree.
pub const SNAP_THRESHOLD: f64 = 0.5;

/// Snap `raw` to the nearest degree of `scale` above `root`.
///
/// Pitches further than [`SNAP_THRESHOLD`] from every degree pass through
/// unchanged.
pub fn quantize_pitch(raw: f64, scale: &ScaleDegreeSet, root: i32) -> f64 {
    let relative = (raw - root as f64).rem_euclid(12.0);
    let (degree, distance) = scale.closest_degree(relative);
    if distance < SNAP_THRESHOLD {
        raw - relative + degree
    } else {
        raw
    }
}

/// Whether `raw` lies within snapping distance of a scale degree.
pub fn is_in_scale(raw: f64, scale: &ScaleDegreeSet, root: i32) -> bool {
    let relative = (raw - root as f64).rem_euclid(12.0);
    scale.closest_degree(relative).1 < SNAP_THRESHOLD
}

/// Whether `raw` snaps to the root degree.
pub fn is_root(raw: f64, scale: &ScaleDegreeSet, root: i32) -> bool {
    let relative = (raw - root as f64).rem_euclid(12.0);
    let (degree, distance) = scale.closest_degree(relative);
    distance < SNAP_THRESHOLD && degree.abs() < 0.1
}

/// Bilinear corner weights `[TL, TR, BL, BR]` for a position on a
/// `width` x `height` field. `y` counts from the top edge.
pub fn compute_quad_gains(x: f64, y: f64, width: u32, height: u32) -> [f64; 4] {
    let nx = if width > 1 { (x / (width - 1) as f64).clamp(0.0, 1.0) } else { 0.0 };
    let ny = if height > 1 { (y / (height - 1) as f64).clamp(0.0, 1.0) } else { 0.0 };
    [
        (1.0 - nx) * (1.0 - ny),
        nx * (1.0 - ny),
        (1.0 - nx) * ny,
        nx * ny,
    ]
}

/// Quad gains for a pad on the 8x8 grid.
pub fn grid_gains(pos: GridPosition) -> [f64; 4] {
    compute_quad_gains(
        pos.x() as f64,
        pos.y() as f64,
        GRID_SIZE as u32,
        GRID_SIZE as u32,
    )
}

/// Equal-tempered frequency of a (possibly fractional) MIDI pitch, A4 = 440 Hz.
pub fn midi_to_hz(pitch: f64) -> f64 {
    440.0 * 2f64.powf((pitch - 69.0) / 12.0)
}

/// Frequency `semitones` above `base_hz`.
pub fn degree_frequency(base_hz: f64, semitones: f64) -> f64 {
    base_hz * 2f64.powf(semitones / 12.0)
}

/// Narrow a gain vector for the synth interface.
pub fn gains_f32(gains: [f64; 4]) -> [f32; 4] {
    gains.map(|g| g as f32)
}
