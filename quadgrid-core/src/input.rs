//! Raw button identifier <-> logical zone mapping for both hardware generations.
//!
//! | generation | grid `(x,y)`          | side `i`          | top `i`     |
//! |------------|-----------------------|-------------------|-------------|
//! | Mk1        | `16*y + x`            | `16*i + 8`        | `200 + i`   |
//! | Mk2        | `(8-y)*10 + x + 1`    | `(8-i)*10 + 9`    | `104 + i`   |
//!
//! `y` counts from the top row on both generations.

use quadgrid_types::{Generation, GridPosition, LedTarget, LogicalEvent, CONTROL_COUNT};

const MK1_TOP_BASE: u16 = 200;
const MK2_TOP_BASE: u16 = 104;

/// Classify a raw identifier. Identifiers outside the generation's layout
/// come back as `Unrecognized`.
pub fn normalize(raw_id: u16, generation: Generation) -> LogicalEvent {
    match generation {
        Generation::Mk1 => normalize_mk1(raw_id),
        Generation::Mk2 => normalize_mk2(raw_id),
    }
}

fn normalize_mk1(raw_id: u16) -> LogicalEvent {
    if (MK1_TOP_BASE..MK1_TOP_BASE + CONTROL_COUNT as u16).contains(&raw_id) {
        return LogicalEvent::TopControl((raw_id - MK1_TOP_BASE) as u8);
    }
    if raw_id >= 128 {
        return LogicalEvent::Unrecognized(raw_id);
    }
    let (col, row) = ((raw_id % 16) as u8, (raw_id / 16) as u8);
    match col {
        0..=7 => GridPosition::new(col, row)
            .map(LogicalEvent::Grid)
            .unwrap_or(LogicalEvent::Unrecognized(raw_id)),
        8 => LogicalEvent::SideControl(row),
        _ => LogicalEvent::Unrecognized(raw_id),
    }
}

fn normalize_mk2(raw_id: u16) -> LogicalEvent {
    if (MK2_TOP_BASE..MK2_TOP_BASE + CONTROL_COUNT as u16).contains(&raw_id) {
        return LogicalEvent::TopControl((raw_id - MK2_TOP_BASE) as u8);
    }
    let (row, col) = (raw_id / 10, raw_id % 10);
    if !(1..=8).contains(&row) {
        return LogicalEvent::Unrecognized(raw_id);
    }
    let y = (8 - row) as u8;
    match col {
        1..=8 => GridPosition::new(col as u8 - 1, y)
            .map(LogicalEvent::Grid)
            .unwrap_or(LogicalEvent::Unrecognized(raw_id)),
        9 => LogicalEvent::SideControl(y),
        _ => LogicalEvent::Unrecognized(raw_id),
    }
}

/// The raw identifier a generation uses for an LED target.
pub fn raw_id(target: LedTarget, generation: Generation) -> u16 {
    match (generation, target) {
        (Generation::Mk1, LedTarget::Grid(pos)) => pos.y() as u16 * 16 + pos.x() as u16,
        (Generation::Mk1, LedTarget::Side(i)) => i as u16 * 16 + 8,
        (Generation::Mk1, LedTarget::Top(i)) => MK1_TOP_BASE + i as u16,
        (Generation::Mk2, LedTarget::Grid(pos)) => (8 - pos.y() as u16) * 10 + pos.x() as u16 + 1,
        (Generation::Mk2, LedTarget::Side(i)) => (8 - i as u16) * 10 + 9,
        (Generation::Mk2, LedTarget::Top(i)) => MK2_TOP_BASE + i as u16,
    }
}

/// Every LED target on the device: 64 pads, then the top row, then the side column.
pub fn all_targets() -> impl Iterator<Item = LedTarget> {
    GridPosition::all()
        .map(LedTarget::Grid)
        .chain((0..CONTROL_COUNT).map(LedTarget::Top))
        .chain((0..CONTROL_COUNT).map(LedTarget::Side))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(x: u8, y: u8) -> LogicalEvent {
        LogicalEvent::Grid(GridPosition::new(x, y).unwrap())
    }

    #[test]
    fn mk1_layout() {
        assert_eq!(normalize(0, Generation::Mk1), grid(0, 0));
        assert_eq!(normalize(16 * 7 + 7, Generation::Mk1), grid(7, 7));
        assert_eq!(normalize(8, Generation::Mk1), LogicalEvent::SideControl(0));
        assert_eq!(normalize(104, Generation::Mk1), LogicalEvent::SideControl(6));
        assert_eq!(normalize(120, Generation::Mk1), LogicalEvent::SideControl(7));
        assert_eq!(normalize(200, Generation::Mk1), LogicalEvent::TopControl(0));
        assert_eq!(normalize(207, Generation::Mk1), LogicalEvent::TopControl(7));
    }

    #[test]
    fn mk2_layout() {
        assert_eq!(normalize(81, Generation::Mk2), grid(0, 0));
        assert_eq!(normalize(18, Generation::Mk2), grid(7, 7));
        assert_eq!(normalize(11, Generation::Mk2), grid(0, 7));
        assert_eq!(normalize(89, Generation::Mk2), LogicalEvent::SideControl(0));
        assert_eq!(normalize(29, Generation::Mk2), LogicalEvent::SideControl(6));
        assert_eq!(normalize(19, Generation::Mk2), LogicalEvent::SideControl(7));
        assert_eq!(normalize(104, Generation::Mk2), LogicalEvent::TopControl(0));
        assert_eq!(normalize(111, Generation::Mk2), LogicalEvent::TopControl(7));
    }

    #[test]
    fn spurious_ids_are_unrecognized() {
        for id in [9u16, 15, 127, 128, 199, 208, 500, u16::MAX] {
            assert_eq!(normalize(id, Generation::Mk1), LogicalEvent::Unrecognized(id));
        }
        for id in [0u16, 5, 10, 20, 90, 99, 103, 112, u16::MAX] {
            assert_eq!(normalize(id, Generation::Mk2), LogicalEvent::Unrecognized(id));
        }
    }

    #[test]
    fn both_generations_agree_on_every_target() {
        for target in all_targets() {
            for gen in [Generation::Mk1, Generation::Mk2] {
                let event = normalize(raw_id(target, gen), gen);
                assert_eq!(event.led_target(), Some(target), "{:?} on {:?}", target, gen);
            }
        }
    }
}
