use serde::{Deserialize, Serialize};

/// Number of pads along each edge of the grid.
pub const GRID_SIZE: u8 = 8;

/// Total number of grid cells.
pub const GRID_CELLS: usize = (GRID_SIZE as usize) * (GRID_SIZE as usize);

/// A pad on the 8x8 grid.
///
/// `x` counts columns from the left edge, `y` counts rows from the top edge.
/// Layouts that rise towards the top of the device use [`GridPosition::row_from_bottom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    x: u8,
    y: u8,
}

impl GridPosition {
    /// Returns `None` when either coordinate is off the grid.
    pub fn new(x: u8, y: u8) -> Option<Self> {
        if x < GRID_SIZE && y < GRID_SIZE {
            Some(Self { x, y })
        } else {
            None
        }
    }

    pub fn x(self) -> u8 {
        self.x
    }

    pub fn y(self) -> u8 {
        self.y
    }

    pub fn row_from_bottom(self) -> u8 {
        GRID_SIZE - 1 - self.y
    }

    /// Row-major index, 0 at the top-left pad.
    pub fn index(self) -> usize {
        self.y as usize * GRID_SIZE as usize + self.x as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        if index >= GRID_CELLS {
            return None;
        }
        let size = GRID_SIZE as usize;
        Some(Self {
            x: (index % size) as u8,
            y: (index / size) as u8,
        })
    }

    /// All 64 positions in row-major order.
    pub fn all() -> impl Iterator<Item = GridPosition> {
        (0..GRID_CELLS).filter_map(GridPosition::from_index)
    }
}

impl std::fmt::Display for GridPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_off_grid_coordinates() {
        assert!(GridPosition::new(8, 0).is_none());
        assert!(GridPosition::new(0, 8).is_none());
        assert!(GridPosition::new(7, 7).is_some());
    }

    #[test]
    fn index_is_row_major_from_top_left() {
        let pos = GridPosition::new(3, 2).unwrap();
        assert_eq!(pos.index(), 19);
        assert_eq!(GridPosition::from_index(19), Some(pos));
        assert_eq!(GridPosition::from_index(64), None);
    }

    #[test]
    fn row_from_bottom_flips_y() {
        assert_eq!(GridPosition::new(0, 0).unwrap().row_from_bottom(), 7);
        assert_eq!(GridPosition::new(0, 7).unwrap().row_from_bottom(), 0);
    }

    #[test]
    fn all_covers_every_cell_once() {
        let cells: Vec<_> = GridPosition::all().collect();
        assert_eq!(cells.len(), GRID_CELLS);
        assert_eq!(cells[0], GridPosition::new(0, 0).unwrap());
        assert_eq!(cells[63], GridPosition::new(7, 7).unwrap());
    }
}
