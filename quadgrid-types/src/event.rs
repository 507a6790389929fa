use serde::{Deserialize, Serialize};

use crate::grid::GridPosition;

/// Number of buttons in the top control row and in the side control column.
pub const CONTROL_COUNT: u8 = 8;

/// Hardware family of the connected controller. Each family reports its
/// buttons with a different raw identifier layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Generation {
    /// Launchpad Mk1, S and Mini: red/green LEDs.
    Mk1,
    /// Launchpad Mk2: RGB LEDs.
    Mk2,
}

impl Generation {
    pub fn name(&self) -> &'static str {
        match self {
            Generation::Mk1 => "Mk1",
            Generation::Mk2 => "Mk2",
        }
    }
}

/// A raw button transition as reported by the hardware adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub id: u16,
    pub pressed: bool,
}

impl ButtonEvent {
    pub fn press(id: u16) -> Self {
        Self { id, pressed: true }
    }

    pub fn release(id: u16) -> Self {
        Self { id, pressed: false }
    }
}

/// Generation-independent classification of a raw button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalEvent {
    Grid(GridPosition),
    TopControl(u8),
    SideControl(u8),
    Unrecognized(u16),
}

/// A single LED on the device: a grid pad or one of the control buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LedTarget {
    Grid(GridPosition),
    Top(u8),
    Side(u8),
}

impl LogicalEvent {
    /// The LED that belongs to the button this event came from.
    pub fn led_target(&self) -> Option<LedTarget> {
        match *self {
            LogicalEvent::Grid(pos) => Some(LedTarget::Grid(pos)),
            LogicalEvent::TopControl(i) => Some(LedTarget::Top(i)),
            LogicalEvent::SideControl(i) => Some(LedTarget::Side(i)),
            LogicalEvent::Unrecognized(_) => None,
        }
    }
}
