//! Hardware adapter trait: the boundary to the physical button grid.
//!
//! `HardwareAdapter` exposes what the control layer needs from a device
//! (pull one button transition, light one LED, bracket the session) and hides
//! how it's done. Each Launchpad generation carries its own identifier layout
//! and color depth behind the same calls.

pub mod launchpad;

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use quadgrid_types::{ButtonEvent, ColorCapability, Generation, LedTarget};

use crate::input;

/// Result type for hardware operations.
pub type HardwareResult<T = ()> = Result<T, HardwareError>;

/// Error from a hardware operation.
#[derive(Debug, Clone)]
pub struct HardwareError(pub String);

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HardwareError {}

impl From<String> for HardwareError {
    fn from(s: String) -> Self {
        HardwareError(s)
    }
}

impl From<std::io::Error> for HardwareError {
    fn from(e: std::io::Error) -> Self {
        HardwareError(e.to_string())
    }
}

/// The color depth each generation drives.
pub fn capability_for(generation: Generation) -> ColorCapability {
    match generation {
        Generation::Mk1 => ColorCapability::RED_GREEN,
        Generation::Mk2 => ColorCapability::RGB,
    }
}

/// A button grid with LED feedback. Not safe for concurrent use: callers
/// serialize access behind one mutex.
pub trait HardwareAdapter: Send {
    fn generation(&self) -> Generation;

    fn capability(&self) -> ColorCapability {
        capability_for(self.generation())
    }

    /// Next pending button transition. Never blocks; `None` means nothing
    /// happened since the last poll.
    fn poll_event(&mut self) -> Option<ButtonEvent>;

    /// Light one LED. `components` holds `capability().channels` levels.
    fn set_color(&mut self, id: u16, components: &[u8]) -> HardwareResult;

    /// Turn every LED off and return the device to its default layout.
    fn reset(&mut self) -> HardwareResult;

    fn close(&mut self);
}

// ─── Test Hardware ──────────────────────────────────────────────────

/// An operation recorded by `TestHardware`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareOp {
    SetColor { id: u16, components: Vec<u8> },
    Reset,
    Close,
}

/// Scripted adapter for tests: button events are queued up front and every
/// write is recorded. Interior mutability keeps it `Sync` so tests can hold
/// an `Arc` while the control loop owns a [`SharedTestHardware`].
pub struct TestHardware {
    generation: Generation,
    events: Mutex<VecDeque<ButtonEvent>>,
    ops: Mutex<Vec<HardwareOp>>,
    failing: Mutex<bool>,
}

impl TestHardware {
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            events: Mutex::new(VecDeque::new()),
            ops: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    pub fn push_event(&self, event: ButtonEvent) {
        self.events.lock().unwrap().push_back(event);
    }

    /// Queue a press of the button behind `target`, using this generation's layout.
    pub fn press(&self, target: LedTarget) {
        self.push_event(ButtonEvent::press(input::raw_id(target, self.generation)));
    }

    pub fn release(&self, target: LedTarget) {
        self.push_event(ButtonEvent::release(input::raw_id(target, self.generation)));
    }

    pub fn pending_events(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Make subsequent LED writes fail (still recorded).
    pub fn fail_writes(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn operations(&self) -> Vec<HardwareOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    pub fn count<F: Fn(&HardwareOp) -> bool>(&self, f: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| f(op)).count()
    }

    pub fn write_count(&self) -> usize {
        self.count(|op| matches!(op, HardwareOp::SetColor { .. }))
    }

    /// Most recent components written to `target`.
    pub fn last_color(&self, target: LedTarget) -> Option<Vec<u8>> {
        let id = input::raw_id(target, self.generation);
        self.ops.lock().unwrap().iter().rev().find_map(|op| match op {
            HardwareOp::SetColor { id: i, components } if *i == id => Some(components.clone()),
            _ => None,
        })
    }

    fn record(&self, op: HardwareOp) {
        self.ops.lock().unwrap().push(op);
    }
}

impl HardwareAdapter for TestHardware {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn poll_event(&mut self) -> Option<ButtonEvent> {
        self.events.lock().unwrap().pop_front()
    }

    fn set_color(&mut self, id: u16, components: &[u8]) -> HardwareResult {
        self.record(HardwareOp::SetColor {
            id,
            components: components.to_vec(),
        });
        if *self.failing.lock().unwrap() {
            return Err(HardwareError("test hardware write failure".to_string()));
        }
        Ok(())
    }

    fn reset(&mut self) -> HardwareResult {
        self.record(HardwareOp::Reset);
        Ok(())
    }

    fn close(&mut self) {
        self.record(HardwareOp::Close);
    }
}

/// Wraps `Arc<TestHardware>` so the control loop can own a boxed adapter
/// while the test keeps a handle for scripting and assertions.
pub struct SharedTestHardware(pub Arc<TestHardware>);

impl HardwareAdapter for SharedTestHardware {
    fn generation(&self) -> Generation {
        self.0.generation
    }

    fn poll_event(&mut self) -> Option<ButtonEvent> {
        self.0.events.lock().unwrap().pop_front()
    }

    fn set_color(&mut self, id: u16, components: &[u8]) -> HardwareResult {
        self.0.record(HardwareOp::SetColor {
            id,
            components: components.to_vec(),
        });
        if *self.0.failing.lock().unwrap() {
            return Err(HardwareError("test hardware write failure".to_string()));
        }
        Ok(())
    }

    fn reset(&mut self) -> HardwareResult {
        self.0.record(HardwareOp::Reset);
        Ok(())
    }

    fn close(&mut self) {
        self.0.record(HardwareOp::Close);
    }
}

// ─── Null Hardware ──────────────────────────────────────────────────

/// No device: never reports a button, accepts every write.
pub struct NullHardware {
    pub generation: Generation,
}

impl HardwareAdapter for NullHardware {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn poll_event(&mut self) -> Option<ButtonEvent> {
        None
    }

    fn set_color(&mut self, _id: u16, _components: &[u8]) -> HardwareResult {
        Ok(())
    }

    fn reset(&mut self) -> HardwareResult {
        Ok(())
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadgrid_types::GridPosition;

    #[test]
    fn test_hardware_replays_events_in_order() {
        let mut hw = TestHardware::new(Generation::Mk2);
        let pad = LedTarget::Grid(GridPosition::new(2, 5).unwrap());
        hw.press(pad);
        hw.release(pad);
        assert_eq!(hw.pending_events(), 2);
        assert_eq!(hw.poll_event(), Some(ButtonEvent::press(33)));
        assert_eq!(hw.poll_event(), Some(ButtonEvent::release(33)));
        assert_eq!(hw.poll_event(), None);
    }

    #[test]
    fn failing_writes_are_recorded() {
        let mut hw = TestHardware::new(Generation::Mk1);
        hw.fail_writes(true);
        assert!(hw.set_color(0, &[3, 0]).is_err());
        assert_eq!(hw.write_count(), 1);
        assert_eq!(hw.capability(), ColorCapability::RED_GREEN);
    }

    #[test]
    fn last_color_tracks_latest_write() {
        let shared = Arc::new(TestHardware::new(Generation::Mk1));
        let mut adapter = SharedTestHardware(Arc::clone(&shared));
        adapter.set_color(8, &[1, 0]).unwrap();
        adapter.set_color(8, &[0, 3]).unwrap();
        assert_eq!(shared.last_color(LedTarget::Side(0)), Some(vec![0, 3]));
        assert_eq!(shared.last_color(LedTarget::Side(1)), None);
    }
}
