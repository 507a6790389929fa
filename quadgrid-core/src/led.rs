//! LED feedback: desired frame, last-written cache and the writer thread.
//!
//! The main loop builds an [`LedFrame`] and hands it to [`LedRenderer`],
//! which diffs it against the cache and queues only the changed LEDs. The
//! `led-writer` thread drains the queue and takes the hardware lock once per
//! write, so a full-grid refresh never stalls input polling.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use quadgrid_types::{
    ColorCapability, DirtyRegions, Generation, GridPosition, LedColor, LedComponents, LedTarget,
    Region, CONTROL_COUNT, GRID_CELLS,
};

use crate::hardware::HardwareAdapter;
use crate::input;

/// Default capacity of the LED write queue. Holds a full refresh with room to spare.
pub const LED_QUEUE_CAPACITY: usize = 256;

/// Shared handle to the one hardware adapter.
pub type SharedHardware = Arc<Mutex<Box<dyn HardwareAdapter>>>;

/// Lock the adapter, recovering from a panic on another thread.
pub fn lock_hardware(hardware: &SharedHardware) -> MutexGuard<'_, Box<dyn HardwareAdapter>> {
    hardware.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Desired color of every LED for one render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LedFrame {
    grid: [LedColor; GRID_CELLS],
    top: [LedColor; CONTROL_COUNT as usize],
    side: [LedColor; CONTROL_COUNT as usize],
}

impl Default for LedFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl LedFrame {
    /// All LEDs off.
    pub fn new() -> Self {
        Self {
            grid: [LedColor::OFF; GRID_CELLS],
            top: [LedColor::OFF; CONTROL_COUNT as usize],
            side: [LedColor::OFF; CONTROL_COUNT as usize],
        }
    }

    pub fn set(&mut self, target: LedTarget, color: LedColor) {
        match target {
            LedTarget::Grid(pos) => self.grid[pos.index()] = color,
            LedTarget::Top(i) => {
                if let Some(slot) = self.top.get_mut(i as usize) {
                    *slot = color;
                }
            }
            LedTarget::Side(i) => {
                if let Some(slot) = self.side.get_mut(i as usize) {
                    *slot = color;
                }
            }
        }
    }

    pub fn get(&self, target: LedTarget) -> LedColor {
        match target {
            LedTarget::Grid(pos) => self.grid[pos.index()],
            LedTarget::Top(i) => self.top.get(i as usize).copied().unwrap_or_default(),
            LedTarget::Side(i) => self.side.get(i as usize).copied().unwrap_or_default(),
        }
    }

    pub fn set_grid(&mut self, pos: GridPosition, color: LedColor) {
        self.grid[pos.index()] = color;
    }

    pub fn set_top(&mut self, index: u8, color: LedColor) {
        self.set(LedTarget::Top(index), color);
    }

    pub fn set_side(&mut self, index: u8, color: LedColor) {
        self.set(LedTarget::Side(index), color);
    }

    /// Every target with its color, grid first.
    pub fn iter(&self) -> impl Iterator<Item = (LedTarget, LedColor)> + '_ {
        input::all_targets().map(move |t| (t, self.get(t)))
    }
}

fn region_of(target: LedTarget) -> Region {
    match target {
        LedTarget::Grid(_) => Region::Grid,
        LedTarget::Top(_) => Region::Top,
        LedTarget::Side(_) => Region::Side,
    }
}

/// Last components written per LED.
#[derive(Debug, Default)]
pub struct LedCache {
    written: HashMap<LedTarget, LedComponents>,
}

impl LedCache {
    pub fn get(&self, target: LedTarget) -> Option<LedComponents> {
        self.written.get(&target).copied()
    }

    pub fn insert(&mut self, target: LedTarget, components: LedComponents) {
        self.written.insert(target, components);
    }

    /// Forget one LED so the next render rewrites it.
    pub fn invalidate(&mut self, target: LedTarget) {
        self.written.remove(&target);
    }

    pub fn clear(&mut self) {
        self.written.clear();
    }

    pub fn len(&self) -> usize {
        self.written.len()
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}

enum LedCommand {
    Write {
        target: LedTarget,
        id: u16,
        components: LedComponents,
    },
    Sync(Sender<()>),
}

pub struct LedRenderer {
    generation: Generation,
    capability: ColorCapability,
    cache: LedCache,
    tx: Option<Sender<LedCommand>>,
    failures: Receiver<LedTarget>,
    /// Regions holding deferred or failed writes.
    stale: DirtyRegions,
    writer: Option<JoinHandle<()>>,
}

impl LedRenderer {
    /// Start the writer thread for `hardware`.
    pub fn spawn(hardware: SharedHardware, capacity: usize) -> io::Result<Self> {
        let (generation, capability) = {
            let hw = lock_hardware(&hardware);
            (hw.generation(), hw.capability())
        };
        let (tx, rx) = crossbeam_channel::bounded::<LedCommand>(capacity.max(1));
        let (fail_tx, fail_rx) = crossbeam_channel::unbounded::<LedTarget>();

        let writer = thread::Builder::new()
            .name("led-writer".into())
            .spawn(move || {
                for command in rx.iter() {
                    match command {
                        LedCommand::Write {
                            target,
                            id,
                            components,
                        } => {
                            let result = {
                                let mut hw = lock_hardware(&hardware);
                                hw.set_color(id, capability.slice(&components))
                            };
                            if let Err(e) = result {
                                log::warn!(target: "led", "write to {:?} failed: {}", target, e);
                                if fail_tx.send(target).is_err() {
                                    log::debug!(target: "led", "renderer gone, dropping failure of {:?}", target);
                                }
                            }
                        }
                        LedCommand::Sync(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })?;

        Ok(Self {
            generation,
            capability,
            cache: LedCache::default(),
            tx: Some(tx),
            failures: fail_rx,
            stale: DirtyRegions::default(),
            writer: Some(writer),
        })
    }

    pub fn capability(&self) -> ColorCapability {
        self.capability
    }

    pub fn cache(&self) -> &LedCache {
        &self.cache
    }

    /// Diff every LED of `frame` against the cache. Returns the number of
    /// writes queued.
    pub fn render(&mut self, frame: &LedFrame) -> usize {
        self.render_regions(frame, DirtyRegions::all())
    }

    /// Like [`render`](Self::render), limited to the given regions plus any
    /// region still owed a deferred or failed write.
    pub fn render_regions(&mut self, frame: &LedFrame, mut regions: DirtyRegions) -> usize {
        self.absorb_failures();
        let Some(tx) = self.tx.as_ref() else {
            return 0;
        };
        regions.merge(std::mem::take(&mut self.stale));

        let mut queued = 0;
        for (target, color) in frame.iter() {
            if !regions.contains(region_of(target)) {
                continue;
            }
            let components = self.capability.encode(color);
            if self.cache.get(target) == Some(components) {
                continue;
            }
            let command = LedCommand::Write {
                target,
                id: input::raw_id(target, self.generation),
                components,
            };
            match tx.try_send(command) {
                Ok(()) => {
                    self.cache.insert(target, components);
                    queued += 1;
                }
                Err(TrySendError::Full(_)) => {
                    log::debug!(target: "led", "write queue full, deferring {:?}", target);
                    self.stale.mark(region_of(target));
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::warn!(target: "led", "writer thread gone");
                    break;
                }
            }
        }
        queued
    }

    /// Regions that need another render even if the frame did not change.
    pub fn pending_regions(&mut self) -> DirtyRegions {
        self.absorb_failures();
        self.stale
    }

    /// Forget everything written, e.g. after a hardware reset.
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
        self.stale = DirtyRegions::all();
    }

    /// Block until every write queued so far has reached the adapter.
    pub fn sync(&mut self, timeout: Duration) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if tx.send_timeout(LedCommand::Sync(ack_tx), timeout).is_err() {
            return false;
        }
        let ok = ack_rx.recv_timeout(timeout).is_ok();
        self.absorb_failures();
        ok
    }

    /// Stop the writer thread after it drains the queue.
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.writer.take() {
            if handle.join().is_err() {
                log::warn!(target: "led", "writer thread panicked");
            }
        }
    }

    fn absorb_failures(&mut self) {
        loop {
            match self.failures.try_recv() {
                Ok(target) => {
                    self.cache.invalidate(target);
                    self.stale.mark(region_of(target));
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }
}

impl Drop for LedRenderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{SharedTestHardware, TestHardware};

    const WAIT: Duration = Duration::from_secs(2);

    fn renderer(generation: Generation) -> (Arc<TestHardware>, LedRenderer) {
        let test_hw = Arc::new(TestHardware::new(generation));
        let boxed: Box<dyn HardwareAdapter> = Box::new(SharedTestHardware(Arc::clone(&test_hw)));
        let renderer = LedRenderer::spawn(Arc::new(Mutex::new(boxed)), LED_QUEUE_CAPACITY).unwrap();
        (test_hw, renderer)
    }

    fn pad(x: u8, y: u8) -> GridPosition {
        GridPosition::new(x, y).unwrap()
    }

    #[test]
    fn unchanged_frame_writes_nothing_the_second_time() {
        let (hw, mut r) = renderer(Generation::Mk2);
        let mut frame = LedFrame::new();
        frame.set_grid(pad(1, 1), LedColor::GREEN);
        frame.set_side(3, LedColor::RED);

        assert_eq!(r.render(&frame), 80);
        assert!(r.sync(WAIT));
        let first = hw.write_count();
        assert_eq!(first, 80);

        assert_eq!(r.render(&frame), 0);
        assert!(r.sync(WAIT));
        assert_eq!(hw.write_count(), first);
    }

    #[test]
    fn only_changed_leds_are_written() {
        let (hw, mut r) = renderer(Generation::Mk1);
        let mut frame = LedFrame::new();
        r.render(&frame);
        r.sync(WAIT);
        hw.clear();

        frame.set_grid(pad(0, 0), LedColor::AMBER);
        assert_eq!(r.render(&frame), 1);
        r.sync(WAIT);
        assert_eq!(hw.last_color(LedTarget::Grid(pad(0, 0))), Some(vec![3, 3]));
    }

    #[test]
    fn regions_limit_the_diff() {
        let (_hw, mut r) = renderer(Generation::Mk2);
        let mut frame = LedFrame::new();
        frame.set_top(0, LedColor::GREEN);
        frame.set_grid(pad(4, 4), LedColor::WHITE);
        let top_only = DirtyRegions {
            top: true,
            ..DirtyRegions::default()
        };
        assert_eq!(r.render_regions(&frame, top_only), 8);
        assert_eq!(r.cache().len(), 8);
    }

    #[test]
    fn failed_write_is_retried_on_next_render() {
        let (hw, mut r) = renderer(Generation::Mk2);
        let mut frame = LedFrame::new();
        frame.set_side(0, LedColor::BLUE);

        hw.fail_writes(true);
        r.render(&frame);
        assert!(r.sync(WAIT));
        assert_eq!(r.cache().len(), 0);

        hw.fail_writes(false);
        hw.clear();
        assert_eq!(r.render(&frame), 80);
    }

    #[test]
    fn failed_region_is_rendered_without_being_dirty() {
        let (hw, mut r) = renderer(Generation::Mk2);
        let mut frame = LedFrame::new();
        r.render(&frame);
        assert!(r.sync(WAIT));

        frame.set_grid(pad(2, 6), LedColor::GREEN);
        hw.fail_writes(true);
        let grid_only = DirtyRegions {
            grid: true,
            ..DirtyRegions::default()
        };
        assert_eq!(r.render_regions(&frame, grid_only), 1);
        assert!(r.sync(WAIT));
        assert_eq!(r.pending_regions(), grid_only);

        hw.fail_writes(false);
        hw.clear();
        assert_eq!(r.render_regions(&frame, DirtyRegions::default()), 1);
        assert!(r.sync(WAIT));
        assert_eq!(hw.last_color(LedTarget::Grid(pad(2, 6))), Some(vec![0, 63, 0]));
        assert!(!r.pending_regions().any());
    }

    #[test]
    fn invalidate_all_forces_full_rewrite() {
        let (_hw, mut r) = renderer(Generation::Mk2);
        let frame = LedFrame::new();
        r.render(&frame);
        r.invalidate_all();
        assert_eq!(r.render(&frame), 80);
    }
}
