//! Global performance state and its mutation rules.
//!
//! Continuous quantities (octave, gain) clamp at their bounds; enumerations
//! (root, scale, effect modes) wrap. Every mutation marks the visual region it
//! affects so the renderer only rebuilds what changed.

/// Default octave bound in either direction.
pub const DEFAULT_OCTAVE_BOUND: i32 = 3;
/// Default master gain step.
pub const DEFAULT_GAIN_STEP: f64 = 0.05;

/// Area of the device whose LEDs depend on a piece of state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Grid,
    Top,
    Side,
}

/// Regions touched since the last render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyRegions {
    pub grid: bool,
    pub top: bool,
    pub side: bool,
}

impl DirtyRegions {
    pub fn all() -> Self {
        Self {
            grid: true,
            top: true,
            side: true,
        }
    }

    pub fn any(&self) -> bool {
        self.grid || self.top || self.side
    }

    pub fn contains(&self, region: Region) -> bool {
        match region {
            Region::Grid => self.grid,
            Region::Top => self.top,
            Region::Side => self.side,
        }
    }

    pub fn mark(&mut self, region: Region) {
        match region {
            Region::Grid => self.grid = true,
            Region::Top => self.top = true,
            Region::Side => self.side = true,
        }
    }

    pub fn merge(&mut self, other: DirtyRegions) {
        self.grid |= other.grid;
        self.top |= other.top;
        self.side |= other.side;
    }
}

/// Handle to an effect mode registered with [`ControllerState::add_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeId(usize);

/// Handle to a toggle registered with [`ControllerState::add_toggle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToggleId(usize);

#[derive(Debug, Clone)]
struct ModeSlot {
    name: &'static str,
    index: usize,
    count: usize,
    region: Region,
}

#[derive(Debug, Clone)]
struct ToggleSlot {
    name: &'static str,
    active: bool,
    group: Option<usize>,
    region: Region,
}

#[derive(Debug, Clone)]
pub struct ControllerState {
    root: i32,
    scale_index: usize,
    scale_count: usize,
    octave: i32,
    octave_bound: i32,
    gain: f64,
    gain_step: f64,
    modes: Vec<ModeSlot>,
    toggles: Vec<ToggleSlot>,
    group_count: usize,
    dirty: DirtyRegions,
}

impl ControllerState {
    /// `scale_count` is the length of the scale table the instrument cycles through.
    pub fn new(scale_count: usize) -> Self {
        Self {
            root: 0,
            scale_index: 0,
            scale_count: scale_count.max(1),
            octave: 0,
            octave_bound: DEFAULT_OCTAVE_BOUND,
            gain: 0.6,
            gain_step: DEFAULT_GAIN_STEP,
            modes: Vec::new(),
            toggles: Vec::new(),
            group_count: 0,
            dirty: DirtyRegions::all(),
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain.clamp(0.0, 1.0);
        self
    }

    pub fn with_root(mut self, root: i32) -> Self {
        self.root = root.rem_euclid(12);
        self
    }

    pub fn with_scale(mut self, index: usize) -> Self {
        self.scale_index = index % self.scale_count;
        self
    }

    pub fn with_octave_bound(mut self, bound: i32) -> Self {
        self.octave_bound = bound.abs();
        self.octave = self.octave.clamp(-self.octave_bound, self.octave_bound);
        self
    }

    /// Register an effect mode cycling through `count` values, starting at 0.
    pub fn add_mode(&mut self, name: &'static str, count: usize, region: Region) -> ModeId {
        self.modes.push(ModeSlot {
            name,
            index: 0,
            count: count.max(1),
            region,
        });
        ModeId(self.modes.len() - 1)
    }

    /// Register a boolean toggle, initially off.
    pub fn add_toggle(&mut self, name: &'static str, region: Region) -> ToggleId {
        self.toggles.push(ToggleSlot {
            name,
            active: false,
            group: None,
            region,
        });
        ToggleId(self.toggles.len() - 1)
    }

    /// Declare a mutual-exclusion group: at most one member may be active.
    pub fn add_exclusion_group(&mut self, members: &[ToggleId]) {
        let group = self.group_count;
        self.group_count += 1;
        for id in members {
            if let Some(slot) = self.toggles.get_mut(id.0) {
                slot.group = Some(group);
            }
        }
    }

    // ── Reads ─────────────────────────────────────────────────────

    pub fn root(&self) -> i32 {
        self.root
    }

    pub fn scale_index(&self) -> usize {
        self.scale_index
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn mode(&self, id: ModeId) -> usize {
        self.modes.get(id.0).map_or(0, |m| m.index)
    }

    pub fn mode_name(&self, id: ModeId) -> &'static str {
        self.modes.get(id.0).map_or("", |m| m.name)
    }

    pub fn is_active(&self, id: ToggleId) -> bool {
        self.toggles.get(id.0).is_some_and(|t| t.active)
    }

    pub fn toggle_name(&self, id: ToggleId) -> &'static str {
        self.toggles.get(id.0).map_or("", |t| t.name)
    }

    // ── Mutations ─────────────────────────────────────────────────

    pub fn cycle_scale(&mut self, delta: i32) -> usize {
        let count = self.scale_count as i64;
        self.scale_index = (self.scale_index as i64 + delta as i64).rem_euclid(count) as usize;
        self.dirty.mark(Region::Grid);
        self.dirty.mark(Region::Top);
        self.scale_index
    }

    pub fn shift_root(&mut self, delta: i32) -> i32 {
        self.root = (self.root + delta).rem_euclid(12);
        self.dirty.mark(Region::Grid);
        self.dirty.mark(Region::Top);
        self.root
    }

    /// Returns true when the octave actually moved.
    pub fn adjust_octave(&mut self, delta: i32) -> bool {
        let next = (self.octave + delta).clamp(-self.octave_bound, self.octave_bound);
        let moved = next != self.octave;
        self.octave = next;
        self.dirty.mark(Region::Grid);
        self.dirty.mark(Region::Side);
        moved
    }

    /// `steps` is a multiple of the configured gain step.
    pub fn adjust_gain(&mut self, steps: i32) -> f64 {
        self.gain = (self.gain + steps as f64 * self.gain_step).clamp(0.0, 1.0);
        // Keep the value on the step lattice so repeated presses reach the bounds exactly.
        self.gain = (self.gain / self.gain_step).round() * self.gain_step;
        self.dirty.mark(Region::Top);
        self.gain
    }

    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain.clamp(0.0, 1.0);
        self.dirty.mark(Region::Top);
    }

    /// Advance a mode by `delta`, wrapping. Returns the new index.
    pub fn cycle_mode(&mut self, id: ModeId, delta: i32) -> usize {
        let Some(slot) = self.modes.get_mut(id.0) else {
            return 0;
        };
        slot.index = (slot.index as i64 + delta as i64).rem_euclid(slot.count as i64) as usize;
        let (index, region) = (slot.index, slot.region);
        self.dirty.mark(region);
        index
    }

    pub fn set_mode(&mut self, id: ModeId, index: usize) {
        if let Some(slot) = self.modes.get_mut(id.0) {
            slot.index = index % slot.count;
            let region = slot.region;
            self.dirty.mark(region);
        }
    }

    /// Flip a toggle. Turning on a member of an exclusion group turns its
    /// siblings off in the same step. Returns the new state.
    pub fn toggle(&mut self, id: ToggleId) -> bool {
        let next = !self.is_active(id);
        self.set_toggle(id, next);
        next
    }

    pub fn set_toggle(&mut self, id: ToggleId, active: bool) {
        let Some(slot) = self.toggles.get(id.0) else {
            return;
        };
        let group = slot.group;
        if active {
            if let Some(group) = group {
                for (i, sibling) in self.toggles.iter_mut().enumerate() {
                    if i != id.0 && sibling.group == Some(group) && sibling.active {
                        sibling.active = false;
                        self.dirty.mark(sibling.region);
                    }
                }
            }
        }
        let slot = &mut self.toggles[id.0];
        slot.active = active;
        let region = slot.region;
        self.dirty.mark(region);
    }

    // ── Dirty tracking ────────────────────────────────────────────

    pub fn mark_dirty(&mut self, region: Region) {
        self.dirty.mark(region);
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty = DirtyRegions::all();
    }

    pub fn dirty(&self) -> DirtyRegions {
        self.dirty
    }

    /// Return and clear the dirty regions.
    pub fn take_dirty(&mut self) -> DirtyRegions {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_and_scale_wrap() {
        let mut s = ControllerState::new(3);
        assert_eq!(s.shift_root(-1), 11);
        assert_eq!(s.shift_root(2), 1);
        assert_eq!(s.cycle_scale(-1), 2);
        assert_eq!(s.cycle_scale(1), 0);
    }

    #[test]
    fn octave_clamps_at_bound() {
        let mut s = ControllerState::new(1);
        for _ in 0..5 {
            s.adjust_octave(1);
        }
        assert_eq!(s.octave(), 3);
        assert!(!s.adjust_octave(1));
        for _ in 0..10 {
            s.adjust_octave(-1);
        }
        assert_eq!(s.octave(), -3);
    }

    #[test]
    fn gain_clamps_to_unit_range() {
        let mut s = ControllerState::new(1).with_gain(0.9);
        for _ in 0..5 {
            s.adjust_gain(1);
        }
        assert_eq!(s.gain(), 1.0);
        for _ in 0..30 {
            s.adjust_gain(-1);
        }
        assert_eq!(s.gain(), 0.0);
    }

    #[test]
    fn mode_cycles_both_directions() {
        let mut s = ControllerState::new(1);
        let reverb = s.add_mode("reverb", 4, Region::Side);
        assert_eq!(s.cycle_mode(reverb, 1), 1);
        assert_eq!(s.cycle_mode(reverb, -2), 3);
        assert_eq!(s.cycle_mode(reverb, 1), 0);
        assert_eq!(s.mode_name(reverb), "reverb");
    }

    #[test]
    fn exclusion_group_turns_siblings_off() {
        let mut s = ControllerState::new(1);
        let up = s.add_toggle("ascending", Region::Side);
        let down = s.add_toggle("descending", Region::Side);
        let free = s.add_toggle("scan", Region::Side);
        s.add_exclusion_group(&[up, down]);

        s.toggle(free);
        assert!(s.toggle(up));
        assert!(s.toggle(down));
        assert!(!s.is_active(up));
        assert!(s.is_active(down));
        assert!(s.is_active(free));

        // Turning the active member off leaves the group empty.
        assert!(!s.toggle(down));
        assert!(!s.is_active(up) && !s.is_active(down));
    }

    #[test]
    fn mutations_mark_regions_dirty() {
        let mut s = ControllerState::new(2);
        s.take_dirty();
        assert!(!s.dirty().any());

        s.adjust_gain(1);
        let d = s.take_dirty();
        assert!(d.top && !d.grid && !d.side);

        s.cycle_scale(1);
        let d = s.take_dirty();
        assert!(d.grid && d.top);

        let arp = s.add_toggle("arp", Region::Side);
        s.toggle(arp);
        assert!(s.take_dirty().side);
    }
}
