use std::time::{Duration, Instant};

use quadgrid_types::Region;

use crate::scheduler::{Outbox, ScheduledTask, TaskResult, IDLE_POLL};

use super::FieldInstrument;

/// Resolution of the agent timers.
pub const CLOCK_PERIOD: Duration = Duration::from_millis(2);
/// Pause between two staggered retunes.
pub const RETUNE_PERIOD: Duration = Duration::from_millis(100);
/// How long a triggered pad stays bright.
pub const FLASH: Duration = Duration::from_millis(100);

/// Fires every agent whose timer has elapsed.
pub struct AgentClockTask;

impl ScheduledTask<FieldInstrument> for AgentClockTask {
    fn name(&self) -> &str {
        "agent-clock"
    }

    fn tick(&mut self, field: &mut FieldInstrument, now: Instant, out: &mut Outbox<FieldInstrument>) -> TaskResult {
        let fired = field.trigger_due(now)?;
        if fired > 0 {
            out.defer("flash-decay", FLASH, |field: &mut FieldInstrument, _: Instant, _: &mut Outbox<FieldInstrument>| {
                field.controller.mark_dirty(Region::Grid);
                Ok(())
            });
        }
        Ok(CLOCK_PERIOD)
    }

    fn idle_period(&self) -> Duration {
        CLOCK_PERIOD
    }
}

/// Moves one outdated agent onto the current profile, scale and root.
pub struct RetuneTask;

impl ScheduledTask<FieldInstrument> for RetuneTask {
    fn name(&self) -> &str {
        "retune"
    }

    fn tick(&mut self, field: &mut FieldInstrument, _now: Instant, _out: &mut Outbox<FieldInstrument>) -> TaskResult {
        if let Some(pos) = field.retune_one()? {
            log::debug!(target: "field", "retuned agent at {}", pos);
        }
        Ok(RETUNE_PERIOD)
    }
}

/// Displaces a random active agent every half beat cycle while migration is on.
pub struct MigrationTask;

impl ScheduledTask<FieldInstrument> for MigrationTask {
    fn name(&self) -> &str {
        "migration"
    }

    fn tick(&mut self, field: &mut FieldInstrument, _now: Instant, _out: &mut Outbox<FieldInstrument>) -> TaskResult {
        if !field.migration_active() {
            return Ok(IDLE_POLL);
        }
        if let Some((from, to)) = field.migrate()? {
            log::info!(target: "field", "[MIGRATION] {} -> {}", from, to);
        }
        Ok(field.beat_time().mul_f64(0.5))
    }
}
