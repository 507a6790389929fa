//! Tempo-synced task scheduler.
//!
//! Every background process (arpeggiator, drum steps, agent clocks,
//! migration, scan cursor) is a named [`ScheduledTask`] that reports the
//! delay until its next tick. One-shot deferred actions (fade-outs, panic
//! reset, LED flash decay) share the same queue. The main loop steps the
//! scheduler once per iteration; nothing here sleeps or spawns threads.
//!
//! A task fault, returned or panicked, is logged at the task boundary and the
//! task is rescheduled at its idle period.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use quadgrid_audio::SynthError;

/// Poll interval of a task whose enabling condition does not hold.
pub const IDLE_POLL: Duration = Duration::from_millis(100);

/// Result of a task tick: the delay until the next tick.
pub type TaskResult<T = Duration> = Result<T, TaskError>;

/// Error raised inside a scheduled task or deferred action.
#[derive(Debug, Clone)]
pub struct TaskError(pub String);

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TaskError {}

impl From<SynthError> for TaskError {
    fn from(e: SynthError) -> Self {
        TaskError(format!("synth: {}", e))
    }
}

impl From<String> for TaskError {
    fn from(s: String) -> Self {
        TaskError(s)
    }
}

/// A one-shot action run against the context once its delay elapses.
pub type Deferred<C> = Box<dyn FnOnce(&mut C, Instant, &mut Outbox<C>) -> TaskResult<()>>;

/// A repeating process driven by the scheduler.
pub trait ScheduledTask<C> {
    fn name(&self) -> &str;

    /// Run one tick against `ctx`. Returns the delay until the next tick.
    fn tick(&mut self, ctx: &mut C, now: Instant, out: &mut Outbox<C>) -> TaskResult;

    /// Delay used after a fault.
    fn idle_period(&self) -> Duration {
        IDLE_POLL
    }
}

/// Requests collected while handling an event or running a tick, applied by
/// the owner of the scheduler afterwards.
pub struct Outbox<C> {
    deferred: Vec<(String, Duration, Deferred<C>)>,
    shutdown: bool,
}

impl<C> Default for Outbox<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Outbox<C> {
    pub fn new() -> Self {
        Self {
            deferred: Vec::new(),
            shutdown: false,
        }
    }

    /// Run `action` once, `delay` from now.
    pub fn defer<F>(&mut self, name: impl Into<String>, delay: Duration, action: F)
    where
        F: FnOnce(&mut C, Instant, &mut Outbox<C>) -> TaskResult<()> + 'static,
    {
        self.deferred.push((name.into(), delay, Box::new(action)));
    }

    /// Ask the control loop to stop after this iteration.
    pub fn request_shutdown(&mut self) {
        self.shutdown = true;
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }

    pub fn pending(&self) -> usize {
        self.deferred.len()
    }
}

/// Handle to a registered task or deferred action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// Snapshot of one scheduler entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub one_shot: bool,
    pub paused: bool,
    pub next_due: Instant,
    pub ticks: u64,
    pub faults: u64,
}

/// What one [`Scheduler::step`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub ran: usize,
    pub faults: usize,
    pub shutdown: bool,
}

struct RepeatingEntry<C> {
    id: TaskId,
    task: Box<dyn ScheduledTask<C>>,
    next_due: Instant,
    paused: bool,
    ticks: u64,
    faults: u64,
}

struct OneShotEntry<C> {
    id: TaskId,
    name: String,
    due: Instant,
    action: Deferred<C>,
}

pub struct Scheduler<C> {
    repeating: Vec<RepeatingEntry<C>>,
    one_shots: Vec<OneShotEntry<C>>,
    next_id: u64,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            repeating: Vec::new(),
            one_shots: Vec::new(),
            next_id: 0,
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Register a repeating task. Its first tick is due at `first_due`.
    pub fn register(&mut self, task: Box<dyn ScheduledTask<C>>, first_due: Instant) -> TaskId {
        let id = self.allocate_id();
        log::debug!(target: "scheduler", "registered {} as {:?}", task.name(), id);
        self.repeating.push(RepeatingEntry {
            id,
            task,
            next_due: first_due,
            paused: false,
            ticks: 0,
            faults: 0,
        });
        id
    }

    /// Queue a one-shot action due at `now + delay`.
    pub fn defer(&mut self, name: impl Into<String>, delay: Duration, action: Deferred<C>, now: Instant) -> TaskId {
        let id = self.allocate_id();
        self.one_shots.push(OneShotEntry {
            id,
            name: name.into(),
            due: now + delay,
            action,
        });
        id
    }

    /// Move everything an outbox collected into the queue. Returns whether
    /// shutdown was requested.
    pub fn absorb(&mut self, out: Outbox<C>, now: Instant) -> bool {
        for (name, delay, action) in out.deferred {
            self.defer(name, delay, action, now);
        }
        out.shutdown
    }

    pub fn pause(&mut self, id: TaskId) -> bool {
        match self.repeating.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.paused = true;
                true
            }
            None => false,
        }
    }

    /// Resume a paused task; its next tick is due immediately.
    pub fn resume(&mut self, id: TaskId, now: Instant) -> bool {
        match self.repeating.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                if entry.paused {
                    entry.paused = false;
                    entry.next_due = now;
                }
                true
            }
            None => false,
        }
    }

    /// Remove a task or pending one-shot.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.repeating.len() + self.one_shots.len();
        self.repeating.retain(|e| e.id != id);
        self.one_shots.retain(|e| e.id != id);
        before != self.repeating.len() + self.one_shots.len()
    }

    /// First registered task or pending one-shot with this name.
    pub fn find(&self, name: &str) -> Option<TaskId> {
        self.repeating
            .iter()
            .find(|e| e.task.name() == name)
            .map(|e| e.id)
            .or_else(|| self.one_shots.iter().find(|e| e.name == name).map(|e| e.id))
    }

    pub fn tasks(&self) -> Vec<TaskInfo> {
        let repeating = self.repeating.iter().map(|e| TaskInfo {
            id: e.id,
            name: e.task.name().to_string(),
            one_shot: false,
            paused: e.paused,
            next_due: e.next_due,
            ticks: e.ticks,
            faults: e.faults,
        });
        let one_shots = self.one_shots.iter().map(|e| TaskInfo {
            id: e.id,
            name: e.name.clone(),
            one_shot: true,
            paused: false,
            next_due: e.due,
            ticks: 0,
            faults: 0,
        });
        repeating.chain(one_shots).collect()
    }

    pub fn len(&self) -> usize {
        self.repeating.len() + self.one_shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every task and one-shot due at `now`, each at most once.
    pub fn step(&mut self, ctx: &mut C, now: Instant) -> StepReport {
        let mut report = StepReport::default();
        let mut out = Outbox::new();

        for entry in self.repeating.iter_mut() {
            if entry.paused || entry.next_due > now {
                continue;
            }
            report.ran += 1;
            entry.ticks += 1;
            let task = &mut entry.task;
            let result = catch_unwind(AssertUnwindSafe(|| task.tick(ctx, now, &mut out)));
            entry.next_due = match result {
                Ok(Ok(delay)) => {
                    // Keep the period anchored to the previous due time,
                    // re-anchoring only once a whole period was missed.
                    let anchored = entry.next_due + delay;
                    if anchored > now {
                        anchored
                    } else {
                        now + delay
                    }
                }
                Ok(Err(e)) => {
                    log::warn!(target: "scheduler", "task {} failed: {}", entry.task.name(), e);
                    entry.faults += 1;
                    report.faults += 1;
                    now + entry.task.idle_period()
                }
                Err(_) => {
                    log::warn!(target: "scheduler", "task {} panicked", entry.task.name());
                    entry.faults += 1;
                    report.faults += 1;
                    now + entry.task.idle_period()
                }
            };
        }

        let mut due = Vec::new();
        let mut idx = 0;
        while idx < self.one_shots.len() {
            if self.one_shots[idx].due <= now {
                due.push(self.one_shots.remove(idx));
            } else {
                idx += 1;
            }
        }
        for shot in due {
            report.ran += 1;
            let OneShotEntry { name, action, .. } = shot;
            let result = catch_unwind(AssertUnwindSafe(|| action(ctx, now, &mut out)));
            match result {
                Ok(Ok(())) => log::debug!(target: "scheduler", "ran {}", name),
                Ok(Err(e)) => {
                    log::warn!(target: "scheduler", "deferred {} failed: {}", name, e);
                    report.faults += 1;
                }
                Err(_) => {
                    log::warn!(target: "scheduler", "deferred {} panicked", name);
                    report.faults += 1;
                }
            }
        }

        report.shutdown = self.absorb(out, now);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Ctx {
        counter: u32,
        log: Vec<&'static str>,
    }

    struct Counter {
        period: Duration,
    }

    impl ScheduledTask<Ctx> for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn tick(&mut self, ctx: &mut Ctx, _now: Instant, _out: &mut Outbox<Ctx>) -> TaskResult {
            ctx.counter += 1;
            Ok(self.period)
        }
    }

    struct Faulty {
        panic: bool,
    }

    impl ScheduledTask<Ctx> for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }

        fn tick(&mut self, _ctx: &mut Ctx, _now: Instant, _out: &mut Outbox<Ctx>) -> TaskResult {
            if self.panic {
                panic!("tick blew up");
            }
            Err(TaskError("boom".to_string()))
        }
    }

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn task_runs_on_its_period() {
        let mut sched = Scheduler::new();
        let mut ctx = Ctx::default();
        let t0 = Instant::now();
        sched.register(Box::new(Counter { period: 10 * MS }), t0);

        sched.step(&mut ctx, t0);
        sched.step(&mut ctx, t0 + 5 * MS);
        assert_eq!(ctx.counter, 1);
        sched.step(&mut ctx, t0 + 10 * MS);
        assert_eq!(ctx.counter, 2);
    }

    #[test]
    fn late_steps_do_not_drift_the_period() {
        let mut sched = Scheduler::new();
        let mut ctx = Ctx::default();
        let t0 = Instant::now();
        sched.register(Box::new(Counter { period: 10 * MS }), t0);

        sched.step(&mut ctx, t0 + 3 * MS);
        sched.step(&mut ctx, t0 + 13 * MS);
        sched.step(&mut ctx, t0 + 20 * MS);
        assert_eq!(ctx.counter, 3);
        assert_eq!(sched.tasks()[0].next_due, t0 + 30 * MS);
    }

    #[test]
    fn missed_periods_reanchor_to_now() {
        let mut sched = Scheduler::new();
        let mut ctx = Ctx::default();
        let t0 = Instant::now();
        sched.register(Box::new(Counter { period: 10 * MS }), t0);

        sched.step(&mut ctx, t0);
        sched.step(&mut ctx, t0 + 45 * MS);
        assert_eq!(ctx.counter, 2);
        assert_eq!(sched.tasks()[0].next_due, t0 + 55 * MS);
        sched.step(&mut ctx, t0 + 50 * MS);
        assert_eq!(ctx.counter, 2);
    }

    #[test]
    fn pause_resume_and_cancel() {
        let mut sched = Scheduler::new();
        let mut ctx = Ctx::default();
        let t0 = Instant::now();
        let id = sched.register(Box::new(Counter { period: MS }), t0);

        assert!(sched.pause(id));
        sched.step(&mut ctx, t0 + 10 * MS);
        assert_eq!(ctx.counter, 0);
        assert!(sched.tasks()[0].paused);

        assert!(sched.resume(id, t0 + 10 * MS));
        sched.step(&mut ctx, t0 + 10 * MS);
        assert_eq!(ctx.counter, 1);

        assert!(sched.cancel(id));
        assert!(!sched.cancel(id));
        sched.step(&mut ctx, t0 + 20 * MS);
        assert_eq!(ctx.counter, 1);
        assert!(sched.is_empty());
    }

    #[test]
    fn faults_are_isolated_and_rescheduled() {
        let mut sched = Scheduler::new();
        let mut ctx = Ctx::default();
        let t0 = Instant::now();
        sched.register(Box::new(Faulty { panic: false }), t0);
        sched.register(Box::new(Faulty { panic: true }), t0);
        sched.register(Box::new(Counter { period: MS }), t0);

        let report = sched.step(&mut ctx, t0);
        assert_eq!(report.ran, 3);
        assert_eq!(report.faults, 2);
        assert_eq!(ctx.counter, 1);

        // Faulted tasks come back after the idle period.
        let report = sched.step(&mut ctx, t0 + IDLE_POLL);
        assert_eq!(report.faults, 2);
        let faulty: Vec<_> = sched.tasks().into_iter().filter(|t| t.name == "faulty").collect();
        assert!(faulty.iter().all(|t| t.faults == 2 && t.ticks == 2));
    }

    #[test]
    fn deferred_action_runs_once_after_delay() {
        let mut sched: Scheduler<Ctx> = Scheduler::new();
        let mut ctx = Ctx::default();
        let t0 = Instant::now();
        let mut out = Outbox::new();
        out.defer("fade", 4 * MS, |ctx: &mut Ctx, _, _| {
            ctx.log.push("fade");
            Ok(())
        });
        assert!(!sched.absorb(out, t0));
        assert!(sched.find("fade").is_some());

        sched.step(&mut ctx, t0 + 3 * MS);
        assert!(ctx.log.is_empty());
        sched.step(&mut ctx, t0 + 4 * MS);
        sched.step(&mut ctx, t0 + 8 * MS);
        assert_eq!(ctx.log, vec!["fade"]);
        assert!(sched.is_empty());
    }

    #[test]
    fn deferred_action_can_chain_and_request_shutdown() {
        let mut sched: Scheduler<Ctx> = Scheduler::new();
        let mut ctx = Ctx::default();
        let t0 = Instant::now();
        let mut out = Outbox::new();
        out.defer("first", MS, |ctx: &mut Ctx, _, out: &mut Outbox<Ctx>| {
            ctx.log.push("first");
            out.defer("second", MS, |ctx: &mut Ctx, _, out: &mut Outbox<Ctx>| {
                ctx.log.push("second");
                out.request_shutdown();
                Ok(())
            });
            Ok(())
        });
        sched.absorb(out, t0);

        assert!(!sched.step(&mut ctx, t0 + MS).shutdown);
        assert!(sched.step(&mut ctx, t0 + 2 * MS).shutdown);
        assert_eq!(ctx.log, vec!["first", "second"]);
    }

    #[test]
    fn cancelled_one_shot_never_runs() {
        let mut sched: Scheduler<Ctx> = Scheduler::new();
        let mut ctx = Ctx::default();
        let t0 = Instant::now();
        let id = sched.defer(
            "panic-reset",
            MS,
            Box::new(|ctx: &mut Ctx, _: Instant, _: &mut Outbox<Ctx>| {
                ctx.counter = 99;
                Ok(())
            }),
            t0,
        );
        assert!(sched.cancel(id));
        sched.step(&mut ctx, t0 + 10 * MS);
        assert_eq!(ctx.counter, 0);
    }
}
