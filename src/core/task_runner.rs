//! The task runner: admission, the stepping thread, and lifecycle bookkeeping.
//!
//! All mutable state lives in [`RunnerCore`] behind one `parking_lot::Mutex`.
//! The stepping thread makes every scheduling decision under that lock but
//! releases it fairly while a task's `step` runs, so a step may call back into
//! the runner. Admissions and cancellations take effect at step boundaries.
//! Callbacks are queued to the notifier thread and never run under the lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::unbounded;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::config::RunnerConfig;
use crate::core::error::{SchedulerError, TaskError};
use crate::core::interval::Interval;
use crate::core::notifier::{spawn_notifier, Notification, NotificationSender};
use crate::core::schedule::{BackgroundEvent, Chunk, Event, EventType, Schedule};
use crate::core::scheduler::{BackgroundSpec, Scheduler, SchedulerFactory};
use crate::core::status::{
    History, HistoryEntry, PendingEvent, RunnerCounters, RunnerStats, RunnerStatus,
};
use crate::core::task::{Disposition, TaskRef};
use crate::util::clock::{Clock, Deadline};

/// Task currently owning the stepping thread.
#[derive(Debug)]
struct Running {
    task: TaskRef,
    /// `None` when running early or as an overrunner.
    chunk: Option<Chunk>,
    deadline: Deadline,
    unaccounted: u64,
    last_flush: Deadline,
}

/// Runner state guarded by the runner lock.
pub(crate) struct RunnerCore {
    config: RunnerConfig,
    clock: Arc<dyn Clock>,
    factory: Arc<dyn SchedulerFactory>,
    /// Scheduler behind the current schedule, kept for hints.
    scheduler: Option<Box<dyn Scheduler>>,
    accepted: Vec<TaskRef>,
    schedule: Schedule,
    overrun: BTreeMap<(Deadline, u64), TaskRef>,
    background: Vec<TaskRef>,
    background_load: f64,
    running: Option<Running>,
    next_wake: Deadline,
    last_cleanup: Option<Deadline>,
    history: History,
    counters: Arc<RunnerCounters>,
    sched_seq: u64,
    reschedule: bool,
    notify_tx: Option<NotificationSender>,
}

impl RunnerCore {
    pub(crate) fn new(
        config: RunnerConfig,
        clock: Arc<dyn Clock>,
        factory: Arc<dyn SchedulerFactory>,
        counters: Arc<RunnerCounters>,
        notify_tx: Option<NotificationSender>,
    ) -> Self {
        let history = History::new(config.history_size);
        Self {
            config,
            clock,
            factory,
            scheduler: None,
            accepted: Vec::new(),
            schedule: Schedule::default(),
            overrun: BTreeMap::new(),
            background: Vec::new(),
            background_load: 0.0,
            running: None,
            next_wake: Deadline::NEVER,
            last_cleanup: None,
            history,
            counters,
            sched_seq: 0,
            reschedule: false,
            notify_tx,
        }
    }

    fn is_known(&self, task: &TaskRef) -> bool {
        self.accepted.iter().any(|t| t.id() == task.id())
    }

    // ---- admission ----

    /// Try to admit `task`, dropping started tasks if cleanup is allowed.
    pub(crate) fn schedule_task(&mut self, task: &TaskRef) -> bool {
        RunnerCounters::bump(&self.counters.submitted);
        if task.is_finished() || task.is_accepted() || self.is_known(task) {
            warn!(task = %task, "task already submitted or finished");
            RunnerCounters::bump(&self.counters.refused);
            return false;
        }
        self.remove_expired_tasks();

        let mut candidates = self.accepted.clone();
        candidates.push(task.clone());
        let mut scheduler = self.factory.create_scheduler();
        if let Some(schedule) = scheduler.create_schedule(&candidates) {
            self.commit(scheduler, schedule, candidates, Vec::new());
            return true;
        }
        if self.cleanup(task) {
            return true;
        }
        warn!(task = %task, accepted = self.accepted.len(), "task refused: no feasible schedule");
        RunnerCounters::bump(&self.counters.refused);
        false
    }

    /// Check admission without committing anything.
    pub(crate) fn is_schedulable(&self, task: &TaskRef) -> bool {
        if task.is_finished() || self.is_known(task) {
            return false;
        }
        let now = self.clock.now();
        let mut candidates: Vec<TaskRef> = self
            .accepted
            .iter()
            .filter(|t| !t.latest_finish().expired_at(now))
            .cloned()
            .collect();
        candidates.push(task.clone());
        self.factory
            .create_scheduler()
            .create_schedule(&candidates)
            .is_some()
    }

    fn remove_expired_tasks(&mut self) {
        let now = self.clock.now();
        let expired: Vec<TaskRef> = self
            .accepted
            .iter()
            .filter(|t| t.latest_finish().expired_at(now))
            .cloned()
            .collect();
        for task in expired {
            if task.is_background() && task.is_started() {
                self.finalize(&task, Disposition::Completed, None);
            } else {
                self.finalize(&task, Disposition::Expired, Some(TaskError::Timeout));
            }
        }
    }

    fn cleanup_allowed(&self, now: Deadline) -> bool {
        self.config.drop_task_max > 0
            && self
                .last_cleanup
                .is_none_or(|last| now.since(last) >= self.config.min_cleanup_interval_ms)
    }

    /// Drop started tasks one at a time until `task` fits or the drop budget
    /// runs out. Nothing changes unless a schedule is found.
    fn cleanup(&mut self, task: &TaskRef) -> bool {
        let now = self.clock.now();
        if !self.cleanup_allowed(now) {
            debug!(task = %task, "cleanup skipped");
            return false;
        }
        self.last_cleanup = Some(now);

        let mut candidates = self.accepted.clone();
        let mut dropped: Vec<TaskRef> = Vec::new();
        while dropped.len() < self.config.drop_task_max {
            let Some(victim) = self.find_droppable(&candidates, now) else {
                debug!(task = %task, dropped = dropped.len(), "nothing left to drop");
                break;
            };
            candidates.retain(|t| t.id() != victim.id());
            debug!(victim = %victim, "retrying admission without task");
            dropped.push(victim);

            let mut attempt = candidates.clone();
            attempt.push(task.clone());
            let mut scheduler = self.factory.create_scheduler();
            if let Some(schedule) = scheduler.create_schedule(&attempt) {
                self.commit(scheduler, schedule, attempt, dropped);
                return true;
            }
        }
        false
    }

    /// First chunk in schedule order whose task is a candidate and has
    /// already started its window.
    fn find_droppable(&self, candidates: &[TaskRef], now: Deadline) -> Option<TaskRef> {
        self.schedule
            .chunks()
            .map(Chunk::task)
            .find(|t| {
                t.earliest_start().expired_at(now) && candidates.iter().any(|c| c.id() == t.id())
            })
            .cloned()
    }

    fn commit(
        &mut self,
        scheduler: Box<dyn Scheduler>,
        schedule: Schedule,
        tasks: Vec<TaskRef>,
        dropped: Vec<TaskRef>,
    ) {
        let now = self.clock.now();
        for task in &tasks {
            if task.accept(self.sched_seq + 1, now) {
                self.sched_seq += 1;
                RunnerCounters::bump(&self.counters.accepted);
                info!(task = %task, sched_seq = self.sched_seq, "task accepted");
            }
        }
        let overrun = schedule.overrun_tasks().to_vec();
        self.accepted = tasks;
        self.schedule = schedule;
        for task in &overrun {
            self.add_overrunner(task);
        }
        for task in dropped {
            task.mark_dropped();
            self.finalize(&task, Disposition::Dropped, Some(TaskError::Dropped));
        }
        debug!(events = self.schedule.events().len(), accepted = self.accepted.len(), "schedule replaced");
        self.scheduler = Some(scheduler);
        self.reschedule = true;
    }

    // ---- lifecycle ----

    /// Finalize `task`, remove it everywhere and queue its FINISH. Returns
    /// false if it was already finished.
    fn finalize(&mut self, task: &TaskRef, disposition: Disposition, error: Option<TaskError>) -> bool {
        if self.running.as_ref().is_some_and(|r| r.task.id() == task.id()) {
            self.stop_running();
        }
        if !task.finish(disposition, error, self.clock.now()) {
            return false;
        }
        self.accepted.retain(|t| t.id() != task.id());
        self.overrun.retain(|_, t| t.id() != task.id());
        let before = self.background.len();
        self.background.retain(|t| t.id() != task.id());
        if self.background.len() != before {
            self.recompute_background_load();
        }
        self.schedule.remove_task_events(task);
        self.counters.record_finish(disposition);
        self.history.record(HistoryEntry::of(task));
        match disposition {
            Disposition::Completed => {
                info!(task = %task, time_used = task.time_used(), "task completed");
            }
            _ => warn!(
                task = %task,
                ?disposition,
                error = ?task.error(),
                "task finished abnormally"
            ),
        }
        self.notify(task, EventType::Finish);
        true
    }

    pub(crate) fn cancel(&mut self, task: &TaskRef) -> bool {
        if task.is_finished() || !self.is_known(task) {
            return false;
        }
        self.finalize(task, Disposition::Cancelled, Some(TaskError::Cancelled));
        self.reschedule = true;
        true
    }

    /// Withdraw a task whose START callback asked for it.
    pub(crate) fn abort(&mut self, task: &TaskRef) -> bool {
        if task.is_finished() || !self.is_known(task) {
            return false;
        }
        self.finalize(task, Disposition::Errored, Some(TaskError::Aborted));
        self.reschedule = true;
        true
    }

    fn notify(&self, task: &TaskRef, event: EventType) {
        if event == EventType::Finish && !task.claim_finish_notification() {
            return;
        }
        let sent = self.notify_tx.as_ref().is_some_and(|tx| {
            tx.send(Notification {
                task: task.clone(),
                event,
            })
            .is_ok()
        });
        if !sent {
            debug!(task = %task, ?event, "notifier gone, event dropped");
            if event == EventType::Finish {
                task.clear_callback();
            }
        }
    }

    fn add_overrunner(&mut self, task: &TaskRef) {
        let key = (task.latest_finish(), task.seq());
        if self.overrun.insert(key, task.clone()).is_none() {
            RunnerCounters::bump(&self.counters.overrun);
            debug!(task = %task, time_used = task.time_used(), "task overrunning");
        }
    }

    fn recompute_background_load(&mut self) {
        self.background_load = self.background.iter().filter_map(|t| t.load_factor()).sum();
    }

    // ---- stepping ----

    fn start_running(&mut self, task: TaskRef, chunk: Option<Chunk>, deadline: Deadline) {
        if task.mark_started() {
            self.notify(&task, EventType::Start);
        }
        trace!(task = %task, %deadline, early = chunk.is_none(), "running task");
        self.running = Some(Running {
            task,
            chunk,
            deadline,
            unaccounted: 0,
            last_flush: self.clock.now(),
        });
    }

    /// Stop the running task, crediting it the time it has used.
    pub(crate) fn stop_running(&mut self) {
        if let Some(running) = self.running.take() {
            if let Some(chunk) = &running.chunk {
                trace!(task = %running.task, finish = %chunk.finish(), used = running.unaccounted, "chunk run stopped");
            }
            running.task.add_time_used(running.unaccounted);
        }
    }

    /// Process due events and pick what runs next. Returns false if nothing
    /// is runnable; `next_wake` then holds the next event time.
    pub(crate) fn find_task_to_run(&mut self) -> bool {
        self.stop_running();
        self.reschedule = false;
        self.next_wake = Deadline::NEVER;
        let now = self.clock.now();

        let reported: Vec<TaskRef> = self.background.iter().filter(|t| t.is_done()).cloned().collect();
        for task in reported {
            self.finalize(&task, Disposition::Completed, None);
        }

        loop {
            let Some(event) = self.schedule.event_at(0).cloned() else {
                break;
            };
            if !event.start().expired_at(now) {
                self.next_wake = event.start();
                break;
            }
            match event {
                Event::Background(ev) => {
                    self.schedule.remove_at(0);
                    self.background_event(&ev);
                }
                Event::Chunk(chunk) => {
                    let task = chunk.task().clone();
                    if task.is_finished() {
                        self.schedule.remove_at(0);
                    } else if task.is_done() {
                        self.finalize(&task, Disposition::Completed, None);
                    } else if chunk.finish().expired_at(now) {
                        self.schedule.remove_at(0);
                        self.chunk_ended(&chunk, now);
                    } else {
                        let deadline = chunk.finish();
                        self.start_running(task, Some(chunk), deadline);
                        return true;
                    }
                }
            }
        }

        let early = self
            .schedule
            .chunks()
            .map(Chunk::task)
            .find(|t| t.earliest_start().expired_at(now) && !t.is_done())
            .cloned();
        if let Some(task) = early {
            let deadline = self.next_wake;
            self.start_running(task, None, deadline);
            return true;
        }

        let overrunners: Vec<TaskRef> = self.overrun.values().cloned().collect();
        for task in overrunners {
            if task.is_done() {
                self.finalize(&task, Disposition::Completed, None);
            } else if task.latest_finish().expired_at(now) {
                self.finalize(&task, Disposition::Expired, Some(TaskError::Timeout));
            }
        }
        if let Some(task) = self.overrun.values().next().cloned() {
            let deadline = self.next_wake;
            self.start_running(task, None, deadline);
            return true;
        }
        false
    }

    fn background_event(&mut self, ev: &BackgroundEvent) {
        let task = ev.task();
        if task.is_finished() {
            return;
        }
        match ev.event() {
            EventType::Start => {
                if task.mark_started() {
                    self.background.push(task.clone());
                    self.recompute_background_load();
                    info!(task = %task, load = self.background_load, "background task started");
                    self.notify(task, EventType::Start);
                }
            }
            EventType::Finish => {
                self.finalize(task, Disposition::Completed, None);
            }
        }
    }

    fn chunk_ended(&mut self, chunk: &Chunk, now: Deadline) {
        let task = chunk.task();
        if task.latest_finish().expired_at(now) {
            self.finalize(task, Disposition::Expired, Some(TaskError::Timeout));
        } else if !chunk.is_task_end() {
            trace!(task = %task, "chunk ended");
        } else if task.has_overrun() && !task.is_overrun_allowed() {
            self.finalize(task, Disposition::Errored, Some(TaskError::Overrun));
        } else {
            self.add_overrunner(task);
        }
    }

    /// Check that the running task may take another step. Returns the task
    /// and the step's start time, or `None` when the stepper should look for
    /// other work.
    pub(crate) fn begin_step(&mut self) -> Option<(TaskRef, Deadline)> {
        if self.reschedule {
            self.stop_running();
            return None;
        }
        let (task, deadline) = self.running.as_ref().map(|r| (r.task.clone(), r.deadline))?;
        if task.is_finished() {
            self.stop_running();
            return None;
        }
        let now = self.clock.now();
        if task.latest_finish().expired_at(now) {
            self.finalize(&task, Disposition::Expired, Some(TaskError::Timeout));
            return None;
        }
        if deadline.expired_at(now) {
            self.stop_running();
            return None;
        }
        Some((task, now))
    }

    /// Account for a step that ran with the lock released. The task may have
    /// been cancelled, aborted or displaced meanwhile, in which case the
    /// result is discarded.
    pub(crate) fn end_step(
        &mut self,
        task: &TaskRef,
        started: Deadline,
        result: Result<u64, TaskError>,
    ) -> bool {
        let after = self.clock.now();
        let Some(running) = self
            .running
            .as_mut()
            .filter(|r| r.task.id() == task.id())
        else {
            trace!(task = %task, "step result discarded, task no longer running");
            return false;
        };
        running.unaccounted += after.since(started);
        let unaccounted = running.unaccounted;
        if task.is_finished() {
            self.stop_running();
            return false;
        }

        match result {
            Ok(work) => trace!(task = %task, work, "step"),
            Err(err) => {
                self.finalize(task, Disposition::Errored, Some(err));
                return false;
            }
        }
        if task.is_done() {
            self.finalize(task, Disposition::Completed, None);
            return false;
        }
        if !task.is_overrun_allowed() && task.time_used() + unaccounted > task.estimate() {
            self.finalize(task, Disposition::Errored, Some(TaskError::Overrun));
            return false;
        }
        if let Some(running) = self.running.as_mut() {
            if after.since(running.last_flush) >= self.config.stats_update_interval_ms {
                running.task.add_time_used(running.unaccounted);
                running.unaccounted = 0;
                running.last_flush = after;
            }
        }
        true
    }

    /// Step the running task with the lock held throughout.
    #[cfg(test)]
    pub(crate) fn run_one_step(&mut self) -> bool {
        let Some((task, started)) = self.begin_step() else {
            return false;
        };
        let result = task.run_step(self.config.step_budget);
        self.end_step(&task, started, result)
    }

    /// How long the stepper may sleep before the next event.
    pub(crate) fn idle_wait(&self) -> Duration {
        let until = Duration::from_millis(self.next_wake.since(self.clock.now()));
        until
            .min(self.config.max_idle_wait())
            .max(Duration::from_millis(1))
    }

    // ---- queries ----

    pub(crate) fn schedule_hint(&self, spec: &BackgroundSpec) -> Interval {
        self.scheduler
            .as_ref()
            .map_or_else(|| spec.window(), |s| s.schedule_hint(spec))
    }

    pub(crate) fn status(&self) -> RunnerStatus {
        RunnerStatus {
            at: self.clock.now(),
            stats: self.counters.snapshot(),
            accepted_tasks: self.accepted.len(),
            overrun_tasks: self.overrun.len(),
            active_background: self.background.len(),
            background_load: self.background_load,
            running: self.running.as_ref().map(|r| r.task.label()),
            pending: self.schedule.events().iter().map(PendingEvent::from).collect(),
            history: self.history.entries(),
        }
    }
}

struct Shared {
    core: Mutex<RunnerCore>,
    wake: Condvar,
    shutdown: AtomicBool,
    counters: Arc<RunnerCounters>,
    stepper: Mutex<Option<JoinHandle<()>>>,
    notifier: Mutex<Option<JoinHandle<()>>>,
}

/// Admits tasks into a deadline-feasible schedule and executes it on a
/// dedicated stepping thread.
///
/// The stepping thread starts with the first accepted task. Lifecycle
/// callbacks run on a separate notifier thread and may call back into the
/// runner.
pub struct TaskRunner {
    shared: Arc<Shared>,
}

impl TaskRunner {
    /// Create a runner. Spawns the notifier thread.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] if `config` fails validation,
    /// [`SchedulerError::Internal`] if the notifier thread cannot be spawned.
    pub fn new(
        config: RunnerConfig,
        clock: Arc<dyn Clock>,
        factory: Arc<dyn SchedulerFactory>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let counters = Arc::new(RunnerCounters::default());
        let (tx, rx) = unbounded();
        let core = RunnerCore::new(config, clock, factory, Arc::clone(&counters), Some(tx));
        let shared = Arc::new(Shared {
            core: Mutex::new(core),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
            counters,
            stepper: Mutex::new(None),
            notifier: Mutex::new(None),
        });

        let weak = Arc::downgrade(&shared);
        let handle = spawn_notifier(
            rx,
            Box::new(move |task: &TaskRef| {
                if let Some(shared) = weak.upgrade() {
                    let aborted = shared.core.lock().abort(task);
                    if aborted {
                        shared.wake.notify_one();
                    }
                }
            }),
        )
        .map_err(|e| SchedulerError::Internal(format!("failed to spawn notifier thread: {e}")))?;
        *shared.notifier.lock() = Some(handle);

        info!("task runner created");
        Ok(Self { shared })
    }

    /// Submit a task for admission. `Ok(false)` means no feasible schedule
    /// could be found, even after cleanup.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Shutdown`] after [`TaskRunner::shutdown`], or
    /// [`SchedulerError::Internal`] if the stepping thread cannot be started.
    pub fn submit(&self, task: &TaskRef) -> Result<bool, SchedulerError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::Shutdown);
        }
        let accepted = self.shared.core.lock().schedule_task(task);
        if accepted {
            self.ensure_stepper()?;
            self.shared.wake.notify_one();
        }
        Ok(accepted)
    }

    /// True if `task` would currently be admitted. Nothing is committed.
    #[must_use]
    pub fn is_schedulable(&self, task: &TaskRef) -> bool {
        self.shared.core.lock().is_schedulable(task)
    }

    /// Cancel an accepted task. Returns false if it is unknown or already
    /// finished.
    pub fn cancel(&self, task: &TaskRef) -> bool {
        let cancelled = self.shared.core.lock().cancel(task);
        if cancelled {
            self.shared.wake.notify_one();
        }
        cancelled
    }

    /// Advisory window for a deferrable background task, based on the
    /// current schedule.
    #[must_use]
    pub fn schedule_hint(&self, spec: &BackgroundSpec) -> Interval {
        self.shared.core.lock().schedule_hint(spec)
    }

    /// Snapshot for dashboards.
    #[must_use]
    pub fn status(&self) -> RunnerStatus {
        self.shared.core.lock().status()
    }

    /// Counters only; does not take the runner lock.
    #[must_use]
    pub fn stats(&self) -> RunnerStats {
        self.shared.counters.snapshot()
    }

    /// Accepted tasks that have not finished.
    #[must_use]
    pub fn accepted_tasks(&self) -> Vec<TaskRef> {
        self.shared.core.lock().accepted.clone()
    }

    /// Overrunning tasks, earliest deadline first.
    #[must_use]
    pub fn overrun_tasks(&self) -> Vec<TaskRef> {
        self.shared.core.lock().overrun.values().cloned().collect()
    }

    /// Combined load factor of active background tasks.
    #[must_use]
    pub fn background_load(&self) -> f64 {
        self.shared.core.lock().background_load
    }

    /// Copy of the pending schedule.
    #[must_use]
    pub fn current_schedule(&self) -> Schedule {
        self.shared.core.lock().schedule.clone()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> RunnerConfig {
        self.shared.core.lock().config.clone()
    }

    fn ensure_stepper(&self) -> Result<(), SchedulerError> {
        let mut slot = self.shared.stepper.lock();
        if slot.is_some() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("window-sched-stepper".into())
            .spawn(move || stepper_loop(&shared))
            .map_err(|e| SchedulerError::Internal(format!("failed to spawn stepper thread: {e}")))?;
        *slot = Some(handle);
        Ok(())
    }

    /// Stop the stepping thread, deliver queued notifications and join both
    /// threads. Later submissions fail with [`SchedulerError::Shutdown`].
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down task runner");
        drop(self.shared.core.lock());
        self.shared.wake.notify_all();

        let stepper = self.shared.stepper.lock().take();
        if let Some(handle) = stepper {
            if handle.thread().id() == thread::current().id() {
                debug!("shutdown called from a step; stepper exits after it returns");
            } else if handle.join().is_err() {
                warn!("stepper thread panicked");
            }
        }
        {
            let mut core = self.shared.core.lock();
            core.stop_running();
            core.notify_tx = None;
        }
        let notifier = self.shared.notifier.lock().take();
        if let Some(handle) = notifier {
            if handle.thread().id() == thread::current().id() {
                debug!("shutdown called from a callback; notifier left to exit on its own");
            } else if handle.join().is_err() {
                warn!("notifier thread panicked");
            }
        }
        info!(stats = ?self.shared.counters.snapshot(), "task runner shut down");
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        // signal only; explicit shutdown() joins
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            self.shared.core.lock().notify_tx = None;
            self.shared.wake.notify_all();
            debug!("task runner dropped without explicit shutdown, threads detached");
        }
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("shutdown", &self.shared.shutdown.load(Ordering::Relaxed))
            .field("stats", &self.shared.counters.snapshot())
            .finish_non_exhaustive()
    }
}

fn stepper_loop(shared: &Shared) {
    debug!("stepper started");
    let mut core = shared.core.lock();
    while !shared.shutdown.load(Ordering::Acquire) {
        if core.find_task_to_run() {
            while !shared.shutdown.load(Ordering::Acquire) {
                let Some((task, started)) = core.begin_step() else {
                    break;
                };
                let budget = core.config.step_budget;
                let result = MutexGuard::unlocked_fair(&mut core, || task.run_step(budget));
                if !core.end_step(&task, started, result) {
                    break;
                }
            }
        } else {
            let wait = core.idle_wait();
            trace!(?wait, next = %core.next_wake, "stepper idle");
            let _ = shared.wake.wait_for(&mut core, wait);
        }
    }
    core.stop_running();
    debug!("stepper exiting");
}
