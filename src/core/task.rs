//! Schedulable tasks: foreground step tasks and background load tasks.
//!
//! A [`Task`] is shared between the submitter, the runner's internal sets,
//! schedule events and the notifier, so it is always handled through a
//! [`TaskRef`]. Identity and window are immutable; lifecycle bookkeeping sits
//! behind a `parking_lot::Mutex` that is never held while the runner lock is
//! being acquired.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{AppResult, CallbackError, SchedulerError, TaskError};
use crate::core::interval::Interval;
use crate::core::schedule::EventType;
use crate::util::clock::Deadline;

/// Unique task identifier.
pub type TaskId = Uuid;

/// Shared handle to a task.
pub type TaskRef = Arc<Task>;

/// Opaque submitter data carried with a task until its FINISH notification.
pub type Cookie = Arc<dyn Any + Send + Sync>;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Incremental unit of foreground work.
///
/// `step` must return promptly: the runner executes one step at a time on a
/// single thread and cannot preempt a step in progress.
pub trait Stepper: Send {
    /// Perform one bounded unit of work. `budget` is an advisory work metric;
    /// the return value is the amount of work actually done.
    ///
    /// # Errors
    ///
    /// Any error force-finishes the task with [`TaskError::StepFailed`].
    fn step(&mut self, budget: u64) -> AppResult<u64>;

    /// True once no more work remains.
    fn is_finished(&self) -> bool;
}

/// Receiver of task lifecycle events. Invoked on the notifier thread with no
/// runner lock held.
pub trait TaskCallback: Send + Sync {
    /// Called for START and FINISH events.
    ///
    /// # Errors
    ///
    /// [`CallbackError::Abort`] on a START event withdraws the task; any other
    /// error is logged and ignored.
    fn task_event(&self, task: &TaskRef, event: EventType) -> Result<(), CallbackError>;
}

impl<F> TaskCallback for F
where
    F: Fn(&TaskRef, EventType) -> Result<(), CallbackError> + Send + Sync,
{
    fn task_event(&self, task: &TaskRef, event: EventType) -> Result<(), CallbackError> {
        self(task, event)
    }
}

/// How a task left the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Finished its work.
    Completed,
    /// Window closed before it finished.
    Expired,
    /// Step failure, overrun, or callback abort.
    Errored,
    /// Cancelled by the submitter.
    Cancelled,
    /// Dropped during admission cleanup.
    Dropped,
}

enum TaskKind {
    Step(Mutex<Box<dyn Stepper>>),
    Background { load_factor: f64 },
}

#[derive(Default)]
struct TaskState {
    accepted: bool,
    sched_seq: Option<u64>,
    sched_date: Option<Deadline>,
    finish_date: Option<Deadline>,
    time_used: u64,
    started: bool,
    reported_done: bool,
    dropped: bool,
    overrun_allowed: bool,
    notified: bool,
    disposition: Option<Disposition>,
    error: Option<TaskError>,
    callback: Option<Arc<dyn TaskCallback>>,
    cookie: Option<Cookie>,
}

/// A computation with a time window and an estimated cost.
pub struct Task {
    id: TaskId,
    seq: u64,
    name: Option<String>,
    window: Interval,
    estimate: u64,
    kind: TaskKind,
    state: Mutex<TaskState>,
}

impl Task {
    fn new(window: Interval, estimate: u64, kind: TaskKind) -> Result<Self, SchedulerError> {
        if !window.is_proper() {
            return Err(SchedulerError::ImproperWindow {
                start: window.begin(),
                finish: window.end(),
            });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
            name: None,
            window,
            estimate,
            kind,
            state: Mutex::new(TaskState::default()),
        })
    }

    /// Foreground task executed by repeated calls to `stepper`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ImproperWindow`] unless `earliest_start < latest_finish`.
    pub fn step(
        earliest_start: Deadline,
        latest_finish: Deadline,
        estimate: u64,
        stepper: impl Stepper + 'static,
    ) -> Result<Self, SchedulerError> {
        Self::new(
            Interval::new(earliest_start, latest_finish),
            estimate,
            TaskKind::Step(Mutex::new(Box::new(stepper))),
        )
    }

    /// Background task consuming `load_factor` of capacity over its whole window.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ImproperWindow`] for an empty window,
    /// [`SchedulerError::InvalidLoadFactor`] unless `0 < load_factor <= 1`.
    pub fn background(
        start: Deadline,
        finish: Deadline,
        load_factor: f64,
    ) -> Result<Self, SchedulerError> {
        if !(load_factor > 0.0 && load_factor <= 1.0) {
            return Err(SchedulerError::InvalidLoadFactor(load_factor));
        }
        let window = Interval::new(start, finish);
        Self::new(window, window.duration(), TaskKind::Background { load_factor })
    }

    /// Attach a name used in logs and status output.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach the lifecycle callback.
    #[must_use]
    pub fn with_callback(mut self, callback: impl TaskCallback + 'static) -> Self {
        self.state.get_mut().callback = Some(Arc::new(callback));
        self
    }

    /// Attach opaque submitter data.
    #[must_use]
    pub fn with_cookie(mut self, cookie: impl Any + Send + Sync) -> Self {
        self.state.get_mut().cookie = Some(Arc::new(cookie));
        self
    }

    /// Permit the task to keep running past its estimate.
    #[must_use]
    pub fn with_overrun_allowed(mut self, allowed: bool) -> Self {
        self.state.get_mut().overrun_allowed = allowed;
        self
    }

    /// Wrap in a shared handle.
    #[must_use]
    pub fn into_ref(self) -> TaskRef {
        Arc::new(self)
    }

    /// Unique identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Creation order, used as a stable tie-breaker.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Optional name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name, or a short form of the id.
    #[must_use]
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            let id = self.id.simple().to_string();
            id[..8].to_string()
        })
    }

    /// Admissible execution window.
    #[must_use]
    pub const fn window(&self) -> Interval {
        self.window
    }

    /// Earliest start deadline.
    #[must_use]
    pub const fn earliest_start(&self) -> Deadline {
        self.window.begin()
    }

    /// Latest finish deadline.
    #[must_use]
    pub const fn latest_finish(&self) -> Deadline {
        self.window.end()
    }

    /// Originally declared cost.
    #[must_use]
    pub const fn estimate(&self) -> u64 {
        self.estimate
    }

    /// True for continuous-load tasks.
    #[must_use]
    pub fn is_background(&self) -> bool {
        matches!(self.kind, TaskKind::Background { .. })
    }

    /// Load factor of a background task.
    #[must_use]
    pub fn load_factor(&self) -> Option<f64> {
        match self.kind {
            TaskKind::Background { load_factor } => Some(load_factor),
            TaskKind::Step(_) => None,
        }
    }

    /// Accounted execution time so far.
    #[must_use]
    pub fn time_used(&self) -> u64 {
        self.state.lock().time_used
    }

    /// Remaining estimate still to be placed in a schedule.
    #[must_use]
    pub fn cur_est(&self) -> u64 {
        self.estimate.saturating_sub(self.state.lock().time_used)
    }

    /// True once the task has used more than its estimate.
    #[must_use]
    pub fn has_overrun(&self) -> bool {
        self.state.lock().time_used > self.estimate
    }

    /// Whether the task may keep running past its estimate.
    #[must_use]
    pub fn is_overrun_allowed(&self) -> bool {
        self.state.lock().overrun_allowed
    }

    /// Change the overrun policy.
    pub fn set_overrun_allowed(&self, allowed: bool) {
        self.state.lock().overrun_allowed = allowed;
    }

    /// Report that the task's work is done. Background tasks use this for
    /// early completion; the runner finalizes the task on its next cycle.
    pub fn task_is_finished(&self) {
        self.state.lock().reported_done = true;
    }

    /// True once the runner has finalized the task.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.lock().disposition.is_some()
    }

    /// True if the task was dropped during cleanup.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.state.lock().dropped
    }

    /// True once the task has been admitted to a schedule.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.state.lock().accepted
    }

    /// Final disposition, once finished.
    #[must_use]
    pub fn disposition(&self) -> Option<Disposition> {
        self.state.lock().disposition
    }

    /// Error attached when the task was force-finished.
    #[must_use]
    pub fn error(&self) -> Option<TaskError> {
        self.state.lock().error.clone()
    }

    /// Admission sequence number.
    #[must_use]
    pub fn sched_seq(&self) -> Option<u64> {
        self.state.lock().sched_seq
    }

    /// Time of admission.
    #[must_use]
    pub fn sched_date(&self) -> Option<Deadline> {
        self.state.lock().sched_date
    }

    /// Time of finalization.
    #[must_use]
    pub fn finish_date(&self) -> Option<Deadline> {
        self.state.lock().finish_date
    }

    /// Submitter data, cleared after the FINISH notification.
    #[must_use]
    pub fn cookie(&self) -> Option<Cookie> {
        self.state.lock().cookie.clone()
    }

    // ---- runner-internal bookkeeping ----

    /// Record admission. Returns false if the task was already accepted.
    pub(crate) fn accept(&self, sched_seq: u64, now: Deadline) -> bool {
        let mut st = self.state.lock();
        if st.accepted {
            return false;
        }
        st.accepted = true;
        st.sched_seq = Some(sched_seq);
        st.sched_date = Some(now);
        true
    }

    #[cfg(test)]
    pub(crate) fn set_accepted(&self, accepted: bool) {
        self.state.lock().accepted = accepted;
    }

    #[cfg(test)]
    pub(crate) fn set_time_used(&self, time_used: u64) {
        self.state.lock().time_used = time_used;
    }

    pub(crate) fn add_time_used(&self, ms: u64) {
        let mut st = self.state.lock();
        st.time_used = st.time_used.saturating_add(ms);
    }

    /// Mark the task started. Returns false if it already was.
    pub(crate) fn mark_started(&self) -> bool {
        let mut st = self.state.lock();
        !std::mem::replace(&mut st.started, true)
    }

    pub(crate) fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub(crate) fn mark_dropped(&self) {
        self.state.lock().dropped = true;
    }

    /// True if the task has no work left, whether or not it has been finalized.
    pub(crate) fn is_done(&self) -> bool {
        {
            let st = self.state.lock();
            if st.disposition.is_some() || st.reported_done {
                return true;
            }
        }
        match &self.kind {
            TaskKind::Step(stepper) => stepper.lock().is_finished(),
            TaskKind::Background { .. } => false,
        }
    }

    /// Finalize. Returns false if the task had already been finalized, in
    /// which case nothing changes.
    pub(crate) fn finish(
        &self,
        disposition: Disposition,
        error: Option<TaskError>,
        now: Deadline,
    ) -> bool {
        let mut st = self.state.lock();
        if st.disposition.is_some() {
            return false;
        }
        st.disposition = Some(disposition);
        if st.error.is_none() {
            st.error = error;
        }
        st.finish_date = Some(now);
        true
    }

    /// Claim the single terminal notification. Returns false if it was
    /// already claimed.
    pub(crate) fn claim_finish_notification(&self) -> bool {
        let mut st = self.state.lock();
        !std::mem::replace(&mut st.notified, true)
    }

    pub(crate) fn callback(&self) -> Option<Arc<dyn TaskCallback>> {
        self.state.lock().callback.clone()
    }

    /// Release submitter references once the task can generate no more events.
    pub(crate) fn clear_callback(&self) {
        let mut st = self.state.lock();
        st.callback = None;
        st.cookie = None;
    }

    /// Run one step of a foreground task, catching errors and panics.
    pub(crate) fn run_step(&self, budget: u64) -> Result<u64, TaskError> {
        let TaskKind::Step(stepper) = &self.kind else {
            return Err(TaskError::StepFailed("background task cannot be stepped".into()));
        };
        let mut stepper = stepper.lock();
        match panic::catch_unwind(AssertUnwindSafe(|| stepper.step(budget))) {
            Ok(Ok(work)) => Ok(work),
            Ok(Err(e)) => Err(TaskError::StepFailed(format!("{e:#}"))),
            Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Task");
        d.field("label", &self.label())
            .field("window", &self.window)
            .field("estimate", &self.estimate);
        if let Some(lf) = self.load_factor() {
            d.field("load_factor", &lf);
        }
        d.finish_non_exhaustive()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_background() { "B" } else { "S" };
        write!(f, "[{kind}:{} {} est={}]", self.label(), self.window, self.estimate)
    }
}
