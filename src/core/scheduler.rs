//! Scheduler seam between the runner and placement algorithms.

use serde::{Deserialize, Serialize};

use crate::core::error::SchedulerError;
use crate::core::interval::Interval;
use crate::core::schedule::Schedule;
use crate::core::task::{Task, TaskRef};
use crate::util::clock::Deadline;

/// Builds schedules for a set of tasks.
///
/// A scheduler instance is created per admission attempt; the runner keeps
/// the one behind its current schedule to answer hints.
pub trait Scheduler: Send {
    /// Attempt to place every task. `None` means no feasible schedule.
    fn create_schedule(&mut self, tasks: &[TaskRef]) -> Option<Schedule>;

    /// Estimate when a background task could start, given the last schedule
    /// this scheduler built. The default makes no adjustment.
    fn schedule_hint(&self, spec: &BackgroundSpec) -> Interval {
        spec.window()
    }
}

/// Creates schedulers for the runner.
pub trait SchedulerFactory: Send + Sync {
    /// A fresh scheduler.
    fn create_scheduler(&self) -> Box<dyn Scheduler>;
}

impl<F> SchedulerFactory for F
where
    F: Fn() -> Box<dyn Scheduler> + Send + Sync,
{
    fn create_scheduler(&self) -> Box<dyn Scheduler> {
        self()
    }
}

/// Desired placement of a deferrable background task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSpec {
    window: Interval,
    load_factor: f64,
    latest_start: Deadline,
}

impl BackgroundSpec {
    /// Spec for a task wanting `window` at `load_factor`, which may be pushed
    /// back to start no later than `latest_start`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ImproperWindow`] or [`SchedulerError::InvalidLoadFactor`].
    pub fn new(
        window: Interval,
        load_factor: f64,
        latest_start: Deadline,
    ) -> Result<Self, SchedulerError> {
        if !window.is_proper() {
            return Err(SchedulerError::ImproperWindow {
                start: window.begin(),
                finish: window.end(),
            });
        }
        if !(load_factor > 0.0 && load_factor <= 1.0) {
            return Err(SchedulerError::InvalidLoadFactor(load_factor));
        }
        Ok(Self {
            window,
            load_factor,
            latest_start,
        })
    }

    /// Requested window.
    #[must_use]
    pub const fn window(&self) -> Interval {
        self.window
    }

    /// Requested load factor.
    #[must_use]
    pub const fn load_factor(&self) -> f64 {
        self.load_factor
    }

    /// Latest acceptable start.
    #[must_use]
    pub const fn latest_start(&self) -> Deadline {
        self.latest_start
    }

    /// True if a hinted window still starts in time.
    #[must_use]
    pub fn accepts(&self, hint: &Interval) -> bool {
        hint.begin() <= self.latest_start
    }

    /// Background task occupying `window` at this spec's load factor.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ImproperWindow`] for an empty window.
    pub fn task_at(&self, window: Interval) -> Result<Task, SchedulerError> {
        Task::background(window.begin(), window.end(), self.load_factor)
    }
}
