//! Scheduling model, the placement algorithm and the task runner.

pub mod error;
pub mod interval;
pub(crate) mod notifier;
pub(crate) mod partition;
pub mod schedule;
pub mod scheduler;
pub mod sort_scheduler;
pub mod status;
pub mod task;
pub mod task_runner;

pub use error::{AppResult, CallbackError, SchedulerError, TaskError};
pub use interval::Interval;
pub use schedule::{BackgroundEvent, Chunk, Event, EventType, Schedule};
pub use scheduler::{BackgroundSpec, Scheduler, SchedulerFactory};
pub use sort_scheduler::{SortScheduler, SortSchedulerFactory};
pub use status::{HistoryEntry, PendingEvent, PendingKind, RunnerStats, RunnerStatus};
pub use task::{Cookie, Disposition, Stepper, Task, TaskCallback, TaskId, TaskRef};
pub use task_runner::TaskRunner;
