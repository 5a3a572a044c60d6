//! # window_sched
//!
//! A deadline-window task scheduler for a single cooperative stepping thread.
//!
//! Every task declares a window (`earliest_start`, `latest_finish`) and an
//! estimated cost. Foreground tasks are executed incrementally by repeated
//! calls to [`core::Stepper::step`]; background tasks run elsewhere and only
//! reserve a fixed fraction of capacity for their whole window. The runner
//! admits a task only if a schedule exists in which every accepted task still
//! fits its window, and optionally drops already-started work to make room.
//!
//! ## Key Features
//!
//! - **Interval scheduling**: task windows are partitioned at every boundary
//!   and capacity is handed out earliest-deadline-first per interval
//! - **Background load accounting**: background tasks shrink the capacity of
//!   the intervals they cover
//! - **Dynamic admission with cleanup**: infeasible admissions may drop
//!   started tasks, bounded by configuration
//! - **Overrun handling**: tasks that outlive their chunks keep running in
//!   slack time when allowed
//! - **Asynchronous callbacks**: START and FINISH events are delivered on a
//!   notifier thread and never block the stepper
//! - **Schedule hints**: advisory start windows for deferrable background work
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use window_sched::builders::RunnerBuilder;
//! use window_sched::config::RunnerConfig;
//! use window_sched::core::Task;
//! use window_sched::util::{Clock, SystemClock};
//!
//! let runner = RunnerBuilder::new()
//!     .config(RunnerConfig::default().with_drop_task_max(2))
//!     .build()?;
//! let now = SystemClock.now();
//! let task = Task::step(now, now.plus(5_000), 1_000, my_stepper)?
//!     .with_name("reindex")
//!     .with_callback(|task: &window_sched::core::TaskRef, event| {
//!         tracing::info!(%task, ?event, "task event");
//!         Ok(())
//!     })
//!     .into_ref();
//! if !runner.submit(&task)? {
//!     // no feasible schedule
//! }
//! runner.shutdown();
//! ```

/// Builders to construct runners from configuration.
pub mod builders;
/// Configuration models for the runner and the placement algorithm.
pub mod config;
/// Scheduling model, placement algorithm and task runner.
pub mod core;
/// Clock, deadlines and logging setup.
pub mod util;

pub use crate::builders::RunnerBuilder;
pub use crate::config::{RunnerConfig, SortSchedulerConfig};
pub use crate::core::{
    BackgroundSpec, Disposition, EventType, Interval, SchedulerError, Stepper, Task, TaskRef,
    TaskRunner,
};
pub use crate::util::clock::{Clock, Deadline, SimulatedClock, SystemClock};
