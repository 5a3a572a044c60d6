//! Interval partitioning.
//!
//! Splits the union of task windows at every window boundary so that the set
//! of tasks eligible to run is constant within each resulting interval, then
//! annotates each interval with its background load and competing tasks.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, trace};

use crate::core::interval::Interval;
use crate::core::schedule::Chunk;
use crate::core::task::TaskRef;
use crate::util::clock::Deadline;

/// Scheduler-side view of a task: window clamped to the scheduling time and
/// the portion of its estimate not yet placed.
#[derive(Debug, Clone)]
pub(crate) struct TaskData {
    pub(crate) task: TaskRef,
    pub(crate) window: Interval,
    pub(crate) unsched: u64,
}

impl TaskData {
    fn new(task: &TaskRef, now: Deadline) -> Self {
        let window = if task.earliest_start() < now {
            Interval::new(now, task.latest_finish())
        } else {
            task.window()
        };
        let unsched = if task.is_dropped() { 0 } else { task.cur_est() };
        Self {
            task: task.clone(),
            window,
            unsched,
        }
    }

    pub(crate) const fn wstart(&self) -> Deadline {
        self.window.begin()
    }

    pub(crate) const fn wend(&self) -> Deadline {
        self.window.end()
    }
}

/// Interval between two consecutive boundaries.
#[derive(Debug, Clone)]
pub(crate) struct SchedInterval {
    pub(crate) interval: Interval,
    /// Capacity left for foreground work after background load.
    pub(crate) load_factor: f64,
    /// Background time accumulated before this interval begins.
    pub(crate) cum_back_time: u64,
    /// Foreground tasks whose window covers this interval, ascending index.
    pub(crate) competing: Vec<usize>,
    /// Background tasks active during this interval.
    pub(crate) background: Vec<usize>,
    /// Foreground tasks whose window ends at this interval's end.
    pub(crate) ending: Vec<usize>,
    /// True once any not-yet-accepted task has started at or before here.
    pub(crate) seen_new_task: bool,
    pub(crate) chunks: Vec<Chunk>,
}

impl SchedInterval {
    fn new(interval: Interval) -> Self {
        Self {
            interval,
            load_factor: 1.0,
            cum_back_time: 0,
            competing: Vec::new(),
            background: Vec::new(),
            ending: Vec::new(),
            seen_new_task: false,
            chunks: Vec::new(),
        }
    }

    pub(crate) const fn begin(&self) -> Deadline {
        self.interval.begin()
    }

    pub(crate) const fn end(&self) -> Deadline {
        self.interval.end()
    }

    pub(crate) const fn duration(&self) -> u64 {
        self.interval.duration()
    }

    /// Time consumed by background tasks during this interval.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn background_time(&self) -> u64 {
        (self.duration() as f64 * (1.0 - self.load_factor)) as u64
    }

    pub(crate) fn has_tasks(&self) -> bool {
        !self.competing.is_empty()
    }
}

impl fmt::Display for SchedInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}", self.begin(), self.end())?;
        if (self.load_factor - 1.0).abs() > f64::EPSILON {
            write!(f, "*{:.3}", self.load_factor)?;
        }
        write!(f, "]")
    }
}

/// Tasks and the intervals they were partitioned into.
#[derive(Debug, Clone, Default)]
pub(crate) struct Partition {
    pub(crate) tasks: Vec<TaskData>,
    pub(crate) intervals: Vec<SchedInterval>,
}

#[derive(Default)]
struct Boundary {
    starting: Vec<usize>,
    ending: Vec<usize>,
}

/// Partition `tasks` as seen at `now`.
///
/// Returns `None` if some task can no longer fit its window, or if the
/// concurrent background load exceeds capacity anywhere.
pub(crate) fn partition(tasks: &[TaskRef], now: Deadline) -> Option<Partition> {
    let mut tdarr = Vec::with_capacity(tasks.len());
    for task in tasks {
        let td = TaskData::new(task, now);
        if !td.window.is_proper() {
            debug!(task = %task, now = %now, "task window has passed");
            return None;
        }
        tdarr.push(td);
    }
    if tdarr.is_empty() {
        return Some(Partition::default());
    }

    let mut bounds: BTreeMap<Deadline, Boundary> = BTreeMap::new();
    for (ix, td) in tdarr.iter().enumerate() {
        bounds.entry(td.wstart()).or_default().starting.push(ix);
        bounds.entry(td.wend()).or_default().ending.push(ix);
    }

    let mut intervals = Vec::with_capacity(bounds.len().saturating_sub(1));
    let mut cum_back_time = 0_u64;
    let mut cum_back: BTreeSet<usize> = BTreeSet::new();
    let mut cum_fore: BTreeSet<usize> = BTreeSet::new();
    let mut seen_new_task = false;

    let mut iter = bounds.iter();
    let Some((&first, _)) = iter.next() else {
        return Some(Partition::default());
    };
    let mut lower = first;
    for (&upper, ubound) in iter {
        let lbound = &bounds[&lower];
        let mut intrvl = SchedInterval::new(Interval::new(lower, upper));

        for &ix in &cum_back {
            intrvl.load_factor -= tdarr[ix].task.load_factor().unwrap_or(0.0);
            intrvl.background.push(ix);
        }
        for &ix in &lbound.starting {
            let task = &tdarr[ix].task;
            if !task.is_accepted() {
                seen_new_task = true;
            }
            if let Some(lf) = task.load_factor() {
                intrvl.load_factor -= lf;
                trace!(interval = %intrvl, load = lf, "background load applied");
                intrvl.background.push(ix);
                cum_back.insert(ix);
            } else {
                cum_fore.insert(ix);
            }
        }
        intrvl.competing = cum_fore.iter().copied().collect();
        intrvl.seen_new_task = seen_new_task;
        if intrvl.load_factor < 0.0 {
            debug!(interval = %intrvl, "background load exceeds capacity");
            return None;
        }

        for &ix in &ubound.ending {
            if tdarr[ix].task.is_background() {
                cum_back.remove(&ix);
            } else {
                intrvl.ending.push(ix);
                cum_fore.remove(&ix);
            }
        }
        intrvl.cum_back_time = cum_back_time;
        cum_back_time += intrvl.background_time();

        intervals.push(intrvl);
        lower = upper;
    }
    trace!(count = intervals.len(), "intervals built");
    Some(Partition {
        tasks: tdarr,
        intervals,
    })
}
