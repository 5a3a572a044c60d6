//! Runner statistics, bounded history, and the status snapshot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::interval::Interval;
use crate::core::schedule::{Event, EventType};
use crate::core::task::{Disposition, Task, TaskId};
use crate::util::clock::Deadline;

/// Aggregate task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerStats {
    /// Tasks offered to `submit`.
    pub submitted: u64,
    /// Tasks admitted to a schedule.
    pub accepted: u64,
    /// Tasks refused admission.
    pub refused: u64,
    /// Tasks that finished their work.
    pub completed: u64,
    /// Tasks whose window closed first.
    pub expired: u64,
    /// Tasks force-finished by a failure, overrun or abort.
    pub errored: u64,
    /// Times a task moved to the overrun set.
    pub overrun: u64,
    /// Tasks dropped during cleanup.
    pub dropped: u64,
    /// Tasks cancelled by the submitter.
    pub cancelled: u64,
}

/// Lock-free counters behind [`RunnerStats`].
#[derive(Debug, Default)]
pub(crate) struct RunnerCounters {
    pub submitted: AtomicU64,
    pub accepted: AtomicU64,
    pub refused: AtomicU64,
    pub completed: AtomicU64,
    pub expired: AtomicU64,
    pub errored: AtomicU64,
    pub overrun: AtomicU64,
    pub dropped: AtomicU64,
    pub cancelled: AtomicU64,
}

impl RunnerCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finish(&self, disposition: Disposition) {
        let counter = match disposition {
            Disposition::Completed => &self.completed,
            Disposition::Expired => &self.expired,
            Disposition::Errored => &self.errored,
            Disposition::Cancelled => &self.cancelled,
            Disposition::Dropped => &self.dropped,
        };
        Self::bump(counter);
    }

    pub(crate) fn snapshot(&self) -> RunnerStats {
        RunnerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            overrun: self.overrun.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Record of a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Task id.
    pub id: TaskId,
    /// Task label.
    pub label: String,
    /// True for background tasks.
    pub background: bool,
    /// Task window.
    pub window: Interval,
    /// Declared estimate.
    pub estimate: u64,
    /// Execution time accounted.
    pub time_used: u64,
    /// How the task left the runner.
    pub disposition: Option<Disposition>,
    /// Attached error, if any.
    pub error: Option<String>,
    /// Admission time.
    pub sched_date: Option<Deadline>,
    /// Finalization time.
    pub finish_date: Option<Deadline>,
}

impl HistoryEntry {
    pub(crate) fn of(task: &Task) -> Self {
        Self {
            id: task.id(),
            label: task.label(),
            background: task.is_background(),
            window: task.window(),
            estimate: task.estimate(),
            time_used: task.time_used(),
            disposition: task.disposition(),
            error: task.error().map(|e| e.to_string()),
            sched_date: task.sched_date(),
            finish_date: task.finish_date(),
        }
    }
}

/// Bounded, oldest-first history of finished tasks.
#[derive(Debug)]
pub(crate) struct History {
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
}

impl History {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
        }
    }

    pub(crate) fn record(&mut self, entry: HistoryEntry) {
        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub(crate) fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Kind of a pending schedule event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    /// Background task start.
    BackgroundStart,
    /// Background task finish.
    BackgroundFinish,
    /// Foreground chunk.
    Chunk,
}

/// A schedule event not yet processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEvent {
    /// Task label.
    pub task: String,
    /// Event kind.
    pub kind: PendingKind,
    /// When the event is due.
    pub start: Deadline,
    /// Chunk end; equal to `start` for background events.
    pub finish: Deadline,
    /// Chunk run time; zero for background events.
    pub run_time: u64,
}

impl From<&Event> for PendingEvent {
    fn from(event: &Event) -> Self {
        match event {
            Event::Background(ev) => Self {
                task: ev.task().label(),
                kind: match ev.event() {
                    EventType::Start => PendingKind::BackgroundStart,
                    EventType::Finish => PendingKind::BackgroundFinish,
                },
                start: ev.when(),
                finish: ev.when(),
                run_time: 0,
            },
            Event::Chunk(c) => Self {
                task: c.task().label(),
                kind: PendingKind::Chunk,
                start: c.start(),
                finish: c.finish(),
                run_time: c.run_time(),
            },
        }
    }
}

/// Point-in-time view of the runner for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerStatus {
    /// Time of the snapshot.
    pub at: Deadline,
    /// Aggregate counts.
    pub stats: RunnerStats,
    /// Accepted tasks not yet finished.
    pub accepted_tasks: usize,
    /// Tasks running past their scheduled chunks.
    pub overrun_tasks: usize,
    /// Background tasks currently active.
    pub active_background: usize,
    /// Combined load factor of active background tasks.
    pub background_load: f64,
    /// Label of the task currently stepping.
    pub running: Option<String>,
    /// Schedule events not yet processed.
    pub pending: Vec<PendingEvent>,
    /// Recently finished tasks, oldest first.
    pub history: Vec<HistoryEntry>,
}

impl RunnerStatus {
    /// JSON rendering.
    ///
    /// # Errors
    ///
    /// Serialization failure.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
