//! Schedules: time-ordered background boundaries and foreground chunks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::task::TaskRef;
use crate::util::clock::Deadline;

/// Task lifecycle event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Task became active.
    Start,
    /// Task finished, for any reason.
    Finish,
}

/// Start or finish of a background task.
#[derive(Debug, Clone)]
pub struct BackgroundEvent {
    task: TaskRef,
    when: Deadline,
    event: EventType,
}

impl BackgroundEvent {
    /// New background boundary event.
    #[must_use]
    pub const fn new(task: TaskRef, when: Deadline, event: EventType) -> Self {
        Self { task, when, event }
    }

    /// The background task.
    #[must_use]
    pub const fn task(&self) -> &TaskRef {
        &self.task
    }

    /// When the boundary occurs.
    #[must_use]
    pub const fn when(&self) -> Deadline {
        self.when
    }

    /// START or FINISH.
    #[must_use]
    pub const fn event(&self) -> EventType {
        self.event
    }
}

impl PartialEq for BackgroundEvent {
    fn eq(&self, other: &Self) -> bool {
        self.task.id() == other.task.id() && self.when == other.when && self.event == other.event
    }
}

/// Contiguous wall-clock allocation to a foreground task.
#[derive(Debug, Clone)]
pub struct Chunk {
    task: TaskRef,
    start: Deadline,
    finish: Deadline,
    run_time: u64,
    task_end: bool,
}

impl Chunk {
    /// New chunk expecting `run_time` of execution between `start` and `finish`.
    #[must_use]
    pub const fn new(task: TaskRef, start: Deadline, finish: Deadline, run_time: u64) -> Self {
        Self {
            task,
            start,
            finish,
            run_time,
            task_end: false,
        }
    }

    /// Mark this as the last chunk of its task.
    #[must_use]
    pub const fn ending_task(mut self) -> Self {
        self.task_end = true;
        self
    }

    pub(crate) const fn set_task_end(&mut self) {
        self.task_end = true;
    }

    /// The foreground task.
    #[must_use]
    pub const fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Wall-clock start.
    #[must_use]
    pub const fn start(&self) -> Deadline {
        self.start
    }

    /// Wall-clock end.
    #[must_use]
    pub const fn finish(&self) -> Deadline {
        self.finish
    }

    /// Execution time expected within the span.
    #[must_use]
    pub const fn run_time(&self) -> u64 {
        self.run_time
    }

    /// True if the task should be done by the end of this chunk.
    #[must_use]
    pub const fn is_task_end(&self) -> bool {
        self.task_end
    }

    /// Absorb `next` if it continues this chunk for the same task.
    /// Returns false, leaving both unchanged, if they cannot be merged.
    pub fn extend(&mut self, next: &Self) -> bool {
        if self.task.id() != next.task.id() || self.finish != next.start {
            return false;
        }
        self.finish = next.finish;
        self.run_time += next.run_time;
        self.task_end = next.task_end;
        true
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.task.id() == other.task.id()
            && self.start == other.start
            && self.finish == other.finish
            && self.run_time == other.run_time
            && self.task_end == other.task_end
    }
}

/// Schedule entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Background task boundary.
    Background(BackgroundEvent),
    /// Foreground run chunk.
    Chunk(Chunk),
}

impl Event {
    /// Task the event belongs to.
    #[must_use]
    pub const fn task(&self) -> &TaskRef {
        match self {
            Self::Background(ev) => ev.task(),
            Self::Chunk(chunk) => chunk.task(),
        }
    }

    /// Time at which the event becomes due.
    #[must_use]
    pub const fn start(&self) -> Deadline {
        match self {
            Self::Background(ev) => ev.when(),
            Self::Chunk(chunk) => chunk.start(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Background(ev) => write!(
                f,
                "[B {:?} {} at {}]",
                ev.event,
                ev.task.label(),
                ev.when
            ),
            Self::Chunk(c) => write!(
                f,
                "[C {} {}-{} run={}{}]",
                c.task.label(),
                c.start,
                c.finish,
                c.run_time,
                if c.task_end { " end" } else { "" }
            ),
        }
    }
}

/// Time-ordered event list plus the foreground tasks that received no time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    events: Vec<Event>,
    overrun_tasks: Vec<TaskRef>,
}

impl Schedule {
    /// Schedule with no unscheduled tasks.
    #[must_use]
    pub const fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            overrun_tasks: Vec::new(),
        }
    }

    /// Schedule that also reports tasks it could not place.
    #[must_use]
    pub const fn with_overrun_tasks(events: Vec<Event>, overrun_tasks: Vec<TaskRef>) -> Self {
        Self {
            events,
            overrun_tasks,
        }
    }

    /// Pending events in time order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Foreground tasks that were accepted but received no chunk.
    #[must_use]
    pub fn overrun_tasks(&self) -> &[TaskRef] {
        &self.overrun_tasks
    }

    /// True if no events remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Chunks only, in order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.events.iter().filter_map(|e| match e {
            Event::Chunk(c) => Some(c),
            Event::Background(_) => None,
        })
    }

    pub(crate) fn event_at(&self, ix: usize) -> Option<&Event> {
        self.events.get(ix)
    }

    pub(crate) fn remove_at(&mut self, ix: usize) -> Event {
        self.events.remove(ix)
    }

    /// Remove every event belonging to `task`.
    pub(crate) fn remove_task_events(&mut self, task: &TaskRef) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.task().id() != task.id());
        before - self.events.len()
    }
}
