//! Earliest-deadline-first placement over partitioned intervals.
//!
//! Intervals are grouped into ranges of consecutive intervals whose competing
//! task sets overlap. Within a range, tasks are ordered by window end (ties by
//! input order) and each interval's foreground capacity is handed out in that
//! order. A task still short of time at the end of its window fails the
//! schedule, unless every task that has started by then was already accepted.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::SortSchedulerConfig;
use crate::core::interval::Interval;
use crate::core::partition::{partition, Partition, SchedInterval, TaskData};
use crate::core::schedule::{BackgroundEvent, Chunk, Event, EventType, Schedule};
use crate::core::scheduler::{BackgroundSpec, Scheduler, SchedulerFactory};
use crate::core::task::TaskRef;
use crate::util::clock::{Clock, Deadline};

/// Production scheduler.
#[derive(Debug)]
pub struct SortScheduler {
    config: SortSchedulerConfig,
    clock: Arc<dyn Clock>,
    scheduled_at: Deadline,
    intervals: Vec<SchedInterval>,
}

impl SortScheduler {
    /// Scheduler reading time from `clock`.
    #[must_use]
    pub fn new(config: SortSchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            scheduled_at: Deadline::default(),
            intervals: Vec::new(),
        }
    }

    fn schedule_all(&self, part: &mut Partition, unscheduled: &mut BTreeSet<usize>) -> bool {
        let n = part.intervals.len();
        let mut first: Option<usize> = None;
        for ix in 0..n {
            let has_tasks = part.intervals[ix].has_tasks();
            match first {
                None => {
                    if has_tasks {
                        first = Some(ix);
                    }
                }
                Some(start) => {
                    let split = !has_tasks
                        || is_disjoint(&part.intervals[ix - 1].competing, &part.intervals[ix].competing);
                    if split {
                        if !self.schedule_range(part, start, ix - 1, unscheduled) {
                            return false;
                        }
                        first = has_tasks.then_some(ix);
                    }
                }
            }
        }
        match first {
            Some(start) => self.schedule_range(part, start, n - 1, unscheduled),
            None => true,
        }
    }

    fn schedule_range(
        &self,
        part: &mut Partition,
        first: usize,
        last: usize,
        unscheduled: &mut BTreeSet<usize>,
    ) -> bool {
        let mut order: Vec<usize> = part.intervals[first..=last]
            .iter()
            .flat_map(|i| i.competing.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        order.sort_by_key(|&ix| (part.tasks[ix].wend(), ix));
        trace!(first, last, tasks = order.len(), "scheduling range");

        let Partition { tasks, intervals } = part;
        for (offset, intrvl) in intervals[first..=last].iter_mut().enumerate() {
            if !self.schedule_interval(intrvl, &order, tasks, unscheduled) {
                debug!(interval = first + offset, %intrvl, "cannot schedule interval");
                return false;
            }
        }
        true
    }

    /// Fill one interval in deadline order. Returns false if a task ending
    /// here is left short and a new task has started by now.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn schedule_interval(
        &self,
        intrvl: &mut SchedInterval,
        order: &[usize],
        tasks: &mut [TaskData],
        unscheduled: &mut BTreeSet<usize>,
    ) -> bool {
        let fore_load = intrvl.load_factor.min(1.0 - self.config.overhead_load);
        let mut remaining = (intrvl.duration() as f64 * fore_load) as u64;
        let begin = intrvl.begin();
        let mut offset = 0_u64;
        intrvl.chunks.clear();

        for &tix in order {
            if remaining == 0 {
                break;
            }
            let td = &mut tasks[tix];
            if td.unsched == 0 || intrvl.interval.is_disjoint(&td.window) {
                continue;
            }
            let task_time = remaining.min(td.unsched);
            let task_dur = (task_time as f64 / fore_load) as u64;
            let start = begin.plus(offset);
            // round-off can leave the last chunk short of the interval end
            let stop = if task_time == remaining {
                intrvl.end()
            } else {
                begin.plus(offset + task_dur)
            };
            let mut chunk = Chunk::new(td.task.clone(), start, stop, task_time);
            td.unsched -= task_time;
            remaining -= task_time;
            if td.unsched == 0 {
                chunk.set_task_end();
            }
            trace!(task = %td.task, %start, %stop, run = task_time, "chunk");
            intrvl.chunks.push(chunk);
            offset += task_dur;
            unscheduled.remove(&tix);
        }

        for &eix in &intrvl.ending {
            let td = &tasks[eix];
            if td.unsched > 0 {
                if intrvl.seen_new_task {
                    debug!(task = %td.task, short = td.unsched, "no schedule found");
                    return false;
                }
                debug!(task = %td.task, short = td.unsched, "accepted task cannot finish in time, proceeding");
            }
        }
        true
    }

    fn build_schedule(part: &Partition, unscheduled: &mut BTreeSet<usize>) -> Schedule {
        let mut events: Vec<Event> = Vec::new();
        for intrvl in &part.intervals {
            for &ix in &intrvl.background {
                let td = &part.tasks[ix];
                // the clamped start, so a task already under way still gets its START
                if td.wstart() == intrvl.begin() {
                    events.push(Event::Background(BackgroundEvent::new(
                        td.task.clone(),
                        intrvl.begin(),
                        EventType::Start,
                    )));
                    unscheduled.remove(&ix);
                }
            }
            for chunk in &intrvl.chunks {
                if let Some(Event::Chunk(prev)) = events.last_mut() {
                    if prev.extend(chunk) {
                        continue;
                    }
                }
                events.push(Event::Chunk(chunk.clone()));
            }
            for &ix in &intrvl.background {
                let task = &part.tasks[ix].task;
                if task.latest_finish() == intrvl.end() {
                    events.push(Event::Background(BackgroundEvent::new(
                        task.clone(),
                        intrvl.end(),
                        EventType::Finish,
                    )));
                }
            }
        }
        for event in &events {
            trace!(%event, "scheduled");
        }
        let overrun = unscheduled
            .iter()
            .map(|&ix| part.tasks[ix].task.clone())
            .filter(|t| !t.is_background())
            .collect();
        Schedule::with_overrun_tasks(events, overrun)
    }
}

impl Scheduler for SortScheduler {
    fn create_schedule(&mut self, tasks: &[TaskRef]) -> Option<Schedule> {
        self.intervals.clear();
        self.scheduled_at = self.clock.now();
        let mut seen = HashSet::with_capacity(tasks.len());
        let tasks: Vec<TaskRef> = tasks
            .iter()
            .filter(|t| seen.insert(t.id()))
            .cloned()
            .collect();
        debug!(tasks = tasks.len(), at = %self.scheduled_at, "create schedule");

        let mut part = partition(&tasks, self.scheduled_at)?;
        let mut unscheduled: BTreeSet<usize> = (0..part.tasks.len()).collect();
        if !self.schedule_all(&mut part, &mut unscheduled) {
            return None;
        }
        let schedule = Self::build_schedule(&part, &mut unscheduled);
        self.intervals = part.intervals;
        Some(schedule)
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn schedule_hint(&self, spec: &BackgroundSpec) -> Interval {
        let mut hint = spec.window();
        let max_load = self.config.max_background_load;

        for intrvl in &self.intervals {
            if intrvl.end() <= hint.begin() {
                continue;
            }
            if intrvl.begin() >= hint.end() {
                break;
            }
            if intrvl.load_factor < spec.load_factor() {
                // no room during this interval; earliest start is its end
                hint = hint.shifted_to(intrvl.end());
            }
            let elapsed = intrvl.begin().since(self.scheduled_at);
            let cum_back_load = if intrvl.cum_back_time != 0 && elapsed > 0 {
                intrvl.cum_back_time as f64 / elapsed as f64
            } else {
                0.0
            };
            if cum_back_load >= max_load {
                let spread = ((intrvl.cum_back_time + intrvl.background_time()) as f64 / max_load) as u64;
                hint = hint.shifted_to(hint.begin().max(self.scheduled_at.plus(spread)));
                debug!(from = %intrvl.end(), to = %hint.begin(), "hint delayed by average background load");
            }
        }
        hint
    }
}

fn is_disjoint(a: &[usize], b: &[usize]) -> bool {
    // both sorted ascending
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return false,
        }
    }
    true
}

/// Factory producing [`SortScheduler`]s that share a clock and options.
#[derive(Debug, Clone)]
pub struct SortSchedulerFactory {
    config: SortSchedulerConfig,
    clock: Arc<dyn Clock>,
}

impl SortSchedulerFactory {
    /// Factory for schedulers using `config` and `clock`.
    #[must_use]
    pub fn new(config: SortSchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }
}

impl SchedulerFactory for SortSchedulerFactory {
    fn create_scheduler(&self) -> Box<dyn Scheduler> {
        Box::new(SortScheduler::new(self.config.clone(), Arc::clone(&self.clock)))
    }
}
