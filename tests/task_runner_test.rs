//! End-to-end runner behavior on a simulated clock.
//!
//! Foreground steppers advance the shared clock themselves, so simulated
//! time only moves while work is being done.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use window_sched::core::{AppResult, CallbackError, TaskError};
use window_sched::util::init_tracing;
use window_sched::{
    BackgroundSpec, Clock, Deadline, Disposition, EventType, Interval, RunnerBuilder,
    RunnerConfig, SchedulerError, SimulatedClock, Stepper, Task, TaskRef, TaskRunner,
};

const WAIT: Duration = Duration::from_secs(5);

type Events = (Sender<(String, EventType)>, Receiver<(String, EventType)>);

struct Ticker {
    left: u32,
    ms: u64,
    clock: Arc<SimulatedClock>,
}

impl Stepper for Ticker {
    fn step(&mut self, _budget: u64) -> AppResult<u64> {
        self.clock.step(self.ms);
        self.left = self.left.saturating_sub(1);
        Ok(1)
    }

    fn is_finished(&self) -> bool {
        self.left == 0
    }
}

/// Never finishes and never advances the clock.
struct Spinner;

impl Stepper for Spinner {
    fn step(&mut self, _budget: u64) -> AppResult<u64> {
        thread::sleep(Duration::from_millis(1));
        Ok(0)
    }

    fn is_finished(&self) -> bool {
        false
    }
}

fn recorder(
    tx: Sender<(String, EventType)>,
) -> impl Fn(&TaskRef, EventType) -> Result<(), CallbackError> + Send + Sync {
    move |task, event| {
        let _ = tx.send((task.label(), event));
        Ok(())
    }
}

fn runner_with(config: RunnerConfig, clock: &Arc<SimulatedClock>) -> TaskRunner {
    init_tracing();
    RunnerBuilder::new()
        .config(config.with_max_idle_wait_ms(5))
        .clock(clock.clone())
        .build()
        .unwrap()
}

fn ticker(clock: &Arc<SimulatedClock>, steps: u32, ms: u64) -> Ticker {
    Ticker {
        left: steps,
        ms,
        clock: Arc::clone(clock),
    }
}

fn step_task(
    name: &str,
    window: (u64, u64),
    est: u64,
    stepper: impl Stepper + 'static,
    events: &Events,
) -> TaskRef {
    Task::step(Deadline::at(window.0), Deadline::at(window.1), est, stepper)
        .unwrap()
        .with_name(name)
        .with_callback(recorder(events.0.clone()))
        .into_ref()
}

fn expect_event(events: &Events, label: &str, event: EventType) {
    loop {
        let (got, ev) = events
            .1
            .recv_timeout(WAIT)
            .unwrap_or_else(|_| panic!("no {event:?} for {label}"));
        if got == label && ev == event {
            return;
        }
    }
}

#[test]
fn test_task_runs_to_completion() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let events = unbounded();
    let t = step_task("t", (0, 1000), 100, ticker(&clock, 10, 10), &events);

    assert!(runner.submit(&t).unwrap());
    expect_event(&events, "t", EventType::Start);
    expect_event(&events, "t", EventType::Finish);
    assert_eq!(t.disposition(), Some(Disposition::Completed));
    assert_eq!(t.time_used(), 100);
    assert!(t.cookie().is_none());

    let status = runner.status();
    assert_eq!(status.stats.completed, 1);
    assert_eq!(status.accepted_tasks, 0);
    assert_eq!(status.history.len(), 1);
    assert_eq!(status.history[0].label, "t");
    assert!(status.to_json().unwrap().contains("\"completed\""));
    runner.shutdown();
}

#[test]
fn test_two_tasks_both_complete() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let events = unbounded();
    let a = step_task("a", (0, 1000), 50, ticker(&clock, 5, 10), &events);
    let b = step_task("b", (0, 600), 40, ticker(&clock, 4, 10), &events);

    assert!(runner.submit(&a).unwrap());
    assert!(runner.submit(&b).unwrap());
    expect_event(&events, "a", EventType::Finish);
    // b may already have finished
    while b.disposition().is_none() {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(b.disposition(), Some(Disposition::Completed));
    assert_eq!(a.disposition(), Some(Disposition::Completed));
    assert_eq!(runner.stats().accepted, 2);
    runner.shutdown();
}

#[test]
fn test_background_task_lifecycle() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let events: Events = unbounded();
    let b = Task::background(Deadline::at(0), Deadline::at(50), 0.5)
        .unwrap()
        .with_name("b")
        .with_callback(recorder(events.0.clone()))
        .into_ref();

    assert!(runner.submit(&b).unwrap());
    expect_event(&events, "b", EventType::Start);
    assert!((runner.background_load() - 0.5).abs() < 1e-9);

    clock.set(60);
    expect_event(&events, "b", EventType::Finish);
    assert_eq!(b.disposition(), Some(Disposition::Completed));
    assert!(runner.background_load().abs() < 1e-9);
    runner.shutdown();
}

#[test]
fn test_background_reports_early_finish() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let events: Events = unbounded();
    let b = Task::background(Deadline::at(0), Deadline::at(1_000), 0.3)
        .unwrap()
        .with_name("b")
        .with_callback(recorder(events.0.clone()))
        .into_ref();

    assert!(runner.submit(&b).unwrap());
    expect_event(&events, "b", EventType::Start);
    b.task_is_finished();
    expect_event(&events, "b", EventType::Finish);
    assert_eq!(b.disposition(), Some(Disposition::Completed));
    runner.shutdown();
}

#[test]
fn test_concurrent_half_loads_refused() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let half = || {
        Task::background(Deadline::at(100), Deadline::at(200), 0.5)
            .unwrap()
            .into_ref()
    };
    assert!(runner.submit(&half()).unwrap());
    assert!(runner.submit(&half()).unwrap());
    let third = half();
    assert!(!runner.is_schedulable(&third));
    assert!(!runner.submit(&third).unwrap());
    assert_eq!(runner.stats().refused, 1);
    assert_eq!(runner.accepted_tasks().len(), 2);
    runner.shutdown();
}

#[test]
fn test_cancel_delivers_one_finish() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let events = unbounded();
    let t = step_task("t", (10_000, 20_000), 100, Spinner, &events);

    assert!(runner.submit(&t).unwrap());
    assert_eq!(runner.current_schedule().chunks().count(), 1);
    assert!(runner.cancel(&t));
    assert!(!runner.cancel(&t));
    expect_event(&events, "t", EventType::Finish);
    assert_eq!(t.disposition(), Some(Disposition::Cancelled));
    assert!(runner.current_schedule().is_empty());

    runner.shutdown();
    assert!(events.1.try_recv().is_err());
    assert_eq!(runner.stats().cancelled, 1);
}

#[test]
fn test_started_task_dropped_for_urgent_one() {
    let clock = Arc::new(SimulatedClock::new(0));
    let config = RunnerConfig::default()
        .with_drop_task_max(1)
        .with_min_cleanup_interval_ms(0);
    let runner = runner_with(config, &clock);
    let events = unbounded();
    let low = step_task("low", (0, 1000), 900, Spinner, &events);
    let urgent = step_task("urgent", (0, 200), 150, ticker(&clock, 15, 10), &events);

    assert!(runner.submit(&low).unwrap());
    // only started tasks are eligible for dropping
    expect_event(&events, "low", EventType::Start);
    assert!(runner.submit(&urgent).unwrap());
    expect_event(&events, "low", EventType::Finish);
    expect_event(&events, "urgent", EventType::Finish);

    assert!(low.is_dropped());
    assert_eq!(low.error(), Some(TaskError::Dropped));
    assert_eq!(urgent.disposition(), Some(Disposition::Completed));
    let history = runner.status().history;
    let dropped = history.iter().find(|e| e.label == "low").unwrap();
    assert_eq!(dropped.disposition, Some(Disposition::Dropped));
    runner.shutdown();
}

#[test]
fn test_cleanup_disabled_refuses() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let events = unbounded();
    let low = step_task("low", (0, 1000), 900, Spinner, &events);
    let urgent = step_task("urgent", (0, 200), 150, ticker(&clock, 15, 10), &events);

    assert!(runner.submit(&low).unwrap());
    assert!(!runner.submit(&urgent).unwrap());
    assert!(!low.is_finished());
    assert!(!urgent.is_accepted());
    runner.shutdown();
}

#[test]
fn test_abort_on_start_withdraws_task() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let (tx, rx) = unbounded();
    let t = Task::step(Deadline::at(0), Deadline::at(1000), 500, Spinner)
        .unwrap()
        .with_name("t")
        .with_callback(move |_: &TaskRef, event: EventType| {
            let _ = tx.send(event);
            if event == EventType::Start {
                Err(CallbackError::Abort)
            } else {
                Ok(())
            }
        })
        .into_ref();

    assert!(runner.submit(&t).unwrap());
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), EventType::Start);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), EventType::Finish);
    assert_eq!(t.disposition(), Some(Disposition::Errored));
    assert_eq!(t.error(), Some(TaskError::Aborted));
    runner.shutdown();
}

/// Calls back into the runner from inside `step`.
struct Reentrant {
    runner: Arc<TaskRunner>,
    me: Arc<Mutex<Option<TaskRef>>>,
    follow_up: Option<TaskRef>,
    done: Sender<(bool, bool, Option<String>)>,
}

impl Stepper for Reentrant {
    fn step(&mut self, _budget: u64) -> AppResult<u64> {
        if let Some(me) = self.me.lock().take() {
            let running = self.runner.status().running;
            let submitted = match self.follow_up.take() {
                Some(next) => self.runner.submit(&next)?,
                None => false,
            };
            let cancelled = self.runner.cancel(&me);
            let _ = self.done.send((submitted, cancelled, running));
        }
        Ok(1)
    }

    fn is_finished(&self) -> bool {
        false
    }
}

#[test]
fn test_step_may_call_back_into_runner() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = Arc::new(runner_with(RunnerConfig::default(), &clock));
    let events = unbounded();
    let (done_tx, done_rx) = unbounded();
    let me = Arc::new(Mutex::new(None));
    let next = step_task("next", (0, 1000), 30, ticker(&clock, 3, 10), &events);
    let stepper = Reentrant {
        runner: Arc::clone(&runner),
        me: Arc::clone(&me),
        follow_up: Some(next.clone()),
        done: done_tx,
    };
    let first = step_task("first", (0, 1000), 100, stepper, &events);
    *me.lock() = Some(first.clone());

    assert!(runner.submit(&first).unwrap());
    let (submitted, cancelled, running) = done_rx
        .recv_timeout(WAIT)
        .expect("step calling into the runner never returned");
    assert!(submitted);
    assert!(cancelled);
    assert_eq!(running.as_deref(), Some("first"));

    expect_event(&events, "first", EventType::Finish);
    expect_event(&events, "next", EventType::Finish);
    assert_eq!(first.disposition(), Some(Disposition::Cancelled));
    assert_eq!(next.disposition(), Some(Disposition::Completed));
    runner.shutdown();
}

/// Shuts the runner down from inside `step`.
struct ShutdownStep {
    runner: Arc<TaskRunner>,
    done: Sender<()>,
}

impl Stepper for ShutdownStep {
    fn step(&mut self, _budget: u64) -> AppResult<u64> {
        self.runner.shutdown();
        let _ = self.done.send(());
        Ok(1)
    }

    fn is_finished(&self) -> bool {
        false
    }
}

#[test]
fn test_shutdown_from_step() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = Arc::new(runner_with(RunnerConfig::default(), &clock));
    let events = unbounded();
    let (done_tx, done_rx) = unbounded();
    let stepper = ShutdownStep {
        runner: Arc::clone(&runner),
        done: done_tx,
    };
    let t = step_task("t", (0, 1000), 100, stepper, &events);

    assert!(runner.submit(&t).unwrap());
    done_rx
        .recv_timeout(WAIT)
        .expect("shutdown from a step never returned");
    assert!(matches!(runner.submit(&t), Err(SchedulerError::Shutdown)));
}

#[test]
fn test_failing_callback_does_not_stop_runner() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let events = unbounded();
    let noisy = Task::step(Deadline::at(0), Deadline::at(1000), 20, ticker(&clock, 2, 10))
        .unwrap()
        .with_callback(|_: &TaskRef, _: EventType| -> Result<(), CallbackError> {
            panic!("callback exploded")
        })
        .into_ref();
    let quiet = step_task("quiet", (0, 1000), 20, ticker(&clock, 2, 10), &events);

    assert!(runner.submit(&noisy).unwrap());
    assert!(runner.submit(&quiet).unwrap());
    expect_event(&events, "quiet", EventType::Finish);
    while noisy.disposition().is_none() {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(noisy.disposition(), Some(Disposition::Completed));
    runner.shutdown();
}

#[test]
fn test_hint_follows_current_schedule() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let spec = BackgroundSpec::new(Interval::between(100, 201), 0.7, Deadline::at(1000)).unwrap();
    assert_eq!(runner.schedule_hint(&spec), Interval::between(100, 201));

    for (start, end, lf) in [(200, 300, 0.4), (400, 600, 0.5)] {
        let b = Task::background(Deadline::at(start), Deadline::at(end), lf)
            .unwrap()
            .into_ref();
        assert!(runner.submit(&b).unwrap());
    }
    let hint = runner.schedule_hint(&spec);
    assert_eq!(hint, Interval::between(600, 701));
    assert!(spec.accepts(&hint));
    assert!(runner.submit(&spec.task_at(hint).unwrap().into_ref()).unwrap());
    runner.shutdown();
}

#[test]
fn test_submit_after_shutdown_fails() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    runner.shutdown();
    runner.shutdown();
    let events = unbounded();
    let t = step_task("t", (0, 1000), 10, Spinner, &events);
    assert!(matches!(runner.submit(&t), Err(SchedulerError::Shutdown)));
}

#[test]
fn test_invalid_config_rejected() {
    let result = RunnerBuilder::new()
        .config(RunnerConfig::default().with_history_size(0))
        .build();
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_expired_task_times_out() {
    let clock = Arc::new(SimulatedClock::new(0));
    let runner = runner_with(RunnerConfig::default(), &clock);
    let events = unbounded();
    // needs 20 steps of 10ms but the window closes after 100ms
    let slow = step_task("slow", (0, 100), 100, ticker(&clock, 20, 10), &events);
    slow.set_overrun_allowed(true);

    assert!(runner.submit(&slow).unwrap());
    expect_event(&events, "slow", EventType::Finish);
    assert_eq!(slow.disposition(), Some(Disposition::Expired));
    assert_eq!(slow.error(), Some(TaskError::Timeout));
    assert!(clock.now() >= Deadline::at(100));
    runner.shutdown();
}

#[test]
fn test_dropped_runner_detaches() {
    let clock = Arc::new(SimulatedClock::new(0));
    let events = unbounded();
    let t = step_task("t", (0, 1000), 100, ticker(&clock, 10, 10), &events);
    {
        let runner = runner_with(RunnerConfig::default(), &clock);
        assert!(runner.submit(&t).unwrap());
        expect_event(&events, "t", EventType::Finish);
    }
    assert_eq!(t.disposition(), Some(Disposition::Completed));
}
