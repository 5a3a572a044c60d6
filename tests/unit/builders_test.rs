//! Tests for builder modules

use std::sync::Arc;

use window_sched::core::{Schedule, Scheduler, SchedulerFactory, TaskRef};
use window_sched::{
    Deadline, RunnerBuilder, RunnerConfig, SchedulerError, SimulatedClock, Task,
};

struct Refuser;

impl Scheduler for Refuser {
    fn create_schedule(&mut self, _tasks: &[TaskRef]) -> Option<Schedule> {
        None
    }
}

#[test]
fn test_runner_builder_defaults() {
    let runner = RunnerBuilder::new().build().unwrap();
    assert_eq!(runner.config(), RunnerConfig::default());
    assert!(runner.accepted_tasks().is_empty());
    runner.shutdown();
}

#[test]
fn test_runner_builder_rejects_invalid_config() {
    let result = RunnerBuilder::new()
        .config(RunnerConfig::default().with_step_budget(0))
        .build();
    match result {
        Err(SchedulerError::InvalidConfig(msg)) => assert!(msg.starts_with("config invalid")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_runner_builder_custom_factory() {
    let factory: Arc<dyn SchedulerFactory> =
        Arc::new(|| -> Box<dyn Scheduler> { Box::new(Refuser) });
    let runner = RunnerBuilder::new()
        .clock(Arc::new(SimulatedClock::new(0)))
        .scheduler_factory(factory)
        .build()
        .unwrap();

    let task = Task::background(Deadline::at(10), Deadline::at(20), 0.1)
        .unwrap()
        .into_ref();
    assert!(!runner.submit(&task).unwrap());
    assert_eq!(runner.stats().refused, 1);
    runner.shutdown();
}
