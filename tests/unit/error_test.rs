//! Tests for error types

use window_sched::core::{CallbackError, SchedulerError, TaskError};
use window_sched::Deadline;

#[test]
fn test_improper_window_error() {
    let err = SchedulerError::ImproperWindow {
        start: Deadline::at(200),
        finish: Deadline::at(100),
    };
    assert!(format!("{err}").starts_with("improper window"));
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("history_size must be greater than 0".to_string());
    assert_eq!(
        format!("{err}"),
        "invalid configuration: history_size must be greater than 0"
    );
}

#[test]
fn test_shutdown_error() {
    assert_eq!(format!("{}", SchedulerError::Shutdown), "runner has been shut down");
}

#[test]
fn test_task_errors() {
    assert_eq!(format!("{}", TaskError::Cancelled), "cancelled");
    assert_eq!(
        format!("{}", TaskError::StepFailed("disk full".to_string())),
        "step failed: disk full"
    );
    assert_eq!(TaskError::Dropped, TaskError::Dropped.clone());
}

#[test]
fn test_callback_error() {
    let err = CallbackError::Failed("listener gone".to_string());
    assert_eq!(format!("{err}"), "callback failed: listener gone");
}
