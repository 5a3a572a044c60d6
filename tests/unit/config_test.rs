//! Tests for configuration validation

use std::collections::HashMap;

use window_sched::config::{RunnerConfig, SortSchedulerConfig};

#[test]
fn test_runner_config_defaults() {
    let cfg = RunnerConfig::default();
    assert_eq!(cfg.drop_task_max, 0);
    assert_eq!(cfg.min_cleanup_interval_ms, 60_000);
    assert_eq!(cfg.history_size, 50);
    assert_eq!(cfg.max_idle_wait_ms, 1_000);
    assert!((cfg.scheduler.max_background_load - 1.0).abs() < f64::EPSILON);
    assert!(cfg.scheduler.overhead_load.abs() < f64::EPSILON);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_runner_config_invalid_history_size() {
    let invalid = RunnerConfig::default().with_history_size(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_runner_config_invalid_idle_wait() {
    let invalid = RunnerConfig::default().with_max_idle_wait_ms(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_runner_config_invalid_step_budget() {
    let invalid = RunnerConfig::default().with_step_budget(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_load_bounds() {
    let too_much_overhead = SortSchedulerConfig {
        max_background_load: 1.0,
        overhead_load: 1.0,
    };
    assert!(too_much_overhead.validate().is_err());

    let zero_background = SortSchedulerConfig {
        max_background_load: 0.0,
        overhead_load: 0.0,
    };
    assert!(zero_background.validate().is_err());

    let nested = RunnerConfig::default().with_scheduler(too_much_overhead);
    let err = nested.validate().unwrap_err();
    assert!(err.starts_with("scheduler invalid"));
}

#[test]
fn test_runner_config_from_json() {
    let json = r#"{
        "drop_task_max": 2,
        "min_cleanup_interval_ms": 500,
        "scheduler": { "max_background_load": 0.5 }
    }"#;

    let cfg = RunnerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.drop_task_max, 2);
    assert_eq!(cfg.min_cleanup_interval_ms, 500);
    assert_eq!(cfg.history_size, 50);
    assert!((cfg.scheduler.max_background_load - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_runner_config_from_json_rejects_invalid() {
    assert!(RunnerConfig::from_json_str("{ not json").is_err());
    assert!(RunnerConfig::from_json_str(r#"{ "history_size": 0 }"#).is_err());
}

#[test]
fn test_runner_config_from_lookup() {
    let vars: HashMap<&str, &str> = [
        ("WINDOW_SCHED_DROP_TASK_MAX", "3"),
        ("WINDOW_SCHED_STEP_BUDGET", " 25 "),
        ("WINDOW_SCHED_OVERHEAD_LOAD", "0.1"),
    ]
    .into_iter()
    .collect();

    let cfg = RunnerConfig::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap();
    assert_eq!(cfg.drop_task_max, 3);
    assert_eq!(cfg.step_budget, 25);
    assert!((cfg.scheduler.overhead_load - 0.1).abs() < f64::EPSILON);
    assert_eq!(cfg.max_idle_wait_ms, 1_000);
}

#[test]
fn test_runner_config_from_lookup_reports_bad_value() {
    let err = RunnerConfig::from_lookup(|k| {
        (k == "WINDOW_SCHED_HISTORY_SIZE").then(|| "lots".to_string())
    })
    .unwrap_err();
    assert!(err.contains("WINDOW_SCHED_HISTORY_SIZE"));
}
