//! Tests for utility functions

use window_sched::util::{init_tracing, now_ms, Clock, Deadline, SimulatedClock, SystemClock};
use window_sched::Interval;

#[test]
fn test_deadline_ordering() {
    assert!(Deadline::at(10) < Deadline::at(20));
    assert!(Deadline::at(20) < Deadline::NEVER);
    assert_eq!(Deadline::NEVER.plus(5), Deadline::NEVER);
    assert_eq!(Deadline::at(5).since(Deadline::at(10)), 0);
}

#[test]
fn test_simulated_clock_shared() {
    let clock = SimulatedClock::new(100);
    clock.step(50);
    assert_eq!(clock.now(), Deadline::at(150));
    clock.set(10);
    assert_eq!(clock.now(), Deadline::at(10));
}

#[test]
fn test_system_clock_close_to_now_ms() {
    let before = now_ms();
    let now = SystemClock.now().ms();
    assert!(now >= before);
}

#[test]
fn test_interval_serializes() {
    let window = Interval::between(100, 200);
    let json = serde_json::to_string(&window).unwrap();
    let back: Interval = serde_json::from_str(&json).unwrap();
    assert_eq!(back, window);
    assert_eq!(back.duration(), 100);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    assert!(tracing::dispatcher::has_been_set());
}
