//! Configuration models for the runner and the placement algorithm.

pub mod runner;

pub use runner::{RunnerConfig, SortSchedulerConfig, ENV_PREFIX};
