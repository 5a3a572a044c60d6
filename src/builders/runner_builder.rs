//! Builder assembling a task runner from configuration.

use std::sync::Arc;

use crate::config::RunnerConfig;
use crate::core::{SchedulerError, SchedulerFactory, SortSchedulerFactory, TaskRunner};
use crate::util::clock::{Clock, SystemClock};

/// Assembles a [`TaskRunner`]. Unset parts default to the system clock and a
/// [`SortSchedulerFactory`] built from the runner's scheduler options.
#[derive(Default)]
pub struct RunnerBuilder {
    config: RunnerConfig,
    clock: Option<Arc<dyn Clock>>,
    factory: Option<Arc<dyn SchedulerFactory>>,
}

impl RunnerBuilder {
    /// Builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config`.
    #[must_use]
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Read time from `clock`.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build schedules with `factory` instead of the sort scheduler.
    #[must_use]
    pub fn scheduler_factory(mut self, factory: Arc<dyn SchedulerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Validate the configuration and start the runner.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] for a rejected configuration, or
    /// [`SchedulerError::Internal`] if a runner thread cannot be spawned.
    pub fn build(self) -> Result<TaskRunner, SchedulerError> {
        self.config
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(format!("config invalid: {e}")))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let factory = self.factory.unwrap_or_else(|| {
            Arc::new(SortSchedulerFactory::new(
                self.config.scheduler.clone(),
                Arc::clone(&clock),
            ))
        });
        TaskRunner::new(self.config, clock, factory)
    }
}

/// Runner built from `WINDOW_SCHED_*` environment variables with the system
/// clock.
///
/// # Errors
///
/// [`SchedulerError::InvalidConfig`] if a variable is malformed.
pub fn build_runner_from_env() -> Result<TaskRunner, SchedulerError> {
    let config = RunnerConfig::from_env().map_err(SchedulerError::InvalidConfig)?;
    RunnerBuilder::new().config(config).build()
}
