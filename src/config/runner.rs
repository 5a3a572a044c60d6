//! Runner and scheduler configuration structures.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable prefix for [`RunnerConfig::from_env`].
pub const ENV_PREFIX: &str = "WINDOW_SCHED_";

/// Placement algorithm options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSchedulerConfig {
    /// Maximum average fraction of time background tasks may consume,
    /// used only by schedule hints.
    pub max_background_load: f64,
    /// Fraction of capacity reserved for threads other than the stepper.
    pub overhead_load: f64,
}

impl Default for SortSchedulerConfig {
    fn default() -> Self {
        Self {
            max_background_load: 1.0,
            overhead_load: 0.0,
        }
    }
}

impl SortSchedulerConfig {
    /// Validate load fractions.
    ///
    /// # Errors
    ///
    /// Describes the first out-of-range value.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_background_load > 0.0 && self.max_background_load <= 1.0) {
            return Err(format!(
                "max_background_load must be in (0, 1], got {}",
                self.max_background_load
            ));
        }
        if !(0.0..1.0).contains(&self.overhead_load) {
            return Err(format!(
                "overhead_load must be in [0, 1), got {}",
                self.overhead_load
            ));
        }
        Ok(())
    }
}

/// Task runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum tasks dropped by one admission cleanup pass. Zero disables cleanup.
    pub drop_task_max: usize,
    /// Minimum time between cleanup passes.
    pub min_cleanup_interval_ms: u64,
    /// Finished tasks retained for status output.
    pub history_size: usize,
    /// How often a running task's consumed time is flushed to the task.
    pub stats_update_interval_ms: u64,
    /// Upper bound on how long the stepping thread sleeps when idle.
    pub max_idle_wait_ms: u64,
    /// Advisory work budget passed to each `step` call.
    pub step_budget: u64,
    /// Placement algorithm options.
    pub scheduler: SortSchedulerConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            drop_task_max: 0,
            min_cleanup_interval_ms: 60_000,
            history_size: 50,
            stats_update_interval_ms: 1_000,
            max_idle_wait_ms: 1_000,
            step_budget: 100,
            scheduler: SortSchedulerConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cleanup drop limit.
    #[must_use]
    pub const fn with_drop_task_max(mut self, n: usize) -> Self {
        self.drop_task_max = n;
        self
    }

    /// Set the minimum cleanup interval.
    #[must_use]
    pub const fn with_min_cleanup_interval_ms(mut self, ms: u64) -> Self {
        self.min_cleanup_interval_ms = ms;
        self
    }

    /// Set the history size.
    #[must_use]
    pub const fn with_history_size(mut self, n: usize) -> Self {
        self.history_size = n;
        self
    }

    /// Set the stats flush interval.
    #[must_use]
    pub const fn with_stats_update_interval_ms(mut self, ms: u64) -> Self {
        self.stats_update_interval_ms = ms;
        self
    }

    /// Set the maximum idle wait.
    #[must_use]
    pub const fn with_max_idle_wait_ms(mut self, ms: u64) -> Self {
        self.max_idle_wait_ms = ms;
        self
    }

    /// Set the per-step work budget.
    #[must_use]
    pub const fn with_step_budget(mut self, budget: u64) -> Self {
        self.step_budget = budget;
        self
    }

    /// Replace the scheduler options.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SortSchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Maximum idle wait as a [`Duration`].
    #[must_use]
    pub const fn max_idle_wait(&self) -> Duration {
        Duration::from_millis(self.max_idle_wait_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Describes the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.history_size == 0 {
            return Err("history_size must be greater than 0".into());
        }
        if self.max_idle_wait_ms == 0 {
            return Err("max_idle_wait_ms must be greater than 0".into());
        }
        if self.step_budget == 0 {
            return Err("step_budget must be greater than 0".into());
        }
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `WINDOW_SCHED_*` environment variables, after
    /// loading a `.env` file if one is present.
    ///
    /// # Errors
    ///
    /// A variable that does not parse, or a validation failure.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`, keyed by full variable name.
    ///
    /// # Errors
    ///
    /// A value that does not parse, or a validation failure.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut cfg = Self::default();
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        override_with(&mut cfg.drop_task_max, "DROP_TASK_MAX", get("DROP_TASK_MAX"))?;
        override_with(
            &mut cfg.min_cleanup_interval_ms,
            "MIN_CLEANUP_INTERVAL_MS",
            get("MIN_CLEANUP_INTERVAL_MS"),
        )?;
        override_with(&mut cfg.history_size, "HISTORY_SIZE", get("HISTORY_SIZE"))?;
        override_with(
            &mut cfg.stats_update_interval_ms,
            "STATS_UPDATE_INTERVAL_MS",
            get("STATS_UPDATE_INTERVAL_MS"),
        )?;
        override_with(&mut cfg.max_idle_wait_ms, "MAX_IDLE_WAIT_MS", get("MAX_IDLE_WAIT_MS"))?;
        override_with(&mut cfg.step_budget, "STEP_BUDGET", get("STEP_BUDGET"))?;
        override_with(
            &mut cfg.scheduler.max_background_load,
            "MAX_BACKGROUND_LOAD",
            get("MAX_BACKGROUND_LOAD"),
        )?;
        override_with(
            &mut cfg.scheduler.overhead_load,
            "OVERHEAD_LOAD",
            get("OVERHEAD_LOAD"),
        )?;

        cfg.validate()?;
        Ok(cfg)
    }
}

fn override_with<T>(slot: &mut T, name: &str, raw: Option<String>) -> Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = raw {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| format!("{ENV_PREFIX}{name}: {e}"))?;
    }
    Ok(())
}
