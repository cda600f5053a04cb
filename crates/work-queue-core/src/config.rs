//! Consumer configuration.
//!
//! Configuration has two phases:
//!
//! 1. [`ConsumerConfiguration`] is a plain mutable builder with public
//!    fields and sensible defaults.
//! 2. [`ConsumerConfiguration::freeze`] validates it and produces a
//!    [`FrozenConfiguration`], an immutable shared snapshot consumed by the
//!    running engine. The retry delay registry is sealed as part of freezing.
//!
//! [`ConsumerSettings`] is the serde representation used when loading from
//! files or the environment; durations are expressed as integer seconds or
//! milliseconds there.

use crate::error::{ConfigurationError, QueueError};
use crate::error_type::ErrorTypeCatalog;
use crate::retry_delay::RetryDelayRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

// ============================================================================
// Sections
// ============================================================================

/// Pool limits for heartbeat sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartBeatThreadPoolConfiguration {
    /// Maximum concurrent heartbeat sends
    pub threads_max: usize,
    /// Whether stopping a heartbeat waits for an in-progress send
    pub wait_for_thread_pool_to_finish: bool,
}

impl Default for HeartBeatThreadPoolConfiguration {
    fn default() -> Self {
        Self {
            threads_max: 20,
            wait_for_thread_pool_to_finish: true,
        }
    }
}

/// Lease renewal and stale lease recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartBeatConfiguration {
    pub enabled: bool,
    /// Age after which a lease is considered stale and reclaimed
    pub time: Duration,
    /// Interval between lease renewals for an in-flight message
    pub update_time: Duration,
    /// Interval between stale lease sweeps
    pub monitor_time: Duration,
    pub thread_pool: HeartBeatThreadPoolConfiguration,
}

impl Default for HeartBeatConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            time: Duration::from_secs(600),
            update_time: Duration::from_secs(120),
            monitor_time: Duration::from_secs(3600),
            thread_pool: HeartBeatThreadPoolConfiguration::default(),
        }
    }
}

/// Worker pool sizing and shutdown behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfiguration {
    /// Number of pull loops
    pub worker_count: usize,
    /// Grace period after the stop signal before cancellation is signalled
    pub time_to_wait_for_workers_to_stop: Duration,
    /// Grace period after the cancel signal before stuck work is detached
    pub time_to_wait_for_workers_to_cancel: Duration,
    /// Detach unresponsive work after the cancel grace period instead of
    /// waiting for it indefinitely
    pub abort_worker_threads_when_stopping: bool,
    /// Only one idle worker polls the transport; the rest park until work arrives
    pub single_worker_when_no_work_found: bool,
    /// Delay between polls when a non-blocking transport returns nothing
    pub poll_interval: Duration,
}

impl Default for WorkerConfiguration {
    fn default() -> Self {
        Self {
            worker_count: 1,
            time_to_wait_for_workers_to_stop: Duration::from_secs(5),
            time_to_wait_for_workers_to_cancel: Duration::from_secs(10),
            abort_worker_threads_when_stopping: true,
            single_worker_when_no_work_found: true,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Purging of messages past their expiration time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageExpirationConfiguration {
    pub enabled: bool,
    pub monitor_time: Duration,
}

impl Default for MessageExpirationConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            monitor_time: Duration::from_secs(60),
        }
    }
}

/// Purging of old error queue entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageErrorConfiguration {
    pub enabled: bool,
    /// Error records older than this are deleted
    pub message_age: Duration,
    pub monitor_time: Duration,
}

impl Default for MessageErrorConfiguration {
    fn default() -> Self {
        Self {
            enabled: false,
            message_age: Duration::from_secs(30 * 24 * 60 * 60),
            monitor_time: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Limits for the default task scheduler
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskSchedulerConfiguration {
    /// Maximum concurrently running tasks; 0 uses the worker count
    pub maximum_tasks: usize,
    /// Whether shutdown waits for running tasks to drain
    pub wait_for_tasks_to_finish: bool,
}

// ============================================================================
// Builder
// ============================================================================

/// Mutable consumer configuration builder
#[derive(Debug, Clone, Default)]
pub struct ConsumerConfiguration {
    pub heart_beat: HeartBeatConfiguration,
    pub worker: WorkerConfiguration,
    pub message_expiration: MessageExpirationConfiguration,
    pub message_error: MessageErrorConfiguration,
    pub task_scheduler: TaskSchedulerConfiguration,
    pub retry_delay: RetryDelayRegistry,
}

impl ConsumerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and seal the configuration
    pub fn freeze(mut self) -> Result<FrozenConfiguration, QueueError> {
        self.validate()?;
        self.retry_delay.set_read_only();
        Ok(FrozenConfiguration {
            inner: Arc::new(self),
        })
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.worker.worker_count == 0 {
            return Err(invalid("worker.worker_count must be at least 1"));
        }
        let maximum_tasks = match self.task_scheduler.maximum_tasks {
            0 => self.worker.worker_count,
            n => n,
        };
        if maximum_tasks > Semaphore::MAX_PERMITS {
            return Err(invalid("task_scheduler.maximum_tasks is too large"));
        }

        if self.heart_beat.enabled {
            if self.heart_beat.update_time.is_zero() {
                return Err(invalid("heart_beat.update_time must be greater than zero"));
            }
            if self.heart_beat.update_time >= self.heart_beat.time {
                return Err(invalid(
                    "heart_beat.update_time must be shorter than heart_beat.time",
                ));
            }
            if self.heart_beat.monitor_time.is_zero() {
                return Err(invalid("heart_beat.monitor_time must be greater than zero"));
            }
            if self.heart_beat.thread_pool.threads_max == 0 {
                return Err(invalid("heart_beat.thread_pool.threads_max must be at least 1"));
            }
            if self.heart_beat.thread_pool.threads_max > Semaphore::MAX_PERMITS {
                return Err(invalid("heart_beat.thread_pool.threads_max is too large"));
            }
        }

        if self.message_expiration.enabled && self.message_expiration.monitor_time.is_zero() {
            return Err(invalid(
                "message_expiration.monitor_time must be greater than zero",
            ));
        }

        if self.message_error.enabled && self.message_error.monitor_time.is_zero() {
            return Err(invalid("message_error.monitor_time must be greater than zero"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> ConfigurationError {
    ConfigurationError::Invalid {
        message: message.to_string(),
    }
}

// ============================================================================
// Frozen Snapshot
// ============================================================================

/// Immutable configuration consumed by a running consumer
#[derive(Debug, Clone)]
pub struct FrozenConfiguration {
    inner: Arc<ConsumerConfiguration>,
}

impl FrozenConfiguration {
    pub fn heart_beat(&self) -> &HeartBeatConfiguration {
        &self.inner.heart_beat
    }

    pub fn worker(&self) -> &WorkerConfiguration {
        &self.inner.worker
    }

    pub fn message_expiration(&self) -> &MessageExpirationConfiguration {
        &self.inner.message_expiration
    }

    pub fn message_error(&self) -> &MessageErrorConfiguration {
        &self.inner.message_error
    }

    pub fn task_scheduler(&self) -> &TaskSchedulerConfiguration {
        &self.inner.task_scheduler
    }

    pub fn retry_delay(&self) -> &RetryDelayRegistry {
        &self.inner.retry_delay
    }

    /// Effective scheduler capacity
    pub fn maximum_tasks(&self) -> usize {
        match self.inner.task_scheduler.maximum_tasks {
            0 => self.inner.worker.worker_count,
            n => n,
        }
    }
}

// ============================================================================
// Serde Settings
// ============================================================================

/// File and environment representation of [`ConsumerConfiguration`]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConsumerSettings {
    pub heart_beat: HeartBeatSettings,
    pub worker: WorkerSettings,
    pub message_expiration: MessageExpirationSettings,
    pub message_error: MessageErrorSettings,
    pub task_scheduler: TaskSchedulerSettings,
    /// Retry schedules keyed by error type name
    pub retry_delays: Vec<RetryDelaySettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartBeatSettings {
    pub enabled: bool,
    pub time_seconds: u64,
    pub update_time_seconds: u64,
    pub monitor_time_seconds: u64,
    pub threads_max: usize,
    pub wait_for_thread_pool_to_finish: bool,
}

impl Default for HeartBeatSettings {
    fn default() -> Self {
        let defaults = HeartBeatConfiguration::default();
        Self {
            enabled: defaults.enabled,
            time_seconds: defaults.time.as_secs(),
            update_time_seconds: defaults.update_time.as_secs(),
            monitor_time_seconds: defaults.monitor_time.as_secs(),
            threads_max: defaults.thread_pool.threads_max,
            wait_for_thread_pool_to_finish: defaults.thread_pool.wait_for_thread_pool_to_finish,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub worker_count: usize,
    pub time_to_wait_for_workers_to_stop_seconds: u64,
    pub time_to_wait_for_workers_to_cancel_seconds: u64,
    pub abort_worker_threads_when_stopping: bool,
    pub single_worker_when_no_work_found: bool,
    pub poll_interval_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        let defaults = WorkerConfiguration::default();
        Self {
            worker_count: defaults.worker_count,
            time_to_wait_for_workers_to_stop_seconds: defaults
                .time_to_wait_for_workers_to_stop
                .as_secs(),
            time_to_wait_for_workers_to_cancel_seconds: defaults
                .time_to_wait_for_workers_to_cancel
                .as_secs(),
            abort_worker_threads_when_stopping: defaults.abort_worker_threads_when_stopping,
            single_worker_when_no_work_found: defaults.single_worker_when_no_work_found,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageExpirationSettings {
    pub enabled: bool,
    pub monitor_time_seconds: u64,
}

impl Default for MessageExpirationSettings {
    fn default() -> Self {
        let defaults = MessageExpirationConfiguration::default();
        Self {
            enabled: defaults.enabled,
            monitor_time_seconds: defaults.monitor_time.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageErrorSettings {
    pub enabled: bool,
    pub message_age_seconds: u64,
    pub monitor_time_seconds: u64,
}

impl Default for MessageErrorSettings {
    fn default() -> Self {
        let defaults = MessageErrorConfiguration::default();
        Self {
            enabled: defaults.enabled,
            message_age_seconds: defaults.message_age.as_secs(),
            monitor_time_seconds: defaults.monitor_time.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TaskSchedulerSettings {
    pub maximum_tasks: usize,
    pub wait_for_tasks_to_finish: bool,
}

/// One retry schedule entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryDelaySettings {
    /// Error type name resolved through an [`ErrorTypeCatalog`]
    pub error_type: String,
    #[serde(default)]
    pub delays_ms: Vec<u64>,
}

impl ConsumerSettings {
    /// Convert into a configuration builder, resolving error type names
    pub fn into_configuration(
        self,
        catalog: &ErrorTypeCatalog,
    ) -> Result<ConsumerConfiguration, QueueError> {
        let mut retry_delay = RetryDelayRegistry::new();
        for entry in self.retry_delays {
            let error_type = catalog.resolve(&entry.error_type)?;
            let delays = entry
                .delays_ms
                .into_iter()
                .map(Duration::from_millis)
                .collect();
            retry_delay.add(error_type, delays)?;
        }

        Ok(ConsumerConfiguration {
            heart_beat: HeartBeatConfiguration {
                enabled: self.heart_beat.enabled,
                time: Duration::from_secs(self.heart_beat.time_seconds),
                update_time: Duration::from_secs(self.heart_beat.update_time_seconds),
                monitor_time: Duration::from_secs(self.heart_beat.monitor_time_seconds),
                thread_pool: HeartBeatThreadPoolConfiguration {
                    threads_max: self.heart_beat.threads_max,
                    wait_for_thread_pool_to_finish: self.heart_beat.wait_for_thread_pool_to_finish,
                },
            },
            worker: WorkerConfiguration {
                worker_count: self.worker.worker_count,
                time_to_wait_for_workers_to_stop: Duration::from_secs(
                    self.worker.time_to_wait_for_workers_to_stop_seconds,
                ),
                time_to_wait_for_workers_to_cancel: Duration::from_secs(
                    self.worker.time_to_wait_for_workers_to_cancel_seconds,
                ),
                abort_worker_threads_when_stopping: self.worker.abort_worker_threads_when_stopping,
                single_worker_when_no_work_found: self.worker.single_worker_when_no_work_found,
                poll_interval: Duration::from_millis(self.worker.poll_interval_ms),
            },
            message_expiration: MessageExpirationConfiguration {
                enabled: self.message_expiration.enabled,
                monitor_time: Duration::from_secs(self.message_expiration.monitor_time_seconds),
            },
            message_error: MessageErrorConfiguration {
                enabled: self.message_error.enabled,
                message_age: Duration::from_secs(self.message_error.message_age_seconds),
                monitor_time: Duration::from_secs(self.message_error.monitor_time_seconds),
            },
            task_scheduler: TaskSchedulerConfiguration {
                maximum_tasks: self.task_scheduler.maximum_tasks,
                wait_for_tasks_to_finish: self.task_scheduler.wait_for_tasks_to_finish,
            },
            retry_delay,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
