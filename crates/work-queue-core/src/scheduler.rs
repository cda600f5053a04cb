//! Bounded task scheduling with optional work groups.
//!
//! Workers ask the scheduler for room before dequeuing, so a consumer never
//! holds more messages than it can process. A [`WorkGroup`] carves out a
//! slice of the scheduler with its own concurrency limit and wait queue;
//! tasks in one group never run more than `concurrency_level` at a time.
//!
//! # Examples
//!
//! ```rust
//! use work_queue_core::scheduler::{RoomForNewTask, SemaphoreTaskScheduler, TaskScheduler};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let scheduler = SemaphoreTaskScheduler::new(4, false);
//! scheduler.start().unwrap();
//! let group = scheduler.add_work_group("reports", 1, 10).unwrap();
//!
//! assert_eq!(scheduler.room_for_new_work_group_task(&group), RoomForNewTask::RoomForTask);
//! scheduler.add_task(Some(&group), Box::pin(async {})).unwrap();
//! # }
//! ```

use crate::config::FrozenConfiguration;
use crate::context::lock;
use crate::error::{ConfigurationError, QueueError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

/// Unit of work submitted to a scheduler
pub type ScheduledTask = BoxFuture<'static, ()>;

/// Whether a new task can be accepted right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomForNewTask {
    RoomForTask,
    /// Full; ask again later
    NoRoom,
    /// Not started, or shut down; stop asking
    Unavailable,
}

/// Named concurrency partition within a scheduler.
///
/// Groups are identified by name only.
#[derive(Debug, Clone)]
pub struct WorkGroup {
    name: String,
    concurrency_level: usize,
    max_queue_size: usize,
}

impl WorkGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency_level(&self) -> usize {
        self.concurrency_level
    }

    /// Tasks allowed to wait for a slot; 0 means unbounded
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }
}

impl PartialEq for WorkGroup {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for WorkGroup {}

impl Hash for WorkGroup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Schedules message processing tasks
#[async_trait]
pub trait TaskScheduler: Send + Sync + 'static {
    /// Begin accepting tasks. May only be called once.
    fn start(&self) -> Result<(), QueueError>;

    fn room_for_new_task(&self) -> RoomForNewTask;

    fn room_for_new_work_group_task(&self, group: &WorkGroup) -> RoomForNewTask;

    /// Register a work group, or return the existing group of that name if
    /// its settings match
    fn add_work_group(
        &self,
        name: &str,
        concurrency_level: usize,
        max_queue_size: usize,
    ) -> Result<WorkGroup, QueueError>;

    /// Submit a task, optionally inside a work group
    fn add_task(&self, group: Option<&WorkGroup>, task: ScheduledTask) -> Result<(), QueueError>;

    /// Resolve once there is room for a task, or the scheduler became
    /// unavailable
    async fn wait_for_room(&self, group: Option<&WorkGroup>);

    /// Stop accepting tasks, waiting for running ones if so configured
    async fn shutdown(&self);

    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

// ============================================================================
// Semaphore Scheduler
// ============================================================================

struct GroupState {
    group: WorkGroup,
    permits: Arc<Semaphore>,
    /// Tasks submitted but not yet holding a group permit
    pending: AtomicUsize,
}

/// Default scheduler backed by tokio semaphores.
///
/// A global semaphore bounds every running task; each work group adds its
/// own semaphore. A group task holds its group permit for its whole run.
///
/// Tasks that were accepted but do not yet hold a global permit count
/// against the free permits, so room is only reported for work that can
/// start right away.
pub struct SemaphoreTaskScheduler {
    maximum_tasks: usize,
    wait_for_tasks_to_finish: bool,
    global: Arc<Semaphore>,
    /// Accepted tasks waiting for a global permit
    global_pending: Arc<AtomicUsize>,
    groups: Mutex<HashMap<String, Arc<GroupState>>>,
    tracker: TaskTracker,
    room_changed: Arc<Notify>,
    shutdown: CancellationToken,
    started: AtomicBool,
    disposed: AtomicBool,
}

impl SemaphoreTaskScheduler {
    pub fn new(maximum_tasks: usize, wait_for_tasks_to_finish: bool) -> Self {
        let maximum_tasks = maximum_tasks.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            maximum_tasks,
            wait_for_tasks_to_finish,
            global: Arc::new(Semaphore::new(maximum_tasks)),
            global_pending: Arc::new(AtomicUsize::new(0)),
            groups: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
            room_changed: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Scheduler sized from a consumer configuration
    pub fn from_configuration(configuration: &FrozenConfiguration) -> Self {
        Self::new(
            configuration.maximum_tasks(),
            configuration.task_scheduler().wait_for_tasks_to_finish,
        )
    }

    pub fn maximum_tasks(&self) -> usize {
        self.maximum_tasks
    }

    /// Tasks currently running or waiting for a permit
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }

    fn has_global_room(&self) -> bool {
        self.global.available_permits() > self.global_pending.load(Ordering::SeqCst)
    }

    fn availability(&self) -> Option<RoomForNewTask> {
        if self.is_disposed() || !self.started.load(Ordering::SeqCst) || self.shutdown.is_cancelled()
        {
            return Some(RoomForNewTask::Unavailable);
        }
        None
    }

    fn group_state(&self, group: &WorkGroup) -> Result<Arc<GroupState>, QueueError> {
        lock(&self.groups)
            .get(group.name())
            .cloned()
            .ok_or_else(|| {
                ConfigurationError::Invalid {
                    message: format!("work group '{}' is not registered", group.name()),
                }
                .into()
            })
    }

    fn ensure_accepting(&self) -> Result<(), QueueError> {
        if self.is_disposed() {
            return Err(QueueError::disposed("TaskScheduler"));
        }
        if !self.started.load(Ordering::SeqCst) || self.shutdown.is_cancelled() {
            return Err(QueueError::NotStarted {
                component: "TaskScheduler".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TaskScheduler for SemaphoreTaskScheduler {
    fn start(&self) -> Result<(), QueueError> {
        if self.is_disposed() {
            return Err(QueueError::disposed("TaskScheduler"));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(QueueError::already_started("TaskScheduler"));
        }
        info!(maximum_tasks = self.maximum_tasks, "Task scheduler started");
        Ok(())
    }

    fn room_for_new_task(&self) -> RoomForNewTask {
        if let Some(room) = self.availability() {
            return room;
        }
        if self.has_global_room() {
            RoomForNewTask::RoomForTask
        } else {
            RoomForNewTask::NoRoom
        }
    }

    fn room_for_new_work_group_task(&self, group: &WorkGroup) -> RoomForNewTask {
        if let Some(room) = self.availability() {
            return room;
        }
        let Ok(state) = self.group_state(group) else {
            return RoomForNewTask::Unavailable;
        };

        let free = state.permits.available_permits();
        let pending = state.pending.load(Ordering::SeqCst);
        let queue_room = state.group.max_queue_size > 0
            && pending < free + state.group.max_queue_size;

        if (free > pending || queue_room) && self.has_global_room() {
            RoomForNewTask::RoomForTask
        } else {
            RoomForNewTask::NoRoom
        }
    }

    fn add_work_group(
        &self,
        name: &str,
        concurrency_level: usize,
        max_queue_size: usize,
    ) -> Result<WorkGroup, QueueError> {
        if self.is_disposed() {
            return Err(QueueError::disposed("TaskScheduler"));
        }
        if name.is_empty() {
            return Err(crate::error::ValidationError::Required {
                field: "name".to_string(),
            }
            .into());
        }
        if concurrency_level == 0 {
            return Err(crate::error::ValidationError::OutOfRange {
                field: "concurrency_level".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        if concurrency_level > Semaphore::MAX_PERMITS {
            return Err(crate::error::ValidationError::OutOfRange {
                field: "concurrency_level".to_string(),
                message: format!("must be at most {}", Semaphore::MAX_PERMITS),
            }
            .into());
        }

        let mut groups = lock(&self.groups);
        if let Some(existing) = groups.get(name) {
            let same = existing.group.concurrency_level == concurrency_level
                && existing.group.max_queue_size == max_queue_size;
            if same {
                return Ok(existing.group.clone());
            }
            return Err(ConfigurationError::WorkGroupConflict {
                name: name.to_string(),
            }
            .into());
        }

        let group = WorkGroup {
            name: name.to_string(),
            concurrency_level,
            max_queue_size,
        };
        groups.insert(
            name.to_string(),
            Arc::new(GroupState {
                group: group.clone(),
                permits: Arc::new(Semaphore::new(concurrency_level)),
                pending: AtomicUsize::new(0),
            }),
        );
        debug!(group = name, concurrency_level, max_queue_size, "Work group added");
        Ok(group)
    }

    fn add_task(&self, group: Option<&WorkGroup>, task: ScheduledTask) -> Result<(), QueueError> {
        self.ensure_accepting()?;

        let global = self.global.clone();
        let global_pending = self.global_pending.clone();
        let room_changed = self.room_changed.clone();

        match group {
            None => {
                global_pending.fetch_add(1, Ordering::SeqCst);
                self.tracker.spawn(async move {
                    let permit = global.acquire_owned().await;
                    global_pending.fetch_sub(1, Ordering::SeqCst);
                    if let Ok(_permit) = permit {
                        task.await;
                    }
                    room_changed.notify_waiters();
                });
            }
            Some(group) => {
                let state = self.group_state(group)?;
                let max = state.group.max_queue_size;
                let free = state.permits.available_permits();
                let pending = state.pending.fetch_add(1, Ordering::SeqCst);
                if max > 0 && pending >= free + max {
                    state.pending.fetch_sub(1, Ordering::SeqCst);
                    return Err(QueueError::WorkGroupQueueFull {
                        group: group.name().to_string(),
                        max_queue_size: max,
                    });
                }

                self.tracker.spawn(async move {
                    let group_permit = state.permits.clone().acquire_owned().await;
                    state.pending.fetch_sub(1, Ordering::SeqCst);
                    if let Ok(_group_permit) = group_permit {
                        global_pending.fetch_add(1, Ordering::SeqCst);
                        let permit = global.acquire_owned().await;
                        global_pending.fetch_sub(1, Ordering::SeqCst);
                        if let Ok(_permit) = permit {
                            task.await;
                        }
                    }
                    room_changed.notify_waiters();
                });
            }
        }
        Ok(())
    }

    async fn wait_for_room(&self, group: Option<&WorkGroup>) {
        loop {
            let notified = self.room_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let room = match group {
                Some(group) => self.room_for_new_work_group_task(group),
                None => self.room_for_new_task(),
            };
            if room != RoomForNewTask::NoRoom {
                return;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(250)) => {}
            }
        }
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.room_changed.notify_waiters();
        if self.wait_for_tasks_to_finish {
            self.tracker.wait().await;
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.tracker.close();
        self.global.close();
        for state in lock(&self.groups).values() {
            state.permits.close();
        }
        self.room_changed.notify_waiters();
        debug!("Task scheduler disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
