//! Cancellation and completion tracking for background tasks.
//!
//! Sampling and other readers that may outlive a single call register
//! with the index's [`TaskCoordinator`]. Dropping the index cancels the
//! coordinator and waits until every registered task has finished before
//! any file is deleted.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{NodexError, Result};

#[derive(Debug, Default)]
struct CoordinatorState {
    active: usize,
    cancelled: bool,
}

/// Tracks running tasks of one index.
#[derive(Debug, Default)]
pub struct TaskCoordinator {
    state: Mutex<CoordinatorState>,
    idle: Condvar,
}

impl TaskCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Fails once the coordinator has been cancelled.
    pub fn new_task(self: &Arc<Self>) -> Result<TaskHandle> {
        let mut state = self.state.lock();
        if state.cancelled {
            return Err(NodexError::cancelled("index is being dropped"));
        }
        state.active += 1;
        Ok(TaskHandle {
            coordinator: Arc::clone(self),
        })
    }

    /// Ask every registered task to stop. New tasks are refused.
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn active_tasks(&self) -> usize {
        self.state.lock().active
    }

    /// Block until no task is registered.
    pub fn await_completion(&self) {
        let mut state = self.state.lock();
        while state.active > 0 {
            self.idle.wait(&mut state);
        }
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        state.active -= 1;
        if state.active == 0 {
            self.idle.notify_all();
        }
    }
}

/// A registered task. Completion is signalled when the handle is dropped.
#[derive(Debug)]
pub struct TaskHandle {
    coordinator: Arc<TaskCoordinator>,
}

impl TaskHandle {
    pub fn is_cancelled(&self) -> bool {
        self.coordinator.is_cancelled()
    }

    /// `Err(Cancelled)` once the owning index asked tasks to stop.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(NodexError::cancelled("task cancelled"))
        } else {
            Ok(())
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.coordinator.finish();
    }
}
