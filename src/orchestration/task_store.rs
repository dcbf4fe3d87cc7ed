// In-memory task table
//
// Every access goes through the store. The submission handler creates
// records, each task's runner mutates only its own record, and the sweep
// removes whole records.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::errors::{TaskError, TaskResult};
use crate::core::types::{Task, TaskSummary};

/// Concurrency-safe task table with an admission ceiling
#[derive(Clone)]
pub struct TaskStore {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    max_active: usize,
}

impl TaskStore {
    pub fn new(max_active: usize) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            max_active,
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Allocate a new `starting` record.
    ///
    /// The active-task check and the insert happen under one lock, so two
    /// concurrent submissions cannot both take the last slot. A rejected
    /// submission leaves no record behind.
    pub fn create(&self, total_files: usize) -> TaskResult<Task> {
        let mut tasks = self.tasks.lock();

        let active = tasks.values().filter(|t| !t.status.is_terminal()).count();
        if active >= self.max_active {
            return Err(TaskError::ServerBusy {
                active,
                limit: self.max_active,
            });
        }

        let id = Uuid::new_v4().to_string();
        let task = Task::new(id.clone(), total_files);
        tasks.insert(id.clone(), task.clone());
        debug!(task_id = %id, total_files, "Task created");
        Ok(task)
    }

    /// Snapshot of one record
    pub fn get(&self, id: &str) -> TaskResult<Task> {
        self.tasks
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    /// Apply an update to one record while holding the table lock.
    pub fn mutate<R>(&self, id: &str, f: impl FnOnce(&mut Task) -> R) -> TaskResult<R> {
        let mut tasks = self.tasks.lock();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        Ok(f(task))
    }

    /// Remove every record older than `max_age`, whatever its status.
    ///
    /// Returns the number of records removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|_, task| task.age(now) <= max_age);
        let removed = before - tasks.len();
        if removed > 0 {
            info!("Swept {} expired task(s), {} remaining", removed, tasks.len());
        }
        removed
    }

    /// Tasks that are neither completed nor errored
    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|t| !t.status.is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Summaries of every retained task, oldest first
    pub fn list(&self) -> Vec<TaskSummary> {
        let tasks = self.tasks.lock();
        let mut summaries: Vec<TaskSummary> = tasks.values().map(TaskSummary::from).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }
}
