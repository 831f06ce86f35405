use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;

use super::events::{TaskEvent, EVENT_CHANNEL_CAPACITY};
use super::types::{Task, TaskStatus};

#[derive(Default)]
struct Entries {
    tasks: HashMap<String, Task>,
    order: Vec<String>,
}

/// Result of applying a status report to a tracked task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Updated(TaskStatus),
    Unchanged(TaskStatus),
    /// The task was already terminal; the report was ignored.
    Settled(TaskStatus),
    Missing,
}

/// In-memory set of submitted tasks. Lives as long as the session.
pub struct TaskStore {
    entries: RwLock<Entries>,
    in_flight: Mutex<HashSet<String>>,
    last_error: RwLock<Option<String>>,
    events: broadcast::Sender<TaskEvent>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(Entries::default()),
            in_flight: Mutex::new(HashSet::new()),
            last_error: RwLock::new(None),
            events,
        }
    }

    /// Registers a freshly submitted task as `PENDING`. Returns `false` and
    /// leaves the existing entry alone if the id is already tracked.
    pub fn insert(&self, id: &str, subject: &str) -> bool {
        {
            let mut entries = self.write();
            if entries.tasks.contains_key(id) {
                return false;
            }
            entries.tasks.insert(id.to_string(), Task::new(id, subject));
            entries.order.push(id.to_string());
        }
        self.publish(TaskEvent::Submitted {
            task_id: id.to_string(),
            subject: subject.to_string(),
        });
        true
    }

    /// Overwrites status and result from a lookup response. `subject` and
    /// `submitted_at` are kept; terminal tasks never change again.
    pub fn apply(&self, id: &str, status: TaskStatus, result: Option<Value>) -> ApplyOutcome {
        let outcome = {
            let mut entries = self.write();
            let Some(task) = entries.tasks.get_mut(id) else {
                return ApplyOutcome::Missing;
            };
            if task.is_terminal() {
                return ApplyOutcome::Settled(task.status);
            }

            let result = if status.is_terminal() { result } else { None };
            if task.status == status && task.result == result {
                ApplyOutcome::Unchanged(status)
            } else {
                task.status = status;
                task.result = result;
                if status.is_terminal() {
                    task.finished_at = Some(Utc::now());
                }
                ApplyOutcome::Updated(status)
            }
        };

        if let ApplyOutcome::Updated(status) = outcome {
            self.publish(TaskEvent::StatusChanged {
                task_id: id.to_string(),
                status,
            });
        }
        outcome
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.read().tasks.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().tasks.contains_key(id)
    }

    /// Snapshot of every tracked task in submission order.
    pub fn list(&self) -> Vec<Task> {
        let entries = self.read();
        entries
            .order
            .iter()
            .filter_map(|id| entries.tasks.get(id).cloned())
            .collect()
    }

    /// Ids of tasks that have not reached a terminal state yet.
    pub fn pending_ids(&self) -> Vec<String> {
        let entries = self.read();
        entries
            .order
            .iter()
            .filter(|id| entries.tasks.get(*id).is_some_and(|t| !t.is_terminal()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks `id` as awaiting a lookup response. `None` if a poll for the
    /// same id is already outstanding.
    pub fn try_begin_poll(&self, id: &str) -> Option<PollGuard<'_>> {
        if !self.in_flight().insert(id.to_string()) {
            return None;
        }
        Some(PollGuard {
            store: self,
            id: id.to_string(),
        })
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight().contains(id)
    }

    /// Message from the most recent failed submission or poll.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn record_submission_failure(&self, subject: &str, error: &str) {
        self.set_error(format!("failed to submit {}: {}", subject, error));
        self.publish(TaskEvent::SubmissionFailed {
            subject: subject.to_string(),
            error: error.to_string(),
        });
    }

    pub fn record_poll_failure(&self, id: &str, error: &str) {
        self.set_error(format!("failed to check status for {}: {}", id, error));
        self.publish(TaskEvent::PollFailed {
            task_id: id.to_string(),
            error: error.to_string(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    fn set_error(&self, message: String) {
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    fn publish(&self, event: TaskEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the in-flight marker for one id when dropped.
pub struct PollGuard<'a> {
    store: &'a TaskStore,
    id: String,
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.store.in_flight().remove(&self.id);
    }
}
