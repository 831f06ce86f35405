use serde::Serialize;

use super::types::TaskStatus;

/// Broadcast channel capacity for task events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State changes published by the task store for whoever renders them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TaskEvent {
    Submitted { task_id: String, subject: String },
    StatusChanged { task_id: String, status: TaskStatus },
    PollFailed { task_id: String, error: String },
    SubmissionFailed { subject: String, error: String },
}

impl TaskEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            TaskEvent::Submitted { task_id, .. }
            | TaskEvent::StatusChanged { task_id, .. }
            | TaskEvent::PollFailed { task_id, .. } => Some(task_id),
            TaskEvent::SubmissionFailed { .. } => None,
        }
    }
}
