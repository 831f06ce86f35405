use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Started,
    Processing,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Started => "STARTED",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted analysis request, keyed by the backend-assigned id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub subject: String,
    pub status: TaskStatus,
    /// Only present once `status` is terminal.
    pub result: Option<Value>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: &str, subject: &str) -> Self {
        Self {
            id: id.to_string(),
            subject: subject.to_string(),
            status: TaskStatus::Pending,
            result: None,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Optional overrides sent with a submission. `None` means backend default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnalysisParams {
    pub date: Option<NaiveDate>,
    pub deep_think_llm: Option<String>,
    pub quick_think_llm: Option<String>,
}

impl AnalysisParams {
    /// Blank model names collapse to `None`.
    pub fn normalized(&self) -> Self {
        Self {
            date: self.date,
            deep_think_llm: non_blank(self.deep_think_llm.as_deref()),
            quick_think_llm: non_blank(self.quick_think_llm.as_deref()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
