pub mod events;
pub mod store;
pub mod tracker;
pub mod types;

pub use events::TaskEvent;
pub use store::{ApplyOutcome, TaskStore};
pub use tracker::{PollOutcome, Tracker, DEFAULT_POLL_INTERVAL};
pub use types::{AnalysisParams, Task, TaskStatus};
