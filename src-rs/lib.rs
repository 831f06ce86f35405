pub mod config;
pub mod error;
pub mod helpers;
pub mod result;
pub mod session;

#[path = "task/lib.rs"]
pub mod task;
#[path = "api/lib.rs"]
pub mod api;

pub use api::{AuthBackend, Credential, HttpBackend, TaskBackend};
pub use config::ClientConfig;
pub use error::{ApiError, SessionError, TrackerError};
pub use result::Decision;
pub use session::Session;
pub use task::{AnalysisParams, PollOutcome, Task, TaskEvent, TaskStatus, TaskStore, Tracker};
