use thiserror::Error;

/// Failures talking to the analysis backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    /// The body could not be decoded into the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// The request could not be built (bad base url or credential).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Request(err) => err.status().map(|s| s.as_u16()),
            ApiError::Decode(_) | ApiError::InvalidRequest(_) => None,
        }
    }

    /// Rejected credentials or a missing/expired bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status_code(), Some(401) | Some(403))
    }

    /// Registration rejected, usually because the username is taken.
    pub fn is_conflict(&self) -> bool {
        matches!(self.status_code(), Some(400) | Some(409))
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("submission failed: {0}")]
    SubmissionFailed(#[source] ApiError),

    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("task not tracked: {0}")]
    UnknownTask(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not logged in")]
    NotAuthenticated,

    #[error("login failed: {0}")]
    LoginFailed(#[source] ApiError),

    #[error("registration failed: {0}")]
    RegistrationFailed(#[source] ApiError),

    #[error("status lookup failed: {0}")]
    LookupFailed(#[source] ApiError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}
