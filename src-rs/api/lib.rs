pub mod client;
pub mod types;

pub use client::HttpBackend;
pub use types::{
    AnalysisRequest, AuthBackend, Credential, RegisterRequest, StatusReport, SubmitResponse, TaskBackend,
};
