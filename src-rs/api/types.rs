use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::task::{AnalysisParams, TaskStatus};

/// Bearer credential issued by the backend. Passed explicitly to every
/// authenticated call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl Credential {
    pub fn bearer(token: &str) -> Self {
        Self {
            access_token: token.to_string(),
            token_type: default_token_type(),
        }
    }

    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub ticker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_think_llm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_think_llm: Option<String>,
}

impl AnalysisRequest {
    pub fn new(subject: &str, params: &AnalysisParams) -> Self {
        let params = params.normalized();
        Self {
            ticker: subject.trim().to_string(),
            date: params.date,
            deep_think_llm: params.deep_think_llm,
            quick_think_llm: params.quick_think_llm,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub task_id: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Value>,
}

/// Submission and status lookup for analysis tasks.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn submit(
        &self,
        credential: &Credential,
        request: &AnalysisRequest,
    ) -> Result<SubmitResponse, ApiError>;

    async fn status(&self, credential: &Credential, task_id: &str) -> Result<StatusReport, ApiError>;
}

/// Account registration and credential issuance.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<Credential, ApiError>;

    async fn register(&self, username: &str, password: &str) -> Result<(), ApiError>;
}
