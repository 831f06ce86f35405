use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

use super::types::{
    AnalysisRequest, AuthBackend, Credential, RegisterRequest, StatusReport, SubmitResponse, TaskBackend,
};
use crate::config::ClientConfig;
use crate::error::ApiError;

/// HTTP implementation of the backend collaborators.
pub struct HttpBackend {
    pub base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn from_config(cfg: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(&cfg.base_url, cfg.request_timeout)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}/tasks/{id}` with the id as one encoded path segment.
    fn task_url(&self, task_id: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| ApiError::InvalidRequest(format!("base url {}: {}", self.base_url, err)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest(format!("base url {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push("tasks")
            .push(task_id);
        Ok(url)
    }

    fn auth_headers(credential: &Credential) -> Result<HeaderMap, ApiError> {
        let value = HeaderValue::from_str(&credential.header_value()).map_err(|_| {
            ApiError::InvalidRequest("credential is not a valid authorization header".to_string())
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    async fn ensure_success(resp: Response) -> Result<Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
        let resp = Self::ensure_success(resp).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

#[async_trait]
impl TaskBackend for HttpBackend {
    async fn submit(
        &self,
        credential: &Credential,
        request: &AnalysisRequest,
    ) -> Result<SubmitResponse, ApiError> {
        let resp = self
            .client
            .post(self.url("/analyze"))
            .headers(Self::auth_headers(credential)?)
            .json(request)
            .send()
            .await?;
        Self::parse(resp).await
    }

    async fn status(&self, credential: &Credential, task_id: &str) -> Result<StatusReport, ApiError> {
        let resp = self
            .client
            .get(self.task_url(task_id)?)
            .headers(Self::auth_headers(credential)?)
            .send()
            .await?;
        Self::parse(resp).await
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn login(&self, username: &str, password: &str) -> Result<Credential, ApiError> {
        let resp = self
            .client
            .post(self.url("/auth/token"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        Self::parse(resp).await
    }

    async fn register(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .post(self.url("/auth/register"))
            .json(&RegisterRequest { username, password })
            .send()
            .await?;
        Self::ensure_success(resp).await?;
        Ok(())
    }
}
