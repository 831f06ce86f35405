use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::api::{AuthBackend, Credential, HttpBackend, StatusReport, TaskBackend};
use crate::config::ClientConfig;
use crate::error::{ApiError, SessionError};
use crate::task::{AnalysisParams, PollOutcome, Task, TaskEvent, Tracker};

/// Caller context for one logged-in user: holds the credential, owns the
/// tracker, and keeps the polling loop alive while authenticated.
pub struct Session<B> {
    pub config: ClientConfig,
    backend: Arc<B>,
    tracker: Tracker,
    credential: Option<Credential>,
    polling: Option<CancellationToken>,
}

impl Session<HttpBackend> {
    pub fn connect(config: ClientConfig) -> Result<Self, ApiError> {
        let backend = HttpBackend::from_config(&config)?;
        Ok(Self::new(Arc::new(backend), config))
    }
}

impl<B> Session<B>
where
    B: TaskBackend + AuthBackend + 'static,
{
    pub fn new(backend: Arc<B>, config: ClientConfig) -> Self {
        let tracker = Tracker::new(backend.clone());
        Self {
            config,
            backend,
            tracker,
            credential: None,
            polling: None,
        }
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), SessionError> {
        let credential = self.backend.login(username, password).await.map_err(|err| {
            tracing::warn!(username, error = %err, "Login failed");
            SessionError::LoginFailed(err)
        })?;
        tracing::info!(username, "Logged in");
        self.resume(credential);
        Ok(())
    }

    /// Adopts an already issued credential and (re)starts polling. Must be
    /// called from within a Tokio runtime.
    pub fn resume(&mut self, credential: Credential) {
        self.stop_polling();
        self.polling = Some(
            self.tracker
                .spawn_polling(credential.clone(), self.config.poll_interval),
        );
        self.credential = Some(credential);
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), SessionError> {
        self.backend.register(username, password).await.map_err(|err| {
            tracing::warn!(username, error = %err, "Registration failed");
            SessionError::RegistrationFailed(err)
        })?;
        tracing::info!(username, "Registered");
        Ok(())
    }

    /// Stops polling and forgets the credential. Tracked tasks stay readable.
    pub fn logout(&mut self) {
        self.stop_polling();
        self.credential = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.polling.is_some()
    }

    pub async fn submit(&self, subject: &str, params: &AnalysisParams) -> Result<String, SessionError> {
        let credential = self.credential.as_ref().ok_or(SessionError::NotAuthenticated)?;
        Ok(self.tracker.submit(credential, subject, params).await?)
    }

    /// Polls every unsettled task right now, outside the regular schedule.
    pub async fn refresh(&self) -> Result<Vec<(String, PollOutcome)>, SessionError> {
        let credential = self.credential.as_ref().ok_or(SessionError::NotAuthenticated)?;
        Ok(self.tracker.poll_pending(credential).await)
    }

    /// One-off status lookup for any task id, tracked or not. Does not touch
    /// the tracked set.
    pub async fn lookup(&self, task_id: &str) -> Result<StatusReport, SessionError> {
        let credential = self.credential.as_ref().ok_or(SessionError::NotAuthenticated)?;
        self.backend
            .status(credential, task_id)
            .await
            .map_err(SessionError::LookupFailed)
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tracker.store().list()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.tracker.store().get(id)
    }

    pub fn last_error(&self) -> Option<String> {
        self.tracker.store().last_error()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tracker.store().subscribe()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    fn stop_polling(&mut self) {
        if let Some(cancel) = self.polling.take() {
            cancel.cancel();
        }
    }
}

impl<B> Drop for Session<B> {
    fn drop(&mut self) {
        if let Some(cancel) = self.polling.take() {
            cancel.cancel();
        }
    }
}
