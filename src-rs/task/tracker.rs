//! Submission and polling of analysis tasks.
//!
//! [`Tracker`] owns the task map (via [`TaskStore`]) and talks to the
//! backend through a [`TaskBackend`]. The credential is passed into every
//! call; the tracker itself holds no auth state.
//!
//! Polling is driven by [`Tracker::run`]: every period it takes a snapshot
//! of the non-terminal tasks and issues one lookup per task. A per-id
//! in-flight marker keeps two lookups for the same task from racing, so
//! responses can never be applied out of order.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::store::{ApplyOutcome, TaskStore};
use super::types::{AnalysisParams, TaskStatus};
use crate::api::{AnalysisRequest, Credential, TaskBackend};
use crate::error::TrackerError;

/// Default period between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// What a single `poll` did to the tracked task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Status or result changed.
    Updated(TaskStatus),
    /// The backend reported the state already held.
    Unchanged(TaskStatus),
    /// The task was already terminal; no lookup was made.
    Settled(TaskStatus),
    /// Another poll for the same id has not finished yet.
    InFlight,
    /// The lookup failed; the task was left as it was.
    Failed,
}

#[derive(Clone)]
pub struct Tracker {
    backend: Arc<dyn TaskBackend>,
    store: Arc<TaskStore>,
}

impl Tracker {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self {
            backend,
            store: Arc::new(TaskStore::new()),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Submits a new analysis and starts tracking it as `PENDING`.
    ///
    /// Nothing is registered if the backend rejects the request; the error is
    /// returned to the caller and kept as the current failure message. There
    /// is no automatic retry.
    pub async fn submit(
        &self,
        credential: &Credential,
        subject: &str,
        params: &AnalysisParams,
    ) -> Result<String, TrackerError> {
        let request = AnalysisRequest::new(subject, params);
        if request.ticker.is_empty() {
            return Err(TrackerError::InvalidSubmission("subject is empty".to_string()));
        }

        let resp = match self.backend.submit(credential, &request).await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(subject = %request.ticker, error = %err, "Analysis submission failed");
                self.store.record_submission_failure(&request.ticker, &err.to_string());
                return Err(TrackerError::SubmissionFailed(err));
            }
        };

        if !self.store.insert(&resp.task_id, &request.ticker) {
            tracing::warn!(task_id = %resp.task_id, "Backend returned an id that is already tracked");
        }
        self.store.clear_error();
        tracing::info!(task_id = %resp.task_id, subject = %request.ticker, "Analysis submitted");
        Ok(resp.task_id)
    }

    /// Looks up one task and overwrites its status and result.
    ///
    /// Lookup failures are logged and recorded as the current failure
    /// message but are not returned as errors; the next cycle tries again.
    pub async fn poll(&self, credential: &Credential, id: &str) -> Result<PollOutcome, TrackerError> {
        let task = self
            .store
            .get(id)
            .ok_or_else(|| TrackerError::UnknownTask(id.to_string()))?;
        if task.is_terminal() {
            return Ok(PollOutcome::Settled(task.status));
        }

        let Some(_guard) = self.store.try_begin_poll(id) else {
            tracing::debug!(task_id = %id, "Poll already in flight, skipping");
            return Ok(PollOutcome::InFlight);
        };

        let report = match self.backend.status(credential, id).await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(task_id = %id, error = %err, "Status lookup failed");
                self.store.record_poll_failure(id, &err.to_string());
                return Ok(PollOutcome::Failed);
            }
        };

        let outcome = match self.store.apply(id, report.status, report.result) {
            ApplyOutcome::Updated(status) => {
                tracing::info!(task_id = %id, status = %status, "Task status changed");
                PollOutcome::Updated(status)
            }
            ApplyOutcome::Unchanged(status) => PollOutcome::Unchanged(status),
            ApplyOutcome::Settled(status) => PollOutcome::Settled(status),
            ApplyOutcome::Missing => return Err(TrackerError::UnknownTask(id.to_string())),
        };
        Ok(outcome)
    }

    /// Polls every non-terminal task once, concurrently. The set of tasks is
    /// fixed when the call starts; each response is applied as it arrives.
    pub async fn poll_pending(&self, credential: &Credential) -> Vec<(String, PollOutcome)> {
        let ids = self.store.pending_ids();
        let polls = ids.into_iter().map(|id| async move {
            let outcome = self.poll(credential, &id).await.unwrap_or(PollOutcome::Failed);
            (id, outcome)
        });
        join_all(polls).await
    }

    /// Drives polling until `cancel` fires. The first cycle starts one full
    /// `period` after the call. Cycles are spawned, so a slow backend never
    /// delays the schedule; cancelling stops new cycles and lets spawned ones
    /// finish. A zero `period` falls back to [`DEFAULT_POLL_INTERVAL`].
    pub async fn run(&self, credential: Credential, period: Duration, cancel: CancellationToken) {
        let period = if period.is_zero() {
            tracing::warn!(
                fallback_ms = DEFAULT_POLL_INTERVAL.as_millis() as u64,
                "Poll interval is zero, using the default"
            );
            DEFAULT_POLL_INTERVAL
        } else {
            period
        };
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period_ms = period.as_millis() as u64, "Task polling started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.store.pending_ids().is_empty() {
                        continue;
                    }
                    let tracker = self.clone();
                    let credential = credential.clone();
                    tokio::spawn(async move {
                        tracker.poll_pending(&credential).await;
                    });
                }
            }
        }

        tracing::info!("Task polling stopped");
    }

    /// Spawns [`Tracker::run`] on the runtime and returns the token that
    /// stops it.
    pub fn spawn_polling(&self, credential: Credential, period: Duration) -> CancellationToken {
        let cancel = CancellationToken::new();
        let tracker = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            tracker.run(credential, period, token).await;
        });
        cancel
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    use super::*;
    use crate::api::{StatusReport, SubmitResponse};
    use crate::error::ApiError;
    use crate::task::TaskEvent;

    /// Scripted backend: hands out queued submit ids and status replies.
    #[derive(Default)]
    struct FakeBackend {
        submit_ids: Mutex<VecDeque<Result<String, u16>>>,
        replies: Mutex<VecDeque<Result<(TaskStatus, Option<Value>), u16>>>,
        submitted: Mutex<Vec<AnalysisRequest>>,
        lookups: AtomicUsize,
        gate: Option<Arc<Notify>>,
        entered: Arc<Notify>,
    }

    impl FakeBackend {
        fn with_submit(self, reply: Result<&str, u16>) -> Self {
            self.submit_ids.lock().unwrap().push_back(reply.map(str::to_string));
            self
        }

        fn with_reply(self, reply: Result<(TaskStatus, Option<Value>), u16>) -> Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    fn http_error(status: u16) -> ApiError {
        ApiError::Status {
            status,
            body: "unavailable".to_string(),
        }
    }

    #[async_trait]
    impl TaskBackend for FakeBackend {
        async fn submit(
            &self,
            _credential: &Credential,
            request: &AnalysisRequest,
        ) -> Result<SubmitResponse, ApiError> {
            self.submitted.lock().unwrap().push(request.clone());
            match self.submit_ids.lock().unwrap().pop_front() {
                Some(Ok(task_id)) => Ok(SubmitResponse { task_id, message: None }),
                Some(Err(code)) => Err(http_error(code)),
                None => Err(http_error(500)),
            }
        }

        async fn status(&self, _credential: &Credential, task_id: &str) -> Result<StatusReport, ApiError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                self.entered.notify_one();
                gate.notified().await;
            }
            let reply = {
                let mut replies = self.replies.lock().unwrap();
                // the last scripted reply repeats
                if replies.len() > 1 {
                    replies.pop_front()
                } else {
                    replies.front().cloned()
                }
            };
            match reply {
                Some(Ok((status, result))) => Ok(StatusReport {
                    task_id: Some(task_id.to_string()),
                    status,
                    result,
                }),
                Some(Err(code)) => Err(http_error(code)),
                None => Err(http_error(500)),
            }
        }
    }

    fn tracker(backend: FakeBackend) -> (Tracker, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        (Tracker::new(backend.clone()), backend)
    }

    fn cred() -> Credential {
        Credential::bearer("token")
    }

    #[tokio::test]
    async fn submit_registers_pending_task() {
        let (tracker, backend) = tracker(FakeBackend::default().with_submit(Ok("abc123")));

        let id = tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();

        assert_eq!(id, "abc123");
        let tasks = tracker.store().list();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "abc123");
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[0].subject, "BTC-USD");
        assert!(tasks[0].result.is_none());

        let sent = backend.submitted.lock().unwrap();
        assert_eq!(sent[0].deep_think_llm, None);
        assert_eq!(sent[0].quick_think_llm, None);
    }

    #[tokio::test]
    async fn failed_submit_tracks_nothing() {
        let (tracker, _) = tracker(
            FakeBackend::default()
                .with_submit(Ok("first"))
                .with_submit(Err(503)),
        );
        tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();

        let err = tracker
            .submit(&cred(), "ETH-USD", &AnalysisParams::default())
            .await
            .unwrap_err();

        assert_matches!(err, TrackerError::SubmissionFailed(ApiError::Status { status: 503, .. }));
        assert_eq!(tracker.store().len(), 1);
        assert!(tracker.store().last_error().unwrap().contains("ETH-USD"));
    }

    #[tokio::test]
    async fn successful_submit_clears_failure_message() {
        let (tracker, _) = tracker(
            FakeBackend::default()
                .with_submit(Err(502))
                .with_submit(Ok("abc123")),
        );
        let params = AnalysisParams::default();
        assert!(tracker.submit(&cred(), "BTC-USD", &params).await.is_err());
        assert!(tracker.store().last_error().is_some());

        tracker.submit(&cred(), "BTC-USD", &params).await.unwrap();
        assert!(tracker.store().last_error().is_none());
    }

    #[tokio::test]
    async fn blank_subject_is_rejected_locally() {
        let (tracker, backend) = tracker(FakeBackend::default().with_submit(Ok("abc123")));
        let err = tracker
            .submit(&cred(), "   ", &AnalysisParams::default())
            .await
            .unwrap_err();
        assert_matches!(err, TrackerError::InvalidSubmission(_));
        assert!(backend.submitted.lock().unwrap().is_empty());
        assert!(tracker.store().is_empty());
    }

    #[tokio::test]
    async fn poll_applies_terminal_result_and_keeps_subject() {
        let (tracker, _) = tracker(
            FakeBackend::default()
                .with_submit(Ok("abc123"))
                .with_reply(Ok((TaskStatus::Success, Some(json!({"decision": "BUY"}))))),
        );
        tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();

        let outcome = tracker.poll(&cred(), "abc123").await.unwrap();

        assert_eq!(outcome, PollOutcome::Updated(TaskStatus::Success));
        let task = tracker.store().get("abc123").unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.result, Some(json!({"decision": "BUY"})));
        assert_eq!(task.subject, "BTC-USD");
    }

    #[tokio::test]
    async fn failed_poll_leaves_task_untouched() {
        let (tracker, _) = tracker(
            FakeBackend::default()
                .with_submit(Ok("abc123"))
                .with_reply(Err(500)),
        );
        tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();
        let before = tracker.store().get("abc123").unwrap();

        let outcome = tracker.poll(&cred(), "abc123").await.unwrap();

        assert_eq!(outcome, PollOutcome::Failed);
        assert_eq!(tracker.store().get("abc123").unwrap(), before);
        assert!(tracker.store().last_error().is_some());
        assert!(!tracker.store().is_in_flight("abc123"));
    }

    #[tokio::test]
    async fn repeated_identical_poll_is_idempotent() {
        let (tracker, _) = tracker(
            FakeBackend::default()
                .with_submit(Ok("abc123"))
                .with_reply(Ok((TaskStatus::Processing, None))),
        );
        tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();

        tracker.poll(&cred(), "abc123").await.unwrap();
        let once = tracker.store().get("abc123").unwrap();
        let outcome = tracker.poll(&cred(), "abc123").await.unwrap();

        assert_eq!(outcome, PollOutcome::Unchanged(TaskStatus::Processing));
        assert_eq!(tracker.store().get("abc123").unwrap(), once);
    }

    #[tokio::test]
    async fn terminal_task_is_not_polled_again() {
        let (tracker, backend) = tracker(
            FakeBackend::default()
                .with_submit(Ok("abc123"))
                .with_reply(Ok((TaskStatus::Failure, Some(json!("missing API keys")))))
                .with_reply(Ok((TaskStatus::Processing, None))),
        );
        tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();
        tracker.poll(&cred(), "abc123").await.unwrap();

        let outcome = tracker.poll(&cred(), "abc123").await.unwrap();

        assert_eq!(outcome, PollOutcome::Settled(TaskStatus::Failure));
        assert_eq!(backend.lookups(), 1);
        assert_eq!(tracker.store().get("abc123").unwrap().status, TaskStatus::Failure);
    }

    #[tokio::test]
    async fn poll_of_untracked_id_is_an_error() {
        let (tracker, _) = tracker(FakeBackend::default());
        let err = tracker.poll(&cred(), "ghost").await.unwrap_err();
        assert_matches!(err, TrackerError::UnknownTask(id) if id == "ghost");
    }

    #[tokio::test]
    async fn concurrent_poll_for_same_id_is_skipped() {
        let gate = Arc::new(Notify::new());
        let backend = FakeBackend {
            gate: Some(gate.clone()),
            ..FakeBackend::default()
        }
        .with_submit(Ok("abc123"))
        .with_reply(Ok((TaskStatus::Started, None)));
        let (tracker, backend) = tracker(backend);
        tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();

        let first = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.poll(&cred(), "abc123").await })
        };
        backend.entered.notified().await;

        let second = tracker.poll(&cred(), "abc123").await.unwrap();
        assert_eq!(second, PollOutcome::InFlight);
        assert_eq!(backend.lookups(), 1);

        gate.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first, PollOutcome::Updated(TaskStatus::Started));
        assert!(!tracker.store().is_in_flight("abc123"));
    }

    #[tokio::test]
    async fn poll_pending_covers_only_non_terminal_tasks() {
        let (tracker, backend) = tracker(
            FakeBackend::default()
                .with_submit(Ok("t1"))
                .with_submit(Ok("t2"))
                .with_reply(Ok((TaskStatus::Success, Some(json!({"ok": true}))))),
        );
        let params = AnalysisParams::default();
        tracker.submit(&cred(), "BTC-USD", &params).await.unwrap();
        tracker.poll(&cred(), "t1").await.unwrap();
        tracker.submit(&cred(), "ETH-USD", &params).await.unwrap();

        let outcomes = tracker.poll_pending(&cred()).await;

        assert_eq!(outcomes, vec![("t2".to_string(), PollOutcome::Updated(TaskStatus::Success))]);
        assert_eq!(backend.lookups(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_loop_schedules_no_more_polls() {
        let (tracker, backend) = tracker(
            FakeBackend::default()
                .with_submit(Ok("abc123"))
                .with_reply(Ok((TaskStatus::Processing, None))),
        );
        tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();

        let cancel = tracker.spawn_polling(cred(), DEFAULT_POLL_INTERVAL);
        tokio::time::sleep(Duration::from_millis(11_500)).await;
        assert_eq!(backend.lookups(), 2);

        cancel.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.lookups(), 2);
        assert_eq!(tracker.store().get("abc123").unwrap().status, TaskStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_falls_back_to_default_interval() {
        let (tracker, backend) = tracker(
            FakeBackend::default()
                .with_submit(Ok("abc123"))
                .with_reply(Ok((TaskStatus::Processing, None))),
        );
        tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();

        let cancel = tracker.spawn_polling(cred(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(backend.lookups(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.lookups(), 1);
        assert_eq!(tracker.store().get("abc123").unwrap().status, TaskStatus::Processing);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_does_not_stall_the_schedule() {
        let gate = Arc::new(Notify::new());
        let backend = FakeBackend {
            gate: Some(gate.clone()),
            ..FakeBackend::default()
        }
        .with_submit(Ok("abc123"))
        .with_reply(Ok((TaskStatus::Processing, None)));
        let (tracker, backend) = tracker(backend);
        tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();

        let cancel = tracker.spawn_polling(cred(), DEFAULT_POLL_INTERVAL);

        // ticks at 5s, 10s and 15s; only the first reaches the backend
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(backend.lookups(), 1);
        assert!(tracker.store().is_in_flight("abc123"));
        assert_eq!(tracker.store().get("abc123").unwrap().status, TaskStatus::Pending);

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(4_500)).await;

        // the 20s tick still fires on schedule
        assert_eq!(tracker.store().get("abc123").unwrap().status, TaskStatus::Processing);
        assert_eq!(backend.lookups(), 2);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_each_period_until_settled() {
        let (tracker, backend) = tracker(
            FakeBackend::default()
                .with_submit(Ok("abc123"))
                .with_reply(Ok((TaskStatus::Processing, None)))
                .with_reply(Ok((TaskStatus::Success, Some(json!({"decision": "HOLD"}))))),
        );
        tracker
            .submit(&cred(), "BTC-USD", &AnalysisParams::default())
            .await
            .unwrap();
        let mut events = tracker.store().subscribe();

        let cancel = tracker.spawn_polling(cred(), DEFAULT_POLL_INTERVAL);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(backend.lookups(), 0);

        let mut seen = Vec::new();
        while seen.last() != Some(&TaskStatus::Success) {
            if let TaskEvent::StatusChanged { status, .. } = events.recv().await.unwrap() {
                seen.push(status);
            }
        }
        assert_eq!(seen, vec![TaskStatus::Processing, TaskStatus::Success]);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.lookups(), 2);
        cancel.cancel();
    }
}
