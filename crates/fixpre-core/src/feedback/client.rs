//! Upload a presentation and poll the resulting job until feedback arrives.
//!
//! `submit` uploads the file and spawns a polling task. The task owns a
//! `CancellationToken`; `start_over`, a new `submit`, or dropping the client
//! cancels it. Every state write made by the task happens inside
//! `send_if_modified` after re-checking the token, so once a reset has been
//! published no stale poll can overwrite it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, Failure, Host};
use crate::models::{FeedbackReport, JobId, JobStatus};

use super::upload::{UploadFile, UploadPolicy};

// ============================================================================
// Constants
// ============================================================================

const UPLOAD_PATH: &str = "/upload";
const RESULTS_PATH: &str = "/results";

const UPLOAD_FAILED: &str = "File upload failed.";
const RESULTS_FAILED: &str = "Failed to get results.";
const PROCESSING_FAILED: &str = "File processing failed.";

/// When and how often the job is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    /// Wait before the first poll
    pub initial_delay: Duration,
    /// Wait between polls while the job is pending
    pub interval: Duration,
    /// Polls before giving up
    pub max_attempts: u32,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(3000),
            interval: Duration::from_millis(2000),
            max_attempts: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Polls answered so far
    pub polls: u32,
}

/// Observable state of the upload/poll flow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackState {
    pub loading: bool,
    pub job: Option<Job>,
    pub feedback: Option<FeedbackReport>,
    pub error: Option<Failure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    job_id: JobId,
}

type SharedState = Arc<watch::Sender<FeedbackState>>;

pub struct FeedbackClient {
    api: ApiClient,
    policy: UploadPolicy,
    timing: PollTiming,
    state: SharedState,
    active: Mutex<Option<CancellationToken>>,
}

impl FeedbackClient {
    pub fn new(api: ApiClient, policy: UploadPolicy, timing: PollTiming) -> Self {
        let (state, _) = watch::channel(FeedbackState::default());
        Self {
            api,
            policy,
            timing,
            state: Arc::new(state),
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> FeedbackState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedbackState> {
        self.state.subscribe()
    }

    /// Validate and upload `file`, then start polling in the background.
    /// Validation failures are reported without any request being made.
    /// Any job already running is cancelled first.
    pub async fn submit(&self, file: Option<&UploadFile>) -> Result<JobId, ApiError> {
        let file = match self.policy.validate(file) {
            Ok(file) => file,
            Err(e) => {
                debug!(error = %e, "Upload rejected before sending");
                self.state.send_modify(|state| {
                    state.error = Some(Failure::from(&e));
                    // A settled job's results belong to the earlier submit
                    if !state.loading {
                        state.job = None;
                        state.feedback = None;
                    }
                });
                return Err(e);
            }
        };

        let cancel = self.begin_job();
        info!(file = %file.file_name, bytes = file.size(), "Uploading presentation");

        let uploaded = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            result = upload(&self.api, file) => result,
        };

        match uploaded {
            Ok(job_id) => {
                info!(job_id = %job_id, "Upload accepted");
                let pending = Job {
                    id: job_id.clone(),
                    status: JobStatus::Pending,
                    polls: 0,
                };
                if !apply(&self.state, &cancel, |state| state.job = Some(pending)) {
                    return Err(ApiError::Cancelled);
                }
                tokio::spawn(poll_until_done(
                    self.api.clone(),
                    job_id.clone(),
                    self.timing,
                    cancel,
                    Arc::clone(&self.state),
                ));
                Ok(job_id)
            }
            Err(e) => {
                fail(&self.state, &cancel, &e);
                Err(e)
            }
        }
    }

    /// Wait until the current job stops loading and return its feedback.
    /// A job that was reset with `start_over` reports `Cancelled`.
    pub async fn wait(&self) -> Result<FeedbackReport, Failure> {
        let mut rx = self.state.subscribe();
        let state = {
            let settled = rx
                .wait_for(|state| !state.loading)
                .await
                .map_err(|_| Failure::cancelled())?;
            settled.clone()
        };
        match (state.feedback, state.error) {
            (_, Some(failure)) => Err(failure),
            (Some(report), None) => Ok(report),
            (None, None) => Err(Failure::cancelled()),
        }
    }

    /// Cancel any upload or poll in flight and reset to the initial state.
    pub fn start_over(&self) {
        if let Some(cancel) = self.take_active() {
            cancel.cancel();
            debug!("Cancelled active feedback job");
        }
        self.state
            .send_modify(|state| *state = FeedbackState::default());
    }

    fn begin_job(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cancel.clone());
        if let Some(previous) = previous {
            previous.cancel();
            debug!("Superseded previous feedback job");
        }
        self.state.send_modify(|state| {
            *state = FeedbackState {
                loading: true,
                ..FeedbackState::default()
            }
        });
        cancel
    }

    fn take_active(&self) -> Option<CancellationToken> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for FeedbackClient {
    fn drop(&mut self) {
        if let Some(cancel) = self.take_active() {
            cancel.cancel();
        }
    }
}

/// Apply `update` unless `cancel` has fired. The check runs under the
/// state lock, so it is ordered against `start_over`'s reset.
fn apply(
    state: &watch::Sender<FeedbackState>,
    cancel: &CancellationToken,
    update: impl FnOnce(&mut FeedbackState),
) -> bool {
    state.send_if_modified(|current| {
        if cancel.is_cancelled() {
            return false;
        }
        update(current);
        true
    })
}

fn fail(state: &watch::Sender<FeedbackState>, cancel: &CancellationToken, err: &ApiError) {
    warn!(error = %err, "Feedback job failed");
    let job_failed = matches!(err, ApiError::JobFailed(_));
    apply(state, cancel, |current| {
        current.loading = false;
        current.error = Some(Failure::from(err));
        if job_failed {
            if let Some(job) = current.job.as_mut() {
                job.status = JobStatus::Failed;
            }
        }
    });
}

async fn upload(api: &ApiClient, file: &UploadFile) -> Result<JobId, ApiError> {
    let response = api.post_multipart(UPLOAD_PATH, file.to_form()?).await?;
    if !response.is_success() {
        return Err(ApiError::Status {
            status: response.status().as_u16(),
            message: UPLOAD_FAILED.to_string(),
        });
    }
    Ok(response.json::<UploadResponse>()?.job_id)
}

async fn fetch_result(
    api: &ApiClient,
    job_id: &JobId,
) -> Result<(JobStatus, FeedbackReport), ApiError> {
    let path = format!("{}/{}", RESULTS_PATH, job_id);
    let response = api.get(Host::Feedback, &path, &[]).await?;
    if !response.is_success() {
        return Err(ApiError::Status {
            status: response.status().as_u16(),
            message: RESULTS_FAILED.to_string(),
        });
    }
    let report = FeedbackReport(response.json::<Value>()?);
    let status = report
        .status()
        .ok_or_else(|| ApiError::InvalidResponse("Result has no status".to_string()))?;
    Ok((status, report))
}

async fn poll_until_done(
    api: ApiClient,
    job_id: JobId,
    timing: PollTiming,
    cancel: CancellationToken,
    state: SharedState,
) {
    let mut delay = timing.initial_delay;

    for attempt in 1..=timing.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = timing.interval;

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = fetch_result(&api, &job_id) => result,
        };

        match result {
            Ok((JobStatus::Pending, _)) => {
                debug!(job_id = %job_id, attempt, "Feedback still pending");
                let still_current = apply(&state, &cancel, |current| {
                    if let Some(job) = current.job.as_mut() {
                        job.polls = attempt;
                    }
                });
                if !still_current {
                    return;
                }
            }
            Ok((JobStatus::Complete, report)) => {
                info!(job_id = %job_id, attempt, "Feedback ready");
                apply(&state, &cancel, |current| {
                    current.loading = false;
                    current.error = None;
                    current.feedback = Some(report);
                    if let Some(job) = current.job.as_mut() {
                        job.status = JobStatus::Complete;
                        job.polls = attempt;
                    }
                });
                return;
            }
            Ok((JobStatus::Failed, _)) => {
                fail(&state, &cancel, &ApiError::JobFailed(PROCESSING_FAILED.to_string()));
                return;
            }
            Ok((JobStatus::Unknown, report)) => {
                let status = report.get("status").cloned().unwrap_or(Value::Null);
                fail(
                    &state,
                    &cancel,
                    &ApiError::InvalidResponse(format!("Unexpected job status {}", status)),
                );
                return;
            }
            Err(e) => {
                fail(&state, &cancel, &e);
                return;
            }
        }
    }

    fail(
        &state,
        &cancel,
        &ApiError::PollLimitExceeded {
            attempts: timing.max_attempts,
        },
    );
}
